pub mod categorization;
pub mod conversation;
pub mod helpdesk;
pub mod sync;

pub use categorization::*;
pub use conversation::*;
pub use helpdesk::*;
pub use sync::*;
