pub mod backoff;
pub mod html;
pub mod time_window;

pub use backoff::*;
pub use html::*;
pub use time_window::*;
