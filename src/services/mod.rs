pub mod api_client;
pub mod categorization_service;
pub mod chat_types;
pub mod conversation_store;
pub mod enrichment_service;
pub mod harvest_service;
pub mod helpdesk_service;
pub mod sync_service;
pub mod topic_cache;
pub mod transcript_service;

pub use api_client::*;
pub use categorization_service::*;
pub use chat_types::*;
pub use conversation_store::*;
pub use enrichment_service::*;
pub use harvest_service::*;
pub use helpdesk_service::*;
pub use sync_service::*;
pub use topic_cache::*;
pub use transcript_service::*;
