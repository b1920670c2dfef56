pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;

use crate::{
    config::Config,
    error::AppResult,
    services::{
        CategorizationService, ConversationStore, HelpdeskService, PgConversationStore,
        SyncService, TopicCache,
    },
    utils::BackoffPolicy,
};

/// Fail before any I/O when a required credential is missing.
///
/// Maintenance needs none, analyze-only needs the AI key, a full run needs both.
pub fn check_credentials(config: &Config, needs_helpdesk: bool, needs_ai: bool) -> AppResult<()> {
    if needs_helpdesk {
        config.require_helpdesk_token()?;
    }
    if needs_ai {
        config.require_ai_key()?;
    }
    Ok(())
}

/// Open the Postgres store and bring its schema up to date
pub async fn connect_store(config: &Config) -> Result<Arc<PgConversationStore>> {
    let db = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await?;

    let store = PgConversationStore::new(db);
    store.migrate().await?;

    Ok(Arc::new(store))
}

/// Wire the pipeline services over an already opened store.
///
/// The helpdesk client is only built when `with_helpdesk` is set, so
/// analyze-only runs work without a helpdesk token.
pub async fn create_sync_service(
    config: &Config,
    store: Arc<dyn ConversationStore>,
    with_helpdesk: bool,
) -> AppResult<SyncService> {
    let topics = Arc::new(TopicCache::new(
        store.clone(),
        Duration::from_secs(config.topic_cache_ttl_secs),
    ));
    let taxonomy = topics.init().await?;
    tracing::info!(main_topics = taxonomy.main_topic_count(), "Topic taxonomy ready");

    let categorizer = Arc::new(CategorizationService::from_config(config, topics)?);
    let service = SyncService::new(
        store,
        categorizer,
        config.batch_size(),
        BackoffPolicy::from_config(config),
    );

    if with_helpdesk {
        Ok(service.with_helpdesk(HelpdeskService::from_config(config)?))
    } else {
        Ok(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use tokio_test::assert_ok;

    use crate::{error::AppError, services::MemoryConversationStore};

    #[test]
    fn test_maintenance_needs_no_credentials() {
        assert_ok!(check_credentials(&Config::with_defaults(), false, false));
    }

    #[test]
    fn test_analysis_needs_only_ai_key() {
        let mut config = Config::with_defaults();
        assert!(matches!(
            check_credentials(&config, false, true),
            Err(AppError::Configuration(_))
        ));
        config.ai_api_key = Some(SecretString::from("k".to_string()));
        assert_ok!(check_credentials(&config, false, true));
        assert!(check_credentials(&config, true, true).is_err());
    }

    #[tokio::test]
    async fn test_create_sync_service_without_helpdesk_token() {
        let mut config = Config::with_defaults();
        config.ai_api_key = Some(SecretString::from("k".to_string()));
        let store: Arc<dyn ConversationStore> = Arc::new(MemoryConversationStore::new());

        assert_ok!(create_sync_service(&config, store.clone(), false).await);
        assert!(matches!(
            create_sync_service(&config, store, true).await,
            Err(AppError::Configuration(_))
        ));
    }
}
