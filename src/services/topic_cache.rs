use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;

use crate::{
    error::AppResult,
    models::TopicMapping,
    services::ConversationStore,
};

/// Known two-level topic taxonomy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicTaxonomy {
    topics: BTreeMap<String, Vec<String>>,
}

impl TopicTaxonomy {
    pub fn from_mappings(mappings: impl IntoIterator<Item = TopicMapping>) -> Self {
        let mut topics: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for mapping in mappings {
            let main = mapping.main_topic.trim();
            if main.is_empty() {
                continue;
            }
            let subs = topics.entry(main.to_string()).or_default();
            if let Some(sub) = mapping.sub_topic.as_deref().map(str::trim) {
                if !sub.is_empty() && !subs.iter().any(|s| s == sub) {
                    subs.push(sub.to_string());
                }
            }
        }
        Self { topics }
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn main_topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Known spelling of a main topic, matched case-insensitively
    pub fn canonical_main(&self, label: &str) -> Option<&str> {
        self.topics
            .keys()
            .find(|k| k.eq_ignore_ascii_case(label.trim()))
            .map(String::as_str)
    }

    /// Known spelling of a sub topic under any main topic
    pub fn canonical_sub(&self, label: &str) -> Option<&str> {
        self.topics
            .values()
            .flatten()
            .find(|s| s.eq_ignore_ascii_case(label.trim()))
            .map(String::as_str)
    }

    /// Taxonomy rendered for inclusion in the categorization prompt
    pub fn prompt_section(&self) -> String {
        self.topics
            .iter()
            .map(|(main, subs)| {
                if subs.is_empty() {
                    format!("- {main}")
                } else {
                    format!("- {main}: {}", subs.join(", "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

struct CachedTaxonomy {
    loaded_at: Instant,
    taxonomy: Arc<TopicTaxonomy>,
}

/// TTL cache over the store's topic mappings.
///
/// Owned by the categorizer and shared by `Arc`; call `init` once at startup.
pub struct TopicCache {
    store: Arc<dyn ConversationStore>,
    ttl: Duration,
    state: RwLock<Option<CachedTaxonomy>>,
}

impl TopicCache {
    pub fn new(store: Arc<dyn ConversationStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            state: RwLock::new(None),
        }
    }

    /// Load the taxonomy, failing loudly if the store is unreachable.
    pub async fn init(&self) -> AppResult<Arc<TopicTaxonomy>> {
        self.refresh().await
    }

    async fn refresh(&self) -> AppResult<Arc<TopicTaxonomy>> {
        let mappings = self.store.load_topic_mappings().await?;
        let taxonomy = Arc::new(TopicTaxonomy::from_mappings(mappings));
        tracing::debug!(main_topics = taxonomy.main_topic_count(), "topic taxonomy loaded");

        let mut state = self.state.write().await;
        *state = Some(CachedTaxonomy {
            loaded_at: Instant::now(),
            taxonomy: taxonomy.clone(),
        });
        Ok(taxonomy)
    }

    /// Current taxonomy, reloaded when older than the TTL.
    ///
    /// A failed reload keeps serving the previous copy.
    pub async fn get(&self) -> Arc<TopicTaxonomy> {
        let stale = {
            let state = self.state.read().await;
            match state.as_ref() {
                Some(cached) if cached.loaded_at.elapsed() < self.ttl => {
                    return cached.taxonomy.clone();
                }
                Some(cached) => Some(cached.taxonomy.clone()),
                None => None,
            }
        };

        match self.refresh().await {
            Ok(taxonomy) => taxonomy,
            Err(e) => {
                tracing::warn!("Failed to reload topic mappings: {}", e);
                stale.unwrap_or_default()
            }
        }
    }

    pub async fn invalidate(&self) {
        *self.state.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryConversationStore;

    fn mapping(main: &str, sub: Option<&str>) -> TopicMapping {
        TopicMapping {
            main_topic: main.to_string(),
            sub_topic: sub.map(str::to_string),
        }
    }

    #[test]
    fn test_taxonomy_groups_and_dedups() {
        let t = TopicTaxonomy::from_mappings(vec![
            mapping("Billing", Some("Refund")),
            mapping("Billing", Some("Refund")),
            mapping("Billing", Some("Invoice")),
            mapping("Shipping", None),
            mapping("  ", Some("ignored")),
        ]);
        assert_eq!(t.main_topic_count(), 2);
        assert_eq!(t.prompt_section(), "- Billing: Refund, Invoice\n- Shipping");
    }

    #[test]
    fn test_canonical_lookup_is_case_insensitive() {
        let t = TopicTaxonomy::from_mappings(vec![mapping("Billing", Some("Refund"))]);
        assert_eq!(t.canonical_main("billing"), Some("Billing"));
        assert_eq!(t.canonical_sub(" REFUND "), Some("Refund"));
        assert_eq!(t.canonical_main("Shipping"), None);
    }

    #[tokio::test]
    async fn test_cache_serves_until_invalidated() {
        let store = Arc::new(MemoryConversationStore::new());
        store.set_topic_mappings(vec![mapping("Billing", None)]).await;
        let cache = TopicCache::new(store.clone(), Duration::from_secs(3600));

        assert_eq!(cache.init().await.unwrap().main_topic_count(), 1);

        store
            .set_topic_mappings(vec![mapping("Billing", None), mapping("Account", None)])
            .await;
        assert_eq!(cache.get().await.main_topic_count(), 1);

        cache.invalidate().await;
        assert_eq!(cache.get().await.main_topic_count(), 2);
    }

    #[tokio::test]
    async fn test_cache_reloads_after_ttl() {
        let store = Arc::new(MemoryConversationStore::new());
        let cache = TopicCache::new(store.clone(), Duration::ZERO);
        assert!(cache.get().await.is_empty());

        store.set_topic_mappings(vec![mapping("Login", None)]).await;
        assert_eq!(cache.get().await.main_topic_count(), 1);
    }
}
