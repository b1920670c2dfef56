//! Shared helpers for integration tests.
//!
//! This module provides:
//! - `TestEnv` – mock helpdesk and AI servers plus an in-memory store,
//!   wired into a real `SyncService`
//! - JSON fixture builders for the upstream payloads

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use secrecy::SecretString;
use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use helpdesk_insights::{
    config::Config,
    create_sync_service,
    models::TimeWindow,
    services::{ConversationStore, MemoryConversationStore, SyncService},
};

/// Unix seconds for 2024-01-01T12:00:00Z
#[allow(dead_code)]
pub const DAY_NOON: i64 = 1_704_110_400;

#[allow(dead_code)]
pub struct TestEnv {
    pub helpdesk: MockServer,
    pub ai: MockServer,
    pub store: Arc<MemoryConversationStore>,
}

#[allow(dead_code)]
impl TestEnv {
    pub async fn start() -> Self {
        Self {
            helpdesk: MockServer::start().await,
            ai: MockServer::start().await,
            store: Arc::new(MemoryConversationStore::new()),
        }
    }

    /// Config pointing at the mock servers, with millisecond backoff.
    pub fn config(&self) -> Config {
        let mut config = Config::with_defaults();
        config.helpdesk_base_url = self.helpdesk.uri();
        config.helpdesk_api_token = Some(SecretString::from("helpdesk-token".to_string()));
        config.ai_base_url = self.ai.uri();
        config.ai_api_key = Some(SecretString::from("ai-key".to_string()));
        config.request_timeout_secs = 5;
        config.enrich_batch_size = 5;
        config.backoff_base_ms = 1;
        config.backoff_max_ms = 8;
        config.max_saturated_retries = 2;
        config
    }

    pub async fn service(&self) -> SyncService {
        self.service_with(self.config(), true).await
    }

    pub async fn service_with(&self, config: Config, with_helpdesk: bool) -> SyncService {
        let store: Arc<dyn ConversationStore> = self.store.clone();
        create_sync_service(&config, store, with_helpdesk)
            .await
            .expect("sync service")
    }

    /// Number of requests the helpdesk mock saw for `url_path`.
    pub async fn helpdesk_hits(&self, url_path: &str) -> usize {
        self.helpdesk
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == url_path)
            .count()
    }

    pub async fn ai_hits(&self) -> usize {
        self.ai.received_requests().await.unwrap_or_default().len()
    }

    /// Serve a fixed categorization for every chat-completion request.
    pub async fn mount_categorizer(&self, content: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(content)))
            .mount(&self.ai)
            .await;
    }

    /// Serve a conversation with a user opening and one agent reply.
    pub async fn mount_conversation(&self, id: &str, contact_id: Option<&str>) {
        Mock::given(method("GET"))
            .and(path(format!("/conversations/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(conversation_detail(id, contact_id)))
            .mount(&self.helpdesk)
            .await;
    }

    pub async fn mount_contact(&self, id: &str, country: &str, region: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/contacts/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "contact",
                "id": id,
                "location": { "country": country, "region": region, "city": "Somewhere" }
            })))
            .mount(&self.helpdesk)
            .await;
    }
}

#[allow(dead_code)]
pub fn day_window() -> TimeWindow {
    TimeWindow {
        start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap(),
    }
}

/// One search results page.
#[allow(dead_code)]
pub fn search_page(ids: &[&str], next: Option<&str>, total: u64) -> Value {
    let conversations: Vec<Value> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| json!({ "type": "conversation", "id": id, "created_at": DAY_NOON + i as i64 }))
        .collect();
    let pages = match next {
        Some(cursor) => json!({ "type": "pages", "per_page": ids.len(), "next": { "starting_after": cursor } }),
        None => json!({ "type": "pages", "per_page": ids.len() }),
    };
    json!({
        "type": "conversation.list",
        "conversations": conversations,
        "total_count": total,
        "pages": pages
    })
}

#[allow(dead_code)]
pub fn conversation_detail(id: &str, contact_id: Option<&str>) -> Value {
    let contacts: Vec<Value> = contact_id.map(|c| json!({ "type": "contact", "id": c })).into_iter().collect();
    json!({
        "type": "conversation",
        "id": id,
        "source": {
            "type": "conversation",
            "delivered_as": "customer_initiated",
            "body": "<p>My invoice is wrong</p>",
            "author": { "type": "user" }
        },
        "contacts": { "type": "contact.list", "contacts": contacts },
        "custom_attributes": { "product": "Billing Suite" },
        "conversation_parts": {
            "conversation_parts": [
                { "part_type": "comment", "body": "<b>Sorry, fixing it now</b>", "author": { "type": "admin" } },
                { "part_type": "assignment", "body": null, "author": { "type": "bot" } }
            ]
        }
    })
}

#[allow(dead_code)]
pub fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 10, "total_tokens": 20 }
    })
}

#[allow(dead_code)]
pub const BILLING_JSON: &str = r#"{"main_categories":["Billing"],"sub_categories":["Invoice"],"sentiment_start":"Negative","sentiment_end":"Positive","resolution":"Yes","feedbacks":["Clearer invoices"]}"#;
