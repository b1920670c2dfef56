//! Wire payloads of the helpdesk REST API.
//!
//! Only the fields the pipeline reads are modelled; everything else in the
//! upstream responses is ignored.

use serde::{Deserialize, Serialize};

/// Body of `POST /conversations/search`
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub query: SearchQuery,
    pub pagination: SearchPagination,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SearchQuery {
    Compound {
        operator: String,
        value: Vec<SearchQuery>,
    },
    Field {
        field: String,
        operator: String,
        value: i64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPagination {
    pub per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starting_after: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub conversations: Vec<ConversationSummary>,
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub pages: Option<SearchPages>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchPages {
    #[serde(default)]
    pub next: Option<NextPage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NextPage {
    #[serde(default)]
    pub starting_after: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationSummary {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Unix seconds
    pub created_at: i64,
}

/// Body of `GET /conversations/{id}`
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConversationDetail {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub source: Option<ConversationSource>,
    #[serde(default)]
    pub conversation_parts: Option<ConversationPartList>,
    #[serde(default)]
    pub contacts: Option<ContactList>,
    #[serde(default)]
    pub custom_attributes: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ConversationDetail {
    /// First contact attached to the conversation, if any.
    pub fn contact_id(&self) -> Option<&str> {
        self.contacts
            .as_ref()
            .and_then(|c| c.contacts.first())
            .map(|c| c.id.as_str())
            .filter(|id| !id.is_empty())
    }

    pub fn product(&self) -> Option<String> {
        self.custom_attributes
            .as_ref()
            .and_then(|attrs| attrs.get("product").or_else(|| attrs.get("Product")))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn channel(&self) -> Option<String> {
        let source = self.source.as_ref()?;
        source
            .delivered_as
            .as_deref()
            .or(source.source_type.as_deref())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn parts(&self) -> &[ConversationPart] {
        self.conversation_parts
            .as_ref()
            .map(|p| p.conversation_parts.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConversationSource {
    #[serde(default, rename = "type")]
    pub source_type: Option<String>,
    #[serde(default)]
    pub delivered_as: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub author: Option<Author>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConversationPartList {
    #[serde(default)]
    pub conversation_parts: Vec<ConversationPart>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConversationPart {
    #[serde(default)]
    pub part_type: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub author: Option<Author>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Author {
    #[serde(default, rename = "type")]
    pub author_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ContactList {
    #[serde(default)]
    pub contacts: Vec<ContactRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactRef {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

/// Body of `GET /contacts/{id}`
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Contact {
    #[serde(default)]
    pub location: Option<ContactLocationPayload>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ContactLocationPayload {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

/// Upstream ids show up both as strings and as bare integers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
