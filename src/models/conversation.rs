use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CategorizationResult;

/// Customer sentiment at one end of a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    #[default]
    Unknown,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "Positive",
            Sentiment::Neutral => "Neutral",
            Sentiment::Negative => "Negative",
            Sentiment::Unknown => "Unknown",
        }
    }

    /// Lenient parse used for AI output and stored values.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "neutral" => Sentiment::Neutral,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Unknown,
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the customer's issue got resolved
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ResolutionOutcome {
    Yes,
    No,
    #[default]
    Pending,
}

impl ResolutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionOutcome::Yes => "Yes",
            ResolutionOutcome::No => "No",
            ResolutionOutcome::Pending => "Pending",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "yes" | "resolved" | "true" => ResolutionOutcome::Yes,
            "no" | "unresolved" | "false" => ResolutionOutcome::No,
            _ => ResolutionOutcome::Pending,
        }
    }
}

impl std::fmt::Display for ResolutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a record, derived from which fields are populated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Harvested,
    Enriched,
    Categorized,
}

/// The unit of persistence, keyed by the helpdesk conversation id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub product: Option<String>,
    pub channel: Option<String>,
    pub transcript: Option<String>,
    pub main_topics: Option<Vec<String>>,
    pub sub_topics: Option<Vec<String>>,
    pub sentiment_start: Option<Sentiment>,
    pub sentiment_end: Option<Sentiment>,
    pub resolution_outcome: Option<ResolutionOutcome>,
    pub feedbacks: Option<Vec<String>>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl ConversationRecord {
    /// A freshly harvested record: id and creation time only.
    pub fn harvested(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            country: None,
            region: None,
            product: None,
            channel: None,
            transcript: None,
            main_topics: None,
            sub_topics: None,
            sentiment_start: None,
            sentiment_end: None,
            resolution_outcome: None,
            feedbacks: None,
            synced_at: None,
        }
    }

    pub fn lifecycle(&self) -> LifecycleState {
        if self.sentiment_start.is_some() || self.sentiment_end.is_some() {
            LifecycleState::Categorized
        } else if self.transcript.is_some() {
            LifecycleState::Enriched
        } else {
            LifecycleState::Harvested
        }
    }

    /// Any of transcript/product/region/sentiment missing.
    pub fn needs_enrichment(&self) -> bool {
        self.transcript.is_none()
            || self.product.is_none()
            || self.region.is_none()
            || self.sentiment_start.is_none()
    }

    /// Has a usable transcript but was never categorized.
    pub fn needs_categorization(&self) -> bool {
        self.sentiment_start.is_none()
            && self
                .transcript
                .as_deref()
                .map(|t| !t.trim().is_empty())
                .unwrap_or(false)
    }

    /// Clear every enrichment field, keeping id and created_at.
    pub fn clear_enrichment(&mut self) {
        let id = std::mem::take(&mut self.id);
        *self = Self::harvested(id, self.created_at);
    }

    /// Apply an enrichment patch. Absent patch values keep what is stored.
    pub fn apply_enrichment(&mut self, patch: &EnrichmentPatch, synced_at: DateTime<Utc>) {
        keep_or_replace(&mut self.country, &patch.location.country);
        keep_or_replace(&mut self.region, &patch.location.region);
        keep_or_replace(&mut self.product, &patch.product);
        keep_or_replace(&mut self.channel, &patch.channel);
        self.transcript = Some(patch.transcript.clone());
        if let Some(categorization) = &patch.categorization {
            self.apply_categorization(categorization);
        }
        self.synced_at = Some(synced_at);
    }

    pub fn apply_categorization(&mut self, result: &CategorizationResult) {
        self.main_topics = Some(result.main_topics.clone());
        self.sub_topics = Some(result.sub_topics.clone());
        self.sentiment_start = Some(result.sentiment_start);
        self.sentiment_end = Some(result.sentiment_end);
        self.resolution_outcome = Some(result.resolution_outcome);
        self.feedbacks = Some(result.feedbacks.clone());
    }
}

/// Phase 1 row: what the harvester learns without fetching bodies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestedConversation {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Best-effort geolocation from the conversation's contact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactLocation {
    pub country: Option<String>,
    pub region: Option<String>,
}

/// Phase 2 partial update for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentPatch {
    pub location: ContactLocation,
    pub product: Option<String>,
    pub channel: Option<String>,
    pub transcript: String,
    /// None when categorization was skipped or failed upstream.
    pub categorization: Option<CategorizationResult>,
}

/// A stored transcript awaiting categorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCategorization {
    pub id: String,
    pub transcript: String,
}

fn keep_or_replace(field: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        *field = Some(value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ConversationRecord {
        ConversationRecord::harvested("c1", Utc::now())
    }

    #[test]
    fn test_sentiment_parse_is_case_insensitive() {
        assert_eq!(Sentiment::parse("POSITIVE"), Sentiment::Positive);
        assert_eq!(Sentiment::parse(" negative "), Sentiment::Negative);
        assert_eq!(Sentiment::parse("meh"), Sentiment::Unknown);
    }

    #[test]
    fn test_resolution_parse_defaults_to_pending() {
        assert_eq!(ResolutionOutcome::parse("Yes"), ResolutionOutcome::Yes);
        assert_eq!(ResolutionOutcome::parse("no"), ResolutionOutcome::No);
        assert_eq!(ResolutionOutcome::parse(""), ResolutionOutcome::Pending);
        assert_eq!(ResolutionOutcome::parse("maybe"), ResolutionOutcome::Pending);
    }

    #[test]
    fn test_new_record_is_harvested() {
        let r = record();
        assert_eq!(r.lifecycle(), LifecycleState::Harvested);
        assert!(r.needs_enrichment());
        assert!(!r.needs_categorization());
    }

    #[test]
    fn test_enrichment_without_categorization_is_enriched() {
        let mut r = record();
        let patch = EnrichmentPatch {
            location: ContactLocation {
                country: Some("France".into()),
                region: Some("Île-de-France".into()),
            },
            product: Some("app".into()),
            channel: Some("email".into()),
            transcript: "USER: hi".into(),
            categorization: None,
        };
        r.apply_enrichment(&patch, Utc::now());
        assert_eq!(r.lifecycle(), LifecycleState::Enriched);
        assert!(r.needs_categorization());
        assert!(r.synced_at.is_some());
    }

    #[test]
    fn test_enrichment_keeps_stored_values_the_patch_lacks() {
        let mut r = record();
        r.country = Some("Germany".into());
        r.region = Some("Bavaria".into());
        r.product = Some("Billing Suite".into());
        r.channel = Some("chat".into());
        let patch = EnrichmentPatch {
            location: ContactLocation::default(),
            product: None,
            channel: Some("email".into()),
            transcript: "USER: hi again".into(),
            categorization: None,
        };
        r.apply_enrichment(&patch, Utc::now());
        assert_eq!(r.country.as_deref(), Some("Germany"));
        assert_eq!(r.region.as_deref(), Some("Bavaria"));
        assert_eq!(r.product.as_deref(), Some("Billing Suite"));
        assert_eq!(r.channel.as_deref(), Some("email"));
        assert_eq!(r.transcript.as_deref(), Some("USER: hi again"));
    }

    #[test]
    fn test_empty_categorization_still_counts_as_categorized() {
        let mut r = record();
        r.transcript = Some("USER: hi".into());
        r.apply_categorization(&CategorizationResult::unavailable());
        assert_eq!(r.lifecycle(), LifecycleState::Categorized);
        assert_eq!(r.main_topics, Some(vec![]));
        assert!(!r.needs_categorization());
    }

    #[test]
    fn test_clear_enrichment_keeps_id_and_created_at() {
        let mut r = record();
        let created = r.created_at;
        r.transcript = Some("USER: hi".into());
        r.sentiment_end = Some(Sentiment::Positive);
        r.main_topics = Some(vec!["Billing".into()]);
        r.clear_enrichment();
        assert_eq!(r.id, "c1");
        assert_eq!(r.created_at, created);
        assert!(r.transcript.is_none());
        assert!(r.main_topics.is_none());
        assert!(r.sentiment_end.is_none());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_value(record()).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("mainTopics").is_some());
    }
}
