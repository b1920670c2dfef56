use serde::{Deserialize, Deserializer, Serialize};

use super::{ResolutionOutcome, Sentiment};

/// Structured labels the AI service assigns to one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CategorizationResult {
    pub main_topics: Vec<String>,
    pub sub_topics: Vec<String>,
    pub sentiment_start: Sentiment,
    pub sentiment_end: Sentiment,
    pub resolution_outcome: ResolutionOutcome,
    pub feedbacks: Vec<String>,
}

impl CategorizationResult {
    /// Result used when the AI response could not be decoded.
    pub fn unavailable() -> Self {
        Self::default()
    }
}

/// One main-topic/sub-topic pair of the known taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMapping {
    pub main_topic: String,
    pub sub_topic: Option<String>,
}

/// Outcome of decoding an AI response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategorizationOutcome {
    Categorized(CategorizationResult),
    ParseFailed { raw: String },
}

impl CategorizationOutcome {
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, CategorizationOutcome::ParseFailed { .. })
    }

    /// Collapse to a storable result, degrading parse failures.
    pub fn into_result(self) -> CategorizationResult {
        match self {
            CategorizationOutcome::Categorized(result) => result,
            CategorizationOutcome::ParseFailed { .. } => CategorizationResult::unavailable(),
        }
    }
}

/// Wire shape of the JSON object the model is asked to return.
///
/// Field aliases cover the spellings the model produces in practice.
#[derive(Debug, Deserialize)]
pub struct RawCategorization {
    #[serde(
        default,
        alias = "main_categories",
        alias = "mainCategories",
        alias = "mainTopics",
        alias = "main_topic"
    )]
    pub main_topics: Option<Vec<String>>,

    #[serde(
        default,
        alias = "sub_categories",
        alias = "subCategories",
        alias = "subTopics",
        alias = "sub_topic"
    )]
    pub sub_topics: Option<Vec<String>>,

    #[serde(default, alias = "sentimentStart", alias = "start_sentiment")]
    pub sentiment_start: Option<String>,

    #[serde(default, alias = "sentimentEnd", alias = "end_sentiment")]
    pub sentiment_end: Option<String>,

    #[serde(
        default,
        alias = "resolutionOutcome",
        alias = "resolved",
        alias = "resolution",
        deserialize_with = "string_or_bool"
    )]
    pub resolution_outcome: Option<String>,

    #[serde(default, alias = "feedback", alias = "suggestions")]
    pub feedbacks: Option<Vec<String>>,
}

/// Accept `"yes"` as well as `true`; other JSON types read as absent.
fn string_or_bool<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Bool(true)) => Some("yes".to_string()),
        Some(serde_json::Value::Bool(false)) => Some("no".to_string()),
        _ => None,
    })
}

impl From<RawCategorization> for CategorizationResult {
    fn from(raw: RawCategorization) -> Self {
        let clean = |labels: Option<Vec<String>>| -> Vec<String> {
            labels
                .unwrap_or_default()
                .into_iter()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect()
        };

        Self {
            main_topics: clean(raw.main_topics),
            sub_topics: clean(raw.sub_topics),
            sentiment_start: raw
                .sentiment_start
                .as_deref()
                .map(Sentiment::parse)
                .unwrap_or_default(),
            sentiment_end: raw
                .sentiment_end
                .as_deref()
                .map(Sentiment::parse)
                .unwrap_or_default(),
            resolution_outcome: raw
                .resolution_outcome
                .as_deref()
                .map(ResolutionOutcome::parse)
                .unwrap_or_default(),
            feedbacks: clean(raw.feedbacks),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_result_is_empty_and_pending() {
        let r = CategorizationResult::unavailable();
        assert!(r.main_topics.is_empty());
        assert!(r.sub_topics.is_empty());
        assert_eq!(r.sentiment_start, Sentiment::Unknown);
        assert_eq!(r.resolution_outcome, ResolutionOutcome::Pending);
    }

    #[test]
    fn test_parse_failed_degrades_to_unavailable() {
        let outcome = CategorizationOutcome::ParseFailed { raw: "nope".into() };
        assert!(outcome.is_parse_failure());
        assert_eq!(outcome.into_result(), CategorizationResult::unavailable());
    }

    #[test]
    fn test_raw_aliases_map_to_result() {
        let raw: RawCategorization = serde_json::from_str(
            r#"{
                "main_categories": ["Billing", " "],
                "sub_categories": ["Refund"],
                "sentiment_start": "negative",
                "sentiment_end": "Positive",
                "resolution": "yes",
                "feedback": ["Faster refunds"]
            }"#,
        )
        .unwrap();
        let result = CategorizationResult::from(raw);
        assert_eq!(result.main_topics, vec!["Billing"]);
        assert_eq!(result.sub_topics, vec!["Refund"]);
        assert_eq!(result.sentiment_start, Sentiment::Negative);
        assert_eq!(result.sentiment_end, Sentiment::Positive);
        assert_eq!(result.resolution_outcome, ResolutionOutcome::Yes);
        assert_eq!(result.feedbacks, vec!["Faster refunds"]);
    }

    #[test]
    fn test_boolean_resolved_is_accepted() {
        let raw: RawCategorization =
            serde_json::from_str(r#"{"main_categories": ["Billing"], "resolved": true}"#).unwrap();
        let result = CategorizationResult::from(raw);
        assert_eq!(result.main_topics, vec!["Billing"]);
        assert_eq!(result.resolution_outcome, ResolutionOutcome::Yes);

        let raw: RawCategorization = serde_json::from_str(r#"{"resolved": false}"#).unwrap();
        assert_eq!(CategorizationResult::from(raw).resolution_outcome, ResolutionOutcome::No);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let raw: RawCategorization = serde_json::from_str("{}").unwrap();
        let result = CategorizationResult::from(raw);
        assert_eq!(result, CategorizationResult::unavailable());
    }
}
