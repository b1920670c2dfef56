//! AI categorization of support transcripts.
//!
//! Flow per transcript:
//!   1. Build the fixed system prompt plus a user prompt carrying the
//!      transcript (and the known taxonomy, when there is one)
//!   2. Call the chat-completions endpoint
//!   3. Strip code fences and decode the JSON object
//!   4. Canonicalise topic labels against the taxonomy
//!
//! A response that does not decode yields `CategorizationOutcome::ParseFailed`
//! instead of an error, so one bad completion never aborts a batch.

use std::sync::Arc;

use secrecy::SecretString;

use crate::{
    config::Config,
    error::AppResult,
    models::{CategorizationOutcome, CategorizationResult, RawCategorization},
    services::{
        ApiClient, ApiResponse, ChatCompletionRequest, ChatCompletionResponse, TopicCache,
        TopicTaxonomy,
    },
};

/// Classifies transcripts through the AI service
pub struct CategorizationService {
    client: ApiClient,
    model: String,
    max_tokens: u32,
    topics: Arc<TopicCache>,
}

impl CategorizationService {
    pub fn new(client: ApiClient, model: impl Into<String>, max_tokens: u32, topics: Arc<TopicCache>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens,
            topics,
        }
    }

    pub fn from_config(config: &Config, topics: Arc<TopicCache>) -> AppResult<Self> {
        let key = config.require_ai_key()?;
        let client = ApiClient::new(
            &config.ai_base_url,
            SecretString::from(key.to_string()),
            config.request_timeout(),
        )?;
        Ok(Self::new(client, config.ai_model.clone(), config.ai_max_tokens, topics))
    }

    /// Build the system prompt for categorization.
    pub fn build_system_prompt() -> String {
        r#"You are a customer-support analyst. Given a support conversation transcript, classify it.

Return ONLY valid JSON with this exact schema:
{
  "main_categories": ["Main category", "..."],
  "sub_categories": ["Sub category", "..."],
  "sentiment_start": "Positive | Neutral | Negative",
  "sentiment_end": "Positive | Neutral | Negative",
  "resolution": "Yes | No | Pending",
  "feedbacks": ["Concrete product or service suggestion", "..."]
}

Guidelines:
- A conversation may belong to several categories, or to none (use empty lists)
- main_categories and sub_categories are independent lists
- sentiment_start describes the customer at the beginning, sentiment_end at the end
- resolution is Yes when the issue was solved, No when it was not, Pending when still open
- feedbacks only contains suggestions the customer actually expressed"#
            .to_string()
    }

    /// Build the user prompt for one transcript.
    pub fn build_user_prompt(transcript: &str, taxonomy: &TopicTaxonomy) -> String {
        if taxonomy.is_empty() {
            format!("Categorize this conversation:\n\n{transcript}")
        } else {
            format!(
                "Known categories (main: sub, ...):\n{}\n\nPrefer these labels when they fit.\n\nCategorize this conversation:\n\n{transcript}",
                taxonomy.prompt_section()
            )
        }
    }

    /// Decode a raw completion into a categorization outcome.
    pub fn parse_response(raw: &str) -> CategorizationOutcome {
        let cleaned = strip_code_fences(raw);

        let parsed = serde_json::from_str::<RawCategorization>(cleaned).or_else(|first_err| {
            // Models sometimes wrap the object in prose.
            match (cleaned.find('{'), cleaned.rfind('}')) {
                (Some(start), Some(end)) if end > start => {
                    serde_json::from_str::<RawCategorization>(&cleaned[start..=end])
                }
                _ => Err(first_err),
            }
        });

        match parsed {
            Ok(raw_result) => CategorizationOutcome::Categorized(raw_result.into()),
            Err(_) => CategorizationOutcome::ParseFailed {
                raw: raw.to_string(),
            },
        }
    }

    /// Rewrite labels to their known spelling; unknown labels pass through.
    pub fn canonicalize(mut result: CategorizationResult, taxonomy: &TopicTaxonomy) -> CategorizationResult {
        if taxonomy.is_empty() {
            return result;
        }
        result.main_topics = dedup_labels(result.main_topics.iter().map(|label| {
            taxonomy
                .canonical_main(label)
                .map(str::to_string)
                .unwrap_or_else(|| label.clone())
        }));
        result.sub_topics = dedup_labels(result.sub_topics.iter().map(|label| {
            taxonomy
                .canonical_sub(label)
                .map(str::to_string)
                .unwrap_or_else(|| label.clone())
        }));
        result
    }

    /// Categorize one transcript.
    pub async fn categorize(&self, transcript: &str) -> ApiResponse<CategorizationOutcome> {
        let taxonomy = self.topics.get().await;
        let request = ChatCompletionRequest::new(
            &self.model,
            self.max_tokens,
            &Self::build_system_prompt(),
            &Self::build_user_prompt(transcript, &taxonomy),
        );

        let response: ApiResponse<ChatCompletionResponse> =
            self.client.post_json("chat/completions", &request).await;

        response.map(|completion| {
            let text = completion.first_text().unwrap_or_default();
            match Self::parse_response(text) {
                CategorizationOutcome::Categorized(result) => {
                    CategorizationOutcome::Categorized(Self::canonicalize(result, &taxonomy))
                }
                failed => {
                    tracing::warn!("AI response was not valid categorization JSON; degrading");
                    failed
                }
            }
        })
    }
}

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

fn dedup_labels(labels: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        if !out.contains(&label) {
            out.push(label);
        }
    }
    out
}
