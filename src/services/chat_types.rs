//! Request/response types for the chat-completions API used by the categorizer.

use serde::{Deserialize, Serialize};

/// Request body for a chat completion.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatCompletionMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// A single message in the chat.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCompletionMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// Response from the chat-completions endpoint.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    pub usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionChoice {
    pub message: ChatCompletionMessage,
}

/// Token usage statistics.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl ChatCompletionRequest {
    /// Create a request with a system instruction and one user message.
    pub fn new(model: &str, max_tokens: u32, system: &str, user_message: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                ChatCompletionMessage {
                    role: "system".to_string(),
                    content: Some(system.to_string()),
                },
                ChatCompletionMessage {
                    role: "user".to_string(),
                    content: Some(user_message.to_string()),
                },
            ],
            max_tokens: Some(max_tokens),
            temperature: Some(0.0),
        }
    }
}

impl ChatCompletionResponse {
    /// Text of the first choice.
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_new_has_system_then_user() {
        let req = ChatCompletionRequest::new("gpt-4o-mini", 512, "sys", "hello");
        assert_eq!(req.model, "gpt-4o-mini");
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, "system");
        assert_eq!(req.messages[1].role, "user");
        assert_eq!(req.messages[1].content.as_deref(), Some("hello"));
    }

    #[test]
    fn test_request_serialization() {
        let req = ChatCompletionRequest::new("m", 256, "s", "u");
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"model\":\"m\""));
        assert!(json.contains("\"max_tokens\":256"));
    }

    #[test]
    fn test_response_first_text() {
        let resp: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"{}"}}],
                "usage":{"prompt_tokens":10,"completion_tokens":2}}"#,
        )
        .unwrap();
        assert_eq!(resp.first_text(), Some("{}"));
        assert_eq!(resp.usage.unwrap().prompt_tokens, 10);
    }

    #[test]
    fn test_response_without_choices() {
        let resp: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(resp.first_text(), None);
    }
}
