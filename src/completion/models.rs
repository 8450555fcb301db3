//! Wire types of the foundation models completion API

use crate::context::{Role, Turn};
use serde::{Deserialize, Deserializer, Serialize};

/// One message of the request envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            text: turn.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions {
    pub stream: bool,
    pub temperature: f32,
    /// Sent as a string, as the API expects int64 values
    pub max_tokens: String,
}

/// Request envelope for `/completion`, `/completionAsync` and `/tokenizeCompletion`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub model_uri: String,
    pub completion_options: CompletionOptions,
    pub messages: Vec<Message>,
}

impl CompletionRequest {
    /// Build an envelope: system turn first, then the stored context
    pub fn new(
        model_uri: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
        system_prompt: &str,
        context: &[Turn],
    ) -> Self {
        let mut messages = Vec::with_capacity(context.len() + 1);
        messages.push(Message {
            role: Role::System,
            text: system_prompt.to_string(),
        });
        messages.extend(context.iter().map(Message::from));

        Self {
            model_uri: model_uri.into(),
            completion_options: CompletionOptions {
                stream: false,
                temperature,
                max_tokens: max_tokens.to_string(),
            },
            messages,
        }
    }
}

/// `{ "result": { ... } }` body of a synchronous completion
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    pub result: CompletionResult,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub alternatives: Vec<Alternative>,
    pub usage: Usage,
    #[serde(default)]
    pub model_version: Option<String>,
}

impl CompletionResult {
    /// First alternative text and the completion token count
    pub fn answer(&self) -> Option<(&str, u64)> {
        self.alternatives
            .first()
            .map(|alt| (alt.message.text.as_str(), self.usage.completion_tokens))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Alternative {
    pub message: AlternativeMessage,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlternativeMessage {
    #[serde(default)]
    pub role: Option<String>,
    pub text: String,
}

/// Token usage; the API encodes int64 counters as strings
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub input_text_tokens: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub completion_tokens: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_tokens: u64,
}

/// Body of `/completionAsync`
#[derive(Debug, Clone, Deserialize)]
pub struct OperationAccepted {
    pub id: String,
}

/// Body of `GET /operations/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct OperationStatus {
    #[serde(default)]
    pub id: Option<String>,
    pub done: bool,
    #[serde(default)]
    pub response: Option<CompletionResult>,
    #[serde(default)]
    pub error: Option<OperationError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Body of `/tokenize` and `/tokenizeCompletion`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenizeResponse {
    pub tokens: Vec<serde_json::Value>,
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_envelope_shape() {
        let context = vec![Turn::user("Hi", 1), Turn::assistant("Hello!", 2)];
        let request = CompletionRequest::new("gpt://f/yandexgpt-lite/latest", 0.3, 500, "Be nice", &context);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "modelUri": "gpt://f/yandexgpt-lite/latest",
                "completionOptions": {"stream": false, "temperature": 0.3f32, "maxTokens": "500"},
                "messages": [
                    {"role": "system", "text": "Be nice"},
                    {"role": "user", "text": "Hi"},
                    {"role": "assistant", "text": "Hello!"}
                ]
            })
        );
    }

    #[test]
    fn test_usage_accepts_strings_and_numbers() {
        let from_strings: Usage = serde_json::from_value(json!({
            "inputTextTokens": "19", "completionTokens": "7", "totalTokens": "26"
        }))
        .unwrap();
        assert_eq!(from_strings.completion_tokens, 7);
        assert_eq!(from_strings.total_tokens, 26);

        let from_numbers: Usage = serde_json::from_value(json!({"completionTokens": 11})).unwrap();
        assert_eq!(from_numbers.completion_tokens, 11);
        assert_eq!(from_numbers.input_text_tokens, 0);
    }

    #[test]
    fn test_missing_alternatives_is_rejected() {
        let parsed = serde_json::from_value::<CompletionResponse>(json!({
            "result": {"usage": {"completionTokens": "3"}}
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_operation_status_pending_and_done() {
        let pending: OperationStatus = serde_json::from_value(json!({"id": "op-1", "done": false})).unwrap();
        assert!(!pending.done);
        assert!(pending.response.is_none());

        let done: OperationStatus = serde_json::from_value(json!({
            "id": "op-1",
            "done": true,
            "response": {
                "alternatives": [{"message": {"role": "assistant", "text": "Done"}, "status": "ALTERNATIVE_STATUS_FINAL"}],
                "usage": {"inputTextTokens": "10", "completionTokens": "1", "totalTokens": "11"},
                "modelVersion": "23.10.2024"
            }
        }))
        .unwrap();
        assert_eq!(done.response.unwrap().answer(), Some(("Done", 1)));
    }
}
