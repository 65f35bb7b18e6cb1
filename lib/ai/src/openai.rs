//! OpenAI-compatible `/chat/completions` backend.
//!
//! Works against OpenRouter, OpenAI and any server speaking the same JSON.

use crate::backend::{CompletionBackend, CompletionRequest, CompletionResponse, TokenUsage};
use crate::error::LlmError;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Error bodies longer than this are cut before they reach logs.
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Deserialize)]
struct ChatCompletionBody {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// HTTP backend for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiCompatibleBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleBackend {
    /// Creates a backend for the API rooted at `base_url`
    /// (e.g. `https://openrouter.ai/api/v1`).
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is empty or the HTTP client cannot
    /// be built.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, LlmError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(LlmError::InvalidConfig {
                reason: "base URL is empty".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::InvalidConfig {
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    /// Returns the full completions URL.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Returns true if requests carry a bearer token.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl std::fmt::Debug for OpenAiCompatibleBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleBackend")
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.has_api_key())
            .finish()
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatibleBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "sending completion request"
        );

        let mut builder = self.http.post(self.endpoint()).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::RequestFailed {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate(body.trim(), MAX_ERROR_BODY_CHARS),
            });
        }

        let body = response.text().await.map_err(|e| LlmError::RequestFailed {
            reason: e.to_string(),
        })?;
        let parsed: ChatCompletionBody =
            serde_json::from_str(&body).map_err(|e| LlmError::ResponseParseFailed {
                reason: e.to_string(),
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::ResponseParseFailed {
                reason: "response contained no message content".to_string(),
            })?;

        Ok(CompletionResponse {
            content,
            usage: parsed.usage.map(|usage| TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            }),
        })
    }

    fn name(&self) -> &str {
        "openai_compatible"
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChatMessage;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest::new("test-model", 256, 0.7)
            .with_message(ChatMessage::system("sys"))
            .with_message(ChatMessage::user("hello"))
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "id": "gen-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
        })
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let backend =
            OpenAiCompatibleBackend::new("https://openrouter.ai/api/v1/", None).expect("backend");
        assert_eq!(
            backend.endpoint(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[test]
    fn empty_base_url_is_rejected() {
        let err = OpenAiCompatibleBackend::new("", None).unwrap_err();
        assert!(matches!(err, LlmError::InvalidConfig { .. }));
    }

    #[test]
    fn blank_api_key_is_ignored() {
        let backend =
            OpenAiCompatibleBackend::new("http://localhost", Some("  ".to_string())).expect("backend");
        assert!(!backend.has_api_key());
    }

    #[test]
    fn debug_does_not_leak_key() {
        let backend = OpenAiCompatibleBackend::new("http://localhost", Some("sk-secret".to_string()))
            .expect("backend");
        assert!(!format!("{backend:?}").contains("sk-secret"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("привет", 3), "при...");
    }

    #[tokio::test]
    async fn posts_chat_completion_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "max_tokens": 256,
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hi there")))
            .expect(1)
            .mount(&server)
            .await;

        let backend =
            OpenAiCompatibleBackend::new(server.uri(), Some("sk-test".to_string())).expect("backend");
        let response = backend.complete(&request()).await.expect("completion");

        assert_eq!(response.content, "Hi there");
        assert_eq!(
            response.usage,
            Some(TokenUsage {
                prompt_tokens: 12,
                completion_tokens: 5
            })
        );
    }

    #[tokio::test]
    async fn missing_usage_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .mount(&server)
            .await;

        let backend = OpenAiCompatibleBackend::new(server.uri(), None).expect("backend");
        let response = backend.complete(&request()).await.expect("completion");
        assert_eq!(response.content, "ok");
        assert!(response.usage.is_none());
    }

    #[tokio::test]
    async fn error_status_maps_to_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let backend = OpenAiCompatibleBackend::new(server.uri(), None).expect("backend");
        let err = backend.complete(&request()).await.unwrap_err();
        assert_eq!(
            err,
            LlmError::Status {
                status: 429,
                body: "rate limited".to_string()
            }
        );
    }

    #[tokio::test]
    async fn empty_choices_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let backend = OpenAiCompatibleBackend::new(server.uri(), None).expect("backend");
        let err = backend.complete(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::ResponseParseFailed { .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let backend = OpenAiCompatibleBackend::new(server.uri(), None).expect("backend");
        let err = backend.complete(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::ResponseParseFailed { .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_request_failure() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("local addr").port()
        };

        let backend =
            OpenAiCompatibleBackend::new(format!("http://127.0.0.1:{port}"), None).expect("backend");
        let err = backend.complete(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed { .. }));
    }
}
