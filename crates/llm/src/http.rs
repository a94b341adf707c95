//! HTTP completion provider for OpenAI-compatible serving backends.
//!
//! Targets vLLM-style servers: besides the standard chat-completions body it
//! forwards `repetition_penalty` and a `lora_request` naming a persona adapter.

use crate::provider::{
    AdapterRef, CompletionRequest, CompletionResponse, LlmError, LlmProvider, Role,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Default base URL of a locally served vLLM instance.
const DEFAULT_BASE_URL: &str = "http://localhost:8000/v1";
/// Placeholder key accepted by unauthenticated vLLM deployments.
const DEFAULT_API_KEY: &str = "EMPTY";

// ── OpenAI-compatible request/response types ──

#[derive(Debug, Serialize)]
struct OaiRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    temperature: f32,
    presence_penalty: f32,
    frequency_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    repetition_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lora_request: Option<LoraRequest>,
}

#[derive(Debug, Serialize)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct LoraRequest {
    lora_name: String,
    lora_path: String,
}

impl From<&AdapterRef> for LoraRequest {
    fn from(adapter: &AdapterRef) -> Self {
        Self {
            lora_name: adapter.name.clone(),
            lora_path: adapter.path.clone(),
        }
    }
}

#[derive(Deserialize)]
struct OaiResponse {
    choices: Vec<OaiChoice>,
    usage: Option<OaiUsage>,
}

#[derive(Deserialize)]
struct OaiChoice {
    message: OaiChoiceMessage,
}

#[derive(Deserialize)]
struct OaiChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OaiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// ── Provider ──

/// HTTP-based completion provider speaking the OpenAI chat-completions protocol.
#[derive(Debug)]
pub struct HttpProvider {
    model: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpProvider {
    /// Build from model name + API key + optional base URL override.
    pub fn new(model: String, api_key: String, base_url: Option<String>) -> Self {
        let base = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        Self {
            model,
            client: reqwest::Client::new(),
            base_url: base.trim_end_matches('/').to_owned(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body(&self, request: &CompletionRequest) -> OaiRequest {
        OaiRequest {
            model: self.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| OaiMessage {
                    role: role_str(&m.role),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            presence_penalty: request.presence_penalty,
            frequency_penalty: request.frequency_penalty,
            repetition_penalty: request.repetition_penalty,
            lora_request: request.adapter.as_ref().map(LoraRequest::from),
        }
    }

    async fn complete_openai(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let body = self.build_body(&request);

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LlmError::Unavailable(e.to_string())
                } else {
                    LlmError::RequestFailed(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(check_error(status, text));
        }

        let api: OaiResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let content = api
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let (input_tokens, output_tokens) = api
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        tracing::trace!(
            model = %self.model,
            input_tokens,
            output_tokens,
            "completion received"
        );

        Ok(CompletionResponse {
            content,
            input_tokens,
            output_tokens,
        })
    }
}

pub(crate) fn role_str(role: &Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Parse error response, returning RateLimited for 429.
pub(crate) fn check_error(status: reqwest::StatusCode, body: String) -> LlmError {
    if status.as_u16() == 429 {
        LlmError::RateLimited
    } else if status.is_server_error() {
        LlmError::Unavailable(format!("{status}: {body}"))
    } else {
        LlmError::RequestFailed(format!("{status}: {body}"))
    }
}

impl LlmProvider for HttpProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        Box::pin(self.complete_openai(request))
    }
}

/// Build an HttpProvider from environment variables.
/// Reads `SUPPORTER_LLM_MODEL` and `SUPPORTER_LLM_BASE_URL`, optionally
/// `SUPPORTER_LLM_API_KEY` (defaults to `EMPTY`).
/// Returns `None` if model or base URL is not set.
pub fn from_env() -> Option<HttpProvider> {
    let model = std::env::var("SUPPORTER_LLM_MODEL").ok()?;
    let base_url = std::env::var("SUPPORTER_LLM_BASE_URL").ok()?;
    let api_key =
        std::env::var("SUPPORTER_LLM_API_KEY").unwrap_or_else(|_| DEFAULT_API_KEY.to_owned());
    Some(HttpProvider::new(model, api_key, Some(base_url)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatMessage;

    #[test]
    fn default_endpoint() {
        let p = HttpProvider::new("qwen".into(), "EMPTY".into(), None);
        assert_eq!(p.endpoint(), "http://localhost:8000/v1/chat/completions");
        assert_eq!(p.name(), "openai-compatible");
    }

    #[test]
    fn custom_base_url_trims_trailing_slash() {
        let p = HttpProvider::new(
            "qwen".into(),
            "EMPTY".into(),
            Some("http://vllm.internal:8000/v1/".into()),
        );
        assert_eq!(p.endpoint(), "http://vllm.internal:8000/v1/chat/completions");
    }

    #[test]
    fn body_carries_penalties_and_adapter() {
        let p = HttpProvider::new("qwen".into(), "EMPTY".into(), None);
        let mut req = CompletionRequest::new(
            vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
            0.7,
        );
        req.presence_penalty = 0.6;
        req.frequency_penalty = 0.5;
        req.repetition_penalty = Some(1.1);
        req.adapter = Some(AdapterRef {
            name: "adapter_warm".into(),
            path: "/app/loras/adapter_warm".into(),
        });

        let body = serde_json::to_value(p.build_body(&req)).unwrap();
        assert_eq!(body["model"], "qwen");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!((body["presence_penalty"].as_f64().unwrap() - 0.6).abs() < 1e-6);
        assert!((body["repetition_penalty"].as_f64().unwrap() - 1.1).abs() < 1e-6);
        assert_eq!(body["lora_request"]["lora_name"], "adapter_warm");
        assert_eq!(body["lora_request"]["lora_path"], "/app/loras/adapter_warm");
    }

    #[test]
    fn body_omits_optional_extras() {
        let p = HttpProvider::new("qwen".into(), "EMPTY".into(), None);
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")], 0.1);
        let body = serde_json::to_value(p.build_body(&req)).unwrap();
        assert!(body.get("lora_request").is_none());
        assert!(body.get("repetition_penalty").is_none());
    }

    #[test]
    fn rate_limit_and_server_errors_are_classified() {
        assert!(matches!(
            check_error(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()),
            LlmError::RateLimited
        ));
        assert!(matches!(
            check_error(reqwest::StatusCode::BAD_GATEWAY, "down".into()),
            LlmError::Unavailable(_)
        ));
        assert!(matches!(
            check_error(reqwest::StatusCode::BAD_REQUEST, "bad".into()),
            LlmError::RequestFailed(_)
        ));
    }
}
