//! Completion gateway: the only path from the pipeline to the generation service.
//!
//! Every call gets the configured penalty terms, an optional persona adapter,
//! a per-call timeout and a small number of transport retries. Replies that
//! leak characters of the wrong script are retried with identical inputs and,
//! when every attempt leaks, the offending characters are stripped from the
//! last reply instead of failing the turn.

use std::sync::Arc;
use std::time::Duration;

use supporter_llm::provider::{AdapterRef, ChatMessage, CompletionRequest, LlmError, LlmProvider};

use crate::config::SupporterCfg;
use crate::types::Persona;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Per-call parameters shared by every completion the gateway issues.
#[derive(Debug, Clone)]
pub struct GatewayPolicy {
    pub timeout: Duration,
    /// Retries after the first failed transport attempt.
    pub transport_retries: u32,
    /// Total attempts before wrong-script characters are stripped.
    pub language_attempts: u32,
    pub retry_backoff: Duration,
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub repetition_penalty: f32,
    /// `None` disables persona adapters.
    pub adapters: Option<AdapterConvention>,
}

impl GatewayPolicy {
    pub fn from_cfg(cfg: &SupporterCfg) -> Self {
        Self {
            timeout: cfg.llm_timeout(),
            transport_retries: cfg.llm_transport_retries,
            language_attempts: cfg.llm_language_attempts.max(1),
            retry_backoff: Duration::from_millis(250),
            max_tokens: cfg.llm_max_tokens,
            presence_penalty: cfg.presence_penalty,
            frequency_penalty: cfg.frequency_penalty,
            repetition_penalty: cfg.repetition_penalty,
            adapters: cfg.persona_adapters.then(|| AdapterConvention {
                prefix: cfg.adapter_prefix.clone(),
                root: cfg.adapter_root.clone(),
            }),
        }
    }
}

/// Naming convention for fine-tuned persona adapters on the serving host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConvention {
    pub prefix: String,
    pub root: String,
}

impl AdapterConvention {
    /// Deterministic adapter reference for a persona.
    pub fn resolve(&self, persona: Persona) -> AdapterRef {
        let name = format!("{}{}", self.prefix, persona.as_str());
        let path = format!("{}/{}", self.root.trim_end_matches('/'), name);
        AdapterRef { name, path }
    }
}

pub struct CompletionGateway {
    provider: Arc<dyn LlmProvider>,
    policy: GatewayPolicy,
}

impl CompletionGateway {
    pub fn new(provider: Arc<dyn LlmProvider>, policy: GatewayPolicy) -> Self {
        Self { provider, policy }
    }

    /// Issue one completion. `persona` selects the persona adapter when adapters are enabled.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        persona: Option<Persona>,
    ) -> Result<String, GatewayError> {
        let request = self.build_request(messages, temperature, persona);
        let attempts = self.policy.language_attempts.max(1);

        let mut last = String::new();
        for attempt in 1..=attempts {
            last = self.call_with_retries(&request).await?;
            if !has_foreign_script(&last) {
                return Ok(last);
            }
            tracing::warn!(
                attempt,
                attempts,
                provider = self.provider.name(),
                "wrong-script characters in completion, retrying"
            );
        }

        tracing::warn!(attempts, "wrong-script leak persisted, stripping offending characters");
        Ok(strip_foreign_script(&last))
    }

    fn build_request(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        persona: Option<Persona>,
    ) -> CompletionRequest {
        CompletionRequest {
            messages,
            max_tokens: self.policy.max_tokens,
            temperature,
            presence_penalty: self.policy.presence_penalty,
            frequency_penalty: self.policy.frequency_penalty,
            repetition_penalty: Some(self.policy.repetition_penalty),
            adapter: match (&self.policy.adapters, persona) {
                (Some(convention), Some(p)) => Some(convention.resolve(p)),
                _ => None,
            },
        }
    }

    /// One logical call: per-attempt timeout plus transport retries.
    async fn call_with_retries(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let mut attempt = 0u32;
        loop {
            let result = tokio::time::timeout(self.policy.timeout, self.provider.complete(request.clone())).await;
            let err = match result {
                Ok(Ok(response)) => return Ok(response.content),
                Ok(Err(e)) => GatewayError::Llm(e),
                Err(_) => GatewayError::Timeout(self.policy.timeout),
            };

            if attempt >= self.policy.transport_retries {
                tracing::warn!(error = %err, attempts = attempt + 1, "completion failed, retries exhausted");
                return Err(err);
            }
            attempt += 1;
            tracing::warn!(error = %err, attempt, "completion failed, retrying");
            if !self.policy.retry_backoff.is_zero() {
                tokio::time::sleep(self.policy.retry_backoff * attempt).await;
            }
        }
    }
}

/// Han ideographs: the script the reply language must never contain.
fn is_foreign_script(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}')
}

pub fn has_foreign_script(text: &str) -> bool {
    text.chars().any(is_foreign_script)
}

pub fn strip_foreign_script(text: &str) -> String {
    text.chars().filter(|c| !is_foreign_script(*c)).collect()
}
