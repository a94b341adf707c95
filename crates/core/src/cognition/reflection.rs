//! Self-check: does the reply fit the persona and its current mood?

use crate::cognition::{parser, prompt};
use crate::config::SupporterCfg;
use crate::gateway::CompletionGateway;
use crate::types::{AffectVector, Persona, StructuredReply};

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub valid: bool,
    /// Short reason, present only when invalid.
    pub critique: Option<String>,
}

impl Verdict {
    fn valid() -> Self {
        Self { valid: true, critique: None }
    }
}

pub struct CheckInput<'a> {
    pub persona: Persona,
    pub affect: AffectVector,
    pub input: &'a str,
    pub reply: &'a StructuredReply,
}

/// Judge a reply. An empty reply is invalid without a call; a failed or
/// unreadable judgement counts as valid.
pub async fn check(gateway: &CompletionGateway, cfg: &SupporterCfg, req: CheckInput<'_>) -> Verdict {
    if req.reply.text.trim().is_empty() {
        return Verdict {
            valid: false,
            critique: Some("the reply was empty".into()),
        };
    }

    let messages = prompt::reflection(
        &cfg.reply_language,
        req.persona,
        req.affect,
        req.input,
        &req.reply.text,
    );
    match gateway.complete(messages, cfg.temp_reflection, None).await {
        Ok(raw) => from_raw(&raw),
        Err(e) => {
            tracing::warn!(error = %e, "self-check failed, accepting reply");
            Verdict::valid()
        }
    }
}

fn from_raw(raw: &str) -> Verdict {
    let parsed = parser::parse(raw);
    match parsed.bool_field("valid") {
        Some(false) => Verdict {
            valid: false,
            critique: Some(
                parsed
                    .str_field("reason")
                    .unwrap_or("did not fit the persona")
                    .to_string(),
            ),
        },
        _ => Verdict::valid(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayPolicy;
    use std::sync::Arc;
    use std::time::Duration;
    use supporter_llm::provider::ScriptedProvider;

    #[test]
    fn reads_invalid_with_reason() {
        let v = from_raw(r#"{"valid": false, "reason": "too formal"}"#);
        assert!(!v.valid);
        assert_eq!(v.critique.as_deref(), Some("too formal"));
    }

    #[test]
    fn unreadable_counts_as_valid() {
        assert!(from_raw("looks fine to me").valid);
        assert!(from_raw(r#"{"valid": "perhaps"}"#).valid);
    }

    #[tokio::test]
    async fn empty_reply_is_invalid_without_a_call() {
        let provider = Arc::new(ScriptedProvider::replies([r#"{"valid": true}"#]));
        let gw = CompletionGateway::new(
            provider.clone(),
            GatewayPolicy {
                retry_backoff: Duration::ZERO,
                ..GatewayPolicy::from_cfg(&SupporterCfg::default())
            },
        );
        let reply = StructuredReply { text: "  ".into(), ..StructuredReply::apology(Persona::Warm) };
        let v = check(
            &gw,
            &SupporterCfg::default(),
            CheckInput { persona: Persona::Warm, affect: AffectVector::default(), input: "hi", reply: &reply },
        )
        .await;
        assert!(!v.valid);
        assert_eq!(provider.calls(), 0);
    }
}
