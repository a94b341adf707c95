//! Appraisal: infer the user's intent and affect from the input text.

use crate::cognition::{parser, prompt};
use crate::config::SupporterCfg;
use crate::gateway::CompletionGateway;
use crate::identity::affect;
use crate::types::AffectVector;

const DEFAULT_INTENT: &str = "conversation";
const DEFAULT_SENTIMENT: &str = "calm";

#[derive(Debug, Clone, PartialEq)]
pub struct Appraisal {
    pub intent: String,
    pub sentiment: String,
    pub user_affect: AffectVector,
}

impl Default for Appraisal {
    fn default() -> Self {
        Self {
            intent: DEFAULT_INTENT.into(),
            sentiment: DEFAULT_SENTIMENT.into(),
            user_affect: AffectVector::default(),
        }
    }
}

/// Appraise one input. Completion failure degrades to a neutral appraisal.
pub async fn appraise(gateway: &CompletionGateway, cfg: &SupporterCfg, input: &str) -> Appraisal {
    let messages = prompt::appraisal(&cfg.reply_language, input);
    let raw = match gateway.complete(messages, cfg.temp_appraisal, None).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "appraisal failed, assuming neutral input");
            return Appraisal::default();
        }
    };
    from_raw(&raw)
}

fn from_raw(raw: &str) -> Appraisal {
    let parsed = parser::parse(raw);
    Appraisal {
        intent: parsed.str_field("intent").unwrap_or(DEFAULT_INTENT).to_string(),
        sentiment: parsed.str_field("sentiment").unwrap_or(DEFAULT_SENTIMENT).to_string(),
        user_affect: affect::vector_from_fields(parsed.fields()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fields_and_clamps() {
        let a = from_raw(r#"{"intent": "greeting", "sentiment": "happy", "p": 3, "a": "-0.2"}"#);
        assert_eq!(a.intent, "greeting");
        assert_eq!(a.sentiment, "happy");
        assert_eq!(a.user_affect, AffectVector { p: 1.0, a: -0.2, d: 0.0 });
    }

    #[test]
    fn prose_falls_back_to_defaults() {
        let a = from_raw("I think they are greeting you.");
        assert_eq!(a, Appraisal::default());
    }
}
