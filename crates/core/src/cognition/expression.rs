//! Reply generation: persona- and mood-conditioned structured reply.

use crate::cognition::parser;
use crate::cognition::prompt::{self, ReplyContext};
use crate::config::SupporterCfg;
use crate::gateway::{CompletionGateway, GatewayError};
use crate::types::{Action, Emotion, StructuredReply};

/// Generate one reply. Transport failure after the gateway's retries is
/// returned to the caller, which decides on the placeholder.
pub async fn generate(
    gateway: &CompletionGateway,
    cfg: &SupporterCfg,
    ctx: &ReplyContext<'_>,
) -> Result<StructuredReply, GatewayError> {
    let raw = gateway
        .complete(prompt::reply(ctx), cfg.temp_reply, Some(ctx.persona))
        .await?;
    Ok(from_raw(&raw))
}

fn from_raw(raw: &str) -> StructuredReply {
    let parsed = parser::parse(raw);
    StructuredReply {
        text: parsed.text().trim().to_string(),
        emotion: parsed.str_field("emotion").map(Emotion::from_tag).unwrap_or_default(),
        action: parsed.str_field("action").map(Action::from_tag).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_missing_tags() {
        let r = from_raw(r#"{"text": " 반가워! ", "emotion": "happy"}"#);
        assert_eq!(r.text, "반가워!");
        assert_eq!(r.emotion, Emotion::Happy);
        assert_eq!(r.action, Action::None);
    }

    #[test]
    fn unknown_tags_are_normalised() {
        let r = from_raw(r#"{"text": "hey", "emotion": "ecstatic", "action": "moonwalk"}"#);
        assert_eq!(r.emotion, Emotion::Normal);
        assert_eq!(r.action, Action::None);
    }

    #[test]
    fn prose_becomes_the_text() {
        let r = from_raw("그냥 평범하게 대답할게");
        assert_eq!(r.text, "그냥 평범하게 대답할게");
        assert_eq!(r.emotion, Emotion::Normal);
    }

    #[test]
    fn broken_json_is_flagged_with_error_tag() {
        let r = from_raw(r#"{"text": "oops", "emotion": }"#);
        assert_eq!(r.emotion, Emotion::Error);
        assert!(!r.text.is_empty());
    }
}
