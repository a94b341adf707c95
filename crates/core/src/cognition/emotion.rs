//! Agent affect update: the model proposes, the affect model bounds.

use crate::cognition::{parser, prompt};
use crate::config::SupporterCfg;
use crate::gateway::CompletionGateway;
use crate::identity::affect::{self, AffectProposal};
use crate::types::{AffectVector, Persona};

pub struct EmotionInput<'a> {
    pub persona: Persona,
    pub current: AffectVector,
    pub user_affect: AffectVector,
    pub sentiment: &'a str,
    pub input: &'a str,
}

/// Next agent affect. Falls back to the current state when the call fails or
/// the model proposes nothing usable.
pub async fn update(gateway: &CompletionGateway, cfg: &SupporterCfg, req: EmotionInput<'_>) -> AffectVector {
    let messages = prompt::emotion(
        &cfg.reply_language,
        req.persona,
        req.current,
        req.user_affect,
        req.sentiment,
        req.input,
    );
    let raw = match gateway.complete(messages, cfg.temp_emotion, None).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "affect update failed, keeping current state");
            return req.current.clamped();
        }
    };

    match proposal_from_raw(&raw) {
        Some(proposal) => affect::update(req.current, proposal, req.persona, cfg.affect_drift),
        None => req.current.clamped(),
    }
}

/// Absolute `p`/`a`/`d` targets, or `dp`/`da`/`dd` deltas.
fn proposal_from_raw(raw: &str) -> Option<AffectProposal> {
    let parsed = parser::parse(raw);
    if parsed.fallback {
        return None;
    }
    let fields = parsed.fields();
    let has = |keys: &[&str]| keys.iter().any(|k| fields.contains_key(*k));

    if has(&["dp", "da", "dd"]) {
        Some(AffectProposal::Delta(AffectVector {
            p: affect::clamp_value(fields.get("dp")),
            a: affect::clamp_value(fields.get("da")),
            d: affect::clamp_value(fields.get("dd")),
        }))
    } else if has(&["p", "a", "d", "pleasure", "arousal", "dominance"]) {
        Some(AffectProposal::Target(affect::vector_from_fields(fields)))
    } else {
        None
    }
}
