use crate::runtime::stage::{Flags, Stage};
use crate::types::{AffectVector, Message, Persona, SessionKey, StructuredReply, TurnRequest};

/// Ephemeral per-turn state. Built fresh for every request and owned by one
/// pipeline run; never shared between turns.
#[derive(Debug, Clone)]
pub struct TurnState {
    pub key: SessionKey,
    pub input: String,
    /// Persona requested by the caller; wins over the stored one.
    pub requested_persona: Option<Persona>,
    pub persona: Persona,
    pub enabled_tools: Vec<String>,
    pub disabled_tools: Vec<String>,
    pub active_tools: Vec<String>,

    // loaded memory
    pub history: Vec<Message>,
    pub summary: String,
    pub long_term: String,

    // affect
    pub user_affect: AffectVector,
    pub ai_affect: AffectVector,

    // analysis
    pub intent: String,
    pub sentiment: String,
    pub thought: String,
    pub tool_required: bool,
    pub pending_tool: Option<String>,
    pub tool_query: String,
    pub search_results: Option<String>,
    pub tool_iterations: u32,

    // reply
    pub reply: Option<StructuredReply>,
    pub valid: bool,
    /// Reply is the apology placeholder; skips the self-check.
    pub placeholder: bool,
    pub critique: Option<String>,
    pub retry_count: u32,
    pub generation_attempts: u32,

    pub stage: Stage,
    pub steps: u32,
}

impl TurnState {
    pub fn new(req: TurnRequest) -> Self {
        Self {
            key: SessionKey::new(req.user_id, req.session_id),
            input: req.message,
            requested_persona: req.persona,
            persona: req.persona.unwrap_or_default(),
            enabled_tools: req.enabled_tools,
            disabled_tools: req.disabled_tools,
            active_tools: Vec::new(),
            history: Vec::new(),
            summary: String::new(),
            long_term: String::new(),
            user_affect: AffectVector::default(),
            ai_affect: AffectVector::default(),
            intent: String::new(),
            sentiment: String::new(),
            thought: String::new(),
            tool_required: false,
            pending_tool: None,
            tool_query: String::new(),
            search_results: None,
            tool_iterations: 0,
            reply: None,
            valid: false,
            placeholder: false,
            critique: None,
            retry_count: 0,
            generation_attempts: 0,
            stage: Stage::LoadMemory,
            steps: 0,
        }
    }

    pub fn flags(&self, max_tool_iterations: u32, max_retries: u32) -> Flags {
        Flags {
            tool_required: self.tool_required,
            tool_iterations: self.tool_iterations,
            max_tool_iterations,
            valid: self.valid,
            retry_count: self.retry_count,
            max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_starts_clean() {
        let state = TurnState::new(TurnRequest {
            user_id: "u".into(),
            session_id: "s".into(),
            message: "hello".into(),
            persona: Some(Persona::Frank),
            ..TurnRequest::default()
        });
        assert_eq!(state.stage, Stage::LoadMemory);
        assert_eq!(state.persona, Persona::Frank);
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.tool_iterations, 0);
        assert!(state.reply.is_none());
        assert!(state.critique.is_none());
        assert_eq!(state.key.cache_key(), "supporter:context:u:s");
    }
}
