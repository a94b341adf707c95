use std::sync::Arc;

use supporter_llm::provider::LlmProvider;

use super::stage::{Stage, next_stage};
use super::state::TurnState;
use crate::cognition::prompt::ReplyContext;
use crate::cognition::{appraisal, emotion, expression, orchestrator, reflection};
use crate::config::SupporterCfg;
use crate::gateway::{CompletionGateway, GatewayPolicy};
use crate::memory::manager::{MemoryManager, MemoryStores, append_turn};
use crate::tools::ToolRegistry;
use crate::types::{SessionSnapshot, StructuredReply, TurnMetadata, TurnOutcome, TurnRequest};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("turn exceeded {0} stage steps")]
    StepLimitExceeded(u32),
}

/// Composition root of one conversational agent: owns the gateway, the
/// memory manager and the tool registry, and runs turns through the stage graph.
pub struct TurnPipeline {
    gateway: Arc<CompletionGateway>,
    memory: MemoryManager,
    tools: Arc<ToolRegistry>,
    cfg: Arc<SupporterCfg>,
}

impl TurnPipeline {
    pub fn new(
        gateway: Arc<CompletionGateway>,
        stores: MemoryStores,
        tools: Arc<ToolRegistry>,
        cfg: Arc<SupporterCfg>,
    ) -> Self {
        let memory = MemoryManager::new(stores, gateway.clone(), cfg.clone());
        Self { gateway, memory, tools, cfg }
    }

    /// Pipeline with the default gateway policy and built-in tools.
    pub fn from_provider(provider: Arc<dyn LlmProvider>, stores: MemoryStores, cfg: SupporterCfg) -> Self {
        let gateway = Arc::new(CompletionGateway::new(provider, GatewayPolicy::from_cfg(&cfg)));
        Self::new(gateway, stores, Arc::new(ToolRegistry::with_builtins()), Arc::new(cfg))
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// Run one turn from LoadMemory to End.
    pub async fn run(&self, req: TurnRequest) -> Result<TurnOutcome, PipelineError> {
        validate(&req)?;
        let mut state = TurnState::new(req);

        while state.stage != Stage::End {
            state.steps += 1;
            if state.steps > self.cfg.max_stage_steps {
                tracing::error!(
                    user = %state.key.user_id,
                    session = %state.key.session_id,
                    stage = ?state.stage,
                    limit = self.cfg.max_stage_steps,
                    "stage step limit exceeded"
                );
                return Err(PipelineError::StepLimitExceeded(self.cfg.max_stage_steps));
            }

            tracing::debug!(session = %state.key.session_id, stage = ?state.stage, step = state.steps, "stage");
            self.execute(&mut state).await;

            let flags = state.flags(self.cfg.max_tool_iterations, self.cfg.max_reply_retries);
            let next = next_stage(state.stage, flags);
            if state.stage == Stage::SelfCheck && next == Stage::GenerateReply {
                state.retry_count += 1;
                tracing::warn!(
                    session = %state.key.session_id,
                    retry = state.retry_count,
                    critique = state.critique.as_deref().unwrap_or(""),
                    "reply rejected by self-check, regenerating"
                );
            }
            if state.stage == Stage::SelfCheck && next == Stage::UpdateHistory {
                settle_reply(&mut state);
            }
            state.stage = next;
        }

        tracing::info!(
            user = %state.key.user_id,
            session = %state.key.session_id,
            steps = state.steps,
            attempts = state.generation_attempts,
            tools = state.tool_iterations,
            "turn complete"
        );
        Ok(outcome(state))
    }

    async fn execute(&self, state: &mut TurnState) {
        match state.stage {
            Stage::LoadMemory => self.load_memory(state).await,
            Stage::Appraise => {
                let a = appraisal::appraise(&self.gateway, &self.cfg, &state.input).await;
                state.intent = a.intent;
                state.sentiment = a.sentiment;
                state.user_affect = a.user_affect;
            }
            Stage::Orchestrate => {
                let d = orchestrator::decide(
                    &self.gateway,
                    &self.cfg,
                    &self.tools,
                    orchestrator::OrchestrateInput {
                        input: &state.input,
                        active_tools: &state.active_tools,
                        search_results: state.search_results.as_deref(),
                    },
                )
                .await;
                state.thought = d.thought;
                state.tool_required = d.tool_required;
                state.pending_tool = d.tool;
                state.tool_query = d.query;
            }
            Stage::ToolGateway => self.invoke_tool(state).await,
            Stage::UpdateAffect => {
                state.ai_affect = emotion::update(
                    &self.gateway,
                    &self.cfg,
                    emotion::EmotionInput {
                        persona: state.persona,
                        current: state.ai_affect,
                        user_affect: state.user_affect,
                        sentiment: &state.sentiment,
                        input: &state.input,
                    },
                )
                .await;
            }
            Stage::GenerateReply => self.generate_reply(state).await,
            Stage::SelfCheck => self.self_check(state).await,
            Stage::UpdateHistory => {
                let text = state.reply.as_ref().map(|r| r.text.as_str()).unwrap_or_default();
                let history = std::mem::take(&mut state.history);
                state.history = append_turn(history, &state.input, text);
            }
            Stage::Summarize => {
                let history = std::mem::take(&mut state.history);
                let out = self
                    .memory
                    .maybe_summarize(&state.key.user_id, history, &state.summary)
                    .await;
                state.history = out.buffer;
                state.summary = out.summary;
            }
            Stage::SaveMemory => {
                let snapshot = SessionSnapshot {
                    messages: state.history.clone(),
                    summary: state.summary.clone(),
                    persona: state.persona,
                    affect: state.ai_affect.clamped(),
                };
                if let Err(e) = self.memory.save(&state.key, &snapshot).await {
                    tracing::warn!(
                        error = %e,
                        user = %state.key.user_id,
                        session = %state.key.session_id,
                        "session save failed, turn state lost"
                    );
                }
            }
            Stage::End => {}
        }
    }

    async fn load_memory(&self, state: &mut TurnState) {
        let snapshot = self.memory.load(&state.key).await;
        state.history = snapshot.messages;
        state.summary = snapshot.summary;
        state.ai_affect = snapshot.affect.clamped();
        state.persona = state.requested_persona.unwrap_or(snapshot.persona);
        state.active_tools = self.tools.active(&state.enabled_tools, &state.disabled_tools);
        state.long_term = self.memory.recall(&state.key.user_id, &state.input).await;
    }

    async fn invoke_tool(&self, state: &mut TurnState) {
        let result = match state.pending_tool.take() {
            Some(name) => self.tools.invoke(&name, &state.tool_query).await,
            None => "tool unavailable: none selected".to_string(),
        };
        state.search_results = Some(match state.search_results.take() {
            Some(prev) => format!("{prev}\n{result}"),
            None => result,
        });
        state.tool_iterations += 1;
        state.tool_required = false;
    }

    async fn generate_reply(&self, state: &mut TurnState) {
        state.generation_attempts += 1;
        let ctx = ReplyContext {
            language: &self.cfg.reply_language,
            persona: state.persona,
            affect: state.ai_affect,
            summary: &state.summary,
            long_term: &state.long_term,
            search_results: state.search_results.as_deref(),
            critique: state.critique.as_deref(),
            history: &state.history,
            input: &state.input,
        };
        match expression::generate(&self.gateway, &self.cfg, &ctx).await {
            Ok(reply) => {
                state.reply = Some(reply);
                state.valid = false;
                state.placeholder = false;
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    session = %state.key.session_id,
                    attempt = state.generation_attempts,
                    "reply generation failed, using placeholder"
                );
                state.reply = Some(StructuredReply::apology(state.persona));
                state.valid = true;
                state.placeholder = true;
            }
        }
    }

    async fn self_check(&self, state: &mut TurnState) {
        if state.placeholder {
            state.valid = true;
            return;
        }
        let Some(reply) = state.reply.as_ref() else {
            state.valid = false;
            state.critique = Some("no reply was produced".into());
            return;
        };
        let verdict = reflection::check(
            &self.gateway,
            &self.cfg,
            reflection::CheckInput {
                persona: state.persona,
                affect: state.ai_affect,
                input: &state.input,
                reply,
            },
        )
        .await;
        state.valid = verdict.valid;
        state.critique = verdict.critique;
    }
}

fn validate(req: &TurnRequest) -> Result<(), PipelineError> {
    for (field, value) in [("user_id", &req.user_id), ("session_id", &req.session_id)] {
        if value.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(format!("{field} is empty")));
        }
        // ':' separates key segments in the session cache
        if value.contains(':') {
            return Err(PipelineError::InvalidRequest(format!("{field} must not contain ':'")));
        }
    }
    if req.message.trim().is_empty() {
        return Err(PipelineError::InvalidRequest("message is empty".into()));
    }
    Ok(())
}

/// Retries are spent: a reply with no displayable text becomes the apology.
fn settle_reply(state: &mut TurnState) {
    let blank = state.reply.as_ref().is_none_or(|r| r.text.trim().is_empty());
    if !blank {
        return;
    }
    tracing::warn!(
        session = %state.key.session_id,
        attempts = state.generation_attempts,
        "no usable reply text after retries, using placeholder"
    );
    state.reply = Some(StructuredReply::apology(state.persona));
    state.placeholder = true;
    state.valid = true;
}

fn outcome(state: TurnState) -> TurnOutcome {
    let persona = state.persona;
    TurnOutcome {
        reply: state
            .reply
            .filter(|r| !r.text.trim().is_empty())
            .unwrap_or_else(|| StructuredReply::apology(persona)),
        metadata: TurnMetadata {
            persona,
            ai_pad: state.ai_affect.clamped(),
            user_pad: state.user_affect.clamped(),
            intent: state.intent,
            thought: state.thought,
            search_results: state.search_results,
            summary: state.summary,
            active_tools: state.active_tools,
            generation_attempts: state.generation_attempts,
        },
    }
}
