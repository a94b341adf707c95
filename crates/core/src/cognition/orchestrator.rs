//! Tool-need decision.
//!
//! Once usable results exist the decision is always "no tool", regardless of
//! what the model says. That rule is what terminates the tool loop.

use crate::cognition::{parser, prompt};
use crate::config::SupporterCfg;
use crate::gateway::CompletionGateway;
use crate::tools::ToolRegistry;

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub thought: String,
    pub tool_required: bool,
    pub tool: Option<String>,
    pub query: String,
}

impl Decision {
    fn no_tool(thought: impl Into<String>, input: &str) -> Self {
        Self {
            thought: thought.into(),
            tool_required: false,
            tool: None,
            query: input.to_string(),
        }
    }
}

pub struct OrchestrateInput<'a> {
    pub input: &'a str,
    pub active_tools: &'a [String],
    pub search_results: Option<&'a str>,
}

pub async fn decide(
    gateway: &CompletionGateway,
    cfg: &SupporterCfg,
    tools: &ToolRegistry,
    req: OrchestrateInput<'_>,
) -> Decision {
    if req.active_tools.is_empty() {
        return Decision::no_tool("no tools enabled", req.input);
    }
    let has_results = req.search_results.is_some_and(|r| !r.trim().is_empty());

    let messages = prompt::orchestrator(
        &cfg.reply_language,
        req.input,
        &tools.describe(req.active_tools),
        has_results,
    );
    let raw = match gateway.complete(messages, cfg.temp_orchestrator, None).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "tool decision failed, answering without tools");
            return Decision::no_tool("decision unavailable", req.input);
        }
    };

    let decision = from_raw(&raw, req.input, req.active_tools);
    if has_results && decision.tool_required {
        tracing::debug!("results already present, forcing tool_required=false");
        return Decision { tool_required: false, tool: None, ..decision };
    }
    decision
}

fn from_raw(raw: &str, input: &str, active: &[String]) -> Decision {
    let parsed = parser::parse(raw);
    let thought = parsed.str_field("thought").unwrap_or("analysis done").to_string();
    let tool_required = parsed.bool_field("tool_required").unwrap_or(false);
    if !tool_required {
        return Decision::no_tool(thought, input);
    }

    let tool = parsed
        .str_field("tool")
        .filter(|t| active.iter().any(|a| a == t))
        .map(str::to_string)
        .or_else(|| active.first().cloned());
    let query = parsed.str_field("query").unwrap_or(input).to_string();
    Decision {
        thought,
        tool_required: tool.is_some(),
        tool,
        query,
    }
}
