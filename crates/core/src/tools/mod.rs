pub mod clock;
pub mod web_search;

use std::collections::HashMap;

use async_trait::async_trait;

/// An external action the orchestrator may invoke mid-turn.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// Run the tool. Always produces a result text, even on failure.
    async fn invoke(&self, query: &str) -> String;
}

pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();
        reg.register(Box::new(web_search::WebSearch));
        reg.register(Box::new(clock::CurrentTime));
        reg
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Registered names, sorted for determinism.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// Tools usable this turn: registered, enabled by the caller, not disabled.
    pub fn active(&self, enabled: &[String], disabled: &[String]) -> Vec<String> {
        self.names()
            .into_iter()
            .filter(|name| enabled.iter().any(|e| e == name))
            .filter(|name| !disabled.iter().any(|d| d == name))
            .map(str::to_string)
            .collect()
    }

    /// One `- name: description` line per listed tool, for prompt injection.
    pub fn describe(&self, names: &[String]) -> String {
        names
            .iter()
            .filter_map(|n| self.get(n))
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Invoke a tool by name. Unknown names still yield a result text.
    pub async fn invoke(&self, name: &str, query: &str) -> String {
        match self.get(name) {
            Some(tool) => {
                tracing::info!(tool = name, query, "invoking tool");
                tool.invoke(query).await
            }
            None => {
                tracing::warn!(tool = name, "tool not registered");
                format!("tool unavailable: {name}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn builtins_registered_sorted() {
        let reg = ToolRegistry::with_builtins();
        assert_eq!(reg.names(), vec!["current_time", "web_search"]);
    }

    #[test]
    fn active_is_enabled_minus_disabled() {
        let reg = ToolRegistry::with_builtins();
        assert_eq!(reg.active(&s(&["web_search", "current_time"]), &s(&["current_time"])), s(&["web_search"]));
        assert_eq!(reg.active(&s(&["teleport", "web_search"]), &[]), s(&["web_search"]));
        assert!(reg.active(&[], &[]).is_empty());
    }

    #[test]
    fn describe_lists_only_named_tools() {
        let reg = ToolRegistry::with_builtins();
        let text = reg.describe(&s(&["web_search", "ghost"]));
        assert!(text.starts_with("- web_search:"));
        assert_eq!(text.lines().count(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_still_returns_text() {
        let reg = ToolRegistry::empty();
        assert_eq!(reg.invoke("ghost", "q").await, "tool unavailable: ghost");
    }
}
