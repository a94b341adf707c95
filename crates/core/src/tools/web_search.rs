use async_trait::async_trait;

use super::Tool;

/// Web search stand-in: a deterministic canned result for the query.
pub struct WebSearch;

#[async_trait]
impl Tool for WebSearch {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "look up current information on the web"
    }

    async fn invoke(&self, query: &str) -> String {
        format!("Search results for '{}': mostly positive and interesting information.", query.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn result_mentions_query() {
        let out = WebSearch.invoke(" weather in Seoul ").await;
        assert!(out.contains("'weather in Seoul'"));
        assert!(!out.is_empty());
    }
}
