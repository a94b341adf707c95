use async_trait::async_trait;
use chrono::Utc;

use super::Tool;

/// Current wall-clock time in UTC.
pub struct CurrentTime;

#[async_trait]
impl Tool for CurrentTime {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "tell the current date and time"
    }

    async fn invoke(&self, _query: &str) -> String {
        format!("Current time: {}", Utc::now().format("%Y-%m-%d %H:%M UTC (%A)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_utc_time() {
        let out = CurrentTime.invoke("").await;
        assert!(out.starts_with("Current time: "));
        assert!(out.contains("UTC"));
    }
}
