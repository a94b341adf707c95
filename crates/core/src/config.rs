use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;

/// All pipeline tunables. Loaded from the `supporter_config` table at startup
/// when a database is configured; defaults otherwise.
/// First boot writes defaults; subsequent boots read existing values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupporterCfg {
    // session cache
    pub session_ttl_secs: u64,

    // short-term memory
    pub summarize_after: usize,
    pub history_tail: usize,

    // long-term memory
    pub promotion_threshold: f32,
    pub long_term_limit: usize,
    pub embedding_dim: usize,

    // pipeline bounds
    pub max_reply_retries: u32,
    pub max_tool_iterations: u32,
    pub max_stage_steps: u32,

    // affect
    pub affect_drift: f32,

    // completion gateway
    pub llm_timeout_secs: u64,
    pub llm_transport_retries: u32,
    pub llm_language_attempts: u32,
    pub llm_max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub repetition_penalty: f32,
    pub persona_adapters: bool,
    pub adapter_prefix: String,
    pub adapter_root: String,
    pub reply_language: String,

    // sampling temperatures per stage
    pub temp_appraisal: f32,
    pub temp_orchestrator: f32,
    pub temp_emotion: f32,
    pub temp_reply: f32,
    pub temp_reflection: f32,
    pub temp_summary: f32,
}

impl Default for SupporterCfg {
    fn default() -> Self {
        Self {
            session_ttl_secs: 3600,
            summarize_after: 8,
            history_tail: 4,
            promotion_threshold: 0.7,
            long_term_limit: 3,
            embedding_dim: 1024,
            max_reply_retries: 2,
            max_tool_iterations: 2,
            max_stage_steps: 50,
            affect_drift: 0.1,
            llm_timeout_secs: 30,
            llm_transport_retries: 2,
            llm_language_attempts: 5,
            llm_max_tokens: 512,
            presence_penalty: 0.6,
            frequency_penalty: 0.5,
            repetition_penalty: 1.1,
            persona_adapters: true,
            adapter_prefix: "adapter_".into(),
            adapter_root: "/app/loras".into(),
            reply_language: "Korean".into(),
            temp_appraisal: 0.1,
            temp_orchestrator: 0.1,
            temp_emotion: 0.3,
            temp_reply: 0.7,
            temp_reflection: 0.1,
            temp_summary: 0.1,
        }
    }
}

impl SupporterCfg {
    /// Load config from `supporter_config` table. If table is empty, seed with defaults.
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM supporter_config")
                .fetch_all(pool)
                .await?;

        if rows.is_empty() {
            let cfg = Self::default();
            cfg.seed(pool).await?;
            return Ok(cfg);
        }

        let map: HashMap<String, String> = rows.into_iter().collect();
        Ok(Self::from_map(&map))
    }

    /// Write all default values into `supporter_config` table.
    async fn seed(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        let entries = self.to_entries();
        for (key, value, desc) in &entries {
            sqlx::query(
                "INSERT INTO supporter_config (key, value, description) VALUES ($1, $2, $3) \
                 ON CONFLICT (key) DO NOTHING",
            )
            .bind(key)
            .bind(value)
            .bind(desc)
            .execute(pool)
            .await?;
        }
        tracing::info!(entries = entries.len(), "seeded supporter_config with defaults");
        Ok(())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            session_ttl_secs: get_or(m, "session_ttl_secs", d.session_ttl_secs),
            summarize_after: get_or(m, "summarize_after", d.summarize_after),
            history_tail: get_or(m, "history_tail", d.history_tail),
            promotion_threshold: get_or(m, "promotion_threshold", d.promotion_threshold),
            long_term_limit: get_or(m, "long_term_limit", d.long_term_limit),
            embedding_dim: get_or(m, "embedding_dim", d.embedding_dim),
            max_reply_retries: get_or(m, "max_reply_retries", d.max_reply_retries),
            max_tool_iterations: get_or(m, "max_tool_iterations", d.max_tool_iterations),
            max_stage_steps: get_or(m, "max_stage_steps", d.max_stage_steps),
            affect_drift: get_or(m, "affect_drift", d.affect_drift),
            llm_timeout_secs: get_or(m, "llm_timeout_secs", d.llm_timeout_secs),
            llm_transport_retries: get_or(m, "llm_transport_retries", d.llm_transport_retries),
            llm_language_attempts: get_or(m, "llm_language_attempts", d.llm_language_attempts),
            llm_max_tokens: get_or(m, "llm_max_tokens", d.llm_max_tokens),
            presence_penalty: get_or(m, "presence_penalty", d.presence_penalty),
            frequency_penalty: get_or(m, "frequency_penalty", d.frequency_penalty),
            repetition_penalty: get_or(m, "repetition_penalty", d.repetition_penalty),
            persona_adapters: get_or(m, "persona_adapters", d.persona_adapters),
            adapter_prefix: get_or(m, "adapter_prefix", d.adapter_prefix),
            adapter_root: get_or(m, "adapter_root", d.adapter_root),
            reply_language: get_or(m, "reply_language", d.reply_language),
            temp_appraisal: get_or(m, "temp_appraisal", d.temp_appraisal),
            temp_orchestrator: get_or(m, "temp_orchestrator", d.temp_orchestrator),
            temp_emotion: get_or(m, "temp_emotion", d.temp_emotion),
            temp_reply: get_or(m, "temp_reply", d.temp_reply),
            temp_reflection: get_or(m, "temp_reflection", d.temp_reflection),
            temp_summary: get_or(m, "temp_summary", d.temp_summary),
        }
        .sanitized()
    }

    /// Repair values that would break pipeline invariants.
    fn sanitized(mut self) -> Self {
        if self.history_tail == 0 {
            self.history_tail = Self::default().history_tail;
        }
        if self.summarize_after < self.history_tail {
            self.summarize_after = self.history_tail;
        }
        if self.max_stage_steps < 10 {
            self.max_stage_steps = 10;
        }
        if self.llm_language_attempts == 0 {
            self.llm_language_attempts = 1;
        }
        self.promotion_threshold = self.promotion_threshold.clamp(0.0, 1.0);
        self.affect_drift = self.affect_drift.abs().min(2.0);
        self
    }

    fn to_entries(&self) -> Vec<(&str, String, &str)> {
        vec![
            ("session_ttl_secs", self.session_ttl_secs.to_string(), "Idle expiry of a session cache entry"),
            ("summarize_after", self.summarize_after.to_string(), "Buffer length above which summarization runs"),
            ("history_tail", self.history_tail.to_string(), "Entries kept verbatim after summarization"),
            ("promotion_threshold", self.promotion_threshold.to_string(), "Importance needed to promote a fact to long-term memory"),
            ("long_term_limit", self.long_term_limit.to_string(), "Nearest neighbours fetched per recall"),
            ("embedding_dim", self.embedding_dim.to_string(), "Embedding vector dimensionality"),
            ("max_reply_retries", self.max_reply_retries.to_string(), "Reply regenerations allowed after a failed self-check"),
            ("max_tool_iterations", self.max_tool_iterations.to_string(), "Hard cap on tool invocations per turn"),
            ("max_stage_steps", self.max_stage_steps.to_string(), "Hard cap on stage executions per turn"),
            ("affect_drift", self.affect_drift.to_string(), "Max per-axis affect change per turn"),
            ("llm_timeout_secs", self.llm_timeout_secs.to_string(), "Per-call completion timeout seconds"),
            ("llm_transport_retries", self.llm_transport_retries.to_string(), "Retries on completion transport failure"),
            ("llm_language_attempts", self.llm_language_attempts.to_string(), "Attempts before stripping wrong-script characters"),
            ("llm_max_tokens", self.llm_max_tokens.to_string(), "Completion max tokens"),
            ("presence_penalty", self.presence_penalty.to_string(), "Presence penalty"),
            ("frequency_penalty", self.frequency_penalty.to_string(), "Frequency penalty"),
            ("repetition_penalty", self.repetition_penalty.to_string(), "Backend repetition penalty"),
            ("persona_adapters", self.persona_adapters.to_string(), "Request persona adapters for replies"),
            ("adapter_prefix", self.adapter_prefix.clone(), "Persona adapter identifier prefix"),
            ("adapter_root", self.adapter_root.clone(), "Persona adapter directory on the serving host"),
            ("reply_language", self.reply_language.clone(), "Language every reply must be written in"),
            ("temp_appraisal", self.temp_appraisal.to_string(), "Appraisal temperature"),
            ("temp_orchestrator", self.temp_orchestrator.to_string(), "Tool decision temperature"),
            ("temp_emotion", self.temp_emotion.to_string(), "Affect update temperature"),
            ("temp_reply", self.temp_reply.to_string(), "Reply generation temperature"),
            ("temp_reflection", self.temp_reflection.to_string(), "Self-check temperature"),
            ("temp_summary", self.temp_summary.to_string(), "Summarization temperature"),
        ]
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_round_trip_through_map() {
        let cfg = SupporterCfg::default();
        let map: HashMap<String, String> = cfg
            .to_entries()
            .into_iter()
            .map(|(k, v, _)| (k.to_string(), v))
            .collect();
        assert_eq!(SupporterCfg::from_map(&map), cfg);
    }

    #[test]
    fn unparsable_values_fall_back_to_defaults() {
        let mut map = HashMap::new();
        map.insert("session_ttl_secs".to_string(), "soon".to_string());
        map.insert("history_tail".to_string(), "6".to_string());
        let cfg = SupporterCfg::from_map(&map);
        assert_eq!(cfg.session_ttl_secs, 3600);
        assert_eq!(cfg.history_tail, 6);
    }

    #[test]
    fn sanitizing_keeps_summarize_above_tail() {
        let mut map = HashMap::new();
        map.insert("history_tail".to_string(), "6".to_string());
        map.insert("summarize_after".to_string(), "2".to_string());
        map.insert("promotion_threshold".to_string(), "4.0".to_string());
        let cfg = SupporterCfg::from_map(&map);
        assert_eq!(cfg.summarize_after, 6);
        assert_eq!(cfg.promotion_threshold, 1.0);
    }

    #[test]
    fn every_field_has_an_entry() {
        let cfg = SupporterCfg::default();
        let entries = cfg.to_entries();
        let json = serde_json::to_value(SupporterCfg::default()).unwrap();
        assert_eq!(entries.len(), json.as_object().unwrap().len());
    }
}
