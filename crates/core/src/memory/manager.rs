//! Memory manager: session load/save, the short-term buffer, rolling
//! summarization and promotion of lasting facts into long-term memory.

use std::sync::Arc;

use chrono::Utc;
use supporter_llm::embedding::EmbeddingProvider;
use uuid::Uuid;

use super::embedding::HashEmbedder;
use super::in_memory::{InMemoryLongTermStore, InMemorySessionCache};
use super::store::{MetadataStore, SessionCache, StoreError, VectorIndex};
use crate::cognition::{parser, prompt};
use crate::config::SupporterCfg;
use crate::gateway::CompletionGateway;
use crate::identity::affect;
use crate::types::{LongTermRecord, Message, SessionKey, SessionSnapshot};

/// Recall result when nothing related is stored.
pub const NO_MEMORY_SENTINEL: &str = "no related memories";
/// Recall result when a store or the embedder failed.
pub const RECALL_FAILED_SENTINEL: &str =
    "I tried to look back at what we talked about before, but it didn't work out. Sorry!";

/// Every backing store the memory manager talks to.
#[derive(Clone)]
pub struct MemoryStores {
    pub cache: Arc<dyn SessionCache>,
    pub metadata: Arc<dyn MetadataStore>,
    pub vectors: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn EmbeddingProvider>,
}

impl MemoryStores {
    /// Fully in-process stores with the hash embedder.
    pub fn in_memory(embedding_dim: usize) -> Self {
        let long_term = Arc::new(InMemoryLongTermStore::new());
        Self {
            cache: Arc::new(InMemorySessionCache::new()),
            metadata: long_term.clone(),
            vectors: long_term,
            embedder: Arc::new(HashEmbedder::new(embedding_dim)),
        }
    }
}

/// Outcome of [`MemoryManager::maybe_summarize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Summarized {
    pub buffer: Vec<Message>,
    pub summary: String,
    /// True when the buffer crossed the threshold and was truncated.
    pub truncated: bool,
    /// Id of the long-term record written, if any.
    pub promoted: Option<Uuid>,
}

/// Append one exchange (user, then agent) to the buffer.
pub fn append_turn(mut buffer: Vec<Message>, user_text: &str, reply_text: &str) -> Vec<Message> {
    buffer.push(Message::user(user_text));
    buffer.push(Message::assistant(reply_text));
    buffer
}

pub struct MemoryManager {
    stores: MemoryStores,
    gateway: Arc<CompletionGateway>,
    cfg: Arc<SupporterCfg>,
}

impl MemoryManager {
    pub fn new(stores: MemoryStores, gateway: Arc<CompletionGateway>, cfg: Arc<SupporterCfg>) -> Self {
        Self { stores, gateway, cfg }
    }

    /// Fetch a session snapshot. A miss, an unreadable entry or a cache failure
    /// all yield a fresh session.
    pub async fn load(&self, key: &SessionKey) -> SessionSnapshot {
        let raw = match self.stores.cache.get(&key.cache_key()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(user = %key.user_id, session = %key.session_id, "new session");
                return SessionSnapshot::default();
            }
            Err(e) => {
                tracing::warn!(error = %e, session = %key.session_id, "session cache read failed, starting fresh");
                return SessionSnapshot::default();
            }
        };

        match serde_json::from_str::<SessionSnapshot>(&raw) {
            Ok(mut snapshot) => {
                snapshot.affect = snapshot.affect.clamped();
                snapshot
            }
            Err(e) => {
                tracing::warn!(error = %e, session = %key.session_id, "unreadable session entry, starting fresh");
                SessionSnapshot::default()
            }
        }
    }

    /// Persist the snapshot with the session TTL, overwriting any prior entry.
    pub async fn save(&self, key: &SessionKey, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        let value = serde_json::to_string(snapshot)?;
        self.stores
            .cache
            .set_ex(&key.cache_key(), value, self.cfg.session_ttl_secs)
            .await
    }

    /// Embed `text` and search long-term memory for it. Never fails.
    pub async fn recall(&self, user_id: &str, text: &str) -> String {
        match self.stores.embedder.embed(text).await {
            Ok(embedding) => {
                self.search_long_term(user_id, &embedding, self.cfg.long_term_limit)
                    .await
            }
            Err(e) => {
                tracing::warn!(error = %e, user = %user_id, "query embedding failed");
                RECALL_FAILED_SENTINEL.to_string()
            }
        }
    }

    /// Nearest stored facts for `user_id`, newline-joined, or a sentinel. Never fails.
    pub async fn search_long_term(&self, user_id: &str, embedding: &[f32], limit: usize) -> String {
        let ids = match self.stores.vectors.nearest(user_id, embedding, limit).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, user = %user_id, "vector search failed");
                return RECALL_FAILED_SENTINEL.to_string();
            }
        };
        if ids.is_empty() {
            return NO_MEMORY_SENTINEL.to_string();
        }

        match self.stores.metadata.contents(&ids).await {
            Ok(contents) if contents.is_empty() => NO_MEMORY_SENTINEL.to_string(),
            Ok(contents) => contents.join("\n"),
            Err(e) => {
                tracing::warn!(error = %e, user = %user_id, "memory metadata lookup failed");
                RECALL_FAILED_SENTINEL.to_string()
            }
        }
    }

    /// Compress the older part of the buffer into the summary once it grows
    /// past the threshold, keeping only the recent tail. The buffer is
    /// truncated even when the summary call fails.
    pub async fn maybe_summarize(
        &self,
        user_id: &str,
        buffer: Vec<Message>,
        summary: &str,
    ) -> Summarized {
        if buffer.len() <= self.cfg.summarize_after {
            return Summarized {
                buffer,
                summary: summary.to_string(),
                truncated: false,
                promoted: None,
            };
        }

        let mut buffer = buffer;
        let split = buffer.len().saturating_sub(self.cfg.history_tail);
        let tail = buffer.split_off(split);
        let older = buffer;

        let messages = prompt::summary(&self.cfg.reply_language, summary, &older);
        let updated = match self.gateway.complete(messages, self.cfg.temp_summary, None).await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                tracing::warn!(user = %user_id, "empty summary returned, keeping previous");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, user = %user_id, "summarization failed, keeping previous");
                None
            }
        };

        let promoted = match &updated {
            Some(text) => self.promote(user_id, text).await,
            None => None,
        };

        tracing::info!(
            user = %user_id,
            summarized = older.len(),
            kept = tail.len(),
            promoted = promoted.is_some(),
            "short-term buffer compressed"
        );

        Summarized {
            buffer: tail,
            summary: updated.unwrap_or_else(|| summary.to_string()),
            truncated: true,
            promoted,
        }
    }

    /// Judge the summary's most lasting fact and store it when important enough.
    async fn promote(&self, user_id: &str, summary: &str) -> Option<Uuid> {
        let messages = prompt::importance(&self.cfg.reply_language, summary);
        let raw = match self.gateway.complete(messages, self.cfg.temp_summary, None).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, user = %user_id, "importance judging failed");
                return None;
            }
        };

        let verdict = parser::parse(&raw);
        let importance = affect::clamp_value(verdict.get("importance")).max(0.0);
        let fact = verdict.str_field("fact")?;
        if importance < self.cfg.promotion_threshold {
            tracing::debug!(importance, "fact below promotion threshold");
            return None;
        }

        match self.write_record(user_id, fact, importance).await {
            Ok(id) => {
                tracing::info!(user = %user_id, record = %id, importance, "promoted fact to long-term memory");
                Some(id)
            }
            Err(e) => {
                tracing::warn!(error = %e, user = %user_id, "long-term promotion failed");
                None
            }
        }
    }

    async fn write_record(&self, user_id: &str, fact: &str, importance: f32) -> Result<Uuid, StoreError> {
        let embedding = self.stores.embedder.embed(fact).await?;
        let record = LongTermRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            content: fact.to_string(),
            importance,
            created_at: Utc::now(),
            embedding,
        };
        self.stores
            .vectors
            .upsert(record.id, &record.user_id, &record.embedding)
            .await?;
        self.stores.metadata.insert(&record).await?;
        Ok(record.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayPolicy;
    use crate::memory::in_memory::UnavailableStore;
    use crate::types::{AffectVector, Persona};
    use std::time::Duration;
    use supporter_llm::provider::{ScriptStep, ScriptedProvider};

    fn manager_with(
        provider: Arc<ScriptedProvider>,
        stores: MemoryStores,
    ) -> MemoryManager {
        let cfg = SupporterCfg::default();
        let policy = GatewayPolicy { retry_backoff: Duration::ZERO, ..GatewayPolicy::from_cfg(&cfg) };
        let gateway = Arc::new(CompletionGateway::new(provider, policy));
        MemoryManager::new(stores, gateway, Arc::new(cfg))
    }

    fn buffer(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| if i % 2 == 0 { Message::user(format!("u{i}")) } else { Message::assistant(format!("a{i}")) })
            .collect()
    }

    #[test]
    fn append_adds_exactly_two_in_order() {
        let out = append_turn(buffer(2), "hello", "hi there");
        assert_eq!(out.len(), 4);
        assert_eq!(out[2], Message::user("hello"));
        assert_eq!(out[3], Message::assistant("hi there"));
    }

    #[tokio::test]
    async fn load_miss_is_a_fresh_session() {
        let mgr = manager_with(Arc::new(ScriptedProvider::replies(["x"])), MemoryStores::in_memory(8));
        let snap = mgr.load(&SessionKey::new("u", "s")).await;
        assert!(snap.messages.is_empty());
        assert!(snap.summary.is_empty());
        assert_eq!(snap.affect, AffectVector::default());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let mgr = manager_with(Arc::new(ScriptedProvider::replies(["x"])), MemoryStores::in_memory(8));
        let key = SessionKey::new("u", "s");
        let snap = SessionSnapshot {
            messages: buffer(2),
            summary: "likes tea".into(),
            persona: Persona::Calm,
            affect: AffectVector::new(0.1, 0.2, 0.3),
        };
        mgr.save(&key, &snap).await.unwrap();
        assert_eq!(mgr.load(&key).await, snap);
    }

    #[tokio::test]
    async fn corrupt_entry_and_cache_outage_start_fresh() {
        let stores = MemoryStores::in_memory(8);
        let key = SessionKey::new("u", "s");
        stores.cache.set_ex(&key.cache_key(), "{not json".into(), 60).await.unwrap();
        let mgr = manager_with(Arc::new(ScriptedProvider::replies(["x"])), stores);
        assert_eq!(mgr.load(&key).await, SessionSnapshot::default());

        let offline = MemoryStores { cache: Arc::new(UnavailableStore), ..MemoryStores::in_memory(8) };
        let mgr = manager_with(Arc::new(ScriptedProvider::replies(["x"])), offline);
        assert_eq!(mgr.load(&key).await, SessionSnapshot::default());
        assert!(mgr.save(&key, &SessionSnapshot::default()).await.is_err());
    }

    #[tokio::test]
    async fn short_buffer_is_left_alone() {
        let provider = Arc::new(ScriptedProvider::replies(["unused"]));
        let mgr = manager_with(provider.clone(), MemoryStores::in_memory(8));
        let out = mgr.maybe_summarize("u", buffer(8), "old").await;
        assert_eq!(out.buffer.len(), 8);
        assert_eq!(out.summary, "old");
        assert!(!out.truncated);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn ten_entries_summarize_to_tail_and_promote_once() {
        let provider = Arc::new(ScriptedProvider::replies([
            "The user is Jisoo and loves jasmine tea.",
            r#"{"fact": "Jisoo loves jasmine tea", "importance": 0.9}"#,
        ]));
        let long_term = Arc::new(InMemoryLongTermStore::new());
        let stores = MemoryStores {
            metadata: long_term.clone(),
            vectors: long_term.clone(),
            ..MemoryStores::in_memory(8)
        };
        let mgr = manager_with(provider, stores);

        let input = buffer(10);
        let out = mgr.maybe_summarize("u1", input.clone(), "").await;
        assert_eq!(out.buffer.len(), 4);
        assert_eq!(out.buffer, input[6..].to_vec());
        assert_eq!(out.summary, "The user is Jisoo and loves jasmine tea.");
        assert!(out.truncated);

        let records = long_term.records();
        assert_eq!(records.len(), 1);
        assert_eq!(Some(records[0].id), out.promoted);
        assert_eq!(records[0].content, "Jisoo loves jasmine tea");
        assert_eq!(records[0].embedding.len(), 8);

        let recalled = mgr.recall("u1", "tea").await;
        assert_eq!(recalled, "Jisoo loves jasmine tea");
        assert_eq!(mgr.recall("someone-else", "tea").await, NO_MEMORY_SENTINEL);
    }

    #[tokio::test]
    async fn unimportant_fact_is_not_promoted() {
        let provider = Arc::new(ScriptedProvider::replies([
            "They chatted about the weather.",
            r#"{"fact": "It rained", "importance": "0.3"}"#,
        ]));
        let long_term = Arc::new(InMemoryLongTermStore::new());
        let stores = MemoryStores {
            metadata: long_term.clone(),
            vectors: long_term.clone(),
            ..MemoryStores::in_memory(8)
        };
        let out = manager_with(provider, stores).maybe_summarize("u", buffer(12), "").await;
        assert_eq!(out.buffer.len(), 4);
        assert!(out.promoted.is_none());
        assert!(long_term.records().is_empty());
    }

    #[tokio::test]
    async fn summary_failure_keeps_old_summary_but_still_truncates() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptStep::Fail("down".into())]));
        let mgr = manager_with(provider, MemoryStores::in_memory(8));
        let out = mgr.maybe_summarize("u", buffer(11), "prior summary").await;
        assert_eq!(out.buffer.len(), 4);
        assert_eq!(out.summary, "prior summary");
        assert!(out.promoted.is_none());
    }

    #[tokio::test]
    async fn store_failure_yields_apology_sentinel() {
        let stores = MemoryStores {
            vectors: Arc::new(UnavailableStore),
            ..MemoryStores::in_memory(8)
        };
        let mgr = manager_with(Arc::new(ScriptedProvider::replies(["x"])), stores);
        assert_eq!(mgr.search_long_term("u", &[0.0; 8], 3).await, RECALL_FAILED_SENTINEL);

        let stores = MemoryStores {
            metadata: Arc::new(UnavailableStore),
            ..MemoryStores::in_memory(8)
        };
        let long_term = InMemoryLongTermStore::new();
        long_term.upsert(Uuid::new_v4(), "u", &[1.0; 8]).await.unwrap();
        let stores = MemoryStores { vectors: Arc::new(long_term), ..stores };
        let mgr = manager_with(Arc::new(ScriptedProvider::replies(["x"])), stores);
        assert_eq!(mgr.search_long_term("u", &[1.0; 8], 3).await, RECALL_FAILED_SENTINEL);
    }

    #[tokio::test]
    async fn promotion_failure_is_swallowed() {
        let provider = Arc::new(ScriptedProvider::replies([
            "summary",
            r#"{"fact": "keeps bees", "importance": 1.0}"#,
        ]));
        let stores = MemoryStores {
            vectors: Arc::new(UnavailableStore),
            ..MemoryStores::in_memory(8)
        };
        let out = manager_with(provider, stores).maybe_summarize("u", buffer(10), "").await;
        assert_eq!(out.summary, "summary");
        assert!(out.promoted.is_none());
    }
}
