//! Narrow store contracts consumed by the memory manager.

use async_trait::async_trait;
use uuid::Uuid;

use crate::types::LongTermRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),
    #[error("embedding error: {0}")]
    Embedding(#[from] supporter_llm::provider::LlmError),
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value session cache with per-entry expiry.
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Relational side of long-term memory: record text and metadata by id.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert(&self, record: &LongTermRecord) -> Result<(), StoreError>;
    /// Content for each id found, in the order of `ids`.
    async fn contents(&self, ids: &[Uuid]) -> Result<Vec<String>, StoreError>;
}

/// Similarity side of long-term memory: embeddings keyed by record id.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, id: Uuid, user_id: &str, embedding: &[f32]) -> Result<(), StoreError>;
    /// Nearest record ids for `user_id`, closest first.
    async fn nearest(&self, user_id: &str, query: &[f32], limit: usize) -> Result<Vec<Uuid>, StoreError>;
}
