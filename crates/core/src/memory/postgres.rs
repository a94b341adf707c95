use async_trait::async_trait;
use pgvector::Vector;
use sqlx::PgPool;
use uuid::Uuid;

use super::store::{MetadataStore, StoreError, VectorIndex};
use crate::types::LongTermRecord;

/// Long-term memory in Postgres: `memory_metadata` rows plus a pgvector
/// `memory_vectors` index keyed by the same id.
#[derive(Clone)]
pub struct PgMemoryStore {
    pool: PgPool,
}

impl PgMemoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for PgMemoryStore {
    async fn insert(&self, record: &LongTermRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO memory_metadata (id, user_id, content, importance, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.content)
        .bind(record.importance)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn contents(&self, ids: &[Uuid]) -> Result<Vec<String>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT id, content FROM memory_metadata WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;

        // keep similarity order
        Ok(ids
            .iter()
            .filter_map(|id| rows.iter().find(|(row_id, _)| row_id == id))
            .map(|(_, content)| content.clone())
            .collect())
    }
}

#[async_trait]
impl VectorIndex for PgMemoryStore {
    async fn upsert(&self, id: Uuid, user_id: &str, embedding: &[f32]) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO memory_vectors (id, user_id, embedding) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET embedding = EXCLUDED.embedding",
        )
        .bind(id)
        .bind(user_id)
        .bind(Vector::from(embedding.to_vec()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn nearest(&self, user_id: &str, query: &[f32], limit: usize) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM memory_vectors WHERE user_id = $1 \
             ORDER BY embedding <=> $2 LIMIT $3",
        )
        .bind(user_id)
        .bind(Vector::from(query.to_vec()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
