//! In-process stores. Used when no external store is configured and as test doubles.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use super::store::{MetadataStore, SessionCache, StoreError, VectorIndex};
use crate::types::LongTermRecord;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Session cache held in a map. Expired entries are dropped on read and swept on every write.
#[derive(Default)]
pub struct InMemorySessionCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        lock(&self.entries).values().filter(|(_, exp)| *exp > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionCache for InMemorySessionCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = lock(&self.entries);
        entries.retain(|_, (_, exp)| *exp > now);
        entries.insert(key.to_string(), (value, now + Duration::from_secs(ttl_secs)));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Long-term memory held in process: records plus a brute-force cosine index.
#[derive(Default)]
pub struct InMemoryLongTermStore {
    records: Mutex<Vec<LongTermRecord>>,
    vectors: Mutex<HashMap<Uuid, (String, Vec<f32>)>>,
}

impl InMemoryLongTermStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record, oldest first.
    pub fn records(&self) -> Vec<LongTermRecord> {
        lock(&self.records).clone()
    }
}

#[async_trait]
impl MetadataStore for InMemoryLongTermStore {
    async fn insert(&self, record: &LongTermRecord) -> Result<(), StoreError> {
        lock(&self.records).push(record.clone());
        Ok(())
    }

    async fn contents(&self, ids: &[Uuid]) -> Result<Vec<String>, StoreError> {
        let records = lock(&self.records);
        Ok(ids
            .iter()
            .filter_map(|id| records.iter().find(|r| r.id == *id))
            .map(|r| r.content.clone())
            .collect())
    }
}

#[async_trait]
impl VectorIndex for InMemoryLongTermStore {
    async fn upsert(&self, id: Uuid, user_id: &str, embedding: &[f32]) -> Result<(), StoreError> {
        lock(&self.vectors).insert(id, (user_id.to_string(), embedding.to_vec()));
        Ok(())
    }

    async fn nearest(&self, user_id: &str, query: &[f32], limit: usize) -> Result<Vec<Uuid>, StoreError> {
        let vectors = lock(&self.vectors);
        let mut scored: Vec<(Uuid, f32)> = vectors
            .iter()
            .filter(|(_, (owner, _))| owner == user_id)
            .map(|(id, (_, v))| (*id, cosine_distance(query, v)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(scored.into_iter().take(limit).map(|(id, _)| id).collect())
    }
}

/// Cosine distance (1 - cosine similarity); zero vectors are maximally distant.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 2.0;
    }
    1.0 - dot / (na * nb)
}

/// Store that fails every call. Exercises degradation paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStore;

impl UnavailableStore {
    fn err() -> StoreError {
        StoreError::Unavailable("store offline".into())
    }
}

#[async_trait]
impl SessionCache for UnavailableStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(Self::err())
    }

    async fn set_ex(&self, _key: &str, _value: String, _ttl_secs: u64) -> Result<(), StoreError> {
        Err(Self::err())
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(Self::err())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(Self::err())
    }
}

#[async_trait]
impl MetadataStore for UnavailableStore {
    async fn insert(&self, _record: &LongTermRecord) -> Result<(), StoreError> {
        Err(Self::err())
    }

    async fn contents(&self, _ids: &[Uuid]) -> Result<Vec<String>, StoreError> {
        Err(Self::err())
    }
}

#[async_trait]
impl VectorIndex for UnavailableStore {
    async fn upsert(&self, _id: Uuid, _user_id: &str, _embedding: &[f32]) -> Result<(), StoreError> {
        Err(Self::err())
    }

    async fn nearest(&self, _user_id: &str, _query: &[f32], _limit: usize) -> Result<Vec<Uuid>, StoreError> {
        Err(Self::err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(user: &str, content: &str) -> LongTermRecord {
        LongTermRecord {
            id: Uuid::new_v4(),
            user_id: user.into(),
            content: content.into(),
            importance: 0.9,
            created_at: Utc::now(),
            embedding: vec![],
        }
    }

    #[tokio::test]
    async fn cache_honours_ttl() {
        let cache = InMemorySessionCache::new();
        cache.set_ex("k", "v".into(), 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        cache.set_ex("gone", "v".into(), 0).await.unwrap();
        assert_eq!(cache.get("gone").await.unwrap(), None);
        assert_eq!(cache.len(), 1);

        cache.delete("k").await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn writes_sweep_expired_sessions() {
        let cache = InMemorySessionCache::new();
        for i in 0..1000 {
            cache.set_ex(&format!("old:{i}"), "v".into(), 0).await.unwrap();
        }
        cache.set_ex("live", "v".into(), 60).await.unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(lock(&cache.entries).len(), 1);
        assert_eq!(cache.get("live").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn nearest_is_scoped_to_user_and_ordered() {
        let store = InMemoryLongTermStore::new();
        let close = record("u1", "likes tea");
        let far = record("u1", "owns a bike");
        let other = record("u2", "likes tea too");
        store.upsert(close.id, "u1", &[1.0, 0.0]).await.unwrap();
        store.upsert(far.id, "u1", &[0.0, 1.0]).await.unwrap();
        store.upsert(other.id, "u2", &[1.0, 0.0]).await.unwrap();
        for r in [&close, &far, &other] {
            store.insert(r).await.unwrap();
        }

        let ids = store.nearest("u1", &[0.9, 0.1], 5).await.unwrap();
        assert_eq!(ids, vec![close.id, far.id]);
        let text = store.contents(&ids).await.unwrap();
        assert_eq!(text, vec!["likes tea", "owns a bike"]);
        assert_eq!(store.nearest("u1", &[1.0, 0.0], 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unavailable_store_always_errors() {
        let store = UnavailableStore;
        assert!(SessionCache::ping(&store).await.is_err());
        assert!(store.nearest("u", &[1.0], 3).await.is_err());
    }

    #[test]
    fn cosine_distance_edges() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 2.0);
    }
}
