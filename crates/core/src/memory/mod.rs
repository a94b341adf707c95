pub mod embedding;
pub mod in_memory;
pub mod manager;
pub mod postgres;
pub mod redis_cache;
pub mod store;

pub use manager::{MemoryManager, MemoryStores, NO_MEMORY_SENTINEL, RECALL_FAILED_SENTINEL};
pub use store::{MetadataStore, SessionCache, StoreError, VectorIndex};
