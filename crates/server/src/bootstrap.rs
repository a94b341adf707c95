//! Startup wiring: connect stores, load configuration, build the pipeline.
//! Every external dependency is optional; missing or unreachable ones fall
//! back to in-process stand-ins.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use supporter_core::config::SupporterCfg;
use supporter_core::memory::embedding::HashEmbedder;
use supporter_core::memory::in_memory::InMemorySessionCache;
use supporter_core::memory::postgres::PgMemoryStore;
use supporter_core::memory::redis_cache::RedisSessionCache;
use supporter_core::memory::{MemoryStores, SessionCache};
use supporter_core::runtime::TurnPipeline;
use supporter_llm::embedding::EmbeddingProvider;
use supporter_llm::provider::LlmProvider;

use crate::routes::Services;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Connect and migrate Postgres when `DATABASE_URL` is set. `None` means ephemeral mode.
pub async fn connect_database() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let connect = tokio::time::timeout(
        CONNECT_TIMEOUT,
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(8)
            .connect(&url),
    )
    .await;

    match connect {
        Ok(Ok(pool)) => match sqlx::migrate!("../../migrations").run(&pool).await {
            Ok(()) => {
                tracing::info!("database connected and migrations applied");
                Some(pool)
            }
            Err(e) => {
                tracing::warn!(error = %e, "database migration failed, long-term memory is ephemeral");
                None
            }
        },
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "failed to connect DATABASE_URL, long-term memory is ephemeral");
            None
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = CONNECT_TIMEOUT.as_secs(),
                "database connection timed out, long-term memory is ephemeral"
            );
            None
        }
    }
}

/// Redis session cache when `REDIS_URL` is set and reachable, in-process otherwise.
pub async fn connect_cache() -> Arc<dyn SessionCache> {
    let Ok(url) = std::env::var("REDIS_URL") else {
        tracing::warn!("REDIS_URL not set, sessions are kept in process");
        return Arc::new(InMemorySessionCache::new());
    };

    match tokio::time::timeout(CONNECT_TIMEOUT, RedisSessionCache::connect(&url)).await {
        Ok(Ok(cache)) => {
            tracing::info!("session cache connected");
            Arc::new(cache)
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "failed to connect REDIS_URL, sessions are kept in process");
            Arc::new(InMemorySessionCache::new())
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = CONNECT_TIMEOUT.as_secs(),
                "session cache connection timed out, sessions are kept in process"
            );
            Arc::new(InMemorySessionCache::new())
        }
    }
}

/// Build all services. Returns the pool so the caller can close it on shutdown.
pub async fn init() -> (Services, Option<PgPool>) {
    let pool = connect_database().await;

    let cfg = match &pool {
        Some(pool) => match SupporterCfg::load(pool).await {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load supporter_config, using defaults");
                SupporterCfg::default()
            }
        },
        None => SupporterCfg::default(),
    };

    let cache = connect_cache().await;

    let embedder: Arc<dyn EmbeddingProvider> = match supporter_llm::embedding::from_env(cfg.embedding_dim) {
        Some(e) => Arc::new(e),
        None => {
            tracing::warn!("SUPPORTER_EMBED_MODEL not set, using hash embeddings");
            Arc::new(HashEmbedder::new(cfg.embedding_dim))
        }
    };

    let mut stores = MemoryStores::in_memory(cfg.embedding_dim);
    stores.cache = cache.clone();
    stores.embedder = embedder;
    if let Some(pool) = &pool {
        let pg = Arc::new(PgMemoryStore::new(pool.clone()));
        stores.metadata = pg.clone();
        stores.vectors = pg;
    }

    let provider: Option<Arc<dyn LlmProvider>> =
        supporter_llm::http::from_env().map(|p| Arc::new(p) as _);
    let pipeline = match provider {
        Some(provider) => {
            tracing::info!(provider = provider.name(), "completion service configured");
            Some(Arc::new(TurnPipeline::from_provider(provider, stores, cfg)))
        }
        None => {
            tracing::warn!(
                "SUPPORTER_LLM_MODEL / SUPPORTER_LLM_BASE_URL not set, chat is unavailable"
            );
            None
        }
    };

    (Services { pipeline, cache }, pool)
}
