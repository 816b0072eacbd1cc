use crate::config::{Config, StorageBackend};
use crate::middlewares::rate_limit::{RateLimiter, RedisRateLimiter};
use crate::storage::{MongoRepository, Storage};
use redis::aio::ConnectionManager;
use std::sync::Arc;

pub mod quiz_session_service;
pub mod session_locks;
pub mod word_selector;
pub mod word_service;

use quiz_session_service::QuizSessionService;
use session_locks::SessionLocks;
use word_service::WordService;

pub struct AppState {
    pub config: Config,
    pub storage: Storage,
    pub redis: Option<ConnectionManager>,
    pub rate_limiter: Option<Arc<dyn RateLimiter>>,
    pub session_locks: SessionLocks,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let storage = match config.storage_backend {
            StorageBackend::Mongo => {
                let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri).await?;
                let repo = MongoRepository::new(mongo_client, &config.mongo_database);
                repo.ensure_indexes().await?;
                tracing::info!("MongoDB connected: {}", config.mongo_database);
                Storage::mongo(repo)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage, data is lost on restart");
                Storage::in_memory()
            }
        };

        let redis = match &config.redis_uri {
            Some(uri) => Some(connect_redis(uri).await?),
            None => None,
        };

        Ok(Self::with_storage(config, storage, redis))
    }

    pub fn with_storage(
        config: Config,
        storage: Storage,
        redis: Option<ConnectionManager>,
    ) -> Self {
        let rate_limiter = redis
            .clone()
            .map(|conn| Arc::new(RedisRateLimiter::new(conn)) as Arc<dyn RateLimiter>);
        Self {
            config,
            storage,
            redis,
            rate_limiter,
            session_locks: SessionLocks::new(),
        }
    }

    /// Replaces the answer rate limiter, e.g. with an in-process one in tests.
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// In-memory state without Redis, used by tests.
    pub fn in_memory(config: Config) -> Self {
        Self::with_storage(config, Storage::in_memory(), None)
    }

    pub fn word_service(&self) -> WordService {
        WordService::new(&self.storage)
    }

    pub fn quiz_service(&self) -> QuizSessionService {
        QuizSessionService::new(
            &self.storage,
            self.session_locks.clone(),
            self.config.default_total_words,
        )
    }
}

async fn connect_redis(uri: &str) -> anyhow::Result<ConnectionManager> {
    tracing::info!("Attempting to connect to Redis...");
    let client = redis::Client::open(uri)?;

    let redis = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        ConnectionManager::new(client),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    // Test connection
    let mut conn = redis.clone();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}
