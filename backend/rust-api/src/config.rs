use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Mongo,
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Some(StorageBackend::Mongo),
            "memory" | "in-memory" | "in_memory" => Some(StorageBackend::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub redis_uri: Option<String>,
    pub bind_addr: String,
    pub storage_backend: StorageBackend,
    pub default_total_words: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "wordquiz".to_string(),
            redis_uri: None,
            bind_addr: "0.0.0.0:8081".to_string(),
            storage_backend: StorageBackend::Mongo,
            default_total_words: 10,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or(defaults.mongo_uri);

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or(defaults.mongo_database);

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .ok()
            .filter(|uri| !uri.trim().is_empty());

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or(defaults.bind_addr);

        let storage_backend = match settings
            .get_string("storage.backend")
            .or_else(|_| env::var("APP_STORAGE"))
        {
            Ok(raw) => StorageBackend::parse(&raw).ok_or_else(|| {
                config::ConfigError::Message(format!("Unknown storage backend: {}", raw))
            })?,
            Err(_) => defaults.storage_backend,
        };

        let default_total_words = settings
            .get_int("quiz.default_total_words")
            .ok()
            .or_else(|| {
                env::var("DEFAULT_TOTAL_WORDS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok())
            })
            .filter(|v| *v > 0)
            .map(|v| v as u32)
            .unwrap_or(defaults.default_total_words);

        if redis_uri.is_none() {
            tracing::warn!("REDIS_URI not set, answer rate limiting is disabled");
        }

        Ok(Config {
            mongo_uri,
            mongo_database,
            redis_uri,
            bind_addr,
            storage_backend,
            default_total_words,
        })
    }

    /// Configuration for tests and local demos: in-memory store, no Redis.
    pub fn in_memory() -> Self {
        Config {
            storage_backend: StorageBackend::Memory,
            ..Config::default()
        }
    }
}
