use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> Result<Self, config::ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(config::ConfigError::Message(format!(
                "Unknown store backend '{}', expected 'mongo' or 'memory'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub mongo_uri: String,
    pub mongo_database: String,
    /// Advisory quiz locks are skipped when unset
    pub redis_uri: Option<String>,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub max_tx_attempts: usize,
    /// JSON catalog loaded into the memory backend at startup
    pub seed_path: Option<String>,
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
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let lookup = |key: &str, var: &str| -> Option<String> {
            settings
                .get_string(key)
                .ok()
                .or_else(|| env::var(var).ok())
                .filter(|value| !value.trim().is_empty())
        };

        let store_backend = match lookup("store.backend", "STORE_BACKEND") {
            Some(value) => StoreBackend::parse(&value)?,
            None => StoreBackend::Mongo,
        };

        let mongo_uri = match lookup("database.mongo_uri", "MONGO_URI") {
            Some(uri) => uri,
            None => match (env::var("MONGO_USER"), env::var("MONGO_PASSWORD")) {
                (Ok(user), Ok(password)) => {
                    tracing::warn!("Building MongoDB URI from MONGO_USER/MONGO_PASSWORD env vars");
                    format!(
                        "mongodb://{}:{}@localhost:27017/?authSource=admin&replicaSet=rs0",
                        user, password
                    )
                }
                _ if store_backend == StoreBackend::Memory => String::new(),
                _ => {
                    return Err(config::ConfigError::Message(
                        "MONGO_URI (or MONGO_USER/MONGO_PASSWORD) must be set".to_string(),
                    ))
                }
            },
        };

        let mongo_database = lookup("database.mongo_database", "MONGO_DATABASE")
            .unwrap_or_else(|| "coursequest".to_string());

        let redis_uri = lookup("redis.uri", "REDIS_URI");

        let jwt_secret = match lookup("auth.jwt_secret", "JWT_SECRET") {
            Some(secret) => secret,
            None if app_env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            None => {
                tracing::warn!("Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            }
        };

        let bind_addr =
            lookup("server.bind_addr", "BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8081".to_string());

        let max_tx_attempts = match lookup("store.max_tx_attempts", "STORE_MAX_TX_ATTEMPTS")
        {
            Some(value) => value.parse::<usize>().map_err(|e| {
                config::ConfigError::Message(format!("Invalid STORE_MAX_TX_ATTEMPTS: {}", e))
            })?,
            None => 5,
        };

        let seed_path = lookup("store.seed_path", "STORE_SEED_PATH");

        Ok(Config {
            store_backend,
            mongo_uri,
            mongo_database,
            redis_uri,
            jwt_secret,
            bind_addr,
            max_tx_attempts,
            seed_path,
        })
    }

    /// In-memory configuration for tests and local runs
    pub fn for_memory_store(jwt_secret: &str) -> Self {
        Config {
            store_backend: StoreBackend::Memory,
            mongo_uri: String::new(),
            mongo_database: "coursequest".to_string(),
            redis_uri: None,
            jwt_secret: jwt_secret.to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            max_tx_attempts: 5,
            seed_path: None,
        }
    }
}
