use anyhow::{bail, Context};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Application Configuration - environment variables, optionally from .env
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Process-local store, state is lost on restart
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => bail!("unknown STORAGE_BACKEND '{}', expected postgres or memory", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// No brokers means events are only logged
    pub kafka_brokers: Option<String>,
    pub order_events_topic: String,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: usize,
    pub placement_timeout: Duration,
    pub seed_demo_catalog: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|name| std::env::var(name).ok())?;
        tracing::info!(
            storage = ?config.storage,
            port = config.server_port,
            broker = config.kafka_brokers.is_some(),
            "Application configuration loaded"
        );
        Ok(config)
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let storage = parse_or(&get, "STORAGE_BACKEND", StorageBackend::Postgres)?;
        let database_url = get("DATABASE_URL");
        if storage == StorageBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL is required when STORAGE_BACKEND=postgres");
        }

        let outbox_batch_size: usize = parse_or(&get, "OUTBOX_BATCH_SIZE", 100)?;
        if outbox_batch_size == 0 {
            bail!("OUTBOX_BATCH_SIZE must be at least 1");
        }

        Ok(Self {
            server_host: get("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            server_port: parse_or(&get, "SERVER_PORT", 8080)?,
            storage,
            database_url,
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            kafka_brokers: get("KAFKA_BROKERS"),
            order_events_topic: get("ORDER_EVENTS_TOPIC").unwrap_or_else(|| "order-events".to_string()),
            outbox_poll_interval: Duration::from_millis(parse_or(&get, "OUTBOX_POLL_INTERVAL_MS", 500)?),
            outbox_batch_size,
            placement_timeout: Duration::from_millis(parse_or(&get, "PLACEMENT_TIMEOUT_MS", 5_000)?),
            seed_demo_catalog: parse_or(&get, "SEED_DEMO_CATALOG", false)?,
        })
    }
}

fn parse_or<T, G>(get: &G, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid {} value '{}'", name, raw)),
        None => Ok(default),
    }
}
