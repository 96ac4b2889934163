//! Postgres pool for the graph store.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use tessera_core::{Error, Result};

/// Connection cap when none is configured.
///
/// Ingestion awaits store calls sequentially, so one batch holds at most one
/// connection at a time.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default connection acquire timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Connection pool sizing and timeouts.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    /// Connection acquire timeout.
    pub connect_timeout: Duration,
    /// Connections older than this are recycled.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `TESSERA_DB_MAX_CONNECTIONS` and `TESSERA_DB_CONNECT_TIMEOUT_SECS`,
    /// falling back to defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_number("TESSERA_DB_MAX_CONNECTIONS") {
            config.max_connections = n as u32;
        }
        if let Some(secs) = env_number("TESSERA_DB_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout = Duration::from_secs(secs);
        }
        config
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

fn env_number(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.trim().parse().ok()
}

/// Pool for the graph store with default settings.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Connects eagerly, so an unreachable database fails here rather than on
/// the first store call.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();

    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout);
    if let Some(max_lifetime) = config.max_lifetime {
        options = options.max_lifetime(max_lifetime);
    }

    let pool = options.connect(database_url).await.map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "create",
        max_connections = config.max_connections,
        duration_ms = start.elapsed().as_millis() as u64,
        "Graph store connection pool established"
    );
    Ok(pool)
}
