use std::{env, net::SocketAddr, num::NonZeroUsize, str::FromStr, time::Duration};

use thiserror::Error;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

/// ストアの実装。`postgres` は Postgres と Redis の組み合わせ。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "postgres" | "postgres+redis" => Ok(Self::Postgres),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!(
                "unknown storage backend `{other}` (expected postgres or memory)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    storage_backend: StorageBackend,
    db_dsn: Option<String>,
    redis_url: Option<String>,
    db_max_connections: u32,
    db_min_connections: u32,
    db_acquire_timeout: Duration,
    db_ensure_schema: bool,
    redis_connect_timeout: Duration,
    redis_retries: usize,
    refresh_interval: Duration,
    refresh_limit: usize,
    default_limit: usize,
    max_limit: NonZeroUsize,
    request_timeout: Duration,
    otel_exporter_endpoint: Option<String>,
    otel_sampling_ratio: f64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数からフィードサービスの設定値を読み込み、検証する。
    ///
    /// # Errors
    /// `postgres` バックエンドで `FEED_DB_DSN` / `FEED_REDIS_URL` が未設定の場合や、
    /// 各種値のパースに失敗した場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_bind = parse_socket_addr("FEED_HTTP_BIND", "0.0.0.0:9010")?;
        let storage_backend = parse_from_str("FEED_STORAGE_BACKEND", "postgres")?;

        let (db_dsn, redis_url) = match storage_backend {
            StorageBackend::Postgres => (
                Some(env_var("FEED_DB_DSN")?),
                Some(env_var("FEED_REDIS_URL")?),
            ),
            StorageBackend::Memory => (env::var("FEED_DB_DSN").ok(), env::var("FEED_REDIS_URL").ok()),
        };

        // Connection pool settings
        let db_max_connections = parse_u32("FEED_DB_MAX_CONNECTIONS", 20)?;
        let db_min_connections = parse_u32("FEED_DB_MIN_CONNECTIONS", 2)?;
        if db_min_connections > db_max_connections {
            return Err(ConfigError::Invalid {
                name: "FEED_DB_MIN_CONNECTIONS",
                source: anyhow::anyhow!(
                    "must not exceed FEED_DB_MAX_CONNECTIONS ({db_max_connections})"
                ),
            });
        }
        let db_acquire_timeout = parse_duration_secs("FEED_DB_ACQUIRE_TIMEOUT_SECS", 30)?;
        let db_ensure_schema = parse_bool("FEED_DB_ENSURE_SCHEMA", false)?;
        let redis_connect_timeout = parse_duration_ms("FEED_REDIS_CONNECT_TIMEOUT_MS", 500)?;
        let redis_retries = parse_usize("FEED_REDIS_RETRIES", 1)?;

        // Refresh scheduler
        let refresh_interval = parse_duration_secs("FEED_REFRESH_INTERVAL_SECS", 10)?;
        if refresh_interval.is_zero() {
            return Err(ConfigError::Invalid {
                name: "FEED_REFRESH_INTERVAL_SECS",
                source: anyhow::anyhow!("must be greater than zero"),
            });
        }
        let refresh_limit = parse_usize("FEED_REFRESH_LIMIT", 10)?;

        // Foreground requests
        let default_limit = parse_usize("FEED_DEFAULT_LIMIT", 20)?;
        let max_limit = parse_non_zero_usize("FEED_MAX_LIMIT", 200)?;
        if default_limit > max_limit.get() {
            return Err(ConfigError::Invalid {
                name: "FEED_DEFAULT_LIMIT",
                source: anyhow::anyhow!("must not exceed FEED_MAX_LIMIT ({max_limit})"),
            });
        }
        let request_timeout = parse_duration_ms("FEED_REQUEST_TIMEOUT_MS", 5000)?;

        // OpenTelemetry settings
        let otel_exporter_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let otel_sampling_ratio = parse_f64("OTEL_SAMPLING_RATIO", 1.0)?;
        if !(0.0..=1.0).contains(&otel_sampling_ratio) {
            return Err(ConfigError::Invalid {
                name: "OTEL_SAMPLING_RATIO",
                source: anyhow::anyhow!("value must be between 0.0 and 1.0"),
            });
        }

        Ok(Self {
            http_bind,
            storage_backend,
            db_dsn,
            redis_url,
            db_max_connections,
            db_min_connections,
            db_acquire_timeout,
            db_ensure_schema,
            redis_connect_timeout,
            redis_retries,
            refresh_interval,
            refresh_limit,
            default_limit,
            max_limit,
            request_timeout,
            otel_exporter_endpoint,
            otel_sampling_ratio,
        })
    }

    /// 外部依存なしで動くインメモリ構成（テスト・ローカル実行向け）。
    #[must_use]
    pub fn in_memory(http_bind: SocketAddr) -> Self {
        Self {
            http_bind,
            storage_backend: StorageBackend::Memory,
            db_dsn: None,
            redis_url: None,
            db_max_connections: 20,
            db_min_connections: 2,
            db_acquire_timeout: Duration::from_secs(30),
            db_ensure_schema: false,
            redis_connect_timeout: Duration::from_millis(500),
            redis_retries: 1,
            refresh_interval: Duration::from_secs(10),
            refresh_limit: 10,
            default_limit: 20,
            max_limit: NonZeroUsize::new(200).unwrap_or(NonZeroUsize::MIN),
            request_timeout: Duration::from_millis(5000),
            otel_exporter_endpoint: None,
            otel_sampling_ratio: 1.0,
        }
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn storage_backend(&self) -> StorageBackend {
        self.storage_backend
    }

    #[must_use]
    pub fn db_dsn(&self) -> Option<&str> {
        self.db_dsn.as_deref()
    }

    #[must_use]
    pub fn redis_url(&self) -> Option<&str> {
        self.redis_url.as_deref()
    }

    #[must_use]
    pub fn db_max_connections(&self) -> u32 {
        self.db_max_connections
    }

    #[must_use]
    pub fn db_min_connections(&self) -> u32 {
        self.db_min_connections
    }

    #[must_use]
    pub fn db_acquire_timeout(&self) -> Duration {
        self.db_acquire_timeout
    }

    #[must_use]
    pub fn db_ensure_schema(&self) -> bool {
        self.db_ensure_schema
    }

    #[must_use]
    pub fn redis_connect_timeout(&self) -> Duration {
        self.redis_connect_timeout
    }

    #[must_use]
    pub fn redis_retries(&self) -> usize {
        self.redis_retries
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    #[must_use]
    pub fn refresh_limit(&self) -> usize {
        self.refresh_limit
    }

    #[must_use]
    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    #[must_use]
    pub fn max_limit(&self) -> NonZeroUsize {
        self.max_limit
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn otel_exporter_endpoint(&self) -> Option<&str> {
        self.otel_exporter_endpoint.as_deref()
    }

    #[must_use]
    pub fn otel_sampling_ratio(&self) -> f64 {
        self.otel_sampling_ratio
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_from_str<T>(name: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr<Err = anyhow::Error>,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|source| ConfigError::Invalid { name, source })
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let parsed = parse_usize(name, default)?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("must be greater than zero"),
    })
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_secs)?;
    Ok(Duration::from_secs(value))
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let ms = parse_u64(name, default_ms)?;
    Ok(Duration::from_millis(ms))
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<f64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("invalid boolean value: {raw}"),
        }),
    }
}
