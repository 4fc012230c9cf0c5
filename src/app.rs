use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::{
    api,
    config::{Config, StorageBackend},
    delivery::{FeedDelivery, LogDelivery},
    observability::Telemetry,
    pipeline::FeedEngine,
    scheduler::{RefreshScheduler, RefreshSettings},
    store::{MemoryStore, PgStore, RedisStore, StoreBundle},
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    engine: Arc<FeedEngine>,
    scheduler: Arc<RefreshScheduler>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn config(&self) -> &Config {
        &self.registry.config
    }

    pub(crate) fn engine(&self) -> &FeedEngine {
        &self.registry.engine
    }

    pub(crate) fn scheduler(&self) -> &RefreshScheduler {
        &self.registry.scheduler
    }
}

impl ComponentRegistry {
    /// 構成情報からストア・エンジン・スケジューラを初期化し、共有レジストリを構築する。
    ///
    /// # Errors
    /// Telemetry の初期化、コネクションプールの構成、Redis への接続、
    /// スキーマ作成のいずれかが失敗した場合はエラーを返す。
    pub async fn build(config: Config) -> Result<Self> {
        let telemetry = Telemetry::new(
            config.otel_exporter_endpoint(),
            config.otel_sampling_ratio(),
        )?;
        let stores = build_stores(&config).await?;
        Ok(Self::from_parts(
            config,
            telemetry,
            stores,
            Arc::new(LogDelivery),
        ))
    }

    /// 既に用意したストアと配信先からレジストリを組み立てる。
    #[must_use]
    pub fn from_parts(
        config: Config,
        telemetry: Telemetry,
        stores: StoreBundle,
        delivery: Arc<dyn FeedDelivery>,
    ) -> Self {
        let config = Arc::new(config);
        let metrics = telemetry.metrics_arc();
        let engine = Arc::new(FeedEngine::new(stores, Arc::clone(&metrics)));
        let scheduler = Arc::new(RefreshScheduler::new(
            Arc::clone(&engine),
            delivery,
            metrics,
            RefreshSettings {
                interval: config.refresh_interval(),
                limit: config.refresh_limit(),
            },
        ));

        Self {
            config,
            telemetry,
            engine,
            scheduler,
        }
    }

    #[must_use]
    pub fn engine(&self) -> Arc<FeedEngine> {
        Arc::clone(&self.engine)
    }

    #[must_use]
    pub fn scheduler(&self) -> Arc<RefreshScheduler> {
        Arc::clone(&self.scheduler)
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }
}

async fn build_stores(config: &Config) -> Result<StoreBundle> {
    match config.storage_backend() {
        StorageBackend::Memory => {
            warn!("using in-memory storage; posts and scores are lost on restart");
            Ok(StoreBundle::in_memory(Arc::new(MemoryStore::new())))
        }
        StorageBackend::Postgres => {
            let dsn = config
                .db_dsn()
                .context("FEED_DB_DSN is required for the postgres backend")?;
            let redis_url = config
                .redis_url()
                .context("FEED_REDIS_URL is required for the postgres backend")?;

            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections())
                .min_connections(config.db_min_connections())
                .acquire_timeout(config.db_acquire_timeout())
                .test_before_acquire(true)
                .connect_lazy(dsn)
                .context("failed to configure feed database connection pool")?;
            let pg = PgStore::new(pool);
            if config.db_ensure_schema() {
                pg.ensure_schema()
                    .await
                    .context("failed to ensure feed database schema")?;
                info!("feed database schema ensured");
            }

            let redis = RedisStore::connect(
                redis_url,
                config.redis_retries(),
                config.redis_connect_timeout(),
            )
            .await
            .context("failed to connect to redis")?;

            Ok(StoreBundle::postgres_redis(Arc::new(pg), Arc::new(redis)))
        }
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::config::ENV_MUTEX;

    fn memory_config() -> Config {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        // SAFETY: test code adjusts deterministic environment state sequentially.
        unsafe {
            std::env::set_var("FEED_STORAGE_BACKEND", "memory");
            std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");
        }
        let config = Config::from_env().expect("config loads");
        // SAFETY: see above.
        unsafe {
            std::env::remove_var("FEED_STORAGE_BACKEND");
        }
        config
    }

    #[tokio::test]
    async fn component_registry_builds_in_memory() {
        let registry = ComponentRegistry::build(memory_config())
            .await
            .expect("registry builds");
        let state = AppState::new(registry);

        state.telemetry().record_ready_probe();
        assert_eq!(state.config().storage_backend(), StorageBackend::Memory);

        let feed = state
            .engine()
            .build_feed(Uuid::new_v4(), 10)
            .await
            .expect("empty store builds an empty feed");
        assert!(feed.is_empty());
        assert!(state.scheduler().active_users().is_empty());
    }

    #[tokio::test]
    async fn from_parts_wires_refresh_settings() {
        let registry = ComponentRegistry::from_parts(
            Config::in_memory("127.0.0.1:0".parse().expect("addr")),
            Telemetry::without_tracing().expect("telemetry"),
            StoreBundle::in_memory(Arc::new(MemoryStore::new())),
            Arc::new(LogDelivery),
        );

        let settings = registry.scheduler().settings();
        assert_eq!(settings.interval, registry.config().refresh_interval());
        assert_eq!(settings.limit, registry.config().refresh_limit());
    }
}
