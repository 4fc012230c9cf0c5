/// Prometheusメトリクス定義。
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, Registry, register_counter_vec_with_registry,
    register_counter_with_registry, register_gauge_with_registry,
    register_histogram_with_registry,
};
use std::sync::Arc;

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub feed_builds: Counter,
    pub feed_build_failures: Counter,
    pub degraded_sources: CounterVec,
    pub cache_writes: Counter,
    pub cache_write_failures: Counter,
    pub scoring_failures: Counter,
    pub refresh_ticks: Counter,
    pub refresh_failures: Counter,
    pub deliveries: Counter,

    // ヒストグラム
    pub feed_build_duration: Histogram,
    pub feed_size: Histogram,

    // ゲージ
    pub active_refresh_tasks: Gauge,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            feed_builds: register_counter_with_registry!(
                "feed_builds_total",
                "Total number of feed builds that returned a feed",
                registry
            )?,
            feed_build_failures: register_counter_with_registry!(
                "feed_build_failures_total",
                "Total number of feed builds that failed, were cancelled or timed out",
                registry
            )?,
            degraded_sources: register_counter_vec_with_registry!(
                "feed_degraded_sources_total",
                "Candidate sources that failed and were replaced by an empty set",
                &["source"],
                registry
            )?,
            cache_writes: register_counter_with_registry!(
                "feed_cache_writes_total",
                "Total number of score cache upserts",
                registry
            )?,
            cache_write_failures: register_counter_with_registry!(
                "feed_cache_write_failures_total",
                "Score cache upserts that failed and were dropped",
                registry
            )?,
            scoring_failures: register_counter_with_registry!(
                "feed_scoring_failures_total",
                "Candidates whose affinity score could not be computed",
                registry
            )?,
            refresh_ticks: register_counter_with_registry!(
                "feed_refresh_ticks_total",
                "Total number of background refresh ticks",
                registry
            )?,
            refresh_failures: register_counter_with_registry!(
                "feed_refresh_failures_total",
                "Background refresh ticks whose feed build failed",
                registry
            )?,
            deliveries: register_counter_with_registry!(
                "feed_deliveries_total",
                "Feed updates handed to the delivery collaborator",
                registry
            )?,
            feed_build_duration: register_histogram_with_registry!(
                "feed_build_duration_seconds",
                "Duration of a complete feed build",
                registry
            )?,
            feed_size: register_histogram_with_registry!(
                "feed_size_posts",
                "Number of post ids in a built feed",
                vec![0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0],
                registry
            )?,
            active_refresh_tasks: register_gauge_with_registry!(
                "feed_active_refresh_tasks",
                "Number of users with a running background refresh task",
                registry
            )?,
        })
    }

    /// 独自のレジストリに登録したコレクターを作成する（テストや単体利用向け）。
    pub fn detached() -> Result<Self, prometheus::Error> {
        Self::new(Arc::new(Registry::new()))
    }

    pub(crate) fn record_degraded(&self, source: &str) {
        self.degraded_sources.with_label_values(&[source]).inc();
    }
}
