//! ユーザーごとの定期フィード再計算。
//!
//! Each tracked user owns one tokio task and one child [`CancellationToken`] of the
//! scheduler's root token. `stop` cancels a single task, `shutdown` cancels the root and waits
//! for every task to exit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::message::FeedUpdate;
use crate::delivery::FeedDelivery;
use crate::observability::metrics::Metrics;
use crate::pipeline::{Feed, FeedEngine, FeedError};
use crate::store::UserId;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_REFRESH_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSettings {
    pub interval: Duration,
    pub limit: usize,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REFRESH_INTERVAL,
            limit: DEFAULT_REFRESH_LIMIT,
        }
    }
}

struct RefreshHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct RefreshScheduler {
    engine: Arc<FeedEngine>,
    delivery: Arc<dyn FeedDelivery>,
    metrics: Arc<Metrics>,
    settings: RefreshSettings,
    root: CancellationToken,
    tasks: Mutex<HashMap<UserId, RefreshHandle>>,
}

impl RefreshScheduler {
    #[must_use]
    pub fn new(
        engine: Arc<FeedEngine>,
        delivery: Arc<dyn FeedDelivery>,
        metrics: Arc<Metrics>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            engine,
            delivery,
            metrics,
            settings,
            root: CancellationToken::new(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn settings(&self) -> RefreshSettings {
        self.settings
    }

    /// ユーザーの定期リフレッシュを開始する。既に追跡中なら何もしない。
    ///
    /// Returns `true` when a new task was spawned. Must be called from within a tokio runtime.
    pub fn start(&self, user_id: UserId) -> bool {
        // shutdown は cancel の後にロックを取って drain するので、判定はロック下で行う
        let mut tasks = self.lock_tasks();
        if self.root.is_cancelled() {
            warn!(%user_id, "refresh scheduler is shut down; ignoring start");
            return false;
        }
        if tasks
            .get(&user_id)
            .is_some_and(|existing| !existing.handle.is_finished())
        {
            debug!(%user_id, "refresh already running");
            return false;
        }

        let token = self.root.child_token();
        let worker = RefreshWorker {
            user_id,
            engine: Arc::clone(&self.engine),
            delivery: Arc::clone(&self.delivery),
            metrics: Arc::clone(&self.metrics),
            settings: self.settings,
            token: token.clone(),
        };
        let handle = worker.spawn();
        tasks.insert(user_id, RefreshHandle { token, handle });
        self.update_gauge(tasks.len());

        info!(
            %user_id,
            interval_secs = self.settings.interval.as_secs_f64(),
            limit = self.settings.limit,
            "feed refresh started"
        );
        true
    }

    /// ユーザーの定期リフレッシュを止める。追跡していなければ `false`。
    pub fn stop(&self, user_id: UserId) -> bool {
        let mut tasks = self.lock_tasks();
        let Some(entry) = tasks.remove(&user_id) else {
            return false;
        };
        entry.token.cancel();
        self.update_gauge(tasks.len());
        info!(%user_id, "feed refresh stopped");
        true
    }

    #[must_use]
    pub fn is_tracking(&self, user_id: UserId) -> bool {
        self.lock_tasks().contains_key(&user_id)
    }

    /// 追跡中のユーザー一覧（ID 昇順）。
    #[must_use]
    pub fn active_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.lock_tasks().keys().copied().collect();
        users.sort_unstable();
        users
    }

    /// 全タスクをキャンセルし、終了を待つ。
    pub async fn shutdown(&self) {
        self.root.cancel();
        let drained: Vec<(UserId, RefreshHandle)> = self.lock_tasks().drain().collect();
        self.update_gauge(0);

        for (user_id, entry) in drained {
            if let Err(error) = entry.handle.await {
                warn!(%user_id, %error, "refresh task ended abnormally");
            }
        }
        info!("refresh scheduler shut down");
    }

    /// 1 回分のリフレッシュを即時に実行して配信する。
    ///
    /// # Errors
    /// フィード構築が失敗した場合は [`FeedError`] を返す。
    pub async fn refresh_once(&self, user_id: UserId) -> Result<Feed, FeedError> {
        let feed = self
            .engine
            .build_feed_with_cancel(user_id, self.settings.limit, &self.root)
            .await?;
        deliver(&*self.delivery, &self.metrics, user_id, feed.clone()).await;
        Ok(feed)
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, RefreshHandle>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_gauge(&self, active: usize) {
        #[allow(clippy::cast_precision_loss)]
        let active = active as f64;
        self.metrics.active_refresh_tasks.set(active);
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

struct RefreshWorker {
    user_id: UserId,
    engine: Arc<FeedEngine>,
    delivery: Arc<dyn FeedDelivery>,
    metrics: Arc<Metrics>,
    settings: RefreshSettings,
    token: CancellationToken,
}

impl RefreshWorker {
    fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        let user_id = self.user_id;
        loop {
            tokio::select! {
                biased;
                () = self.token.cancelled() => break,
                () = sleep(self.settings.interval) => {}
            }

            self.metrics.refresh_ticks.inc();
            match self
                .engine
                .build_feed_with_cancel(user_id, self.settings.limit, &self.token)
                .await
            {
                Ok(feed) => deliver(&*self.delivery, &self.metrics, user_id, feed).await,
                Err(FeedError::Cancelled) => break,
                Err(error) => {
                    self.metrics.refresh_failures.inc();
                    warn!(%user_id, %error, "scheduled feed refresh failed");
                }
            }
        }
        debug!(%user_id, "refresh task exited");
    }
}

async fn deliver(delivery: &dyn FeedDelivery, metrics: &Metrics, user_id: UserId, feed: Feed) {
    let message = match FeedUpdate::new(user_id, feed).to_json() {
        Ok(message) => message,
        Err(error) => {
            warn!(%user_id, %error, "failed to encode feed update");
            return;
        }
    };
    delivery.deliver(user_id, message).await;
    metrics.deliveries.inc();
}
