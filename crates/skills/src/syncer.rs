//! Background mirror synchronization: timer loop, on-demand sync, list CRUD.

use std::{future::Future, path::PathBuf, pin::Pin, sync::Arc, time::Duration};

use {
    serde::Serialize,
    tokio::{
        sync::Mutex,
        task::JoinHandle,
        time::{Instant, MissedTickBehavior},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use metrics::{counter, histogram};

use crate::{
    discover::MirrorSnapshot,
    error::{Error, ErrorKind, Result, blocking},
    git::{GitClient, PullStatus, is_working_copy},
    mirror::MirrorStore,
    types::MirrorConfig,
};

/// Default period of the background sync cycle.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(300);

#[cfg(feature = "metrics")]
mod sync_metrics {
    pub const ATTEMPTS_TOTAL: &str = "skillshelf_mirror_sync_attempts_total";
    pub const FAILURES_TOTAL: &str = "skillshelf_mirror_sync_failures_total";
    pub const DURATION_SECONDS: &str = "skillshelf_mirror_sync_duration_seconds";
}

/// Callback invoked after the filesystem changed because of a sync.
pub type UpdateFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// What a single successful sync did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Cloned,
    Updated,
    Unchanged,
}

/// Per-mirror result of a [`MirrorSyncer::sync_all`] pass.
#[derive(Debug, Clone, Serialize)]
pub struct MirrorOutcome {
    pub url: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SyncStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl MirrorOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub outcomes: Vec<MirrorOutcome>,
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

#[derive(Debug, Clone)]
pub struct SyncerOptions {
    pub root: PathBuf,
    pub interval: Duration,
    /// Run one full sync in the foreground when [`MirrorSyncer::start`]
    /// is called.
    pub sync_on_start: bool,
}

impl SyncerOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            interval: DEFAULT_SYNC_INTERVAL,
            sync_on_start: true,
        }
    }
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the mirror list and keeps working copies under the root current.
pub struct MirrorSyncer {
    root: PathBuf,
    interval: Duration,
    sync_on_start: bool,
    store: MirrorStore,
    git: Arc<dyn GitClient>,
    mirrors: Mutex<Vec<MirrorConfig>>,
    on_update: Option<UpdateFn>,
    running: Mutex<Option<Running>>,
}

impl MirrorSyncer {
    pub fn new(
        options: SyncerOptions,
        mirrors: Vec<MirrorConfig>,
        git: Arc<dyn GitClient>,
        on_update: Option<UpdateFn>,
    ) -> Arc<Self> {
        let interval = if options.interval.is_zero() {
            warn!(
                default_secs = DEFAULT_SYNC_INTERVAL.as_secs(),
                "sync interval of zero, using default"
            );
            DEFAULT_SYNC_INTERVAL
        } else {
            options.interval
        };
        Arc::new(Self {
            store: MirrorStore::in_root(&options.root),
            root: options.root,
            interval,
            sync_on_start: options.sync_on_start,
            git,
            mirrors: Mutex::new(mirrors),
            on_update,
            running: Mutex::new(None),
        })
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Sync once in the foreground, then keep syncing every interval until
    /// [`Self::stop`]. A second call while running does nothing.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!("mirror syncer already running");
            return Ok(());
        }

        if self.sync_on_start
            && let Err(e) = self.sync_all().await
        {
            warn!(error = %e, "initial mirror sync failed");
        }

        let token = CancellationToken::new();
        let svc = Arc::clone(self);
        let child = token.clone();
        let handle = tokio::spawn(async move {
            svc.timer_loop(child).await;
        });
        *running = Some(Running { token, handle });
        info!(interval_secs = self.interval.as_secs(), "mirror syncer started");
        Ok(())
    }

    /// Cancel the background cycle. A sync already in flight completes first.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.token.cancel();
        if let Err(e) = running.handle.await {
            warn!(error = %e, "mirror sync task ended abnormally");
        }
        info!("mirror syncer stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    async fn timer_loop(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_all().await {
                        warn!(error = %e, "periodic mirror sync failed");
                    }
                },
            }
        }
        debug!("mirror sync loop exited");
    }

    // ── Mirror list ─────────────────────────────────────────────────────────

    pub async fn list_mirrors(&self) -> Vec<MirrorConfig> {
        self.mirrors.lock().await.clone()
    }

    pub async fn snapshot(&self) -> MirrorSnapshot {
        MirrorSnapshot::from_configs(&self.mirrors.lock().await)
    }

    /// Append URLs that are not configured yet, enabled, without syncing.
    pub async fn seed(&self, urls: &[String]) -> Vec<MirrorConfig> {
        let mut added = Vec::new();
        {
            let mut mirrors = self.mirrors.lock().await;
            for url in urls {
                let config = match MirrorConfig::from_url(url) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(%url, error = %e, "ignoring configured mirror url");
                        continue;
                    },
                };
                if mirrors
                    .iter()
                    .any(|m| m.url == config.url || m.name == config.name)
                {
                    continue;
                }
                mirrors.push(config.clone());
                added.push(config);
            }
        }
        if !added.is_empty() {
            self.persist().await;
        }
        added
    }

    /// Validate, append and sync a new mirror. The append is rolled back if
    /// the first sync fails.
    pub async fn add_mirror(&self, url: &str) -> Result<MirrorConfig> {
        let config = MirrorConfig::from_url(url)?;
        {
            let mut mirrors = self.mirrors.lock().await;
            if mirrors.iter().any(|m| m.url == config.url) {
                return Err(Error::already_exists("mirror", &config.url));
            }
            if let Some(other) = mirrors.iter().find(|m| m.name == config.name) {
                return Err(Error::already_exists(
                    "mirror directory",
                    format!("{} (used by {})", config.name, other.url),
                ));
            }
            let dir = self.root.join(&config.name);
            if tokio::fs::symlink_metadata(&dir).await.is_ok() && !is_working_copy(&dir).await {
                return Err(Error::already_exists("skill directory", &config.name));
            }
            mirrors.push(config.clone());
        }

        if let Err(e) = self.sync_mirror(&config).await {
            self.mirrors.lock().await.retain(|m| m.url != config.url);
            warn!(url = %config.url, error = %e, "mirror add rolled back");
            return Err(e);
        }

        self.persist().await;
        info!(url = %config.url, name = %config.name, "mirror added");
        self.notify().await?;
        Ok(config)
    }

    /// Drop a mirror from the list. Its working directory is left in place.
    pub async fn remove_mirror(&self, url: &str) -> Result<MirrorConfig> {
        let removed = {
            let mut mirrors = self.mirrors.lock().await;
            let pos = mirrors
                .iter()
                .position(|m| m.url == url.trim())
                .ok_or_else(|| Error::mirror_not_found(url))?;
            mirrors.remove(pos)
        };
        self.persist().await;
        info!(url = %removed.url, "mirror removed");
        Ok(removed)
    }

    pub async fn set_enabled(&self, url: &str, enabled: bool) -> Result<MirrorConfig> {
        let updated = {
            let mut mirrors = self.mirrors.lock().await;
            let mirror = mirrors
                .iter_mut()
                .find(|m| m.url == url.trim())
                .ok_or_else(|| Error::mirror_not_found(url))?;
            mirror.enabled = enabled;
            mirror.clone()
        };
        self.persist().await;
        info!(url = %updated.url, enabled, "mirror toggled");
        Ok(updated)
    }

    // ── Syncing ─────────────────────────────────────────────────────────────

    /// Sync one configured mirror on demand.
    pub async fn sync_one(&self, url: &str) -> Result<SyncStatus> {
        let config = self
            .mirrors
            .lock()
            .await
            .iter()
            .find(|m| m.url == url.trim())
            .cloned()
            .ok_or_else(|| Error::mirror_not_found(url))?;
        let status = self.sync_mirror(&config).await?;
        info!(url = %config.url, ?status, "mirror synced");
        self.notify().await?;
        Ok(status)
    }

    /// Sync every enabled mirror independently, then notify once.
    ///
    /// Per-mirror failures are recorded in the report. Only a failing update
    /// callback is returned as an error.
    pub async fn sync_all(&self) -> Result<SyncReport> {
        let enabled: Vec<MirrorConfig> = self
            .mirrors
            .lock()
            .await
            .iter()
            .filter(|m| m.enabled)
            .cloned()
            .collect();

        let mut report = SyncReport::default();
        for config in enabled {
            let outcome = match self.sync_mirror(&config).await {
                Ok(status) => MirrorOutcome {
                    url: config.url,
                    name: config.name,
                    status: Some(status),
                    error: None,
                    error_kind: None,
                },
                Err(e) => {
                    warn!(url = %config.url, error = %e, "mirror sync failed");
                    MirrorOutcome {
                        url: config.url,
                        name: config.name,
                        status: None,
                        error_kind: Some(e.kind()),
                        error: Some(e.to_string()),
                    }
                },
            };
            report.outcomes.push(outcome);
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "mirror sync pass finished"
        );
        self.notify().await?;
        Ok(report)
    }

    async fn sync_mirror(&self, config: &MirrorConfig) -> Result<SyncStatus> {
        #[cfg(feature = "metrics")]
        let start = std::time::Instant::now();

        #[cfg(feature = "metrics")]
        counter!(sync_metrics::ATTEMPTS_TOTAL).increment(1);

        let result = self.clone_or_pull(config).await;

        #[cfg(feature = "metrics")]
        {
            if result.is_err() {
                counter!(sync_metrics::FAILURES_TOTAL).increment(1);
            }
            histogram!(sync_metrics::DURATION_SECONDS).record(start.elapsed().as_secs_f64());
        }

        result
    }

    async fn clone_or_pull(&self, config: &MirrorConfig) -> Result<SyncStatus> {
        let dir = self.root.join(&config.name);
        if tokio::fs::try_exists(&dir).await? {
            debug!(url = %config.url, dir = %dir.display(), "pulling mirror");
            Ok(match self.git.pull(&dir).await? {
                PullStatus::Updated => SyncStatus::Updated,
                PullStatus::Unchanged => SyncStatus::Unchanged,
            })
        } else {
            tokio::fs::create_dir_all(&self.root).await?;
            debug!(url = %config.url, dir = %dir.display(), "cloning mirror");
            self.git.clone_repo(&config.url, &dir).await?;
            Ok(SyncStatus::Cloned)
        }
    }

    async fn notify(&self) -> Result<()> {
        match &self.on_update {
            Some(callback) => callback().await,
            None => Ok(()),
        }
    }

    /// Write the current list to the sidecar. Failures are logged only.
    async fn persist(&self) {
        let snapshot = self.mirrors.lock().await.clone();
        let store = self.store.clone();
        if let Err(e) = blocking(move || store.save(&snapshot)).await {
            warn!(path = %self.store.path().display(), error = %e, "failed to persist mirror list");
        }
    }
}
