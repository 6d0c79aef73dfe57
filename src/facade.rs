//! Explorer
//! --------
//! The one entry point callers hold: runs SQL verbatim against the engine
//! and rebuilds every view (plus the label table in dashboard mode). Only
//! one rebuild runs at a time; a second caller waits for the first.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::ExplorerConfig;
use crate::engine::{QueryEngine, ResultSet};
use crate::error::AppResult;
use crate::fetch::Fetcher;
use crate::labels::{builtin_labels, LabelMapBuilder, LabelReport};
use crate::registry::{RegistryBuilder, RegistryResult, StateViewBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One `state` view over the manifest.
    Explorer,
    /// Per-table views plus `wallet_map`.
    Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
    pub registry: RegistryResult,
    pub labels: Option<LabelReport>,
}

struct Progress {
    status: Status,
    last_error: Option<String>,
    last_report: Option<RebuildReport>,
}

pub struct Explorer {
    engine: Arc<dyn QueryEngine>,
    fetcher: Arc<dyn Fetcher>,
    config: ExplorerConfig,
    mode: Mode,
    rebuild_lock: tokio::sync::Mutex<()>,
    progress: Mutex<Progress>,
}

impl Explorer {
    pub fn new(engine: Arc<dyn QueryEngine>, fetcher: Arc<dyn Fetcher>, config: ExplorerConfig, mode: Mode) -> Self {
        Self {
            engine,
            fetcher,
            config,
            mode,
            rebuild_lock: tokio::sync::Mutex::new(()),
            progress: Mutex::new(Progress { status: Status::Idle, last_error: None, last_report: None }),
        }
    }

    pub fn mode(&self) -> Mode { self.mode }

    pub fn config(&self) -> &ExplorerConfig { &self.config }

    pub fn status(&self) -> Status { self.progress.lock().status }

    pub fn last_error(&self) -> Option<String> { self.progress.lock().last_error.clone() }

    pub fn last_report(&self) -> Option<RebuildReport> { self.progress.lock().last_report.clone() }

    /// Run `sql` as given. A failure is recorded as the last error but does
    /// not change readiness.
    pub async fn execute(&self, sql: &str) -> AppResult<ResultSet> {
        match self.engine.execute(sql).await {
            Ok(rs) => Ok(rs),
            Err(e) => {
                error!(target: "harborx::facade", "query failed: {}", e);
                self.progress.lock().last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Replace every view (and the label table in dashboard mode).
    pub async fn rebuild(&self) -> AppResult<RebuildReport> {
        let _guard = self.rebuild_lock.lock().await;
        self.set_status(Status::Loading, None);
        match self.rebuild_inner().await {
            Ok(report) => {
                let mut p = self.progress.lock();
                p.status = Status::Ready;
                p.last_error = None;
                p.last_report = Some(report.clone());
                Ok(report)
            }
            Err(e) => {
                error!(target: "harborx::facade", "rebuild failed: {}", e);
                self.set_status(Status::Error, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// First load at startup. With `keep_going` a failure is logged and left
    /// in `status`/`last_error` for an interactive session to retry.
    pub async fn initial_load(&self, keep_going: bool) -> AppResult<Option<RebuildReport>> {
        match self.rebuild().await {
            Ok(report) => Ok(Some(report)),
            Err(e) if keep_going => {
                warn!(target: "harborx::facade", "initial load failed, continuing without views: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn rebuild_inner(&self) -> AppResult<RebuildReport> {
        let cfg = &self.config;
        cfg.validate()?;
        let engine = self.engine.as_ref();
        let fetcher = self.fetcher.as_ref();
        match self.mode {
            Mode::Explorer => {
                let manifest_url = cfg.layout.manifest_url(&cfg.base_url)?;
                let registry = StateViewBuilder::new(engine, fetcher, manifest_url)
                    .chunk_size(cfg.view_chunk)
                    .extensions(state_extensions(&cfg.extensions))
                    .build()
                    .await?;
                info!(target: "harborx::facade", "explorer ready: {} files", registry.total_files());
                Ok(RebuildReport { registry, labels: None })
            }
            Mode::Dashboard => {
                let variant = cfg.variant();
                info!(target: "harborx::facade", "rebuilding dashboard views for {} data", variant);
                let registry = RegistryBuilder::new(engine, fetcher, cfg.base_url.clone())
                    .chunk_size(cfg.view_chunk)
                    .layout(cfg.layout.clone())
                    .extensions(cfg.extensions.iter().cloned())
                    .build(variant)
                    .await?;
                let (_, labels) = LabelMapBuilder::new(engine, fetcher, cfg.base_url.clone())
                    .layout(cfg.layout.clone())
                    .chunk_size(cfg.label_chunk)
                    .build(variant, &builtin_labels())
                    .await?;
                Ok(RebuildReport { registry, labels: Some(labels) })
            }
        }
    }

    fn set_status(&self, status: Status, err: Option<String>) {
        let mut p = self.progress.lock();
        p.status = status;
        if err.is_some() {
            p.last_error = err;
        }
    }
}

/// The state view reads Arrow files, so `arrow` is always probed as well.
fn state_extensions(configured: &[String]) -> Vec<String> {
    let mut out = configured.to_vec();
    if !out.iter().any(|e| e.eq_ignore_ascii_case("arrow")) {
        out.push("arrow".to_string());
    }
    out
}
