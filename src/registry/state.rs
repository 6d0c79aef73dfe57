//! Single `state` view over the explorer manifest, Arrow files preferred.

use reqwest::Url;
use tracing::{info, warn};

use super::compose::{self, FileFormat};
use super::{RegistryResult, TableLoad, DEFAULT_VIEW_CHUNK};
use crate::engine::{probe_extensions, QueryEngine};
use crate::error::{AppError, AppResult};
use crate::fetch::Fetcher;
use crate::manifest::ExplorerManifest;

pub const STATE_VIEW: &str = "state";
pub const STATE_EXTENSIONS: [&str; 2] = ["httpfs", "arrow"];

pub struct StateViewBuilder<'a> {
    engine: &'a dyn QueryEngine,
    fetcher: &'a dyn Fetcher,
    manifest_url: Url,
    chunk_size: usize,
    extensions: Vec<String>,
}

impl<'a> StateViewBuilder<'a> {
    pub fn new(engine: &'a dyn QueryEngine, fetcher: &'a dyn Fetcher, manifest_url: Url) -> Self {
        Self {
            engine,
            fetcher,
            manifest_url,
            chunk_size: DEFAULT_VIEW_CHUNK,
            extensions: STATE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n;
        self
    }

    pub fn extensions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = names.into_iter().map(Into::into).collect();
        self
    }

    pub async fn build(&self) -> AppResult<RegistryResult> {
        if self.chunk_size == 0 {
            return Err(AppError::config("bad_chunk_size", "view chunk size must be at least 1"));
        }
        let doc = match self.fetcher.fetch_json(&self.manifest_url).await {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "harborx::registry", "manifest {} unusable: {}", self.manifest_url, e);
                return Err(AppError::source_unavailable([self.manifest_url.to_string()]));
            }
        };
        let manifest = ExplorerManifest::from_json(&doc)
            .map_err(|_| AppError::source_unavailable([self.manifest_url.to_string()]))?
            .resolved(&self.manifest_url);

        let extensions = probe_extensions(self.engine, &self.extensions).await;

        let (format, files) = self.choose_format(&manifest).await?;
        let plan = compose::plan_union_view(STATE_VIEW, files, format, self.chunk_size);
        for stmt in &plan.statements {
            self.engine.execute(stmt).await?;
        }
        info!(
            target: "harborx::registry",
            "state view over {} {} files in {} chunks",
            files.len(),
            format,
            plan.chunk_views.len()
        );
        Ok(RegistryResult {
            variant: None,
            location: self.manifest_url.to_string(),
            format,
            tables: vec![TableLoad {
                name: STATE_VIEW.to_string(),
                files: files.len(),
                chunks: plan.chunk_views.len(),
                fallback: false,
            }],
            extensions,
        })
    }

    async fn choose_format<'m>(&self, m: &'m ExplorerManifest) -> AppResult<(FileFormat, &'m [String])> {
        let (format, files) = match (m.arrow.first(), m.parquet.first()) {
            (Some(_), _) => (FileFormat::Arrow, m.arrow.as_slice()),
            (None, Some(_)) => (FileFormat::Parquet, m.parquet.as_slice()),
            (None, None) => {
                return Err(AppError::query("empty_manifest", format!("{} lists no arrow or parquet files", self.manifest_url)));
            }
        };
        let probe = compose::probe_sql(format, &files[0]);
        match self.engine.execute(&probe).await {
            Ok(_) => Ok((format, files)),
            Err(e) if format == FileFormat::Arrow && !m.parquet.is_empty() => {
                warn!(target: "harborx::registry", "arrow unreadable ({}); falling back to parquet", e);
                Ok((FileFormat::Parquet, m.parquet.as_slice()))
            }
            Err(e) => Err(e),
        }
    }
}
