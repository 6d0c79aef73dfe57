//! Table registry
//! --------------
//! Turns a table-list document into engine views. Each catalog table always
//! ends up queryable: with its files when it has any, otherwise as an empty
//! view carrying its fallback schema so downstream queries still bind.

pub mod compose;
pub mod state;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::engine::{probe_extensions, ExtensionProbe, QueryEngine};
use crate::error::{AppError, AppResult};
use crate::fetch::Fetcher;
use crate::layout::{fetch_first, variant_candidates, SourceLayout};
use crate::manifest::{resolve_all, TableList};
use crate::variant::Variant;

pub use compose::{FileFormat, ViewPlan, DEFAULT_VIEW_CHUNK};
pub use state::StateViewBuilder;

pub const DEFAULT_EXTENSIONS: [&str; 1] = ["httpfs"];

/// How one logical table was registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLoad {
    pub name: String,
    pub files: usize,
    pub chunks: usize,
    /// Registered as the empty typed view.
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryResult {
    /// Variant whose document was used; `None` for the explorer manifest.
    pub variant: Option<Variant>,
    pub location: String,
    pub format: FileFormat,
    pub tables: Vec<TableLoad>,
    pub extensions: Vec<ExtensionProbe>,
}

impl RegistryResult {
    pub fn table(&self, name: &str) -> Option<&TableLoad> { self.tables.iter().find(|t| t.name == name) }

    pub fn total_files(&self) -> usize { self.tables.iter().map(|t| t.files).sum() }
}

pub struct RegistryBuilder<'a> {
    engine: &'a dyn QueryEngine,
    fetcher: &'a dyn Fetcher,
    base: Url,
    catalog: Catalog,
    layout: SourceLayout,
    chunk_size: usize,
    extensions: Vec<String>,
}

impl<'a> RegistryBuilder<'a> {
    pub fn new(engine: &'a dyn QueryEngine, fetcher: &'a dyn Fetcher, base: Url) -> Self {
        Self {
            engine,
            fetcher,
            base,
            catalog: Catalog::state_diff(),
            layout: SourceLayout::default(),
            chunk_size: DEFAULT_VIEW_CHUNK,
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n;
        self
    }

    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn layout(mut self, layout: SourceLayout) -> Self {
        self.layout = layout;
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

    /// Fetch the table list for `variant` (falling back to the other variant
    /// once) and register one view per table.
    pub async fn build(&self, variant: Variant) -> AppResult<RegistryResult> {
        if self.chunk_size == 0 {
            return Err(AppError::config("bad_chunk_size", "view chunk size must be at least 1"));
        }
        let candidates = variant_candidates(variant, |v| self.layout.tables_url(&self.base, v))?;
        let found = fetch_first(self.fetcher, &candidates, TableList::from_json)
            .await
            .map_err(AppError::source_unavailable)?;
        if found.variant != variant {
            warn!(target: "harborx::registry", "table list for {} unavailable; using {}", variant, found.variant);
        }
        let list = found.doc;

        let extensions = probe_extensions(self.engine, &self.extensions).await;

        for spec in self.catalog.tables() {
            self.engine.execute(&compose::empty_view_sql(spec)).await?;
        }

        let mut tables = Vec::with_capacity(self.catalog.tables().len());
        for spec in self.catalog.tables() {
            let load = self.register(&spec.name, list.files(&spec.name)).await?;
            tables.push(load);
        }
        for name in list.names().filter(|n| !self.catalog.contains(n)) {
            let load = self.register(name, list.files(name)).await?;
            tables.push(load);
        }

        let result = RegistryResult {
            variant: Some(found.variant),
            location: found.url.to_string(),
            format: FileFormat::Parquet,
            tables,
            extensions,
        };
        info!(
            target: "harborx::registry",
            "registered {} tables ({} files) from {}",
            result.tables.len(),
            result.total_files(),
            result.location
        );
        Ok(result)
    }

    async fn register(&self, name: &str, locators: &[String]) -> AppResult<TableLoad> {
        if locators.is_empty() {
            debug!(target: "harborx::registry", "{}: no files", name);
            let fallback = self.catalog.contains(name);
            return Ok(TableLoad { name: name.to_string(), files: 0, chunks: 0, fallback });
        }
        let files = resolve_all(&self.base, locators);
        let plan = compose::plan_union_view(name, &files, FileFormat::Parquet, self.chunk_size);
        for stmt in &plan.statements {
            self.engine.execute(stmt).await?;
        }
        debug!(target: "harborx::registry", "{}: {} files in {} chunks", name, files.len(), plan.chunk_views.len());
        Ok(TableLoad { name: name.to_string(), files: files.len(), chunks: plan.chunk_views.len(), fallback: false })
    }
}
