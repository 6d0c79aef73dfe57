//! Query engine capability
//! -----------------------
//! The registry, label merger and facade only ever talk to an engine through
//! [`QueryEngine::execute`]. [`LocalEngine`] is the in-process polars-backed
//! implementation; [`RecordingEngine`] captures statements for inspection.

pub mod local;
pub mod recording;
pub mod statement;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::AppResult;

pub use local::LocalEngine;
pub use recording::RecordingEngine;

#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Run one statement. Rejections come back as `AppError::Query` carrying
    /// the engine's message unchanged.
    async fn execute(&self, sql: &str) -> AppResult<ResultSet>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultColumn {
    pub name: String,
    pub data_type: String,
}

/// Columnar result flattened to rows of JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn empty() -> Self { Self::default() }

    pub fn row_count(&self) -> usize { self.rows.len() }

    pub fn column_names(&self) -> Vec<&str> { self.columns.iter().map(|c| c.name.as_str()).collect() }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    pub fn rows_as_maps(&self) -> Vec<serde_json::Map<String, Value>> {
        self.rows
            .iter()
            .map(|r| {
                self.columns
                    .iter()
                    .zip(r.iter())
                    .map(|(c, v)| (c.name.clone(), v.clone()))
                    .collect()
            })
            .collect()
    }
}

/// Outcome of one best-effort extension install/load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionProbe {
    pub name: String,
    pub available: bool,
    pub detail: Option<String>,
}

/// Try `INSTALL x; LOAD x;` for each extension. Never fails: an engine that
/// cannot provide an extension yields `available: false` and the caller
/// carries on.
pub async fn probe_extensions(engine: &dyn QueryEngine, names: &[String]) -> Vec<ExtensionProbe> {
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let mut detail = None;
        for verb in ["INSTALL", "LOAD"] {
            if let Err(e) = engine.execute(&format!("{} {};", verb, name)).await {
                debug!(target: "harborx::engine", "{} {} unavailable: {}", verb, name, e);
                detail = Some(e.message());
                break;
            }
        }
        out.push(ExtensionProbe { name: name.clone(), available: detail.is_none(), detail });
    }
    out
}
