//! Wallet labels keyed by account class hash.
//!
//! The map is exclusionary: a class hash with no confident label is simply
//! absent, so an inner join against `wallet_map` drops unlabeled accounts
//! instead of lumping them into an "unknown" bucket.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::QueryEngine;
use crate::error::{AppError, AppResult};
use crate::fetch::Fetcher;
use crate::layout::{fetch_first, variant_candidates, SourceLayout};
use crate::sql::{quote_ident, quote_literal};
use crate::variant::Variant;

pub const DEFAULT_LABEL_CHUNK: usize = 128;
pub const LABEL_TABLE: &str = "wallet_map";

/// Known account classes shipped with the binary.
pub const DEFAULT_WALLET_BY_CLASS: [(&str, &str); 4] = [
    ("0x36078334509b514626504edc9fb252328d1a240e4e948bef8d0c08dff45927f", "Argent X v0.4.0"),
    ("0x1a736d6ed154502257f02b1ccdf4d9d1089f80811cd6acad48e6b6a9d1f2003", "Argent (Cairo 1)"),
    ("0x25ec026985a3bf9d0cc1fe17326b245dfdc3ff89b8fde106542a3ea56c5a918", "Argent X Proxy (v0.2.x)"),
    ("0x4c6d6cf894f8bc96bb9c525e6853e5483177841f7388f74a46cfda6f028c755", "OpenZeppelin Account"),
];

const SENTINEL: &str = "unknown";

static HASH_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0[xX][0-9a-fA-F]{1,64}$").unwrap());

pub type LabelMap = BTreeMap<String, String>;

pub fn builtin_labels() -> LabelMap {
    DEFAULT_WALLET_BY_CLASS.iter().map(|(k, v)| (k.to_ascii_lowercase(), v.to_string())).collect()
}

pub fn is_hash_key(k: &str) -> bool { HASH_KEY_RE.is_match(k) }

/// Trimmed label, or `None` when empty or the "unknown" sentinel.
pub fn normalize_label(v: &str) -> Option<String> {
    let v = v.trim();
    if v.is_empty() || v.eq_ignore_ascii_case(SENTINEL) {
        return None;
    }
    Some(v.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    pub map: LabelMap,
    pub accepted: usize,
    pub rejected: usize,
}

/// Overlay the valid entries of `extra` (a JSON object) onto `base`.
/// Anything that is not an object contributes nothing.
pub fn merge_labels(base: &LabelMap, extra: Option<&Value>) -> MergeOutcome {
    let mut out = MergeOutcome { map: base.clone(), ..Default::default() };
    let Some(Value::Object(entries)) = extra else { return out };
    for (k, v) in entries {
        let label = match v {
            Value::String(s) if is_hash_key(k) => normalize_label(s),
            _ => None,
        };
        match label {
            Some(label) => {
                out.map.insert(k.to_ascii_lowercase(), label);
                out.accepted += 1;
            }
            None => out.rejected += 1,
        }
    }
    out
}

pub fn create_table_sql(table: &str) -> String {
    format!("CREATE OR REPLACE TEMP TABLE {}(class_hash TEXT PRIMARY KEY, wallet TEXT)", quote_ident(table))
}

/// Replace-then-fill statements for `map`, `chunk` rows per INSERT.
pub fn materialize_statements(table: &str, map: &LabelMap, chunk: usize) -> Vec<String> {
    let entries: Vec<(&String, &String)> = map.iter().collect();
    let mut out = vec![create_table_sql(table)];
    for group in entries.chunks(chunk.max(1)) {
        let values = group
            .iter()
            .map(|(k, v)| format!("({}, {})", quote_literal(&k.to_ascii_lowercase()), quote_literal(v)))
            .collect::<Vec<_>>()
            .join(", ");
        out.push(format!("INSERT INTO {} VALUES {}", quote_ident(table), values));
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelReport {
    /// Location of the external document that was merged, if any.
    pub source: Option<String>,
    pub builtin: usize,
    pub external_accepted: usize,
    pub external_rejected: usize,
    pub total: usize,
}

pub struct LabelMapBuilder<'a> {
    engine: &'a dyn QueryEngine,
    fetcher: &'a dyn Fetcher,
    base: Url,
    layout: SourceLayout,
    chunk_size: usize,
    table: String,
}

impl<'a> LabelMapBuilder<'a> {
    pub fn new(engine: &'a dyn QueryEngine, fetcher: &'a dyn Fetcher, base: Url) -> Self {
        Self {
            engine,
            fetcher,
            base,
            layout: SourceLayout::default(),
            chunk_size: DEFAULT_LABEL_CHUNK,
            table: LABEL_TABLE.to_string(),
        }
    }

    pub fn layout(mut self, layout: SourceLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n;
        self
    }

    pub fn table(mut self, name: &str) -> Self {
        self.table = name.to_string();
        self
    }

    /// The external document for `variant`, falling back to the other
    /// variant once. Absence is not an error.
    pub async fn load_external(&self, variant: Variant) -> AppResult<Option<(Url, Value)>> {
        let candidates = variant_candidates(variant, |v| self.layout.labels_url(&self.base, v))?;
        let found = fetch_first(self.fetcher, &candidates, |v| {
            if v.is_object() {
                Ok(v.clone())
            } else {
                Err(AppError::fetch("invalid_document", "label map must be a JSON object"))
            }
        })
        .await;
        match found {
            Ok(doc) => Ok(Some((doc.url, doc.doc))),
            Err(attempted) => {
                warn!(target: "harborx::labels", "no external label map ({}); using built-in labels only", attempted.join(", "));
                Ok(None)
            }
        }
    }

    /// Merge the external labels over `base_map` and materialize the result,
    /// replacing any previous table.
    pub async fn build(&self, variant: Variant, base_map: &LabelMap) -> AppResult<(LabelMap, LabelReport)> {
        if self.chunk_size == 0 {
            return Err(AppError::config("bad_chunk_size", "label chunk size must be at least 1"));
        }
        let external = self.load_external(variant).await?;
        let merged = merge_labels(base_map, external.as_ref().map(|(_, v)| v));
        for stmt in materialize_statements(&self.table, &merged.map, self.chunk_size) {
            self.engine.execute(&stmt).await?;
        }
        let report = LabelReport {
            source: external.map(|(u, _)| u.to_string()),
            builtin: base_map.len(),
            external_accepted: merged.accepted,
            external_rejected: merged.rejected,
            total: merged.map.len(),
        };
        if report.external_rejected > 0 {
            debug!(target: "harborx::labels", "{} external entries rejected", report.external_rejected);
        }
        info!(target: "harborx::labels", "{} holds {} labels", self.table, report.total);
        Ok((merged.map, report))
    }
}
