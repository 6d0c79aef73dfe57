//! Dataset documents
//! -----------------
//! `_tables.json` maps logical table name -> ordered file locators.
//! `manifest.json` lists the explorer's Arrow and Parquet files.
//! Both are parsed leniently: non-array values and non-string entries are dropped.

use std::collections::BTreeMap;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{AppError, AppResult};

/// Table name -> file locators, in document order per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableList {
    pub tables: BTreeMap<String, Vec<String>>,
}

impl TableList {
    pub fn from_json(v: &Value) -> AppResult<Self> {
        let obj = v
            .as_object()
            .ok_or_else(|| AppError::fetch("invalid_document", "table list must be a JSON object"))?;
        let mut tables = BTreeMap::new();
        for (name, files) in obj {
            tables.insert(name.clone(), string_entries(files));
        }
        Ok(Self { tables })
    }

    /// Missing tables read as an empty list.
    pub fn files(&self, table: &str) -> &[String] {
        self.tables.get(table).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> { self.tables.keys().map(|s| s.as_str()) }

    pub fn to_json(&self) -> Value { serde_json::to_value(&self.tables).unwrap_or(Value::Null) }

    /// Append-only merge: existing order kept, new locators appended once.
    pub fn merge(&mut self, other: &TableList) -> usize {
        let mut added = 0usize;
        for (name, files) in &other.tables {
            added += append_unique(self.tables.entry(name.clone()).or_default(), files);
        }
        added
    }
}

/// Explorer manifest: Arrow first, Parquet as the fallback format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerManifest {
    #[serde(default)]
    pub arrow: Vec<String>,
    #[serde(default)]
    pub parquet: Vec<String>,
}

impl ExplorerManifest {
    pub fn from_json(v: &Value) -> AppResult<Self> {
        if !v.is_object() {
            return Err(AppError::fetch("invalid_document", "manifest must be a JSON object"));
        }
        Ok(Self {
            arrow: v.get("arrow").map(string_entries).unwrap_or_default(),
            parquet: v.get("parquet").map(string_entries).unwrap_or_default(),
        })
    }

    /// Resolve every locator relative to the manifest's own location.
    pub fn resolved(&self, manifest_url: &Url) -> ExplorerManifest {
        ExplorerManifest {
            arrow: resolve_all(manifest_url, &self.arrow),
            parquet: resolve_all(manifest_url, &self.parquet),
        }
    }

    /// Append-only merge: existing order kept, new locators appended once.
    /// Returns how many arrow and parquet entries were added.
    pub fn merge(&mut self, other: &ExplorerManifest) -> (usize, usize) {
        (append_unique(&mut self.arrow, &other.arrow), append_unique(&mut self.parquet, &other.parquet))
    }

    pub fn is_empty(&self) -> bool { self.arrow.is_empty() && self.parquet.is_empty() }
}

fn string_entries(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items.iter().filter_map(|x| x.as_str().map(str::to_string)).collect(),
        _ => Vec::new(),
    }
}

fn append_unique(into: &mut Vec<String>, from: &[String]) -> usize {
    let mut added = 0usize;
    for f in from {
        if !into.contains(f) {
            into.push(f.clone());
            added += 1;
        }
    }
    added
}

/// Absolute form of `locator`, relative ones joined onto `base`.
/// A locator that cannot be joined is passed through unchanged; the scan
/// that names it is where it fails.
pub fn resolve_locator(base: &Url, locator: &str) -> String {
    match base.join(locator) {
        Ok(u) => u.to_string(),
        Err(e) => {
            warn!(target: "harborx::manifest", "cannot resolve '{}' against {}: {}", locator, base, e);
            locator.to_string()
        }
    }
}

pub fn resolve_all(base: &Url, locators: &[String]) -> Vec<String> {
    locators.iter().map(|l| resolve_locator(base, l)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_list_is_lenient() {
        let v = json!({
            "storage_diffs": ["a.parquet", 7, null, "b.parquet"],
            "nonces": [],
            "declared_classes": "not-a-list"
        });
        let t = TableList::from_json(&v).unwrap();
        assert_eq!(t.files("storage_diffs"), ["a.parquet", "b.parquet"]);
        assert!(t.files("nonces").is_empty());
        assert!(t.files("declared_classes").is_empty());
        assert!(t.files("missing").is_empty());
        assert!(TableList::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn merge_appends_without_duplicates() {
        let mut a = TableList::from_json(&json!({"t": ["1", "2"]})).unwrap();
        let b = TableList::from_json(&json!({"t": ["2", "3"], "u": ["9"]})).unwrap();
        assert_eq!(a.merge(&b), 2);
        assert_eq!(a.files("t"), ["1", "2", "3"]);
        assert_eq!(a.files("u"), ["9"]);
        assert_eq!(a.merge(&b), 0);
    }

    #[test]
    fn manifest_locators_resolve_against_manifest_url() {
        let m = ExplorerManifest::from_json(&json!({"arrow": ["part-0.arrow", "/abs/x.arrow"], "parquet": ["http://cdn/y.parquet"]})).unwrap();
        let base = Url::parse("http://h:8000/app/data/manifest.json").unwrap();
        let r = m.resolved(&base);
        assert_eq!(r.arrow, vec!["http://h:8000/app/data/part-0.arrow", "http://h:8000/abs/x.arrow"]);
        assert_eq!(r.parquet, vec!["http://cdn/y.parquet"]);
    }

    #[test]
    fn unjoinable_locator_passes_through() {
        let base = Url::parse("http://h/").unwrap();
        assert_eq!(resolve_locator(&base, "http://[bad/x.parquet"), "http://[bad/x.parquet");
        assert_eq!(resolve_all(&base, &["a.parquet".to_string()]), vec!["http://h/a.parquet"]);
    }

    #[test]
    fn manifest_merge_is_append_only() {
        let mut a = ExplorerManifest::from_json(&json!({"arrow": ["x.arrow"]})).unwrap();
        let b = ExplorerManifest::from_json(&json!({"arrow": ["x.arrow", "y.arrow"], "parquet": ["p.parquet"]})).unwrap();
        assert_eq!(a.merge(&b), (1, 1));
        assert_eq!(a.arrow, vec!["x.arrow", "y.arrow"]);
        assert_eq!(a.merge(&b), (0, 0));
    }

    #[test]
    fn manifest_missing_keys_are_empty() {
        let m = ExplorerManifest::from_json(&json!({"arrow": ["a.arrow"]})).unwrap();
        assert!(m.parquet.is_empty());
        assert!(!m.is_empty());
        assert!(ExplorerManifest::from_json(&json!({})).unwrap().is_empty());
    }
}
