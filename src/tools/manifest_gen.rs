use anyhow::{anyhow, Context, Result};
use path_absolutize::Absolutize;
use reqwest::Url;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::catalog::Catalog;
use crate::config::parse_base_url;
use crate::fetch::Fetcher;
use crate::manifest::{resolve_locator, ExplorerManifest, TableList};

const ARROW_EXTS: [&str; 3] = ["arrow", "ipc", "feather"];

#[derive(Debug, Clone)]
pub struct ManifestOptions {
    /// Data directory; `manifest.json` is written here and every entry is
    /// relative to it, matching how the explorer resolves them.
    pub data_dir: PathBuf,
    pub include_parquet: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct TablesOptions {
    /// Directory holding one subdirectory of `*.parquet` per table.
    pub state_diff_dir: PathBuf,
    /// Prefix put in front of `<table>/<file>`, relative to the site root.
    pub prefix: String,
    /// Tables to list; a table with no directory is listed with no files.
    pub tables: Vec<String>,
    /// Merge into an existing `_tables.json` instead of replacing it.
    pub merge: bool,
    pub dry_run: bool,
}

impl TablesOptions {
    pub fn state_diff(state_diff_dir: PathBuf, prefix: &str) -> Self {
        Self {
            state_diff_dir,
            prefix: prefix.trim_end_matches('/').to_string(),
            tables: Catalog::state_diff().tables().iter().map(|t| t.name.clone()).collect(),
            merge: true,
            dry_run: false,
        }
    }
}

fn extension_of(p: &Path) -> Option<String> { p.extension().map(|e| e.to_string_lossy().to_ascii_lowercase()) }

/// Relative path as URL path segments, each percent-encoded.
fn locator_for(rel: &Path) -> String {
    rel.components()
        .map(|c| urlencoding::encode(&c.as_os_str().to_string_lossy()).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Walk `data_dir` for Arrow (and optionally Parquet) files, sorted.
pub fn scan_manifest(opts: &ManifestOptions) -> Result<ExplorerManifest> {
    let root = opts.data_dir.absolutize()?.to_path_buf();
    if !root.is_dir() { return Err(anyhow!("data dir not found: {}", root.display())); }
    let mut arrow = Vec::new();
    let mut parquet = Vec::new();
    for entry in WalkDir::new(&root).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() { continue; }
        let Some(ext) = extension_of(entry.path()) else { continue };
        let rel = entry.path().strip_prefix(&root).with_context(|| format!("{} outside {}", entry.path().display(), root.display()))?;
        if ARROW_EXTS.contains(&ext.as_str()) {
            arrow.push(locator_for(rel));
        } else if opts.include_parquet && ext == "parquet" {
            parquet.push(locator_for(rel));
        }
    }
    arrow.sort();
    parquet.sort();
    Ok(ExplorerManifest { arrow, parquet })
}

/// Scan and write `<data_dir>/manifest.json`. Returns the path and the manifest.
pub fn write_manifest(opts: &ManifestOptions) -> Result<(PathBuf, ExplorerManifest)> {
    let manifest = scan_manifest(opts)?;
    let path = opts.data_dir.join("manifest.json");
    let mut doc = serde_json::json!({ "arrow": manifest.arrow });
    if opts.include_parquet {
        doc["parquet"] = serde_json::json!(manifest.parquet);
    }
    if !opts.dry_run {
        fs::write(&path, serde_json::to_string_pretty(&doc)?).with_context(|| format!("writing {}", path.display()))?;
    }
    tracing::info!(target: "harborx::tools", "[manifest] {} arrow file(s), {} parquet file(s)", manifest.arrow.len(), manifest.parquet.len());
    Ok((path, manifest))
}

/// Sorted `*.parquet` per table under `state_diff_dir`.
pub fn scan_tables(opts: &TablesOptions) -> Result<TableList> {
    let mut list = TableList::default();
    for t in &opts.tables {
        let dir = opts.state_diff_dir.join(t);
        let mut files: Vec<String> = Vec::new();
        if dir.is_dir() {
            for entry in fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
                let p = entry?.path();
                if p.is_file() && extension_of(&p).as_deref() == Some("parquet") {
                    let name = p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                    files.push(name);
                }
            }
        }
        files.sort();
        let files = files
            .into_iter()
            .map(|f| format!("{}/{}/{}", opts.prefix, urlencoding::encode(t), urlencoding::encode(&f)))
            .collect();
        list.tables.insert(t.clone(), files);
    }
    Ok(list)
}

/// Existing table list at `path`; a missing or unreadable document reads as empty.
fn read_table_list(path: &Path) -> TableList {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str::<Value>(&s).ok())
        .and_then(|v| TableList::from_json(&v).ok())
        .unwrap_or_default()
}

/// Scan and write `<state_diff_dir>/_tables.json`, merging append-only into
/// an existing document when asked. Returns the path and the written list.
pub fn write_tables(opts: &TablesOptions) -> Result<(PathBuf, TableList)> {
    let scanned = scan_tables(opts)?;
    let path = opts.state_diff_dir.join("_tables.json");
    let list = if opts.merge && path.exists() {
        // an unreadable existing document is replaced
        let mut existing = read_table_list(&path);
        let added = existing.merge(&scanned);
        tracing::info!(target: "harborx::tools", "[tables] merged {} new file(s) into {}", added, path.display());
        existing
    } else {
        scanned
    };
    if !opts.dry_run {
        fs::create_dir_all(&opts.state_diff_dir)?;
        fs::write(&path, serde_json::to_string_pretty(&list.to_json())?).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok((path, list))
}

/// Merge a remote dataset into a local data directory.
#[derive(Debug, Clone)]
pub struct AddOptions {
    /// `<data>/<subdir>`: receives `manifest.json` and `state_diff/_tables.json`.
    pub target_dir: PathBuf,
    /// Remote dataset root serving `manifest.json` and `state_diff/_tables.json`.
    pub base: Url,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddReport {
    pub manifest_path: PathBuf,
    pub backup: Option<PathBuf>,
    pub arrow_added: usize,
    pub parquet_added: usize,
    pub tables_path: PathBuf,
    pub tables_added: usize,
    /// No remote table list was found; the remote manifest's parquet files were
    /// listed as `storage_diffs` instead.
    pub tables_from_manifest: bool,
}

/// Absolute URL for a locator published by the remote dataset.
pub fn lake_locator(base: &Url, s: &str) -> String {
    if s.starts_with("http://") || s.starts_with("https://") { return s.to_string(); }
    let mut rel = s;
    while let Some(r) = rel.strip_prefix("./") { rel = r; }
    resolve_locator(base, rel.trim_start_matches('/'))
}

/// Table-list locators are site-root relative (`data/...`) on the remote side.
fn lake_table_locator(base: &Url, s: &str) -> String {
    lake_locator(base, s.strip_prefix("data/").unwrap_or(s))
}

fn absolutized(base: &Url, m: &ExplorerManifest) -> ExplorerManifest {
    let mut out = ExplorerManifest::default();
    out.merge(&ExplorerManifest {
        arrow: m.arrow.iter().map(|x| lake_locator(base, x)).collect(),
        parquet: m.parquet.iter().map(|x| lake_locator(base, x)).collect(),
    });
    out
}

/// Fetch the remote manifest (required) and table list (optional), make every
/// locator absolute against `base`, and merge both append-only into the local
/// documents. An existing local manifest is backed up first.
pub async fn add_remote(fetcher: &dyn Fetcher, opts: &AddOptions) -> Result<AddReport> {
    let base = parse_base_url(opts.base.as_str())?;
    let manifest_url = base.join("manifest.json")?;
    let raw = fetcher.fetch_json(&manifest_url).await.with_context(|| format!("fetching {}", manifest_url))?;
    let remote = absolutized(&base, &ExplorerManifest::from_json(&raw).with_context(|| format!("parsing {}", manifest_url))?);

    let manifest_path = opts.target_dir.join("manifest.json");
    let mut report = AddReport { manifest_path: manifest_path.clone(), ..Default::default() };

    let mut doc = serde_json::Map::new();
    let mut merged = ExplorerManifest::default();
    if manifest_path.exists() {
        let text = fs::read_to_string(&manifest_path).with_context(|| format!("reading {}", manifest_path.display()))?;
        let local: Value = serde_json::from_str(&text).with_context(|| format!("parsing {}", manifest_path.display()))?;
        merged = ExplorerManifest::from_json(&local)?;
        if let Value::Object(m) = local { doc = m; }
        let ts = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let backup = opts.target_dir.join("_backups").join(format!("manifest.local.{}.json", ts));
        if !opts.dry_run {
            fs::create_dir_all(opts.target_dir.join("_backups"))?;
            fs::write(&backup, &text).with_context(|| format!("writing {}", backup.display()))?;
        }
        report.backup = Some(backup);
    }
    let (arrow_added, parquet_added) = merged.merge(&remote);
    report.arrow_added = arrow_added;
    report.parquet_added = parquet_added;
    doc.insert("base".into(), Value::String(base.to_string()));
    doc.insert("arrow".into(), serde_json::json!(merged.arrow));
    doc.insert("parquet".into(), serde_json::json!(merged.parquet));
    if !opts.dry_run {
        fs::create_dir_all(&opts.target_dir)?;
        fs::write(&manifest_path, serde_json::to_string_pretty(&Value::Object(doc))?)
            .with_context(|| format!("writing {}", manifest_path.display()))?;
    }
    tracing::info!(
        target: "harborx::tools",
        "[add] {}: +{} arrow, +{} parquet",
        manifest_url,
        report.arrow_added,
        report.parquet_added
    );

    let tables_url = base.join("state_diff/_tables.json")?;
    let remote_tables = match fetcher.fetch_json(&tables_url).await.and_then(|v| TableList::from_json(&v)) {
        Ok(t) => Some(t),
        Err(e) => {
            tracing::info!(target: "harborx::tools", "[add] no remote table list at {} ({})", tables_url, e);
            None
        }
    };
    let mut incoming = TableList::default();
    match remote_tables {
        Some(t) => {
            for (name, files) in &t.tables {
                if files.is_empty() { continue; }
                incoming.tables.insert(name.clone(), files.iter().map(|f| lake_table_locator(&base, f)).collect());
            }
        }
        None => {
            report.tables_from_manifest = true;
            if !remote.parquet.is_empty() {
                incoming.tables.insert("storage_diffs".into(), remote.parquet.clone());
            }
        }
    }

    let state_diff = opts.target_dir.join("state_diff");
    let tables_path = state_diff.join("_tables.json");
    let mut list = read_table_list(&tables_path);
    report.tables_added = list.merge(&incoming);
    if !opts.dry_run {
        fs::create_dir_all(&state_diff)?;
        fs::write(&tables_path, serde_json::to_string_pretty(&list.to_json())?)
            .with_context(|| format!("writing {}", tables_path.display()))?;
    }
    tracing::info!(target: "harborx::tools", "[add] merged {} table file(s) into {}", report.tables_added, tables_path.display());
    report.tables_path = tables_path;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(p: &Path) {
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, b"x").unwrap();
    }

    #[test]
    fn manifest_lists_sorted_relative_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("data");
        touch(&data.join("b/2.arrow"));
        touch(&data.join("a/1.IPC"));
        touch(&data.join("c/3.feather"));
        touch(&data.join("c/x.parquet"));
        touch(&data.join("c/notes.txt"));
        touch(&data.join("c/with space#1.arrow"));
        let opts = ManifestOptions { data_dir: data.clone(), include_parquet: false, dry_run: false };
        let (path, m) = write_manifest(&opts).unwrap();
        assert_eq!(m.arrow, vec!["a/1.IPC", "b/2.arrow", "c/3.feather", "c/with%20space%231.arrow"]);
        assert!(m.parquet.is_empty());
        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert!(written.get("parquet").is_none());

        let opts = ManifestOptions { include_parquet: true, ..opts };
        let (_, m) = write_manifest(&opts).unwrap();
        assert_eq!(m.parquet, vec!["c/x.parquet"]);
    }

    #[test]
    fn tables_scan_and_merge() {
        let tmp = tempfile::tempdir().unwrap();
        let sd = tmp.path().join("state_diff");
        touch(&sd.join("nonces/b.parquet"));
        touch(&sd.join("nonces/a.parquet"));
        touch(&sd.join("nonces/skip.json"));
        let opts = TablesOptions::state_diff(sd.clone(), "data/local/state_diff/");
        let (_, list) = write_tables(&opts).unwrap();
        assert_eq!(list.files("nonces"), ["data/local/state_diff/nonces/a.parquet", "data/local/state_diff/nonces/b.parquet"]);
        assert!(list.files("storage_diffs").is_empty());
        assert_eq!(list.tables.len(), 4);

        // a file removed from disk stays listed; a new one is appended
        fs::remove_file(sd.join("nonces/a.parquet")).unwrap();
        touch(&sd.join("nonces/c.parquet"));
        let (_, list) = write_tables(&opts).unwrap();
        assert_eq!(
            list.files("nonces"),
            [
                "data/local/state_diff/nonces/a.parquet",
                "data/local/state_diff/nonces/b.parquet",
                "data/local/state_diff/nonces/c.parquet"
            ]
        );
    }

    #[test]
    fn missing_data_dir_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let opts = ManifestOptions { data_dir: tmp.path().join("nope"), include_parquet: false, dry_run: true };
        assert!(scan_manifest(&opts).is_err());
    }

    const LAKE: &str = "http://lake.example.org/data";

    fn read_json(p: &Path) -> Value { serde_json::from_str(&fs::read_to_string(p).unwrap()).unwrap() }

    #[tokio::test]
    async fn add_merges_remote_dataset_append_only() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("data/local");
        fs::create_dir_all(target.join("state_diff")).unwrap();
        let local_manifest = serde_json::json!({"arrow": ["local/0.arrow", "http://lake.example.org/data/a/1.arrow"], "note": "keep"});
        fs::write(target.join("manifest.json"), local_manifest.to_string()).unwrap();
        fs::write(target.join("state_diff/_tables.json"), r#"{"nonces": ["data/local/state_diff/nonces/old.parquet"]}"#).unwrap();

        let f = crate::fetch::MemoryFetcher::new();
        f.insert_json(
            "http://lake.example.org/data/manifest.json",
            &serde_json::json!({"arrow": ["a/1.arrow", "https://cdn.example.net/x.arrow", "./b/2.arrow", "a/1.arrow"], "parquet": ["/p/1.parquet"]}),
        );
        f.insert_json(
            "http://lake.example.org/data/state_diff/_tables.json",
            &serde_json::json!({
                "nonces": ["data/fixed/state_diff/nonces/a.parquet", "https://cdn.example.net/n.parquet", 5],
                "declared_classes": []
            }),
        );

        let opts = AddOptions { target_dir: target.clone(), base: Url::parse(LAKE).unwrap(), dry_run: false };
        let r = add_remote(&f, &opts).await.unwrap();
        assert_eq!((r.arrow_added, r.parquet_added, r.tables_added), (2, 1, 2));
        assert!(!r.tables_from_manifest);

        let m = read_json(&target.join("manifest.json"));
        assert_eq!(
            m["arrow"],
            serde_json::json!([
                "local/0.arrow",
                "http://lake.example.org/data/a/1.arrow",
                "https://cdn.example.net/x.arrow",
                "http://lake.example.org/data/b/2.arrow"
            ])
        );
        assert_eq!(m["parquet"], serde_json::json!(["http://lake.example.org/data/p/1.parquet"]));
        assert_eq!(m["base"], "http://lake.example.org/data/");
        assert_eq!(m["note"], "keep");
        assert_eq!(read_json(r.backup.as_ref().unwrap()), local_manifest);

        let t = TableList::from_json(&read_json(&r.tables_path)).unwrap();
        assert_eq!(
            t.files("nonces"),
            [
                "data/local/state_diff/nonces/old.parquet",
                "http://lake.example.org/data/fixed/state_diff/nonces/a.parquet",
                "https://cdn.example.net/n.parquet"
            ]
        );
        assert!(!t.tables.contains_key("declared_classes"));

        // a second add of the same dataset changes nothing
        let r = add_remote(&f, &opts).await.unwrap();
        assert_eq!((r.arrow_added, r.parquet_added, r.tables_added), (0, 0, 0));
    }

    #[tokio::test]
    async fn add_without_remote_tables_lists_manifest_parquet() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("data/fixed");
        let f = crate::fetch::MemoryFetcher::new();
        f.insert_json("http://lake.example.org/data/manifest.json", &serde_json::json!({"parquet": ["s/1.parquet"]}));

        let opts = AddOptions { target_dir: target.clone(), base: Url::parse(LAKE).unwrap(), dry_run: false };
        let r = add_remote(&f, &opts).await.unwrap();
        assert!(r.tables_from_manifest);
        assert!(r.backup.is_none());
        let t = TableList::from_json(&read_json(&r.tables_path)).unwrap();
        assert_eq!(t.files("storage_diffs"), ["http://lake.example.org/data/s/1.parquet"]);
    }

    #[tokio::test]
    async fn add_requires_the_remote_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let f = crate::fetch::MemoryFetcher::new();
        let opts = AddOptions { target_dir: tmp.path().join("data/local"), base: Url::parse(LAKE).unwrap(), dry_run: true };
        assert!(add_remote(&f, &opts).await.is_err());
        assert!(!tmp.path().join("data/local/manifest.json").exists());
    }

    #[test]
    fn lake_locators() {
        let base = Url::parse("http://lake.example.org/data/").unwrap();
        assert_eq!(lake_locator(&base, "./x/1.arrow"), "http://lake.example.org/data/x/1.arrow");
        assert_eq!(lake_locator(&base, "/x/1.arrow"), "http://lake.example.org/data/x/1.arrow");
        assert_eq!(lake_locator(&base, "https://cdn.example.net/y.arrow"), "https://cdn.example.net/y.arrow");
        assert_eq!(lake_table_locator(&base, "data/fixed/t/a.parquet"), "http://lake.example.org/data/fixed/t/a.parquet");
    }
}
