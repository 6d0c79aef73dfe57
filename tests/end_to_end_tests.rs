use std::fs;
use std::path::Path;
use std::sync::Arc;

use harborx::config::ExplorerConfig;
use harborx::dashboard;
use harborx::engine::{LocalEngine, QueryEngine};
use harborx::facade::{Explorer, Mode, Status};
use harborx::fetch::HttpFetcher;
use harborx::registry::FileFormat;
use polars::prelude::*;
use reqwest::Url;
use serde_json::json;

const ARGENT: &str = "0x36078334509b514626504edc9fb252328d1a240e4e948bef8d0c08dff45927f";
const OZ: &str = "0x4c6d6cf894f8bc96bb9c525e6853e5483177841f7388f74a46cfda6f028c755";

fn frame(cols: &[(&str, &[&str])]) -> DataFrame {
    let columns: Vec<Column> = cols.iter().map(|(n, v)| Series::new((*n).into(), v.to_vec()).into()).collect();
    DataFrame::new(columns).unwrap()
}

fn write_parquet(path: &Path, cols: &[(&str, &[&str])]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut df = frame(cols);
    let mut f = fs::File::create(path).unwrap();
    ParquetWriter::new(&mut f).finish(&mut df).unwrap();
}

fn write_ipc(path: &Path, cols: &[(&str, &[&str])]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut df = frame(cols);
    let mut f = fs::File::create(path).unwrap();
    IpcWriter::new(&mut f).finish(&mut df).unwrap();
}

fn write_json(path: &Path, v: &serde_json::Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, v.to_string()).unwrap();
}

fn explorer(root: &Path, mode: Mode) -> Explorer {
    let fetcher = Arc::new(HttpFetcher::new().unwrap());
    let engine = Arc::new(LocalEngine::new(fetcher.clone()));
    let mut cfg = ExplorerConfig::default();
    cfg.base_url = Url::from_directory_path(root).unwrap();
    Explorer::new(engine, fetcher, cfg, mode)
}

fn seed_dashboard(root: &Path) {
    let sd = root.join("data/local/state_diff");
    write_parquet(&sd.join("storage_diffs/a.parquet"), &[
        ("address", &["0xa", "0xa", "0x1", "0xb"]),
        ("key", &["k1", "k2", "k3", "k4"]),
        ("value", &["1", "2", "3", "4"]),
    ]);
    write_parquet(&sd.join("storage_diffs/b#2.parquet"), &[
        ("address", &["0xa", "0x1"]),
        ("key", &["k5", "k6"]),
        ("value", &["5", "6"]),
    ]);
    write_parquet(&sd.join("deployed_or_replaced/a.parquet"), &[
        ("address", &["0xa", "0xb", "0xc", "0xd"]),
        ("class_hash", &[ARGENT, ARGENT, OZ, "0x999"]),
    ]);
    write_parquet(&sd.join("nonces/a.parquet"), &[
        ("contract_address", &["0xb", "0xa", "0xa"]),
        ("nonce", &["5", "1", "2"]),
    ]);
    write_json(&sd.join("_tables.json"), &json!({
        "storage_diffs": ["data/local/state_diff/storage_diffs/a.parquet", "data/local/state_diff/storage_diffs/b#2.parquet"],
        "deployed_or_replaced": ["data/local/state_diff/deployed_or_replaced/a.parquet"],
        "nonces": ["data/local/state_diff/nonces/a.parquet"],
        "declared_classes": []
    }));
    write_json(&root.join("data/local/wallet_class_map.json"), &json!({"0x999": "Unknown", "0x777": "Braavos"}));
}

#[tokio::test]
async fn dashboard_over_local_parquet() {
    let tmp = tempfile::tempdir().unwrap();
    seed_dashboard(tmp.path());
    let ex = explorer(tmp.path(), Mode::Dashboard);

    let report = ex.rebuild().await.unwrap();
    assert_eq!(ex.status(), Status::Ready);
    assert_eq!(report.registry.table("storage_diffs").unwrap().files, 2);
    assert!(report.registry.table("declared_classes").unwrap().fallback);
    let labels = report.labels.unwrap();
    assert_eq!((labels.external_accepted, labels.external_rejected, labels.total), (1, 1, 5));

    let rs = ex.execute("SELECT COUNT(*) AS n FROM storage_diffs").await.unwrap();
    assert_eq!(rs.rows[0][0], json!(6));
    let rs = ex.execute("SELECT * FROM declared_classes").await.unwrap();
    assert_eq!(rs.row_count(), 0);
    assert_eq!(rs.column_names(), ["class_hash", "compiled_class_hash"]);
    let rs = ex.execute("SELECT wallet FROM wallet_map WHERE class_hash = '0x999'").await.unwrap();
    assert_eq!(rs.row_count(), 0);

    let panels = dashboard::load(&ex).await.unwrap();
    let share = &panels[0].rows;
    assert_eq!(share.rows, vec![vec![json!("Argent X v0.4.0"), json!(2)], vec![json!("OpenZeppelin Account"), json!(1)]]);
    let writers = &panels[1].rows;
    assert_eq!(writers.rows, vec![vec![json!("0xa"), json!(3)], vec![json!("0xb"), json!(1)]]);
    let nonces = &panels[2].rows;
    assert_eq!(nonces.rows, vec![vec![json!("0xa"), json!("2")], vec![json!("0xb"), json!("5")]]);

    // a second rebuild replaces everything in place
    ex.rebuild().await.unwrap();
    let rs = ex.execute("SELECT COUNT(*) AS n FROM wallet_map").await.unwrap();
    assert_eq!(rs.rows[0][0], json!(5));
}

#[tokio::test]
async fn missing_table_list_leaves_error_status() {
    let tmp = tempfile::tempdir().unwrap();
    let ex = explorer(tmp.path(), Mode::Dashboard);
    let err = ex.rebuild().await.unwrap_err();
    assert_eq!(err.exit_code(), 3);
    assert_eq!(ex.status(), Status::Error);
}

#[tokio::test]
async fn explorer_state_view_over_arrow() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    write_ipc(&data.join("state/s0.arrow"), &[("block", &["1", "1", "2"])]);
    write_ipc(&data.join("state/s1.arrow"), &[("block", &["3", "4"])]);
    write_json(&data.join("manifest.json"), &json!({"arrow": ["state/s0.arrow", "state/s1.arrow"]}));

    let ex = explorer(tmp.path(), Mode::Explorer);
    let report = ex.rebuild().await.unwrap();
    assert_eq!(report.registry.format, FileFormat::Arrow);
    let rs = ex.execute("SELECT COUNT(*) AS n FROM state").await.unwrap();
    assert_eq!(rs.rows[0][0], json!(5));
}

#[tokio::test]
async fn explorer_falls_back_to_parquet_when_arrow_is_unreadable() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir_all(data.join("state")).unwrap();
    fs::write(data.join("state/broken.arrow"), b"not arrow").unwrap();
    write_parquet(&data.join("state/s0.parquet"), &[("block", &["7", "8"])]);
    write_json(&data.join("manifest.json"), &json!({"arrow": ["state/broken.arrow"], "parquet": ["state/s0.parquet"]}));

    let ex = explorer(tmp.path(), Mode::Explorer);
    let report = ex.rebuild().await.unwrap();
    assert_eq!(report.registry.format, FileFormat::Parquet);
    let rs = ex.execute("SELECT block FROM state ORDER BY block").await.unwrap();
    assert_eq!(rs.rows, vec![vec![json!("7")], vec![json!("8")]]);
}

#[tokio::test]
async fn ad_hoc_file_scans() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("x.parquet");
    write_parquet(&path, &[("a", &["1", "2", "3"])]);
    let fetcher = Arc::new(HttpFetcher::new().unwrap());
    let engine = LocalEngine::new(fetcher);
    let url = Url::from_file_path(&path).unwrap();
    let rs = engine.execute(&format!("SELECT COUNT(*) AS n FROM read_parquet('{}')", url)).await.unwrap();
    assert_eq!(rs.rows[0][0], json!(3));
}

#[tokio::test]
async fn chunked_views_keep_every_row() {
    let tmp = tempfile::tempdir().unwrap();
    let sd = tmp.path().join("data/local/state_diff");
    let mut files = Vec::new();
    for i in 0..5 {
        let name = format!("storage_diffs/part{}.parquet", i);
        let (k0, k1) = (format!("k{}a", i), format!("k{}b", i));
        write_parquet(&sd.join(&name), &[
            ("address", &["0xa", "0xb"]),
            ("key", &[k0.as_str(), k1.as_str()]),
            ("value", &["1", "2"]),
        ]);
        files.push(format!("data/local/state_diff/{}", name));
    }
    write_json(&sd.join("_tables.json"), &json!({ "storage_diffs": files }));
    write_json(&tmp.path().join("data/local/wallet_class_map.json"), &json!({}));

    for (chunk, chunks) in [(1, 5), (2, 3), (16, 1)] {
        let fetcher = Arc::new(HttpFetcher::new().unwrap());
        let engine = Arc::new(LocalEngine::new(fetcher.clone()));
        let mut cfg = ExplorerConfig::default();
        cfg.base_url = Url::from_directory_path(tmp.path()).unwrap();
        cfg.view_chunk = chunk;
        let ex = Explorer::new(engine, fetcher, cfg, Mode::Dashboard);

        let report = ex.rebuild().await.unwrap();
        let load = report.registry.table("storage_diffs").unwrap();
        assert_eq!((load.files, load.chunks), (5, chunks), "chunk size {}", chunk);
        let rs = ex.execute("SELECT COUNT(*) AS n FROM storage_diffs").await.unwrap();
        assert_eq!(rs.rows[0][0], json!(10), "chunk size {}", chunk);
    }
}
