//!
//! harborx_manifest
//! ----------------
//! Regenerates the dataset documents the explorer reads: `manifest.json`
//! for the Arrow/Parquet explorer and `state_diff/_tables.json` for the
//! dashboard. Table lists are merged append-only unless `--replace` is given.
//! `add --base <url>` merges a remote dataset's documents into a local one.

use std::env;
use std::path::PathBuf;

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use harborx::config::parse_base_url;
use harborx::fetch::HttpFetcher;
use harborx::tools::manifest_gen::{add_remote, write_manifest, write_tables, AddOptions, ManifestOptions, TablesOptions};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} add --base <url> [--subdir local|fixed] [--root <dir>] [--data <rel>] [--dry-run]\n  {program} [--root <dir>] [--data <rel>] [--include-parquet] [--variant local|fixed] [--replace] [--dry-run] [--skip-tables] [--skip-manifest]\n\nFlags:\n  --root <dir>           Site root (default: .)\n  --data <rel>           Data directory under the root (default: data)\n  --include-parquet      Also list .parquet files in manifest.json\n  --variant <v>          Dataset variant whose _tables.json is written (default: local)\n  --replace              Overwrite _tables.json instead of merging into it\n  --skip-tables          Only write manifest.json\n  --skip-manifest        Only write _tables.json\n  --base <url>           (add) Remote dataset root serving manifest.json\n  --subdir <v>           (add) Local variant directory to merge into (default: local)\n  --dry-run              Scan and report without writing\n  -h, --help             Show this help"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let mut args: Vec<String> = env::args().collect();
    let program = if args.is_empty() { "harborx_manifest".to_string() } else { args.remove(0) };
    let add = args.first().map(|a| a == "add").unwrap_or(false);
    if add { args.remove(0); }

    let mut root = PathBuf::from(".");
    let mut data = String::from("data");
    let mut variant = String::from("local");
    let mut include_parquet = false;
    let mut replace = false;
    let mut dry_run = false;
    let mut skip_tables = false;
    let mut skip_manifest = false;
    let mut base: Option<String> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--root" | "--data" | "--variant" | "--subdir" | "--base" => {
                if i + 1 >= args.len() { eprintln!("{} requires a value", args[i]); print_usage(&program); std::process::exit(2); }
                let v = args[i + 1].clone();
                match args[i].as_str() {
                    "--root" => root = PathBuf::from(v),
                    "--data" => data = v,
                    "--base" => base = Some(v),
                    _ => variant = v,
                }
                i += 2; continue;
            }
            "--include-parquet" => { include_parquet = true; i += 1; continue; }
            "--replace" => { replace = true; i += 1; continue; }
            "--dry-run" => { dry_run = true; i += 1; continue; }
            "--skip-tables" => { skip_tables = true; i += 1; continue; }
            "--skip-manifest" => { skip_manifest = true; i += 1; continue; }
            "-h" | "--help" => { print_usage(&program); return Ok(()); }
            unk => {
                eprintln!("Unrecognized argument: {}", unk);
                print_usage(&program);
                std::process::exit(2);
            }
        }
    }
    if harborx::variant::Variant::parse(&variant).is_none() {
        eprintln!("--variant must be 'local' or 'fixed', got '{}'", variant);
        std::process::exit(2);
    }

    let data_dir = root.join(&data);
    if add {
        let Some(base) = base else {
            eprintln!("add requires --base <url>");
            print_usage(&program);
            std::process::exit(2);
        };
        let opts = AddOptions { target_dir: data_dir.join(&variant), base: parse_base_url(&base)?, dry_run };
        let fetcher = HttpFetcher::new()?;
        let r = add_remote(&fetcher, &opts).await?;
        let suffix = if dry_run { " [dry-run]" } else { "" };
        if let Some(b) = &r.backup { eprintln!("[backup] {}{}", b.display(), suffix); }
        eprintln!("[manifest] +{} arrow, +{} parquet -> {}{}", r.arrow_added, r.parquet_added, r.manifest_path.display(), suffix);
        eprintln!(
            "[tables] +{} file(s) -> {}{}{}",
            r.tables_added,
            r.tables_path.display(),
            if r.tables_from_manifest { " (from manifest parquet)" } else { "" },
            suffix
        );
        return Ok(());
    }
    if !skip_manifest {
        let opts = ManifestOptions { data_dir: data_dir.clone(), include_parquet, dry_run };
        let (path, m) = write_manifest(&opts)?;
        eprintln!(
            "[manifest] {} arrow, {} parquet -> {}{}",
            m.arrow.len(),
            m.parquet.len(),
            path.display(),
            if dry_run { " [dry-run]" } else { "" }
        );
    }
    if !skip_tables {
        let state_diff = data_dir.join(&variant).join("state_diff");
        let prefix = format!("{}/{}/state_diff", data.trim_end_matches('/'), variant);
        let mut opts = TablesOptions::state_diff(state_diff, &prefix);
        opts.merge = !replace;
        opts.dry_run = dry_run;
        let (path, list) = write_tables(&opts)?;
        let files: usize = list.tables.values().map(|v| v.len()).sum();
        eprintln!(
            "[tables] {} table(s), {} file(s) -> {}{}",
            list.tables.len(),
            files,
            path.display(),
            if dry_run { " [dry-run]" } else { "" }
        );
    }
    Ok(())
}
