//!
//! harborx CLI
//! -----------
//! Loads the published state-diff dataset into an in-process engine and runs
//! SQL against it: one-shot (`--query`), the fixed dashboard panels
//! (`--dashboard`) or an interactive prompt (`--repl`, the default).

use std::env;
use std::sync::Arc;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use harborx::cli::outputformatter::{get_terminal_width, print_result_set};
use harborx::cli::render_panel;
use harborx::config::{parse_base_url, ExplorerConfig};
use harborx::dashboard;
use harborx::engine::{LocalEngine, ResultSet};
use harborx::error::{AppError, AppResult};
use harborx::facade::{Explorer, Mode};
use harborx::fetch::HttpFetcher;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--base <url|dir>] [--data-subdir fixed|local] [--mode explorer|dashboard] -q \"<SQL>\"\n  {program} [--base <url|dir>] --dashboard\n  {program} [--base <url|dir>] [--mode explorer|dashboard] [--repl]\n\nFlags:\n  --base <url|dir>         Site root holding data/ (default: $HARBORX_BASE_URL or http://localhost:8000/)\n  --data-subdir <v>        Force the dataset variant (fixed or local)\n  --mode <m>               explorer: one `state` view over data/manifest.json (default)\n                           dashboard: per-table state-diff views plus wallet_map\n  --dashboard              Load dashboard mode and print its panels\n  --view-chunk <n>         Files per chunk view (default 16)\n  --label-chunk <n>        Rows per wallet_map INSERT (default 128)\n  -q, --query <SQL>        Run one statement and exit\n  --json                   Print results as JSON instead of a table\n  --repl                   Start the interactive prompt\n  -h, --help               Show this help\n\nInteractive commands:\n  rebuild                  reload every view\n  status                   show load status and the last error\n  dashboard                print the dashboard panels (dashboard mode)\n  help | quit | exit\n  <SQL>                    run a statement"
    );
}

struct Args {
    base: Option<String>,
    data_subdir: Option<String>,
    mode: Mode,
    dashboard: bool,
    query: Option<String>,
    json: bool,
    repl: bool,
    view_chunk: Option<usize>,
    label_chunk: Option<usize>,
}

fn need_value(args: &[String], i: usize, flag: &str, program: &str) -> String {
    if i + 1 >= args.len() {
        eprintln!("{} requires a value", flag);
        print_usage(program);
        std::process::exit(2);
    }
    args[i + 1].clone()
}

fn parse_usize(v: &str, flag: &str) -> AppResult<usize> {
    v.parse().map_err(|_| AppError::config("bad_argument", format!("{} expects a number, got '{}'", flag, v)))
}

fn parse_args(program: &str, args: &[String]) -> AppResult<Args> {
    let mut out = Args {
        base: None,
        data_subdir: None,
        mode: Mode::Explorer,
        dashboard: false,
        query: None,
        json: false,
        repl: false,
        view_chunk: None,
        label_chunk: None,
    };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--base" => { out.base = Some(need_value(args, i, "--base", program)); i += 2; }
            "--data-subdir" => { out.data_subdir = Some(need_value(args, i, "--data-subdir", program)); i += 2; }
            "--mode" => {
                let v = need_value(args, i, "--mode", program);
                out.mode = match v.to_ascii_lowercase().as_str() {
                    "explorer" => Mode::Explorer,
                    "dashboard" => Mode::Dashboard,
                    _ => return Err(AppError::config("bad_argument", format!("unknown mode '{}'", v))),
                };
                i += 2;
            }
            "--dashboard" => { out.dashboard = true; out.mode = Mode::Dashboard; i += 1; }
            "--view-chunk" => { out.view_chunk = Some(parse_usize(&need_value(args, i, "--view-chunk", program), "--view-chunk")?); i += 2; }
            "--label-chunk" => { out.label_chunk = Some(parse_usize(&need_value(args, i, "--label-chunk", program), "--label-chunk")?); i += 2; }
            "--query" | "-q" => { out.query = Some(need_value(args, i, "--query", program)); i += 2; }
            "--json" => { out.json = true; i += 1; }
            "--repl" => { out.repl = true; i += 1; }
            "-h" | "--help" => {
                print_usage(program);
                std::process::exit(0);
            }
            unk => {
                // a bare argument is taken as the query
                if out.query.is_none() && !unk.starts_with('-') { out.query = Some(unk.to_string()); i += 1; continue; }
                eprintln!("Unrecognized argument: {}", unk);
                print_usage(program);
                std::process::exit(2);
            }
        }
    }
    Ok(out)
}

fn build_config(a: &Args) -> AppResult<ExplorerConfig> {
    let mut cfg = ExplorerConfig::from_env()?;
    if let Some(b) = &a.base { cfg.base_url = parse_base_url(b)?; }
    if let Some(v) = &a.data_subdir { cfg.explicit_subdir = Some(v.clone()); }
    if let Some(n) = a.view_chunk { cfg.view_chunk = n; }
    if let Some(n) = a.label_chunk { cfg.label_chunk = n; }
    cfg.validate()?;
    Ok(cfg)
}

fn print_rows(rs: &ResultSet, json: bool) {
    if json {
        let v = serde_json::Value::Array(rs.rows_as_maps().into_iter().map(serde_json::Value::Object).collect());
        println!("{}", serde_json::to_string_pretty(&v).unwrap_or_else(|_| v.to_string()));
    } else {
        print_result_set(rs);
    }
}

async fn print_dashboard(explorer: &Explorer, json: bool) -> AppResult<()> {
    let panels = dashboard::load(explorer).await?;
    let termw = get_terminal_width();
    for p in &panels {
        if json {
            println!("{}", serde_json::json!({ "panel": p.panel.id, "rows": p.rows.rows_as_maps() }));
        } else {
            for line in render_panel(p, termw, true) {
                println!("{}", line);
            }
            println!();
        }
    }
    Ok(())
}

async fn run_repl(explorer: &Explorer, json: bool) -> AppResult<()> {
    let mut rl = DefaultEditor::new().map_err(|e| AppError::io("terminal", e.to_string()))?;
    println!("harborx interpreter. Type 'help' for commands.");
    loop {
        let line = match rl.readline("harborx> ") {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(AppError::io("terminal", e.to_string())),
        };
        let line = line.trim();
        if line.is_empty() { continue; }
        let _ = rl.add_history_entry(line);
        match line.to_ascii_lowercase().trim_end_matches(';') {
            "quit" | "exit" => break,
            "help" => { print_usage("harborx"); continue; }
            "status" => {
                println!("status: {:?}", explorer.status());
                if let Some(e) = explorer.last_error() { println!("last error: {}", e); }
                continue;
            }
            "rebuild" => {
                match explorer.rebuild().await {
                    Ok(r) => println!("loaded {} table(s), {} file(s) from {}", r.registry.tables.len(), r.registry.total_files(), r.registry.location),
                    Err(e) => eprintln!("error: {}", e),
                }
                continue;
            }
            "dashboard" => {
                if let Err(e) = print_dashboard(explorer, json).await { eprintln!("error: {}", e); }
                continue;
            }
            _ => {}
        }
        match explorer.execute(line).await {
            Ok(rs) => print_rows(&rs, json),
            Err(e) => eprintln!("error: {}", e),
        }
    }
    Ok(())
}

/// The session ends at the REPL unless a one-shot query or dashboard was asked for alone.
fn enters_repl(args: &Args) -> bool {
    args.repl || (args.query.is_none() && !args.dashboard)
}

async fn run(program: &str, argv: &[String]) -> AppResult<()> {
    let args = parse_args(program, argv)?;
    let cfg = build_config(&args)?;
    info!(
        target: "harborx",
        "harborx starting: base='{}', variant={}, mode={:?}, view_chunk={}, label_chunk={}",
        cfg.base_url,
        cfg.variant(),
        args.mode,
        cfg.view_chunk,
        cfg.label_chunk
    );

    let fetcher = Arc::new(HttpFetcher::new()?);
    let engine = Arc::new(LocalEngine::new(fetcher.clone()));
    let explorer = Explorer::new(engine, fetcher, cfg, args.mode);
    let interactive = enters_repl(&args);
    let Some(report) = explorer.initial_load(interactive).await? else {
        eprintln!("error: initial load failed: {}", explorer.last_error().unwrap_or_default());
        eprintln!("type 'status' for details or 'rebuild' to retry");
        return run_repl(&explorer, args.json).await;
    };
    for t in &report.registry.tables {
        info!(target: "harborx", "{}: {} file(s), {} chunk(s){}", t.name, t.files, t.chunks, if t.fallback { " [empty]" } else { "" });
    }

    if let Some(q) = &args.query {
        let rs = explorer.execute(q).await?;
        print_rows(&rs, args.json);
        if !args.repl { return Ok(()); }
    }
    if args.dashboard {
        print_dashboard(&explorer, args.json).await?;
        if !args.repl { return Ok(()); }
    }
    run_repl(&explorer, args.json).await
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut argv: Vec<String> = env::args().collect();
    let program = if argv.is_empty() { "harborx".to_string() } else { argv.remove(0) };
    if let Err(e) = run(&program, &argv).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
