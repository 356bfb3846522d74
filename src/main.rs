//! soupbench CLI.
//!
//! Usage:
//!   soupbench                                # 1 MiB across 1 KiB entries, sqlite
//!   soupbench --store memory --total-size 65536
//!   soupbench --depth 2 --children 4 --page-sizes 1,4,16
//!   soupbench --dir ./bench-data --keep-soups --export out

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use colored::Colorize;
use tempfile::TempDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use soupbench::adapters::{MemoryStore, SqliteStore};
use soupbench::report;
use soupbench::store::{SoupStore, StoreConfig};
use soupbench::timing::TimingRegistry;
use soupbench::workloads::{run_benchmark, RunConfig};
use soupbench::{BenchError, BenchResult};

#[derive(Parser, Debug)]
#[command(name = "soupbench", about = "Soup store benchmark harness")]
struct Cli {
    /// Total payload budget in bytes.
    #[arg(long, default_value = "1048576")]
    total_size: u64,

    /// Target leaf-payload bytes per entry.
    #[arg(long, default_value = "1024")]
    entry_size: u64,

    /// Nesting depth of generated values (0 = flat string).
    #[arg(long, default_value = "0")]
    depth: u32,

    /// Branches per nesting level.
    #[arg(long, default_value = "1")]
    children: u32,

    /// Code points per generated key.
    #[arg(long, default_value = "100")]
    key_length: u32,

    /// Smallest code point of random strings, in hex.
    #[arg(long, default_value = "20")]
    min_code_point: String,

    /// Largest code point of random strings, in hex.
    #[arg(long, default_value = "FF")]
    max_code_point: String,

    /// Page sizes to traverse with, comma-separated.
    #[arg(long, value_delimiter = ',', default_values_t = [1usize, 4, 16])]
    page_sizes: Vec<usize>,

    /// Store backend to drive.
    #[arg(long, value_enum, default_value = "sqlite")]
    store: Backend,

    /// Data directory for on-disk backends; a temp dir when omitted.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Leave existing soups (and their schemas) untouched.
    #[arg(long)]
    keep_soups: bool,

    /// RNG seed for payload generation.
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Export directory for CSV + JSON results.
    #[arg(long)]
    export: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Backend {
    Memory,
    Sqlite,
}

fn main() -> BenchResult<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let run = RunConfig {
        total_size: cli.total_size,
        entry_size: cli.entry_size,
        depth: cli.depth,
        children: cli.children,
        key_length: cli.key_length,
        min_code_point: parse_code_point(&cli.min_code_point)?,
        max_code_point: parse_code_point(&cli.max_code_point)?,
        page_sizes: cli.page_sizes.clone(),
        drop_existing: !cli.keep_soups,
        seed: cli.seed,
    };

    println!("\n{}", "soupbench — soup store benchmark".bold().blue());
    println!(
        "  {} entries per soup, ~{} bytes each, page sizes {:?}",
        run.entry_count(),
        run.entry_size,
        run.page_sizes
    );

    // keep an unnamed temp dir alive for the whole run
    let mut tmp_guard: Option<TempDir> = None;
    let mut store: Box<dyn SoupStore> = match cli.store {
        Backend::Memory => Box::new(MemoryStore::new()),
        Backend::Sqlite => {
            let dir = match &cli.dir {
                Some(dir) => dir.clone(),
                None => {
                    let tmp = TempDir::new()?;
                    let dir = tmp.path().to_path_buf();
                    tmp_guard = Some(tmp);
                    dir
                }
            };
            Box::new(SqliteStore::new(&dir)?)
        }
    };

    let store_config = StoreConfig { global: true };
    let mut registry = TimingRegistry::new();
    let report_data = run_benchmark(store.as_mut(), &store_config, &run, &mut registry)?;

    report::print_report(&report_data);

    if let Some(dir) = &cli.export {
        std::fs::create_dir_all(dir)?;
        report::export_csv(&report_data, &dir.join("soupbench_results.csv"))?;
        report::export_json(&report_data, &dir.join("soupbench_results.json"))?;
    }

    drop(tmp_guard);
    Ok(())
}

fn parse_code_point(hex: &str) -> BenchResult<u32> {
    let trimmed = hex.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(trimmed, 16)
        .map_err(|e| BenchError::Config(format!("bad code point `{hex}`: {e}")))
}
