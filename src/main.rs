mod analyzer;
mod config;
mod engine;
mod metrics;
mod quality;

use analyzer::RunOutcome;
use clap::error::ErrorKind;
use clap::Parser;
use engine::LocalEngine;
use std::path::PathBuf;

/// A Rust CLI tool that computes per-provider performance metrics over
/// recorded traces and extracts the golden subset: fast, error-free traces
/// written back out as JSONL.
#[derive(Parser, Debug)]
#[command(name = "trace-flywheel", version, about)]
pub struct Cli {
    /// JSONL trace file, directory of files, or glob pattern
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Output directory, replaced on every run (default: from config)
    #[arg(value_name = "OUTPUT_PATH")]
    output_path: Option<PathBuf>,

    /// Config file path
    #[arg(short, long, default_value = "flywheel.toml")]
    config: PathBuf,

    /// zstd-compress the exported part file (overrides config)
    #[arg(long)]
    compress: bool,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (discovered files, grouping, write details)
    #[arg(short, long)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                let _ = e.print();
                std::process::exit(1);
            }
        },
    }
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.verbose {
        "trace_flywheel=debug"
    } else if cli.quiet {
        "trace_flywheel=warn"
    } else {
        "trace_flywheel=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

fn main() {
    let cli = parse_cli();
    init_logging(&cli);

    tracing::debug!(?cli, "parsed CLI arguments");

    let mut cfg = match config::load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    if cli.compress {
        cfg.export.compress = true;
    }
    let output = cli
        .output_path
        .clone()
        .unwrap_or_else(|| cfg.export.output_dir.clone());

    if cli.dry_run {
        println!("trace-flywheel v{}", env!("CARGO_PKG_VERSION"));
        println!("Config file:    {}", cli.config.display());
        println!("Input:          {}", cli.input_path.display());
        println!("Output:         {}", output.display());
        println!("Group by:       {}", cfg.metrics.group_by);
        println!("Max latency ms: {}", cfg.quality.max_latency_ms);
        println!("On malformed:   {:?}", cfg.engine.on_malformed);
        println!(
            "Compression:    {}",
            if cfg.export.compress {
                format!("zstd level {}", cfg.export.compression_level)
            } else {
                "off".to_string()
            }
        );
        println!("Dry run mode: config validated, not running.");
        return;
    }

    let mut engine = LocalEngine::builder()
        .app_name(&cfg.engine.app_name)
        .malformed_mode(cfg.engine.on_malformed)
        .get_or_create();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match analyzer::analyze_traces(&mut engine, &cli.input_path, &output, &cfg, &mut out) {
        Ok(RunOutcome::Completed(report)) => {
            tracing::info!(
                total = report.total_records,
                groups = ?report.provider_groups,
                golden = report.golden_count,
                part_file = %report.export.part_file.display(),
                "run complete"
            );
        }
        Ok(RunOutcome::InputUnreadable(_)) => {
            // Already reported; a load failure is not a process failure.
        }
        Err(e) => {
            tracing::error!(error = %e, "trace analysis failed");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
