//! CrewLog - token and cost metrics for CrewAI/litellm console logs
//!
//! A CLI tool that strips tool dumps and raw JSON noise from a multi-agent
//! run log, splits it into LLM calls and reports per-task token usage,
//! cost, timing and tool usage.
//!
//! Exit codes:
//!   0   - Success
//!   1   - Runtime error (unreadable log, output directory, invalid config)
//!   130 - Interrupted

mod analysis;
mod cancel;
mod cli;
mod config;
mod filter;
mod models;
mod parser;
mod report;
mod staging;

use anyhow::{Context, Result};
use cancel::CancelFlag;
use chrono::Utc;
use cli::Args;
use config::{Config, DEFAULT_CONFIG_FILE};
use filter::LogFilter;
use models::{Report, ReportMetadata, UnifiedAnalysis};
use parser::ParsedLog;
use staging::StagedLog;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Exit code used when the run is interrupted with Ctrl-C.
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("CrewLog v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .crewlog.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize filtering, pricing and report output.");
    Ok(())
}

/// Initialize logging based on verbosity settings. `RUST_LOG` overrides
/// the level picked from the flags.
fn init_logging(args: &Args) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(args.log_level()).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Result of the blocking parse and analysis step.
struct Analysis {
    parsed: ParsedLog,
    unified: Option<UnifiedAnalysis>,
}

/// Run the complete workflow. Returns the process exit code.
///
/// The Ctrl-C handler goes in before anything is staged, so an interrupt
/// only raises the cancel flag and the worker removes its temporary file
/// before `main` exits.
async fn run(args: Args) -> Result<i32> {
    let flag = CancelFlag::default();
    let watcher = cancel::cancel_on(cancel::listen_for_interrupt()?, flag.clone());

    let result = run_with_cancel(args, std::env::temp_dir(), flag).await;
    watcher.abort();
    result
}

/// Run the pipeline on a blocking task and map cancellation to
/// [`EXIT_INTERRUPTED`]. Waits for the worker, which owns the staged log,
/// on every path.
async fn run_with_cancel(args: Args, temp_dir: PathBuf, flag: CancelFlag) -> Result<i32> {
    let handle = tokio::task::spawn_blocking(move || process(&args, &temp_dir, &flag));

    match handle.await.context("Analysis task failed")? {
        Ok(()) => Ok(0),
        Err(e) if cancel::is_interrupted(&e) => {
            eprintln!("\n⛔ Interrupted.");
            Ok(EXIT_INTERRUPTED)
        }
        Err(e) => Err(e),
    }
}

/// Stage, parse, analyze and write. The staged log is dropped (and its
/// temporary file deleted) on every return, including cancellation.
fn process(args: &Args, temp_dir: &Path, cancel: &CancelFlag) -> Result<()> {
    let start_time = Instant::now();

    let mut config = load_config(args)?;
    config.merge_with_args(args);

    let log_filter = LogFilter::try_from(&config.filter).context("Invalid [filter] settings")?;

    let staged = StagedLog::prepare(args.log_path(), &log_filter, args.raw, temp_dir)?;
    cancel.check()?;
    println!(
        "Got {} lines from {}",
        staged.lines_read,
        args.log_path().display()
    );

    if let Some(ref stats) = staged.stats {
        info!(
            "Filtered out {} of {} lines (json threshold {})",
            stats.lines_dropped(),
            stats.lines_in,
            log_filter.json_line_threshold()
        );
    }

    let output_dir = args.output_dir();
    if args.save_filtered {
        let dest = output_dir.join(report::FILTERED_LOG_FILE);
        staged.save_copy(&dest)?;
        println!("Filtered log saved to: {}", dest.display());
        cancel.check()?;
    }

    let outcome = analyze(staged.path(), config.pricing, config.report.task_hint_width)?;
    cancel.check()?;

    write_outputs(args, &config, &staged, &outcome, output_dir, start_time, cancel)?;
    staged.cleanup()
}

/// Parse the staged log and aggregate it per task.
fn analyze(
    path: &Path,
    pricing: config::PricingConfig,
    task_hint_width: usize,
) -> Result<Analysis> {
    let parsed = parser::parse_log_file(path, &pricing)?;
    let unified = analysis::unified_analysis(&parsed.blocks, &pricing, task_hint_width);
    Ok(Analysis { parsed, unified })
}

/// Print the console tables and write the output directory.
fn write_outputs(
    args: &Args,
    config: &Config,
    staged: &StagedLog,
    outcome: &Analysis,
    output_dir: &Path,
    start_time: Instant,
    cancel: &CancelFlag,
) -> Result<()> {
    let parsed = &outcome.parsed;
    println!("Total LLM calls detected: {}", parsed.blocks.len());

    if config.report.save_blocks {
        let saved = report::save_blocks(&parsed.blocks, output_dir, !args.quiet, cancel)?;
        info!("Saved {} LLM calls to {}", saved, output_dir.display());
    }

    if args.debug || args.separate {
        print!("{}", report::render_token_table(&parsed.token_records));
    }
    if args.debug {
        match parsed.token_records.first() {
            Some(sample) => println!("Sample token entry: {:?}", sample),
            None => println!("Sample token entry: none"),
        }
    }

    if args.separate {
        print!("{}", report::render_response_times(&parsed.blocks));
        print!(
            "{}",
            report::render_task_completion(&analysis::task_completion(&parsed.blocks))
        );
        print!(
            "{}",
            report::render_tool_usage(&analysis::tool_usage(&parsed.blocks))
        );
    } else if let Some(ref unified) = outcome.unified {
        print!("{}", report::render_unified_table(unified));
    }

    let metadata = ReportMetadata {
        log_path: staged.source.display().to_string(),
        analysis_date: Utc::now(),
        mode: staged.mode,
        lines_read: staged.lines_read,
        lines_parsed: staged.lines_staged,
        llm_calls: parsed.blocks.len(),
        parsing_errors: parsed.parsing_errors(),
        final_answers: parsed.final_answers(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };

    if config.general.verbose {
        print!("{}", report::render_parsing_summary(&metadata));
    }

    cancel.check()?;
    let report = Report {
        metadata,
        unified: outcome.unified.clone(),
        token_usage: parsed.token_records.clone(),
    };

    let report_path = report::write_report(&report, output_dir, config.general.format)?;
    println!("\n✅ Analysis complete! Report saved to: {}", report_path.display());

    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
