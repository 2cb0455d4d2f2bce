mod config;

use std::fs::{self, File};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::ArgAction;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dupe_analyser_core::{
    apply_purge, load_report, plan_purge, render_text, write_report_files, KeyFormat,
    PurgeTargets, Report, DEFAULT_BACKUP_DIR,
};
use dupe_analyser_service::{
    cancel_job, continue_job, get_job, job_report, remove_job, restart_job, start_job,
    JobSnapshot, JobStatus,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, DEFAULT_CONFIG_FILE};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Parser)]
#[command(
    name = "dupe-analyser",
    version,
    about = "Find duplicate keys and duplicate rows across JSON/NDJSON files."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Analyse sources for duplicate keys and/or duplicate rows.
    Analyse(AnalyseArgs),
    /// Count rows carrying the key without storing duplicate locations.
    Validate(JobArgs),
    /// Remove duplicate records listed in a saved JSON report (local files only).
    Purge(PurgeArgs),
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum StdoutFormat {
    Txt,
    Json,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum CliKeyFormat {
    Loose,
    Typed,
}

impl From<CliKeyFormat> for KeyFormat {
    fn from(value: CliKeyFormat) -> Self {
        match value {
            CliKeyFormat::Loose => KeyFormat::Loose,
            CliKeyFormat::Typed => KeyFormat::Typed,
        }
    }
}

#[derive(Debug, Args)]
struct JobArgs {
    /// Comma-separated roots: local directories or gs://bucket/prefix.
    #[arg(long, value_name = "ROOTS")]
    path: Option<String>,

    /// JSON key checked for duplicates.
    #[arg(long)]
    key: Option<String>,

    #[arg(long)]
    workers: Option<usize>,

    /// Include the per-folder breakdown table.
    #[arg(long = "show-folders", value_name = "BOOL")]
    show_folders: Option<bool>,

    /// Format of the report printed to stdout.
    #[arg(long, default_value = "txt")]
    output: StdoutFormat,

    #[arg(long, value_name = "BOOL")]
    output_txt: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    output_json: Option<bool>,

    /// Directory for analyser.log and saved reports.
    #[arg(long, value_name = "DIR")]
    log_path: Option<PathBuf>,

    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Exclude glob patterns (repeatable).
    #[arg(long = "exclude", value_name = "GLOB", num_args = 1.., action = ArgAction::Append)]
    exclude: Vec<String>,

    /// Serve gs:// roots from this directory, one sub-directory per bucket,
    /// instead of Cloud Storage.
    #[arg(long, value_name = "DIR")]
    object_store_dir: Option<PathBuf>,

    /// How key values are turned into group strings.
    #[arg(long)]
    key_format: Option<CliKeyFormat>,
}

#[derive(Debug, Args)]
struct AnalyseArgs {
    #[command(flatten)]
    job: JobArgs,

    #[arg(long, value_name = "BOOL")]
    check_key: Option<bool>,

    /// Hash whole rows to find exact duplicates.
    #[arg(long, value_name = "BOOL")]
    check_row: Option<bool>,
}

#[derive(Debug, Args)]
struct PurgeArgs {
    /// JSON report produced by `analyse --output-json true`.
    #[arg(long, value_name = "FILE")]
    report: PathBuf,

    #[arg(long)]
    ids: bool,

    #[arg(long)]
    rows: bool,

    #[arg(long, value_name = "DIR", default_value = DEFAULT_BACKUP_DIR)]
    backup_dir: PathBuf,

    #[arg(long, value_name = "DIR", default_value = "logs")]
    log_path: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst))
        .context("failed to install Ctrl-C handler")?;

    match cli.command {
        Commands::Analyse(args) => {
            let mut config = load_config(&args.job)?;
            if let Some(check_key) = args.check_key {
                config.check_key = check_key;
            }
            if let Some(check_row) = args.check_row {
                config.check_row = check_row;
            }
            if !config.check_key && !config.check_row {
                bail!("at least one check (--check-key or --check-row) must be enabled");
            }
            run_job_command(config, false, args.job.output)
        }
        Commands::Validate(args) => {
            let config = load_config(&args)?;
            run_job_command(config, true, args.output)
        }
        Commands::Purge(args) => run_purge_command(args),
    }
}

fn load_config(args: &JobArgs) -> Result<AppConfig> {
    let mut config = AppConfig::load(&args.config)?;
    if let Some(path) = &args.path {
        config.path = path.clone();
    }
    if let Some(key) = &args.key {
        config.key = key.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(show) = args.show_folders {
        config.show_folder_breakdown = show;
    }
    if let Some(txt) = args.output_txt {
        config.output_txt = txt;
    }
    if let Some(json) = args.output_json {
        config.output_json = json;
    }
    if let Some(log_path) = &args.log_path {
        config.log_path = log_path.clone();
    }
    if !args.exclude.is_empty() {
        config.excludes = args.exclude.clone();
    }
    if let Some(dir) = &args.object_store_dir {
        config.object_store_dir = Some(dir.clone());
    }
    if let Some(format) = args.key_format {
        config.key_format = format.into();
    }

    if config.roots().is_empty() {
        bail!("--path is required (or set \"path\" in {})", args.config.display());
    }
    if config.key.trim().is_empty() {
        bail!("--key must not be empty");
    }
    Ok(config)
}

fn run_job_command(config: AppConfig, validate_only: bool, output: StdoutFormat) -> Result<()> {
    init_tracing(&config.log_path)?;
    if validate_only {
        println!("Running in key validation mode...");
    } else {
        println!("Running analysis...");
    }

    let roots = config.roots();
    let job_id = start_job(config.job_request(validate_only))?;
    let snapshot = get_job(&job_id)?;
    println!(
        "Discovered {} file(s) to analyse across {} path(s).",
        snapshot.total_files,
        roots.len()
    );

    loop {
        let snapshot = follow_job(&job_id)?;
        if snapshot.status == JobStatus::Failed {
            bail!(
                "job {job_id} failed: {}",
                snapshot.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        let report = job_report(&job_id)?
            .with_context(|| format!("job {job_id} finished without a report"))?;
        emit_report(&report, &config, output)?;

        if snapshot.status != JobStatus::Cancelled {
            break;
        }
        match prompt_after_cancel(&snapshot)? {
            CancelChoice::Continue => {
                let resumed = continue_job(&job_id)?;
                println!("Continuing with {} remaining file(s).", resumed.remaining);
            }
            CancelChoice::Restart => {
                restart_job(&job_id)?;
                println!("Restarting analysis from scratch.");
            }
            CancelChoice::Quit => break,
        }
    }

    remove_job(&job_id)?;
    Ok(())
}

/// Shows progress on stderr until the job leaves `Running`, forwarding Ctrl-C
/// as a cancellation request.
fn follow_job(job_id: &str) -> Result<JobSnapshot> {
    loop {
        if INTERRUPTED.swap(false, Ordering::SeqCst) {
            eprintln!("\nCancelling; waiting for workers to stop...");
            cancel_job(job_id)?;
        }
        let snapshot = get_job(job_id)?;
        eprint!(
            "\rFolder: {} | File {} of {} | Rows {}   ",
            snapshot.current_folder.as_deref().unwrap_or("Discovering..."),
            snapshot.files_processed,
            snapshot.total_files,
            snapshot.rows_processed
        );
        if snapshot.status != JobStatus::Running {
            eprintln!();
            return Ok(snapshot);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn emit_report(report: &Report, config: &AppConfig, output: StdoutFormat) -> Result<()> {
    let outputs = config.outputs();
    if outputs.txt || outputs.json {
        let base = write_report_files(report, &config.log_path, outputs, config.render_options(false))?;
        let mut parts = Vec::new();
        if outputs.txt {
            parts.push(".txt");
        }
        if outputs.json {
            parts.push(".json");
        }
        println!(
            "Reports saved with base name '{}' and extension(s): {}",
            base.display(),
            parts.join(", ")
        );
    } else {
        println!("No report files were generated as per configuration.");
    }

    match output {
        StdoutFormat::Json => println!("{}", report.to_json_pretty()?),
        StdoutFormat::Txt => println!("\n{}", render_text(report, config.render_options(true))),
    }
    Ok(())
}

enum CancelChoice {
    Continue,
    Restart,
    Quit,
}

fn prompt_after_cancel(snapshot: &JobSnapshot) -> Result<CancelChoice> {
    let stdin = io::stdin();
    loop {
        print!(
            "Analysis cancelled after {} of {} file(s). [c]ontinue, [r]estart or [q]uit? ",
            snapshot.files_processed, snapshot.total_files
        );
        io::stdout().flush().context("failed to flush stdout")?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("failed to read choice")? == 0 {
            return Ok(CancelChoice::Quit);
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "c" | "continue" => return Ok(CancelChoice::Continue),
            "r" | "restart" => return Ok(CancelChoice::Restart),
            "q" | "quit" | "" => return Ok(CancelChoice::Quit),
            other => println!("Unrecognised choice '{other}'."),
        }
    }
}

fn run_purge_command(args: PurgeArgs) -> Result<()> {
    init_tracing(&args.log_path)?;
    if !args.ids && !args.rows {
        bail!("select what to purge with --ids and/or --rows");
    }

    let report = load_report(&args.report)?;
    if report.summary.is_partial_report {
        warn!("purging from a partial report; unprocessed files are not covered");
    }
    let plan = plan_purge(
        &report,
        PurgeTargets {
            ids: args.ids,
            rows: args.rows,
        },
    )?;
    if plan.is_empty() {
        println!("Nothing to purge in {}.", args.report.display());
        return Ok(());
    }

    info!(
        "purging {} record(s) across {} file(s)",
        plan.records(),
        plan.deletions.len()
    );
    let outcome = apply_purge(&plan, &args.backup_dir)?;
    println!(
        "Purge complete: {} record(s) deleted from {} file(s). Backups in {}.",
        outcome.records_deleted,
        outcome.files_modified,
        args.backup_dir.display()
    );
    Ok(())
}

/// Log lines go to `<log_path>/analyser.log` so the terminal only carries the
/// report and progress line.
fn init_tracing(log_path: &Path) -> Result<()> {
    fs::create_dir_all(log_path)
        .with_context(|| format!("failed to create log directory {}", log_path.display()))?;
    let log_file = log_path.join("analyser.log");
    let file = File::create(&log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}
