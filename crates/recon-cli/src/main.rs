//! Record Reconciler CLI
//!
//! Command-line tool for previewing, comparing and exporting two delimited record files.

use clap::{Parser, Subcommand};
use recon_core::{
    load_preview, CancellationHandle, ComparisonResult, JobFile, MatchRule, ProgressHandle,
    Reconciler, RunPhase, Separator, Side, TransferRule,
};
use std::io::Write;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::signal;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "recon-cli")]
#[command(about = "Delimited record file reconciler", long_about = None)]
#[command(version)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the headers and first rows of a file
    Preview {
        /// Path to the file
        #[arg(short, long)]
        file: PathBuf,

        /// Field separator (single character)
        #[arg(short, long, default_value = ",")]
        separator: String,

        /// Maximum number of rows to display
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Run the comparison described by a job file
    Compare {
        /// Path to job file (JSON)
        #[arg(short, long)]
        job: PathBuf,

        /// Override the job's start index for file A
        #[arg(long)]
        start_index: Option<usize>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        /// Do not print progress
        #[arg(short, long)]
        quiet: bool,
    },

    /// Create a job file template
    CreateJob {
        /// Output path for the job file
        #[arg(short, long)]
        output: PathBuf,

        /// Path to file A
        #[arg(long)]
        file_a: Option<PathBuf>,

        /// Path to file B
        #[arg(long)]
        file_b: Option<PathBuf>,

        /// Separator of file A
        #[arg(long, default_value = ",")]
        sep_a: String,

        /// Separator of file B
        #[arg(long, default_value = ",")]
        sep_b: String,

        /// Match rules (columnA=columnB, append :cs for case-sensitive)
        #[arg(short, long = "match")]
        match_rules: Vec<String>,

        /// Transfer rules (A.source=destination or B.source=destination)
        #[arg(short, long = "transfer")]
        transfer_rules: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn run(command: Commands) -> recon_core::Result<()> {
    match command {
        Commands::Preview {
            file,
            separator,
            limit,
        } => cmd_preview(&file, &separator, limit),
        Commands::Compare {
            job,
            start_index,
            json,
            quiet,
        } => cmd_compare(&job, start_index, json, quiet),
        Commands::CreateJob {
            output,
            file_a,
            file_b,
            sep_a,
            sep_b,
            match_rules,
            transfer_rules,
        } => cmd_create_job(
            &output,
            file_a,
            file_b,
            &sep_a,
            &sep_b,
            &match_rules,
            &transfer_rules,
        ),
    }
}

fn cmd_preview(file: &PathBuf, separator: &str, limit: usize) -> recon_core::Result<()> {
    let separator = Separator::parse(separator)?;
    let preview = load_preview(file, separator, limit)?;

    println!("File: {}", file.display());
    println!("Columns: {}", preview.headers.len());
    println!();

    println!("{}", preview.headers.join("\t"));
    println!("{}", "-".repeat(preview.headers.len() * 12));

    for row in &preview.rows {
        let values: Vec<&str> = row.project(&preview.headers).collect();
        println!("{}", values.join("\t"));
    }

    if preview.rows.len() == limit {
        println!("... (showing first {} rows)", limit);
    }

    Ok(())
}

fn cmd_compare(
    job_path: &PathBuf,
    start_index: Option<usize>,
    json: bool,
    quiet: bool,
) -> recon_core::Result<()> {
    let job = JobFile::load(job_path)?;
    let start_index = start_index.unwrap_or(job.start_index);
    debug!(job = %job_path.display(), start_index, "loaded job file");

    let mut reconciler = Reconciler::from_job(&job)?;
    if !quiet {
        println!("File A: {} ({} columns)", job.file_a.path.display(), reconciler.headers(Side::A).len());
        println!("File B: {} ({} columns)", job.file_b.path.display(), reconciler.headers(Side::B).len());
        for rule in reconciler.match_rules() {
            println!("  match    {}", rule);
        }
        for rule in reconciler.transfer_rules() {
            println!("  transfer {}", rule);
        }
        println!();
    }

    let plan = reconciler.prepare()?;
    let cancel = CancellationHandle::new();
    let progress = ProgressHandle::new();

    let worker = {
        let cancel = cancel.clone();
        let progress = progress.clone();
        thread::spawn(move || plan.run(start_index, &cancel, &progress))
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(wait_for_worker(&worker, &cancel, &progress, quiet));
    if !quiet {
        print_progress(&progress);
        eprintln!();
    }

    let result = worker
        .join()
        .map_err(|_| recon_core::Error::Io(std::io::Error::other("comparison thread panicked")))??;
    let result = reconciler.store_result(result);

    if json {
        println!("{}", serde_json::to_string_pretty(&result.summary())?);
    } else {
        print_summary(&result);
    }

    if let Some(path) = &job.output.results {
        reconciler.export_results(path, job.output.results_side)?;
        println!("Wrote modified records to {}", path.display());
    }
    if let Some(path) = &job.output.not_found_in_b {
        reconciler.export_not_found(path, Side::A)?;
        println!("Wrote rows of A missing from B to {}", path.display());
    }
    if let Some(path) = &job.output.not_found_in_a {
        reconciler.export_not_found(path, Side::B)?;
        println!("Wrote rows of B missing from A to {}", path.display());
    }

    Ok(())
}

/// Poll the worker until it returns; Ctrl-C cancels the run and keeps the
/// partial result
async fn wait_for_worker<T>(
    worker: &JoinHandle<T>,
    cancel: &CancellationHandle,
    progress: &ProgressHandle,
    quiet: bool,
) {
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    while !worker.is_finished() {
        if !quiet {
            print_progress(progress);
        }
        tokio::select! {
            result = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                match result {
                    Ok(()) => {
                        warn!("interrupted, cancelling comparison");
                        cancel.cancel();
                    }
                    Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {}
        }
    }
}

fn print_progress(progress: &ProgressHandle) {
    let snap = progress.snapshot();
    let label = match snap.phase {
        RunPhase::Idle => "starting",
        RunPhase::Indexing => "indexing B",
        RunPhase::Counting => "counting A",
        RunPhase::Probing => "probing A",
        RunPhase::ReconcilingUnmatchedB => "reconciling B",
        RunPhase::Done => "done",
        RunPhase::Cancelled => "cancelled",
    };
    eprint!("\r{:<14} {}/{}", label, snap.processed, snap.total);
    let _ = std::io::stderr().flush();
}

fn print_summary(result: &ComparisonResult) {
    if result.cancelled {
        println!("Comparison cancelled, results are incomplete");
    }
    println!("Comparison summary:");
    println!("  {} records in A", result.total_records_a);
    println!("  {} records in B", result.total_records_b);
    println!("  {} matches", result.match_count);
    println!("  {} modified records", result.modified_records.len());
    println!("  {} rows of A not found in B", result.not_found_in_b.len());
    println!("  {} rows of B not found in A", result.not_found_in_a.len());
}

fn cmd_create_job(
    output: &PathBuf,
    file_a: Option<PathBuf>,
    file_b: Option<PathBuf>,
    sep_a: &str,
    sep_b: &str,
    match_rules: &[String],
    transfer_rules: &[String],
) -> recon_core::Result<()> {
    let mut job = JobFile::template();

    if let Some(path) = file_a {
        job.file_a.path = path;
    }
    if let Some(path) = file_b {
        job.file_b.path = path;
    }
    job.file_a.separator = Separator::parse(sep_a)?;
    job.file_b.separator = Separator::parse(sep_b)?;

    if !match_rules.is_empty() {
        job.match_rules = match_rules
            .iter()
            .map(|s| parse_match_rule(s))
            .collect::<recon_core::Result<_>>()?;
    }
    if !transfer_rules.is_empty() {
        job.transfer_rules = transfer_rules
            .iter()
            .map(|s| parse_transfer_rule(s))
            .collect::<recon_core::Result<_>>()?;
    }

    job.validate()?;
    job.save(output)?;
    println!("Created job file: {}", output.display());
    println!("Match rules: {}", job.match_rules.len());
    println!("Transfer rules: {}", job.transfer_rules.len());
    println!();
    println!("Edit the file to adjust paths and rules, then run:");
    println!("  recon-cli compare --job {}", output.display());

    Ok(())
}

/// Parse "columnA=columnB" or "columnA=columnB:cs"
fn parse_match_rule(s: &str) -> recon_core::Result<MatchRule> {
    let (pair, case_sensitive) = match s.strip_suffix(":cs") {
        Some(pair) => (pair, true),
        None => (s, false),
    };
    let (column_a, column_b) = pair.split_once('=').ok_or_else(|| {
        recon_core::Error::InvalidConfig(format!(
            "invalid match rule '{}', expected 'columnA=columnB'",
            s
        ))
    })?;

    let rule = MatchRule::new(column_a.trim(), column_b.trim());
    Ok(if case_sensitive { rule.case_sensitive() } else { rule })
}

/// Parse "A.source=destination" or "B.source=destination"
fn parse_transfer_rule(s: &str) -> recon_core::Result<TransferRule> {
    let invalid = || {
        recon_core::Error::InvalidConfig(format!(
            "invalid transfer rule '{}', expected 'A.source=destination'",
            s
        ))
    };

    let (source, destination) = s.split_once('=').ok_or_else(invalid)?;
    let (side, column) = source.split_once('.').ok_or_else(invalid)?;
    let side: Side = side.parse()?;

    Ok(match side {
        Side::A => TransferRule::a_to_b(column.trim(), destination.trim()),
        Side::B => TransferRule::b_to_a(column.trim(), destination.trim()),
    })
}
