use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wikirevert::classifier::classify_corpus;
use wikirevert::extract::{
    run_partitions, ExtractOptions, PartitionError, PartitionOutcome, ProgressReport,
};
use wikirevert::sink::{read_rows, CsvRowSink};
use wikirevert::subjects::SubjectList;

#[derive(Parser)]
#[command(name = "wikirevert")]
#[command(about = "Extract subject-page revisions from Wikimedia dumps and detect reverted vandalism")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the revisions of all listed pages, one CSV file per input dump
    Extract(ExtractArgs),
    /// Detect vandalism in extracted revision CSV files
    Classify(ClassifyArgs),
}

#[derive(Args)]
struct ExtractArgs {
    /// Dump files (.xml, .xml.gz, .xml.bz2 or .xml.zst)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// CSV file with a `wikipedia_title` column
    #[arg(long)]
    titles: PathBuf,

    /// Output directory for revisions_<partition>.csv files
    #[arg(short, long)]
    outdir: PathBuf,

    /// Number of partitions processed in parallel (default: number of CPUs)
    #[arg(long)]
    threads: Option<usize>,

    /// Continue a failed partition after its committed pages, e.g. `--resume 12=4031`. Rows already in
    /// that partition's output file are kept. Can be given once per partition.
    #[arg(long = "resume", value_name = "PARTITION=PAGES", value_parser = parse_resume_point)]
    resume: Vec<(String, u64)>,

    /// Seconds between progress reports
    #[arg(long, default_value_t = wikirevert::extract::DEFAULT_PROGRESS_INTERVAL.as_secs())]
    progress_every: u64,
}

#[derive(Args)]
struct ClassifyArgs {
    /// Revision CSV files written by `extract`
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// CSV file with `wikipedia_title` and `party_group` columns
    #[arg(long)]
    titles: PathBuf,

    /// Output CSV file for vandalism events
    #[arg(short, long)]
    output: PathBuf,
}

fn parse_resume_point(value: &str) -> Result<(String, u64), String> {
    let (label, pages) = value
        .split_once('=')
        .ok_or_else(|| format!("expected PARTITION=PAGES, got `{value}`"))?;
    let pages = pages
        .trim()
        .parse()
        .map_err(|e| format!("invalid page count `{pages}`: {e}"))?;
    Ok((label.trim().to_string(), pages))
}

// sums the progress of all successful partitions
fn total_progress(outcomes: &[PartitionOutcome]) -> ProgressReport {
    let mut total = ProgressReport {
        partition_id: "total".to_string(),
        pages_seen: 0,
        pages_matched: 0,
        revisions_emitted: 0,
    };
    for summary in outcomes.iter().filter_map(|outcome| outcome.result.as_ref().ok()) {
        total.pages_seen += summary.progress.pages_seen;
        total.pages_matched += summary.progress.pages_matched;
        total.revisions_emitted += summary.progress.revisions_emitted;
    }
    total
}

fn verbosity_filter(verbose: u8) -> EnvFilter {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    EnvFilter::default().add_directive(level.into())
}

fn run_extract(args: ExtractArgs) -> Result<()> {
    fs::create_dir_all(&args.outdir)
        .with_context(|| format!("Failed to create output directory: {}", args.outdir.display()))?;

    let subjects = SubjectList::from_csv_path(&args.titles)
        .with_context(|| format!("Failed to load subject list: {}", args.titles.display()))?;
    info!(subjects = subjects.len(), "Loaded subject list");

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    let options = ExtractOptions {
        progress_every: std::time::Duration::from_secs(args.progress_every),
        resume_points: args.resume.into_iter().collect(),
        ..ExtractOptions::default()
    };

    let start = Instant::now();
    let outcomes = run_partitions(&args.inputs, &subjects, &options, |_, label, resume_after_pages| {
        let path = args.outdir.join(format!("revisions_{label}.csv"));
        if resume_after_pages > 0 {
            CsvRowSink::open_append(&path)
        } else {
            CsvRowSink::create(&path)
        }
    });

    let total = outcomes.len();
    let totals = total_progress(&outcomes);
    let mut failed = 0;
    for outcome in outcomes {
        match outcome.result {
            Ok(summary) => {
                let status = if summary.cancelled { "cancelled" } else { "ok" };
                println!(
                    "[{}] {}: {} pages, {} matched, {} revisions, {} malformed revisions skipped ({})",
                    outcome.partition_id,
                    outcome.path.display(),
                    summary.progress.pages_seen,
                    summary.progress.pages_matched,
                    summary.progress.revisions_emitted,
                    summary.malformed_revisions,
                    status,
                );
            }
            Err(e) => {
                failed += 1;
                let committed = match &e {
                    PartitionError::Sink {
                        committed_pages, ..
                    } if *committed_pages > 0 => Some(*committed_pages),
                    _ => None,
                };
                println!(
                    "[{}] {}: FAILED: {:#}",
                    outcome.partition_id,
                    outcome.path.display(),
                    anyhow::Error::from(e)
                );
                if let Some(committed) = committed {
                    println!(
                        "    continue with --resume {}={committed}",
                        outcome.partition_id
                    );
                }
            }
        }
    }
    println!(
        "Total: {} pages, {} matched, {} revisions in {} of {total} partitions",
        totals.pages_seen,
        totals.pages_matched,
        totals.revisions_emitted,
        total - failed
    );
    info!(elapsed_secs = start.elapsed().as_secs(), "Extraction finished");

    if failed > 0 {
        bail!("{failed} of {total} partitions failed");
    }
    Ok(())
}

fn run_classify(args: ClassifyArgs) -> Result<()> {
    let subjects = SubjectList::from_csv_path(&args.titles)
        .with_context(|| format!("Failed to load subject list: {}", args.titles.display()))?;

    let mut rows = Vec::new();
    for input in &args.inputs {
        let before = rows.len();
        for row in read_rows(input).with_context(|| format!("Failed to open {}", input.display()))? {
            rows.push(row.with_context(|| format!("Failed to read {}", input.display()))?);
        }
        info!(path = %input.display(), rows = rows.len() - before, "Loaded revisions");
    }

    let start = Instant::now();
    let result = classify_corpus(rows, &subjects);
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "Classification finished");

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    for event in &result.events {
        writer.serialize(event)?;
    }
    writer.flush()?;

    let summary = result.summary;
    println!("Pages:                    {}", summary.pages);
    println!("Revisions:                {}", summary.revisions);
    println!("Pages with vandalism:     {}", summary.pages_with_vandalism);
    println!("Damage intervals:         {}", summary.intervals);
    println!("  keyword corroborated:   {}", summary.corroborated_intervals);
    println!("Vandal revisions:         {}", summary.vandal_revisions);
    println!("Anomalies:");
    println!("  non-monotonic timestamps: {}", summary.anomalies.non_monotonic_timestamps);
    println!("  unknown parent ids:       {}", summary.anomalies.unknown_parents);
    println!("  missing content hashes:   {}", summary.anomalies.missing_hashes);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over -v
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| verbosity_filter(cli.verbose));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Extract(args) => run_extract(args),
        Commands::Classify(args) => run_classify(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
