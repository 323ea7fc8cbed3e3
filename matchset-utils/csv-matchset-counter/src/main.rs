use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use time::macros::format_description;

use matchtext_core::catalog::{builtin_registry, default_schema};
use matchtext_core::matchset::MatchPlan;
use matchtext_core::output::{
    ensure_dir, format_elapsed, print_header_with_index, prompt_for_column_index,
    render_count_map, render_count_pairs, run_timestamp, write_text_artifact,
};
use matchtext_core::pipeline::{run_classification, RunOptions, RunReport};

#[derive(Parser)]
#[command(name = "CSV Matchset Counter")]
#[command(about = "Classify one column of a large delimited file through cascading match sets and count aggregation-group hits")]
#[command(version = "1.0")]
struct Cli {
    #[arg(short, long, help = "Path to the delimited input file", required = true)]
    input: String,

    #[arg(short, long, help = "Zero-based column index to classify (prompts interactively when omitted)")]
    column: Option<usize>,

    #[arg(long, default_value = "1000", help = "Number of lines dispatched to the worker pool per chunk")]
    chunk_size: usize,

    #[arg(long, default_value = "40000", help = "Maximum decoded field length; longer fields are truncated")]
    max_field_length: usize,

    #[arg(short, long, help = "Match set id to apply (repeatable; defaults to every configured set)")]
    match_set: Vec<String>,

    #[arg(short, long, default_value = "0", help = "Number of threads to use (0 for auto)")]
    threads: usize,

    #[arg(short, long, default_value = "INFO", help = "Logging level (DEBUG, INFO, WARN, ERROR)")]
    log_level: String,

    #[arg(long, default_value = "results", help = "Directory for result artifacts")]
    results_dir: String,

    #[arg(long, default_value = "tmp", help = "Directory for the staging extract")]
    staging_dir: String,
}

fn setup_logging(log_level_str: &str) -> Result<()> {
    let log_level = match log_level_str.to_uppercase().as_str() {
        "DEBUG" => LevelFilter::Debug,
        "INFO" => LevelFilter::Info,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        other => {
            eprintln!("Invalid log level '{}', defaulting to INFO.", other);
            LevelFilter::Info
        }
    };

    SimpleLogger::new()
        .with_level(log_level)
        .with_timestamp_format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .init()?;

    Ok(())
}

fn setup_thread_pool(thread_count: usize) -> Result<usize> {
    let num_threads = if thread_count == 0 {
        let cores = num_cpus::get();
        info!("Auto-detected {} CPU cores. Using {} threads.", cores, cores);
        cores
    } else {
        info!("Using specified {} threads.", thread_count);
        thread_count
    };

    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
    {
        error!("Failed to build global thread pool: {}. Proceeding with default.", e);
    }

    Ok(num_threads)
}

fn validate_arguments(cli: &Cli) -> Result<()> {
    if cli.chunk_size == 0 {
        anyhow::bail!("--chunk-size must be at least 1");
    }
    if cli.max_field_length == 0 {
        anyhow::bail!("--max-field-length must be at least 1");
    }
    Ok(())
}

fn resolve_column_index(cli: &Cli, input_path: &Path) -> Result<usize> {
    println!("\nColumn indexes:");
    print_header_with_index(input_path)?;

    match cli.column {
        Some(index) => Ok(index),
        None => prompt_for_column_index(),
    }
}

fn extract_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} extract pass [{elapsed_precise}] {pos} lines {msg}")
            .expect("Failed to create progress bar template"),
    );
    bar
}

fn match_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta} @ {per_sec}) {msg}")
            .expect("Failed to create progress bar template")
            .progress_chars("=> "),
    );
    bar
}

fn write_artifacts(
    cli: &Cli,
    staging_path: &Path,
    report: &RunReport,
) -> Result<Vec<PathBuf>> {
    let results_dir = Path::new(&cli.results_dir);
    let timestamp = run_timestamp();

    // Artifact 1: the raw extracted column values from the staging pass.
    let values_path = results_dir.join(format!("column_values_{}.txt", timestamp));
    fs::copy(staging_path, &values_path).with_context(|| {
        format!("failed to copy staging extract to results: {}", values_path.display())
    })?;

    // Artifact 2: the group -> count mapping in declaration order.
    let map_path = write_text_artifact(
        results_dir,
        &format!("count_dict_{}.txt", timestamp),
        &render_count_map(&report.group_counts),
    )?;

    // Artifact 3: the same mapping as a descending-sorted pair list.
    let sorted_path = write_text_artifact(
        results_dir,
        &format!("descending_count_dict_list_{}.txt", timestamp),
        &render_count_pairs(&report.sorted_counts),
    )?;

    Ok(vec![values_path, map_path, sorted_path])
}

fn print_final_summary(start_time: Instant, report: &RunReport, artifacts: &[PathBuf]) {
    info!("-------------------- FINAL SUMMARY --------------------");
    info!("Total execution time: {}", format_elapsed(start_time.elapsed()));
    info!("Lines read: {}", report.extract.lines_read);
    info!("Records processed: {}", report.records_processed);
    info!("Hard filter fails: {}", report.records_filtered_out);
    info!("Accepted and assigned to a group: {}", report.accepted_assigned);
    if report.accepted_unassigned > 0 {
        info!("Accepted but matching no group: {}", report.accepted_unassigned);
    }
    if report.extract.parse_failures > 0 {
        warn!("Lines skipped for malformed quoting: {}", report.extract.parse_failures);
    }
    if report.extract.missing_column > 0 {
        warn!("Lines without the target column: {}", report.extract.missing_column);
    }
    if report.extract.truncated_fields > 0 {
        warn!("Fields truncated: {}", report.extract.truncated_fields);
    }

    info!("Match set hits:");
    for (set_id, hits) in &report.set_hit_counts {
        info!("  - set {}: {} records", set_id, hits);
    }

    info!("Group counts (descending):");
    for (name, count) in &report.sorted_counts {
        info!("  - {}: {}", name, count);
    }

    for path in artifacts {
        info!("Wrote {}", path.display());
    }
    info!("-------------------------------------------------------");
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();

    setup_logging(&cli.log_level)?;
    info!("Starting Matchset Counter");

    validate_arguments(&cli)?;
    setup_thread_pool(cli.threads)?;

    let input_path = PathBuf::from(&cli.input);
    let column_index = resolve_column_index(&cli, &input_path)?;
    info!("Classifying column {} of {}", column_index, input_path.display());

    let registry = builtin_registry();
    let plan = MatchPlan::build(&registry, &cli.match_set);
    if plan.is_empty() {
        anyhow::bail!("no match sets selected and none configured");
    }
    info!("Applying match sets: {}", plan.set_ids().join(", "));
    let schema = default_schema();

    // Both directories must exist before any processing starts.
    let staging_dir = Path::new(&cli.staging_dir);
    ensure_dir(staging_dir)?;
    ensure_dir(Path::new(&cli.results_dir))?;
    let staging_path = staging_dir.join("tmp_rows_strings.txt");

    let options = RunOptions {
        column_index,
        chunk_size: cli.chunk_size,
        max_field_length: cli.max_field_length,
    };

    let extract_bar = extract_progress_bar();
    let match_bar = match_progress_bar();
    let report = run_classification(
        &input_path,
        &staging_path,
        &plan,
        &schema,
        &options,
        Some(&extract_bar),
        Some(&match_bar),
    )?;
    extract_bar.finish_with_message("done");
    match_bar.finish_with_message("done");

    let artifacts = write_artifacts(&cli, &staging_path, &report)?;
    print_final_summary(start_time, &report, &artifacts);

    Ok(())
}
