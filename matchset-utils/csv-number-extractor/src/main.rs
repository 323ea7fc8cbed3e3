use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn, LevelFilter};
use rayon::prelude::*;
use simple_logger::SimpleLogger;
use time::macros::format_description;

use matchtext_core::line_split::split_line;
use matchtext_core::numbers::{
    count_values, descending_counts, extract_numbers, render_number_counter, render_number_pairs,
};
use matchtext_core::output::{
    ensure_dir, format_elapsed, print_header_with_index, prompt_for_column_index, run_timestamp,
    write_text_artifact,
};
use matchtext_core::pipeline::ChunkedLineReader;

#[derive(Parser)]
#[command(name = "CSV Number Extractor")]
#[command(about = "Extract every numeric value from one column of a large delimited file and count value frequencies")]
#[command(version = "1.0")]
struct Cli {
    #[arg(short, long, help = "Path to the delimited input file", required = true)]
    input: String,

    #[arg(short, long, help = "Zero-based column index to scan (prompts interactively when omitted)")]
    column: Option<usize>,

    #[arg(long, default_value = "1000", help = "Number of lines dispatched to the worker pool per chunk")]
    chunk_size: usize,

    #[arg(long, default_value = "20000", help = "Maximum decoded field length; longer fields are truncated")]
    max_field_length: usize,

    #[arg(short, long, default_value = "0", help = "Number of threads to use (0 for auto)")]
    threads: usize,

    #[arg(short, long, default_value = "INFO", help = "Logging level (DEBUG, INFO, WARN, ERROR)")]
    log_level: String,

    #[arg(long, default_value = "results", help = "Directory for result artifacts")]
    results_dir: String,
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

#[derive(Debug, Default)]
struct RunTotals {
    lines_read: u64,
    records_with_numbers: u64,
    numbers_extracted: u64,
    parse_failures: u64,
    missing_column: u64,
}

/// One line's extraction result; `None` marks a skipped line (blank,
/// malformed quoting, or no target column).
enum LineNumbers {
    Blank,
    Failed,
    MissingColumn,
    Values(Vec<f64>),
}

fn extract_line_numbers(line: &str, column_index: usize, max_field_length: usize) -> LineNumbers {
    if line.trim().is_empty() {
        return LineNumbers::Blank;
    }
    match split_line(line, max_field_length) {
        Err(_) => LineNumbers::Failed,
        Ok(fields) => match fields.into_iter().nth(column_index) {
            Some(field) => LineNumbers::Values(extract_numbers(&field.value)),
            None => LineNumbers::MissingColumn,
        },
    }
}

/// Chunked parallel scan: each chunk is extracted on the worker pool, the
/// per-record number lists stream to the collection-list writer thread, and
/// the value counter is updated before the next chunk is read.
fn run_number_extraction(
    input_path: &Path,
    column_index: usize,
    chunk_size: usize,
    max_field_length: usize,
    collection_path: &Path,
    progress: &ProgressBar,
) -> Result<(HashMap<String, u64>, RunTotals)> {
    let input = File::open(input_path)
        .with_context(|| format!("failed to open input file: {}", input_path.display()))?;
    let mut reader = ChunkedLineReader::new(BufReader::new(input), chunk_size);

    let capacity = (rayon::current_num_threads() * 4).max(8);
    let (batch_sender, batch_receiver): (Sender<Vec<String>>, Receiver<Vec<String>>) =
        bounded(capacity);

    // The collection list is rendered incrementally so the whole run never
    // holds every per-record result at once.
    let collection_owned = collection_path.to_path_buf();
    let writer_thread = thread::spawn(move || -> Result<u64> {
        let file = File::create(&collection_owned).with_context(|| {
            format!("failed to create result file: {}", collection_owned.display())
        })?;
        let mut writer = BufWriter::new(file);
        write!(writer, "[").context("failed to write collection list")?;
        let mut records = 0u64;
        for batch in batch_receiver {
            for rendered in batch {
                if records > 0 {
                    write!(writer, ", ").context("failed to write collection list")?;
                }
                write!(writer, "{}", rendered).context("failed to write collection list")?;
                records += 1;
            }
        }
        writeln!(writer, "]").context("failed to write collection list")?;
        writer.flush().context("failed to flush collection list")?;
        Ok(records)
    });

    let mut counter: HashMap<String, u64> = HashMap::new();
    let mut totals = RunTotals::default();
    loop {
        let chunk = reader
            .next_chunk()
            .with_context(|| format!("failed to read input file: {}", input_path.display()))?;
        if chunk.is_empty() {
            break;
        }

        let extracted: Vec<LineNumbers> = chunk
            .par_iter()
            .map(|line| extract_line_numbers(line, column_index, max_field_length))
            .collect();

        let chunk_base = totals.lines_read;
        totals.lines_read += chunk.len() as u64;

        let mut batch = Vec::new();
        for (offset, result) in extracted.into_iter().enumerate() {
            match result {
                LineNumbers::Blank => {}
                LineNumbers::Failed => {
                    warn!("row {}: skipping unparseable line", chunk_base + offset as u64 + 1);
                    totals.parse_failures += 1;
                }
                LineNumbers::MissingColumn => totals.missing_column += 1,
                // Records without numbers keep their empty list in the
                // collection artifact; they just add nothing to the counter.
                LineNumbers::Values(values) => {
                    if !values.is_empty() {
                        totals.records_with_numbers += 1;
                        totals.numbers_extracted += values.len() as u64;
                        count_values(&mut counter, &values);
                    }
                    batch.push(format!("{:?}", values));
                }
            }
        }

        if !batch.is_empty() && batch_sender.send(batch).is_err() {
            // Receiver gone: the writer bailed out. Its error surfaces at join.
            break;
        }
        progress.inc(chunk.len() as u64);
    }

    drop(batch_sender);
    match writer_thread.join() {
        Ok(Ok(records)) => info!("Collection list holds {} records.", records),
        Ok(Err(e)) => return Err(e.context("collection writer thread failed")),
        Err(_) => return Err(anyhow!("collection writer thread panicked")),
    }

    Ok((counter, totals))
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();

    setup_logging(&cli.log_level)?;
    info!("Starting Number Extractor");

    if cli.chunk_size == 0 {
        anyhow::bail!("--chunk-size must be at least 1");
    }
    if cli.max_field_length == 0 {
        anyhow::bail!("--max-field-length must be at least 1");
    }
    setup_thread_pool(cli.threads)?;

    let input_path = PathBuf::from(&cli.input);
    println!("\nColumn indexes:");
    print_header_with_index(&input_path)?;
    let column_index = match cli.column {
        Some(index) => index,
        None => prompt_for_column_index()?,
    };
    info!("Scanning column {} of {}", column_index, input_path.display());

    let results_dir = Path::new(&cli.results_dir);
    ensure_dir(results_dir)?;
    let timestamp = run_timestamp();
    let collection_path = results_dir.join(format!("collection_listlist_{}.txt", timestamp));

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} scanning [{elapsed_precise}] {pos} lines {msg}")
            .expect("Failed to create progress bar template"),
    );

    let (counter, totals) = run_number_extraction(
        &input_path,
        column_index,
        cli.chunk_size,
        cli.max_field_length,
        &collection_path,
        &progress,
    )?;
    progress.finish_with_message("done");

    let sorted = descending_counts(&counter);
    let counter_path = write_text_artifact(
        results_dir,
        &format!("counter_dict_{}.txt", timestamp),
        &render_number_counter(&sorted),
    )?;
    let sorted_path = write_text_artifact(
        results_dir,
        &format!("sorted_counter_{}.txt", timestamp),
        &render_number_pairs(&sorted),
    )?;

    info!("-------------------- FINAL SUMMARY --------------------");
    info!("Total execution time: {}", format_elapsed(start_time.elapsed()));
    info!("Lines read: {}", totals.lines_read);
    info!("Records with numbers: {}", totals.records_with_numbers);
    info!("Numbers extracted: {}", totals.numbers_extracted);
    info!("Distinct values: {}", counter.len());
    if totals.parse_failures > 0 {
        warn!("Lines skipped for malformed quoting: {}", totals.parse_failures);
    }
    if totals.missing_column > 0 {
        warn!("Lines without the target column: {}", totals.missing_column);
    }
    info!("Wrote {}", collection_path.display());
    info!("Wrote {}", counter_path.display());
    info!("Wrote {}", sorted_path.display());
    info!("-------------------------------------------------------");

    Ok(())
}
