use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use time::macros::format_description;

use matchtext_core::line_split::split_line;
use matchtext_core::output::{
    ensure_dir, format_elapsed, print_header_with_index, prompt_for_column_index, run_timestamp,
    write_text_artifact,
};

#[derive(Parser)]
#[command(name = "CSV Column Extractor")]
#[command(about = "Extract one column's raw values (or a single row or cell) from a large delimited file, row by row")]
#[command(version = "1.0")]
struct Cli {
    #[arg(short, long, help = "Path to the delimited input file", required = true)]
    input: String,

    #[arg(short, long, help = "Zero-based column index to extract (prompts interactively when omitted unless --row is given)")]
    column: Option<usize>,

    #[arg(short, long, help = "Zero-based row index; with --column extracts that single cell, alone extracts the whole raw line")]
    row: Option<usize>,

    #[arg(long, default_value = "20000", help = "Maximum decoded field length; longer fields are truncated")]
    max_field_length: usize,

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

#[derive(Debug, Default)]
struct ExtractTotals {
    lines_read: u64,
    values_written: u64,
    parse_failures: u64,
    missing_column: u64,
    truncated_fields: u64,
}

/// Writes every value of the target column, one per line, into the results
/// directory. Reads the input row by row so file size does not matter.
fn extract_column(
    input_path: &Path,
    column_index: usize,
    max_field_length: usize,
    output_path: &Path,
) -> Result<ExtractTotals> {
    let input = File::open(input_path)
        .with_context(|| format!("failed to open input file: {}", input_path.display()))?;
    let output = File::create(output_path)
        .with_context(|| format!("failed to create output file: {}", output_path.display()))?;
    let mut writer = BufWriter::new(output);

    let mut totals = ExtractTotals::default();
    for line in BufReader::new(input).lines() {
        let line = line.with_context(|| format!("failed to read input file: {}", input_path.display()))?;
        totals.lines_read += 1;
        if line.trim().is_empty() {
            continue;
        }

        match split_line(&line, max_field_length) {
            Err(failure) => {
                warn!("row {}: skipping unparseable line: {}", totals.lines_read, failure);
                totals.parse_failures += 1;
            }
            Ok(fields) => {
                let truncated = fields.iter().filter(|f| f.truncated).count() as u64;
                if truncated > 0 {
                    warn!("row {}: truncated {} field(s) to {} characters", totals.lines_read, truncated, max_field_length);
                    totals.truncated_fields += truncated;
                }
                match fields.into_iter().nth(column_index) {
                    Some(field) => {
                        writeln!(writer, "{}", field.value).with_context(|| {
                            format!("failed to write output file: {}", output_path.display())
                        })?;
                        totals.values_written += 1;
                    }
                    None => totals.missing_column += 1,
                }
            }
        }
    }

    writer
        .flush()
        .with_context(|| format!("failed to flush output file: {}", output_path.display()))?;
    Ok(totals)
}

/// Returns the raw line at the zero-based row index.
fn extract_row(input_path: &Path, row_index: usize) -> Result<String> {
    let input = File::open(input_path)
        .with_context(|| format!("failed to open input file: {}", input_path.display()))?;
    for (index, line) in BufReader::new(input).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read input file: {}", input_path.display()))?;
        if index == row_index {
            return Ok(line);
        }
    }
    anyhow::bail!("row {} is past the end of the input file", row_index)
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();

    setup_logging(&cli.log_level)?;
    info!("Starting Column Extractor");

    if cli.max_field_length == 0 {
        anyhow::bail!("--max-field-length must be at least 1");
    }

    let input_path = PathBuf::from(&cli.input);
    let results_dir = Path::new(&cli.results_dir);
    ensure_dir(results_dir)?;
    let timestamp = run_timestamp();

    match (cli.row, cli.column) {
        // Whole raw line at one row index.
        (Some(row_index), None) => {
            let line = extract_row(&input_path, row_index)?;
            let path = write_text_artifact(results_dir, &format!("row_string_{}.txt", timestamp), &line)?;
            info!("line text extracted to -> {}", path.display());
        }
        // A single cell: one row, one column.
        (Some(row_index), Some(column_index)) => {
            let line = extract_row(&input_path, row_index)?;
            let fields = split_line(&line, cli.max_field_length)
                .with_context(|| format!("row {} has malformed quoting", row_index))?;
            let field = fields
                .into_iter()
                .nth(column_index)
                .with_context(|| format!("row {} has no column {}", row_index, column_index))?;
            if field.truncated {
                warn!("cell truncated to {} characters", cli.max_field_length);
            }
            let path = write_text_artifact(results_dir, &format!("cell_string_{}.txt", timestamp), &field.value)?;
            info!("cell text extracted to -> {}", path.display());
        }
        // Full column extraction.
        (None, column) => {
            println!("\nColumn indexes:");
            print_header_with_index(&input_path)?;
            let column_index = match column {
                Some(index) => index,
                None => prompt_for_column_index()?,
            };

            let output_path = results_dir.join(format!("column_values_{}.txt", timestamp));
            let totals = extract_column(&input_path, column_index, cli.max_field_length, &output_path)?;

            info!("-------------------- FINAL SUMMARY --------------------");
            info!("Total execution time: {}", format_elapsed(start_time.elapsed()));
            info!("Lines read: {}", totals.lines_read);
            info!("Values written: {}", totals.values_written);
            if totals.parse_failures > 0 {
                warn!("Lines skipped for malformed quoting: {}", totals.parse_failures);
            }
            if totals.missing_column > 0 {
                warn!("Lines without the target column: {}", totals.missing_column);
            }
            if totals.truncated_fields > 0 {
                warn!("Fields truncated: {}", totals.truncated_fields);
            }
            info!("Column values extracted to -> {}", output_path.display());
        }
    }

    Ok(())
}
