//! The chunked parallel pipeline behind `csv-matchset-counter`.
//!
//! The run is two strictly sequential passes over the data:
//!
//! 1. **Extract pass**: the main thread reads the input in bounded chunks of
//!    lines; each chunk is tokenized on the rayon pool (order-preserving),
//!    and the target column's values are handed as ordered batches over a
//!    bounded channel to a dedicated writer thread appending to the staging
//!    extract. The writer is joined before the next pass starts, so the
//!    staging file is fully written before anything reads it.
//! 2. **Match pass**: the main thread reads the staging extract in the same
//!    chunk size; each chunk fans out to the pool running the cascading
//!    filter and group assignment per record, and the chunk's outcomes are
//!    folded into the run totals before the next chunk is read. Chunks are
//!    never interleaved.
//!
//! Per-record failures (malformed quoting, missing column) are isolated:
//! the record is skipped and counted, the run continues. Only I/O failures
//! abort the run.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::thread;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::aggregate::{AggregationSchema, CountTable};
use crate::line_split::{split_line, ParseFailure};
use crate::matchset::{evaluate_record, MatchPlan, RecordOutcome};

/// Knobs for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub column_index: usize,
    pub chunk_size: usize,
    pub max_field_length: usize,
}

/// Counters from the extract pass.
#[derive(Debug, Default, Clone)]
pub struct ExtractStats {
    pub lines_read: u64,
    pub blank_lines: u64,
    pub parse_failures: u64,
    pub missing_column: u64,
    pub truncated_fields: u64,
    pub values_written: u64,
}

/// Final result of a classification run.
#[derive(Debug)]
pub struct RunReport {
    /// (group name, count) in declaration order.
    pub group_counts: Vec<(String, u64)>,
    /// (group name, count) sorted by count descending, ties in declaration
    /// order.
    pub sorted_counts: Vec<(String, u64)>,
    /// (set id, accepted-record count) in plan order.
    pub set_hit_counts: Vec<(String, u64)>,
    pub records_processed: u64,
    pub records_filtered_out: u64,
    pub accepted_unassigned: u64,
    pub accepted_assigned: u64,
    pub extract: ExtractStats,
}

/// Reads up to `chunk_size` lines at a time, stripping the line terminator.
/// An empty chunk means the stream is exhausted.
pub struct ChunkedLineReader<R> {
    reader: R,
    chunk_size: usize,
}

impl<R: BufRead> ChunkedLineReader<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self { reader, chunk_size }
    }

    pub fn next_chunk(&mut self) -> std::io::Result<Vec<String>> {
        let mut chunk = Vec::with_capacity(self.chunk_size);
        let mut buf = String::new();
        while chunk.len() < self.chunk_size {
            buf.clear();
            if self.reader.read_line(&mut buf)? == 0 {
                break;
            }
            while buf.ends_with('\n') || buf.ends_with('\r') {
                buf.pop();
            }
            chunk.push(buf.clone());
        }
        Ok(chunk)
    }
}

/// Outcome of tokenizing one line during the extract pass.
enum LineExtract {
    Blank,
    Failed(ParseFailure),
    MissingColumn,
    Value { value: String, truncated_in_line: u64 },
}

fn extract_line(line: &str, column_index: usize, max_field_length: usize) -> LineExtract {
    if line.trim().is_empty() {
        return LineExtract::Blank;
    }
    match split_line(line, max_field_length) {
        Err(failure) => LineExtract::Failed(failure),
        Ok(fields) => {
            let truncated_in_line = fields.iter().filter(|f| f.truncated).count() as u64;
            match fields.into_iter().nth(column_index) {
                Some(field) => LineExtract::Value {
                    value: field.value,
                    truncated_in_line,
                },
                None => LineExtract::MissingColumn,
            }
        }
    }
}

/// Extract pass: writes the target column's values, one per line, to the
/// staging extract at `staging_path`. The write phase fully completes
/// (writer thread joined) before this function returns.
pub fn extract_column_to_staging(
    input_path: &Path,
    staging_path: &Path,
    options: &RunOptions,
    progress: Option<&ProgressBar>,
) -> Result<ExtractStats> {
    let input = File::open(input_path)
        .with_context(|| format!("failed to open input file: {}", input_path.display()))?;
    let mut reader = ChunkedLineReader::new(BufReader::new(input), options.chunk_size);

    let capacity = (rayon::current_num_threads() * 4).max(8);
    let (batch_sender, batch_receiver): (Sender<Vec<String>>, Receiver<Vec<String>>) =
        bounded(capacity);
    debug!("staging writer channel capacity: {}", capacity);

    let staging_owned = staging_path.to_path_buf();
    let writer_thread = thread::spawn(move || -> Result<u64> {
        let file = File::create(&staging_owned)
            .with_context(|| format!("failed to create staging extract: {}", staging_owned.display()))?;
        let mut writer = BufWriter::new(file);
        let mut written = 0u64;
        for batch in batch_receiver {
            for value in &batch {
                writeln!(writer, "{}", value).with_context(|| {
                    format!("failed to write staging extract: {}", staging_owned.display())
                })?;
                written += 1;
            }
        }
        writer.flush().with_context(|| {
            format!("failed to flush staging extract: {}", staging_owned.display())
        })?;
        Ok(written)
    });

    let mut stats = ExtractStats::default();
    loop {
        let chunk = reader
            .next_chunk()
            .with_context(|| format!("failed to read input file: {}", input_path.display()))?;
        if chunk.is_empty() {
            break;
        }

        let extracts: Vec<LineExtract> = chunk
            .par_iter()
            .map(|line| extract_line(line, options.column_index, options.max_field_length))
            .collect();

        let chunk_base = stats.lines_read;
        stats.lines_read += chunk.len() as u64;

        let mut batch = Vec::with_capacity(extracts.len());
        for (offset, extract) in extracts.into_iter().enumerate() {
            let row = chunk_base + offset as u64 + 1;
            match extract {
                LineExtract::Blank => stats.blank_lines += 1,
                LineExtract::Failed(failure) => {
                    warn!("row {}: skipping unparseable line: {}", row, failure);
                    stats.parse_failures += 1;
                }
                LineExtract::MissingColumn => {
                    debug!("row {}: no column {} in this line", row, options.column_index);
                    stats.missing_column += 1;
                }
                LineExtract::Value {
                    value,
                    truncated_in_line,
                } => {
                    if truncated_in_line > 0 {
                        warn!("row {}: truncated {} field(s) to {} characters", row, truncated_in_line, options.max_field_length);
                        stats.truncated_fields += truncated_in_line;
                    }
                    batch.push(value);
                }
            }
        }

        if !batch.is_empty() && batch_sender.send(batch).is_err() {
            // Receiver gone: the writer bailed out. Its error surfaces at join.
            break;
        }
        if let Some(bar) = progress {
            bar.inc(chunk.len() as u64);
        }
    }

    drop(batch_sender);
    match writer_thread.join() {
        Ok(Ok(written)) => stats.values_written = written,
        Ok(Err(e)) => return Err(e.context("staging writer thread failed")),
        Err(_) => return Err(anyhow!("staging writer thread panicked")),
    }

    info!(
        "extract pass done: {} lines read, {} values staged, {} parse failures, {} missing column, {} truncated fields",
        stats.lines_read, stats.values_written, stats.parse_failures, stats.missing_column, stats.truncated_fields
    );
    Ok(stats)
}

struct MatchPassOutput {
    table: CountTable,
    set_hits: Vec<u64>,
    records_processed: u64,
    records_filtered_out: u64,
    accepted_unassigned: u64,
    accepted_assigned: u64,
}

/// Match pass: runs the cascading filter and group assignment over the
/// staging extract, one chunk at a time. Each chunk's partial results are
/// folded into the run totals as soon as the chunk completes, then dropped.
fn run_match_pass(
    staging_path: &Path,
    plan: &MatchPlan,
    schema: &AggregationSchema,
    chunk_size: usize,
    progress: Option<&ProgressBar>,
) -> Result<MatchPassOutput> {
    let staging = File::open(staging_path)
        .with_context(|| format!("failed to open staging extract: {}", staging_path.display()))?;
    let mut reader = ChunkedLineReader::new(BufReader::new(staging), chunk_size);

    let mut output = MatchPassOutput {
        table: schema.new_table(),
        set_hits: vec![0; plan.len()],
        records_processed: 0,
        records_filtered_out: 0,
        accepted_unassigned: 0,
        accepted_assigned: 0,
    };

    loop {
        let chunk = reader
            .next_chunk()
            .with_context(|| format!("failed to read staging extract: {}", staging_path.display()))?;
        if chunk.is_empty() {
            break;
        }

        // One chunk in flight at a time: fully collected before the next read.
        let evaluations: Vec<_> = chunk
            .par_iter()
            .map(|text| evaluate_record(text, plan, schema))
            .collect();

        for evaluation in evaluations {
            output.records_processed += 1;
            for (slot, hit) in output.set_hits.iter_mut().zip(evaluation.set_hits.iter()) {
                if *hit {
                    *slot += 1;
                }
            }
            match evaluation.outcome {
                RecordOutcome::Rejected => output.records_filtered_out += 1,
                RecordOutcome::AcceptedUnassigned => output.accepted_unassigned += 1,
                RecordOutcome::Accepted { group } => {
                    output.accepted_assigned += 1;
                    schema.record_index(&mut output.table, group);
                }
            }
        }

        if let Some(bar) = progress {
            bar.inc(chunk.len() as u64);
        }
    }

    Ok(output)
}

/// Runs the whole pipeline: extract pass, then match pass, then report.
pub fn run_classification(
    input_path: &Path,
    staging_path: &Path,
    plan: &MatchPlan,
    schema: &AggregationSchema,
    options: &RunOptions,
    extract_progress: Option<&ProgressBar>,
    match_progress: Option<&ProgressBar>,
) -> Result<RunReport> {
    let extract = extract_column_to_staging(input_path, staging_path, options, extract_progress)?;

    if let Some(bar) = match_progress {
        bar.set_length(extract.values_written);
    }
    let matched = run_match_pass(staging_path, plan, schema, options.chunk_size, match_progress)?;

    let set_hit_counts = plan
        .set_ids()
        .into_iter()
        .zip(matched.set_hits.iter().copied())
        .collect();

    Ok(RunReport {
        group_counts: schema.table_pairs(&matched.table),
        sorted_counts: schema.sorted_report(&matched.table),
        set_hit_counts,
        records_processed: matched.records_processed,
        records_filtered_out: matched.records_filtered_out,
        accepted_unassigned: matched.accepted_unassigned,
        accepted_assigned: matched.accepted_assigned,
        extract,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn chunked_reader_honors_chunk_size_and_strips_terminators() {
        let data = "one\r\ntwo\nthree\nfour";
        let mut reader = ChunkedLineReader::new(Cursor::new(data), 2);
        assert_eq!(reader.next_chunk().unwrap(), ["one", "two"]);
        assert_eq!(reader.next_chunk().unwrap(), ["three", "four"]);
        assert!(reader.next_chunk().unwrap().is_empty());
    }

    #[test]
    fn extract_line_reports_each_outcome() {
        assert!(matches!(extract_line("  ", 0, 100), LineExtract::Blank));
        assert!(matches!(
            extract_line(r#""open,1"#, 0, 100),
            LineExtract::Failed(ParseFailure::UnterminatedQuote)
        ));
        assert!(matches!(extract_line("a,b", 5, 100), LineExtract::MissingColumn));
        match extract_line("a,\"b,c\",d", 1, 100) {
            LineExtract::Value {
                value,
                truncated_in_line,
            } => {
                assert_eq!(value, "b,c");
                assert_eq!(truncated_in_line, 0);
            }
            _ => panic!("expected a value"),
        }
    }

    #[test]
    fn extract_line_counts_truncations_anywhere_in_the_line() {
        let line = format!("{},{}", "x".repeat(30), "y".repeat(30));
        match extract_line(&line, 0, 10) {
            LineExtract::Value {
                value,
                truncated_in_line,
            } => {
                assert_eq!(value.len(), 10);
                assert_eq!(truncated_in_line, 2);
            }
            _ => panic!("expected a value"),
        }
    }
}
