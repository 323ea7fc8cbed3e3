//! Run support shared by the binaries: header listing, the interactive
//! column prompt, results-directory plumbing, timestamped artifact files,
//! and rendering helpers.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::warn;
use time::macros::format_description;
use time::OffsetDateTime;

/// Prints the first row of the input file as `index: name` pairs so the
/// operator can pick a column. The header row is only read here; the
/// tokenizer never special-cases it.
pub fn print_header_with_index(path: &Path) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open input file: {}", path.display()))?;

    match reader.records().next() {
        Some(record) => {
            let record = record.context("failed to read the header row")?;
            for (index, name) in record.iter().enumerate() {
                println!("{}: {}", index, name);
            }
        }
        None => warn!("input file is empty; no header row to list"),
    }
    Ok(())
}

/// Asks the operator for a zero-based column index on stdin. A non-integer
/// answer is an invalid-argument error and aborts before any processing.
pub fn prompt_for_column_index() -> Result<usize> {
    println!("\ncolumn index to count...");
    io::stdout().flush().context("failed to flush stdout")?;

    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .context("failed to read column index from stdin")?;
    answer
        .trim()
        .parse::<usize>()
        .map_err(|_| anyhow!("invalid column index '{}': expected a non-negative integer", answer.trim()))
}

/// Creates `dir` (and parents) if absent.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create directory: {}", dir.display()))
}

/// UTC timestamp suffix for result file names, e.g. `2026_08_04__12_30_45123456`.
pub fn run_timestamp() -> String {
    let format = format_description!(
        "[year]_[month]_[day]__[hour]_[minute]_[second][subsecond digits:6]"
    );
    OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_else(|_| "timestamp_unavailable".to_string())
}

/// Writes one artifact file into the results directory and returns its path.
pub fn write_text_artifact(dir: &Path, file_name: &str, content: &str) -> Result<PathBuf> {
    let path = dir.join(file_name);
    let mut file = File::create(&path)
        .with_context(|| format!("failed to create result file: {}", path.display()))?;
    writeln!(file, "{}", content)
        .with_context(|| format!("failed to write result file: {}", path.display()))?;
    Ok(path)
}

/// Renders group counts as a map literal in the given order, e.g.
/// `{"cat_related": 3, "breakfast_related": 0}`.
pub fn render_count_map(pairs: &[(String, u64)]) -> String {
    let body = pairs
        .iter()
        .map(|(name, count)| format!("{:?}: {}", name, count))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{}}}", body)
}

/// Renders group counts as a list of pairs, e.g. `[("cat_related", 3)]`.
pub fn render_count_pairs(pairs: &[(String, u64)]) -> String {
    format!("{:?}", pairs)
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = elapsed.subsec_millis();

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_count_map_in_given_order() {
        let pairs = vec![("a".to_string(), 3), ("b".to_string(), 0)];
        assert_eq!(render_count_map(&pairs), r#"{"a": 3, "b": 0}"#);
    }

    #[test]
    fn renders_count_pairs_as_tuples() {
        let pairs = vec![("a".to_string(), 3), ("b".to_string(), 0)];
        assert_eq!(render_count_pairs(&pairs), r#"[("a", 3), ("b", 0)]"#);
    }

    #[test]
    fn formats_elapsed_durations() {
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1.500s");
        assert_eq!(format_elapsed(Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_elapsed(Duration::from_secs(3700)), "1h 1m 40s");
    }

    #[test]
    fn timestamp_has_the_expected_shape() {
        let ts = run_timestamp();
        assert_eq!(ts.matches("__").count(), 1);
        assert!(ts.len() >= "2026_08_04__12_30_45".len());
    }
}
