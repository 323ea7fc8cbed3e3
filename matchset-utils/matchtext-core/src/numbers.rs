//! Numeric value extraction from free text, used by `csv-number-extractor`.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Signed integers and decimals, e.g. "-3", "+12", "123.45", ".5".
    static ref NUMBER_RE: Regex = Regex::new(r"[-+]?\d*\.\d+|[-+]?\d+").unwrap();
}

/// Extracts every integer and decimal number from `text` as `f64` values,
/// in order of appearance.
pub fn extract_numbers(text: &str) -> Vec<f64> {
    NUMBER_RE
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

/// Canonical key for counting: `100` and `100.0` are the same value and
/// must land on the same key.
pub fn number_key(value: f64) -> String {
    format!("{}", value)
}

/// Folds one record's extracted values into the running counter.
pub fn count_values(counter: &mut HashMap<String, u64>, values: &[f64]) {
    for &value in values {
        *counter.entry(number_key(value)).or_insert(0) += 1;
    }
}

/// The counter as (value, count) pairs sorted by count descending; ties are
/// broken by ascending numeric value so the output is deterministic.
pub fn descending_counts(counter: &HashMap<String, u64>) -> Vec<(String, u64)> {
    let mut pairs: Vec<(String, u64)> = counter
        .iter()
        .map(|(key, &count)| (key.clone(), count))
        .collect();
    pairs.sort_by(|a, b| {
        b.1.cmp(&a.1).then_with(|| {
            let left = a.0.parse::<f64>().unwrap_or(0.0);
            let right = b.0.parse::<f64>().unwrap_or(0.0);
            left.partial_cmp(&right).unwrap_or(std::cmp::Ordering::Equal)
        })
    });
    pairs
}

/// Renders the counter as a map literal with unquoted numeric keys, count
/// descending, e.g. `{123.45: 2, 100: 1}`.
pub fn render_number_counter(pairs: &[(String, u64)]) -> String {
    let body = pairs
        .iter()
        .map(|(value, count)| format!("{}: {}", value, count))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{}}}", body)
}

/// Renders the counter as a list of pairs, e.g. `[(123.45, 2), (100, 1)]`.
pub fn render_number_pairs(pairs: &[(String, u64)]) -> String {
    let body = pairs
        .iter()
        .map(|(value, count)| format!("({}, {})", value, count))
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{}]", body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_integers_and_decimals() {
        assert_eq!(
            extract_numbers("The price is $123.45 and the quantity is 100."),
            [123.45, 100.0]
        );
    }

    #[test]
    fn extracts_signed_and_bare_decimal_values() {
        assert_eq!(extract_numbers("-3 then +12 then .5"), [-3.0, 12.0, 0.5]);
        assert!(extract_numbers("no numbers here").is_empty());
    }

    #[test]
    fn integer_and_decimal_spellings_share_a_key() {
        let mut counter = HashMap::new();
        count_values(&mut counter, &extract_numbers("100 and 100.0"));
        assert_eq!(counter.get("100"), Some(&2));
    }

    #[test]
    fn descending_counts_sort_by_count_then_value() {
        let mut counter = HashMap::new();
        count_values(&mut counter, &[5.0, 5.0, 2.0, 9.0, 2.0, 2.0]);
        assert_eq!(
            descending_counts(&counter),
            [
                ("2".to_string(), 3),
                ("5".to_string(), 2),
                ("9".to_string(), 1),
            ]
        );
    }

    #[test]
    fn renders_counter_and_pairs() {
        let pairs = vec![("123.45".to_string(), 2), ("100".to_string(), 1)];
        assert_eq!(render_number_counter(&pairs), "{123.45: 2, 100: 1}");
        assert_eq!(render_number_pairs(&pairs), "[(123.45, 2), (100, 1)]");
    }
}
