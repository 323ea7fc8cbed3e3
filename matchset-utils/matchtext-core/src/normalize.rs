//! Text canonicalization applied before any term or pattern matching.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Compiled once at program start; matching runs per record.
    static ref NON_ALPHA_RE: Regex = Regex::new(r"[^A-Za-z\s]").unwrap();
}

/// Canonicalizes `text` for matching: strips every character that is not an
/// ASCII letter or whitespace, lowercases the remainder, and collapses
/// whitespace runs to single spaces with no leading or trailing space.
///
/// Total and idempotent: `clean(clean(x)) == clean(x)` for all inputs.
pub fn clean(text: &str) -> String {
    let stripped = NON_ALPHA_RE.replace_all(text, "");
    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_non_alphabetic_characters_and_lowercases() {
        assert_eq!(clean("C4t!! Lovers"), "ct lovers");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(clean("  too\t many\n\n spaces  "), "too many spaces");
    }

    #[test]
    fn is_idempotent() {
        for input in ["C4t!! Lovers", "", "already clean", "99 problems!"] {
            let once = clean(input);
            assert_eq!(clean(&once), once);
        }
    }

    #[test]
    fn empty_and_symbol_only_inputs_clean_to_empty() {
        assert_eq!(clean(""), "");
        assert_eq!(clean("123 !@# 456"), "");
    }
}
