//! Quote-aware splitting of a single delimited line.
//!
//! This is deliberately not a full CSV reader: the tools need to pull field
//! values out of very long lines with a hard cap on field size, and a line is
//! always exactly one record (embedded newlines inside quotes are not
//! supported). Fields are comma-delimited. A field enclosed in double quotes
//! may contain literal commas, and a doubled quote (`""`) inside it decodes
//! to one literal quote character. A field that *starts* with a doubled
//! quote is not quote-enclosed; it is read to the next comma with `""`
//! decoding applied, so `""quoted""` decodes to `"quoted"`.

use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

/// One extracted field value plus whether it was cut down to the length cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub value: String,
    pub truncated: bool,
}

/// Malformed quoting in one line. Never fatal: callers skip the line and
/// count the skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("quoted field is missing its closing quote")]
    UnterminatedQuote,
    #[error("unexpected character {found:?} after closing quote")]
    TrailingAfterQuote { found: char },
}

/// Splits `line` into its fields, decoding quotes and truncating any field
/// whose decoded length exceeds `max_field_length` characters.
///
/// Example: `1,2,"hello,world",3,""quoted"",4` splits into
/// `["1", "2", "hello,world", "3", "\"quoted\"", "4"]`.
pub fn split_line(line: &str, max_field_length: usize) -> Result<Vec<Field>, ParseFailure> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        fields.push(parse_field(&mut chars, max_field_length)?);
        match chars.next() {
            Some(',') => continue,
            None => break,
            // parse_field only ever stops at a comma or the end of the line
            Some(found) => return Err(ParseFailure::TrailingAfterQuote { found }),
        }
    }

    Ok(fields)
}

fn parse_field(
    chars: &mut Peekable<Chars<'_>>,
    max_field_length: usize,
) -> Result<Field, ParseFailure> {
    let mut value = String::new();

    if chars.peek() == Some(&'"') {
        let mut lookahead = chars.clone();
        lookahead.next();
        if lookahead.peek() == Some(&'"') {
            // Doubled quote at field start: not an enclosure, decode in place.
            read_unquoted(chars, &mut value);
        } else {
            chars.next();
            read_quoted(chars, &mut value)?;
        }
    } else {
        read_unquoted(chars, &mut value);
    }

    Ok(truncate_field(value, max_field_length))
}

/// Reads up to the next unescaped closing quote. The closing quote must be
/// followed by a comma or the end of the line.
fn read_quoted(chars: &mut Peekable<Chars<'_>>, value: &mut String) -> Result<(), ParseFailure> {
    loop {
        match chars.next() {
            None => return Err(ParseFailure::UnterminatedQuote),
            Some('"') => match chars.peek() {
                Some(&'"') => {
                    chars.next();
                    value.push('"');
                }
                Some(',') | None => return Ok(()),
                Some(&found) => return Err(ParseFailure::TrailingAfterQuote { found }),
            },
            Some(c) => value.push(c),
        }
    }
}

/// Reads up to the next comma, decoding `""` pairs to a literal quote.
fn read_unquoted(chars: &mut Peekable<Chars<'_>>, value: &mut String) {
    while let Some(&c) = chars.peek() {
        if c == ',' {
            break;
        }
        chars.next();
        if c == '"' && chars.peek() == Some(&'"') {
            chars.next();
            value.push('"');
        } else {
            value.push(c);
        }
    }
}

fn truncate_field(value: String, max_field_length: usize) -> Field {
    if value.chars().count() > max_field_length {
        Field {
            value: value.chars().take(max_field_length).collect(),
            truncated: true,
        }
    } else {
        Field {
            value,
            truncated: false,
        }
    }
}
