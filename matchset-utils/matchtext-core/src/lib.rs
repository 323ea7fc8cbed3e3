//! Shared core for the `matchset-utils` command-line tools.
//!
//! The tools all work on the same kind of input: a large delimited text file
//! where each line is one record and one column holds a blob of unstructured
//! text. This crate provides the pieces they share:
//!
//! - [`line_split`]: a quote-aware, truncating splitter that pulls field
//!   values out of a raw line without building a full table model.
//! - [`normalize`]: text canonicalization used by every matching step.
//! - [`matchset`]: cascading required/optional term matching against named
//!   match sets resolved through an explicit registry.
//! - [`aggregate`]: named aggregation groups, fixed-key count tables, and
//!   the descending-sorted report.
//! - [`pipeline`]: the two-pass chunked parallel pipeline (staging extract,
//!   then match/count) used by `csv-matchset-counter`.
//! - [`numbers`]: numeric value extraction and counting for
//!   `csv-number-extractor`.
//! - [`output`]: results-directory plumbing, header listing, timestamped
//!   artifact files, and rendering helpers.

pub mod aggregate;
pub mod catalog;
pub mod line_split;
pub mod matchset;
pub mod normalize;
pub mod numbers;
pub mod output;
pub mod pipeline;

pub use aggregate::{AggregationGroup, AggregationSchema, CountTable};
pub use line_split::{split_line, Field, ParseFailure};
pub use matchset::{MatchPlan, MatchSetDefinition, MatchSetRegistry, RecordOutcome};
pub use normalize::clean;
pub use pipeline::{RunOptions, RunReport};
