//! End-to-end run of the classification pipeline over a small input file,
//! using the built-in match sets and default aggregation schema.

use std::fs;

use matchtext_core::catalog::{builtin_registry, default_schema};
use matchtext_core::matchset::{evaluate_record, MatchPlan};
use matchtext_core::pipeline::{run_classification, RunOptions};

#[test]
fn three_line_file_counts_one_hit_per_matched_set() {
    let workspace = tempfile::tempdir().expect("temp dir");
    let input_path = workspace.path().join("input.csv");
    let staging_path = workspace.path().join("tmp_rows_strings.txt");
    fs::write(
        &input_path,
        "text,score\n\"My cat\",1\n\"eggs and toast\",2\n\"nothing relevant\",3\n",
    )
    .expect("write input");

    let registry = builtin_registry();
    let plan = MatchPlan::build(&registry, &[]);
    let schema = default_schema();
    let options = RunOptions {
        column_index: 0,
        chunk_size: 2,
        max_field_length: 40000,
    };

    let report = run_classification(
        &input_path,
        &staging_path,
        &plan,
        &schema,
        &options,
        None,
        None,
    )
    .expect("pipeline run");

    // Header row is a record like any other; it just fails the filter.
    assert_eq!(report.extract.lines_read, 4);
    assert_eq!(report.extract.values_written, 4);
    assert_eq!(report.extract.parse_failures, 0);
    assert_eq!(report.records_processed, 4);
    assert_eq!(report.records_filtered_out, 2);
    assert_eq!(report.accepted_assigned, 2);
    assert_eq!(report.accepted_unassigned, 0);

    assert_eq!(
        report.set_hit_counts,
        [("1".to_string(), 1), ("2".to_string(), 1)]
    );
    assert_eq!(
        report.group_counts,
        [
            ("cat_related".to_string(), 1),
            ("breakfast_related".to_string(), 1),
        ]
    );
    assert_eq!(report.sorted_counts, report.group_counts);

    let staged = fs::read_to_string(&staging_path).expect("read staging extract");
    assert_eq!(
        staged.lines().collect::<Vec<_>>(),
        ["text", "My cat", "eggs and toast", "nothing relevant"]
    );
}

#[test]
fn per_record_set_results_match_the_example_texts() {
    let registry = builtin_registry();
    let plan = MatchPlan::build(&registry, &[]);
    let schema = default_schema();

    let expectations = [
        ("My cat", [true, false]),
        ("eggs and toast", [false, true]),
        ("nothing relevant", [false, false]),
    ];
    for (text, expected) in expectations {
        let evaluation = evaluate_record(text, &plan, &schema);
        assert_eq!(evaluation.set_hits, expected, "set results for {:?}", text);
    }
}

#[test]
fn parse_failures_are_skipped_without_aborting_the_run() {
    let workspace = tempfile::tempdir().expect("temp dir");
    let input_path = workspace.path().join("input.csv");
    let staging_path = workspace.path().join("tmp_rows_strings.txt");
    fs::write(
        &input_path,
        "\"My cat\",1\n\"broken quote,2\n\"eggs and toast\",3\n",
    )
    .expect("write input");

    let registry = builtin_registry();
    let plan = MatchPlan::build(&registry, &[]);
    let schema = default_schema();
    let options = RunOptions {
        column_index: 0,
        chunk_size: 1000,
        max_field_length: 40000,
    };

    let report = run_classification(
        &input_path,
        &staging_path,
        &plan,
        &schema,
        &options,
        None,
        None,
    )
    .expect("pipeline run");

    assert_eq!(report.extract.lines_read, 3);
    assert_eq!(report.extract.parse_failures, 1);
    assert_eq!(report.extract.values_written, 2);
    assert_eq!(report.records_processed, 2);
    assert_eq!(report.accepted_assigned, 2);
}
