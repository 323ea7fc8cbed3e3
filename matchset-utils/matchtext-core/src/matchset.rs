//! Cascading required/optional term matching.
//!
//! A match set bundles a list of required terms, a list of optional terms,
//! and an optional-term threshold. A record passes a set if any required
//! term is present, or if at least `optional_threshold` optional terms are
//! present. Sets are resolved through an explicit registry keyed by set id;
//! a selected set that is missing or invalid is disabled with a one-time
//! warning and reports `false` for every record.

use std::collections::HashMap;

use log::{debug, warn};

use crate::aggregate::AggregationSchema;
use crate::normalize::clean;

pub const DEFAULT_OPTIONAL_THRESHOLD: usize = 2;

/// One named bundle of matching rules. Built once at configuration time and
/// immutable for the run.
#[derive(Debug, Clone)]
pub struct MatchSetDefinition {
    pub id: String,
    pub description: String,
    pub required_terms: Vec<String>,
    pub optional_terms: Vec<String>,
    pub optional_threshold: usize,
}

impl MatchSetDefinition {
    pub fn new(id: &str, description: &str, required: &[&str], optional: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            required_terms: required.iter().map(|t| t.to_string()).collect(),
            optional_terms: optional.iter().map(|t| t.to_string()).collect(),
            optional_threshold: DEFAULT_OPTIONAL_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.optional_threshold = threshold;
        self
    }

    /// A set with no required terms cannot be evaluated meaningfully.
    pub fn is_valid(&self) -> bool {
        !self.required_terms.is_empty()
    }
}

/// Explicit mapping from set id to definition, populated once at startup.
/// Lookups are plain key access.
#[derive(Debug, Default)]
pub struct MatchSetRegistry {
    sets: HashMap<String, MatchSetDefinition>,
}

impl MatchSetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: MatchSetDefinition) {
        if let Some(previous) = self.sets.insert(definition.id.clone(), definition) {
            warn!("match set '{}' registered twice; keeping the later definition", previous.id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&MatchSetDefinition> {
        self.sets.get(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sets.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// The resolved selection of match sets for one run. Missing or invalid
/// selections are kept (so every selected id still reports a result) but
/// disabled, each with a single startup warning.
#[derive(Debug)]
pub struct MatchPlan {
    sets: Vec<PlannedSet>,
}

#[derive(Debug)]
struct PlannedSet {
    id: String,
    definition: Option<MatchSetDefinition>,
}

impl MatchPlan {
    /// Resolves `requested` ids against the registry. An empty request
    /// selects every registered set in id order.
    pub fn build(registry: &MatchSetRegistry, requested: &[String]) -> Self {
        let selected: Vec<String> = if requested.is_empty() {
            registry.ids()
        } else {
            let mut seen = Vec::new();
            for id in requested {
                if seen.contains(id) {
                    warn!("match set '{}' requested more than once; ignoring the repeat", id);
                } else {
                    seen.push(id.clone());
                }
            }
            seen
        };

        let sets = selected
            .into_iter()
            .map(|id| {
                let definition = match registry.get(&id) {
                    None => {
                        warn!("match set '{}' is not registered; it will reject every record", id);
                        None
                    }
                    Some(def) if !def.is_valid() => {
                        warn!("match set '{}' has no required terms; it will reject every record", id);
                        None
                    }
                    Some(def) => Some(def.clone()),
                };
                PlannedSet { id, definition }
            })
            .collect();

        Self { sets }
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn set_ids(&self) -> Vec<String> {
        self.sets.iter().map(|s| s.id.clone()).collect()
    }
}

/// Returns true as soon as any term (in declaration order) is found in
/// `text` as a substring. `text` must already be normalized; the terms are
/// normalized here. Terms that normalize to nothing cannot match.
pub fn has_required_terms(text: &str, terms: &[String]) -> bool {
    for term in terms {
        let needle = clean(term);
        if !needle.is_empty() && text.contains(needle.as_str()) {
            debug!("required term hit -> {}", needle);
            return true;
        }
    }
    false
}

/// Counts terms (in declaration order) found in `text` as substrings,
/// returning true as soon as the running count reaches `n`. `text` must
/// already be normalized; the terms are normalized here.
pub fn has_n_optional_terms(text: &str, terms: &[String], n: usize) -> bool {
    let mut found = 0;
    for term in terms {
        let needle = clean(term);
        if !needle.is_empty() && text.contains(needle.as_str()) {
            found += 1;
            debug!("optional term hit -> {}", needle);
            if found >= n {
                return true;
            }
        }
    }
    false
}

/// Terminal state of one record after filtering and group assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Failed the hard filter: no selected match set accepted the record.
    Rejected,
    /// Passed the hard filter but matched no aggregation group.
    AcceptedUnassigned,
    /// Passed the hard filter and was assigned to exactly one group.
    Accepted { group: usize },
}

/// Per-record evaluation result: one boolean per planned set (in plan
/// order) plus the terminal outcome.
#[derive(Debug, Clone)]
pub struct RecordEvaluation {
    pub set_hits: Vec<bool>,
    pub outcome: RecordOutcome,
}

/// Runs every planned match set against the record text independently,
/// then, if any set accepted, assigns the record to at most one
/// aggregation group (first declared group with a matching pattern).
pub fn evaluate_record(
    raw_text: &str,
    plan: &MatchPlan,
    schema: &AggregationSchema,
) -> RecordEvaluation {
    let cleaned = clean(raw_text);

    let mut passed = false;
    let mut set_hits = Vec::with_capacity(plan.sets.len());
    for planned in &plan.sets {
        let hit = match &planned.definition {
            Some(def) => {
                has_required_terms(&cleaned, &def.required_terms)
                    || has_n_optional_terms(&cleaned, &def.optional_terms, def.optional_threshold)
            }
            None => false,
        };
        passed |= hit;
        set_hits.push(hit);
    }

    let outcome = if passed {
        match schema.assign(&cleaned) {
            Some(group) => RecordOutcome::Accepted { group },
            None => RecordOutcome::AcceptedUnassigned,
        }
    } else {
        RecordOutcome::Rejected
    };

    RecordEvaluation { set_hits, outcome }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregationGroup;

    fn cat_set() -> MatchSetDefinition {
        MatchSetDefinition::new("1", "Cat-related content", &["cat"], &["pets", "animal rights"])
    }

    fn registry() -> MatchSetRegistry {
        let mut registry = MatchSetRegistry::new();
        registry.register(cat_set());
        registry
    }

    fn schema() -> AggregationSchema {
        AggregationSchema::new(vec![AggregationGroup::new("cats", &["cat"])])
    }

    #[test]
    fn required_term_alone_accepts() {
        let def = cat_set();
        let text = clean("My cat loves yarn");
        assert!(has_required_terms(&text, &def.required_terms));
    }

    #[test]
    fn threshold_optional_terms_accept() {
        let def = cat_set();
        let text = clean("pets and animal rights");
        assert!(!has_required_terms(&text, &def.required_terms));
        assert!(has_n_optional_terms(&text, &def.optional_terms, def.optional_threshold));
    }

    #[test]
    fn one_optional_term_below_threshold_rejects() {
        let def = cat_set();
        let text = clean("pets only");
        assert!(!has_n_optional_terms(&text, &def.optional_terms, def.optional_threshold));
    }

    #[test]
    fn terms_are_normalized_before_matching() {
        assert!(has_required_terms("my cat", &["C:A:T".to_string()]));
    }

    #[test]
    fn evaluate_accepts_and_assigns() {
        let plan = MatchPlan::build(&registry(), &[]);
        let eval = evaluate_record("My cat loves yarn", &plan, &schema());
        assert_eq!(eval.set_hits, [true]);
        assert_eq!(eval.outcome, RecordOutcome::Accepted { group: 0 });
    }

    #[test]
    fn evaluate_rejects_when_no_set_matches() {
        let plan = MatchPlan::build(&registry(), &[]);
        let eval = evaluate_record("nothing relevant", &plan, &schema());
        assert_eq!(eval.set_hits, [false]);
        assert_eq!(eval.outcome, RecordOutcome::Rejected);
    }

    #[test]
    fn accepted_record_without_group_match_is_unassigned() {
        let plan = MatchPlan::build(&registry(), &[]);
        let empty_schema = AggregationSchema::new(vec![AggregationGroup::new("dogs", &["dog"])]);
        let eval = evaluate_record("pets and animal rights", &plan, &empty_schema);
        assert_eq!(eval.outcome, RecordOutcome::AcceptedUnassigned);
    }

    #[test]
    fn unknown_selected_set_reports_false_without_breaking_others() {
        let plan = MatchPlan::build(&registry(), &["missing".to_string(), "1".to_string()]);
        let eval = evaluate_record("My cat loves yarn", &plan, &schema());
        assert_eq!(plan.set_ids(), ["missing", "1"]);
        assert_eq!(eval.set_hits, [false, true]);
        assert_eq!(eval.outcome, RecordOutcome::Accepted { group: 0 });
    }

    #[test]
    fn set_with_no_required_terms_is_disabled() {
        let mut registry = registry();
        registry.register(MatchSetDefinition::new("bad", "no required terms", &[], &["x", "y"]));
        let plan = MatchPlan::build(&registry, &["bad".to_string()]);
        let eval = evaluate_record("x y", &plan, &schema());
        assert_eq!(eval.set_hits, [false]);
        assert_eq!(eval.outcome, RecordOutcome::Rejected);
    }
}
