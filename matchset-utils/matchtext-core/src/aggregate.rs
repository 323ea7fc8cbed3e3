//! Named aggregation groups and their count tables.
//!
//! The schema is an ordered list of group definitions; declaration order is
//! observable (it breaks count ties in the sorted report and resolves which
//! group claims a record that matches several). Count tables have their key
//! set fixed to the declared groups and are only mutated by record/merge.

use log::{debug, warn};

use crate::normalize::clean;

/// One named bucket with its ordered pattern list.
#[derive(Debug, Clone)]
pub struct AggregationGroup {
    pub name: String,
    pub patterns: Vec<String>,
}

impl AggregationGroup {
    pub fn new(name: &str, patterns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// The ordered group schema for a run. Patterns are normalized once at
/// construction; invalid groups (empty name, empty or unmatchable pattern
/// list, duplicate name) are disabled with a one-time warning and never
/// claim a record.
#[derive(Debug)]
pub struct AggregationSchema {
    groups: Vec<AggregationGroup>,
    cleaned_patterns: Vec<Vec<String>>,
    disabled: Vec<bool>,
}

impl AggregationSchema {
    pub fn new(groups: Vec<AggregationGroup>) -> Self {
        let mut cleaned_patterns = Vec::with_capacity(groups.len());
        let mut disabled = Vec::with_capacity(groups.len());

        for (index, group) in groups.iter().enumerate() {
            let cleaned: Vec<String> = group
                .patterns
                .iter()
                .map(|p| clean(p))
                .filter(|p| !p.is_empty())
                .collect();

            let duplicate = groups[..index].iter().any(|g| g.name == group.name);
            let mut disable = false;
            if group.name.is_empty() {
                warn!("aggregation group at position {} has an empty name; disabling it", index);
                disable = true;
            } else if duplicate {
                warn!("aggregation group '{}' declared twice; disabling the later one", group.name);
                disable = true;
            } else if cleaned.is_empty() {
                warn!("aggregation group '{}' has no usable patterns; disabling it", group.name);
                disable = true;
            }

            cleaned_patterns.push(cleaned);
            disabled.push(disable);
        }

        Self {
            groups,
            cleaned_patterns,
            disabled,
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group_name(&self, index: usize) -> &str {
        &self.groups[index].name
    }

    /// Assigns normalized record text to the first declared group with a
    /// matching pattern, or to no group at all. At most one group ever
    /// claims a record.
    pub fn assign(&self, cleaned_text: &str) -> Option<usize> {
        for (index, patterns) in self.cleaned_patterns.iter().enumerate() {
            if self.disabled[index] {
                continue;
            }
            for pattern in patterns {
                if cleaned_text.contains(pattern.as_str()) {
                    return Some(index);
                }
            }
        }
        None
    }

    /// A zero-initialized table over exactly the declared groups.
    pub fn new_table(&self) -> CountTable {
        CountTable {
            counts: vec![0; self.groups.len()],
        }
    }

    /// Increments the named group's count. Unknown names are ignored.
    pub fn record(&self, table: &mut CountTable, group_name: &str) {
        match self.groups.iter().position(|g| g.name == group_name) {
            Some(index) => table.counts[index] += 1,
            None => debug!("ignoring count for undeclared group '{}'", group_name),
        }
    }

    /// Increments by declaration index, as produced by [`Self::assign`].
    pub fn record_index(&self, table: &mut CountTable, index: usize) {
        if index < table.counts.len() {
            table.counts[index] += 1;
        }
    }

    /// Element-wise sum of the given tables over the fixed key set.
    pub fn merge<I>(&self, tables: I) -> CountTable
    where
        I: IntoIterator<Item = CountTable>,
    {
        let mut total = self.new_table();
        for table in tables {
            total.absorb(&table);
        }
        total
    }

    /// The table as (name, count) pairs in declaration order.
    pub fn table_pairs(&self, table: &CountTable) -> Vec<(String, u64)> {
        self.groups
            .iter()
            .zip(table.counts.iter())
            .map(|(group, &count)| (group.name.clone(), count))
            .collect()
    }

    /// The table sorted by count descending; ties keep declaration order
    /// (stable sort over the declaration-ordered pairs).
    pub fn sorted_report(&self, table: &CountTable) -> Vec<(String, u64)> {
        let mut pairs = self.table_pairs(table);
        pairs.sort_by(|a, b| b.1.cmp(&a.1));
        pairs
    }
}

/// Fixed-key counter aligned to a schema's declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountTable {
    counts: Vec<u64>,
}

impl CountTable {
    /// Adds `other` into `self` element-wise. Tables from the same schema
    /// always have matching lengths.
    pub fn absorb(&mut self, other: &CountTable) {
        debug_assert_eq!(self.counts.len(), other.counts.len());
        for (mine, theirs) in self.counts.iter_mut().zip(other.counts.iter()) {
            *mine += *theirs;
        }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_group_schema() -> AggregationSchema {
        AggregationSchema::new(vec![
            AggregationGroup::new("a", &["alpha", "shared"]),
            AggregationGroup::new("b", &["beta", "shared"]),
        ])
    }

    #[test]
    fn assign_is_mutually_exclusive_and_prefers_declaration_order() {
        let schema = two_group_schema();
        // "shared" belongs to both groups; only the first declared wins.
        assert_eq!(schema.assign("some shared text"), Some(0));
        assert_eq!(schema.assign("beta text"), Some(1));
        assert_eq!(schema.assign("nothing here"), None);
    }

    #[test]
    fn patterns_are_normalized_at_construction() {
        let schema = AggregationSchema::new(vec![AggregationGroup::new("x", &["Animal  Rights!!"])]);
        assert_eq!(schema.assign("we support animal rights here"), Some(0));
    }

    #[test]
    fn merge_sums_element_wise() {
        let schema = two_group_schema();
        let mut first = schema.new_table();
        schema.record(&mut first, "a");
        schema.record(&mut first, "a");
        let mut second = schema.new_table();
        schema.record(&mut second, "a");
        for _ in 0..3 {
            schema.record(&mut second, "b");
        }

        let merged = schema.merge(vec![first, second]);
        assert_eq!(schema.table_pairs(&merged), [("a".to_string(), 3), ("b".to_string(), 3)]);
    }

    #[test]
    fn recording_an_undeclared_group_is_a_no_op() {
        let schema = two_group_schema();
        let mut table = schema.new_table();
        schema.record(&mut table, "nope");
        assert_eq!(table.total(), 0);
    }

    #[test]
    fn sorted_report_breaks_ties_by_declaration_order() {
        let schema = AggregationSchema::new(vec![
            AggregationGroup::new("a", &["alpha"]),
            AggregationGroup::new("b", &["beta"]),
            AggregationGroup::new("c", &["gamma"]),
        ]);
        let mut table = schema.new_table();
        for _ in 0..3 {
            schema.record(&mut table, "a");
            schema.record(&mut table, "b");
        }
        schema.record(&mut table, "c");

        let report = schema.sorted_report(&table);
        assert_eq!(
            report,
            [
                ("a".to_string(), 3),
                ("b".to_string(), 3),
                ("c".to_string(), 1),
            ]
        );
    }

    #[test]
    fn disabled_groups_never_claim_records() {
        let schema = AggregationSchema::new(vec![
            AggregationGroup::new("empty", &[]),
            AggregationGroup::new("ok", &["hit"]),
        ]);
        assert_eq!(schema.assign("a hit here"), Some(1));
    }
}
