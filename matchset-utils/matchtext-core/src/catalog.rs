//! Built-in match sets and the default aggregation schema.
//!
//! These are the configured starting point for the tools; callers can
//! register additional sets on the registry before building a plan.

use crate::aggregate::{AggregationGroup, AggregationSchema};
use crate::matchset::{MatchSetDefinition, MatchSetRegistry};

/// The registry of configured match sets, populated once at startup.
pub fn builtin_registry() -> MatchSetRegistry {
    let mut registry = MatchSetRegistry::new();
    registry.register(MatchSetDefinition::new(
        "1",
        "Cat-related content",
        &["cat"],
        &["pets", "animal rights"],
    ));
    registry.register(MatchSetDefinition::new(
        "2",
        "Breakfast-related content",
        &["eggs"],
        &["toast", "oj"],
    ));
    registry
}

/// The default aggregation schema matching the built-in sets. Declaration
/// order matters: it is the tie-break order in the sorted report.
pub fn default_schema() -> AggregationSchema {
    AggregationSchema::new(vec![
        AggregationGroup::new("cat_related", &["cat"]),
        AggregationGroup::new("breakfast_related", &["eggs", "toast", "oj"]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_sets_are_registered_and_valid() {
        let registry = builtin_registry();
        assert_eq!(registry.ids(), ["1", "2"]);
        for id in registry.ids() {
            let def = registry.get(&id).expect("registered set");
            assert!(def.is_valid());
            assert_eq!(def.optional_threshold, 2);
        }
    }

    #[test]
    fn default_schema_matches_builtin_set_topics() {
        let schema = default_schema();
        assert_eq!(schema.assign("my cat"), Some(0));
        assert_eq!(schema.assign("eggs and toast"), Some(1));
    }
}
