//! Deterministic STRIDE classification
//!
//! Maps a normalized component type to its applicable threat categories and
//! each category to a severity. Pure lookups over a static rule table; no I/O
//! and no failure mode.

use stride_model::{normalize_type, Severity, ThreatCategory};

use ThreatCategory::{
    DenialOfService as D, ElevationOfPrivilege as E, InformationDisclosure as I,
    Repudiation as R, Spoofing as S, Tampering as T,
};

/// One row of the rule table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreatRule {
    /// Normalized component type
    pub component_type: &'static str,
    /// Categories in declared order
    pub categories: &'static [ThreatCategory],
}

/// Categories for any type without its own rule
pub const DEFAULT_CATEGORIES: &[ThreatCategory] = &[T, I];

/// Canonical rule table
pub const RULES: &[ThreatRule] = &[
    ThreatRule {
        component_type: "user",
        categories: &[S, R, I, E],
    },
    ThreatRule {
        component_type: "web_server",
        categories: &[S, T, R, I, D, E],
    },
    ThreatRule {
        component_type: "api_gateway",
        categories: &[T, I, D, E],
    },
    ThreatRule {
        component_type: "database",
        categories: &[I, T, E, D],
    },
    ThreatRule {
        component_type: "service",
        categories: &[T, I, E],
    },
    ThreatRule {
        component_type: "storage",
        categories: &[I, T, D],
    },
    ThreatRule {
        component_type: "load_balancer",
        categories: &[D, T],
    },
    ThreatRule {
        component_type: "identity_provider",
        categories: &[S, R, E],
    },
];

/// STRIDE classifier over the static rule table
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreatClassifier;

impl ThreatClassifier {
    /// Create classifier
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Categories for a component type
    ///
    /// The type is normalized first, so `"Web Server"` and `"web_server"`
    /// classify the same. Unknown types get [`DEFAULT_CATEGORIES`].
    #[must_use]
    pub fn classify(&self, component_type: &str) -> &'static [ThreatCategory] {
        let normalized = normalize_type(component_type);
        Self::rule_for(&normalized).map_or(DEFAULT_CATEGORIES, |rule| rule.categories)
    }

    /// Severity of a category
    #[must_use]
    pub fn severity_of(&self, category: ThreatCategory) -> Severity {
        match category {
            S | T | I | E => Severity::High,
            R | D => Severity::Medium,
        }
    }

    fn rule_for(normalized: &str) -> Option<&'static ThreatRule> {
        RULES.iter().find(|rule| rule.component_type == normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn has_rule(raw: &str) -> bool {
        let normalized = normalize_type(raw);
        RULES.iter().any(|rule| rule.component_type == normalized)
    }

    #[test]
    fn database_rule_in_declared_order() {
        let classifier = ThreatClassifier::new();
        assert_eq!(classifier.classify("database"), &[I, T, E, D]);
    }

    #[test]
    fn display_types_are_normalized() {
        let classifier = ThreatClassifier::new();
        assert_eq!(classifier.classify("Web Server"), classifier.classify("web_server"));
        assert_eq!(classifier.classify("load-balancer"), &[D, T]);
        assert_eq!(classifier.classify("web_server").len(), 6);
    }

    #[test]
    fn unknown_and_blank_types_use_default() {
        let classifier = ThreatClassifier::new();
        assert_eq!(classifier.classify("quantum_router"), DEFAULT_CATEGORIES);
        assert_eq!(classifier.classify(""), DEFAULT_CATEGORIES);
        assert_eq!(classifier.classify("default"), DEFAULT_CATEGORIES);
        assert!(!has_rule("quantum_router"));
    }

    #[test]
    fn severity_map() {
        let classifier = ThreatClassifier::new();
        assert_eq!(classifier.severity_of(S), Severity::High);
        assert_eq!(classifier.severity_of(T), Severity::High);
        assert_eq!(classifier.severity_of(R), Severity::Medium);
        assert_eq!(classifier.severity_of(I), Severity::High);
        assert_eq!(classifier.severity_of(D), Severity::Medium);
        assert_eq!(classifier.severity_of(E), Severity::High);
    }

    #[test]
    fn rules_have_no_duplicates() {
        for rule in RULES {
            let mut seen = Vec::new();
            for category in rule.categories {
                assert!(!seen.contains(category), "duplicate in {}", rule.component_type);
                seen.push(*category);
            }
            assert!((2..=6).contains(&rule.categories.len()));
        }
    }

    proptest! {
        #[test]
        fn classify_is_total_and_deterministic(raw in ".{0,24}") {
            let classifier = ThreatClassifier::new();
            let first = classifier.classify(&raw);
            prop_assert!(!first.is_empty());
            prop_assert_eq!(first, classifier.classify(&raw));
            if !has_rule(&raw) {
                prop_assert_eq!(first, DEFAULT_CATEGORIES);
            }
        }

        #[test]
        fn known_types_survive_case_changes(index in 0..RULES.len(), upper in any::<bool>()) {
            let classifier = ThreatClassifier::new();
            let rule = RULES[index];
            let shown = if upper {
                rule.component_type.replace('_', " ").to_uppercase()
            } else {
                rule.component_type.to_string()
            };
            prop_assert_eq!(classifier.classify(&shown), rule.categories);
        }
    }
}
