//! Integration tests for the --check feature

use fragment_composer::lint::{self, LintCategory};
use fragment_composer::{parse, resolve_includes, FragmentRegistry, ParameterSet};

fn fixture(source: &str, params: &str) -> Vec<lint::LintWarning> {
    let fragment = parse(source).expect("Should parse");
    let params = ParameterSet::from_toml_str(params).expect("Should load params");
    lint::check(&fragment, &params)
}

#[test]
fn test_true_positives_all_categories() {
    let warnings = fixture(
        include_str!("lint-fixtures/true-positives.html"),
        include_str!("lint-fixtures/true-positives.toml"),
    );

    let categories: Vec<String> = warnings.iter().map(|w| w.category.to_string()).collect();
    for expected in ["missing", "type", "unused", "include"] {
        assert!(
            categories.contains(&expected.to_string()),
            "Expected {} warning, got: {:?}",
            expected,
            categories
        );
    }

    // The missing parameter sits in the branch rendering would skip
    let missing: Vec<_> = warnings
        .iter()
        .filter(|w| w.category == LintCategory::Missing)
        .collect();
    assert_eq!(missing.len(), 1);
    assert!(missing[0].message.contains("unsupported_reason"));
}

#[test]
fn test_true_negatives_clean() {
    let warnings = fixture(
        include_str!("lint-fixtures/true-negatives.html"),
        include_str!("lint-fixtures/true-negatives.toml"),
    );

    assert!(
        warnings.is_empty(),
        "Expected no warnings for true-negatives, got: {:?}",
        warnings
            .iter()
            .map(|w| format!("{}: {}", w.category, w.message))
            .collect::<Vec<_>>()
    );
}

#[test]
fn test_warnings_point_into_source() {
    let source = include_str!("lint-fixtures/true-positives.html");
    let warnings = fixture(source, include_str!("lint-fixtures/true-positives.toml"));

    for w in &warnings {
        match (&w.category, &w.span) {
            (LintCategory::Unused, span) => assert!(span.is_none()),
            (_, Some(span)) => assert!(span.end <= source.len()),
            (category, None) => panic!("{} warning without a span", category),
        }
    }

    let type_warning = warnings
        .iter()
        .find(|w| w.category == LintCategory::Type)
        .expect("Should have a type warning");
    let span = type_warning.span.clone().expect("Type warnings carry spans");
    assert_eq!(&source[span], "steps");
}

#[test]
fn test_resolved_includes_are_checked() {
    let mut registry = FragmentRegistry::new();
    registry
        .register_source("settlements", "<p>{{settlement_terms}}</p>")
        .unwrap();

    let fragment = parse("{{> settlements}}{{> settlements settlement_terms=\"T+1\"}}").unwrap();
    let resolved = resolve_includes(&fragment, &registry).unwrap();
    let warnings = lint::check(&resolved, &ParameterSet::new());

    // Only the include without a binding lacks the parameter
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].category, LintCategory::Missing);
    assert!(!warnings.iter().any(|w| w.category == LintCategory::Include));
}

#[test]
fn test_lint_warning_format() {
    let warnings = fixture(
        include_str!("lint-fixtures/true-positives.html"),
        include_str!("lint-fixtures/true-positives.toml"),
    );

    for w in &warnings {
        let cat = w.category.to_string();
        assert!(
            ["missing", "type", "unused", "include"].contains(&cat.as_str()),
            "Unexpected category: {}",
            cat
        );
        assert!(!w.message.is_empty(), "Warning message should not be empty");
    }
}
