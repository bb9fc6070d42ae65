//! Pass/fail decision for one test case.
//!
//! Outputs are decoded and canonicalised first ([`crate::core::normalize`]).
//! Equal canonical forms match by [`MatchRule::Exact`]. Otherwise only the
//! rules in [`RELAXATIONS`] are tried. They exist because historical fixtures
//! disagree with correct programs in these two ways, and the list is closed:
//!
//! - [`MatchRule::WhitespaceInsensitive`]: equal once every whitespace
//!   character is removed.
//! - [`MatchRule::IndexedAssignmentValues`]: both sides print
//!   `name[i][j]=value` style tokens and the sets of values are equal,
//!   whatever the indices (fixtures mix 0- and 1-based indexing).

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::domain::MatchRule;
use crate::core::normalize::{canonicalize, decode};

pub const RELAXATIONS: [MatchRule; 2] = [
    MatchRule::WhitespaceInsensitive,
    MatchRule::IndexedAssignmentValues,
];

static INDEXED_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\s*\[\s*\d+\s*\])+\s*=\s*(-?\d+(?:\.\d+)?)")
        .expect("indexed assignment pattern is valid")
});

pub fn matches(expected: &[u8], actual: &[u8]) -> bool {
    compare(expected, actual).is_some()
}

/// The rule that accepted `actual`, or `None` on mismatch.
pub fn compare(expected: &[u8], actual: &[u8]) -> Option<MatchRule> {
    if expected == actual {
        return Some(MatchRule::Exact);
    }
    compare_text(&decode(expected), &decode(actual))
}

pub fn compare_text(expected: &str, actual: &str) -> Option<MatchRule> {
    let expected = canonicalize(expected);
    let actual = canonicalize(actual);
    if expected == actual {
        return Some(MatchRule::Exact);
    }

    RELAXATIONS
        .into_iter()
        .find(|rule| relaxed_equal(*rule, &expected, &actual))
}

fn relaxed_equal(rule: MatchRule, expected: &str, actual: &str) -> bool {
    match rule {
        MatchRule::Exact => expected == actual,
        MatchRule::WhitespaceInsensitive => strip_whitespace(expected) == strip_whitespace(actual),
        MatchRule::IndexedAssignmentValues => {
            let expected = assigned_values(expected);
            let actual = assigned_values(actual);
            !expected.is_empty() && expected == actual
        }
    }
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn assigned_values(text: &str) -> BTreeSet<&str> {
    INDEXED_ASSIGNMENT
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|value| value.as_str()))
        .collect()
}
