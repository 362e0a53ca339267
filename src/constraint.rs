//! Constraints that narrow which requests a stub accepts.
//!
//! A constraint is a side-effect-free predicate over a raw string: the
//! request URL for URL constraints, the buffered body for body constraints.
//! Closures implement [`Constraint`] directly; [`TextConstraint`] covers the
//! declarative forms used by configuration files.

use regex::Regex;
use std::fmt;

/// Predicate over a raw request string.
pub trait Constraint: Send + Sync {
    /// Returns true when the input is accepted.
    fn evaluate(&self, input: &str) -> bool;
}

impl<F> Constraint for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn evaluate(&self, input: &str) -> bool {
        self(input)
    }
}

/// Declarative string constraint.
#[derive(Clone)]
pub enum TextConstraint {
    /// Input equals the value
    Exact(String),
    /// Input contains the value
    Contains(String),
    /// Input does not contain the value
    NotContains(String),
    /// Input starts with the value
    StartsWith(String),
    /// Input matches the pattern somewhere
    Regex(Regex),
}

impl TextConstraint {
    /// Compile a regex constraint.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(TextConstraint::Regex)
    }
}

impl Constraint for TextConstraint {
    fn evaluate(&self, input: &str) -> bool {
        match self {
            TextConstraint::Exact(value) => input == value,
            TextConstraint::Contains(value) => input.contains(value.as_str()),
            TextConstraint::NotContains(value) => !input.contains(value.as_str()),
            TextConstraint::StartsWith(value) => input.starts_with(value.as_str()),
            TextConstraint::Regex(regex) => regex.is_match(input),
        }
    }
}

impl fmt::Debug for TextConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextConstraint::Exact(v) => write!(f, "exact({v:?})"),
            TextConstraint::Contains(v) => write!(f, "contains({v:?})"),
            TextConstraint::NotContains(v) => write!(f, "not_contains({v:?})"),
            TextConstraint::StartsWith(v) => write!(f, "starts_with({v:?})"),
            TextConstraint::Regex(r) => write!(f, "regex({:?})", r.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_a_constraint() {
        let no_blah = |url: &str| !url.contains("blah");
        assert!(no_blah.evaluate("http://www.xyz.com"));
        assert!(!no_blah.evaluate("http://www.blah.com"));
    }

    #[test]
    fn test_closure_over_captured_data() {
        let expected = String::from("<search>bar</search>");
        let constraint = move |body: &str| body.contains(expected.as_str());
        assert!(constraint.evaluate("<q><search>bar</search></q>"));
        assert!(!constraint.evaluate("<search>foo</search>"));
    }

    #[test]
    fn test_text_constraints() {
        assert!(TextConstraint::Exact("/a".into()).evaluate("/a"));
        assert!(!TextConstraint::Exact("/a".into()).evaluate("/a?x=1"));
        assert!(TextConstraint::Contains("bar".into()).evaluate("foobarbaz"));
        assert!(TextConstraint::NotContains("/blah/blah".into()).evaluate("/firsttest"));
        assert!(!TextConstraint::NotContains("/blah/blah".into()).evaluate("/firsttest/blah/blah"));
        assert!(TextConstraint::StartsWith("/api".into()).evaluate("/api/users"));
    }

    #[test]
    fn test_regex_constraint() {
        let constraint = TextConstraint::regex(r"id=\d+").unwrap();
        assert!(constraint.evaluate("/users?id=42"));
        assert!(!constraint.evaluate("/users?id=abc"));
        assert!(TextConstraint::regex("(unclosed").is_err());
    }
}
