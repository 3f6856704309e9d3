//! Compiled boolean query AST.
//!
//! A [`Query`] is what a policy section compiles down to: a match on one
//! field/value, a conjunction, a disjunction, or a must/must-not boolean
//! form. The boolean form is the only representation of negation: a negated
//! group compiles to `must: [MatchAll], must_not: [combined]` so that
//! downstream predicate builders always see a uniform must/mustNot shape
//! instead of a third "negated match" node type.

use serde::{Deserialize, Serialize};

/// Compiled boolean representation of a group/section, ready for predicate
/// compilation or dispatch to a searcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Query {
    /// Matches every object with an empty result.
    MatchAll,
    /// A match of a single field against a single value.
    MatchField { field: String, value: String },
    /// Restricts a searcher-backed query to the given document ids.
    /// Object predicates treat this as always-true.
    DocIds(Vec<String>),
    Conjunction(Vec<Query>),
    Disjunction(Vec<Query>),
    /// Matches when all of `must` match and none of `must_not` match.
    Boolean {
        must: Vec<Query>,
        must_not: Vec<Query>,
    },
}

impl Query {
    pub fn match_field(field: impl Into<String>, value: impl Into<String>) -> Self {
        Query::MatchField {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Conjoin queries, collapsing a single-element list to the bare child.
    pub fn conjunction(mut queries: Vec<Query>) -> Self {
        match queries.len() {
            0 => Query::MatchAll,
            1 => queries.remove(0),
            _ => Query::Conjunction(queries),
        }
    }

    /// Disjoin queries, collapsing a single-element list to the bare child.
    pub fn disjunction(mut queries: Vec<Query>) -> Self {
        match queries.len() {
            0 => Query::MatchAll,
            1 => queries.remove(0),
            _ => Query::Disjunction(queries),
        }
    }

    /// Negate a query as `must: [MatchAll], must_not: [query]`.
    pub fn negated(query: Query) -> Self {
        Query::Boolean {
            must: vec![Query::MatchAll],
            must_not: vec![query],
        }
    }

    pub fn doc_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query::DocIds(ids.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_conjunction_collapses_single_child() {
        let q = Query::conjunction(vec![Query::match_field("CVE", "CVE-2014-6271")]);
        assert_eq!(q, Query::match_field("CVE", "CVE-2014-6271"));
    }

    #[test]
    fn test_disjunction_collapses_single_child() {
        let q = Query::disjunction(vec![Query::match_field("Port", "22")]);
        assert_eq!(q, Query::match_field("Port", "22"));
    }

    #[test]
    fn test_empty_combination_is_match_all() {
        assert_eq!(Query::conjunction(vec![]), Query::MatchAll);
        assert_eq!(Query::disjunction(vec![]), Query::MatchAll);
    }

    #[test]
    fn test_negated_shape() {
        let inner = Query::match_field("Image Tag", "latest");
        let q = Query::negated(inner.clone());
        assert_eq!(
            q,
            Query::Boolean {
                must: vec![Query::MatchAll],
                must_not: vec![inner],
            }
        );
    }

    #[test]
    fn test_multi_child_combination_keeps_all() {
        let q = Query::disjunction(vec![
            Query::match_field("CVE", "CVE-2014-6271"),
            Query::match_field("CVE", "CVE-2014-7169"),
        ]);
        match q {
            Query::Disjunction(children) => assert_eq!(children.len(), 2),
            other => panic!("expected disjunction, got {other:?}"),
        }
    }
}
