//! Predicate compilation: query tree -> per-object-kind match function.
//!
//! Instead of runtime reflection over struct fields, each object kind has an
//! explicit, hand-written accessor table mapping a field label to a typed
//! extraction function and a value kind. Compiling a query against a table
//! yields an immutable [`Predicate`] that evaluates one object to a
//! [`MatchResult`] or no-match.
//!
//! A field label absent from a table is irrelevant to that object kind and
//! compiles to always-true: a deployment-only field never constrains an
//! image predicate.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::objects::{Deployment, Image, ProcessEvent};
use crate::query::Query;
use crate::registry::field_names;

/// The kinds of object a predicate can be compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Deployment,
    Image,
    ProcessEvent,
}

/// Structured outcome of a successful match: field label -> matched values,
/// in stable (sorted-by-field) order for deterministic rendering.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchResult {
    pub field_values: BTreeMap<String, Vec<String>>,
}

impl MatchResult {
    pub fn is_empty(&self) -> bool {
        self.field_values.is_empty()
    }

    pub fn add(&mut self, field: &str, value: impl Into<String>) {
        self.field_values
            .entry(field.to_string())
            .or_default()
            .push(value.into());
    }

    /// Concatenate several results, preserving the order values arrived in.
    pub fn merge(results: impl IntoIterator<Item = MatchResult>) -> MatchResult {
        let mut merged = MatchResult::default();
        for result in results {
            for (field, mut values) in result.field_values {
                merged.field_values.entry(field).or_default().append(&mut values);
            }
        }
        merged
    }
}

/// Failure while compiling a query into a predicate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PredicateError {
    #[error("invalid value {value:?} for field {field:?}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Value kind of a field, selecting the base matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
    Number,
    Bool,
}

/// One row of an accessor table.
pub struct FieldSpec<T: 'static> {
    pub label: &'static str,
    pub kind: FieldKind,
    pub extract: fn(&T) -> Vec<String>,
}

/// Accessor table for one object kind.
pub type AccessorTable<T> = &'static [FieldSpec<T>];

// =============================================================================
// BASE VALUE MATCHERS
// =============================================================================

#[derive(Debug, Clone)]
enum ValueMatcher {
    Bool(bool),
    Number { cmp: NumericCmp, rhs: f64 },
    Regex(Regex),
    EqualsIgnoreCase(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumericCmp {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

// Longest prefixes first, so "<=" is not consumed as "<".
const NUMERIC_PREFIXES: &[(&str, NumericCmp)] = &[
    ("<=", NumericCmp::Le),
    (">=", NumericCmp::Ge),
    ("<", NumericCmp::Lt),
    (">", NumericCmp::Gt),
    ("=", NumericCmp::Eq),
];

fn parse_numeric_value(value: &str) -> Option<(NumericCmp, f64)> {
    let trimmed = value.trim();
    let (cmp, rest) = NUMERIC_PREFIXES
        .iter()
        .find_map(|(prefix, cmp)| trimmed.strip_prefix(prefix).map(|rest| (*cmp, rest)))
        .unwrap_or((NumericCmp::Eq, trimmed));
    rest.trim().parse::<f64>().ok().map(|rhs| (cmp, rhs))
}

impl ValueMatcher {
    fn compile(field: &str, kind: FieldKind, value: &str) -> Result<Self, PredicateError> {
        match kind {
            FieldKind::Bool => match value.to_ascii_lowercase().as_str() {
                "true" => Ok(ValueMatcher::Bool(true)),
                "false" => Ok(ValueMatcher::Bool(false)),
                _ => Err(PredicateError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                    reason: "expected a boolean".to_string(),
                }),
            },
            FieldKind::Number => {
                let (cmp, rhs) = parse_numeric_value(value).ok_or_else(|| {
                    PredicateError::InvalidValue {
                        field: field.to_string(),
                        value: value.to_string(),
                        reason: "expected an optionally-compared number".to_string(),
                    }
                })?;
                Ok(ValueMatcher::Number { cmp, rhs })
            }
            FieldKind::Str => {
                // Policy string values are regex fragments; a value that does
                // not compile falls back to case-insensitive equality.
                match Regex::new(&format!("^(?i)(?:{value})$")) {
                    Ok(re) => Ok(ValueMatcher::Regex(re)),
                    Err(_) => Ok(ValueMatcher::EqualsIgnoreCase(value.to_string())),
                }
            }
        }
    }

    fn matches(&self, actual: &str) -> bool {
        match self {
            ValueMatcher::Bool(expected) => actual
                .parse::<bool>()
                .map(|b| b == *expected)
                .unwrap_or(false),
            ValueMatcher::Number { cmp, rhs } => match actual.trim().parse::<f64>() {
                Ok(lhs) => match cmp {
                    NumericCmp::Eq => lhs == *rhs,
                    NumericCmp::Gt => lhs > *rhs,
                    NumericCmp::Ge => lhs >= *rhs,
                    NumericCmp::Lt => lhs < *rhs,
                    NumericCmp::Le => lhs <= *rhs,
                },
                Err(_) => false,
            },
            ValueMatcher::Regex(re) => re.is_match(actual),
            ValueMatcher::EqualsIgnoreCase(expected) => actual.eq_ignore_ascii_case(expected),
        }
    }
}

// =============================================================================
// PREDICATE
// =============================================================================

#[derive(Debug)]
enum Node<T: 'static> {
    AlwaysTrue,
    Match {
        label: &'static str,
        extract: fn(&T) -> Vec<String>,
        matcher: ValueMatcher,
    },
    And(Vec<Node<T>>),
    Or(Vec<Node<T>>),
    Boolean {
        must: Vec<Node<T>>,
        must_not: Vec<Node<T>>,
    },
}

/// A compiled function from a typed domain object to a match result or none.
///
/// Immutable and safe to share across threads.
#[derive(Debug)]
pub struct Predicate<T: 'static> {
    node: Node<T>,
}

impl<T> Predicate<T> {
    pub fn eval(&self, obj: &T) -> Option<MatchResult> {
        eval_node(&self.node, obj)
    }
}

fn eval_node<T>(node: &Node<T>, obj: &T) -> Option<MatchResult> {
    match node {
        Node::AlwaysTrue => Some(MatchResult::default()),
        Node::Match {
            label,
            extract,
            matcher,
        } => {
            let mut result = MatchResult::default();
            for value in extract(obj) {
                if matcher.matches(&value) {
                    result.add(label, value);
                }
            }
            if result.is_empty() {
                None
            } else {
                Some(result)
            }
        }
        Node::And(children) => {
            let mut results = Vec::with_capacity(children.len());
            for child in children {
                results.push(eval_node(child, obj)?);
            }
            Some(MatchResult::merge(results))
        }
        Node::Or(children) => {
            let results: Vec<MatchResult> = children
                .iter()
                .filter_map(|child| eval_node(child, obj))
                .collect();
            if results.is_empty() {
                None
            } else {
                Some(MatchResult::merge(results))
            }
        }
        Node::Boolean { must, must_not } => {
            let mut results = Vec::with_capacity(must.len());
            for child in must {
                results.push(eval_node(child, obj)?);
            }
            if must_not.iter().any(|child| eval_node(child, obj).is_some()) {
                return None;
            }
            Some(MatchResult::merge(results))
        }
    }
}

/// Compile a query against an accessor table.
pub fn build_predicate<T>(
    query: &Query,
    table: AccessorTable<T>,
) -> Result<Predicate<T>, PredicateError> {
    Ok(Predicate {
        node: build_node(query, table)?,
    })
}

fn build_node<T>(query: &Query, table: AccessorTable<T>) -> Result<Node<T>, PredicateError> {
    match query {
        Query::MatchAll | Query::DocIds(_) => Ok(Node::AlwaysTrue),
        Query::MatchField { field, value } => {
            let Some(spec) = table.iter().find(|spec| spec.label == field) else {
                // Irrelevant to this object kind.
                return Ok(Node::AlwaysTrue);
            };
            let matcher = ValueMatcher::compile(field, spec.kind, value)?;
            Ok(Node::Match {
                label: spec.label,
                extract: spec.extract,
                matcher,
            })
        }
        Query::Conjunction(children) => Ok(Node::And(build_nodes(children, table)?)),
        Query::Disjunction(children) => Ok(Node::Or(build_nodes(children, table)?)),
        Query::Boolean { must, must_not } => Ok(Node::Boolean {
            must: build_nodes(must, table)?,
            must_not: build_nodes(must_not, table)?,
        }),
    }
}

fn build_nodes<T>(
    queries: &[Query],
    table: AccessorTable<T>,
) -> Result<Vec<Node<T>>, PredicateError> {
    queries.iter().map(|q| build_node(q, table)).collect()
}

// =============================================================================
// ACCESSOR TABLES
// =============================================================================

fn deployment_privileged(d: &Deployment) -> Vec<String> {
    d.containers.iter().map(|c| c.privileged.to_string()).collect()
}

fn deployment_read_only_root_fs(d: &Deployment) -> Vec<String> {
    d.containers
        .iter()
        .map(|c| c.read_only_root_fs.to_string())
        .collect()
}

fn deployment_add_capabilities(d: &Deployment) -> Vec<String> {
    d.containers
        .iter()
        .flat_map(|c| c.add_capabilities.iter().cloned())
        .collect()
}

fn deployment_drop_capabilities(d: &Deployment) -> Vec<String> {
    d.containers
        .iter()
        .flat_map(|c| c.drop_capabilities.iter().cloned())
        .collect()
}

fn deployment_ports(d: &Deployment) -> Vec<String> {
    d.containers
        .iter()
        .flat_map(|c| c.ports.iter().map(|p| p.port.to_string()))
        .collect()
}

fn deployment_protocols(d: &Deployment) -> Vec<String> {
    d.containers
        .iter()
        .flat_map(|c| c.ports.iter().map(|p| p.protocol.clone()))
        .collect()
}

fn deployment_volume_names(d: &Deployment) -> Vec<String> {
    d.containers
        .iter()
        .flat_map(|c| c.volumes.iter().map(|v| v.name.clone()))
        .collect()
}

fn deployment_volume_sources(d: &Deployment) -> Vec<String> {
    d.containers
        .iter()
        .flat_map(|c| c.volumes.iter().map(|v| v.source.clone()))
        .collect()
}

fn deployment_volume_destinations(d: &Deployment) -> Vec<String> {
    d.containers
        .iter()
        .flat_map(|c| c.volumes.iter().map(|v| v.destination.clone()))
        .collect()
}

fn deployment_volume_types(d: &Deployment) -> Vec<String> {
    d.containers
        .iter()
        .flat_map(|c| c.volumes.iter().map(|v| v.volume_type.clone()))
        .collect()
}

fn deployment_cpu_request(d: &Deployment) -> Vec<String> {
    d.containers
        .iter()
        .map(|c| c.resources.cpu_cores_request.to_string())
        .collect()
}

fn deployment_cpu_limit(d: &Deployment) -> Vec<String> {
    d.containers
        .iter()
        .map(|c| c.resources.cpu_cores_limit.to_string())
        .collect()
}

fn deployment_mem_request(d: &Deployment) -> Vec<String> {
    d.containers
        .iter()
        .map(|c| c.resources.memory_mb_request.to_string())
        .collect()
}

fn deployment_mem_limit(d: &Deployment) -> Vec<String> {
    d.containers
        .iter()
        .map(|c| c.resources.memory_mb_limit.to_string())
        .collect()
}

/// Accessor table for deployments.
pub static DEPLOYMENT_FIELDS: &[FieldSpec<Deployment>] = &[
    FieldSpec {
        label: field_names::PRIVILEGED,
        kind: FieldKind::Bool,
        extract: deployment_privileged,
    },
    FieldSpec {
        label: field_names::READ_ONLY_ROOT_FS,
        kind: FieldKind::Bool,
        extract: deployment_read_only_root_fs,
    },
    FieldSpec {
        label: field_names::ADD_CAPABILITIES,
        kind: FieldKind::Str,
        extract: deployment_add_capabilities,
    },
    FieldSpec {
        label: field_names::DROP_CAPABILITIES,
        kind: FieldKind::Str,
        extract: deployment_drop_capabilities,
    },
    FieldSpec {
        label: field_names::PORT,
        kind: FieldKind::Number,
        extract: deployment_ports,
    },
    FieldSpec {
        label: field_names::PROTOCOL,
        kind: FieldKind::Str,
        extract: deployment_protocols,
    },
    FieldSpec {
        label: field_names::VOLUME_NAME,
        kind: FieldKind::Str,
        extract: deployment_volume_names,
    },
    FieldSpec {
        label: field_names::VOLUME_SOURCE,
        kind: FieldKind::Str,
        extract: deployment_volume_sources,
    },
    FieldSpec {
        label: field_names::VOLUME_DESTINATION,
        kind: FieldKind::Str,
        extract: deployment_volume_destinations,
    },
    FieldSpec {
        label: field_names::VOLUME_TYPE,
        kind: FieldKind::Str,
        extract: deployment_volume_types,
    },
    FieldSpec {
        label: field_names::CONTAINER_CPU_REQUEST,
        kind: FieldKind::Number,
        extract: deployment_cpu_request,
    },
    FieldSpec {
        label: field_names::CONTAINER_CPU_LIMIT,
        kind: FieldKind::Number,
        extract: deployment_cpu_limit,
    },
    FieldSpec {
        label: field_names::CONTAINER_MEM_REQUEST,
        kind: FieldKind::Number,
        extract: deployment_mem_request,
    },
    FieldSpec {
        label: field_names::CONTAINER_MEM_LIMIT,
        kind: FieldKind::Number,
        extract: deployment_mem_limit,
    },
];

fn image_registry(i: &Image) -> Vec<String> {
    vec![i.registry.clone()]
}

fn image_remote(i: &Image) -> Vec<String> {
    vec![i.remote.clone()]
}

fn image_tag(i: &Image) -> Vec<String> {
    vec![i.tag.clone()]
}

fn image_components(i: &Image) -> Vec<String> {
    i.components
        .iter()
        .map(|c| format!("{}={}", c.name, c.version))
        .collect()
}

fn image_cves(i: &Image) -> Vec<String> {
    i.components
        .iter()
        .flat_map(|c| c.vulns.iter().map(|v| v.cve.clone()))
        .collect()
}

fn image_cvss(i: &Image) -> Vec<String> {
    i.components
        .iter()
        .flat_map(|c| c.vulns.iter().map(|v| v.cvss.to_string()))
        .collect()
}

fn image_fixed_by(i: &Image) -> Vec<String> {
    i.components
        .iter()
        .flat_map(|c| c.vulns.iter())
        .filter(|v| !v.fixed_by.is_empty())
        .map(|v| v.fixed_by.clone())
        .collect()
}

/// Accessor table for images.
pub static IMAGE_FIELDS: &[FieldSpec<Image>] = &[
    FieldSpec {
        label: field_names::IMAGE_REGISTRY,
        kind: FieldKind::Str,
        extract: image_registry,
    },
    FieldSpec {
        label: field_names::IMAGE_REMOTE,
        kind: FieldKind::Str,
        extract: image_remote,
    },
    FieldSpec {
        label: field_names::IMAGE_TAG,
        kind: FieldKind::Str,
        extract: image_tag,
    },
    FieldSpec {
        label: field_names::IMAGE_COMPONENT,
        kind: FieldKind::Str,
        extract: image_components,
    },
    FieldSpec {
        label: field_names::CVE,
        kind: FieldKind::Str,
        extract: image_cves,
    },
    FieldSpec {
        label: field_names::CVSS,
        kind: FieldKind::Number,
        extract: image_cvss,
    },
    FieldSpec {
        label: field_names::FIXED_BY,
        kind: FieldKind::Str,
        extract: image_fixed_by,
    },
];

fn process_name(p: &ProcessEvent) -> Vec<String> {
    vec![p.name.clone()]
}

fn process_args(p: &ProcessEvent) -> Vec<String> {
    vec![p.args.clone()]
}

fn process_uid(p: &ProcessEvent) -> Vec<String> {
    vec![p.uid.clone()]
}

fn process_ancestors(p: &ProcessEvent) -> Vec<String> {
    p.ancestors.clone()
}

/// Accessor table for process-execution events.
pub static PROCESS_FIELDS: &[FieldSpec<ProcessEvent>] = &[
    FieldSpec {
        label: field_names::PROCESS_NAME,
        kind: FieldKind::Str,
        extract: process_name,
    },
    FieldSpec {
        label: field_names::PROCESS_ARGUMENTS,
        kind: FieldKind::Str,
        extract: process_args,
    },
    FieldSpec {
        label: field_names::PROCESS_UID,
        kind: FieldKind::Str,
        extract: process_uid,
    },
    FieldSpec {
        label: field_names::PROCESS_ANCESTOR,
        kind: FieldKind::Str,
        extract: process_ancestors,
    },
];

/// The accessor table for an object kind, for callers that dispatch on kind.
pub fn table_for_kind(kind: ObjectKind) -> ObjectTable {
    match kind {
        ObjectKind::Deployment => ObjectTable::Deployment(DEPLOYMENT_FIELDS),
        ObjectKind::Image => ObjectTable::Image(IMAGE_FIELDS),
        ObjectKind::ProcessEvent => ObjectTable::ProcessEvent(PROCESS_FIELDS),
    }
}

/// Accessor table tagged by its object kind.
pub enum ObjectTable {
    Deployment(AccessorTable<Deployment>),
    Image(AccessorTable<Image>),
    ProcessEvent(AccessorTable<ProcessEvent>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Component, Container, Port, Vulnerability};
    use pretty_assertions::assert_eq;

    fn privileged_deployment() -> Deployment {
        Deployment::new("web").with_container(Container::new("app").privileged(true))
    }

    #[test]
    fn test_match_field_on_privileged_container() {
        let q = Query::match_field(field_names::PRIVILEGED, "true");
        let predicate = build_predicate(&q, DEPLOYMENT_FIELDS).unwrap();

        let result = predicate.eval(&privileged_deployment()).unwrap();
        assert_eq!(
            result.field_values[field_names::PRIVILEGED],
            vec!["true".to_string()]
        );

        let unprivileged = Deployment::new("web").with_container(Container::new("app"));
        assert!(predicate.eval(&unprivileged).is_none());
    }

    #[test]
    fn test_disjunction_reports_only_matched_values() {
        let q = Query::Disjunction(vec![
            Query::match_field(field_names::CVE, "CVE-2014-6271"),
            Query::match_field(field_names::CVE, "CVE-2014-7169"),
        ]);
        let predicate = build_predicate(&q, IMAGE_FIELDS).unwrap();

        let image = Image::new("docker.io", "library/nginx", "1.10").with_component(
            Component::new("bash", "4.3").with_vuln(Vulnerability::new("CVE-2014-6271", 9.8)),
        );
        let result = predicate.eval(&image).unwrap();
        assert_eq!(
            result.field_values[field_names::CVE],
            vec!["CVE-2014-6271".to_string()]
        );
    }

    #[test]
    fn test_numeric_comparator_values() {
        let q = Query::match_field(field_names::CVSS, ">= 7.000000");
        let predicate = build_predicate(&q, IMAGE_FIELDS).unwrap();

        let vulnerable = Image::new("docker.io", "library/struts", "1.0").with_component(
            Component::new("struts", "2.3").with_vuln(Vulnerability::new("CVE-2017-5638", 10.0)),
        );
        assert!(predicate.eval(&vulnerable).is_some());

        let mild = Image::new("docker.io", "library/nginx", "1.10").with_component(
            Component::new("pcre", "8.0").with_vuln(Vulnerability::new("CVE-2017-0001", 3.1)),
        );
        assert!(predicate.eval(&mild).is_none());
    }

    #[test]
    fn test_boolean_must_not_blocks_match() {
        let q = Query::negated(Query::match_field(field_names::IMAGE_TAG, "latest"));
        let predicate = build_predicate(&q, IMAGE_FIELDS).unwrap();

        assert!(predicate
            .eval(&Image::new("docker.io", "library/nginx", "latest"))
            .is_none());
        // The must branch (MatchAll) matches with an empty result.
        let result = predicate
            .eval(&Image::new("docker.io", "library/nginx", "1.10"))
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_field_unknown_to_kind_is_always_true() {
        let q = Query::match_field(field_names::PRIVILEGED, "true");
        let predicate = build_predicate(&q, IMAGE_FIELDS).unwrap();
        let result = predicate
            .eval(&Image::new("docker.io", "library/nginx", "1.10"))
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_conjunction_requires_all_fields() {
        let q = Query::Conjunction(vec![
            Query::match_field(field_names::PORT, "22"),
            Query::match_field(field_names::PROTOCOL, "TCP"),
        ]);
        let predicate = build_predicate(&q, DEPLOYMENT_FIELDS).unwrap();

        let ssh = Deployment::new("bastion")
            .with_container(Container::new("sshd").with_port(Port::new(22, "TCP")));
        let result = predicate.eval(&ssh).unwrap();
        assert_eq!(result.field_values.len(), 2);

        let udp = Deployment::new("dns")
            .with_container(Container::new("coredns").with_port(Port::new(53, "UDP")));
        assert!(predicate.eval(&udp).is_none());
    }

    #[test]
    fn test_regex_value_matching() {
        let q = Query::match_field(field_names::PROCESS_NAME, r"/usr/bin/.*");
        let predicate = build_predicate(&q, PROCESS_FIELDS).unwrap();
        assert!(predicate
            .eval(&ProcessEvent::new("/usr/bin/curl", ""))
            .is_some());
        assert!(predicate
            .eval(&ProcessEvent::new("/bin/sh", ""))
            .is_none());
    }

    #[test]
    fn test_invalid_bool_value_is_a_build_error() {
        let q = Query::match_field(field_names::PRIVILEGED, "maybe");
        let err = build_predicate(&q, DEPLOYMENT_FIELDS).unwrap_err();
        assert!(matches!(err, PredicateError::InvalidValue { .. }));
    }

    #[test]
    fn test_merge_preserves_value_order() {
        let mut a = MatchResult::default();
        a.add("CVE", "CVE-1");
        let mut b = MatchResult::default();
        b.add("CVE", "CVE-2");
        b.add("Port", "22");
        let merged = MatchResult::merge([a, b]);
        assert_eq!(
            merged.field_values["CVE"],
            vec!["CVE-1".to_string(), "CVE-2".to_string()]
        );
        assert_eq!(merged.field_values["Port"], vec!["22".to_string()]);
    }

    #[test]
    fn test_numeric_prefix_parsing_longest_first() {
        assert_eq!(parse_numeric_value("<=5"), Some((NumericCmp::Le, 5.0)));
        assert_eq!(parse_numeric_value(">= 7.5"), Some((NumericCmp::Ge, 7.5)));
        assert_eq!(parse_numeric_value("<3"), Some((NumericCmp::Lt, 3.0)));
        assert_eq!(parse_numeric_value("8"), Some((NumericCmp::Eq, 8.0)));
        assert_eq!(parse_numeric_value("high"), None);
    }
}
