//! Field registry: the static table of known policy fields.
//!
//! Each entry maps a field name to its value grammar (a regex, advisory at
//! authoring time), structural constraints (whether multi-value operators or
//! negation are allowed), and the query-builder strategy that turns a group
//! on that field into a [`Query`]. Fields registered without a builder are
//! "known but not yet compilable" and compilation fails on them with an
//! error distinct from the unknown-field one.
//!
//! The registry is an explicit value: construct it once at composition time
//! and pass it by reference into the compiler. [`FieldRegistry::default_registry`]
//! exposes the built-in table, initialized once via `Lazy`.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::policy::{BooleanOperator, PolicyGroup};
use crate::query::Query;

/// Field name constants for the built-in registry.
pub mod field_names {
    pub const ADD_CAPABILITIES: &str = "Add Capabilities";
    pub const CVE: &str = "CVE";
    pub const CVSS: &str = "CVSS";
    pub const CONTAINER_CPU_LIMIT: &str = "Container CPU Limit";
    pub const CONTAINER_CPU_REQUEST: &str = "Container CPU Request";
    pub const CONTAINER_MEM_LIMIT: &str = "Container Memory Limit";
    pub const CONTAINER_MEM_REQUEST: &str = "Container Memory Request";
    pub const DISALLOWED_ANNOTATION: &str = "Disallowed Annotation";
    pub const DISALLOWED_IMAGE_LABEL: &str = "Disallowed Image Label";
    pub const DOCKERFILE_LINE: &str = "Dockerfile Line";
    pub const DROP_CAPABILITIES: &str = "Drop Capabilities";
    pub const ENVIRONMENT_VARIABLE: &str = "Environment Variable";
    pub const FIXED_BY: &str = "FixedBy";
    pub const IMAGE_AGE: &str = "Image Age";
    pub const IMAGE_COMPONENT: &str = "Image Component";
    pub const IMAGE_REGISTRY: &str = "Image Registry";
    pub const IMAGE_REMOTE: &str = "Image Remote";
    pub const IMAGE_SCAN_AGE: &str = "Image Scan Age";
    pub const IMAGE_TAG: &str = "Image Tag";
    pub const MINIMUM_RBAC_PERMISSIONS: &str = "Minimum RBAC Permissions";
    pub const PORT: &str = "Port";
    pub const PORT_EXPOSURE: &str = "Port Exposure Method";
    pub const PRIVILEGED: &str = "Privileged";
    pub const PROCESS_ANCESTOR: &str = "Process Ancestor";
    pub const PROCESS_ARGUMENTS: &str = "Process Arguments";
    pub const PROCESS_NAME: &str = "Process Name";
    pub const PROCESS_UID: &str = "Process UID";
    pub const PROTOCOL: &str = "Protocol";
    pub const READ_ONLY_ROOT_FS: &str = "Read-Only Root Filesystem";
    pub const REQUIRED_ANNOTATION: &str = "Required Annotation";
    pub const REQUIRED_IMAGE_LABEL: &str = "Required Image Label";
    pub const REQUIRED_LABEL: &str = "Required Label";
    pub const UNEXPECTED_PROCESS: &str = "Unexpected Process Executed";
    pub const UNSCANNED_IMAGE: &str = "Unscanned Image";
    pub const VOLUME_DESTINATION: &str = "Volume Destination";
    pub const VOLUME_NAME: &str = "Volume Name";
    pub const VOLUME_SOURCE: &str = "Volume Source";
    pub const VOLUME_TYPE: &str = "Volume Type";
    pub const WRITABLE_HOST_MOUNT: &str = "Writable Host Mount";
    pub const WRITABLE_VOLUME: &str = "Writable Volume";
}

/// Structural constraints a field can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOption {
    NegationForbidden,
    OperatorsForbidden,
}

/// Transformation applied to each policy value before it enters the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTransform {
    Identity,
    Uppercase,
}

impl ValueTransform {
    fn apply(&self, value: &str) -> String {
        match self {
            ValueTransform::Identity => value.to_string(),
            ValueTransform::Uppercase => value.to_uppercase(),
        }
    }
}

/// Query-builder strategy for a field.
///
/// A closed set: every strategy is a variant here, so a missing case is a
/// compile error rather than a runtime surprise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryBuilder {
    /// Build one field match per value against the given search label,
    /// combined per the group's operator, negation-wrapped if requested.
    FieldLabel {
        label: &'static str,
        transform: ValueTransform,
    },
}

impl QueryBuilder {
    /// Build the query for a group.
    ///
    /// Callers must have checked the group against the field's structural
    /// constraints first; in particular the group has at least one value.
    pub fn build(&self, group: &PolicyGroup) -> Query {
        match self {
            QueryBuilder::FieldLabel { label, transform } => {
                let matches: Vec<Query> = group
                    .values
                    .iter()
                    .map(|v| Query::match_field(*label, transform.apply(&v.value)))
                    .collect();
                let combined = match group.operator {
                    BooleanOperator::And => Query::conjunction(matches),
                    BooleanOperator::Or => Query::disjunction(matches),
                };
                if group.negate {
                    Query::negated(combined)
                } else {
                    combined
                }
            }
        }
    }
}

/// Metadata for one registered field.
#[derive(Debug, Clone)]
pub struct FieldMetadata {
    value_regex: Regex,
    pub operators_forbidden: bool,
    pub negation_forbidden: bool,
    pub query_builder: Option<QueryBuilder>,
}

impl FieldMetadata {
    /// Advisory check of a value against the field's grammar.
    ///
    /// Enforcement is the authoring surface's responsibility; the compiler
    /// does not reject on grammar mismatch.
    pub fn value_matches(&self, value: &str) -> bool {
        self.value_regex.is_match(value)
    }
}

/// Static table of field name to grammar, constraints, and builder strategy.
///
/// Read-only after construction; concurrent lookups need no synchronization.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    fields: HashMap<String, FieldMetadata>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compilable field.
    pub fn register(
        &mut self,
        name: &str,
        value_regex: Regex,
        options: &[FieldOption],
        builder: QueryBuilder,
    ) {
        self.insert(name, value_regex, options, Some(builder));
    }

    /// Register a field that is recognized but not yet compilable.
    pub fn register_known(&mut self, name: &str, value_regex: Regex, options: &[FieldOption]) {
        self.insert(name, value_regex, options, None);
    }

    fn insert(
        &mut self,
        name: &str,
        value_regex: Regex,
        options: &[FieldOption],
        query_builder: Option<QueryBuilder>,
    ) {
        let mut meta = FieldMetadata {
            value_regex,
            operators_forbidden: false,
            negation_forbidden: false,
            query_builder,
        };
        for option in options {
            match option {
                FieldOption::NegationForbidden => meta.negation_forbidden = true,
                FieldOption::OperatorsForbidden => meta.operators_forbidden = true,
            }
        }
        self.fields.insert(name.to_string(), meta);
    }

    pub fn lookup(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.get(name)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The built-in field table, initialized once.
    pub fn default_registry() -> &'static FieldRegistry {
        static REGISTRY: Lazy<FieldRegistry> = Lazy::new(build_default_registry);
        &REGISTRY
    }
}

// Grammar fragments for the built-in table.
const ANY_NONEMPTY: &str = r"^.+$";
const BOOLEAN: &str = r"^(?i)(true|false)$";
const INTEGER: &str = r"^\d+$";
const COMPARATOR_DECIMAL: &str = r"^(<=|>=|<|>|=)?\s*\d+(\.\d+)?$";
const KEY_VALUE: &str = r"^[^=]+(=.*)?$";
const CAPABILITY: &str = r"^[A-Za-z_]+$";

fn grammar(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in field grammar must compile")
}

fn field_label(label: &'static str) -> QueryBuilder {
    QueryBuilder::FieldLabel {
        label,
        transform: ValueTransform::Identity,
    }
}

fn field_label_upper(label: &'static str) -> QueryBuilder {
    QueryBuilder::FieldLabel {
        label,
        transform: ValueTransform::Uppercase,
    }
}

fn build_default_registry() -> FieldRegistry {
    use field_names::*;
    use FieldOption::*;

    let mut reg = FieldRegistry::new();

    reg.register(
        ADD_CAPABILITIES,
        grammar(CAPABILITY),
        &[NegationForbidden],
        field_label_upper(ADD_CAPABILITIES),
    );
    reg.register(CVE, grammar(ANY_NONEMPTY), &[], field_label(CVE));
    reg.register(
        CVSS,
        grammar(COMPARATOR_DECIMAL),
        &[NegationForbidden],
        field_label(CVSS),
    );
    reg.register(
        CONTAINER_CPU_LIMIT,
        grammar(COMPARATOR_DECIMAL),
        &[OperatorsForbidden],
        field_label(CONTAINER_CPU_LIMIT),
    );
    reg.register(
        CONTAINER_CPU_REQUEST,
        grammar(COMPARATOR_DECIMAL),
        &[OperatorsForbidden],
        field_label(CONTAINER_CPU_REQUEST),
    );
    reg.register(
        CONTAINER_MEM_LIMIT,
        grammar(COMPARATOR_DECIMAL),
        &[OperatorsForbidden],
        field_label(CONTAINER_MEM_LIMIT),
    );
    reg.register(
        CONTAINER_MEM_REQUEST,
        grammar(COMPARATOR_DECIMAL),
        &[OperatorsForbidden],
        field_label(CONTAINER_MEM_REQUEST),
    );
    reg.register(
        DROP_CAPABILITIES,
        grammar(CAPABILITY),
        &[NegationForbidden],
        field_label_upper(DROP_CAPABILITIES),
    );
    reg.register(FIXED_BY, grammar(ANY_NONEMPTY), &[], field_label(FIXED_BY));
    reg.register(
        IMAGE_COMPONENT,
        grammar(KEY_VALUE),
        &[],
        field_label(IMAGE_COMPONENT),
    );
    reg.register(
        IMAGE_REGISTRY,
        grammar(ANY_NONEMPTY),
        &[],
        field_label(IMAGE_REGISTRY),
    );
    reg.register(
        IMAGE_REMOTE,
        grammar(ANY_NONEMPTY),
        &[NegationForbidden],
        field_label(IMAGE_REMOTE),
    );
    reg.register(IMAGE_TAG, grammar(ANY_NONEMPTY), &[], field_label(IMAGE_TAG));
    reg.register(PORT, grammar(INTEGER), &[], field_label(PORT));
    reg.register(
        PRIVILEGED,
        grammar(BOOLEAN),
        &[NegationForbidden, OperatorsForbidden],
        field_label(PRIVILEGED),
    );
    reg.register(
        PROCESS_ANCESTOR,
        grammar(ANY_NONEMPTY),
        &[],
        field_label(PROCESS_ANCESTOR),
    );
    reg.register(
        PROCESS_ARGUMENTS,
        grammar(ANY_NONEMPTY),
        &[],
        field_label(PROCESS_ARGUMENTS),
    );
    reg.register(
        PROCESS_NAME,
        grammar(ANY_NONEMPTY),
        &[],
        field_label(PROCESS_NAME),
    );
    reg.register(
        PROCESS_UID,
        grammar(ANY_NONEMPTY),
        &[],
        field_label(PROCESS_UID),
    );
    reg.register(
        PROTOCOL,
        grammar(ANY_NONEMPTY),
        &[],
        field_label_upper(PROTOCOL),
    );
    reg.register(
        READ_ONLY_ROOT_FS,
        grammar(BOOLEAN),
        &[NegationForbidden, OperatorsForbidden],
        field_label(READ_ONLY_ROOT_FS),
    );
    reg.register(
        VOLUME_DESTINATION,
        grammar(ANY_NONEMPTY),
        &[],
        field_label(VOLUME_DESTINATION),
    );
    reg.register(
        VOLUME_NAME,
        grammar(ANY_NONEMPTY),
        &[],
        field_label(VOLUME_NAME),
    );
    reg.register(
        VOLUME_SOURCE,
        grammar(ANY_NONEMPTY),
        &[],
        field_label(VOLUME_SOURCE),
    );
    reg.register(
        VOLUME_TYPE,
        grammar(ANY_NONEMPTY),
        &[],
        field_label(VOLUME_TYPE),
    );

    // Known fields without a builder yet: recognized by validation surfaces,
    // rejected by compilation with a not-compilable error.
    reg.register_known(DISALLOWED_ANNOTATION, grammar(KEY_VALUE), &[]);
    reg.register_known(DISALLOWED_IMAGE_LABEL, grammar(KEY_VALUE), &[]);
    reg.register_known(DOCKERFILE_LINE, grammar(ANY_NONEMPTY), &[]);
    reg.register_known(ENVIRONMENT_VARIABLE, grammar(KEY_VALUE), &[]);
    reg.register_known(IMAGE_AGE, grammar(INTEGER), &[OperatorsForbidden]);
    reg.register_known(IMAGE_SCAN_AGE, grammar(INTEGER), &[OperatorsForbidden]);
    reg.register_known(MINIMUM_RBAC_PERMISSIONS, grammar(ANY_NONEMPTY), &[]);
    reg.register_known(PORT_EXPOSURE, grammar(ANY_NONEMPTY), &[]);
    reg.register_known(REQUIRED_ANNOTATION, grammar(KEY_VALUE), &[]);
    reg.register_known(REQUIRED_IMAGE_LABEL, grammar(KEY_VALUE), &[]);
    reg.register_known(REQUIRED_LABEL, grammar(KEY_VALUE), &[]);
    reg.register_known(
        UNEXPECTED_PROCESS,
        grammar(BOOLEAN),
        &[NegationForbidden, OperatorsForbidden],
    );
    reg.register_known(
        UNSCANNED_IMAGE,
        grammar(BOOLEAN),
        &[NegationForbidden, OperatorsForbidden],
    );
    reg.register_known(WRITABLE_HOST_MOUNT, grammar(BOOLEAN), &[OperatorsForbidden]);
    reg.register_known(WRITABLE_VOLUME, grammar(BOOLEAN), &[OperatorsForbidden]);

    reg
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_registry_knows_privileged() {
        let reg = FieldRegistry::default_registry();
        let meta = reg.lookup(field_names::PRIVILEGED).unwrap();
        assert!(meta.negation_forbidden);
        assert!(meta.operators_forbidden);
        assert!(meta.query_builder.is_some());
    }

    #[test]
    fn test_known_but_not_compilable_field() {
        let reg = FieldRegistry::default_registry();
        let meta = reg.lookup(field_names::IMAGE_AGE).unwrap();
        assert!(meta.query_builder.is_none());
    }

    #[test]
    fn test_unknown_field_lookup() {
        let reg = FieldRegistry::default_registry();
        assert!(reg.lookup("No Such Field").is_none());
    }

    #[test]
    fn test_value_grammar_is_advisory_but_checkable() {
        let reg = FieldRegistry::default_registry();
        let privileged = reg.lookup(field_names::PRIVILEGED).unwrap();
        assert!(privileged.value_matches("true"));
        assert!(privileged.value_matches("FALSE"));
        assert!(!privileged.value_matches("yes"));

        let cvss = reg.lookup(field_names::CVSS).unwrap();
        assert!(cvss.value_matches(">= 7.000000"));
        assert!(cvss.value_matches("7"));
        assert!(!cvss.value_matches("high"));
    }

    #[test]
    fn test_uppercase_transform_applies_to_capabilities() {
        let reg = FieldRegistry::default_registry();
        let meta = reg.lookup(field_names::ADD_CAPABILITIES).unwrap();
        let group = PolicyGroup::new(field_names::ADD_CAPABILITIES, ["cap_sys_admin"]);
        let q = meta.query_builder.as_ref().unwrap().build(&group);
        assert_eq!(
            q,
            Query::match_field(field_names::ADD_CAPABILITIES, "CAP_SYS_ADMIN")
        );
    }

    #[test]
    fn test_custom_registry_is_independent() {
        let mut reg = FieldRegistry::new();
        reg.register(
            "Test Field",
            grammar(ANY_NONEMPTY),
            &[],
            field_label("Test Field"),
        );
        assert_eq!(reg.len(), 1);
        assert!(reg.is_registered("Test Field"));
        assert!(!reg.is_registered(field_names::CVE));
    }
}
