//! Policy schema: the in-memory shape of a Boolean security policy.
//!
//! A policy is a named, versioned list of sections; each section is a list
//! of groups; each group is one field's match criteria (values, combination
//! operator, negation flag). The schema normally crosses a serialization
//! boundary, so everything here derives serde.
//!
//! A policy carrying [`LEGACY_VERSION`] still holds the old flat
//! [`PolicyFields`](crate::convert::PolicyFields) payload and must pass
//! through the converter before compilation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::convert::PolicyFields;

/// Version marker for policies in the current Group/Section format.
pub const CURRENT_VERSION: &str = "1.1";

/// Version marker carried by legacy flat-fields policies.
pub const LEGACY_VERSION: &str = "";

/// A named, versioned set of sections describing a security rule.
///
/// Immutable once compiled into a [`Matcher`](crate::matcher::Matcher).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub lifecycle_stages: Vec<LifecycleStage>,
    #[serde(default)]
    pub sections: Vec<PolicySection>,
    /// Legacy flat-fields payload; present only on [`LEGACY_VERSION`] policies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<PolicyFields>,
}

impl Policy {
    /// Create a current-version policy with a generated id and no sections.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            version: CURRENT_VERSION.to_string(),
            ..Default::default()
        }
    }

    /// Create a legacy policy wrapping a flat fields payload.
    pub fn legacy(name: impl Into<String>, fields: PolicyFields) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            version: LEGACY_VERSION.to_string(),
            fields: Some(fields),
            ..Default::default()
        }
    }

    pub fn with_section(mut self, section: PolicySection) -> Self {
        self.sections.push(section);
        self
    }

    pub fn with_lifecycle_stage(mut self, stage: LifecycleStage) -> Self {
        self.lifecycle_stages.push(stage);
        self
    }

    pub fn is_legacy(&self) -> bool {
        self.version == LEGACY_VERSION
    }
}

/// An AND-combined set of groups within a policy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PolicySection {
    #[serde(default)]
    pub section_name: String,
    pub groups: Vec<PolicyGroup>,
}

impl PolicySection {
    pub fn new(section_name: impl Into<String>, groups: Vec<PolicyGroup>) -> Self {
        Self {
            section_name: section_name.into(),
            groups,
        }
    }
}

/// One field's match criteria: values, combination operator, negation flag.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PolicyGroup {
    pub field_name: String,
    pub values: Vec<PolicyValue>,
    #[serde(default)]
    pub operator: BooleanOperator,
    #[serde(default)]
    pub negate: bool,
}

impl PolicyGroup {
    pub fn new<I, S>(field_name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field_name: field_name.into(),
            values: values.into_iter().map(PolicyValue::new).collect(),
            operator: BooleanOperator::default(),
            negate: false,
        }
    }

    pub fn with_operator(mut self, operator: BooleanOperator) -> Self {
        self.operator = operator;
        self
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }
}

/// An opaque value string whose grammar is field-specific.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyValue {
    pub value: String,
}

impl PolicyValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// How a group's values combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BooleanOperator {
    #[default]
    Or,
    And,
}

/// Which part of the object lifecycle a policy applies to.
///
/// Stage gating across policies is the caller's responsibility; the matcher
/// only records the primary stage for violation rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleStage {
    Build,
    Deploy,
    Runtime,
}
