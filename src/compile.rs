//! Query compiler: Policy -> one boolean query per section.
//!
//! Walks Policy -> Section -> Group -> Value, validating each group against
//! the field registry's structural constraints and delegating to the field's
//! query-builder strategy. Compilation aborts on the first error within a
//! section; every error identifies the offending section and field.
//!
//! The compiler returns one query per section. How section queries combine
//! at the policy level is the caller's decision.

use thiserror::Error;
use tracing::debug;

use crate::policy::{Policy, PolicyGroup};
use crate::query::Query;
use crate::registry::FieldRegistry;

/// Structural compilation failure, identifying the section and field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("section {section:?}: unknown field {field:?}")]
    UnknownField { section: String, field: String },

    #[error("section {section:?}: field {field:?} is recognized but has no query builder")]
    FieldNotCompilable { section: String, field: String },

    #[error("section {section:?}: no values for field {field:?}")]
    NoValues { section: String, field: String },

    #[error("section {section:?}: negation not allowed for field {field:?}")]
    NegationForbidden { section: String, field: String },

    #[error("section {section:?}: operators not allowed for field {field:?}")]
    OperatorsForbidden { section: String, field: String },

    #[error("section {section:?} has no groups")]
    EmptySection { section: String },
}

/// The compiled query for one policy section.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionQuery {
    pub section_name: String,
    pub query: Query,
}

/// Compile every section of the policy into a boolean query.
pub fn compile_policy(
    policy: &Policy,
    registry: &FieldRegistry,
) -> Result<Vec<SectionQuery>, CompileError> {
    let mut compiled = Vec::with_capacity(policy.sections.len());
    for section in &policy.sections {
        if section.groups.is_empty() {
            return Err(CompileError::EmptySection {
                section: section.section_name.clone(),
            });
        }
        let group_queries = section
            .groups
            .iter()
            .map(|group| compile_group(&section.section_name, group, registry))
            .collect::<Result<Vec<_>, _>>()?;
        compiled.push(SectionQuery {
            section_name: section.section_name.clone(),
            query: Query::conjunction(group_queries),
        });
    }
    debug!(
        policy = %policy.name,
        sections = compiled.len(),
        "compiled policy sections"
    );
    Ok(compiled)
}

fn compile_group(
    section_name: &str,
    group: &PolicyGroup,
    registry: &FieldRegistry,
) -> Result<Query, CompileError> {
    let section = section_name.to_string();
    let field = group.field_name.clone();

    if group.values.is_empty() {
        return Err(CompileError::NoValues { section, field });
    }

    let metadata = registry
        .lookup(&group.field_name)
        .ok_or_else(|| CompileError::UnknownField {
            section: section.clone(),
            field: field.clone(),
        })?;
    let builder =
        metadata
            .query_builder
            .as_ref()
            .ok_or_else(|| CompileError::FieldNotCompilable {
                section: section.clone(),
                field: field.clone(),
            })?;

    if metadata.negation_forbidden && group.negate {
        return Err(CompileError::NegationForbidden { section, field });
    }
    if metadata.operators_forbidden && group.values.len() != 1 {
        return Err(CompileError::OperatorsForbidden { section, field });
    }

    Ok(builder.build(group))
}
