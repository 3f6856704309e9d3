//! Policy validation: well-formedness checks before compilation.
//!
//! Validation aggregates every problem into one error so a policy author
//! sees all of them in a single pass, rather than fixing one and
//! resubmitting to discover the next.

use std::fmt;

use thiserror::Error;

use crate::policy::{Policy, CURRENT_VERSION};

/// A single validation problem.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid version for boolean policy (got {0:?})")]
    InvalidVersion(String),

    #[error("no name specified")]
    MissingName,

    #[error("policy has no sections")]
    NoSections,
}

/// All validation problems for one policy, reported together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "policy validation: ")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Check that a policy is a well-formed Boolean policy.
///
/// A legacy-version policy fails here; run it through
/// [`ensure_converted`](crate::convert::ensure_converted) first. A policy
/// with no sections also fails: it expresses no criteria, and letting it
/// through would compile to a query that matches everything.
pub fn validate(policy: &Policy) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    if policy.version != CURRENT_VERSION {
        errors.push(ValidationError::InvalidVersion(policy.version.clone()));
    }
    if policy.name.is_empty() {
        errors.push(ValidationError::MissingName);
    }
    if policy.sections.is_empty() {
        errors.push(ValidationError::NoSections);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}
