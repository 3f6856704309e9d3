//! Top-level error types for matcher construction.

use thiserror::Error;

use crate::compile::CompileError;
use crate::predicate::PredicateError;
use crate::validate::ValidationErrors;

/// Any failure while turning a policy into a matcher. A failed build
/// produces no matcher; a policy is never partially active.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Predicate(#[from] PredicateError),
}
