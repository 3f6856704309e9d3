//! policy-engine: Boolean policy compiler and runtime matcher.
//!
//! Turns a declarative security policy (named fields with values, operators,
//! and negation) into an executable matching predicate, and applies that
//! predicate to live objects (deployments, images, process-execution
//! events) to produce structured violations.
//!
//! Pipeline:
//!
//! ```text
//! Policy -> Validator -> (Converter if legacy) -> Compiler
//!        -> [Query per section] -> Predicate Builder
//!        -> [Predicate per object kind] -> Matcher -> Violations
//! ```
//!
//! The crate owns the field registry, legacy conversion, query compilation,
//! predicate building, and violation aggregation. Search backends and
//! violation message templates are collaborators behind the [`Searcher`]
//! and [`ViolationRenderer`] traits.
//!
//! A built [`Matcher`] is immutable and safe to share across threads; build
//! it once per policy and reuse it for every evaluation until the policy
//! changes.

pub mod compile;
pub mod convert;
pub mod error;
pub mod matcher;
pub mod objects;
pub mod policy;
pub mod predicate;
pub mod query;
pub mod registry;
pub mod searcher;
pub mod validate;
pub mod violations;

// Re-export commonly used types
pub use compile::{compile_policy, CompileError, SectionQuery};
pub use convert::{convert_fields, ensure_converted, Comparator, NumericalPolicy, PolicyFields};
pub use error::PolicyError;
pub use matcher::{MatchError, Matcher};
pub use objects::{Component, Container, Deployment, Image, ProcessEvent, Vulnerability};
pub use policy::{
    BooleanOperator, LifecycleStage, Policy, PolicyGroup, PolicySection, PolicyValue,
    CURRENT_VERSION, LEGACY_VERSION,
};
pub use predicate::{build_predicate, MatchResult, ObjectKind, Predicate, PredicateError};
pub use query::Query;
pub use registry::{field_names, FieldMetadata, FieldOption, FieldRegistry, QueryBuilder};
pub use searcher::{SearchResult, Searcher};
pub use validate::{validate, ValidationError, ValidationErrors};
pub use violations::{
    DefaultRenderer, ProcessViolation, Violation, ViolationRenderer, Violations,
};
