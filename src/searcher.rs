//! The external searcher capability.
//!
//! Batch matching hands a compiled query to a search backend instead of
//! evaluating objects one by one. The backend is opaque to the engine:
//! results come back as ordered (id, per-field matches, score) records, and
//! failures propagate unchanged. Cancellation is propagated by dropping the
//! in-flight future; the engine adds no retry or timeout policy of its own.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::query::Query;

/// One search hit. `field_matches` maps a field path to the substrings that
/// matched, with enough structure for violation rendering.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    #[serde(default)]
    pub field_matches: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub score: f64,
}

/// Executes a compiled query against a persisted corpus.
///
/// Implementations must return results in a deterministic order for a fixed
/// corpus snapshot; the engine imposes no additional sort.
#[async_trait]
pub trait Searcher: Send + Sync {
    async fn search(&self, query: &Query) -> anyhow::Result<Vec<SearchResult>>;
}
