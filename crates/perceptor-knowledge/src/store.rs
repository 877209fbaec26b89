//! The knowledge-store boundary.
//!
//! The pipeline only needs "submit one textual assertion, learn whether it
//! worked". [`KnowledgeStore`] captures exactly that; the query language
//! itself is opaque to this crate beyond the formatting in
//! [`query`][crate::query].

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use perceptor_types::PerceptError;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome of a successfully submitted query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// `false` when the store evaluated the query and it did not hold.
    pub success: bool,
    /// Variable bindings, e.g. `ObjInst -> "...#Cup_3"`.
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,
}

impl QueryResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            bindings: BTreeMap::new(),
        }
    }

    pub fn with_binding(mut self, var: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings.insert(var.into(), value.into());
        self
    }
}

/// A system that accepts textual assertion queries.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Submit one query.
    ///
    /// # Errors
    ///
    /// [`PerceptError::KnowledgeStore`] if the query could not be delivered
    /// or was rejected.
    async fn submit(&self, query: &str) -> Result<QueryResult, PerceptError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// RecordingKnowledgeStore
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory store that keeps every accepted query, in submission order.
///
/// Queries containing one of the configured rejection patterns fail with
/// [`PerceptError::KnowledgeStore`] and are not recorded.
#[derive(Default)]
pub struct RecordingKnowledgeStore {
    accepted: Mutex<Vec<String>>,
    rejected: Mutex<Vec<String>>,
    reject_patterns: Vec<String>,
}

impl RecordingKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every query containing `pattern`.
    pub fn rejecting(mut self, pattern: impl Into<String>) -> Self {
        self.reject_patterns.push(pattern.into());
        self
    }

    /// Snapshot of the accepted queries.
    pub fn queries(&self) -> Vec<String> {
        self.accepted.lock().clone()
    }

    /// Snapshot of the rejected queries.
    pub fn rejected(&self) -> Vec<String> {
        self.rejected.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.accepted.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.lock().is_empty()
    }
}

#[async_trait]
impl KnowledgeStore for RecordingKnowledgeStore {
    async fn submit(&self, query: &str) -> Result<QueryResult, PerceptError> {
        if let Some(pattern) = self.reject_patterns.iter().find(|p| query.contains(p.as_str())) {
            self.rejected.lock().push(query.to_string());
            return Err(PerceptError::KnowledgeStore(format!(
                "query rejected (matches '{pattern}')"
            )));
        }
        let mut accepted = self.accepted.lock();
        accepted.push(query.to_string());
        Ok(QueryResult::succeeded().with_binding("ObjInst", format!("obj_{}", accepted.len())))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LoggingKnowledgeStore
// ─────────────────────────────────────────────────────────────────────────────

/// Store that only logs each query. Used when no endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingKnowledgeStore;

#[async_trait]
impl KnowledgeStore for LoggingKnowledgeStore {
    async fn submit(&self, query: &str) -> Result<QueryResult, PerceptError> {
        info!(query, "knowledge-base assertion");
        Ok(QueryResult::succeeded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_store_keeps_submission_order() -> Result<(), Box<dyn std::error::Error>> {
        let store = RecordingKnowledgeStore::new();
        let first = store.submit("a(1)").await?;
        store.submit("a(2)").await?;
        assert_eq!(store.queries(), vec!["a(1)".to_string(), "a(2)".to_string()]);
        assert_eq!(store.len(), 2);
        assert!(first.success);
        assert_eq!(first.bindings.get("ObjInst").map(String::as_str), Some("obj_1"));
        Ok(())
    }

    #[tokio::test]
    async fn recording_store_rejects_matching_queries() {
        let store = RecordingKnowledgeStore::new().rejecting("TableKnife");
        let err = store.submit("create(TableKnife)").await.unwrap_err();
        assert!(matches!(err, PerceptError::KnowledgeStore(_)));
        assert!(store.is_empty());
        assert_eq!(store.rejected(), vec!["create(TableKnife)".to_string()]);
        assert!(store.submit("create(Cup)").await.is_ok());
    }

    #[tokio::test]
    async fn logging_store_always_succeeds() {
        let result = LoggingKnowledgeStore.submit("anything").await.unwrap();
        assert_eq!(result, QueryResult::succeeded());
    }

    #[test]
    fn query_result_deserializes_without_bindings() {
        let r: QueryResult = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(!r.success);
        assert!(r.bindings.is_empty());
    }
}
