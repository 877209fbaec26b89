//! [`HttpKnowledgeStore`] – JSON-over-HTTP query client.
//!
//! Posts each query to a single endpoint:
//!
//! ```text
//! POST <endpoint>
//! {"query": "create_object_perception(...)"}
//! ```
//!
//! and expects
//!
//! ```text
//! {"success": true, "bindings": {"ObjInst": "..."}}
//! {"success": false, "error": "..."}
//! ```
//!
//! A `success: false` answer is reported as an error: an assertion that
//! does not hold is a failed assertion.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use perceptor_types::PerceptError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::store::{KnowledgeStore, QueryResult};

/// Errors that can arise while talking to the query endpoint.
#[derive(Error, Debug)]
pub enum KnowledgeStoreError {
    /// The HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response body could not be understood.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
    /// The store evaluated the query and it failed.
    #[error("Query rejected: {0}")]
    Rejected(String),
}

impl From<KnowledgeStoreError> for PerceptError {
    fn from(e: KnowledgeStoreError) -> Self {
        PerceptError::KnowledgeStore(e.to_string())
    }
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    success: bool,
    #[serde(default)]
    bindings: BTreeMap<String, String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for an HTTP query endpoint. Construct once and reuse.
pub struct HttpKnowledgeStore {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpKnowledgeStore {
    /// Create a client posting to `endpoint` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// [`KnowledgeStoreError::Http`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, KnowledgeStoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Submit `query` and decode the answer.
    pub async fn execute(&self, query: &str) -> Result<QueryResult, KnowledgeStoreError> {
        debug!(endpoint = %self.endpoint, query, "submitting query");
        let body = self
            .client
            .post(&self.endpoint)
            .json(&QueryRequest { query })
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_response(&body)
    }
}

#[async_trait]
impl KnowledgeStore for HttpKnowledgeStore {
    async fn submit(&self, query: &str) -> Result<QueryResult, PerceptError> {
        Ok(self.execute(query).await?)
    }
}

fn parse_response(body: &str) -> Result<QueryResult, KnowledgeStoreError> {
    let response: QueryResponse = serde_json::from_str(body)
        .map_err(|e| KnowledgeStoreError::BadResponse(format!("{e}: {body}")))?;
    if !response.success {
        return Err(KnowledgeStoreError::Rejected(
            response.error.unwrap_or_else(|| "query failed".to_string()),
        ));
    }
    Ok(QueryResult {
        success: true,
        bindings: response.bindings,
    })
}
