//! `perceptor-knowledge` – the knowledge-base side of the pipeline.
//!
//! # Modules
//!
//! - [`query`] – [`ObjectPerceptionQuery`][query::ObjectPerceptionQuery]:
//!   renders a detection as a `create_object_perception(...)` assertion.
//! - [`store`] – the [`KnowledgeStore`][store::KnowledgeStore] trait plus the
//!   in-process [`RecordingKnowledgeStore`][store::RecordingKnowledgeStore]
//!   and [`LoggingKnowledgeStore`][store::LoggingKnowledgeStore].
//! - [`http`] – [`HttpKnowledgeStore`][http::HttpKnowledgeStore]: submits
//!   queries to a JSON query endpoint over HTTP.

pub mod http;
pub mod query;
pub mod store;

pub use http::HttpKnowledgeStore;
pub use query::{DEFAULT_KB_NAMESPACE, ObjectPerceptionQuery, QueryTemplate};
pub use store::{KnowledgeStore, LoggingKnowledgeStore, QueryResult, RecordingKnowledgeStore};
