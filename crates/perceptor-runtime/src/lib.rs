//! `perceptor-runtime` – the running detection pipeline.
//!
//! ```text
//! DetectionProducer ──bus topic──▶ DetectionListener ──channel──▶ KnowledgeUpdater ──▶ KnowledgeStore
//! ```
//!
//! # Modules
//!
//! - [`producer`] – [`DetectionProducer`]: publishes one random detection per
//!   interval.
//! - [`listener`] – [`DetectionListener`]: mirrors the detection topic into a
//!   bounded [`DetectionChannel`][perceptor_middleware::channel].
//! - [`updater`] – [`KnowledgeUpdater`]: drains the channel, converts each
//!   pose and asserts it into the knowledge store. Failed submissions are
//!   logged and skipped.
//! - [`detector_service`] – [`DummyDetectorService`] and [`DummyClient`]:
//!   the request/response variant, one detection per call.
//! - [`pipeline`] – [`DetectionPipeline`]: spawns and joins the three tasks
//!   above on a shared [`Session`][perceptor_middleware::Session].
//! - [`telemetry`] – [`init_tracing`]: `tracing-subscriber` setup with an
//!   optional OTLP span exporter.

pub mod detector_service;
pub mod listener;
pub mod pipeline;
pub mod producer;
pub mod telemetry;
pub mod updater;

pub use detector_service::{DummyClient, DummyDetectorService};
pub use listener::DetectionListener;
pub use pipeline::{DetectionPipeline, PipelineConfig, PipelineHandle, PipelineReport};
pub use producer::{DetectionProducer, ProducerConfig};
pub use telemetry::{LogFormat, TelemetryConfig, TracerProviderGuard, init_tracing};
pub use updater::{KnowledgeUpdater, UpdaterConfig, UpdaterStats};

/// Topic the dummy detections are published on.
pub const DEFAULT_DETECTIONS_TOPIC: &str = "/dummy_object_detections";

/// Name the dummy detector service is advertised under.
pub const DEFAULT_SERVICE_NAME: &str = "dummy_object_detector";
