//! `perceptor-middleware` – the transport seam.
//!
//! Everything the detection pipeline needs from a robotics middleware, kept
//! in-process so the core can run and be tested without one.
//!
//! # Modules
//!
//! - [`bus`] – topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`channel`] – bounded FIFO hand-off of [`Detection`]s between one
//!   producer task and one consumer task.
//! - [`service`] – named request/response services (`DetectObject`) with
//!   timeouts and remote-failure reporting.
//! - [`session`] – [`Session`]: the explicitly passed context bundling the
//!   bus, the service registry and the liveness flag.
//!
//! [`Detection`]: perceptor_types::Detection

pub mod bus;
pub mod channel;
pub mod service;
pub mod session;

pub use bus::{EventBus, TopicReceiver};
pub use channel::{DetectionReceiver, DetectionSender, detection_channel};
pub use service::{ServiceClient, ServiceHandler, ServiceRegistry, ServiceServer};
pub use session::Session;
