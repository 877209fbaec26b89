//! `perceptor-detector` – the dummy object detector.
//!
//! There is no vision here: [`DetectionGenerator`] draws a random label from
//! the fixed [`ObjectType`][perceptor_types::ObjectType] set and a random
//! position on a 3 m table-top cube.

pub mod generator;

pub use generator::{DEFAULT_POSITION_RANGE, DetectionGenerator};
