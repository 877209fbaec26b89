//! `perceptor-geometry` – pose math.
//!
//! # Modules
//!
//! - [`quaternion`] – Hamilton product, conjugate, normalisation and vector
//!   rotation over [`Quaternion`][perceptor_types::Quaternion].
//! - [`transform`] – [`to_transform`][transform::to_transform]: converts a
//!   [`Pose`][perceptor_types::Pose] into a 4x4 homogeneous
//!   [`Transform`][perceptor_types::Transform].

pub mod quaternion;
pub mod transform;

pub use transform::{to_transform, to_transform_strict};
