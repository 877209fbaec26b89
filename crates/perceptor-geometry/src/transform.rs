//! Pose → homogeneous transform conversion.
//!
//! [`to_transform`] turns a [`Pose`] into the 4x4 matrix that maps points
//! expressed in the object frame into the pose's parent frame:
//!
//! ```text
//! | r00 r01 r02 tx |
//! | r10 r11 r12 ty |
//! | r20 r21 r22 tz |
//! |  0   0   0   1 |
//! ```
//!
//! The quaternion is normalised first, so slightly-off inputs still give an
//! orthonormal rotation block. A zero quaternion maps to the identity
//! rotation. NaN or infinite components are passed through and show up in
//! the resulting matrix.
//!
//! # Example
//!
//! ```rust
//! use perceptor_geometry::to_transform;
//! use perceptor_types::{Pose, Quaternion, Transform, Vector3};
//!
//! let m = to_transform(&Pose::new(Vector3::zero(), Quaternion::identity()));
//! assert_eq!(m, Transform::identity());
//! ```

use perceptor_types::{PerceptError, Pose, Transform};
use tracing::debug;

use crate::quaternion;

/// Convert `pose` into a 4x4 row-major homogeneous transform.
pub fn to_transform(pose: &Pose) -> Transform {
    let q = quaternion::normalized(pose.orientation);
    let (x, y, z, w) = (q.x, q.y, q.z, q.w);
    let p = pose.position;

    let xx = x * x;
    let yy = y * y;
    let zz = z * z;
    let xy = x * y;
    let xz = x * z;
    let yz = y * z;
    let wx = w * x;
    let wy = w * y;
    let wz = w * z;

    Transform([
        [1.0 - 2.0 * (yy + zz), 2.0 * (xy - wz), 2.0 * (xz + wy), p.x],
        [2.0 * (xy + wz), 1.0 - 2.0 * (xx + zz), 2.0 * (yz - wx), p.y],
        [2.0 * (xz - wy), 2.0 * (yz + wx), 1.0 - 2.0 * (xx + yy), p.z],
        [0.0, 0.0, 0.0, 1.0],
    ])
}

/// Like [`to_transform`], but rejects orientations whose norm differs from 1
/// by more than `tolerance` instead of normalising them.
///
/// # Errors
///
/// Returns [`PerceptError::InvalidPose`] for non-unit or non-finite
/// quaternions.
pub fn to_transform_strict(pose: &Pose, tolerance: f64) -> Result<Transform, PerceptError> {
    let q = pose.orientation;
    if !quaternion::is_unit(q, tolerance) {
        debug!(norm = q.norm(), tolerance, "rejecting non-unit orientation");
        return Err(PerceptError::InvalidPose(format!(
            "quaternion norm {} is not within {} of 1",
            q.norm(),
            tolerance
        )));
    }
    Ok(to_transform(pose))
}

/// Matrix product `a * b`: apply `b` first, then `a`.
pub fn compose(a: &Transform, b: &Transform) -> Transform {
    let mut out = [[0.0; 4]; 4];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = (0..4).map(|k| a.0[r][k] * b.0[k][c]).sum();
        }
    }
    Transform(out)
}
