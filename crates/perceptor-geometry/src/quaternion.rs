//! Quaternion helpers over the `geometry_msgs`-style [`Quaternion`].
//!
//! Conventions: `(x, y, z, w)` storage, `w` scalar, Hamilton product, active
//! rotation `p' = q * p * q*`.

use perceptor_types::{Quaternion, Vector3};

/// Norms closer to zero than this are treated as "no rotation".
pub const DEGENERATE_NORM: f64 = 1e-12;

/// Hamilton product: compose two rotations (`a` applied after `b`).
pub fn mul(a: Quaternion, b: Quaternion) -> Quaternion {
    Quaternion::new(
        a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
        a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
        a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
        a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
    )
}

/// Conjugate (== inverse for a unit quaternion).
pub fn conjugate(q: Quaternion) -> Quaternion {
    Quaternion::new(-q.x, -q.y, -q.z, q.w)
}

/// Scale `q` to unit norm.
///
/// * A (near-)zero quaternion becomes the identity.
/// * A quaternion with a non-finite component is returned unchanged so that
///   NaN/Inf propagate to the caller instead of being hidden.
///
/// Components are divided by the largest magnitude first, so the norm of a
/// large but finite quaternion does not overflow.
pub fn normalized(q: Quaternion) -> Quaternion {
    let components = [q.x, q.y, q.z, q.w];
    if components.iter().any(|c| !c.is_finite()) {
        return q;
    }
    let max = components.iter().fold(0.0_f64, |m, c| m.max(c.abs()));
    if max == 0.0 {
        return Quaternion::identity();
    }
    let scaled = Quaternion::new(q.x / max, q.y / max, q.z / max, q.w / max);
    let n = scaled.norm();
    // `scaled` has norm in [1, 2].
    if max * n < DEGENERATE_NORM {
        return Quaternion::identity();
    }
    Quaternion::new(scaled.x / n, scaled.y / n, scaled.z / n, scaled.w / n)
}

/// `true` when `|‖q‖ − 1| <= tolerance`.
pub fn is_unit(q: Quaternion, tolerance: f64) -> bool {
    (q.norm() - 1.0).abs() <= tolerance
}

/// Rotate a vector by this quaternion: p' = q * p * q*.
pub fn rotate(q: Quaternion, v: Vector3) -> Vector3 {
    let p = Quaternion::new(v.x, v.y, v.z, 0.0);
    let r = mul(mul(q, p), conjugate(q));
    Vector3::new(r.x, r.y, r.z)
}

/// Rotation of `angle_rad` about the (not necessarily unit) `axis`.
pub fn from_axis_angle(axis: Vector3, angle_rad: f64) -> Quaternion {
    let len = (axis.x * axis.x + axis.y * axis.y + axis.z * axis.z).sqrt();
    if len < DEGENERATE_NORM {
        return Quaternion::identity();
    }
    let (s, c) = (angle_rad * 0.5).sin_cos();
    Quaternion::new(axis.x / len * s, axis.y / len * s, axis.z / len * s, c)
}
