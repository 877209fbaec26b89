use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Reference frame every dummy detection is expressed in.
pub const MAP_FRAME: &str = "map";

// ─────────────────────────────────────────────────────────────────────────────
// Geometry primitives (geometry_msgs layout)
// ─────────────────────────────────────────────────────────────────────────────

/// A 3-D vector / point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::default()
    }
}

/// An orientation quaternion in `(x, y, z, w)` order, `w` being the scalar
/// part.
///
/// Unit norm is expected but not enforced here; the geometry crate decides
/// what to do with malformed input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    /// Euclidean norm of the four components.
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

/// Position + orientation in 3-D space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vector3,
    pub orientation: Quaternion,
}

impl Pose {
    pub fn new(position: Vector3, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }
}

/// Frame and time a stamped message refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// e.g. `"map"`
    pub frame_id: String,
    pub stamp: DateTime<Utc>,
}

/// A [`Pose`] together with its [`Header`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseStamped {
    pub header: Header,
    pub pose: Pose,
}

// ─────────────────────────────────────────────────────────────────────────────
// Transform
// ─────────────────────────────────────────────────────────────────────────────

/// A 4x4 homogeneous transform, row-major.
///
/// The upper-left 3x3 block is the rotation, the right-most column holds the
/// translation and the bottom row is `[0, 0, 0, 1]` for rigid transforms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform(pub [[f64; 4]; 4]);

impl Transform {
    /// The 4x4 identity matrix.
    pub fn identity() -> Self {
        Self([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// Element at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `col` is greater than 3.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.0[row][col]
    }

    /// The 16 elements in row-major order (`m00, m01, …, m33`).
    pub fn elements(&self) -> [f64; 16] {
        let mut out = [0.0; 16];
        for (row, values) in self.0.iter().enumerate() {
            out[row * 4..row * 4 + 4].copy_from_slice(values);
        }
        out
    }

    /// The upper-left 3x3 rotation block.
    pub fn rotation(&self) -> [[f64; 3]; 3] {
        let m = &self.0;
        [
            [m[0][0], m[0][1], m[0][2]],
            [m[1][0], m[1][1], m[1][2]],
            [m[2][0], m[2][1], m[2][2]],
        ]
    }

    /// The translation column.
    pub fn translation(&self) -> Vector3 {
        Vector3::new(self.0[0][3], self.0[1][3], self.0[2][3])
    }

    /// Apply the transform to a point (`w = 1`).
    pub fn transform_point(&self, p: Vector3) -> Vector3 {
        let m = &self.0;
        Vector3::new(
            m[0][0] * p.x + m[0][1] * p.y + m[0][2] * p.z + m[0][3],
            m[1][0] * p.x + m[1][1] * p.y + m[1][2] * p.z + m[1][3],
            m[2][0] * p.x + m[2][1] * p.y + m[2][2] * p.z + m[2][3],
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Detections
// ─────────────────────────────────────────────────────────────────────────────

/// The closed set of object classes the dummy detector reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Cup,
    DinnerPlate,
    TableKnife,
    DinnerFork,
    SoupSpoon,
    DrinkingBottle,
}

impl ObjectType {
    /// Every label, in a fixed order.
    pub const ALL: [ObjectType; 6] = [
        ObjectType::Cup,
        ObjectType::DinnerPlate,
        ObjectType::TableKnife,
        ObjectType::DinnerFork,
        ObjectType::SoupSpoon,
        ObjectType::DrinkingBottle,
    ];

    /// The class name as used in the knowledge base ontology.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Cup => "Cup",
            ObjectType::DinnerPlate => "DinnerPlate",
            ObjectType::TableKnife => "TableKnife",
            ObjectType::DinnerFork => "DinnerFork",
            ObjectType::SoupSpoon => "SoupSpoon",
            ObjectType::DrinkingBottle => "DrinkingBottle",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = PerceptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| PerceptError::UnknownObjectType(s.to_string()))
    }
}

/// A labelled, stamped pose of a perceived object instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: Uuid,
    pub object_type: ObjectType,
    pub pose: PoseStamped,
}

impl Detection {
    /// Create a detection in the [`MAP_FRAME`] stamped with `stamp`.
    pub fn new(object_type: ObjectType, pose: Pose, stamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            object_type,
            pose: PoseStamped {
                header: Header {
                    frame_id: MAP_FRAME.to_string(),
                    stamp,
                },
                pose,
            },
        }
    }

    pub fn stamp(&self) -> DateTime<Utc> {
        self.pose.header.stamp
    }
}

/// Request of the `DetectObject` service. Carries no fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectObjectRequest {}

/// Response of the `DetectObject` service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectObjectResponse {
    pub obj: Detection,
}

// ─────────────────────────────────────────────────────────────────────────────
// Bus events
// ─────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the in-process bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "dummy_object_detector"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    ObjectDetection(Detection),
    Fault {
        component: String,
        code: u32,
        message: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PerceptError {
    #[error("Invalid pose: {0}")]
    InvalidPose(String),

    #[error("Unknown object type: {0}")]
    UnknownObjectType(String),

    #[error("Detection channel is full")]
    ChannelFull,

    #[error("Detection channel is closed")]
    ChannelClosed,

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Session has been shut down")]
    SessionClosed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Service already advertised: {0}")]
    ServiceAlreadyAdvertised(String),

    #[error("Remote failure in {service}: {message}")]
    RemoteFailure { service: String, message: String },

    #[error("Knowledge store error: {0}")]
    KnowledgeStore(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
