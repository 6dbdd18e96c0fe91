//! `xnav-types` – shared vocabulary of the XNav client.
//!
//! Holds the snapshot records handed to robot code, the dynamically typed
//! [`Value`] carried by the table bus, the [`XNavError`] used on the setup and
//! write paths, and the [`keys`] schema shared by the client and the device.

pub mod keys;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A single value stored under a table key.
///
/// Every key has exactly one type for its whole life; the bus rejects writes
/// that would change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    IntegerArray(Vec<i64>),
    DoubleArray(Vec<f64>),
}

impl Value {
    /// Short type name as used in error messages, e.g. `"double"`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::IntegerArray(_) => "int[]",
            Value::DoubleArray(_) => "double[]",
        }
    }
}

/// Notification emitted by the bus whenever a key receives a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableUpdate {
    /// Fully qualified key, e.g. `"/XNav/targets/7/tx"`.
    pub key: String,
    pub value: Value,
    pub timestamp: DateTime<Utc>,
}

/// Single detected AprilTag.
///
/// There is no validity flag: an `id` of `-1` means "no tag".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagResult {
    pub id: i32,
    /// Horizontal angle from camera center (degrees).
    pub tx: f64,
    /// Vertical angle from camera center (degrees).
    pub ty: f64,
    /// Camera frame, meters, right is positive.
    pub x: f64,
    /// Camera frame, meters, down is positive.
    pub y: f64,
    /// Camera frame, meters, forward is positive.
    pub z: f64,
    /// Direct 3D distance (meters).
    pub distance: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl TagResult {
    /// Result for `id` with every measurement left at its default.
    pub fn unmeasured(id: i32) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// `true` when this record refers to an actual tag (`id >= 0`).
    pub fn is_valid(&self) -> bool {
        self.id >= 0
    }
}

impl Default for TagResult {
    fn default() -> Self {
        Self {
            id: -1,
            tx: 0.0,
            ty: 0.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            distance: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
        }
    }
}

/// Field-centric robot pose estimated from AprilTags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw_deg: f64,
    /// `false` when no field map is loaded or no mapped tag is visible.
    pub valid: bool,
}

/// Distance and angles to the configured offset point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetPoint {
    /// Tag the offset is anchored to, `-1` when unknown.
    pub tag_id: i32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub direct_distance: f64,
    pub tx: f64,
    pub ty: f64,
    pub valid: bool,
}

impl Default for OffsetPoint {
    fn default() -> Self {
        Self {
            tag_id: -1,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            direct_distance: 0.0,
            tx: 0.0,
            ty: 0.0,
            valid: false,
        }
    }
}

/// Vision device health as seen from the robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// `"running"`, `"starting"`, `"error"`, or `"unknown"` before any report.
    pub status: String,
    pub fps: f64,
    pub latency_ms: f64,
    pub num_targets: i32,
    pub nt_connected: bool,
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self {
            status: keys::DEFAULT_STATUS.to_string(),
            fps: 0.0,
            latency_ms: 0.0,
            num_targets: 0,
            nt_connected: false,
        }
    }
}

/// A batch of freshly delivered detections, queued for the control loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetBatch {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub targets: Vec<TagResult>,
}

impl TargetBatch {
    pub fn new(targets: Vec<TagResult>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            targets,
        }
    }
}

/// Error type for session setup and bus writes.
///
/// The read path never produces one of these; missing data is reported as
/// default values instead.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum XNavError {
    #[error("Type Mismatch on {key}: key holds {existing}, write was {attempted}")]
    TypeMismatch {
        key: String,
        existing: String,
        attempted: String,
    },

    #[error("Invalid Server Address: {0}")]
    InvalidAddress(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_result_defaults_to_no_tag() {
        let tag = TagResult::default();
        assert_eq!(tag.id, -1);
        assert!(!tag.is_valid());
        assert_eq!(tag.distance, 0.0);
    }

    #[test]
    fn unmeasured_keeps_id_and_zero_fields() {
        let tag = TagResult::unmeasured(7);
        assert_eq!(tag.id, 7);
        assert!(tag.is_valid());
        assert_eq!(tag.tx, 0.0);
        assert_eq!(tag.roll, 0.0);
    }

    #[test]
    fn pose_and_offset_default_invalid() {
        assert!(!RobotPose::default().valid);
        let offset = OffsetPoint::default();
        assert!(!offset.valid);
        assert_eq!(offset.tag_id, -1);
    }

    #[test]
    fn status_defaults_to_unknown() {
        let status = SystemStatus::default();
        assert_eq!(status.status, "unknown");
        assert_eq!(status.num_targets, 0);
        assert!(!status.nt_connected);
    }

    #[test]
    fn value_json_is_tagged() {
        let json = serde_json::to_string(&Value::IntegerArray(vec![1, 7])).unwrap();
        assert_eq!(json, r#"{"type":"integerArray","value":[1,7]}"#);
    }

    #[test]
    fn type_names_are_distinct() {
        let values = [
            Value::Boolean(true),
            Value::Integer(1),
            Value::Double(1.0),
            Value::String("s".into()),
            Value::IntegerArray(vec![]),
            Value::DoubleArray(vec![]),
        ];
        let mut names: Vec<_> = values.iter().map(Value::type_name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), values.len());
    }

    #[test]
    fn target_batch_gets_unique_ids() {
        let a = TargetBatch::new(vec![TagResult::unmeasured(1)]);
        let b = TargetBatch::new(vec![]);
        assert_ne!(a.id, b.id);
        assert_eq!(a.targets.len(), 1);
    }

    #[test]
    fn xnav_error_display() {
        let err = XNavError::TypeMismatch {
            key: "/XNav/fps".to_string(),
            existing: "double".to_string(),
            attempted: "string".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("/XNav/fps"));
        assert!(text.contains("double"));

        let err = XNavError::InvalidAddress("bad host".to_string());
        assert!(err.to_string().contains("bad host"));
    }
}
