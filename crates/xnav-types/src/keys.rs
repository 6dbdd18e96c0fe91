//! Key schema of the XNav table.
//!
//! Names are relative to the table root (default [`DEFAULT_TABLE`]):
//!
//! | Key | Type |
//! |---|---|
//! | `status` | string |
//! | `fps`, `latencyMs` | double |
//! | `hasTarget` | boolean |
//! | `numTargets`, `primaryTagId` | int |
//! | `tagIds` | int[] |
//! | `targets/<id>/{tx,ty,x,y,z,distance,yaw,pitch,roll}` | double |
//! | `robotPose` | double[6] `[x, y, z, roll, pitch, yaw]` |
//! | `offsetPoint/{valid,tag_id,x,y,z,directDistance,tx,ty}` | mixed |
//! | `input/{turretAngle,turretEnabled,matchMode}` | written by the robot |

pub const DEFAULT_TABLE: &str = "XNav";
pub const DEFAULT_STATUS: &str = "unknown";

pub const STATUS: &str = "status";
pub const FPS: &str = "fps";
pub const LATENCY_MS: &str = "latencyMs";
pub const HAS_TARGET: &str = "hasTarget";
pub const NUM_TARGETS: &str = "numTargets";
pub const TAG_IDS: &str = "tagIds";
pub const PRIMARY_TAG_ID: &str = "primaryTagId";
pub const ROBOT_POSE: &str = "robotPose";

/// Number of elements in a complete `robotPose` array.
pub const ROBOT_POSE_LEN: usize = 6;

pub const TARGETS: &str = "targets";
pub const OFFSET_POINT: &str = "offsetPoint";
pub const INPUT: &str = "input";

/// Per-tag fields under `targets/<id>/`.
pub mod target {
    pub const TX: &str = "tx";
    pub const TY: &str = "ty";
    pub const X: &str = "x";
    pub const Y: &str = "y";
    pub const Z: &str = "z";
    pub const DISTANCE: &str = "distance";
    pub const YAW: &str = "yaw";
    pub const PITCH: &str = "pitch";
    pub const ROLL: &str = "roll";

    pub const FIELDS: [&str; 9] = [TX, TY, X, Y, Z, DISTANCE, YAW, PITCH, ROLL];
}

/// Fields under `offsetPoint/`.
pub mod offset {
    pub const VALID: &str = "valid";
    pub const TAG_ID: &str = "tag_id";
    pub const X: &str = "x";
    pub const Y: &str = "y";
    pub const Z: &str = "z";
    pub const DIRECT_DISTANCE: &str = "directDistance";
    pub const TX: &str = "tx";
    pub const TY: &str = "ty";
}

/// Control values under `input/`, written by the robot.
pub mod input {
    pub const TURRET_ANGLE: &str = "turretAngle";
    pub const TURRET_ENABLED: &str = "turretEnabled";
    pub const MATCH_MODE: &str = "matchMode";
}

/// Sub-table path holding the fields of tag `id`, relative to the table root.
pub fn target_table(id: i32) -> String {
    format!("{TARGETS}/{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_table_is_nested_under_targets() {
        assert_eq!(target_table(7), "targets/7");
    }

    #[test]
    fn target_fields_are_unique() {
        let mut fields = target::FIELDS.to_vec();
        fields.sort_unstable();
        fields.dedup();
        assert_eq!(fields.len(), target::FIELDS.len());
    }
}
