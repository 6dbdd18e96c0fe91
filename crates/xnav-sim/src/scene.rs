//! Deterministic detection sequences for bench runs.
//!
//! # Example
//!
//! ```rust
//! use xnav_sim::SimScene;
//!
//! let scene = SimScene::new()
//!     .with_tag(1, 2.0)
//!     .with_tag(7, 4.5)
//!     .with_flicker(7, 25)
//!     .with_field_pose(1.0, 3.0, 90.0);
//!
//! let frame = scene.frame_at(0);
//! assert_eq!(frame.detections.len(), 2);
//! ```

use std::f64::consts::TAU;

use xnav_types::{OffsetPoint, RobotPose, TagResult};

use crate::device::SimFrame;

// ────────────────────────────────────────────────────────────────────────────
// Scene tags
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct SceneTag {
    id: i32,
    distance: f64,
    /// Peak horizontal sweep in degrees.
    sweep_deg: f64,
    /// Ticks per full sweep.
    period: u64,
    /// Visible for `n` ticks, hidden for `n` ticks.  `0` means always visible.
    flicker: u64,
}

impl SceneTag {
    fn visible_at(&self, tick: u64) -> bool {
        self.flicker == 0 || (tick / self.flicker) % 2 == 0
    }

    fn detect(&self, tick: u64) -> TagResult {
        let phase = TAU * (tick % self.period) as f64 / self.period as f64;
        let tx = self.sweep_deg * phase.sin();
        let lateral = self.distance * tx.to_radians().tan();
        TagResult {
            id: self.id,
            tx,
            ty: 0.0,
            x: lateral,
            y: 0.0,
            z: self.distance,
            distance: lateral.hypot(self.distance),
            yaw: -tx,
            pitch: 0.0,
            roll: 0.0,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimScene builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for a tick-driven sequence of [`SimFrame`]s.
///
/// Every tag sweeps left and right in front of the camera.  Frames depend
/// only on the tick, so a run can be replayed exactly.
#[derive(Debug, Clone)]
pub struct SimScene {
    tags: Vec<SceneTag>,
    pose: Option<RobotPose>,
    offset_tag: Option<i32>,
    fps: f64,
    latency_ms: f64,
}

impl Default for SimScene {
    fn default() -> Self {
        Self::new()
    }
}

impl SimScene {
    /// Empty scene at 50 fps with 20 ms of pipeline latency.
    pub fn new() -> Self {
        Self {
            tags: Vec::new(),
            pose: None,
            offset_tag: None,
            fps: 50.0,
            latency_ms: 20.0,
        }
    }

    /// Add a tag straight ahead at `distance` metres.
    pub fn with_tag(mut self, id: i32, distance: f64) -> Self {
        self.tags.push(SceneTag {
            id,
            distance,
            sweep_deg: 15.0,
            period: 200,
            flicker: 0,
        });
        self
    }

    /// Make tag `id` drop out of view every `ticks` ticks.
    pub fn with_flicker(mut self, id: i32, ticks: u64) -> Self {
        if let Some(tag) = self.tags.iter_mut().find(|t| t.id == id) {
            tag.flicker = ticks;
        }
        self
    }

    /// Report a field pose while at least one tag is visible.
    pub fn with_field_pose(mut self, x: f64, y: f64, yaw_deg: f64) -> Self {
        self.pose = Some(RobotPose {
            x,
            y,
            yaw_deg,
            valid: true,
            ..RobotPose::default()
        });
        self
    }

    /// Anchor the offset point to tag `id` when it is visible.
    pub fn with_offset_on(mut self, id: i32) -> Self {
        self.offset_tag = Some(id);
        self
    }

    pub fn with_rates(mut self, fps: f64, latency_ms: f64) -> Self {
        self.fps = fps;
        self.latency_ms = latency_ms;
        self
    }

    /// The frame the device would publish at `tick`.
    pub fn frame_at(&self, tick: u64) -> SimFrame {
        let detections: Vec<TagResult> = self
            .tags
            .iter()
            .filter(|t| t.visible_at(tick))
            .map(|t| t.detect(tick))
            .collect();

        let robot_pose = self.pose.filter(|_| !detections.is_empty());
        let offset = self
            .offset_tag
            .and_then(|id| detections.iter().find(|d| d.id == id))
            .map(|d| OffsetPoint {
                tag_id: d.id,
                x: d.x,
                y: d.y,
                z: d.z,
                direct_distance: d.distance,
                tx: d.tx,
                ty: d.ty,
                valid: true,
            });

        SimFrame {
            detections,
            robot_pose,
            offset,
            fps: self.fps,
            latency_ms: self.latency_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scene_has_no_detections_or_pose() {
        let frame = SimScene::new().with_field_pose(1.0, 1.0, 0.0).frame_at(3);
        assert!(frame.detections.is_empty());
        assert!(frame.robot_pose.is_none());
        assert_eq!(frame.fps, 50.0);
    }

    #[test]
    fn tag_starts_centred() {
        let frame = SimScene::new().with_tag(4, 2.0).frame_at(0);
        let tag = &frame.detections[0];
        assert_eq!(tag.id, 4);
        assert!(tag.tx.abs() < 1e-9);
        assert!((tag.distance - 2.0).abs() < 1e-9);
    }

    #[test]
    fn sweep_reaches_peak_at_quarter_period() {
        let frame = SimScene::new().with_tag(4, 2.0).frame_at(50);
        let tag = &frame.detections[0];
        assert!((tag.tx - 15.0).abs() < 1e-9);
        assert!(tag.distance > 2.0);
    }

    #[test]
    fn flicker_hides_tag_on_alternate_windows() {
        let scene = SimScene::new()
            .with_tag(1, 1.0)
            .with_tag(2, 3.0)
            .with_flicker(2, 10);
        let ids = |tick: u64| -> Vec<i32> {
            scene
                .frame_at(tick)
                .detections
                .iter()
                .map(|d| d.id)
                .collect()
        };
        assert_eq!(ids(0), vec![1, 2]);
        assert_eq!(ids(9), vec![1, 2]);
        assert_eq!(ids(10), vec![1]);
        assert_eq!(ids(20), vec![1, 2]);
    }

    #[test]
    fn offset_follows_anchor_visibility() {
        let scene = SimScene::new()
            .with_tag(5, 2.0)
            .with_flicker(5, 4)
            .with_offset_on(5);
        let seen = scene.frame_at(0).offset.expect("anchor visible at tick 0");
        assert!(seen.valid);
        assert_eq!(seen.tag_id, 5);
        assert!(scene.frame_at(4).offset.is_none());
    }

    #[test]
    fn frames_are_deterministic() {
        let scene = SimScene::new()
            .with_tag(1, 1.5)
            .with_tag(2, 2.5)
            .with_field_pose(0.5, 0.5, 45.0);
        assert_eq!(scene.frame_at(77), scene.frame_at(77));
    }
}
