//! Simulated device side of the table.

use std::sync::Arc;

use tracing::{debug, info};
use xnav_middleware::{LocalTableBus, Subscriber, Table, TopicValue};
use xnav_types::{OffsetPoint, RobotPose, TagResult, XNavError, keys};

/// One detection cycle as the device would publish it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimFrame {
    pub detections: Vec<TagResult>,
    /// `None` (or `valid == false`) publishes six zeros.
    pub robot_pose: Option<RobotPose>,
    /// `None` (or `valid == false`) publishes only `valid = false`.
    pub offset: Option<OffsetPoint>,
    pub fps: f64,
    pub latency_ms: f64,
}

impl SimFrame {
    pub fn with_detections(detections: Vec<TagResult>) -> Self {
        Self {
            detections,
            ..Self::default()
        }
    }

    /// Closest detection, which the device reports as primary.
    pub fn primary(&self) -> Option<&TagResult> {
        self.detections
            .iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

/// Control values written by the robot under `input/`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeviceInputs {
    pub turret_angle: f64,
    pub turret_enabled: bool,
    pub match_mode: bool,
}

struct InputSubs {
    turret_angle: Subscriber<f64>,
    turret_enabled: Subscriber<bool>,
    match_mode: Subscriber<bool>,
}

/// A vision device attached to a [`LocalTableBus`].
pub struct SimDevice {
    bus: Arc<LocalTableBus>,
    table: Table,
    inputs: InputSubs,
    last_inputs: DeviceInputs,
}

impl SimDevice {
    /// Attach to `bus` under `table_name` and bring the link up.
    pub fn attach(bus: Arc<LocalTableBus>, table_name: &str) -> Self {
        let table = Table::new(bus.clone(), table_name);
        let input = table.sub_table(keys::INPUT);
        let inputs = InputSubs {
            turret_angle: input.subscribe(keys::input::TURRET_ANGLE, 0.0),
            turret_enabled: input.subscribe(keys::input::TURRET_ENABLED, false),
            match_mode: input.subscribe(keys::input::MATCH_MODE, false),
        };
        bus.set_link(true);
        info!(table = table.path(), "simulated device attached");
        Self {
            bus,
            table,
            inputs,
            last_inputs: DeviceInputs::default(),
        }
    }

    /// Publish one full detection cycle.
    ///
    /// # Errors
    ///
    /// Propagates the first rejected write, e.g. a key already claimed with
    /// another type.
    pub fn publish_frame(&self, frame: &SimFrame) -> Result<(), XNavError> {
        let detections = &frame.detections;
        self.put(keys::HAS_TARGET, !detections.is_empty())?;
        self.put(keys::NUM_TARGETS, detections.len() as i64)?;
        self.put(keys::FPS, frame.fps)?;
        self.put(keys::LATENCY_MS, frame.latency_ms)?;
        self.put(
            keys::TAG_IDS,
            detections.iter().map(|d| i64::from(d.id)).collect::<Vec<_>>(),
        )?;
        self.put(
            keys::PRIMARY_TAG_ID,
            frame.primary().map_or(-1, |p| i64::from(p.id)),
        )?;

        for tag in detections {
            self.publish_tag(tag)?;
        }

        let pose = match frame.robot_pose {
            Some(p) if p.valid => vec![p.x, p.y, p.z, p.roll, p.pitch, p.yaw_deg],
            _ => vec![0.0; keys::ROBOT_POSE_LEN],
        };
        self.put(keys::ROBOT_POSE, pose)?;

        let offset = self.table.sub_table(keys::OFFSET_POINT);
        match frame.offset {
            Some(op) if op.valid => {
                use keys::offset::*;
                put(&offset, VALID, true)?;
                put(&offset, TAG_ID, i64::from(op.tag_id))?;
                put(&offset, X, op.x)?;
                put(&offset, Y, op.y)?;
                put(&offset, Z, op.z)?;
                put(&offset, DIRECT_DISTANCE, op.direct_distance)?;
                put(&offset, TX, op.tx)?;
                put(&offset, TY, op.ty)?;
            }
            _ => put(&offset, keys::offset::VALID, false)?,
        }

        debug!(tags = detections.len(), "simulated frame published");
        Ok(())
    }

    fn publish_tag(&self, tag: &TagResult) -> Result<(), XNavError> {
        use keys::target::*;

        let t = self.table.sub_table(&keys::target_table(tag.id));
        put(&t, TX, tag.tx)?;
        put(&t, TY, tag.ty)?;
        put(&t, X, tag.x)?;
        put(&t, Y, tag.y)?;
        put(&t, Z, tag.z)?;
        put(&t, DISTANCE, tag.distance)?;
        put(&t, YAW, tag.yaw)?;
        put(&t, PITCH, tag.pitch)?;
        put(&t, ROLL, tag.roll)
    }

    /// Publish the free-form status label (`"running"`, `"starting"`, …).
    pub fn publish_status(&self, status: &str) -> Result<(), XNavError> {
        self.put(keys::STATUS, status.to_string())
    }

    /// Latest robot inputs.  Keys the robot has not written keep the
    /// previously read value.
    pub fn read_inputs(&mut self) -> DeviceInputs {
        let last = self.last_inputs;
        self.last_inputs = DeviceInputs {
            turret_angle: self.inputs.turret_angle.get_or(last.turret_angle),
            turret_enabled: self.inputs.turret_enabled.get_or(last.turret_enabled),
            match_mode: self.inputs.match_mode.get_or(last.match_mode),
        };
        self.last_inputs
    }

    /// Bring the emulated network link up or down.
    pub fn set_connected(&self, connected: bool) {
        self.bus.set_link(connected);
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    fn put<T: TopicValue>(&self, name: &str, value: T) -> Result<(), XNavError> {
        put(&self.table, name, value)
    }
}

fn put<T: TopicValue>(table: &Table, name: &str, value: T) -> Result<(), XNavError> {
    table.publish::<T>(name).set(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xnav_middleware::TableBus;
    use xnav_types::Value;

    fn tag(id: i32, distance: f64) -> TagResult {
        TagResult {
            id,
            distance,
            ..TagResult::default()
        }
    }

    fn device() -> (Arc<LocalTableBus>, SimDevice) {
        let bus = Arc::new(LocalTableBus::default());
        let device = SimDevice::attach(bus.clone(), "XNav");
        (bus, device)
    }

    fn read(bus: &LocalTableBus, key: &str) -> Option<Value> {
        bus.subscribe(key).get()
    }

    #[test]
    fn attach_brings_link_up() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, _device) = device();
        bus.start_client("XNavLib", None)?;
        assert_eq!(bus.connections(), 1);
        Ok(())
    }

    #[test]
    fn frame_publishes_summary_keys() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, device) = device();
        let mut frame = SimFrame::with_detections(vec![tag(4, 3.0), tag(9, 1.5)]);
        frame.fps = 30.0;
        device.publish_frame(&frame)?;

        assert_eq!(read(&bus, "/XNav/hasTarget"), Some(Value::Boolean(true)));
        assert_eq!(read(&bus, "/XNav/numTargets"), Some(Value::Integer(2)));
        assert_eq!(read(&bus, "/XNav/tagIds"), Some(Value::IntegerArray(vec![4, 9])));
        assert_eq!(read(&bus, "/XNav/primaryTagId"), Some(Value::Integer(9)));
        assert_eq!(read(&bus, "/XNav/fps"), Some(Value::Double(30.0)));
        assert_eq!(read(&bus, "/XNav/targets/9/distance"), Some(Value::Double(1.5)));
        Ok(())
    }

    #[test]
    fn empty_frame_reports_no_primary_and_zero_pose() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, device) = device();
        device.publish_frame(&SimFrame::default())?;

        assert_eq!(read(&bus, "/XNav/hasTarget"), Some(Value::Boolean(false)));
        assert_eq!(read(&bus, "/XNav/primaryTagId"), Some(Value::Integer(-1)));
        assert_eq!(
            read(&bus, "/XNav/robotPose"),
            Some(Value::DoubleArray(vec![0.0; 6]))
        );
        assert_eq!(read(&bus, "/XNav/offsetPoint/valid"), Some(Value::Boolean(false)));
        assert_eq!(read(&bus, "/XNav/offsetPoint/x"), None);
        Ok(())
    }

    #[test]
    fn valid_pose_and_offset_are_published() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, device) = device();
        let frame = SimFrame {
            robot_pose: Some(RobotPose {
                x: 1.0,
                y: 2.0,
                yaw_deg: 90.0,
                valid: true,
                ..RobotPose::default()
            }),
            offset: Some(OffsetPoint {
                tag_id: 4,
                direct_distance: 2.5,
                valid: true,
                ..OffsetPoint::default()
            }),
            ..SimFrame::default()
        };
        device.publish_frame(&frame)?;

        assert_eq!(
            read(&bus, "/XNav/robotPose"),
            Some(Value::DoubleArray(vec![1.0, 2.0, 0.0, 0.0, 0.0, 90.0]))
        );
        assert_eq!(read(&bus, "/XNav/offsetPoint/valid"), Some(Value::Boolean(true)));
        assert_eq!(read(&bus, "/XNav/offsetPoint/tag_id"), Some(Value::Integer(4)));
        assert_eq!(
            read(&bus, "/XNav/offsetPoint/directDistance"),
            Some(Value::Double(2.5))
        );
        Ok(())
    }

    #[test]
    fn status_label_is_published() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, device) = device();
        device.publish_status("starting")?;
        assert_eq!(read(&bus, "/XNav/status"), Some(Value::String("starting".into())));
        Ok(())
    }

    #[test]
    fn inputs_default_then_follow_robot_writes() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, mut device) = device();
        assert_eq!(device.read_inputs(), DeviceInputs::default());

        bus.set("/XNav/input/turretAngle", Value::Double(30.0))?;
        bus.set("/XNav/input/matchMode", Value::Boolean(true))?;
        let inputs = device.read_inputs();
        assert_eq!(inputs.turret_angle, 30.0);
        assert!(inputs.match_mode);
        assert!(!inputs.turret_enabled);
        Ok(())
    }

    #[test]
    fn primary_is_closest_detection() {
        let frame = SimFrame::with_detections(vec![tag(1, 4.0), tag(2, 0.5), tag(3, 2.0)]);
        assert_eq!(frame.primary().map(|t| t.id), Some(2));
        assert!(SimFrame::default().primary().is_none());
    }
}
