//! Robot → device control values under `input/`.
//!
//! Writes are fire-and-forget: last value wins, nothing is acknowledged, and
//! a failed write is logged at debug level and otherwise ignored.

use tracing::debug;
use xnav_middleware::{Publisher, Table, TopicValue};
use xnav_types::keys;

pub(crate) struct ControlPublisher {
    turret_angle: Publisher<f64>,
    turret_enabled: Publisher<bool>,
    match_mode: Publisher<bool>,
}

impl ControlPublisher {
    pub(crate) fn new(root: &Table) -> Self {
        let input = root.sub_table(keys::INPUT);
        Self {
            turret_angle: input.publish(keys::input::TURRET_ANGLE),
            turret_enabled: input.publish(keys::input::TURRET_ENABLED),
            match_mode: input.publish(keys::input::MATCH_MODE),
        }
    }

    pub(crate) fn set_turret_angle(&self, angle_deg: f64) {
        send(&self.turret_angle, angle_deg);
    }

    pub(crate) fn set_turret_enabled(&self, enabled: bool) {
        send(&self.turret_enabled, enabled);
    }

    pub(crate) fn set_match_mode(&self, enabled: bool) {
        send(&self.match_mode, enabled);
    }
}

fn send<T: TopicValue>(publisher: &Publisher<T>, value: T) {
    if let Err(e) = publisher.set(value) {
        debug!(key = publisher.key(), error = %e, "control write dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use xnav_middleware::{LocalTableBus, TableBus};
    use xnav_types::Value;

    fn control() -> (Arc<LocalTableBus>, ControlPublisher) {
        let bus = Arc::new(LocalTableBus::default());
        let root = Table::new(bus.clone(), "XNav");
        (bus, ControlPublisher::new(&root))
    }

    #[test]
    fn writes_land_under_input() {
        let (bus, control) = control();
        control.set_turret_angle(33.5);
        control.set_turret_enabled(true);
        control.set_match_mode(true);

        assert_eq!(
            bus.subscribe("/XNav/input/turretAngle").get(),
            Some(Value::Double(33.5))
        );
        assert_eq!(
            bus.subscribe("/XNav/input/turretEnabled").get(),
            Some(Value::Boolean(true))
        );
        assert_eq!(
            bus.subscribe("/XNav/input/matchMode").get(),
            Some(Value::Boolean(true))
        );
    }

    #[test]
    fn last_value_wins() {
        let (bus, control) = control();
        control.set_turret_angle(10.0);
        control.set_turret_angle(-20.0);
        assert_eq!(
            bus.subscribe("/XNav/input/turretAngle").get(),
            Some(Value::Double(-20.0))
        );
    }

    #[test]
    fn rejected_write_is_silent() -> Result<(), Box<dyn std::error::Error>> {
        let (bus, control) = control();
        // Someone else claimed the key with another type.
        bus.set("/XNav/input/matchMode", Value::String("on".into()))?;
        control.set_match_mode(true);
        assert_eq!(
            bus.subscribe("/XNav/input/matchMode").get(),
            Some(Value::String("on".into()))
        );
        Ok(())
    }
}
