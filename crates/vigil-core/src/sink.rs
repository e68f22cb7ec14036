//! Output sink for committed stealth state.
//!
//! The engine pushes every committed value to an [`OutputSink`] so that a
//! decision layer (behaviour tree, planner, UI) can read it without
//! touching the engine. [`Blackboard`] is a plain in-memory sink.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use vigil_types::{ActorId, StealthState, Vec3};

/// Consumer of an agent's committed stealth state.
pub trait OutputSink: Send + Sync {
    /// Record the current alert value.
    fn set_alert(&self, value: f32);

    /// Record the current stealth state.
    fn set_state(&self, state: StealthState);

    /// Record whether the target is currently in view.
    fn set_line_of_sight(&self, visible: bool);

    /// Record the current target, or `None` when it is forgotten.
    fn set_target(&self, target: Option<ActorId>);

    /// Record where the latest stimulus came from, or `None` once it is
    /// forgotten.
    fn set_stimulus_location(&self, location: Option<Vec3>);

    /// Record where the target was last confirmed.
    fn set_last_known_position(&self, location: Option<Vec3>);

    /// Forget the current target.
    fn clear_target(&self) {
        self.set_target(None);
    }

    /// Forget the last known position.
    fn clear_last_known_position(&self) {
        self.set_last_known_position(None);
    }

    /// Forget the latest stimulus location.
    fn clear_stimulus_location(&self) {
        self.set_stimulus_location(None);
    }
}

/// Snapshot of every value written to a [`Blackboard`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlackboardValues {
    /// Alert value.
    pub alert_value: f32,
    /// Stealth state.
    pub state: StealthState,
    /// Line of sight to the target.
    pub line_of_sight: bool,
    /// Current target.
    pub target: Option<ActorId>,
    /// Location of the latest stimulus.
    pub stimulus_location: Option<Vec3>,
    /// Last confirmed target position.
    pub last_known_position: Option<Vec3>,
}

/// In-memory [`OutputSink`].
#[derive(Debug, Default)]
pub struct Blackboard {
    values: Mutex<BlackboardValues>,
}

impl Blackboard {
    /// Create an empty blackboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current values.
    pub fn values(&self) -> BlackboardValues {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BlackboardValues> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OutputSink for Blackboard {
    fn set_alert(&self, value: f32) {
        self.lock().alert_value = value;
    }

    fn set_state(&self, state: StealthState) {
        self.lock().state = state;
    }

    fn set_line_of_sight(&self, visible: bool) {
        self.lock().line_of_sight = visible;
    }

    fn set_target(&self, target: Option<ActorId>) {
        self.lock().target = target;
    }

    fn set_stimulus_location(&self, location: Option<Vec3>) {
        self.lock().stimulus_location = location;
    }

    fn set_last_known_position(&self, location: Option<Vec3>) {
        self.lock().last_known_position = location;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blackboard_records_writes() {
        let board = Blackboard::new();
        let target = ActorId::new();
        board.set_alert(42.0);
        board.set_state(StealthState::Suspicious);
        board.set_target(Some(target));
        board.set_last_known_position(Some(Vec3::new(1.0, 0.0, 0.0)));
        board.set_stimulus_location(Some(Vec3::new(2.0, 0.0, 0.0)));

        let values = board.values();
        assert!((values.alert_value - 42.0).abs() < f32::EPSILON);
        assert_eq!(values.state, StealthState::Suspicious);
        assert_eq!(values.target, Some(target));

        board.clear_target();
        board.clear_last_known_position();
        board.clear_stimulus_location();
        let values = board.values();
        assert_eq!(values.target, None);
        assert_eq!(values.last_known_position, None);
        assert_eq!(values.stimulus_location, None);
    }

    #[test]
    fn snapshot_serializes() {
        let board = Blackboard::new();
        board.set_line_of_sight(true);
        let json = serde_json::to_value(board.values()).ok();
        assert_eq!(
            json.as_ref().and_then(|v| v.get("line_of_sight")),
            Some(&serde_json::Value::Bool(true))
        );
    }
}
