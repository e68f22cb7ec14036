//! Snapshot, wire and stimulus structs shared between the engine and its
//! collaborators (decision layer, UI, network boundary).

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{AlertUrgency, StealthState, StimulusKind};
use crate::geometry::Vec3;
use crate::ids::ActorId;

/// Upper bound of every alert value.
pub const MAX_ALERT_VALUE: f32 = 100.0;

/// Message tag used when a guard reports a confirmed enemy to its squad.
pub const ENEMY_SPOTTED_TAG: &str = "SquadMessage.EnemySpotted";

// ---------------------------------------------------------------------------
// State snapshot
// ---------------------------------------------------------------------------

/// Everything a UI needs to render a guard's stealth widget.
///
/// Published to observers whenever the state or alert value changes and
/// available on demand through the agent's snapshot query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StealthStateData {
    /// Current alert value in `[0, max_alert_value]`.
    pub alert_value: f32,
    /// The alert ceiling (always [`MAX_ALERT_VALUE`]).
    pub max_alert_value: f32,
    /// Alert value above which the guard becomes suspicious.
    pub suspicious_threshold: f32,
    /// Current derived state.
    pub state: StealthState,
}

impl StealthStateData {
    /// Whether the guard has noticed something but not yet crossed the
    /// suspicion threshold.
    pub fn is_pre_suspicion(&self) -> bool {
        self.alert_value > 0.0 && self.alert_value < self.suspicious_threshold
    }

    /// Alert value as a fraction of the maximum, in `[0, 1]`.
    pub fn alert_fraction(&self) -> f32 {
        if self.max_alert_value <= 0.0 {
            return 0.0;
        }
        (self.alert_value / self.max_alert_value).clamp(0.0, 1.0)
    }

    /// Progress from the suspicion threshold to the maximum, in `[0, 1]`.
    ///
    /// Zero while below the threshold.
    pub fn suspicion_fraction(&self) -> f32 {
        if self.alert_value < self.suspicious_threshold {
            return 0.0;
        }
        let span = self.max_alert_value - self.suspicious_threshold;
        if span <= 0.0 {
            return 1.0;
        }
        ((self.alert_value - self.suspicious_threshold) / span).clamp(0.0, 1.0)
    }

    /// The minimal payload that has to cross a network boundary.
    pub const fn sync_payload(&self) -> SyncPayload {
        SyncPayload {
            alert_value: self.alert_value,
            state: self.state,
        }
    }
}

/// Authoritative state replicated to remote observers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SyncPayload {
    /// Current alert value.
    pub alert_value: f32,
    /// Current derived state.
    pub state: StealthState,
}

// ---------------------------------------------------------------------------
// Squad messages
// ---------------------------------------------------------------------------

/// A message fanned out to every other member of a squad.
///
/// Ephemeral: built by the sender, delivered synchronously, then dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SquadMessage {
    /// The guard raising the message. Never receives its own message.
    pub sender: ActorId,
    /// The actor the message is about, if any.
    pub target_actor: Option<ActorId>,
    /// Where the target was when the message was sent.
    pub target_location: Vec3,
    /// How urgent the message is.
    pub urgency: AlertUrgency,
    /// Free-form message tag (e.g. [`ENEMY_SPOTTED_TAG`]).
    pub tag: String,
}

impl SquadMessage {
    /// Build the critical "enemy spotted" message a guard sends when it
    /// becomes alerted.
    pub fn enemy_spotted(
        sender: ActorId,
        target_actor: Option<ActorId>,
        target_location: Vec3,
    ) -> Self {
        Self {
            sender,
            target_actor,
            target_location,
            urgency: AlertUrgency::Critical,
            tag: ENEMY_SPOTTED_TAG.to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stimuli
// ---------------------------------------------------------------------------

/// A single perception event as delivered by the sensing layer.
///
/// Consumed synchronously by the receiving guard; never queued.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StimulusRecord {
    /// Which sense produced the stimulus.
    pub kind: StimulusKind,
    /// The actor that caused it.
    pub source: ActorId,
    /// Where it was sensed.
    pub location: Vec3,
    /// Unit-less strength (hearing loudness, squad alert amount).
    pub strength: f32,
    /// `false` when the sensing layer reports the stimulus as lost.
    pub sensed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(alert_value: f32) -> StealthStateData {
        StealthStateData {
            alert_value,
            max_alert_value: MAX_ALERT_VALUE,
            suspicious_threshold: 20.0,
            state: StealthState::Idle,
        }
    }

    #[test]
    fn pre_suspicion_window() {
        assert!(!data(0.0).is_pre_suspicion());
        assert!(data(10.0).is_pre_suspicion());
        assert!(!data(20.0).is_pre_suspicion());
    }

    #[test]
    fn fractions() {
        assert!((data(50.0).alert_fraction() - 0.5).abs() < 1e-6);
        assert!(data(10.0).suspicion_fraction().abs() < 1e-6);
        assert!((data(60.0).suspicion_fraction() - 0.5).abs() < 1e-6);
        assert!((data(100.0).suspicion_fraction() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn enemy_spotted_is_critical() {
        let sender = ActorId::new();
        let msg = SquadMessage::enemy_spotted(sender, None, Vec3::ZERO);
        assert_eq!(msg.urgency, AlertUrgency::Critical);
        assert_eq!(msg.tag, ENEMY_SPOTTED_TAG);
        assert_eq!(msg.sender, sender);
    }

    #[test]
    fn squad_message_wire_shape() {
        let msg = SquadMessage::enemy_spotted(
            ActorId::new(),
            Some(ActorId::new()),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let value = serde_json::to_value(&msg).ok();
        let obj = value.as_ref().and_then(serde_json::Value::as_object);
        assert!(obj.is_some_and(|o| {
            o.contains_key("sender")
                && o.contains_key("target_actor")
                && o.contains_key("target_location")
                && o.contains_key("urgency")
                && o.contains_key("tag")
        }));
    }
}
