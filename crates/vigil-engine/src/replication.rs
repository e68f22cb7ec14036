//! Network sync deltas for guard state.
//!
//! Every published state change is offered to a [`SyncTracker`], which
//! decides whether clients need to hear about it. A change of discrete
//! state is always sent. Alert value changes are sent once they move by at
//! least [`ALERT_QUANTUM`], or when the value lands exactly on a bound so
//! clients never stall just short of zero or the maximum.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use vigil_core::falloff::nearly_equal;
use vigil_types::{ActorId, MAX_ALERT_VALUE, SyncPayload};

/// Smallest alert change worth a delta.
pub const ALERT_QUANTUM: f32 = 0.5;

/// One replicated update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SyncDelta {
    /// Guard the update belongs to.
    pub actor: ActorId,
    /// Replicated fields.
    pub payload: SyncPayload,
    /// When the delta was produced.
    pub sent_at: DateTime<Utc>,
}

/// Last payload sent per guard.
#[derive(Debug, Default)]
pub struct SyncTracker {
    last_sent: BTreeMap<ActorId, SyncPayload>,
    deltas_sent: u64,
}

impl SyncTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a new payload. Returns the delta to send, if any.
    pub fn observe(
        &mut self,
        actor: ActorId,
        payload: SyncPayload,
        now: DateTime<Utc>,
    ) -> Option<SyncDelta> {
        let send = self
            .last_sent
            .get(&actor)
            .is_none_or(|last| needs_sync(*last, payload));
        if !send {
            return None;
        }
        self.last_sent.insert(actor, payload);
        self.deltas_sent = self.deltas_sent.saturating_add(1);
        Some(SyncDelta {
            actor,
            payload,
            sent_at: now,
        })
    }

    /// Drop a guard that left play. Returns whether it was tracked.
    pub fn forget(&mut self, actor: ActorId) -> bool {
        self.last_sent.remove(&actor).is_some()
    }

    /// Last payload sent for `actor`.
    pub fn last_sent(&self, actor: ActorId) -> Option<SyncPayload> {
        self.last_sent.get(&actor).copied()
    }

    /// Total deltas produced.
    pub const fn deltas_sent(&self) -> u64 {
        self.deltas_sent
    }
}

fn needs_sync(last: SyncPayload, next: SyncPayload) -> bool {
    if last.state != next.state {
        return true;
    }
    if nearly_equal(last.alert_value, next.alert_value) {
        return false;
    }
    let on_bound = next.alert_value <= 0.0 || next.alert_value >= MAX_ALERT_VALUE;
    on_bound || (last.alert_value - next.alert_value).abs() >= ALERT_QUANTUM
}
