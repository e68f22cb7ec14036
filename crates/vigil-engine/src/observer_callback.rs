//! State-changed callback that feeds the sync tracker.
//!
//! Each guard gets one [`ObserverCallback`]. On every published change it
//! logs the new alert level and offers the sync payload to the shared
//! [`SyncTracker`], logging the delta when one is produced.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, warn};
use vigil_core::agent::StealthAgent;
use vigil_core::observers::SubscriptionToken;
use vigil_types::{ActorId, StealthStateData};

use crate::replication::SyncTracker;

/// Callback that bridges a guard's state changes to replication.
pub struct ObserverCallback {
    guard: String,
    actor: ActorId,
    tracker: Arc<Mutex<SyncTracker>>,
}

impl ObserverCallback {
    /// Create a callback for the guard named `guard`.
    pub const fn new(guard: String, actor: ActorId, tracker: Arc<Mutex<SyncTracker>>) -> Self {
        Self {
            guard,
            actor,
            tracker,
        }
    }

    /// Subscribe to `agent`'s state changes.
    pub fn attach(self, agent: &StealthAgent) -> SubscriptionToken {
        agent.subscribe(move |data| self.on_state_changed(data))
    }

    /// Handle one published snapshot.
    pub fn on_state_changed(&self, data: &StealthStateData) {
        debug!(
            guard = self.guard.as_str(),
            state = data.state.label(),
            alert = data.alert_value,
            fraction = data.alert_fraction(),
            pre_suspicion = data.is_pre_suspicion(),
            "Guard alert changed"
        );

        let delta = self
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(self.actor, data.sync_payload(), Utc::now());

        if let Some(delta) = delta {
            match serde_json::to_string(&delta) {
                Ok(json) => debug!(guard = self.guard.as_str(), delta = %json, "Sync delta"),
                Err(e) => warn!(guard = self.guard.as_str(), error = %e, "Failed to encode sync delta"),
            }
        }
    }
}
