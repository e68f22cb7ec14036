//! Token-based subscriber list for state-changed notifications.

use std::collections::BTreeMap;
use std::sync::Arc;

use vigil_types::StealthStateData;

/// Callback invoked with the new snapshot whenever the state or alert
/// value of an agent changes.
pub type StateCallback = Arc<dyn Fn(&StealthStateData) + Send + Sync>;

/// Handle returned by [`StateObservers::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionToken(u64);

/// Ordered list of state observers.
#[derive(Default)]
pub struct StateObservers {
    next_token: u64,
    callbacks: BTreeMap<SubscriptionToken, StateCallback>,
}

impl StateObservers {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback. Callbacks run in subscription order.
    pub fn subscribe(&mut self, callback: StateCallback) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token);
        self.next_token = self.next_token.saturating_add(1);
        self.callbacks.insert(token, callback);
        token
    }

    /// Remove a callback. Returns `false` for an unknown token.
    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        self.callbacks.remove(&token).is_some()
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Clone the callbacks so they can be invoked without holding the
    /// owner's lock.
    pub fn snapshot(&self) -> Vec<StateCallback> {
        self.callbacks.values().cloned().collect()
    }
}

impl std::fmt::Debug for StateObservers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateObservers")
            .field("subscriptions", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

/// Invoke every callback with `data`.
pub fn publish(callbacks: &[StateCallback], data: &StealthStateData) {
    for callback in callbacks {
        callback(data);
    }
}
