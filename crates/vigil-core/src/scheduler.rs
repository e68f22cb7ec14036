//! Periodic timer abstraction.
//!
//! Agents only tick while they have something to do: a timer is registered
//! when a stimulus arrives and cancelled again once the agent goes quiet.
//! The [`Scheduler`] trait hides where those timers come from:
//!
//! - [`ManualScheduler`] -- a virtual clock that only moves when
//!   [`ManualScheduler::advance`] is called. Deterministic; used by tests
//!   and the simulated run mode.
//! - [`TokioScheduler`] -- one `tokio::time::interval` task per timer.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Identifies one registered periodic timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(u64);

impl std::fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Callback run on every period. Receives the handle it was registered
/// under so the owner can discard callbacks from a stale timer.
pub type TimerCallback = Arc<dyn Fn(TimerHandle) + Send + Sync>;

/// Errors raised when registering a timer.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A zero period would fire continuously.
    #[error("timer period must be greater than zero")]
    ZeroPeriod,

    /// The tokio scheduler was created outside a runtime.
    #[error("no tokio runtime available: {source}")]
    NoRuntime {
        /// The underlying runtime lookup error.
        #[from]
        source: TryCurrentError,
    },
}

/// Source of periodic callbacks.
pub trait Scheduler: Send + Sync {
    /// Register `callback` to run every `period`, first after one period.
    fn schedule_periodic(
        &self,
        period: Duration,
        callback: TimerCallback,
    ) -> Result<TimerHandle, SchedulerError>;

    /// Cancel a timer. Returns `false` if it was not registered.
    fn cancel(&self, handle: TimerHandle) -> bool;

    /// Whether `handle` is still registered.
    fn is_scheduled(&self, handle: TimerHandle) -> bool;
}

// ---------------------------------------------------------------------------
// Manual (virtual clock)
// ---------------------------------------------------------------------------

struct ManualTimer {
    period: Duration,
    next_fire: Duration,
    callback: TimerCallback,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<TimerHandle, ManualTimer>,
}

/// Scheduler driven by an explicit virtual clock.
///
/// Callbacks run on the caller's thread from inside [`advance`], with the
/// scheduler lock released, so they are free to cancel or register timers.
///
/// [`advance`]: ManualScheduler::advance
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    /// Create a scheduler with its clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of registered timers.
    pub fn active_timers(&self) -> usize {
        self.lock().timers.len()
    }

    /// Move the clock forward by `dt`, firing every timer that falls due in
    /// chronological order. Returns the number of callbacks run.
    pub fn advance(&self, dt: Duration) -> usize {
        let target = self.lock().now.saturating_add(dt);
        let mut fired = 0_usize;

        loop {
            let (handle, callback) = {
                let mut state = self.lock();
                let due = state
                    .timers
                    .iter_mut()
                    .filter(|(_, timer)| timer.next_fire <= target)
                    .min_by_key(|(handle, timer)| (timer.next_fire, **handle));
                let Some((handle, timer)) = due else {
                    state.now = target;
                    break;
                };
                let handle = *handle;
                let fire_at = timer.next_fire;
                timer.next_fire = fire_at.saturating_add(timer.period);
                let callback = Arc::clone(&timer.callback);
                state.now = fire_at;
                (handle, callback)
            };

            trace!(timer = %handle, "Manual timer fired");
            callback(handle);
            fired = fired.saturating_add(1);
        }

        fired
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_periodic(
        &self,
        period: Duration,
        callback: TimerCallback,
    ) -> Result<TimerHandle, SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }
        let mut state = self.lock();
        let handle = TimerHandle(state.next_id);
        state.next_id = state.next_id.saturating_add(1);
        let next_fire = state.now.saturating_add(period);
        state.timers.insert(
            handle,
            ManualTimer {
                period,
                next_fire,
                callback,
            },
        );
        debug!(timer = %handle, ?period, "Manual timer registered");
        Ok(handle)
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        let removed = self.lock().timers.remove(&handle).is_some();
        if removed {
            debug!(timer = %handle, "Manual timer cancelled");
        }
        removed
    }

    fn is_scheduled(&self, handle: TimerHandle) -> bool {
        self.lock().timers.contains_key(&handle)
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("timers", &state.timers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tokio (real time)
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TokioState {
    next_id: u64,
    tasks: BTreeMap<TimerHandle, JoinHandle<()>>,
}

/// Scheduler backed by tokio timers. Each registered timer is a task
/// looping over an interval; cancelling aborts the task.
pub struct TokioScheduler {
    runtime: Handle,
    state: Mutex<TokioState>,
}

impl TokioScheduler {
    /// Create a scheduler that spawns onto `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            state: Mutex::new(TokioState::default()),
        }
    }

    /// Create a scheduler on the runtime of the calling context.
    pub fn current() -> Result<Self, SchedulerError> {
        Ok(Self::new(Handle::try_current()?))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TokioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_periodic(
        &self,
        period: Duration,
        callback: TimerCallback,
    ) -> Result<TimerHandle, SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }
        let mut state = self.lock();
        let handle = TimerHandle(state.next_id);
        state.next_id = state.next_id.saturating_add(1);

        let start = Instant::now() + period;
        let task = self.runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                callback(handle);
            }
        });
        state.tasks.insert(handle, task);
        debug!(timer = %handle, ?period, "Tokio timer registered");
        Ok(handle)
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        let task = self.lock().tasks.remove(&handle);
        task.is_some_and(|task| {
            task.abort();
            debug!(timer = %handle, "Tokio timer cancelled");
            true
        })
    }

    fn is_scheduled(&self, handle: TimerHandle) -> bool {
        self.lock()
            .tasks
            .get(&handle)
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for task in self.lock().tasks.values() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("timers", &self.lock().tasks.len())
            .finish_non_exhaustive()
    }
}
