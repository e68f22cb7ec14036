//! Thread-safe handle around a [`StealthEngine`].
//!
//! A [`StealthAgent`] owns one engine behind a mutex and carries out the
//! effects each engine operation reports:
//!
//! - registers or cancels the periodic update with the [`Scheduler`],
//! - hands changed snapshots to subscribed observers,
//! - fans an "enemy spotted" alarm out through the [`SquadDirectory`].
//!
//! Observers and squad delivery always run after the agent lock has been
//! released. Snapshots are queued in engine order while the agent is still
//! locked, and a single thread at a time drains the queue, so observers see
//! changes in the order the engine made them even when a timer tick and a
//! stimulus race on different threads. Lock order is agent, then scheduler
//! or outbox; the directory lock is never held while an agent is locked.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, error, info, trace, warn};
use vigil_types::{
    ActorId, SquadId, SquadMessage, StealthState, StealthStateData, StimulusRecord, SyncPayload,
    Vec3,
};

use crate::config::TuningConfig;
use crate::engine::{EngineEffects, EngineError, StealthEngine, UPDATE_PERIOD, UpdateDirective};
use crate::observers::{StateObservers, SubscriptionToken, publish};
use crate::scheduler::{Scheduler, TimerCallback, TimerHandle};
use crate::sink::OutputSink;
use crate::squad::{SquadDirectory, SquadMember, SquadTuning};
use crate::world::ActorQuery;

struct AgentCell {
    engine: StealthEngine,
    timer: Option<TimerHandle>,
}

/// Snapshots waiting to be handed to observers.
#[derive(Default)]
struct Outbox {
    pending: VecDeque<StealthStateData>,
    draining: bool,
}

struct AgentShared {
    id: ActorId,
    self_ref: Weak<Self>,
    cell: Mutex<AgentCell>,
    scheduler: Arc<dyn Scheduler>,
    directory: Option<Arc<SquadDirectory>>,
    squad: Mutex<Option<SquadId>>,
    observers: Mutex<StateObservers>,
    outbox: Mutex<Outbox>,
}

/// A guard's stealth engine wired to its scheduler, observers and squad.
///
/// Dropping the agent cancels its timer and removes it from its squad.
pub struct StealthAgent {
    shared: Arc<AgentShared>,
}

impl StealthAgent {
    /// Create an agent for the guard `id`. The engine is inert until
    /// [`init`](Self::init) is called.
    pub fn new(
        id: ActorId,
        world: Arc<dyn ActorQuery>,
        scheduler: Arc<dyn Scheduler>,
        directory: Option<Arc<SquadDirectory>>,
    ) -> Self {
        let shared = Arc::new_cyclic(|self_ref| AgentShared {
            id,
            self_ref: self_ref.clone(),
            cell: Mutex::new(AgentCell {
                engine: StealthEngine::new(id, world),
                timer: None,
            }),
            scheduler,
            directory,
            squad: Mutex::new(None),
            observers: Mutex::new(StateObservers::new()),
            outbox: Mutex::new(Outbox::default()),
        });
        Self { shared }
    }

    /// The guard's actor id.
    pub fn id(&self) -> ActorId {
        self.shared.id
    }

    /// Bind tuning and sink. See [`StealthEngine::init`].
    pub fn init(
        &self,
        tuning: Option<TuningConfig>,
        sink: Option<Arc<dyn OutputSink>>,
    ) -> Result<(), EngineError> {
        let mut outcome = Ok(());
        let scheduled = self.shared.run(|engine| {
            engine.init(tuning, sink).unwrap_or_else(|err| {
                outcome = Err(err);
                EngineEffects::default()
            })
        });
        outcome.and(scheduled)
    }

    // -----------------------------------------------------------------------
    // Stimuli
    // -----------------------------------------------------------------------

    /// Forward a perception record to the engine.
    pub fn handle_stimulus(&self, record: StimulusRecord) -> Result<(), EngineError> {
        self.shared.run(|engine| engine.handle_stimulus(record))
    }

    /// Visual contact with `source` was gained or lost.
    pub fn handle_sight(
        &self,
        source: ActorId,
        sensed: bool,
        location: Vec3,
    ) -> Result<(), EngineError> {
        self.shared
            .run(|engine| engine.handle_sight(source, sensed, location))
    }

    /// A noise was heard.
    pub fn handle_hearing(
        &self,
        source: ActorId,
        strength: f32,
        location: Vec3,
    ) -> Result<(), EngineError> {
        self.shared
            .run(|engine| engine.handle_hearing(source, strength, location))
    }

    /// A squad mate raised the alarm.
    pub fn handle_squad(
        &self,
        target: Option<ActorId>,
        location: Vec3,
        amount: f32,
    ) -> Result<(), EngineError> {
        self.shared
            .run(|engine| engine.handle_squad(target, location, amount))
    }

    /// The decision layer finished its search.
    pub fn complete_search(&self) -> Result<(), EngineError> {
        self.shared.run(StealthEngine::complete_search)
    }

    /// Cancel updates and return to Idle/0. Ticks already in flight are
    /// discarded.
    pub fn reset(&self) {
        self.shared.reset();
    }

    /// Reset and leave the squad. Used when the guard is removed from play.
    pub fn despawn(&self) {
        self.shared.reset();
        self.shared.leave_squad();
        info!(agent = %self.shared.id, "Agent despawned");
    }

    // -----------------------------------------------------------------------
    // Squad
    // -----------------------------------------------------------------------

    /// Move the agent to `squad`, leaving its previous squad first.
    ///
    /// Returns `false` without a directory or when already a member.
    pub fn join_squad(&self, squad: SquadId) -> bool {
        let Some(directory) = &self.shared.directory else {
            warn!(agent = %self.shared.id, squad = %squad, "No squad directory, cannot join");
            return false;
        };
        let previous = self.shared.lock_squad().replace(squad);
        if let Some(previous) = previous
            && previous != squad
        {
            directory.unregister_member(previous, self.shared.id);
        }
        directory.register_member(squad, &self.shared)
    }

    /// Leave the current squad, returning it.
    pub fn leave_squad(&self) -> Option<SquadId> {
        self.shared.leave_squad()
    }

    /// The squad the agent belongs to.
    pub fn squad(&self) -> Option<SquadId> {
        *self.shared.lock_squad()
    }

    // -----------------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------------

    /// Call `callback` with the new snapshot whenever the state or alert
    /// value changes.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionToken
    where
        F: Fn(&StealthStateData) + Send + Sync + 'static,
    {
        self.shared.lock_observers().subscribe(Arc::new(callback))
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.shared.lock_observers().unsubscribe(token)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Run `query` against the engine under the agent lock.
    pub fn with_engine<R>(&self, query: impl FnOnce(&StealthEngine) -> R) -> R {
        query(&self.shared.lock_cell().engine)
    }

    /// Current alert value.
    pub fn alert_value(&self) -> f32 {
        self.with_engine(StealthEngine::alert_value)
    }

    /// Current stealth state.
    pub fn state(&self) -> StealthState {
        self.with_engine(StealthEngine::state)
    }

    /// Whether the target is in view.
    pub fn has_line_of_sight(&self) -> bool {
        self.with_engine(StealthEngine::has_line_of_sight)
    }

    /// Current target.
    pub fn target(&self) -> Option<ActorId> {
        self.with_engine(StealthEngine::target)
    }

    /// Last confirmed target position.
    pub fn last_known_position(&self) -> Option<Vec3> {
        self.with_engine(StealthEngine::last_known_position)
    }

    /// Whether a completed search lets the alert decay from the maximum.
    pub fn is_cooling_down(&self) -> bool {
        self.with_engine(StealthEngine::is_cooling_down)
    }

    /// Seconds since the last positive stimulus.
    pub fn time_since_last_stimulus(&self) -> f32 {
        self.with_engine(StealthEngine::time_since_last_stimulus)
    }

    /// Snapshot for observers and UI.
    pub fn current_state_data(&self) -> StealthStateData {
        self.with_engine(StealthEngine::current_state_data)
    }

    /// Replicated subset of the snapshot.
    pub fn sync_payload(&self) -> SyncPayload {
        self.with_engine(StealthEngine::sync_payload)
    }

    /// Alert gain per second from seeing `target` right now.
    pub fn sight_gain(&self, target: ActorId) -> f32 {
        self.with_engine(|engine| engine.sight_gain(target))
    }

    /// Whether a periodic update is registered.
    pub fn is_updating(&self) -> bool {
        let cell = self.shared.lock_cell();
        cell.timer
            .is_some_and(|handle| self.shared.scheduler.is_scheduled(handle))
    }
}

impl Drop for StealthAgent {
    fn drop(&mut self) {
        self.shared.cancel_timer();
        self.shared.leave_squad();
    }
}

impl std::fmt::Debug for StealthAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StealthAgent")
            .field("id", &self.shared.id)
            .field("squad", &*self.shared.lock_squad())
            .finish_non_exhaustive()
    }
}

impl AgentShared {
    /// Apply one engine operation and carry out its effects.
    fn run<F>(&self, op: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut StealthEngine) -> EngineEffects,
    {
        let (effects, scheduled) = {
            let mut cell = self.lock_cell();
            let mut effects = op(&mut cell.engine);
            let scheduled = self.apply_directive(&mut cell, effects.updates);
            self.enqueue(&mut effects);
            (effects, scheduled)
        };
        self.dispatch(effects);
        scheduled
    }

    fn run_scheduled_tick(&self, handle: TimerHandle) {
        let effects = {
            let mut cell = self.lock_cell();
            if cell.timer != Some(handle) {
                trace!(agent = %self.id, timer = %handle, "Stale tick discarded");
                return;
            }
            let mut effects = cell.engine.tick();
            if let Err(err) = self.apply_directive(&mut cell, effects.updates) {
                error!(agent = %self.id, error = %err, "Failed to update stealth timer");
            }
            self.enqueue(&mut effects);
            effects
        };
        self.dispatch(effects);
    }

    fn reset(&self) {
        let effects = {
            let mut cell = self.lock_cell();
            if let Some(handle) = cell.timer.take() {
                self.scheduler.cancel(handle);
            }
            let mut effects = cell.engine.reset();
            self.enqueue(&mut effects);
            effects
        };
        self.dispatch(effects);
    }

    fn apply_directive(
        &self,
        cell: &mut AgentCell,
        directive: UpdateDirective,
    ) -> Result<(), EngineError> {
        match directive {
            UpdateDirective::Unchanged => Ok(()),
            UpdateDirective::Start => {
                if cell
                    .timer
                    .is_some_and(|handle| self.scheduler.is_scheduled(handle))
                {
                    return Ok(());
                }
                let weak = self.self_ref.clone();
                let callback: TimerCallback = Arc::new(move |handle| {
                    if let Some(shared) = weak.upgrade() {
                        shared.run_scheduled_tick(handle);
                    }
                });
                match self.scheduler.schedule_periodic(UPDATE_PERIOD, callback) {
                    Ok(handle) => {
                        debug!(agent = %self.id, timer = %handle, "Stealth updates started");
                        cell.timer = Some(handle);
                        Ok(())
                    }
                    Err(source) => {
                        error!(agent = %self.id, error = %source, "Failed to start stealth updates");
                        cell.engine.updates_stopped();
                        Err(source.into())
                    }
                }
            }
            UpdateDirective::Stop => {
                if let Some(handle) = cell.timer.take() {
                    self.scheduler.cancel(handle);
                    debug!(agent = %self.id, timer = %handle, "Stealth updates stopped");
                }
                Ok(())
            }
        }
    }

    /// Queue the snapshot of `effects` for observers. Must be called with
    /// the agent lock held so the queue follows engine order.
    fn enqueue(&self, effects: &mut EngineEffects) {
        if let Some(data) = effects.published.take() {
            self.lock_outbox().pending.push_back(data);
        }
    }

    /// Notify observers and the squad. Must be called without the agent
    /// lock held.
    fn dispatch(&self, effects: EngineEffects) {
        self.drain_outbox();
        if let Some(message) = effects.squad_alert {
            self.broadcast(&message);
        }
    }

    /// Publish queued snapshots in order. If another thread (or an observer
    /// further up this stack) is already draining, it delivers ours too.
    fn drain_outbox(&self) {
        {
            let mut outbox = self.lock_outbox();
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }
        let mut guard = DrainGuard {
            shared: self,
            armed: true,
        };
        loop {
            let data = {
                let mut outbox = self.lock_outbox();
                let Some(data) = outbox.pending.pop_front() else {
                    // Same lock that saw the queue empty.
                    outbox.draining = false;
                    guard.armed = false;
                    return;
                };
                data
            };
            let callbacks = self.lock_observers().snapshot();
            publish(&callbacks, &data);
        }
    }

    fn broadcast(&self, message: &SquadMessage) {
        let squad = *self.lock_squad();
        match (&self.directory, squad) {
            (Some(directory), Some(squad)) => {
                directory.broadcast_message(squad, message);
            }
            _ => debug!(agent = %self.id, "Not in a squad, alarm not shared"),
        }
    }

    fn cancel_timer(&self) {
        let mut cell = self.lock_cell();
        if let Some(handle) = cell.timer.take() {
            self.scheduler.cancel(handle);
        }
        cell.engine.updates_stopped();
    }

    fn leave_squad(&self) -> Option<SquadId> {
        let squad = self.lock_squad().take()?;
        if let Some(directory) = &self.directory {
            directory.unregister_member(squad, self.id);
        }
        Some(squad)
    }

    fn lock_cell(&self) -> MutexGuard<'_, AgentCell> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_squad(&self) -> MutexGuard<'_, Option<SquadId>> {
        self.squad.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_observers(&self) -> MutexGuard<'_, StateObservers> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_outbox(&self) -> MutexGuard<'_, Outbox> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the draining flag if an observer panics mid-drain.
struct DrainGuard<'a> {
    shared: &'a AgentShared,
    armed: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.lock_outbox().draining = false;
        }
    }
}

impl SquadMember for AgentShared {
    fn member_id(&self) -> ActorId {
        self.id
    }

    fn alert_value(&self) -> f32 {
        self.lock_cell().engine.alert_value()
    }

    fn squad_tuning(&self) -> Option<SquadTuning> {
        self.lock_cell().engine.tuning().map(|tuning| SquadTuning {
            alert_add: tuning.squad_alert_add,
            instant_radius: tuning.squad_instant_alert_radius,
        })
    }

    fn handle_squad_stimulus(&self, target: Option<ActorId>, location: Vec3, amount: f32) {
        if let Err(err) = self.run(|engine| engine.handle_squad(target, location, amount)) {
            error!(agent = %self.id, error = %err, "Squad stimulus not applied");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::scheduler::ManualScheduler;
    use crate::sink::Blackboard;
    use crate::world::ActorRegistry;

    struct Rig {
        world: Arc<ActorRegistry>,
        scheduler: Arc<ManualScheduler>,
        directory: Arc<SquadDirectory>,
    }

    fn rig() -> Rig {
        let world = Arc::new(ActorRegistry::new());
        let directory = Arc::new(SquadDirectory::new(world.clone()));
        Rig {
            world,
            scheduler: Arc::new(ManualScheduler::new()),
            directory,
        }
    }

    /// An initialised guard with default tuning at `location`.
    fn guard(rig: &Rig, location: Vec3) -> StealthAgent {
        let id = rig.world.spawn(location);
        let agent = StealthAgent::new(
            id,
            rig.world.clone(),
            rig.scheduler.clone(),
            Some(Arc::clone(&rig.directory)),
        );
        agent
            .init(
                Some(TuningConfig::default()),
                Some(Arc::new(Blackboard::new())),
            )
            .unwrap();
        agent
    }

    #[test]
    fn hearing_starts_the_timer() {
        let rig = rig();
        let agent = guard(&rig, Vec3::ZERO);
        assert!(!agent.is_updating());

        let noisy = rig.world.spawn(Vec3::new(300.0, 0.0, 0.0));
        agent.handle_hearing(noisy, 1.0, Vec3::ZERO).unwrap();
        assert!(agent.is_updating());
        assert_eq!(rig.scheduler.active_timers(), 1);

        // A second stimulus does not register another timer.
        agent.handle_hearing(noisy, 1.0, Vec3::ZERO).unwrap();
        assert_eq!(rig.scheduler.active_timers(), 1);
    }

    #[test]
    fn timer_stops_once_alert_drains() {
        let rig = rig();
        let agent = guard(&rig, Vec3::ZERO);
        let noisy = rig.world.spawn(Vec3::ZERO);
        agent.handle_hearing(noisy, 0.2, Vec3::ZERO).unwrap();
        assert!((agent.alert_value() - 5.0).abs() < 1e-3);

        // Two seconds of grace, then one second of decay at 5/s.
        rig.scheduler.advance(Duration::from_secs(4));
        assert!(agent.alert_value().abs() < f32::EPSILON);
        assert!(!agent.is_updating());
        assert_eq!(rig.scheduler.active_timers(), 0);
    }

    #[test]
    fn reset_discards_in_flight_tick() {
        let rig = rig();
        let agent = guard(&rig, Vec3::ZERO);
        let intruder = rig.world.spawn(Vec3::new(100.0, 0.0, 0.0));
        agent
            .handle_sight(intruder, true, Vec3::new(100.0, 0.0, 0.0))
            .unwrap();
        let stale = agent.shared.lock_cell().timer.unwrap();

        agent.reset();
        assert!(!agent.is_updating());
        assert!(!rig.scheduler.is_scheduled(stale));

        // A tick that was already dispatched before the reset lands late.
        agent.shared.run_scheduled_tick(stale);
        assert!(agent.alert_value().abs() < f32::EPSILON);
        assert_eq!(agent.state(), StealthState::Idle);
    }

    #[test]
    fn observers_see_changes() {
        let rig = rig();
        let agent = guard(&rig, Vec3::ZERO);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let token = agent.subscribe(move |data| sink.lock().unwrap().push(data.state));

        let noisy = rig.world.spawn(Vec3::ZERO);
        agent.handle_hearing(noisy, 1.0, Vec3::ZERO).unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), &[StealthState::Suspicious]);

        assert!(agent.unsubscribe(token));
        agent.handle_hearing(noisy, 1.0, Vec3::ZERO).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn racing_publications_arrive_in_engine_order() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::mpsc;

        let rig = rig();
        let agent = Arc::new(guard(&rig, Vec3::ZERO));

        // The first observer holds the first publication until the main
        // thread's own change has been applied and returned.
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);
        let first_call = AtomicBool::new(true);
        agent.subscribe(move |_| {
            if first_call.swap(false, Ordering::SeqCst) {
                entered_tx.lock().unwrap().send(()).unwrap();
                release_rx.lock().unwrap().recv().unwrap();
            }
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        agent.subscribe(move |data| sink.lock().unwrap().push(data.alert_value));

        let background = {
            let agent = Arc::clone(&agent);
            std::thread::spawn(move || agent.handle_squad(None, Vec3::ZERO, 10.0).unwrap())
        };
        entered_rx.recv().unwrap();
        agent.handle_squad(None, Vec3::ZERO, 20.0).unwrap();
        release_tx.send(()).unwrap();
        background.join().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.first().is_some_and(|v| (v - 10.0).abs() < 1e-3));
        assert!(seen.last().is_some_and(|v| (v - agent.alert_value()).abs() < 1e-3));
        assert!((agent.alert_value() - 30.0).abs() < 1e-3);
    }

    #[test]
    fn observer_may_drive_its_own_agent() {
        let rig = rig();
        let agent = Arc::new(guard(&rig, Vec3::ZERO));
        let handle = Arc::downgrade(&agent);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        agent.subscribe(move |data| {
            sink.lock().unwrap().push(data.alert_value);
            if data.alert_value < 15.0
                && let Some(agent) = handle.upgrade()
            {
                agent.handle_squad(None, Vec3::ZERO, 20.0).unwrap();
            }
        });

        agent.handle_squad(None, Vec3::ZERO, 10.0).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.last().is_some_and(|v| (v - 30.0).abs() < 1e-3));
    }

    #[test]
    fn join_squad_moves_between_squads() {
        let rig = rig();
        let agent = guard(&rig, Vec3::ZERO);
        assert!(agent.join_squad(SquadId(1)));
        assert!(!agent.join_squad(SquadId(1)));
        assert!(agent.join_squad(SquadId(2)));
        assert!(!rig.directory.squad_exists(SquadId(1)));
        assert_eq!(rig.directory.members(SquadId(2)), vec![agent.id()]);
        assert_eq!(agent.leave_squad(), Some(SquadId(2)));
        assert_eq!(agent.squad(), None);
    }

    #[test]
    fn drop_leaves_squad_and_cancels_timer() {
        let rig = rig();
        let agent = guard(&rig, Vec3::ZERO);
        agent.join_squad(SquadId(3));
        let noisy = rig.world.spawn(Vec3::ZERO);
        agent.handle_hearing(noisy, 1.0, Vec3::ZERO).unwrap();
        assert_eq!(rig.scheduler.active_timers(), 1);

        drop(agent);
        assert_eq!(rig.scheduler.active_timers(), 0);
        assert!(!rig.directory.squad_exists(SquadId(3)));
    }

    #[test]
    fn despawn_resets_and_leaves() {
        let rig = rig();
        let agent = guard(&rig, Vec3::ZERO);
        agent.join_squad(SquadId(4));
        let noisy = rig.world.spawn(Vec3::ZERO);
        agent.handle_hearing(noisy, 1.0, Vec3::ZERO).unwrap();

        agent.despawn();
        assert!(agent.alert_value().abs() < f32::EPSILON);
        assert!(!agent.is_updating());
        assert_eq!(agent.squad(), None);
        assert!(!rig.directory.squad_exists(SquadId(4)));
    }

    #[test]
    fn alarm_reaches_squad_mates() {
        let rig = rig();
        let spotter = guard(&rig, Vec3::ZERO);
        let mate = guard(&rig, Vec3::new(1000.0, 0.0, 0.0));
        spotter.join_squad(SquadId(5));
        mate.join_squad(SquadId(5));

        let intruder = rig.world.spawn(Vec3::new(100.0, 0.0, 0.0));
        spotter
            .handle_sight(intruder, true, Vec3::new(100.0, 0.0, 0.0))
            .unwrap();
        rig.scheduler.advance(Duration::from_millis(100));

        assert_eq!(spotter.state(), StealthState::Alerted);
        assert!((mate.alert_value() - 50.0).abs() < 1e-3);
        assert_eq!(mate.target(), Some(intruder));
        assert!(mate.is_updating());
    }

    #[test]
    fn inert_agent_ignores_stimuli() {
        let rig = rig();
        let id = rig.world.spawn(Vec3::ZERO);
        let agent = StealthAgent::new(id, rig.world.clone(), rig.scheduler.clone(), None);
        assert!(agent.init(None, None).is_err());

        let noisy = rig.world.spawn(Vec3::ZERO);
        agent.handle_hearing(noisy, 1.0, Vec3::ZERO).unwrap();
        assert!(agent.alert_value().abs() < f32::EPSILON);
        assert!(!agent.is_updating());
        assert!(!agent.join_squad(SquadId(1)));
    }
}
