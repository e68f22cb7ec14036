//! Per-guard stealth state machine.
//!
//! A [`StealthEngine`] turns stimuli into a bounded alert value and a
//! [`StealthState`]. It is a plain state machine: it never locks, never
//! schedules and never calls other guards. Every operation returns an
//! [`EngineEffects`] value describing what the owner has to do next
//! (start or stop periodic updates, broadcast to the squad, notify
//! observers). [`StealthAgent`] is the owner that carries those effects out.
//!
//! # Update loop
//!
//! While active, [`StealthEngine::tick`] runs every [`UPDATE_PERIOD`]:
//!
//! 1. Sight gain from the falloff curve (zero without line of sight).
//! 2. Gain resets the quiet timer, otherwise it accumulates.
//! 3. Decay once the grace time has passed, unless pinned at the maximum
//!    without a completed search.
//! 4. Instant discovery inside the discovery radius.
//! 5. A dead target zeroes everything.
//! 6. Clamp, then derive the new state.
//!
//! [`StealthAgent`]: crate::agent::StealthAgent

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, trace};
use vigil_types::{
    ActorId, MAX_ALERT_VALUE, SquadMessage, StealthState, StealthStateData, StimulusKind,
    StimulusRecord, SyncPayload, Vec3,
};

use crate::config::TuningConfig;
use crate::falloff::{GAIN_EPSILON, lerp, map_range_clamped, nearly_equal};
use crate::scheduler::SchedulerError;
use crate::sink::OutputSink;
use crate::world::ActorQuery;

/// Interval between two updates of an active engine.
pub const UPDATE_PERIOD: Duration = Duration::from_millis(100);

/// [`UPDATE_PERIOD`] in seconds.
pub const UPDATE_PERIOD_SECS: f32 = 0.1;

/// Absorbs the rounding of the accumulated quiet time.
const GRACE_SLACK: f32 = 1e-3;

/// Errors reported by the stealth engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Initialised without a tuning profile; the engine stays inert.
    #[error("stealth engine for {agent} has no tuning configuration")]
    MissingTuning {
        /// The guard owning the engine.
        agent: ActorId,
    },

    /// Initialised without an output sink; the engine stays inert.
    #[error("stealth engine for {agent} has no output sink")]
    MissingSink {
        /// The guard owning the engine.
        agent: ActorId,
    },

    /// The periodic update could not be registered.
    #[error("failed to schedule stealth updates: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: SchedulerError,
    },
}

/// What the owner should do with the periodic update after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateDirective {
    /// Leave the timer as it is.
    #[default]
    Unchanged,
    /// Register the periodic update.
    Start,
    /// Cancel the periodic update.
    Stop,
}

/// Side effects produced by one engine operation.
#[must_use]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineEffects {
    /// Timer change requested by the engine.
    pub updates: UpdateDirective,
    /// Message to fan out to the squad (entering Alerted).
    pub squad_alert: Option<SquadMessage>,
    /// Snapshot to hand to observers when the state or value changed.
    pub published: Option<StealthStateData>,
}

struct Bindings {
    tuning: Arc<TuningConfig>,
    sink: Arc<dyn OutputSink>,
}

/// Alert accumulation, decay and state derivation for one guard.
pub struct StealthEngine {
    owner: ActorId,
    world: Arc<dyn ActorQuery>,
    bindings: Option<Bindings>,
    alert_value: f32,
    state: StealthState,
    time_since_last_stimulus: f32,
    cooling_down: bool,
    has_line_of_sight: bool,
    target: Option<ActorId>,
    last_known_position: Option<Vec3>,
    updating: bool,
}

impl StealthEngine {
    /// Create an uninitialised engine for the guard `owner`.
    ///
    /// Until [`init`](Self::init) succeeds every stimulus is ignored.
    pub fn new(owner: ActorId, world: Arc<dyn ActorQuery>) -> Self {
        Self {
            owner,
            world,
            bindings: None,
            alert_value: 0.0,
            state: StealthState::Idle,
            time_since_last_stimulus: 0.0,
            cooling_down: false,
            has_line_of_sight: false,
            target: None,
            last_known_position: None,
            updating: false,
        }
    }

    /// Bind tuning and sink, zero the state and push Idle/0 to the sink.
    ///
    /// With either binding missing the engine stays inert, an error is
    /// logged and returned; callers are free to ignore it.
    pub fn init(
        &mut self,
        tuning: Option<TuningConfig>,
        sink: Option<Arc<dyn OutputSink>>,
    ) -> Result<EngineEffects, EngineError> {
        let (tuning, sink) = match (tuning, sink) {
            (Some(tuning), Some(sink)) => (tuning, sink),
            (None, _) => {
                error!(agent = %self.owner, "Stealth engine has no tuning, staying inert");
                self.bindings = None;
                return Err(EngineError::MissingTuning { agent: self.owner });
            }
            (Some(_), None) => {
                error!(agent = %self.owner, "Stealth engine has no output sink, staying inert");
                self.bindings = None;
                return Err(EngineError::MissingSink { agent: self.owner });
            }
        };

        let mut effects = EngineEffects::default();
        self.stop_updates(&mut effects);
        self.clear_context();
        self.bindings = Some(Bindings {
            tuning: Arc::new(tuning.sanitized()),
            sink,
        });
        self.push_cleared();
        effects.published = Some(self.current_state_data());

        info!(agent = %self.owner, "Stealth engine initialised");
        Ok(effects)
    }

    // -----------------------------------------------------------------------
    // Stimuli
    // -----------------------------------------------------------------------

    /// Route a perception record to the matching handler.
    ///
    /// Hearing and squad records that were not sensed are dropped.
    pub fn handle_stimulus(&mut self, record: StimulusRecord) -> EngineEffects {
        match record.kind {
            StimulusKind::Sight => {
                self.handle_sight(record.source, record.sensed, record.location)
            }
            StimulusKind::Hearing if record.sensed => {
                self.handle_hearing(record.source, record.strength, record.location)
            }
            StimulusKind::Squad if record.sensed => {
                self.handle_squad(Some(record.source), record.location, record.strength)
            }
            StimulusKind::Hearing | StimulusKind::Squad => {
                debug!(agent = %self.owner, kind = ?record.kind, "Unsensed stimulus ignored");
                EngineEffects::default()
            }
        }
    }

    /// Visual contact with `source` was gained (`sensed`) or lost.
    pub fn handle_sight(&mut self, source: ActorId, sensed: bool, location: Vec3) -> EngineEffects {
        let mut effects = EngineEffects::default();
        let Some((_, sink)) = self.bound() else {
            trace!(agent = %self.owner, "Sight ignored by inert engine");
            return effects;
        };

        self.has_line_of_sight = sensed;
        sink.set_line_of_sight(sensed);
        sink.set_stimulus_location(Some(location));

        if sensed {
            self.target = Some(source);
            sink.set_target(Some(source));
            self.cooling_down = false;
        }
        debug!(agent = %self.owner, source = %source, sensed, "Sight stimulus");

        if sensed || self.alert_value > 0.0 {
            self.start_updates(&mut effects);
        } else if self.state != StealthState::Idle {
            self.stop_updates(&mut effects);
        }
        effects
    }

    /// A noise made by `source` was heard at `location`.
    pub fn handle_hearing(
        &mut self,
        source: ActorId,
        strength: f32,
        location: Vec3,
    ) -> EngineEffects {
        let mut effects = EngineEffects::default();
        let Some((tuning, sink)) = self.bound() else {
            trace!(agent = %self.owner, "Hearing ignored by inert engine");
            return effects;
        };

        let added = tuning.hearing_alert_add * strength.max(0.0);
        self.target = Some(source);
        sink.set_target(Some(source));
        sink.set_stimulus_location(Some(location));
        self.time_since_last_stimulus = 0.0;
        debug!(agent = %self.owner, source = %source, added, "Hearing stimulus");

        self.evaluate_transition(self.alert_value + added, &tuning, &sink, &mut effects);
        self.start_updates(&mut effects);
        effects
    }

    /// A squad mate raised the alarm about `target` at `location`.
    ///
    /// The target is only adopted if it still exists.
    pub fn handle_squad(
        &mut self,
        target: Option<ActorId>,
        location: Vec3,
        amount: f32,
    ) -> EngineEffects {
        let mut effects = EngineEffects::default();
        let Some((tuning, sink)) = self.bound() else {
            trace!(agent = %self.owner, "Squad alert ignored by inert engine");
            return effects;
        };

        let amount = clamp_alert(amount);
        if let Some(target) = target.filter(|t| self.world.location(*t).is_some()) {
            self.target = Some(target);
            sink.set_target(Some(target));
        }
        sink.set_stimulus_location(Some(location));
        self.time_since_last_stimulus = 0.0;
        debug!(agent = %self.owner, amount, "Squad stimulus");

        self.evaluate_transition(self.alert_value + amount, &tuning, &sink, &mut effects);
        self.start_updates(&mut effects);
        effects
    }

    // -----------------------------------------------------------------------
    // Update loop
    // -----------------------------------------------------------------------

    /// Advance the engine by one [`UPDATE_PERIOD`].
    pub fn tick(&mut self) -> EngineEffects {
        let mut effects = EngineEffects::default();
        let Some((tuning, sink)) = self.bound() else {
            self.stop_updates(&mut effects);
            return effects;
        };

        if let Some(target) = self.target
            && self.world.location(target).is_none()
        {
            debug!(agent = %self.owner, target = %target, "Target no longer exists");
            self.target = None;
            self.has_line_of_sight = false;
            sink.clear_target();
            sink.set_line_of_sight(false);
        }

        let gain = match self.target {
            Some(target) if self.has_line_of_sight => self.gain_for(&tuning, target),
            _ => 0.0,
        };

        let quiet_before = self.time_since_last_stimulus;
        if gain > GAIN_EPSILON {
            self.time_since_last_stimulus = 0.0;
        } else {
            self.time_since_last_stimulus += UPDATE_PERIOD_SECS;
        }

        let may_decay = self.alert_value < MAX_ALERT_VALUE || self.cooling_down;
        let decay = if gain <= GAIN_EPSILON
            && may_decay
            && quiet_before + GRACE_SLACK >= tuning.grace_time
        {
            tuning.decrease_rate
        } else {
            0.0
        };

        let mut new_value = (gain - decay).mul_add(UPDATE_PERIOD_SECS, self.alert_value);

        if gain > GAIN_EPSILON
            && let Some(distance_sq) = self.target.and_then(|t| self.distance_squared_to(t))
        {
            let radius = tuning.instant_discovery_radius;
            if distance_sq < radius * radius {
                debug!(agent = %self.owner, "Instant discovery");
                new_value = MAX_ALERT_VALUE;
            }
        }

        if let Some(target) = self.target
            && self.world.is_dead(target)
        {
            info!(agent = %self.owner, target = %target, "Target is dead, standing down");
            self.target = None;
            self.last_known_position = None;
            self.has_line_of_sight = false;
            sink.clear_target();
            sink.clear_last_known_position();
            sink.set_line_of_sight(false);
            new_value = 0.0;
        }

        let new_value = clamp_alert(new_value);
        if new_value <= 0.0 && self.cooling_down {
            self.cooling_down = false;
        }
        trace!(agent = %self.owner, gain, decay, alert = new_value, "Tick");

        self.evaluate_transition(new_value, &tuning, &sink, &mut effects);

        if !self.has_line_of_sight && self.alert_value <= 0.0 {
            self.stop_updates(&mut effects);
        }
        effects
    }

    /// The decision layer finished searching. Allows a maxed-out alert to
    /// decay and forgets the target. Never raises the alert.
    pub fn complete_search(&mut self) -> EngineEffects {
        let mut effects = EngineEffects::default();
        let Some((_, sink)) = self.bound() else {
            return effects;
        };

        if self.alert_value >= MAX_ALERT_VALUE {
            self.cooling_down = true;
        }
        self.target = None;
        self.last_known_position = None;
        sink.clear_target();
        sink.clear_last_known_position();
        info!(agent = %self.owner, cooling_down = self.cooling_down, "Search completed");

        if self.alert_value > 0.0 {
            self.start_updates(&mut effects);
        }
        effects
    }

    /// Return to Idle/0 and forget everything except the bindings.
    ///
    /// The owner must cancel the periodic update before calling this.
    pub fn reset(&mut self) -> EngineEffects {
        let mut effects = EngineEffects::default();
        self.stop_updates(&mut effects);
        let previous = self.state;
        self.clear_context();
        if self.bindings.is_some() {
            self.push_cleared();
            effects.published = Some(self.current_state_data());
        }
        info!(agent = %self.owner, from = previous.label(), "Stealth engine reset");
        effects
    }

    // -----------------------------------------------------------------------
    // Perception maths
    // -----------------------------------------------------------------------

    /// Alert gain per second from seeing `target`, or zero when inert.
    pub fn sight_gain(&self, target: ActorId) -> f32 {
        self.bindings
            .as_ref()
            .map_or(0.0, |b| self.gain_for(&b.tuning, target))
    }

    /// Concealment factor of `target` in `[0, inf)`; 1 means fully visible.
    pub fn visibility_modifier(&self, target: ActorId) -> f32 {
        self.bindings
            .as_ref()
            .map_or(1.0, |b| self.visibility_for(&b.tuning, target))
    }

    fn gain_for(&self, tuning: &TuningConfig, target: ActorId) -> f32 {
        let Some(distance) = self.distance_squared_to(target).map(f32::sqrt) else {
            return 0.0;
        };
        let visibility = self.visibility_for(tuning, target);
        if visibility <= GAIN_EPSILON {
            return 0.0;
        }

        let start = tuning.sight_falloff_start;
        let end = tuning.sight_falloff_end;
        if distance > lerp(start, end, visibility) {
            return 0.0;
        }

        let distance_factor = 1.0 - map_range_clamped(distance, start, end);
        let base_gain = lerp(
            tuning.sight_min_gain_rate,
            tuning.base_sight_gain_rate,
            distance_factor,
        );
        base_gain * visibility
    }

    fn visibility_for(&self, tuning: &TuningConfig, target: ActorId) -> f32 {
        let mut modifier = 1.0_f32;
        for tag in &tuning.target_tag_modifiers {
            if !self.world.has_tag(target, &tag.tag) {
                continue;
            }
            if tag.multiplier <= 0.0 {
                return 0.0;
            }
            modifier *= tag.multiplier;
        }
        modifier
    }

    fn distance_squared_to(&self, target: ActorId) -> Option<f32> {
        let own = self.world.location(self.owner)?;
        let other = self.world.location(target)?;
        Some(own.distance_squared(other))
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    fn derive_state(&self, value: f32, tuning: &TuningConfig) -> StealthState {
        if value >= MAX_ALERT_VALUE {
            let chase = tuning.chase_distance_threshold;
            let engaged = self.has_line_of_sight
                && self.target.is_some_and(|target| {
                    self.visibility_for(tuning, target) > GAIN_EPSILON
                        && self
                            .distance_squared_to(target)
                            .is_some_and(|d| d < chase * chase)
                });
            if engaged {
                StealthState::Alerted
            } else {
                StealthState::Searching
            }
        } else if value > tuning.suspicious_threshold {
            StealthState::Suspicious
        } else {
            StealthState::Idle
        }
    }

    fn evaluate_transition(
        &mut self,
        new_value: f32,
        tuning: &TuningConfig,
        sink: &Arc<dyn OutputSink>,
        effects: &mut EngineEffects,
    ) {
        let new_value = clamp_alert(new_value);
        let old_value = self.alert_value;
        let old_state = self.state;
        let new_state = self.derive_state(new_value, tuning);
        let target_location = self.target.and_then(|t| self.world.location(t));

        self.alert_value = new_value;
        sink.set_alert(new_value);

        if new_state != old_state {
            info!(
                agent = %self.owner,
                from = old_state.label(),
                to = new_state.label(),
                alert = new_value,
                "Stealth state changed"
            );

            if new_state == StealthState::Alerted {
                effects.squad_alert = Some(SquadMessage::enemy_spotted(
                    self.owner,
                    self.target,
                    target_location.unwrap_or_default(),
                ));
            }

            if old_state == StealthState::Alerted
                && let Some(location) = target_location
            {
                self.last_known_position = Some(location);
                sink.set_last_known_position(Some(location));
            }

            self.state = new_state;
            sink.set_state(new_state);
        }

        if new_state != old_state || !nearly_equal(old_value, new_value) {
            effects.published = Some(self.current_state_data());
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn bound(&self) -> Option<(Arc<TuningConfig>, Arc<dyn OutputSink>)> {
        self.bindings
            .as_ref()
            .map(|b| (Arc::clone(&b.tuning), Arc::clone(&b.sink)))
    }

    fn start_updates(&mut self, effects: &mut EngineEffects) {
        if !self.updating {
            self.updating = true;
            effects.updates = UpdateDirective::Start;
        }
    }

    fn stop_updates(&mut self, effects: &mut EngineEffects) {
        if self.updating {
            self.updating = false;
            effects.updates = UpdateDirective::Stop;
        }
    }

    /// Tell the engine its periodic update is no longer registered, so the
    /// next stimulus requests a fresh one.
    pub const fn updates_stopped(&mut self) {
        self.updating = false;
    }

    fn clear_context(&mut self) {
        self.alert_value = 0.0;
        self.state = StealthState::Idle;
        self.time_since_last_stimulus = 0.0;
        self.cooling_down = false;
        self.has_line_of_sight = false;
        self.target = None;
        self.last_known_position = None;
    }

    fn push_cleared(&self) {
        if let Some(bindings) = &self.bindings {
            let sink = &bindings.sink;
            sink.set_alert(0.0);
            sink.set_state(StealthState::Idle);
            sink.set_line_of_sight(false);
            sink.clear_target();
            sink.clear_last_known_position();
            sink.clear_stimulus_location();
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The guard owning this engine.
    pub const fn owner(&self) -> ActorId {
        self.owner
    }

    /// Whether [`init`](Self::init) succeeded.
    pub const fn is_initialized(&self) -> bool {
        self.bindings.is_some()
    }

    /// The bound tuning profile.
    pub fn tuning(&self) -> Option<&TuningConfig> {
        self.bindings.as_ref().map(|b| b.tuning.as_ref())
    }

    /// Current alert value in `[0, 100]`.
    pub const fn alert_value(&self) -> f32 {
        self.alert_value
    }

    /// Current stealth state.
    pub const fn state(&self) -> StealthState {
        self.state
    }

    /// Whether the target is currently in view.
    pub const fn has_line_of_sight(&self) -> bool {
        self.has_line_of_sight
    }

    /// The actor the guard is focused on.
    pub const fn target(&self) -> Option<ActorId> {
        self.target
    }

    /// Where the target was when the guard stopped being alerted.
    pub const fn last_known_position(&self) -> Option<Vec3> {
        self.last_known_position
    }

    /// Whether a completed search lets a maxed-out alert decay.
    pub const fn is_cooling_down(&self) -> bool {
        self.cooling_down
    }

    /// Seconds since the last positive stimulus.
    pub const fn time_since_last_stimulus(&self) -> f32 {
        self.time_since_last_stimulus
    }

    /// Whether the engine wants periodic updates.
    pub const fn is_updating(&self) -> bool {
        self.updating
    }

    /// Snapshot for observers and UI.
    pub fn current_state_data(&self) -> StealthStateData {
        let suspicious_threshold = self
            .tuning()
            .map_or(0.0, |tuning| tuning.suspicious_threshold);
        StealthStateData {
            alert_value: self.alert_value,
            max_alert_value: MAX_ALERT_VALUE,
            suspicious_threshold,
            state: self.state,
        }
    }

    /// Replicated subset of the snapshot.
    pub const fn sync_payload(&self) -> SyncPayload {
        SyncPayload {
            alert_value: self.alert_value,
            state: self.state,
        }
    }
}

impl std::fmt::Debug for StealthEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StealthEngine")
            .field("owner", &self.owner)
            .field("initialized", &self.bindings.is_some())
            .field("alert_value", &self.alert_value)
            .field("state", &self.state)
            .field("target", &self.target)
            .field("updating", &self.updating)
            .finish_non_exhaustive()
    }
}

/// Clamp to `[0, MAX_ALERT_VALUE]`, mapping NaN to zero.
fn clamp_alert(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, MAX_ALERT_VALUE)
    }
}
