//! Scripted stimulus scenarios.
//!
//! A scenario names the actors and guards to spawn and a timeline of
//! events (movement, sight, noise, deaths, search results). Playback steps
//! the clock in [`STEP`] increments and applies every event that has come
//! due before each step.
//!
//! In the simulated mode the clock is a [`ManualScheduler`], so a twenty
//! second scenario plays back instantly and deterministically. The
//! real-time mode sleeps between steps and lets tokio timers drive the
//! guards.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vigil_core::agent::StealthAgent;
use vigil_core::config::NoiseTable;
use vigil_core::scheduler::ManualScheduler;
use vigil_core::world::{ActorQuery, ActorRegistry};
use vigil_types::{ActorId, Vec3};

use crate::error::AppError;
use crate::replication::SyncTracker;
use crate::spawner::SpawnResult;

/// Playback resolution.
pub const STEP: Duration = Duration::from_millis(STEP_MS);

const STEP_MS: u64 = 100;

// -----------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------

/// How the scenario clock advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Virtual clock; runs as fast as possible.
    #[default]
    Simulated,
    /// Wall clock; guards tick on tokio timers.
    Realtime,
}

/// The `scenario` section of `vigil-config.yaml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScenarioConfig {
    /// Name used in logs and the run summary.
    #[serde(default = "default_name")]
    pub name: String,

    /// Clock mode.
    #[serde(default)]
    pub mode: RunMode,

    /// Total playback time in milliseconds.
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,

    /// Non-guard actors (intruders, props).
    #[serde(default)]
    pub actors: Vec<ActorSpec>,

    /// Guards running a stealth engine.
    #[serde(default)]
    pub guards: Vec<GuardSpec>,

    /// Timeline of events.
    #[serde(default)]
    pub events: Vec<ScenarioEvent>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            mode: RunMode::default(),
            duration_ms: default_duration_ms(),
            actors: Vec::new(),
            guards: Vec::new(),
            events: Vec::new(),
        }
    }
}

/// An actor placed in the world at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActorSpec {
    /// Unique name referenced by events.
    pub name: String,
    /// Starting position.
    #[serde(default)]
    pub position: [f32; 3],
    /// Starting tags (e.g. `State.Movement.Crouching`).
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A guard placed in the world at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GuardSpec {
    /// Unique name referenced by events.
    pub name: String,
    /// Starting position.
    #[serde(default)]
    pub position: [f32; 3],
    /// Squad to join, if any.
    #[serde(default)]
    pub squad: Option<i32>,
    /// Tuning profile from the `tuning` section.
    #[serde(default = "default_profile")]
    pub profile: String,
}

/// One entry on the timeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScenarioEvent {
    /// Milliseconds from the start of playback.
    pub at_ms: u64,
    /// What happens.
    pub action: ScenarioAction,
}

/// Something that happens in the world during playback.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioAction {
    /// Teleport an actor.
    Move {
        /// Actor name.
        actor: String,
        /// New position.
        to: [f32; 3],
    },
    /// A guard gains or loses sight of an actor.
    Sight {
        /// Guard name.
        guard: String,
        /// Actor name.
        actor: String,
        /// `false` reports the actor as lost.
        #[serde(default = "default_true")]
        sensed: bool,
    },
    /// An actor makes a noise heard by every guard in range.
    Noise {
        /// Actor name.
        actor: String,
        /// Noise tag looked up in the `noise` table.
        noise: String,
    },
    /// Add or remove a tag on an actor.
    Tag {
        /// Actor name.
        actor: String,
        /// Tag to change.
        tag: String,
        /// Remove instead of add.
        #[serde(default)]
        remove: bool,
    },
    /// An actor dies.
    Kill {
        /// Actor name.
        actor: String,
    },
    /// A guard's search behaviour gives up.
    CompleteSearch {
        /// Guard name.
        guard: String,
    },
    /// A guard is reset to Idle.
    Reset {
        /// Guard name.
        guard: String,
    },
    /// A guard is removed from play.
    Despawn {
        /// Guard name.
        guard: String,
    },
}

fn default_name() -> String {
    String::from("unnamed")
}

const fn default_duration_ms() -> u64 {
    10_000
}

fn default_profile() -> String {
    String::from(vigil_core::config::DEFAULT_PROFILE)
}

const fn default_true() -> bool {
    true
}

// -----------------------------------------------------------------------
// Playback
// -----------------------------------------------------------------------

/// Source of time for playback.
#[derive(Debug)]
pub enum Clock {
    /// Advance a virtual clock.
    Manual(Arc<ManualScheduler>),
    /// Sleep on the tokio clock.
    Realtime,
}

impl Clock {
    /// Let `dt` pass.
    pub async fn advance(&self, dt: Duration) {
        match self {
            Self::Manual(scheduler) => {
                let fired = scheduler.advance(dt);
                debug!(fired, now = ?scheduler.now(), "Virtual clock advanced");
            }
            Self::Realtime => tokio::time::sleep(dt).await,
        }
    }
}

/// Applies scenario actions to the spawned cast.
pub struct ScenarioRunner<'a> {
    world: &'a ActorRegistry,
    noise: &'a NoiseTable,
    cast: &'a SpawnResult,
    tracker: &'a Mutex<SyncTracker>,
}

impl<'a> ScenarioRunner<'a> {
    /// Create a runner over an already spawned cast.
    pub const fn new(
        world: &'a ActorRegistry,
        noise: &'a NoiseTable,
        cast: &'a SpawnResult,
        tracker: &'a Mutex<SyncTracker>,
    ) -> Self {
        Self {
            world,
            noise,
            cast,
            tracker,
        }
    }

    /// Apply one action.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Scenario`] for unknown names and
    /// [`AppError::Stealth`] if a guard cannot schedule its updates.
    pub fn apply(&self, action: &ScenarioAction) -> Result<(), AppError> {
        match action {
            ScenarioAction::Move { actor, to } => {
                let id = self.actor(actor)?;
                self.world.move_to(id, Vec3::from(*to));
                debug!(actor = actor.as_str(), to = ?to, "Actor moved");
            }
            ScenarioAction::Sight {
                guard,
                actor,
                sensed,
            } => {
                let agent = self.guard(guard)?;
                let id = self.actor(actor)?;
                let location = self.location(actor, id)?;
                agent.handle_sight(id, *sensed, location)?;
            }
            ScenarioAction::Noise { actor, noise } => {
                let id = self.actor(actor)?;
                let location = self.location(actor, id)?;
                let settings = self.noise.lookup(noise);
                let mut heard_by = 0_usize;
                for agent in self.cast.guards.values() {
                    let in_range = self
                        .world
                        .location(agent.id())
                        .is_some_and(|at| at.distance(location) <= settings.max_range);
                    if in_range {
                        agent.handle_hearing(id, settings.loudness, location)?;
                        heard_by = heard_by.saturating_add(1);
                    }
                }
                info!(actor = actor.as_str(), noise = noise.as_str(), heard_by, "Noise made");
            }
            ScenarioAction::Tag { actor, tag, remove } => {
                let id = self.actor(actor)?;
                if *remove {
                    self.world.remove_tag(id, tag);
                } else {
                    self.world.add_tag(id, tag);
                }
                debug!(actor = actor.as_str(), tag = tag.as_str(), remove, "Actor tag changed");
            }
            ScenarioAction::Kill { actor } => {
                let id = self.actor(actor)?;
                self.world.set_dead(id, true);
                info!(actor = actor.as_str(), "Actor killed");
            }
            ScenarioAction::CompleteSearch { guard } => {
                self.guard(guard)?.complete_search()?;
            }
            ScenarioAction::Reset { guard } => {
                self.guard(guard)?.reset();
            }
            ScenarioAction::Despawn { guard } => {
                let agent = self.guard(guard)?;
                agent.despawn();
                self.world.despawn(agent.id());
                self.tracker
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .forget(agent.id());
            }
        }
        Ok(())
    }

    fn actor(&self, name: &str) -> Result<ActorId, AppError> {
        self.cast
            .actors
            .get(name)
            .copied()
            .ok_or_else(|| AppError::Scenario {
                message: format!("unknown actor '{name}'"),
            })
    }

    fn guard(&self, name: &str) -> Result<&StealthAgent, AppError> {
        self.cast.guards.get(name).ok_or_else(|| AppError::Scenario {
            message: format!("unknown guard '{name}'"),
        })
    }

    fn location(&self, name: &str, id: ActorId) -> Result<Vec3, AppError> {
        self.world.location(id).ok_or_else(|| AppError::Scenario {
            message: format!("actor '{name}' is no longer in the world"),
        })
    }
}

/// Play `scenario` to the end. Returns the number of events applied.
///
/// # Errors
///
/// Stops at the first event that fails to apply.
pub async fn play(
    scenario: &ScenarioConfig,
    runner: &ScenarioRunner<'_>,
    clock: &Clock,
) -> Result<usize, AppError> {
    let mut events: Vec<&ScenarioEvent> = scenario.events.iter().collect();
    events.sort_by_key(|event| event.at_ms);
    let mut pending = events.into_iter().peekable();

    let mut applied = 0_usize;
    let mut now_ms = 0_u64;
    loop {
        while let Some(event) = pending.next_if(|event| event.at_ms <= now_ms) {
            debug!(at_ms = event.at_ms, action = ?event.action, "Applying scenario event");
            runner.apply(&event.action)?;
            applied = applied.saturating_add(1);
        }
        if now_ms >= scenario.duration_ms {
            break;
        }
        clock.advance(STEP).await;
        now_ms = now_ms.saturating_add(STEP_MS);
    }

    let skipped = pending.count();
    if skipped > 0 {
        warn!(skipped, "Scenario events after the end were not applied");
    }
    Ok(applied)
}
