//! Cast spawner for scenario playback.
//!
//! Places every scenario actor in the world, then creates one
//! [`StealthAgent`] per guard with its tuning profile and an in-memory
//! [`Blackboard`], and enlists it in its squad. Names must be unique across
//! actors and guards since events refer to both by name.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::info;
use vigil_core::agent::StealthAgent;
use vigil_core::config::StealthConfig;
use vigil_core::scheduler::Scheduler;
use vigil_core::sink::{Blackboard, OutputSink};
use vigil_core::squad::SquadDirectory;
use vigil_core::world::{ActorQuery, ActorRegistry};
use vigil_types::{ActorId, SquadId, Vec3};

use crate::error::AppError;
use crate::scenario::ScenarioConfig;

/// Everything spawned for a scenario, keyed by scenario name.
#[derive(Debug, Default)]
pub struct SpawnResult {
    /// Plain actors.
    pub actors: BTreeMap<String, ActorId>,
    /// Guards.
    pub guards: BTreeMap<String, StealthAgent>,
    /// Each guard's blackboard.
    pub boards: BTreeMap<String, Arc<Blackboard>>,
}

/// Spawn the scenario's actors and guards.
///
/// # Errors
///
/// Returns [`AppError::Spawner`] on a duplicate name,
/// [`AppError::Config`] if a guard names an unknown tuning profile, and
/// [`AppError::Stealth`] if a guard fails to initialise.
pub fn spawn_cast(
    scenario: &ScenarioConfig,
    config: &StealthConfig,
    world: &Arc<ActorRegistry>,
    scheduler: &Arc<dyn Scheduler>,
    directory: &Arc<SquadDirectory>,
) -> Result<SpawnResult, AppError> {
    let mut names = BTreeSet::new();
    let mut result = SpawnResult::default();

    for spec in &scenario.actors {
        claim_name(&mut names, &spec.name)?;
        let id = world.spawn(Vec3::from(spec.position));
        for tag in &spec.tags {
            world.add_tag(id, tag);
        }
        result.actors.insert(spec.name.clone(), id);
    }

    for spec in &scenario.guards {
        claim_name(&mut names, &spec.name)?;
        let tuning = config.tuning_profile(&spec.profile)?;

        let id = world.spawn(Vec3::from(spec.position));
        let query: Arc<dyn ActorQuery> = world.clone();
        let agent = StealthAgent::new(
            id,
            query,
            Arc::clone(scheduler),
            Some(Arc::clone(directory)),
        );

        let board = Arc::new(Blackboard::new());
        let sink: Arc<dyn OutputSink> = board.clone();
        agent.init(Some(tuning), Some(sink))?;

        if let Some(squad) = spec.squad {
            agent.join_squad(SquadId(squad));
        }

        info!(
            guard = spec.name.as_str(),
            %id,
            profile = spec.profile.as_str(),
            squad = ?spec.squad,
            "Guard spawned"
        );
        result.guards.insert(spec.name.clone(), agent);
        result.boards.insert(spec.name.clone(), board);
    }

    Ok(result)
}

fn claim_name(names: &mut BTreeSet<String>, name: &str) -> Result<(), AppError> {
    if names.insert(name.to_owned()) {
        Ok(())
    } else {
        Err(AppError::Spawner {
            message: format!("duplicate name '{name}'"),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vigil_core::scheduler::ManualScheduler;

    use super::*;
    use crate::scenario::{ActorSpec, GuardSpec};

    struct Rig {
        world: Arc<ActorRegistry>,
        scheduler: Arc<dyn Scheduler>,
        directory: Arc<SquadDirectory>,
    }

    fn rig() -> Rig {
        let world = Arc::new(ActorRegistry::new());
        let query: Arc<dyn ActorQuery> = world.clone();
        Rig {
            world,
            scheduler: Arc::new(ManualScheduler::new()),
            directory: Arc::new(SquadDirectory::new(query)),
        }
    }

    fn guard(name: &str, squad: Option<i32>, profile: &str) -> GuardSpec {
        GuardSpec {
            name: name.to_owned(),
            position: [0.0, 0.0, 0.0],
            squad,
            profile: profile.to_owned(),
        }
    }

    fn spawn(rig: &Rig, scenario: &ScenarioConfig) -> Result<SpawnResult, AppError> {
        spawn_cast(
            scenario,
            &StealthConfig::default(),
            &rig.world,
            &rig.scheduler,
            &rig.directory,
        )
    }

    #[test]
    fn spawns_actors_and_guards() {
        let rig = rig();
        let scenario = ScenarioConfig {
            actors: vec![ActorSpec {
                name: String::from("intruder"),
                position: [10.0, 0.0, 0.0],
                tags: vec![String::from("State.Movement.Crouching")],
            }],
            guards: vec![
                guard("north", Some(1), "default"),
                guard("east", Some(1), "default"),
                guard("loner", None, "default"),
            ],
            ..ScenarioConfig::default()
        };
        let cast = spawn(&rig, &scenario).unwrap();

        assert_eq!(rig.world.len(), 4);
        let intruder = *cast.actors.get("intruder").unwrap();
        assert!(rig.world.has_tag(intruder, "State.Movement"));
        assert_eq!(cast.boards.len(), 3);
        assert_eq!(rig.directory.member_count(SquadId(1)), 2);
        assert_eq!(cast.guards.get("loner").unwrap().squad(), None);
        assert!(cast.guards.values().all(|agent| agent.with_engine(|e| e.is_initialized())));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let rig = rig();
        let scenario = ScenarioConfig {
            actors: vec![ActorSpec {
                name: String::from("north"),
                position: [0.0, 0.0, 0.0],
                tags: Vec::new(),
            }],
            guards: vec![guard("north", None, "default")],
            ..ScenarioConfig::default()
        };
        assert!(matches!(
            spawn(&rig, &scenario),
            Err(AppError::Spawner { .. })
        ));
    }

    #[test]
    fn unknown_profile_is_a_config_error() {
        let rig = rig();
        let scenario = ScenarioConfig {
            guards: vec![guard("north", None, "elite")],
            ..ScenarioConfig::default()
        };
        assert!(matches!(
            spawn(&rig, &scenario),
            Err(AppError::Config { .. })
        ));
    }
}
