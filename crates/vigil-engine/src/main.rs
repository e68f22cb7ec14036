//! Scenario driver for the Vigil stealth engine.
//!
//! Loads the stealth configuration and a scripted scenario, spawns the
//! guards and intruders it names, replays the scenario's stimuli against
//! them and logs the alert levels, squad alarms and sync deltas that
//! result.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `vigil-config.yaml` (or `$VIGIL_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Load the `scenario` section
//! 4. Create the actor registry and squad directory
//! 5. Create the scheduler for the run mode
//! 6. Spawn actors and guards, attach observer callbacks
//! 7. Play the scenario
//! 8. Log the run summary

mod error;
mod observer_callback;
mod replication;
mod scenario;
mod spawner;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vigil_core::config::StealthConfig;
use vigil_core::scheduler::{ManualScheduler, Scheduler, TokioScheduler};
use vigil_core::sink::BlackboardValues;
use vigil_core::squad::SquadDirectory;
use vigil_core::world::{ActorQuery, ActorRegistry};
use vigil_types::{ActorId, SquadId, StealthStateData, SyncPayload};

use crate::error::AppError;
use crate::observer_callback::ObserverCallback;
use crate::replication::SyncTracker;
use crate::scenario::{Clock, RunMode, ScenarioConfig, ScenarioRunner};
use crate::spawner::SpawnResult;

/// Config file used when `VIGIL_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "vigil-config.yaml";

/// Environment variable overriding the config file location.
const CONFIG_PATH_ENV: &str = "VIGIL_CONFIG";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any initialization step or scenario event fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. The log level lives in it, so this comes
    //    before the subscriber and reports its fallback afterwards.
    let config_path = config_path();
    let found = config_path.exists();
    let config = load_config(&config_path)?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("vigil-engine starting");
    if found {
        info!(
            path = %config_path.display(),
            profiles = config.tuning.len(),
            noises = config.noise.0.len(),
            "Configuration loaded"
        );
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }

    // 3. Load the scenario.
    let scenario = load_scenario_config(&config_path)?;
    info!(
        scenario = scenario.name.as_str(),
        mode = ?scenario.mode,
        duration_ms = scenario.duration_ms,
        actors = scenario.actors.len(),
        guards = scenario.guards.len(),
        events = scenario.events.len(),
        "Scenario loaded"
    );

    // 4. World and squads.
    let world = Arc::new(ActorRegistry::new());
    let query: Arc<dyn ActorQuery> = world.clone();
    let directory = Arc::new(SquadDirectory::new(query));

    // 5. Scheduler.
    let (scheduler, clock) = match scenario.mode {
        RunMode::Simulated => {
            let manual = Arc::new(ManualScheduler::new());
            let scheduler: Arc<dyn Scheduler> = manual.clone();
            (scheduler, Clock::Manual(manual))
        }
        RunMode::Realtime => {
            let scheduler: Arc<dyn Scheduler> =
                Arc::new(TokioScheduler::current().map_err(AppError::from)?);
            (scheduler, Clock::Realtime)
        }
    };

    // 6. Spawn the cast.
    let cast = spawner::spawn_cast(&scenario, &config, &world, &scheduler, &directory)?;
    info!(
        actors = cast.actors.len(),
        guards = cast.guards.len(),
        squads = directory.squad_ids().len(),
        "Cast spawned"
    );

    let tracker = Arc::new(Mutex::new(SyncTracker::new()));
    for (name, agent) in &cast.guards {
        ObserverCallback::new(name.clone(), agent.id(), Arc::clone(&tracker)).attach(agent);
    }

    // 7. Play.
    let runner = ScenarioRunner::new(&world, &config.noise, &cast, &tracker);
    let events_applied = scenario::play(&scenario, &runner, &clock).await?;

    // 8. Summary.
    let summary = summarize(&scenario, events_applied, &cast, &tracker);
    let json = serde_json::to_string_pretty(&summary).map_err(AppError::from)?;
    info!(summary = %json, "Scenario finished");

    info!(
        scenario = scenario.name.as_str(),
        events_applied,
        deltas_sent = summary.deltas_sent,
        "vigil-engine shutdown complete"
    );

    Ok(())
}

/// Final state of one guard.
#[derive(Debug, Serialize)]
struct GuardSummary {
    name: String,
    id: ActorId,
    squad: Option<SquadId>,
    snapshot: StealthStateData,
    blackboard: Option<BlackboardValues>,
    last_synced: Option<SyncPayload>,
}

/// Result of a scenario run.
#[derive(Debug, Serialize)]
struct RunSummary {
    scenario: String,
    mode: RunMode,
    events_applied: usize,
    deltas_sent: u64,
    guards: Vec<GuardSummary>,
}

fn summarize(
    scenario: &ScenarioConfig,
    events_applied: usize,
    cast: &SpawnResult,
    tracker: &Mutex<SyncTracker>,
) -> RunSummary {
    let tracker = tracker.lock().unwrap_or_else(PoisonError::into_inner);
    let guards = cast
        .guards
        .iter()
        .map(|(name, agent)| GuardSummary {
            name: name.clone(),
            id: agent.id(),
            squad: agent.squad(),
            snapshot: agent.current_state_data(),
            blackboard: cast.boards.get(name).map(|board| board.values()),
            last_synced: tracker.last_sent(agent.id()),
        })
        .collect();
    RunSummary {
        scenario: scenario.name.clone(),
        mode: scenario.mode,
        events_applied,
        deltas_sent: tracker.deltas_sent(),
        guards,
    }
}

/// Config file location: `$VIGIL_CONFIG` or `vigil-config.yaml` in the
/// working directory.
fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV).map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load the stealth configuration, falling back to defaults when the file
/// does not exist.
fn load_config(path: &Path) -> Result<StealthConfig, AppError> {
    if path.exists() {
        Ok(StealthConfig::from_file(path)?)
    } else {
        Ok(StealthConfig::default())
    }
}

/// Load the scenario from the config file.
///
/// Reads the `scenario` section from the YAML config file. If the file
/// does not exist or lacks the `scenario` key, an empty scenario is used.
fn load_scenario_config(path: &Path) -> Result<ScenarioConfig, AppError> {
    if !path.exists() {
        return Ok(ScenarioConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| AppError::Scenario {
        message: format!("failed to read config file: {e}"),
    })?;

    // Parse the full YAML and extract just the "scenario" section.
    let raw: serde_yml::Value = serde_yml::from_str(&contents).map_err(|e| AppError::Scenario {
        message: format!("failed to parse config YAML: {e}"),
    })?;

    raw.get("scenario").map_or_else(
        || Ok(ScenarioConfig::default()),
        |section| {
            serde_yml::from_value(section.clone()).map_err(|e| AppError::Scenario {
                message: format!("failed to parse scenario config: {e}"),
            })
        },
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn shipped_config() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../vigil-config.yaml")
    }

    #[test]
    fn shipped_config_parses() {
        let path = shipped_config();
        let config = load_config(&path).unwrap();
        assert!(config.tuning_profile("veteran").is_ok());
        assert!(config.noise.0.contains_key("Noise.Footstep.Run"));

        let scenario = load_scenario_config(&path).unwrap();
        assert_eq!(scenario.mode, RunMode::Simulated);
        assert_eq!(scenario.guards.len(), 4);
        assert!(
            scenario
                .guards
                .iter()
                .all(|guard| config.tuning_profile(&guard.profile).is_ok())
        );
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = Path::new("does-not-exist.yaml");
        assert_eq!(load_config(path).unwrap(), StealthConfig::default());
        assert_eq!(load_scenario_config(path).unwrap(), ScenarioConfig::default());
    }
}
