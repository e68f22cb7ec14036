//! Error types for the Vigil engine binary.
//!
//! [`AppError`] is the top-level error type that wraps all possible
//! failure modes during startup and scenario playback.

use vigil_core::config::ConfigError;
use vigil_core::engine::EngineError;
use vigil_core::scheduler::SchedulerError;

/// Top-level error for the Vigil engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// A stealth engine rejected its setup or could not schedule updates.
    #[error("stealth engine error: {source}")]
    Stealth {
        /// The underlying engine error.
        #[from]
        source: EngineError,
    },

    /// The timer backend could not be created.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: SchedulerError,
    },

    /// Guard or actor spawning failed.
    #[error("spawner error: {message}")]
    Spawner {
        /// Description of the spawner failure.
        message: String,
    },

    /// A scenario event could not be applied.
    #[error("scenario error: {message}")]
    Scenario {
        /// Description of the scenario failure.
        message: String,
    },

    /// The run summary could not be serialised.
    #[error("summary error: {source}")]
    Summary {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}
