//! Enumeration types for the stealth engine.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Stealth state
// ---------------------------------------------------------------------------

/// Discrete awareness level of a guard.
///
/// Variants are declared in ascending order of alert pressure, so the
/// derived [`Ord`] can be used directly (`Idle < Suspicious < Searching <
/// Alerted`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub enum StealthState {
    /// Unaware; patrolling normally.
    #[default]
    Idle,
    /// Noticed something; investigating.
    Suspicious,
    /// Alert is maxed out but the target is not confirmed in view.
    Searching,
    /// Target confirmed in view and within chase range.
    Alerted,
}

impl StealthState {
    /// Short lowercase label used in log lines.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Suspicious => "suspicious",
            Self::Searching => "searching",
            Self::Alerted => "alerted",
        }
    }
}

// ---------------------------------------------------------------------------
// Squad messaging
// ---------------------------------------------------------------------------

/// How urgent a squad message is.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub enum AlertUrgency {
    /// Informational chatter.
    #[default]
    Info,
    /// Something worth checking.
    Warning,
    /// Enemy confirmed.
    Critical,
}

// ---------------------------------------------------------------------------
// Stimuli
// ---------------------------------------------------------------------------

/// The sense (or channel) a stimulus arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum StimulusKind {
    /// Visual contact gained or lost.
    Sight,
    /// A noise was heard.
    Hearing,
    /// A squad mate raised the alarm.
    Squad,
}
