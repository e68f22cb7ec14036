//! Stealth detection and squad alert propagation for the Vigil AI.
//!
//! Guards turn sight, hearing and squad stimuli into a bounded alert value
//! and a discrete stealth state. Updates run at a fixed rate only while a
//! guard has something to react to, and a guard that confirms an enemy
//! raises the alarm for the rest of its squad.
//!
//! # Modules
//!
//! - [`agent`] -- [`StealthAgent`], the thread-safe handle that owns an
//!   engine and carries out its effects.
//! - [`config`] -- Configuration loading from `vigil-config.yaml` into
//!   strongly-typed structs.
//! - [`engine`] -- [`StealthEngine`], the per-guard state machine.
//! - [`falloff`] -- Scalar helpers for the sight falloff curve.
//! - [`observers`] -- Token-based state-changed subscriptions.
//! - [`scheduler`] -- [`Scheduler`] trait with manual and tokio timers.
//! - [`sink`] -- [`OutputSink`] trait and the in-memory [`Blackboard`].
//! - [`squad`] -- [`SquadDirectory`] membership and fan-out.
//! - [`world`] -- [`ActorQuery`] capability and [`ActorRegistry`].
//!
//! [`StealthAgent`]: agent::StealthAgent
//! [`StealthEngine`]: engine::StealthEngine
//! [`Scheduler`]: scheduler::Scheduler
//! [`OutputSink`]: sink::OutputSink
//! [`Blackboard`]: sink::Blackboard
//! [`SquadDirectory`]: squad::SquadDirectory
//! [`ActorQuery`]: world::ActorQuery
//! [`ActorRegistry`]: world::ActorRegistry

pub mod agent;
pub mod config;
pub mod engine;
pub mod falloff;
pub mod observers;
pub mod scheduler;
pub mod sink;
pub mod squad;
pub mod world;
