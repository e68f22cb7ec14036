//! Shared type definitions for the Vigil stealth engine.
//!
//! This crate is the single source of truth for the data that crosses
//! component boundaries: the snapshot consumed by decision and UI layers,
//! the squad message wire shape, and stimulus records from perception.
//! Types flow to `TypeScript` via `ts-rs` for HUD tooling.
//!
//! # Modules
//!
//! - [`ids`] -- Actor and squad identifiers
//! - [`geometry`] -- World-space points
//! - [`enums`] -- Stealth state, urgency and stimulus kinds
//! - [`structs`] -- Snapshot, sync payload, squad message, stimulus record

pub mod enums;
pub mod geometry;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{AlertUrgency, StealthState, StimulusKind};
pub use geometry::Vec3;
pub use ids::{ActorId, SquadId};
pub use structs::{
    ENEMY_SPOTTED_TAG, MAX_ALERT_VALUE, SquadMessage, StealthStateData, StimulusRecord,
    SyncPayload,
};

#[cfg(test)]
mod tests {
    //! Binding generation for the HUD tooling.

    #[test]
    fn export_bindings() {
        // Importing the TS trait and calling export_all writes the
        // bindings to `bindings/` relative to the crate root.
        use ts_rs::TS;

        let _ = crate::ids::ActorId::export_all();
        let _ = crate::ids::SquadId::export_all();
        let _ = crate::geometry::Vec3::export_all();
        let _ = crate::enums::StealthState::export_all();
        let _ = crate::enums::AlertUrgency::export_all();
        let _ = crate::enums::StimulusKind::export_all();
        let _ = crate::structs::StealthStateData::export_all();
        let _ = crate::structs::SyncPayload::export_all();
        let _ = crate::structs::SquadMessage::export_all();
        let _ = crate::structs::StimulusRecord::export_all();
    }
}
