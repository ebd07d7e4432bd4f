//! Error types for the `stormfront-world` crate.
//!
//! Collaborator traits report failures through [`WorldError`]. Callers in
//! this workspace never propagate these to the tick loop: each failure
//! degrades to a documented default at the call site.

use stormfront_types::{OccupantId, WorldId};

/// Errors reported by host collaborators or world-level lookups.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The terrain classifier could not answer for a position.
    #[error("terrain unavailable in world {world}: {reason}")]
    TerrainUnavailable {
        /// World that was queried.
        world: WorldId,
        /// Host-supplied explanation.
        reason: String,
    },

    /// The season/calendar provider failed or is not installed.
    #[error("season provider unavailable: {reason}")]
    SeasonUnavailable {
        /// Host-supplied explanation.
        reason: String,
    },

    /// The occupant is not known to the presence provider.
    #[error("occupant not found: {0}")]
    OccupantNotFound(OccupantId),

    /// The world is not registered with the engine.
    #[error("world not found: {0}")]
    WorldNotFound(WorldId),

    /// An output sink (status, damage, message, weather flags) rejected a call.
    #[error("sink rejected {operation}: {reason}")]
    SinkRejected {
        /// The sink operation that failed.
        operation: &'static str,
        /// Host-supplied explanation.
        reason: String,
    },
}
