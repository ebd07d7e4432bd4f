//! Shared type definitions for the Stormfront weather engine.
//!
//! This crate is the single source of truth for the identifiers, closed
//! enums and value structs used across the workspace.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for worlds and occupants
//! - [`enums`] -- Weather, season, terrain, progression and effect enums
//! - [`structs`] -- Positions, occupant views, weather flags, emissions

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    Biome, ClimateZone, DayPeriod, EffectKind, ParticleKind, ProgressionStage, Season, SoundKind,
    StatusKind, WeatherType,
};
pub use ids::{OccupantId, WorldId};
pub use structs::{BlockPos, Occupant, ParticleEmission, SoundEmission, Vec3, WeatherFlags};
