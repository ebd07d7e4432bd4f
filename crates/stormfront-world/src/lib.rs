//! Host collaborators, sky exposure and climate zones for the Stormfront
//! weather engine.
//!
//! This crate models everything the engine knows about the physical
//! world without owning it: the host's terrain, presence and output
//! surfaces behind traits, the memoized indoor/outdoor classifier shared
//! by every subsystem, and the per-world zone translator.
//!
//! # Modules
//!
//! - [`error`] -- Error type reported by collaborators.
//! - [`exposure`] -- [`SpatialExposureCache`], the two-phase sky probe and
//!   its TTL memo.
//! - [`host`] -- Collaborator traits and the [`HostServices`] bundle.
//! - [`zone`] -- [`ZoneWeatherTranslator`]: terrain to zone, global to zone
//!   weather, temperature estimates and drought tracking.

pub mod error;
pub mod exposure;
pub mod host;
pub mod zone;

// Re-export primary types at crate root.
pub use error::WorldError;
pub use exposure::{ExposureSettings, ExposureStats, SpatialExposureCache};
pub use host::{
    CosmeticSink, HostServices, OccupantDirectory, SeasonProvider, StatusSink, Surface,
    TerrainView, WorldWeatherSink,
};
pub use zone::{DroughtChange, ZoneSettings, ZoneWeatherState, ZoneWeatherTranslator, translate};
