//! Host collaborator interfaces.
//!
//! The engine never talks to a game server directly. Everything it reads
//! (terrain, occupants, seasons) and everything it writes (status effects,
//! damage, particles, sounds, world weather flags) goes through the traits
//! in this module. Every trait is `Send + Sync` so a single host adapter
//! can be shared between the mutation timeline and the render tasks.
//!
//! [`HostServices`] bundles one implementation of each trait behind
//! [`Arc`] for cheap cloning into tasks.

use std::sync::Arc;

use stormfront_types::{
    Biome, BlockPos, Occupant, OccupantId, ParticleEmission, Season, SoundEmission, StatusKind,
    Vec3, WeatherFlags, WorldId,
};

use crate::error::WorldError;

/// What occupies a single block, as far as sky-exposure is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Air or any non-blocking block.
    Open,
    /// A solid block, named by its material.
    Solid {
        /// Host material name, matched against the exposure ignore-set.
        material: &'static str,
    },
}

/// Terrain and biome classifier.
pub trait TerrainView: Send + Sync {
    /// Biome at a block position.
    fn biome_at(&self, world: WorldId, pos: BlockPos) -> Result<Biome, WorldError>;

    /// Surface at a block position.
    fn surface_at(&self, world: WorldId, pos: BlockPos) -> Surface;
}

/// Presence and location provider.
pub trait OccupantDirectory: Send + Sync {
    /// Every occupant currently in `world`, online or in the process of leaving.
    fn occupants(&self, world: WorldId) -> Vec<Occupant>;

    /// Look up a single occupant.
    fn occupant(&self, id: OccupantId) -> Option<Occupant>;
}

/// Optional season/calendar provider.
pub trait SeasonProvider: Send + Sync {
    /// Current season for a world.
    fn season(&self, world: WorldId) -> Result<Season, WorldError>;

    /// Temperature in degrees Celsius felt by an occupant.
    fn temperature(&self, occupant: &Occupant) -> Result<f64, WorldError>;
}

/// Status-effect and damage application surface.
pub trait StatusSink: Send + Sync {
    /// Apply a timed status to an occupant.
    fn apply_status(
        &self,
        occupant: OccupantId,
        kind: StatusKind,
        duration_ticks: u32,
        amplifier: u8,
    ) -> Result<(), WorldError>;

    /// Deal environmental damage.
    fn damage(&self, occupant: OccupantId, amount: f64) -> Result<(), WorldError>;

    /// Whether the occupant ignores environmental damage (e.g. creative mode).
    fn is_invulnerable(&self, occupant: OccupantId) -> bool;

    /// Add to an occupant's velocity.
    fn push(&self, occupant: OccupantId, velocity: Vec3) -> Result<(), WorldError>;

    /// Send a flavor or notification message.
    fn send_message(&self, occupant: OccupantId, text: &str) -> Result<(), WorldError>;
}

/// Cosmetic particle and sound output.
pub trait CosmeticSink: Send + Sync {
    /// Show particles to one occupant.
    fn emit_particles(&self, emission: &ParticleEmission) -> Result<(), WorldError>;

    /// Play a sound to one occupant.
    fn play_sound(&self, emission: &SoundEmission) -> Result<(), WorldError>;
}

/// World-level weather flag surface.
pub trait WorldWeatherSink: Send + Sync {
    /// Set the storm/thunder flags of a world.
    fn apply_flags(&self, world: WorldId, flags: WeatherFlags) -> Result<(), WorldError>;
}

/// One implementation of every collaborator, shareable across tasks.
#[derive(Clone)]
pub struct HostServices {
    /// Terrain classifier.
    pub terrain: Arc<dyn TerrainView>,
    /// Presence provider.
    pub occupants: Arc<dyn OccupantDirectory>,
    /// Season provider; `None` falls back to the clock-derived season.
    pub seasons: Option<Arc<dyn SeasonProvider>>,
    /// Status and damage surface.
    pub status: Arc<dyn StatusSink>,
    /// Particle and sound surface.
    pub cosmetics: Arc<dyn CosmeticSink>,
    /// World weather flags surface.
    pub weather: Arc<dyn WorldWeatherSink>,
}

impl core::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostServices")
            .field("seasons", &self.seasons.is_some())
            .finish_non_exhaustive()
    }
}
