//! In-memory host used by the demo binary.
//!
//! The terrain is a repeating strip of biome bands along the x axis, with
//! a small hut every 64 blocks. Walkers drift around at random; every
//! output surface logs through `tracing` and keeps a running count.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rand::Rng;
use rand::rngs::StdRng;
use serde::Serialize;
use stormfront_types::{
    Biome, BlockPos, Occupant, OccupantId, ParticleEmission, SoundEmission, StatusKind, Vec3,
    WeatherFlags, WorldId,
};
use stormfront_world::{
    CosmeticSink, HostServices, OccupantDirectory, StatusSink, Surface, TerrainView, WorldError,
    WorldWeatherSink,
};
use tracing::{debug, info, trace};

/// Width of one biome band, in blocks.
const BAND_WIDTH: i32 = 256;

/// Biomes in the order they repeat along the x axis.
const BANDS: [Biome; 6] = [
    Biome::Plains,
    Biome::SnowyTaiga,
    Biome::Desert,
    Biome::Savanna,
    Biome::FrozenPeaks,
    Biome::Forest,
];

/// Spacing of the hut grid, in blocks.
const HUT_SPACING: i32 = 64;

/// Height of every hut roof.
const HUT_ROOF_Y: i32 = 80;

/// Largest single step a walker takes per wander.
const STEP: f64 = 6.0;

/// Terrain made of repeating biome bands and a grid of huts.
#[derive(Debug, Default)]
pub struct BandedTerrain;

impl BandedTerrain {
    /// Biome of the band containing `x`.
    fn band(x: i32) -> Biome {
        let index = x.div_euclid(BAND_WIDTH).rem_euclid(6);
        usize::try_from(index)
            .ok()
            .and_then(|i| BANDS.get(i).copied())
            .unwrap_or(Biome::Plains)
    }

    /// Whether `pos` is part of a hut roof.
    const fn is_roof(pos: BlockPos) -> bool {
        pos.y == HUT_ROOF_Y
            && pos.x.rem_euclid(HUT_SPACING) < 4
            && pos.z.rem_euclid(HUT_SPACING) < 4
    }
}

impl TerrainView for BandedTerrain {
    fn biome_at(&self, _world: WorldId, pos: BlockPos) -> Result<Biome, WorldError> {
        Ok(Self::band(pos.x))
    }

    fn surface_at(&self, _world: WorldId, pos: BlockPos) -> Surface {
        if Self::is_roof(pos) {
            Surface::Solid {
                material: "oak_planks",
            }
        } else {
            Surface::Open
        }
    }
}

/// Roster of simulated walkers.
#[derive(Debug, Default)]
pub struct Roster {
    occupants: RwLock<Vec<Occupant>>,
}

impl Roster {
    /// Place `count` walkers in `world`, spread across every band.
    pub fn populate(&self, world: WorldId, count: usize, rng: &mut StdRng) -> Vec<OccupantId> {
        let mut spawned = Vec::with_capacity(count);
        let mut occupants = self.occupants.write();
        for band in (0..BANDS.len()).cycle().take(count) {
            let band = i32::try_from(band).unwrap_or(0);
            let x = f64::from(band.saturating_mul(BAND_WIDTH)) + rng.random_range(8.0..248.0);
            let occupant = Occupant {
                id: OccupantId::new(),
                world,
                position: Vec3::new(x, rng.random_range(62.0..110.0), rng.random_range(-200.0..200.0)),
                online: true,
            };
            spawned.push(occupant.id);
            occupants.push(occupant);
        }
        info!(world = %world, count, "Walkers placed");
        spawned
    }

    /// Move every walker a random step; now and then one logs off or
    /// comes back.
    pub fn wander(&self, rng: &mut StdRng) {
        for occupant in self.occupants.write().iter_mut() {
            let step = Vec3::new(
                rng.random_range(-STEP..STEP),
                rng.random_range(-1.0..1.0),
                rng.random_range(-STEP..STEP),
            );
            occupant.position = occupant.position + step;
            occupant.position.y = occupant.position.y.clamp(40.0, 140.0);
            if rng.random_bool(0.01) {
                occupant.online = !occupant.online;
                debug!(occupant = %occupant.id, online = occupant.online, "Walker presence changed");
            }
        }
    }

    /// Number of walkers.
    pub fn count(&self) -> usize {
        self.occupants.read().len()
    }
}

impl OccupantDirectory for Roster {
    fn occupants(&self, world: WorldId) -> Vec<Occupant> {
        self.occupants
            .read()
            .iter()
            .filter(|o| o.world == world)
            .cloned()
            .collect()
    }

    fn occupant(&self, id: OccupantId) -> Option<Occupant> {
        self.occupants.read().iter().find(|o| o.id == id).cloned()
    }
}

/// Output counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OutputCounts {
    /// Statuses applied.
    pub statuses: u64,
    /// Damage events.
    pub damage: u64,
    /// Pushes applied.
    pub pushes: u64,
    /// Messages sent.
    pub messages: u64,
    /// Particle batches shown.
    pub particle_batches: u64,
    /// Individual particles shown.
    pub particles: u64,
    /// Sounds played.
    pub sounds: u64,
    /// World flag writes.
    pub flag_writes: u64,
}

/// Every output surface, logged and counted.
#[derive(Debug, Default)]
pub struct LoggingSinks {
    statuses: AtomicU64,
    damage: AtomicU64,
    pushes: AtomicU64,
    messages: AtomicU64,
    particle_batches: AtomicU64,
    particles: AtomicU64,
    sounds: AtomicU64,
    flag_writes: AtomicU64,
}

impl LoggingSinks {
    /// Snapshot the counters.
    pub fn counts(&self) -> OutputCounts {
        OutputCounts {
            statuses: self.statuses.load(Ordering::Relaxed),
            damage: self.damage.load(Ordering::Relaxed),
            pushes: self.pushes.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            particle_batches: self.particle_batches.load(Ordering::Relaxed),
            particles: self.particles.load(Ordering::Relaxed),
            sounds: self.sounds.load(Ordering::Relaxed),
            flag_writes: self.flag_writes.load(Ordering::Relaxed),
        }
    }
}

impl StatusSink for LoggingSinks {
    fn apply_status(
        &self,
        occupant: OccupantId,
        kind: StatusKind,
        duration_ticks: u32,
        amplifier: u8,
    ) -> Result<(), WorldError> {
        self.statuses.fetch_add(1, Ordering::Relaxed);
        trace!(%occupant, ?kind, duration_ticks, amplifier, "Status applied");
        Ok(())
    }

    fn damage(&self, occupant: OccupantId, amount: f64) -> Result<(), WorldError> {
        self.damage.fetch_add(1, Ordering::Relaxed);
        debug!(%occupant, amount, "Weather damage");
        Ok(())
    }

    fn is_invulnerable(&self, _occupant: OccupantId) -> bool {
        false
    }

    fn push(&self, occupant: OccupantId, velocity: Vec3) -> Result<(), WorldError> {
        self.pushes.fetch_add(1, Ordering::Relaxed);
        trace!(%occupant, strength = velocity.length(), "Pushed by wind");
        Ok(())
    }

    fn send_message(&self, occupant: OccupantId, text: &str) -> Result<(), WorldError> {
        self.messages.fetch_add(1, Ordering::Relaxed);
        debug!(%occupant, text, "Message");
        Ok(())
    }
}

impl CosmeticSink for LoggingSinks {
    fn emit_particles(&self, emission: &ParticleEmission) -> Result<(), WorldError> {
        self.particle_batches.fetch_add(1, Ordering::Relaxed);
        self.particles
            .fetch_add(u64::from(emission.count), Ordering::Relaxed);
        trace!(viewer = %emission.viewer, kind = ?emission.kind, count = emission.count, "Particles");
        Ok(())
    }

    fn play_sound(&self, emission: &SoundEmission) -> Result<(), WorldError> {
        self.sounds.fetch_add(1, Ordering::Relaxed);
        trace!(listener = %emission.listener, kind = ?emission.kind, "Sound");
        Ok(())
    }
}

impl WorldWeatherSink for LoggingSinks {
    fn apply_flags(&self, world: WorldId, flags: WeatherFlags) -> Result<(), WorldError> {
        self.flag_writes.fetch_add(1, Ordering::Relaxed);
        info!(
            %world,
            storm = flags.storm,
            thundering = flags.thundering,
            duration_ticks = flags.duration_ticks,
            "World weather flags set"
        );
        Ok(())
    }
}

/// The demo host and the handles `main` keeps for itself.
#[derive(Debug, Default)]
pub struct DemoHost {
    /// Walker roster.
    pub roster: Arc<Roster>,
    /// Output sinks.
    pub sinks: Arc<LoggingSinks>,
}

impl DemoHost {
    /// Collaborator bundle for the engine. No season provider is wired
    /// in, so worlds follow their own calendar.
    pub fn services(&self) -> HostServices {
        HostServices {
            terrain: Arc::new(BandedTerrain),
            occupants: Arc::clone(&self.roster) as Arc<dyn OccupantDirectory>,
            seasons: None,
            status: Arc::clone(&self.sinks) as Arc<dyn StatusSink>,
            cosmetics: Arc::clone(&self.sinks) as Arc<dyn CosmeticSink>,
            weather: Arc::clone(&self.sinks) as Arc<dyn WorldWeatherSink>,
        }
    }
}
