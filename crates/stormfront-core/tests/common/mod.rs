//! In-memory host collaborators shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, missing_docs)]

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use stormfront_core::config::SimulationConfig;
use stormfront_types::{
    Biome, BlockPos, Occupant, OccupantId, ParticleEmission, Season, SoundEmission, StatusKind,
    Vec3, WeatherFlags, WorldId,
};
use stormfront_world::{
    CosmeticSink, HostServices, OccupantDirectory, SeasonProvider, StatusSink, Surface,
    TerrainView, WorldError, WorldWeatherSink,
};

/// Terrain with one biome everywhere and individually placed roof blocks.
pub struct Terrain {
    pub biome: RwLock<Biome>,
    pub roofs: RwLock<HashSet<BlockPos>>,
}

impl Terrain {
    pub fn new(biome: Biome) -> Self {
        Self {
            biome: RwLock::new(biome),
            roofs: RwLock::new(HashSet::new()),
        }
    }

    /// Put a roof three blocks above `pos`.
    pub fn roof_over(&self, pos: BlockPos) {
        self.roofs.write().insert(pos.offset(0, 3, 0));
    }
}

impl TerrainView for Terrain {
    fn biome_at(&self, _world: WorldId, _pos: BlockPos) -> Result<Biome, WorldError> {
        Ok(*self.biome.read())
    }

    fn surface_at(&self, _world: WorldId, pos: BlockPos) -> Surface {
        if self.roofs.read().contains(&pos) {
            Surface::Solid { material: "stone" }
        } else {
            Surface::Open
        }
    }
}

/// Presence provider backed by a list.
#[derive(Default)]
pub struct Directory {
    pub occupants: RwLock<Vec<Occupant>>,
}

impl Directory {
    pub fn spawn(&self, world: WorldId, position: Vec3) -> OccupantId {
        let id = OccupantId::new();
        self.occupants.write().push(Occupant {
            id,
            world,
            position,
            online: true,
        });
        id
    }

    pub fn move_to(&self, id: OccupantId, position: Vec3) {
        for occupant in self.occupants.write().iter_mut().filter(|o| o.id == id) {
            occupant.position = position;
        }
    }

    pub fn remove(&self, id: OccupantId) {
        self.occupants.write().retain(|o| o.id != id);
    }

    pub fn set_online(&self, id: OccupantId, online: bool) {
        for occupant in self.occupants.write().iter_mut().filter(|o| o.id == id) {
            occupant.online = online;
        }
    }
}

impl OccupantDirectory for Directory {
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

/// Season provider with a fixed season and temperature.
pub struct FixedSeason {
    pub season: Season,
    pub temperature: f64,
}

impl SeasonProvider for FixedSeason {
    fn season(&self, _world: WorldId) -> Result<Season, WorldError> {
        Ok(self.season)
    }

    fn temperature(&self, _occupant: &Occupant) -> Result<f64, WorldError> {
        Ok(self.temperature)
    }
}

/// Records every status, damage and message.
#[derive(Default)]
pub struct StatusLog {
    pub statuses: Mutex<Vec<(OccupantId, StatusKind)>>,
    pub damage: Mutex<Vec<(OccupantId, f64)>>,
    pub messages: Mutex<Vec<(OccupantId, String)>>,
    pub pushes: Mutex<Vec<(OccupantId, Vec3)>>,
}

impl StatusLog {
    pub fn statuses_for(&self, id: OccupantId) -> usize {
        self.statuses.lock().iter().filter(|(o, _)| *o == id).count()
    }
}

impl StatusSink for StatusLog {
    fn apply_status(
        &self,
        occupant: OccupantId,
        kind: StatusKind,
        _duration_ticks: u32,
        _amplifier: u8,
    ) -> Result<(), WorldError> {
        self.statuses.lock().push((occupant, kind));
        Ok(())
    }

    fn damage(&self, occupant: OccupantId, amount: f64) -> Result<(), WorldError> {
        self.damage.lock().push((occupant, amount));
        Ok(())
    }

    fn is_invulnerable(&self, _occupant: OccupantId) -> bool {
        false
    }

    fn push(&self, occupant: OccupantId, velocity: Vec3) -> Result<(), WorldError> {
        self.pushes.lock().push((occupant, velocity));
        Ok(())
    }

    fn send_message(&self, occupant: OccupantId, text: &str) -> Result<(), WorldError> {
        self.messages.lock().push((occupant, text.to_owned()));
        Ok(())
    }
}

/// Records every particle and sound.
#[derive(Default)]
pub struct CosmeticLog {
    pub particles: Mutex<Vec<ParticleEmission>>,
    pub sounds: Mutex<Vec<SoundEmission>>,
}

impl CosmeticSink for CosmeticLog {
    fn emit_particles(&self, emission: &ParticleEmission) -> Result<(), WorldError> {
        self.particles.lock().push(emission.clone());
        Ok(())
    }

    fn play_sound(&self, emission: &SoundEmission) -> Result<(), WorldError> {
        self.sounds.lock().push(emission.clone());
        Ok(())
    }
}

/// Records every world flag write.
#[derive(Default)]
pub struct FlagLog {
    pub writes: Mutex<Vec<(WorldId, WeatherFlags)>>,
}

impl WorldWeatherSink for FlagLog {
    fn apply_flags(&self, world: WorldId, flags: WeatherFlags) -> Result<(), WorldError> {
        self.writes.lock().push((world, flags));
        Ok(())
    }
}

/// Every fake, plus the bundle handed to the engine.
pub struct FakeHost {
    pub terrain: Arc<Terrain>,
    pub directory: Arc<Directory>,
    pub status: Arc<StatusLog>,
    pub cosmetics: Arc<CosmeticLog>,
    pub flags: Arc<FlagLog>,
    pub services: HostServices,
}

impl FakeHost {
    pub fn new(biome: Biome, seasons: Option<Arc<dyn SeasonProvider>>) -> Self {
        let terrain = Arc::new(Terrain::new(biome));
        let directory = Arc::new(Directory::default());
        let status = Arc::new(StatusLog::default());
        let cosmetics = Arc::new(CosmeticLog::default());
        let flags = Arc::new(FlagLog::default());
        let services = HostServices {
            terrain: Arc::clone(&terrain) as Arc<dyn TerrainView>,
            occupants: Arc::clone(&directory) as Arc<dyn OccupantDirectory>,
            seasons,
            status: Arc::clone(&status) as Arc<dyn StatusSink>,
            cosmetics: Arc::clone(&cosmetics) as Arc<dyn CosmeticSink>,
            weather: Arc::clone(&flags) as Arc<dyn WorldWeatherSink>,
        };
        Self {
            terrain,
            directory,
            status,
            cosmetics,
            flags,
            services,
        }
    }
}

/// Short days and fast cadences so scenarios finish quickly.
pub fn fast_config() -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.engine.ticks_per_day = 400;
    config.engine.coordinator_poll_ticks = 20;
    config.engine.progression_poll_ticks = 20;
    config.engine.membership_interval_ticks = 10;
    config.engine.status_interval_ticks = 5;
    config.engine.tick_interval_ms = 1;
    config.engine.render_interval_ms = 5;
    config.exposure.sweep_probability = 0.0;
    config
}
