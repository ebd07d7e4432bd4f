//! Climate zones: terrain classification, global-to-zone weather
//! translation, temperature estimates and drought tracking.
//!
//! # Translation
//!
//! Zone weather is the world's global weather rewritten through a
//! `(global, zone, season)` table:
//!
//! | Global       | Arctic                        | Desert                  | Arid                      | Temperate           |
//! |--------------|-------------------------------|-------------------------|---------------------------|---------------------|
//! | Clear        | Clear                         | Clear                   | Clear                     | Clear               |
//! | LightRain    | Snow (summer: LightRain)      | LightRain (summer: Clear) | LightRain               | LightRain (winter: Snow) |
//! | HeavyRain    | Snow (winter: Blizzard)       | Sandstorm               | HeavyRain (summer: Sandstorm) | HeavyRain (winter: Snow) |
//! | Thunderstorm | Blizzard                      | Sandstorm               | Sandstorm                 | Thunderstorm        |
//!
//! Zone-native inputs (`Snow`, `Blizzard`, `Sandstorm`, e.g. from a manual
//! lock) pass through unchanged.
//!
//! # Drought
//!
//! A day-rollover observer increments a per-zone counter when the zone
//! stayed clear for the whole day and resets it otherwise. Drought starts
//! when the counter reaches `drought_days` (5) and ends on the very next
//! non-clear observation, which also zeroes the counter.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use stormfront_types::{ClimateZone, Occupant, OccupantId, Season, WeatherType, WorldId};
use tracing::{info, warn};

use crate::host::{SeasonProvider, TerrainView};

/// Sea level used for the altitude lapse rate.
const SEA_LEVEL: f64 = 63.0;

/// Degrees Celsius lost per block above sea level.
const LAPSE_PER_BLOCK: f64 = 0.05;

/// Chunk edge length; the zone cache is keyed per chunk column.
const CHUNK_SHIFT: i32 = 4;

/// Tunables for zone translation and drought tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSettings {
    /// Consecutive all-clear days that start a drought.
    pub drought_days: u32,
    /// Baseline temperatures in degrees Celsius.
    pub base_temperature: BTreeMap<ClimateZone, f64>,
}

impl Default for ZoneSettings {
    fn default() -> Self {
        Self {
            drought_days: 5,
            base_temperature: BTreeMap::from([
                (ClimateZone::Arctic, -12.0),
                (ClimateZone::Desert, 32.0),
                (ClimateZone::Arid, 24.0),
                (ClimateZone::Temperate, 14.0),
            ]),
        }
    }
}

/// Per-zone weather bookkeeping for one world.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneWeatherState {
    /// Translated weather currently in effect.
    pub weather: WeatherType,
    /// Consecutive days the zone stayed clear.
    pub clear_days: u32,
    /// Whether the zone is in drought.
    pub drought: bool,
    /// Estimated air temperature in degrees Celsius.
    pub temperature: f64,
    /// Whether any non-clear weather was observed since the last rollover.
    #[serde(skip)]
    non_clear_today: bool,
}

impl ZoneWeatherState {
    fn new(temperature: f64) -> Self {
        Self {
            weather: WeatherType::Clear,
            clear_days: 0,
            drought: false,
            temperature,
            non_clear_today: false,
        }
    }
}

/// A drought starting or ending in a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DroughtChange {
    /// Drought began.
    Started(ClimateZone),
    /// Drought ended.
    Ended(ClimateZone),
}

/// Cached zone lookup for one occupant.
#[derive(Debug, Clone, Copy)]
struct CachedZone {
    chunk: (i32, i32),
    zone: ClimateZone,
}

/// Rewrite global weather for a zone and season.
pub const fn translate(global: WeatherType, zone: ClimateZone, season: Season) -> WeatherType {
    use ClimateZone::{Arctic, Arid, Desert, Temperate};
    use WeatherType::{Blizzard, Clear, HeavyRain, LightRain, Sandstorm, Snow, Thunderstorm};

    match (global, zone) {
        (Clear, _) => Clear,
        (LightRain, Arctic) => match season {
            Season::Summer => LightRain,
            _ => Snow,
        },
        (LightRain, Desert) => match season {
            Season::Summer => Clear,
            _ => LightRain,
        },
        (LightRain, Arid) => LightRain,
        (LightRain | HeavyRain, Temperate) if matches!(season, Season::Winter) => Snow,
        (LightRain, Temperate) => LightRain,
        (HeavyRain, Arctic) => match season {
            Season::Winter => Blizzard,
            _ => Snow,
        },
        (HeavyRain, Desert) => Sandstorm,
        (HeavyRain, Arid) => match season {
            Season::Summer => Sandstorm,
            _ => HeavyRain,
        },
        (HeavyRain, Temperate) => HeavyRain,
        (Thunderstorm, Arctic) => Blizzard,
        (Thunderstorm, Desert | Arid) => Sandstorm,
        (Thunderstorm, Temperate) => Thunderstorm,
        (native @ (Snow | Blizzard | Sandstorm), _) => native,
    }
}

/// Temperature shift caused by the weather itself.
const fn weather_temperature_offset(weather: WeatherType) -> f64 {
    match weather {
        WeatherType::Clear => 0.0,
        WeatherType::LightRain => -2.0,
        WeatherType::HeavyRain => -4.0,
        WeatherType::Thunderstorm => -5.0,
        WeatherType::Snow => -6.0,
        WeatherType::Blizzard => -12.0,
        WeatherType::Sandstorm => 3.0,
    }
}

/// Per-world zone classifier and weather translator.
#[derive(Debug, Clone)]
pub struct ZoneWeatherTranslator {
    world: WorldId,
    settings: ZoneSettings,
    zones: BTreeMap<ClimateZone, ZoneWeatherState>,
    occupant_zones: HashMap<OccupantId, CachedZone>,
    season: Season,
}

impl ZoneWeatherTranslator {
    /// Create a translator with every zone clear.
    pub fn new(world: WorldId, settings: ZoneSettings, season: Season) -> Self {
        let zones = ClimateZone::ALL
            .into_iter()
            .map(|zone| {
                let base = settings.base_temperature.get(&zone).copied().unwrap_or(14.0);
                (zone, ZoneWeatherState::new(base + season.temperature_offset()))
            })
            .collect();
        Self {
            world,
            settings,
            zones,
            occupant_zones: HashMap::new(),
            season,
        }
    }

    /// Replace the tunables; counters and cached zones are kept.
    pub fn reconfigure(&mut self, settings: ZoneSettings) {
        self.settings = settings;
    }

    /// The season used by the last recompute.
    pub const fn season(&self) -> Season {
        self.season
    }

    /// Climate zone at the occupant's location.
    ///
    /// Cached per occupant until the occupant changes chunk column or is
    /// invalidated. A terrain failure maps to [`ClimateZone::Temperate`]
    /// and is not cached.
    pub fn zone_of(&mut self, terrain: &dyn TerrainView, occupant: &Occupant) -> ClimateZone {
        let block = occupant.block();
        let chunk = (block.x >> CHUNK_SHIFT, block.z >> CHUNK_SHIFT);
        if let Some(cached) = self.occupant_zones.get(&occupant.id) {
            if cached.chunk == chunk {
                return cached.zone;
            }
        }

        match terrain.biome_at(self.world, block) {
            Ok(biome) => {
                let zone = ClimateZone::of_biome(biome);
                self.occupant_zones
                    .insert(occupant.id, CachedZone { chunk, zone });
                zone
            }
            Err(err) => {
                warn!(world = %self.world, occupant = %occupant.id, error = %err, "Terrain lookup failed, assuming temperate");
                ClimateZone::Temperate
            }
        }
    }

    /// Translated weather at the occupant's location.
    pub fn zone_weather(&mut self, terrain: &dyn TerrainView, occupant: &Occupant) -> WeatherType {
        let zone = self.zone_of(terrain, occupant);
        self.weather_in(zone)
    }

    /// Whether the occupant's zone is in drought.
    pub fn is_in_drought(&mut self, terrain: &dyn TerrainView, occupant: &Occupant) -> bool {
        let zone = self.zone_of(terrain, occupant);
        self.state(zone).is_some_and(|s| s.drought)
    }

    /// Temperature felt by an occupant.
    ///
    /// Prefers the season provider's per-occupant reading; without one (or
    /// when it fails) falls back to the zone estimate minus an altitude
    /// lapse above sea level.
    pub fn temperature_of(
        &mut self,
        terrain: &dyn TerrainView,
        seasons: Option<&dyn SeasonProvider>,
        occupant: &Occupant,
    ) -> f64 {
        if let Some(provider) = seasons {
            match provider.temperature(occupant) {
                Ok(temperature) => return temperature,
                Err(err) => {
                    warn!(occupant = %occupant.id, error = %err, "Temperature lookup failed, using zone estimate");
                }
            }
        }
        let zone = self.zone_of(terrain, occupant);
        let base = self.state(zone).map_or(14.0, |s| s.temperature);
        let above_sea = (occupant.altitude() - SEA_LEVEL).max(0.0);
        base - above_sea * LAPSE_PER_BLOCK
    }

    /// Translated weather currently in effect for a zone.
    pub fn weather_in(&self, zone: ClimateZone) -> WeatherType {
        self.state(zone).map_or(WeatherType::Clear, |s| s.weather)
    }

    /// Bookkeeping for a zone.
    pub fn state(&self, zone: ClimateZone) -> Option<&ZoneWeatherState> {
        self.zones.get(&zone)
    }

    /// Every zone's bookkeeping.
    pub const fn states(&self) -> &BTreeMap<ClimateZone, ZoneWeatherState> {
        &self.zones
    }

    /// Re-translate every zone from the global weather.
    ///
    /// A non-clear observation ends any drought in that zone immediately.
    pub fn recompute(&mut self, global: WeatherType, season: Season) -> Vec<DroughtChange> {
        self.season = season;
        let mut changes = Vec::new();
        for (&zone, state) in &mut self.zones {
            let weather = translate(global, zone, season);
            let base = self.settings.base_temperature.get(&zone).copied().unwrap_or(14.0);
            state.weather = weather;
            state.temperature =
                base + season.temperature_offset() + weather_temperature_offset(weather);

            if weather != WeatherType::Clear {
                state.non_clear_today = true;
                state.clear_days = 0;
                if state.drought {
                    state.drought = false;
                    info!(world = %self.world, ?zone, %weather, "Drought ended");
                    changes.push(DroughtChange::Ended(zone));
                }
            }
        }
        changes
    }

    /// Close out a simulated day.
    ///
    /// The new day starts unobserved; the next [`Self::recompute`] records
    /// its first weather.
    pub fn on_day_rollover(&mut self) -> Vec<DroughtChange> {
        let mut changes = Vec::new();
        let threshold = self.settings.drought_days;
        for (&zone, state) in &mut self.zones {
            if state.non_clear_today {
                state.clear_days = 0;
            } else {
                state.clear_days = state.clear_days.saturating_add(1);
                if !state.drought && state.clear_days == threshold {
                    state.drought = true;
                    info!(world = %self.world, ?zone, clear_days = state.clear_days, "Drought started");
                    changes.push(DroughtChange::Started(zone));
                }
            }
            state.non_clear_today = false;
        }
        changes
    }

    /// Forget an occupant's cached zone.
    pub fn invalidate(&mut self, occupant: OccupantId) {
        self.occupant_zones.remove(&occupant);
    }

    /// Keep cached zones only for occupants matching `keep`. Returns the
    /// occupants dropped.
    pub fn retain_occupants(&mut self, mut keep: impl FnMut(OccupantId) -> bool) -> Vec<OccupantId> {
        let gone: Vec<OccupantId> = self
            .occupant_zones
            .keys()
            .copied()
            .filter(|id| !keep(*id))
            .collect();
        for id in &gone {
            self.occupant_zones.remove(id);
        }
        gone
    }
}
