//! Enumeration types shared across the Stormfront workspace.
//!
//! Every enum here is a closed set. Adding a variant is a deliberate,
//! workspace-wide change: the forecast bands, the zone translation table
//! and the progression ladder all match on these exhaustively.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

/// A weather condition, either global (per world) or zone-translated.
///
/// The forecast engine only ever draws the first four variants; the
/// remaining three are produced by zone translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeatherType {
    /// No precipitation.
    Clear,
    /// Drizzle or light rain.
    LightRain,
    /// Sustained heavy rain.
    HeavyRain,
    /// Heavy rain with thunder and lightning.
    Thunderstorm,
    /// Snowfall (cold-zone rain).
    Snow,
    /// Snow with high wind (cold-zone storm).
    Blizzard,
    /// Wind-driven sand (dry-zone storm).
    Sandstorm,
}

impl WeatherType {
    /// Every weather type, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Clear,
        Self::LightRain,
        Self::HeavyRain,
        Self::Thunderstorm,
        Self::Snow,
        Self::Blizzard,
        Self::Sandstorm,
    ];

    /// Whether the world's storm (precipitation) flag is raised.
    pub const fn is_precipitating(self) -> bool {
        !matches!(self, Self::Clear | Self::Sandstorm)
    }

    /// Whether the world's thunder flag is raised.
    pub const fn is_thundering(self) -> bool {
        matches!(self, Self::Thunderstorm | Self::Blizzard)
    }

    /// Rain intensity on a 0--3 scale (0 = dry).
    pub const fn rain_intensity(self) -> u8 {
        match self {
            Self::Clear | Self::Sandstorm => 0,
            Self::LightRain | Self::Snow => 1,
            Self::HeavyRain => 2,
            Self::Thunderstorm | Self::Blizzard => 3,
        }
    }

    /// Thunder intensity on a 0--2 scale (0 = silent).
    pub const fn thunder_intensity(self) -> u8 {
        match self {
            Self::Thunderstorm => 2,
            Self::Blizzard => 1,
            _ => 0,
        }
    }

    /// The progression stage at which a storm building toward this
    /// weather comes to rest.
    pub const fn resting_stage(self) -> ProgressionStage {
        match self {
            Self::Clear | Self::Sandstorm => ProgressionStage::Clear,
            Self::LightRain | Self::Snow => ProgressionStage::LightRain,
            Self::HeavyRain => ProgressionStage::HeavyRain,
            Self::Thunderstorm | Self::Blizzard => ProgressionStage::Thunderstorm,
        }
    }
}

impl core::fmt::Display for WeatherType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Self::Clear => "clear",
            Self::LightRain => "light rain",
            Self::HeavyRain => "heavy rain",
            Self::Thunderstorm => "thunderstorm",
            Self::Snow => "snow",
            Self::Blizzard => "blizzard",
            Self::Sandstorm => "sandstorm",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Seasons and day periods
// ---------------------------------------------------------------------------

/// A season of the annual cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    /// Mild, wet.
    Spring,
    /// Hot, dry.
    Summer,
    /// Cooling.
    Autumn,
    /// Cold.
    Winter,
}

impl Season {
    /// Every season in calendar order.
    pub const ALL: [Self; 4] = [Self::Spring, Self::Summer, Self::Autumn, Self::Winter];

    /// Temperature offset in degrees Celsius applied to zone baselines.
    pub const fn temperature_offset(self) -> f64 {
        match self {
            Self::Spring => 0.0,
            Self::Summer => 6.0,
            Self::Autumn => -3.0,
            Self::Winter => -10.0,
        }
    }
}

/// One of the four fixed periods of a simulated day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayPeriod {
    /// First quarter of the day.
    Morning,
    /// Second quarter of the day.
    Afternoon,
    /// Third quarter of the day.
    Evening,
    /// Last quarter of the day.
    Night,
}

impl DayPeriod {
    /// Every period in order.
    pub const ALL: [Self; 4] = [Self::Morning, Self::Afternoon, Self::Evening, Self::Night];

    /// Zero-based position of the period within the day.
    pub const fn index(self) -> usize {
        match self {
            Self::Morning => 0,
            Self::Afternoon => 1,
            Self::Evening => 2,
            Self::Night => 3,
        }
    }

    /// Period at a zero-based position; out-of-range indices clamp to night.
    pub const fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Morning,
            1 => Self::Afternoon,
            2 => Self::Evening,
            _ => Self::Night,
        }
    }
}

// ---------------------------------------------------------------------------
// Terrain classification
// ---------------------------------------------------------------------------

/// Terrain classification reported by the host's biome classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Biome {
    /// Open grassland.
    Plains,
    /// Temperate woodland.
    Forest,
    /// Wetland.
    Swamp,
    /// Tropical rainforest.
    Jungle,
    /// Open water.
    Ocean,
    /// Coastline.
    Beach,
    /// High rocky terrain.
    Mountains,
    /// Sand desert.
    Desert,
    /// Eroded red-rock mesas.
    Badlands,
    /// Dry grassland with sparse trees.
    Savanna,
    /// Snow-covered flatland.
    SnowyPlains,
    /// Cold conifer forest.
    SnowyTaiga,
    /// Ice spike fields.
    IceSpikes,
    /// Glaciated mountain tops.
    FrozenPeaks,
    /// Iced-over sea.
    FrozenOcean,
}

/// Coarse climate classification used to re-flavor global weather.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClimateZone {
    /// Snow and ice terrain.
    Arctic,
    /// Sand desert terrain.
    Desert,
    /// Semi-dry terrain (badlands, savanna).
    Arid,
    /// Everything else.
    #[default]
    Temperate,
}

impl ClimateZone {
    /// Every zone.
    pub const ALL: [Self; 4] = [Self::Arctic, Self::Desert, Self::Arid, Self::Temperate];

    /// Classify a biome into its climate zone.
    pub const fn of_biome(biome: Biome) -> Self {
        match biome {
            Biome::SnowyPlains
            | Biome::SnowyTaiga
            | Biome::IceSpikes
            | Biome::FrozenPeaks
            | Biome::FrozenOcean => Self::Arctic,
            Biome::Desert => Self::Desert,
            Biome::Badlands | Biome::Savanna => Self::Arid,
            Biome::Plains
            | Biome::Forest
            | Biome::Swamp
            | Biome::Jungle
            | Biome::Ocean
            | Biome::Beach
            | Biome::Mountains => Self::Temperate,
        }
    }

    /// Whether the zone is one of the dry zones where sand storms form.
    pub const fn is_dry(self) -> bool {
        matches!(self, Self::Desert | Self::Arid)
    }
}

// ---------------------------------------------------------------------------
// Progression
// ---------------------------------------------------------------------------

/// A stage of the minute-scale weather progression ladder.
///
/// Legal order: `Clear -> PreStorm -> LightRain -> HeavyRain -> Thunderstorm
/// -> PostStorm -> Clear`, with `PreStorm -> Clear` allowed when a storm
/// fizzles before breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressionStage {
    /// Fair weather.
    #[default]
    Clear,
    /// Clouds gathering, distant lightning.
    PreStorm,
    /// Light rain.
    LightRain,
    /// Heavy rain, possibly hail.
    HeavyRain,
    /// Full thunderstorm.
    Thunderstorm,
    /// Storm breaking up.
    PostStorm,
}

impl ProgressionStage {
    /// Position of the stage on the ladder (`Clear` = 0, `PostStorm` = 5).
    pub const fn ladder_index(self) -> u8 {
        match self {
            Self::Clear => 0,
            Self::PreStorm => 1,
            Self::LightRain => 2,
            Self::HeavyRain => 3,
            Self::Thunderstorm => 4,
            Self::PostStorm => 5,
        }
    }

    /// Whether the stage carries precipitation.
    pub const fn is_precipitating(self) -> bool {
        matches!(
            self,
            Self::LightRain | Self::HeavyRain | Self::Thunderstorm | Self::PostStorm
        )
    }

    /// Whether a transition from `self` to `next` respects the ladder.
    ///
    /// Forward skips (e.g. `LightRain -> PostStorm`) are legal; moving
    /// back down the ladder is not, except the two wrap edges
    /// `PostStorm -> Clear` and `PreStorm -> Clear`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        if matches!(next, Self::Clear) {
            return matches!(self, Self::PostStorm | Self::PreStorm);
        }
        next.ladder_index() > self.ladder_index()
    }
}

// ---------------------------------------------------------------------------
// Localized effects and output
// ---------------------------------------------------------------------------

/// The kind of localized severe-weather effect a scheduler manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    /// Freezing high-altitude snow storm.
    Blizzard,
    /// Blinding sand storm.
    Sandstorm,
    /// Ambient gusting wind.
    Wind,
}

impl EffectKind {
    /// Every effect kind.
    pub const ALL: [Self; 3] = [Self::Blizzard, Self::Sandstorm, Self::Wind];
}

impl core::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Self::Blizzard => "blizzard",
            Self::Sandstorm => "sandstorm",
            Self::Wind => "wind",
        };
        f.write_str(label)
    }
}

/// A timed status applied to an occupant through the host's status surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// Movement slowed.
    Slowness,
    /// Vision obscured.
    Blindness,
    /// Mining and attack speed reduced.
    Fatigue,
}

/// Cosmetic particle types the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticleKind {
    /// Drifting snow.
    Snowflake,
    /// Blown sand.
    Dust,
    /// Wind streak.
    Cloud,
    /// Falling hailstone.
    Hail,
}

/// Cosmetic sound types the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundKind {
    /// Howling blizzard wind.
    WindHowl,
    /// Hissing sand.
    SandHiss,
    /// Passing gust.
    Gust,
    /// Far-off thunder before a storm.
    DistantThunder,
}
