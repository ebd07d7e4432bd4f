//! Configuration loading and typed config structures for the Stormfront
//! weather engine.
//!
//! The canonical configuration lives in `stormfront-config.yaml` at the
//! project root (override the path with `STORMFRONT_CONFIG`). This module
//! defines strongly-typed structs that mirror the YAML structure and a
//! loader that is tolerant of partial damage:
//!
//! - A missing section or key takes its default.
//! - A malformed entry is logged at `warn` and skipped; the rest of its
//!   section still loads.
//! - An out-of-range value is reset by [`SimulationConfig::sanitize`] and
//!   logged.
//!
//! [`ConfigHandle`] publishes the active configuration to every task and
//! swaps it atomically on reload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_yml::{Mapping, Value};
use stormfront_types::{ClimateZone, Season};
use stormfront_world::{ExposureSettings, ZoneSettings};
use tracing::{debug, warn};

/// Environment variable naming an alternative configuration file.
pub const CONFIG_PATH_ENV: &str = "STORMFRONT_CONFIG";

/// Configuration file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "stormfront-config.yaml";

/// Top-level section names understood by the loader.
const SECTIONS: [&str; 10] = [
    "engine",
    "forecast",
    "zones",
    "progression",
    "exposure",
    "governor",
    "blizzard",
    "sandstorm",
    "wind",
    "logging",
];

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The document parsed but its root is not a mapping.
    #[error("config root must be a mapping of sections")]
    NotAMapping,
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Path of the configuration file to load.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV).map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Top-level engine configuration.
///
/// Mirrors the structure of `stormfront-config.yaml`. All fields have
/// defaults, so an empty document is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Worlds, timing and tick cadences.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Daily forecast generation.
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Climate zone baselines and drought.
    #[serde(default)]
    pub zones: ZonesConfig,

    /// Minute-scale weather progression.
    #[serde(default)]
    pub progression: ProgressionConfig,

    /// Sky-exposure probe and cache.
    #[serde(default)]
    pub exposure: ExposureConfig,

    /// Load governor thresholds.
    #[serde(default)]
    pub governor: GovernorConfig,

    /// Blizzard effect.
    #[serde(default)]
    pub blizzard: BlizzardConfig,

    /// Sandstorm effect.
    #[serde(default)]
    pub sandstorm: SandstormConfig,

    /// Wind effect.
    #[serde(default)]
    pub wind: WindConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML at all.
    /// Malformed individual entries are not errors; see [`Self::parse`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// Each section is decoded independently. An entry whose value does
    /// not fit its field is logged and skipped so one typo never discards
    /// a whole section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::NotAMapping`] if the root is a scalar or sequence.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let raw: Value = serde_yml::from_str(yaml)?;
        let root = match raw {
            Value::Null => Mapping::new(),
            Value::Mapping(mapping) => mapping,
            _ => return Err(ConfigError::NotAMapping),
        };

        for key in root.keys() {
            let known = key.as_str().is_some_and(|name| SECTIONS.contains(&name));
            if !known {
                warn!(section = ?key, "Ignoring unknown configuration section");
            }
        }

        let mut config = Self {
            engine: section(&root, "engine"),
            forecast: section(&root, "forecast"),
            zones: section(&root, "zones"),
            progression: section(&root, "progression"),
            exposure: section(&root, "exposure"),
            governor: section(&root, "governor"),
            blizzard: section(&root, "blizzard"),
            sandstorm: section(&root, "sandstorm"),
            wind: section(&root, "wind"),
            logging: section(&root, "logging"),
        };
        config.sanitize();
        Ok(config)
    }

    /// Reset out-of-range values to their defaults, logging each fix.
    ///
    /// Returns the number of values that were corrected.
    pub fn sanitize(&mut self) -> usize {
        let mut fixes = Fixes::default();

        let engine = &mut self.engine;
        fixes.at_least("engine.tick_interval_ms", &mut engine.tick_interval_ms, 1, default_tick_interval_ms());
        fixes.at_least("engine.ticks_per_day", &mut engine.ticks_per_day, 4, default_ticks_per_day());
        fixes.at_least("engine.days_per_season", &mut engine.days_per_season, 1, default_days_per_season());
        fixes.at_least(
            "engine.membership_interval_ticks",
            &mut engine.membership_interval_ticks,
            1,
            default_membership_interval_ticks(),
        );
        fixes.at_least(
            "engine.progression_poll_ticks",
            &mut engine.progression_poll_ticks,
            1,
            default_progression_poll_ticks(),
        );
        fixes.at_least(
            "engine.coordinator_poll_ticks",
            &mut engine.coordinator_poll_ticks,
            1,
            default_coordinator_poll_ticks(),
        );
        fixes.at_least("engine.render_interval_ms", &mut engine.render_interval_ms, 1, default_render_interval_ms());
        fixes.at_least("engine.status_interval_ticks", &mut engine.status_interval_ticks, 1, default_status_interval_ticks());
        fixes.at_least("engine.governor_sample_ms", &mut engine.governor_sample_ms, 1, default_governor_sample_ms());
        if engine.worlds.is_empty() {
            fixes.note("engine.worlds");
            engine.worlds = default_worlds();
        }

        let forecast = &mut self.forecast;
        fixes.probability("forecast.repeat_chance", &mut forecast.repeat_chance, default_repeat_chance());
        if forecast.total_weight() == 0 {
            fixes.note("forecast weights");
            let defaults = ForecastConfig::default();
            forecast.clear_weight = defaults.clear_weight;
            forecast.light_rain_weight = defaults.light_rain_weight;
            forecast.heavy_rain_weight = defaults.heavy_rain_weight;
            forecast.thunderstorm_weight = defaults.thunderstorm_weight;
        }

        fixes.at_least_u32("zones.drought_days", &mut self.zones.drought_days, 1, default_drought_days());

        let progression = &mut self.progression;
        fixes.probability("progression.hail_chance", &mut progression.hail_chance, default_hail_chance());
        fixes.at_least(
            "progression.lightning_interval_seconds",
            &mut progression.lightning_interval_seconds,
            1,
            default_lightning_interval_seconds(),
        );

        let exposure = &mut self.exposure;
        if exposure.bucket_size < 1 {
            fixes.note("exposure.bucket_size");
            exposure.bucket_size = default_bucket_size();
        }
        if exposure.ceiling_distance < 1 {
            fixes.note("exposure.ceiling_distance");
            exposure.ceiling_distance = default_ceiling_distance();
        }
        if exposure.ray_steps < 1 {
            fixes.note("exposure.ray_steps");
            exposure.ray_steps = default_ray_steps();
        }
        fixes.probability("exposure.exposed_fraction", &mut exposure.exposed_fraction, default_exposed_fraction());
        fixes.probability("exposure.sweep_probability", &mut exposure.sweep_probability, default_sweep_probability());

        // Thresholds must keep 0 <= skip < warning <= nominal and
        // warning% <= reclaim% <= 100; a broken ordering resets the whole set.
        let governor = &mut self.governor;
        let tick_rates_ordered = governor.skip_tick_rate >= 0.0
            && governor.skip_tick_rate < governor.tick_rate_warning
            && governor.tick_rate_warning <= governor.nominal_tick_rate;
        if !tick_rates_ordered {
            fixes.note("governor.skip_tick_rate/tick_rate_warning/nominal_tick_rate");
            governor.nominal_tick_rate = default_nominal_tick_rate();
            governor.tick_rate_warning = default_tick_rate_warning();
            governor.skip_tick_rate = default_skip_tick_rate();
        }
        let memory_ordered = (0.0..=100.0).contains(&governor.memory_warning_percent)
            && (governor.memory_warning_percent..=100.0).contains(&governor.reclaim_suggest_percent);
        if !memory_ordered {
            fixes.note("governor.memory_warning_percent/reclaim_suggest_percent");
            governor.memory_warning_percent = default_memory_warning_percent();
            governor.reclaim_suggest_percent = default_reclaim_suggest_percent();
        }
        fixes.probability("governor.ewma_alpha", &mut governor.ewma_alpha, default_ewma_alpha());
        fixes.at_least("governor.counter_half_life_ms", &mut governor.counter_half_life_ms, 1, default_counter_half_life_ms());

        for (name, common) in [
            ("blizzard", &mut self.blizzard.common),
            ("sandstorm", &mut self.sandstorm.common),
            ("wind", &mut self.wind.common),
        ] {
            fixes.probability_named(name, "message_chance", &mut common.message_chance, default_message_chance());
            fixes.probability_named(name, "sound_chance", &mut common.sound_chance, default_sound_chance());
            if common.min_emission_interval_ms == 0 {
                fixes.note_named(name, "min_emission_interval_ms");
                common.min_emission_interval_ms = default_min_emission_interval_ms();
            }
        }
        for chance in self.sandstorm.seasonal_chance.values_mut() {
            if !(0.0..=1.0).contains(chance) {
                fixes.note("sandstorm.seasonal_chance");
                *chance = 0.0;
            }
        }
        let wind = &mut self.wind;
        fixes.probability("wind.gust_chance", &mut wind.gust_chance, default_gust_chance());
        fixes.probability(
            "wind.direction_change_chance",
            &mut wind.direction_change_chance,
            default_direction_change_chance(),
        );
        fixes.at_least("wind.period_seconds", &mut wind.period_seconds, 1, default_wind_period_seconds());

        fixes.count
    }
}

/// Accumulates sanitize corrections.
#[derive(Default)]
struct Fixes {
    count: usize,
}

impl Fixes {
    fn note(&mut self, key: &str) {
        self.count = self.count.saturating_add(1);
        warn!(key, "Configuration value out of range, using default");
    }

    fn note_named(&mut self, section: &str, key: &str) {
        self.count = self.count.saturating_add(1);
        warn!(section, key, "Configuration value out of range, using default");
    }

    fn at_least(&mut self, key: &str, value: &mut u64, min: u64, default: u64) {
        if *value < min {
            self.note(key);
            *value = default;
        }
    }

    fn at_least_u32(&mut self, key: &str, value: &mut u32, min: u32, default: u32) {
        if *value < min {
            self.note(key);
            *value = default;
        }
    }

    fn probability(&mut self, key: &str, value: &mut f64, default: f64) {
        if !(0.0..=1.0).contains(value) {
            self.note(key);
            *value = default;
        }
    }

    fn probability_named(&mut self, section: &str, key: &str, value: &mut f64, default: f64) {
        if !(0.0..=1.0).contains(value) {
            self.note_named(section, key);
            *value = default;
        }
    }
}

/// Decode one top-level section, skipping malformed entries.
fn section<T: DeserializeOwned + Default>(root: &Mapping, name: &str) -> T {
    let Some(value) = root.get(name) else {
        return T::default();
    };
    if value.is_null() {
        return T::default();
    }
    match serde_yml::from_value::<T>(value.clone()) {
        Ok(decoded) => return decoded,
        Err(err) => debug!(section = name, error = %err, "Section failed to decode whole, retrying per entry"),
    }

    let Some(entries) = value.as_mapping() else {
        warn!(section = name, "Configuration section is not a mapping, using defaults");
        return T::default();
    };

    let mut accepted = Mapping::new();
    for (key, entry) in entries {
        let mut candidate = accepted.clone();
        candidate.insert(key.clone(), entry.clone());
        match serde_yml::from_value::<T>(Value::Mapping(candidate.clone())) {
            Ok(_) => accepted = candidate,
            Err(err) => {
                warn!(section = name, key = ?key, error = %err, "Skipping malformed configuration entry");
            }
        }
    }

    serde_yml::from_value(Value::Mapping(accepted)).unwrap_or_else(|err| {
        warn!(section = name, error = %err, "Configuration section unusable, using defaults");
        T::default()
    })
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Worlds, timing and tick cadences.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Names of the worlds to simulate.
    #[serde(default = "default_worlds")]
    pub worlds: Vec<String>,

    /// Seed for every world's random source (mixed with the world name).
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Real milliseconds per world tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// World ticks per simulated day.
    #[serde(default = "default_ticks_per_day")]
    pub ticks_per_day: u64,

    /// Days per season when no season provider is wired in.
    #[serde(default = "default_days_per_season")]
    pub days_per_season: u64,

    /// Season at tick 0 when no season provider is wired in.
    #[serde(default = "default_season")]
    pub default_season: Season,

    /// World ticks between scheduler membership ticks.
    #[serde(default = "default_membership_interval_ticks")]
    pub membership_interval_ticks: u64,

    /// World ticks between progression polls.
    #[serde(default = "default_progression_poll_ticks")]
    pub progression_poll_ticks: u64,

    /// World ticks between coordinator polls (one simulated minute).
    #[serde(default = "default_coordinator_poll_ticks")]
    pub coordinator_poll_ticks: u64,

    /// Real milliseconds between render ticks.
    #[serde(default = "default_render_interval_ms")]
    pub render_interval_ms: u64,

    /// World ticks between published status snapshots.
    #[serde(default = "default_status_interval_ticks")]
    pub status_interval_ticks: u64,

    /// Real milliseconds between governor samples.
    #[serde(default = "default_governor_sample_ms")]
    pub governor_sample_ms: u64,
}

impl EngineConfig {
    /// Real time per world tick.
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Real time per render tick.
    pub const fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worlds: default_worlds(),
            seed: default_seed(),
            tick_interval_ms: default_tick_interval_ms(),
            ticks_per_day: default_ticks_per_day(),
            days_per_season: default_days_per_season(),
            default_season: default_season(),
            membership_interval_ticks: default_membership_interval_ticks(),
            progression_poll_ticks: default_progression_poll_ticks(),
            coordinator_poll_ticks: default_coordinator_poll_ticks(),
            render_interval_ms: default_render_interval_ms(),
            status_interval_ticks: default_status_interval_ticks(),
            governor_sample_ms: default_governor_sample_ms(),
        }
    }
}

/// Daily forecast generation.
///
/// The four weights partition a roll over their sum into the bands
/// clear, light rain, heavy rain and thunderstorm, in that order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForecastConfig {
    /// Width of the clear band.
    #[serde(default = "default_clear_weight")]
    pub clear_weight: u32,

    /// Width of the light-rain band.
    #[serde(default = "default_light_rain_weight")]
    pub light_rain_weight: u32,

    /// Width of the heavy-rain band.
    #[serde(default = "default_heavy_rain_weight")]
    pub heavy_rain_weight: u32,

    /// Width of the thunderstorm band.
    #[serde(default = "default_thunderstorm_weight")]
    pub thunderstorm_weight: u32,

    /// Chance a period simply repeats the previous one.
    #[serde(default = "default_repeat_chance")]
    pub repeat_chance: f64,

    /// Roll shift applied after a clear period.
    #[serde(default = "default_after_clear_shift")]
    pub after_clear_shift: i32,

    /// Roll shift applied after a thunderstorm period.
    #[serde(default = "default_after_thunderstorm_shift")]
    pub after_thunderstorm_shift: i32,
}

impl ForecastConfig {
    /// Sum of the four band widths.
    pub const fn total_weight(&self) -> u32 {
        self.clear_weight
            .saturating_add(self.light_rain_weight)
            .saturating_add(self.heavy_rain_weight)
            .saturating_add(self.thunderstorm_weight)
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            clear_weight: default_clear_weight(),
            light_rain_weight: default_light_rain_weight(),
            heavy_rain_weight: default_heavy_rain_weight(),
            thunderstorm_weight: default_thunderstorm_weight(),
            repeat_chance: default_repeat_chance(),
            after_clear_shift: default_after_clear_shift(),
            after_thunderstorm_shift: default_after_thunderstorm_shift(),
        }
    }
}

/// Climate zone baselines and drought.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ZonesConfig {
    /// Consecutive all-clear days that start a drought.
    #[serde(default = "default_drought_days")]
    pub drought_days: u32,

    /// Baseline temperature per zone, degrees Celsius.
    #[serde(default = "default_base_temperature")]
    pub base_temperature: BTreeMap<ClimateZone, f64>,
}

impl ZonesConfig {
    /// Translator tunables.
    pub fn settings(&self) -> ZoneSettings {
        let mut settings = ZoneSettings {
            drought_days: self.drought_days,
            ..ZoneSettings::default()
        };
        settings
            .base_temperature
            .extend(self.base_temperature.iter().map(|(zone, t)| (*zone, *t)));
        settings
    }
}

impl Default for ZonesConfig {
    fn default() -> Self {
        Self {
            drought_days: default_drought_days(),
            base_temperature: default_base_temperature(),
        }
    }
}

/// Minute-scale weather progression.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressionConfig {
    /// Whether the progression ladder drives the world weather flags.
    /// When off, flags follow the forecast directly.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Dwell time per stage, in simulated minutes.
    #[serde(default = "default_stage_minutes")]
    pub stage_minutes: StageMinutes,

    /// Chance of hail when heavy rain begins.
    #[serde(default = "default_hail_chance")]
    pub hail_chance: f64,

    /// Hail duration, in simulated seconds.
    #[serde(default = "default_hail_seconds")]
    pub hail_seconds: u64,

    /// Seconds between distant-lightning cues during the pre-storm stage.
    #[serde(default = "default_lightning_interval_seconds")]
    pub lightning_interval_seconds: u64,

    /// Whether stage changes are announced to occupants.
    #[serde(default = "default_true")]
    pub announce: bool,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stage_minutes: default_stage_minutes(),
            hail_chance: default_hail_chance(),
            hail_seconds: default_hail_seconds(),
            lightning_interval_seconds: default_lightning_interval_seconds(),
            announce: true,
        }
    }
}

/// Dwell time per progression stage, in simulated minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StageMinutes {
    /// Clear, before a pending storm starts building.
    pub clear: u64,
    /// Pre-storm.
    pub pre_storm: u64,
    /// Light rain.
    pub light_rain: u64,
    /// Heavy rain.
    pub heavy_rain: u64,
    /// Thunderstorm.
    pub thunderstorm: u64,
    /// Post-storm.
    pub post_storm: u64,
}

impl Default for StageMinutes {
    fn default() -> Self {
        Self {
            clear: 1,
            pre_storm: 2,
            light_rain: 3,
            heavy_rain: 3,
            thunderstorm: 4,
            post_storm: 2,
        }
    }
}

/// Sky-exposure probe and cache.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExposureConfig {
    /// Blocks scanned straight up before declaring open sky.
    #[serde(default = "default_ceiling_distance")]
    pub ceiling_distance: i32,

    /// Samples along each slanted ray.
    #[serde(default = "default_ray_steps")]
    pub ray_steps: i32,

    /// Edge of the cubic cache bucket, in blocks.
    #[serde(default = "default_bucket_size")]
    pub bucket_size: i32,

    /// Seconds a cached result stays authoritative.
    #[serde(default = "default_exposure_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Exposed iff the unblocked-ray fraction is strictly above this.
    #[serde(default = "default_exposed_fraction")]
    pub exposed_fraction: f64,

    /// Chance per cache miss of sweeping expired entries.
    #[serde(default = "default_sweep_probability")]
    pub sweep_probability: f64,

    /// Solid materials that never block the sky.
    #[serde(default = "default_ignored_materials")]
    pub ignored_materials: Vec<String>,
}

impl ExposureConfig {
    /// Cache tunables.
    pub fn settings(&self) -> ExposureSettings {
        ExposureSettings {
            ceiling_distance: self.ceiling_distance,
            ray_steps: self.ray_steps,
            bucket_size: self.bucket_size,
            ttl: Duration::from_secs(self.ttl_seconds),
            exposed_fraction: self.exposed_fraction,
            sweep_probability: self.sweep_probability,
            ignored_materials: self.ignored_materials.iter().cloned().collect(),
        }
    }
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            ceiling_distance: default_ceiling_distance(),
            ray_steps: default_ray_steps(),
            bucket_size: default_bucket_size(),
            ttl_seconds: default_exposure_ttl_seconds(),
            exposed_fraction: default_exposed_fraction(),
            sweep_probability: default_sweep_probability(),
            ignored_materials: default_ignored_materials(),
        }
    }
}

/// Load governor thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GovernorConfig {
    /// Target tick rate of the host.
    #[serde(default = "default_nominal_tick_rate")]
    pub nominal_tick_rate: f64,

    /// Tick rate below which output starts scaling down.
    #[serde(default = "default_tick_rate_warning")]
    pub tick_rate_warning: f64,

    /// Tick rate below which all render output is skipped.
    #[serde(default = "default_skip_tick_rate")]
    pub skip_tick_rate: f64,

    /// Memory use, in percent, that triggers warnings.
    #[serde(default = "default_memory_warning_percent")]
    pub memory_warning_percent: f64,

    /// Memory use, in percent, above which a reclaim is suggested.
    #[serde(default = "default_reclaim_suggest_percent")]
    pub reclaim_suggest_percent: f64,

    /// Smoothing factor of the default tick-interval estimator.
    #[serde(default = "default_ewma_alpha")]
    pub ewma_alpha: f64,

    /// Particle budget per occupant; output is skipped above 1.5x.
    #[serde(default = "default_emission_budget")]
    pub emission_budget: f64,

    /// Half-life of the per-occupant emission counters.
    #[serde(default = "default_counter_half_life_ms")]
    pub counter_half_life_ms: u64,

    /// Seconds between tick-rate warnings.
    #[serde(default = "default_tick_warning_cooldown_seconds")]
    pub tick_warning_cooldown_seconds: u64,

    /// Seconds between memory warnings.
    #[serde(default = "default_memory_warning_cooldown_seconds")]
    pub memory_warning_cooldown_seconds: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            nominal_tick_rate: default_nominal_tick_rate(),
            tick_rate_warning: default_tick_rate_warning(),
            skip_tick_rate: default_skip_tick_rate(),
            memory_warning_percent: default_memory_warning_percent(),
            reclaim_suggest_percent: default_reclaim_suggest_percent(),
            ewma_alpha: default_ewma_alpha(),
            emission_budget: default_emission_budget(),
            counter_half_life_ms: default_counter_half_life_ms(),
            tick_warning_cooldown_seconds: default_tick_warning_cooldown_seconds(),
            memory_warning_cooldown_seconds: default_memory_warning_cooldown_seconds(),
        }
    }
}

/// Settings shared by every localized effect.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EffectCommonConfig {
    /// Whether the coordinator may start the effect.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Chance per membership tick of a flavor message.
    #[serde(default = "default_message_chance")]
    pub message_chance: f64,

    /// Minimum real milliseconds between emissions to one occupant.
    #[serde(default = "default_min_emission_interval_ms")]
    pub min_emission_interval_ms: u64,

    /// Chance per emission of an accompanying sound.
    #[serde(default = "default_sound_chance")]
    pub sound_chance: f64,
}

impl Default for EffectCommonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            message_chance: default_message_chance(),
            min_emission_interval_ms: default_min_emission_interval_ms(),
            sound_chance: default_sound_chance(),
        }
    }
}

/// Blizzard effect.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlizzardConfig {
    /// Shared effect settings.
    #[serde(flatten)]
    pub common: EffectCommonConfig,

    /// Maximum concurrent members.
    #[serde(default = "default_blizzard_capacity")]
    pub capacity: usize,

    /// Minimum feet altitude for eligibility.
    #[serde(default = "default_blizzard_min_altitude")]
    pub min_altitude: f64,

    /// Particles per emission before scaling.
    #[serde(default = "default_blizzard_particles")]
    pub particles_per_emission: u32,

    /// Horizontal scatter radius of emissions, in blocks.
    #[serde(default = "default_blizzard_spread")]
    pub spread: f64,

    /// Temperature at or below which the blizzard bites.
    #[serde(default)]
    pub max_temperature: f64,

    /// Slowness amplifier.
    #[serde(default = "default_one_u8")]
    pub slowness_amplifier: u8,

    /// Slowness duration per application, in ticks.
    #[serde(default = "default_status_duration_ticks")]
    pub status_duration_ticks: u32,

    /// Freeze damage per hit.
    #[serde(default = "default_freeze_damage")]
    pub freeze_damage: f64,

    /// World ticks between freeze hits on one member.
    #[serde(default = "default_damage_interval_ticks")]
    pub damage_interval_ticks: u64,
}

impl Default for BlizzardConfig {
    fn default() -> Self {
        Self {
            common: EffectCommonConfig::default(),
            capacity: default_blizzard_capacity(),
            min_altitude: default_blizzard_min_altitude(),
            particles_per_emission: default_blizzard_particles(),
            spread: default_blizzard_spread(),
            max_temperature: 0.0,
            slowness_amplifier: 1,
            status_duration_ticks: default_status_duration_ticks(),
            freeze_damage: default_freeze_damage(),
            damage_interval_ticks: default_damage_interval_ticks(),
        }
    }
}

/// Sandstorm effect.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SandstormConfig {
    /// Shared effect settings.
    #[serde(flatten)]
    pub common: EffectCommonConfig,

    /// Maximum concurrent members.
    #[serde(default = "default_sandstorm_capacity")]
    pub capacity: usize,

    /// Minimum feet altitude for eligibility.
    #[serde(default = "default_sandstorm_min_altitude")]
    pub min_altitude: f64,

    /// Particles per emission before scaling.
    #[serde(default = "default_sandstorm_particles")]
    pub particles_per_emission: u32,

    /// Horizontal scatter radius of emissions, in blocks.
    #[serde(default = "default_sandstorm_spread")]
    pub spread: f64,

    /// Blindness duration per application, in ticks.
    #[serde(default = "default_status_duration_ticks")]
    pub blindness_duration_ticks: u32,

    /// Abrasion damage per hit.
    #[serde(default = "default_abrasion_damage")]
    pub abrasion_damage: f64,

    /// World ticks between abrasion hits on one member.
    #[serde(default = "default_sand_damage_interval_ticks")]
    pub damage_interval_ticks: u64,

    /// Chance per coordinator poll of a seasonal sandstorm over calm
    /// weather, per season.
    #[serde(default = "default_seasonal_chance")]
    pub seasonal_chance: BTreeMap<Season, f64>,

    /// Length of a seasonal sandstorm, in simulated minutes.
    #[serde(default = "default_episode_minutes")]
    pub episode_minutes: u64,
}

impl Default for SandstormConfig {
    fn default() -> Self {
        Self {
            common: EffectCommonConfig::default(),
            capacity: default_sandstorm_capacity(),
            min_altitude: default_sandstorm_min_altitude(),
            particles_per_emission: default_sandstorm_particles(),
            spread: default_sandstorm_spread(),
            blindness_duration_ticks: default_status_duration_ticks(),
            abrasion_damage: default_abrasion_damage(),
            damage_interval_ticks: default_sand_damage_interval_ticks(),
            seasonal_chance: default_seasonal_chance(),
            episode_minutes: default_episode_minutes(),
        }
    }
}

/// Wind effect.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WindConfig {
    /// Shared effect settings.
    #[serde(flatten)]
    pub common: EffectCommonConfig,

    /// Maximum concurrent members.
    #[serde(default = "default_wind_capacity")]
    pub capacity: usize,

    /// Minimum feet altitude for eligibility.
    #[serde(default = "default_wind_min_altitude")]
    pub min_altitude: f64,

    /// Particles per emission before scaling.
    #[serde(default = "default_wind_particles")]
    pub particles_per_emission: u32,

    /// Horizontal scatter radius of emissions, in blocks.
    #[serde(default = "default_wind_spread")]
    pub spread: f64,

    /// Mean wind strength.
    #[serde(default = "default_wind_base_strength")]
    pub base_strength: f64,

    /// Amplitude of the slow strength oscillation.
    #[serde(default = "default_wind_amplitude")]
    pub amplitude: f64,

    /// Period of the oscillation, in simulated seconds.
    #[serde(default = "default_wind_period_seconds")]
    pub period_seconds: u64,

    /// Chance per membership tick of a gust.
    #[serde(default = "default_gust_chance")]
    pub gust_chance: f64,

    /// Extra strength during a gust.
    #[serde(default = "default_gust_strength")]
    pub gust_strength: f64,

    /// Gust length in world ticks.
    #[serde(default = "default_gust_ticks")]
    pub gust_ticks: u64,

    /// Chance per membership tick that the wind veers.
    #[serde(default = "default_direction_change_chance")]
    pub direction_change_chance: f64,

    /// Strength above which members are pushed.
    #[serde(default = "default_push_threshold")]
    pub push_threshold: f64,

    /// Velocity added per unit of strength above the threshold.
    #[serde(default = "default_push_factor")]
    pub push_factor: f64,
}

impl Default for WindConfig {
    fn default() -> Self {
        Self {
            common: EffectCommonConfig::default(),
            capacity: default_wind_capacity(),
            min_altitude: default_wind_min_altitude(),
            particles_per_emission: default_wind_particles(),
            spread: default_wind_spread(),
            base_strength: default_wind_base_strength(),
            amplitude: default_wind_amplitude(),
            period_seconds: default_wind_period_seconds(),
            gust_chance: default_gust_chance(),
            gust_strength: default_gust_strength(),
            gust_ticks: default_gust_ticks(),
            direction_change_chance: default_direction_change_chance(),
            push_threshold: default_push_threshold(),
            push_factor: default_push_factor(),
        }
    }
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Live handle
// ---------------------------------------------------------------------------

/// Shared, atomically swappable view of the active configuration.
///
/// Readers take an [`Arc`] snapshot and never observe a half-applied
/// reload. The version counter lets tick loops notice a swap cheaply.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<SimulationConfig>>>,
    version: Arc<AtomicU64>,
}

impl ConfigHandle {
    /// Wrap an initial configuration.
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
            version: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The active configuration.
    pub fn current(&self) -> Arc<SimulationConfig> {
        Arc::clone(&self.current.read())
    }

    /// Number of swaps since creation.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Replace the active configuration. Returns the new version.
    pub fn replace(&self, mut config: SimulationConfig) -> u64 {
        config.sanitize();
        *self.current.write() = Arc::new(config);
        self.version.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    /// Re-read a file and swap it in.
    ///
    /// The file is fully parsed before the swap; on error the active
    /// configuration is untouched.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] from [`SimulationConfig::from_file`].
    pub fn reload(&self, path: &Path) -> Result<u64, ConfigError> {
        let config = SimulationConfig::from_file(path)?;
        Ok(self.replace(config))
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_worlds() -> Vec<String> {
    vec!["world".to_owned()]
}

const fn default_seed() -> u64 {
    42
}

const fn default_tick_interval_ms() -> u64 {
    50
}

const fn default_ticks_per_day() -> u64 {
    24_000
}

const fn default_days_per_season() -> u64 {
    30
}

const fn default_season() -> Season {
    Season::Spring
}

const fn default_membership_interval_ticks() -> u64 {
    10
}

const fn default_progression_poll_ticks() -> u64 {
    20
}

const fn default_coordinator_poll_ticks() -> u64 {
    1_200
}

const fn default_render_interval_ms() -> u64 {
    50
}

const fn default_status_interval_ticks() -> u64 {
    20
}

const fn default_governor_sample_ms() -> u64 {
    1_000
}

const fn default_clear_weight() -> u32 {
    40
}

const fn default_light_rain_weight() -> u32 {
    30
}

const fn default_heavy_rain_weight() -> u32 {
    20
}

const fn default_thunderstorm_weight() -> u32 {
    10
}

const fn default_repeat_chance() -> f64 {
    0.3
}

const fn default_after_clear_shift() -> i32 {
    -10
}

const fn default_after_thunderstorm_shift() -> i32 {
    20
}

const fn default_drought_days() -> u32 {
    5
}

fn default_base_temperature() -> BTreeMap<ClimateZone, f64> {
    ZoneSettings::default().base_temperature
}

fn default_stage_minutes() -> StageMinutes {
    StageMinutes::default()
}

const fn default_hail_chance() -> f64 {
    0.15
}

const fn default_hail_seconds() -> u64 {
    45
}

const fn default_lightning_interval_seconds() -> u64 {
    20
}

const fn default_ceiling_distance() -> i32 {
    24
}

const fn default_ray_steps() -> i32 {
    12
}

const fn default_bucket_size() -> i32 {
    5
}

const fn default_exposure_ttl_seconds() -> u64 {
    15
}

const fn default_exposed_fraction() -> f64 {
    0.4
}

const fn default_sweep_probability() -> f64 {
    0.02
}

fn default_ignored_materials() -> Vec<String> {
    let mut materials: Vec<String> = ExposureSettings::default().ignored_materials.into_iter().collect();
    materials.sort();
    materials
}

const fn default_nominal_tick_rate() -> f64 {
    20.0
}

const fn default_tick_rate_warning() -> f64 {
    18.0
}

const fn default_skip_tick_rate() -> f64 {
    10.0
}

const fn default_memory_warning_percent() -> f64 {
    80.0
}

const fn default_reclaim_suggest_percent() -> f64 {
    90.0
}

const fn default_ewma_alpha() -> f64 {
    0.1
}

const fn default_emission_budget() -> f64 {
    240.0
}

const fn default_counter_half_life_ms() -> u64 {
    250
}

const fn default_tick_warning_cooldown_seconds() -> u64 {
    60
}

const fn default_memory_warning_cooldown_seconds() -> u64 {
    300
}

const fn default_message_chance() -> f64 {
    0.05
}

const fn default_min_emission_interval_ms() -> u64 {
    45
}

const fn default_sound_chance() -> f64 {
    0.1
}

const fn default_blizzard_capacity() -> usize {
    50
}

const fn default_blizzard_min_altitude() -> f64 {
    60.0
}

const fn default_blizzard_particles() -> u32 {
    24
}

const fn default_blizzard_spread() -> f64 {
    6.0
}

const fn default_sandstorm_capacity() -> usize {
    50
}

const fn default_sandstorm_min_altitude() -> f64 {
    55.0
}

const fn default_sandstorm_particles() -> u32 {
    30
}

const fn default_sandstorm_spread() -> f64 {
    8.0
}

const fn default_wind_capacity() -> usize {
    80
}

const fn default_wind_min_altitude() -> f64 {
    80.0
}

const fn default_wind_particles() -> u32 {
    12
}

const fn default_wind_spread() -> f64 {
    5.0
}

const fn default_one_u8() -> u8 {
    1
}

const fn default_status_duration_ticks() -> u32 {
    60
}

const fn default_freeze_damage() -> f64 {
    1.0
}

const fn default_damage_interval_ticks() -> u64 {
    40
}

const fn default_abrasion_damage() -> f64 {
    0.5
}

const fn default_sand_damage_interval_ticks() -> u64 {
    60
}

fn default_seasonal_chance() -> BTreeMap<Season, f64> {
    BTreeMap::from([
        (Season::Spring, 0.03),
        (Season::Summer, 0.08),
        (Season::Autumn, 0.03),
        (Season::Winter, 0.01),
    ])
}

const fn default_episode_minutes() -> u64 {
    5
}

const fn default_wind_base_strength() -> f64 {
    0.4
}

const fn default_wind_amplitude() -> f64 {
    0.3
}

const fn default_wind_period_seconds() -> u64 {
    120
}

const fn default_gust_chance() -> f64 {
    0.02
}

const fn default_gust_strength() -> f64 {
    0.6
}

const fn default_gust_ticks() -> u64 {
    40
}

const fn default_direction_change_chance() -> f64 {
    0.005
}

const fn default_push_threshold() -> f64 {
    0.6
}

const fn default_push_factor() -> f64 {
    0.1
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}
