//! World clock, weather state machines, localized effects and the engine
//! runner for the Stormfront weather engine.
//!
//! Weather is decided in three layers per world: a daily
//! [`WeatherForecastEngine`] picks the weather of each day period, the
//! zone translator (in `stormfront-world`) re-flavors it per climate zone,
//! and the [`WeatherProgressionEngine`] walks the world through it one
//! stage at a time. Localized effects (blizzard, sandstorm, wind) then
//! track which occupants are caught in them.
//!
//! # Modules
//!
//! - [`clock`] -- Per-world tick clock, day periods and fallback seasons.
//! - [`config`] -- Configuration loading from `stormfront-config.yaml` into
//!   strongly-typed structs, plus the live [`ConfigHandle`].
//! - [`control`] -- [`EngineControl`], the shared stop signal.
//! - [`coordinator`] -- [`EffectCoordinator`]: which effects run for the
//!   current weather, including seasonal sandstorm episodes.
//! - [`effects`] -- [`LocalizedEffectScheduler`] and the three effect
//!   behaviors.
//! - [`forecast`] -- Daily forecasts, manual locks and weather flags.
//! - [`governor`] -- [`PerformanceGovernor`]: load sampling and output
//!   throttling.
//! - [`progression`] -- The minute-scale storm ladder.
//! - [`runner`] -- [`launch`] and the [`EngineHandle`] control surface.
//! - [`world`] -- [`World`], one world's sequential mutation timeline.
//!
//! [`ConfigHandle`]: config::ConfigHandle
//! [`EngineControl`]: control::EngineControl
//! [`EffectCoordinator`]: coordinator::EffectCoordinator
//! [`LocalizedEffectScheduler`]: effects::LocalizedEffectScheduler
//! [`WeatherForecastEngine`]: forecast::WeatherForecastEngine
//! [`PerformanceGovernor`]: governor::PerformanceGovernor
//! [`WeatherProgressionEngine`]: progression::WeatherProgressionEngine
//! [`launch`]: runner::launch
//! [`EngineHandle`]: runner::EngineHandle
//! [`World`]: world::World

pub mod clock;
pub mod config;
pub mod control;
pub mod coordinator;
pub mod effects;
pub mod forecast;
pub mod governor;
pub mod progression;
pub mod runner;
pub mod world;

// Re-export primary types at crate root.
pub use config::{ConfigError, ConfigHandle, SimulationConfig};
pub use governor::{MetricsSource, NoHostMetrics, PerformanceGovernor};
pub use runner::{EngineError, EngineHandle, launch};
pub use world::{OccupantReport, World, WorldServices, WorldStatus};
