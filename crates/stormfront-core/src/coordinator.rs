//! Starting and stopping localized effects from the weather.
//!
//! One [`EffectCoordinator`] per world owns a [`LocalizedEffectScheduler`]
//! for each [`EffectKind`]. Once per simulated minute the world hands it
//! the global weather and the latest occupant conditions, and the
//! coordinator decides which schedulers should run:
//!
//! | Kind      | Runs while the global weather is                      |
//! |-----------|-------------------------------------------------------|
//! | blizzard  | heavy rain, thunderstorm, blizzard                    |
//! | sandstorm | heavy rain, thunderstorm, sandstorm, or an episode    |
//! | wind      | anything but clear                                    |
//!
//! A sandstorm **episode** is a seasonal event over clear or light-rain
//! weather: on each poll without one, if an online occupant stands in a
//! dry zone, it starts with the season's configured chance and lasts
//! `episode_minutes`.
//!
//! A kind disabled in configuration is always stopped.

use std::collections::BTreeMap;

use rand::Rng;
use rand::rngs::StdRng;
use serde::Serialize;
use stormfront_types::{EffectKind, OccupantId, Season, WeatherType, WorldId};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::minutes_to_ticks;
use crate::config::SimulationConfig;
use crate::effects::{
    ActivationReason, BlizzardEffect, EffectBehavior, LocalizedEffectScheduler,
    MechanicsContext, MembershipReport, OccupantConditions, RenderWiring, SandstormEffect,
    WindEffect,
};

/// Whether the global weather alone calls for an effect.
pub const fn weather_calls_for(kind: EffectKind, global: WeatherType) -> bool {
    match kind {
        EffectKind::Blizzard => matches!(
            global,
            WeatherType::HeavyRain | WeatherType::Thunderstorm | WeatherType::Blizzard
        ),
        EffectKind::Sandstorm => matches!(
            global,
            WeatherType::HeavyRain | WeatherType::Thunderstorm | WeatherType::Sandstorm
        ),
        EffectKind::Wind => !matches!(global, WeatherType::Clear),
    }
}

/// Whether a sandstorm episode may begin over this weather.
const fn episode_weather(global: WeatherType) -> bool {
    matches!(global, WeatherType::Clear | WeatherType::LightRain)
}

/// A running seasonal sandstorm episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SandstormEpisode {
    /// Tick the episode began.
    pub started_at: u64,
    /// Tick the episode ends.
    pub until_tick: u64,
}

/// What one coordinator poll changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinationReport {
    /// Kinds started this poll.
    pub started: Vec<EffectKind>,
    /// Kinds stopped this poll.
    pub stopped: Vec<EffectKind>,
}

/// One scheduler's state as reported to the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectStatus {
    /// Effect kind.
    pub kind: EffectKind,
    /// Whether the scheduler is running.
    pub active: bool,
    /// Why it is running.
    pub reason: Option<ActivationReason>,
    /// Current members.
    pub members: Vec<OccupantId>,
}

/// Per-world owner of every effect scheduler.
#[derive(Debug)]
pub struct EffectCoordinator {
    world: WorldId,
    schedulers: BTreeMap<EffectKind, LocalizedEffectScheduler>,
    enabled: BTreeMap<EffectKind, bool>,
    seasonal_chance: BTreeMap<Season, f64>,
    episode_minutes: u64,
    episode: Option<SandstormEpisode>,
}

impl EffectCoordinator {
    /// Build idle schedulers for every kind from `config`.
    pub fn new(world: WorldId, config: &SimulationConfig) -> Self {
        let behaviors: [Box<dyn EffectBehavior>; 3] = [
            Box::new(BlizzardEffect::new(config.blizzard.clone())),
            Box::new(SandstormEffect::new(config.sandstorm.clone())),
            Box::new(WindEffect::new(config.wind.clone())),
        ];
        let schedulers = behaviors
            .into_iter()
            .map(|behavior| (behavior.kind(), LocalizedEffectScheduler::new(world, behavior)))
            .collect();
        let mut coordinator = Self {
            world,
            schedulers,
            enabled: BTreeMap::new(),
            seasonal_chance: BTreeMap::new(),
            episode_minutes: 0,
            episode: None,
        };
        coordinator.read_settings(config);
        coordinator
    }

    fn read_settings(&mut self, config: &SimulationConfig) {
        self.enabled = BTreeMap::from([
            (EffectKind::Blizzard, config.blizzard.common.enabled),
            (EffectKind::Sandstorm, config.sandstorm.common.enabled),
            (EffectKind::Wind, config.wind.common.enabled),
        ]);
        self.seasonal_chance.clone_from(&config.sandstorm.seasonal_chance);
        self.episode_minutes = config.sandstorm.episode_minutes;
    }

    /// Pick up new tunables in every scheduler.
    ///
    /// Toggled-off kinds stop at the next poll.
    pub fn reconfigure(&mut self, config: &SimulationConfig) {
        self.read_settings(config);
        for scheduler in self.schedulers.values_mut() {
            scheduler.reconfigure(config);
        }
    }

    /// The scheduler for one kind.
    pub fn scheduler(&self, kind: EffectKind) -> Option<&LocalizedEffectScheduler> {
        self.schedulers.get(&kind)
    }

    /// Whether a kind is running.
    pub fn is_active(&self, kind: EffectKind) -> bool {
        self.schedulers.get(&kind).is_some_and(LocalizedEffectScheduler::is_active)
    }

    /// Whether an occupant is a member of a kind.
    pub fn is_member(&self, kind: EffectKind, occupant: OccupantId) -> bool {
        self.schedulers
            .get(&kind)
            .is_some_and(|s| s.is_member(occupant))
    }

    /// Kinds the occupant is currently a member of.
    pub fn memberships_of(&self, occupant: OccupantId) -> Vec<EffectKind> {
        self.schedulers
            .iter()
            .filter(|(_, s)| s.is_member(occupant))
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// The running sandstorm episode, if any.
    pub const fn episode(&self) -> Option<SandstormEpisode> {
        self.episode
    }

    /// Every scheduler's state.
    pub fn status(&self) -> Vec<EffectStatus> {
        self.schedulers
            .values()
            .map(|s| EffectStatus {
                kind: s.kind(),
                active: s.is_active(),
                reason: s.reason(),
                members: s.members().map(|(id, _)| *id).collect(),
            })
            .collect()
    }

    /// Start or stop every kind for the current weather.
    pub fn coordinate(
        &mut self,
        global: WeatherType,
        season: Season,
        tick: u64,
        conditions: &[OccupantConditions],
        rng: &mut StdRng,
        render: Option<&RenderWiring>,
    ) -> CoordinationReport {
        let mut report = CoordinationReport::default();
        self.update_episode(global, season, tick, conditions, rng);

        for kind in EffectKind::ALL {
            let enabled = self.enabled.get(&kind).copied().unwrap_or(false);
            let wanted = if !enabled {
                None
            } else if weather_calls_for(kind, global) {
                Some(ActivationReason::Weather)
            } else if kind == EffectKind::Sandstorm && self.episode.is_some() {
                Some(ActivationReason::SeasonalEpisode)
            } else {
                None
            };

            let Some(scheduler) = self.schedulers.get_mut(&kind) else {
                continue;
            };
            let wiring = render.map(|base| RenderWiring {
                seed: base.seed.wrapping_add(kind_offset(kind)),
                ..base.clone()
            });

            match wanted {
                Some(reason) => {
                    if scheduler.is_active() && scheduler.reason() != Some(reason) {
                        scheduler.stop(tick);
                        report.stopped.push(kind);
                    }
                    if scheduler.start(reason, tick, wiring.as_ref()) {
                        report.started.push(kind);
                    }
                }
                None => {
                    if scheduler.stop(tick) {
                        report.stopped.push(kind);
                    }
                }
            }
        }

        if !report.started.is_empty() || !report.stopped.is_empty() {
            debug!(world = %self.world, %global, started = ?report.started, stopped = ?report.stopped, "Effects coordinated");
        }
        report
    }

    fn update_episode(
        &mut self,
        global: WeatherType,
        season: Season,
        tick: u64,
        conditions: &[OccupantConditions],
        rng: &mut StdRng,
    ) {
        if let Some(episode) = self.episode {
            if tick < episode.until_tick && episode_weather(global) {
                return;
            }
            self.episode = None;
            info!(world = %self.world, started_at = episode.started_at, "Sandstorm episode ended");
        }

        if !episode_weather(global) {
            return;
        }
        let dry_occupant = conditions
            .iter()
            .any(|c| c.occupant.online && c.zone.is_dry());
        if !dry_occupant {
            return;
        }
        let chance = self.seasonal_chance.get(&season).copied().unwrap_or(0.0);
        if rng.random_bool(chance.clamp(0.0, 1.0)) {
            let episode = SandstormEpisode {
                started_at: tick,
                until_tick: tick.saturating_add(minutes_to_ticks(self.episode_minutes).max(1)),
            };
            self.episode = Some(episode);
            info!(world = %self.world, ?season, until_tick = episode.until_tick, "Sandstorm episode began");
        }
    }

    /// Run the membership tick of every active scheduler.
    pub fn membership_tick(
        &mut self,
        conditions: &[OccupantConditions],
        ctx: &mut MechanicsContext<'_>,
    ) -> BTreeMap<EffectKind, MembershipReport> {
        self.schedulers
            .iter_mut()
            .filter(|(_, s)| s.is_active())
            .map(|(kind, s)| (*kind, s.membership_tick(conditions, ctx)))
            .collect()
    }

    /// Stop every scheduler. Returns the render tasks to await.
    pub fn stop_all(&mut self, tick: u64) -> Vec<JoinHandle<()>> {
        self.episode = None;
        let mut tasks = Vec::new();
        for scheduler in self.schedulers.values_mut() {
            scheduler.stop(tick);
            tasks.extend(scheduler.take_draining());
        }
        tasks
    }

    /// Render tasks of schedulers stopped since the last call.
    pub fn take_draining(&mut self) -> Vec<JoinHandle<()>> {
        self.schedulers
            .values_mut()
            .flat_map(LocalizedEffectScheduler::take_draining)
            .collect()
    }
}

const fn kind_offset(kind: EffectKind) -> u64 {
    match kind {
        EffectKind::Blizzard => 10,
        EffectKind::Sandstorm => 11,
        EffectKind::Wind => 12,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use stormfront_types::{ClimateZone, Occupant, Vec3};

    use super::*;

    fn desert_walker(world: WorldId) -> OccupantConditions {
        OccupantConditions {
            occupant: Occupant {
                id: OccupantId::new(),
                world,
                position: Vec3::new(0.0, 70.0, 0.0),
                online: true,
            },
            zone: ClimateZone::Desert,
            weather: WeatherType::Clear,
            temperature: 35.0,
            indoor: false,
        }
    }

    fn poll(
        coordinator: &mut EffectCoordinator,
        global: WeatherType,
        tick: u64,
        conditions: &[OccupantConditions],
    ) -> CoordinationReport {
        let mut rng = StdRng::seed_from_u64(tick);
        coordinator.coordinate(global, Season::Summer, tick, conditions, &mut rng, None)
    }

    #[test]
    fn clear_weather_runs_nothing() {
        let world = WorldId::new();
        let mut coordinator = EffectCoordinator::new(world, &SimulationConfig::default());
        let report = poll(&mut coordinator, WeatherType::Clear, 0, &[]);
        assert!(report.started.is_empty());
        assert!(EffectKind::ALL.iter().all(|k| !coordinator.is_active(*k)));
    }

    #[test]
    fn thunderstorm_starts_everything_and_clearing_stops_it() {
        let world = WorldId::new();
        let mut coordinator = EffectCoordinator::new(world, &SimulationConfig::default());
        let report = poll(&mut coordinator, WeatherType::Thunderstorm, 0, &[]);
        assert_eq!(report.started, EffectKind::ALL.to_vec());

        let again = poll(&mut coordinator, WeatherType::Thunderstorm, 1_200, &[]);
        assert!(again.started.is_empty());

        let report = poll(&mut coordinator, WeatherType::Clear, 2_400, &[]);
        assert_eq!(report.stopped, EffectKind::ALL.to_vec());
    }

    #[test]
    fn light_rain_only_brings_wind() {
        let world = WorldId::new();
        let mut coordinator = EffectCoordinator::new(world, &SimulationConfig::default());
        poll(&mut coordinator, WeatherType::LightRain, 0, &[]);
        assert!(coordinator.is_active(EffectKind::Wind));
        assert!(!coordinator.is_active(EffectKind::Blizzard));
        assert!(!coordinator.is_active(EffectKind::Sandstorm));
    }

    #[test]
    fn disabled_kind_never_starts() {
        let world = WorldId::new();
        let mut config = SimulationConfig::default();
        config.wind.common.enabled = false;
        let mut coordinator = EffectCoordinator::new(world, &config);
        poll(&mut coordinator, WeatherType::Thunderstorm, 0, &[]);
        assert!(!coordinator.is_active(EffectKind::Wind));
        assert!(coordinator.is_active(EffectKind::Blizzard));
    }

    #[test]
    fn certain_episode_starts_and_expires() {
        let world = WorldId::new();
        let mut config = SimulationConfig::default();
        config.sandstorm.seasonal_chance.insert(Season::Summer, 1.0);
        config.sandstorm.episode_minutes = 2;
        let mut coordinator = EffectCoordinator::new(world, &config);
        let walker = [desert_walker(world)];

        poll(&mut coordinator, WeatherType::Clear, 0, &walker);
        assert!(coordinator.is_active(EffectKind::Sandstorm));
        assert_eq!(
            coordinator.scheduler(EffectKind::Sandstorm).unwrap().reason(),
            Some(ActivationReason::SeasonalEpisode)
        );
        assert_eq!(coordinator.episode().unwrap().until_tick, 2_400);

        poll(&mut coordinator, WeatherType::Clear, 1_200, &walker);
        assert!(coordinator.is_active(EffectKind::Sandstorm));

        let mut nobody_dry = walker.clone();
        nobody_dry[0].zone = ClimateZone::Temperate;
        let report = poll(&mut coordinator, WeatherType::Clear, 2_400, &nobody_dry);
        assert_eq!(report.stopped, vec![EffectKind::Sandstorm]);
        assert!(coordinator.episode().is_none());
    }

    #[test]
    fn episode_needs_someone_in_a_dry_zone() {
        let world = WorldId::new();
        let mut config = SimulationConfig::default();
        config.sandstorm.seasonal_chance.insert(Season::Summer, 1.0);
        let mut coordinator = EffectCoordinator::new(world, &config);
        let mut walker = desert_walker(world);
        walker.zone = ClimateZone::Arctic;
        poll(&mut coordinator, WeatherType::Clear, 0, &[walker]);
        assert!(!coordinator.is_active(EffectKind::Sandstorm));
    }

    #[test]
    fn weather_takes_over_an_episode() {
        let world = WorldId::new();
        let mut config = SimulationConfig::default();
        config.sandstorm.seasonal_chance.insert(Season::Summer, 1.0);
        let mut coordinator = EffectCoordinator::new(world, &config);
        poll(&mut coordinator, WeatherType::Clear, 0, &[desert_walker(world)]);

        let report = poll(&mut coordinator, WeatherType::Sandstorm, 1_200, &[]);
        assert_eq!(report.stopped, vec![EffectKind::Sandstorm]);
        assert!(report.started.contains(&EffectKind::Sandstorm));
        assert_eq!(
            coordinator.scheduler(EffectKind::Sandstorm).unwrap().reason(),
            Some(ActivationReason::Weather)
        );
        assert!(coordinator.episode().is_none());
    }

    #[test]
    fn stop_all_clears_everything() {
        let world = WorldId::new();
        let mut coordinator = EffectCoordinator::new(world, &SimulationConfig::default());
        poll(&mut coordinator, WeatherType::Thunderstorm, 0, &[]);
        let tasks = coordinator.stop_all(10);
        assert!(tasks.is_empty());
        assert!(coordinator.status().iter().all(|s| !s.active && s.members.is_empty()));
    }
}
