//! One world's sequential mutation timeline.
//!
//! A [`World`] owns everything that changes in one simulated world: its
//! clock, forecast, zone translator, progression ladder and effect
//! coordinator. All of it is mutated from [`World::tick`] and the command
//! methods, which the runner calls from a single task, so none of it needs
//! locking. The process-wide exposure cache and governor arrive through
//! [`WorldServices`] on every call.
//!
//! # Tick Order
//!
//! Each world tick runs, in order:
//!
//! 1. **Day rollover** (first tick of a day) -- close out drought counters,
//!    draw the new day's forecast, re-translate zones.
//! 2. **Coordinator poll** (every `coordinator_poll_ticks`, and right
//!    after a command) -- refresh season and weather, re-translate zones,
//!    start or stop effect schedulers.
//! 3. **Progression poll** (every `progression_poll_ticks`) -- advance the
//!    ladder, announce changes, play lightning cues and hail, write world
//!    weather flags.
//! 4. **Membership tick** (every `membership_interval_ticks`) -- gather
//!    occupant conditions and reconcile every active scheduler.

use std::collections::{BTreeMap, HashSet};
use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use stormfront_types::{
    ClimateZone, DayPeriod, EffectKind, OccupantId, ParticleEmission, ParticleKind,
    ProgressionStage, Season, SoundEmission, SoundKind, Vec3, WeatherType, WorldId,
};
use stormfront_world::{
    DroughtChange, HostServices, SpatialExposureCache, ZoneWeatherState, ZoneWeatherTranslator,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::{ClockError, WorldClock, minutes_to_ticks};
use crate::config::SimulationConfig;
use crate::coordinator::{CoordinationReport, EffectCoordinator, EffectStatus, SandstormEpisode};
use crate::effects::{
    MechanicsContext, MembershipReport, OccupantConditions, RenderWiring, scaled_count,
};
use crate::forecast::{DailyForecast, FlagWriter, WeatherForecastEngine, WeatherLock};
use crate::governor::PerformanceGovernor;
use crate::progression::{
    ProgressionEvent, ProgressionState, WeatherProgressionEngine, announcement, hail_announcement,
};

/// Hailstones per emission before governor scaling.
const HAIL_PARTICLES: u32 = 16;

/// Horizontal distance of a distant-lightning sound, in blocks.
const THUNDER_DISTANCE: f64 = 64.0;

/// Process-wide collaborators handed to every world call.
#[derive(Debug, Clone)]
pub struct WorldServices {
    /// Host collaborators.
    pub host: HostServices,
    /// Shared sky-exposure memo.
    pub exposure: Arc<SpatialExposureCache>,
    /// Shared load governor.
    pub governor: Arc<PerformanceGovernor>,
}

/// What the control surface can see about one occupant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupantReport {
    /// Occupant identifier.
    pub id: OccupantId,
    /// World the occupant is in.
    pub world: WorldId,
    /// Whether the occupant is online.
    pub online: bool,
    /// Climate zone at the occupant's position.
    pub zone: ClimateZone,
    /// Translated weather in that zone.
    pub zone_weather: WeatherType,
    /// Whether that zone is in drought.
    pub drought: bool,
    /// Temperature felt, in degrees Celsius.
    pub temperature: f64,
    /// Whether the occupant is sheltered.
    pub indoor: bool,
    /// Effects the occupant is subject to.
    pub memberships: Vec<EffectKind>,
}

/// Published read-only view of one world.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldStatus {
    /// World identifier.
    pub world: WorldId,
    /// Configured world name.
    pub name: String,
    /// Current world tick.
    pub tick: u64,
    /// One-based day index.
    pub day: u64,
    /// Current day period.
    pub period: DayPeriod,
    /// Ticks until the next day (and its forecast) begins.
    pub day_ends_in: u64,
    /// Season used by the last weather refresh.
    pub season: Season,
    /// Global weather at the last refresh.
    pub weather: WeatherType,
    /// Manual lock, if one is held.
    pub lock: Option<WeatherLock>,
    /// Today's forecast.
    pub forecast: Option<DailyForecast>,
    /// Progression ladder state.
    pub progression: ProgressionState,
    /// Per-zone weather, temperature and drought bookkeeping.
    pub zones: BTreeMap<ClimateZone, ZoneWeatherState>,
    /// Every effect scheduler.
    pub effects: Vec<EffectStatus>,
    /// Running seasonal sandstorm episode.
    pub episode: Option<SandstormEpisode>,
    /// Occupants seen at the last membership tick.
    pub occupants: Vec<OccupantReport>,
}

impl WorldStatus {
    /// Look up one occupant.
    pub fn occupant(&self, id: OccupantId) -> Option<&OccupantReport> {
        self.occupants.iter().find(|o| o.id == id)
    }

    /// Current members of one effect kind.
    pub fn members_of(&self, kind: EffectKind) -> &[OccupantId] {
        self.effects
            .iter()
            .find(|e| e.kind == kind)
            .map_or(&[], |e| e.members.as_slice())
    }
}

/// What one world tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickSummary {
    /// Tick that ran.
    pub tick: u64,
    /// Whether a new day began.
    pub day_rolled: bool,
    /// Droughts started or ended.
    pub drought: Vec<DroughtChange>,
    /// Scheduler starts and stops, when the coordinator polled.
    pub coordination: Option<CoordinationReport>,
    /// Progression events, when the ladder was polled.
    pub progression: Vec<ProgressionEvent>,
    /// Whether world weather flags were written.
    pub flags_written: bool,
    /// Membership changes per kind, when membership was reconciled.
    pub memberships: BTreeMap<EffectKind, MembershipReport>,
}

/// One simulated world.
#[derive(Debug)]
pub struct World {
    id: WorldId,
    name: String,
    config: Arc<SimulationConfig>,
    clock: WorldClock,
    forecast: WeatherForecastEngine,
    zones: ZoneWeatherTranslator,
    progression: WeatherProgressionEngine,
    coordinator: EffectCoordinator,
    flags: FlagWriter,
    rng: StdRng,
    render_seed: u64,
    season: Season,
    weather: WeatherType,
    conditions: Vec<OccupantConditions>,
    last_coordinated: Option<u64>,
    draining: Vec<JoinHandle<()>>,
}

impl World {
    /// Create a world at tick 0 with the day-1 forecast drawn.
    ///
    /// Random sources are derived from `seed`: the forecast uses it as is,
    /// progression `seed + 1`, mechanics `seed + 2`, render loops
    /// `seed + 10` and up.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if the engine's time settings
    /// are unusable.
    pub fn new(
        id: WorldId,
        name: impl Into<String>,
        config: Arc<SimulationConfig>,
        seed: u64,
    ) -> Result<Self, ClockError> {
        let clock = WorldClock::new(&config.engine)?;
        let season = clock.season();
        let mut forecast = WeatherForecastEngine::new(id, config.forecast.clone(), seed);
        let weather = forecast.current_weather(&clock);
        let mut zones = ZoneWeatherTranslator::new(id, config.zones.settings(), season);
        zones.recompute(weather, season);

        Ok(Self {
            id,
            name: name.into(),
            progression: WeatherProgressionEngine::new(
                id,
                config.progression.clone(),
                seed.wrapping_add(1),
            ),
            coordinator: EffectCoordinator::new(id, &config),
            config,
            clock,
            forecast,
            zones,
            flags: FlagWriter::default(),
            rng: StdRng::seed_from_u64(seed.wrapping_add(2)),
            render_seed: seed,
            season,
            weather,
            conditions: Vec::new(),
            last_coordinated: None,
            draining: Vec::new(),
        })
    }

    /// World identifier.
    pub const fn id(&self) -> WorldId {
        self.id
    }

    /// Configured name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The world clock.
    pub const fn clock(&self) -> &WorldClock {
        &self.clock
    }

    /// Global weather at the last refresh.
    pub const fn weather(&self) -> WeatherType {
        self.weather
    }

    /// Season at the last refresh.
    pub const fn season(&self) -> Season {
        self.season
    }

    /// The progression ladder.
    pub const fn progression(&self) -> &WeatherProgressionEngine {
        &self.progression
    }

    /// The zone translator.
    pub const fn zones(&self) -> &ZoneWeatherTranslator {
        &self.zones
    }

    /// The effect coordinator.
    pub const fn coordinator(&self) -> &EffectCoordinator {
        &self.coordinator
    }

    /// Occupant conditions gathered at the last membership tick.
    pub fn conditions(&self) -> &[OccupantConditions] {
        &self.conditions
    }

    /// Advance one world tick.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] if the clock cannot advance.
    /// Collaborator failures are logged and never returned.
    pub fn tick(&mut self, services: &WorldServices, now: Instant) -> Result<TickSummary, ClockError> {
        let tick = self.clock.advance()?;
        let engine = self.config.engine.clone();
        let mut summary = TickSummary {
            tick,
            ..TickSummary::default()
        };
        let mut gathered = false;

        if self.clock.is_day_start() {
            summary.day_rolled = true;
            summary.drought = self.zones.on_day_rollover();
            let forecast = self.forecast.forecast_for(&self.clock);
            self.season = self.resolve_season(&services.host);
            summary.drought.extend(self.refresh_weather());
            info!(
                world = %self.id,
                day = self.clock.day(),
                season = ?self.season,
                periods = ?forecast.periods,
                "New day"
            );
        }

        let coordinator_due = self
            .last_coordinated
            .is_none_or(|last| tick.saturating_sub(last) >= engine.coordinator_poll_ticks.max(1));
        if coordinator_due {
            self.season = self.resolve_season(&services.host);
            summary.drought.extend(self.refresh_weather());
            self.gather_conditions(services, now);
            gathered = true;
            let wiring = RenderWiring {
                governor: Arc::clone(&services.governor),
                cosmetics: Arc::clone(&services.host.cosmetics),
                interval: engine.render_interval(),
                seed: self.render_seed,
            };
            summary.coordination = Some(self.coordinator.coordinate(
                self.weather,
                self.season,
                tick,
                &self.conditions,
                &mut self.rng,
                Some(&wiring),
            ));
            self.draining.retain(|task| !task.is_finished());
            self.draining.extend(self.coordinator.take_draining());
            self.last_coordinated = Some(tick);
        }

        if tick.checked_rem(engine.progression_poll_ticks.max(1)) == Some(0) {
            self.progression_step(services, &mut summary);
        }

        if tick.checked_rem(engine.membership_interval_ticks.max(1)) == Some(0) {
            if !gathered {
                self.gather_conditions(services, now);
            }
            let mut ctx = MechanicsContext {
                world: self.id,
                tick,
                status: services.host.status.as_ref(),
                rng: &mut self.rng,
            };
            summary.memberships = self.coordinator.membership_tick(&self.conditions, &mut ctx);
        }

        Ok(summary)
    }

    /// Season from the provider, or the clock's calendar when the
    /// provider is absent or fails.
    fn resolve_season(&self, host: &HostServices) -> Season {
        let Some(provider) = host.seasons.as_deref() else {
            return self.clock.season();
        };
        match provider.season(self.id) {
            Ok(season) => season,
            Err(err) => {
                warn!(world = %self.id, error = %err, "Season lookup failed, using the world calendar");
                self.clock.season()
            }
        }
    }

    /// Re-read the global weather and re-translate every zone.
    fn refresh_weather(&mut self) -> Vec<DroughtChange> {
        let weather = self.forecast.current_weather(&self.clock);
        if weather != self.weather {
            info!(world = %self.id, from = %self.weather, to = %weather, "Global weather changed");
        }
        self.weather = weather;
        self.zones.recompute(weather, self.season)
    }

    fn gather_conditions(&mut self, services: &WorldServices, now: Instant) {
        let occupants = services.host.occupants.occupants(self.id);
        let present: HashSet<OccupantId> = occupants.iter().map(|o| o.id).collect();
        for gone in self.zones.retain_occupants(|id| present.contains(&id)) {
            services.governor.forget(gone);
        }

        let terrain = services.host.terrain.as_ref();
        let seasons = services.host.seasons.as_deref();
        let mut conditions = Vec::with_capacity(occupants.len());
        for occupant in occupants {
            if occupant.world != self.id {
                continue;
            }
            let zone = self.zones.zone_of(terrain, &occupant);
            let weather = self.zones.weather_in(zone);
            let temperature = self.zones.temperature_of(terrain, seasons, &occupant);
            let indoor = occupant.online
                && services
                    .exposure
                    .is_indoor(terrain, self.id, occupant.block(), now);
            conditions.push(OccupantConditions {
                occupant,
                zone,
                weather,
                temperature,
                indoor,
            });
        }
        self.conditions = conditions;
    }

    fn progression_step(&mut self, services: &WorldServices, summary: &mut TickSummary) {
        let tick = summary.tick;
        let flags = if self.config.progression.enabled {
            let target = self.forecast.current_weather(&self.clock);
            let events = self.progression.poll(tick, target);
            for event in &events {
                self.on_progression_event(services, *event);
            }
            if self.progression.state().hailing() {
                self.render_hail(services);
            }
            summary.progression = events;
            self.progression.flags(tick)
        } else {
            self.forecast.flags_for(&self.clock)
        };

        match self.flags.write(self.id, flags, tick, services.host.weather.as_ref()) {
            Ok(written) => summary.flags_written = written,
            Err(err) => warn!(world = %self.id, error = %err, "Weather flag write failed"),
        }
    }

    fn on_progression_event(&mut self, services: &WorldServices, event: ProgressionEvent) {
        match event {
            ProgressionEvent::StageChanged { to, .. } => self.broadcast(services, announcement(to)),
            ProgressionEvent::HailStarted => self.broadcast(services, hail_announcement(true)),
            ProgressionEvent::HailEnded => self.broadcast(services, hail_announcement(false)),
            ProgressionEvent::DistantLightning { count } => {
                debug!(world = %self.id, count, "Distant lightning");
                self.distant_thunder(services);
            }
        }
    }

    fn broadcast(&self, services: &WorldServices, text: &str) {
        if !self.config.progression.announce {
            return;
        }
        for c in self.conditions.iter().filter(|c| c.occupant.online) {
            if let Err(err) = services.host.status.send_message(c.occupant.id, text) {
                debug!(world = %self.id, occupant = %c.occupant.id, error = %err, "Announcement failed");
            }
        }
    }

    fn distant_thunder(&mut self, services: &WorldServices) {
        let governor = &services.governor;
        for c in self.conditions.iter().filter(|c| c.occupant.online && !c.indoor) {
            if governor.should_skip(c.occupant.id) {
                continue;
            }
            let angle = self.rng.random::<f64>() * TAU;
            let offset = Vec3::new(angle.cos() * THUNDER_DISTANCE, 0.0, angle.sin() * THUNDER_DISTANCE);
            let emission = SoundEmission {
                world: self.id,
                listener: c.occupant.id,
                kind: SoundKind::DistantThunder,
                position: c.occupant.position + offset,
                volume: 0.6,
                pitch: self.rng.random_range(0.5_f32..0.8),
            };
            if let Err(err) = services.host.cosmetics.play_sound(&emission) {
                debug!(world = %self.id, occupant = %c.occupant.id, error = %err, "Thunder cue failed");
            }
        }
    }

    fn render_hail(&mut self, services: &WorldServices) {
        let governor = &services.governor;
        let count = scaled_count(HAIL_PARTICLES, governor.multiplier());
        if count == 0 {
            return;
        }
        let now = Instant::now();
        for c in &self.conditions {
            let exposed = c.occupant.online && !c.indoor && c.weather.is_precipitating();
            if !exposed || governor.should_skip(c.occupant.id) {
                continue;
            }
            let emission = ParticleEmission {
                world: self.id,
                viewer: c.occupant.id,
                kind: ParticleKind::Hail,
                position: c.occupant.position + Vec3::new(0.0, 8.0, 0.0),
                velocity: Vec3::new(0.0, -1.5, 0.0),
                count,
            };
            match services.host.cosmetics.emit_particles(&emission) {
                Ok(()) => governor.record_emission(c.occupant.id, count, now),
                Err(err) => debug!(world = %self.id, occupant = %c.occupant.id, error = %err, "Hail emission failed"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Redraw today's forecast.
    pub fn regenerate_forecast(&mut self) -> DailyForecast {
        let forecast = self.forecast.regenerate(self.clock.day());
        self.after_command();
        forecast
    }

    /// Force `weather` for `minutes` simulated minutes.
    pub fn lock_weather(&mut self, weather: WeatherType, minutes: u64) -> WeatherLock {
        let lock = self.forecast.lock(weather, minutes_to_ticks(minutes), &self.clock);
        self.after_command();
        lock
    }

    /// Drop the manual lock.
    pub fn unlock_weather(&mut self) -> Option<WeatherLock> {
        let lock = self.forecast.unlock();
        self.after_command();
        lock
    }

    /// Refresh zones now and make the next tick re-coordinate effects.
    fn after_command(&mut self) {
        self.refresh_weather();
        self.last_coordinated = None;
    }

    /// Pick up a reloaded configuration.
    ///
    /// Clock settings only apply to worlds created after the reload.
    pub fn apply_config(&mut self, config: Arc<SimulationConfig>) {
        if config.engine.ticks_per_day != self.clock.ticks_per_day() {
            warn!(world = %self.id, "Day length changes apply on restart only");
        }
        if config.progression.enabled != self.config.progression.enabled {
            self.flags.reset();
        }
        self.forecast.reconfigure(config.forecast.clone());
        self.zones.reconfigure(config.zones.settings());
        self.progression.reconfigure(config.progression.clone());
        self.coordinator.reconfigure(&config);
        self.config = config;
        self.last_coordinated = None;
        info!(world = %self.id, "Configuration applied");
    }

    /// Stop every effect, clear membership and drop this world's share of
    /// the shared exposure and governor state.
    ///
    /// Returns the render tasks to await.
    pub fn shutdown(&mut self, services: &WorldServices) -> Vec<JoinHandle<()>> {
        let mut tasks = self.coordinator.stop_all(self.clock.tick());
        tasks.append(&mut self.draining);
        services.exposure.forget_world(self.id);
        for conditions in &self.conditions {
            services.governor.forget(conditions.occupant.id);
        }
        info!(
            world = %self.id,
            name = %self.name,
            tick = self.clock.tick(),
            day = self.clock.day(),
            weather = %self.weather,
            stage = ?self.progression.stage(),
            "World stopped"
        );
        tasks
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Report for one occupant seen at the last membership tick.
    pub fn occupant_report(&self, id: OccupantId) -> Option<OccupantReport> {
        self.conditions
            .iter()
            .find(|c| c.occupant.id == id)
            .map(|c| self.report_for(c))
    }

    fn report_for(&self, c: &OccupantConditions) -> OccupantReport {
        OccupantReport {
            id: c.occupant.id,
            world: self.id,
            online: c.occupant.online,
            zone: c.zone,
            zone_weather: c.weather,
            drought: self.zones.state(c.zone).is_some_and(|s| s.drought),
            temperature: c.temperature,
            indoor: c.indoor,
            memberships: self.coordinator.memberships_of(c.occupant.id),
        }
    }

    /// Current progression stage.
    pub const fn stage(&self) -> ProgressionStage {
        self.progression.stage()
    }

    /// Snapshot of everything the control surface may read.
    pub fn status(&self) -> WorldStatus {
        WorldStatus {
            world: self.id,
            name: self.name.clone(),
            tick: self.clock.tick(),
            day: self.clock.day(),
            period: self.clock.period(),
            day_ends_in: self.clock.ticks_until_day_end(),
            season: self.season,
            weather: self.weather,
            lock: self.forecast.held_lock(),
            forecast: self.forecast.forecast().copied(),
            progression: *self.progression.state(),
            zones: self.zones.states().clone(),
            effects: self.coordinator.status(),
            episode: self.coordinator.episode(),
            occupants: self.conditions.iter().map(|c| self.report_for(c)).collect(),
        }
    }
}
