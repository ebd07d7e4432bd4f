//! Minute-scale weather progression.
//!
//! The forecast says *what* the weather should be; the progression ladder
//! says *how* the world gets there. Every storm passes through
//! `PreStorm`, builds one stage at a time toward the target, and winds
//! down through `PostStorm`:
//!
//! ```text
//! Clear -> PreStorm -> LightRain -> HeavyRain -> Thunderstorm -> PostStorm -> Clear
//!             \_____________________________________________________________/
//!                                (fizzles back to Clear)
//! ```
//!
//! # Retargeting
//!
//! When the target weather changes mid-storm:
//!
//! | Current stage        | New target                    | Next stage         |
//! |----------------------|-------------------------------|--------------------|
//! | Clear                | any precipitation             | PreStorm           |
//! | PreStorm             | clear                         | Clear              |
//! | LightRain..Thunder   | clear or a lighter stage      | PostStorm          |
//! | PostStorm            | anything                      | Clear, then rebuild|
//!
//! Otherwise the ladder keeps climbing one stage per dwell period until it
//! reaches the target's resting stage (see [`WeatherType::resting_stage`])
//! and holds there.
//!
//! # Extras
//!
//! - Hail may start when heavy rain begins and clears itself after a fixed
//!   duration or when the stage changes.
//! - During `PreStorm` a distant-lightning cue fires on a fixed interval.
//!   The cue counter resets every time `PreStorm` is entered.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use stormfront_types::{ProgressionStage, WeatherFlags, WeatherType, WorldId};
use tracing::{debug, info, warn};

use crate::clock::{minutes_to_ticks, seconds_to_ticks};
use crate::config::ProgressionConfig;

/// Something that happened during a progression poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionEvent {
    /// The ladder moved.
    StageChanged {
        /// Stage left.
        from: ProgressionStage,
        /// Stage entered.
        to: ProgressionStage,
    },
    /// Hail started falling.
    HailStarted,
    /// Hail stopped.
    HailEnded,
    /// A distant-lightning cue during the pre-storm stage.
    DistantLightning {
        /// Cues fired since entering the current pre-storm stage.
        count: u32,
    },
}

/// Progression state of one world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressionState {
    /// Current stage.
    pub stage: ProgressionStage,
    /// Weather the ladder is heading toward.
    pub target: WeatherType,
    /// Tick the current stage was entered.
    pub entered_at: u64,
    /// Tick of the next scheduled step, if the ladder is still moving.
    pub next_transition: Option<u64>,
    /// Tick hail started, while it lasts.
    pub hail_started: Option<u64>,
    /// Distant-lightning cues since entering pre-storm.
    pub lightning_count: u32,
    /// Tick of the last distant-lightning cue.
    pub last_lightning: u64,
}

impl Default for ProgressionState {
    fn default() -> Self {
        Self {
            stage: ProgressionStage::Clear,
            target: WeatherType::Clear,
            entered_at: 0,
            next_transition: None,
            hail_started: None,
            lightning_count: 0,
            last_lightning: 0,
        }
    }
}

impl ProgressionState {
    /// Whether hail is falling.
    pub const fn hailing(&self) -> bool {
        self.hail_started.is_some()
    }
}

/// The stage the ladder moves to next from `stage` when heading to `target`.
///
/// Returns `stage` itself when the ladder should hold.
pub const fn next_stage(stage: ProgressionStage, target: WeatherType) -> ProgressionStage {
    use ProgressionStage::{Clear, HeavyRain, LightRain, PostStorm, PreStorm, Thunderstorm};

    let resting = target.resting_stage();
    match stage {
        Clear => {
            if matches!(resting, Clear) {
                Clear
            } else {
                PreStorm
            }
        }
        PreStorm => {
            if matches!(resting, Clear) {
                Clear
            } else {
                LightRain
            }
        }
        LightRain => match resting {
            Clear | PreStorm | PostStorm => PostStorm,
            LightRain => LightRain,
            HeavyRain | Thunderstorm => HeavyRain,
        },
        HeavyRain => match resting {
            HeavyRain => HeavyRain,
            Thunderstorm => Thunderstorm,
            Clear | PreStorm | LightRain | PostStorm => PostStorm,
        },
        Thunderstorm => {
            if matches!(resting, Thunderstorm) {
                Thunderstorm
            } else {
                PostStorm
            }
        }
        PostStorm => Clear,
    }
}

/// World flags shown while a stage holds.
pub const fn stage_flags(stage: ProgressionStage, duration_ticks: u64) -> WeatherFlags {
    let (storm, thundering) = match stage {
        ProgressionStage::Clear | ProgressionStage::PreStorm => (false, false),
        ProgressionStage::LightRain | ProgressionStage::HeavyRain | ProgressionStage::PostStorm => {
            (true, false)
        }
        ProgressionStage::Thunderstorm => (true, true),
    };
    WeatherFlags {
        storm,
        thundering,
        duration_ticks,
    }
}

/// Message broadcast to a world's occupants when a stage begins.
pub const fn announcement(stage: ProgressionStage) -> &'static str {
    match stage {
        ProgressionStage::Clear => "The skies clear.",
        ProgressionStage::PreStorm => "Dark clouds gather on the horizon...",
        ProgressionStage::LightRain => "A light rain begins to fall.",
        ProgressionStage::HeavyRain => "The rain grows heavy.",
        ProgressionStage::Thunderstorm => "Thunder cracks overhead as the storm breaks!",
        ProgressionStage::PostStorm => "The storm begins to pass.",
    }
}

/// Message broadcast when hail starts or stops.
pub const fn hail_announcement(started: bool) -> &'static str {
    if started {
        "Hailstones start hammering down!"
    } else {
        "The hail lets up."
    }
}

/// Per-world progression state machine.
#[derive(Debug)]
pub struct WeatherProgressionEngine {
    world: WorldId,
    settings: ProgressionConfig,
    state: ProgressionState,
    rng: StdRng,
}

impl WeatherProgressionEngine {
    /// Create an engine resting at `Clear`.
    pub fn new(world: WorldId, settings: ProgressionConfig, seed: u64) -> Self {
        Self {
            world,
            settings,
            state: ProgressionState::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Replace the tunables. Scheduled deadlines are kept.
    pub const fn reconfigure(&mut self, settings: ProgressionConfig) {
        self.settings = settings;
    }

    /// Current state.
    pub const fn state(&self) -> &ProgressionState {
        &self.state
    }

    /// Current stage.
    pub const fn stage(&self) -> ProgressionStage {
        self.state.stage
    }

    /// Dwell time of a stage, in ticks (at least 1).
    pub fn dwell_ticks(&self, stage: ProgressionStage) -> u64 {
        let minutes = &self.settings.stage_minutes;
        let dwell = match stage {
            ProgressionStage::Clear => minutes.clear,
            ProgressionStage::PreStorm => minutes.pre_storm,
            ProgressionStage::LightRain => minutes.light_rain,
            ProgressionStage::HeavyRain => minutes.heavy_rain,
            ProgressionStage::Thunderstorm => minutes.thunderstorm,
            ProgressionStage::PostStorm => minutes.post_storm,
        };
        minutes_to_ticks(dwell).max(1)
    }

    /// Ticks the current stage's flags should hold for.
    pub fn flags_duration(&self, now: u64) -> u64 {
        self.state
            .next_transition
            .map_or_else(|| self.dwell_ticks(self.state.stage), |at| at.saturating_sub(now))
            .max(1)
    }

    /// Flags for the current stage.
    pub fn flags(&self, now: u64) -> WeatherFlags {
        stage_flags(self.state.stage, self.flags_duration(now))
    }

    /// Observe the target weather at `now` and advance the ladder.
    ///
    /// At most one stage step happens per poll, plus at most one restart
    /// caused by a target change.
    pub fn poll(&mut self, now: u64, target: WeatherType) -> Vec<ProgressionEvent> {
        let mut events = Vec::new();

        if let Some(started) = self.state.hail_started {
            let lasted = now.saturating_sub(started);
            if lasted >= seconds_to_ticks(self.settings.hail_seconds) {
                self.end_hail(&mut events);
            }
        }

        if target != self.state.target {
            self.retarget(now, target, &mut events);
        }

        if self.state.stage == ProgressionStage::PreStorm {
            let interval = seconds_to_ticks(self.settings.lightning_interval_seconds).max(1);
            if now.saturating_sub(self.state.last_lightning) >= interval {
                self.state.lightning_count = self.state.lightning_count.saturating_add(1);
                self.state.last_lightning = now;
                events.push(ProgressionEvent::DistantLightning {
                    count: self.state.lightning_count,
                });
            }
        }

        if let Some(deadline) = self.state.next_transition {
            if now >= deadline {
                let next = next_stage(self.state.stage, self.state.target);
                if next == self.state.stage {
                    self.state.next_transition = None;
                } else {
                    self.enter(next, now, &mut events);
                }
            }
        }

        events
    }

    fn retarget(&mut self, now: u64, target: WeatherType, events: &mut Vec<ProgressionEvent>) {
        let previous = self.state.target;
        self.state.target = target;
        let stage = self.state.stage;
        let resting = target.resting_stage();
        debug!(world = %self.world, from = %previous, to = %target, ?stage, "Progression target changed");

        let restart = match stage {
            ProgressionStage::Clear if resting != ProgressionStage::Clear => {
                Some(ProgressionStage::PreStorm)
            }
            ProgressionStage::PreStorm if resting == ProgressionStage::Clear => {
                Some(ProgressionStage::Clear)
            }
            ProgressionStage::LightRain | ProgressionStage::HeavyRain | ProgressionStage::Thunderstorm
                if resting == ProgressionStage::Clear
                    || resting.ladder_index() < stage.ladder_index() =>
            {
                Some(ProgressionStage::PostStorm)
            }
            _ => None,
        };

        match restart {
            Some(next) => self.enter(next, now, events),
            None => {
                let moving = next_stage(stage, target) != stage;
                if moving && self.state.next_transition.is_none() {
                    self.state.next_transition = Some(now.saturating_add(self.dwell_ticks(stage)));
                } else if !moving {
                    self.state.next_transition = None;
                }
            }
        }
    }

    fn enter(&mut self, next: ProgressionStage, now: u64, events: &mut Vec<ProgressionEvent>) {
        let from = self.state.stage;
        if !from.can_transition_to(next) {
            warn!(world = %self.world, ?from, to = ?next, "Refusing illegal progression step");
            return;
        }

        if from == ProgressionStage::HeavyRain {
            self.end_hail(events);
        }

        self.state.stage = next;
        self.state.entered_at = now;
        self.state.next_transition = if next_stage(next, self.state.target) == next {
            None
        } else {
            Some(now.saturating_add(self.dwell_ticks(next)))
        };

        if next == ProgressionStage::PreStorm {
            self.state.lightning_count = 0;
            self.state.last_lightning = now;
        }

        info!(world = %self.world, ?from, to = ?next, target = %self.state.target, "Weather progressed");
        events.push(ProgressionEvent::StageChanged { from, to: next });

        if next == ProgressionStage::HeavyRain
            && self.rng.random_bool(self.settings.hail_chance.clamp(0.0, 1.0))
        {
            self.state.hail_started = Some(now);
            info!(world = %self.world, "Hail started");
            events.push(ProgressionEvent::HailStarted);
        }
    }

    fn end_hail(&mut self, events: &mut Vec<ProgressionEvent>) {
        if self.state.hail_started.take().is_some() {
            info!(world = %self.world, "Hail ended");
            events.push(ProgressionEvent::HailEnded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TICKS_PER_MINUTE;

    fn engine() -> WeatherProgressionEngine {
        WeatherProgressionEngine::new(WorldId::new(), ProgressionConfig::default(), 3)
    }

    fn stages(events: &[ProgressionEvent]) -> Vec<ProgressionStage> {
        events
            .iter()
            .filter_map(|e| match e {
                ProgressionEvent::StageChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }

    /// Poll every 20 ticks until `until`, collecting every stage entered.
    fn run(engine: &mut WeatherProgressionEngine, from: u64, until: u64, target: WeatherType) -> Vec<ProgressionStage> {
        let mut seen = Vec::new();
        let mut now = from;
        while now <= until {
            seen.extend(stages(&engine.poll(now, target)));
            now += 20;
        }
        seen
    }

    #[test]
    fn thunderstorm_climbs_the_full_ladder() {
        let mut engine = engine();
        let seen = run(&mut engine, 0, 60 * TICKS_PER_MINUTE, WeatherType::Thunderstorm);
        assert_eq!(
            seen,
            vec![
                ProgressionStage::PreStorm,
                ProgressionStage::LightRain,
                ProgressionStage::HeavyRain,
                ProgressionStage::Thunderstorm,
            ]
        );
        assert_eq!(engine.state().next_transition, None);
    }

    #[test]
    fn clearing_passes_post_storm() {
        let mut engine = engine();
        run(&mut engine, 0, 30 * TICKS_PER_MINUTE, WeatherType::HeavyRain);
        assert_eq!(engine.stage(), ProgressionStage::HeavyRain);

        let start = 31 * TICKS_PER_MINUTE;
        let seen = run(&mut engine, start, start + 10 * TICKS_PER_MINUTE, WeatherType::Clear);
        assert_eq!(seen, vec![ProgressionStage::PostStorm, ProgressionStage::Clear]);
    }

    #[test]
    fn light_rain_holds() {
        let mut engine = engine();
        let seen = run(&mut engine, 0, 30 * TICKS_PER_MINUTE, WeatherType::Snow);
        assert_eq!(seen, vec![ProgressionStage::PreStorm, ProgressionStage::LightRain]);
        assert_eq!(engine.stage(), ProgressionStage::LightRain);
    }

    #[test]
    fn fizzling_storm_returns_to_clear() {
        let mut engine = engine();
        engine.poll(0, WeatherType::HeavyRain);
        assert_eq!(engine.stage(), ProgressionStage::PreStorm);
        let events = engine.poll(20, WeatherType::Clear);
        assert_eq!(stages(&events), vec![ProgressionStage::Clear]);
    }

    #[test]
    fn lighter_target_winds_down() {
        let mut engine = engine();
        run(&mut engine, 0, 60 * TICKS_PER_MINUTE, WeatherType::Thunderstorm);
        let events = engine.poll(61 * TICKS_PER_MINUTE, WeatherType::LightRain);
        assert_eq!(stages(&events), vec![ProgressionStage::PostStorm]);
    }

    #[test]
    fn storm_during_post_storm_rebuilds_through_clear() {
        let mut engine = engine();
        run(&mut engine, 0, 60 * TICKS_PER_MINUTE, WeatherType::HeavyRain);
        engine.poll(61 * TICKS_PER_MINUTE, WeatherType::Clear);
        assert_eq!(engine.stage(), ProgressionStage::PostStorm);

        let start = 61 * TICKS_PER_MINUTE + 20;
        let seen = run(&mut engine, start, start + 20 * TICKS_PER_MINUTE, WeatherType::Thunderstorm);
        assert_eq!(seen.first(), Some(&ProgressionStage::Clear));
        assert_eq!(seen.get(1), Some(&ProgressionStage::PreStorm));
        assert_eq!(engine.stage(), ProgressionStage::Thunderstorm);
    }

    #[test]
    fn every_observed_step_is_legal() {
        let targets = [
            WeatherType::Thunderstorm,
            WeatherType::Clear,
            WeatherType::LightRain,
            WeatherType::HeavyRain,
            WeatherType::Clear,
            WeatherType::Blizzard,
            WeatherType::Sandstorm,
        ];
        let mut engine = engine();
        let mut now = 0;
        for target in targets.iter().cycle().take(40) {
            for _ in 0..150 {
                for event in engine.poll(now, *target) {
                    if let ProgressionEvent::StageChanged { from, to } = event {
                        assert!(from.can_transition_to(to), "{from:?} -> {to:?}");
                    }
                }
                now += 20;
            }
        }
    }

    #[test]
    fn lightning_cues_during_pre_storm() {
        let settings = ProgressionConfig {
            lightning_interval_seconds: 5,
            ..ProgressionConfig::default()
        };
        let mut engine = WeatherProgressionEngine::new(WorldId::new(), settings, 1);
        engine.poll(0, WeatherType::Thunderstorm);

        let mut counts = Vec::new();
        let mut now = 20;
        while engine.stage() == ProgressionStage::PreStorm {
            for event in engine.poll(now, WeatherType::Thunderstorm) {
                if let ProgressionEvent::DistantLightning { count } = event {
                    counts.push(count);
                }
            }
            now += 20;
        }
        // Two minutes of pre-storm, one cue every five seconds; the last
        // cue lands on the poll that leaves the stage.
        assert_eq!(counts.len(), 24);
        assert_eq!(counts.first(), Some(&1));
        assert!(counts.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[test]
    fn hail_clears_itself() {
        let settings = ProgressionConfig {
            hail_chance: 1.0,
            hail_seconds: 10,
            ..ProgressionConfig::default()
        };
        let mut engine = WeatherProgressionEngine::new(WorldId::new(), settings, 1);
        let mut now = 0;
        let mut started_at = None;
        while started_at.is_none() && now < 60 * TICKS_PER_MINUTE {
            if engine.poll(now, WeatherType::HeavyRain).contains(&ProgressionEvent::HailStarted) {
                started_at = Some(now);
            }
            now += 20;
        }
        let started_at = started_at.unwrap_or_default();
        assert!(engine.state().hailing());

        let events = engine.poll(started_at + 200, WeatherType::HeavyRain);
        assert!(events.contains(&ProgressionEvent::HailEnded));
        assert!(!engine.state().hailing());
    }

    #[test]
    fn flags_follow_stage() {
        assert!(!stage_flags(ProgressionStage::PreStorm, 1).storm);
        assert!(stage_flags(ProgressionStage::PostStorm, 1).storm);
        let thunder = stage_flags(ProgressionStage::Thunderstorm, 1);
        assert!(thunder.storm && thunder.thundering);
    }

    #[test]
    fn every_stage_has_an_announcement() {
        for stage in [
            ProgressionStage::Clear,
            ProgressionStage::PreStorm,
            ProgressionStage::LightRain,
            ProgressionStage::HeavyRain,
            ProgressionStage::Thunderstorm,
            ProgressionStage::PostStorm,
        ] {
            assert!(!announcement(stage).is_empty());
        }
    }
}
