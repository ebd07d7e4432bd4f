//! Wind: ambient gusting on exposed high ground during unsettled weather.
//!
//! The [`WindModel`] is advanced once per membership tick. Strength
//! follows a slow sinusoid around `base_strength`, occasionally boosted by
//! a gust, and the direction occasionally veers by up to a quarter turn.
//! Members are pushed along the wind while strength exceeds the push
//! threshold.

use std::f64::consts::{FRAC_PI_2, TAU};
use std::time::Duration;

use rand::Rng;
use rand::rngs::StdRng;
use serde::Serialize;
use stormfront_types::{EffectKind, ParticleKind, SoundKind, Vec3};

use super::{
    EffectBehavior, EffectError, EffectMembership, MechanicsContext, OccupantConditions, RenderPlan,
};
use crate::clock::seconds_to_ticks;
use crate::config::{SimulationConfig, WindConfig};

const LINES: [&str; 3] = [
    "A gust nearly knocks you off your feet.",
    "The wind tugs at your cloak.",
    "You lean into the wind to keep your footing.",
];

/// Current wind strength and heading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindModel {
    /// Current strength (0 = calm).
    pub strength: f64,
    /// Heading in radians, 0 = +x, counter-clockwise toward +z.
    pub direction: f64,
    /// Tick the current gust ends, if gusting.
    pub gust_until: Option<u64>,
}

impl Default for WindModel {
    fn default() -> Self {
        Self {
            strength: 0.0,
            direction: 0.0,
            gust_until: None,
        }
    }
}

/// Fraction of the way through one oscillation period.
#[allow(clippy::cast_precision_loss)] // periods are far below 2^52 ticks
const fn phase_of(within: u64, period: u64) -> f64 {
    within as f64 / period as f64
}

impl WindModel {
    /// Advance the model to `tick`. Returns whether a gust began.
    pub fn update(&mut self, tick: u64, config: &WindConfig, rng: &mut StdRng) -> bool {
        let period = seconds_to_ticks(config.period_seconds).max(1);
        let within = tick.checked_rem(period).unwrap_or(0);
        let phase = phase_of(within, period) * TAU;
        let mut strength = config.amplitude.mul_add(phase.sin(), config.base_strength);

        if self.gust_until.is_some_and(|until| tick >= until) {
            self.gust_until = None;
        }
        let mut gust_began = false;
        if self.gust_until.is_none() && rng.random_bool(config.gust_chance.clamp(0.0, 1.0)) {
            self.gust_until = Some(tick.saturating_add(config.gust_ticks));
            gust_began = true;
        }
        if self.gust_until.is_some() {
            strength += config.gust_strength;
        }

        if rng.random_bool(config.direction_change_chance.clamp(0.0, 1.0)) {
            let veer = rng.random::<f64>().mul_add(2.0, -1.0) * FRAC_PI_2;
            self.direction = (self.direction + veer).rem_euclid(TAU);
        }

        self.strength = strength.max(0.0);
        gust_began
    }

    /// Unit vector along the heading.
    pub fn heading(&self) -> Vec3 {
        Vec3::new(self.direction.cos(), 0.0, self.direction.sin())
    }

    /// Whether a gust is blowing.
    pub const fn gusting(&self) -> bool {
        self.gust_until.is_some()
    }
}

/// Wind rules.
#[derive(Debug, Clone)]
pub struct WindEffect {
    config: WindConfig,
    model: WindModel,
    gust_began: bool,
}

impl WindEffect {
    /// Create the behavior from its settings.
    pub fn new(config: WindConfig) -> Self {
        Self {
            config,
            model: WindModel::default(),
            gust_began: false,
        }
    }

    /// Current wind.
    pub const fn model(&self) -> &WindModel {
        &self.model
    }
}

impl EffectBehavior for WindEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Wind
    }

    fn capacity(&self) -> usize {
        self.config.capacity
    }

    fn eligible(&self, c: &OccupantConditions) -> bool {
        !c.indoor && c.occupant.altitude() >= self.config.min_altitude
    }

    fn on_stop(&mut self) {
        self.model.gust_until = None;
        self.gust_began = false;
    }

    fn before_membership_tick(&mut self, tick: u64, rng: &mut StdRng) {
        self.gust_began = self.model.update(tick, &self.config, rng);
    }

    fn apply(
        &mut self,
        ctx: &mut MechanicsContext<'_>,
        c: &OccupantConditions,
        _membership: &mut EffectMembership,
    ) -> Result<(), EffectError> {
        let id = c.occupant.id;
        let kind = self.kind();
        let excess = self.model.strength - self.config.push_threshold;
        if excess > 0.0 {
            let velocity = self.model.heading().scale(excess * self.config.push_factor);
            ctx.status
                .push(id, velocity)
                .map_err(|source| EffectError::host(kind, id, source))?;
        }
        if self.gust_began {
            ctx.maybe_message(kind, id, self.config.common.message_chance, &LINES)?;
        }
        Ok(())
    }

    fn render_plan(&self) -> RenderPlan {
        let sound_chance = if self.model.gusting() {
            (self.config.common.sound_chance * 3.0).min(1.0)
        } else {
            self.config.common.sound_chance
        };
        RenderPlan {
            particle: ParticleKind::Cloud,
            particles_per_emission: self.config.particles_per_emission,
            spread: self.config.spread,
            rise: 2.0,
            velocity: self.model.heading().scale(self.model.strength * 0.5),
            sound: Some(SoundKind::Gust),
            sound_chance,
            volume: 0.5,
            pitch: 1.0,
            min_interval: Duration::from_millis(self.config.common.min_emission_interval_ms),
        }
    }

    fn reconfigure(&mut self, config: &SimulationConfig) {
        self.config = config.wind.clone();
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn calm_config() -> WindConfig {
        WindConfig {
            gust_chance: 0.0,
            direction_change_chance: 0.0,
            ..WindConfig::default()
        }
    }

    #[test]
    fn strength_oscillates_around_base() {
        let config = calm_config();
        let mut model = WindModel::default();
        let mut rng = StdRng::seed_from_u64(1);
        let period = seconds_to_ticks(config.period_seconds);

        model.update(0, &config, &mut rng);
        assert!((model.strength - config.base_strength).abs() < 1e-9);
        model.update(period / 4, &config, &mut rng);
        assert!((model.strength - (config.base_strength + config.amplitude)).abs() < 1e-9);
        model.update(period * 3 / 4, &config, &mut rng);
        assert!((model.strength - (config.base_strength - config.amplitude)).abs() < 1e-9);
    }

    #[test]
    fn gusts_add_strength_then_expire() {
        let config = WindConfig {
            gust_chance: 1.0,
            direction_change_chance: 0.0,
            gust_ticks: 40,
            ..WindConfig::default()
        };
        let mut model = WindModel::default();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(model.update(0, &config, &mut rng));
        assert!(model.gusting());
        assert!((model.strength - (config.base_strength + config.gust_strength)).abs() < 1e-9);
        assert!(!model.update(20, &config, &mut rng));

        let calm = calm_config();
        model.update(40, &calm, &mut rng);
        assert!(!model.gusting());
    }

    #[test]
    fn veering_stays_within_a_turn() {
        let config = WindConfig {
            direction_change_chance: 1.0,
            gust_chance: 0.0,
            ..WindConfig::default()
        };
        let mut model = WindModel::default();
        let mut rng = StdRng::seed_from_u64(9);
        for tick in 0..500 {
            let before = model.direction;
            model.update(tick, &config, &mut rng);
            assert!((0.0..TAU).contains(&model.direction));
            let delta = (model.direction - before).rem_euclid(TAU);
            assert!(delta <= FRAC_PI_2 + 1e-9 || delta >= TAU - FRAC_PI_2 - 1e-9);
        }
    }

    #[test]
    fn heading_is_unit_length() {
        let model = WindModel {
            strength: 1.0,
            direction: 1.0,
            gust_until: None,
        };
        assert!((model.heading().length() - 1.0).abs() < 1e-9);
    }
}
