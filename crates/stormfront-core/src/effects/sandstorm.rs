//! Sandstorm: blinding sand in dry zones.
//!
//! Started either because the zone weather turned to sandstorm or as a
//! seasonal episode over calm weather. During an episode the weather gate
//! is lifted and any exposed occupant in a dry zone qualifies.

use std::time::Duration;

use stormfront_types::{EffectKind, ParticleKind, SoundKind, StatusKind, Vec3, WeatherType};

use super::{
    ActivationReason, EffectBehavior, EffectError, EffectMembership, MechanicsContext,
    OccupantConditions, RenderPlan,
};
use crate::config::{SandstormConfig, SimulationConfig};

const LINES: [&str; 4] = [
    "Sand stings your eyes.",
    "The horizon disappears behind a wall of dust.",
    "Grit fills your mouth with every breath.",
    "The wind howls and the dunes shift around you.",
];

/// Sandstorm rules.
#[derive(Debug, Clone)]
pub struct SandstormEffect {
    config: SandstormConfig,
    seasonal: bool,
}

impl SandstormEffect {
    /// Create the behavior from its settings.
    pub const fn new(config: SandstormConfig) -> Self {
        Self {
            config,
            seasonal: false,
        }
    }

    /// Whether the current run is a seasonal episode.
    pub const fn seasonal(&self) -> bool {
        self.seasonal
    }
}

impl EffectBehavior for SandstormEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Sandstorm
    }

    fn capacity(&self) -> usize {
        self.config.capacity
    }

    fn eligible(&self, c: &OccupantConditions) -> bool {
        !c.indoor
            && c.zone.is_dry()
            && (self.seasonal || c.weather == WeatherType::Sandstorm)
            && c.occupant.altitude() >= self.config.min_altitude
    }

    fn on_start(&mut self, reason: ActivationReason) {
        self.seasonal = reason == ActivationReason::SeasonalEpisode;
    }

    fn on_stop(&mut self) {
        self.seasonal = false;
    }

    fn apply(
        &mut self,
        ctx: &mut MechanicsContext<'_>,
        c: &OccupantConditions,
        membership: &mut EffectMembership,
    ) -> Result<(), EffectError> {
        let id = c.occupant.id;
        let kind = self.kind();
        ctx.status
            .apply_status(id, StatusKind::Blindness, self.config.blindness_duration_ticks, 0)
            .map_err(|source| EffectError::host(kind, id, source))?;

        if membership.due(ctx.tick, self.config.damage_interval_ticks) {
            membership.last_effect_tick = Some(ctx.tick);
            if !ctx.status.is_invulnerable(id) {
                ctx.status
                    .damage(id, self.config.abrasion_damage)
                    .map_err(|source| EffectError::host(kind, id, source))?;
            }
        }

        ctx.maybe_message(kind, id, self.config.common.message_chance, &LINES)?;
        Ok(())
    }

    fn render_plan(&self) -> RenderPlan {
        RenderPlan {
            particle: ParticleKind::Dust,
            particles_per_emission: self.config.particles_per_emission,
            spread: self.config.spread,
            rise: 2.5,
            velocity: Vec3::new(0.5, 0.02, 0.2),
            sound: Some(SoundKind::SandHiss),
            sound_chance: self.config.common.sound_chance,
            volume: 0.6,
            pitch: 1.1,
            min_interval: Duration::from_millis(self.config.common.min_emission_interval_ms),
        }
    }

    fn reconfigure(&mut self, config: &SimulationConfig) {
        self.config = config.sandstorm.clone();
    }
}
