//! Blizzard: freezing snow storms on exposed high ground in arctic zones.
//!
//! Members are slowed every membership tick and take periodic freeze
//! damage unless the host reports them invulnerable.

use stormfront_types::{
    ClimateZone, EffectKind, ParticleKind, SoundKind, StatusKind, Vec3, WeatherType,
};

use super::{
    EffectBehavior, EffectError, EffectMembership, MechanicsContext, OccupantConditions, RenderPlan,
};
use crate::config::{BlizzardConfig, SimulationConfig};

const LINES: [&str; 4] = [
    "The biting wind cuts straight through your clothes.",
    "Snow whips across your face; you can barely see your hands.",
    "Your fingers are going numb.",
    "Ice crusts over your gear.",
];

/// Blizzard rules.
#[derive(Debug, Clone)]
pub struct BlizzardEffect {
    config: BlizzardConfig,
}

impl BlizzardEffect {
    /// Create the behavior from its settings.
    pub const fn new(config: BlizzardConfig) -> Self {
        Self { config }
    }
}

impl EffectBehavior for BlizzardEffect {
    fn kind(&self) -> EffectKind {
        EffectKind::Blizzard
    }

    fn capacity(&self) -> usize {
        self.config.capacity
    }

    fn eligible(&self, c: &OccupantConditions) -> bool {
        !c.indoor
            && c.zone == ClimateZone::Arctic
            && c.weather == WeatherType::Blizzard
            && c.temperature <= self.config.max_temperature
            && c.occupant.altitude() >= self.config.min_altitude
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
            .apply_status(
                id,
                StatusKind::Slowness,
                self.config.status_duration_ticks,
                self.config.slowness_amplifier,
            )
            .map_err(|source| EffectError::host(kind, id, source))?;

        if membership.due(ctx.tick, self.config.damage_interval_ticks) {
            membership.last_effect_tick = Some(ctx.tick);
            if !ctx.status.is_invulnerable(id) {
                ctx.status
                    .damage(id, self.config.freeze_damage)
                    .map_err(|source| EffectError::host(kind, id, source))?;
            }
        }

        ctx.maybe_message(kind, id, self.config.common.message_chance, &LINES)?;
        Ok(())
    }

    fn render_plan(&self) -> RenderPlan {
        RenderPlan {
            particle: ParticleKind::Snowflake,
            particles_per_emission: self.config.particles_per_emission,
            spread: self.config.spread,
            rise: 3.0,
            velocity: Vec3::new(0.35, -0.25, 0.1),
            sound: Some(SoundKind::WindHowl),
            sound_chance: self.config.common.sound_chance,
            volume: 0.7,
            pitch: 0.8,
            min_interval: std::time::Duration::from_millis(self.config.common.min_emission_interval_ms),
        }
    }

    fn reconfigure(&mut self, config: &SimulationConfig) {
        self.config = config.blizzard.clone();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parking_lot::Mutex;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use stormfront_types::{Occupant, OccupantId, WorldId};
    use stormfront_world::{StatusSink, WorldError};

    use super::*;

    #[derive(Default)]
    struct Ledger {
        statuses: Mutex<Vec<StatusKind>>,
        damage: Mutex<Vec<f64>>,
        invulnerable: bool,
    }

    impl StatusSink for Ledger {
        fn apply_status(&self, _: OccupantId, kind: StatusKind, _: u32, _: u8) -> Result<(), WorldError> {
            self.statuses.lock().push(kind);
            Ok(())
        }
        fn damage(&self, _: OccupantId, amount: f64) -> Result<(), WorldError> {
            self.damage.lock().push(amount);
            Ok(())
        }
        fn is_invulnerable(&self, _: OccupantId) -> bool {
            self.invulnerable
        }
        fn push(&self, _: OccupantId, _: Vec3) -> Result<(), WorldError> {
            Ok(())
        }
        fn send_message(&self, _: OccupantId, _: &str) -> Result<(), WorldError> {
            Ok(())
        }
    }

    fn peak() -> OccupantConditions {
        OccupantConditions {
            occupant: Occupant {
                id: OccupantId::new(),
                world: WorldId::new(),
                position: Vec3::new(0.0, 90.0, 0.0),
                online: true,
            },
            zone: ClimateZone::Arctic,
            weather: WeatherType::Blizzard,
            temperature: -20.0,
            indoor: false,
        }
    }

    #[test]
    fn exposed_arctic_peak_is_eligible() {
        let effect = BlizzardEffect::new(BlizzardConfig::default());
        assert!(effect.eligible(&peak()));
    }

    #[test]
    fn each_gate_excludes() {
        let effect = BlizzardEffect::new(BlizzardConfig::default());
        let mut low = peak();
        low.occupant.position.y = 40.0;
        let mut sheltered = peak();
        sheltered.indoor = true;
        let mut mild = peak();
        mild.temperature = 3.0;
        let mut temperate = peak();
        temperate.zone = ClimateZone::Temperate;
        let mut snowing = peak();
        snowing.weather = WeatherType::Snow;
        for c in [low, sheltered, mild, temperate, snowing] {
            assert!(!effect.eligible(&c));
        }
    }

    fn apply_at(effect: &mut BlizzardEffect, ledger: &Ledger, tick: u64, m: &mut EffectMembership) {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ctx = MechanicsContext {
            world: WorldId::new(),
            tick,
            status: ledger,
            rng: &mut rng,
        };
        effect.apply(&mut ctx, &peak(), m).unwrap();
    }

    #[test]
    fn freeze_damage_on_interval() {
        let mut effect = BlizzardEffect::new(BlizzardConfig::default());
        let ledger = Ledger::default();
        let mut m = EffectMembership {
            joined_tick: 0,
            last_effect_tick: None,
            position: Vec3::ZERO,
        };
        for tick in [10, 20, 30, 40, 50] {
            apply_at(&mut effect, &ledger, tick, &mut m);
        }
        assert_eq!(ledger.statuses.lock().len(), 5);
        assert_eq!(ledger.damage.lock().len(), 2);
    }

    #[test]
    fn invulnerable_members_only_slowed() {
        let mut effect = BlizzardEffect::new(BlizzardConfig::default());
        let ledger = Ledger {
            invulnerable: true,
            ..Ledger::default()
        };
        let mut m = EffectMembership {
            joined_tick: 0,
            last_effect_tick: None,
            position: Vec3::ZERO,
        };
        apply_at(&mut effect, &ledger, 10, &mut m);
        assert!(ledger.damage.lock().is_empty());
        assert_eq!(ledger.statuses.lock().as_slice(), &[StatusKind::Slowness]);
    }
}
