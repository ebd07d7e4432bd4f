//! Localized severe-weather effects.
//!
//! A [`LocalizedEffectScheduler`] owns one [`EffectBehavior`] (blizzard,
//! sandstorm or wind) and drives it on two timelines:
//!
//! - The **membership tick** runs on the world's mutation timeline. It
//!   evicts members who left, went offline or stopped qualifying, admits
//!   new ones up to capacity, applies mechanics (statuses, damage, pushes,
//!   messages), and publishes a read-only [`MembershipSnapshot`].
//! - The **render tick** runs in its own task on a real-time interval. It
//!   only reads the latest snapshot and the governor, and only writes to
//!   the cosmetic sink.
//!
//! The two timelines share nothing mutable: the snapshot is swapped
//! behind an [`Arc`] and the active flag is an [`AtomicBool`].
//!
//! # Render Throttling
//!
//! Per occupant, an emission is dropped when the previous one was less
//! than the plan's minimum interval ago, or when the governor asks to
//! skip. Particle counts are scaled by the governor multiplier and by
//! `1 / sqrt(crowding)` so dense groups do not multiply output.

pub mod blizzard;
pub mod sandstorm;
pub mod wind;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use stormfront_types::{
    ClimateZone, EffectKind, Occupant, OccupantId, ParticleEmission, ParticleKind, SoundEmission,
    SoundKind, Vec3, WeatherType, WorldId,
};
use stormfront_world::{CosmeticSink, StatusSink, WorldError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;
use crate::governor::PerformanceGovernor;

pub use blizzard::BlizzardEffect;
pub use sandstorm::SandstormEffect;
pub use wind::{WindEffect, WindModel};

/// Horizontal cell edge used to measure crowding, in blocks.
const CROWD_CELL: f64 = 16.0;

/// Errors raised while applying an effect to one occupant.
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    /// A host sink rejected a mechanic.
    #[error("{kind} effect on occupant {occupant} failed: {source}")]
    Host {
        /// Effect being applied.
        kind: EffectKind,
        /// Affected occupant.
        occupant: OccupantId,
        /// The collaborator error.
        #[source]
        source: WorldError,
    },
}

impl EffectError {
    /// Wrap a collaborator error.
    pub const fn host(kind: EffectKind, occupant: OccupantId, source: WorldError) -> Self {
        Self::Host {
            kind,
            occupant,
            source,
        }
    }
}

/// Why a scheduler was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationReason {
    /// Global weather calls for the effect.
    Weather,
    /// A seasonal episode independent of the weather.
    SeasonalEpisode,
}

/// Everything an effect needs to know about one occupant, gathered once
/// per membership tick and shared by every scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupantConditions {
    /// The occupant as read from the presence provider.
    pub occupant: Occupant,
    /// Climate zone at the occupant's position.
    pub zone: ClimateZone,
    /// Zone weather at the occupant's position.
    pub weather: WeatherType,
    /// Temperature felt by the occupant.
    pub temperature: f64,
    /// Whether the occupant is sheltered from the sky.
    pub indoor: bool,
}

/// Per-member bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectMembership {
    /// World tick the occupant joined.
    pub joined_tick: u64,
    /// World tick of the last damage or status hit.
    pub last_effect_tick: Option<u64>,
    /// Position at the last membership tick.
    pub position: Vec3,
}

impl EffectMembership {
    /// Whether at least `interval` ticks passed since the last hit.
    pub fn due(&self, tick: u64, interval: u64) -> bool {
        self.last_effect_tick
            .is_none_or(|last| tick.saturating_sub(last) >= interval)
    }
}

/// Mutation-timeline collaborators handed to [`EffectBehavior::apply`].
pub struct MechanicsContext<'a> {
    /// World being ticked.
    pub world: WorldId,
    /// Current world tick.
    pub tick: u64,
    /// Status and damage surface.
    pub status: &'a dyn StatusSink,
    /// The world's random source.
    pub rng: &'a mut StdRng,
}

impl MechanicsContext<'_> {
    /// Send one of `lines` with probability `chance`.
    ///
    /// # Errors
    ///
    /// Returns the sink's error wrapped as [`EffectError::Host`].
    pub fn maybe_message(
        &mut self,
        kind: EffectKind,
        occupant: OccupantId,
        chance: f64,
        lines: &[&str],
    ) -> Result<bool, EffectError> {
        if !self.rng.random_bool(chance.clamp(0.0, 1.0)) {
            return Ok(false);
        }
        let Some(line) = lines.choose(self.rng) else {
            return Ok(false);
        };
        self.status
            .send_message(occupant, line)
            .map_err(|source| EffectError::host(kind, occupant, source))?;
        Ok(true)
    }
}

/// Data-driven description of an effect's cosmetic output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderPlan {
    /// Particle type.
    pub particle: ParticleKind,
    /// Particles per emission before scaling.
    pub particles_per_emission: u32,
    /// Horizontal scatter radius, in blocks.
    pub spread: f64,
    /// Maximum height above the feet, in blocks.
    pub rise: f64,
    /// Particle velocity.
    pub velocity: Vec3,
    /// Accompanying sound.
    pub sound: Option<SoundKind>,
    /// Chance per emission of the sound, before scaling.
    pub sound_chance: f64,
    /// Sound volume.
    pub volume: f32,
    /// Sound pitch.
    pub pitch: f32,
    /// Minimum time between emissions to one occupant.
    pub min_interval: Duration,
}

/// A localized effect's rules.
pub trait EffectBehavior: Send {
    /// Which effect this is.
    fn kind(&self) -> EffectKind;

    /// Maximum concurrent members.
    fn capacity(&self) -> usize;

    /// Whether an online occupant qualifies for membership.
    fn eligible(&self, conditions: &OccupantConditions) -> bool;

    /// Called when the scheduler starts.
    fn on_start(&mut self, _reason: ActivationReason) {}

    /// Called when the scheduler stops.
    fn on_stop(&mut self) {}

    /// Called once per membership tick before any member is processed.
    fn before_membership_tick(&mut self, _tick: u64, _rng: &mut StdRng) {}

    /// Apply mechanics to one member.
    ///
    /// # Errors
    ///
    /// Returns [`EffectError`] if a host sink fails; the scheduler logs
    /// it and continues with the next member.
    fn apply(
        &mut self,
        ctx: &mut MechanicsContext<'_>,
        conditions: &OccupantConditions,
        membership: &mut EffectMembership,
    ) -> Result<(), EffectError>;

    /// Current cosmetic output description.
    fn render_plan(&self) -> RenderPlan;

    /// Pick up new tunables.
    fn reconfigure(&mut self, config: &SimulationConfig);
}

/// A member as seen by the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemberView {
    /// Occupant identifier.
    pub id: OccupantId,
    /// Position at the last membership tick.
    pub position: Vec3,
    /// Members sharing the occupant's crowd cell (at least 1).
    pub crowding: u32,
}

/// Read-only membership published to the render loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MembershipSnapshot {
    /// World the effect runs in.
    pub world: WorldId,
    /// Effect kind.
    pub kind: EffectKind,
    /// Whether the scheduler was active when published.
    pub active: bool,
    /// World tick of publication.
    pub tick: u64,
    /// Current members.
    pub members: Vec<MemberView>,
    /// Cosmetic plan at publication.
    pub plan: RenderPlan,
}

impl MembershipSnapshot {
    /// A snapshot with no members.
    pub const fn empty(world: WorldId, kind: EffectKind, active: bool, tick: u64, plan: RenderPlan) -> Self {
        Self {
            world,
            kind,
            active,
            tick,
            members: Vec::new(),
            plan,
        }
    }
}

/// Atomically swappable snapshot slot.
#[derive(Debug, Clone)]
pub struct SnapshotCell(Arc<RwLock<Arc<MembershipSnapshot>>>);

impl SnapshotCell {
    /// Create a slot holding `snapshot`.
    pub fn new(snapshot: MembershipSnapshot) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(snapshot))))
    }

    /// The latest snapshot.
    pub fn load(&self) -> Arc<MembershipSnapshot> {
        Arc::clone(&self.0.read())
    }

    /// Publish a new snapshot.
    pub fn store(&self, snapshot: MembershipSnapshot) {
        *self.0.write() = Arc::new(snapshot);
    }
}

/// Render-loop collaborators supplied when a scheduler starts.
#[derive(Clone)]
pub struct RenderWiring {
    /// Process-wide governor.
    pub governor: Arc<PerformanceGovernor>,
    /// Cosmetic output surface.
    pub cosmetics: Arc<dyn CosmeticSink>,
    /// Real time between render ticks.
    pub interval: Duration,
    /// Seed for the render loop's random source.
    pub seed: u64,
}

impl core::fmt::Debug for RenderWiring {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RenderWiring")
            .field("interval", &self.interval)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

/// Outcome of one membership tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipReport {
    /// Occupants admitted this tick.
    pub admitted: Vec<OccupantId>,
    /// Occupants evicted this tick.
    pub evicted: Vec<OccupantId>,
    /// Members whose mechanics failed.
    pub failures: usize,
}

/// Outcome of one render tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderReport {
    /// Emissions sent.
    pub emitted: usize,
    /// Members skipped by the minimum-interval rule.
    pub throttled: usize,
    /// Members skipped by the governor.
    pub skipped: usize,
    /// Emissions the sink rejected.
    pub failed: usize,
}

/// Generic scheduler for one localized effect in one world.
pub struct LocalizedEffectScheduler {
    world: WorldId,
    behavior: Box<dyn EffectBehavior>,
    active: Arc<AtomicBool>,
    reason: Option<ActivationReason>,
    members: BTreeMap<OccupantId, EffectMembership>,
    snapshot: SnapshotCell,
    render_task: Option<JoinHandle<()>>,
    draining: Vec<JoinHandle<()>>,
}

impl core::fmt::Debug for LocalizedEffectScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LocalizedEffectScheduler")
            .field("world", &self.world)
            .field("kind", &self.behavior.kind())
            .field("active", &self.is_active())
            .field("members", &self.members.len())
            .finish_non_exhaustive()
    }
}

impl LocalizedEffectScheduler {
    /// Create an idle scheduler around a behavior.
    pub fn new(world: WorldId, behavior: Box<dyn EffectBehavior>) -> Self {
        let snapshot = SnapshotCell::new(MembershipSnapshot::empty(
            world,
            behavior.kind(),
            false,
            0,
            behavior.render_plan(),
        ));
        Self {
            world,
            behavior,
            active: Arc::new(AtomicBool::new(false)),
            reason: None,
            members: BTreeMap::new(),
            snapshot,
            render_task: None,
            draining: Vec::new(),
        }
    }

    /// Effect kind.
    pub fn kind(&self) -> EffectKind {
        self.behavior.kind()
    }

    /// Whether the scheduler is running.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Why the scheduler is running.
    pub const fn reason(&self) -> Option<ActivationReason> {
        self.reason
    }

    /// Whether an occupant is a member.
    pub fn is_member(&self, occupant: OccupantId) -> bool {
        self.members.contains_key(&occupant)
    }

    /// Current member count.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Current members in id order.
    pub fn members(&self) -> impl Iterator<Item = (&OccupantId, &EffectMembership)> {
        self.members.iter()
    }

    /// The snapshot slot shared with the render loop.
    pub fn snapshot(&self) -> SnapshotCell {
        self.snapshot.clone()
    }

    /// Whether a render task is attached.
    pub fn has_render_task(&self) -> bool {
        self.render_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Pick up new tunables.
    pub fn reconfigure(&mut self, config: &SimulationConfig) {
        self.behavior.reconfigure(config);
    }

    /// Start the scheduler. Idempotent: returns `false` if already running.
    ///
    /// When `render` is given and a Tokio runtime is current, a render
    /// task is spawned on the wiring's interval.
    pub fn start(&mut self, reason: ActivationReason, tick: u64, render: Option<&RenderWiring>) -> bool {
        if self.is_active() {
            self.reason = Some(reason);
            return false;
        }

        self.behavior.on_start(reason);
        self.reason = Some(reason);
        self.active.store(true, Ordering::Release);
        self.publish(tick);

        if let Some(wiring) = render {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let task = render_loop(
                        self.world,
                        self.kind(),
                        Arc::clone(&self.active),
                        self.snapshot.clone(),
                        wiring.clone(),
                    );
                    self.render_task = Some(runtime.spawn(task));
                }
                Err(_) => {
                    debug!(world = %self.world, kind = %self.kind(), "No runtime, render loop not started");
                }
            }
        }

        info!(world = %self.world, kind = %self.kind(), ?reason, "Localized effect started");
        true
    }

    /// Stop the scheduler and clear membership. Idempotent: returns
    /// `false` if already stopped.
    pub fn stop(&mut self, tick: u64) -> bool {
        if !self.is_active() {
            return false;
        }
        self.active.store(false, Ordering::Release);
        if let Some(task) = self.render_task.take() {
            task.abort();
            self.draining.push(task);
        }
        let released = self.members.len();
        self.members.clear();
        self.reason = None;
        self.behavior.on_stop();
        self.publish(tick);
        info!(world = %self.world, kind = %self.kind(), released, "Localized effect stopped");
        true
    }

    /// Render tasks aborted by [`Self::stop`] and not yet awaited.
    pub fn take_draining(&mut self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut self.draining)
    }

    /// Reconcile membership against `conditions` and apply mechanics.
    ///
    /// Does nothing while stopped. One member's failure never affects the
    /// others.
    pub fn membership_tick(
        &mut self,
        conditions: &[OccupantConditions],
        ctx: &mut MechanicsContext<'_>,
    ) -> MembershipReport {
        let mut report = MembershipReport::default();
        if !self.is_active() {
            return report;
        }

        self.behavior.before_membership_tick(ctx.tick, ctx.rng);
        let by_id: HashMap<OccupantId, &OccupantConditions> =
            conditions.iter().map(|c| (c.occupant.id, c)).collect();

        let behavior = &self.behavior;
        self.members.retain(|id, membership| match by_id.get(id) {
            Some(c) if c.occupant.online && behavior.eligible(c) => {
                membership.position = c.occupant.position;
                true
            }
            _ => {
                report.evicted.push(*id);
                false
            }
        });

        let capacity = self.behavior.capacity();
        while self.members.len() > capacity {
            let newest = self
                .members
                .iter()
                .max_by_key(|(id, m)| (m.joined_tick, **id))
                .map(|(id, _)| *id);
            let Some(id) = newest else { break };
            self.members.remove(&id);
            report.evicted.push(id);
        }

        for c in conditions {
            if self.members.len() >= capacity {
                break;
            }
            let id = c.occupant.id;
            if self.members.contains_key(&id) || !c.occupant.online || !self.behavior.eligible(c) {
                continue;
            }
            self.members.insert(
                id,
                EffectMembership {
                    joined_tick: ctx.tick,
                    last_effect_tick: None,
                    position: c.occupant.position,
                },
            );
            report.admitted.push(id);
        }

        let behavior = &mut self.behavior;
        for (id, membership) in &mut self.members {
            let Some(c) = by_id.get(id) else { continue };
            if let Err(err) = behavior.apply(ctx, c, membership) {
                report.failures = report.failures.saturating_add(1);
                warn!(world = %self.world, kind = %behavior.kind(), occupant = %id, error = %err, "Effect mechanics failed");
            }
        }

        if !report.admitted.is_empty() || !report.evicted.is_empty() {
            debug!(
                world = %self.world,
                kind = %self.kind(),
                admitted = report.admitted.len(),
                evicted = report.evicted.len(),
                members = self.members.len(),
                "Membership reconciled"
            );
        }
        self.publish(ctx.tick);
        report
    }

    /// Publish the current membership to the render loop.
    fn publish(&self, tick: u64) {
        let mut cells: HashMap<(i64, i64), u32> = HashMap::new();
        for membership in self.members.values() {
            let count = cells.entry(crowd_cell(membership.position)).or_insert(0);
            *count = count.saturating_add(1);
        }
        let members = self
            .members
            .iter()
            .map(|(id, m)| MemberView {
                id: *id,
                position: m.position,
                crowding: cells.get(&crowd_cell(m.position)).copied().unwrap_or(1).max(1),
            })
            .collect();
        self.snapshot.store(MembershipSnapshot {
            world: self.world,
            kind: self.behavior.kind(),
            active: self.is_active(),
            tick,
            members,
            plan: self.behavior.render_plan(),
        });
    }
}

#[allow(clippy::cast_possible_truncation)]
fn crowd_cell(position: Vec3) -> (i64, i64) {
    (
        (position.x / CROWD_CELL).floor() as i64,
        (position.z / CROWD_CELL).floor() as i64,
    )
}

/// Scale a particle count, rounding to the nearest whole particle.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn scaled_count(base: u32, factor: f64) -> u32 {
    (f64::from(base) * factor).round().clamp(0.0, f64::from(u32::MAX)) as u32
}

/// Emit one round of cosmetic output for a snapshot.
///
/// `last_emitted` is owned by the calling render loop and enforces the
/// per-occupant minimum interval.
pub fn render_tick(
    snapshot: &MembershipSnapshot,
    governor: &PerformanceGovernor,
    sink: &dyn CosmeticSink,
    last_emitted: &mut HashMap<OccupantId, Instant>,
    now: Instant,
    rng: &mut StdRng,
) -> RenderReport {
    let mut report = RenderReport::default();
    if !snapshot.active {
        last_emitted.clear();
        return report;
    }

    let plan = &snapshot.plan;
    let multiplier = governor.multiplier();
    for member in &snapshot.members {
        if let Some(last) = last_emitted.get(&member.id) {
            if now.saturating_duration_since(*last) < plan.min_interval {
                report.throttled = report.throttled.saturating_add(1);
                continue;
            }
        }
        if governor.should_skip(member.id) {
            report.skipped = report.skipped.saturating_add(1);
            continue;
        }

        let crowd_factor = 1.0 / f64::from(member.crowding.max(1)).sqrt();
        let count = scaled_count(plan.particles_per_emission, multiplier * crowd_factor);
        last_emitted.insert(member.id, now);
        if count == 0 {
            continue;
        }

        let spread = plan.spread.abs();
        let offset = Vec3::new(
            rng.random::<f64>().mul_add(2.0, -1.0) * spread,
            rng.random::<f64>() * plan.rise.abs(),
            rng.random::<f64>().mul_add(2.0, -1.0) * spread,
        );
        let position = member.position + offset;
        let particles = ParticleEmission {
            world: snapshot.world,
            viewer: member.id,
            kind: plan.particle,
            position,
            velocity: plan.velocity,
            count,
        };
        if let Err(err) = sink.emit_particles(&particles) {
            report.failed = report.failed.saturating_add(1);
            debug!(occupant = %member.id, kind = %snapshot.kind, error = %err, "Particle emission failed");
            continue;
        }
        governor.record_emission(member.id, count, now);
        report.emitted = report.emitted.saturating_add(1);

        if let Some(sound) = plan.sound {
            let chance = (plan.sound_chance * multiplier).clamp(0.0, 1.0);
            if rng.random_bool(chance) {
                let emission = SoundEmission {
                    world: snapshot.world,
                    listener: member.id,
                    kind: sound,
                    position,
                    volume: plan.volume,
                    pitch: plan.pitch,
                };
                if let Err(err) = sink.play_sound(&emission) {
                    report.failed = report.failed.saturating_add(1);
                    debug!(occupant = %member.id, kind = %snapshot.kind, error = %err, "Sound emission failed");
                }
            }
        }
    }

    last_emitted.retain(|id, _| snapshot.members.iter().any(|m| m.id == *id));
    report
}

/// Real-time render loop for one started scheduler.
async fn render_loop(
    world: WorldId,
    kind: EffectKind,
    active: Arc<AtomicBool>,
    cell: SnapshotCell,
    wiring: RenderWiring,
) {
    let mut ticker = tokio::time::interval(wiring.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_emitted = HashMap::new();
    let mut rng = StdRng::seed_from_u64(wiring.seed);
    debug!(world = %world, %kind, interval_ms = wiring.interval.as_millis(), "Render loop started");

    loop {
        ticker.tick().await;
        if !active.load(Ordering::Acquire) {
            break;
        }
        let snapshot = cell.load();
        let now = tokio::time::Instant::now().into_std();
        let report = render_tick(
            &snapshot,
            &wiring.governor,
            wiring.cosmetics.as_ref(),
            &mut last_emitted,
            now,
            &mut rng,
        );
        if report.failed > 0 {
            debug!(world = %world, %kind, failed = report.failed, "Render tick had failures");
        }
    }

    debug!(world = %world, %kind, "Render loop stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parking_lot::Mutex;
    use stormfront_types::StatusKind;

    use super::*;
    use crate::config::GovernorConfig;
    use crate::governor::{MetricsSource, NoHostMetrics};

    /// Behavior that admits everyone outdoors and counts applications.
    struct Probe {
        capacity: usize,
        applied: usize,
        fail_for: Option<OccupantId>,
    }

    impl EffectBehavior for Probe {
        fn kind(&self) -> EffectKind {
            EffectKind::Wind
        }

        fn capacity(&self) -> usize {
            self.capacity
        }

        fn eligible(&self, conditions: &OccupantConditions) -> bool {
            !conditions.indoor
        }

        fn apply(
            &mut self,
            _ctx: &mut MechanicsContext<'_>,
            conditions: &OccupantConditions,
            _membership: &mut EffectMembership,
        ) -> Result<(), EffectError> {
            self.applied += 1;
            if self.fail_for == Some(conditions.occupant.id) {
                return Err(EffectError::host(
                    EffectKind::Wind,
                    conditions.occupant.id,
                    WorldError::SinkRejected {
                        operation: "push",
                        reason: "test".to_owned(),
                    },
                ));
            }
            Ok(())
        }

        fn render_plan(&self) -> RenderPlan {
            RenderPlan {
                particle: ParticleKind::Cloud,
                particles_per_emission: 20,
                spread: 4.0,
                rise: 2.0,
                velocity: Vec3::ZERO,
                sound: Some(SoundKind::Gust),
                sound_chance: 0.0,
                volume: 1.0,
                pitch: 1.0,
                min_interval: Duration::from_millis(45),
            }
        }

        fn reconfigure(&mut self, _config: &SimulationConfig) {}
    }

    struct NullStatus;

    impl StatusSink for NullStatus {
        fn apply_status(&self, _: OccupantId, _: StatusKind, _: u32, _: u8) -> Result<(), WorldError> {
            Ok(())
        }
        fn damage(&self, _: OccupantId, _: f64) -> Result<(), WorldError> {
            Ok(())
        }
        fn is_invulnerable(&self, _: OccupantId) -> bool {
            false
        }
        fn push(&self, _: OccupantId, _: Vec3) -> Result<(), WorldError> {
            Ok(())
        }
        fn send_message(&self, _: OccupantId, _: &str) -> Result<(), WorldError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        particles: Mutex<Vec<ParticleEmission>>,
    }

    impl CosmeticSink for Recorder {
        fn emit_particles(&self, emission: &ParticleEmission) -> Result<(), WorldError> {
            self.particles.lock().push(emission.clone());
            Ok(())
        }
        fn play_sound(&self, _: &SoundEmission) -> Result<(), WorldError> {
            Ok(())
        }
    }

    fn conditions(world: WorldId, x: f64, indoor: bool) -> OccupantConditions {
        OccupantConditions {
            occupant: Occupant {
                id: OccupantId::new(),
                world,
                position: Vec3::new(x, 100.0, 0.0),
                online: true,
            },
            zone: ClimateZone::Temperate,
            weather: WeatherType::HeavyRain,
            temperature: 10.0,
            indoor,
        }
    }

    fn scheduler(world: WorldId, capacity: usize) -> LocalizedEffectScheduler {
        LocalizedEffectScheduler::new(
            world,
            Box::new(Probe {
                capacity,
                applied: 0,
                fail_for: None,
            }),
        )
    }

    fn tick(
        scheduler: &mut LocalizedEffectScheduler,
        tick: u64,
        conditions: &[OccupantConditions],
    ) -> MembershipReport {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ctx = MechanicsContext {
            world: scheduler.world,
            tick,
            status: &NullStatus,
            rng: &mut rng,
        };
        scheduler.membership_tick(conditions, &mut ctx)
    }

    #[test]
    fn idle_scheduler_admits_nobody() {
        let world = WorldId::new();
        let mut scheduler = scheduler(world, 10);
        let report = tick(&mut scheduler, 10, &[conditions(world, 0.0, false)]);
        assert!(report.admitted.is_empty());
        assert_eq!(scheduler.member_count(), 0);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let world = WorldId::new();
        let mut scheduler = scheduler(world, 10);
        assert!(scheduler.start(ActivationReason::Weather, 0, None));
        assert!(!scheduler.start(ActivationReason::Weather, 0, None));
        assert!(scheduler.snapshot().load().active);

        tick(&mut scheduler, 10, &[conditions(world, 0.0, false)]);
        assert_eq!(scheduler.member_count(), 1);

        assert!(scheduler.stop(20));
        assert!(!scheduler.stop(20));
        assert_eq!(scheduler.member_count(), 0);
        let snapshot = scheduler.snapshot().load();
        assert!(!snapshot.active);
        assert!(snapshot.members.is_empty());
    }

    #[test]
    fn ineligible_and_offline_members_are_evicted() {
        let world = WorldId::new();
        let mut scheduler = scheduler(world, 10);
        scheduler.start(ActivationReason::Weather, 0, None);

        let mut a = conditions(world, 0.0, false);
        let mut b = conditions(world, 50.0, false);
        let c = conditions(world, 100.0, false);
        tick(&mut scheduler, 10, &[a.clone(), b.clone(), c.clone()]);
        assert_eq!(scheduler.member_count(), 3);

        a.indoor = true;
        b.occupant.online = false;
        let report = tick(&mut scheduler, 20, &[a.clone(), b.clone()]);
        assert_eq!(report.evicted.len(), 3);
        assert_eq!(scheduler.member_count(), 0);
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let world = WorldId::new();
        let mut scheduler = scheduler(world, 3);
        scheduler.start(ActivationReason::Weather, 0, None);
        let crowd: Vec<_> = (0..10).map(|i| conditions(world, f64::from(i), false)).collect();
        let report = tick(&mut scheduler, 10, &crowd);
        assert_eq!(report.admitted.len(), 3);
        assert_eq!(scheduler.member_count(), 3);

        tick(&mut scheduler, 20, &crowd);
        assert_eq!(scheduler.member_count(), 3);
    }

    #[test]
    fn shrinking_capacity_evicts_newest() {
        let world = WorldId::new();
        let first = conditions(world, 0.0, false);
        let second = conditions(world, 1.0, false);
        let mut scheduler = scheduler(world, 5);
        scheduler.start(ActivationReason::Weather, 0, None);
        tick(&mut scheduler, 10, std::slice::from_ref(&first));
        tick(&mut scheduler, 20, &[first.clone(), second.clone()]);

        scheduler.behavior = Box::new(Probe {
            capacity: 1,
            applied: 0,
            fail_for: None,
        });
        let report = tick(&mut scheduler, 30, &[first.clone(), second.clone()]);
        assert_eq!(report.evicted, vec![second.occupant.id]);
        assert!(scheduler.is_member(first.occupant.id));
    }

    #[test]
    fn one_failure_does_not_stop_the_rest() {
        let world = WorldId::new();
        let crowd: Vec<_> = (0..4).map(|i| conditions(world, f64::from(i), false)).collect();
        let mut scheduler = LocalizedEffectScheduler::new(
            world,
            Box::new(Probe {
                capacity: 10,
                applied: 0,
                fail_for: Some(crowd[1].occupant.id),
            }),
        );
        scheduler.start(ActivationReason::Weather, 0, None);
        let report = tick(&mut scheduler, 10, &crowd);
        assert_eq!(report.failures, 1);
        assert_eq!(scheduler.member_count(), 4);
    }

    #[test]
    fn crowding_counts_shared_cells() {
        let world = WorldId::new();
        let mut scheduler = scheduler(world, 10);
        scheduler.start(ActivationReason::Weather, 0, None);
        let crowd = [
            conditions(world, 1.0, false),
            conditions(world, 2.0, false),
            conditions(world, 3.0, false),
            conditions(world, 100.0, false),
        ];
        tick(&mut scheduler, 10, &crowd);
        let snapshot = scheduler.snapshot().load();
        let mut crowding: Vec<u32> = snapshot.members.iter().map(|m| m.crowding).collect();
        crowding.sort_unstable();
        assert_eq!(crowding, vec![1, 3, 3, 3]);
    }

    fn snapshot_with(world: WorldId, members: Vec<MemberView>, plan: RenderPlan) -> MembershipSnapshot {
        MembershipSnapshot {
            world,
            kind: EffectKind::Wind,
            active: true,
            tick: 0,
            members,
            plan,
        }
    }

    fn healthy_governor() -> PerformanceGovernor {
        PerformanceGovernor::new(GovernorConfig::default(), Arc::new(NoHostMetrics) as Arc<dyn MetricsSource>)
    }

    #[test]
    fn render_respects_minimum_interval() {
        let world = WorldId::new();
        let plan = scheduler(world, 1).behavior.render_plan();
        let member = MemberView {
            id: OccupantId::new(),
            position: Vec3::new(0.0, 70.0, 0.0),
            crowding: 1,
        };
        let snapshot = snapshot_with(world, vec![member], plan);
        let governor = healthy_governor();
        let sink = Recorder::default();
        let mut last = HashMap::new();
        let mut rng = StdRng::seed_from_u64(5);
        let start = Instant::now();

        let first = render_tick(&snapshot, &governor, &sink, &mut last, start, &mut rng);
        let early = render_tick(&snapshot, &governor, &sink, &mut last, start + Duration::from_millis(20), &mut rng);
        let later = render_tick(&snapshot, &governor, &sink, &mut last, start + Duration::from_millis(50), &mut rng);

        assert_eq!(first.emitted, 1);
        assert_eq!(early.throttled, 1);
        assert_eq!(later.emitted, 1);
        assert_eq!(sink.particles.lock().len(), 2);
    }

    #[test]
    fn crowded_members_get_fewer_particles() {
        let world = WorldId::new();
        let plan = scheduler(world, 1).behavior.render_plan();
        let members = vec![
            MemberView {
                id: OccupantId::new(),
                position: Vec3::ZERO,
                crowding: 1,
            },
            MemberView {
                id: OccupantId::new(),
                position: Vec3::ZERO,
                crowding: 4,
            },
        ];
        let snapshot = snapshot_with(world, members, plan);
        let sink = Recorder::default();
        let mut rng = StdRng::seed_from_u64(5);
        render_tick(&snapshot, &healthy_governor(), &sink, &mut HashMap::new(), Instant::now(), &mut rng);

        let counts: Vec<u32> = sink.particles.lock().iter().map(|p| p.count).collect();
        assert_eq!(counts, vec![20, 10]);
    }

    #[test]
    fn inactive_snapshot_renders_nothing() {
        let world = WorldId::new();
        let plan = scheduler(world, 1).behavior.render_plan();
        let mut snapshot = snapshot_with(
            world,
            vec![MemberView {
                id: OccupantId::new(),
                position: Vec3::ZERO,
                crowding: 1,
            }],
            plan,
        );
        snapshot.active = false;
        let sink = Recorder::default();
        let report = render_tick(
            &snapshot,
            &healthy_governor(),
            &sink,
            &mut HashMap::new(),
            Instant::now(),
            &mut StdRng::seed_from_u64(1),
        );
        assert_eq!(report, RenderReport::default());
    }

    #[tokio::test]
    async fn render_task_follows_start_and_stop() {
        let world = WorldId::new();
        let sink = Arc::new(Recorder::default());
        let wiring = RenderWiring {
            governor: Arc::new(healthy_governor()),
            cosmetics: Arc::clone(&sink) as Arc<dyn CosmeticSink>,
            interval: Duration::from_millis(10),
            seed: 3,
        };
        let mut scheduler = scheduler(world, 10);
        assert!(scheduler.start(ActivationReason::Weather, 0, Some(&wiring)));
        assert!(scheduler.has_render_task());
        tick(&mut scheduler, 10, &[conditions(world, 0.0, false)]);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!sink.particles.lock().is_empty());

        assert!(scheduler.stop(20));
        for task in scheduler.take_draining() {
            let _ = task.await;
        }
        let emitted = sink.particles.lock().len();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(sink.particles.lock().len(), emitted);
    }
}
