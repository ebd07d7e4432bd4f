//! Process-wide load governor.
//!
//! The governor watches host health and throttles cosmetic output. It is
//! sampled on its own cadence and read concurrently by every render task,
//! so all state lives in atomics, a [`DashMap`] and short-held locks.
//!
//! # Output Multiplier
//!
//! | Condition                          | Multiplier            |
//! |------------------------------------|-----------------------|
//! | performance mode                   | 0.3                   |
//! | tick rate below the warning level  | `max(0.5, tps / 20)`  |
//! | otherwise                          | 1.0                   |
//!
//! # Performance Mode
//!
//! Entered when the tick rate drops two below the warning level or memory
//! climbs ten points above its warning level; left only when both have
//! recovered past the mirrored margins. The gap between the two edges
//! keeps the mode from flapping on a noisy signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use stormfront_types::OccupantId;
use tracing::{info, warn};

use crate::config::GovernorConfig;

/// Multiplier applied in performance mode.
const PERFORMANCE_MULTIPLIER: f64 = 0.3;

/// Floor of the reduced multiplier outside performance mode.
const REDUCED_MULTIPLIER_FLOOR: f64 = 0.5;

/// Tick-rate margin around the warning level for entering and leaving
/// performance mode.
const TICK_RATE_HYSTERESIS: f64 = 2.0;

/// Memory margin, in percentage points, around the warning level.
const MEMORY_HYSTERESIS: f64 = 10.0;

/// Emission counters are skipped above this multiple of the budget.
const BUDGET_OVERSHOOT: f64 = 1.5;

/// Counters below this are dropped on decay.
const COUNTER_FLOOR: f64 = 0.01;

/// Host health readings.
///
/// Either reading may be unavailable; the governor then falls back to its
/// own tick-interval estimate and ignores memory.
pub trait MetricsSource: Send + Sync {
    /// Current host tick rate, in ticks per second.
    fn tick_rate(&self) -> Option<f64>;

    /// Fraction of memory in use, `0.0..=1.0`.
    fn memory_fraction(&self) -> Option<f64>;
}

/// A metrics source that reports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHostMetrics;

impl MetricsSource for NoHostMetrics {
    fn tick_rate(&self) -> Option<f64> {
        None
    }

    fn memory_fraction(&self) -> Option<f64> {
        None
    }
}

/// A performance-mode transition reported by [`PerformanceGovernor::sample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
    /// Output dropped to the performance multiplier.
    Entered,
    /// Output restored.
    Exited,
}

/// Point-in-time governor readout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GovernorStatus {
    /// Last sampled tick rate.
    pub tick_rate: f64,
    /// Last sampled memory use, in percent.
    pub memory_percent: f64,
    /// Whether performance mode is active.
    pub performance_mode: bool,
    /// Current output multiplier.
    pub multiplier: f64,
    /// Occupants with a live emission counter.
    pub tracked_occupants: usize,
    /// Performance-mode transitions since startup.
    pub mode_changes: u64,
}

/// Exponentially smoothed tick interval.
#[derive(Debug, Default)]
struct TickEstimator {
    last_tick: Option<Instant>,
    interval_ms: Option<f64>,
}

/// Warning cooldowns.
#[derive(Debug, Default)]
struct Diagnostics {
    last_tick_warning: Option<Instant>,
    last_memory_warning: Option<Instant>,
}

/// Decaying per-occupant emission counter.
#[derive(Debug, Clone, Copy)]
struct EmissionCounter {
    value: f64,
    updated: Instant,
}

/// Process-wide output governor.
pub struct PerformanceGovernor {
    settings: RwLock<GovernorConfig>,
    source: Arc<dyn MetricsSource>,
    estimator: Mutex<TickEstimator>,
    diagnostics: Mutex<Diagnostics>,
    tick_rate_bits: AtomicU64,
    memory_bits: AtomicU64,
    performance_mode: AtomicBool,
    mode_changes: AtomicU64,
    counters: DashMap<OccupantId, EmissionCounter>,
}

impl core::fmt::Debug for PerformanceGovernor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PerformanceGovernor")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl PerformanceGovernor {
    /// Create a governor reading from `source`, starting at nominal health.
    pub fn new(settings: GovernorConfig, source: Arc<dyn MetricsSource>) -> Self {
        let nominal = settings.nominal_tick_rate;
        Self {
            settings: RwLock::new(settings),
            source,
            estimator: Mutex::new(TickEstimator::default()),
            diagnostics: Mutex::new(Diagnostics::default()),
            tick_rate_bits: AtomicU64::new(nominal.to_bits()),
            memory_bits: AtomicU64::new(0.0_f64.to_bits()),
            performance_mode: AtomicBool::new(false),
            mode_changes: AtomicU64::new(0),
            counters: DashMap::new(),
        }
    }

    /// Replace the thresholds. Mode and counters are kept.
    pub fn reconfigure(&self, settings: GovernorConfig) {
        *self.settings.write() = settings;
    }

    /// Feed the default estimator one host tick observed at `now`.
    pub fn record_tick(&self, now: Instant) {
        let alpha = self.settings.read().ewma_alpha;
        let mut estimator = self.estimator.lock();
        if let Some(last) = estimator.last_tick {
            let elapsed = now.saturating_duration_since(last).as_secs_f64() * 1_000.0;
            estimator.interval_ms = Some(match estimator.interval_ms {
                Some(smoothed) => alpha.mul_add(elapsed, (1.0 - alpha) * smoothed),
                None => elapsed,
            });
        }
        estimator.last_tick = Some(now);
    }

    /// Tick rate implied by the estimator, capped at nominal.
    fn estimated_tick_rate(&self, nominal: f64) -> f64 {
        match self.estimator.lock().interval_ms {
            Some(ms) if ms > 0.0 => (1_000.0 / ms).min(nominal),
            _ => nominal,
        }
    }

    /// Read host health, update performance mode and emit throttled
    /// diagnostics.
    pub fn sample(&self, now: Instant) -> Option<ModeChange> {
        let settings = self.settings.read().clone();
        let tick_rate = self
            .source
            .tick_rate()
            .unwrap_or_else(|| self.estimated_tick_rate(settings.nominal_tick_rate));
        let memory_percent = self
            .source
            .memory_fraction()
            .map_or(0.0, |fraction| (fraction * 100.0).clamp(0.0, 100.0));

        self.tick_rate_bits.store(tick_rate.to_bits(), Ordering::Release);
        self.memory_bits.store(memory_percent.to_bits(), Ordering::Release);

        let active = self.performance_mode.load(Ordering::Acquire);
        let change = if active {
            let recovered = tick_rate > settings.tick_rate_warning + TICK_RATE_HYSTERESIS
                && memory_percent < settings.memory_warning_percent - MEMORY_HYSTERESIS;
            recovered.then_some(ModeChange::Exited)
        } else {
            let degraded = tick_rate < settings.tick_rate_warning - TICK_RATE_HYSTERESIS
                || memory_percent > settings.memory_warning_percent + MEMORY_HYSTERESIS;
            degraded.then_some(ModeChange::Entered)
        };

        match change {
            Some(ModeChange::Entered) => {
                self.performance_mode.store(true, Ordering::Release);
                self.mode_changes.fetch_add(1, Ordering::Relaxed);
                warn!(tick_rate, memory_percent, "Entering performance mode");
            }
            Some(ModeChange::Exited) => {
                self.performance_mode.store(false, Ordering::Release);
                self.mode_changes.fetch_add(1, Ordering::Relaxed);
                info!(tick_rate, memory_percent, "Leaving performance mode");
            }
            None => {}
        }

        self.diagnose(&settings, tick_rate, memory_percent, now);
        self.decay(now, Duration::from_millis(settings.counter_half_life_ms));
        change
    }

    fn diagnose(&self, settings: &GovernorConfig, tick_rate: f64, memory_percent: f64, now: Instant) {
        let mut diagnostics = self.diagnostics.lock();

        if tick_rate < settings.tick_rate_warning {
            let cooldown = Duration::from_secs(settings.tick_warning_cooldown_seconds);
            if cooled_down(diagnostics.last_tick_warning, now, cooldown) {
                diagnostics.last_tick_warning = Some(now);
                warn!(
                    tick_rate,
                    warning = settings.tick_rate_warning,
                    multiplier = self.multiplier(),
                    "Host tick rate is low, scaling weather effects down"
                );
            }
        }

        if memory_percent > settings.memory_warning_percent {
            let cooldown = Duration::from_secs(settings.memory_warning_cooldown_seconds);
            if cooled_down(diagnostics.last_memory_warning, now, cooldown) {
                diagnostics.last_memory_warning = Some(now);
                if memory_percent > settings.reclaim_suggest_percent {
                    warn!(memory_percent, "Memory use is critical, consider forcing a memory reclaim");
                } else {
                    warn!(memory_percent, warning = settings.memory_warning_percent, "Memory use is high");
                }
            }
        }
    }

    /// Halve every emission counter once per half-life elapsed.
    fn decay(&self, now: Instant, half_life: Duration) {
        let half_life = half_life.as_secs_f64().max(f64::EPSILON);
        self.counters.retain(|_, counter| {
            let elapsed = now.saturating_duration_since(counter.updated).as_secs_f64();
            counter.value *= 0.5_f64.powf(elapsed / half_life);
            counter.updated = now;
            counter.value >= COUNTER_FLOOR
        });
    }

    /// Whether performance mode is active.
    pub fn performance_mode(&self) -> bool {
        self.performance_mode.load(Ordering::Acquire)
    }

    /// Last sampled tick rate.
    pub fn tick_rate(&self) -> f64 {
        f64::from_bits(self.tick_rate_bits.load(Ordering::Acquire))
    }

    /// Scale factor for particle counts and sound chances.
    pub fn multiplier(&self) -> f64 {
        if self.performance_mode() {
            return PERFORMANCE_MULTIPLIER;
        }
        let settings = self.settings.read();
        let tick_rate = self.tick_rate();
        if tick_rate < settings.tick_rate_warning {
            (tick_rate / settings.nominal_tick_rate).clamp(REDUCED_MULTIPLIER_FLOOR, 1.0)
        } else {
            1.0
        }
    }

    /// Whether render output for this occupant should be skipped.
    pub fn should_skip(&self, occupant: OccupantId) -> bool {
        let settings = self.settings.read();
        if self.tick_rate() < settings.skip_tick_rate {
            return true;
        }
        let limit = settings.emission_budget * BUDGET_OVERSHOOT;
        self.counters
            .get(&occupant)
            .is_some_and(|counter| counter.value > limit)
    }

    /// Charge `count` particles to an occupant's counter.
    pub fn record_emission(&self, occupant: OccupantId, count: u32, now: Instant) {
        self.counters
            .entry(occupant)
            .and_modify(|counter| counter.value += f64::from(count))
            .or_insert(EmissionCounter {
                value: f64::from(count),
                updated: now,
            });
    }

    /// Drop an occupant's counter.
    pub fn forget(&self, occupant: OccupantId) {
        self.counters.remove(&occupant);
    }

    /// Point-in-time readout.
    pub fn status(&self) -> GovernorStatus {
        GovernorStatus {
            tick_rate: self.tick_rate(),
            memory_percent: f64::from_bits(self.memory_bits.load(Ordering::Acquire)),
            performance_mode: self.performance_mode(),
            multiplier: self.multiplier(),
            tracked_occupants: self.counters.len(),
            mode_changes: self.mode_changes.load(Ordering::Relaxed),
        }
    }
}

fn cooled_down(last: Option<Instant>, now: Instant, cooldown: Duration) -> bool {
    last.is_none_or(|at| now.saturating_duration_since(at) >= cooldown)
}
