//! Daily forecasts, manual weather locks and world weather flags.
//!
//! Each world owns a [`WeatherForecastEngine`] with its own seeded random
//! source. A forecast assigns one [`WeatherType`] to each of the four day
//! periods and is generated lazily the first time a new day is observed.
//!
//! # Generation
//!
//! Each period is drawn in order, seeded by the previous period (the first
//! period of a day continues from the previous day's night):
//!
//! 1. With `repeat_chance` the previous weather simply repeats.
//! 2. Otherwise a roll over the summed band widths is shifted by
//!    `after_clear_shift` after a clear period or
//!    `after_thunderstorm_shift` after a thunderstorm, clamped, and mapped
//!    onto the clear / light rain / heavy rain / thunderstorm bands.
//!
//! A manual lock overrides the forecast until its expiry tick.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use stormfront_types::{DayPeriod, WeatherFlags, WeatherType, WorldId};
use stormfront_world::{WorldError, WorldWeatherSink};
use tracing::{debug, info};

use crate::clock::WorldClock;
use crate::config::ForecastConfig;

/// The weather of each period of one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyForecast {
    /// One-based day index the forecast belongs to.
    pub day: u64,
    /// Weather for morning, afternoon, evening and night.
    pub periods: [WeatherType; 4],
}

impl DailyForecast {
    /// Weather scheduled for a period.
    pub fn weather_at(&self, period: DayPeriod) -> WeatherType {
        self.periods
            .get(period.index())
            .copied()
            .unwrap_or(WeatherType::Clear)
    }

    /// Weather of the night period.
    pub fn night(&self) -> WeatherType {
        self.weather_at(DayPeriod::Night)
    }
}

/// A manual weather override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeatherLock {
    /// Forced weather.
    pub weather: WeatherType,
    /// First tick at which the lock no longer applies.
    pub until_tick: u64,
}

/// Per-world forecast generator and weather-lock holder.
#[derive(Debug)]
pub struct WeatherForecastEngine {
    world: WorldId,
    settings: ForecastConfig,
    rng: StdRng,
    forecast: Option<DailyForecast>,
    carry: Option<WeatherType>,
    lock: Option<WeatherLock>,
}

impl WeatherForecastEngine {
    /// Create an engine with no forecast yet.
    pub fn new(world: WorldId, settings: ForecastConfig, seed: u64) -> Self {
        Self {
            world,
            settings,
            rng: StdRng::seed_from_u64(seed),
            forecast: None,
            carry: None,
            lock: None,
        }
    }

    /// Replace the generation tunables. The current forecast is kept.
    pub const fn reconfigure(&mut self, settings: ForecastConfig) {
        self.settings = settings;
    }

    /// The most recently generated forecast.
    pub const fn forecast(&self) -> Option<&DailyForecast> {
        self.forecast.as_ref()
    }

    /// Forecast for the clock's day, generating it on first observation.
    pub fn forecast_for(&mut self, clock: &WorldClock) -> DailyForecast {
        match self.forecast {
            Some(forecast) if forecast.day == clock.day() => forecast,
            _ => self.generate(clock.day()),
        }
    }

    /// Discard and redraw the forecast for `day`.
    pub fn regenerate(&mut self, day: u64) -> DailyForecast {
        let forecast = self.generate(day);
        info!(world = %self.world, day, periods = ?forecast.periods, "Forecast regenerated");
        forecast
    }

    fn generate(&mut self, day: u64) -> DailyForecast {
        if let Some(old) = self.forecast {
            if old.day != day {
                self.carry = Some(old.night());
            }
        }

        let mut previous = self.carry;
        let mut periods = [WeatherType::Clear; 4];
        for slot in &mut periods {
            let weather = self.draw(previous);
            *slot = weather;
            previous = Some(weather);
        }

        let forecast = DailyForecast { day, periods };
        self.forecast = Some(forecast);
        debug!(world = %self.world, day, periods = ?periods, "Forecast generated");
        forecast
    }

    /// Draw one period's weather following the previous one.
    fn draw(&mut self, previous: Option<WeatherType>) -> WeatherType {
        if let Some(prev) = previous {
            if self.rng.random_bool(self.settings.repeat_chance.clamp(0.0, 1.0)) {
                return prev;
            }
        }

        let total = self.settings.total_weight();
        if total == 0 {
            return WeatherType::Clear;
        }
        let mut roll = i64::from(self.rng.random_range(0..total));
        roll = roll.saturating_add(match previous {
            Some(WeatherType::Clear) => i64::from(self.settings.after_clear_shift),
            Some(WeatherType::Thunderstorm) => i64::from(self.settings.after_thunderstorm_shift),
            _ => 0,
        });
        let roll = roll.clamp(0, i64::from(total).saturating_sub(1));
        self.band(u32::try_from(roll).unwrap_or(0))
    }

    /// Map a roll onto the weather bands.
    fn band(&self, roll: u32) -> WeatherType {
        let clear = self.settings.clear_weight;
        let light = clear.saturating_add(self.settings.light_rain_weight);
        let heavy = light.saturating_add(self.settings.heavy_rain_weight);
        if roll < clear {
            WeatherType::Clear
        } else if roll < light {
            WeatherType::LightRain
        } else if roll < heavy {
            WeatherType::HeavyRain
        } else {
            WeatherType::Thunderstorm
        }
    }

    /// Weather in effect now: the lock if active, else the forecast.
    ///
    /// An expired lock is cleared as a side effect.
    pub fn current_weather(&mut self, clock: &WorldClock) -> WeatherType {
        if let Some(lock) = self.active_lock(clock) {
            return lock.weather;
        }
        self.forecast_for(clock).weather_at(clock.period())
    }

    /// Lock the weather for `duration_ticks` from now.
    pub fn lock(&mut self, weather: WeatherType, duration_ticks: u64, clock: &WorldClock) -> WeatherLock {
        let lock = WeatherLock {
            weather,
            until_tick: clock.tick().saturating_add(duration_ticks),
        };
        self.lock = Some(lock);
        info!(world = %self.world, %weather, until_tick = lock.until_tick, "Weather locked");
        lock
    }

    /// The lock as last observed, without checking expiry.
    pub const fn held_lock(&self) -> Option<WeatherLock> {
        self.lock
    }

    /// Remove the lock, returning it if one was held.
    pub fn unlock(&mut self) -> Option<WeatherLock> {
        let lock = self.lock.take();
        if let Some(lock) = lock {
            info!(world = %self.world, weather = %lock.weather, "Weather unlocked");
        }
        lock
    }

    /// The lock if it still applies at the clock's tick.
    pub fn active_lock(&mut self, clock: &WorldClock) -> Option<WeatherLock> {
        let lock = self.lock?;
        if clock.tick() < lock.until_tick {
            return Some(lock);
        }
        self.lock = None;
        info!(world = %self.world, weather = %lock.weather, "Weather lock expired");
        None
    }

    /// World flags for the weather in effect now.
    ///
    /// The duration runs to the end of the current period, or to the lock
    /// expiry when a lock is active.
    pub fn flags_for(&mut self, clock: &WorldClock) -> WeatherFlags {
        let (weather, duration_ticks) = match self.active_lock(clock) {
            Some(lock) => (lock.weather, lock.until_tick.saturating_sub(clock.tick())),
            None => (
                self.forecast_for(clock).weather_at(clock.period()),
                clock.ticks_until_period_end(),
            ),
        };
        WeatherFlags {
            storm: weather.is_precipitating(),
            thundering: weather.is_thundering(),
            duration_ticks,
        }
    }
}

/// Writes world weather flags only when the sky changes or the previous
/// write has run out.
#[derive(Debug, Default, Clone)]
pub struct FlagWriter {
    last: Option<WeatherFlags>,
    expires_at: u64,
}

impl FlagWriter {
    /// Write `flags` unless the host already shows the same sky.
    ///
    /// Returns whether a write was issued.
    ///
    /// # Errors
    ///
    /// Returns the sink's [`WorldError`]; the writer then retries on the
    /// next call.
    pub fn write(
        &mut self,
        world: WorldId,
        flags: WeatherFlags,
        now_tick: u64,
        sink: &dyn WorldWeatherSink,
    ) -> Result<bool, WorldError> {
        let unchanged = self.last.is_some_and(|last| last.same_sky(&flags));
        if unchanged && now_tick < self.expires_at {
            return Ok(false);
        }
        sink.apply_flags(world, flags)?;
        self.last = Some(flags);
        self.expires_at = now_tick.saturating_add(flags.duration_ticks);
        debug!(world = %world, storm = flags.storm, thundering = flags.thundering, duration = flags.duration_ticks, "Weather flags written");
        Ok(true)
    }

    /// The last flags written.
    pub const fn last(&self) -> Option<WeatherFlags> {
        self.last
    }

    /// Forget the last write so the next call always writes.
    pub const fn reset(&mut self) {
        self.last = None;
        self.expires_at = 0;
    }
}
