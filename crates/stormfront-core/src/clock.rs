//! Per-world clock for the Stormfront weather engine.
//!
//! The clock is the single source of truth for temporal state in one
//! world. Day index, day period, ticks remaining in the period and the
//! fallback season are all derived from the tick counter; none of them is
//! stored independently.
//!
//! # Time Base
//!
//! | Unit    | World ticks               |
//! |---------|---------------------------|
//! | second  | 20                        |
//! | minute  | 1 200                     |
//! | period  | `ticks_per_day / 4`       |
//! | day     | `ticks_per_day` (24 000)  |
//!
//! The last period of a day absorbs any remainder when `ticks_per_day`
//! is not a multiple of four.

use stormfront_types::{DayPeriod, Season};

use crate::config::EngineConfig;

/// World ticks per simulated second.
pub const TICKS_PER_SECOND: u64 = 20;

/// World ticks per simulated minute.
pub const TICKS_PER_MINUTE: u64 = TICKS_PER_SECOND * 60;

/// Number of periods in a day.
const PERIODS_PER_DAY: u64 = 4;

/// Convert simulated seconds to world ticks, saturating.
pub const fn seconds_to_ticks(seconds: u64) -> u64 {
    seconds.saturating_mul(TICKS_PER_SECOND)
}

/// Convert simulated minutes to world ticks, saturating.
pub const fn minutes_to_ticks(minutes: u64) -> u64 {
    minutes.saturating_mul(TICKS_PER_MINUTE)
}

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,

    /// Invalid time configuration (e.g. fewer ticks per day than periods).
    #[error("invalid time configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

/// Clock tracking one world's temporal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldClock {
    /// Current tick number (0-indexed).
    tick: u64,

    /// Ticks per simulated day.
    ticks_per_day: u64,

    /// Days per season for the fallback calendar.
    days_per_season: u64,

    /// Season of day 1 for the fallback calendar.
    first_season: Season,
}

impl WorldClock {
    /// Create a clock at tick 0 from the engine configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if a day is shorter than four
    /// ticks or a season shorter than one day.
    pub fn new(config: &EngineConfig) -> Result<Self, ClockError> {
        Self::from_parts(
            0,
            config.ticks_per_day,
            config.days_per_season,
            config.default_season,
        )
    }

    /// Create a clock from explicit parameters (useful for testing and
    /// state restoration).
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] on the same conditions as
    /// [`Self::new`].
    pub fn from_parts(
        tick: u64,
        ticks_per_day: u64,
        days_per_season: u64,
        first_season: Season,
    ) -> Result<Self, ClockError> {
        if ticks_per_day < PERIODS_PER_DAY {
            return Err(ClockError::InvalidConfig {
                reason: format!("ticks_per_day must be at least {PERIODS_PER_DAY}"),
            });
        }
        if days_per_season == 0 {
            return Err(ClockError::InvalidConfig {
                reason: "days_per_season must be at least 1".to_owned(),
            });
        }
        Ok(Self {
            tick,
            ticks_per_day,
            days_per_season,
            first_season,
        })
    }

    /// Advance the clock by one tick. Returns the new tick number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] if the tick counter would exceed
    /// `u64::MAX`.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        self.tick = self.tick.checked_add(1).ok_or(ClockError::TickOverflow)?;
        Ok(self.tick)
    }

    /// Current tick number.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Ticks per simulated day.
    pub const fn ticks_per_day(&self) -> u64 {
        self.ticks_per_day
    }

    /// One-based day index.
    pub fn day(&self) -> u64 {
        self.days_elapsed().saturating_add(1)
    }

    /// Whole days completed since tick 0.
    fn days_elapsed(&self) -> u64 {
        self.tick.checked_div(self.ticks_per_day).unwrap_or(0)
    }

    /// Ticks elapsed since the start of the current day.
    pub fn time_of_day(&self) -> u64 {
        self.tick.checked_rem(self.ticks_per_day).unwrap_or(0)
    }

    /// Whether the current tick is the first of a new day (tick 0 excluded).
    pub fn is_day_start(&self) -> bool {
        self.tick > 0 && self.time_of_day() == 0
    }

    /// Length of the first three periods; the night absorbs the remainder.
    fn period_length(&self) -> u64 {
        self.ticks_per_day.checked_div(PERIODS_PER_DAY).unwrap_or(1)
    }

    /// Period the current tick falls in.
    pub fn period(&self) -> DayPeriod {
        let index = self
            .time_of_day()
            .checked_div(self.period_length())
            .unwrap_or(0)
            .min(PERIODS_PER_DAY - 1);
        DayPeriod::from_index(usize::try_from(index).unwrap_or(usize::MAX))
    }

    /// Ticks left before the current period ends (at least 1).
    pub fn ticks_until_period_end(&self) -> u64 {
        let period = self.period();
        let end = if period == DayPeriod::Night {
            self.ticks_per_day
        } else {
            let next = u64::try_from(period.index()).unwrap_or(0).saturating_add(1);
            self.period_length().saturating_mul(next)
        };
        end.saturating_sub(self.time_of_day()).max(1)
    }

    /// Ticks left before the day rolls over (at least 1).
    pub fn ticks_until_day_end(&self) -> u64 {
        self.ticks_per_day.saturating_sub(self.time_of_day()).max(1)
    }

    /// Season from the fallback calendar.
    ///
    /// Used only when no season provider is wired in.
    pub fn season(&self) -> Season {
        let first = Season::ALL
            .iter()
            .position(|s| *s == self.first_season)
            .unwrap_or(0);
        let seasons = self.days_elapsed().checked_div(self.days_per_season).unwrap_or(0);
        let offset = usize::try_from(seasons.checked_rem(4).unwrap_or(0)).unwrap_or(0);
        Season::ALL
            .get(first.saturating_add(offset).checked_rem(Season::ALL.len()).unwrap_or(0))
            .copied()
            .unwrap_or(self.first_season)
    }
}
