//! Engine runner: one task per world plus a governor sampler.
//!
//! [`launch`] builds the process-wide exposure cache and governor, creates
//! every configured [`World`], and spawns:
//!
//! - **World loops** -- each owns its [`World`] exclusively and interleaves
//!   world ticks (on `tick_interval_ms`) with [`WorldCommand`]s received
//!   over an mpsc channel, so commands never race a tick. After a tick or
//!   command the loop publishes a [`WorldStatus`] on a watch channel.
//! - **Governor sampler** -- samples load on `governor_sample_ms` and
//!   pushes reloaded governor and exposure settings.
//!
//! The returned [`EngineHandle`] is the control surface: commands, status
//! queries, configuration reload and a clean shutdown that stops every
//! effect and waits for all tasks.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use stormfront_types::{OccupantId, WeatherType, WorldId};
use stormfront_world::{ExposureStats, HostServices, SpatialExposureCache};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::ClockError;
use crate::config::{ConfigError, ConfigHandle, EngineConfig};
use crate::control::EngineControl;
use crate::forecast::{DailyForecast, WeatherLock};
use crate::governor::{GovernorStatus, MetricsSource, PerformanceGovernor};
use crate::world::{OccupantReport, World, WorldServices, WorldStatus};

/// Pending commands per world before senders wait.
const COMMAND_QUEUE: usize = 32;

/// Errors surfaced by the engine control surface.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No worlds are configured.
    #[error("no worlds configured")]
    NoWorlds,

    /// The engine was launched outside a Tokio runtime.
    #[error("engine must be launched inside a Tokio runtime: {source}")]
    NoRuntime {
        /// The runtime lookup error.
        #[from]
        source: tokio::runtime::TryCurrentError,
    },

    /// A command named a world that is not running.
    #[error("unknown world: {name}")]
    UnknownWorld {
        /// The name that was asked for.
        name: String,
    },

    /// The world loop is gone.
    #[error("world {name} is no longer running")]
    ChannelClosed {
        /// The world's name.
        name: String,
    },

    /// A world task panicked or was cancelled.
    #[error("world {name} task failed: {source}")]
    Join {
        /// The world's name.
        name: String,
        /// The underlying join error.
        #[source]
        source: tokio::task::JoinError,
    },

    /// Configuration could not be loaded.
    #[error("configuration error: {source}")]
    Config {
        /// The underlying configuration error.
        #[from]
        source: ConfigError,
    },

    /// A world clock could not be built.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },
}

/// A mutation routed into a world's loop.
#[derive(Debug)]
pub enum WorldCommand {
    /// Redraw today's forecast.
    RegenerateForecast {
        /// Receives the new forecast.
        reply: oneshot::Sender<DailyForecast>,
    },
    /// Force a weather for a number of simulated minutes.
    LockWeather {
        /// Forced weather.
        weather: WeatherType,
        /// Lock duration in simulated minutes.
        minutes: u64,
        /// Receives the lock.
        reply: oneshot::Sender<WeatherLock>,
    },
    /// Drop the manual lock.
    UnlockWeather {
        /// Receives the lock that was held, if any.
        reply: oneshot::Sender<Option<WeatherLock>>,
    },
}

/// Control-surface side of one running world.
#[derive(Debug)]
struct WorldHandle {
    id: WorldId,
    commands: mpsc::Sender<WorldCommand>,
    status: watch::Receiver<Arc<WorldStatus>>,
    task: JoinHandle<WorldStatus>,
}

/// Handle to a running engine.
#[derive(Debug)]
pub struct EngineHandle {
    control: Arc<EngineControl>,
    config: ConfigHandle,
    services: WorldServices,
    worlds: BTreeMap<String, WorldHandle>,
    sampler: JoinHandle<()>,
}

/// Derive a world's seed from the engine seed and the world's name.
///
/// Uses FNV-1a so the same name always gets the same stream.
pub fn world_seed(base: u64, name: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    let hash = name
        .bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME));
    base ^ hash
}

/// Start the engine.
///
/// # Errors
///
/// Returns [`EngineError::NoRuntime`] outside a Tokio runtime,
/// [`EngineError::NoWorlds`] if no world is configured, or
/// [`EngineError::Clock`] if the time settings are unusable.
pub fn launch(
    config: ConfigHandle,
    host: HostServices,
    metrics: Arc<dyn MetricsSource>,
) -> Result<EngineHandle, EngineError> {
    let runtime = tokio::runtime::Handle::try_current()?;
    let current = config.current();
    if current.engine.worlds.is_empty() {
        return Err(EngineError::NoWorlds);
    }

    let services = WorldServices {
        host,
        exposure: Arc::new(SpatialExposureCache::new(current.exposure.settings())),
        governor: Arc::new(PerformanceGovernor::new(current.governor.clone(), metrics)),
    };
    let control = Arc::new(EngineControl::new());

    let mut built = Vec::with_capacity(current.engine.worlds.len());
    for name in &current.engine.worlds {
        let seed = world_seed(current.engine.seed, name);
        let world = World::new(WorldId::new(), name.clone(), Arc::clone(&current), seed)?;
        built.push(world);
    }

    let mut worlds = BTreeMap::new();
    for (index, world) in built.into_iter().enumerate() {
        let name = world.name().to_owned();
        let id = world.id();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (status_tx, status_rx) = watch::channel(Arc::new(world.status()));
        let task = runtime.spawn(run_world(
            world,
            services.clone(),
            config.clone(),
            Arc::clone(&control),
            command_rx,
            status_tx,
            index == 0,
        ));
        worlds.insert(
            name,
            WorldHandle {
                id,
                commands: command_tx,
                status: status_rx,
                task,
            },
        );
    }

    let sampler = runtime.spawn(run_sampler(services.clone(), config.clone(), Arc::clone(&control)));

    info!(
        worlds = ?current.engine.worlds,
        seed = current.engine.seed,
        tick_interval_ms = current.engine.tick_interval_ms,
        "Engine started"
    );

    Ok(EngineHandle {
        control,
        config,
        services,
        worlds,
        sampler,
    })
}

/// Cadences a world loop reads from configuration.
#[derive(Debug, Clone, Copy)]
struct LoopTiming {
    tick_interval: Duration,
    status_interval_ticks: u64,
}

impl LoopTiming {
    fn from_engine(engine: &EngineConfig) -> Self {
        Self {
            tick_interval: engine.tick_interval().max(Duration::from_millis(1)),
            status_interval_ticks: engine.status_interval_ticks.max(1),
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn run_world(
    mut world: World,
    services: WorldServices,
    config: ConfigHandle,
    control: Arc<EngineControl>,
    mut commands: mpsc::Receiver<WorldCommand>,
    status: watch::Sender<Arc<WorldStatus>>,
    records_ticks: bool,
) -> WorldStatus {
    let mut timing = LoopTiming::from_engine(&config.current().engine);
    let mut seen_version = config.version();
    let mut interval = ticker(timing.tick_interval);
    info!(world = %world.id(), name = %world.name(), "World loop started");

    loop {
        tokio::select! {
            () = control.wait_for_stop() => break,
            command = commands.recv() => {
                let Some(command) = command else { break };
                handle_command(&mut world, command);
                status.send_replace(Arc::new(world.status()));
            }
            _ = interval.tick() => {
                if control.is_stop_requested() {
                    break;
                }
                let version = config.version();
                if version != seen_version {
                    seen_version = version;
                    let current = config.current();
                    let next = LoopTiming::from_engine(&current.engine);
                    if next.tick_interval != timing.tick_interval {
                        interval = ticker(next.tick_interval);
                    }
                    timing = next;
                    world.apply_config(current);
                }

                let now = Instant::now();
                if records_ticks {
                    services.governor.record_tick(now);
                }
                match world.tick(&services, now) {
                    Ok(summary) => {
                        let notable = summary.day_rolled
                            || summary.coordination.as_ref().is_some_and(|c| !c.started.is_empty() || !c.stopped.is_empty())
                            || !summary.progression.is_empty();
                        if notable || summary.tick.checked_rem(timing.status_interval_ticks) == Some(0) {
                            status.send_replace(Arc::new(world.status()));
                        }
                    }
                    Err(err) => {
                        error!(world = %world.id(), error = %err, "World tick failed, stopping world");
                        break;
                    }
                }
            }
        }
    }

    let tasks = world.shutdown(&services);
    let drained = tasks.len();
    join_all(tasks).await;
    debug!(world = %world.id(), drained, "Render tasks drained");
    let last = world.status();
    status.send_replace(Arc::new(last.clone()));
    last
}

fn handle_command(world: &mut World, command: WorldCommand) {
    let delivered = match command {
        WorldCommand::RegenerateForecast { reply } => reply.send(world.regenerate_forecast()).is_ok(),
        WorldCommand::LockWeather {
            weather,
            minutes,
            reply,
        } => reply.send(world.lock_weather(weather, minutes)).is_ok(),
        WorldCommand::UnlockWeather { reply } => reply.send(world.unlock_weather()).is_ok(),
    };
    if !delivered {
        debug!(world = %world.id(), "Command caller went away before the reply");
    }
}

async fn run_sampler(services: WorldServices, config: ConfigHandle, control: Arc<EngineControl>) {
    let mut period = Duration::from_millis(config.current().engine.governor_sample_ms.max(1));
    let mut interval = ticker(period);
    let mut seen_version = config.version();

    loop {
        tokio::select! {
            () = control.wait_for_stop() => break,
            _ = interval.tick() => {
                let version = config.version();
                if version != seen_version {
                    seen_version = version;
                    let current = config.current();
                    services.governor.reconfigure(current.governor.clone());
                    services.exposure.reconfigure(current.exposure.settings());
                    let next = Duration::from_millis(current.engine.governor_sample_ms.max(1));
                    if next != period {
                        period = next;
                        interval = ticker(period);
                    }
                }
                if let Some(change) = services.governor.sample(Instant::now()) {
                    debug!(?change, "Performance mode changed");
                }
            }
        }
    }
    debug!("Governor sampler stopped");
}

impl EngineHandle {
    /// Running worlds by name.
    pub fn worlds(&self) -> Vec<(String, WorldId)> {
        self.worlds
            .iter()
            .map(|(name, handle)| (name.clone(), handle.id))
            .collect()
    }

    /// Identifier of a named world.
    pub fn world_id(&self, name: &str) -> Option<WorldId> {
        self.worlds.get(name).map(|handle| handle.id)
    }

    /// The shared stop signal.
    pub fn control(&self) -> Arc<EngineControl> {
        Arc::clone(&self.control)
    }

    /// The live configuration.
    pub const fn config(&self) -> &ConfigHandle {
        &self.config
    }

    fn world(&self, name: &str) -> Result<&WorldHandle, EngineError> {
        self.worlds.get(name).ok_or_else(|| EngineError::UnknownWorld {
            name: name.to_owned(),
        })
    }

    async fn request<T>(
        &self,
        name: &str,
        build: impl FnOnce(oneshot::Sender<T>) -> WorldCommand,
    ) -> Result<T, EngineError> {
        let handle = self.world(name)?;
        let closed = || EngineError::ChannelClosed {
            name: name.to_owned(),
        };
        let (reply, response) = oneshot::channel();
        handle
            .commands
            .send(build(reply))
            .await
            .map_err(|_unsent| closed())?;
        response.await.map_err(|_dropped| closed())
    }

    /// Redraw a world's forecast for today.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownWorld`] or
    /// [`EngineError::ChannelClosed`].
    pub async fn regenerate_forecast(&self, world: &str) -> Result<DailyForecast, EngineError> {
        self.request(world, |reply| WorldCommand::RegenerateForecast { reply })
            .await
    }

    /// Lock a world's weather for `minutes` simulated minutes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownWorld`] or
    /// [`EngineError::ChannelClosed`].
    pub async fn lock_weather(
        &self,
        world: &str,
        weather: WeatherType,
        minutes: u64,
    ) -> Result<WeatherLock, EngineError> {
        self.request(world, |reply| WorldCommand::LockWeather {
            weather,
            minutes,
            reply,
        })
        .await
    }

    /// Drop a world's weather lock.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownWorld`] or
    /// [`EngineError::ChannelClosed`].
    pub async fn unlock_weather(&self, world: &str) -> Result<Option<WeatherLock>, EngineError> {
        self.request(world, |reply| WorldCommand::UnlockWeather { reply })
            .await
    }

    /// Latest published status of a world.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownWorld`].
    pub fn world_status(&self, world: &str) -> Result<Arc<WorldStatus>, EngineError> {
        Ok(Arc::clone(&*self.world(world)?.status.borrow()))
    }

    /// Latest report for an occupant in any world.
    pub fn occupant_report(&self, occupant: OccupantId) -> Option<OccupantReport> {
        self.worlds
            .values()
            .find_map(|handle| handle.status.borrow().occupant(occupant).cloned())
    }

    /// Governor state.
    pub fn governor_status(&self) -> GovernorStatus {
        self.services.governor.status()
    }

    /// Exposure cache counters.
    pub fn exposure_stats(&self) -> ExposureStats {
        self.services.exposure.stats()
    }

    /// Re-read the configuration file and swap it in.
    ///
    /// Worlds pick it up on their next tick, the governor and exposure
    /// cache on the next sample.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`]; the active configuration is then
    /// unchanged.
    pub fn reload_config(&self, path: &Path) -> Result<u64, EngineError> {
        match self.config.reload(path) {
            Ok(version) => {
                info!(path = %path.display(), version, "Configuration reloaded");
                Ok(version)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Configuration reload failed, keeping current settings");
                Err(err.into())
            }
        }
    }

    /// Stop every world and wait for all tasks.
    ///
    /// Returns each world's final status.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Join`] if a world task panicked.
    pub async fn shutdown(self) -> Result<Vec<WorldStatus>, EngineError> {
        info!(uptime_seconds = self.control.uptime_seconds(), "Engine shutting down");
        self.control.request_stop();

        let mut finals = Vec::with_capacity(self.worlds.len());
        for (name, handle) in self.worlds {
            drop(handle.commands);
            let last = handle
                .task
                .await
                .map_err(|source| EngineError::Join { name, source })?;
            info!(
                world = %last.world,
                name = %last.name,
                ticks = last.tick,
                day = last.day,
                weather = %last.weather,
                stage = ?last.progression.stage,
                "World summary"
            );
            finals.push(last);
        }

        if let Err(err) = self.sampler.await {
            warn!(error = %err, "Governor sampler ended abnormally");
        }
        let governor = self.services.governor.status();
        let exposure = self.services.exposure.stats();
        info!(
            tick_rate = governor.tick_rate,
            mode_changes = governor.mode_changes,
            exposure_hits = exposure.hits,
            exposure_probes = exposure.probes,
            "Engine stopped"
        );
        Ok(finals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_seeds_differ_by_name() {
        assert_eq!(world_seed(42, "world"), world_seed(42, "world"));
        assert_ne!(world_seed(42, "world"), world_seed(42, "world_nether"));
        assert_ne!(world_seed(1, "world"), world_seed(2, "world"));
    }
}
