//! Demo binary for the Stormfront weather engine.
//!
//! Wires the engine to an in-memory host, lets walkers drift through the
//! biome bands, and logs a status line per world until interrupted.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `stormfront-config.yaml` (or the path in
//!    `STORMFRONT_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Build the demo host and launch the engine
//! 4. Place walkers in every world
//! 5. Report, wander and reload the config file whenever it is saved,
//!    until Ctrl-C or the optional run time (first argument, in seconds)
//!    runs out
//! 6. Shut down and log the result
//!
//! `RUST_LOG` overrides `logging.level`.

mod demo;
mod error;
mod watch;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use stormfront_core::config::config_path;
use stormfront_core::{ConfigHandle, EngineHandle, NoHostMetrics, SimulationConfig, launch};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::demo::DemoHost;
use crate::error::AppError;
use crate::watch::ConfigWatcher;

/// Walkers placed in each world.
const WALKERS_PER_WORLD: usize = 24;

/// Seconds between status reports.
const REPORT_SECONDS: u64 = 10;

/// Milliseconds between walker steps.
const WANDER_MS: u64 = 500;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, logging or the engine fails.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load configuration.
    let path = config_path();
    let config = load_config(&path)?;

    // 2. Initialize structured logging.
    init_logging(&config)?;
    info!(
        path = %path.display(),
        worlds = ?config.engine.worlds,
        seed = config.engine.seed,
        tick_interval_ms = config.engine.tick_interval_ms,
        ticks_per_day = config.engine.ticks_per_day,
        "Configuration loaded"
    );

    // 3. Launch.
    let seed = config.engine.seed;
    let host = DemoHost::default();
    let handle = launch(ConfigHandle::new(config), host.services(), Arc::new(NoHostMetrics))?;

    // 4. Walkers.
    let mut rng = StdRng::seed_from_u64(seed);
    for (name, id) in handle.worlds() {
        host.roster.populate(id, WALKERS_PER_WORLD, &mut rng);
        debug!(world = %id, name = %name, "World populated");
    }
    info!(walkers = host.roster.count(), "Demo host ready");

    // 5. Run.
    let run_for = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse::<u64>().ok())
        .map(Duration::from_secs);
    run(&handle, &host, &path, run_for, &mut rng).await?;

    // 6. Shut down.
    let finals = handle.shutdown().await?;
    let counts = host.sinks.counts();
    info!(
        worlds = finals.len(),
        statuses = counts.statuses,
        damage = counts.damage,
        pushes = counts.pushes,
        messages = counts.messages,
        particles = counts.particles,
        sounds = counts.sounds,
        flag_writes = counts.flag_writes,
        "stormfront-engine shutdown complete"
    );
    match serde_json::to_string(&counts) {
        Ok(json) => debug!(counts = %json, "Output totals"),
        Err(err) => warn!(error = %err, "Could not encode output totals"),
    }
    Ok(())
}

/// Load the configuration file, falling back to defaults when it is
/// absent.
fn load_config(path: &Path) -> Result<SimulationConfig, AppError> {
    if path.exists() {
        Ok(SimulationConfig::from_file(path)?)
    } else {
        Ok(SimulationConfig::default())
    }
}

/// Install the global subscriber.
fn init_logging(config: &SimulationConfig) -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_unset| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if config.logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| AppError::Logging {
        message: err.to_string(),
    })
}

/// Drive the demo until Ctrl-C or the run time elapses.
async fn run(
    handle: &EngineHandle,
    host: &DemoHost,
    path: &Path,
    run_for: Option<Duration>,
    rng: &mut StdRng,
) -> Result<(), AppError> {
    let control = handle.control();
    let deadline = run_for.and_then(|limit| tokio::time::Instant::now().checked_add(limit));
    let mut report = tokio::time::interval(Duration::from_secs(REPORT_SECONDS));
    let mut wander = tokio::time::interval(Duration::from_millis(WANDER_MS));
    let mut watcher = match ConfigWatcher::new(path) {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Config watch unavailable, reload disabled");
            None
        }
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal?;
                info!("Interrupt received");
                break;
            }
            () = control.wait_for_stop() => break,
            () = sleep_until(deadline) => {
                info!("Run time elapsed");
                break;
            }
            _ = wander.tick() => host.roster.wander(rng),
            _ = report.tick() => report_status(handle),
            changed = config_changed(watcher.as_mut()) => {
                if changed.is_none() {
                    warn!("Config watcher stopped, reload disabled");
                    watcher = None;
                } else {
                    // A failed reload keeps the current settings and is logged by the engine.
                    let _kept = handle.reload_config(path);
                }
            }
        }
    }
    Ok(())
}

/// Sleep until `deadline`, or forever without one.
async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Next config change, or never without a watcher.
async fn config_changed(watcher: Option<&mut ConfigWatcher>) -> Option<()> {
    match watcher {
        Some(watcher) => watcher.changed().await,
        None => std::future::pending().await,
    }
}

/// Log one line per world plus governor and cache health.
fn report_status(handle: &EngineHandle) {
    for (name, _) in handle.worlds() {
        let Ok(status) = handle.world_status(&name) else {
            continue;
        };
        let members: usize = status.effects.iter().map(|e| e.members.len()).sum();
        let droughts = status.zones.values().filter(|z| z.drought).count();
        info!(
            world = %name,
            day = status.day,
            period = ?status.period,
            day_ends_in = status.day_ends_in,
            season = ?status.season,
            weather = %status.weather,
            stage = ?status.progression.stage,
            locked = status.lock.is_some(),
            members,
            droughts,
            "World status"
        );
    }
    let governor = handle.governor_status();
    let exposure = handle.exposure_stats();
    info!(
        tick_rate = governor.tick_rate,
        multiplier = governor.multiplier,
        performance_mode = governor.performance_mode,
        exposure_entries = exposure.entries,
        exposure_hits = exposure.hits,
        "Engine health"
    );
}
