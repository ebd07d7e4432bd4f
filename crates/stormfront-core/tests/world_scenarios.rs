//! End-to-end scenarios driving a single [`World`] tick by tick against
//! in-memory host fakes.

#![allow(
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    missing_docs
)]

mod common;

use std::sync::Arc;
use std::time::Instant;

use common::{FakeHost, FixedSeason, fast_config};
use stormfront_core::config::SimulationConfig;
use stormfront_core::governor::{NoHostMetrics, PerformanceGovernor};
use stormfront_core::progression::ProgressionEvent;
use stormfront_core::world::{TickSummary, World, WorldServices};
use stormfront_types::{
    Biome, ClimateZone, EffectKind, ProgressionStage, Season, Vec3, WeatherType, WorldId,
};
use stormfront_world::SpatialExposureCache;

fn services(host: &FakeHost, config: &SimulationConfig) -> WorldServices {
    WorldServices {
        host: host.services.clone(),
        exposure: Arc::new(SpatialExposureCache::new(config.exposure.settings())),
        governor: Arc::new(PerformanceGovernor::new(
            config.governor.clone(),
            Arc::new(NoHostMetrics),
        )),
    }
}

fn run_until(world: &mut World, services: &WorldServices, tick: u64) -> Vec<TickSummary> {
    let mut summaries = Vec::new();
    while world.clock().tick() < tick {
        summaries.push(world.tick(services, Instant::now()).unwrap());
    }
    summaries
}

fn always_clear(mut config: SimulationConfig) -> SimulationConfig {
    config.forecast.clear_weight = 100;
    config.forecast.light_rain_weight = 0;
    config.forecast.heavy_rain_weight = 0;
    config.forecast.thunderstorm_weight = 0;
    config
}

fn arctic_winter() -> FakeHost {
    FakeHost::new(
        Biome::SnowyPlains,
        Some(Arc::new(FixedSeason {
            season: Season::Winter,
            temperature: -10.0,
        })),
    )
}

#[test]
fn five_clear_days_bring_drought_and_rain_ends_it() {
    let config = always_clear(fast_config());
    let host = FakeHost::new(Biome::Desert, None);
    let services = services(&host, &config);
    let world_id = WorldId::new();
    let walker = host.directory.spawn(world_id, Vec3::new(0.5, 70.0, 0.5));
    let mut world = World::new(world_id, "dunes", Arc::new(config), 7).unwrap();

    // Day 6 starts at tick 2000 with 400-tick days.
    run_until(&mut world, &services, 1_999);
    assert!(!world.zones().state(ClimateZone::Desert).unwrap().drought);
    assert_eq!(world.zones().state(ClimateZone::Desert).unwrap().clear_days, 4);

    let summaries = run_until(&mut world, &services, 2_000);
    assert_eq!(world.clock().day(), 6);
    assert!(summaries.last().unwrap().day_rolled);
    let desert = world.zones().state(ClimateZone::Desert).unwrap();
    assert_eq!(desert.clear_days, 5);
    assert!(desert.drought);
    assert!(world.occupant_report(walker).unwrap().drought);

    world.lock_weather(WeatherType::LightRain, 1);
    let desert = world.zones().state(ClimateZone::Desert).unwrap();
    assert!(!desert.drought);
    assert_eq!(desert.clear_days, 0);

    // The rainy day does not count toward the next drought.
    world.unlock_weather();
    run_until(&mut world, &services, 2_400);
    assert_eq!(world.zones().state(ClimateZone::Desert).unwrap().clear_days, 0);
    run_until(&mut world, &services, 2_800);
    assert_eq!(world.zones().state(ClimateZone::Desert).unwrap().clear_days, 1);
}

#[test]
fn blizzard_membership_follows_shelter() {
    let config = fast_config();
    let host = arctic_winter();
    let services = services(&host, &config);
    let world_id = WorldId::new();
    let climber = host.directory.spawn(world_id, Vec3::new(0.5, 70.0, 0.5));
    let mut world = World::new(world_id, "peaks", Arc::new(config), 11).unwrap();
    world.lock_weather(WeatherType::Thunderstorm, 60);

    run_until(&mut world, &services, 10);
    assert!(world.coordinator().is_active(EffectKind::Blizzard));
    assert!(world.coordinator().is_member(EffectKind::Blizzard, climber));
    assert!(host.status.statuses_for(climber) > 0);
    let report = world.occupant_report(climber).unwrap();
    assert_eq!(report.zone, ClimateZone::Arctic);
    assert_eq!(report.zone_weather, WeatherType::Blizzard);
    assert_eq!(report.memberships, vec![EffectKind::Blizzard]);

    // Walk into a hut far enough away to land in a fresh exposure bucket.
    let hut = Vec3::new(40.5, 70.0, 40.5);
    host.terrain.roof_over(hut.block());
    host.directory.move_to(climber, hut);
    run_until(&mut world, &services, 20);
    assert!(!world.coordinator().is_member(EffectKind::Blizzard, climber));
    assert!(world.occupant_report(climber).unwrap().indoor);

    let hits = host.status.statuses_for(climber);
    run_until(&mut world, &services, 60);
    assert_eq!(host.status.statuses_for(climber), hits);
}

#[test]
fn warm_air_keeps_occupants_out_of_a_blizzard() {
    let config = fast_config();
    let host = FakeHost::new(
        Biome::SnowyPlains,
        Some(Arc::new(FixedSeason {
            season: Season::Winter,
            temperature: 5.0,
        })),
    );
    let services = services(&host, &config);
    let world_id = WorldId::new();
    let warm = host.directory.spawn(world_id, Vec3::new(0.5, 70.0, 0.5));
    let mut world = World::new(world_id, "thaw", Arc::new(config), 3).unwrap();
    world.lock_weather(WeatherType::Thunderstorm, 60);
    run_until(&mut world, &services, 30);
    assert!(world.coordinator().is_active(EffectKind::Blizzard));
    assert!(!world.coordinator().is_member(EffectKind::Blizzard, warm));
}

#[test]
fn membership_never_exceeds_capacity() {
    let mut config = fast_config();
    config.blizzard.capacity = 3;
    let host = arctic_winter();
    let services = services(&host, &config);
    let world_id = WorldId::new();
    let crowd: Vec<_> = (0..8)
        .map(|i| host.directory.spawn(world_id, Vec3::new(f64::from(i) * 30.0, 70.0, 0.5)))
        .collect();
    let mut world = World::new(world_id, "crowded", Arc::new(config), 5).unwrap();
    world.lock_weather(WeatherType::Blizzard, 60);

    for _ in 0..10 {
        let next = world.clock().tick() + 10;
        let summaries = run_until(&mut world, &services, next);
        assert!(summaries.iter().any(|s| !s.memberships.is_empty()));
        let members = world.status().members_of(EffectKind::Blizzard).len();
        assert_eq!(members, 3);
    }

    let member = crowd
        .iter()
        .copied()
        .find(|id| world.coordinator().is_member(EffectKind::Blizzard, *id))
        .unwrap();
    host.directory.set_online(member, false);
    let next = world.clock().tick() + 10;
    run_until(&mut world, &services, next);
    assert!(!world.coordinator().is_member(EffectKind::Blizzard, member));
    assert_eq!(world.status().members_of(EffectKind::Blizzard).len(), 3);
}

#[test]
fn observed_stages_follow_the_ladder() {
    let mut config = fast_config();
    config.progression.stage_minutes.clear = 1;
    config.progression.stage_minutes.pre_storm = 1;
    config.progression.stage_minutes.light_rain = 1;
    config.progression.stage_minutes.heavy_rain = 1;
    config.progression.stage_minutes.thunderstorm = 1;
    config.progression.stage_minutes.post_storm = 1;
    // Days long enough for the ladder to climb before the forecast moves on.
    config.engine.ticks_per_day = 40_000;
    let host = FakeHost::new(Biome::Plains, None);
    let services = services(&host, &config);
    let mut world = World::new(WorldId::new(), "ladder", Arc::new(config), 99).unwrap();

    let mut changes = Vec::new();
    for summary in run_until(&mut world, &services, 400_000) {
        for event in summary.progression {
            if let ProgressionEvent::StageChanged { from, to } = event {
                changes.push((from, to));
            }
        }
    }

    assert!(!changes.is_empty());
    assert_eq!(changes.first().unwrap().0, ProgressionStage::Clear);
    for (from, to) in &changes {
        assert!(from.can_transition_to(*to), "illegal step {from:?} -> {to:?}");
    }
    for pair in changes.windows(2) {
        assert_eq!(pair[0].1, pair[1].0);
    }
}

#[test]
fn storm_passes_through_every_stage_and_announces_them() {
    let mut config = fast_config();
    config.progression.hail_chance = 0.0;
    let host = FakeHost::new(Biome::Plains, None);
    let services = services(&host, &config);
    let world_id = WorldId::new();
    let listener = host.directory.spawn(world_id, Vec3::new(0.5, 64.0, 0.5));
    let mut world = World::new(world_id, "plains", Arc::new(always_clear(config)), 1).unwrap();
    world.lock_weather(WeatherType::Thunderstorm, 60);

    let mut stages = vec![world.stage()];
    for summary in run_until(&mut world, &services, 20 * 1_200) {
        for event in summary.progression {
            if let ProgressionEvent::StageChanged { to, .. } = event {
                stages.push(to);
            }
        }
    }
    assert_eq!(
        stages,
        vec![
            ProgressionStage::Clear,
            ProgressionStage::PreStorm,
            ProgressionStage::LightRain,
            ProgressionStage::HeavyRain,
            ProgressionStage::Thunderstorm,
        ]
    );
    let heard = host.status.messages.lock().iter().filter(|(id, _)| *id == listener).count();
    assert!(heard >= 4);
    assert!(!host.cosmetics.sounds.lock().is_empty(), "pre-storm lightning cues were played");

    let flags = host.flags.writes.lock().last().copied().unwrap().1;
    assert!(flags.storm && flags.thundering);
}

#[test]
fn lock_reverts_exactly_at_expiry() {
    let mut config = always_clear(fast_config());
    config.progression.enabled = false;
    let host = FakeHost::new(Biome::Plains, None);
    let services = services(&host, &config);
    let world_id = WorldId::new();
    let mut world = World::new(world_id, "locked", Arc::new(config), 2).unwrap();

    let lock = world.lock_weather(WeatherType::Thunderstorm, 1);
    assert_eq!(lock.until_tick, 1_200);

    run_until(&mut world, &services, 1_199);
    let (_, flags) = host.flags.writes.lock().last().copied().unwrap();
    assert!(flags.storm && flags.thundering);
    assert_eq!(world.status().lock, Some(lock));

    run_until(&mut world, &services, 1_200);
    let (_, flags) = host.flags.writes.lock().last().copied().unwrap();
    assert!(!flags.storm && !flags.thundering);

    run_until(&mut world, &services, 1_300);
    assert_eq!(world.weather(), WeatherType::Clear);
    assert_eq!(world.status().lock, None);
}

#[test]
fn flags_are_not_rewritten_while_the_sky_holds() {
    let mut config = always_clear(fast_config());
    config.progression.enabled = false;
    let host = FakeHost::new(Biome::Plains, None);
    let services = services(&host, &config);
    let mut world = World::new(WorldId::new(), "calm", Arc::new(config), 4).unwrap();

    // 100-tick periods: one write per period at most.
    run_until(&mut world, &services, 399);
    let writes = host.flags.writes.lock().len();
    assert!((1..=4).contains(&writes), "unexpected write count {writes}");
}

#[test]
fn regenerated_forecast_is_for_today() {
    let config = fast_config();
    let host = FakeHost::new(Biome::Plains, None);
    let services = services(&host, &config);
    let mut world = World::new(WorldId::new(), "redraw", Arc::new(config), 8).unwrap();
    run_until(&mut world, &services, 450);
    let forecast = world.regenerate_forecast();
    assert_eq!(forecast.day, 2);
    let status = world.status();
    assert_eq!(status.forecast, Some(forecast));
    assert_eq!(status.day_ends_in, 350);
}

#[test]
fn shutdown_clears_every_membership() {
    let config = fast_config();
    let host = arctic_winter();
    let services = services(&host, &config);
    let world_id = WorldId::new();
    let climber = host.directory.spawn(world_id, Vec3::new(0.5, 90.0, 0.5));
    let mut world = World::new(world_id, "closing", Arc::new(config), 6).unwrap();
    world.lock_weather(WeatherType::Thunderstorm, 60);
    run_until(&mut world, &services, 20);
    assert!(world.coordinator().status().iter().any(|s| !s.members.is_empty()));
    services.governor.record_emission(climber, 10, Instant::now());
    assert!(services.exposure.stats().entries > 0);

    let tasks = world.shutdown(&services);
    assert!(tasks.is_empty());
    let status = world.status();
    assert!(status.effects.iter().all(|e| !e.active && e.members.is_empty()));
    assert_eq!(services.exposure.stats().entries, 0);
    assert_eq!(services.governor.status().tracked_occupants, 0);
}

#[test]
fn departed_occupants_release_their_emission_counters() {
    let config = fast_config();
    let host = FakeHost::new(Biome::Plains, None);
    let services = services(&host, &config);
    let world_id = WorldId::new();
    let stays = host.directory.spawn(world_id, Vec3::new(0.5, 70.0, 0.5));
    let leaves = host.directory.spawn(world_id, Vec3::new(20.5, 70.0, 0.5));
    let mut world = World::new(world_id, "exits", Arc::new(config), 12).unwrap();
    run_until(&mut world, &services, 10);

    services.governor.record_emission(stays, 5, Instant::now());
    services.governor.record_emission(leaves, 5, Instant::now());
    assert_eq!(services.governor.status().tracked_occupants, 2);

    host.directory.remove(leaves);
    run_until(&mut world, &services, 20);
    assert_eq!(services.governor.status().tracked_occupants, 1);
}
