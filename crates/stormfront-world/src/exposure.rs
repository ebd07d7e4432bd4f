//! Sky-exposure ("is this location indoors") classification with a
//! process-wide memo.
//!
//! # Probe
//!
//! Classification runs in two phases from the occupant's eye position:
//!
//! 1. **Vertical probe** -- walk straight up to `ceiling_distance` blocks.
//!    Any solid surface that is not in the ignore-set means indoors.
//! 2. **Sky probe** -- trace 9 fixed rays (straight up, 4 diagonal-up,
//!    4 horizontal) for `ray_steps` blocks each. A ray is blocked by the
//!    first non-ignored solid surface. The location is exposed iff the
//!    fraction of unblocked rays is strictly greater than
//!    `exposed_fraction` (0.4 by default).
//!
//! # Cache
//!
//! Results are memoized per `(world, bucket)` where a bucket is a cube of
//! `bucket_size` blocks per axis. An entry is authoritative for `ttl`
//! (15 s). Expired entries are swept lazily: each miss rolls a small
//! chance to run a full `retain` over the map, so no timer task exists.
//!
//! The cache is a [`DashMap`], shared by the mutation timeline and every
//! render task. Two concurrent misses on the same bucket may both probe;
//! the later write wins and both results are equally valid.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use rand::Rng;
use stormfront_types::{BlockPos, WorldId};
use tracing::debug;

use crate::host::{Surface, TerrainView};

/// Direction vectors traced by the sky probe.
const SKY_RAYS: [(i32, i32, i32); 9] = [
    (0, 1, 0),
    (1, 1, 0),
    (-1, 1, 0),
    (0, 1, 1),
    (0, 1, -1),
    (1, 0, 0),
    (-1, 0, 0),
    (0, 0, 1),
    (0, 0, -1),
];

/// Tunables for the exposure probe and cache.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureSettings {
    /// Blocks scanned straight up in the fast vertical probe.
    pub ceiling_distance: i32,
    /// Blocks traced along each sky ray.
    pub ray_steps: i32,
    /// Edge length of a cache bucket in blocks.
    pub bucket_size: i32,
    /// How long a cached result stays authoritative.
    pub ttl: Duration,
    /// Exposed iff the unblocked-ray fraction is strictly above this.
    pub exposed_fraction: f64,
    /// Chance per cache miss of sweeping expired entries.
    pub sweep_probability: f64,
    /// Solid materials that never block the sky (glass panes, leaves, ...).
    pub ignored_materials: HashSet<String>,
}

impl Default for ExposureSettings {
    fn default() -> Self {
        Self {
            ceiling_distance: 24,
            ray_steps: 12,
            bucket_size: 5,
            ttl: Duration::from_secs(15),
            exposed_fraction: 0.4,
            sweep_probability: 0.02,
            ignored_materials: ["glass_pane", "iron_bars", "leaves", "vine", "fence", "carpet"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }
}

/// A memoized probe result.
#[derive(Debug, Clone, Copy)]
struct ExposureEntry {
    exposed: bool,
    probed_at: Instant,
}

/// Counters describing cache behavior since creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExposureStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that ran a fresh probe.
    pub probes: u64,
    /// Entries currently held.
    pub entries: usize,
}

/// Process-wide memoized indoor/outdoor classifier.
#[derive(Debug)]
pub struct SpatialExposureCache {
    entries: DashMap<(WorldId, (i32, i32, i32)), ExposureEntry>,
    settings: RwLock<ExposureSettings>,
    hits: AtomicU64,
    probes: AtomicU64,
}

impl Default for SpatialExposureCache {
    fn default() -> Self {
        Self::new(ExposureSettings::default())
    }
}

impl SpatialExposureCache {
    /// Create an empty cache.
    pub fn new(settings: ExposureSettings) -> Self {
        Self {
            entries: DashMap::new(),
            settings: RwLock::new(settings),
            hits: AtomicU64::new(0),
            probes: AtomicU64::new(0),
        }
    }

    /// Replace the settings and drop every cached result.
    pub fn reconfigure(&self, settings: ExposureSettings) {
        *self.settings.write() = settings;
        self.entries.clear();
    }

    /// Whether `pos` in `world` is sheltered from the sky.
    ///
    /// `now` is the caller's monotonic clock reading; tests pass synthetic
    /// instants to step across the TTL.
    pub fn is_indoor(
        &self,
        terrain: &dyn TerrainView,
        world: WorldId,
        pos: BlockPos,
        now: Instant,
    ) -> bool {
        !self.is_exposed(terrain, world, pos, now)
    }

    /// Whether `pos` in `world` has open sky access.
    pub fn is_exposed(
        &self,
        terrain: &dyn TerrainView,
        world: WorldId,
        pos: BlockPos,
        now: Instant,
    ) -> bool {
        let settings = self.settings.read();
        let key = (world, pos.bucket(settings.bucket_size));

        if let Some(entry) = self.entries.get(&key) {
            if now.saturating_duration_since(entry.probed_at) < settings.ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return entry.exposed;
            }
        }

        let exposed = probe(terrain, world, pos, &settings);
        self.probes.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            key,
            ExposureEntry {
                exposed,
                probed_at: now,
            },
        );

        let chance = settings.sweep_probability.clamp(0.0, 1.0);
        if rand::rng().random_bool(chance) {
            self.sweep(now, settings.ttl);
        }
        exposed
    }

    /// Remove every expired entry.
    pub fn sweep(&self, now: Instant, ttl: Duration) {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.probed_at) < ttl);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "Swept expired exposure entries");
        }
    }

    /// Drop every cached result for one world.
    pub fn forget_world(&self, world: WorldId) {
        self.entries.retain(|(entry_world, _), _| *entry_world != world);
    }

    /// Current counters.
    pub fn stats(&self) -> ExposureStats {
        ExposureStats {
            hits: self.hits.load(Ordering::Relaxed),
            probes: self.probes.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

/// Whether a surface stops a probe.
fn blocks(surface: Surface, settings: &ExposureSettings) -> bool {
    match surface {
        Surface::Open => false,
        Surface::Solid { material } => !settings.ignored_materials.contains(material),
    }
}

/// Run the two-phase probe from the eye position above `pos`.
fn probe(
    terrain: &dyn TerrainView,
    world: WorldId,
    pos: BlockPos,
    settings: &ExposureSettings,
) -> bool {
    let eye = pos.offset(0, 1, 0);

    // Phase 1: anything overhead settles it.
    for dy in 1..=settings.ceiling_distance {
        if blocks(terrain.surface_at(world, eye.offset(0, dy, 0)), settings) {
            return false;
        }
    }

    // Phase 2: fraction of open rays.
    let open_rays = SKY_RAYS
        .iter()
        .filter(|&&(dx, dy, dz)| {
            (1..=settings.ray_steps).all(|step| {
                let target = eye.offset(
                    dx.saturating_mul(step),
                    dy.saturating_mul(step),
                    dz.saturating_mul(step),
                );
                !blocks(terrain.surface_at(world, target), settings)
            })
        })
        .count();

    let open = u32::try_from(open_rays).unwrap_or(0);
    let total = u32::try_from(SKY_RAYS.len()).unwrap_or(u32::MAX);
    let fraction = f64::from(open) / f64::from(total);
    fraction > settings.exposed_fraction
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    use stormfront_types::Biome;

    use super::*;
    use crate::error::WorldError;

    /// Terrain made of an explicit set of solid blocks; counts lookups.
    #[derive(Default)]
    struct BlockTerrain {
        solids: HashMap<BlockPos, &'static str>,
        lookups: AtomicUsize,
    }

    impl BlockTerrain {
        fn with(mut self, pos: BlockPos, material: &'static str) -> Self {
            self.solids.insert(pos, material);
            self
        }

        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::Relaxed)
        }
    }

    impl TerrainView for BlockTerrain {
        fn biome_at(&self, _world: WorldId, _pos: BlockPos) -> Result<Biome, WorldError> {
            Ok(Biome::Plains)
        }

        fn surface_at(&self, _world: WorldId, pos: BlockPos) -> Surface {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            self.solids
                .get(&pos)
                .map_or(Surface::Open, |&material| Surface::Solid { material })
        }
    }

    fn no_sweep() -> ExposureSettings {
        ExposureSettings {
            sweep_probability: 0.0,
            ..ExposureSettings::default()
        }
    }

    /// Surround the eye of `pos` with walls on all four sides.
    fn walled(terrain: BlockTerrain, pos: BlockPos) -> BlockTerrain {
        let eye = pos.offset(0, 1, 0);
        let mut t = terrain;
        for (dx, dz) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            t = t.with(eye.offset(dx, 0, dz), "stone");
            t = t.with(eye.offset(dx, 1, dz), "stone");
        }
        t
    }

    #[test]
    fn open_field_is_exposed() {
        let cache = SpatialExposureCache::new(no_sweep());
        let terrain = BlockTerrain::default();
        let now = Instant::now();
        assert!(!cache.is_indoor(&terrain, WorldId::new(), BlockPos::new(0, 64, 0), now));
    }

    #[test]
    fn roof_overhead_is_indoor() {
        let cache = SpatialExposureCache::new(no_sweep());
        let pos = BlockPos::new(0, 64, 0);
        let terrain = BlockTerrain::default().with(pos.offset(0, 4, 0), "oak_planks");
        assert!(cache.is_indoor(&terrain, WorldId::new(), pos, Instant::now()));
    }

    #[test]
    fn ignored_roof_material_does_not_shelter() {
        let cache = SpatialExposureCache::new(no_sweep());
        let pos = BlockPos::new(0, 64, 0);
        let terrain = BlockTerrain::default().with(pos.offset(0, 4, 0), "glass_pane");
        assert!(!cache.is_indoor(&terrain, WorldId::new(), pos, Instant::now()));
    }

    #[test]
    fn deep_pit_with_open_sky_is_indoor() {
        // Walls on four sides and all four diagonals: only the vertical ray
        // is open, 1/9 is below the 0.4 threshold.
        let cache = SpatialExposureCache::new(no_sweep());
        let pos = BlockPos::new(0, 64, 0);
        let terrain = walled(BlockTerrain::default(), pos);
        assert!(cache.is_indoor(&terrain, WorldId::new(), pos, Instant::now()));
    }

    #[test]
    fn open_sided_shelter_is_exposed() {
        // Only horizontal walls: 5 of 9 rays are open, above 0.4.
        let cache = SpatialExposureCache::new(no_sweep());
        let pos = BlockPos::new(0, 64, 0);
        let eye = pos.offset(0, 1, 0);
        let mut terrain = BlockTerrain::default();
        for (dx, dz) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            terrain = terrain.with(eye.offset(dx, 0, dz), "stone");
        }
        assert!(!cache.is_indoor(&terrain, WorldId::new(), pos, Instant::now()));
    }

    #[test]
    fn same_bucket_within_ttl_hits_cache() {
        let cache = SpatialExposureCache::new(no_sweep());
        let terrain = BlockTerrain::default();
        let world = WorldId::new();
        let start = Instant::now();

        let first = cache.is_indoor(&terrain, world, BlockPos::new(1, 64, 1), start);
        let lookups_after_first = terrain.lookups();
        let second = cache.is_indoor(
            &terrain,
            world,
            BlockPos::new(3, 64, 2),
            start + Duration::from_secs(14),
        );

        assert_eq!(first, second);
        assert_eq!(terrain.lookups(), lookups_after_first);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.probes, 1);
    }

    #[test]
    fn expired_entry_reprobes() {
        let cache = SpatialExposureCache::new(no_sweep());
        let terrain = BlockTerrain::default();
        let world = WorldId::new();
        let start = Instant::now();

        cache.is_indoor(&terrain, world, BlockPos::new(0, 64, 0), start);
        cache.is_indoor(
            &terrain,
            world,
            BlockPos::new(0, 64, 0),
            start + Duration::from_secs(15),
        );
        assert_eq!(cache.stats().probes, 2);
    }

    #[test]
    fn different_worlds_do_not_share_entries() {
        let cache = SpatialExposureCache::new(no_sweep());
        let terrain = BlockTerrain::default();
        let now = Instant::now();
        cache.is_indoor(&terrain, WorldId::new(), BlockPos::new(0, 64, 0), now);
        cache.is_indoor(&terrain, WorldId::new(), BlockPos::new(0, 64, 0), now);
        assert_eq!(cache.stats().probes, 2);
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let cache = SpatialExposureCache::new(no_sweep());
        let terrain = BlockTerrain::default();
        let world = WorldId::new();
        let start = Instant::now();
        cache.is_indoor(&terrain, world, BlockPos::new(0, 64, 0), start);
        cache.is_indoor(
            &terrain,
            world,
            BlockPos::new(100, 64, 0),
            start + Duration::from_secs(10),
        );

        cache.sweep(start + Duration::from_secs(20), Duration::from_secs(15));
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn reconfigure_clears_entries() {
        let cache = SpatialExposureCache::new(no_sweep());
        let terrain = BlockTerrain::default();
        cache.is_indoor(&terrain, WorldId::new(), BlockPos::new(0, 64, 0), Instant::now());
        cache.reconfigure(no_sweep());
        assert_eq!(cache.stats().entries, 0);
    }
}
