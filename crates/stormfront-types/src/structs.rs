//! Core value structs: positions, occupants, weather flags and cosmetic
//! emission records.

use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::enums::{ParticleKind, SoundKind};
use crate::ids::{OccupantId, WorldId};

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Integer block coordinate in a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct BlockPos {
    /// East-west axis.
    pub x: i32,
    /// Vertical axis.
    pub y: i32,
    /// North-south axis.
    pub z: i32,
}

impl BlockPos {
    /// Construct a block position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Offset by a delta, saturating at the `i32` bounds.
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
            z: self.z.saturating_add(dz),
        }
    }

    /// Coarse spatial bucket containing this position.
    ///
    /// Uses floored division so negative coordinates bucket correctly.
    /// A `size` of zero is treated as one.
    pub const fn bucket(self, size: i32) -> (i32, i32, i32) {
        let size = if size <= 0 { 1 } else { size };
        (
            self.x.div_euclid(size),
            self.y.div_euclid(size),
            self.z.div_euclid(size),
        )
    }

    /// Center of the block as a floating-point position.
    pub fn center(self) -> Vec3 {
        Vec3::new(
            f64::from(self.x) + 0.5,
            f64::from(self.y) + 0.5,
            f64::from(self.z) + 0.5,
        )
    }
}

/// Floating-point vector used for positions and velocities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    /// East-west component.
    pub x: f64,
    /// Vertical component.
    pub y: f64,
    /// North-south component.
    pub z: f64,
}

impl Vec3 {
    /// The zero vector.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Construct a vector.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Scale every component by `factor`.
    #[must_use]
    pub const fn scale(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// Euclidean length.
    pub fn length(self) -> f64 {
        self.x.hypot(self.y).hypot(self.z)
    }

    /// Squared horizontal distance to another point (ignores `y`).
    pub fn horizontal_distance_sq(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        dx.mul_add(dx, dz * dz)
    }

    /// Block containing this point.
    #[allow(clippy::cast_possible_truncation)]
    pub fn block(self) -> BlockPos {
        // Saturating float-to-int casts; world coordinates are far inside i32.
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

// ---------------------------------------------------------------------------
// Occupants
// ---------------------------------------------------------------------------

/// A point-in-time view of an occupant, read from the host's presence
/// provider at the start of a membership tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occupant {
    /// Occupant identifier.
    pub id: OccupantId,
    /// World the occupant is in.
    pub world: WorldId,
    /// Exact position (feet).
    pub position: Vec3,
    /// Whether the occupant is still connected.
    pub online: bool,
}

impl Occupant {
    /// Block the occupant is standing in.
    pub fn block(&self) -> BlockPos {
        self.position.block()
    }

    /// Vertical coordinate.
    pub const fn altitude(&self) -> f64 {
        self.position.y
    }
}

// ---------------------------------------------------------------------------
// World weather flags
// ---------------------------------------------------------------------------

/// The storm/thunder flags the host world renders, with their duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct WeatherFlags {
    /// Precipitation flag.
    pub storm: bool,
    /// Thunder flag.
    pub thundering: bool,
    /// How long the flags should hold, in ticks.
    pub duration_ticks: u64,
}

impl WeatherFlags {
    /// Whether two flag sets render identically (duration ignored).
    pub const fn same_sky(&self, other: &Self) -> bool {
        self.storm == other.storm && self.thundering == other.thundering
    }
}

// ---------------------------------------------------------------------------
// Cosmetic output
// ---------------------------------------------------------------------------

/// A batch of particles shown to one occupant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleEmission {
    /// World the particles appear in.
    pub world: WorldId,
    /// Occupant who receives the particles.
    pub viewer: OccupantId,
    /// Particle type.
    pub kind: ParticleKind,
    /// Spawn position.
    pub position: Vec3,
    /// Initial velocity.
    pub velocity: Vec3,
    /// Number of particles in the batch.
    pub count: u32,
}

/// A sound played to one occupant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundEmission {
    /// World the sound plays in.
    pub world: WorldId,
    /// Occupant who hears the sound.
    pub listener: OccupantId,
    /// Sound type.
    pub kind: SoundKind,
    /// Source position.
    pub position: Vec3,
    /// Volume (1.0 = normal).
    pub volume: f32,
    /// Pitch (1.0 = normal).
    pub pitch: f32,
}
