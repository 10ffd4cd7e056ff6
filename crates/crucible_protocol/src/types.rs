//! Core identifier and geometry types shared across the fleet.
//!
//! These are the building blocks carried inside bus messages: player
//! identity, process role, and the integer box geometry used to describe
//! map regions in the shared instances world.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a player anywhere on the fleet.
///
/// A wrapper around UUID that provides type safety so player ids cannot be
/// confused with other identifiers in the system. Serializes as the plain
/// UUID string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Creates a new random player id using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a player id from its string representation.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::str::FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role a process plays on the fleet.
///
/// Exactly one process is the host: it owns match assignment, the region
/// allocator and the instance cache. Every other process is a backend that
/// originates queue and join requests over the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The single designated process that owns match assignment
    Host,
    /// Any non-host process
    Backend,
}

impl Role {
    /// Whether this role is the host.
    pub fn is_host(&self) -> bool {
        matches!(self, Role::Host)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Host => write!(f, "host"),
            Role::Backend => write!(f, "backend"),
        }
    }
}

/// A position in a map world.
///
/// Used for spawn points inside template definitions. Double precision to
/// stay accurate in large worlds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns this position shifted by the given block offsets.
    pub fn shift(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx as f64,
            y: self.y + dy as f64,
            z: self.z + dz as f64,
        }
    }
}

/// An axis-aligned integer box in the shared instances world.
///
/// Template definitions carry the box of their source region; live instances
/// carry the box of their shifted copy. Two live instances must never hold
/// overlapping bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
    pub min_z: i32,
    pub max_z: i32,
}

impl Bounds {
    pub fn new(min_x: i32, max_x: i32, min_y: i32, max_y: i32, min_z: i32, max_z: i32) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
            min_z,
            max_z,
        }
    }

    /// The extent of this box along the X axis, the axis instances are
    /// packed along.
    pub fn width(&self) -> i32 {
        self.max_x - self.min_x
    }

    /// Returns this box shifted by the given offsets.
    pub fn shift(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            min_x: self.min_x + dx,
            max_x: self.max_x + dx,
            min_y: self.min_y + dy,
            max_y: self.max_y + dy,
            min_z: self.min_z + dz,
            max_z: self.max_z + dz,
        }
    }

    /// Whether this box intersects `other` on all three axes.
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
            && self.min_z <= other.max_z
            && self.max_z >= other.min_z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_id_round_trips_through_string() {
        let id = PlayerId::new();
        let parsed = PlayerId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn player_id_rejects_garbage() {
        assert!(PlayerId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn bounds_shift_moves_all_coordinates() {
        let bounds = Bounds::new(0, 100, 0, 64, 0, 100);
        let shifted = bounds.shift(2048, 0, 0);
        assert_eq!(shifted.min_x, 2048);
        assert_eq!(shifted.max_x, 2148);
        assert_eq!(shifted.min_y, 0);
        assert_eq!(shifted.width(), bounds.width());
    }

    #[test]
    fn bounds_overlap_detection() {
        let a = Bounds::new(0, 100, 0, 64, 0, 100);
        let b = Bounds::new(50, 150, 0, 64, 0, 100);
        let c = Bounds::new(101, 200, 0, 64, 0, 100);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn bounds_overlap_requires_all_axes() {
        let a = Bounds::new(0, 100, 0, 64, 0, 100);
        let above = Bounds::new(0, 100, 65, 128, 0, 100);
        assert!(!a.overlaps(&above));
    }
}
