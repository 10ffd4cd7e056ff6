//! The arena and template registry.
//!
//! An [`Arena`] is a match type: its team shape determines how many players a
//! batch needs and how many it can take. A [`MapTemplate`] is the immutable
//! definition of one playable map belonging to an arena; live instances are
//! always positioned copies of a template, never the template itself.
//!
//! One [`ArenaDirectory`] is owned per process and injected into the
//! coordinator; there is no process-global registry. On the host it is the
//! source of truth, on backends the remote-flagged entries are replaced
//! wholesale by the host's sync snapshot.

use crucible_protocol::{Bounds, Element, Position};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An inclusive integer range where `None` means unbounded above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    pub min: u32,
    pub max: Option<u32>,
}

impl IntRange {
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// A fixed range of exactly `n`.
    pub fn exactly(n: u32) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }
}

/// How a template's instances come to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapKind {
    /// The map exists once, pre-built; matches run in place
    Static,
    /// Every match gets a fresh positional copy in the instances world
    Dynamic,
}

/// An element restriction a template may place on its matches.
///
/// A batch fits when every player declares at least one of the two sides
/// and the flexible players (declaring both) can cover whichever side is
/// short of its per-team minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementMatchup {
    pub left: Element,
    pub right: Element,
}

/// Identity of a template: arena name plus map name, case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateKey {
    arena: String,
    map: String,
}

impl TemplateKey {
    pub fn new(arena: &str, map: &str) -> Self {
        Self {
            arena: arena.to_lowercase(),
            map: map.to_lowercase(),
        }
    }

    pub fn arena(&self) -> &str {
        &self.arena
    }

    pub fn map(&self) -> &str {
        &self.map
    }
}

impl std::fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.arena, self.map)
    }
}

/// The immutable definition of one playable map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapTemplate {
    /// Name of the arena this map belongs to
    pub arena: String,
    /// Map name, unique within the arena
    pub name: String,
    /// Whether matches copy this map or run on it in place
    pub kind: MapKind,
    /// Whether this map participates in fleet-wide (proxied) matches
    #[serde(default)]
    pub remote: bool,
    /// Source region of the map, required for dynamic templates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    /// Spawn points inside the source region
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spawn_points: Vec<Position>,
    /// Whether finished copies of this template are parked for reuse
    #[serde(default)]
    pub cache: bool,
    /// Whether a parked copy has its blocks repopulated from the template
    #[serde(default)]
    pub cache_reset: bool,
    /// Optional element restriction on matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matchup: Option<ElementMatchup>,
}

impl MapTemplate {
    pub fn key(&self) -> TemplateKey {
        TemplateKey::new(&self.arena, &self.name)
    }

    /// Number of spawn points, zero meaning unknown/unlimited.
    pub fn spawn_point_count(&self) -> usize {
        self.spawn_points.len()
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind == MapKind::Dynamic
    }
}

/// A match type: the team shape every map of this arena is played with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arena {
    /// Arena name, unique on the fleet
    pub name: String,
    /// Players per team
    pub team_size: IntRange,
    /// Teams per match
    pub team_count: IntRange,
}

impl Arena {
    /// The fewest players a match of this arena can start with.
    pub fn min_players(&self) -> usize {
        (self.team_size.min * self.team_count.min).max(1) as usize
    }

    /// The fewest players each team needs.
    pub fn min_players_per_team(&self) -> usize {
        self.team_size.min.max(1) as usize
    }

    /// The most players a match can take, `None` when unbounded.
    pub fn max_players(&self) -> Option<usize> {
        match (self.team_size.max, self.team_count.max) {
            (Some(size), Some(count)) => Some((size * count) as usize),
            _ => None,
        }
    }
}

/// Snapshot of the host's shareable configuration, shipped to backends
/// inside `sync_config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    pub arenas: Vec<Arena>,
    pub templates: Vec<MapTemplate>,
}

/// Per-process registry of arenas and templates.
#[derive(Debug, Default)]
pub struct ArenaDirectory {
    arenas: HashMap<String, Arena>,
    templates: HashMap<TemplateKey, MapTemplate>,
}

impl ArenaDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_arena(&mut self, arena: Arena) {
        self.arenas.insert(arena.name.to_lowercase(), arena);
    }

    pub fn insert_template(&mut self, template: MapTemplate) {
        self.templates.insert(template.key(), template);
    }

    pub fn arena(&self, name: &str) -> Option<&Arena> {
        self.arenas.get(&name.to_lowercase())
    }

    pub fn template(&self, arena: &str, map: &str) -> Option<&MapTemplate> {
        self.templates.get(&TemplateKey::new(arena, map))
    }

    /// Remote templates of an arena, the candidate set for queued matches.
    pub fn remote_templates(&self, arena: &str) -> Vec<&MapTemplate> {
        let arena = arena.to_lowercase();
        self.templates
            .values()
            .filter(|t| t.remote && t.arena.to_lowercase() == arena)
            .collect()
    }

    /// The shareable snapshot: every arena plus every remote template.
    pub fn snapshot(&self) -> DirectorySnapshot {
        DirectorySnapshot {
            arenas: self.arenas.values().cloned().collect(),
            templates: self
                .templates
                .values()
                .filter(|t| t.remote)
                .cloned()
                .collect(),
        }
    }

    /// Applies a host snapshot: arenas are upserted and every local
    /// remote-flagged template is replaced by the incoming set.
    ///
    /// Applying the same snapshot twice is a pure overwrite, so duplicate
    /// delivery is harmless.
    pub fn apply_snapshot(&mut self, snapshot: DirectorySnapshot) {
        for arena in snapshot.arenas {
            self.insert_arena(arena);
        }

        self.templates.retain(|_, t| !t.remote);
        for template in snapshot.templates {
            self.insert_template(template);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(arena: &str, name: &str, remote: bool) -> MapTemplate {
        MapTemplate {
            arena: arena.to_string(),
            name: name.to_string(),
            kind: MapKind::Dynamic,
            remote,
            bounds: Some(Bounds::new(0, 100, 0, 64, 0, 100)),
            spawn_points: Vec::new(),
            cache: false,
            cache_reset: false,
            matchup: None,
        }
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let mut directory = ArenaDirectory::new();
        directory.insert_arena(Arena {
            name: "Skirmish".to_string(),
            team_size: IntRange::exactly(2),
            team_count: IntRange::exactly(2),
        });
        directory.insert_template(template("Skirmish", "Ravine", true));

        assert!(directory.arena("skirmish").is_some());
        assert!(directory.template("SKIRMISH", "ravine").is_some());
    }

    #[test]
    fn player_bounds_derive_from_team_shape() {
        let arena = Arena {
            name: "skirmish".to_string(),
            team_size: IntRange::new(1, Some(4)),
            team_count: IntRange::exactly(2),
        };
        assert_eq!(arena.min_players(), 2);
        assert_eq!(arena.max_players(), Some(8));

        let unbounded = Arena {
            name: "ffa".to_string(),
            team_size: IntRange::new(1, None),
            team_count: IntRange::exactly(1),
        };
        assert_eq!(unbounded.min_players(), 1);
        assert_eq!(unbounded.max_players(), None);
    }

    #[test]
    fn snapshot_carries_only_remote_templates() {
        let mut directory = ArenaDirectory::new();
        directory.insert_template(template("skirmish", "ravine", true));
        directory.insert_template(template("skirmish", "practice", false));

        let snapshot = directory.snapshot();
        assert_eq!(snapshot.templates.len(), 1);
        assert_eq!(snapshot.templates[0].name, "ravine");
    }

    #[test]
    fn apply_snapshot_replaces_remote_templates_idempotently() {
        let mut directory = ArenaDirectory::new();
        directory.insert_template(template("skirmish", "practice", false));
        directory.insert_template(template("skirmish", "stale", true));

        let snapshot = DirectorySnapshot {
            arenas: vec![Arena {
                name: "skirmish".to_string(),
                team_size: IntRange::exactly(2),
                team_count: IntRange::exactly(2),
            }],
            templates: vec![template("skirmish", "ravine", true)],
        };

        directory.apply_snapshot(snapshot.clone());
        directory.apply_snapshot(snapshot);

        assert!(directory.template("skirmish", "stale").is_none());
        assert!(directory.template("skirmish", "ravine").is_some());
        // local, non-remote definitions survive the sync
        assert!(directory.template("skirmish", "practice").is_some());
        assert_eq!(directory.remote_templates("skirmish").len(), 1);
    }
}
