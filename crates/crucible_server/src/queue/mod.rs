//! Fleet-wide player queues, host side.
//!
//! Queues are keyed by arena, then by origin server, FIFO within each
//! origin. The coordinator's periodic scan drains batches out of here; the
//! structures themselves are plain owned state mutated only on the
//! coordinator task.

pub mod pending;

use crate::directory::{ElementMatchup, MapTemplate};
use crucible_protocol::{PlayerId, QueuedPlayer};
use std::collections::{HashMap, VecDeque};

/// A queued player together with the origin queue it was drained from.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEntry {
    pub origin: String,
    pub player: QueuedPlayer,
}

/// Per-(arena, origin) FIFO queues of waiting players.
#[derive(Debug, Default)]
pub struct QueueCoordinator {
    queues: HashMap<String, HashMap<String, VecDeque<QueuedPlayer>>>,
}

impl QueueCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles a player in the queue for `(arena, origin)`.
    ///
    /// If the player already has an entry there it is removed and `false`
    /// is returned; otherwise the player is appended and `true` is
    /// returned. A player therefore holds at most one entry per key.
    pub fn toggle(&mut self, arena: &str, origin: &str, player: QueuedPlayer) -> bool {
        let queue = self
            .queues
            .entry(arena.to_lowercase())
            .or_default()
            .entry(origin.to_string())
            .or_default();

        if let Some(pos) = queue.iter().position(|p| p.uuid == player.uuid) {
            queue.remove(pos);
            return false;
        }

        queue.push_back(player);
        true
    }

    /// Removes the player from every queue on the host.
    pub fn remove_everywhere(&mut self, uuid: PlayerId) {
        for by_origin in self.queues.values_mut() {
            for queue in by_origin.values_mut() {
                queue.retain(|p| p.uuid != uuid);
            }
        }
    }

    /// Total players queued for the arena across all origins.
    pub fn total_queued(&self, arena: &str) -> usize {
        self.queues
            .get(&arena.to_lowercase())
            .map(|by_origin| by_origin.values().map(VecDeque::len).sum())
            .unwrap_or(0)
    }

    /// Drains up to `count` players for the arena into a batch.
    ///
    /// Players are taken round-robin across origins and FIFO within each
    /// origin, so no single backend can starve the others. Never removes
    /// more than are queued.
    pub fn drain_batch(&mut self, arena: &str, count: usize) -> Vec<QueuedEntry> {
        let mut batch = Vec::new();
        if count == 0 {
            return batch;
        }

        let Some(by_origin) = self.queues.get_mut(&arena.to_lowercase()) else {
            return batch;
        };

        let origins: Vec<String> = by_origin.keys().cloned().collect();
        'drain: loop {
            let mut progressed = false;
            for origin in &origins {
                let Some(queue) = by_origin.get_mut(origin) else {
                    continue;
                };

                if let Some(player) = queue.pop_front() {
                    batch.push(QueuedEntry {
                        origin: origin.clone(),
                        player,
                    });
                    progressed = true;

                    if batch.len() >= count {
                        break 'drain;
                    }
                }
            }

            if !progressed {
                break;
            }
        }

        batch
    }

    /// Pushes drained entries back onto the front of their origin queues,
    /// preserving their original order.
    pub fn requeue_front(&mut self, arena: &str, entries: Vec<QueuedEntry>) {
        let by_origin = self.queues.entry(arena.to_lowercase()).or_default();

        for entry in entries.into_iter().rev() {
            by_origin
                .entry(entry.origin)
                .or_default()
                .push_front(entry.player);
        }
    }

    /// Arenas that currently have at least one queued player.
    pub fn active_arenas(&self) -> Vec<String> {
        self.queues
            .iter()
            .filter(|(_, by_origin)| by_origin.values().any(|q| !q.is_empty()))
            .map(|(arena, _)| arena.clone())
            .collect()
    }

    /// Queue length for one `(arena, origin)` key.
    pub fn queue_len(&self, arena: &str, origin: &str) -> usize {
        self.queues
            .get(&arena.to_lowercase())
            .and_then(|by_origin| by_origin.get(origin))
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

/// The origin shared by every entry of a batch, if there is exactly one.
///
/// Used to stamp a batch-wide `origin` on the announcement so a reply can be
/// targeted; mixed-origin batches get none.
pub fn shared_origin(entries: &[QueuedEntry]) -> Option<String> {
    let mut shared: Option<&str> = None;
    for entry in entries {
        if entry.origin.is_empty() {
            return None;
        }

        match shared {
            None => shared = Some(&entry.origin),
            Some(existing) if existing != entry.origin => return None,
            Some(_) => {}
        }
    }

    shared.map(str::to_string)
}

/// Whether a batch satisfies a template's element matchup.
///
/// Every player must declare at least one of the two sides; players
/// declaring both are flexible and may cover either side's shortfall
/// against the per-team minimum.
pub fn batch_fits_matchup(
    matchup: &ElementMatchup,
    batch: &[QueuedEntry],
    min_players_per_team: usize,
) -> bool {
    let required = min_players_per_team.max(1);

    let mut left = 0usize;
    let mut right = 0usize;
    let mut flexible = 0usize;

    for entry in batch {
        let matches_left = entry.player.has_element(matchup.left);
        let matches_right = entry.player.has_element(matchup.right);

        match (matches_left, matches_right) {
            (false, false) => return false,
            (true, true) => flexible += 1,
            (true, false) => left += 1,
            (false, true) => right += 1,
        }
    }

    let left_shortfall = required.saturating_sub(left);
    let right_shortfall = required.saturating_sub(right);
    if flexible < left_shortfall + right_shortfall {
        return false;
    }

    left + flexible >= required && right + flexible >= required
}

/// Picks the first candidate template the batch fits.
///
/// Templates without a matchup accept any batch. The caller shuffles the
/// candidates, so repeated scans spread matches across maps.
pub fn select_map_for_batch<'a>(
    candidates: &'a [MapTemplate],
    batch: &[QueuedEntry],
    min_players_per_team: usize,
) -> Option<&'a MapTemplate> {
    candidates.iter().find(|template| match &template.matchup {
        None => true,
        Some(matchup) => batch_fits_matchup(matchup, batch, min_players_per_team),
    })
}
