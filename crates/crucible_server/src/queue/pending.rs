//! Pending joins: batches dispatched to the host, waiting for every member
//! to physically arrive before their match starts.
//!
//! A batch advances all-or-nothing. A partially-arrived batch blocks until
//! its last member shows up; a member who never connects parks the batch
//! until their disconnect removes the record. No timeout is enforced here —
//! a match cannot start short-handed, and the periodic queue scan keeps the
//! rest of the system moving regardless.

use crucible_protocol::{PlayerId, QueuedPlayer};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A batch of players selected for one match, waiting on arrivals.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBatch {
    pub arena: String,
    pub map: String,
    pub players: Vec<QueuedPlayer>,
    /// Batch-wide origin fallback for members without their own
    pub origin: Option<String>,
}

/// Host-side records of who is awaited, and where to send them back.
///
/// Every member of a registered batch maps to the same shared batch record;
/// claiming a batch removes all of its members at once, which is what makes
/// the start transition exactly-once under repeated presence events.
#[derive(Debug, Default)]
pub struct PendingJoinCoordinator {
    pending: HashMap<PlayerId, Arc<PendingBatch>>,
    origins: HashMap<PlayerId, String>,
}

impl PendingJoinCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a dispatched batch, recording each member's return origin.
    ///
    /// Re-registering a batch with the same members is an overwrite, so a
    /// duplicated announcement does not create duplicate state.
    pub fn register(&mut self, batch: PendingBatch) -> Arc<PendingBatch> {
        let shared = Arc::new(batch);

        for player in &shared.players {
            self.pending.insert(player.uuid, Arc::clone(&shared));

            if let Some(origin) = player.origin_or(shared.origin.as_deref()) {
                self.origins.insert(player.uuid, origin.to_string());
            }
        }

        shared
    }

    /// Re-checks the batch `player` belongs to against the online set.
    ///
    /// Returns the batch exactly once, when every member is present: the
    /// members' pending records are removed before returning, so a repeated
    /// presence event for the same batch finds nothing. Return origins are
    /// kept until the players leave the host again.
    pub fn try_claim(
        &mut self,
        player: PlayerId,
        online: &HashSet<PlayerId>,
    ) -> Option<Arc<PendingBatch>> {
        let batch = self.pending.get(&player)?.clone();

        if !batch.players.iter().all(|p| online.contains(&p.uuid)) {
            return None;
        }

        for member in &batch.players {
            self.pending.remove(&member.uuid);
        }

        Some(batch)
    }

    /// Whether the player is awaited by some batch.
    pub fn is_pending(&self, player: PlayerId) -> bool {
        self.pending.contains_key(&player)
    }

    /// The origin recorded for a player, if any.
    pub fn origin_of(&self, player: PlayerId) -> Option<&str> {
        self.origins.get(&player).map(String::as_str)
    }

    /// Removes and returns a player's recorded origin.
    pub fn take_origin(&mut self, player: PlayerId) -> Option<String> {
        self.origins.remove(&player)
    }

    /// Drops every record for a player. Called on disconnect; this is the
    /// cleanup that unparks a batch whose member never arrived.
    pub fn remove(&mut self, player: PlayerId) {
        self.pending.remove(&player);
        self.origins.remove(&player);
    }

    /// Number of players currently awaited.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch_of(players: &[QueuedPlayer]) -> PendingBatch {
        PendingBatch {
            arena: "skirmish".to_string(),
            map: "ravine".to_string(),
            players: players.to_vec(),
            origin: Some("lobby-1".to_string()),
        }
    }

    #[test]
    fn partial_arrival_does_not_claim() {
        let mut pending = PendingJoinCoordinator::new();
        let players = vec![
            QueuedPlayer::new(PlayerId::new()),
            QueuedPlayer::new(PlayerId::new()),
        ];
        pending.register(batch_of(&players));

        let mut online = HashSet::new();
        online.insert(players[0].uuid);

        assert!(pending.try_claim(players[0].uuid, &online).is_none());
        assert!(pending.is_pending(players[0].uuid));
        assert!(pending.is_pending(players[1].uuid));
    }

    #[test]
    fn full_arrival_claims_exactly_once() {
        let mut pending = PendingJoinCoordinator::new();
        let players = vec![
            QueuedPlayer::new(PlayerId::new()),
            QueuedPlayer::new(PlayerId::new()),
        ];
        pending.register(batch_of(&players));

        let online: HashSet<PlayerId> = players.iter().map(|p| p.uuid).collect();

        let claimed = pending.try_claim(players[1].uuid, &online);
        assert!(claimed.is_some());
        assert_eq!(claimed.unwrap().players.len(), 2);

        // a repeated presence event finds no pending record
        assert!(pending.try_claim(players[1].uuid, &online).is_none());
        assert!(pending.try_claim(players[0].uuid, &online).is_none());
        assert_eq!(pending.pending_count(), 0);
    }

    #[test]
    fn per_player_origin_beats_batch_origin() {
        let mut pending = PendingJoinCoordinator::new();
        let with_own = QueuedPlayer::with_origin(PlayerId::new(), "lobby-2");
        let without = QueuedPlayer::new(PlayerId::new());
        pending.register(batch_of(&[with_own.clone(), without.clone()]));

        assert_eq!(pending.origin_of(with_own.uuid), Some("lobby-2"));
        assert_eq!(pending.origin_of(without.uuid), Some("lobby-1"));
    }

    #[test]
    fn origins_survive_the_claim() {
        let mut pending = PendingJoinCoordinator::new();
        let player = QueuedPlayer::new(PlayerId::new());
        pending.register(batch_of(&[player.clone()]));

        let online: HashSet<PlayerId> = [player.uuid].into_iter().collect();
        assert!(pending.try_claim(player.uuid, &online).is_some());

        // still routable back to origin after the match starts
        assert_eq!(pending.origin_of(player.uuid), Some("lobby-1"));
        assert_eq!(pending.take_origin(player.uuid), Some("lobby-1".to_string()));
        assert_eq!(pending.origin_of(player.uuid), None);
    }

    #[test]
    fn disconnect_removes_all_records() {
        let mut pending = PendingJoinCoordinator::new();
        let player = QueuedPlayer::new(PlayerId::new());
        pending.register(batch_of(&[player.clone()]));

        pending.remove(player.uuid);
        assert!(!pending.is_pending(player.uuid));
        assert_eq!(pending.origin_of(player.uuid), None);
    }
}
