//! Seam to the gameplay and player-movement systems.
//!
//! The coordination core decides *that* a match starts and *where* players
//! go; actually starting gameplay and physically moving players between
//! servers belongs to the surrounding game server. This trait is that
//! boundary.

use crate::error::DriverError;
use crate::instance::InstanceCopy;
use crate::queue::pending::PendingBatch;
use async_trait::async_trait;
use crucible_protocol::PlayerId;
use tracing::info;

/// Callbacks into the systems that own gameplay and player movement.
#[async_trait]
pub trait MatchDriver: Send + Sync {
    /// Starts a match for a fully-arrived batch.
    ///
    /// `instance` is the prepared copy for dynamic maps, or `None` when the
    /// match runs on a static map in place. An error here routes every
    /// batch member back to their origin server.
    async fn start_match(
        &self,
        batch: &PendingBatch,
        instance: Option<&InstanceCopy>,
    ) -> Result<(), DriverError>;

    /// Moves a player from this backend to the host server.
    async fn transfer_to_host(&self, player: PlayerId);

    /// Sends a player back to the named origin server.
    async fn return_to_origin(&self, player: PlayerId, origin: &str);
}

/// Driver that only logs, for deployments and tools that run the
/// coordination pipeline without a game server attached.
#[derive(Debug, Default)]
pub struct LoggingDriver;

#[async_trait]
impl MatchDriver for LoggingDriver {
    async fn start_match(
        &self,
        batch: &PendingBatch,
        instance: Option<&InstanceCopy>,
    ) -> Result<(), DriverError> {
        info!(
            "Match start: arena {} map {} with {} players (instance slot: {:?})",
            batch.arena,
            batch.map,
            batch.players.len(),
            instance.map(|i| i.slot)
        );
        Ok(())
    }

    async fn transfer_to_host(&self, player: PlayerId) {
        info!("Transferring player {player} to the host server");
    }

    async fn return_to_origin(&self, player: PlayerId, origin: &str) {
        info!("Returning player {player} to origin server {origin}");
    }
}
