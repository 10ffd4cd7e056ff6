//! The coordinator: one task per process that owns all coordination state.
//!
//! Each process runs exactly one `Coordinator`. Everything that mutates
//! queues, pending joins, or the instance bookkeeping is marshalled onto
//! this single task through its mailbox: decoded bus messages from the
//! subscriber task, presence observations from the surrounding server,
//! provisioning completions from worker tasks, and the periodic scan tick.
//! The subscriber and workers never touch shared state directly.
//!
//! On the host role the coordinator additionally runs the queue scan:
//! every interval it batches waiting players against the arena's capacity
//! constraints, provisions instances for dynamic maps, and announces ready
//! matches on the bus.

use crate::config::ServerConfig;
use crate::connector::MessageSink;
use crate::directory::{ArenaDirectory, MapTemplate, TemplateKey};
use crate::driver::MatchDriver;
use crate::instance::{InstanceCache, InstanceCopy, InstanceManager, Provisioner};
use crate::queue::pending::{PendingBatch, PendingJoinCoordinator};
use crate::queue::{select_map_for_batch, shared_origin, QueueCoordinator, QueuedEntry};
use crucible_protocol::{decode_snapshot, encode_snapshot, BusMessage, PlayerId, QueuedPlayer};
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

const MAILBOX_CAPACITY: usize = 256;

/// A match the host is about to announce: players selected, map chosen.
#[derive(Debug, Clone)]
struct ReadyMatch {
    arena: String,
    map: String,
    players: Vec<QueuedPlayer>,
    origin: Option<String>,
    duel: bool,
}

/// Everything the coordinator task reacts to.
enum Command {
    /// A decoded message from the bus subscriber
    Bus(BusMessage),
    /// A player was observed present on this server
    PlayerJoined(PlayerId),
    /// A player disconnected from this server
    PlayerDisconnected(PlayerId),
    /// A player left a running match (host only)
    PlayerLeftMatch(PlayerId),
    /// A match finished; its instance comes back for recycling
    MatchEnded { instance: Option<InstanceCopy> },
    /// A local player toggles their queue membership
    QueueToggle { arena: String, player: QueuedPlayer },
    /// How long a local player has been queued
    QueueDuration {
        player: PlayerId,
        reply: oneshot::Sender<Option<Duration>>,
    },
    /// A provisioning worker finished successfully
    ProvisionReady {
        announce: ReadyMatch,
        instance: InstanceCopy,
    },
    /// A provisioning worker failed; drained players go back in front
    ProvisionFailed {
        arena: String,
        requeue: Vec<QueuedEntry>,
    },
    Shutdown,
}

/// Cloneable handle for feeding observations into the coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    /// Reports a player as present on this server.
    pub async fn player_joined(&self, player: PlayerId) {
        let _ = self.tx.send(Command::PlayerJoined(player)).await;
    }

    /// Reports a player as disconnected from this server.
    pub async fn player_disconnected(&self, player: PlayerId) {
        let _ = self.tx.send(Command::PlayerDisconnected(player)).await;
    }

    /// Reports a player leaving a running match on the host.
    pub async fn player_left_match(&self, player: PlayerId) {
        let _ = self.tx.send(Command::PlayerLeftMatch(player)).await;
    }

    /// Reports a finished match, handing its instance back for recycling.
    pub async fn match_ended(&self, instance: Option<InstanceCopy>) {
        let _ = self.tx.send(Command::MatchEnded { instance }).await;
    }

    /// Toggles a local player in the fleet-wide queue for an arena.
    pub async fn queue_toggle(&self, arena: impl Into<String>, player: QueuedPlayer) {
        let _ = self
            .tx
            .send(Command::QueueToggle {
                arena: arena.into(),
                player,
            })
            .await;
    }

    /// How long a local player has been waiting in queue, if they are.
    pub async fn queue_duration(&self, player: PlayerId) -> Option<Duration> {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(Command::QueueDuration { player, reply })
            .await;
        rx.await.ok().flatten()
    }

    /// Requests a graceful stop of the coordinator task.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }

    /// Pumps decoded bus messages from the connector's inbound channel
    /// into the coordinator mailbox.
    pub fn attach_bus(&self, mut inbound: mpsc::Receiver<BusMessage>) {
        let mailbox = self.tx.clone();

        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                if mailbox.send(Command::Bus(message)).await.is_err() {
                    break;
                }
            }
        });
    }
}

/// The per-process coordination actor.
pub struct Coordinator {
    config: ServerConfig,
    directory: ArenaDirectory,
    queues: QueueCoordinator,
    pending: PendingJoinCoordinator,
    instances: Arc<InstanceManager>,
    bus: Arc<dyn MessageSink>,
    driver: Arc<dyn MatchDriver>,

    /// Players currently observed on this server
    online: HashSet<PlayerId>,
    /// Provisioned instances waiting for their batch to arrive
    ready: HashMap<TemplateKey, VecDeque<InstanceCopy>>,
    /// Local queue membership, for toggle echo and duration queries
    local_queued: HashSet<PlayerId>,
    queue_started: HashMap<PlayerId, Instant>,

    mailbox: mpsc::Receiver<Command>,
    mailbox_tx: mpsc::Sender<Command>,
    shutting_down: bool,
}

impl Coordinator {
    /// Builds the coordinator and its handle.
    ///
    /// The instance machinery is assembled here from the configuration:
    /// one cache, one slot pool, one allocator per process, all funnelled
    /// through a single [`InstanceManager`].
    pub fn new(
        config: ServerConfig,
        directory: ArenaDirectory,
        bus: Arc<dyn MessageSink>,
        driver: Arc<dyn MatchDriver>,
        provisioner: Arc<dyn Provisioner>,
    ) -> (Self, CoordinatorHandle) {
        let cache = Arc::new(InstanceCache::new(
            config.cache_instances,
            config.use_schematics,
            Arc::clone(&provisioner),
        ));
        let instances = Arc::new(InstanceManager::new(
            cache,
            provisioner,
            config.spacing,
            config.use_schematics,
        ));

        let (mailbox_tx, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        let handle = CoordinatorHandle {
            tx: mailbox_tx.clone(),
        };

        let coordinator = Self {
            config,
            directory,
            queues: QueueCoordinator::new(),
            pending: PendingJoinCoordinator::new(),
            instances,
            bus,
            driver,
            online: HashSet::new(),
            ready: HashMap::new(),
            local_queued: HashSet::new(),
            queue_started: HashMap::new(),
            mailbox,
            mailbox_tx,
            shutting_down: false,
        };

        (coordinator, handle)
    }

    fn is_host(&self) -> bool {
        self.config.role.is_host()
    }

    /// Runs the coordinator until shutdown.
    pub async fn run(mut self) {
        info!(
            "🧭 Coordinator running as {} '{}'",
            self.config.role, self.config.server_name
        );

        if !self.is_host() {
            // ask the host for the current template set
            self.bus.publish(&BusMessage::SyncRequest {
                origin: Some(self.config.server_name.clone()),
            });
        }

        let mut scan = interval(self.config.scan_interval());

        loop {
            tokio::select! {
                _ = scan.tick() => {
                    if self.is_host() && !self.shutting_down {
                        self.process_queues().await;
                    }
                }
                command = self.mailbox.recv() => {
                    match command {
                        None => break,
                        Some(Command::Shutdown) => {
                            self.shutdown();
                            break;
                        }
                        Some(command) => self.handle_command(command).await,
                    }
                }
            }
        }

        info!("Coordinator for '{}' stopped", self.config.server_name);
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Bus(message) => self.handle_bus(message).await,
            Command::PlayerJoined(player) => self.handle_player_joined(player).await,
            Command::PlayerDisconnected(player) => self.handle_player_disconnected(player).await,
            Command::PlayerLeftMatch(player) => {
                if let Some(origin) = self.pending.take_origin(player) {
                    self.driver.return_to_origin(player, &origin).await;
                }
            }
            Command::MatchEnded { instance } => {
                if let Some(copy) = instance {
                    debug!("Match on slot {} ended, retiring instance", copy.slot);
                    self.instances.retire(copy);
                }
            }
            Command::QueueToggle { arena, player } => self.handle_queue_toggle(arena, player),
            Command::QueueDuration { player, reply } => {
                let _ = reply.send(self.queue_started.get(&player).map(Instant::elapsed));
            }
            Command::ProvisionReady { announce, instance } => {
                self.handle_provision_ready(announce, instance).await;
            }
            Command::ProvisionFailed { arena, requeue } => {
                if !requeue.is_empty() {
                    info!(
                        "Requeueing {} players for arena {arena} after provisioning failure",
                        requeue.len()
                    );
                    self.queues.requeue_front(&arena, requeue);
                }
            }
            Command::Shutdown => unreachable!("handled in run loop"),
        }
    }

    // ========================================================================
    // Bus message handling
    // ========================================================================

    async fn handle_bus(&mut self, message: BusMessage) {
        if !message.audience().accepts(self.config.role) {
            // every process receives every message; this one is not ours
            return;
        }

        match message {
            BusMessage::SyncRequest { origin } => self.handle_sync_request(origin),
            BusMessage::SyncConfig { origin, data } => self.handle_sync_config(origin, data),
            BusMessage::QueueJoin {
                arena,
                origin,
                player,
                ..
            } => self.handle_queue_join(arena, origin, player),
            BusMessage::QueueLeave { uuid, .. } => {
                self.queues.remove_everywhere(uuid);
            }
            BusMessage::DuelReq {
                arena,
                map,
                requester,
                target,
                origin,
            } => {
                self.handle_duel_request(arena, map, requester, target, origin)
                    .await;
            }
            BusMessage::QueueMatch {
                arena,
                map,
                duel,
                origin,
                players,
            } => {
                self.handle_queue_match(arena, map, duel, origin, players)
                    .await;
            }
            BusMessage::ArenaJoin {
                arena,
                map,
                duel,
                origin,
                players,
            } => {
                self.handle_arena_join(arena, map, duel, origin, players)
                    .await;
            }
        }
    }

    fn handle_sync_request(&mut self, origin: Option<String>) {
        let snapshot = self.directory.snapshot();
        match encode_snapshot(&snapshot) {
            Ok(data) => {
                info!(
                    "Syncing {} arenas and {} templates to the fleet",
                    snapshot.arenas.len(),
                    snapshot.templates.len()
                );
                self.bus.publish(&BusMessage::SyncConfig { origin, data });
            }
            Err(e) => warn!("Failed to encode sync snapshot: {e}"),
        }
    }

    fn handle_sync_config(&mut self, origin: Option<String>, data: String) {
        if let Some(origin) = &origin {
            if !origin.is_empty() && origin != &self.config.server_name {
                return;
            }
        }

        match decode_snapshot(&data) {
            Ok(snapshot) => {
                self.directory.apply_snapshot(snapshot);
                info!("✅ Applied template sync from the host");
            }
            Err(e) => warn!("Failed to decode sync snapshot: {e}"),
        }
    }

    fn handle_queue_join(&mut self, arena: String, origin: String, mut player: QueuedPlayer) {
        if self.directory.arena(&arena).is_none() {
            warn!("Received queue_join for unknown arena '{arena}'");
            return;
        }

        if player.origin.is_none() && !origin.is_empty() {
            player.origin = Some(origin.clone());
        }

        let added = self.queues.toggle(&arena, &origin, player);
        debug!(
            "Queue toggle for arena {arena} from '{origin}': {}",
            if added { "added" } else { "removed" }
        );
    }

    async fn handle_duel_request(
        &mut self,
        arena: String,
        map: Option<String>,
        requester: QueuedPlayer,
        target: QueuedPlayer,
        origin: Option<String>,
    ) {
        let Some(arena_def) = self.directory.arena(&arena) else {
            warn!("Received duel request for unknown arena '{arena}'");
            return;
        };
        let arena_name = arena_def.name.clone();

        let pair: Vec<QueuedEntry> = [&requester, &target]
            .into_iter()
            .map(|p| QueuedEntry {
                origin: p
                    .origin_or(origin.as_deref())
                    .unwrap_or_default()
                    .to_string(),
                player: p.clone(),
            })
            .collect();

        // prefer the requested map when it is usable for proxied play
        let template = map
            .as_deref()
            .and_then(|m| self.directory.template(&arena, m))
            .filter(|t| t.remote)
            .cloned()
            .or_else(|| {
                let mut candidates: Vec<MapTemplate> = self
                    .directory
                    .remote_templates(&arena)
                    .into_iter()
                    .cloned()
                    .collect();
                candidates.shuffle(&mut rand::thread_rng());
                select_map_for_batch(&candidates, &pair, 1).cloned()
            });

        let Some(template) = template else {
            warn!("No usable map for duel request in arena {arena}");
            return;
        };

        let announce = ReadyMatch {
            arena: arena_name,
            map: template.name.clone(),
            players: stamp_origins(pair),
            origin,
            duel: true,
        };

        if template.is_dynamic() {
            self.spawn_provision(template, announce, Vec::new());
        } else {
            self.announce_match(announce).await;
        }
    }

    async fn handle_queue_match(
        &mut self,
        arena: String,
        map: String,
        duel: bool,
        origin: Option<String>,
        players: Vec<QueuedPlayer>,
    ) {
        if self.is_host() {
            if duel {
                // the duel was registered when it was paired
                return;
            }

            let batch = PendingBatch {
                arena,
                map,
                players,
                origin,
            };
            self.register_pending(batch).await;
            return;
        }

        // backend: transfer any of the matched players currently here
        if self.config.server_name.is_empty() {
            return;
        }

        if let Some(origin) = &origin {
            if !origin.is_empty() && origin != &self.config.server_name {
                return;
            }
        }

        for player in players {
            if let Some(player_origin) = player.origin_or(origin.as_deref()) {
                if player_origin != self.config.server_name {
                    continue;
                }
            }

            if self.online.contains(&player.uuid) {
                self.local_queued.remove(&player.uuid);
                self.queue_started.remove(&player.uuid);
                info!(
                    "Sending player {} to the host for their {} match",
                    player.uuid, map
                );
                self.driver.transfer_to_host(player.uuid).await;
            }
        }
    }

    async fn handle_arena_join(
        &mut self,
        arena: String,
        map: String,
        duel: bool,
        origin: Option<String>,
        players: Vec<QueuedPlayer>,
    ) {
        let Some(template) = self.directory.template(&arena, &map).cloned() else {
            warn!("Received arena_join for arena {arena} but map {map} was not found");
            return;
        };

        let announce = ReadyMatch {
            arena,
            map: template.name.clone(),
            players,
            origin,
            duel,
        };

        if !template.remote {
            // local map on the host: no transfer signalling needed
            let batch = PendingBatch {
                arena: announce.arena,
                map: announce.map,
                players: announce.players,
                origin: announce.origin,
            };
            self.register_pending(batch).await;
            return;
        }

        if template.is_dynamic() {
            // prepare the instance first, then signal players to move
            self.spawn_provision(template, announce, Vec::new());
        } else {
            self.announce_match(announce).await;
        }
    }

    // ========================================================================
    // Queue scanning (host)
    // ========================================================================

    /// One scan pass: batch every arena's queues against its capacity
    /// constraints and kick off instance preparation for each batch.
    async fn process_queues(&mut self) {
        for arena_name in self.queues.active_arenas() {
            let Some(arena) = self.directory.arena(&arena_name) else {
                continue;
            };
            let min_players = arena.min_players();
            let min_per_team = arena.min_players_per_team();
            let max_players = arena.max_players();

            let mut candidates: Vec<MapTemplate> = self
                .directory
                .remote_templates(&arena_name)
                .into_iter()
                .cloned()
                .collect();
            if candidates.is_empty() {
                // nothing to place a match on; entries stay queued
                continue;
            }
            candidates.shuffle(&mut rand::thread_rng());

            loop {
                let queued = self.queues.total_queued(&arena_name);
                if queued < min_players {
                    break;
                }

                let count = max_players.map_or(queued, |max| max.min(queued));
                let mut batch = self.queues.drain_batch(&arena_name, count);
                if batch.len() < min_players {
                    self.queues.requeue_front(&arena_name, batch);
                    break;
                }

                let Some(template) =
                    select_map_for_batch(&candidates, &batch, min_per_team).cloned()
                else {
                    // no map fits this combination; wait for a better one
                    self.queues.requeue_front(&arena_name, batch);
                    break;
                };

                // the selected map may seat fewer players than the arena allows
                let spawn_cap = template.spawn_point_count();
                if spawn_cap > 0 && batch.len() > spawn_cap {
                    let leftovers = batch.split_off(spawn_cap);
                    self.queues.requeue_front(&arena_name, leftovers);
                }
                if batch.len() < min_players {
                    self.queues.requeue_front(&arena_name, batch);
                    break;
                }

                info!(
                    "🎯 Matched {} players for arena {arena_name} on map {}",
                    batch.len(),
                    template.name
                );

                let announce = ReadyMatch {
                    arena: arena_name.clone(),
                    map: template.name.clone(),
                    origin: shared_origin(&batch),
                    players: stamp_origins(batch.clone()),
                    duel: false,
                };

                if template.is_dynamic() {
                    self.spawn_provision(template, announce, batch);
                } else {
                    self.announce_match(announce).await;
                }
            }
        }
    }

    /// Provisions an instance on a worker task; the outcome re-enters the
    /// mailbox as a command so all state changes stay on this task.
    fn spawn_provision(
        &self,
        template: MapTemplate,
        announce: ReadyMatch,
        requeue: Vec<QueuedEntry>,
    ) {
        let instances = Arc::clone(&self.instances);
        let mailbox = self.mailbox_tx.clone();

        tokio::spawn(async move {
            match instances.create_instance(&template).await {
                Ok(instance) => {
                    let _ = mailbox
                        .send(Command::ProvisionReady { announce, instance })
                        .await;
                }
                Err(e) => {
                    warn!(
                        "Failed to prepare dynamic instance of {} for arena {}: {e}",
                        template.key(),
                        announce.arena
                    );
                    let _ = mailbox
                        .send(Command::ProvisionFailed {
                            arena: announce.arena,
                            requeue,
                        })
                        .await;
                }
            }
        });
    }

    async fn handle_provision_ready(&mut self, announce: ReadyMatch, instance: InstanceCopy) {
        if self.shutting_down {
            // the consumer is gone; discard the outcome
            self.instances.retire(instance);
            return;
        }

        self.ready
            .entry(instance.template.clone())
            .or_default()
            .push_back(instance);

        self.announce_match(announce).await;
    }

    // ========================================================================
    // Pending joins and match starts (host)
    // ========================================================================

    /// Registers the batch and announces it on the bus so backends move
    /// their players over. Members already on the host count as arrived
    /// right away.
    async fn announce_match(&mut self, m: ReadyMatch) {
        let batch = PendingBatch {
            arena: m.arena.clone(),
            map: m.map.clone(),
            players: m.players.clone(),
            origin: m.origin.clone(),
        };
        self.register_pending(batch).await;

        self.bus.publish(&BusMessage::QueueMatch {
            arena: m.arena,
            map: m.map,
            duel: m.duel,
            origin: m.origin,
            players: m.players,
        });
    }

    /// Registers a batch and immediately re-checks arrivals, since some
    /// members may already be on the host.
    async fn register_pending(&mut self, batch: PendingBatch) {
        let registered = self.pending.register(batch);

        if let Some(first) = registered.players.first().map(|p| p.uuid) {
            if let Some(claimed) = self.pending.try_claim(first, &self.online) {
                self.start_claimed_batch(claimed).await;
            }
        }
    }

    async fn handle_player_joined(&mut self, player: PlayerId) {
        self.online.insert(player);

        if self.is_host() {
            if let Some(batch) = self.pending.try_claim(player, &self.online) {
                self.start_claimed_batch(batch).await;
            }
        }
    }

    async fn handle_player_disconnected(&mut self, player: PlayerId) {
        self.online.remove(&player);
        self.local_queued.remove(&player);
        self.queue_started.remove(&player);

        if self.is_host() {
            // this is the cleanup that unparks a batch whose member never
            // arrived, and clears them from every queue
            self.pending.remove(player);
            self.queues.remove_everywhere(player);
        } else {
            self.bus.publish(&BusMessage::QueueLeave {
                uuid: player,
                origin: self.config.server_name.clone(),
            });
        }
    }

    /// Starts a fully-arrived batch, or routes everyone back to origin if
    /// the map or instance cannot be obtained.
    async fn start_claimed_batch(&mut self, batch: Arc<PendingBatch>) {
        let Some(template) = self.directory.template(&batch.arena, &batch.map).cloned() else {
            warn!(
                "Pending match for arena {} could not start: map {} not found",
                batch.arena, batch.map
            );
            self.route_batch_to_origin(&batch).await;
            return;
        };

        let instance = if template.is_dynamic() {
            match self
                .ready
                .get_mut(&template.key())
                .and_then(VecDeque::pop_front)
            {
                Some(instance) => Some(instance),
                None => {
                    warn!(
                        "No prepared instance of {} for the arrived batch; returning players",
                        template.key()
                    );
                    self.route_batch_to_origin(&batch).await;
                    return;
                }
            }
        } else {
            None
        };

        match self.driver.start_match(&batch, instance.as_ref()).await {
            Ok(()) => {
                info!(
                    "🎮 Started match in arena {} on map {} with {} players",
                    batch.arena,
                    batch.map,
                    batch.players.len()
                );
            }
            Err(e) => {
                error!(
                    "Failed to start match in arena {} on map {}: {e}",
                    batch.arena, batch.map
                );
                if let Some(copy) = instance {
                    self.instances.retire(copy);
                }
                self.route_batch_to_origin(&batch).await;
            }
        }
    }

    async fn route_batch_to_origin(&mut self, batch: &PendingBatch) {
        for player in &batch.players {
            let origin = self
                .pending
                .take_origin(player.uuid)
                .or_else(|| {
                    player
                        .origin_or(batch.origin.as_deref())
                        .map(str::to_string)
                });
            self.pending.remove(player.uuid);

            if let Some(origin) = origin {
                self.driver.return_to_origin(player.uuid, &origin).await;
            }
        }
    }

    // ========================================================================
    // Local queue operations
    // ========================================================================

    fn handle_queue_toggle(&mut self, arena: String, mut player: QueuedPlayer) {
        if self.local_queued.remove(&player.uuid) {
            self.queue_started.remove(&player.uuid);
        } else {
            self.local_queued.insert(player.uuid);
            self.queue_started.insert(player.uuid, Instant::now());
        }

        if player.origin.is_none() {
            player.origin = Some(self.config.server_name.clone());
        }

        if self.is_host() {
            let origin = self.config.server_name.clone();
            self.handle_queue_join(arena, origin, player);
        } else {
            self.bus.publish(&BusMessage::QueueJoin {
                arena,
                map: None,
                origin: self.config.server_name.clone(),
                player,
            });
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    fn shutdown(&mut self) {
        info!("🛑 Coordinator for '{}' shutting down", self.config.server_name);
        self.shutting_down = true;

        // release instances that never met their batch
        for (_, mut prepared) in self.ready.drain() {
            for instance in prepared.drain(..) {
                self.instances.retire(instance);
            }
        }

        self.instances.shutdown();
    }
}

/// Stamps each drained entry's queue origin onto its player payload so the
/// announcement records where every member should be returned to.
fn stamp_origins(batch: Vec<QueuedEntry>) -> Vec<QueuedPlayer> {
    batch
        .into_iter()
        .map(|entry| {
            let mut player = entry.player;
            if !entry.origin.is_empty() {
                player.origin = Some(entry.origin);
            }
            player
        })
        .collect()
}
