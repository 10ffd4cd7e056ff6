//! # Crucible Server - Match Coordination Core
//!
//! The coordination core for a fleet of game server processes that share no
//! memory and talk only over a message bus. One designated process (the
//! host) owns match assignment and a pool of spatially-isolated map
//! instances; every other process (a backend) originates queue and join
//! requests and moves players where the host tells it to.
//!
//! ## Architecture Overview
//!
//! * **Connector** - one subscription per process, fire-and-forget publishes
//! * **Coordinator** - the single actor task owning all coordination state
//! * **QueueCoordinator** - per-(arena, origin) FIFO queues and batch drains
//! * **PendingJoinCoordinator** - all-or-nothing arrival tracking per batch
//! * **Instance stack** - slot pool, first-fit region allocator, recycling
//!   cache, and the provisioning seam to the world engine
//!
//! ## Data Flow
//!
//! 1. A backend publishes `queue_join`; the host queues the player
//! 2. The host's periodic scan drains a batch once an arena's minimum is met
//! 3. For dynamic maps an instance is provisioned (or borrowed back from
//!    the cache) on a worker task
//! 4. The host announces `queue_match`; backends transfer the named players
//! 5. When every batch member has arrived, the match starts
//! 6. When the match ends its instance is recycled or released
//!
//! ## Threading Model
//!
//! All coordination state lives on one task per process and is mutated only
//! there; the bus subscriber decodes and hands off, and provisioning workers
//! report completions back through the same mailbox. The slot pool and
//! allocator carry internal mutexes because worker tasks touch them while
//! releasing failed provisions.
//!
//! ## Failure Policy
//!
//! Provisioning failures requeue the drained batch at the front and retry on
//! a later scan. Missing maps or instances route the affected players back
//! to their origin server. Malformed bus messages are logged and dropped.
//! None of these are fatal to the process.

pub use config::ServerConfig;
pub use connector::{Connector, MessageSink};
pub use coordinator::{Coordinator, CoordinatorHandle};
pub use directory::{
    Arena, ArenaDirectory, DirectorySnapshot, ElementMatchup, IntRange, MapKind, MapTemplate,
    TemplateKey,
};
pub use driver::{LoggingDriver, MatchDriver};
pub use error::{BusError, DriverError, ProvisionError, ServerError};
pub use instance::{
    Allocation, InstanceAllocator, InstanceCache, InstanceCopy, InstanceManager, NullProvisioner,
    Provisioner, SlotPool,
};
pub use queue::pending::{PendingBatch, PendingJoinCoordinator};
pub use queue::{QueueCoordinator, QueuedEntry};

pub mod config;
pub mod connector;
pub mod coordinator;
pub mod directory;
pub mod driver;
pub mod error;
pub mod instance;
pub mod queue;
