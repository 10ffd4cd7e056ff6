//! # Crucible Protocol
//!
//! Shared wire types for the Crucible match coordination fleet. Every process
//! on the fleet — the designated host and any number of backends — exchanges
//! newline-delimited JSON objects over one logical bus channel, and this crate
//! defines the complete catalogue of those objects plus the identifier and
//! geometry types they carry.
//!
//! ## Key Types
//!
//! - [`BusMessage`] - The closed set of messages understood on the bus
//! - [`PlayerId`] - Unique identifier for a player anywhere on the fleet
//! - [`QueuedPlayer`] - Serialized player payload attached to queue traffic
//! - [`Bounds`] - Integer axis-aligned box used for map regions
//!
//! ## Design Principles
//!
//! - **Closed catalogue**: messages decode into a tagged enum, so a handler
//!   match is checked for exhaustiveness at compile time
//! - **Lenient payloads**: unknown elements and malformed ability slots are
//!   tolerated for forwards compatibility, the surrounding message survives
//! - **Role gating**: every message knows which process role may handle it

pub mod messages;
pub mod player;
pub mod sync;
pub mod types;

pub use messages::{Audience, BusMessage};
pub use player::{Element, QueuedPlayer};
pub use sync::{decode_snapshot, encode_snapshot, SyncError};
pub use types::{Bounds, PlayerId, Position, Role};
