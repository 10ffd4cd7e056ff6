//! Serialized player payloads attached to queue traffic.
//!
//! When a backend enqueues a player it ships a minimal snapshot of the
//! player's identity and loadout so the host can match and place them
//! without a round trip back to the origin server.

use crate::types::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An element a player has bound.
///
/// Templates may restrict which element combinations can face each other;
/// the queue scan uses these declarations when fitting a batch to a map.
/// Values not recognized by this build decode as [`Element::Unknown`] and
/// are ignored rather than failing the whole message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Element {
    Air,
    Water,
    Earth,
    Fire,
    /// Forwards-compatibility catch-all for element names this build does
    /// not know.
    #[serde(other)]
    Unknown,
}

/// A player waiting in (or selected from) a fleet-wide queue.
///
/// This is the `player` / `players` payload of queue traffic: opaque
/// identity plus the minimal attached state needed to start them in a
/// match. The `origin` names the backend server the player should be
/// returned to if a host-side flow fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedPlayer {
    /// The player's fleet-wide identity
    pub uuid: PlayerId,

    /// Elements the player has bound, if any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<Element>,

    /// Hotbar slot to bound-ability name
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub abilities: HashMap<u8, String>,

    /// The backend server this player came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl QueuedPlayer {
    /// Creates a bare payload carrying only the player's identity.
    pub fn new(uuid: PlayerId) -> Self {
        Self {
            uuid,
            elements: Vec::new(),
            abilities: HashMap::new(),
            origin: None,
        }
    }

    /// Creates a payload with an origin server recorded.
    pub fn with_origin(uuid: PlayerId, origin: impl Into<String>) -> Self {
        Self {
            uuid,
            elements: Vec::new(),
            abilities: HashMap::new(),
            origin: Some(origin.into()),
        }
    }

    /// The known elements this player has bound, skipping any the build
    /// does not recognize.
    pub fn known_elements(&self) -> impl Iterator<Item = Element> + '_ {
        self.elements
            .iter()
            .copied()
            .filter(|e| !matches!(e, Element::Unknown))
    }

    /// Whether the player has declared the given element.
    pub fn has_element(&self, element: Element) -> bool {
        self.elements.contains(&element)
    }

    /// The origin to route this player back to, preferring the per-player
    /// record over the supplied batch-wide fallback.
    pub fn origin_or<'a>(&'a self, fallback: Option<&'a str>) -> Option<&'a str> {
        match self.origin.as_deref() {
            Some(origin) if !origin.is_empty() => Some(origin),
            _ => fallback.filter(|o| !o.is_empty()),
        }
    }
}
