//! Error types for the coordination core.
//!
//! Nothing in this crate treats an error as fatal to the process: the worst
//! outcome of any failure is a match not starting, recovered by requeueing
//! the drained players or routing them back to their origin server.

use thiserror::Error;

/// Errors from the bus connector.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to connect to bus relay at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bus handshake failed: {0}")]
    Handshake(std::io::Error),

    #[error("bus connection closed")]
    Closed,
}

/// Errors from the instance provisioning engine.
///
/// Provisioning failures are always transient from the coordinator's point
/// of view: the drained batch is requeued and the scan retries later.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("template {0} has no bounds to provision from")]
    MissingBounds(String),

    #[error("no schematic available for template {0}")]
    SchematicUnavailable(String),

    #[error("region copy for template {template} failed: {reason}")]
    CopyFailed { template: String, reason: String },
}

/// Errors from the match driver seam.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("match could not be started: {0}")]
    StartRejected(String),
}

/// Top-level server errors surfaced to the binary.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("invalid configuration: {0}")]
    Config(String),
}
