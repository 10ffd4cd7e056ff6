//! Bus connector: one subscription, fire-and-forget publishes.
//!
//! Every process keeps a single long-lived TCP connection to the relay. The
//! first line sent announces the logical channel; after that, every line in
//! either direction is one JSON-encoded [`BusMessage`]. The relay fans each
//! published line out to every other subscriber of the channel — there is no
//! acknowledgement, no request/response correlation, and no ordering
//! guarantee between messages published by different processes.
//!
//! Inbound handling runs on a dedicated subscriber task that only decodes
//! and hands off: decoded messages are forwarded into the coordinator's
//! mailbox and all state mutation happens there. Outbound publishes go
//! through a writer task so the processing path never blocks on the socket.

use crate::error::BusError;
use crucible_protocol::BusMessage;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Something that can publish messages to the fleet.
///
/// The coordinator only depends on this, which keeps it testable without a
/// live relay.
pub trait MessageSink: Send + Sync {
    /// Publishes a message, fire-and-forget. Failures are logged, never
    /// surfaced: the system is driven forward by periodic re-scans, not by
    /// any single message arriving.
    fn publish(&self, message: &BusMessage);
}

/// The live bus connection of one process.
pub struct Connector {
    outbound: mpsc::UnboundedSender<String>,
    subscriber: JoinHandle<()>,
    publisher: JoinHandle<()>,
}

impl Connector {
    /// Connects to the relay, announces the channel, and spawns the
    /// subscriber and publisher tasks.
    ///
    /// Decoded inbound messages are forwarded to `inbound`; malformed lines
    /// are logged and dropped without disturbing the subscriber loop.
    pub async fn connect(
        address: &str,
        channel: &str,
        inbound: mpsc::Sender<BusMessage>,
    ) -> Result<Self, BusError> {
        info!("Connecting bus connector to relay {address} on channel '{channel}'");

        let stream = TcpStream::connect(address)
            .await
            .map_err(|source| BusError::Connect {
                address: address.to_string(),
                source,
            })?;

        let (read_half, mut write_half) = stream.into_split();

        // announce the channel before any traffic
        let hello = format!("{}\n", json!({ "channel": channel }));
        write_half
            .write_all(hello.as_bytes())
            .await
            .map_err(BusError::Handshake)?;

        let (outbound, mut pending_out) = mpsc::unbounded_channel::<String>();

        let publisher = tokio::spawn(async move {
            while let Some(line) = pending_out.recv().await {
                if let Err(e) = write_half.write_all(line.as_bytes()).await {
                    warn!("Failed to publish bus message: {e}");
                    break;
                }
            }
        });

        let channel_name = channel.to_string();
        let subscriber = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }

                        match serde_json::from_str::<BusMessage>(line) {
                            Ok(message) => {
                                debug!("📨 Received {} on '{channel_name}'", message.message_type());
                                if inbound.send(message).await.is_err() {
                                    // coordinator is gone; nothing left to do
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("Dropping malformed bus message: {e}");
                            }
                        }
                    }
                    Ok(None) => {
                        info!("Bus subscriber connection on '{channel_name}' closed");
                        break;
                    }
                    Err(e) => {
                        warn!("Bus subscriber loop on '{channel_name}' stopped: {e}");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            outbound,
            subscriber,
            publisher,
        })
    }

    /// Tears the connection down. Queued outbound messages are dropped.
    pub fn shutdown(&self) {
        self.subscriber.abort();
        self.publisher.abort();
    }
}

impl MessageSink for Connector {
    fn publish(&self, message: &BusMessage) {
        let mut line = match serde_json::to_string(message) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode {} message: {e}", message.message_type());
                return;
            }
        };
        line.push('\n');

        if self.outbound.send(line).is_err() {
            warn!(
                "Attempted to publish {} but the bus connector is not running",
                message.message_type()
            );
        }
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.shutdown();
    }
}
