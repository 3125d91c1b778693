//! In-process transport over tokio channels
//!
//! Each philosopher owns one unbounded inbox; every endpoint holds a sender
//! to every inbox. Messages travel as JSON frames so that malformed input is
//! handled the same way a network transport would see it: the frame is
//! logged and dropped, and the receive loop carries on.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use super::{Transport, TransportError, TransportResult};
use crate::domain::dining::{ForkMessage, PhilosopherId};

/// A frame on the wire, tagged with the sending endpoint
#[derive(Debug, Clone)]
struct Envelope {
    from: PhilosopherId,
    payload: String,
}

/// Builder for a fully connected set of channel endpoints
pub struct ChannelNetwork;

impl ChannelNetwork {
    /// Create one connected endpoint per philosopher, indexed by id
    pub fn build(size: usize) -> Vec<ChannelTransport> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| mpsc::unbounded_channel::<Envelope>()).unzip();
        let senders = Arc::new(senders);

        receivers
            .into_iter()
            .enumerate()
            .map(|(id, inbox)| ChannelTransport {
                id: PhilosopherId(id),
                peers: Arc::clone(&senders),
                inbox,
            })
            .collect()
    }
}

/// One philosopher's endpoint of a [`ChannelNetwork`]
#[derive(Debug)]
pub struct ChannelTransport {
    id: PhilosopherId,
    peers: Arc<Vec<mpsc::UnboundedSender<Envelope>>>,
    inbox: mpsc::UnboundedReceiver<Envelope>,
}

impl ChannelTransport {
    /// Put a raw frame on the wire to `to`, bypassing encoding
    pub fn send_raw(&self, to: PhilosopherId, payload: impl Into<String>) -> TransportResult<()> {
        let peer = self
            .peers
            .get(to.0)
            .ok_or(TransportError::UnknownPeer(to))?;

        peer.send(Envelope {
            from: self.id,
            payload: payload.into(),
        })
        .map_err(|_| TransportError::Closed { peer: to })
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn local_id(&self) -> PhilosopherId {
        self.id
    }

    async fn send(&self, to: PhilosopherId, message: ForkMessage) -> TransportResult<()> {
        let payload = message
            .to_json_string()
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        self.send_raw(to, payload)
    }

    async fn recv(&mut self) -> TransportResult<ForkMessage> {
        loop {
            let envelope = self
                .inbox
                .recv()
                .await
                .ok_or(TransportError::InboxClosed(self.id))?;

            match ForkMessage::from_json_string(&envelope.payload) {
                Ok(message) if message.sender == envelope.from => return Ok(message),
                Ok(message) => {
                    warn!(
                        philosopher = %self.id,
                        from = %envelope.from,
                        claimed = %message.sender,
                        "Dropping frame with a forged sender"
                    );
                }
                Err(e) => {
                    warn!(
                        philosopher = %self.id,
                        from = %envelope.from,
                        error = %e,
                        "Dropping malformed frame"
                    );
                }
            }
        }
    }
}
