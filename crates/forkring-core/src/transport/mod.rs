//! Messaging substrate between philosophers
//!
//! The protocol needs point-to-point sends, a receive from any neighbor,
//! FIFO delivery per sender/receiver pair, and a receive that can be raced
//! against a timer. [`Transport`] captures exactly that; [`ChannelNetwork`]
//! provides it in-process on top of tokio channels.

pub mod channel;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::dining::{ForkMessage, PhilosopherId};

pub use channel::{ChannelNetwork, ChannelTransport};

/// Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Transport errors; every one of them is fatal for the philosopher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No route to the addressed philosopher
    #[error("no channel to {0}")]
    UnknownPeer(PhilosopherId),

    /// The peer's inbound channel is gone
    #[error("channel to {peer} is closed")]
    Closed { peer: PhilosopherId },

    /// Every sender to the local inbox is gone
    #[error("inbox of {0} is closed")]
    InboxClosed(PhilosopherId),

    /// A message could not be encoded
    #[error("failed to encode message: {0}")]
    Encode(String),
}

impl TransportError {
    /// Get error code for this transport error
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownPeer(_) => "E100",
            Self::Closed { .. } => "E101",
            Self::InboxClosed(_) => "E102",
            Self::Encode(_) => "E103",
        }
    }
}

/// Point-to-point messaging for one philosopher
///
/// `recv` must be cancel safe: the runtime races it against the think timer
/// and drops the losing future.
#[async_trait]
pub trait Transport: Send {
    /// The philosopher this endpoint belongs to
    fn local_id(&self) -> PhilosopherId;

    /// Send `message` to `to`
    async fn send(&self, to: PhilosopherId, message: ForkMessage) -> TransportResult<()>;

    /// Wait for the next well-formed message from any neighbor
    async fn recv(&mut self) -> TransportResult<ForkMessage>;
}
