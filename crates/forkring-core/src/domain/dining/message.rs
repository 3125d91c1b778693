//! Protocol messages exchanged between neighbors
//!
//! Every message names a fork, its sender and one of two kinds. On the wire a
//! message is a single JSON object:
//!
//! ```text
//! {"fork":1,"sender":0,"kind":"grant"}
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::types::{ForkId, PhilosopherId};

/// Tag of a protocol message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Ask the receiver for a fork
    Request,
    /// Hand a fork to the receiver
    Grant,
    /// Any tag this build does not understand
    Unknown,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Grant => "grant",
            Self::Unknown => "unknown",
        }
    }

    fn from_tag(tag: &str) -> Self {
        match tag {
            "request" => Self::Request,
            "grant" => Self::Grant,
            _ => Self::Unknown,
        }
    }
}

// Unknown tags must not fail decoding: the receiver logs and drops them.
impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fork request or grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkMessage {
    pub fork: ForkId,
    pub sender: PhilosopherId,
    pub kind: MessageKind,
}

impl ForkMessage {
    pub fn request(fork: ForkId, sender: PhilosopherId) -> Self {
        Self {
            fork,
            sender,
            kind: MessageKind::Request,
        }
    }

    pub fn grant(fork: ForkId, sender: PhilosopherId) -> Self {
        Self {
            fork,
            sender,
            kind: MessageKind::Grant,
        }
    }

    /// Encode the message as a JSON frame
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a message from a JSON frame
    pub fn from_json_string(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(frame)
    }
}

impl fmt::Display for ForkMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} from {}", self.kind, self.fork, self.sender)
    }
}

/// A message addressed to a neighbor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outbound {
    pub to: PhilosopherId,
    pub message: ForkMessage,
}
