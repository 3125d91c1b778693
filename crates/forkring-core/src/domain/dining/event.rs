//! Dining domain events
//!
//! Events for tracking what each philosopher did during a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::Reaction;
use super::types::{ForkId, PhilosopherId};
use crate::domain::events::DomainEvent;

/// Type of dining event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiningEventType {
    /// Started a think delay
    Thinking,
    /// Became hungry
    Hungry,
    /// Asked a neighbor for a fork
    ForkRequested,
    /// Handed a fork to a neighbor
    ForkGranted,
    /// Received a fork
    ForkAcquired,
    /// Queued a neighbor's request
    RequestDeferred,
    /// Entered the critical section
    Eating,
    /// Left the critical section
    Released,
    /// Dropped an inbound message
    MessageIgnored,
}

impl DiningEventType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::Hungry => "hungry",
            Self::ForkRequested => "fork_requested",
            Self::ForkGranted => "fork_granted",
            Self::ForkAcquired => "fork_acquired",
            Self::RequestDeferred => "request_deferred",
            Self::Eating => "eating",
            Self::Released => "released",
            Self::MessageIgnored => "message_ignored",
        }
    }
}

impl std::fmt::Display for DiningEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A dining domain event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiningEvent {
    /// Unique event identifier
    pub id: Uuid,
    /// The run this event belongs to
    pub aggregate_id: Uuid,
    /// Philosopher that produced the event
    pub philosopher: PhilosopherId,
    /// Type of event
    pub event_type: DiningEventType,
    /// Event data
    pub data: Option<serde_json::Value>,
    /// When the event occurred
    pub created_at: DateTime<Utc>,
}

impl DiningEvent {
    /// Create a new dining event
    pub fn new(
        run_id: Uuid,
        philosopher: PhilosopherId,
        event_type: DiningEventType,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id: run_id,
            philosopher,
            event_type,
            data,
            created_at: Utc::now(),
        }
    }

    pub fn thinking(run_id: Uuid, philosopher: PhilosopherId, delay_ms: u64) -> Self {
        let data = serde_json::json!({ "delay_ms": delay_ms });
        Self::new(run_id, philosopher, DiningEventType::Thinking, Some(data))
    }

    pub fn hungry(run_id: Uuid, philosopher: PhilosopherId) -> Self {
        Self::new(run_id, philosopher, DiningEventType::Hungry, None)
    }

    pub fn eating(run_id: Uuid, philosopher: PhilosopherId, meal: u64) -> Self {
        let data = serde_json::json!({ "meal": meal });
        Self::new(run_id, philosopher, DiningEventType::Eating, Some(data))
    }

    pub fn released(run_id: Uuid, philosopher: PhilosopherId, grants: usize) -> Self {
        let data = serde_json::json!({ "grants": grants });
        Self::new(run_id, philosopher, DiningEventType::Released, Some(data))
    }

    /// Translate a state machine reaction into an event
    pub fn from_reaction(run_id: Uuid, philosopher: PhilosopherId, reaction: &Reaction) -> Self {
        let (event_type, data) = match reaction {
            Reaction::Requested { fork, to } => (
                DiningEventType::ForkRequested,
                serde_json::json!({ "fork": fork, "to": to }),
            ),
            Reaction::Granted { fork, to } => (
                DiningEventType::ForkGranted,
                serde_json::json!({ "fork": fork, "to": to }),
            ),
            Reaction::Acquired { fork, from } => (
                DiningEventType::ForkAcquired,
                serde_json::json!({ "fork": fork, "from": from }),
            ),
            Reaction::Deferred {
                fork,
                requester,
                reason,
            } => (
                DiningEventType::RequestDeferred,
                serde_json::json!({
                    "fork": fork,
                    "requester": requester,
                    "reason": reason.as_str(),
                }),
            ),
            Reaction::Ignored { message, reason } => (
                DiningEventType::MessageIgnored,
                serde_json::json!({
                    "fork": message.fork,
                    "sender": message.sender,
                    "kind": message.kind,
                    "reason": reason,
                }),
            ),
        };
        Self::new(run_id, philosopher, event_type, Some(data))
    }

    /// Fork named in the event data, if any
    pub fn fork(&self) -> Option<ForkId> {
        self.data
            .as_ref()
            .and_then(|data| data.get("fork"))
            .and_then(|fork| fork.as_u64())
            .map(|fork| ForkId(fork as usize))
    }

    /// Meal number of an `eating` event
    pub fn meal(&self) -> Option<u64> {
        self.data
            .as_ref()
            .and_then(|data| data.get("meal"))
            .and_then(|meal| meal.as_u64())
    }
}

impl DomainEvent for DiningEvent {
    fn event_type(&self) -> &str {
        self.event_type.as_str()
    }

    fn aggregate_id(&self) -> Uuid {
        self.aggregate_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dining::{DeferReason, ForkMessage};

    #[test]
    fn test_eating_event() {
        let run_id = Uuid::new_v4();
        let event = DiningEvent::eating(run_id, PhilosopherId(2), 3);

        assert_eq!(event.aggregate_id, run_id);
        assert_eq!(event.event_type, DiningEventType::Eating);
        assert_eq!(event.meal(), Some(3));
        assert_eq!(event.fork(), None);
    }

    #[test]
    fn test_granted_reaction_event() {
        let reaction = Reaction::Granted {
            fork: ForkId(1),
            to: PhilosopherId(0),
        };
        let event = DiningEvent::from_reaction(Uuid::new_v4(), PhilosopherId(1), &reaction);

        assert_eq!(event.event_type, DiningEventType::ForkGranted);
        assert_eq!(event.fork(), Some(ForkId(1)));
        let data = event.data.unwrap();
        assert_eq!(data["to"], 0);
    }

    #[test]
    fn test_deferred_reaction_event() {
        let reaction = Reaction::Deferred {
            fork: ForkId(2),
            requester: PhilosopherId(1),
            reason: DeferReason::Clean,
        };
        let event = DiningEvent::from_reaction(Uuid::new_v4(), PhilosopherId(2), &reaction);

        let data = event.data.unwrap();
        assert_eq!(data["reason"], "clean");
        assert_eq!(data["requester"], 1);
    }

    #[test]
    fn test_ignored_reaction_event() {
        let reaction = Reaction::Ignored {
            message: ForkMessage::request(ForkId(7), PhilosopherId(3)),
            reason: "request names a fork not seated here".to_string(),
        };
        let event = DiningEvent::from_reaction(Uuid::new_v4(), PhilosopherId(0), &reaction);

        assert_eq!(event.event_type(), "message_ignored");
        let data = event.data.unwrap();
        assert_eq!(data["kind"], "request");
    }
}
