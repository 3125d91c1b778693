//! Domain event infrastructure
//!
//! Base trait and an in-memory store for the events produced during a run.
//! The table records every philosopher's events here so a run can be
//! inspected after it stops.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// Base trait for all domain events
pub trait DomainEvent: Send + Sync {
    /// Get the event type as a string
    fn event_type(&self) -> &str;

    /// Get the aggregate (run) ID this event belongs to
    fn aggregate_id(&self) -> Uuid;

    /// Get the timestamp when this event occurred
    fn timestamp(&self) -> DateTime<Utc>;

    /// Get optional event data as JSON
    fn data(&self) -> Option<&serde_json::Value>;
}

/// Publisher trait for emitting domain events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event
    async fn publish(&self, event: &dyn DomainEvent) -> Result<()>;
}

/// A stored event record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Unique event ID
    pub id: Uuid,
    /// Aggregate ID this event belongs to
    pub aggregate_id: Uuid,
    /// Event type string
    pub event_type: String,
    /// Event data as JSON
    pub data: Option<serde_json::Value>,
    /// When the event was created
    pub created_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Create from a domain event
    pub fn from_event(event: &dyn DomainEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id: event.aggregate_id(),
            event_type: event.event_type().to_string(),
            data: event.data().cloned(),
            created_at: event.timestamp(),
        }
    }
}

/// An in-memory event store, optionally keeping only the newest events
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: RwLock<EventLog>,
    capacity: Option<usize>,
}

#[derive(Debug, Default)]
struct EventLog {
    events: VecDeque<StoredEvent>,
    recorded: usize,
}

impl InMemoryEventStore {
    /// Create a new in-memory event store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that retains at most `capacity` events, dropping the oldest
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            log: RwLock::new(EventLog::default()),
            capacity: Some(capacity),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Store an event
    pub fn store(&self, event: StoredEvent) {
        let mut log = self
            .log
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        log.recorded += 1;
        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                return;
            }
            while log.events.len() >= capacity {
                log.events.pop_front();
            }
        }
        log.events.push_back(event);
    }

    /// Get all retained events, oldest first
    pub fn all_events(&self) -> Vec<StoredEvent> {
        self.read().events.iter().cloned().collect()
    }

    /// Get retained events by type
    pub fn events_by_type(&self, event_type: &str) -> Vec<StoredEvent> {
        self.read()
            .events
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events stored over the store's lifetime, including dropped ones
    pub fn recorded(&self) -> usize {
        self.read().recorded
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, EventLog> {
        self.log
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventStore {
    async fn publish(&self, event: &dyn DomainEvent) -> Result<()> {
        self.store(StoredEvent::from_event(event));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dining::{DiningEvent, PhilosopherId};

    #[test]
    fn test_stored_event_from_dining_event() {
        let run_id = Uuid::new_v4();
        let event = DiningEvent::eating(run_id, PhilosopherId(1), 2);
        let stored = StoredEvent::from_event(&event);

        assert_eq!(stored.aggregate_id, run_id);
        assert_eq!(stored.event_type, "eating");
        assert_eq!(stored.data.unwrap()["meal"], 2);
        assert_eq!(stored.created_at, event.created_at);
    }

    #[test]
    fn test_events_by_type() {
        let store = InMemoryEventStore::new();
        let run_id = Uuid::new_v4();

        store.store(StoredEvent::from_event(&DiningEvent::hungry(run_id, PhilosopherId(0))));
        store.store(StoredEvent::from_event(&DiningEvent::eating(run_id, PhilosopherId(0), 1)));
        store.store(StoredEvent::from_event(&DiningEvent::hungry(run_id, PhilosopherId(1))));

        assert_eq!(store.events_by_type("hungry").len(), 2);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_capacity_keeps_newest_events() {
        let store = InMemoryEventStore::with_capacity(3);
        let run_id = Uuid::new_v4();

        for meal in 1..=10 {
            store.store(StoredEvent::from_event(&DiningEvent::eating(
                run_id,
                PhilosopherId(0),
                meal,
            )));
        }

        assert_eq!(store.len(), 3);
        assert_eq!(store.recorded(), 10);
        let meals: Vec<_> = store
            .all_events()
            .iter()
            .map(|e| e.data.as_ref().unwrap()["meal"].as_u64().unwrap())
            .collect();
        assert_eq!(meals, vec![8, 9, 10]);
    }

    #[test]
    fn test_zero_capacity_only_counts() {
        let store = InMemoryEventStore::with_capacity(0);
        store.store(StoredEvent::from_event(&DiningEvent::hungry(
            Uuid::new_v4(),
            PhilosopherId(1),
        )));
        assert!(store.is_empty());
        assert_eq!(store.recorded(), 1);
    }

    #[tokio::test]
    async fn test_event_publisher() {
        let store = InMemoryEventStore::new();
        assert!(store.is_empty());

        let event = DiningEvent::thinking(Uuid::new_v4(), PhilosopherId(3), 40);
        store.publish(&event).await.unwrap();

        let stored = store.all_events();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_type, "thinking");
    }
}
