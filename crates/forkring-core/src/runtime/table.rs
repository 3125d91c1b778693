//! The table: a whole ring of philosophers in one process
//!
//! Spawns one task per philosopher over a [`ChannelNetwork`], records their
//! events, forwards them to an optional observer and stops everyone once
//! every meal quota is met or the shutdown token fires. The event store keeps
//! only the newest events so that unbounded runs stay within memory.

use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use super::philosopher::{Philosopher, PhilosopherSummary};
use super::think::ThinkSchedule;
use crate::config::{Config, TimingConfig};
use crate::domain::dining::{
    DeferralPolicy, DiningEvent, DiningEventType, PhilosopherState, RingLayout,
};
use crate::domain::events::{EventPublisher, InMemoryEventStore};
use crate::error::{Error, Result};
use crate::transport::{ChannelNetwork, Transport};

/// Events a table retains unless told otherwise
pub const DEFAULT_EVENT_LIMIT: usize = 10_000;

/// Outcome of a table run
#[derive(Debug, Serialize)]
pub struct TableReport {
    pub run_id: Uuid,
    /// Per-philosopher summaries in seat order
    pub philosophers: Vec<PhilosopherSummary>,
    /// Every event published during the run, including ones no longer retained
    pub events_recorded: usize,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    /// The newest events of the run
    #[serde(skip)]
    pub events: InMemoryEventStore,
}

impl TableReport {
    pub fn total_meals(&self) -> u64 {
        self.philosophers.iter().map(|p| p.meals).sum()
    }

    /// Fewest meals any philosopher ate
    pub fn min_meals(&self) -> u64 {
        self.philosophers.iter().map(|p| p.meals).min().unwrap_or(0)
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}

/// A ring of philosophers ready to run
pub struct Table {
    layout: RingLayout,
    timing: TimingConfig,
    policy: DeferralPolicy,
    meals: Option<u64>,
    run_id: Uuid,
    shutdown: CancellationToken,
    observer: Option<mpsc::UnboundedSender<DiningEvent>>,
    event_limit: usize,
}

impl Table {
    pub fn new(layout: RingLayout, timing: TimingConfig, policy: DeferralPolicy) -> Self {
        Self {
            layout,
            timing,
            policy,
            meals: None,
            run_id: Uuid::new_v4(),
            shutdown: CancellationToken::new(),
            observer: None,
            event_limit: DEFAULT_EVENT_LIMIT,
        }
    }

    /// Build a table from the `ring`, `timing` and `protocol` sections
    pub fn from_config(config: &Config) -> Result<Self> {
        let timing = &config.timing;
        if timing.think_min_ms > timing.think_max_ms {
            return Err(Error::ConfigError(format!(
                "timing.think_min_ms ({}) exceeds timing.think_max_ms ({})",
                timing.think_min_ms, timing.think_max_ms
            )));
        }
        let layout = config.ring.layout()?;
        Ok(Self::new(
            layout,
            config.timing.clone(),
            config.protocol.deferral,
        ))
    }

    /// Stop once every philosopher has eaten `meals` times
    pub fn with_meals(mut self, meals: u64) -> Self {
        self.meals = Some(meals);
        self
    }

    /// Forward every event to `observer` as it happens
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<DiningEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Keep at most `limit` events in the report, dropping the oldest
    pub fn with_event_limit(mut self, limit: usize) -> Self {
        self.event_limit = limit;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn layout(&self) -> &RingLayout {
        &self.layout
    }

    /// Token that stops the whole table when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run every philosopher over in-process channels until the quotas are
    /// met or shutdown fires
    pub async fn run(self) -> Result<TableReport> {
        let endpoints = ChannelNetwork::build(self.layout.size());
        self.run_with(endpoints).await
    }

    /// Run every philosopher over `endpoints`, one per seat in id order
    pub async fn run_with<T>(self, endpoints: Vec<T>) -> Result<TableReport>
    where
        T: Transport + 'static,
    {
        let started = Instant::now();
        let size = self.layout.size();
        if endpoints.len() != size {
            return Err(Error::InvalidInput(format!(
                "{} endpoints for {} philosophers",
                endpoints.len(),
                size
            )));
        }
        if let Some(stray) = endpoints
            .iter()
            .zip(self.layout.philosophers())
            .find(|(transport, id)| transport.local_id() != *id)
        {
            return Err(Error::InvalidInput(format!(
                "endpoint of {} sits in seat {}",
                stray.0.local_id(),
                stray.1
            )));
        }
        info!(
            run_id = %self.run_id,
            philosophers = size,
            meals = ?self.meals,
            deferral = %self.policy,
            "Table opened"
        );

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();

        for (transport, id) in endpoints.into_iter().zip(self.layout.philosophers()) {
            let state = PhilosopherState::seated(&self.layout, id, self.policy)?;
            let schedule = ThinkSchedule::for_philosopher(&self.timing, id);
            let philosopher = Philosopher::new(state, transport, schedule)
                .with_events(self.run_id, event_tx.clone());
            tasks.spawn(philosopher.run(self.meals, self.shutdown.clone()));
        }
        drop(event_tx);

        let store = InMemoryEventStore::with_capacity(self.event_limit);
        let mut meals = vec![0u64; size];
        let mut summaries = Vec::with_capacity(size);
        let mut failure: Option<Error> = None;
        let mut events_open = true;

        while events_open || !tasks.is_empty() {
            tokio::select! {
                event = event_rx.recv(), if events_open => match event {
                    Some(event) => {
                        if event.event_type == DiningEventType::Eating {
                            if let Some(count) = meals.get_mut(event.philosopher.0) {
                                *count += 1;
                            }
                            self.check_quotas(&meals);
                        }
                        store.publish(&event).await?;
                        if let Some(observer) = &self.observer {
                            // a detached observer does not stop the table
                            let _ = observer.send(event);
                        }
                    }
                    None => events_open = false,
                },
                joined = tasks.join_next(), if !tasks.is_empty() => match joined {
                    Some(Ok(Ok(summary))) => summaries.push(summary),
                    Some(Ok(Err(e))) => {
                        error!(run_id = %self.run_id, error = %e, "Philosopher failed, stopping table");
                        self.shutdown.cancel();
                        failure.get_or_insert(e);
                    }
                    Some(Err(join_error)) => {
                        error!(run_id = %self.run_id, error = %join_error, "Philosopher task aborted");
                        self.shutdown.cancel();
                        failure.get_or_insert(Error::TaskFailed(join_error.to_string()));
                    }
                    None => {}
                },
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        summaries.sort_by_key(|summary| summary.philosopher);
        let report = TableReport {
            run_id: self.run_id,
            philosophers: summaries,
            events_recorded: store.recorded(),
            elapsed: started.elapsed(),
            events: store,
        };

        info!(
            run_id = %report.run_id,
            total_meals = report.total_meals(),
            min_meals = report.min_meals(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Table closed"
        );
        Ok(report)
    }

    fn check_quotas(&self, meals: &[u64]) {
        let Some(quota) = self.meals else {
            return;
        };
        if !self.shutdown.is_cancelled() && meals.iter().all(|count| *count >= quota) {
            info!(run_id = %self.run_id, quota, "Every philosopher reached its quota");
            self.shutdown.cancel();
        }
    }
}
