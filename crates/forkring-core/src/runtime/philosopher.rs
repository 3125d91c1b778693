//! One philosopher running the think, acquire, eat, release cycle
//!
//! The philosopher task owns its protocol state exclusively. It waits on its
//! transport in every phase, so a neighbor's request is answered while this
//! philosopher is thinking, hungry, or serving after its quota.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::think::ThinkSchedule;
use crate::domain::dining::{
    DiningEvent, ForkMessage, PhilosopherId, PhilosopherState, Reaction,
};
use crate::error::{Error, Result};
use crate::transport::Transport;

/// What a philosopher did before it stopped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhilosopherSummary {
    pub philosopher: PhilosopherId,
    pub meals: u64,
    pub requests_sent: u64,
    pub grants_sent: u64,
    pub deferred: u64,
    pub ignored: u64,
}

/// A philosopher bound to a transport
pub struct Philosopher<T: Transport> {
    state: PhilosopherState,
    transport: T,
    schedule: ThinkSchedule,
    run_id: Uuid,
    events: Option<mpsc::UnboundedSender<DiningEvent>>,
    summary: PhilosopherSummary,
}

impl<T: Transport> Philosopher<T> {
    pub fn new(state: PhilosopherState, transport: T, schedule: ThinkSchedule) -> Self {
        let summary = PhilosopherSummary {
            philosopher: state.id(),
            ..Default::default()
        };
        Self {
            state,
            transport,
            schedule,
            run_id: Uuid::new_v4(),
            events: None,
            summary,
        }
    }

    /// Report every event of this philosopher to `events`, tagged with `run_id`
    pub fn with_events(mut self, run_id: Uuid, events: mpsc::UnboundedSender<DiningEvent>) -> Self {
        self.run_id = run_id;
        self.events = Some(events);
        self
    }

    pub fn id(&self) -> PhilosopherId {
        self.state.id()
    }

    pub fn state(&self) -> &PhilosopherState {
        &self.state
    }

    /// Run until `shutdown` fires, or until `meals` meals are eaten and then
    /// `shutdown` fires
    ///
    /// After its quota a philosopher stops eating but keeps answering its
    /// neighbors; leaving early would strand the forks it holds.
    pub async fn run(
        mut self,
        meals: Option<u64>,
        shutdown: CancellationToken,
    ) -> Result<PhilosopherSummary> {
        info!(philosopher = %self.id(), forks = %self.state.forks(), "Philosopher seated");

        match self.cycle(meals, &shutdown).await {
            Ok(()) => {}
            // peers drop their channels as the table shuts down
            Err(Error::Transport(e)) if shutdown.is_cancelled() => {
                debug!(philosopher = %self.id(), error = %e, "Transport closed during shutdown");
            }
            Err(e) => {
                warn!(philosopher = %self.id(), error = %e, "Philosopher stopped on error");
                return Err(e);
            }
        }

        self.summary.meals = self.state.meals();
        info!(
            philosopher = %self.id(),
            meals = self.summary.meals,
            "Philosopher left the table"
        );
        Ok(self.summary)
    }

    async fn cycle(&mut self, meals: Option<u64>, shutdown: &CancellationToken) -> Result<()> {
        loop {
            if meals.is_some_and(|quota| self.state.meals() >= quota) {
                debug!(philosopher = %self.id(), meals = self.state.meals(), "Quota reached, serving only");
                return self.serve(shutdown).await;
            }
            if !self.think(shutdown).await? {
                return Ok(());
            }
            if !self.acquire(shutdown).await? {
                return Ok(());
            }
            self.eat().await?;
        }
    }

    /// Wait out a think delay while answering neighbors
    ///
    /// Returns `false` when shutdown interrupted the wait.
    pub async fn think(&mut self, shutdown: &CancellationToken) -> Result<bool> {
        let delay = self.schedule.next_delay();
        self.emit(DiningEvent::thinking(
            self.run_id,
            self.id(),
            delay.as_millis() as u64,
        ));
        debug!(philosopher = %self.id(), delay_ms = delay.as_millis() as u64, "Thinking");

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(false),
                _ = &mut sleep => return Ok(true),
                message = self.transport.recv() => {
                    self.deliver(message?).await?;
                }
            }
        }
    }

    /// Become hungry and wait until both forks are held
    ///
    /// Returns `false` when shutdown interrupted the wait.
    pub async fn acquire(&mut self, shutdown: &CancellationToken) -> Result<bool> {
        let reactions = self.state.become_hungry()?;
        self.emit(DiningEvent::hungry(self.run_id, self.id()));
        self.dispatch(reactions).await?;

        while !self.state.holds_both() {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(false),
                message = self.transport.recv() => {
                    self.deliver(message?).await?;
                }
            }
        }
        Ok(true)
    }

    /// Eat, then grant every request deferred in the meantime
    pub async fn eat(&mut self) -> Result<()> {
        self.state.start_eating()?;
        let meal = self.state.meals();
        self.emit(DiningEvent::eating(self.run_id, self.id(), meal));
        info!(philosopher = %self.id(), meal, "Eating");

        let reactions = self.state.finish_eating()?;
        self.emit(DiningEvent::released(self.run_id, self.id(), reactions.len()));
        self.dispatch(reactions).await
    }

    async fn serve(&mut self, shutdown: &CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                message = self.transport.recv() => {
                    self.deliver(message?).await?;
                }
            }
        }
    }

    async fn deliver(&mut self, message: ForkMessage) -> Result<()> {
        let reactions = self.state.handle(message);
        self.dispatch(reactions).await
    }

    async fn dispatch(&mut self, reactions: Vec<Reaction>) -> Result<()> {
        let me = self.id();
        for reaction in reactions {
            match &reaction {
                Reaction::Requested { .. } => self.summary.requests_sent += 1,
                Reaction::Granted { .. } => self.summary.grants_sent += 1,
                Reaction::Deferred { .. } => self.summary.deferred += 1,
                Reaction::Ignored { .. } => self.summary.ignored += 1,
                Reaction::Acquired { .. } => {}
            }
            self.emit(DiningEvent::from_reaction(self.run_id, me, &reaction));

            if let Some(out) = reaction.outbound(me) {
                self.transport.send(out.to, out.message).await?;
            }
        }
        Ok(())
    }

    fn emit(&self, event: DiningEvent) {
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                debug!(philosopher = %self.id(), "Event receiver dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dining::{
        DeferralPolicy, DiningEventType, ForkId, Orientation, Phase, RingLayout,
    };
    use crate::runtime::ThinkDistribution;
    use crate::transport::{ChannelNetwork, ChannelTransport, TransportError};
    use std::time::Duration;

    fn seat(
        layout: &RingLayout,
        transport: ChannelTransport,
        think_ms: u64,
    ) -> Philosopher<ChannelTransport> {
        let id = transport.local_id();
        let state = PhilosopherState::seated(layout, id, DeferralPolicy::Fifo).unwrap();
        let schedule = ThinkSchedule::new(think_ms, think_ms, ThinkDistribution::Uniform, Some(0));
        Philosopher::new(state, transport, schedule)
    }

    #[tokio::test(start_paused = true)]
    async fn test_thinking_philosopher_answers_requests() {
        let layout = RingLayout::new(2, Orientation::LowestId).unwrap();
        let mut endpoints = ChannelNetwork::build(2);
        let mut p1_transport = endpoints.pop().unwrap();
        let p0_transport = endpoints.pop().unwrap();

        // P0 holds both forks and thinks for a long time
        let mut p0 = seat(&layout, p0_transport, 60_000);
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let thinker = tokio::spawn(async move {
            let finished = p0.think(&token).await.unwrap();
            (finished, p0)
        });

        p1_transport
            .send(PhilosopherId(0), ForkMessage::request(ForkId(1), PhilosopherId(1)))
            .await
            .unwrap();
        let reply = p1_transport.recv().await.unwrap();
        assert_eq!(reply, ForkMessage::grant(ForkId(1), PhilosopherId(0)));

        let (finished, p0) = thinker.await.unwrap();
        assert!(finished);
        assert!(!p0.state().holds(ForkId(1)));
        assert_eq!(p0.state().phase(), Phase::Thinking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_think() {
        let layout = RingLayout::new(2, Orientation::LowestId).unwrap();
        let mut endpoints = ChannelNetwork::build(2);
        let _p1 = endpoints.pop().unwrap();
        let mut p0 = seat(&layout, endpoints.pop().unwrap(), 60_000);

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert!(!p0.think(&shutdown).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_philosophers_reach_quota() {
        let layout = RingLayout::new(2, Orientation::LowestId).unwrap();
        let endpoints = ChannelNetwork::build(2);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let run_id = Uuid::new_v4();
        let shutdown = CancellationToken::new();

        let mut handles = Vec::new();
        for transport in endpoints {
            let philosopher = seat(&layout, transport, 5).with_events(run_id, tx.clone());
            handles.push(tokio::spawn(philosopher.run(Some(3), shutdown.clone())));
        }
        drop(tx);

        let mut meals = [0u64; 2];
        while meals.iter().any(|m| *m < 3) {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.aggregate_id, run_id);
            if event.event_type == DiningEventType::Eating {
                meals[event.philosopher.0] += 1;
            }
        }
        shutdown.cancel();

        for handle in handles {
            let summary = tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert_eq!(summary.meals, 3);
            assert!(summary.grants_sent > 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_grant_to_departed_neighbor_stops_philosopher() {
        let layout = RingLayout::new(2, Orientation::LowestId).unwrap();
        let mut endpoints = ChannelNetwork::build(2);
        let p1_transport = endpoints.pop().unwrap();
        let p0 = seat(&layout, endpoints.pop().unwrap(), 60_000);

        // P1 asks for F1 and leaves before the grant can reach it
        p1_transport
            .send(PhilosopherId(0), ForkMessage::request(ForkId(1), PhilosopherId(1)))
            .await
            .unwrap();
        drop(p1_transport);

        let shutdown = CancellationToken::new();
        let result = tokio::time::timeout(Duration::from_secs(5), p0.run(None, shutdown.clone()))
            .await
            .unwrap();

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::Closed {
                peer: PhilosopherId(1)
            })
        ));
        assert_eq!(err.code(), "E101");
        assert!(!shutdown.is_cancelled());
    }
}
