//! Per-philosopher protocol state machine
//!
//! `PhilosopherState` owns one philosopher's fork pair and deferred requests
//! and applies the fork-passing rules. It performs no I/O: every operation
//! returns the [`Reaction`]s it produced, and the caller delivers the messages
//! they imply. The async runtime and the deterministic simulation both drive
//! the same state machine.
//!
//! Rules applied to an inbound request for fork `f` from neighbor `r`:
//! - `f` not held, held and clean, or in use by a meal: defer `(f, r)`
//! - `f` held and dirty otherwise: grant it to `r` at once
//!
//! A grant marks the fork held and clean. Eating dirties both forks and, on
//! completion, every deferred request is answered with a grant.

use tracing::{debug, warn};

use super::message::{ForkMessage, MessageKind, Outbound};
use super::orientation::RingLayout;
use super::types::{
    DeferralPolicy, DeferredRequest, DeferredRequests, DiningError, DiningResult, ForkId,
    ForkPair, Phase, PhilosopherId,
};

/// Why a request was not honored on arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// The fork is elsewhere
    NotHeld,
    /// The fork has not been used since it arrived
    Clean,
    /// The fork is in use right now
    Eating,
}

impl DeferReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotHeld => "not_held",
            Self::Clean => "clean",
            Self::Eating => "eating",
        }
    }
}

/// Something the state machine did in response to an input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// A request for `fork` was sent to `to`
    Requested { fork: ForkId, to: PhilosopherId },
    /// `fork` was handed to `to`
    Granted { fork: ForkId, to: PhilosopherId },
    /// `fork` arrived from `from`
    Acquired { fork: ForkId, from: PhilosopherId },
    /// A request was queued for later
    Deferred {
        fork: ForkId,
        requester: PhilosopherId,
        reason: DeferReason,
    },
    /// An inbound message was dropped
    Ignored { message: ForkMessage, reason: String },
}

impl Reaction {
    /// The message this reaction puts on the wire, if any
    pub fn outbound(&self, me: PhilosopherId) -> Option<Outbound> {
        match self {
            Self::Requested { fork, to } => Some(Outbound {
                to: *to,
                message: ForkMessage::request(*fork, me),
            }),
            Self::Granted { fork, to } => Some(Outbound {
                to: *to,
                message: ForkMessage::grant(*fork, me),
            }),
            _ => None,
        }
    }
}

/// Protocol state of one philosopher
#[derive(Debug, Clone)]
pub struct PhilosopherState {
    id: PhilosopherId,
    phase: Phase,
    forks: ForkPair,
    deferred: DeferredRequests,
    meals: u64,
}

impl PhilosopherState {
    /// Create a thinking philosopher holding `forks`
    pub fn new(id: PhilosopherId, forks: ForkPair, policy: DeferralPolicy) -> Self {
        Self {
            id,
            phase: Phase::Thinking,
            forks,
            deferred: DeferredRequests::new(policy),
            meals: 0,
        }
    }

    /// Create the philosopher seated at `id` with its initial forks from `layout`
    pub fn seated(
        layout: &RingLayout,
        id: PhilosopherId,
        policy: DeferralPolicy,
    ) -> DiningResult<Self> {
        Ok(Self::new(id, layout.initial_forks(id)?, policy))
    }

    pub fn id(&self) -> PhilosopherId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn forks(&self) -> &ForkPair {
        &self.forks
    }

    pub fn deferred(&self) -> &DeferredRequests {
        &self.deferred
    }

    /// Completed meals
    pub fn meals(&self) -> u64 {
        self.meals
    }

    pub fn holds(&self, fork: ForkId) -> bool {
        self.forks.get(fork).is_some_and(|f| f.held_by_me)
    }

    pub fn holds_both(&self) -> bool {
        self.forks.holds_both()
    }

    /// Hungry with both forks in hand
    pub fn ready_to_eat(&self) -> bool {
        self.phase == Phase::Hungry && self.holds_both()
    }

    /// Stop thinking and ask for every missing fork
    pub fn become_hungry(&mut self) -> DiningResult<Vec<Reaction>> {
        self.expect_phase(Phase::Thinking)?;
        self.phase = Phase::Hungry;
        debug!(philosopher = %self.id, forks = %self.forks, "Hungry");
        Ok(self.request_missing())
    }

    /// Route an inbound message by its tag
    pub fn handle(&mut self, message: ForkMessage) -> Vec<Reaction> {
        match message.kind {
            MessageKind::Request => self.handle_request(message),
            MessageKind::Grant => self.handle_grant(message),
            MessageKind::Unknown => vec![self.ignore(message, "unrecognized message kind")],
        }
    }

    /// Apply the request rules to `(fork, requester)`
    pub fn handle_request(&mut self, message: ForkMessage) -> Vec<Reaction> {
        let me = self.id;
        let fork_id = message.fork;
        let requester = message.sender;

        let Some(fork) = self.forks.get_mut(fork_id) else {
            return vec![self.ignore(message, "request names a fork not seated here")];
        };
        if fork.neighbor != requester {
            return vec![self.ignore(message, "requester does not share this fork")];
        }

        let reason = if !fork.held_by_me {
            Some(DeferReason::NotHeld)
        } else if self.phase == Phase::Eating {
            Some(DeferReason::Eating)
        } else if !fork.dirty {
            Some(DeferReason::Clean)
        } else {
            None
        };

        if let Some(reason) = reason {
            self.deferred.push(DeferredRequest {
                fork: fork_id,
                requester,
            });
            debug!(
                philosopher = %me,
                fork = %fork_id,
                requester = %requester,
                reason = reason.as_str(),
                "Request deferred"
            );
            return vec![Reaction::Deferred {
                fork: fork_id,
                requester,
                reason,
            }];
        }

        fork.transfer_to(requester);
        debug!(philosopher = %me, fork = %fork_id, to = %requester, "Dirty fork surrendered");

        let mut reactions = vec![Reaction::Granted {
            fork: fork_id,
            to: requester,
        }];
        // a hungry philosopher still needs the fork it just gave up
        if self.phase == Phase::Hungry {
            reactions.extend(self.request_missing());
        }
        reactions
    }

    /// Take possession of a granted fork
    pub fn handle_grant(&mut self, message: ForkMessage) -> Vec<Reaction> {
        let me = self.id;
        let fork_id = message.fork;
        let sender = message.sender;

        let Some(fork) = self.forks.get_mut(fork_id) else {
            return vec![self.ignore(message, "grant names a fork not seated here")];
        };
        if fork.neighbor != sender {
            return vec![self.ignore(message, "granter does not share this fork")];
        }
        if fork.held_by_me {
            return vec![self.ignore(message, "fork is already held")];
        }

        fork.receive(me);
        debug!(philosopher = %me, fork = %fork_id, from = %sender, "Fork acquired");

        vec![Reaction::Acquired {
            fork: fork_id,
            from: sender,
        }]
    }

    /// Enter the critical section; both forks become dirty
    pub fn start_eating(&mut self) -> DiningResult<()> {
        self.expect_phase(Phase::Hungry)?;
        if let Some(missing) = self.forks.first_missing() {
            return Err(DiningError::NotReadyToEat {
                philosopher: self.id,
                missing,
            });
        }

        for fork in self.forks.iter_mut() {
            fork.dirty = true;
        }
        self.phase = Phase::Eating;
        self.meals += 1;
        Ok(())
    }

    /// Leave the critical section and answer every deferred request
    pub fn finish_eating(&mut self) -> DiningResult<Vec<Reaction>> {
        self.expect_phase(Phase::Eating)?;
        self.phase = Phase::Thinking;

        let mut reactions = Vec::new();
        for request in self.deferred.drain() {
            let Some(fork) = self.forks.get_mut(request.fork) else {
                continue;
            };
            if !fork.held_by_me {
                // already passed on by an earlier grant in this drain
                warn!(
                    philosopher = %self.id,
                    fork = %request.fork,
                    requester = %request.requester,
                    "Deferred request for a fork no longer held"
                );
                continue;
            }
            fork.transfer_to(request.requester);
            reactions.push(Reaction::Granted {
                fork: request.fork,
                to: request.requester,
            });
        }

        debug!(
            philosopher = %self.id,
            grants = reactions.len(),
            forks = %self.forks,
            "Finished eating"
        );
        Ok(reactions)
    }

    fn request_missing(&mut self) -> Vec<Reaction> {
        let mut reactions = Vec::new();
        for fork in self.forks.iter_mut() {
            if !fork.held_by_me && !fork.requested {
                fork.requested = true;
                reactions.push(Reaction::Requested {
                    fork: fork.id,
                    to: fork.last_known_holder,
                });
            }
        }
        reactions
    }

    fn ignore(&self, message: ForkMessage, reason: &str) -> Reaction {
        warn!(philosopher = %self.id, message = %message, reason, "Ignoring message");
        Reaction::Ignored {
            message,
            reason: reason.to_string(),
        }
    }

    fn expect_phase(&self, expected: Phase) -> DiningResult<()> {
        if self.phase != expected {
            return Err(DiningError::InvalidPhase {
                philosopher: self.id,
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }
}
