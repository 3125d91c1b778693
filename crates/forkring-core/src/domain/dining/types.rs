//! Fork records, identifiers and error definitions

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Result type for dining protocol operations
pub type DiningResult<T> = std::result::Result<T, DiningError>;

/// Dining protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiningError {
    /// A ring needs two neighbors per philosopher
    #[error("A ring needs at least 2 philosophers, got {0}")]
    RingTooSmall(usize),

    /// Owner map does not match the ring size
    #[error("Owner map lists {got} forks but the ring has {expected}")]
    OwnerMapSize { expected: usize, got: usize },

    /// Initial owners form a cycle of mutual waiting
    #[error("Initial orientation lets philosophers wait on each other in a cycle: {cycle}")]
    CyclicOrientation { cycle: String },

    /// Fork assigned to a philosopher that does not sit next to it
    #[error("Fork {fork} lies between {left} and {right}, it cannot start with {owner}")]
    NotAdjacent {
        fork: ForkId,
        left: PhilosopherId,
        right: PhilosopherId,
        owner: PhilosopherId,
    },

    /// Philosopher id outside the ring
    #[error("Philosopher {philosopher} is not seated at a ring of {size}")]
    UnknownPhilosopher {
        philosopher: PhilosopherId,
        size: usize,
    },

    /// Eating attempted without both forks
    #[error("Philosopher {philosopher} cannot eat without fork {missing}")]
    NotReadyToEat {
        philosopher: PhilosopherId,
        missing: ForkId,
    },

    /// Phase transition attempted from the wrong phase
    #[error("Philosopher {philosopher} is {actual}, expected {expected}")]
    InvalidPhase {
        philosopher: PhilosopherId,
        expected: Phase,
        actual: Phase,
    },
}

impl DiningError {
    /// Get error code for this dining error
    pub fn code(&self) -> &'static str {
        match self {
            Self::RingTooSmall(_) => "E200",
            Self::OwnerMapSize { .. } => "E201",
            Self::CyclicOrientation { .. } => "E202",
            Self::NotAdjacent { .. } => "E203",
            Self::UnknownPhilosopher { .. } => "E204",
            Self::NotReadyToEat { .. } => "E205",
            Self::InvalidPhase { .. } => "E206",
        }
    }
}

/// Identifier of a philosopher process, `0..N`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhilosopherId(pub usize);

impl fmt::Display for PhilosopherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Identifier of a fork, shared by the two philosophers on its edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForkId(pub usize);

impl fmt::Display for ForkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Phase of the think/eat cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Thinking,
    Hungry,
    Eating,
}

impl Phase {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::Hungry => "hungry",
            Self::Eating => "eating",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One philosopher's view of a fork
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fork {
    /// Fork identifier
    pub id: ForkId,

    /// The other philosopher sharing this fork
    pub neighbor: PhilosopherId,

    /// Used by its holder since it was last handed over
    pub dirty: bool,

    /// Whether the local philosopher possesses the fork
    pub held_by_me: bool,

    /// Where the fork is believed to be; the request target when not held
    pub last_known_holder: PhilosopherId,

    /// A request for this fork is in flight
    #[serde(default)]
    pub requested: bool,
}

impl Fork {
    /// A fork the local philosopher starts with, dirty
    pub fn held(id: ForkId, me: PhilosopherId, neighbor: PhilosopherId) -> Self {
        Self {
            id,
            neighbor,
            dirty: true,
            held_by_me: true,
            last_known_holder: me,
            requested: false,
        }
    }

    /// A fork the neighbor starts with
    pub fn remote(id: ForkId, neighbor: PhilosopherId) -> Self {
        Self {
            id,
            neighbor,
            dirty: true,
            held_by_me: false,
            last_known_holder: neighbor,
            requested: false,
        }
    }

    /// Whether a request for this fork must be honored right now
    pub fn must_yield(&self) -> bool {
        self.held_by_me && self.dirty
    }

    /// Hand the fork to `to`; it is clean from the new holder's side
    pub(crate) fn transfer_to(&mut self, to: PhilosopherId) {
        self.held_by_me = false;
        self.dirty = false;
        self.requested = false;
        self.last_known_holder = to;
    }

    /// Take possession of a fork granted by the neighbor
    pub(crate) fn receive(&mut self, me: PhilosopherId) {
        self.held_by_me = true;
        self.dirty = false;
        self.requested = false;
        self.last_known_holder = me;
    }
}

impl fmt::Display for Fork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cleanliness = if self.dirty { "dirty" } else { "clean" };
        if self.held_by_me {
            write!(f, "{{{}, {}, held <-> {}}}", self.id, cleanliness, self.neighbor)
        } else {
            write!(f, "{{{}, {}, at {}}}", self.id, cleanliness, self.last_known_holder)
        }
    }
}

/// The two forks seated next to one philosopher
///
/// Slot 0 is shared with the predecessor, slot 1 with the successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkPair([Fork; 2]);

impl ForkPair {
    pub fn new(predecessor_side: Fork, successor_side: Fork) -> Self {
        Self([predecessor_side, successor_side])
    }

    pub fn get(&self, id: ForkId) -> Option<&Fork> {
        self.0.iter().find(|fork| fork.id == id)
    }

    pub fn get_mut(&mut self, id: ForkId) -> Option<&mut Fork> {
        self.0.iter_mut().find(|fork| fork.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fork> {
        self.0.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Fork> {
        self.0.iter_mut()
    }

    /// First fork not currently held, if any
    pub fn first_missing(&self) -> Option<ForkId> {
        self.0.iter().find(|fork| !fork.held_by_me).map(|fork| fork.id)
    }

    pub fn holds_both(&self) -> bool {
        self.0.iter().all(|fork| fork.held_by_me)
    }
}

impl fmt::Display for ForkPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.0[0], self.0[1])
    }
}

/// Order in which deferred requests are answered after eating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferralPolicy {
    /// Oldest request first
    #[default]
    Fifo,
    /// Newest request first. A long-waiting neighbor can be served after a
    /// more recent one.
    Lifo,
}

impl DeferralPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fifo => "fifo",
            Self::Lifo => "lifo",
        }
    }
}

impl fmt::Display for DeferralPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeferralPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "lifo" => Ok(Self::Lifo),
            other => Err(format!("unknown deferral policy '{}', use fifo or lifo", other)),
        }
    }
}

/// A request that could not be honored when it arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredRequest {
    pub fork: ForkId,
    pub requester: PhilosopherId,
}

/// Unbounded list of deferred requests, drained in policy order
#[derive(Debug, Clone, Default)]
pub struct DeferredRequests {
    policy: DeferralPolicy,
    queue: VecDeque<DeferredRequest>,
}

impl DeferredRequests {
    pub fn new(policy: DeferralPolicy) -> Self {
        Self {
            policy,
            queue: VecDeque::new(),
        }
    }

    pub fn policy(&self) -> DeferralPolicy {
        self.policy
    }

    pub fn push(&mut self, request: DeferredRequest) {
        self.queue.push_back(request);
    }

    /// Remove every request, in the order they must be answered
    pub fn drain(&mut self) -> Vec<DeferredRequest> {
        match self.policy {
            DeferralPolicy::Fifo => self.queue.drain(..).collect(),
            DeferralPolicy::Lifo => self.queue.drain(..).rev().collect(),
        }
    }

    pub fn contains(&self, fork: ForkId, requester: PhilosopherId) -> bool {
        self.queue
            .iter()
            .any(|request| request.fork == fork && request.requester == requester)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pending requests in arrival order
    pub fn iter(&self) -> impl Iterator<Item = &DeferredRequest> {
        self.queue.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deferred(fork: usize, requester: usize) -> DeferredRequest {
        DeferredRequest {
            fork: ForkId(fork),
            requester: PhilosopherId(requester),
        }
    }

    #[test]
    fn test_fifo_drain_order() {
        let mut requests = DeferredRequests::new(DeferralPolicy::Fifo);
        requests.push(deferred(1, 0));
        requests.push(deferred(2, 2));

        assert_eq!(requests.drain(), vec![deferred(1, 0), deferred(2, 2)]);
        assert!(requests.is_empty());
    }

    #[test]
    fn test_lifo_drain_order() {
        let mut requests = DeferredRequests::new(DeferralPolicy::Lifo);
        requests.push(deferred(1, 0));
        requests.push(deferred(2, 2));

        assert_eq!(requests.drain(), vec![deferred(2, 2), deferred(1, 0)]);
    }

    #[test]
    fn test_deferral_policy_parse() {
        assert_eq!("FIFO".parse::<DeferralPolicy>(), Ok(DeferralPolicy::Fifo));
        assert_eq!("lifo".parse::<DeferralPolicy>(), Ok(DeferralPolicy::Lifo));
        assert!("stack".parse::<DeferralPolicy>().is_err());
        assert_eq!(DeferralPolicy::default(), DeferralPolicy::Fifo);
    }

    #[test]
    fn test_fork_transfer_flags() {
        let me = PhilosopherId(0);
        let neighbor = PhilosopherId(1);
        let mut fork = Fork::held(ForkId(1), me, neighbor);
        assert!(fork.must_yield());

        fork.transfer_to(neighbor);
        assert!(!fork.held_by_me);
        assert!(!fork.dirty);
        assert_eq!(fork.last_known_holder, neighbor);

        fork.receive(me);
        assert!(fork.held_by_me);
        assert!(!fork.dirty);
        assert!(!fork.must_yield());
        assert_eq!(fork.last_known_holder, me);
    }

    #[test]
    fn test_fork_pair_display() {
        let me = PhilosopherId(1);
        let pair = ForkPair::new(
            Fork::remote(ForkId(1), PhilosopherId(0)),
            Fork::held(ForkId(2), me, PhilosopherId(2)),
        );
        assert_eq!(pair.to_string(), "{F1, dirty, at P0}, {F2, dirty, held <-> P2}");
        assert_eq!(pair.first_missing(), Some(ForkId(1)));
        assert!(!pair.holds_both());
    }

    #[test]
    fn test_id_display() {
        assert_eq!(PhilosopherId(3).to_string(), "P3");
        assert_eq!(ForkId(0).to_string(), "F0");
        assert_eq!(Phase::Hungry.to_string(), "hungry");
    }
}
