//! Ring layout and initial fork ownership
//!
//! Fork `i` lies between philosophers `i - 1 (mod N)` and `i`, so philosopher
//! `p` shares fork `p` with its predecessor and fork `p + 1 (mod N)` with its
//! successor. Every fork starts dirty with one of its two endpoints.
//!
//! The owner map induces a precedence graph: the philosopher holding a fork
//! uses it before the other endpoint gets it. A layout is only accepted when
//! that graph is acyclic, otherwise simultaneously hungry philosophers could
//! wait on each other forever.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::types::{
    DiningError, DiningResult, Fork, ForkId, ForkPair, PhilosopherId,
};

/// Strategy for choosing each fork's first owner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Every fork starts with its lower-numbered endpoint: P0 holds both of
    /// its forks, the last philosopher holds none
    #[default]
    LowestId,
    /// Every fork starts with its higher-numbered endpoint
    HighestId,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowestId => "lowest_id",
            Self::HighestId => "highest_id",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "lowest_id" => Ok(Self::LowestId),
            "highest_id" => Ok(Self::HighestId),
            other => Err(format!(
                "unknown orientation '{}', use lowest_id or highest_id",
                other
            )),
        }
    }
}

/// A validated ring with an acyclic initial ownership map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingLayout {
    owners: Vec<PhilosopherId>,
}

impl RingLayout {
    /// Build a ring of `size` philosophers with owners chosen by `orientation`
    pub fn new(size: usize, orientation: Orientation) -> DiningResult<Self> {
        if size < 2 {
            return Err(DiningError::RingTooSmall(size));
        }

        let owners = (0..size)
            .map(|fork| {
                let (left, right) = endpoints(size, ForkId(fork));
                match orientation {
                    Orientation::LowestId => left.min(right),
                    Orientation::HighestId => left.max(right),
                }
            })
            .collect();

        Self::with_owners(owners)
    }

    /// Build a ring from an explicit owner per fork (`owners[i]` starts with fork `i`)
    pub fn with_owners(owners: Vec<PhilosopherId>) -> DiningResult<Self> {
        let size = owners.len();
        if size < 2 {
            return Err(DiningError::RingTooSmall(size));
        }

        for (index, owner) in owners.iter().enumerate() {
            let fork = ForkId(index);
            let (left, right) = endpoints(size, fork);
            if *owner != left && *owner != right {
                return Err(DiningError::NotAdjacent {
                    fork,
                    left,
                    right,
                    owner: *owner,
                });
            }
        }

        let layout = Self { owners };
        if let Some(cycle) = layout.precedence_cycle() {
            let cycle = cycle
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(DiningError::CyclicOrientation { cycle });
        }

        Ok(layout)
    }

    /// Number of philosophers (and forks)
    pub fn size(&self) -> usize {
        self.owners.len()
    }

    /// The two philosophers sharing `fork`, predecessor side first
    pub fn endpoints(&self, fork: ForkId) -> (PhilosopherId, PhilosopherId) {
        endpoints(self.size(), fork)
    }

    /// Initial owner of `fork`
    pub fn owner(&self, fork: ForkId) -> PhilosopherId {
        self.owners[fork.0 % self.size()]
    }

    /// Forks seated next to `philosopher`: shared with predecessor, then successor
    pub fn forks_of(&self, philosopher: PhilosopherId) -> [ForkId; 2] {
        let size = self.size();
        [ForkId(philosopher.0 % size), ForkId((philosopher.0 + 1) % size)]
    }

    /// All philosopher ids in seat order
    pub fn philosophers(&self) -> impl Iterator<Item = PhilosopherId> + '_ {
        (0..self.size()).map(PhilosopherId)
    }

    /// The starting fork records of `philosopher`
    pub fn initial_forks(&self, philosopher: PhilosopherId) -> DiningResult<ForkPair> {
        let size = self.size();
        if philosopher.0 >= size {
            return Err(DiningError::UnknownPhilosopher { philosopher, size });
        }

        let [shared_left, shared_right] = self.forks_of(philosopher);
        let predecessor = PhilosopherId((philosopher.0 + size - 1) % size);
        let successor = PhilosopherId((philosopher.0 + 1) % size);

        let record = |fork: ForkId, neighbor: PhilosopherId| {
            if self.owner(fork) == philosopher {
                Fork::held(fork, philosopher, neighbor)
            } else {
                Fork::remote(fork, neighbor)
            }
        };

        Ok(ForkPair::new(
            record(shared_left, predecessor),
            record(shared_right, successor),
        ))
    }

    /// Philosophers stuck on a waiting cycle, if the owner map has one
    ///
    /// Edges run from a fork's owner to the other endpoint. Nodes are peeled
    /// off in topological order; whatever remains sits on or behind a cycle.
    pub fn precedence_cycle(&self) -> Option<Vec<PhilosopherId>> {
        let size = self.size();
        let mut successors = vec![Vec::new(); size];
        let mut indegree = vec![0usize; size];

        for fork in (0..size).map(ForkId) {
            let (left, right) = self.endpoints(fork);
            let owner = self.owner(fork);
            let waiter = if owner == left { right } else { left };
            successors[owner.0].push(waiter.0);
            indegree[waiter.0] += 1;
        }

        let mut ready: Vec<usize> = (0..size).filter(|p| indegree[*p] == 0).collect();
        let mut removed = vec![false; size];
        while let Some(node) = ready.pop() {
            removed[node] = true;
            for next in &successors[node] {
                indegree[*next] -= 1;
                if indegree[*next] == 0 {
                    ready.push(*next);
                }
            }
        }

        let remaining: Vec<PhilosopherId> = (0..size)
            .filter(|p| !removed[*p])
            .map(PhilosopherId)
            .collect();

        if remaining.is_empty() {
            None
        } else {
            Some(remaining)
        }
    }
}

fn endpoints(size: usize, fork: ForkId) -> (PhilosopherId, PhilosopherId) {
    let right = fork.0 % size;
    let left = (right + size - 1) % size;
    (PhilosopherId(left), PhilosopherId(right))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[usize]) -> Vec<PhilosopherId> {
        raw.iter().copied().map(PhilosopherId).collect()
    }

    #[test]
    fn test_lowest_id_matches_reference_assignment() {
        let layout = RingLayout::new(4, Orientation::LowestId).unwrap();

        // fork 0 sits between P3 and P0
        assert_eq!(layout.endpoints(ForkId(0)), (PhilosopherId(3), PhilosopherId(0)));
        assert_eq!(layout.owner(ForkId(0)), PhilosopherId(0));
        assert_eq!(layout.owner(ForkId(1)), PhilosopherId(0));
        assert_eq!(layout.owner(ForkId(2)), PhilosopherId(1));
        assert_eq!(layout.owner(ForkId(3)), PhilosopherId(2));

        let p0 = layout.initial_forks(PhilosopherId(0)).unwrap();
        assert!(p0.holds_both());
        let p3 = layout.initial_forks(PhilosopherId(3)).unwrap();
        assert_eq!(p3.first_missing(), Some(ForkId(3)));
        assert!(p3.iter().all(|fork| !fork.held_by_me && fork.dirty));
    }

    #[test]
    fn test_highest_id_is_acyclic() {
        let layout = RingLayout::new(5, Orientation::HighestId).unwrap();
        assert_eq!(layout.owner(ForkId(0)), PhilosopherId(4));
        assert!(layout.precedence_cycle().is_none());
    }

    #[test]
    fn test_every_philosopher_holding_one_side_is_rejected() {
        // each philosopher owns the fork shared with its successor
        let err = RingLayout::with_owners(ids(&[2, 0, 1])).unwrap_err();
        match err {
            DiningError::CyclicOrientation { cycle } => {
                assert_eq!(cycle, "P0 -> P1 -> P2");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            RingLayout::with_owners(ids(&[0, 1, 2])).unwrap_err().code(),
            "E202"
        );
    }

    #[test]
    fn test_two_seat_ring() {
        let layout = RingLayout::new(2, Orientation::LowestId).unwrap();
        assert_eq!(layout.forks_of(PhilosopherId(1)), [ForkId(1), ForkId(0)]);
        assert!(RingLayout::with_owners(ids(&[1, 0])).is_err());
    }

    #[test]
    fn test_owner_must_be_adjacent() {
        let err = RingLayout::with_owners(ids(&[0, 0, 0, 3])).unwrap_err();
        assert!(matches!(err, DiningError::NotAdjacent { fork: ForkId(2), .. }));
    }

    #[test]
    fn test_ring_too_small() {
        assert_eq!(
            RingLayout::new(1, Orientation::LowestId).unwrap_err(),
            DiningError::RingTooSmall(1)
        );
    }

    #[test]
    fn test_unknown_philosopher() {
        let layout = RingLayout::new(3, Orientation::LowestId).unwrap();
        assert!(matches!(
            layout.initial_forks(PhilosopherId(3)),
            Err(DiningError::UnknownPhilosopher { .. })
        ));
    }

    #[test]
    fn test_orientation_parse() {
        assert_eq!("lowest-id".parse::<Orientation>(), Ok(Orientation::LowestId));
        assert_eq!("HIGHEST_ID".parse::<Orientation>(), Ok(Orientation::HighestId));
        assert!("random".parse::<Orientation>().is_err());
    }
}
