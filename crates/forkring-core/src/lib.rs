//! Forkring Core Library
//!
//! This crate provides fork passing for philosophers seated on a ring:
//! - Dining protocol (clean/dirty forks, deferred requests, acyclic orientation)
//! - Transport (point-to-point JSON frames over in-process channels)
//! - Runtime (one tokio task per philosopher, a table with quotas and shutdown)
//! - Simulation (seeded step-by-step runs with safety checks)
//! - Domain events and configuration

pub mod config;
pub mod domain;
pub mod error;
pub mod runtime;
pub mod simulation;
pub mod transport;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::dining::{
        DeferralPolicy, ForkId, ForkMessage, Orientation, PhilosopherId, PhilosopherState,
        RingLayout,
    };
    pub use crate::error::{Error, Result};
    pub use crate::runtime::{Table, TableReport};
    pub use crate::simulation::{Simulation, SimulationReport};
}
