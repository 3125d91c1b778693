//! Async runtime for the dining protocol
//!
//! - [`ThinkSchedule`]: randomized, optionally seeded think delays
//! - [`Philosopher`]: one task driving a `PhilosopherState` over a `Transport`
//! - [`Table`]: a whole ring in one process with quotas and shutdown

pub mod philosopher;
pub mod table;
pub mod think;

pub use philosopher::{Philosopher, PhilosopherSummary};
pub use table::{DEFAULT_EVENT_LIMIT, Table, TableReport};
pub use think::{ThinkDistribution, ThinkSchedule};
