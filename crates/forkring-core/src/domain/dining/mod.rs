//! Fork passing between philosophers on a ring
//!
//! This module implements the clean/dirty fork protocol that lets N
//! philosophers repeatedly take the two forks they share with their
//! neighbors, without deadlock and without starving anyone.
//!
//! # Architecture
//!
//! - **Types**: `Fork`, `ForkPair`, `DeferredRequests`, `Phase`
//! - **Orientation**: `RingLayout` validates an acyclic initial ownership map
//! - **Messages**: `ForkMessage` with `request` and `grant` kinds
//! - **State**: `PhilosopherState`, a sans-IO state machine returning `Reaction`s
//! - **Events**: `DiningEvent` for observers of a run
//!
//! # Example
//!
//! ```ignore
//! use forkring_core::domain::dining::{DeferralPolicy, Orientation, PhilosopherId, PhilosopherState, RingLayout};
//!
//! let layout = RingLayout::new(5, Orientation::LowestId)?;
//! let mut p1 = PhilosopherState::seated(&layout, PhilosopherId(1), DeferralPolicy::Fifo)?;
//!
//! for reaction in p1.become_hungry()? {
//!     if let Some(out) = reaction.outbound(p1.id()) {
//!         // deliver out.message to out.to
//!     }
//! }
//! ```

pub mod event;
pub mod message;
pub mod orientation;
pub mod state;
pub mod types;

// Re-export main types
pub use event::{DiningEvent, DiningEventType};
pub use message::{ForkMessage, MessageKind, Outbound};
pub use orientation::{Orientation, RingLayout};
pub use state::{DeferReason, PhilosopherState, Reaction};
pub use types::{
    DeferralPolicy, DeferredRequest, DeferredRequests, DiningError, DiningResult, Fork, ForkId,
    ForkPair, Phase, PhilosopherId,
};
