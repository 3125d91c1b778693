//! Domain layer
//!
//! Contains the fork-passing protocol and its events.

pub mod dining;
pub mod events;
