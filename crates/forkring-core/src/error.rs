//! Error types for forkring

use thiserror::Error;

use crate::domain::dining::DiningError;
use crate::simulation::SimulationError;
use crate::transport::TransportError;

/// Result type alias using forkring's Error
pub type Result<T> = std::result::Result<T, Error>;

/// forkring error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Transport errors (E100-E199)
    #[error("Transport failure: {0}. The ring cannot make progress without this channel.")]
    Transport(#[from] TransportError),

    // Protocol errors (E200-E299)
    #[error("Dining protocol error: {0}")]
    Dining(#[from] DiningError),

    // Simulation errors (E300-E399)
    #[error("Simulation failed: {0}")]
    Simulation(#[from] SimulationError),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Runtime errors (E900-E999)
    #[error("Philosopher task {0} panicked or was aborted")]
    TaskFailed(String),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(e) => e.code(),
            Self::Dining(e) => e.code(),
            Self::Simulation(e) => e.code(),
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::TaskFailed(_) => "E900",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Dining(DiningError::CyclicOrientation { .. }) => Some(
                "forkring config set ring.orientation lowest_id".to_string(),
            ),
            Self::Dining(DiningError::RingTooSmall(_)) => {
                Some("forkring config set ring.philosophers 5".to_string())
            }
            Self::ConfigError(_) => Some("forkring config show".to_string()),
            _ => None,
        }
    }
}
