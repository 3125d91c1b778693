//! Randomized think delays

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::TimingConfig;
use crate::domain::dining::PhilosopherId;

/// Shape of the think delay distribution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkDistribution {
    /// Every delay in `[min, max]` equally likely
    #[default]
    Uniform,
    /// Exponential with its mean at the midpoint of `[min, max]`, clamped to the range
    Exponential,
}

impl ThinkDistribution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uniform => "uniform",
            Self::Exponential => "exponential",
        }
    }
}

impl fmt::Display for ThinkDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ThinkDistribution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" => Ok(Self::Uniform),
            "exponential" | "exp" => Ok(Self::Exponential),
            other => Err(format!(
                "unknown think distribution '{}', use uniform or exponential",
                other
            )),
        }
    }
}

/// Source of think delays for one philosopher
#[derive(Debug, Clone)]
pub struct ThinkSchedule {
    rng: StdRng,
    min_ms: u64,
    max_ms: u64,
    exp: Option<Exp<f64>>,
}

impl ThinkSchedule {
    /// Create a schedule over `[min_ms, max_ms]`; a seed makes it reproducible
    pub fn new(
        min_ms: u64,
        max_ms: u64,
        distribution: ThinkDistribution,
        seed: Option<u64>,
    ) -> Self {
        let (min_ms, max_ms) = if min_ms <= max_ms {
            (min_ms, max_ms)
        } else {
            (max_ms, min_ms)
        };

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let exp = match distribution {
            ThinkDistribution::Uniform => None,
            ThinkDistribution::Exponential => {
                let mean = (min_ms as f64 + max_ms as f64) / 2.0;
                if mean > 0.0 {
                    Exp::new(1.0 / mean).ok()
                } else {
                    None
                }
            }
        };

        Self {
            rng,
            min_ms,
            max_ms,
            exp,
        }
    }

    /// Schedule for `philosopher`, seeded with `seed + id` when a seed is configured
    pub fn for_philosopher(timing: &TimingConfig, philosopher: PhilosopherId) -> Self {
        Self::new(
            timing.think_min_ms,
            timing.think_max_ms,
            timing.think_distribution,
            timing.seed.map(|seed| seed.wrapping_add(philosopher.0 as u64)),
        )
    }

    /// Draw the next delay
    pub fn next_delay(&mut self) -> Duration {
        let ms = match &self.exp {
            Some(exp) => {
                let sample = exp.sample(&mut self.rng).round();
                (sample as u64).clamp(self.min_ms, self.max_ms)
            }
            None if self.min_ms == self.max_ms => self.min_ms,
            None => self.rng.gen_range(self.min_ms..=self.max_ms),
        };
        Duration::from_millis(ms)
    }
}
