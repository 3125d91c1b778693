//! Deterministic simulation of a whole ring
//!
//! Every philosopher's `PhilosopherState` is stepped by a seeded scheduler.
//! Messages wait in one FIFO queue per ordered pair of philosophers, so the
//! scheduler may interleave deliveries between pairs arbitrarily but never
//! reorders a pair's traffic. Safety is checked after every step.
//!
//! A step is one of: a thinking philosopher becomes hungry, the head message
//! of a non-empty queue is delivered, a hungry philosopher holding both forks
//! starts eating, or an eating philosopher finishes. When no step is enabled
//! the ring is deadlocked.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::domain::dining::{
    DeferralPolicy, DiningError, ForkId, ForkMessage, MessageKind, Phase, PhilosopherId,
    PhilosopherState, Reaction, RingLayout,
};

/// Result type for simulation operations
pub type SimulationResult<T> = std::result::Result<T, SimulationError>;

/// Simulation failures: each one is a protocol property that did not hold
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimulationError {
    #[error("Deadlock after {step} steps: no step enabled, hungry: {hungry}")]
    Deadlock { step: u64, hungry: String },

    #[error("Safety violated at step {step}: {detail}")]
    SafetyViolation { step: u64, detail: String },

    #[error("{philosopher} ate {meals} of {required} meals within {steps} steps")]
    Starvation {
        philosopher: PhilosopherId,
        meals: u64,
        required: u64,
        steps: u64,
    },

    #[error("No meal in the last {window} steps (at step {step})")]
    NoProgress { step: u64, window: u64 },

    #[error("{philosopher} finished eating with {pending} deferred requests unanswered")]
    UnresolvedDeferral {
        philosopher: PhilosopherId,
        pending: usize,
    },

    #[error("Step not enabled: {0}")]
    StepNotEnabled(Step),

    #[error(transparent)]
    Dining(#[from] DiningError),
}

impl SimulationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Deadlock { .. } => "E300",
            Self::SafetyViolation { .. } => "E301",
            Self::Starvation { .. } => "E302",
            Self::NoProgress { .. } => "E303",
            Self::UnresolvedDeferral { .. } => "E304",
            Self::StepNotEnabled(_) => "E305",
            Self::Dining(e) => e.code(),
        }
    }
}

/// One scheduler decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    BecomeHungry(PhilosopherId),
    /// Deliver the oldest message from `from` to `to`
    Deliver {
        from: PhilosopherId,
        to: PhilosopherId,
    },
    StartEating(PhilosopherId),
    FinishEating(PhilosopherId),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BecomeHungry(p) => write!(f, "{} becomes hungry", p),
            Self::Deliver { from, to } => write!(f, "deliver {} -> {}", from, to),
            Self::StartEating(p) => write!(f, "{} starts eating", p),
            Self::FinishEating(p) => write!(f, "{} finishes eating", p),
        }
    }
}

/// Counters collected over a simulation
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub steps: u64,
    /// Completed meals per philosopher, in seat order
    pub meals: Vec<u64>,
    pub delivered: u64,
    pub requests: u64,
    pub grants: u64,
    pub deferrals: u64,
    pub max_in_flight: usize,
}

impl SimulationReport {
    pub fn min_meals(&self) -> u64 {
        self.meals.iter().copied().min().unwrap_or(0)
    }
}

/// A seeded, single-threaded run of the whole ring
#[derive(Debug, Clone)]
pub struct Simulation {
    layout: RingLayout,
    states: Vec<PhilosopherState>,
    queues: BTreeMap<(PhilosopherId, PhilosopherId), VecDeque<ForkMessage>>,
    rng: StdRng,
    report: SimulationReport,
    trace: Option<Vec<Step>>,
}

impl Simulation {
    pub fn new(layout: RingLayout, policy: DeferralPolicy, seed: u64) -> SimulationResult<Self> {
        let states = layout
            .philosophers()
            .map(|id| PhilosopherState::seated(&layout, id, policy))
            .collect::<Result<Vec<_>, _>>()?;

        let report = SimulationReport {
            seed,
            meals: vec![0; layout.size()],
            ..Default::default()
        };

        Ok(Self {
            layout,
            states,
            queues: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
            report,
            trace: None,
        })
    }

    /// Build a simulation from the `ring`, `protocol` and `simulation` sections
    pub fn from_config(config: &Config) -> SimulationResult<Self> {
        let layout = config.ring.layout()?;
        Self::new(layout, config.protocol.deferral, config.simulation.seed)
    }

    /// Record every applied step
    pub fn with_trace(mut self) -> Self {
        self.trace = Some(Vec::new());
        self
    }

    pub fn layout(&self) -> &RingLayout {
        &self.layout
    }

    pub fn state(&self, id: PhilosopherId) -> Option<&PhilosopherState> {
        self.states.get(id.0)
    }

    pub fn states(&self) -> &[PhilosopherState] {
        &self.states
    }

    pub fn report(&self) -> &SimulationReport {
        &self.report
    }

    pub fn trace(&self) -> &[Step] {
        self.trace.as_deref().unwrap_or(&[])
    }

    /// Messages sent but not yet delivered
    pub fn in_flight(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    /// Messages queued from `from` to `to`, oldest first
    pub fn pending(&self, from: PhilosopherId, to: PhilosopherId) -> Vec<ForkMessage> {
        self.queues
            .get(&(from, to))
            .map(|queue| queue.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every step the scheduler may take now
    pub fn enabled_steps(&self) -> Vec<Step> {
        let mut steps = Vec::new();
        for state in &self.states {
            let id = state.id();
            match state.phase() {
                Phase::Thinking => steps.push(Step::BecomeHungry(id)),
                Phase::Hungry if state.holds_both() => steps.push(Step::StartEating(id)),
                Phase::Hungry => {}
                Phase::Eating => steps.push(Step::FinishEating(id)),
            }
        }
        for (&(from, to), queue) in &self.queues {
            if !queue.is_empty() {
                steps.push(Step::Deliver { from, to });
            }
        }
        steps
    }

    /// Take one randomly chosen enabled step
    pub fn step(&mut self) -> SimulationResult<Step> {
        let enabled = self.enabled_steps();
        if enabled.is_empty() {
            let hungry = self
                .states
                .iter()
                .filter(|s| s.phase() == Phase::Hungry)
                .map(|s| format!("{} {}", s.id(), s.forks()))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(SimulationError::Deadlock {
                step: self.report.steps,
                hungry,
            });
        }

        let step = enabled[self.rng.gen_range(0..enabled.len())];
        self.apply(step)?;
        Ok(step)
    }

    /// Apply `step`, which must currently be enabled
    pub fn apply(&mut self, step: Step) -> SimulationResult<Vec<Reaction>> {
        let (actor, reactions) = match step {
            Step::BecomeHungry(id) => {
                let state = self.enabled_state(step, id, Phase::Thinking)?;
                (id, state.become_hungry()?)
            }
            Step::StartEating(id) => {
                let state = self.enabled_state(step, id, Phase::Hungry)?;
                state.start_eating()?;
                (id, Vec::new())
            }
            Step::FinishEating(id) => {
                let state = self.enabled_state(step, id, Phase::Eating)?;
                let pending = state.deferred().len();
                let reactions = state.finish_eating()?;
                let granted = reactions
                    .iter()
                    .filter(|r| matches!(r, Reaction::Granted { .. }))
                    .count();
                if granted < pending || !state.deferred().is_empty() {
                    return Err(SimulationError::UnresolvedDeferral {
                        philosopher: id,
                        pending: pending - granted.min(pending),
                    });
                }
                if let Some(meals) = self.report.meals.get_mut(id.0) {
                    *meals += 1;
                }
                (id, reactions)
            }
            Step::Deliver { from, to } => {
                let message = self
                    .queues
                    .get_mut(&(from, to))
                    .and_then(VecDeque::pop_front)
                    .ok_or(SimulationError::StepNotEnabled(step))?;
                let state = self
                    .states
                    .get_mut(to.0)
                    .ok_or(SimulationError::StepNotEnabled(step))?;
                self.report.delivered += 1;
                (to, state.handle(message))
            }
        };

        for reaction in &reactions {
            match reaction {
                Reaction::Requested { .. } => self.report.requests += 1,
                Reaction::Granted { .. } => self.report.grants += 1,
                Reaction::Deferred { .. } => self.report.deferrals += 1,
                Reaction::Acquired { .. } | Reaction::Ignored { .. } => {}
            }
            if let Some(out) = reaction.outbound(actor) {
                self.queues
                    .entry((actor, out.to))
                    .or_default()
                    .push_back(out.message);
            }
        }

        self.report.steps += 1;
        self.report.max_in_flight = self.report.max_in_flight.max(self.in_flight());
        if let Some(trace) = &mut self.trace {
            trace.push(step);
        }
        debug!(step = self.report.steps, action = %step, "Simulation step");

        self.check_safety()?;
        Ok(reactions)
    }

    /// Run `steps` random steps
    pub fn run(&mut self, steps: u64) -> SimulationResult<SimulationReport> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(self.report.clone())
    }

    /// Run until every philosopher has eaten `min_meals` times
    ///
    /// Fails with `Starvation` when `max_steps` pass first, or `NoProgress`
    /// when nobody eats for `progress_window` consecutive steps.
    pub fn run_until_meals(
        &mut self,
        min_meals: u64,
        max_steps: u64,
        progress_window: u64,
    ) -> SimulationResult<SimulationReport> {
        let mut last_total = self.total_meals();
        let mut last_meal_step = self.report.steps;

        while self.report.min_meals() < min_meals {
            if self.report.steps >= max_steps {
                let (seat, meals) = self
                    .report
                    .meals
                    .iter()
                    .copied()
                    .enumerate()
                    .min_by_key(|(_, meals)| *meals)
                    .unwrap_or((0, 0));
                return Err(SimulationError::Starvation {
                    philosopher: PhilosopherId(seat),
                    meals,
                    required: min_meals,
                    steps: self.report.steps,
                });
            }

            self.step()?;

            let total = self.total_meals();
            if total > last_total {
                last_total = total;
                last_meal_step = self.report.steps;
            } else if self.report.steps - last_meal_step >= progress_window {
                return Err(SimulationError::NoProgress {
                    step: self.report.steps,
                    window: progress_window,
                });
            }
        }

        info!(
            seed = self.report.seed,
            steps = self.report.steps,
            min_meals = self.report.min_meals(),
            "Simulation reached meal target"
        );
        Ok(self.report.clone())
    }

    fn total_meals(&self) -> u64 {
        self.report.meals.iter().sum()
    }

    fn enabled_state(
        &mut self,
        step: Step,
        id: PhilosopherId,
        phase: Phase,
    ) -> SimulationResult<&mut PhilosopherState> {
        match self.states.get_mut(id.0) {
            Some(state) if state.phase() == phase => Ok(state),
            _ => Err(SimulationError::StepNotEnabled(step)),
        }
    }

    /// Every fork has exactly one owner, counting grants in flight
    fn check_safety(&self) -> SimulationResult<()> {
        let step = self.report.steps;
        let violation = |detail: String| SimulationError::SafetyViolation { step, detail };

        for fork in (0..self.layout.size()).map(ForkId) {
            let (left, right) = self.layout.endpoints(fork);
            let holders = [left, right]
                .iter()
                .filter(|p| self.states[p.0].holds(fork))
                .count();
            let granted = self
                .queues
                .values()
                .flatten()
                .filter(|m| m.fork == fork && m.kind == MessageKind::Grant)
                .count();
            if holders + granted != 1 {
                return Err(violation(format!(
                    "{} has {} holders and {} grants in flight",
                    fork, holders, granted
                )));
            }
        }

        for state in &self.states {
            if state.phase() == Phase::Eating && !state.holds_both() {
                return Err(violation(format!(
                    "{} is eating without both forks: {}",
                    state.id(),
                    state.forks()
                )));
            }
        }

        let size = self.states.len();
        for (index, state) in self.states.iter().enumerate() {
            let next = &self.states[(index + 1) % size];
            if size > 1 && state.phase() == Phase::Eating && next.phase() == Phase::Eating {
                return Err(violation(format!(
                    "neighbors {} and {} are eating together",
                    state.id(),
                    next.id()
                )));
            }
        }

        Ok(())
    }
}
