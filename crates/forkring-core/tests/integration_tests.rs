//! Forkring Core Integration Tests

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use forkring_core::{
    config::{Config, TimingConfig},
    domain::dining::{
        DeferReason, DeferralPolicy, ForkId, ForkMessage, Orientation, Phase, PhilosopherId,
        Reaction, RingLayout,
    },
    runtime::Table,
    simulation::{Simulation, SimulationError, Step},
};

fn p(id: usize) -> PhilosopherId {
    PhilosopherId(id)
}

fn quick_timing(seed: u64) -> TimingConfig {
    TimingConfig {
        think_min_ms: 0,
        think_max_ms: 20,
        seed: Some(seed),
        ..TimingConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_rings_of_every_size_meet_quota() {
    for size in 2..=6 {
        for policy in [DeferralPolicy::Fifo, DeferralPolicy::Lifo] {
            let layout = RingLayout::new(size, Orientation::LowestId).unwrap();
            let report = Table::new(layout, quick_timing(size as u64), policy)
                .with_meals(5)
                .run()
                .await
                .unwrap();

            assert_eq!(report.philosophers.len(), size);
            assert!(
                report.philosophers.iter().all(|s| s.meals == 5),
                "size {size} {policy}: {:?}",
                report.philosophers
            );
            assert_eq!(report.total_meals(), 5 * size as u64);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_table_from_config_with_explicit_owners() {
    let mut config = Config::default();
    config.set("ring.philosophers", "3").unwrap();
    config.set("ring.owners", "0,0,2").unwrap();
    config.timing = quick_timing(3);

    let report = Table::from_config(&config)
        .unwrap()
        .with_meals(3)
        .run()
        .await
        .unwrap();
    assert_eq!(report.min_meals(), 3);
}

#[test]
fn test_simulated_rings_eat_fairly() {
    for size in 2..=6 {
        for seed in [1, 7, 42] {
            for policy in [DeferralPolicy::Fifo, DeferralPolicy::Lifo] {
                let layout = RingLayout::new(size, Orientation::LowestId).unwrap();
                let mut sim = Simulation::new(layout, policy, seed).unwrap();
                let report = sim
                    .run_until_meals(10, 200_000, 20_000)
                    .unwrap_or_else(|e| panic!("size {size} seed {seed} {policy}: {e}"));
                assert!(report.meals.iter().all(|m| *m >= 10));
            }
        }
    }
}

#[test]
fn test_highest_id_orientation_simulates() {
    let layout = RingLayout::new(5, Orientation::HighestId).unwrap();
    let mut sim = Simulation::new(layout, DeferralPolicy::Fifo, 3).unwrap();
    let report = sim.run(20_000).unwrap();
    assert!(report.min_meals() > 0);
    assert!(report.max_in_flight > 0);
}

/// Every deferred request is granted by the end of the deferrer's next meal
#[test]
fn test_deferred_requests_resolve_by_next_meal() {
    for seed in 0..10u64 {
        let layout = RingLayout::new(5, Orientation::LowestId).unwrap();
        let mut sim = Simulation::new(layout, DeferralPolicy::Fifo, seed).unwrap();
        let mut scheduler = StdRng::seed_from_u64(seed);
        let mut outstanding: HashSet<(PhilosopherId, ForkId, PhilosopherId)> = HashSet::new();
        let mut deferrals = 0;

        for _ in 0..20_000 {
            let enabled = sim.enabled_steps();
            assert!(!enabled.is_empty(), "no enabled step with seed {seed}");
            let step = enabled[scheduler.gen_range(0..enabled.len())];

            let actor = match step {
                Step::BecomeHungry(id) | Step::StartEating(id) | Step::FinishEating(id) => id,
                Step::Deliver { to, .. } => to,
            };

            for reaction in sim.apply(step).unwrap() {
                match reaction {
                    Reaction::Deferred {
                        fork, requester, ..
                    } => {
                        deferrals += 1;
                        outstanding.insert((actor, fork, requester));
                    }
                    Reaction::Granted { fork, to } => {
                        outstanding.remove(&(actor, fork, to));
                    }
                    _ => {}
                }
            }

            if let Step::FinishEating(id) = step {
                assert!(
                    !outstanding.iter().any(|(deferrer, _, _)| *deferrer == id),
                    "{id} finished eating with requests outstanding (seed {seed})"
                );
            }
        }
        assert!(deferrals > 0);
    }
}

/// P1 and P2 both want F2, which P2 holds dirty
#[test]
fn test_contended_fork_is_granted_once_then_returned() {
    let layout = RingLayout::with_owners(vec![p(0), p(0), p(2)]).unwrap();
    let mut sim = Simulation::new(layout, DeferralPolicy::Fifo, 0).unwrap();

    sim.apply(Step::BecomeHungry(p(1))).unwrap();
    sim.apply(Step::BecomeHungry(p(2))).unwrap();
    assert_eq!(
        sim.pending(p(1), p(2)),
        vec![ForkMessage::request(ForkId(2), p(1))]
    );
    assert_eq!(
        sim.pending(p(2), p(0)),
        vec![ForkMessage::request(ForkId(0), p(2))]
    );

    // the dirty fork goes to P1 and P2 asks for it back
    let reactions = sim.apply(Step::Deliver { from: p(1), to: p(2) }).unwrap();
    assert_eq!(
        reactions,
        vec![
            Reaction::Granted {
                fork: ForkId(2),
                to: p(1)
            },
            Reaction::Requested {
                fork: ForkId(2),
                to: p(1)
            },
        ]
    );

    let acquired = sim.apply(Step::Deliver { from: p(2), to: p(1) }).unwrap();
    assert_eq!(
        acquired,
        vec![Reaction::Acquired {
            fork: ForkId(2),
            from: p(2)
        }]
    );

    let deferred = sim.apply(Step::Deliver { from: p(2), to: p(1) }).unwrap();
    assert_eq!(
        deferred,
        vec![Reaction::Deferred {
            fork: ForkId(2),
            requester: p(2),
            reason: DeferReason::Clean,
        }]
    );
    assert_eq!(sim.report().grants, 1);

    // P1 collects F1 from the thinking P0 and eats
    sim.apply(Step::Deliver { from: p(1), to: p(0) }).unwrap();
    sim.apply(Step::Deliver { from: p(0), to: p(1) }).unwrap();
    assert!(sim.state(p(1)).unwrap().ready_to_eat());
    sim.apply(Step::StartEating(p(1))).unwrap();

    let released = sim.apply(Step::FinishEating(p(1))).unwrap();
    assert_eq!(
        released,
        vec![Reaction::Granted {
            fork: ForkId(2),
            to: p(2)
        }]
    );

    // P2 gets F2 back, then F0 from P0, and eats
    sim.apply(Step::Deliver { from: p(1), to: p(2) }).unwrap();
    sim.apply(Step::Deliver { from: p(2), to: p(0) }).unwrap();
    sim.apply(Step::Deliver { from: p(0), to: p(2) }).unwrap();
    sim.apply(Step::StartEating(p(2))).unwrap();
    assert_eq!(sim.state(p(2)).unwrap().phase(), Phase::Eating);
    assert_eq!(sim.in_flight(), 0);
}

#[test]
fn test_cyclic_orientation_never_reaches_simulation() {
    let mut config = Config::default();
    config.ring.philosophers = 4;
    config.ring.owners = Some(vec![3, 0, 1, 2]);

    let err = Simulation::from_config(&config).unwrap_err();
    assert_eq!(err.code(), "E202");
    assert!(matches!(err, SimulationError::Dining(_)));
}
