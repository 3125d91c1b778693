//! Human-readable rendering of runs, simulations and layouts

use forkring_core::domain::dining::{
    DiningEvent, DiningEventType, ForkId, PhilosopherState, RingLayout,
};
use forkring_core::runtime::TableReport;
use forkring_core::simulation::SimulationReport;

/// One status line, indented by philosopher id so each seat reads as a column
pub fn status_line(event: &DiningEvent) -> Option<String> {
    let what = match event.event_type {
        DiningEventType::Thinking => "thinking".to_string(),
        DiningEventType::Hungry => "hungry".to_string(),
        DiningEventType::ForkRequested => format!("requesting fork ({})", event.fork()?.0),
        DiningEventType::Eating => format!("eating (meal {})", event.meal().unwrap_or(0)),
        _ => return None,
    };
    Some(format!(
        "{}{} {}",
        "\t".repeat(event.philosopher.0),
        event.philosopher,
        what
    ))
}

/// Fork table of one philosopher, followed by its deferred requests if any
pub fn fork_table(state: &PhilosopherState) -> String {
    let mut out = format!("{} [{}]\n", state.id(), state.phase());
    for fork in state.forks().iter() {
        out.push_str(&format!("  {}\n", fork));
    }

    let deferred = state.deferred();
    if !deferred.is_empty() {
        let requests: Vec<String> = deferred
            .iter()
            .map(|request| format!("{} <- {}", request.fork, request.requester))
            .collect();
        out.push_str(&format!(
            "  deferred ({}): {}\n",
            deferred.policy(),
            requests.join(", ")
        ));
    }
    out
}

pub fn layout_text(layout: &RingLayout) -> String {
    let mut out = String::new();
    for fork in (0..layout.size()).map(ForkId) {
        let (left, right) = layout.endpoints(fork);
        out.push_str(&format!(
            "{}  {} - {}  starts with {}\n",
            fork,
            left,
            right,
            layout.owner(fork)
        ));
    }
    out
}

pub fn table_report_text(report: &TableReport) -> String {
    let mut out = format!(
        "Run {} finished in {} ms, {} meals\n",
        report.run_id,
        report.elapsed.as_millis(),
        report.total_meals()
    );
    for summary in &report.philosophers {
        out.push_str(&format!(
            "  {:<4} meals {:<6} requests {:<6} grants {:<6} deferred {}\n",
            summary.philosopher.to_string(),
            summary.meals,
            summary.requests_sent,
            summary.grants_sent,
            summary.deferred
        ));
    }
    out
}

pub fn simulation_report_text(report: &SimulationReport) -> String {
    let mut out = format!(
        "Simulation (seed {}): {} philosophers, {} steps\n",
        report.seed,
        report.meals.len(),
        report.steps
    );
    for (seat, meals) in report.meals.iter().enumerate() {
        out.push_str(&format!("  P{:<3} meals {}\n", seat, meals));
    }
    out.push_str(&format!(
        "delivered {}, requests {}, grants {}, deferrals {}, max in flight {}\n",
        report.delivered, report.requests, report.grants, report.deferrals, report.max_in_flight
    ));
    out
}
