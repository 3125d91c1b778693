//! Forkring CLI - philosophers passing forks around a ring

mod status;

use clap::{Args, Parser, Subcommand};
use forkring_core::config::Config;
use forkring_core::domain::dining::{PhilosopherId, PhilosopherState};
use forkring_core::runtime::Table;
use forkring_core::simulation::Simulation;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "forkring")]
#[command(author, version, about = "Philosophers sharing forks on a ring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a table of philosophers
    Run {
        #[command(flatten)]
        ring: RingArgs,
        /// Stop once every philosopher has eaten this many times
        #[arg(short, long)]
        meals: Option<u64>,
        /// Stop after this many milliseconds
        #[arg(long)]
        for_ms: Option<u64>,
        /// Shortest think delay in milliseconds
        #[arg(long)]
        think_min_ms: Option<u64>,
        /// Longest think delay in milliseconds
        #[arg(long)]
        think_max_ms: Option<u64>,
        /// Seed for think delays
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run a seeded step-by-step simulation with safety checks
    Simulate {
        #[command(flatten)]
        ring: RingArgs,
        /// Step budget
        #[arg(long)]
        steps: Option<u64>,
        /// Meals every philosopher must reach (0 runs the whole budget)
        #[arg(long)]
        min_meals: Option<u64>,
        /// Scheduler seed
        #[arg(long)]
        seed: Option<u64>,
        /// Print the first N scheduler steps
        #[arg(long)]
        trace: Option<usize>,
    },

    /// Show the initial fork layout
    Layout {
        #[command(flatten)]
        ring: RingArgs,
        /// Only show this philosopher's fork table
        #[arg(short, long)]
        philosopher: Option<usize>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Ring overrides applied on top of the config file
#[derive(Args, Default)]
struct RingArgs {
    /// Number of philosophers
    #[arg(short = 'n', long)]
    philosophers: Option<usize>,
    /// Initial fork orientation (lowest_id or highest_id)
    #[arg(long)]
    orientation: Option<String>,
    /// Explicit first owner of each fork, comma separated
    #[arg(long)]
    owners: Option<String>,
    /// Deferred request release order (fifo or lifo)
    #[arg(long)]
    deferral: Option<String>,
}

impl RingArgs {
    fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(philosophers) = self.philosophers {
            config.set("ring.philosophers", &philosophers.to_string())?;
        }
        if let Some(orientation) = &self.orientation {
            config.set("ring.orientation", orientation)?;
        }
        if let Some(owners) = &self.owners {
            config.set("ring.owners", owners)?;
        }
        if let Some(deferral) = &self.deferral {
            config.set("protocol.deferral", deferral)?;
        }
        Ok(())
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show all configuration values
    Show,
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("forkring={}", level).parse()?),
        )
        .init();

    match cli.command {
        Commands::Run {
            ring,
            meals,
            for_ms,
            think_min_ms,
            think_max_ms,
            seed,
        } => {
            let mut config = Config::load()?;
            ring.apply(&mut config)?;
            if let Some(ms) = think_min_ms {
                config.timing.think_min_ms = ms;
            }
            if let Some(ms) = think_max_ms {
                config.timing.think_max_ms = ms;
            }
            if seed.is_some() {
                config.timing.seed = seed;
            }
            cmd_run(&config, meals, for_ms, cli.format, cli.quiet).await
        }

        Commands::Simulate {
            ring,
            steps,
            min_meals,
            seed,
            trace,
        } => {
            let mut config = Config::load()?;
            ring.apply(&mut config)?;
            if let Some(steps) = steps {
                config.simulation.steps = steps;
            }
            if let Some(min_meals) = min_meals {
                config.simulation.min_meals = min_meals;
            }
            if let Some(seed) = seed {
                config.simulation.seed = seed;
            }
            config.validate()?;
            cmd_simulate(&config, trace, cli.format, cli.quiet)
        }

        Commands::Layout { ring, philosopher } => {
            let mut config = Config::load()?;
            ring.apply(&mut config)?;
            cmd_layout(&config, philosopher, cli.format)
        }

        Commands::Config { action } => cmd_config(action, cli.quiet),
    }
}

/// Attach the error code and fix-it hint to a core error
fn describe(error: forkring_core::Error) -> anyhow::Error {
    match error.suggestion() {
        Some(hint) => anyhow::anyhow!("[{}] {}\n  try: {}", error.code(), error, hint),
        None => anyhow::anyhow!("[{}] {}", error.code(), error),
    }
}

async fn cmd_run(
    config: &Config,
    meals: Option<u64>,
    for_ms: Option<u64>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let mut table = Table::from_config(config).map_err(describe)?;
    if let Some(meals) = meals {
        table = table.with_meals(meals);
    } else if for_ms.is_none() && !quiet {
        println!("Running until interrupted (Ctrl-C to stop)");
    }

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    if !quiet && matches!(format, OutputFormat::Text) {
        table = table.with_observer(events_tx);
    } else {
        drop(events_tx);
    }

    let shutdown = table.shutdown_token();
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping the table");
            interrupt.cancel();
        }
    });
    if let Some(ms) = for_ms {
        let deadline = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            info!(after_ms = ms, "Time limit reached");
            deadline.cancel();
        });
    }

    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if let Some(line) = status::status_line(&event) {
                println!("{}", line);
            }
        }
    });

    let report = table.run().await.map_err(describe)?;
    printer.await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            if !quiet {
                print!("{}", status::table_report_text(&report));
            }
        }
    }
    Ok(())
}

fn cmd_simulate(
    config: &Config,
    trace: Option<usize>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let mut simulation = Simulation::from_config(config)
        .map_err(|e| describe(e.into()))?
        .with_trace();

    let limits = &config.simulation;
    let outcome = if limits.min_meals > 0 {
        simulation.run_until_meals(limits.min_meals, limits.steps, limits.progress_window)
    } else {
        simulation.run(limits.steps)
    };

    if let Some(count) = trace {
        for (index, step) in simulation.trace().iter().take(count).enumerate() {
            println!("{:>6}  {}", index + 1, step);
        }
    }

    let report = outcome.map_err(|e| describe(e.into()))?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            if !quiet {
                print!("{}", status::simulation_report_text(&report));
            }
        }
    }
    Ok(())
}

fn cmd_layout(
    config: &Config,
    philosopher: Option<usize>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let layout = config
        .ring
        .layout()
        .map_err(|e| describe(e.into()))?;

    let seats: Vec<PhilosopherId> = match philosopher {
        Some(id) => vec![PhilosopherId(id)],
        None => layout.philosophers().collect(),
    };
    let states = seats
        .into_iter()
        .map(|id| PhilosopherState::seated(&layout, id, config.protocol.deferral))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| describe(e.into()))?;

    match format {
        OutputFormat::Json => {
            let forks: Vec<_> = states.iter().map(|state| state.forks()).collect();
            println!("{}", serde_json::to_string_pretty(&forks)?);
        }
        OutputFormat::Text => {
            if philosopher.is_none() {
                print!("{}", status::layout_text(&layout));
            }
            for state in &states {
                print!("{}", status::fork_table(state));
            }
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::Show => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
