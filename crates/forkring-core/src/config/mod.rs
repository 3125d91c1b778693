//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::dining::{
    DeferralPolicy, DiningError, DiningResult, Orientation, PhilosopherId, RingLayout,
};
use crate::runtime::ThinkDistribution;

/// forkring configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ring: RingConfig,
    pub timing: TimingConfig,
    pub protocol: ProtocolConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    pub philosophers: usize,
    pub orientation: Orientation,
    /// Explicit first owner of each fork; overrides `orientation`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owners: Option<Vec<usize>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub think_min_ms: u64,
    pub think_max_ms: u64,
    pub think_distribution: ThinkDistribution,
    /// Base seed for think delays; philosopher `k` uses `seed + k`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub deferral: DeferralPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub steps: u64,
    pub min_meals: u64,
    pub seed: u64,
    /// Steps allowed without any meal before the run counts as stuck
    pub progress_window: u64,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            philosophers: 5,
            orientation: Orientation::LowestId,
            owners: None,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            think_min_ms: 0,
            think_max_ms: 5000,
            think_distribution: ThinkDistribution::Uniform,
            seed: None,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            steps: 100_000,
            min_meals: 10,
            seed: 1,
            progress_window: 10_000,
        }
    }
}

impl RingConfig {
    /// Build the validated ring layout this configuration describes
    pub fn layout(&self) -> DiningResult<RingLayout> {
        match &self.owners {
            Some(owners) => {
                if owners.len() != self.philosophers {
                    return Err(DiningError::OwnerMapSize {
                        expected: self.philosophers,
                        got: owners.len(),
                    });
                }
                RingLayout::with_owners(owners.iter().copied().map(PhilosopherId).collect())
            }
            None => RingLayout::new(self.philosophers, self.orientation),
        }
    }
}

const KEYS: &[&str] = &[
    "ring.philosophers",
    "ring.orientation",
    "ring.owners",
    "timing.think_min_ms",
    "timing.think_max_ms",
    "timing.think_distribution",
    "timing.seed",
    "protocol.deferral",
    "simulation.steps",
    "simulation.min_meals",
    "simulation.seed",
    "simulation.progress_window",
];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("FORKRING_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("forkring")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or the defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, or the defaults if it doesn't exist
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`, creating its directory
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Reset configuration to defaults by removing the config file
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timing.think_min_ms > self.timing.think_max_ms {
            return Err(anyhow!(
                "timing.think_min_ms ({}) exceeds timing.think_max_ms ({})",
                self.timing.think_min_ms,
                self.timing.think_max_ms
            ));
        }
        if self.simulation.steps == 0 {
            return Err(anyhow!("simulation.steps must be positive"));
        }
        if self.simulation.progress_window == 0 {
            return Err(anyhow!("simulation.progress_window must be positive"));
        }
        self.ring.layout()?;
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "ring.philosophers" => Ok(self.ring.philosophers.to_string()),
            "ring.orientation" => Ok(self.ring.orientation.to_string()),
            "ring.owners" => Ok(match &self.ring.owners {
                Some(owners) => owners
                    .iter()
                    .map(|o| o.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
                None => "(derived from ring.orientation)".to_string(),
            }),

            "timing.think_min_ms" => Ok(self.timing.think_min_ms.to_string()),
            "timing.think_max_ms" => Ok(self.timing.think_max_ms.to_string()),
            "timing.think_distribution" => Ok(self.timing.think_distribution.to_string()),
            "timing.seed" => Ok(self
                .timing
                .seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "(random)".to_string())),

            "protocol.deferral" => Ok(self.protocol.deferral.to_string()),

            "simulation.steps" => Ok(self.simulation.steps.to_string()),
            "simulation.min_meals" => Ok(self.simulation.min_meals.to_string()),
            "simulation.seed" => Ok(self.simulation.seed.to_string()),
            "simulation.progress_window" => Ok(self.simulation.progress_window.to_string()),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `forkring config show` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "ring.philosophers" => {
                let count: usize = value
                    .parse()
                    .with_context(|| format!("Invalid philosophers value: {}", value))?;
                if count < 2 {
                    return Err(anyhow!("A ring needs at least 2 philosophers"));
                }
                self.ring.philosophers = count;
            }
            "ring.orientation" => {
                self.ring.orientation = value.parse().map_err(|e: String| anyhow!(e))?;
            }
            "ring.owners" => {
                if value.trim().is_empty() || value == "none" {
                    self.ring.owners = None;
                } else {
                    let owners = value
                        .split(',')
                        .map(|s| s.trim().parse::<usize>())
                        .collect::<Result<Vec<_>, _>>()
                        .with_context(|| format!("Invalid owners list: {}", value))?;
                    self.ring.owners = Some(owners);
                }
            }

            "timing.think_min_ms" => {
                self.timing.think_min_ms = value
                    .parse()
                    .with_context(|| format!("Invalid think_min_ms value: {}", value))?;
            }
            "timing.think_max_ms" => {
                self.timing.think_max_ms = value
                    .parse()
                    .with_context(|| format!("Invalid think_max_ms value: {}", value))?;
            }
            "timing.think_distribution" => {
                self.timing.think_distribution = value.parse().map_err(|e: String| anyhow!(e))?;
            }
            "timing.seed" => {
                self.timing.seed = if value == "random" {
                    None
                } else {
                    Some(
                        value
                            .parse()
                            .with_context(|| format!("Invalid seed value: {}", value))?,
                    )
                };
            }

            "protocol.deferral" => {
                self.protocol.deferral = value.parse().map_err(|e: String| anyhow!(e))?;
            }

            "simulation.steps" => {
                self.simulation.steps = value
                    .parse()
                    .with_context(|| format!("Invalid steps value: {}", value))?;
            }
            "simulation.min_meals" => {
                self.simulation.min_meals = value
                    .parse()
                    .with_context(|| format!("Invalid min_meals value: {}", value))?;
            }
            "simulation.seed" => {
                self.simulation.seed = value
                    .parse()
                    .with_context(|| format!("Invalid seed value: {}", value))?;
            }
            "simulation.progress_window" => {
                self.simulation.progress_window = value
                    .parse()
                    .with_context(|| format!("Invalid progress_window value: {}", value))?;
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `forkring config show` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| Ok((key.to_string(), self.get(key)?)))
            .collect()
    }
}
