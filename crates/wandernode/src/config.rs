use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use wandermesh_network::SimulationConfig;
use wandermesh_protocol::{TransportKind, MAX_CLONES};
use wandermesh_routing::{
    CloneConfig, EngineConfig, ScorerConfig, ServiceConfig, DEFAULT_DISCOVERY_INTERVAL_SECS,
    DEFAULT_FAILURE_WINDOW_SECS, DEFAULT_MEMORY_CLEAR_INTERVAL_SECS, DEFAULT_QUEUE_CAPACITY,
};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub routing: RoutingConfig,
    pub scoring: ScoringConfig,
    pub cloning: CloningConfig,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,

    #[serde(skip)]
    config_file_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Prefix for simulated node ids ("DEVICE" gives DEVICE_00, DEVICE_01, ...)
    pub name_prefix: String,
    /// Number of nodes in the in-process simulation
    pub simulated_nodes: usize,
    /// Most message ids remembered for delivery deduplication
    #[serde(default = "default_dedup_capacity")]
    pub delivery_dedup_capacity: usize,
    /// How long a delivered id suppresses later copies
    #[serde(default = "default_dedup_window_secs")]
    pub delivery_dedup_window_secs: u64,
}

fn default_dedup_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_dedup_window_secs() -> u64 {
    DEFAULT_MEMORY_CLEAR_INTERVAL_SECS
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name_prefix: "DEVICE".to_string(),
            simulated_nodes: 4,
            delivery_dedup_capacity: default_dedup_capacity(),
            delivery_dedup_window_secs: default_dedup_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub discovery_interval_ms: u64,
    pub process_interval_ms: u64,
    pub max_turns_per_tick: usize,
    pub memory_clear_interval_secs: u64,
    pub queue_capacity: usize,
    /// Transport kinds probed by discovery
    pub transports: Vec<TransportKind>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            discovery_interval_ms: DEFAULT_DISCOVERY_INTERVAL_SECS * 1000,
            process_interval_ms: 100,
            max_turns_per_tick: 32,
            memory_clear_interval_secs: DEFAULT_MEMORY_CLEAR_INTERVAL_SECS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            transports: TransportKind::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub learning_step: f64,
    pub max_discount: f64,
    pub failure_penalty: f64,
    pub failure_window_secs: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            learning_step: 0.1,
            max_discount: 0.5,
            failure_penalty: 2.0,
            failure_window_secs: DEFAULT_FAILURE_WINDOW_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloningConfig {
    pub max_clones: u8,
    pub ttl_reduction: u32,
    pub ttl_floor: u32,
}

impl Default for CloningConfig {
    fn default() -> Self {
        let defaults = CloneConfig::default();
        Self {
            max_clones: defaults.max_clones,
            ttl_reduction: defaults.ttl_reduction,
            ttl_floor: defaults.ttl_floor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub simulation: SimulationConfig,
    /// Add a long-range shortcut every N nodes of the chain (0 disables)
    #[serde(default = "default_shortcut_every")]
    pub shortcut_every: usize,
}

fn default_shortcut_every() -> usize {
    3
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            shortcut_every: default_shortcut_every(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(Self::default_config_path);

        if !config_path.exists() {
            anyhow::bail!(
                "Configuration file not found: {}\nRun with --init to create a new configuration",
                config_path.display()
            );
        }

        let contents =
            fs::read_to_string(&config_path).context("Failed to read configuration file")?;

        let mut config: Config =
            serde_yaml::from_str(&contents).context("Failed to parse configuration file")?;

        config.validate()?;
        config.config_file_path = config_path;

        Ok(config)
    }

    /// Write a default configuration and return it
    pub fn create_default(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(Self::default_config_path);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }

        let config = Config {
            config_file_path: config_path,
            ..Config::default()
        };
        config.save()?;

        Ok(config)
    }

    /// Save to the file this configuration was loaded from or created at
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize configuration")?;
        fs::write(&self.config_file_path, yaml).with_context(|| {
            format!(
                "Failed to write configuration file {}",
                self.config_file_path.display()
            )
        })?;
        Ok(())
    }

    /// Reject values the routing core cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.routing.queue_capacity == 0 {
            anyhow::bail!("routing.queue_capacity must be at least 1");
        }
        if self.routing.process_interval_ms == 0 || self.routing.discovery_interval_ms == 0 {
            anyhow::bail!("routing intervals must be greater than zero");
        }
        if self.routing.memory_clear_interval_secs == 0 {
            anyhow::bail!("routing.memory_clear_interval_secs must be greater than zero");
        }
        if self.node.delivery_dedup_capacity == 0 {
            anyhow::bail!("node.delivery_dedup_capacity must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.scoring.max_discount) {
            anyhow::bail!("scoring.max_discount must be within [0, 1]");
        }
        if !self.scoring.learning_step.is_finite() || self.scoring.learning_step < 0.0 {
            anyhow::bail!("scoring.learning_step must be finite and non-negative");
        }
        if !self.scoring.failure_penalty.is_finite() || self.scoring.failure_penalty < 1.0 {
            anyhow::bail!("scoring.failure_penalty must be finite and at least 1");
        }
        if self.cloning.max_clones > MAX_CLONES {
            anyhow::bail!("cloning.max_clones must not exceed {}", MAX_CLONES);
        }
        if self.cloning.ttl_floor == 0 {
            anyhow::bail!("cloning.ttl_floor must be at least 1");
        }
        self.network
            .simulation
            .validate()
            .context("Invalid network.simulation section")?;
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_file_path
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            queue_capacity: self.routing.queue_capacity,
            scorer: ScorerConfig {
                learning_step: self.scoring.learning_step,
                max_discount: self.scoring.max_discount,
                failure_penalty: self.scoring.failure_penalty,
                failure_window: Duration::from_secs(self.scoring.failure_window_secs),
            },
            cloning: CloneConfig {
                max_clones: self.cloning.max_clones,
                ttl_reduction: self.cloning.ttl_reduction,
                ttl_floor: self.cloning.ttl_floor,
            },
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            discovery_interval: Duration::from_millis(self.routing.discovery_interval_ms),
            process_interval: Duration::from_millis(self.routing.process_interval_ms),
            max_turns_per_tick: self.routing.max_turns_per_tick,
            memory_clear_interval: Duration::from_secs(self.routing.memory_clear_interval_secs),
        }
    }

    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wandernode")
            .join("config.yaml")
    }
}
