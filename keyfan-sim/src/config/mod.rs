//! Configuration module for keyfan-sim.
//!
//! Handles loading configuration from TOML files and applying CLI
//! overrides.

pub mod file;

use crate::config::file::{FileConfig, WorkloadConfig};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Validated simulation settings.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub orders: usize,
    pub watched_orders: usize,
    pub watchers_per_order: usize,
    pub producers: usize,
    pub updates_per_producer: u64,
    /// `Some` when producers wait for each update to be consumed.
    pub completion_timeout: Option<Duration>,
    pub seed: u64,
    /// `None` disables watcher churn.
    pub resubscribe_after: Option<u64>,
}

/// Overrides taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub seed: Option<u64>,
    pub updates_per_producer: Option<u64>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    overrides: CliOverrides,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, overrides: CliOverrides) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            overrides,
        }
    }

    /// Load and process the configuration.
    ///
    /// A missing file is not an error: the defaults are used instead.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    pub fn load(&self) -> Result<SimConfig, ConfigError> {
        let mut file_config = match std::fs::read_to_string(&self.config_path) {
            Ok(content) => toml::from_str::<FileConfig>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    "Config file {:?} not found, using defaults",
                    self.config_path
                );
                FileConfig::default()
            }
            Err(e) => return Err(e.into()),
        };

        self.apply_overrides(&mut file_config);
        validate(&file_config.workload)?;

        Ok(build_sim_config(file_config))
    }

    fn apply_overrides(&self, config: &mut FileConfig) {
        if let Some(seed) = self.overrides.seed {
            config.workload.seed = seed;
        }
        if let Some(updates) = self.overrides.updates_per_producer {
            config.workload.updates_per_producer = updates;
        }
    }
}

fn validate(workload: &WorkloadConfig) -> Result<(), ConfigError> {
    if workload.orders == 0 {
        return Err(ConfigError::ValidationError(
            "workload.orders must be at least 1".to_string(),
        ));
    }
    if workload.producers == 0 {
        return Err(ConfigError::ValidationError(
            "workload.producers must be at least 1".to_string(),
        ));
    }
    if workload.watched_orders > workload.orders {
        return Err(ConfigError::ValidationError(format!(
            "workload.watched_orders ({}) exceeds workload.orders ({})",
            workload.watched_orders, workload.orders
        )));
    }
    if workload.watched_orders > 0 && workload.watchers_per_order == 0 {
        return Err(ConfigError::ValidationError(
            "workload.watchers_per_order must be at least 1 when orders are watched".to_string(),
        ));
    }
    if workload.await_completion && workload.completion_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "workload.completion_timeout_ms must be non-zero when await_completion is set"
                .to_string(),
        ));
    }
    Ok(())
}

fn build_sim_config(file_config: FileConfig) -> SimConfig {
    let workload = file_config.workload;
    SimConfig {
        orders: workload.orders,
        watched_orders: workload.watched_orders,
        watchers_per_order: workload.watchers_per_order,
        producers: workload.producers,
        updates_per_producer: workload.updates_per_producer,
        completion_timeout: workload
            .await_completion
            .then(|| Duration::from_millis(workload.completion_timeout_ms)),
        seed: workload.seed,
        resubscribe_after: (file_config.watchers.resubscribe_after > 0)
            .then_some(file_config.watchers.resubscribe_after),
    }
}
