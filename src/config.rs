//! Config fields definitions for the solver scheduler

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown constraint {0:?}")]
    UnknownConstraint(String),
    #[error("unknown cost {0:?}")]
    UnknownCost(String),
    #[error("unknown solver engine {0:?}")]
    UnknownSolver(String),
    #[error("malformed metrics weight setting {0:?}, expected name=ratio")]
    MalformedMetricsSetting(String),
    #[error("could not read config file {path:?}: {reason}")]
    Io { path: PathBuf, reason: String },
    #[error("could not parse config: {0}")]
    Parse(String),
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Entries of the form `name=ratio`.
    pub weight_setting: Vec<String>,
    /// Hosts missing a configured metric get `min + (max - min) * multiplier`.
    pub weight_multiplier_of_unavailable: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            weight_setting: Vec::new(),
            weight_multiplier_of_unavailable: -10000.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SolverSchedulerConfig {
    /// Solver engine name; a dotted or `::` path resolves by its last segment.
    pub scheduler_host_solver: String,
    pub scheduler_solver_costs: Vec<String>,
    pub scheduler_solver_constraints: Vec<String>,
    pub scheduler_max_attempts: u32,

    pub ram_allocation_ratio: f64,
    pub disk_allocation_ratio: f64,
    pub cpu_allocation_ratio: f64,

    pub max_instances_per_host: u32,
    pub max_io_ops_per_host: u32,
    pub max_networks_per_host: usize,
    pub max_networks_per_rack: usize,
    pub max_racks_per_tenant: usize,

    pub ram_cost_multiplier: f64,
    pub vcpu_cost_multiplier: f64,
    pub io_ops_cost_multiplier: f64,
    pub metrics_cost_multiplier: f64,
    pub affinity_cost_multiplier: f64,
    pub anti_affinity_cost_multiplier: f64,
    pub tenant_rack_affinity_cost_multiplier: f64,
    pub rack_network_affinity_cost_multiplier: f64,

    pub pulp_solver_timeout_seconds: u64,

    pub rack_config: Option<PathBuf>,
    pub rack_config_prefix: String,

    pub default_availability_zone: String,

    pub metrics: MetricsConfig,
}

impl Default for SolverSchedulerConfig {
    fn default() -> Self {
        Self {
            scheduler_host_solver: "FastSolver".to_string(),
            scheduler_solver_costs: vec!["RamCost".to_string()],
            scheduler_solver_constraints: vec!["ActiveHostsConstraint".to_string()],
            scheduler_max_attempts: 3,
            ram_allocation_ratio: 1.5,
            disk_allocation_ratio: 1.0,
            cpu_allocation_ratio: 16.0,
            max_instances_per_host: 50,
            max_io_ops_per_host: 8,
            max_networks_per_host: 4094,
            max_networks_per_rack: 4094,
            max_racks_per_tenant: 1,
            ram_cost_multiplier: 1.0,
            vcpu_cost_multiplier: 1.0,
            io_ops_cost_multiplier: 1.0,
            metrics_cost_multiplier: 1.0,
            affinity_cost_multiplier: 1.0,
            anti_affinity_cost_multiplier: 1.0,
            tenant_rack_affinity_cost_multiplier: 1.0,
            rack_network_affinity_cost_multiplier: 1.0,
            pulp_solver_timeout_seconds: 20,
            rack_config: None,
            rack_config_prefix: String::new(),
            default_availability_zone: "nova".to_string(),
            metrics: Default::default(),
        }
    }
}

impl SolverSchedulerConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str::<SolverSchedulerConfig>(yaml)
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Self::from_yaml_str(&yaml)
    }
}
