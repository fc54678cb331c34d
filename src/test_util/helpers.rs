use std::sync::{Arc, Mutex};

use crate::config::SolverSchedulerConfig;
use crate::core::host_state::HostState;
use crate::core::matrix::{ConstraintMatrix, CostMatrix};
use crate::core::request::FilterProperties;
use crate::core::scheduler::constraints::Constraint;
use crate::core::scheduler::costs::Cost;
use crate::core::scheduler::interface::PluginError;

pub fn create_host(
    name: &str,
    total_ram_mb: i64,
    free_ram_mb: i64,
    vcpus_total: i64,
    vcpus_used: i64,
) -> HostState {
    let mut host = HostState::new(name, name);
    host.total_ram_mb = total_ram_mb;
    host.free_ram_mb = free_ram_mb;
    host.vcpus_total = vcpus_total;
    host.vcpus_used = vcpus_used;
    host.total_usable_disk_gb = 100;
    host.free_disk_mb = 100 * 1024;
    host
}

/// `h1..=hN` with plenty of room.
pub fn create_hosts(count: usize) -> Vec<HostState> {
    (1..=count)
        .map(|idx| create_host(&format!("h{}", idx), 8192, 8192, 8, 0))
        .collect()
}

pub fn default_test_config() -> SolverSchedulerConfig {
    default_test_config_with(None)
}

/// Test config; keys in `with_suffix` override the defaults.
pub fn default_test_config_with(with_suffix: Option<&str>) -> SolverSchedulerConfig {
    let default = r#"
    scheduler_host_solver: FastSolver
    scheduler_solver_constraints: ["ActiveHostsConstraint"]
    scheduler_solver_costs: ["RamCost"]
    ram_allocation_ratio: 1.0
    disk_allocation_ratio: 1.0
    cpu_allocation_ratio: 1.0
    pulp_solver_timeout_seconds: 20
    "#;

    let mut merged = serde_yaml::from_str::<serde_yaml::Mapping>(default).unwrap();
    if let Some(suffix) = with_suffix.filter(|suffix| !suffix.trim().is_empty()) {
        let overrides = serde_yaml::from_str::<serde_yaml::Mapping>(suffix).unwrap();
        for (key, value) in overrides {
            merged.insert(key, value);
        }
    }

    serde_yaml::from_value::<SolverSchedulerConfig>(serde_yaml::Value::Mapping(merged)).unwrap()
}

/// Constraint returning a fixed matrix, or failing. Records the solver cache it was given.
pub struct FixedConstraint {
    rows: Option<Vec<Vec<bool>>>,
    precedence: u32,
    seen: Arc<Mutex<Option<ConstraintMatrix>>>,
}

impl FixedConstraint {
    pub fn from_rows(rows: Vec<Vec<bool>>) -> Self {
        Self {
            rows: Some(rows),
            precedence: 0,
            seen: Default::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            rows: None,
            precedence: 0,
            seen: Default::default(),
        }
    }

    pub fn with_precedence(mut self, precedence: u32) -> Self {
        self.precedence = precedence;
        self
    }

    /// Solver cache constraint matrix seen by the last call.
    pub fn seen_cache(&self) -> Arc<Mutex<Option<ConstraintMatrix>>> {
        self.seen.clone()
    }
}

impl Constraint for FixedConstraint {
    fn name(&self) -> &str {
        "FixedConstraint"
    }

    fn precedence(&self) -> u32 {
        self.precedence
    }

    fn get_constraint_matrix(
        &self,
        _hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        *self.seen.lock().unwrap() = Some(filter_properties.solver_cache.constraint_matrix.clone());
        self.rows
            .clone()
            .and_then(ConstraintMatrix::from_rows)
            .ok_or_else(|| PluginError::InvalidInput("fixed constraint failure".to_string()))
    }
}

/// Cost returning a fixed extended matrix, or failing. Records the solver cache it was given.
pub struct FixedCost {
    rows: Option<Vec<Vec<f64>>>,
    multiplier: f64,
    precedence: u32,
    seen: Arc<Mutex<Option<CostMatrix>>>,
}

impl FixedCost {
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        Self {
            rows: Some(rows),
            multiplier: 1.0,
            precedence: 0,
            seen: Default::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            rows: None,
            multiplier: 1.0,
            precedence: 0,
            seen: Default::default(),
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_precedence(mut self, precedence: u32) -> Self {
        self.precedence = precedence;
        self
    }

    /// Solver cache cost matrix seen by the last call.
    pub fn seen_cache(&self) -> Arc<Mutex<Option<CostMatrix>>> {
        self.seen.clone()
    }
}

impl Cost for FixedCost {
    fn name(&self) -> &str {
        "FixedCost"
    }

    fn precedence(&self) -> u32 {
        self.precedence
    }

    fn cost_multiplier(&self) -> f64 {
        self.multiplier
    }

    fn get_extended_cost_matrix(
        &self,
        _hosts: &[HostState],
        filter_properties: &FilterProperties,
    ) -> Result<CostMatrix, PluginError> {
        *self.seen.lock().unwrap() = Some(filter_properties.solver_cache.cost_matrix.clone());
        self.rows
            .clone()
            .and_then(CostMatrix::from_rows)
            .ok_or_else(|| PluginError::InvalidInput("fixed cost failure".to_string()))
    }
}
