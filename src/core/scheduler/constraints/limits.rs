//! Count limits per host: concurrent I/O operations, instances and attached networks.

use std::collections::BTreeSet;

use crate::core::host_state::HostState;
use crate::core::matrix::ConstraintMatrix;
use crate::core::request::FilterProperties;
use crate::core::scheduler::constraints::{matrix_from_capacities, Constraint};
use crate::core::scheduler::interface::PluginError;

pub struct IoOpsConstraint {
    max_io_ops_per_host: u32,
}

impl IoOpsConstraint {
    pub fn new(max_io_ops_per_host: u32) -> Self {
        Self { max_io_ops_per_host }
    }
}

impl Constraint for IoOpsConstraint {
    fn name(&self) -> &str {
        "IoOpsConstraint"
    }

    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        Ok(matrix_from_capacities(hosts, filter_properties.num_instances, |host| {
            self.max_io_ops_per_host.saturating_sub(host.num_io_ops) as usize
        }))
    }
}

/// Caps instances per host; the `max_instances_per_host` hint overrides the configured value.
pub struct NumInstancesConstraint {
    max_instances_per_host: u32,
}

impl NumInstancesConstraint {
    pub fn new(max_instances_per_host: u32) -> Self {
        Self {
            max_instances_per_host,
        }
    }
}

impl Constraint for NumInstancesConstraint {
    fn name(&self) -> &str {
        "NumInstancesConstraint"
    }

    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        let max_instances = filter_properties
            .scheduler_hints
            .max_instances_per_host
            .unwrap_or(self.max_instances_per_host);
        Ok(matrix_from_capacities(hosts, filter_properties.num_instances, |host| {
            max_instances.saturating_sub(host.num_instances) as usize
        }))
    }
}

/// Rejects hosts that would end up attached to more than `max_networks_per_host` networks.
pub struct NumNetworksConstraint {
    max_networks_per_host: usize,
}

impl NumNetworksConstraint {
    pub fn new(max_networks_per_host: usize) -> Self {
        Self {
            max_networks_per_host,
        }
    }
}

impl Constraint for NumNetworksConstraint {
    fn name(&self) -> &str {
        "NumNetworksConstraint"
    }

    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        let requested: BTreeSet<&String> = filter_properties.requested_networks.iter().collect();
        let num_instances = filter_properties.num_instances;
        Ok(matrix_from_capacities(hosts, num_instances, |host| {
            let new_networks = requested
                .iter()
                .filter(|network| !host.networks.contains(network.as_str()))
                .count();
            if host.networks.len() + new_networks <= self.max_networks_per_host {
                num_instances
            } else {
                0
            }
        }))
    }
}
