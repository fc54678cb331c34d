//! NUMA and PCI passthrough constraints. Both find a host's capacity by consuming
//! the request repeatedly on a private copy of the host until it refuses.

use log::debug;

use crate::core::host_state::HostState;
use crate::core::matrix::ConstraintMatrix;
use crate::core::numa::NumaLimits;
use crate::core::request::FilterProperties;
use crate::core::scheduler::constraints::{matrix_from_capacities, Constraint};
use crate::core::scheduler::interface::PluginError;

pub struct NumaTopologyConstraint {
    limits: NumaLimits,
}

impl NumaTopologyConstraint {
    pub fn new(cpu_allocation_ratio: f64, ram_allocation_ratio: f64) -> Self {
        Self {
            limits: NumaLimits {
                cpu_allocation_ratio,
                ram_allocation_ratio,
            },
        }
    }
}

impl Constraint for NumaTopologyConstraint {
    fn name(&self) -> &str {
        "NumaTopologyConstraint"
    }

    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        let num_instances = filter_properties.num_instances;
        let instance_topology = filter_properties
            .instance_type
            .as_ref()
            .and_then(|instance_type| instance_type.numa_topology.as_ref());
        let Some(instance_topology) = instance_topology else {
            return Ok(ConstraintMatrix::permissive(hosts.len(), num_instances));
        };

        Ok(matrix_from_capacities(hosts, num_instances, |host| {
            if host.numa_topology.is_none() {
                debug!("Host {} has no NUMA topology, rejected", host.host);
                return 0;
            }
            let (count, _) = host.simulate_consumption(num_instances, |copy| {
                match copy.numa_topology.as_mut() {
                    Some(topology) => topology.consume(instance_topology, Some(&self.limits)),
                    None => false,
                }
            });
            if count > 0 {
                host.limits.numa_topology = Some(self.limits);
            }
            debug!("Host {} fits {} NUMA instances", host.host, count);
            count
        }))
    }
}

pub struct PciPassthroughConstraint;

impl Constraint for PciPassthroughConstraint {
    fn name(&self) -> &str {
        "PciPassthroughConstraint"
    }

    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        let num_instances = filter_properties.num_instances;
        let requests = match &filter_properties.instance_type {
            Some(instance_type) if !instance_type.pci_requests.is_empty() => {
                &instance_type.pci_requests
            }
            _ => return Ok(ConstraintMatrix::permissive(hosts.len(), num_instances)),
        };

        Ok(matrix_from_capacities(hosts, num_instances, |host| {
            let (count, _) = host.simulate_consumption(num_instances, |copy| {
                copy.pci_stats.apply_requests(requests)
            });
            count
        }))
    }
}
