//! Rack-level preferences: keep a tenant, or a set of networks, within the racks already using them.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::core::host_state::HostState;
use crate::core::matrix::CostMatrix;
use crate::core::request::FilterProperties;
use crate::core::scheduler::costs::{extended_matrix_from_fn, Cost};
use crate::core::scheduler::interface::PluginError;
use crate::core::topology::{racks_or_host, RackTopology};

/// Zero rows for hosts sharing a rack with any host accepted by `preferred`, ones elsewhere.
fn rack_preference_matrix<F>(
    topology: &RackTopology,
    hosts: &[HostState],
    num_instances: usize,
    preferred: F,
) -> CostMatrix
where
    F: Fn(&HostState) -> bool,
{
    let host_racks = topology.host_racks_map(hosts);
    let racks_per_host: Vec<BTreeSet<String>> = hosts
        .iter()
        .map(|host| racks_or_host(&host_racks, &host.host))
        .collect();
    let preferred_racks: BTreeSet<&String> = hosts
        .iter()
        .zip(&racks_per_host)
        .filter(|&(host, _)| preferred(host))
        .flat_map(|(_, racks)| racks)
        .collect();
    extended_matrix_from_fn(hosts.len(), num_instances, |idx, _| {
        if racks_per_host[idx].iter().any(|rack| preferred_racks.contains(rack)) {
            0.0
        } else {
            1.0
        }
    })
}

pub struct TenantRackAffinityCost {
    multiplier: f64,
    topology: Arc<RackTopology>,
}

impl TenantRackAffinityCost {
    pub fn new(multiplier: f64, topology: Arc<RackTopology>) -> Self {
        Self {
            multiplier,
            topology,
        }
    }
}

impl Cost for TenantRackAffinityCost {
    fn name(&self) -> &str {
        "TenantRackAffinityCost"
    }

    fn cost_multiplier(&self) -> f64 {
        self.multiplier
    }

    fn get_extended_cost_matrix(
        &self,
        hosts: &[HostState],
        filter_properties: &FilterProperties,
    ) -> Result<CostMatrix, PluginError> {
        let num_instances = filter_properties.num_instances;
        let Some(project_id) = filter_properties.project_id.as_ref() else {
            return Ok(CostMatrix::zeros(hosts.len(), num_instances + 1));
        };
        Ok(rack_preference_matrix(&self.topology, hosts, num_instances, |host| {
            host.projects.contains(project_id)
        }))
    }
}

pub struct RackNetworkAffinityCost {
    multiplier: f64,
    topology: Arc<RackTopology>,
}

impl RackNetworkAffinityCost {
    pub fn new(multiplier: f64, topology: Arc<RackTopology>) -> Self {
        Self {
            multiplier,
            topology,
        }
    }
}

impl Cost for RackNetworkAffinityCost {
    fn name(&self) -> &str {
        "RackNetworkAffinityCost"
    }

    fn cost_multiplier(&self) -> f64 {
        self.multiplier
    }

    fn get_extended_cost_matrix(
        &self,
        hosts: &[HostState],
        filter_properties: &FilterProperties,
    ) -> Result<CostMatrix, PluginError> {
        let num_instances = filter_properties.num_instances;
        let networks = filter_properties.all_requested_networks(hosts);
        if networks.is_empty() {
            return Ok(CostMatrix::zeros(hosts.len(), num_instances + 1));
        }
        Ok(rack_preference_matrix(&self.topology, hosts, num_instances, |host| {
            host.instances
                .values()
                .flat_map(|instance| &instance.networks)
                .any(|network| networks.contains(network))
        }))
    }
}
