//! Hard affinity rules: same/different host, same/different rack and server groups.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, warn};

use crate::core::host_state::HostState;
use crate::core::matrix::ConstraintMatrix;
use crate::core::request::FilterProperties;
use crate::core::scheduler::constraints::Constraint;
use crate::core::scheduler::interface::{LookupError, PluginError};
use crate::core::topology::RackTopology;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AffinityPolicy {
    Same,
    Different,
}

impl AffinityPolicy {
    fn accepts(self, in_affinity_set: bool) -> bool {
        match self {
            AffinityPolicy::Same => in_affinity_set,
            AffinityPolicy::Different => !in_affinity_set,
        }
    }
}

/// Hosts currently running any of `uuids`; `None` when the lookup backend fails.
fn resolve_affinity_hosts(
    constraint: &str,
    hosts: &[HostState],
    filter_properties: &FilterProperties,
    uuids: &[String],
) -> Option<BTreeSet<String>> {
    match filter_properties
        .context
        .instance_locator
        .hosts_for_instances(hosts, uuids)
    {
        Ok(affinity_hosts) => Some(affinity_hosts),
        Err(LookupError::InstanceNotFound(uuids)) => {
            debug!("{}: no host runs {}", constraint, uuids);
            Some(BTreeSet::new())
        }
        Err(err) => {
            warn!("{}: {}, all hosts are rejected", constraint, err);
            None
        }
    }
}

pub struct HostAffinityConstraint {
    policy: AffinityPolicy,
}

impl HostAffinityConstraint {
    pub fn same_host() -> Self {
        Self {
            policy: AffinityPolicy::Same,
        }
    }

    pub fn different_host() -> Self {
        Self {
            policy: AffinityPolicy::Different,
        }
    }

    fn hint<'a>(&self, filter_properties: &'a FilterProperties) -> &'a [String] {
        let hints = &filter_properties.scheduler_hints;
        match self.policy {
            AffinityPolicy::Same => &hints.same_host,
            AffinityPolicy::Different => &hints.different_host,
        }
    }
}

impl Constraint for HostAffinityConstraint {
    fn name(&self) -> &str {
        match self.policy {
            AffinityPolicy::Same => "SameHostConstraint",
            AffinityPolicy::Different => "DifferentHostConstraint",
        }
    }

    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        let mut matrix = ConstraintMatrix::permissive(hosts.len(), filter_properties.num_instances);
        let uuids = self.hint(filter_properties);
        if uuids.is_empty() {
            return Ok(matrix);
        }
        let Some(affinity_hosts) = resolve_affinity_hosts(self.name(), hosts, filter_properties, uuids)
        else {
            return Ok(ConstraintMatrix::filled(hosts.len(), filter_properties.num_instances, false));
        };
        for (idx, host) in hosts.iter().enumerate() {
            matrix.set_row_all(idx, self.policy.accepts(affinity_hosts.contains(&host.host)));
        }
        Ok(matrix)
    }
}

/// Rack-level affinity. Hosts without rack information fall back to host-level affinity.
pub struct RackAffinityConstraint {
    policy: AffinityPolicy,
    topology: Arc<RackTopology>,
}

impl RackAffinityConstraint {
    pub fn same_rack(topology: Arc<RackTopology>) -> Self {
        Self {
            policy: AffinityPolicy::Same,
            topology,
        }
    }

    pub fn different_rack(topology: Arc<RackTopology>) -> Self {
        Self {
            policy: AffinityPolicy::Different,
            topology,
        }
    }

    fn hint<'a>(&self, filter_properties: &'a FilterProperties) -> &'a [String] {
        let hints = &filter_properties.scheduler_hints;
        match self.policy {
            AffinityPolicy::Same => &hints.same_rack,
            AffinityPolicy::Different => &hints.different_rack,
        }
    }
}

impl Constraint for RackAffinityConstraint {
    fn name(&self) -> &str {
        match self.policy {
            AffinityPolicy::Same => "SameRackConstraint",
            AffinityPolicy::Different => "DifferentRackConstraint",
        }
    }

    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        let mut matrix = ConstraintMatrix::permissive(hosts.len(), filter_properties.num_instances);
        let uuids = self.hint(filter_properties);
        if uuids.is_empty() {
            return Ok(matrix);
        }
        let Some(affinity_hosts) = resolve_affinity_hosts(self.name(), hosts, filter_properties, uuids)
        else {
            return Ok(ConstraintMatrix::filled(hosts.len(), filter_properties.num_instances, false));
        };

        let host_racks = self.topology.host_racks_map(hosts);
        let affinity_racks: BTreeSet<&String> = affinity_hosts
            .iter()
            .filter_map(|host| host_racks.get(host))
            .flatten()
            .collect();

        for (idx, host) in hosts.iter().enumerate() {
            let in_affinity_set = match host_racks.get(&host.host) {
                Some(racks) => racks.iter().any(|rack| affinity_racks.contains(rack)),
                None => affinity_hosts.contains(&host.host),
            };
            matrix.set_row_all(idx, self.policy.accepts(in_affinity_set));
        }
        Ok(matrix)
    }
}

pub struct ServerGroupAffinityConstraint;

impl Constraint for ServerGroupAffinityConstraint {
    fn name(&self) -> &str {
        "ServerGroupAffinityConstraint"
    }

    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        let num_instances = filter_properties.num_instances;
        let mut matrix = ConstraintMatrix::permissive(hosts.len(), num_instances);
        if !filter_properties.group_policies.contains("affinity") {
            return Ok(matrix);
        }
        let group_hosts = &filter_properties.group_hosts;
        for (idx, host) in hosts.iter().enumerate() {
            if group_hosts.is_empty() {
                // New group: one host has to take the whole batch.
                let row = matrix.row_mut(idx);
                row.fill(false);
                if let Some(last) = row.last_mut() {
                    *last = true;
                }
            } else {
                matrix.set_row_all(idx, group_hosts.contains(&host.host));
            }
        }
        Ok(matrix)
    }
}

pub struct ServerGroupAntiAffinityConstraint;

impl Constraint for ServerGroupAntiAffinityConstraint {
    fn name(&self) -> &str {
        "ServerGroupAntiAffinityConstraint"
    }

    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        let mut matrix = ConstraintMatrix::permissive(hosts.len(), filter_properties.num_instances);
        if !filter_properties.group_policies.contains("anti-affinity") {
            return Ok(matrix);
        }
        for (idx, host) in hosts.iter().enumerate() {
            if filter_properties.group_hosts.contains(&host.host) {
                matrix.set_row_all(idx, false);
            } else {
                matrix.set_row_capacity(idx, 1);
            }
        }
        Ok(matrix)
    }
}
