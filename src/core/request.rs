//! Type definitions for the batch request and the filter properties handed to every constraint and cost.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::common::one_or_many;
use crate::core::host_state::HostState;
use crate::core::matrix::{ConstraintMatrix, CostMatrix};
use crate::core::numa::InstanceNumaTopology;
use crate::core::pci::PciRequest;
use crate::core::scheduler::interface::SchedulerContext;

/// Template every instance of the batch is built from.
#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct InstanceType {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub memory_mb: i64,
    #[serde(default)]
    pub root_gb: i64,
    #[serde(default)]
    pub ephemeral_gb: i64,
    #[serde(default)]
    pub swap_mb: i64,
    #[serde(default)]
    pub vcpus: i64,
    #[serde(default)]
    pub numa_topology: Option<InstanceNumaTopology>,
    #[serde(default)]
    pub pci_requests: Vec<PciRequest>,
    #[serde(default)]
    pub extra_specs: BTreeMap<String, String>,
}

impl InstanceType {
    /// Root and ephemeral disk plus swap, in MB.
    pub fn disk_mb(&self) -> i64 {
        1024 * (self.root_gb + self.ephemeral_gb) + self.swap_mb
    }
}

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ImageProperties {
    pub architecture: Option<String>,
    pub hypervisor_type: Option<String>,
    pub vm_mode: Option<String>,
}

impl ImageProperties {
    pub fn is_empty(&self) -> bool {
        self.architecture.is_none() && self.hypervisor_type.is_none() && self.vm_mode.is_none()
    }
}

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RetryInfo {
    pub num_attempts: u32,
    /// (host, node) pairs already tried for this request.
    #[serde(default)]
    pub hosts: Vec<(String, String)>,
}

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SchedulerHints {
    #[serde(default, deserialize_with = "one_or_many")]
    pub same_host: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub different_host: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub same_rack: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub different_rack: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub soft_same_host: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub soft_different_host: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub affinity_networks: Vec<String>,
    #[serde(default)]
    pub max_instances_per_host: Option<u32>,
    /// JSON expression evaluated by the json constraint.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub build_near_host_ip: Option<String>,
    #[serde(default)]
    pub cidr: Option<String>,
}

/// Request as received from the enclosing service.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RequestSpec {
    #[serde(default = "default_num_instances")]
    pub num_instances: usize,
    #[serde(default)]
    pub instance_uuids: Vec<String>,
    #[serde(default)]
    pub instance_type: Option<InstanceType>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub image: ImageProperties,
    #[serde(default)]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub requested_networks: Vec<String>,
}

fn default_num_instances() -> usize {
    1
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self {
            num_instances: 1,
            instance_uuids: Default::default(),
            instance_type: None,
            project_id: None,
            image: Default::default(),
            availability_zone: None,
            requested_networks: Default::default(),
        }
    }
}

/// Running composed matrices published between precedence layers.
/// Both are empty (zero rows) until the composer publishes the first layer.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct SolverCache {
    pub constraint_matrix: ConstraintMatrix,
    pub cost_matrix: CostMatrix,
}

/// Everything a constraint or cost may look at for one batch.
#[derive(Default, Debug, Deserialize, Serialize, Clone)]
pub struct FilterProperties {
    #[serde(skip)]
    pub context: SchedulerContext,
    #[serde(default)]
    pub num_instances: usize,
    #[serde(default)]
    pub instance_uuids: Vec<String>,
    #[serde(default)]
    pub instance_type: Option<InstanceType>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub scheduler_hints: SchedulerHints,
    #[serde(default)]
    pub group_policies: BTreeSet<String>,
    #[serde(default)]
    pub group_hosts: BTreeSet<String>,
    #[serde(default)]
    pub requested_networks: Vec<String>,
    #[serde(default)]
    pub retry: Option<RetryInfo>,
    #[serde(default)]
    pub force_hosts: Vec<String>,
    #[serde(default)]
    pub force_nodes: Vec<String>,
    #[serde(default)]
    pub ignore_hosts: Vec<String>,
    #[serde(default)]
    pub image_properties: ImageProperties,
    #[serde(default)]
    pub availability_zone: Option<String>,
    #[serde(skip)]
    pub solver_cache: SolverCache,
}

impl FilterProperties {
    pub fn new(num_instances: usize) -> Self {
        Self {
            num_instances,
            ..Default::default()
        }
    }

    /// Instance uuids of the batch, with placeholders when the caller did not provide them.
    pub fn instance_uuids_or_placeholders(&self) -> Vec<String> {
        if self.instance_uuids.len() == self.num_instances {
            return self.instance_uuids.clone();
        }
        (0..self.num_instances)
            .map(|idx| format!("(unknown uuid){}", idx))
            .collect()
    }

    /// Every network the new instances will attach to: the request's own networks,
    /// the networks cached for any of the batch instances that already exist, and
    /// the `affinity_networks` hint.
    pub fn all_requested_networks(&self, hosts: &[HostState]) -> BTreeSet<String> {
        let mut networks: BTreeSet<String> = self.requested_networks.iter().cloned().collect();
        for host in hosts {
            for uuid in &self.instance_uuids {
                if let Some(instance) = host.instances.get(uuid) {
                    networks.extend(instance.networks.iter().cloned());
                }
            }
        }
        networks.extend(self.scheduler_hints.affinity_networks.iter().cloned());
        networks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hints_accept_single_uuid_or_list() {
        let hints = serde_yaml::from_str::<SchedulerHints>(
            r#"
            same_host: "uuid-1"
            different_host: ["uuid-2", "uuid-3"]
            max_instances_per_host: 2
            "#,
        )
        .unwrap();
        assert_eq!(hints.same_host, vec!["uuid-1".to_string()]);
        assert_eq!(hints.different_host.len(), 2);
        assert!(hints.soft_same_host.is_empty());
        assert_eq!(hints.max_instances_per_host, Some(2));
    }

    #[test]
    fn test_placeholder_uuids() {
        let mut props = FilterProperties::new(2);
        assert_eq!(
            props.instance_uuids_or_placeholders(),
            vec!["(unknown uuid)0".to_string(), "(unknown uuid)1".to_string()]
        );
        props.instance_uuids = vec!["a".to_string(), "b".to_string()];
        assert_eq!(props.instance_uuids_or_placeholders(), props.instance_uuids);
    }

    #[test]
    fn test_disk_mb_includes_swap() {
        let instance_type = InstanceType {
            root_gb: 10,
            ephemeral_gb: 5,
            swap_mb: 512,
            ..Default::default()
        };
        assert_eq!(instance_type.disk_mb(), 15 * 1024 + 512);
    }
}
