//! Snapshot of one candidate host-node pair as seen by the solver.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::common::Aggregate;
use crate::core::numa::{HostNumaTopology, NumaLimits};
use crate::core::pci::PciStats;
use crate::core::request::InstanceType;

/// Oversubscription ceilings written by constraints and read later by the claim on the compute host.
#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HostLimits {
    pub memory_mb: Option<f64>,
    pub disk_gb: Option<f64>,
    pub vcpu: Option<f64>,
    pub numa_topology: Option<NumaLimits>,
}

/// Instance already running on a host.
#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct InstanceInfo {
    pub uuid: String,
    #[serde(default)]
    pub project_id: String,
    /// Network ids from the instance's network info cache.
    #[serde(default)]
    pub networks: Vec<String>,
}

/// Architecture / hypervisor / vm mode triple a host can run.
#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SupportedInstance {
    pub architecture: String,
    pub hypervisor_type: String,
    pub vm_mode: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConsumeError {
    #[error("instance NUMA topology does not fit host {0}")]
    NumaTopology(String),
    #[error("host {0} has no NUMA topology")]
    NoNumaTopology(String),
    #[error("PCI requests cannot be satisfied on host {0}")]
    PciDevices(String),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HostState {
    pub host: String,
    pub nodename: String,

    pub total_ram_mb: i64,
    pub free_ram_mb: i64,
    pub total_usable_disk_gb: i64,
    pub free_disk_mb: i64,
    pub vcpus_total: i64,
    #[serde(default)]
    pub vcpus_used: i64,
    #[serde(default)]
    pub num_io_ops: u32,
    #[serde(default)]
    pub num_instances: u32,

    #[serde(default)]
    pub numa_topology: Option<HostNumaTopology>,
    #[serde(default)]
    pub pci_stats: PciStats,

    /// Tenants that ever had an instance scheduled here.
    #[serde(default)]
    pub projects: BTreeSet<String>,
    /// Networks attached to the host.
    #[serde(default)]
    pub networks: BTreeSet<String>,
    /// Racks tagged directly on the host snapshot, in addition to the `rack` aggregate key.
    #[serde(default)]
    pub racks: BTreeSet<String>,
    #[serde(default)]
    pub aggregates: Vec<Aggregate>,
    #[serde(default)]
    pub instances: BTreeMap<String, InstanceInfo>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,

    #[serde(default)]
    pub limits: HostLimits,

    #[serde(default = "default_service_up")]
    pub service_up: bool,
    #[serde(default)]
    pub service_disabled: bool,
    #[serde(default)]
    pub host_ip: Option<String>,
    #[serde(default)]
    pub supported_instances: Vec<SupportedInstance>,
    /// Trust level reported by the attestation service.
    #[serde(default)]
    pub trust_level: Option<String>,
}

fn default_service_up() -> bool {
    true
}

impl HostState {
    pub fn new(host: &str, nodename: &str) -> Self {
        Self {
            host: host.to_string(),
            nodename: nodename.to_string(),
            total_ram_mb: 0,
            free_ram_mb: 0,
            total_usable_disk_gb: 0,
            free_disk_mb: 0,
            vcpus_total: 0,
            vcpus_used: 0,
            num_io_ops: 0,
            num_instances: 0,
            numa_topology: None,
            pci_stats: Default::default(),
            projects: Default::default(),
            networks: Default::default(),
            racks: Default::default(),
            aggregates: Default::default(),
            instances: Default::default(),
            metrics: Default::default(),
            limits: Default::default(),
            service_up: true,
            service_disabled: false,
            host_ip: None,
            supported_instances: Default::default(),
            trust_level: None,
        }
    }

    pub fn free_vcpus(&self) -> i64 {
        self.vcpus_total - self.vcpus_used
    }

    pub fn used_ram_mb(&self) -> i64 {
        self.total_ram_mb - self.free_ram_mb
    }

    pub fn used_disk_mb(&self) -> i64 {
        self.total_usable_disk_gb * 1024 - self.free_disk_mb
    }

    /// Accounts `instance`, of type `instance_type`, as running on this host.
    ///
    /// NUMA and PCI checks happen before any counter is touched, so a refused
    /// consumption leaves the host unchanged.
    pub fn consume(
        &mut self,
        instance_type: &InstanceType,
        instance: InstanceInfo,
    ) -> Result<(), ConsumeError> {
        let mut numa_topology = self.numa_topology.clone();
        if let Some(instance_numa) = &instance_type.numa_topology {
            let host_numa = numa_topology
                .as_mut()
                .ok_or_else(|| ConsumeError::NoNumaTopology(self.host.clone()))?;
            if !host_numa.consume(instance_numa, self.limits.numa_topology.as_ref()) {
                return Err(ConsumeError::NumaTopology(self.host.clone()));
            }
        }

        let mut pci_stats = self.pci_stats.clone();
        if !instance_type.pci_requests.is_empty()
            && !pci_stats.apply_requests(&instance_type.pci_requests)
        {
            return Err(ConsumeError::PciDevices(self.host.clone()));
        }

        self.numa_topology = numa_topology;
        self.pci_stats = pci_stats;
        self.free_ram_mb -= instance_type.memory_mb;
        self.free_disk_mb -= instance_type.disk_mb();
        self.vcpus_used += instance_type.vcpus;
        self.num_io_ops += 1;
        self.num_instances += 1;
        self.record_instance(instance);
        Ok(())
    }

    /// Records tenancy and network attachment of an instance, without touching the counters.
    pub fn record_instance(&mut self, instance: InstanceInfo) {
        if !instance.project_id.is_empty() {
            self.projects.insert(instance.project_id.clone());
        }
        self.networks.extend(instance.networks.iter().cloned());
        self.instances.insert(instance.uuid.clone(), instance);
    }

    /// Runs `step` on a private copy of this host until it refuses or `max` steps succeeded.
    /// Returns the number of successful steps and the copy in its final state.
    pub fn simulate_consumption<F>(&self, max: usize, mut step: F) -> (usize, HostState)
    where
        F: FnMut(&mut HostState) -> bool,
    {
        let mut copy = self.clone();
        let mut count = 0;
        while count < max && step(&mut copy) {
            count += 1;
        }
        (count, copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::numa::{HostNumaCell, InstanceNumaCell, InstanceNumaTopology};

    fn numa_host() -> HostState {
        let mut host = HostState::new("host1", "node1");
        host.total_ram_mb = 8192;
        host.free_ram_mb = 8192;
        host.vcpus_total = 8;
        host.numa_topology = Some(HostNumaTopology {
            cells: vec![HostNumaCell {
                id: 0,
                cpus: 4,
                memory_mb: 4096,
                cpu_usage: 0,
                memory_usage: 0,
            }],
        });
        host
    }

    fn numa_instance() -> InstanceType {
        InstanceType {
            memory_mb: 2048,
            vcpus: 2,
            numa_topology: Some(InstanceNumaTopology {
                cells: vec![InstanceNumaCell {
                    cpus: 2,
                    memory_mb: 2048,
                }],
            }),
            ..Default::default()
        }
    }

    fn instance_info(uuid: &str) -> InstanceInfo {
        InstanceInfo {
            uuid: uuid.to_string(),
            project_id: "tenant".to_string(),
            networks: vec!["net1".to_string()],
        }
    }

    #[test]
    fn test_consume_updates_counters_and_tenancy() {
        let mut host = numa_host();
        host.consume(&numa_instance(), instance_info("uuid-1")).unwrap();
        assert_eq!(host.free_ram_mb, 6144);
        assert_eq!(host.vcpus_used, 2);
        assert_eq!(host.num_instances, 1);
        assert_eq!(host.num_io_ops, 1);
        assert_eq!(host.numa_topology.as_ref().unwrap().cells[0].cpu_usage, 2);
        assert_eq!(host.projects, BTreeSet::from(["tenant".to_string()]));
        assert_eq!(host.networks, BTreeSet::from(["net1".to_string()]));
        assert!(host.instances.contains_key("uuid-1"));
    }

    #[test]
    fn test_refused_consume_leaves_host_untouched() {
        let mut host = numa_host();
        host.consume(&numa_instance(), instance_info("uuid-1")).unwrap();
        host.consume(&numa_instance(), instance_info("uuid-2")).unwrap();
        let before = host.clone();
        assert_eq!(
            host.consume(&numa_instance(), instance_info("uuid-3")),
            Err(ConsumeError::NumaTopology("host1".to_string()))
        );
        assert_eq!(host, before);
    }

    #[test]
    fn test_simulation_does_not_leak_into_shared_host() {
        let host = numa_host();
        let instance = numa_instance();
        let (count, copy) = host.simulate_consumption(5, |h| {
            h.consume(&instance, InstanceInfo::default()).is_ok()
        });
        assert_eq!(count, 2);
        assert_eq!(copy.num_instances, 2);
        assert_eq!(host.num_instances, 0);
        assert_eq!(host.numa_topology.as_ref().unwrap().cells[0].cpu_usage, 0);
    }
}
