//! Capacity constraints for RAM, disk and vCPUs, with fixed or aggregate-provided
//! allocation ratios, and their "exact fit" variants.

use log::warn;

use crate::core::host_state::HostState;
use crate::core::matrix::ConstraintMatrix;
use crate::core::request::FilterProperties;
use crate::core::scheduler::constraints::{
    matrix_from_capacities, requested_instance_type, whole_instances, Constraint,
};
use crate::core::scheduler::interface::PluginError;
use crate::core::topology::{aggregate_values_from_key, validate_num_values};

/// Where an oversubscription ratio comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AllocationRatio {
    Fixed(f64),
    /// Minimum of the aggregate metadata values under `key`, or `default` without any.
    Aggregate { key: &'static str, default: f64 },
}

impl AllocationRatio {
    pub fn for_host(&self, host: &HostState) -> f64 {
        match *self {
            AllocationRatio::Fixed(ratio) => ratio,
            AllocationRatio::Aggregate { key, default } => {
                validate_num_values(&aggregate_values_from_key(host, key), default)
            }
        }
    }
}

pub struct RamConstraint {
    name: &'static str,
    ratio: AllocationRatio,
}

impl RamConstraint {
    pub fn new(ram_allocation_ratio: f64) -> Self {
        Self {
            name: "RamConstraint",
            ratio: AllocationRatio::Fixed(ram_allocation_ratio),
        }
    }

    pub fn from_aggregates(default_ratio: f64) -> Self {
        Self {
            name: "AggregateRamConstraint",
            ratio: AllocationRatio::Aggregate {
                key: "ram_allocation_ratio",
                default: default_ratio,
            },
        }
    }
}

impl Constraint for RamConstraint {
    fn name(&self) -> &str {
        self.name
    }

    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        let num_instances = filter_properties.num_instances;
        let Some(instance_type) = requested_instance_type(self.name, filter_properties) else {
            return Ok(ConstraintMatrix::permissive(hosts.len(), num_instances));
        };
        let requested = instance_type.memory_mb;
        if requested <= 0 {
            warn!("{}: requested RAM is {} MB, constraint skipped", self.name, requested);
            return Ok(ConstraintMatrix::permissive(hosts.len(), num_instances));
        }
        Ok(matrix_from_capacities(hosts, num_instances, |host| {
            let memory_limit = host.total_ram_mb as f64 * self.ratio.for_host(host);
            host.limits.memory_mb = Some(memory_limit);
            let usable = memory_limit - host.used_ram_mb() as f64;
            whole_instances(usable, requested as f64)
        }))
    }
}

pub struct DiskConstraint {
    name: &'static str,
    ratio: AllocationRatio,
}

impl DiskConstraint {
    pub fn new(disk_allocation_ratio: f64) -> Self {
        Self {
            name: "DiskConstraint",
            ratio: AllocationRatio::Fixed(disk_allocation_ratio),
        }
    }

    pub fn from_aggregates(default_ratio: f64) -> Self {
        Self {
            name: "AggregateDiskConstraint",
            ratio: AllocationRatio::Aggregate {
                key: "disk_allocation_ratio",
                default: default_ratio,
            },
        }
    }
}

impl Constraint for DiskConstraint {
    fn name(&self) -> &str {
        self.name
    }

    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        let num_instances = filter_properties.num_instances;
        let Some(instance_type) = requested_instance_type(self.name, filter_properties) else {
            return Ok(ConstraintMatrix::permissive(hosts.len(), num_instances));
        };
        let requested_mb = instance_type.disk_mb();
        if requested_mb <= 0 {
            warn!("{}: requested disk is {} MB, constraint skipped", self.name, requested_mb);
            return Ok(ConstraintMatrix::permissive(hosts.len(), num_instances));
        }
        Ok(matrix_from_capacities(hosts, num_instances, |host| {
            let ratio = self.ratio.for_host(host);
            let disk_limit_gb = host.total_usable_disk_gb as f64 * ratio;
            host.limits.disk_gb = Some(disk_limit_gb);
            let usable_mb = disk_limit_gb * 1024.0 - host.used_disk_mb() as f64;
            whole_instances(usable_mb, requested_mb as f64)
        }))
    }
}

pub struct VcpuConstraint {
    name: &'static str,
    ratio: AllocationRatio,
}

impl VcpuConstraint {
    pub fn new(cpu_allocation_ratio: f64) -> Self {
        Self {
            name: "VcpuConstraint",
            ratio: AllocationRatio::Fixed(cpu_allocation_ratio),
        }
    }

    pub fn from_aggregates(default_ratio: f64) -> Self {
        Self {
            name: "AggregateVcpuConstraint",
            ratio: AllocationRatio::Aggregate {
                key: "cpu_allocation_ratio",
                default: default_ratio,
            },
        }
    }
}

impl Constraint for VcpuConstraint {
    fn name(&self) -> &str {
        self.name
    }

    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        let num_instances = filter_properties.num_instances;
        let Some(instance_type) = requested_instance_type(self.name, filter_properties) else {
            return Ok(ConstraintMatrix::permissive(hosts.len(), num_instances));
        };
        let requested = instance_type.vcpus;
        if requested <= 0 {
            warn!("{}: requested {} vCPUs, constraint skipped", self.name, requested);
            return Ok(ConstraintMatrix::permissive(hosts.len(), num_instances));
        }
        Ok(matrix_from_capacities(hosts, num_instances, |host| {
            if host.vcpus_total <= 0 {
                warn!(
                    "{}: vCPUs of host {} not set, assuming CPU collection is broken",
                    self.name, host.host
                );
                return 0;
            }
            let vcpu_limit = host.vcpus_total as f64 * self.ratio.for_host(host);
            host.limits.vcpu = Some(vcpu_limit);
            whole_instances(vcpu_limit - host.vcpus_used as f64, requested as f64)
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExactResource {
    Ram,
    Disk,
    Vcpu,
}

/// Accepts a single instance on hosts whose free resource equals the request exactly.
pub struct ExactConstraint {
    resource: ExactResource,
}

impl ExactConstraint {
    pub fn new(resource: ExactResource) -> Self {
        Self { resource }
    }
}

impl Constraint for ExactConstraint {
    fn name(&self) -> &str {
        match self.resource {
            ExactResource::Ram => "ExactRamConstraint",
            ExactResource::Disk => "ExactDiskConstraint",
            ExactResource::Vcpu => "ExactVcpuConstraint",
        }
    }

    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        let num_instances = filter_properties.num_instances;
        let Some(instance_type) = requested_instance_type(self.name(), filter_properties) else {
            return Ok(ConstraintMatrix::permissive(hosts.len(), num_instances));
        };
        Ok(matrix_from_capacities(hosts, num_instances, |host| {
            let exact = match self.resource {
                ExactResource::Ram => host.free_ram_mb == instance_type.memory_mb,
                ExactResource::Disk => host.free_disk_mb == instance_type.disk_mb(),
                ExactResource::Vcpu => host.free_vcpus() == instance_type.vcpus,
            };
            usize::from(exact)
        }))
    }
}
