//! Resource based costs. RAM and vCPU costs prefer hosts with more room left
//! (spreading); negative multipliers stack instead. I/O ops cost prefers idle hosts.

use log::warn;

use crate::core::host_state::HostState;
use crate::core::matrix::{normalize_cost_matrix, CostMatrix};
use crate::core::request::FilterProperties;
use crate::core::scheduler::costs::{extended_matrix_from_fn, Cost};
use crate::core::scheduler::interface::PluginError;

/// `−⌊free / requested⌋ + k`: the more whole instances still fit, the cheaper the host.
fn headroom_cost(free: f64, requested: f64, k: usize) -> f64 {
    -(free / requested).floor() + k as f64
}

pub struct RamCost {
    multiplier: f64,
}

impl RamCost {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl Cost for RamCost {
    fn name(&self) -> &str {
        "RamCost"
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
        let requested = filter_properties
            .instance_type
            .as_ref()
            .map_or(0, |instance_type| instance_type.memory_mb);
        if requested <= 0 {
            warn!("{}: requested RAM is {} MB, cost is zero", self.name(), requested);
            return Ok(CostMatrix::zeros(hosts.len(), num_instances + 1));
        }
        let matrix = extended_matrix_from_fn(hosts.len(), num_instances, |idx, k| {
            headroom_cost(hosts[idx].free_ram_mb as f64, requested as f64, k)
        });
        Ok(normalize_cost_matrix(&matrix))
    }
}

pub struct VcpuCost {
    multiplier: f64,
}

impl VcpuCost {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl Cost for VcpuCost {
    fn name(&self) -> &str {
        "VcpuCost"
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
        let requested = filter_properties
            .instance_type
            .as_ref()
            .map_or(0, |instance_type| instance_type.vcpus);
        if requested <= 0 {
            warn!("{}: requested {} vCPUs, cost is zero", self.name(), requested);
            return Ok(CostMatrix::zeros(hosts.len(), num_instances + 1));
        }
        let matrix = extended_matrix_from_fn(hosts.len(), num_instances, |idx, k| {
            let host = &hosts[idx];
            if host.vcpus_total <= 0 {
                return 0.0;
            }
            headroom_cost(host.free_vcpus() as f64, requested as f64, k)
        });
        for host in hosts.iter().filter(|host| host.vcpus_total <= 0) {
            warn!("{}: vCPUs of host {} not set, cost row is zero", self.name(), host.host);
        }
        Ok(normalize_cost_matrix(&matrix))
    }
}

pub struct IoOpsCost {
    multiplier: f64,
}

impl IoOpsCost {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl Cost for IoOpsCost {
    fn name(&self) -> &str {
        "IoOpsCost"
    }

    fn cost_multiplier(&self) -> f64 {
        self.multiplier
    }

    fn get_extended_cost_matrix(
        &self,
        hosts: &[HostState],
        filter_properties: &FilterProperties,
    ) -> Result<CostMatrix, PluginError> {
        let matrix = extended_matrix_from_fn(hosts.len(), filter_properties.num_instances, |idx, k| {
            hosts[idx].num_io_ops as f64 + k as f64
        });
        Ok(normalize_cost_matrix(&matrix))
    }
}
