//! NUMA topology of hosts and instances, and the fitting used when an instance lands on a host.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HostNumaCell {
    pub id: u32,
    pub cpus: u32,
    pub memory_mb: i64,
    #[serde(default)]
    pub cpu_usage: u32,
    #[serde(default)]
    pub memory_usage: i64,
}

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HostNumaTopology {
    pub cells: Vec<HostNumaCell>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct InstanceNumaCell {
    pub cpus: u32,
    pub memory_mb: i64,
}

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct InstanceNumaTopology {
    pub cells: Vec<InstanceNumaCell>,
}

/// Oversubscription ratios applied per NUMA cell.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct NumaLimits {
    pub cpu_allocation_ratio: f64,
    pub ram_allocation_ratio: f64,
}

impl HostNumaCell {
    fn fits(&self, cell: &InstanceNumaCell, limits: Option<&NumaLimits>) -> bool {
        let (cpu_ratio, ram_ratio) = match limits {
            Some(limits) => (limits.cpu_allocation_ratio, limits.ram_allocation_ratio),
            None => (1.0, 1.0),
        };
        let cpu_limit = self.cpus as f64 * cpu_ratio;
        let ram_limit = self.memory_mb as f64 * ram_ratio;
        // An instance cell can never be larger than the physical cell, whatever the ratio.
        cell.cpus <= self.cpus
            && cell.memory_mb <= self.memory_mb
            && (self.cpu_usage + cell.cpus) as f64 <= cpu_limit
            && (self.memory_usage + cell.memory_mb) as f64 <= ram_limit
    }
}

impl HostNumaTopology {
    /// Maps every instance cell to a distinct host cell that can hold it.
    /// Returns the host cell index chosen for each instance cell, in order.
    pub fn fit_instance(
        &self,
        instance: &InstanceNumaTopology,
        limits: Option<&NumaLimits>,
    ) -> Option<Vec<usize>> {
        if instance.cells.len() > self.cells.len() {
            return None;
        }
        let mut chosen = Vec::with_capacity(instance.cells.len());
        let mut taken = vec![false; self.cells.len()];
        if self.assign(instance, limits, 0, &mut taken, &mut chosen) {
            Some(chosen)
        } else {
            None
        }
    }

    fn assign(
        &self,
        instance: &InstanceNumaTopology,
        limits: Option<&NumaLimits>,
        next: usize,
        taken: &mut [bool],
        chosen: &mut Vec<usize>,
    ) -> bool {
        let Some(cell) = instance.cells.get(next) else {
            return true;
        };
        for (idx, host_cell) in self.cells.iter().enumerate() {
            if taken[idx] || !host_cell.fits(cell, limits) {
                continue;
            }
            taken[idx] = true;
            chosen.push(idx);
            if self.assign(instance, limits, next + 1, taken, chosen) {
                return true;
            }
            chosen.pop();
            taken[idx] = false;
        }
        false
    }

    /// Fits the instance and records its usage on the chosen cells.
    /// Returns false and leaves the topology untouched if the instance does not fit.
    pub fn consume(&mut self, instance: &InstanceNumaTopology, limits: Option<&NumaLimits>) -> bool {
        let Some(mapping) = self.fit_instance(instance, limits) else {
            return false;
        };
        for (cell, host_idx) in instance.cells.iter().zip(mapping) {
            let host_cell = &mut self.cells[host_idx];
            host_cell.cpu_usage += cell.cpus;
            host_cell.memory_usage += cell.memory_mb;
        }
        true
    }
}
