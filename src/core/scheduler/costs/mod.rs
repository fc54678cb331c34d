//! Costs express soft preferences. Each one turns the candidate hosts into an
//! extended host×(instances+1) cost matrix; column `k` is the cost of the host
//! ending up with `k` new instances.

pub mod affinity;
pub mod metrics;
pub mod racks;
pub mod resources;

use crate::core::host_state::HostState;
use crate::core::matrix::CostMatrix;
use crate::core::request::FilterProperties;
use crate::core::scheduler::interface::PluginError;

pub trait Cost: Send + Sync {
    fn name(&self) -> &str;

    /// Costs of a higher precedence see the composed matrix of all lower layers.
    fn precedence(&self) -> u32 {
        0
    }

    /// Weight applied when composing. Negative values turn spreading into stacking.
    fn cost_multiplier(&self) -> f64;

    fn get_extended_cost_matrix(
        &self,
        hosts: &[HostState],
        filter_properties: &FilterProperties,
    ) -> Result<CostMatrix, PluginError>;

    /// Cost matrix without the "zero instances" column.
    fn get_cost_matrix(
        &self,
        hosts: &[HostState],
        filter_properties: &FilterProperties,
    ) -> Result<CostMatrix, PluginError> {
        Ok(self
            .get_extended_cost_matrix(hosts, filter_properties)?
            .without_first_column())
    }
}

/// Builds an extended cost matrix from `cost(host_index, k)`, `k` in `0..=num_instances`.
pub fn extended_matrix_from_fn<F>(num_hosts: usize, num_instances: usize, mut cost: F) -> CostMatrix
where
    F: FnMut(usize, usize) -> f64,
{
    let mut matrix = CostMatrix::zeros(num_hosts, num_instances + 1);
    for idx in 0..num_hosts {
        for (k, value) in matrix.row_mut(idx).iter_mut().enumerate() {
            *value = cost(idx, k);
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ladder;

    impl Cost for Ladder {
        fn name(&self) -> &str {
            "Ladder"
        }

        fn cost_multiplier(&self) -> f64 {
            1.0
        }

        fn get_extended_cost_matrix(
            &self,
            hosts: &[HostState],
            filter_properties: &FilterProperties,
        ) -> Result<CostMatrix, PluginError> {
            Ok(extended_matrix_from_fn(
                hosts.len(),
                filter_properties.num_instances,
                |idx, k| (idx * 10 + k) as f64,
            ))
        }
    }

    #[test]
    fn test_plain_matrix_drops_zero_column() {
        let hosts = vec![HostState::new("host1", "node1"), HostState::new("host2", "node2")];
        let props = FilterProperties::new(2);
        let extended = Ladder.get_extended_cost_matrix(&hosts, &props).unwrap();
        assert_eq!(extended.to_rows(), vec![vec![0.0, 1.0, 2.0], vec![10.0, 11.0, 12.0]]);
        let plain = Ladder.get_cost_matrix(&hosts, &props).unwrap();
        assert_eq!(plain.to_rows(), vec![vec![1.0, 2.0], vec![11.0, 12.0]]);
    }
}
