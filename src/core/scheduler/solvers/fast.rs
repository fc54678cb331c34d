//! Greedy solver. Walks the feasible (host, count) cells from cheapest to most
//! expensive and grants each one when it fits into the batch. Not optimal in
//! general, but needs no external backend.

use log::{debug, info};

use crate::core::host_state::HostState;
use crate::core::matrix::{ConstraintMatrix, CostMatrix};
use crate::core::request::FilterProperties;
use crate::core::scheduler::composer::MatrixComposer;
use crate::core::scheduler::interface::{Assignment, SolverEngine};
use crate::core::scheduler::solvers::assignments_from_allocation;

/// Per-host instance counts, or `None` when the batch cannot be fully placed.
///
/// `costs` and `constraints` are plain host×instances matrices: column `k`
/// stands for the host holding `k + 1` instances.
pub fn greedy_allocation(
    costs: &CostMatrix,
    constraints: &ConstraintMatrix,
    num_instances: usize,
) -> Option<Vec<usize>> {
    let num_hosts = constraints.num_rows();
    let mut cells: Vec<(usize, usize, f64)> = Vec::new();
    for (host_index, row) in constraints.rows().enumerate() {
        for (k, &feasible) in row.iter().enumerate() {
            if feasible {
                cells.push((host_index, k + 1, costs.get(host_index, k)));
            }
        }
    }
    // stable: equal cost and host keeps ascending counts
    cells.sort_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)));

    let mut allocation = vec![0; num_hosts];
    let mut placed = 0;
    for (host_index, count, _) in cells {
        if placed == num_instances {
            break;
        }
        if count <= allocation[host_index] {
            continue;
        }
        let delta = count - allocation[host_index];
        if placed + delta > num_instances {
            continue;
        }
        allocation[host_index] = count;
        placed += delta;
    }

    if placed == num_instances {
        Some(allocation)
    } else {
        debug!("Greedy walk placed {} of {} instances", placed, num_instances);
        None
    }
}

pub struct FastSolver {
    composer: MatrixComposer,
}

impl FastSolver {
    pub fn new(composer: MatrixComposer) -> Self {
        Self { composer }
    }
}

impl SolverEngine for FastSolver {
    fn solve(
        &self,
        hosts: &mut [HostState],
        filter_properties: &mut FilterProperties,
    ) -> Vec<Assignment> {
        let num_instances = filter_properties.num_instances;
        if hosts.is_empty() || num_instances == 0 {
            return Vec::new();
        }
        let (constraints, extended_costs) = self.composer.compose(hosts, filter_properties);
        let costs = extended_costs.without_first_column();

        match greedy_allocation(&costs, &constraints, num_instances) {
            Some(allocation) => {
                debug!("Greedy allocation per host: {:?}", allocation);
                assignments_from_allocation(&allocation, filter_properties)
            }
            None => {
                info!(
                    "No placement found for {} instances on {} hosts",
                    num_instances,
                    hosts.len()
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder(num_hosts: usize, num_instances: usize, sign: f64) -> CostMatrix {
        let rows = (0..num_hosts)
            .map(|i| (0..num_instances).map(|j| sign * (i + j) as f64).collect())
            .collect();
        CostMatrix::from_rows(rows).unwrap()
    }

    #[test]
    fn test_spread() {
        let allocation = greedy_allocation(&ladder(4, 3, 1.0), &ConstraintMatrix::permissive(4, 3), 3);
        assert_eq!(allocation, Some(vec![2, 1, 0, 0]));
    }

    #[test]
    fn test_stack() {
        let allocation = greedy_allocation(&ladder(4, 3, -1.0), &ConstraintMatrix::permissive(4, 3), 3);
        assert_eq!(allocation, Some(vec![0, 0, 0, 3]));
    }

    #[test]
    fn test_skips_cells_overshooting_the_batch() {
        // after one instance on host 0, three more on host 1 would overshoot
        let costs = CostMatrix::from_rows(vec![
            vec![0.0, 9.0, 9.0],
            vec![9.0, 9.0, 1.0],
            vec![2.0, 3.0, 9.0],
        ])
        .unwrap();
        let allocation = greedy_allocation(&costs, &ConstraintMatrix::permissive(3, 3), 3);
        assert_eq!(allocation, Some(vec![1, 0, 2]));
    }

    #[test]
    fn test_infeasible_is_none() {
        let mut constraints = ConstraintMatrix::permissive(2, 3);
        constraints.set_row_capacity(0, 1);
        constraints.set_row_capacity(1, 1);
        assert_eq!(greedy_allocation(&ladder(2, 3, 1.0), &constraints, 3), None);
    }
}
