//! Exact solver. Every host picks exactly one instance count through binary
//! variables `y[i][k]`, `k` in `0..=N`, and the counts have to add up to `N`.

use std::time::Duration;

use log::{debug, warn};

use crate::core::host_state::HostState;
use crate::core::matrix::{ConstraintMatrix, CostMatrix};
use crate::core::request::FilterProperties;
use crate::core::scheduler::composer::MatrixComposer;
use crate::core::scheduler::interface::{Assignment, SolverEngine};
use crate::core::scheduler::solvers::assignments_from_allocation;
use crate::core::scheduler::solvers::mip::{BinaryProgram, MicroLpBackend, MipBackend, MipStatus};

/// Rewrites the extended cost matrix as `sign·(X − offset)²`.
///
/// When the first column sums lower than the last one, `offset` is the
/// minimum of the first column and `sign` is +1; otherwise `offset` is its
/// maximum and `sign` is −1.
pub fn adjust_cost_matrix(costs: &CostMatrix) -> CostMatrix {
    let first_column = costs.first_column();
    if first_column.is_empty() {
        return costs.clone();
    }
    let first_sum: f64 = first_column.iter().sum();
    let last_sum: f64 = costs.last_column().iter().sum();
    let (offset, sign) = if first_sum < last_sum {
        (first_column.iter().copied().fold(f64::INFINITY, f64::min), 1.0)
    } else {
        (first_column.iter().copied().fold(f64::NEG_INFINITY, f64::max), -1.0)
    };

    let mut adjusted = costs.clone();
    for row in 0..adjusted.num_rows() {
        for value in adjusted.row_mut(row) {
            *value = sign * (*value - offset).powi(2);
        }
    }
    adjusted
}

/// Host×(instances+1) feasibility; placing nothing is always allowed.
fn extended_constraints(constraints: &ConstraintMatrix) -> ConstraintMatrix {
    let mut extended = ConstraintMatrix::permissive(constraints.num_rows(), constraints.num_cols() + 1);
    for (idx, row) in constraints.rows().enumerate() {
        extended.row_mut(idx)[1..].copy_from_slice(row);
    }
    extended
}

/// Variable index of `y[host][k]`.
fn variable(host: usize, k: usize, num_instances: usize) -> usize {
    host * (num_instances + 1) + k
}

/// Builds the program over `y[i][k]`.
pub fn build_program(costs: &CostMatrix, constraints: &ConstraintMatrix) -> BinaryProgram {
    let num_hosts = costs.num_rows();
    let num_instances = costs.num_cols().saturating_sub(1);
    let objective = costs.rows().flat_map(|row| row.iter().copied()).collect();
    let mut program = BinaryProgram::new(objective);

    for host in 0..num_hosts {
        let terms = (0..=num_instances)
            .map(|k| (variable(host, k, num_instances), 1.0))
            .collect();
        program.add_equality(terms, 1.0);
    }

    let terms = (0..num_hosts)
        .flat_map(|host| (1..=num_instances).map(move |k| (variable(host, k, num_instances), k as f64)))
        .collect();
    program.add_equality(terms, num_instances as f64);

    for (host, row) in constraints.rows().enumerate() {
        for (k, &feasible) in row.iter().enumerate() {
            if !feasible {
                program.fix_zero(variable(host, k, num_instances));
            }
        }
    }
    program
}

/// Reads the per-host counts out of a solution, checking that every host picked
/// exactly one count and that the counts add up to the batch.
fn allocation_from_solution(
    values: &[bool],
    num_hosts: usize,
    num_instances: usize,
) -> Option<Vec<usize>> {
    let mut allocation = Vec::with_capacity(num_hosts);
    for host in 0..num_hosts {
        let chosen: Vec<usize> = (0..=num_instances)
            .filter(|&k| values.get(variable(host, k, num_instances)).copied().unwrap_or(false))
            .collect();
        match chosen.as_slice() {
            [count] => allocation.push(*count),
            _ => return None,
        }
    }
    (allocation.iter().sum::<usize>() == num_instances).then_some(allocation)
}

pub struct IlpSolver {
    composer: MatrixComposer,
    backend: Box<dyn MipBackend>,
    timeout: Duration,
}

impl IlpSolver {
    pub fn new(composer: MatrixComposer, timeout: Duration) -> Self {
        Self::with_backend(composer, Box::new(MicroLpBackend), timeout)
    }

    pub fn with_backend(
        composer: MatrixComposer,
        backend: Box<dyn MipBackend>,
        timeout: Duration,
    ) -> Self {
        Self {
            composer,
            backend,
            timeout,
        }
    }
}

impl SolverEngine for IlpSolver {
    fn solve(
        &self,
        hosts: &mut [HostState],
        filter_properties: &mut FilterProperties,
    ) -> Vec<Assignment> {
        let num_instances = filter_properties.num_instances;
        if hosts.is_empty() || num_instances == 0 {
            return Vec::new();
        }
        let (constraints, costs) = self.composer.compose(hosts, filter_properties);
        let program = build_program(
            &adjust_cost_matrix(&costs),
            &extended_constraints(&constraints),
        );
        debug!(
            "Solving {} variables and {} equalities with {}",
            program.num_variables,
            program.equalities.len(),
            self.backend.name()
        );

        match self.backend.solve(&program, self.timeout) {
            MipStatus::Optimal(values) => {
                match allocation_from_solution(&values, hosts.len(), num_instances) {
                    Some(allocation) => assignments_from_allocation(&allocation, filter_properties),
                    None => {
                        warn!("{} returned an invalid solution, no placement", self.backend.name());
                        Vec::new()
                    }
                }
            }
            MipStatus::TimedOut => {
                warn!(
                    "{} exceeded the {:?} deadline, no placement",
                    self.backend.name(),
                    self.timeout
                );
                Vec::new()
            }
            status => {
                warn!("{} finished with status {:?}, no placement", self.backend.name(), status);
                Vec::new()
            }
        }
    }
}
