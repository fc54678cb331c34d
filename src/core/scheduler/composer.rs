//! Composition of constraint and cost layers.
//!
//! Plugins run in ascending precedence, in configuration order within a level.
//! Whenever the precedence goes up, the running matrix is published to the
//! solver cache so that the next layers can look at it. Costs are composed
//! before constraints, so constraints of any precedence can read the cost cache.

use log::{debug, warn};

use crate::core::host_state::HostState;
use crate::core::matrix::{ConstraintMatrix, CostMatrix};
use crate::core::request::FilterProperties;
use crate::core::scheduler::constraints::Constraint;
use crate::core::scheduler::costs::Cost;

pub struct MatrixComposer {
    constraints: Vec<Box<dyn Constraint>>,
    costs: Vec<Box<dyn Cost>>,
}

impl MatrixComposer {
    pub fn new(mut constraints: Vec<Box<dyn Constraint>>, mut costs: Vec<Box<dyn Cost>>) -> Self {
        // stable: configuration order is kept within a precedence level
        constraints.sort_by_key(|constraint| constraint.precedence());
        costs.sort_by_key(|cost| cost.precedence());
        Self { constraints, costs }
    }

    pub fn constraint_names(&self) -> Vec<&str> {
        self.constraints.iter().map(|constraint| constraint.name()).collect()
    }

    pub fn cost_names(&self) -> Vec<&str> {
        self.costs.iter().map(|cost| cost.name()).collect()
    }

    /// Weighted sum of the extended cost matrices, host×(instances+1).
    pub fn compose_cost_matrix(
        &self,
        hosts: &[HostState],
        filter_properties: &mut FilterProperties,
    ) -> CostMatrix {
        let num_hosts = hosts.len();
        let num_cols = filter_properties.num_instances + 1;
        let mut composed = CostMatrix::zeros(num_hosts, num_cols);
        let mut level = None;

        for cost in &self.costs {
            let precedence = cost.precedence();
            if level.map_or(false, |level| precedence > level) {
                filter_properties.solver_cache.cost_matrix = composed.clone();
            }
            level = Some(precedence);

            let matrix = match cost.get_extended_cost_matrix(hosts, filter_properties) {
                Ok(matrix) if matrix.has_shape(num_hosts, num_cols) => matrix,
                Ok(matrix) => {
                    warn!(
                        "Cost {} returned a {}x{} matrix instead of {}x{}, ignored",
                        cost.name(),
                        matrix.num_rows(),
                        matrix.num_cols(),
                        num_hosts,
                        num_cols
                    );
                    continue;
                }
                Err(err) => {
                    warn!("Cost {} failed, ignored: {}", cost.name(), err);
                    continue;
                }
            };
            composed.add_scaled(&matrix, cost.cost_multiplier());
            debug!(
                "Composed cost {} (precedence {}, multiplier {})",
                cost.name(),
                precedence,
                cost.cost_multiplier()
            );
        }

        filter_properties.solver_cache.cost_matrix = composed.clone();
        composed
    }

    /// Element-wise AND of the constraint matrices, host×instances.
    pub fn compose_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &mut FilterProperties,
    ) -> ConstraintMatrix {
        let num_hosts = hosts.len();
        let num_instances = filter_properties.num_instances;
        let mut composed = ConstraintMatrix::permissive(num_hosts, num_instances);
        let mut level = None;

        for constraint in &self.constraints {
            let precedence = constraint.precedence();
            if level.map_or(false, |level| precedence > level) {
                filter_properties.solver_cache.constraint_matrix = composed.clone();
            }
            level = Some(precedence);

            let matrix = match constraint.get_constraint_matrix(hosts, filter_properties) {
                Ok(matrix) if matrix.has_shape(num_hosts, num_instances) => matrix,
                Ok(matrix) => {
                    warn!(
                        "Constraint {} returned a {}x{} matrix instead of {}x{}, ignored",
                        constraint.name(),
                        matrix.num_rows(),
                        matrix.num_cols(),
                        num_hosts,
                        num_instances
                    );
                    continue;
                }
                Err(err) => {
                    warn!("Constraint {} failed, ignored: {}", constraint.name(), err);
                    continue;
                }
            };
            composed.and_assign(&matrix);
            debug!(
                "Composed constraint {} (precedence {})",
                constraint.name(),
                precedence
            );
        }

        filter_properties.solver_cache.constraint_matrix = composed.clone();
        composed
    }

    /// Costs first, then constraints.
    pub fn compose(
        &self,
        hosts: &mut [HostState],
        filter_properties: &mut FilterProperties,
    ) -> (ConstraintMatrix, CostMatrix) {
        let costs = self.compose_cost_matrix(hosts, filter_properties);
        let constraints = self.compose_constraint_matrix(hosts, filter_properties);
        (constraints, costs)
    }
}
