//! Constraints reject assignments. Each one turns the candidate hosts into a
//! host×instance boolean matrix whose rows never go from false back to true.

pub mod affinity;
pub mod filters;
pub mod limits;
pub mod numa_pci;
pub mod racks;
pub mod resources;

use log::warn;

use crate::core::host_state::HostState;
use crate::core::matrix::ConstraintMatrix;
use crate::core::request::{FilterProperties, InstanceType};
use crate::core::scheduler::interface::PluginError;

pub trait Constraint: Send + Sync {
    fn name(&self) -> &str;

    /// Constraints of a higher precedence see the composed matrix of all lower layers.
    fn precedence(&self) -> u32 {
        0
    }

    /// Hosts are mutable only so that constraints can record per-host `limits`.
    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError>;
}

/// Boolean host predicate. Wrapped into a constraint by `FilterConstraint`.
pub trait HostFilter: Send + Sync {
    fn name(&self) -> &str;

    fn host_passes(
        &self,
        host: &HostState,
        filter_properties: &FilterProperties,
    ) -> Result<bool, PluginError>;
}

/// Constraint whose rows are all-true when the wrapped filter passes the host and all-false otherwise.
pub struct FilterConstraint<F: HostFilter> {
    filter: F,
}

impl<F: HostFilter> FilterConstraint<F> {
    pub fn new(filter: F) -> Self {
        Self { filter }
    }
}

impl<F: HostFilter> Constraint for FilterConstraint<F> {
    fn name(&self) -> &str {
        self.filter.name()
    }

    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        let mut matrix = ConstraintMatrix::permissive(hosts.len(), filter_properties.num_instances);
        for (idx, host) in hosts.iter().enumerate() {
            if !self.filter.host_passes(host, filter_properties)? {
                matrix.set_row_all(idx, false);
            }
        }
        Ok(matrix)
    }
}

/// Builds a matrix from the number of instances each host can take.
pub fn matrix_from_capacities<F>(
    hosts: &mut [HostState],
    num_instances: usize,
    mut capacity: F,
) -> ConstraintMatrix
where
    F: FnMut(&mut HostState) -> usize,
{
    let mut matrix = ConstraintMatrix::permissive(hosts.len(), num_instances);
    for (idx, host) in hosts.iter_mut().enumerate() {
        matrix.set_row_capacity(idx, capacity(host));
    }
    matrix
}

/// Number of whole instances fitting into `usable`, never negative.
pub fn whole_instances(usable: f64, requested: f64) -> usize {
    if usable <= 0.0 {
        return 0;
    }
    (usable / requested).floor() as usize
}

/// Instance type of the request, logging when it is missing.
pub fn requested_instance_type<'a>(
    constraint: &str,
    filter_properties: &'a FilterProperties,
) -> Option<&'a InstanceType> {
    let instance_type = filter_properties.instance_type.as_ref();
    if instance_type.is_none() {
        warn!(
            "{}: no instance type in request, all hosts are accepted",
            constraint
        );
    }
    instance_type
}
