//! Solver engines turning composed matrices into a placement.

pub mod fast;
pub mod ilp;
pub mod mip;

use crate::core::request::FilterProperties;
use crate::core::scheduler::interface::Assignment;

/// Pairs every granted slot with the next instance uuid, host by host.
pub fn assignments_from_allocation(
    allocation: &[usize],
    filter_properties: &FilterProperties,
) -> Vec<Assignment> {
    let mut uuids = filter_properties.instance_uuids_or_placeholders().into_iter();
    let mut assignments = Vec::new();
    for (host_index, &count) in allocation.iter().enumerate() {
        for _ in 0..count {
            let Some(instance_uuid) = uuids.next() else {
                return assignments;
            };
            assignments.push(Assignment {
                host_index,
                instance_uuid,
            });
        }
    }
    assignments
}
