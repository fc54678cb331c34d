//! Rack-level hard limits.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, warn};

use crate::core::host_state::HostState;
use crate::core::matrix::ConstraintMatrix;
use crate::core::request::FilterProperties;
use crate::core::scheduler::constraints::Constraint;
use crate::core::scheduler::interface::PluginError;
use crate::core::topology::{racks_or_host, RackTopology};

/// Keeps a tenant within `max_racks_per_tenant` racks.
///
/// Racks the tenant already uses are always acceptable. Free slots are filled
/// with the racks that the lower precedence layers leave the most room on,
/// cheapest first on ties.
pub struct TenantRackConstraint {
    max_racks_per_tenant: usize,
    topology: Arc<RackTopology>,
}

impl TenantRackConstraint {
    pub fn new(max_racks_per_tenant: usize, topology: Arc<RackTopology>) -> Self {
        Self {
            max_racks_per_tenant,
            topology,
        }
    }
}

#[derive(Debug)]
struct RackCandidate<'a> {
    rack: &'a str,
    capacity: usize,
    cost: f64,
}

impl Constraint for TenantRackConstraint {
    fn name(&self) -> &str {
        "TenantRackConstraint"
    }

    fn precedence(&self) -> u32 {
        1
    }

    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        let num_hosts = hosts.len();
        let num_instances = filter_properties.num_instances;
        let mut matrix = ConstraintMatrix::permissive(num_hosts, num_instances);
        let Some(project_id) = filter_properties.project_id.as_ref() else {
            warn!("{}: request has no project, all hosts are accepted", self.name());
            return Ok(matrix);
        };

        let host_racks = self.topology.host_racks_map(hosts);
        let racks_per_host: Vec<BTreeSet<String>> = hosts
            .iter()
            .map(|host| racks_or_host(&host_racks, &host.host))
            .collect();

        let mut acceptable: BTreeSet<&str> = hosts
            .iter()
            .zip(&racks_per_host)
            .filter(|(host, _)| host.projects.contains(project_id))
            .flat_map(|(_, racks)| racks.iter().map(String::as_str))
            .collect();

        if acceptable.len() < self.max_racks_per_tenant {
            let cache = &filter_properties.solver_cache;
            let prior_constraints = Some(&cache.constraint_matrix)
                .filter(|matrix| matrix.has_shape(num_hosts, num_instances));
            let prior_costs = Some(&cache.cost_matrix)
                .filter(|matrix| matrix.num_rows() == num_hosts && matrix.num_cols() > 0);

            let mut candidates: BTreeMap<&str, RackCandidate> = BTreeMap::new();
            for (idx, racks) in racks_per_host.iter().enumerate() {
                let capacity = prior_constraints.map_or(num_instances, |m| m.row_capacity(idx));
                let cost = prior_costs.map_or(0.0, |m| m.get(idx, 0));
                for rack in racks.iter().filter(|rack| !acceptable.contains(rack.as_str())) {
                    let candidate = candidates.entry(rack.as_str()).or_insert(RackCandidate {
                        rack: rack.as_str(),
                        capacity: 0,
                        cost: f64::INFINITY,
                    });
                    candidate.capacity += capacity;
                    candidate.cost = candidate.cost.min(cost);
                }
            }
            let mut candidates: Vec<RackCandidate> = candidates
                .into_values()
                .filter(|candidate| candidate.capacity > 0)
                .collect();
            candidates.sort_by(|a, b| {
                b.capacity
                    .cmp(&a.capacity)
                    .then_with(|| a.cost.total_cmp(&b.cost))
            });
            debug!("{}: additional rack candidates {:?}", self.name(), candidates);

            let missing = self.max_racks_per_tenant - acceptable.len();
            acceptable.extend(candidates.iter().take(missing).map(|candidate| candidate.rack));
        }

        for (idx, racks) in racks_per_host.iter().enumerate() {
            if !racks.iter().any(|rack| acceptable.contains(rack.as_str())) {
                matrix.set_row_all(idx, false);
            }
        }
        Ok(matrix)
    }
}

/// Rejects hosts whose rack would end up with more than `max_networks_per_rack` networks.
pub struct NumNetworksPerRackConstraint {
    max_networks_per_rack: usize,
    topology: Arc<RackTopology>,
}

impl NumNetworksPerRackConstraint {
    pub fn new(max_networks_per_rack: usize, topology: Arc<RackTopology>) -> Self {
        Self {
            max_networks_per_rack,
            topology,
        }
    }
}

impl Constraint for NumNetworksPerRackConstraint {
    fn name(&self) -> &str {
        "NumNetworksPerRackConstraint"
    }

    fn get_constraint_matrix(
        &self,
        hosts: &mut [HostState],
        filter_properties: &FilterProperties,
    ) -> Result<ConstraintMatrix, PluginError> {
        let mut matrix = ConstraintMatrix::permissive(hosts.len(), filter_properties.num_instances);
        let host_racks = self.topology.host_racks_map(hosts);
        let racks_per_host: Vec<BTreeSet<String>> = hosts
            .iter()
            .map(|host| racks_or_host(&host_racks, &host.host))
            .collect();

        let mut rack_networks: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (host, racks) in hosts.iter().zip(&racks_per_host) {
            for rack in racks {
                rack_networks
                    .entry(rack.as_str())
                    .or_default()
                    .extend(host.networks.iter().map(String::as_str));
            }
        }

        for (idx, racks) in racks_per_host.iter().enumerate() {
            let fits = racks.iter().all(|rack| {
                let mut networks = rack_networks.get(rack.as_str()).cloned().unwrap_or_default();
                networks.extend(filter_properties.requested_networks.iter().map(String::as_str));
                networks.len() <= self.max_networks_per_rack
            });
            if !fits {
                matrix.set_row_all(idx, false);
            }
        }
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::HostRacks;
    use crate::core::matrix::CostMatrix;
    use crate::test_util::helpers::create_host;

    fn topology() -> Arc<RackTopology> {
        Arc::new(RackTopology::from_map(HostRacks::from([
            ("host1".to_string(), BTreeSet::from(["r1".to_string()])),
            ("host2".to_string(), BTreeSet::from(["r2".to_string()])),
            ("host3".to_string(), BTreeSet::from(["r3".to_string()])),
        ])))
    }

    fn hosts() -> Vec<HostState> {
        (1..=3)
            .map(|idx| create_host(&format!("host{}", idx), 1024, 1024, 4, 0))
            .collect()
    }

    #[test]
    fn test_tenant_keeps_its_racks() {
        let mut hosts = hosts();
        hosts[1].projects.insert("tenant".to_string());
        let props = FilterProperties {
            project_id: Some("tenant".to_string()),
            ..FilterProperties::new(2)
        };
        let matrix = TenantRackConstraint::new(1, topology())
            .get_constraint_matrix(&mut hosts, &props)
            .unwrap();
        assert_eq!(
            matrix.to_rows(),
            vec![vec![false, false], vec![true, true], vec![false, false]]
        );
    }

    #[test]
    fn test_new_tenant_gets_roomiest_then_cheapest_rack() {
        let mut hosts = hosts();
        let mut props = FilterProperties {
            project_id: Some("tenant".to_string()),
            ..FilterProperties::new(2)
        };
        props.solver_cache.constraint_matrix = ConstraintMatrix::from_rows(vec![
            vec![true, false],
            vec![true, true],
            vec![true, true],
        ])
        .unwrap();
        props.solver_cache.cost_matrix =
            CostMatrix::from_rows(vec![vec![0.0, 1.0, 2.0], vec![5.0, 6.0, 7.0], vec![3.0, 4.0, 5.0]])
                .unwrap();
        let matrix = TenantRackConstraint::new(1, topology())
            .get_constraint_matrix(&mut hosts, &props)
            .unwrap();
        // r2 and r3 both fit two instances, r3 is cheaper
        assert_eq!(
            matrix.to_rows(),
            vec![vec![false, false], vec![false, false], vec![true, true]]
        );
    }

    #[test]
    fn test_new_tenant_rack_follows_composed_ram_cost() {
        use crate::core::request::InstanceType;
        use crate::core::scheduler::composer::MatrixComposer;
        use crate::core::scheduler::costs::resources::RamCost;
        use crate::core::scheduler::interface::SolverEngine;
        use crate::core::scheduler::solvers::fast::FastSolver;

        let new_props = || FilterProperties {
            project_id: Some("tenant".to_string()),
            instance_type: Some(InstanceType {
                memory_mb: 512,
                ..Default::default()
            }),
            ..FilterProperties::new(2)
        };
        let composer = || {
            MatrixComposer::new(
                vec![Box::new(TenantRackConstraint::new(1, topology()))],
                vec![Box::new(RamCost::new(1.0))],
            )
        };

        // host2 has the most free RAM, so r2 is the cheapest rack
        let mut hosts = hosts();
        hosts[1].free_ram_mb = 4096;
        let mut props = new_props();
        let (constraints, _) = composer().compose(&mut hosts, &mut props);
        assert_eq!(
            constraints.to_rows(),
            vec![vec![false, false], vec![true, true], vec![false, false]]
        );

        hosts[1].free_ram_mb = 1024;
        hosts[2].free_ram_mb = 4096;
        let assignments = FastSolver::new(composer()).solve(&mut hosts, &mut new_props());
        assert_eq!(
            assignments.iter().map(|a| a.host_index).collect::<Vec<_>>(),
            vec![2, 2]
        );
    }

    #[test]
    fn test_num_networks_per_rack() {
        let mut hosts = hosts();
        hosts[0].networks = BTreeSet::from(["net1".to_string(), "net2".to_string()]);
        let topology = Arc::new(RackTopology::from_map(HostRacks::from([
            ("host1".to_string(), BTreeSet::from(["r1".to_string()])),
            ("host2".to_string(), BTreeSet::from(["r1".to_string()])),
            ("host3".to_string(), BTreeSet::from(["r2".to_string()])),
        ])));
        let props = FilterProperties {
            requested_networks: vec!["net3".to_string()],
            ..FilterProperties::new(1)
        };
        let matrix = NumNetworksPerRackConstraint::new(2, topology)
            .get_constraint_matrix(&mut hosts, &props)
            .unwrap();
        assert_eq!(matrix.to_rows(), vec![vec![false], vec![false], vec![true]]);
    }
}
