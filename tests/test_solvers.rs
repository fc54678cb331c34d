use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use solver_scheduler::core::host_state::{HostState, InstanceInfo};
use solver_scheduler::core::request::FilterProperties;
use solver_scheduler::core::scheduler::composer::MatrixComposer;
use solver_scheduler::core::scheduler::constraints::affinity::{
    RackAffinityConstraint, ServerGroupAffinityConstraint,
};
use solver_scheduler::core::scheduler::constraints::Constraint;
use solver_scheduler::core::scheduler::costs::Cost;
use solver_scheduler::core::scheduler::interface::{Assignment, SolverEngine};
use solver_scheduler::core::scheduler::solvers::fast::FastSolver;
use solver_scheduler::core::scheduler::solvers::ilp::IlpSolver;
use solver_scheduler::core::topology::RackTopology;
use solver_scheduler::test_util::helpers::{create_hosts, FixedConstraint, FixedCost};

// Extended rows of the `[[i + j]]` cost matrix; column 0 is "no instance".
fn spread_costs() -> Vec<Vec<f64>> {
    vec![
        vec![-1.0, 0.0, 1.0, 2.0],
        vec![0.0, 1.0, 2.0, 3.0],
        vec![1.0, 2.0, 3.0, 4.0],
        vec![2.0, 3.0, 4.0, 5.0],
    ]
}

fn composer(constraints: Vec<Box<dyn Constraint>>, costs: Vec<Box<dyn Cost>>) -> MatrixComposer {
    MatrixComposer::new(constraints, costs)
}

fn fast(constraints: Vec<Box<dyn Constraint>>, costs: Vec<Box<dyn Cost>>) -> Box<dyn SolverEngine> {
    Box::new(FastSolver::new(composer(constraints, costs)))
}

fn ilp(constraints: Vec<Box<dyn Constraint>>, costs: Vec<Box<dyn Cost>>) -> Box<dyn SolverEngine> {
    Box::new(IlpSolver::new(composer(constraints, costs), Duration::from_secs(20)))
}

fn solve(engine: &dyn SolverEngine, hosts: &mut [HostState], num_instances: usize) -> Vec<String> {
    let mut props = FilterProperties::new(num_instances);
    solve_with(engine, hosts, &mut props)
}

fn solve_with(
    engine: &dyn SolverEngine,
    hosts: &mut [HostState],
    props: &mut FilterProperties,
) -> Vec<String> {
    engine
        .solve(hosts, props)
        .into_iter()
        .map(|Assignment { host_index, .. }| hosts[host_index].host.clone())
        .collect()
}

fn carved_constraint() -> FixedConstraint {
    FixedConstraint::from_rows(vec![
        vec![false, false, false],
        vec![true, false, false],
        vec![true, true, true],
        vec![true, true, true],
    ])
}

#[test]
fn test_spread_by_cost() {
    let mut hosts = create_hosts(4);
    let engine = fast(vec![], vec![Box::new(FixedCost::from_rows(spread_costs()))]);
    assert_eq!(solve(engine.as_ref(), &mut hosts, 3), vec!["h1", "h1", "h2"]);

    let engine = ilp(vec![], vec![Box::new(FixedCost::from_rows(spread_costs()))]);
    assert_eq!(solve(engine.as_ref(), &mut hosts, 3), vec!["h1", "h1", "h2"]);
}

#[test]
fn test_stack_by_negated_cost() {
    let mut hosts = create_hosts(4);
    let stacking = || Box::new(FixedCost::from_rows(spread_costs()).with_multiplier(-1.0));
    let engine = fast(vec![], vec![stacking()]);
    assert_eq!(solve(engine.as_ref(), &mut hosts, 3), vec!["h4", "h4", "h4"]);

    let engine = ilp(vec![], vec![stacking()]);
    assert_eq!(solve(engine.as_ref(), &mut hosts, 3), vec!["h4", "h4", "h4"]);
}

#[test]
fn test_capacity_constraint_carves_out_rows() {
    let mut hosts = create_hosts(4);
    let engine = fast(
        vec![Box::new(carved_constraint())],
        vec![Box::new(FixedCost::from_rows(spread_costs()))],
    );
    assert_eq!(solve(engine.as_ref(), &mut hosts, 3), vec!["h2", "h3", "h3"]);
}

#[test]
fn test_ilp_respects_carved_rows() {
    let mut hosts = create_hosts(4);
    let engine = ilp(
        vec![Box::new(carved_constraint())],
        vec![Box::new(FixedCost::from_rows(spread_costs()))],
    );
    let placed = solve(engine.as_ref(), &mut hosts, 3);
    // several optima; only feasibility is fixed
    assert_eq!(placed.len(), 3);
    assert!(!placed.contains(&"h1".to_string()));
    assert!(placed.iter().filter(|host| *host == "h2").count() <= 1);
}

#[test]
fn test_no_feasible_solution() {
    let mut hosts = create_hosts(4);
    let rejecting = || Box::new(FixedConstraint::from_rows(vec![vec![false; 3]; 4]));
    let engine = fast(vec![rejecting()], vec![]);
    assert!(solve(engine.as_ref(), &mut hosts, 3).is_empty());

    let engine = ilp(vec![rejecting()], vec![]);
    assert!(solve(engine.as_ref(), &mut hosts, 3).is_empty());
}

#[test]
fn test_new_affinity_group_lands_on_one_host() {
    let mut hosts = create_hosts(3);
    let mut props = FilterProperties::new(2);
    props.group_policies = BTreeSet::from(["affinity".to_string()]);

    let engine = fast(vec![Box::new(ServerGroupAffinityConstraint)], vec![]);
    assert_eq!(solve_with(engine.as_ref(), &mut hosts, &mut props), vec!["h1", "h1"]);

    let engine = ilp(vec![Box::new(ServerGroupAffinityConstraint)], vec![]);
    let placed = solve_with(engine.as_ref(), &mut hosts, &mut props);
    assert_eq!(placed.len(), 2);
    assert_eq!(placed[0], placed[1]);
}

#[test]
fn test_same_rack_hint() {
    let mut hosts = create_hosts(4);
    for (idx, host) in hosts.iter_mut().enumerate() {
        let rack = if idx < 2 { "rack1" } else { "rack2" };
        host.racks.insert(rack.to_string());
    }
    hosts[0].record_instance(InstanceInfo {
        uuid: "uuid-on-h1".to_string(),
        ..Default::default()
    });
    let mut props = FilterProperties::new(2);
    props.scheduler_hints.same_rack = vec!["uuid-on-h1".to_string()];

    let topology = Arc::new(RackTopology::default());
    let mut matrix_hosts = hosts.clone();
    let matrix = RackAffinityConstraint::same_rack(topology.clone())
        .get_constraint_matrix(&mut matrix_hosts, &props)
        .unwrap();
    assert_eq!(
        matrix.to_rows(),
        vec![vec![true, true], vec![true, true], vec![false, false], vec![false, false]]
    );

    let engine = fast(vec![Box::new(RackAffinityConstraint::same_rack(topology.clone()))], vec![]);
    assert_eq!(solve_with(engine.as_ref(), &mut hosts, &mut props), vec!["h1", "h1"]);

    let engine = ilp(vec![Box::new(RackAffinityConstraint::same_rack(topology))], vec![]);
    let placed = solve_with(engine.as_ref(), &mut hosts, &mut props);
    assert_eq!(placed.len(), 2);
    assert!(placed.iter().all(|host| host == "h1" || host == "h2"));
}

#[test]
fn test_instance_uuids_follow_host_order() {
    let mut hosts = create_hosts(4);
    let engine = fast(vec![], vec![Box::new(FixedCost::from_rows(spread_costs()))]);
    let mut props = FilterProperties::new(3);
    props.instance_uuids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let assignments = engine.solve(&mut hosts, &mut props);
    let pairs: Vec<(usize, &str)> = assignments
        .iter()
        .map(|assignment| (assignment.host_index, assignment.instance_uuid.as_str()))
        .collect();
    assert_eq!(pairs, vec![(0, "a"), (0, "b"), (1, "c")]);
}
