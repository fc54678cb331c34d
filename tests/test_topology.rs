use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;

use solver_scheduler::config::SolverSchedulerConfig;
use solver_scheduler::core::request::FilterProperties;
use solver_scheduler::core::scheduler::constraints::racks::TenantRackConstraint;
use solver_scheduler::core::scheduler::constraints::Constraint;
use solver_scheduler::core::topology::{get_host_racks_config, RackTopology};
use solver_scheduler::test_util::helpers::create_hosts;

const RACKS_INI: &str = r#"
[DEFAULT]
unused = 1

[ml2_mech_cisco_nexus:1.1.1.1]
h1 = 1/1
h2 = 1/2

[ml2_mech_cisco_nexus:2.2.2.2]
h3 = 1/1
h4 = 1/2
h2 = 1/3

[some_other_section]
h5 = 1/1
"#;

fn racks_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(RACKS_INI.as_bytes()).unwrap();
    file
}

#[test]
fn test_rack_config_sections_by_prefix() {
    let file = racks_file();
    let host_racks = get_host_racks_config(file.path(), "ml2_mech_cisco_nexus");

    assert_eq!(host_racks.len(), 4);
    assert_eq!(host_racks["h1"], BTreeSet::from(["1.1.1.1".to_string()]));
    assert_eq!(
        host_racks["h2"],
        BTreeSet::from(["1.1.1.1".to_string(), "2.2.2.2".to_string()])
    );
    assert!(!host_racks.contains_key("h5"));
}

#[test]
fn test_rack_config_failures_give_empty_map() {
    let file = racks_file();
    assert!(get_host_racks_config(file.path(), "").is_empty());
    assert!(get_host_racks_config(file.path(), "no_such_prefix").is_empty());

    let dir = tempfile::tempdir().unwrap();
    assert!(get_host_racks_config(&dir.path().join("missing.ini"), "ml2_mech_cisco_nexus").is_empty());
}

#[test]
fn test_topology_from_config_feeds_rack_constraints() {
    let file = racks_file();
    let config = SolverSchedulerConfig {
        rack_config: Some(file.path().to_path_buf()),
        rack_config_prefix: "ml2_mech_cisco_nexus".to_string(),
        max_racks_per_tenant: 1,
        ..Default::default()
    };
    let topology = Arc::new(RackTopology::from_config(&config));

    let mut hosts = create_hosts(4);
    hosts[2].projects.insert("tenant".to_string());
    let props = FilterProperties {
        num_instances: 2,
        project_id: Some("tenant".to_string()),
        ..Default::default()
    };

    let matrix = TenantRackConstraint::new(config.max_racks_per_tenant, topology)
        .get_constraint_matrix(&mut hosts, &props)
        .unwrap();
    // h2 sits in both racks, h1 only in the rack the tenant does not use
    assert_eq!(
        matrix.to_rows(),
        vec![vec![false, false], vec![true, true], vec![true, true], vec![true, true]]
    );
}
