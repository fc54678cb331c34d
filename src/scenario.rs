//! Scheduling scenario read from YAML: a host snapshot plus one request to place on it.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::core::host_state::HostState;
use crate::core::request::{FilterProperties, RequestSpec};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("could not read scenario file {path:?}: {reason}")]
    Io { path: std::path::PathBuf, reason: String },
    #[error("could not parse scenario: {0}")]
    Parse(String),
}

#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_request_id")]
    pub request_id: String,
    pub hosts: Vec<HostState>,
    #[serde(default)]
    pub request_spec: RequestSpec,
    #[serde(default)]
    pub filter_properties: FilterProperties,
}

fn default_request_id() -> String {
    "req-scenario".to_string()
}

impl Scenario {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ScenarioError> {
        serde_yaml::from_str::<Scenario>(yaml).map_err(|err| ScenarioError::Parse(err.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ScenarioError> {
        let yaml = std::fs::read_to_string(path).map_err(|err| ScenarioError::Io {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Self::from_yaml_str(&yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_yaml_str(
            r#"
            hosts:
              - host: host1
                nodename: node1
                total_ram_mb: 4096
                free_ram_mb: 2048
                total_usable_disk_gb: 40
                free_disk_mb: 20480
                vcpus_total: 4
                aggregates:
                  - name: agg1
                    metadata:
                      availability_zone: az1
            request_spec:
              num_instances: 2
              instance_type:
                memory_mb: 512
            filter_properties:
              scheduler_hints:
                same_host: instance-1
              ignore_hosts: [host2]
            "#,
        )
        .unwrap();

        assert_eq!(scenario.request_id, "req-scenario");
        assert_eq!(scenario.hosts.len(), 1);
        assert!(scenario.hosts[0].service_up);
        assert_eq!(scenario.request_spec.num_instances, 2);
        assert_eq!(
            scenario.filter_properties.scheduler_hints.same_host,
            vec!["instance-1".to_string()]
        );
        assert_eq!(scenario.filter_properties.ignore_hosts, vec!["host2".to_string()]);
    }

    #[test]
    fn test_missing_hosts_is_parse_error() {
        assert!(matches!(
            Scenario::from_yaml_str("request_spec: {}"),
            Err(ScenarioError::Parse(_))
        ));
    }
}
