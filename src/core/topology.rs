//! Aggregate metadata helpers and rack topology.
//!
//! Racks come from the `rack` key of host aggregates (plus racks tagged on the
//! host snapshot). When no candidate host carries rack information the
//! Cisco-ML2-style rack config file is used instead. That file is parsed once at
//! start-up and kept in a `RackTopology`.

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use ini::Ini;
use log::{error, warn};

use crate::config::SolverSchedulerConfig;
use crate::core::common::HostRacks;
use crate::core::host_state::HostState;

pub const RACK_AGGREGATE_KEY: &str = "rack";

/// Union of the values of metadata `key` over every aggregate containing the host.
pub fn aggregate_values_from_key(host: &HostState, key: &str) -> BTreeSet<String> {
    host.aggregates
        .iter()
        .filter_map(|aggregate| aggregate.metadata.get(key))
        .cloned()
        .collect()
}

/// Turns a set of aggregate values into one number.
///
/// No value gives `default`. Several values give the smallest one. Values
/// that fail to parse are ignored.
pub fn validate_num_values<T>(values: &BTreeSet<String>, default: T) -> T
where
    T: FromStr + PartialOrd + Copy,
{
    let parsed: Vec<T> = values
        .iter()
        .filter_map(|value| match value.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!("Ignoring aggregate value {:?}: not a number", value);
                None
            }
        })
        .collect();
    if parsed.len() > 1 {
        warn!("{} values found, the minimum is used", parsed.len());
    }
    parsed
        .into_iter()
        .reduce(|min, value| if value < min { value } else { min })
        .unwrap_or(default)
}

/// Parses the rack config file. Every section whose name starts with `prefix`
/// is one rack; every key in it is a host of that rack.
///
/// Any failure is logged and yields an empty map.
pub fn get_host_racks_config(path: &Path, prefix: &str) -> HostRacks {
    let mut host_racks = HostRacks::new();
    if prefix.is_empty() {
        error!("Rack config prefix is not set, rack config {:?} is ignored", path);
        return host_racks;
    }
    let config = match Ini::load_from_file(path) {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load rack config {:?}: {}", path, err);
            return host_racks;
        }
    };
    for (section, properties) in config.iter() {
        let Some(section) = section else { continue };
        let Some(rest) = section.strip_prefix(prefix) else {
            continue;
        };
        let rack = match rest.trim_start_matches(':') {
            "" => section.to_string(),
            rack => rack.to_string(),
        };
        for (host, _) in properties.iter() {
            host_racks
                .entry(host.to_string())
                .or_default()
                .insert(rack.clone());
        }
    }
    if host_racks.is_empty() {
        warn!("No rack with prefix {:?} found in {:?}", prefix, path);
    }
    host_racks
}

/// Rack information available to constraints and costs.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct RackTopology {
    configured: HostRacks,
}

impl RackTopology {
    pub fn from_map(configured: HostRacks) -> Self {
        Self { configured }
    }

    pub fn from_config(config: &SolverSchedulerConfig) -> Self {
        match &config.rack_config {
            Some(path) => Self::from_map(get_host_racks_config(path, &config.rack_config_prefix)),
            None => Self::default(),
        }
    }

    /// Host → racks map for the given hosts, from aggregates first and the rack
    /// config file when no host carries rack information.
    pub fn host_racks_map(&self, hosts: &[HostState]) -> HostRacks {
        let mut host_racks = HostRacks::new();
        for host in hosts {
            let mut racks = aggregate_values_from_key(host, RACK_AGGREGATE_KEY);
            racks.extend(host.racks.iter().cloned());
            if !racks.is_empty() {
                host_racks.insert(host.host.clone(), racks);
            }
        }
        if host_racks.is_empty() {
            return self.configured.clone();
        }
        host_racks
    }
}

/// Racks of `host`. A host without rack information is its own rack.
pub fn racks_or_host(host_racks: &HostRacks, host: &str) -> BTreeSet<String> {
    match host_racks.get(host) {
        Some(racks) if !racks.is_empty() => racks.clone(),
        _ => BTreeSet::from([host.to_string()]),
    }
}

/// Inverts a host → racks map into rack → hosts.
pub fn rack_hosts_map(host_racks: &HostRacks) -> HostRacks {
    let mut rack_hosts = HostRacks::new();
    for (host, racks) in host_racks {
        for rack in racks {
            rack_hosts.entry(rack.clone()).or_default().insert(host.clone());
        }
    }
    rack_hosts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::Aggregate;

    #[test]
    fn test_aggregate_values_union() {
        let mut host = HostState::new("host1", "node1");
        host.aggregates = vec![
            Aggregate::new("agg1", &[("ram_allocation_ratio", "1.5"), ("rack", "r1")]),
            Aggregate::new("agg2", &[("ram_allocation_ratio", "2.0")]),
            Aggregate::new("agg3", &[("ram_allocation_ratio", "1.5")]),
        ];
        assert_eq!(
            aggregate_values_from_key(&host, "ram_allocation_ratio"),
            BTreeSet::from(["1.5".to_string(), "2.0".to_string()])
        );
        assert!(aggregate_values_from_key(&host, "missing").is_empty());
    }

    #[test]
    fn test_validate_num_values() {
        let empty = BTreeSet::new();
        assert_eq!(validate_num_values(&empty, 16.0), 16.0);

        let single = BTreeSet::from(["3".to_string()]);
        assert_eq!(validate_num_values(&single, 10_u32), 3);

        let several = BTreeSet::from(["2.5".to_string(), "1.5".to_string(), "bogus".to_string()]);
        assert_eq!(validate_num_values(&several, 1.0), 1.5);
    }

    #[test]
    fn test_aggregates_take_priority_over_config() {
        let mut host1 = HostState::new("host1", "node1");
        host1.aggregates = vec![Aggregate::new("agg1", &[("rack", "aggregate_rack")])];
        let host2 = HostState::new("host2", "node2");

        let topology = RackTopology::from_map(HostRacks::from([(
            "host2".to_string(),
            BTreeSet::from(["config_rack".to_string()]),
        )]));

        let map = topology.host_racks_map(&[host1.clone(), host2.clone()]);
        assert_eq!(map.len(), 1);
        assert!(map["host1"].contains("aggregate_rack"));

        let map = topology.host_racks_map(&[host2]);
        assert!(map["host2"].contains("config_rack"));
    }

    #[test]
    fn test_rack_hosts_map() {
        let host_racks = HostRacks::from([
            ("h1".to_string(), BTreeSet::from(["r1".to_string()])),
            ("h2".to_string(), BTreeSet::from(["r1".to_string(), "r2".to_string()])),
        ]);
        let rack_hosts = rack_hosts_map(&host_racks);
        assert_eq!(rack_hosts["r1"].len(), 2);
        assert_eq!(rack_hosts["r2"], BTreeSet::from(["h2".to_string()]));
    }
}
