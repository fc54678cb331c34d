//! Type definitions shared by host snapshots, requests and topology helpers.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};

/// Map from host name to the set of racks the host belongs to.
pub type HostRacks = BTreeMap<String, BTreeSet<String>>;

/// Named group of hosts sharing metadata (availability zone, allocation ratios, rack, ...).
#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Aggregate {
    pub name: String,
    #[serde(default)]
    pub hosts: BTreeSet<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Aggregate {
    pub fn new(name: &str, metadata: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            hosts: Default::default(),
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Scheduler hints carry either a single uuid or a list of them.
pub fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}
