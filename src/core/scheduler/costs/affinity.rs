//! Soft same-host / different-host preferences from the `soft_same_host` and
//! `soft_different_host` hints.

use std::collections::BTreeSet;

use log::{debug, warn};

use crate::core::host_state::HostState;
use crate::core::matrix::CostMatrix;
use crate::core::request::FilterProperties;
use crate::core::scheduler::costs::{extended_matrix_from_fn, Cost};
use crate::core::scheduler::interface::{LookupError, PluginError};

/// Hosts running any of `uuids`. A failed lookup backend means no preference.
fn soft_affinity_hosts(
    cost: &str,
    hosts: &[HostState],
    filter_properties: &FilterProperties,
    uuids: &[String],
) -> Option<BTreeSet<String>> {
    match filter_properties
        .context
        .instance_locator
        .hosts_for_instances(hosts, uuids)
    {
        Ok(affinity_hosts) => Some(affinity_hosts),
        Err(LookupError::InstanceNotFound(uuids)) => {
            debug!("{}: no host runs {}", cost, uuids);
            Some(BTreeSet::new())
        }
        Err(err) => {
            warn!("{}: {}, no preference applied", cost, err);
            None
        }
    }
}

/// Rows are `−k/m` on hosts running a hinted instance and `1 − k/m` elsewhere,
/// `m` being the multiplier, so that composed rows read `−k` and `m − k`.
pub struct AffinityCost {
    multiplier: f64,
}

impl AffinityCost {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl Cost for AffinityCost {
    fn name(&self) -> &str {
        "AffinityCost"
    }

    fn cost_multiplier(&self) -> f64 {
        self.multiplier
    }

    fn get_extended_cost_matrix(
        &self,
        hosts: &[HostState],
        filter_properties: &FilterProperties,
    ) -> Result<CostMatrix, PluginError> {
        let num_instances = filter_properties.num_instances;
        let zeros = CostMatrix::zeros(hosts.len(), num_instances + 1);
        let uuids = &filter_properties.scheduler_hints.soft_same_host;
        if uuids.is_empty() || self.multiplier == 0.0 {
            return Ok(zeros);
        }
        let Some(affinity_hosts) = soft_affinity_hosts(self.name(), hosts, filter_properties, uuids)
        else {
            return Ok(zeros);
        };
        let multiplier = self.multiplier;
        Ok(extended_matrix_from_fn(hosts.len(), num_instances, |idx, k| {
            let step = k as f64 / multiplier;
            if affinity_hosts.contains(&hosts[idx].host) {
                -step
            } else {
                1.0 - step
            }
        }))
    }
}

/// Sign-flipped `AffinityCost`: `k/m` on hosts running a hinted instance and
/// `k/m − 1` elsewhere.
pub struct AntiAffinityCost {
    multiplier: f64,
}

impl AntiAffinityCost {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl Cost for AntiAffinityCost {
    fn name(&self) -> &str {
        "AntiAffinityCost"
    }

    fn cost_multiplier(&self) -> f64 {
        self.multiplier
    }

    fn get_extended_cost_matrix(
        &self,
        hosts: &[HostState],
        filter_properties: &FilterProperties,
    ) -> Result<CostMatrix, PluginError> {
        let num_instances = filter_properties.num_instances;
        let zeros = CostMatrix::zeros(hosts.len(), num_instances + 1);
        let uuids = &filter_properties.scheduler_hints.soft_different_host;
        if uuids.is_empty() || self.multiplier == 0.0 {
            return Ok(zeros);
        }
        let Some(affinity_hosts) = soft_affinity_hosts(self.name(), hosts, filter_properties, uuids)
        else {
            return Ok(zeros);
        };
        let multiplier = self.multiplier;
        Ok(extended_matrix_from_fn(hosts.len(), num_instances, |idx, k| {
            let step = k as f64 / multiplier;
            if affinity_hosts.contains(&hosts[idx].host) {
                step
            } else {
                step - 1.0
            }
        }))
    }
}
