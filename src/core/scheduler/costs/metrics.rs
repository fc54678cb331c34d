//! Weighted sum of host metrics reported by the compute nodes.

use log::{debug, warn};

use crate::config::{ConfigError, MetricsConfig};
use crate::core::host_state::HostState;
use crate::core::matrix::{normalize_cost_matrix, CostMatrix};
use crate::core::request::FilterProperties;
use crate::core::scheduler::costs::{extended_matrix_from_fn, Cost};
use crate::core::scheduler::interface::PluginError;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricWeight {
    pub name: String,
    pub ratio: f64,
}

/// Parses `name=ratio` entries.
pub fn parse_weight_setting(settings: &[String]) -> Result<Vec<MetricWeight>, ConfigError> {
    settings
        .iter()
        .map(|setting| {
            let malformed = || ConfigError::MalformedMetricsSetting(setting.clone());
            let (name, ratio) = setting.split_once('=').ok_or_else(malformed)?;
            let name = name.trim();
            if name.is_empty() {
                return Err(malformed());
            }
            let ratio = ratio.trim().parse::<f64>().map_err(|_| malformed())?;
            Ok(MetricWeight {
                name: name.to_string(),
                ratio,
            })
        })
        .collect()
}

/// Row `i` is `−Σ ratio·metric` for every column. Hosts missing any configured
/// metric get `min + (max − min) · weight_multiplier_of_unavailable`, computed
/// over the hosts that report all of them.
pub struct MetricsCost {
    multiplier: f64,
    weights: Vec<MetricWeight>,
    unavailable_multiplier: f64,
}

impl MetricsCost {
    pub fn new(multiplier: f64, config: &MetricsConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            multiplier,
            weights: parse_weight_setting(&config.weight_setting)?,
            unavailable_multiplier: config.weight_multiplier_of_unavailable,
        })
    }

    fn host_weight(&self, host: &HostState) -> Option<f64> {
        self.weights.iter().try_fold(0.0, |sum, weight| {
            host.metrics
                .get(&weight.name)
                .map(|value| sum + weight.ratio * value)
        })
    }
}

impl Cost for MetricsCost {
    fn name(&self) -> &str {
        "MetricsCost"
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
        if self.weights.is_empty() {
            warn!("{}: no metrics weight setting, cost is zero", self.name());
            return Ok(CostMatrix::zeros(hosts.len(), num_instances + 1));
        }

        let weights: Vec<Option<f64>> = hosts.iter().map(|host| self.host_weight(host)).collect();
        let available = weights.iter().flatten().copied();
        let min_weight = available.clone().fold(f64::INFINITY, f64::min);
        let max_weight = available.fold(f64::NEG_INFINITY, f64::max);
        let fill = if min_weight.is_finite() {
            min_weight + (max_weight - min_weight) * self.unavailable_multiplier
        } else {
            0.0
        };
        for (host, weight) in hosts.iter().zip(&weights) {
            if weight.is_none() {
                debug!("Host {} misses configured metrics, weight {}", host.host, fill);
            }
        }

        let matrix = extended_matrix_from_fn(hosts.len(), num_instances, |idx, _| {
            -weights[idx].unwrap_or(fill)
        });
        Ok(normalize_cost_matrix(&matrix))
    }
}
