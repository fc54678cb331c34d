//! Scheduler façade: prepares the filter properties, fetches the candidate hosts
//! and runs the configured solver engine on them.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::{ConfigError, SolverSchedulerConfig};
use crate::core::host_state::InstanceInfo;
use crate::core::request::{FilterProperties, RequestSpec, RetryInfo, SolverCache};
use crate::core::scheduler::interface::{
    HostStateProvider, ScheduleError, SchedulerContext, SolverEngine, WeighedHost,
};
use crate::core::scheduler::plugin::{build_solver, PluginContext};
use crate::core::topology::RackTopology;

/// Fills the request fields the caller did not set in the filter properties.
fn merge_request_spec(request_spec: &RequestSpec, filter_properties: &mut FilterProperties) {
    if filter_properties.instance_type.is_none() {
        filter_properties.instance_type = request_spec.instance_type.clone();
    }
    if filter_properties.project_id.is_none() {
        filter_properties.project_id = request_spec.project_id.clone();
    }
    if filter_properties.image_properties.is_empty() {
        filter_properties.image_properties = request_spec.image.clone();
    }
    if filter_properties.availability_zone.is_none() {
        filter_properties.availability_zone = request_spec.availability_zone.clone();
    }
    if filter_properties.requested_networks.is_empty() {
        filter_properties.requested_networks = request_spec.requested_networks.clone();
    }
}

pub struct SolverScheduler {
    config: SolverSchedulerConfig,
    host_state_provider: Box<dyn HostStateProvider>,
    engine: Box<dyn SolverEngine>,
}

impl SolverScheduler {
    pub fn new(
        config: SolverSchedulerConfig,
        host_state_provider: Box<dyn HostStateProvider>,
        engine: Box<dyn SolverEngine>,
    ) -> Self {
        Self {
            config,
            host_state_provider,
            engine,
        }
    }

    /// Parses the rack config and builds the configured solver, constraints and costs.
    pub fn from_config(
        config: SolverSchedulerConfig,
        host_state_provider: Box<dyn HostStateProvider>,
    ) -> Result<Self, ConfigError> {
        let topology = Arc::new(RackTopology::from_config(&config));
        let engine = build_solver(&PluginContext::new(config.clone(), topology))?;
        Ok(Self::new(config, host_state_provider, engine))
    }

    /// Copies the request into the filter properties and stamps the retry counter.
    ///
    /// Fails once the request has been attempted more than `scheduler_max_attempts` times.
    pub fn populate_filter_properties(
        &self,
        request_spec: &RequestSpec,
        filter_properties: &mut FilterProperties,
    ) -> Result<(), ScheduleError> {
        merge_request_spec(request_spec, filter_properties);

        let max_attempts = self.config.scheduler_max_attempts.max(1);
        if max_attempts == 1 {
            // retries disabled
            filter_properties.retry = None;
            return Ok(());
        }
        let retry = filter_properties.retry.get_or_insert_with(RetryInfo::default);
        retry.num_attempts += 1;
        if retry.num_attempts > max_attempts {
            return Err(ScheduleError::MaxRetriesExceeded { max: max_attempts });
        }
        Ok(())
    }

    /// Places every instance of the request, or fails with `NoValidHost`.
    ///
    /// Returned hosts have the whole batch consumed on them.
    ///
    /// With forced hosts or nodes the solver is skipped and the matching
    /// candidate hosts are returned as they are.
    pub fn schedule(
        &self,
        context: &SchedulerContext,
        request_spec: &RequestSpec,
        mut filter_properties: FilterProperties,
    ) -> Result<Vec<WeighedHost>, ScheduleError> {
        let num_instances = if request_spec.instance_uuids.is_empty() {
            request_spec.num_instances
        } else {
            request_spec.instance_uuids.len()
        };
        if num_instances == 0 {
            return Err(ScheduleError::InvalidRequest(
                "request asks for zero instances".to_string(),
            ));
        }
        merge_request_spec(request_spec, &mut filter_properties);
        filter_properties.context = context.clone();
        filter_properties.num_instances = num_instances;
        filter_properties.instance_uuids = request_spec.instance_uuids.clone();
        filter_properties.solver_cache = SolverCache::default();

        let mut hosts = self.host_state_provider.get_all_host_states(context);
        let num_candidates = hosts.len();
        hosts.retain(|host| !filter_properties.ignore_hosts.contains(&host.host));
        debug!(
            "Request {}: {} of {} hosts left after ignoring {:?}",
            context.request_id,
            hosts.len(),
            num_candidates,
            filter_properties.ignore_hosts
        );

        let force_hosts = &filter_properties.force_hosts;
        let force_nodes = &filter_properties.force_nodes;
        if !force_hosts.is_empty() || !force_nodes.is_empty() {
            hosts.retain(|host| {
                (force_hosts.is_empty() || force_hosts.contains(&host.host))
                    && (force_nodes.is_empty() || force_nodes.contains(&host.nodename))
            });
            info!(
                "Request {}: forced to hosts {:?} nodes {:?}, {} hosts match",
                context.request_id,
                force_hosts,
                force_nodes,
                hosts.len()
            );
            if hosts.is_empty() {
                return Err(ScheduleError::NoValidHost(
                    "no candidate host matches the forced hosts or nodes".to_string(),
                ));
            }
            return Ok(hosts
                .into_iter()
                .map(|host| WeighedHost {
                    host,
                    instance_uuid: None,
                    weight: 1.0,
                })
                .collect());
        }

        let assignments = self.engine.solve(&mut hosts, &mut filter_properties);
        filter_properties.solver_cache = SolverCache::default();
        if assignments.is_empty() {
            return Err(ScheduleError::NoValidHost(format!(
                "{} instances could not be placed on {} hosts",
                num_instances,
                hosts.len()
            )));
        }
        info!(
            "Request {}: placed {} instances",
            context.request_id,
            assignments.len()
        );

        let instance_type = filter_properties.instance_type.clone().unwrap_or_default();
        for assignment in &assignments {
            let instance = InstanceInfo {
                uuid: assignment.instance_uuid.clone(),
                project_id: filter_properties.project_id.clone().unwrap_or_default(),
                networks: filter_properties.requested_networks.clone(),
            };
            if let Err(err) = hosts[assignment.host_index].consume(&instance_type, instance) {
                warn!("Request {}: {}", context.request_id, err);
            }
        }
        Ok(assignments
            .into_iter()
            .map(|assignment| WeighedHost {
                host: hosts[assignment.host_index].clone(),
                instance_uuid: Some(assignment.instance_uuid),
                weight: 1.0,
            })
            .collect())
    }
}
