//! Seams between the solver core and its external collaborators.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::core::host_state::HostState;
use crate::core::request::FilterProperties;

#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("no valid host was found: {0}")]
    NoValidHost(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("exceeded max scheduling attempts {max} for this request")]
    MaxRetriesExceeded { max: u32 },
}

/// Failure inside a single constraint or cost. The composer logs it and falls
/// back to a neutral matrix so that other plugins are not affected.
#[derive(Debug, Error, PartialEq)]
pub enum PluginError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("lookup failed: {0}")]
    Lookup(#[from] LookupError),
}

#[derive(Debug, Error, PartialEq)]
pub enum LookupError {
    #[error("instance {0} not found")]
    InstanceNotFound(String),
    #[error("lookup backend unavailable: {0}")]
    Unavailable(String),
}

/// Resolves instance uuids to the hosts currently running them.
pub trait InstanceLocator: Send + Sync {
    fn hosts_for_instances(
        &self,
        hosts: &[HostState],
        instance_uuids: &[String],
    ) -> Result<BTreeSet<String>, LookupError>;
}

/// Locator that only looks at the instance lists of the host snapshot.
/// Fails with `InstanceNotFound` when none of the uuids runs on a snapshot host.
#[derive(Default, Debug)]
pub struct SnapshotInstanceLocator;

impl InstanceLocator for SnapshotInstanceLocator {
    fn hosts_for_instances(
        &self,
        hosts: &[HostState],
        instance_uuids: &[String],
    ) -> Result<BTreeSet<String>, LookupError> {
        let found: BTreeSet<String> = hosts
            .iter()
            .filter(|host| {
                instance_uuids
                    .iter()
                    .any(|uuid| host.instances.contains_key(uuid))
            })
            .map(|host| host.host.clone())
            .collect();
        if found.is_empty() && !instance_uuids.is_empty() {
            return Err(LookupError::InstanceNotFound(instance_uuids.join(", ")));
        }
        Ok(found)
    }
}

/// Per-request context handed down with the filter properties.
#[derive(Clone)]
pub struct SchedulerContext {
    pub request_id: String,
    pub instance_locator: Arc<dyn InstanceLocator>,
}

impl SchedulerContext {
    pub fn new(request_id: &str, instance_locator: Arc<dyn InstanceLocator>) -> Self {
        Self {
            request_id: request_id.to_string(),
            instance_locator,
        }
    }
}

impl Default for SchedulerContext {
    fn default() -> Self {
        Self::new("", Arc::new(SnapshotInstanceLocator))
    }
}

impl fmt::Debug for SchedulerContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SchedulerContext")
            .field("request_id", &self.request_id)
            .finish()
    }
}

/// Source of candidate host snapshots.
pub trait HostStateProvider {
    fn get_all_host_states(&self, context: &SchedulerContext) -> Vec<HostState>;
}

/// Provider serving a fixed snapshot, used by the CLI and tests.
#[derive(Default, Debug, Clone)]
pub struct StaticHostStateProvider {
    pub hosts: Vec<HostState>,
}

impl StaticHostStateProvider {
    pub fn new(hosts: Vec<HostState>) -> Self {
        Self { hosts }
    }
}

impl HostStateProvider for StaticHostStateProvider {
    fn get_all_host_states(&self, _context: &SchedulerContext) -> Vec<HostState> {
        self.hosts.clone()
    }
}

/// One placed instance: index into the solved host list and the instance uuid.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub host_index: usize,
    pub instance_uuid: String,
}

/// Host chosen by the scheduler, with the default weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeighedHost {
    pub host: HostState,
    pub instance_uuid: Option<String>,
    pub weight: f64,
}

// Trait which should implement any solver engine.
pub trait SolverEngine: Send + Sync {
    // Decides a host for every instance of the batch. An empty result means the
    // batch cannot be placed; partial placements are never returned.
    fn solve(&self, hosts: &mut [HostState], filter_properties: &mut FilterProperties)
        -> Vec<Assignment>;
}
