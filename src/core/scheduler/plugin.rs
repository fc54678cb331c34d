use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use log::info;

use crate::config::{ConfigError, SolverSchedulerConfig};
use crate::core::scheduler::composer::MatrixComposer;
use crate::core::scheduler::constraints::affinity::{
    HostAffinityConstraint, RackAffinityConstraint, ServerGroupAffinityConstraint,
    ServerGroupAntiAffinityConstraint,
};
use crate::core::scheduler::constraints::filters::{
    ActiveHostsFilter, AggregateMultiTenancyIsolationFilter, AggregateTypeAffinityFilter,
    AllHostsFilter, AvailabilityZoneFilter, ImagePropertiesFilter, JsonFilter, RetryFilter,
    SimpleCidrAffinityFilter, TrustedHostsFilter,
};
use crate::core::scheduler::constraints::limits::{
    IoOpsConstraint, NumInstancesConstraint, NumNetworksConstraint,
};
use crate::core::scheduler::constraints::numa_pci::{NumaTopologyConstraint, PciPassthroughConstraint};
use crate::core::scheduler::constraints::racks::{NumNetworksPerRackConstraint, TenantRackConstraint};
use crate::core::scheduler::constraints::resources::{
    DiskConstraint, ExactConstraint, ExactResource, RamConstraint, VcpuConstraint,
};
use crate::core::scheduler::constraints::{Constraint, FilterConstraint};
use crate::core::scheduler::costs::affinity::{AffinityCost, AntiAffinityCost};
use crate::core::scheduler::costs::metrics::MetricsCost;
use crate::core::scheduler::costs::racks::{RackNetworkAffinityCost, TenantRackAffinityCost};
use crate::core::scheduler::costs::resources::{IoOpsCost, RamCost, VcpuCost};
use crate::core::scheduler::costs::Cost;
use crate::core::scheduler::interface::SolverEngine;
use crate::core::scheduler::solvers::fast::FastSolver;
use crate::core::scheduler::solvers::ilp::IlpSolver;
use crate::core::topology::RackTopology;

// Everything a plugin factory may read: the scheduler configuration and the rack
// topology parsed at start-up.
pub struct PluginContext {
    pub config: SolverSchedulerConfig,
    pub topology: Arc<RackTopology>,
}

impl PluginContext {
    pub fn new(config: SolverSchedulerConfig, topology: Arc<RackTopology>) -> Self {
        Self { config, topology }
    }
}

pub type ConstraintFactory = fn(&PluginContext) -> Result<Box<dyn Constraint>, ConfigError>;
pub type CostFactory = fn(&PluginContext) -> Result<Box<dyn Cost>, ConfigError>;
pub type SolverFactory = fn(&PluginContext, MatrixComposer) -> Box<dyn SolverEngine>;

lazy_static! {
    pub static ref CONSTRAINT_REGISTRY: HashMap<&'static str, ConstraintFactory> = {
        let mut registry: HashMap<&'static str, ConstraintFactory> = HashMap::new();
        registry.insert("RamConstraint", |ctx| {
            Ok(Box::new(RamConstraint::new(ctx.config.ram_allocation_ratio)))
        });
        registry.insert("AggregateRamConstraint", |ctx| {
            Ok(Box::new(RamConstraint::from_aggregates(ctx.config.ram_allocation_ratio)))
        });
        registry.insert("DiskConstraint", |ctx| {
            Ok(Box::new(DiskConstraint::new(ctx.config.disk_allocation_ratio)))
        });
        registry.insert("AggregateDiskConstraint", |ctx| {
            Ok(Box::new(DiskConstraint::from_aggregates(ctx.config.disk_allocation_ratio)))
        });
        registry.insert("VcpuConstraint", |ctx| {
            Ok(Box::new(VcpuConstraint::new(ctx.config.cpu_allocation_ratio)))
        });
        registry.insert("AggregateVcpuConstraint", |ctx| {
            Ok(Box::new(VcpuConstraint::from_aggregates(ctx.config.cpu_allocation_ratio)))
        });
        registry.insert("ExactRamConstraint", |_| {
            Ok(Box::new(ExactConstraint::new(ExactResource::Ram)))
        });
        registry.insert("ExactDiskConstraint", |_| {
            Ok(Box::new(ExactConstraint::new(ExactResource::Disk)))
        });
        registry.insert("ExactVcpuConstraint", |_| {
            Ok(Box::new(ExactConstraint::new(ExactResource::Vcpu)))
        });
        registry.insert("IoOpsConstraint", |ctx| {
            Ok(Box::new(IoOpsConstraint::new(ctx.config.max_io_ops_per_host)))
        });
        registry.insert("NumInstancesConstraint", |ctx| {
            Ok(Box::new(NumInstancesConstraint::new(ctx.config.max_instances_per_host)))
        });
        registry.insert("NumNetworksConstraint", |ctx| {
            Ok(Box::new(NumNetworksConstraint::new(ctx.config.max_networks_per_host)))
        });
        registry.insert("NumNetworksPerRackConstraint", |ctx| {
            Ok(Box::new(NumNetworksPerRackConstraint::new(
                ctx.config.max_networks_per_rack,
                ctx.topology.clone(),
            )))
        });
        registry.insert("NumaTopologyConstraint", |ctx| {
            Ok(Box::new(NumaTopologyConstraint::new(
                ctx.config.cpu_allocation_ratio,
                ctx.config.ram_allocation_ratio,
            )))
        });
        registry.insert("PciPassthroughConstraint", |_| Ok(Box::new(PciPassthroughConstraint)));
        registry.insert("SameHostConstraint", |_| Ok(Box::new(HostAffinityConstraint::same_host())));
        registry.insert("DifferentHostConstraint", |_| {
            Ok(Box::new(HostAffinityConstraint::different_host()))
        });
        registry.insert("SameRackConstraint", |ctx| {
            Ok(Box::new(RackAffinityConstraint::same_rack(ctx.topology.clone())))
        });
        registry.insert("DifferentRackConstraint", |ctx| {
            Ok(Box::new(RackAffinityConstraint::different_rack(ctx.topology.clone())))
        });
        registry.insert("ServerGroupAffinityConstraint", |_| {
            Ok(Box::new(ServerGroupAffinityConstraint))
        });
        registry.insert("ServerGroupAntiAffinityConstraint", |_| {
            Ok(Box::new(ServerGroupAntiAffinityConstraint))
        });
        registry.insert("TenantRackConstraint", |ctx| {
            Ok(Box::new(TenantRackConstraint::new(
                ctx.config.max_racks_per_tenant,
                ctx.topology.clone(),
            )))
        });
        registry.insert("ActiveHostsConstraint", |_| {
            Ok(Box::new(FilterConstraint::new(ActiveHostsFilter)))
        });
        registry.insert("AllHostsConstraint", |_| Ok(Box::new(FilterConstraint::new(AllHostsFilter))));
        registry.insert("ImagePropertiesConstraint", |_| {
            Ok(Box::new(FilterConstraint::new(ImagePropertiesFilter)))
        });
        registry.insert("JsonConstraint", |_| Ok(Box::new(FilterConstraint::new(JsonFilter))));
        registry.insert("SimpleCidrAffinityConstraint", |_| {
            Ok(Box::new(FilterConstraint::new(SimpleCidrAffinityFilter)))
        });
        registry.insert("AggregateTypeAffinityConstraint", |_| {
            Ok(Box::new(FilterConstraint::new(AggregateTypeAffinityFilter)))
        });
        registry.insert("AggregateMultiTenancyIsolationConstraint", |_| {
            Ok(Box::new(FilterConstraint::new(AggregateMultiTenancyIsolationFilter)))
        });
        registry.insert("AvailabilityZoneConstraint", |ctx| {
            Ok(Box::new(FilterConstraint::new(AvailabilityZoneFilter::new(
                &ctx.config.default_availability_zone,
            ))))
        });
        registry.insert("TrustedHostsConstraint", |_| {
            Ok(Box::new(FilterConstraint::new(TrustedHostsFilter)))
        });
        registry.insert("RetryConstraint", |_| Ok(Box::new(FilterConstraint::new(RetryFilter))));
        registry
    };

    pub static ref COST_REGISTRY: HashMap<&'static str, CostFactory> = {
        let mut registry: HashMap<&'static str, CostFactory> = HashMap::new();
        registry.insert("RamCost", |ctx| Ok(Box::new(RamCost::new(ctx.config.ram_cost_multiplier))));
        registry.insert("VcpuCost", |ctx| Ok(Box::new(VcpuCost::new(ctx.config.vcpu_cost_multiplier))));
        registry.insert("IoOpsCost", |ctx| {
            Ok(Box::new(IoOpsCost::new(ctx.config.io_ops_cost_multiplier)))
        });
        registry.insert("MetricsCost", |ctx| {
            Ok(Box::new(MetricsCost::new(
                ctx.config.metrics_cost_multiplier,
                &ctx.config.metrics,
            )?))
        });
        registry.insert("AffinityCost", |ctx| {
            Ok(Box::new(AffinityCost::new(ctx.config.affinity_cost_multiplier)))
        });
        registry.insert("AntiAffinityCost", |ctx| {
            Ok(Box::new(AntiAffinityCost::new(ctx.config.anti_affinity_cost_multiplier)))
        });
        registry.insert("TenantRackAffinityCost", |ctx| {
            Ok(Box::new(TenantRackAffinityCost::new(
                ctx.config.tenant_rack_affinity_cost_multiplier,
                ctx.topology.clone(),
            )))
        });
        registry.insert("RackNetworkAffinityCost", |ctx| {
            Ok(Box::new(RackNetworkAffinityCost::new(
                ctx.config.rack_network_affinity_cost_multiplier,
                ctx.topology.clone(),
            )))
        });
        registry
    };

    pub static ref SOLVER_REGISTRY: HashMap<&'static str, SolverFactory> = {
        let mut registry: HashMap<&'static str, SolverFactory> = HashMap::new();
        registry.insert("FastSolver", |_, composer| Box::new(FastSolver::new(composer)));
        registry.insert("IlpSolver", |ctx, composer| {
            Box::new(IlpSolver::new(
                composer,
                Duration::from_secs(ctx.config.pulp_solver_timeout_seconds),
            ))
        });
        registry
    };
}

/// Registry key of a configured name: its last `.` or `::` separated segment, so
/// that fully qualified class paths resolve to the same entry as bare names.
pub fn short_name(name: &str) -> &str {
    name.rsplit(['.', ':']).next().unwrap_or(name).trim()
}

pub fn build_constraints(
    names: &[String],
    ctx: &PluginContext,
) -> Result<Vec<Box<dyn Constraint>>, ConfigError> {
    names
        .iter()
        .map(|name| match CONSTRAINT_REGISTRY.get(short_name(name)) {
            Some(factory) => factory(ctx),
            None => Err(ConfigError::UnknownConstraint(name.clone())),
        })
        .collect()
}

pub fn build_costs(names: &[String], ctx: &PluginContext) -> Result<Vec<Box<dyn Cost>>, ConfigError> {
    names
        .iter()
        .map(|name| match COST_REGISTRY.get(short_name(name)) {
            Some(factory) => factory(ctx),
            None => Err(ConfigError::UnknownCost(name.clone())),
        })
        .collect()
}

/// Builds the configured solver engine with the configured constraints and costs.
pub fn build_solver(ctx: &PluginContext) -> Result<Box<dyn SolverEngine>, ConfigError> {
    let solver_name = &ctx.config.scheduler_host_solver;
    let factory = SOLVER_REGISTRY
        .get(short_name(solver_name))
        .ok_or_else(|| ConfigError::UnknownSolver(solver_name.clone()))?;
    let composer = MatrixComposer::new(
        build_constraints(&ctx.config.scheduler_solver_constraints, ctx)?,
        build_costs(&ctx.config.scheduler_solver_costs, ctx)?,
    );
    info!(
        "{} composes constraints {:?} and costs {:?}",
        short_name(solver_name),
        composer.constraint_names(),
        composer.cost_names()
    );
    Ok(factory(ctx, composer))
}
