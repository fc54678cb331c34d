//! Host predicates used through `FilterConstraint`. Each one either accepts a host for
//! the whole batch or rejects it.

use std::net::Ipv4Addr;

use log::{debug, warn};
use serde_json::Value;

use crate::core::host_state::HostState;
use crate::core::request::FilterProperties;
use crate::core::scheduler::constraints::HostFilter;
use crate::core::scheduler::interface::PluginError;
use crate::core::topology::aggregate_values_from_key;

// Hosts whose compute service is up and enabled.
pub struct ActiveHostsFilter;

impl HostFilter for ActiveHostsFilter {
    fn name(&self) -> &str {
        "ActiveHostsConstraint"
    }

    fn host_passes(&self, host: &HostState, _: &FilterProperties) -> Result<bool, PluginError> {
        if !host.service_up || host.service_disabled {
            debug!(
                "Host {} is not active (up: {}, disabled: {})",
                host.host, host.service_up, host.service_disabled
            );
            return Ok(false);
        }
        Ok(true)
    }
}

pub struct AllHostsFilter;

impl HostFilter for AllHostsFilter {
    fn name(&self) -> &str {
        "AllHostsConstraint"
    }

    fn host_passes(&self, _: &HostState, _: &FilterProperties) -> Result<bool, PluginError> {
        Ok(true)
    }
}

// Hosts supporting the architecture, hypervisor type and vm mode the image asks for.
pub struct ImagePropertiesFilter;

impl HostFilter for ImagePropertiesFilter {
    fn name(&self) -> &str {
        "ImagePropertiesConstraint"
    }

    fn host_passes(
        &self,
        host: &HostState,
        filter_properties: &FilterProperties,
    ) -> Result<bool, PluginError> {
        let image = &filter_properties.image_properties;
        if image.is_empty() {
            return Ok(true);
        }
        let matches = |wanted: &Option<String>, supported: &str| {
            wanted
                .as_ref()
                .map_or(true, |wanted| wanted.eq_ignore_ascii_case(supported))
        };
        Ok(host.supported_instances.iter().any(|supported| {
            matches(&image.architecture, &supported.architecture)
                && matches(&image.hypervisor_type, &supported.hypervisor_type)
                && matches(&image.vm_mode, &supported.vm_mode)
        }))
    }
}

/// Evaluates the `query` hint, a JSON expression in prefix notation such as
/// `[">=", "$free_ram_mb", 1024]`, against each host.
///
/// Operators: `=`, `<`, `>`, `<=`, `>=`, `in`, `not`, `and`, `or`. Strings starting
/// with `$` name a host attribute (`$metrics.<name>` for metrics); unknown ones are
/// dropped from the argument list.
pub struct JsonFilter;

impl JsonFilter {
    fn host_attribute(host: &HostState, name: &str) -> Option<Value> {
        if let Some(metric) = name.strip_prefix("metrics.") {
            return host.metrics.get(metric).map(|value| Value::from(*value));
        }
        let value = match name {
            "host" => Value::from(host.host.as_str()),
            "nodename" => Value::from(host.nodename.as_str()),
            "total_ram_mb" => Value::from(host.total_ram_mb),
            "free_ram_mb" => Value::from(host.free_ram_mb),
            "total_usable_disk_gb" => Value::from(host.total_usable_disk_gb),
            "free_disk_mb" => Value::from(host.free_disk_mb),
            "vcpus_total" => Value::from(host.vcpus_total),
            "vcpus_used" => Value::from(host.vcpus_used),
            "num_io_ops" => Value::from(host.num_io_ops),
            "num_instances" => Value::from(host.num_instances),
            "host_ip" => Value::from(host.host_ip.clone()?),
            _ => return None,
        };
        Some(value)
    }

    fn truthy(value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::Bool(value) => *value,
            Value::Number(number) => number.as_f64().map_or(false, |number| number != 0.0),
            Value::String(string) => !string.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
        }
    }

    fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
        match (left, right) {
            (Value::Number(left), Value::Number(right)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
            (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
            (Value::Bool(left), Value::Bool(right)) => Some(left.cmp(right)),
            _ => None,
        }
    }

    /// Every adjacent pair of `args` satisfies `accept`.
    fn chain(args: &[Value], accept: fn(std::cmp::Ordering) -> bool) -> bool {
        args.windows(2)
            .all(|pair| Self::compare(&pair[0], &pair[1]).map_or(false, accept))
    }

    fn evaluate(expression: &[Value], host: &HostState) -> Result<Value, PluginError> {
        let Some((operator, args)) = expression.split_first() else {
            return Ok(Value::Bool(true));
        };
        let Some(operator) = operator.as_str() else {
            return Err(PluginError::InvalidInput(format!(
                "operator must be a string, got {}",
                operator
            )));
        };

        let mut cooked = Vec::with_capacity(args.len());
        for arg in args {
            let value = match arg {
                Value::Array(inner) => Some(Self::evaluate(inner, host)?),
                Value::String(string) => match string.strip_prefix('$') {
                    Some(attribute) => Self::host_attribute(host, attribute),
                    None => Some(arg.clone()),
                },
                other => Some(other.clone()),
            };
            if let Some(value) = value {
                cooked.push(value);
            }
        }

        use std::cmp::Ordering::*;
        let result = match operator {
            "=" => Self::chain(&cooked, |ord| ord == Equal),
            "<" => Self::chain(&cooked, |ord| ord == Less),
            ">" => Self::chain(&cooked, |ord| ord == Greater),
            "<=" => Self::chain(&cooked, |ord| ord != Greater),
            ">=" => Self::chain(&cooked, |ord| ord != Less),
            "in" => match cooked.split_first() {
                Some((needle, haystack)) => haystack.contains(needle),
                None => false,
            },
            "not" => !cooked.first().map_or(false, Self::truthy),
            "and" => cooked.iter().all(Self::truthy),
            "or" => cooked.iter().any(Self::truthy),
            unknown => {
                return Err(PluginError::InvalidInput(format!(
                    "unknown JSON query operator {:?}",
                    unknown
                )))
            }
        };
        Ok(Value::Bool(result))
    }
}

impl HostFilter for JsonFilter {
    fn name(&self) -> &str {
        "JsonConstraint"
    }

    fn host_passes(
        &self,
        host: &HostState,
        filter_properties: &FilterProperties,
    ) -> Result<bool, PluginError> {
        let Some(query) = filter_properties.scheduler_hints.query.as_ref() else {
            return Ok(true);
        };
        let query: Value = serde_json::from_str(query)
            .map_err(|err| PluginError::InvalidInput(format!("malformed JSON query: {}", err)))?;
        match &query {
            Value::Array(expression) => Ok(Self::truthy(&Self::evaluate(expression, host)?)),
            other => Err(PluginError::InvalidInput(format!(
                "JSON query must be a list, got {}",
                other
            ))),
        }
    }
}

/// Hosts in the same subnet as the `build_near_host_ip` hint. The prefix length
/// comes from the `cidr` hint (`/24` by default).
pub struct SimpleCidrAffinityFilter;

impl SimpleCidrAffinityFilter {
    fn parse_prefix(cidr: &str) -> Result<u32, PluginError> {
        cidr.trim_start_matches('/')
            .parse::<u32>()
            .ok()
            .filter(|prefix| *prefix <= 32)
            .ok_or_else(|| PluginError::InvalidInput(format!("invalid cidr {:?}", cidr)))
    }

    fn parse_ip(ip: &str) -> Result<Ipv4Addr, PluginError> {
        ip.parse()
            .map_err(|_| PluginError::InvalidInput(format!("invalid IPv4 address {:?}", ip)))
    }
}

impl HostFilter for SimpleCidrAffinityFilter {
    fn name(&self) -> &str {
        "SimpleCidrAffinityConstraint"
    }

    fn host_passes(
        &self,
        host: &HostState,
        filter_properties: &FilterProperties,
    ) -> Result<bool, PluginError> {
        let hints = &filter_properties.scheduler_hints;
        let Some(near_ip) = hints.build_near_host_ip.as_ref() else {
            return Ok(true);
        };
        let Some(host_ip) = host.host_ip.as_ref() else {
            debug!("Host {} has no IP address, rejected", host.host);
            return Ok(false);
        };
        let prefix = Self::parse_prefix(hints.cidr.as_deref().unwrap_or("/24"))?;
        let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
        let near = u32::from(Self::parse_ip(near_ip)?);
        let Ok(host_ip) = Self::parse_ip(host_ip) else {
            warn!("Host {} has a malformed IP address {:?}, rejected", host.host, host_ip);
            return Ok(false);
        };
        Ok(near & mask == u32::from(host_ip) & mask)
    }
}

// Hosts whose aggregates accept the requested instance type, if they restrict it at all.
pub struct AggregateTypeAffinityFilter;

impl HostFilter for AggregateTypeAffinityFilter {
    fn name(&self) -> &str {
        "AggregateTypeAffinityConstraint"
    }

    fn host_passes(
        &self,
        host: &HostState,
        filter_properties: &FilterProperties,
    ) -> Result<bool, PluginError> {
        let allowed = aggregate_values_from_key(host, "instance_type");
        if allowed.is_empty() {
            return Ok(true);
        }
        let Some(instance_type) = filter_properties.instance_type.as_ref() else {
            return Ok(false);
        };
        Ok(allowed
            .iter()
            .flat_map(|value| value.split(','))
            .any(|name| name.trim() == instance_type.name))
    }
}

// Hosts in aggregates tagged with `filter_tenant_id` only take those tenants.
pub struct AggregateMultiTenancyIsolationFilter;

impl HostFilter for AggregateMultiTenancyIsolationFilter {
    fn name(&self) -> &str {
        "AggregateMultiTenancyIsolationConstraint"
    }

    fn host_passes(
        &self,
        host: &HostState,
        filter_properties: &FilterProperties,
    ) -> Result<bool, PluginError> {
        let tenants = aggregate_values_from_key(host, "filter_tenant_id");
        if tenants.is_empty() {
            return Ok(true);
        }
        Ok(filter_properties
            .project_id
            .as_ref()
            .map_or(false, |project_id| tenants.contains(project_id)))
    }
}

pub struct AvailabilityZoneFilter {
    default_availability_zone: String,
}

impl AvailabilityZoneFilter {
    pub fn new(default_availability_zone: &str) -> Self {
        Self {
            default_availability_zone: default_availability_zone.to_string(),
        }
    }
}

impl HostFilter for AvailabilityZoneFilter {
    fn name(&self) -> &str {
        "AvailabilityZoneConstraint"
    }

    fn host_passes(
        &self,
        host: &HostState,
        filter_properties: &FilterProperties,
    ) -> Result<bool, PluginError> {
        let Some(requested) = filter_properties.availability_zone.as_ref() else {
            return Ok(true);
        };
        let zones = aggregate_values_from_key(host, "availability_zone");
        if zones.is_empty() {
            return Ok(*requested == self.default_availability_zone);
        }
        Ok(zones.contains(requested))
    }
}

// Hosts whose attested trust level matches the `trust:trusted_host` extra spec.
pub struct TrustedHostsFilter;

impl HostFilter for TrustedHostsFilter {
    fn name(&self) -> &str {
        "TrustedHostsConstraint"
    }

    fn host_passes(
        &self,
        host: &HostState,
        filter_properties: &FilterProperties,
    ) -> Result<bool, PluginError> {
        let wanted = filter_properties
            .instance_type
            .as_ref()
            .and_then(|instance_type| instance_type.extra_specs.get("trust:trusted_host"));
        let Some(wanted) = wanted else {
            return Ok(true);
        };
        Ok(host
            .trust_level
            .as_ref()
            .map_or(false, |level| level.eq_ignore_ascii_case(wanted)))
    }
}

// Hosts not already tried by a previous attempt of this request.
pub struct RetryFilter;

impl HostFilter for RetryFilter {
    fn name(&self) -> &str {
        "RetryConstraint"
    }

    fn host_passes(
        &self,
        host: &HostState,
        filter_properties: &FilterProperties,
    ) -> Result<bool, PluginError> {
        let Some(retry) = filter_properties.retry.as_ref() else {
            return Ok(true);
        };
        let tried = retry
            .hosts
            .iter()
            .any(|(tried_host, tried_node)| *tried_host == host.host && *tried_node == host.nodename);
        if tried {
            debug!("Host {} [node {}] already tried, rejected", host.host, host.nodename);
        }
        Ok(!tried)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::Aggregate;
    use crate::core::host_state::SupportedInstance;
    use crate::core::request::{ImageProperties, InstanceType, RetryInfo};
    use crate::test_util::helpers::create_host;

    fn props_with_query(query: &str) -> FilterProperties {
        let mut props = FilterProperties::new(1);
        props.scheduler_hints.query = Some(query.to_string());
        props
    }

    #[test]
    fn test_active_hosts() {
        let mut host = create_host("host1", 1024, 1024, 4, 0);
        let props = FilterProperties::new(1);
        assert!(ActiveHostsFilter.host_passes(&host, &props).unwrap());
        host.service_disabled = true;
        assert!(!ActiveHostsFilter.host_passes(&host, &props).unwrap());
        host.service_disabled = false;
        host.service_up = false;
        assert!(!ActiveHostsFilter.host_passes(&host, &props).unwrap());
    }

    #[test]
    fn test_image_properties() {
        let mut host = create_host("host1", 1024, 1024, 4, 0);
        host.supported_instances = vec![SupportedInstance {
            architecture: "x86_64".to_string(),
            hypervisor_type: "kvm".to_string(),
            vm_mode: "hvm".to_string(),
        }];
        let mut props = FilterProperties::new(1);
        props.image_properties = ImageProperties {
            architecture: Some("X86_64".to_string()),
            ..Default::default()
        };
        assert!(ImagePropertiesFilter.host_passes(&host, &props).unwrap());
        props.image_properties.hypervisor_type = Some("xen".to_string());
        assert!(!ImagePropertiesFilter.host_passes(&host, &props).unwrap());
    }

    #[test]
    fn test_json_query() {
        let mut host = create_host("host1", 4096, 2048, 4, 0);
        host.metrics.insert("cpu.percent".to_string(), 0.3);

        let query = r#"["and", [">=", "$free_ram_mb", 1024], ["<", "$metrics.cpu.percent", 0.5]]"#;
        assert!(JsonFilter.host_passes(&host, &props_with_query(query)).unwrap());

        let query = r#"["or", ["=", "$host", "host2"], ["not", ["<", "$free_ram_mb", 4096]]]"#;
        assert!(!JsonFilter.host_passes(&host, &props_with_query(query)).unwrap());

        let query = r#"["in", "$host", "host1", "host3"]"#;
        assert!(JsonFilter.host_passes(&host, &props_with_query(query)).unwrap());
    }

    #[test]
    fn test_json_query_errors() {
        let host = create_host("host1", 4096, 2048, 4, 0);
        assert!(JsonFilter.host_passes(&host, &props_with_query("[\"=\", ")).is_err());
        assert!(JsonFilter
            .host_passes(&host, &props_with_query(r#"["~", 1, 2]"#))
            .is_err());
        assert!(JsonFilter.host_passes(&host, &FilterProperties::new(1)).unwrap());
    }

    #[test]
    fn test_simple_cidr_affinity() {
        let mut host = create_host("host1", 1024, 1024, 4, 0);
        host.host_ip = Some("10.8.1.100".to_string());
        let mut props = FilterProperties::new(1);
        props.scheduler_hints.build_near_host_ip = Some("10.8.1.1".to_string());
        assert!(SimpleCidrAffinityFilter.host_passes(&host, &props).unwrap());

        props.scheduler_hints.build_near_host_ip = Some("10.8.2.1".to_string());
        assert!(!SimpleCidrAffinityFilter.host_passes(&host, &props).unwrap());

        props.scheduler_hints.cidr = Some("/16".to_string());
        assert!(SimpleCidrAffinityFilter.host_passes(&host, &props).unwrap());
    }

    #[test]
    fn test_aggregate_type_affinity_and_tenancy() {
        let mut host = create_host("host1", 1024, 1024, 4, 0);
        host.aggregates = vec![Aggregate::new(
            "agg1",
            &[("instance_type", "m1.small, m1.large"), ("filter_tenant_id", "tenant-a")],
        )];
        let mut props = FilterProperties::new(1);
        props.instance_type = Some(InstanceType {
            name: "m1.large".to_string(),
            ..Default::default()
        });
        assert!(AggregateTypeAffinityFilter.host_passes(&host, &props).unwrap());
        assert!(!AggregateMultiTenancyIsolationFilter
            .host_passes(&host, &props)
            .unwrap());
        props.project_id = Some("tenant-a".to_string());
        assert!(AggregateMultiTenancyIsolationFilter
            .host_passes(&host, &props)
            .unwrap());
    }

    #[test]
    fn test_availability_zone_defaults() {
        let mut host = create_host("host1", 1024, 1024, 4, 0);
        let filter = AvailabilityZoneFilter::new("nova");
        let mut props = FilterProperties::new(1);
        props.availability_zone = Some("nova".to_string());
        assert!(filter.host_passes(&host, &props).unwrap());

        host.aggregates = vec![Aggregate::new("agg1", &[("availability_zone", "az1")])];
        assert!(!filter.host_passes(&host, &props).unwrap());
        props.availability_zone = Some("az1".to_string());
        assert!(filter.host_passes(&host, &props).unwrap());
    }

    #[test]
    fn test_trusted_hosts_and_retry() {
        let mut host = create_host("host1", 1024, 1024, 4, 0);
        let mut props = FilterProperties::new(1);
        props.instance_type = Some(InstanceType {
            extra_specs: [("trust:trusted_host".to_string(), "trusted".to_string())].into(),
            ..Default::default()
        });
        assert!(!TrustedHostsFilter.host_passes(&host, &props).unwrap());
        host.trust_level = Some("trusted".to_string());
        assert!(TrustedHostsFilter.host_passes(&host, &props).unwrap());

        props.retry = Some(RetryInfo {
            num_attempts: 1,
            hosts: vec![("host1".to_string(), host.nodename.clone())],
        });
        assert!(!RetryFilter.host_passes(&host, &props).unwrap());
    }
}
