//! PCI passthrough device pools and request matching.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PciDevicePool {
    pub vendor_id: String,
    pub product_id: String,
    pub count: u32,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// One device request: `count` devices matching any of the `spec` attribute sets.
#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PciRequest {
    pub count: u32,
    pub spec: Vec<BTreeMap<String, String>>,
}

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PciStats {
    pub pools: Vec<PciDevicePool>,
}

impl PciDevicePool {
    fn attribute(&self, key: &str) -> Option<&str> {
        match key {
            "vendor_id" => Some(&self.vendor_id),
            "product_id" => Some(&self.product_id),
            _ => self.tags.get(key).map(String::as_str),
        }
    }

    fn matches(&self, request: &PciRequest) -> bool {
        request.spec.iter().any(|spec| {
            spec.iter()
                .all(|(key, value)| self.attribute(key) == Some(value.as_str()))
        })
    }
}

impl PciStats {
    /// Checks whether all requests can be satisfied at once without consuming anything.
    pub fn support_requests(&self, requests: &[PciRequest]) -> bool {
        let mut trial = self.clone();
        trial.apply_requests(requests)
    }

    /// Takes devices out of the pools for every request.
    /// Returns false and leaves the pools untouched if any request cannot be satisfied.
    pub fn apply_requests(&mut self, requests: &[PciRequest]) -> bool {
        let mut pools = self.pools.clone();
        for request in requests {
            let mut needed = request.count;
            let free: u32 = pools
                .iter()
                .filter(|pool| pool.matches(request))
                .map(|pool| pool.count)
                .sum();
            if free < needed {
                return false;
            }
            for pool in pools.iter_mut().filter(|pool| pool.matches(request)) {
                let taken = needed.min(pool.count);
                pool.count -= taken;
                needed -= taken;
                if needed == 0 {
                    break;
                }
            }
        }
        self.pools = pools;
        true
    }
}
