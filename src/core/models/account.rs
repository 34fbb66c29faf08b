//! The account → publisher → ad-slot hierarchy the config resolver
//! walks.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// bidder-code -> that bidder's opaque parameter object at this
/// level of the hierarchy.
pub type BidderParamsMap = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Desktop,
    Mobile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    /// Domains this account may serve on; entries may be wildcarded,
    /// e.g. `*.example.com`.
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub default_params: BidderParamsMap,
}

impl Account {
    /// Matches `domain` against `allowed_domains`, supporting a single
    /// leading `*.` wildcard segment per entry.
    pub fn allows_domain(&self, domain: &str) -> bool {
        self.allowed_domains.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix("*.") {
                domain == suffix || domain.ends_with(&format!(".{suffix}"))
            } else {
                pattern == domain
            }
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Publisher {
    pub domain: String,
    pub account_id: String,
    #[serde(default)]
    pub params: BidderParamsMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdSlot {
    /// `<domain>/<unit>`, e.g. `example.com/top-banner`.
    pub slot_pattern: String,
    pub publisher_domain: String,
    #[serde(default)]
    pub params: BidderParamsMap,
    #[serde(default)]
    pub params_desktop: BidderParamsMap,
    #[serde(default)]
    pub params_mobile: BidderParamsMap,
}

impl AdSlot {
    pub fn domain(&self) -> &str {
        self.slot_pattern.split('/').next().unwrap_or("")
    }

    /// Looks up `bidder_code` at slot-and-device level first, falling
    /// back to the slot's generic (device-agnostic) params — per
    /// bidder, so a device override for one bidder never shadows a
    /// different bidder's generic-level entry. Lookup order is
    /// slot-and-device, then slot; first hit wins per bidder.
    pub fn param_for(&self, device: DeviceClass, bidder_code: &str) -> Option<&Value> {
        let device_map = match device {
            DeviceClass::Desktop => &self.params_desktop,
            DeviceClass::Mobile => &self.params_mobile,
        };
        device_map.get(bidder_code).or_else(|| self.params.get(bidder_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_domain_matches_subdomains_and_root() {
        let account = Account {
            allowed_domains: vec!["*.example.com".into()],
            ..Default::default()
        };

        assert!(account.allows_domain("example.com"));
        assert!(account.allows_domain("m.example.com"));
        assert!(!account.allows_domain("example.org"));
    }

    #[test]
    fn slot_domain_is_pattern_prefix() {
        let slot = AdSlot {
            slot_pattern: "example.com/top".into(),
            ..Default::default()
        };
        assert_eq!(slot.domain(), "example.com");
    }
}
