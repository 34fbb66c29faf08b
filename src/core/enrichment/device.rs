//! User-agent parsing for the request normalizer, producing
//! `(make, model, os, osv, device_type)` where `device_type` uses the
//! standard OpenRTB enumeration.
//!
//! `fast_uaparser` + `moka` cache shape, narrowed to the fields the
//! canonical `Device` block carries and mapped onto the adcom device
//! type codes in [`crate::rtb::bid_request::devicetype`].

use crate::rtb::bid_request::devicetype;
use anyhow::{anyhow, Error};
use fast_uaparser::{Device as UaDevice, OperatingSystem, ParserError};
use moka::sync::Cache;
use std::num::NonZeroU32;

#[derive(Clone, Debug, Default)]
pub struct DeviceInfo {
    pub make: String,
    pub model: String,
    pub os: String,
    pub osv: String,
    pub devicetype: i32,
}

pub struct DeviceLookup {
    cache: Cache<String, Option<DeviceInfo>>,
}

fn classify(device_family: &str, os_family: &str) -> i32 {
    match device_family {
        "iPad" => return devicetype::TABLET,
        "iPhone" => return devicetype::PHONE,
        "AppleTV" => return devicetype::CONNECTED_TV,
        _ => {}
    }

    let device_lower = device_family.to_lowercase();

    if device_lower.contains("tv")
        || device_lower.contains("roku")
        || device_lower.contains("chromecast")
        || device_lower.contains("bravia")
    {
        return devicetype::CONNECTED_TV;
    }

    if device_lower.contains("set-top")
        || device_lower.contains("settop")
        || device_lower.contains("playstation")
        || device_lower.contains("xbox")
    {
        return devicetype::SET_TOP_BOX;
    }

    if device_lower.contains("tablet")
        || device_lower.contains("kindle")
        || device_lower.contains("surface")
    {
        return devicetype::TABLET;
    }

    if device_lower.contains("phone")
        || device_lower.contains("mobile")
        || device_lower.contains("galaxy")
        || device_lower.contains("pixel")
    {
        return devicetype::PHONE;
    }

    match os_family {
        "iOS" | "Android" => return devicetype::PHONE,
        _ => {}
    }

    let os_lower = os_family.to_lowercase();
    if os_lower.contains("windows") || os_lower.contains("mac os") || os_lower.contains("linux") {
        return devicetype::PERSONAL_COMPUTER;
    }

    devicetype::MOBILE_TABLET_GENERAL
}

impl DeviceLookup {
    pub fn try_new(cache_sz: NonZeroU32) -> Result<Self, Error> {
        fast_uaparser::init()
            .map(|_| DeviceLookup {
                cache: Cache::new(cache_sz.get() as u64),
            })
            .map_err(|e| anyhow!(e))
    }

    fn load(user_agent: &str) -> Option<DeviceInfo> {
        let device: UaDevice = user_agent.parse().ok()?;
        let os: Result<OperatingSystem, ParserError> = user_agent.parse();
        let os = os.ok()?;

        let devicetype = classify(&device.family, &os.family);

        Some(DeviceInfo {
            make: device.brand.unwrap_or_default(),
            model: device.model.unwrap_or_default(),
            os: os.family,
            osv: os.major.unwrap_or_default(),
            devicetype,
        })
    }

    pub fn lookup_ua(&self, user_agent: &str) -> Option<DeviceInfo> {
        self.cache
            .get_with(user_agent.to_string(), || Self::load(user_agent))
    }
}

/// Mobile indicators the normalizer checks against the raw UA to pick
/// a device class for config resolution, separate
/// from the richer adcom `devicetype` classification above.
pub fn is_mobile_ua(user_agent: &str) -> bool {
    const INDICATORS: &[&str] = &[
        "mobile",
        "android",
        "iphone",
        "ipad",
        "blackberry",
        "windows phone",
        "kindle",
        "opera mini",
    ];
    let lower = user_agent.to_lowercase();
    INDICATORS.iter().any(|i| lower.contains(i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_indicators_detect_common_devices() {
        assert!(is_mobile_ua("Mozilla/5.0 (iPhone; CPU iPhone OS)"));
        assert!(is_mobile_ua("Mozilla/5.0 (Linux; Android 13)"));
        assert!(!is_mobile_ua("Mozilla/5.0 (Windows NT 10.0; Win64; x64)"));
    }
}
