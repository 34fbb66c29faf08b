//! A configured bidder driver: the static description the adapter
//! registry keys its behavior on.

use crate::core::models::sync::SyncConfig;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Reporting classification for a bidder; carried on every
/// `BidderEvent` and `WinEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString, Default)]
#[serde(rename_all = "lowercase")]
pub enum DemandClass {
    #[default]
    Platform,
    Direct,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct Bidder {
    /// Bidder code, e.g. `"rubicon"` — the key used throughout
    /// `imp[].ext` and in targeting key suffixes.
    pub code: String,
    pub name: String,
    pub enabled: bool,
    pub demand_class: DemandClass,
    pub supports_banner: bool,
    pub supports_video: bool,
    pub supports_native: bool,
    /// Base outbound endpoint URL; the adapter may still build
    /// multiple concrete requests against it.
    pub endpoint: String,
    /// Per-bidder call timeout override; `None` uses the exchange
    /// default.
    pub timeout_ms: Option<u64>,
    pub usersync: Option<SyncConfig>,
}

impl Bidder {
    pub fn supports(&self, media_type: crate::rtb::bid_response::MediaType) -> bool {
        use crate::rtb::bid_response::MediaType;
        match media_type {
            MediaType::Banner => self.supports_banner,
            MediaType::Video => self.supports_video,
            MediaType::Native => self.supports_native,
        }
    }
}
