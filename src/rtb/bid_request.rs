//! Canonical, internal bid-request shape. This is deliberately a narrowed OpenRTB: only the
//! fields the auction core actually reads or writes are modeled, not
//! the full IAB object graph.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// OpenRTB `device.devicetype` values the normalizer assigns (adcom
/// list 5.21, narrowed to the values this crate actually classifies).
pub mod devicetype {
    pub const MOBILE_TABLET_GENERAL: i32 = 1;
    pub const PERSONAL_COMPUTER: i32 = 2;
    pub const CONNECTED_TV: i32 = 3;
    pub const PHONE: i32 = 4;
    pub const TABLET: i32 = 5;
    pub const CONNECTED_DEVICE: i32 = 6;
    pub const SET_TOP_BOX: i32 = 7;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GeoType {
    /// Derived from the client's supplied GPS coordinates.
    #[serde(rename = "1")]
    Gps,
    /// Derived from an IP-to-geo lookup service.
    #[serde(rename = "2")]
    #[default]
    Ip,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct Geo {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub r#type: Option<i32>,
    pub country: String,
    pub region: String,
    pub city: String,
    pub accuracy: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct Device {
    pub ua: String,
    pub make: String,
    pub model: String,
    pub os: String,
    pub osv: String,
    /// adcom list 5.21 device type; see [`devicetype`].
    pub devicetype: i32,
    pub w: i32,
    pub h: i32,
    pub ip: String,
    pub ifa: String,
    pub geo: Option<Geo>,
}

/// A single external-bidder user id, OpenRTB `user.eids[].uids[]`.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct Uid {
    pub id: String,
    /// adcom `agenttype`-like address tag; `1` = cookie.
    #[builder(default = "1")]
    pub atype: i32,
}

/// `user.eids[]` — one bidder/source's externally-resolved identifiers.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct Eid {
    /// The domain of the entity that assigned these ids (for our
    /// inline store, the bidder code).
    pub source: String,
    pub uids: Vec<Uid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub buyeruid: String,
    pub eids: Vec<Eid>,
    pub consent: String,
    pub data: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct Regs {
    pub gdpr: Option<i32>,
    pub us_privacy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct Publisher {
    /// Must stay empty outbound to bidders — the normalizer enforces
    /// the identity-leakage invariant before any bidder sees this request.
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct Site {
    /// Must stay empty outbound to bidders — the normalizer enforces
    /// the identity-leakage invariant before any bidder sees this request.
    pub id: String,
    pub domain: String,
    pub page: String,
    pub publisher: Option<Publisher>,
    pub keywords: Vec<String>,
    pub cat: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct Format {
    pub w: i32,
    pub h: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct Banner {
    pub w: i32,
    pub h: i32,
    pub format: Vec<Format>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct Video {
    pub w: i32,
    pub h: i32,
    pub mimes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct Native {
    pub request: String,
}

/// `imp[].ext.<bidder-code>` — one bidder's opaque parameter object,
/// resolved by the config resolver. Kept as [`Value`]
/// since every bidder shapes this differently (int triplet, string
/// placement id, tag id, ...).
pub type BidderParams = Value;

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct Imp {
    pub id: String,
    pub banner: Option<Banner>,
    pub video: Option<Video>,
    pub native: Option<Native>,
    pub bidfloor: f64,
    pub bidfloorcur: String,
    pub secure: Option<i32>,
    pub tagid: String,
    /// bidder-code -> that bidder's opaque params; built by the
    /// normalizer and narrowed per-bidder by the exchange before
    /// dispatch (invariant 3).
    pub ext: HashMap<String, BidderParams>,
}

impl Imp {
    pub fn accepts(&self, media_type: super::bid_response::MediaType) -> bool {
        match media_type {
            super::bid_response::MediaType::Banner => self.banner.is_some(),
            super::bid_response::MediaType::Video => self.video.is_some(),
            super::bid_response::MediaType::Native => self.native.is_some(),
        }
    }

    /// Whether a bid of `media_type` sized `(w, h)` matches one of this
    /// impression's accepted formats. Banner checks `(w, h)`
    /// against the primary size and every entry in `format`; video and
    /// native have no discrete size grid in this narrowed model, so a
    /// declared format is itself the match.
    pub fn matches_format(&self, media_type: super::bid_response::MediaType, w: i32, h: i32) -> bool {
        match media_type {
            super::bid_response::MediaType::Banner => self.banner.as_ref().is_some_and(|b| {
                (b.w == w && b.h == h) || b.format.iter().any(|f| f.w == w && f.h == h)
            }),
            super::bid_response::MediaType::Video => self.video.is_some(),
            super::bid_response::MediaType::Native => self.native.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct Source {
    pub fd: Option<i32>,
    pub tid: String,
    /// Passed through losslessly for OpenRTB-passthrough clients; the
    /// exchange never inspects it.
    pub schain: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct BidRequest {
    pub id: String,
    pub imp: Vec<Imp>,
    pub site: Option<Site>,
    pub device: Option<Device>,
    pub user: Option<User>,
    pub regs: Option<Regs>,
    pub source: Option<Source>,
    pub cur: Vec<String>,
    /// Client-reported time budget; recorded for observability only —
    /// the engine's own deadline always wins.
    pub tmax: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imp_accepts_matches_declared_formats() {
        let imp = ImpBuilder::default()
            .banner(Some(Banner {
                w: 300,
                h: 250,
                format: vec![],
            }))
            .build()
            .unwrap();

        assert!(imp.accepts(crate::rtb::bid_response::MediaType::Banner));
        assert!(!imp.accepts(crate::rtb::bid_response::MediaType::Video));
    }

    #[test]
    fn matches_format_checks_primary_size_and_alternates() {
        let imp = ImpBuilder::default()
            .banner(Some(Banner {
                w: 300,
                h: 250,
                format: vec![Format { w: 728, h: 90 }],
            }))
            .build()
            .unwrap();

        assert!(imp.matches_format(crate::rtb::bid_response::MediaType::Banner, 300, 250));
        assert!(imp.matches_format(crate::rtb::bid_response::MediaType::Banner, 728, 90));
        assert!(!imp.matches_format(crate::rtb::bid_response::MediaType::Banner, 160, 600));
    }
}
