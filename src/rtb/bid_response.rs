//! Canonical bid response shape.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// A bid's media type. Derived from the originating impression at
/// parse time, never trusted from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MediaType {
    Banner,
    Video,
    Native,
}

impl MediaType {
    /// Compact single-letter code used in billing/win notice urls,
    /// where every byte of query-string length matters.
    pub fn as_code(&self) -> &'static str {
        match self {
            MediaType::Banner => "b",
            MediaType::Video => "v",
            MediaType::Native => "n",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "b" => Some(MediaType::Banner),
            "v" => Some(MediaType::Video),
            "n" => Some(MediaType::Native),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[builder(default)]
#[serde(default)]
pub struct Bid {
    pub id: String,
    pub impid: String,
    pub price: f64,
    /// Opaque creative payload (markup, VAST XML, native JSON) — the
    /// exchange never parses or rewrites it; creative rendering is out
    /// of scope.
    pub adm: String,
    pub crid: String,
    pub dealid: Option<String>,
    pub w: i32,
    pub h: i32,
    pub adomain: Vec<String>,
    pub cid: String,
    pub mtype: MediaType,
    /// `{"prebid": {"targeting": {...}}}` — the §4.7 targeting-key map
    /// for this winning bid, attached so the OpenRTB passthrough
    /// response actually carries what `targeting_keys` computed rather
    /// than discarding it at the response boundary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
}

impl Default for Bid {
    fn default() -> Self {
        Self {
            id: String::new(),
            impid: String::new(),
            price: 0.0,
            adm: String::new(),
            crid: String::new(),
            dealid: None,
            w: 0,
            h: 0,
            adomain: Vec::new(),
            cid: String::new(),
            mtype: MediaType::Banner,
            ext: None,
        }
    }
}

impl Bid {
    pub fn is_deal(&self) -> bool {
        self.dealid.as_ref().is_some_and(|d| !d.is_empty())
    }

    /// A bid must carry a non-empty creative payload and creative id
    /// to ever be returned.
    pub fn has_creative(&self) -> bool {
        !self.adm.trim().is_empty() && !self.crid.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct SeatBid {
    pub seat: String,
    pub bid: Vec<Bid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default)]
pub struct BidResponse {
    pub id: String,
    pub cur: String,
    pub seatbid: Vec<SeatBid>,
}

impl BidResponse {
    pub fn bids(&self) -> impl Iterator<Item = &Bid> {
        self.seatbid.iter().flat_map(|sb| sb.bid.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bid_requires_adm_and_crid_for_creative_check() {
        let mut bid = Bid {
            adm: "<html/>".into(),
            crid: "cr1".into(),
            ..Default::default()
        };
        assert!(bid.has_creative());

        bid.crid.clear();
        assert!(!bid.has_creative());
    }

    #[test]
    fn is_deal_requires_non_empty_dealid() {
        let mut bid = Bid::default();
        assert!(!bid.is_deal());
        bid.dealid = Some("".into());
        assert!(!bid.is_deal());
        bid.dealid = Some("pmp-1".into());
        assert!(bid.is_deal());
    }
}
