//! The compact client-facing wire format. This is what publisher-integrated ad clients actually
//! send/receive on `/v1/bid`; [`crate::core::normalizer`] turns the
//! request half into the canonical [`crate::rtb::bid_request::BidRequest`]
//! and [`crate::core::response_builder`] turns winners back into the
//! response half.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientSlot {
    pub div_id: String,
    pub sizes: Vec<(i32, i32)>,
    /// Slot pattern, e.g. `example.com/top-banner`. Optional: the
    /// resolver falls back to mapping `divId` via the publisher's
    /// configured div index when this is absent.
    pub ad_unit_path: Option<String>,
    pub position: Option<String>,
    pub enabled_bidders: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientPage {
    pub url: String,
    pub domain: String,
    pub keywords: Vec<String>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientGeo {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub accuracy: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientDevice {
    pub width: i32,
    pub height: i32,
    pub device_type: Option<String>,
    pub user_agent: String,
    pub geo: Option<ClientGeo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientUser {
    pub fpid: String,
    pub consent_given: Option<bool>,
    pub consent_string: Option<String>,
    pub gdpr_applies: Option<bool>,
    pub usp_consent: Option<String>,
    pub user_ids: HashMap<String, String>,
    pub data: Vec<Value>,
    pub ext: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientBidRequest {
    pub account_id: String,
    /// Client hint; recorded but never shortens/lengthens the server
    /// deadline — the engine's own deadline always wins.
    pub timeout: Option<u64>,
    pub slots: Vec<ClientSlot>,
    pub page: ClientPage,
    pub user: Option<ClientUser>,
    pub device: Option<ClientDevice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientMeta {
    pub adomain: Vec<String>,
    pub media_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Builder)]
#[builder(default)]
#[serde(rename_all = "camelCase")]
pub struct ClientBid {
    pub div_id: String,
    pub cpm: f64,
    pub currency: String,
    pub width: i32,
    pub height: i32,
    pub ad_id: String,
    pub creative_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ClientMeta>,
    /// The §4.7 targeting-key map (`hb_pb`, `hb_bidder`,
    /// bidder-suffixed and multibid-rank-suffixed variants) for this
    /// winning bid.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub targeting: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientBidResponse {
    pub bids: Vec<ClientBid>,
    pub response_time: u64,
}

/// Terse `4xx` error body for malformed requests.
#[derive(Debug, Clone, Serialize)]
pub struct ClientErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_request_deserializes_minimal_payload() {
        let raw = r#"{
            "accountId": "A",
            "slots": [{"divId": "s1", "sizes": [[300, 250]], "adUnitPath": "d.com/top"}],
            "page": {"domain": "d.com"},
            "device": {"userAgent": "Mozilla/5.0"}
        }"#;

        let req: ClientBidRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.account_id, "A");
        assert_eq!(req.slots.len(), 1);
        assert_eq!(req.slots[0].sizes, vec![(300, 250)]);
        assert_eq!(req.page.domain, "d.com");
    }

    #[test]
    fn client_bid_response_omits_absent_optional_fields() {
        let resp = ClientBidResponse {
            bids: vec![ClientBid {
                div_id: "s1".into(),
                cpm: 2.5,
                currency: "USD".into(),
                width: 300,
                height: 250,
                ad_id: "camp1".into(),
                creative_id: "cx".into(),
                deal_id: None,
                meta: None,
                targeting: HashMap::new(),
            }],
            response_time: 120,
        };

        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("dealId"));
        assert!(!json.contains("meta"));
        assert!(!json.contains("targeting"));
    }
}
