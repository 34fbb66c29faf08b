//! Rubicon-style adapter: a concrete [`Adapter`] demonstrating the
//! per-bidder parameter shape (`imp[].ext.rubicon.{accountId,siteId,
//! zoneId}`) and the identity-leakage invariant — `accountId` here is
//! the *SSP-assigned* integer the publisher configured for this
//! bidder, never the internal account id the request was resolved
//! under.

use crate::core::adapter::{
    Adapter, AdapterInfo, BidderResponse, DemandClass, ExchangeError, ExchangeErrorKind,
    RawResponse, RequestData,
};
use crate::rtb::bid_request::BidRequest;
use crate::rtb::bid_response::{Bid, MediaType};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

pub const CODE: &str = "rubicon";

pub struct RubiconAdapter {
    endpoint: String,
}

impl RubiconAdapter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into() }
    }
}

#[derive(Deserialize)]
struct RubiconParams {
    #[serde(rename = "accountId")]
    account_id: i64,
    #[serde(rename = "siteId")]
    site_id: i64,
    #[serde(rename = "zoneId")]
    zone_id: i64,
}

#[derive(Deserialize)]
struct RubiconWireResponse {
    id: String,
    seatbid: Vec<RubiconSeatBid>,
}

#[derive(Deserialize)]
struct RubiconSeatBid {
    bid: Vec<RubiconBid>,
}

#[derive(Deserialize)]
struct RubiconBid {
    impid: String,
    price: f64,
    adm: String,
    crid: String,
    #[serde(default)]
    dealid: Option<String>,
    #[serde(default)]
    w: i32,
    #[serde(default)]
    h: i32,
    #[serde(default)]
    adomain: Vec<String>,
    #[serde(default)]
    cid: String,
}

impl Adapter for RubiconAdapter {
    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            code: CODE.to_string(),
            enabled: true,
            supports_banner: true,
            supports_video: false,
            supports_native: false,
            demand_class: DemandClass::Platform,
        }
    }

    fn build_requests(
        &self,
        request: &BidRequest,
        _params: &HashMap<String, Value>,
    ) -> (Vec<RequestData>, Vec<ExchangeError>) {
        let mut requests = Vec::new();
        let mut errors = Vec::new();

        for imp in &request.imp {
            let Some(raw) = imp.ext.get(CODE) else { continue };
            let params: RubiconParams = match serde_json::from_value(raw.clone()) {
                Ok(p) => p,
                Err(e) => {
                    errors.push(ExchangeError::for_bidder(
                        CODE,
                        ExchangeErrorKind::Marshal,
                        format!("invalid rubicon params on imp {}: {e}", imp.id),
                    ));
                    continue;
                }
            };

            if !imp.accepts(MediaType::Banner) {
                continue;
            }

            let outbound = json!({
                "id": request.id,
                "imp": [{
                    "id": imp.id,
                    "banner": {"w": imp.banner.as_ref().map(|b| b.w).unwrap_or(0), "h": imp.banner.as_ref().map(|b| b.h).unwrap_or(0)},
                    "bidfloor": imp.bidfloor,
                    "bidfloorcur": if imp.bidfloorcur.is_empty() { "USD" } else { &imp.bidfloorcur },
                    "ext": {"rubicon": {"accountId": params.account_id, "siteId": params.site_id, "zoneId": params.zone_id}},
                }],
                "site": request.site.as_ref().map(|s| json!({
                    "id": "",
                    "domain": s.domain,
                    "page": s.page,
                    "publisher": {"id": ""},
                })),
                "device": request.device,
                "user": request.user,
                "cur": request.cur,
                "tmax": request.tmax,
            });

            let body = match serde_json::to_vec(&outbound) {
                Ok(b) => b,
                Err(e) => {
                    errors.push(ExchangeError::for_bidder(
                        CODE,
                        ExchangeErrorKind::Marshal,
                        e.to_string(),
                    ));
                    continue;
                }
            };

            let mut req = RequestData::post_json(self.endpoint.clone(), body.into());
            req.imp_id = Some(imp.id.clone());
            requests.push(req);
        }

        (requests, errors)
    }

    fn parse_response(
        &self,
        request: &BidRequest,
        response: &RawResponse,
    ) -> Result<BidderResponse, ExchangeError> {
        if response.status == 204 {
            return Ok(BidderResponse { bids: Vec::new() });
        }

        let wire: RubiconWireResponse = serde_json::from_slice(&response.body).map_err(|e| {
            ExchangeError::for_bidder(CODE, ExchangeErrorKind::Parse, e.to_string())
        })?;

        if wire.id != request.id {
            return Err(ExchangeError::for_bidder(
                CODE,
                ExchangeErrorKind::ResponseIdMismatch,
                format!("response id {} does not match request id {}", wire.id, request.id),
            ));
        }

        let bids = wire
            .seatbid
            .into_iter()
            .flat_map(|sb| sb.bid)
            .map(|b| Bid {
                id: format!("{}-{}", CODE, b.impid),
                impid: b.impid,
                price: b.price,
                adm: b.adm,
                crid: b.crid,
                dealid: b.dealid,
                w: b.w,
                h: b.h,
                adomain: b.adomain,
                cid: b.cid,
                mtype: MediaType::Banner,
                ext: None,
            })
            .collect();

        Ok(BidderResponse { bids })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtb::bid_request::{BidRequestBuilder, Banner, ImpBuilder};
    use bytes::Bytes;

    fn sample_request() -> BidRequest {
        let mut ext = HashMap::new();
        ext.insert(
            CODE.to_string(),
            json!({"accountId": 26298, "siteId": 111, "zoneId": 222}),
        );
        let imp = ImpBuilder::default()
            .id("imp1".to_string())
            .banner(Some(Banner { w: 300, h: 250, format: vec![] }))
            .ext(ext)
            .build()
            .unwrap();

        BidRequestBuilder::default()
            .id("req-1".to_string())
            .imp(vec![imp])
            .build()
            .unwrap()
    }

    #[test]
    fn build_requests_uses_ssp_account_id_not_internal_account_id() {
        let adapter = RubiconAdapter::new("https://example.invalid/bid");
        let request = sample_request();
        let (requests, errors) = adapter.build_requests(&request, &HashMap::new());

        assert!(errors.is_empty());
        assert_eq!(requests.len(), 1);
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["imp"][0]["ext"]["rubicon"]["accountId"], 26298);
        assert_eq!(body["site"], Value::Null);
    }

    #[test]
    fn skips_imps_with_no_rubicon_params() {
        let adapter = RubiconAdapter::new("https://example.invalid/bid");
        let imp = ImpBuilder::default().id("imp2".to_string()).build().unwrap();
        let request = BidRequestBuilder::default().imp(vec![imp]).build().unwrap();
        let (requests, errors) = adapter.build_requests(&request, &HashMap::new());
        assert!(requests.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn parse_response_rejects_mismatched_id() {
        let adapter = RubiconAdapter::new("https://example.invalid/bid");
        let request = sample_request();
        let raw = RawResponse {
            status: 200,
            body: Bytes::from(r#"{"id":"wrong","seatbid":[]}"#),
        };
        let err = adapter.parse_response(&request, &raw).unwrap_err();
        assert_eq!(err.kind, ExchangeErrorKind::ResponseIdMismatch);
    }

    #[test]
    fn parse_response_maps_204_to_empty_bids() {
        let adapter = RubiconAdapter::new("https://example.invalid/bid");
        let request = sample_request();
        let raw = RawResponse { status: 204, body: Bytes::new() };
        let resp = adapter.parse_response(&request, &raw).unwrap();
        assert!(resp.bids.is_empty());
    }
}
