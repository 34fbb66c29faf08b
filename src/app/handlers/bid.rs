//! `POST /v1/bid` and `POST /openrtb2/auction`. Both run the
//! same normalize → `Exchange::run` → build-response pipeline; they
//! differ only in wire shape on the way in and out.

use super::state::AppState;
use super::{record_request_metric, MAX_BODY_BYTES};
use crate::core::exchange::{AuctionOutcome, Winner};
use crate::core::normalizer::{NormalizeOutcome, Normalizer};
use crate::core::response_builder;
use crate::rtb::bid_response::{BidResponse, SeatBid};
use crate::rtb::client::{ClientBidRequest, ClientErrorResponse};
use actix_web::{web, HttpRequest, HttpResponse};
use std::collections::HashMap;
use std::time::Instant;
use tracing::Instrument;

fn cookie_uids(req: &HttpRequest) -> HashMap<String, String> {
    req.cookie("rex_uids")
        .and_then(|c| serde_json::from_str(c.value()).ok())
        .unwrap_or_default()
}

fn too_large(body: &web::Bytes) -> bool {
    body.len() > MAX_BODY_BYTES
}

pub async fn bid(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let span = crate::rtb::sample_or_attach_root_span!("handle_bid_request");
    handle_bid(state, req, body).instrument(span).await
}

async fn handle_bid(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let started = Instant::now();

    if too_large(&body) {
        let resp = HttpResponse::BadRequest().json(ClientErrorResponse { error: "request body exceeds 1 MB".into() });
        record_request_metric("/v1/bid", "validation_error", 400, started.elapsed());
        return resp;
    }

    let client: ClientBidRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            let resp = HttpResponse::BadRequest().json(ClientErrorResponse { error: format!("malformed request body: {e}") });
            record_request_metric("/v1/bid", "validation_error", 400, started.elapsed());
            return resp;
        }
    };

    let cookie_uids = cookie_uids(&req);
    let exchange_cfg = &state.config.exchange;

    let normalizer = Normalizer {
        resolver: &state.resolver,
        bidders: &state.bidders,
        device_lookup: &state.device_lookup,
        geo_lookup: state.geo_lookup.as_ref(),
        user_sync: &state.user_sync,
    };

    let outcome = match normalizer.normalize(&client, &cookie_uids, exchange_cfg.default_tmax, exchange_cfg.min_tmax).await {
        Ok(o) => o,
        Err(e) => {
            let resp = HttpResponse::BadRequest().json(ClientErrorResponse { error: e.0 });
            record_request_metric("/v1/bid", "validation_error", 400, started.elapsed());
            return resp;
        }
    };

    let NormalizeOutcome { request, slot_by_imp, .. } = outcome;
    let currency = request.cur.first().cloned().unwrap_or_else(|| "USD".to_string());
    let auction_outcome = state.exchange.run(&request).await;
    let has_bids = !auction_outcome.winners.is_empty();
    let body = response_builder::build(auction_outcome, &slot_by_imp, &currency);

    let outcome_label = if has_bids { "bid" } else { "no_bid" };
    record_request_metric("/v1/bid", outcome_label, 200, started.elapsed());
    HttpResponse::Ok().json(body)
}

pub async fn openrtb_auction(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let span = crate::rtb::sample_or_attach_root_span!("handle_openrtb_auction");
    handle_openrtb(state, body).instrument(span).await
}

async fn handle_openrtb(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let started = Instant::now();

    if too_large(&body) {
        record_request_metric("/openrtb2/auction", "validation_error", 400, started.elapsed());
        return HttpResponse::BadRequest().json(ClientErrorResponse { error: "request body exceeds 1 MB".into() });
    }

    let mut request: crate::rtb::bid_request::BidRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            record_request_metric("/openrtb2/auction", "validation_error", 400, started.elapsed());
            return HttpResponse::BadRequest().json(ClientErrorResponse { error: format!("malformed OpenRTB request: {e}") });
        }
    };

    if request.imp.is_empty() {
        record_request_metric("/openrtb2/auction", "validation_error", 400, started.elapsed());
        return HttpResponse::BadRequest().json(ClientErrorResponse { error: "imp must not be empty".into() });
    }

    let exchange_cfg = &state.config.exchange;
    if request.tmax > 0 && (request.tmax as u64) < exchange_cfg.min_tmax.as_millis() as u64 {
        record_request_metric("/openrtb2/auction", "validation_error", 400, started.elapsed());
        return HttpResponse::BadRequest().json(ClientErrorResponse {
            error: format!("tmax below the minimum of {}ms", exchange_cfg.min_tmax.as_millis()),
        });
    }

    // Re-apply the identity-leakage invariant: the caller's own
    // site/publisher id must never reach a bidder as the internal
    // account identifier.
    if let Some(site) = request.site.as_mut() {
        site.id.clear();
        if let Some(publisher) = site.publisher.as_mut() {
            publisher.id.clear();
        }
    }
    // The client-reported tmax is recorded for observability only; the
    // engine deadline always wins.
    request.tmax = exchange_cfg.default_tmax.as_millis() as i64;

    let request_id = request.id.clone();
    let currency = request.cur.first().cloned().unwrap_or_else(|| state.config.currency.default_currency.clone());
    let outcome = state.exchange.run(&request).await;
    let has_bids = !outcome.winners.is_empty();
    let body = build_openrtb_response(request_id, outcome, &currency);

    let outcome_label = if has_bids { "bid" } else { "no_bid" };
    record_request_metric("/openrtb2/auction", outcome_label, 200, started.elapsed());
    HttpResponse::Ok().json(body)
}

fn build_openrtb_response(request_id: String, outcome: AuctionOutcome, currency: &str) -> BidResponse {
    let mut by_bidder: HashMap<String, Vec<_>> = HashMap::new();
    for Winner { bidder_code, bid, targeting, .. } in outcome.winners {
        let mut bid = bid;
        if !targeting.is_empty() {
            bid.ext = Some(serde_json::json!({"prebid": {"targeting": targeting}}));
        }
        by_bidder.entry(bidder_code).or_default().push(bid);
    }

    let seatbid = by_bidder.into_iter().map(|(seat, bid)| SeatBid { seat, bid }).collect();
    BidResponse { id: request_id, cur: currency.to_string(), seatbid }
}
