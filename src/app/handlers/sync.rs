//! `POST /cookie_sync` and `GET /setuid`.
//!
//! The callback URL handed out by cookie-sync embeds `fpid` and
//! `bidder` as query parameters so the bidder's redirect back to
//! `/setuid` carries the pair the store needs to complete the row —
//! an addition to the bare `bidder`/`uid`/`gdpr`/`gdpr_consent` shape,
//! round-tripped via [`DataUrl`] the same way any pixel/billing-notice
//! callback state survives a trip through a third party's redirect.

use super::state::AppState;
use crate::rtb::common::DataUrl;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{warn, Instrument};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CookieSyncRequest {
    fpid: String,
    #[serde(default)]
    bidders: Vec<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncEntry {
    bidder: String,
    kind: String,
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CookieSyncResponse {
    syncs: Vec<SyncEntry>,
}

pub async fn cookie_sync(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let span = crate::rtb::sample_or_attach_root_span!("handle_cookie_sync");
    handle_cookie_sync(state, body).instrument(span).await
}

async fn handle_cookie_sync(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let req: CookieSyncRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return HttpResponse::BadRequest().json(crate::rtb::client::ClientErrorResponse { error: format!("malformed cookie_sync body: {e}") }),
    };

    if req.fpid.is_empty() {
        return HttpResponse::BadRequest().json(crate::rtb::client::ClientErrorResponse { error: "fpid is required".into() });
    }

    let mut wanted: Vec<_> = req
        .bidders
        .iter()
        .filter_map(|code| state.bidders.get(code))
        .filter(|b| b.enabled && b.usersync.is_some())
        .collect();

    if let Some(limit) = req.limit {
        wanted.truncate(limit);
    }

    let mut syncs = Vec::with_capacity(wanted.len());
    for bidder in wanted {
        let sync_cfg = bidder.usersync.as_ref().expect("filtered to Some above");

        let redirect = format!("{}/setuid?bidder={}&fpid={}&gdpr={{gdpr}}&gdpr_consent={{gdpr_consent}}&uid=", state.config.http.external_url, bidder.code, req.fpid);

        let mut du = match DataUrl::new(&sync_cfg.url) {
            Ok(du) => du,
            Err(e) => {
                warn!(bidder = %bidder.code, error = %e, "skipping malformed usersync url");
                continue;
            }
        };
        if let Err(e) = du.add_string("redirect", &redirect) {
            warn!(bidder = %bidder.code, error = %e, "failed to build sync redirect url");
            continue;
        }
        let url = du.as_str().to_string();

        state.user_sync.initiate(&req.fpid, &bidder.code);
        syncs.push(SyncEntry { bidder: bidder.code.clone(), kind: sync_cfg.kind.as_ref().to_lowercase(), url });
    }

    HttpResponse::Ok().json(CookieSyncResponse { syncs })
}

#[derive(Debug, Deserialize)]
struct SetuidQuery {
    bidder: String,
    uid: String,
    fpid: String,
    gdpr: Option<String>,
    gdpr_consent: Option<String>,
}

/// Minimal GDPR gate: `gdpr=1` requires a non-empty consent string.
/// Anything else is treated as consent not applicable.
fn consent_ok(query: &SetuidQuery) -> bool {
    match query.gdpr.as_deref() {
        Some("1") => query.gdpr_consent.as_deref().is_some_and(|c| !c.is_empty()),
        _ => true,
    }
}

pub async fn setuid(state: web::Data<AppState>, query: web::Query<SetuidQuery>) -> HttpResponse {
    let span = crate::rtb::sample_or_attach_root_span!("handle_setuid");
    handle_setuid(state, query).instrument(span).await
}

async fn handle_setuid(state: web::Data<AppState>, query: web::Query<SetuidQuery>) -> HttpResponse {
    let query = query.into_inner();
    if query.bidder.is_empty() || query.uid.is_empty() || query.fpid.is_empty() {
        return HttpResponse::BadRequest().json(crate::rtb::client::ClientErrorResponse { error: "bidder, uid and fpid are required".into() });
    }

    if !consent_ok(&query) {
        // Fail closed without writing the row, and without leaking
        // which validation failed back to the caller.
        return HttpResponse::Ok().finish();
    }

    state.user_sync.complete(&query.fpid, &query.bidder, query.uid);
    HttpResponse::Ok().finish()
}
