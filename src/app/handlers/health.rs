//! `GET /health` and `GET /health/ready`. Readiness reports
//! structured component status rather than a bare boolean: config
//! resolver store reachability, currency rate-source staleness, and a
//! circuit-breaker summary of any bidder currently tripped open.

use super::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody {
    status: &'static str,
    timestamp: u64,
    version: &'static str,
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthBody {
        status: "ok",
        timestamp: crate::rtb::common::utils::epoch_timestamp(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ComponentStatus {
    reachable: bool,
    detail: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadyBody {
    status: &'static str,
    store: ComponentStatus,
    currency: ComponentStatus,
    circuit_breakers: ComponentStatus,
}

/// Currency rates older than this are reported as stale, independent
/// of the converter's own refresh cadence — a generous multiple of
/// the default 30-minute refresh interval.
const CURRENCY_STALE_AFTER: std::time::Duration = std::time::Duration::from_secs(3 * 60 * 60);

pub async fn health_ready(state: web::Data<AppState>) -> HttpResponse {
    let store_ok = state.resolver.store_healthy();
    let store = ComponentStatus {
        reachable: store_ok,
        detail: if store_ok { None } else { Some("config resolver store unreachable".to_string()) },
    };

    let staleness = state.currency.staleness();
    let currency_ok = staleness.is_none_or(|age| age < CURRENCY_STALE_AFTER);
    let currency = ComponentStatus {
        reachable: currency_ok,
        detail: staleness.map(|age| format!("rates last refreshed {}s ago", age.as_secs())),
    };

    let open_bidders = state.exchange.breaker().open_bidders();
    let breakers_ok = open_bidders.is_empty();
    let circuit_breakers = ComponentStatus {
        reachable: breakers_ok,
        detail: if breakers_ok { None } else { Some(format!("open: {}", open_bidders.join(", "))) },
    };

    let overall_ok = store_ok && currency_ok;
    let body = ReadyBody {
        status: if overall_ok { "ready" } else { "not_ready" },
        store,
        currency,
        circuit_breakers,
    };

    if overall_ok {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
