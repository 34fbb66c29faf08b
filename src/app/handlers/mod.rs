//! HTTP surface: builds the `actix-web`
//! server directly (the in-tree [`crate::rtb::server::Server`] is just
//! a handle wrapper around the already-running listener) and wires
//! the six external endpoints.
//!
//! Bid-shaped handlers share a span-sampled instrumentation wrapper
//! and an OpenTelemetry counter/histogram pair recording outcome.

mod bid;
mod health;
mod state;
mod sync;

use crate::app::context::StartupContext;
use actix_web::{web, App, HttpServer};
use anyhow::{anyhow, Context as _, Error};
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::{global, KeyValue};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::info;

pub use state::AppState;

/// Max request body accepted on the bid-shaped endpoints.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

static REQUESTS_TOTAL: LazyLock<Counter<u64>> =
    LazyLock::new(|| global::meter("rex").u64_counter("requests").with_description("Inbound HTTP requests by route and outcome").build());

static REQUEST_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    global::meter("rex")
        .f64_histogram("http.server.duration")
        .with_description("HTTP request handling duration in seconds")
        .with_unit("s")
        .build()
});

/// Records one request's outcome as a counter/histogram pair keyed by
/// route, outcome, and status.
pub(super) fn record_request_metric(route: &'static str, outcome: &str, status: u16, duration: Duration) {
    let attrs = [
        KeyValue::new("http.route", route),
        KeyValue::new("outcome", outcome.to_string()),
        KeyValue::new("http.response.status_code", status as i64),
    ];
    REQUESTS_TOTAL.add(1, &attrs);
    REQUEST_DURATION.record(duration.as_secs_f64(), &attrs);
}

/// Builds and starts the HTTP listener, storing its handle on
/// `ctx.server` for the shutdown pipeline. Returns once the listener
/// is bound and spawned — the server itself runs on its own task so
/// startup never blocks on it.
pub async fn serve(ctx: Arc<StartupContext>) -> Result<(), Error> {
    let config = ctx.config.get().ok_or_else(|| anyhow!("config not loaded before server start"))?.clone();
    let state = web::Data::new(AppState::from_context(&ctx)?);
    let bind = config.http.bind.clone();
    let workers = config.http.workers;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(MAX_BODY_BYTES))
            .route("/v1/bid", web::post().to(bid::bid))
            .route("/openrtb2/auction", web::post().to(bid::openrtb_auction))
            .route("/cookie_sync", web::post().to(sync::cookie_sync))
            .route("/setuid", web::get().to(sync::setuid))
            .route("/health", web::get().to(health::health))
            .route("/health/ready", web::get().to(health::health_ready))
    });

    let server = match workers {
        Some(n) => server.workers(n),
        None => server,
    };

    let running = server.bind(&bind).with_context(|| format!("binding http listener on {bind}"))?.run();
    let handle = running.handle();
    tokio::spawn(running);

    ctx.server.set(crate::rtb::server::Server::new(handle)).map_err(|_| anyhow!("http server already started"))?;
    info!(bind = %bind, "http server listening");
    Ok(())
}
