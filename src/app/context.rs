//! Process-wide shared state, assembled once by the startup pipeline
//! and read (never reassigned) by every request handler afterward.
//!
//! A `Default` struct of `OnceLock`s, one per component the startup
//! pipeline builds, so later tasks can depend on earlier ones through
//! the same context value instead of threading constructor arguments
//! through the pipeline itself.

use crate::app::config::RexConfig;
use crate::core::adapter::AdapterRegistry;
use crate::core::breaker::CircuitBreaker;
use crate::core::enrichment::device::DeviceLookup;
use crate::core::enrichment::geo::GeoIpLookup;
use crate::core::events::EventRecorder;
use crate::core::exchange::Exchange;
use crate::core::pricing::CurrencyConverter;
use crate::core::resolver::{BidderDirectory, ConfigResolver};
use crate::core::usersync::UserSyncStore;
use crate::rtb::server::Server;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::sync::{Arc, OnceLock};

#[derive(Default)]
pub struct StartupContext {
    /// Loaded once by `ConfigLoadTask`; every later task reads from here
    /// rather than re-parsing the file.
    pub config: OnceLock<RexConfig>,
    /// Only set when a sink configured an OTLP exporter, so shutdown
    /// knows whether there is a provider to flush.
    pub tracer_provider: OnceLock<SdkTracerProvider>,

    pub device_lookup: OnceLock<Arc<DeviceLookup>>,
    pub geo_lookup: OnceLock<Arc<dyn GeoIpLookup>>,
    pub resolver: OnceLock<Arc<ConfigResolver>>,
    pub bidders: OnceLock<Arc<BidderDirectory>>,
    pub user_sync: OnceLock<Arc<UserSyncStore>>,
    pub breaker: OnceLock<Arc<CircuitBreaker>>,
    pub currency: OnceLock<Arc<CurrencyConverter>>,
    pub events: OnceLock<Arc<EventRecorder>>,
    pub adapters: OnceLock<Arc<AdapterRegistry>>,
    pub http_client: OnceLock<reqwest::Client>,
    /// Built last, once everything it depends on is in place.
    pub exchange: OnceLock<Exchange>,

    /// The bound HTTP listener, set by the final startup task and
    /// taken down by the first shutdown task.
    pub server: OnceLock<Server>,
}
