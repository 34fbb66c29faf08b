use crate::app::config::ResolverMode;
use crate::app::context::StartupContext;
use crate::core::adapter::AdapterRegistry;
use crate::core::adapter::rubicon::RubiconAdapter;
use crate::core::breaker::CircuitBreaker;
use crate::core::config_manager::ConfigManager;
use crate::core::enrichment::device::DeviceLookup;
use crate::core::enrichment::geo::NoopGeoIpLookup;
use crate::core::events::EventRecorder;
use crate::core::exchange::Exchange;
use crate::core::pricing::{spawn_refresh, CurrencyConverter};
use crate::core::providers;
use crate::core::resolver::{BidderDirectory, ConfigResolver};
use crate::core::usersync::{spawn_pruner, UserSyncStore};
use anyhow::{anyhow, bail, Context, Error};
use async_trait::async_trait;
use crate::pipeline::{AsyncTask, BlockingTask};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub(super) struct ConfigLoadTask {
    manager: Arc<ConfigManager>,
}

impl ConfigLoadTask {
    pub(super) fn new(manager: Arc<ConfigManager>) -> Self {
        Self { manager }
    }
}

impl BlockingTask<Arc<StartupContext>, Error> for ConfigLoadTask {
    fn run(&self, ctx: &Arc<StartupContext>) -> Result<(), Error> {
        self.manager.start()?;
        let cfg = self.manager.get().clone();
        ctx.config.set(cfg).map_err(|_| anyhow!("config already set on startup context"))
    }
}

pub(super) struct ObservabilityTask;

impl BlockingTask<Arc<StartupContext>, Error> for ObservabilityTask {
    fn run(&self, ctx: &Arc<StartupContext>) -> Result<(), Error> {
        let config = ctx.config.get().ok_or_else(|| anyhow!("config not loaded before observability init"))?;

        crate::rtb::set_span_sample_rate(config.logging.span_sample_rate);

        if let Some(provider) = crate::core::observability::init(&config.logging)? {
            ctx.tracer_provider
                .set(provider)
                .map_err(|_| anyhow!("tracer provider already initialized"))?;
        }

        info!("observability configured");
        Ok(())
    }
}

pub(super) struct HttpClientTask;

impl BlockingTask<Arc<StartupContext>, Error> for HttpClientTask {
    fn run(&self, ctx: &Arc<StartupContext>) -> Result<(), Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("building shared http client")?;
        ctx.http_client.set(client).map_err(|_| anyhow!("http client already set"))
    }
}

pub(super) struct ResolverLoadTask;

#[async_trait]
impl AsyncTask<Arc<StartupContext>, Error> for ResolverLoadTask {
    async fn run(&self, ctx: &Arc<StartupContext>) -> Result<(), Error> {
        let config = ctx.config.get().ok_or_else(|| anyhow!("config not loaded before resolver init"))?;
        let resolver_cfg = &config.resolver;

        let resolver = Arc::new(ConfigResolver::new(resolver_cfg));
        resolver.load_fallback(resolver_cfg).await.context("loading config resolver fallback")?;

        let bidders = Arc::new(BidderDirectory::new());
        if let Some(path) = &resolver_cfg.fallback_bidders_path {
            bidders.load_fallback(path).await.context("loading bidder directory fallback")?;
        }

        let wants_live = matches!(resolver_cfg.mode, ResolverMode::Db | ResolverMode::DbWithFileFallback);
        match (&resolver_cfg.firestore_project_id, wants_live) {
            (Some(project_id), true) => {
                let db = providers::create_client(project_id).await.context("connecting to firestore")?;
                let db = Arc::new(db);
                resolver.start_live(db.clone()).await.context("starting live config resolver")?;
                bidders.start_live(db).await.context("starting live bidder directory")?;
            }
            (None, true) if resolver_cfg.mode == ResolverMode::Db => {
                bail!("resolver.mode=db requires resolver.firestore_project_id");
            }
            _ => {
                warn!("config resolver running on static fallback only, no firestore_project_id configured");
            }
        }

        ctx.resolver.set(resolver).map_err(|_| anyhow!("resolver already set"))?;
        ctx.bidders.set(bidders).map_err(|_| anyhow!("bidder directory already set"))?;
        Ok(())
    }
}

pub(super) struct DeviceGeoTask;

impl BlockingTask<Arc<StartupContext>, Error> for DeviceGeoTask {
    fn run(&self, ctx: &Arc<StartupContext>) -> Result<(), Error> {
        let config = ctx.config.get().ok_or_else(|| anyhow!("config not loaded before device lookup init"))?;
        let cache_sz = config.caches.cache_device_sz;
        if cache_sz < 1_000 {
            bail!("caches.cache_device_sz is too small to be useful, want at least 1000");
        }

        let lookup = DeviceLookup::try_new(NonZeroU32::new(cache_sz as u32).unwrap())
            .map_err(|e| anyhow!("failed to initialize device lookup: {e}"))?;

        ctx.device_lookup.set(Arc::new(lookup)).map_err(|_| anyhow!("device lookup already set"))?;
        ctx.geo_lookup.set(Arc::new(NoopGeoIpLookup)).map_err(|_| anyhow!("geo lookup already set"))?;
        Ok(())
    }
}

pub(super) struct UserSyncTask;

impl BlockingTask<Arc<StartupContext>, Error> for UserSyncTask {
    fn run(&self, ctx: &Arc<StartupContext>) -> Result<(), Error> {
        let config = ctx.config.get().ok_or_else(|| anyhow!("config not loaded before user-sync init"))?;
        let store = Arc::new(UserSyncStore::new(config.usersync.sync_ttl));
        spawn_pruner(store.clone(), config.usersync.prune_interval, config.usersync.stale_after);
        ctx.user_sync.set(store).map_err(|_| anyhow!("user-sync store already set"))
    }
}

pub(super) struct BreakerTask;

impl BlockingTask<Arc<StartupContext>, Error> for BreakerTask {
    fn run(&self, ctx: &Arc<StartupContext>) -> Result<(), Error> {
        let config = ctx.config.get().ok_or_else(|| anyhow!("config not loaded before breaker init"))?;
        let breaker_cfg = &config.breaker;
        let breaker = CircuitBreaker::new(
            breaker_cfg.failure_threshold,
            breaker_cfg.failure_window,
            breaker_cfg.open_duration,
            breaker_cfg.half_open_max_probes,
        );
        ctx.breaker.set(Arc::new(breaker)).map_err(|_| anyhow!("circuit breaker already set"))
    }
}

pub(super) struct CurrencyTask;

impl BlockingTask<Arc<StartupContext>, Error> for CurrencyTask {
    fn run(&self, ctx: &Arc<StartupContext>) -> Result<(), Error> {
        let config = ctx.config.get().ok_or_else(|| anyhow!("config not loaded before currency init"))?;
        let client = ctx.http_client.get().ok_or_else(|| anyhow!("http client not set before currency init"))?;
        let converter = Arc::new(CurrencyConverter::new(config.currency.default_currency.clone()));

        if let Some(url) = &config.currency.rates_url {
            spawn_refresh(converter.clone(), client.clone(), url.clone(), config.currency.refresh_interval);
        }

        ctx.currency.set(converter).map_err(|_| anyhow!("currency converter already set"))
    }
}

pub(super) struct EventsTask;

impl BlockingTask<Arc<StartupContext>, Error> for EventsTask {
    fn run(&self, ctx: &Arc<StartupContext>) -> Result<(), Error> {
        let config = ctx.config.get().ok_or_else(|| anyhow!("config not loaded before event recorder init"))?;
        let recorder = EventRecorder::new(config.events.sink_url.clone(), config.events.buffer_capacity);
        recorder.spawn(config.events.flush_interval);
        ctx.events.set(recorder).map_err(|_| anyhow!("event recorder already set"))
    }
}

pub(super) struct AdapterRegistryTask;

impl BlockingTask<Arc<StartupContext>, Error> for AdapterRegistryTask {
    fn run(&self, ctx: &Arc<StartupContext>) -> Result<(), Error> {
        let bidders = ctx.bidders.get().ok_or_else(|| anyhow!("bidder directory not loaded before adapter registration"))?;
        let mut registry = AdapterRegistry::new();

        for bidder in bidders.enabled() {
            match bidder.code.as_str() {
                crate::core::adapter::rubicon::CODE => {
                    registry.register(Box::new(RubiconAdapter::new(bidder.endpoint.clone())));
                }
                other => warn!(bidder = other, "no adapter implementation for configured bidder code"),
            }
        }

        ctx.adapters.set(Arc::new(registry)).map_err(|_| anyhow!("adapter registry already set"))
    }
}

pub(super) struct ExchangeBuildTask;

impl BlockingTask<Arc<StartupContext>, Error> for ExchangeBuildTask {
    fn run(&self, ctx: &Arc<StartupContext>) -> Result<(), Error> {
        let config = ctx.config.get().ok_or_else(|| anyhow!("config not loaded before exchange assembly"))?;
        let adapters = ctx.adapters.get().ok_or_else(|| anyhow!("adapter registry missing during exchange assembly"))?.clone();
        let bidders = ctx.bidders.get().ok_or_else(|| anyhow!("bidder directory missing during exchange assembly"))?.clone();
        let breaker = ctx.breaker.get().ok_or_else(|| anyhow!("circuit breaker missing during exchange assembly"))?.clone();
        let currency = ctx.currency.get().ok_or_else(|| anyhow!("currency converter missing during exchange assembly"))?.clone();
        let events = ctx.events.get().ok_or_else(|| anyhow!("event recorder missing during exchange assembly"))?.clone();
        let http = ctx.http_client.get().ok_or_else(|| anyhow!("http client missing during exchange assembly"))?.clone();

        let exchange = Exchange::new(adapters, bidders, breaker, currency, events, http, config.exchange.clone());
        ctx.exchange.set(exchange).map_err(|_| anyhow!("exchange already assembled"))
    }
}

pub(super) struct StartServerTask;

#[async_trait]
impl AsyncTask<Arc<StartupContext>, Error> for StartServerTask {
    async fn run(&self, ctx: &Arc<StartupContext>) -> Result<(), Error> {
        crate::app::handlers::serve(ctx.clone()).await
    }
}
