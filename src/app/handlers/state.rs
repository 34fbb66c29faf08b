//! Shared request-handling state, assembled once in [`super::serve`]
//! from the [`StartupContext`] and handed to every route as
//! `web::Data`. Extracts each `OnceLock` once at server build time
//! instead of re-reading it per request.

use crate::app::config::RexConfig;
use crate::app::context::StartupContext;
use crate::core::enrichment::device::DeviceLookup;
use crate::core::enrichment::geo::GeoIpLookup;
use crate::core::exchange::Exchange;
use crate::core::pricing::CurrencyConverter;
use crate::core::resolver::{BidderDirectory, ConfigResolver};
use crate::core::usersync::UserSyncStore;
use anyhow::{anyhow, Error};
use std::sync::Arc;

pub struct AppState {
    pub resolver: Arc<ConfigResolver>,
    pub bidders: Arc<BidderDirectory>,
    pub device_lookup: Arc<DeviceLookup>,
    pub geo_lookup: Arc<dyn GeoIpLookup>,
    pub user_sync: Arc<UserSyncStore>,
    pub exchange: Exchange,
    pub currency: Arc<CurrencyConverter>,
    pub config: RexConfig,
}

impl AppState {
    pub fn from_context(ctx: &StartupContext) -> Result<Self, Error> {
        Ok(Self {
            resolver: ctx.resolver.get().cloned().ok_or_else(|| anyhow!("resolver not initialized before server start"))?,
            bidders: ctx.bidders.get().cloned().ok_or_else(|| anyhow!("bidder directory not initialized before server start"))?,
            device_lookup: ctx.device_lookup.get().cloned().ok_or_else(|| anyhow!("device lookup not initialized before server start"))?,
            geo_lookup: ctx.geo_lookup.get().cloned().ok_or_else(|| anyhow!("geo lookup not initialized before server start"))?,
            user_sync: ctx.user_sync.get().cloned().ok_or_else(|| anyhow!("user-sync store not initialized before server start"))?,
            exchange: ctx.exchange.get().cloned().ok_or_else(|| anyhow!("exchange not assembled before server start"))?,
            currency: ctx.currency.get().cloned().ok_or_else(|| anyhow!("currency converter not initialized before server start"))?,
            config: ctx.config.get().cloned().ok_or_else(|| anyhow!("config not loaded before server start"))?,
        })
    }
}
