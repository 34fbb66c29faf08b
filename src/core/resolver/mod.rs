//! Config Resolver: given `(account_id, domain, slot_pattern,
//! device_class, bidder_code)`, returns that bidder's parameter object
//! or "not configured". Lookup order is slot-and-device → slot →
//! domain → account default; first hit per bidder wins.
//!
//! Backed by a DB-shaped live store ([`FirestoreProvider`]) with a
//! static-file fallback ([`FileProvider`]), selected by
//! [`ResolverMode`]. Resolved entries are
//! cached for a short TTL keyed by the full lookup tuple; cache misses
//! fall through to the in-memory maps kept live by the provider.

use crate::app::config::{ResolverConfig, ResolverMode};
use crate::core::models::account::{Account, AdSlot, DeviceClass, Publisher};
use crate::core::models::bidder::Bidder;
use crate::core::providers::{FileProvider, FirestoreProvider, Provider, ProviderEvent};
use anyhow::{Context, Error};
use moka::future::Cache;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResolveKey {
    account_id: String,
    domain: String,
    slot_pattern: String,
    device: DeviceClass,
    bidder_code: String,
}

struct Indices {
    accounts: HashMap<String, Account>,
    publishers: HashMap<String, Publisher>,
    slots: HashMap<String, AdSlot>,
    /// `(domain, divId) -> slot_pattern`, for requests that omit
    /// `adUnitPath` and supply only a client divId.
    div_index: HashMap<(String, String), String>,
}

impl Indices {
    fn empty() -> Self {
        Self {
            accounts: HashMap::new(),
            publishers: HashMap::new(),
            slots: HashMap::new(),
            div_index: HashMap::new(),
        }
    }
}

pub struct ConfigResolver {
    mode: ResolverMode,
    indices: RwLock<Indices>,
    cache: Cache<ResolveKey, Option<Arc<Value>>>,
    /// Flips false when the live store's initial load fails or a
    /// reachability probe trips; resolves then fall back to the
    /// static file snapshot taken at startup.
    store_healthy: AtomicBool,
    fallback: RwLock<Indices>,
}

impl ConfigResolver {
    pub fn new(cfg: &ResolverConfig) -> Self {
        Self {
            mode: cfg.mode,
            indices: RwLock::new(Indices::empty()),
            cache: Cache::builder().time_to_live(cfg.cache_ttl).build(),
            store_healthy: AtomicBool::new(false),
            fallback: RwLock::new(Indices::empty()),
        }
    }

    /// Loads the fallback static-file snapshot (always, regardless of
    /// mode, so a later `Db` store outage has something to land on
    /// only if the operator also configured `DbWithFileFallback`).
    pub async fn load_fallback(&self, cfg: &ResolverConfig) -> Result<(), Error> {
        let mut idx = Indices::empty();

        if let Some(path) = &cfg.fallback_accounts_path {
            let provider = FileProvider::<Account>::new(path);
            let accounts = provider.start(Box::new(|_| {})).await?;
            for a in accounts {
                idx.accounts.insert(a.id.clone(), a);
            }
        }
        if let Some(path) = &cfg.fallback_publishers_path {
            let provider = FileProvider::<Publisher>::new(path);
            let publishers = provider.start(Box::new(|_| {})).await?;
            for p in publishers {
                idx.publishers.insert(p.domain.clone(), p);
            }
        }
        if let Some(path) = &cfg.fallback_slots_path {
            let provider = FileProvider::<AdSlot>::new(path);
            let slots = provider.start(Box::new(|_| {})).await?;
            for s in slots {
                idx.slots.insert(s.slot_pattern.clone(), s);
            }
        }

        info!(
            "Loaded fallback config: {} accounts, {} publishers, {} slots",
            idx.accounts.len(),
            idx.publishers.len(),
            idx.slots.len()
        );
        *self.fallback.write() = idx;
        Ok(())
    }

    /// Starts the live Firestore-backed providers and keeps the
    /// in-memory indices current as change events stream in. Marks the
    /// store healthy only after the initial snapshot succeeds.
    pub async fn start_live(
        self: &Arc<Self>,
        db: Arc<firestore::FirestoreDb>,
    ) -> Result<(), Error> {
        self.start_accounts(db.clone()).await?;
        self.start_publishers(db.clone()).await?;
        self.start_slots(db).await?;
        self.store_healthy.store(true, Ordering::Release);
        Ok(())
    }

    async fn start_accounts(self: &Arc<Self>, db: Arc<firestore::FirestoreDb>) -> Result<(), Error> {
        let provider = FirestoreProvider::<Account>::new(db, "accounts");
        let this = self.clone();
        let snapshot = provider
            .start(Box::new(move |event| this.on_account_event(event)))
            .await
            .context("loading accounts from firestore")?;

        let mut idx = self.indices.write();
        for a in snapshot {
            idx.accounts.insert(a.id.clone(), a);
        }
        Ok(())
    }

    async fn start_publishers(
        self: &Arc<Self>,
        db: Arc<firestore::FirestoreDb>,
    ) -> Result<(), Error> {
        let provider = FirestoreProvider::<Publisher>::new(db, "publishers");
        let this = self.clone();
        let snapshot = provider
            .start(Box::new(move |event| this.on_publisher_event(event)))
            .await
            .context("loading publishers from firestore")?;

        let mut idx = self.indices.write();
        for p in snapshot {
            idx.publishers.insert(p.domain.clone(), p);
        }
        Ok(())
    }

    async fn start_slots(self: &Arc<Self>, db: Arc<firestore::FirestoreDb>) -> Result<(), Error> {
        let provider = FirestoreProvider::<AdSlot>::new(db, "ad_slots");
        let this = self.clone();
        let snapshot = provider
            .start(Box::new(move |event| this.on_slot_event(event)))
            .await
            .context("loading ad slots from firestore")?;

        let mut idx = self.indices.write();
        for s in snapshot {
            idx.slots.insert(s.slot_pattern.clone(), s);
        }
        Ok(())
    }

    fn on_account_event(&self, event: ProviderEvent<Account>) {
        self.cache.invalidate_all();
        let mut idx = self.indices.write();
        match event {
            ProviderEvent::Added(a) | ProviderEvent::Modified(a) => {
                idx.accounts.insert(a.id.clone(), a);
            }
            ProviderEvent::Removed(id) => {
                idx.accounts.remove(&id);
            }
        }
    }

    fn on_publisher_event(&self, event: ProviderEvent<Publisher>) {
        self.cache.invalidate_all();
        let mut idx = self.indices.write();
        match event {
            ProviderEvent::Added(p) | ProviderEvent::Modified(p) => {
                idx.publishers.insert(p.domain.clone(), p);
            }
            ProviderEvent::Removed(domain) => {
                idx.publishers.remove(&domain);
            }
        }
    }

    fn on_slot_event(&self, event: ProviderEvent<AdSlot>) {
        self.cache.invalidate_all();
        let mut idx = self.indices.write();
        match event {
            ProviderEvent::Added(s) | ProviderEvent::Modified(s) => {
                idx.slots.insert(s.slot_pattern.clone(), s);
            }
            ProviderEvent::Removed(pattern) => {
                idx.slots.remove(&pattern);
            }
        }
    }

    /// Whether the live store backed the last resolution, or requests
    /// are riding on the static fallback snapshot (exposed for
    /// `/health/ready`).
    pub fn store_healthy(&self) -> bool {
        self.store_healthy.load(Ordering::Acquire)
    }

    /// Maps a client-supplied `divId` to a slot pattern when the
    /// request omits `adUnitPath`.
    pub fn resolve_div(&self, domain: &str, div_id: &str) -> Option<String> {
        let key = (domain.to_string(), div_id.to_string());
        self.indices
            .read()
            .div_index
            .get(&key)
            .or_else(|| self.fallback.read().div_index.get(&key))
            .cloned()
    }

    /// Resolves the bidder's parameter object, or `None` if the bidder
    /// has no configuration at any level; the caller logs this as
    /// "no config for bidder" and skips it rather than erroring.
    pub async fn resolve(
        &self,
        account_id: &str,
        domain: &str,
        slot_pattern: &str,
        device: DeviceClass,
        bidder_code: &str,
    ) -> Option<Arc<Value>> {
        let key = ResolveKey {
            account_id: account_id.to_string(),
            domain: domain.to_string(),
            slot_pattern: slot_pattern.to_string(),
            device,
            bidder_code: bidder_code.to_string(),
        };

        if let Some(hit) = self.cache.get(&key).await {
            return hit;
        }

        let resolved = self.resolve_uncached(&key);
        self.cache.insert(key, resolved.clone()).await;
        resolved
    }

    fn resolve_uncached(&self, key: &ResolveKey) -> Option<Arc<Value>> {
        let use_live = matches!(self.mode, ResolverMode::Db | ResolverMode::DbWithFileFallback)
            && self.store_healthy.load(Ordering::Acquire);

        if use_live {
            if let Some(v) = self.resolve_in(&self.indices.read(), key) {
                return Some(v);
            }
            if self.mode != ResolverMode::DbWithFileFallback {
                debug!(bidder = %key.bidder_code, "no config for bidder");
                return None;
            }
        } else if self.mode == ResolverMode::Db {
            warn!("config resolver store unreachable and mode=db, no fallback available");
            return None;
        }

        let result = self.resolve_in(&self.fallback.read(), key);
        if result.is_none() {
            debug!(bidder = %key.bidder_code, "no config for bidder");
        }
        result
    }

    fn resolve_in(&self, idx: &Indices, key: &ResolveKey) -> Option<Arc<Value>> {
        if let Some(slot) = idx.slots.get(&key.slot_pattern) {
            if let Some(v) = slot.param_for(key.device, &key.bidder_code) {
                return Some(Arc::new(v.clone()));
            }
        }

        if let Some(publisher) = idx.publishers.get(&key.domain) {
            if let Some(v) = publisher.params.get(&key.bidder_code) {
                return Some(Arc::new(v.clone()));
            }

            if let Some(account) = idx.accounts.get(&publisher.account_id) {
                if account.allows_domain(&key.domain) {
                    if let Some(v) = account.default_params.get(&key.bidder_code) {
                        return Some(Arc::new(v.clone()));
                    }
                }
            }
        }

        if let Some(account) = idx.accounts.get(&key.account_id) {
            if let Some(v) = account.default_params.get(&key.bidder_code) {
                return Some(Arc::new(v.clone()));
            }
        }

        None
    }
}

/// Separately-loaded bidder registry: bidder definitions rarely
/// change per-request but still come from the same config store, so
/// they share the provider plumbing rather than the resolver's
/// per-tuple cache.
pub struct BidderDirectory {
    bidders: RwLock<HashMap<String, Bidder>>,
}

impl BidderDirectory {
    pub fn new() -> Self {
        Self {
            bidders: RwLock::new(HashMap::new()),
        }
    }

    pub async fn load_fallback(&self, path: &std::path::Path) -> Result<(), Error> {
        let provider = FileProvider::<Bidder>::new(path);
        let bidders = provider.start(Box::new(|_| {})).await?;
        let mut map = self.bidders.write();
        for b in bidders {
            map.insert(b.code.clone(), b);
        }
        Ok(())
    }

    pub async fn start_live(self: &Arc<Self>, db: Arc<firestore::FirestoreDb>) -> Result<(), Error> {
        let provider = FirestoreProvider::<Bidder>::new(db, "bidders");
        let this = self.clone();
        let snapshot = provider
            .start(Box::new(move |event| {
                let mut map = this.bidders.write();
                match event {
                    ProviderEvent::Added(b) | ProviderEvent::Modified(b) => {
                        map.insert(b.code.clone(), b);
                    }
                    ProviderEvent::Removed(code) => {
                        map.remove(&code);
                    }
                }
            }))
            .await
            .context("loading bidders from firestore")?;

        let mut map = self.bidders.write();
        for b in snapshot {
            map.insert(b.code.clone(), b);
        }
        Ok(())
    }

    /// Direct registration, bypassing the file/Firestore providers —
    /// used by tests and by any startup path that builds bidder
    /// definitions programmatically rather than loading them.
    pub fn insert(&self, bidder: Bidder) {
        self.bidders.write().insert(bidder.code.clone(), bidder);
    }

    pub fn get(&self, code: &str) -> Option<Bidder> {
        self.bidders.read().get(code).cloned()
    }

    pub fn enabled(&self) -> Vec<Bidder> {
        self.bidders
            .read()
            .values()
            .filter(|b| b.enabled)
            .cloned()
            .collect()
    }
}

impl Default for BidderDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::account::BidderParamsMap;
    use serde_json::json;

    fn resolver_with(indices: Indices) -> ConfigResolver {
        let cfg = ResolverConfig {
            mode: ResolverMode::Db,
            ..Default::default()
        };
        let resolver = ConfigResolver::new(&cfg);
        *resolver.indices.write() = indices;
        resolver.store_healthy.store(true, Ordering::Release);
        resolver
    }

    #[test]
    fn slot_level_config_wins_over_domain_level() {
        let mut params: BidderParamsMap = HashMap::new();
        params.insert("rubicon".into(), json!({"zone": 1}));

        let mut publisher_params: BidderParamsMap = HashMap::new();
        publisher_params.insert("rubicon".into(), json!({"zone": 2}));

        let mut idx = Indices::empty();
        idx.slots.insert(
            "d.com/top".into(),
            AdSlot {
                slot_pattern: "d.com/top".into(),
                publisher_domain: "d.com".into(),
                params,
                ..Default::default()
            },
        );
        idx.publishers.insert(
            "d.com".into(),
            Publisher {
                domain: "d.com".into(),
                account_id: "A".into(),
                params: publisher_params,
            },
        );

        let resolver = resolver_with(idx);
        let key = ResolveKey {
            account_id: "A".into(),
            domain: "d.com".into(),
            slot_pattern: "d.com/top".into(),
            device: DeviceClass::Desktop,
            bidder_code: "rubicon".into(),
        };
        let resolved = resolver.resolve_uncached(&key).unwrap();
        assert_eq!(resolved["zone"], 1);
    }

    #[test]
    fn missing_bidder_at_every_level_returns_none() {
        let resolver = resolver_with(Indices::empty());
        let key = ResolveKey {
            account_id: "A".into(),
            domain: "d.com".into(),
            slot_pattern: "d.com/top".into(),
            device: DeviceClass::Desktop,
            bidder_code: "rubicon".into(),
        };
        assert!(resolver.resolve_uncached(&key).is_none());
    }

    #[test]
    fn device_override_for_one_bidder_does_not_shadow_generic_slot_params_for_another() {
        let mut desktop_params: BidderParamsMap = HashMap::new();
        desktop_params.insert("rubicon".into(), json!({"zone": 9}));

        let mut generic_params: BidderParamsMap = HashMap::new();
        generic_params.insert("appnexus".into(), json!({"placementId": 1}));

        let mut idx = Indices::empty();
        idx.slots.insert(
            "d.com/top".into(),
            AdSlot {
                slot_pattern: "d.com/top".into(),
                publisher_domain: "d.com".into(),
                params: generic_params,
                params_desktop: desktop_params,
                ..Default::default()
            },
        );

        let resolver = resolver_with(idx);
        let key = ResolveKey {
            account_id: "A".into(),
            domain: "d.com".into(),
            slot_pattern: "d.com/top".into(),
            device: DeviceClass::Desktop,
            bidder_code: "appnexus".into(),
        };
        let resolved = resolver.resolve_uncached(&key).unwrap();
        assert_eq!(resolved["placementId"], 1);
    }
}
