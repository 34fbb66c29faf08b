//! Request Normalizer: turns the client-facing compact
//! request into the canonical, OpenRTB-shaped [`BidRequest`].
//!
//! Every step here is one independent responsibility:
//! request-id generation, per-slot impression/extension assembly,
//! device-class detection, UA parsing, geo precedence, user/eid
//! assembly, regs, and the deadline assignment. Step by step because
//! each one is independently wrong in a different way if skipped —
//! this mirrors splitting normalization into one task per concern
//! (device lookup, publisher lookup, identity scrubbing) rather than
//! one monolithic function.

use crate::core::enrichment::device::{is_mobile_ua, DeviceLookup};
use crate::core::enrichment::geo::{resolve_geo, GeoIpLookup};
use crate::core::models::account::DeviceClass;
use crate::core::resolver::{BidderDirectory, ConfigResolver};
use crate::core::usersync::UserSyncStore;
use crate::rtb::bid_request::{
    Banner, BidRequest, BidRequestBuilder, Device, DeviceBuilder, Eid, Format, ImpBuilder,
    Publisher, Regs, RegsBuilder, Site, SiteBuilder, Uid, User, UserBuilder,
};
use crate::rtb::client::ClientBidRequest;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct NormalizeError(pub String);

impl std::fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation error: {}", self.0)
    }
}

impl std::error::Error for NormalizeError {}

/// The canonical request plus the bookkeeping the response builder
/// needs to map winners back to the client's slots.
pub struct NormalizeOutcome {
    pub request: BidRequest,
    pub account_id: String,
    pub device_class: DeviceClass,
    pub slot_by_imp: HashMap<String, String>,
}

pub struct Normalizer<'a> {
    pub resolver: &'a ConfigResolver,
    pub bidders: &'a BidderDirectory,
    pub device_lookup: &'a DeviceLookup,
    pub geo_lookup: &'a dyn GeoIpLookup,
    pub user_sync: &'a UserSyncStore,
}

impl<'a> Normalizer<'a> {
    /// `cookie_uids` models whatever bidder UIDs a transport-level
    /// cookie carried inline; this module has no HTTP awareness of its
    /// own.
    pub async fn normalize(
        &self,
        client: &ClientBidRequest,
        cookie_uids: &HashMap<String, String>,
        server_tmax: Duration,
        min_tmax: Duration,
    ) -> Result<NormalizeOutcome, NormalizeError> {
        if client.account_id.is_empty() {
            return Err(NormalizeError("accountId is required".into()));
        }
        if client.slots.is_empty() {
            return Err(NormalizeError("slots must not be empty".into()));
        }
        if let Some(timeout) = client.timeout {
            if Duration::from_millis(timeout) < min_tmax {
                return Err(NormalizeError(format!(
                    "timeout {timeout}ms is below the minimum of {}ms",
                    min_tmax.as_millis()
                )));
            }
        }
        for slot in &client.slots {
            if slot.div_id.is_empty() {
                return Err(NormalizeError("every slot requires a divId".into()));
            }
            if slot.sizes.is_empty() {
                return Err(NormalizeError(format!("slot {} requires sizes", slot.div_id)));
            }
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let domain = client.page.domain.clone();
        let ua = client
            .device
            .as_ref()
            .map(|d| d.user_agent.clone())
            .unwrap_or_default();
        let device_class = if is_mobile_ua(&ua) {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        };

        let mut slot_by_imp = HashMap::with_capacity(client.slots.len());
        let mut imps = Vec::with_capacity(client.slots.len());

        for slot in &client.slots {
            let imp_id = uuid::Uuid::new_v4().to_string();
            slot_by_imp.insert(imp_id.clone(), slot.div_id.clone());

            let slot_pattern = slot
                .ad_unit_path
                .clone()
                .or_else(|| self.resolver.resolve_div(&domain, &slot.div_id))
                .unwrap_or_default();

            let formats: Vec<Format> = slot
                .sizes
                .iter()
                .map(|(w, h)| Format { w: *w, h: *h })
                .collect();
            let (primary_w, primary_h) = slot.sizes.first().copied().unwrap_or((0, 0));

            let ext = self
                .resolve_bidder_ext(&client.account_id, &domain, &slot_pattern, device_class, &slot.enabled_bidders)
                .await;

            let imp = ImpBuilder::default()
                .id(imp_id)
                .banner(Some(Banner {
                    w: primary_w,
                    h: primary_h,
                    format: formats,
                }))
                .tagid(slot.div_id.clone())
                .ext(ext)
                .build()
                .map_err(|e| NormalizeError(e.to_string()))?;

            imps.push(imp);
        }

        let site = SiteBuilder::default()
            .id(String::new())
            .domain(domain.clone())
            .page(client.page.url.clone())
            .publisher(Some(Publisher { id: String::new() }))
            .keywords(client.page.keywords.clone())
            .cat(client.page.categories.clone())
            .build()
            .map_err(|e| NormalizeError(e.to_string()))?;

        let device = self.build_device(client).await;
        let user = self.build_user(client, cookie_uids);
        let regs = self.build_regs(client);

        let request = BidRequestBuilder::default()
            .id(request_id)
            .imp(imps)
            .site(Some(site))
            .device(Some(device))
            .user(user)
            .regs(Some(regs))
            .cur(vec!["USD".to_string()])
            .tmax(server_tmax.as_millis() as i64)
            .build()
            .map_err(|e| NormalizeError(e.to_string()))?;

        Ok(NormalizeOutcome {
            request,
            account_id: client.account_id.clone(),
            device_class,
            slot_by_imp,
        })
    }

    async fn resolve_bidder_ext(
        &self,
        account_id: &str,
        domain: &str,
        slot_pattern: &str,
        device_class: DeviceClass,
        enabled_bidders: &[String],
    ) -> HashMap<String, serde_json::Value> {
        let candidates = self.bidders.enabled();
        let mut ext = HashMap::with_capacity(candidates.len());

        for bidder in candidates {
            if !enabled_bidders.is_empty() && !enabled_bidders.contains(&bidder.code) {
                continue;
            }

            match self
                .resolver
                .resolve(account_id, domain, slot_pattern, device_class, &bidder.code)
                .await
            {
                Some(params) => {
                    ext.insert(bidder.code.clone(), (*params).clone());
                }
                None => {
                    debug!(bidder = %bidder.code, "no config for bidder");
                }
            }
        }

        ext
    }

    async fn build_device(&self, client: &ClientBidRequest) -> Device {
        let Some(cd) = &client.device else {
            return Device::default();
        };

        let parsed = self.device_lookup.lookup_ua(&cd.user_agent).unwrap_or_default();
        let geo = match &cd.geo {
            Some(g) => resolve_geo(g.lat, g.lon, g.accuracy, "", self.geo_lookup).await,
            None => None,
        };

        DeviceBuilder::default()
            .ua(cd.user_agent.clone())
            .make(parsed.make)
            .model(parsed.model)
            .os(parsed.os)
            .osv(parsed.osv)
            .devicetype(parsed.devicetype)
            .w(cd.width)
            .h(cd.height)
            .geo(geo)
            .build()
            .unwrap_or_default()
    }

    /// Assembles the canonical `eids` list from three UID sources:
    /// DB (user-sync store) → request-inline `userIds` → cookie, first
    /// occurrence per bidder wins.
    fn build_user(&self, client: &ClientBidRequest, cookie_uids: &HashMap<String, String>) -> Option<User> {
        let client_user = client.user.as_ref()?;

        let mut uids: HashMap<String, String> = HashMap::new();
        if !client_user.fpid.is_empty() {
            for (bidder, uid) in self.user_sync.load(&client_user.fpid) {
                uids.entry(bidder).or_insert(uid);
            }
        }
        for (bidder, uid) in &client_user.user_ids {
            uids.entry(bidder.clone()).or_insert_with(|| uid.clone());
        }
        for (bidder, uid) in cookie_uids {
            uids.entry(bidder.clone()).or_insert_with(|| uid.clone());
        }

        let eids = uids
            .into_iter()
            .map(|(source, id)| Eid {
                source,
                uids: vec![Uid { id, atype: 1 }],
            })
            .collect();

        Some(
            UserBuilder::default()
                .id(client_user.fpid.clone())
                .eids(eids)
                .consent(client_user.consent_string.clone().unwrap_or_default())
                .data(client_user.data.clone())
                .build()
                .unwrap_or_default(),
        )
    }

    fn build_regs(&self, client: &ClientBidRequest) -> Regs {
        let Some(user) = &client.user else {
            return Regs::default();
        };

        RegsBuilder::default()
            .gdpr(user.gdpr_applies.map(|b| b as i32))
            .us_privacy(user.usp_consent.clone().unwrap_or_default())
            .build()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::ResolverConfig;
    use crate::core::enrichment::geo::NoopGeoIpLookup;
    use crate::core::models::bidder::BidderBuilder;
    use crate::rtb::client::{ClientBidRequestBuilder, ClientDeviceBuilder, ClientPageBuilder, ClientSlotBuilder};
    use std::num::NonZeroU32;
    use std::time::Duration;

    fn make_normalizer() -> (ConfigResolver, BidderDirectory, DeviceLookup, UserSyncStore) {
        let resolver = ConfigResolver::new(&ResolverConfig::default());
        let bidders = BidderDirectory::new();
        let lookup = DeviceLookup::try_new(NonZeroU32::new(1000).unwrap()).unwrap();
        let store = UserSyncStore::new(Duration::from_secs(90 * 24 * 60 * 60));
        (resolver, bidders, lookup, store)
    }

    #[tokio::test]
    async fn identity_leakage_invariant_site_id_stays_empty() {
        let (resolver, bidders, lookup, store) = make_normalizer();
        let normalizer = Normalizer {
            resolver: &resolver,
            bidders: &bidders,
            device_lookup: &lookup,
            geo_lookup: &NoopGeoIpLookup,
            user_sync: &store,
        };

        let client = ClientBidRequestBuilder::default()
            .account_id("12345".to_string())
            .slots(vec![ClientSlotBuilder::default()
                .div_id("s1".to_string())
                .sizes(vec![(300, 250)])
                .ad_unit_path(Some("d.com/top".to_string()))
                .build()
                .unwrap()])
            .page(ClientPageBuilder::default().domain("d.com".to_string()).build().unwrap())
            .device(Some(
                ClientDeviceBuilder::default().user_agent("Mozilla/5.0".to_string()).build().unwrap(),
            ))
            .build()
            .unwrap();

        let outcome = normalizer
            .normalize(&client, &HashMap::new(), Duration::from_millis(2500), Duration::from_millis(50))
            .await
            .unwrap();

        let site = outcome.request.site.unwrap();
        assert_eq!(site.id, "");
        assert_eq!(site.publisher.unwrap().id, "");
    }

    #[tokio::test]
    async fn rejects_missing_account_id() {
        let (resolver, bidders, lookup, store) = make_normalizer();
        let normalizer = Normalizer {
            resolver: &resolver,
            bidders: &bidders,
            device_lookup: &lookup,
            geo_lookup: &NoopGeoIpLookup,
            user_sync: &store,
        };

        let client = ClientBidRequest::default();
        let result = normalizer
            .normalize(&client, &HashMap::new(), Duration::from_millis(2500), Duration::from_millis(50))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn server_tmax_overrides_client_timeout() {
        let (resolver, bidders, lookup, store) = make_normalizer();
        let normalizer = Normalizer {
            resolver: &resolver,
            bidders: &bidders,
            device_lookup: &lookup,
            geo_lookup: &NoopGeoIpLookup,
            user_sync: &store,
        };

        let client = ClientBidRequestBuilder::default()
            .account_id("A".to_string())
            .timeout(Some(100))
            .slots(vec![ClientSlotBuilder::default()
                .div_id("s1".to_string())
                .sizes(vec![(300, 250)])
                .build()
                .unwrap()])
            .page(ClientPageBuilder::default().domain("d.com".to_string()).build().unwrap())
            .build()
            .unwrap();

        let outcome = normalizer
            .normalize(&client, &HashMap::new(), Duration::from_millis(2500), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(outcome.request.tmax, 2500);
    }

    #[tokio::test]
    async fn below_minimum_client_timeout_is_rejected() {
        let (resolver, bidders, lookup, store) = make_normalizer();
        let normalizer = Normalizer {
            resolver: &resolver,
            bidders: &bidders,
            device_lookup: &lookup,
            geo_lookup: &NoopGeoIpLookup,
            user_sync: &store,
        };

        let client = ClientBidRequestBuilder::default()
            .account_id("A".to_string())
            .timeout(Some(10))
            .slots(vec![ClientSlotBuilder::default()
                .div_id("s1".to_string())
                .sizes(vec![(300, 250)])
                .build()
                .unwrap()])
            .page(ClientPageBuilder::default().domain("d.com".to_string()).build().unwrap())
            .build()
            .unwrap();

        let result = normalizer
            .normalize(&client, &HashMap::new(), Duration::from_millis(2500), Duration::from_millis(50))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn bidder_directory_enabled_filters_disabled() {
        let bidders = BidderDirectory::new();
        assert!(bidders.enabled().is_empty());
        let _ = BidderBuilder::default().code("x".to_string()).enabled(true).build().unwrap();
    }
}
