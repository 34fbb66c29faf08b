//! Exchange / Auction Engine — the heaviest single component in the
//! system. Owns bidder fan-out, per-bidder projection (no bidder ever
//! sees another bidder's params), deadline enforcement, winner
//! selection, multibid ranking and event emission.
//!
//! Price-sort/seat-build ranking happens after every bidder either
//! answers or times out; the circuit breaker, adapter contract and
//! pricing helpers this module calls are built earlier in
//! `core::{breaker, adapter, pricing}`.

use crate::app::config::{ExchangeConfig, MultiformatConfig, MultiformatStrategy};
use crate::core::adapter::{classify_status, AdapterRegistry, DemandClass, ExchangeError, ExchangeErrorKind, RawResponse, RequestData};
use crate::core::breaker::CircuitBreaker;
use crate::core::events::{AuctionEvent, BidderEvent, Event, EventRecorder, WinEvent};
use crate::core::models::bidder::Bidder;
use crate::core::pricing::{effective_floor, targeting_keys, rank_multibid, CurrencyConverter};
use crate::core::resolver::BidderDirectory;
use crate::core::spec::nobidreasons;
use crate::rtb::bid_request::BidRequest;
use crate::rtb::bid_response::Bid;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::warn;

/// Safety margin subtracted from the remaining time budget before
/// dispatching a bidder call, so the HTTP round trip has a real chance
/// to return before the auction-wide deadline.
const DEADLINE_SAFETY_MARGIN: Duration = Duration::from_millis(20);

/// One bidder's resolved placement in the final response.
#[derive(Debug, Clone)]
pub struct Winner {
    pub imp_id: String,
    pub bidder_code: String,
    pub demand_class: DemandClass,
    pub bid: Bid,
    pub targeting: HashMap<String, String>,
}

pub struct AuctionOutcome {
    pub winners: Vec<Winner>,
    pub duration: Duration,
}

struct BidderOutcome {
    bidder_code: String,
    demand_class: DemandClass,
    latency_ms: u64,
    bids: Vec<Bid>,
    timed_out: bool,
    errored: bool,
}

/// Runs one auction end to end. Cheap to clone: every field is an
/// `Arc` or plain config value, so each spawned per-bidder task gets
/// its own owned handle instead of borrowing across an `.await`.
#[derive(Clone)]
pub struct Exchange {
    adapters: Arc<AdapterRegistry>,
    bidders: Arc<BidderDirectory>,
    breaker: Arc<CircuitBreaker>,
    currency: Arc<CurrencyConverter>,
    events: Arc<EventRecorder>,
    http: reqwest::Client,
    config: ExchangeConfig,
}

impl Exchange {
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        bidders: Arc<BidderDirectory>,
        breaker: Arc<CircuitBreaker>,
        currency: Arc<CurrencyConverter>,
        events: Arc<EventRecorder>,
        http: reqwest::Client,
        config: ExchangeConfig,
    ) -> Self {
        Self { adapters, bidders, breaker, currency, events, http, config }
    }

    /// Exposed for `/health/ready`'s circuit-breaker summary.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Runs the auction for `request`, which must already be the
    /// canonical, normalizer-produced shape (identity scrubbed,
    /// `tmax` already the server deadline). Never raises: a
    /// zero-winner outcome is the correct response to every failure
    /// mode.
    pub async fn run(&self, request: &BidRequest) -> AuctionOutcome {
        let started = Instant::now();
        let budget = Duration::from_millis(request.tmax.max(0) as u64);
        let deadline = started + budget;

        let bidder_codes = self.enumerate_bidders(request);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_bidders.max(1)));

        let mut handles = Vec::with_capacity(bidder_codes.len());
        for code in bidder_codes {
            let Some(bidder) = self.bidders.get(&code) else {
                continue;
            };
            let projected = Self::project_request(request, &code);
            if projected.imp.is_empty() {
                continue;
            }

            let this = self.clone();
            let sem = semaphore.clone();
            handles.push(tokio::spawn(async move {
                this.run_bidder(projected, bidder, deadline, sem).await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(outcome) = handle.await {
                outcomes.push(outcome);
            }
        }

        self.settle(request, outcomes, started.elapsed())
    }

    /// Union of bidder codes any impression is configured for, capped
    /// at `max_bidders`. Sorted for deterministic fan-out
    /// order independent of `HashMap` iteration.
    fn enumerate_bidders(&self, request: &BidRequest) -> Vec<String> {
        let mut codes: Vec<String> = request
            .imp
            .iter()
            .flat_map(|imp| imp.ext.keys().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        codes.sort();

        if codes.len() > self.config.max_bidders {
            warn!(
                dropped = codes.len() - self.config.max_bidders,
                "bidder fan-out exceeds max_bidders, truncating"
            );
            codes.truncate(self.config.max_bidders);
        }
        codes
    }

    /// Narrows `request` to just this bidder's view: drops impressions
    /// that carry no params for `bidder_code`, and within the
    /// remaining impressions keeps only that bidder's `ext` entry
    /// — no bidder ever sees another bidder's params.
    fn project_request(request: &BidRequest, bidder_code: &str) -> BidRequest {
        let mut projected = request.clone();
        projected.imp = request
            .imp
            .iter()
            .filter_map(|imp| {
                let params = imp.ext.get(bidder_code)?;
                let mut narrowed = imp.clone();
                narrowed.ext = HashMap::from([(bidder_code.to_string(), params.clone())]);
                Some(narrowed)
            })
            .collect();
        projected
    }

    async fn run_bidder(
        &self,
        request: BidRequest,
        bidder: Bidder,
        deadline: Instant,
        semaphore: Arc<Semaphore>,
    ) -> BidderOutcome {
        let _permit = semaphore.acquire_owned().await.ok();
        let start = Instant::now();

        if !self.breaker.permit(&bidder.code) {
            return BidderOutcome {
                bidder_code: bidder.code,
                demand_class: bidder.demand_class,
                latency_ms: start.elapsed().as_millis() as u64,
                bids: Vec::new(),
                timed_out: false,
                errored: true,
            };
        }

        let Some(adapter) = self.adapters.get(&bidder.code) else {
            warn!(bidder = %bidder.code, "no adapter registered for configured bidder");
            return BidderOutcome {
                bidder_code: bidder.code,
                demand_class: bidder.demand_class,
                latency_ms: start.elapsed().as_millis() as u64,
                bids: Vec::new(),
                timed_out: false,
                errored: true,
            };
        };

        let (requests, build_errors) = adapter.build_requests(&request, &HashMap::new());
        if requests.is_empty() {
            if !build_errors.is_empty() {
                self.breaker.record_failure(&bidder.code);
            }
            return BidderOutcome {
                bidder_code: bidder.code.clone(),
                demand_class: bidder.demand_class,
                latency_ms: start.elapsed().as_millis() as u64,
                bids: Vec::new(),
                timed_out: false,
                errored: !build_errors.is_empty(),
            };
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let capped_remaining = remaining.saturating_sub(DEADLINE_SAFETY_MARGIN);
        let bidder_budget = bidder
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.default_bidder_timeout);
        let per_call_timeout = capped_remaining.min(bidder_budget);

        let mut bids = Vec::new();
        let mut timed_out = false;
        let mut errored = false;

        if per_call_timeout.is_zero() {
            timed_out = true;
        } else {
            for req_data in &requests {
                match tokio::time::timeout(per_call_timeout, self.execute(req_data)).await {
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                    Ok(Err(_)) => {
                        errored = true;
                    }
                    Ok(Ok(raw)) => match classify_status(&bidder.code, raw.status) {
                        Err(e) if e.kind == ExchangeErrorKind::BadStatus && raw.status == 204 => {}
                        Err(e) => {
                            if matches!(e.kind, ExchangeErrorKind::BadStatus) {
                                errored = true;
                            }
                        }
                        Ok(()) => match adapter.parse_response(&request, &raw) {
                            Ok(resp) => bids.extend(resp.bids),
                            Err(_) => errored = true,
                        },
                    },
                }
            }
        }

        let valid_imp_ids: HashSet<&str> = request.imp.iter().map(|i| i.id.as_str()).collect();
        bids.retain(|b| valid_imp_ids.contains(b.impid.as_str()) && b.has_creative());

        if timed_out || errored {
            self.breaker.record_failure(&bidder.code);
        } else {
            self.breaker.record_success(&bidder.code);
        }

        BidderOutcome {
            bidder_code: bidder.code,
            demand_class: bidder.demand_class,
            latency_ms: start.elapsed().as_millis() as u64,
            bids,
            timed_out,
            errored,
        }
    }

    async fn execute(&self, req: &RequestData) -> Result<RawResponse, ExchangeError> {
        let mut builder = self.http.request(req.method.clone(), &req.uri).body(req.body.clone());
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| ExchangeError::new(ExchangeErrorKind::Connection, e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ExchangeError::new(ExchangeErrorKind::Connection, e.to_string()))?;
        Ok(RawResponse { status, body })
    }

    /// Floor enforcement, winner selection and multibid ranking across
    /// every impression, plus auction/bidder/win event emission.
    fn settle(&self, request: &BidRequest, outcomes: Vec<BidderOutcome>, duration: Duration) -> AuctionOutcome {
        let response_cur = request.cur.first().cloned().unwrap_or_else(|| "USD".to_string());

        let mut per_imp: HashMap<String, Vec<(String, DemandClass, Bid)>> = HashMap::new();
        let mut bidders_with_bids = 0u32;

        for outcome in &outcomes {
            let mut had_bid = false;

            // The floor context reported on the BidderEvent tracks
            // whatever impression this bidder's first bid targeted,
            // mirroring `first_bid_cpm`'s own "first bid" framing.
            let mut reported_floor = 0.0;

            for bid in &outcome.bids {
                let Some(imp) = request.imp.iter().find(|i| i.id == bid.impid) else {
                    continue;
                };
                let floor_cur = if imp.bidfloorcur.is_empty() { "USD" } else { imp.bidfloorcur.as_str() };
                let imp_floor = effective_floor(&self.currency, imp.bidfloor, floor_cur, None, &response_cur);
                if bid.impid == outcome.bids.first().map(|b| b.impid.as_str()).unwrap_or_default() {
                    reported_floor = imp_floor.unwrap_or(0.0);
                }

                if !imp.matches_format(bid.mtype, bid.w, bid.h) {
                    continue;
                }
                let Some(floor) = imp_floor else {
                    continue;
                };
                if bid.price < floor {
                    continue;
                }

                had_bid = true;
                per_imp
                    .entry(bid.impid.clone())
                    .or_default()
                    .push((outcome.bidder_code.clone(), outcome.demand_class, bid.clone()));
            }
            if had_bid {
                bidders_with_bids += 1;
            }

            self.events.record(Event::Bidder(BidderEvent {
                auction_id: request.id.clone(),
                bidder_code: outcome.bidder_code.clone(),
                latency_ms: outcome.latency_ms,
                had_bid,
                bid_count: outcome.bids.len() as u32,
                first_bid_cpm: outcome.bids.first().map(|b| b.price),
                floor: reported_floor,
                below_floor: !had_bid && !outcome.bids.is_empty(),
                timed_out: outcome.timed_out,
                errored: outcome.errored,
                no_bid_reason: match (outcome.timed_out, outcome.errored, had_bid) {
                    (true, _, _) => Some(nobidreasons::TIMEOUT.to_string()),
                    (_, true, _) => Some(nobidreasons::BAD_STATUS.to_string()),
                    (_, _, false) => Some(nobidreasons::NO_VALID_BIDS.to_string()),
                    _ => None,
                },
            }));
        }

        let mut winners = Vec::new();
        for (imp_id, candidates) in per_imp {
            if self.config.multibid.enabled {
                winners.extend(Self::rank_multibid_winners(
                    imp_id,
                    candidates,
                    self.config.multibid.max_bids_per_bidder_per_imp,
                    &self.config.multiformat,
                ));
            } else if let Some(winner) = Self::single_winner(imp_id, candidates, &self.config.multiformat) {
                winners.push(winner);
            }
        }

        if self.config.multibid.enabled {
            winners = Self::cap_multibid_across_impressions(winners, self.config.multibid.max_bids_per_bidder);
        }

        for winner in &winners {
            self.events.record(Event::Win(WinEvent {
                auction_id: request.id.clone(),
                bidder_code: winner.bidder_code.clone(),
                imp_id: winner.imp_id.clone(),
                original_cpm: winner.bid.price,
                adjusted_cpm: winner.bid.price,
                platform_cut: 0.0,
                clear_price: winner.bid.price,
                demand_class: winner.demand_class,
            }));
        }

        self.events.record(Event::Auction(AuctionEvent {
            auction_id: request.id.clone(),
            bidders_selected: outcomes.len() as u32,
            bidders_excluded: 0,
            bidders_with_bids,
            winning_bid_count: winners.len() as u32,
            duration_ms: duration.as_millis() as u64,
            revenue: winners.iter().map(|w| w.bid.price).sum(),
            payout: 0.0,
            device_type: request.device.as_ref().map(|d| d.devicetype),
            geo_country: request
                .device
                .as_ref()
                .and_then(|d| d.geo.as_ref())
                .map(|g| g.country.clone())
                .filter(|c| !c.is_empty()),
        }));

        AuctionOutcome { winners, duration }
    }

    /// Ranking price for one candidate under the configured multiformat
    /// strategy: `PreferDeal` never adjusts price; `Server`/`PreferMediaType` give the
    /// configured preferred format a 5% CPM advantage over the rest so
    /// it can win a same-impression tie against a higher-raw-CPM bid in
    /// another format.
    fn ranked_price(bid: &Bid, cfg: &MultiformatConfig) -> f64 {
        if cfg.strategy == MultiformatStrategy::PreferDeal {
            return bid.price;
        }
        match cfg.preferred_media_type {
            Some(preferred) if preferred == bid.mtype => bid.price * 1.05,
            _ => bid.price,
        }
    }

    /// Single-winner path (multibid disabled): deal
    /// beats non-deal, then the multiformat-adjusted price, highest
    /// first; ties keep whichever bid arrived first (`sort_by` is
    /// stable, and `per_imp` preserves completion order).
    fn single_winner(imp_id: String, mut candidates: Vec<(String, DemandClass, Bid)>, multiformat: &MultiformatConfig) -> Option<Winner> {
        candidates.sort_by(|a, b| {
            b.2.is_deal().cmp(&a.2.is_deal()).then_with(|| {
                Self::ranked_price(&b.2, multiformat)
                    .partial_cmp(&Self::ranked_price(&a.2, multiformat))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });

        let (bidder_code, demand_class, bid) = candidates.into_iter().next()?;
        let targeting = targeting_keys(&bid, &bidder_code, None);
        Some(Winner { imp_id, bidder_code, demand_class, bid, targeting })
    }

    /// Multibid path: rank each bidder's own bids for this
    /// impression independently, then merge and order the whole set by
    /// the same multiformat-adjusted price so the targeting-key rank
    /// suffix (`hb_pb_2`, …) reflects the second-best bid *across*
    /// bidders, not per bidder.
    fn rank_multibid_winners(
        imp_id: String,
        candidates: Vec<(String, DemandClass, Bid)>,
        max_per_bidder: usize,
        multiformat: &MultiformatConfig,
    ) -> Vec<Winner> {
        let mut by_bidder: HashMap<String, (DemandClass, Vec<Bid>)> = HashMap::new();
        for (code, demand_class, bid) in candidates {
            let entry = by_bidder.entry(code).or_insert((demand_class, Vec::new()));
            entry.1.push(bid);
        }

        let mut merged: Vec<(String, DemandClass, Bid)> = Vec::new();
        for (code, (demand_class, bids)) in by_bidder {
            for bid in rank_multibid(bids, max_per_bidder) {
                merged.push((code.clone(), demand_class, bid));
            }
        }
        merged.sort_by(|a, b| {
            b.2.is_deal().cmp(&a.2.is_deal()).then_with(|| {
                Self::ranked_price(&b.2, multiformat)
                    .partial_cmp(&Self::ranked_price(&a.2, multiformat))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });

        merged
            .into_iter()
            .enumerate()
            .map(|(rank, (bidder_code, demand_class, bid))| {
                let suffix = if rank == 0 { None } else { Some((rank + 1) as u32) };
                let targeting = targeting_keys(&bid, &bidder_code, suffix);
                Winner { imp_id: imp_id.clone(), bidder_code, demand_class, bid, targeting }
            })
            .collect()
    }

    /// Enforces the across-impression multibid cap (§4.7:
    /// "across impressions up to `max_bids_per_bidder`"). A bidder's
    /// winners are ranked by price across the whole auction — not just
    /// within one impression — and only the top `max_per_bidder`
    /// survive; the rest are dropped. Survivors keep their original
    /// per-impression order and targeting-key suffixes.
    fn cap_multibid_across_impressions(winners: Vec<Winner>, max_per_bidder: usize) -> Vec<Winner> {
        let cap = max_per_bidder.max(1);

        let mut by_price: Vec<(usize, Winner)> = winners.into_iter().enumerate().collect();
        by_price.sort_by(|a, b| {
            b.1.bid.price.partial_cmp(&a.1.bid.price).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut kept: Vec<(usize, Winner)> = Vec::new();
        for (idx, winner) in by_price {
            let count = counts.entry(winner.bidder_code.clone()).or_insert(0);
            if *count < cap {
                *count += 1;
                kept.push((idx, winner));
            }
        }

        kept.sort_by_key(|(idx, _)| *idx);
        kept.into_iter().map(|(_, w)| w).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::adapter::{Adapter, AdapterInfo, AdapterRegistry, BidderResponse};
    use crate::core::models::bidder::BidderBuilder;
    use crate::core::usersync::UserSyncStore;
    use crate::rtb::bid_request::{BidRequestBuilder, Banner, ImpBuilder};
    use serde_json::json;
    use std::time::Duration;

    /// An adapter whose `build_requests` returns zero outbound requests
    /// for any impression — a legitimate no-bid, not an
    /// error. `price`/`dealid` are retained so future adapter-shaped
    /// tests that do exercise a real HTTP round trip can reuse this
    /// fixture by flipping `no_bid` off.
    struct StaticAdapter {
        code: &'static str,
        price: f64,
        dealid: Option<String>,
        no_bid: bool,
    }

    impl Adapter for StaticAdapter {
        fn info(&self) -> AdapterInfo {
            AdapterInfo {
                code: self.code.to_string(),
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
            _params: &HashMap<String, serde_json::Value>,
        ) -> (Vec<RequestData>, Vec<ExchangeError>) {
            if self.no_bid {
                return (Vec::new(), Vec::new());
            }
            let requests = request
                .imp
                .iter()
                .filter(|i| i.ext.contains_key(self.code))
                .map(|i| {
                    let mut req = RequestData::post_json("http://unused.invalid", bytes::Bytes::new());
                    req.imp_id = Some(i.id.clone());
                    req
                })
                .collect();
            (requests, Vec::new())
        }

        fn parse_response(
            &self,
            request: &BidRequest,
            _response: &RawResponse,
        ) -> Result<BidderResponse, ExchangeError> {
            let bids = request
                .imp
                .iter()
                .filter(|i| i.ext.contains_key(self.code))
                .map(|i| Bid {
                    impid: i.id.clone(),
                    price: self.price,
                    adm: "<html/>".into(),
                    crid: "cr1".into(),
                    dealid: self.dealid.clone(),
                    w: 300,
                    h: 250,
                    cid: format!("{}-camp", self.code),
                    mtype: crate::rtb::bid_response::MediaType::Banner,
                    ..Default::default()
                })
                .collect();
            Ok(BidderResponse { bids })
        }
    }

    fn make_exchange(adapters: Vec<StaticAdapter>, bidders: Vec<Bidder>, multibid: bool) -> Exchange {
        let mut registry = AdapterRegistry::new();
        for a in adapters {
            registry.register(Box::new(a));
        }
        let directory = Arc::new(BidderDirectory::new());
        for b in bidders {
            directory.insert(b);
        }

        let mut cfg = ExchangeConfig::default();
        cfg.multibid.enabled = multibid;
        cfg.multibid.max_bids_per_bidder_per_imp = 2;
        cfg.default_tmax = Duration::from_millis(2000);

        Exchange::new(
            Arc::new(registry),
            directory,
            Arc::new(CircuitBreaker::new(100, Duration::from_secs(30), Duration::from_secs(30), 1)),
            Arc::new(CurrencyConverter::new("USD")),
            EventRecorder::new(None, 1000),
            reqwest::Client::new(),
            cfg,
        )
    }

    fn imp_with_bidders(id: &str, codes: &[&str]) -> crate::rtb::bid_request::Imp {
        let mut ext = HashMap::new();
        for code in codes {
            ext.insert(code.to_string(), json!({}));
        }
        ImpBuilder::default()
            .id(id.to_string())
            .banner(Some(Banner { w: 300, h: 250, format: vec![] }))
            .bidfloorcur("USD".to_string())
            .ext(ext)
            .build()
            .unwrap()
    }

    #[test]
    fn project_request_narrows_to_one_bidders_ext() {
        let imp = imp_with_bidders("imp1", &["rubicon", "appnexus"]);
        let request = BidRequestBuilder::default().id("r1".to_string()).imp(vec![imp]).build().unwrap();

        let projected = Exchange::project_request(&request, "rubicon");
        assert_eq!(projected.imp.len(), 1);
        assert_eq!(projected.imp[0].ext.len(), 1);
        assert!(projected.imp[0].ext.contains_key("rubicon"));
    }

    #[test]
    fn project_request_drops_imps_without_that_bidder() {
        let imp = imp_with_bidders("imp1", &["appnexus"]);
        let request = BidRequestBuilder::default().id("r1".to_string()).imp(vec![imp]).build().unwrap();

        let projected = Exchange::project_request(&request, "rubicon");
        assert!(projected.imp.is_empty());
    }

    #[test]
    fn single_winner_prefers_deal_over_higher_nondeal_price() {
        let bid_a = Bid { price: 5.0, dealid: None, ..Default::default() };
        let bid_b = Bid { price: 2.0, dealid: Some("pmp-1".into()), ..Default::default() };
        let winner = Exchange::single_winner(
            "imp1".to_string(),
            vec![
                ("a".to_string(), DemandClass::Platform, bid_a),
                ("b".to_string(), DemandClass::Platform, bid_b),
            ],
            &MultiformatConfig::default(),
        )
        .unwrap();
        assert_eq!(winner.bidder_code, "b");
    }

    #[test]
    fn single_winner_falls_back_to_highest_price_without_deals() {
        let bid_a = Bid { price: 5.0, ..Default::default() };
        let bid_b = Bid { price: 2.0, ..Default::default() };
        let winner = Exchange::single_winner(
            "imp1".to_string(),
            vec![
                ("a".to_string(), DemandClass::Platform, bid_a),
                ("b".to_string(), DemandClass::Platform, bid_b),
            ],
            &MultiformatConfig::default(),
        )
        .unwrap();
        assert_eq!(winner.bidder_code, "a");
    }

    #[test]
    fn preferred_media_type_earns_five_percent_advantage() {
        let banner = Bid { price: 2.0, mtype: crate::rtb::bid_response::MediaType::Banner, ..Default::default() };
        let video = Bid { price: 2.05, mtype: crate::rtb::bid_response::MediaType::Video, ..Default::default() };
        let winner = Exchange::single_winner(
            "imp1".to_string(),
            vec![
                ("a".to_string(), DemandClass::Platform, banner),
                ("b".to_string(), DemandClass::Platform, video),
            ],
            &MultiformatConfig::default(),
        )
        .unwrap();
        assert_eq!(winner.bidder_code, "a");
    }

    #[test]
    fn prefer_deal_strategy_ignores_format_advantage() {
        let banner = Bid { price: 2.0, mtype: crate::rtb::bid_response::MediaType::Banner, ..Default::default() };
        let video = Bid { price: 2.05, mtype: crate::rtb::bid_response::MediaType::Video, ..Default::default() };
        let cfg = MultiformatConfig { strategy: MultiformatStrategy::PreferDeal, preferred_media_type: Some(crate::rtb::bid_response::MediaType::Banner) };
        let winner = Exchange::single_winner(
            "imp1".to_string(),
            vec![
                ("a".to_string(), DemandClass::Platform, banner),
                ("b".to_string(), DemandClass::Platform, video),
            ],
            &cfg,
        )
        .unwrap();
        assert_eq!(winner.bidder_code, "b");
    }

    #[test]
    fn multibid_ranks_second_best_across_bidders() {
        let x1 = Bid { price: 2.50, ..Default::default() };
        let x2 = Bid { price: 1.90, ..Default::default() };
        let y1 = Bid { price: 2.20, ..Default::default() };

        let winners = Exchange::rank_multibid_winners(
            "imp1".to_string(),
            vec![
                ("x".to_string(), DemandClass::Platform, x1),
                ("x".to_string(), DemandClass::Platform, x2),
                ("y".to_string(), DemandClass::Platform, y1),
            ],
            2,
            &MultiformatConfig::default(),
        );

        assert_eq!(winners.len(), 3);
        assert_eq!(winners[0].bidder_code, "x");
        assert_eq!(winners[0].bid.price, 2.50);
        assert_eq!(winners[1].bidder_code, "y");
        assert_eq!(winners[1].targeting.get("hb_pb_2"), Some(&"2.20".to_string()));
    }

    #[tokio::test]
    async fn run_enumerates_and_skips_unconfigured_bidders() {
        let exchange = make_exchange(vec![], vec![], false);
        let request = BidRequestBuilder::default()
            .id("r1".to_string())
            .imp(vec![imp_with_bidders("imp1", &["rubicon"])])
            .tmax(500)
            .build()
            .unwrap();

        let outcome = exchange.run(&request).await;
        assert!(outcome.winners.is_empty());
    }

    #[tokio::test]
    async fn run_skips_bidder_with_open_circuit() {
        let bidder = BidderBuilder::default()
            .code("rubicon".to_string())
            .enabled(true)
            .build()
            .unwrap();
        let exchange = make_exchange(vec![], vec![bidder], false);
        exchange.breaker.record_failure("rubicon");
        for _ in 0..99 {
            exchange.breaker.record_failure("rubicon");
        }

        let request = BidRequestBuilder::default()
            .id("r1".to_string())
            .imp(vec![imp_with_bidders("imp1", &["rubicon"])])
            .tmax(500)
            .build()
            .unwrap();

        let outcome = exchange.run(&request).await;
        assert!(outcome.winners.is_empty());
    }

    #[tokio::test]
    async fn run_treats_adapter_returning_zero_requests_as_no_bid_not_error() {
        let bidder = BidderBuilder::default()
            .code("rubicon".to_string())
            .enabled(true)
            .build()
            .unwrap();
        let adapter = StaticAdapter { code: "rubicon", price: 2.5, dealid: None, no_bid: true };
        let exchange = make_exchange(vec![adapter], vec![bidder], false);

        let request = BidRequestBuilder::default()
            .id("r1".to_string())
            .imp(vec![imp_with_bidders("imp1", &["rubicon"])])
            .tmax(500)
            .build()
            .unwrap();

        let outcome = exchange.run(&request).await;
        assert!(outcome.winners.is_empty());
        assert!(exchange.breaker.permit("rubicon"), "a no-bid must not trip the breaker");
    }
}
