//! Pricing & Targeting: floor enforcement, currency
//! conversion, price-bucket quantization, and targeting-key
//! generation for winning bids.

use crate::rtb::bid_response::Bid;
use arc_swap::ArcSwap;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

/// Holds the latest `{ISO -> rate}` map, refreshed every 30 minutes
/// on a background interval. Readers take a lock-free
/// snapshot via [`ArcSwap`]; the background refresh task is the only
/// writer.
pub struct CurrencyConverter {
    rates: ArcSwap<HashMap<String, f64>>,
    base_currency: String,
    /// Epoch seconds of the last successful [`CurrencyConverter::set_rates`],
    /// or 0 if rates have never been refreshed (exposed for `/health/ready`).
    last_refreshed: AtomicU64,
}

impl CurrencyConverter {
    pub fn new(base_currency: impl Into<String>) -> Self {
        Self {
            rates: ArcSwap::from_pointee(HashMap::new()),
            base_currency: base_currency.into(),
            last_refreshed: AtomicU64::new(0),
        }
    }

    /// Seconds since the rate table was last refreshed, or `None` if
    /// it never has been (a process relying only on the `base_currency`
    /// identity rate, which is never stale).
    pub fn staleness(&self) -> Option<Duration> {
        let last = self.last_refreshed.load(Ordering::Acquire);
        if last == 0 {
            return None;
        }
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        Some(Duration::from_secs(now.saturating_sub(last)))
    }

    /// Converts `amount` from `from` to `to`. Returns `None` when the
    /// currencies differ and no rate is known for one of them — a bid
    /// must never be emitted in a currency it can't be converted to.
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> Option<f64> {
        if from.eq_ignore_ascii_case(to) {
            return Some(amount);
        }

        let rates = self.rates.load();
        let from_rate = Self::rate_to_base(&rates, &self.base_currency, from)?;
        let to_rate = Self::rate_to_base(&rates, &self.base_currency, to)?;
        Some(amount * (to_rate / from_rate))
    }

    fn rate_to_base(rates: &HashMap<String, f64>, base: &str, currency: &str) -> Option<f64> {
        if currency.eq_ignore_ascii_case(base) {
            return Some(1.0);
        }
        rates.get(&currency.to_uppercase()).copied()
    }

    pub fn set_rates(&self, rates: HashMap<String, f64>) {
        self.rates.store(Arc::new(rates));
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        self.last_refreshed.store(now, Ordering::Release);
    }

    pub async fn refresh_from(&self, client: &Client, url: &str) -> Result<(), anyhow::Error> {
        let resp = client.get(url).send().await?;
        let rates: HashMap<String, f64> = resp.json().await?;
        info!(count = rates.len(), "refreshed currency rates");
        self.set_rates(rates);
        Ok(())
    }
}

/// Spawns the periodic currency-rate refresh task: 30-minute
/// refresh with exponential backoff on failure; last-good cache
/// retained across restarts.
pub fn spawn_refresh(
    converter: Arc<CurrencyConverter>,
    client: Client,
    url: String,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut backoff = Duration::from_secs(5);
        let max_backoff = interval;

        loop {
            match converter.refresh_from(&client, &url).await {
                Ok(()) => {
                    backoff = Duration::from_secs(5);
                    tokio::time::sleep(interval).await;
                }
                Err(err) => {
                    error!("currency rate refresh failed: {err:#}, retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(max_backoff);
                }
            }
        }
    });
}

/// Effective floor: `max(imp.bidfloor, bidder_override)`, converted to
/// the response currency.
pub fn effective_floor(
    converter: &CurrencyConverter,
    imp_floor: f64,
    imp_floor_cur: &str,
    bidder_override: Option<f64>,
    response_cur: &str,
) -> Option<f64> {
    let floor = bidder_override.map_or(imp_floor, |o| imp_floor.max(o));
    if floor <= 0.0 {
        return Some(0.0);
    }
    converter.convert(floor, imp_floor_cur, response_cur)
}

/// Price-bucket ceiling used to quantize `hb_pb`:
/// `$0-5 -> $0.05`, `$5-10 -> $0.10`, `$10-20 -> $0.50`, `>=$20 ->
/// $20.00` flat. Pre-clamps at 20.0 before scaling to avoid an
/// integer-overflow hazard on unbounded CPMs.
pub fn price_bucket(cpm: f64) -> f64 {
    if !cpm.is_finite() || cpm <= 0.0 {
        return 0.0;
    }

    let clamped = cpm.min(20.0);

    let (increment, scale): (f64, f64) = if clamped < 5.0 {
        (0.05, 100.0)
    } else if clamped < 10.0 {
        (0.10, 100.0)
    } else if clamped < 20.0 {
        (0.50, 100.0)
    } else {
        return 20.0;
    };

    let scaled_cpm = (clamped * scale).round() as i64;
    let scaled_increment = (increment * scale).round() as i64;
    let bucket = (scaled_cpm / scaled_increment) * scaled_increment;
    bucket as f64 / scale
}

/// The targeting-key map attached to a single winning bid.
/// `suffix` is the bidder code for the primary set of keys, or a
/// numeric string (`"2"`, `"3"`, …) for extra multibid entries.
pub fn targeting_keys(bid: &Bid, bidder_code: &str, rank_suffix: Option<u32>) -> HashMap<String, String> {
    let mut keys = HashMap::new();
    let pb = format!("{:.2}", price_bucket(bid.price));

    let mut insert_pair = |base: &str, value: String| {
        keys.insert(base.to_string(), value.clone());
        keys.insert(format!("{base}_{bidder_code}"), value.clone());
        if let Some(n) = rank_suffix {
            keys.insert(format!("{base}_{n}"), value);
        }
    };

    insert_pair("hb_pb", pb);
    insert_pair("hb_bidder", bidder_code.to_string());
    insert_pair("hb_size", format!("{}x{}", bid.w, bid.h));
    insert_pair("hb_adid", bid.cid.clone());
    insert_pair("hb_creative", bid.crid.clone());

    if let Some(deal) = &bid.dealid {
        insert_pair("hb_deal", deal.clone());
    }
    if let Some(domain) = bid.adomain.first() {
        insert_pair("hb_adomain", domain.clone());
    }

    keys
}

/// Multibid ranking for one `(bidder, impression)` pair:
/// sorts candidate bids highest-price-first and caps at
/// `max_bids_per_bidder_per_imp`.
pub fn rank_multibid(mut bids: Vec<Bid>, max_per_imp: usize) -> Vec<Bid> {
    bids.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(std::cmp::Ordering::Equal));
    bids.truncate(max_per_imp.max(1));
    bids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_conversion_same_currency() {
        let converter = CurrencyConverter::new("USD");
        assert_eq!(converter.convert(2.5, "USD", "USD"), Some(2.5));
    }

    #[test]
    fn missing_rate_returns_none_for_cross_currency() {
        let converter = CurrencyConverter::new("USD");
        assert_eq!(converter.convert(2.5, "USD", "EUR"), None);
    }

    #[test]
    fn staleness_is_none_before_first_refresh() {
        let converter = CurrencyConverter::new("USD");
        assert!(converter.staleness().is_none());
    }

    #[test]
    fn staleness_is_some_after_set_rates() {
        let converter = CurrencyConverter::new("USD");
        converter.set_rates(HashMap::new());
        let staleness = converter.staleness().unwrap();
        assert!(staleness.as_secs() < 5);
    }

    #[test]
    fn known_rate_converts() {
        let converter = CurrencyConverter::new("USD");
        let mut rates = HashMap::new();
        rates.insert("EUR".to_string(), 0.9);
        converter.set_rates(rates);
        let converted = converter.convert(10.0, "USD", "EUR").unwrap();
        assert!((converted - 9.0).abs() < 1e-9);
    }

    #[test]
    fn price_bucket_quantizes_by_band() {
        assert_eq!(price_bucket(2.53), 2.50);
        assert_eq!(price_bucket(7.23), 7.20);
        assert_eq!(price_bucket(14.3), 14.0);
        assert_eq!(price_bucket(99.0), 20.0);
    }

    #[test]
    fn targeting_keys_include_bidder_suffixed_variants() {
        let bid = Bid {
            price: 2.5,
            w: 300,
            h: 250,
            cid: "camp1".into(),
            crid: "cx".into(),
            adomain: vec!["advertiser.com".into()],
            ..Default::default()
        };
        let keys = targeting_keys(&bid, "rubicon", None);
        assert_eq!(keys.get("hb_pb"), Some(&"2.50".to_string()));
        assert_eq!(keys.get("hb_pb_rubicon"), Some(&"2.50".to_string()));
        assert_eq!(keys.get("hb_adomain"), Some(&"advertiser.com".to_string()));
    }

    #[test]
    fn multibid_rank_caps_and_sorts_descending() {
        let bids = vec![
            Bid { price: 1.0, ..Default::default() },
            Bid { price: 3.0, ..Default::default() },
            Bid { price: 2.0, ..Default::default() },
        ];
        let ranked = rank_multibid(bids, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].price, 3.0);
        assert_eq!(ranked[1].price, 2.0);
    }
}
