//! Small shared primitives: the pixel/callback data-url codec and a
//! no-bid reason tag.

use anyhow::{Context, Error, anyhow};
use std::collections::HashMap;
use url::Url;

pub mod utils {
    use std::time::{SystemTime, UNIX_EPOCH};

    /// Seconds since the Unix epoch, used for sync/event timestamps.
    pub fn epoch_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs()
    }

    pub fn epoch_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis() as u64
    }
}

/// A thin wrapper over a URL's query string used to build and parse
/// the small, signed-by-context callback URLs this exchange hands out
/// (setuid, cookie-sync return, win/billing notice pixels).
#[derive(Debug, Clone)]
pub struct DataUrl {
    url: Url,
}

impl DataUrl {
    pub fn new(base: &str) -> Result<Self, Error> {
        Ok(Self {
            url: Url::parse(base).with_context(|| format!("invalid base url: {base}"))?,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, Error> {
        Ok(Self {
            url: Url::parse(raw).with_context(|| format!("invalid data url: {raw}"))?,
        })
    }

    fn params(&self) -> HashMap<String, String> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    pub fn add_string(&mut self, key: &str, value: &str) -> Result<&mut Self, Error> {
        self.url.query_pairs_mut().append_pair(key, value);
        Ok(self)
    }

    pub fn add_int(&mut self, key: &str, value: i64) -> Result<&mut Self, Error> {
        self.add_string(key, &value.to_string())
    }

    pub fn add_float(&mut self, key: &str, value: f64) -> Result<&mut Self, Error> {
        self.add_string(key, &value.to_string())
    }

    pub fn get_optional_string(&self, key: &str) -> Option<String> {
        self.params().get(key).cloned()
    }

    pub fn get_required_string(&self, key: &str) -> Result<String, Error> {
        self.get_optional_string(key)
            .ok_or_else(|| anyhow!("missing required data url field '{key}'"))
    }

    pub fn get_required_int(&self, key: &str) -> Result<i64, Error> {
        self.get_required_string(key)?
            .parse()
            .with_context(|| format!("field '{key}' is not an integer"))
    }

    pub fn get_required_float(&self, key: &str) -> Result<f64, Error> {
        self.get_required_string(key)?
            .parse()
            .with_context(|| format!("field '{key}' is not a float"))
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

/// A code + human label for why an auction produced no bid. Attached
/// to `BidderEvent::no_bid_reason` and used throughout the error
/// taxonomy below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoBidReason {
    pub code: u32,
    pub label: &'static str,
}

impl std::fmt::Display for NoBidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label, self.code)
    }
}

/// Declares a set of [`NoBidReason`] constants.
macro_rules! spec_list {
    ($($(#[$meta:meta])* $name:ident = $code:expr => $label:expr),+ $(,)?) => {
        $(
            $(#[$meta])*
            pub const $name: $crate::rtb::common::NoBidReason =
                $crate::rtb::common::NoBidReason { code: $code, label: $label };
        )+
    };
}
pub(crate) use spec_list;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_round_trips_fields() {
        let mut du = DataUrl::new("https://x.example/cb").unwrap();
        du.add_string("bi", "rubicon").unwrap();
        du.add_int("ts", 1700000000).unwrap();
        du.add_float("cg", 2.5).unwrap();

        let parsed = DataUrl::parse(du.as_str()).unwrap();
        assert_eq!(parsed.get_required_string("bi").unwrap(), "rubicon");
        assert_eq!(parsed.get_required_int("ts").unwrap(), 1700000000);
        assert_eq!(parsed.get_required_float("cg").unwrap(), 2.5);
    }

    #[test]
    fn missing_field_errors() {
        let du = DataUrl::new("https://x.example/cb").unwrap();
        assert!(du.get_required_string("nope").is_err());
    }
}
