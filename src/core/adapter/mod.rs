//! Adapter Registry and Contract: the uniform interface
//! every bidder driver implements. Adapters are purely functional —
//! no I/O — so the exchange can apply timeouts, retries, and circuit
//! breaking identically across bidders using the `RequestData` they
//! hand back.

use crate::rtb::bid_request::BidRequest;
use crate::rtb::bid_response::Bid;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;

pub mod rubicon;

/// Internal error classification. Not a wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeErrorKind {
    Marshal,
    BadRequest,
    BadStatus,
    Parse,
    ResponseIdMismatch,
    Timeout,
    Connection,
    CircuitOpen,
    ConfigMissing,
    Validation,
    Internal,
}

impl fmt::Display for ExchangeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExchangeErrorKind::Marshal => "MARSHAL",
            ExchangeErrorKind::BadRequest => "BAD_REQUEST",
            ExchangeErrorKind::BadStatus => "BAD_STATUS",
            ExchangeErrorKind::Parse => "PARSE",
            ExchangeErrorKind::ResponseIdMismatch => "RESPONSE_ID_MISMATCH",
            ExchangeErrorKind::Timeout => "TIMEOUT",
            ExchangeErrorKind::Connection => "CONNECTION",
            ExchangeErrorKind::CircuitOpen => "CIRCUIT_OPEN",
            ExchangeErrorKind::ConfigMissing => "CONFIG_MISSING",
            ExchangeErrorKind::Validation => "VALIDATION",
            ExchangeErrorKind::Internal => "INTERNAL",
        };
        write!(f, "{s}")
    }
}

/// A structured error crossing the adapter/exchange boundary. Every
/// error carries an optional bidder code, a classified kind, a
/// human-readable message, and the underlying cause if any.
#[derive(Debug)]
pub struct ExchangeError {
    pub bidder_code: Option<String>,
    pub kind: ExchangeErrorKind,
    pub message: String,
    pub source: Option<anyhow::Error>,
}

impl ExchangeError {
    pub fn new(kind: ExchangeErrorKind, message: impl Into<String>) -> Self {
        Self {
            bidder_code: None,
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn for_bidder(bidder_code: impl Into<String>, kind: ExchangeErrorKind, message: impl Into<String>) -> Self {
        Self {
            bidder_code: Some(bidder_code.into()),
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bidder_code {
            Some(code) => write!(f, "[{code}] {}: {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ExchangeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref())
    }
}

/// A single concrete outbound HTTP call an adapter wants made. The
/// exchange owns all transport concerns (timeout, retry, breaker);
/// the adapter only describes the call.
#[derive(Debug, Clone)]
pub struct RequestData {
    pub method: reqwest::Method,
    pub uri: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    /// Which impression this request covers, for adapters that issue
    /// one request per impression; `None` for batched requests.
    pub imp_id: Option<String>,
}

impl RequestData {
    pub fn post_json(uri: impl Into<String>, body: Bytes) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            method: reqwest::Method::POST,
            uri: uri.into(),
            headers,
            body,
            imp_id: None,
        }
    }
}

/// The raw transport result the exchange feeds back into
/// `ParseResponse` after executing a `RequestData`.
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Bids parsed from one bidder HTTP response, tagged by media type
/// (derived from the originating impression).
pub struct BidderResponse {
    pub bids: Vec<Bid>,
}

/// Reporting classification carried on `BidderEvent`.
pub use crate::core::models::bidder::DemandClass;

/// Static descriptor an adapter exposes about itself.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub code: String,
    pub enabled: bool,
    pub supports_banner: bool,
    pub supports_video: bool,
    pub supports_native: bool,
    pub demand_class: DemandClass,
}

/// Every bidder driver implements this. Implementations must not
/// perform I/O: `build_requests` only describes calls, `parse_response`
/// only interprets bytes already fetched by the exchange.
pub trait Adapter: Send + Sync {
    fn info(&self) -> AdapterInfo;

    /// Transforms the canonical, per-bidder-projected request into one
    /// or more concrete outbound requests. Returning zero requests and
    /// zero errors is a legitimate no-bid, not a failure.
    fn build_requests(
        &self,
        request: &BidRequest,
        params: &HashMap<String, serde_json::Value>,
    ) -> (Vec<RequestData>, Vec<ExchangeError>);

    /// Interprets one raw HTTP response. A 204 must be mapped to an
    /// empty `BidderResponse`, not an error.
    fn parse_response(
        &self,
        request: &BidRequest,
        response: &RawResponse,
    ) -> Result<BidderResponse, ExchangeError>;
}

/// Classifies a raw transport outcome before handing it to
/// `parse_response`.
pub fn classify_status(bidder_code: &str, status: u16) -> Result<(), ExchangeError> {
    match status {
        204 => Err(ExchangeError::for_bidder(
            bidder_code,
            ExchangeErrorKind::BadStatus,
            "no-content",
        )),
        400..=499 => Err(ExchangeError::for_bidder(
            bidder_code,
            ExchangeErrorKind::BadRequest,
            format!("bidder replied {status}"),
        )),
        200..=299 => Ok(()),
        other => Err(ExchangeError::for_bidder(
            bidder_code,
            ExchangeErrorKind::BadStatus,
            format!("bidder replied {other}"),
        )),
    }
}

/// Holds every registered adapter, keyed by bidder code. An explicit
/// aggregate owned by the `Exchange`, not a package-level singleton.
pub struct AdapterRegistry {
    adapters: HashMap<String, Box<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Box<dyn Adapter>) {
        let code = adapter.info().code.clone();
        self.adapters.insert(code, adapter);
    }

    pub fn get(&self, code: &str) -> Option<&dyn Adapter> {
        self.adapters.get(code).map(|b| b.as_ref())
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(|s| s.as_str())
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoBidAdapter;

    impl Adapter for NoBidAdapter {
        fn info(&self) -> AdapterInfo {
            AdapterInfo {
                code: "stub".into(),
                enabled: true,
                supports_banner: true,
                supports_video: false,
                supports_native: false,
                demand_class: DemandClass::Platform,
            }
        }

        fn build_requests(
            &self,
            _request: &BidRequest,
            _params: &HashMap<String, serde_json::Value>,
        ) -> (Vec<RequestData>, Vec<ExchangeError>) {
            (Vec::new(), Vec::new())
        }

        fn parse_response(
            &self,
            _request: &BidRequest,
            _response: &RawResponse,
        ) -> Result<BidderResponse, ExchangeError> {
            Ok(BidderResponse { bids: Vec::new() })
        }
    }

    #[test]
    fn zero_requests_is_a_valid_no_bid() {
        let adapter = NoBidAdapter;
        let request = BidRequest::default();
        let (requests, errors) = adapter.build_requests(&request, &HashMap::new());
        assert!(requests.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn classify_status_maps_204_to_bad_status() {
        let err = classify_status("stub", 204).unwrap_err();
        assert_eq!(err.kind, ExchangeErrorKind::BadStatus);
    }

    #[test]
    fn classify_status_accepts_2xx() {
        assert!(classify_status("stub", 200).is_ok());
    }

    #[test]
    fn registry_round_trips_adapter_by_code() {
        let mut registry = AdapterRegistry::new();
        registry.register(Box::new(NoBidAdapter));
        assert!(registry.get("stub").is_some());
        assert!(registry.get("missing").is_none());
    }
}
