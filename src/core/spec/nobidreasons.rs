//! No-bid reason constants surfaced on `BidderEvent.no_bid_reason`
//! and in the empty-auction policy. Mirrors the adapter error
//! taxonomy one-for-one, plus the two categories that are about the
//! auction as a whole rather than one bidder.

use crate::rtb::common::spec_list;

spec_list! {
    /// Adapter could not serialize the outbound request.
    MARSHAL = 400 => "Marshal Error",
    /// Bidder endpoint replied 4xx.
    BAD_REQUEST = 401 => "Bad Request",
    /// Bidder replied a non-2xx/204 status.
    BAD_STATUS = 402 => "Bad Status",
    /// Bidder response body did not parse.
    PARSE = 403 => "Parse Error",
    /// `bidResponse.ID != bidRequest.ID`.
    RESPONSE_ID_MISMATCH = 404 => "Response ID Mismatch",
    /// Bidder call exceeded its deadline.
    TIMEOUT = 405 => "Timeout",
    /// Transport-level failure reaching the bidder.
    CONNECTION = 406 => "Connection Error",
    /// Circuit breaker gated this call.
    CIRCUIT_OPEN = 407 => "Circuit Open",
    /// No config resolved for this bidder at any hierarchy level.
    CONFIG_MISSING = 408 => "No Config For Bidder",

    /// Auction-level: zero bidders were configured for any impression.
    NO_BIDDERS_CONFIGURED = 500 => "No Bidders Configured",
    /// Auction-level: every configured bidder returned below floor or no-bid.
    NO_VALID_BIDS = 501 => "No Valid Bids",
}
