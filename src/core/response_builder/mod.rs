//! Response Builder: maps canonical auction winners back
//! onto the client's compact wire format. Never raises — a zero-winner
//! auction still produces a well-formed, empty `bids` array.

use crate::core::exchange::{AuctionOutcome, Winner};
use crate::rtb::client::{ClientBid, ClientBidResponse, ClientMeta};
use std::collections::HashMap;
use std::time::Duration;

/// Builds the client response for one auction.
///
/// `slot_by_imp` is the impression-id → `divId` mapping captured by the
/// normalizer at request-build time; winners whose `imp_id` has no
/// entry are dropped rather than surfaced with a blank `divId`, since
/// that can only happen if the exchange fabricated an unknown
/// impression id.
pub fn build(outcome: AuctionOutcome, slot_by_imp: &HashMap<String, String>, currency: &str) -> ClientBidResponse {
    let bids = outcome
        .winners
        .into_iter()
        .filter_map(|winner| to_client_bid(winner, slot_by_imp, currency))
        .collect();

    ClientBidResponse {
        bids,
        response_time: duration_to_millis(outcome.duration),
    }
}

/// Builds the empty-auction response for failures that never reach the
/// exchange — validation failures aside, every other error path
/// returns this, never a non-2xx.
pub fn empty(elapsed: Duration) -> ClientBidResponse {
    ClientBidResponse {
        bids: Vec::new(),
        response_time: duration_to_millis(elapsed),
    }
}

fn to_client_bid(winner: Winner, slot_by_imp: &HashMap<String, String>, currency: &str) -> Option<ClientBid> {
    let div_id = slot_by_imp.get(&winner.imp_id)?.clone();
    let bid = winner.bid;
    let targeting = winner.targeting;

    let meta = if bid.adomain.is_empty() {
        None
    } else {
        Some(ClientMeta {
            adomain: bid.adomain,
            media_type: Some(bid.mtype.to_string()),
        })
    };

    Some(ClientBid {
        div_id,
        cpm: bid.price,
        currency: currency.to_string(),
        width: bid.w,
        height: bid.h,
        ad_id: bid.cid,
        creative_id: bid.crid,
        deal_id: bid.dealid,
        targeting,
        meta,
    })
}

fn duration_to_millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::adapter::DemandClass;
    use crate::rtb::bid_response::{Bid, MediaType};

    fn winner(imp_id: &str, price: f64, adomain: Vec<String>) -> Winner {
        Winner {
            imp_id: imp_id.to_string(),
            bidder_code: "rubicon".to_string(),
            demand_class: DemandClass::Platform,
            bid: Bid {
                price,
                adm: "<html/>".into(),
                crid: "cx".into(),
                cid: "camp1".into(),
                w: 300,
                h: 250,
                adomain,
                mtype: MediaType::Banner,
                ..Default::default()
            },
            targeting: HashMap::new(),
        }
    }

    #[test]
    fn maps_winner_to_client_bid_via_slot_mapping() {
        let mut slots = HashMap::new();
        slots.insert("imp1".to_string(), "s1".to_string());

        let outcome = AuctionOutcome {
            winners: vec![winner("imp1", 2.50, vec!["advertiser.com".to_string()])],
            duration: Duration::from_millis(120),
        };

        let resp = build(outcome, &slots, "USD");
        assert_eq!(resp.response_time, 120);
        assert_eq!(resp.bids.len(), 1);
        let bid = &resp.bids[0];
        assert_eq!(bid.div_id, "s1");
        assert_eq!(bid.cpm, 2.50);
        assert_eq!(bid.creative_id, "cx");
        assert_eq!(bid.ad_id, "camp1");
        assert_eq!(bid.meta.as_ref().unwrap().adomain, vec!["advertiser.com".to_string()]);
    }

    #[test]
    fn drops_winner_with_no_known_slot_mapping() {
        let outcome = AuctionOutcome {
            winners: vec![winner("imp-unknown", 2.50, vec![])],
            duration: Duration::from_millis(50),
        };
        let resp = build(outcome, &HashMap::new(), "USD");
        assert!(resp.bids.is_empty());
        assert_eq!(resp.response_time, 50);
    }

    #[test]
    fn omits_meta_when_no_adomain() {
        let mut slots = HashMap::new();
        slots.insert("imp1".to_string(), "s1".to_string());
        let outcome = AuctionOutcome {
            winners: vec![winner("imp1", 1.0, vec![])],
            duration: Duration::from_millis(10),
        };
        let resp = build(outcome, &slots, "USD");
        assert!(resp.bids[0].meta.is_none());
    }

    #[test]
    fn empty_outcome_is_never_an_error_response() {
        let resp = empty(Duration::from_millis(5));
        assert!(resp.bids.is_empty());
        assert_eq!(resp.response_time, 5);
    }
}
