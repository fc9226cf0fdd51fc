//! Bid ledger: carrier offers against tendered loads.
//!
//! The ledger enforces single-winner exclusivity only. It never picks a
//! winner on its own; [`ledger::BidLedger::advisory_ranking`] is a
//! display hint.

pub mod ledger;

use dashmap::DashMap;

use crate::types::{Offer, OfferId, OfferStatus};

pub use ledger::{BidLedger, OfferRequest};

/// Reject every pending offer on a load that is leaving `tendered`.
///
/// Caller holds the load's write lock, so no placement or withdrawal can
/// interleave. Returns the ids that were rejected.
pub(crate) fn close_bidding(offers: &DashMap<OfferId, Offer>) -> Vec<OfferId> {
    let mut rejected = Vec::new();
    for mut entry in offers.iter_mut() {
        if entry.is_pending() {
            entry.resolve(OfferStatus::Rejected);
            rejected.push(entry.id);
        }
    }
    rejected
}
