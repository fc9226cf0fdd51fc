//! Offer placement, acceptance, and withdrawal.
//!
//! Placement and withdrawal hold the load's read lock, so any number of
//! carriers bid on the same load at once. Acceptance holds the write
//! lock for the whole resolve: the winner is accepted, every sibling is
//! rejected, and the load moves to `accepted` before any reader can look.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::eligibility::EligibilityEvaluator;
use crate::error::{MarketError, Result};
use crate::lifecycle::events::LoadEvent;
use crate::lifecycle::transitions;
use crate::lifecycle::LoadRegistry;
use crate::types::{Actor, Award, Load, LoadId, LoadStatus, Offer, OfferId, OfferStatus};

/// Carrier-supplied offer terms.
#[derive(Debug, Clone, Deserialize)]
pub struct OfferRequest {
    pub rate: Decimal,
    #[serde(default)]
    pub eta: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl OfferRequest {
    pub fn at(rate: Decimal) -> Self {
        Self {
            rate,
            eta: None,
            notes: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.rate <= Decimal::ZERO {
            return Err(MarketError::InvalidOffer(format!(
                "rate must be positive, got {}",
                self.rate
            )));
        }
        if let Some(eta) = self.eta {
            if eta < Utc::now() {
                return Err(MarketError::InvalidOffer(format!("eta {eta} is in the past")));
            }
        }
        Ok(())
    }
}

fn ensure_open(load: &Load) -> Result<()> {
    if load.status == LoadStatus::Tendered {
        Ok(())
    } else {
        Err(MarketError::LoadNotOpen {
            load_id: load.id,
            status: load.status,
        })
    }
}

pub struct BidLedger {
    registry: Arc<LoadRegistry>,
    eligibility: Arc<EligibilityEvaluator>,
}

impl BidLedger {
    pub fn new(registry: Arc<LoadRegistry>, eligibility: Arc<EligibilityEvaluator>) -> Self {
        Self {
            registry,
            eligibility,
        }
    }

    /// Place a pending offer. Never mutates the load.
    ///
    /// A load that is not tendered fails `LoadNotOpen` for every caller,
    /// before eligibility is looked at. Eligibility is always fetched
    /// fresh here.
    pub async fn place_offer(
        &self,
        load_id: LoadId,
        carrier_id: &str,
        request: OfferRequest,
    ) -> Result<Offer> {
        let cell = self.registry.cell(load_id)?;
        ensure_open(&*cell.load.read().await)?;

        self.eligibility.require_eligible(carrier_id).await?;
        request.validate()?;

        let offer = {
            let load = cell.load.read().await;
            // The load may have left tendered while eligibility was fetched.
            ensure_open(&load)?;

            match cell.active_by_carrier.entry(carrier_id.to_string()) {
                Entry::Occupied(existing) => {
                    return Err(MarketError::DuplicateOffer {
                        load_id,
                        carrier_id: carrier_id.to_string(),
                        offer_id: *existing.get(),
                    });
                }
                Entry::Vacant(slot) => {
                    let offer = Offer {
                        id: Uuid::new_v4(),
                        load_id,
                        carrier_id: carrier_id.to_string(),
                        rate: request.rate,
                        eta: request.eta,
                        notes: request.notes,
                        status: OfferStatus::Pending,
                        created_at: Utc::now(),
                        resolved_at: None,
                    };
                    cell.offers.insert(offer.id, offer.clone());
                    slot.insert(offer.id);
                    offer
                }
            }
        };

        info!(
            load_id = %load_id,
            offer_id = %offer.id,
            carrier_id,
            rate = %offer.rate,
            "Offer placed"
        );
        self.registry.events().publish(LoadEvent::OfferPlaced {
            load_id,
            offer_id: offer.id,
            carrier_id: offer.carrier_id.clone(),
        });
        Ok(offer)
    }

    /// Accept one offer and close bidding on its load, atomically.
    ///
    /// Of any number of racing calls on the same load exactly one wins;
    /// the rest observe the load already accepted and get `AlreadyResolved`.
    pub async fn accept_offer(
        &self,
        load_id: LoadId,
        offer_id: OfferId,
        actor: &Actor,
    ) -> Result<Offer> {
        let cell = self.registry.cell(load_id)?;
        let (accepted, load, rejected) = {
            let mut load = cell.load.write().await;
            if !cell.offers.contains_key(&offer_id) {
                return Err(MarketError::offer_not_found(offer_id));
            }
            if load.status != LoadStatus::Tendered {
                warn!(load_id = %load_id, offer_id = %offer_id, status = %load.status, "Accept lost race");
                return Err(MarketError::load_resolved(load_id, load.status));
            }
            transitions::authorize_owner(actor, &load)?;

            let accepted = {
                let mut winner = cell
                    .offers
                    .get_mut(&offer_id)
                    .ok_or_else(|| MarketError::offer_not_found(offer_id))?;
                if !winner.is_pending() {
                    return Err(MarketError::offer_resolved(
                        load_id,
                        load.status,
                        winner.status,
                    ));
                }
                winner.resolve(OfferStatus::Accepted);
                winner.clone()
            };

            load.award = Some(Award::WinningOffer {
                offer_id,
                carrier_id: accepted.carrier_id.clone(),
            });
            let rejected = self
                .registry
                .commit_status(&cell, &mut load, LoadStatus::Accepted, actor)
                .await;
            (accepted, load.clone(), rejected)
        };

        info!(
            load_id = %load_id,
            offer_id = %offer_id,
            carrier_id = %accepted.carrier_id,
            rejected = rejected.len(),
            "Offer accepted"
        );
        self.registry.events().publish(LoadEvent::OfferResolved {
            load_id,
            offer_id,
            status: OfferStatus::Accepted,
        });
        self.registry
            .publish_status(&load, LoadStatus::Tendered, actor, &rejected);
        Ok(accepted)
    }

    /// Withdraw a pending offer so the carrier may re-offer.
    pub async fn withdraw_offer(
        &self,
        load_id: LoadId,
        offer_id: OfferId,
        carrier_id: &str,
    ) -> Result<Offer> {
        let cell = self.registry.cell(load_id)?;
        let withdrawn = {
            let load = cell.load.read().await;
            let withdrawn = {
                let mut offer = cell
                    .offers
                    .get_mut(&offer_id)
                    .ok_or_else(|| MarketError::offer_not_found(offer_id))?;
                if offer.carrier_id != carrier_id {
                    return Err(MarketError::Forbidden(format!(
                        "carrier {carrier_id} does not own offer {offer_id}"
                    )));
                }
                if !offer.is_pending() {
                    return Err(MarketError::offer_resolved(
                        load_id,
                        load.status,
                        offer.status,
                    ));
                }
                if load.status != LoadStatus::Tendered {
                    return Err(MarketError::load_resolved(load_id, load.status));
                }
                offer.resolve(OfferStatus::Withdrawn);
                offer.clone()
            };
            // Offer guard is released first; placement locks these maps
            // in the opposite order.
            cell.active_by_carrier
                .remove_if(carrier_id, |_, held| *held == offer_id);
            withdrawn
        };

        info!(load_id = %load_id, offer_id = %offer_id, carrier_id, "Offer withdrawn");
        self.registry.events().publish(LoadEvent::OfferResolved {
            load_id,
            offer_id,
            status: OfferStatus::Withdrawn,
        });
        Ok(withdrawn)
    }

    /// Every offer on a load, oldest first.
    pub async fn offers_for_load(&self, load_id: LoadId) -> Result<Vec<Offer>> {
        let cell = self.registry.cell(load_id)?;
        let _load = cell.load.read().await;
        Ok(cell.offers_sorted())
    }

    /// Every offer a carrier has placed, newest first.
    pub async fn offers_for_carrier(&self, carrier_id: &str) -> Vec<Offer> {
        let mut offers = Vec::new();
        for load in self.registry.list().await {
            if let Ok(cell) = self.registry.cell(load.id) {
                let _load = cell.load.read().await;
                offers.extend(
                    cell.offers
                        .iter()
                        .filter(|o| o.carrier_id == carrier_id)
                        .map(|o| o.value().clone()),
                );
            }
        }
        offers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        debug!(carrier_id, count = offers.len(), "Carrier offers listed");
        offers
    }

    /// Pending offers ordered by rate, cheapest first. Display hint only;
    /// acceptance is always a manual choice.
    pub async fn advisory_ranking(&self, load_id: LoadId) -> Result<Vec<Offer>> {
        let mut pending: Vec<Offer> = self
            .offers_for_load(load_id)
            .await?
            .into_iter()
            .filter(Offer::is_pending)
            .collect();
        pending.sort_by(|a, b| {
            a.rate
                .cmp(&b.rate)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(pending)
    }

    /// Accepted offers on a load; never more than one.
    pub async fn accepted_count(&self, load_id: LoadId) -> Result<usize> {
        Ok(self
            .offers_for_load(load_id)
            .await?
            .iter()
            .filter(|o| o.status == OfferStatus::Accepted)
            .count())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
