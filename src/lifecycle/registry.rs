//! Load registry: owner of the canonical load state.
//!
//! Loads live in an arena keyed by id. Each load sits in its own
//! [`LoadCell`] behind a per-load `RwLock`, next to the offers placed on
//! it. Writers (transitions, acceptance) take the load's write lock;
//! offer placement and withdrawal take the read lock, so bidders on the
//! same load run concurrently and only the exit from `tendered` is
//! serialized. No operation ever holds two load locks.

use anyhow::bail;
use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::board::{BoardIndex, BoardView};
use super::events::{EventBus, LoadEvent};
use super::transitions;
use crate::bidding;
use crate::error::{MarketError, Result};
use crate::types::{
    Actor, Award, CarrierId, DriverRef, ExitArtifact, Load, LoadDetails, LoadId, LoadStatus,
    Offer, OfferId, OfferStatus, StatusChange,
};

// ---------------------------------------------------------------------------
// Load cell
// ---------------------------------------------------------------------------

/// One load plus everything bid on it.
///
/// `offers` and `active_by_carrier` are only touched while holding
/// `load` (read for placement/withdrawal, write for resolution).
pub(crate) struct LoadCell {
    pub(crate) load: RwLock<Load>,
    pub(crate) offers: DashMap<OfferId, Offer>,
    /// Carrier -> its non-withdrawn offer on this load.
    pub(crate) active_by_carrier: DashMap<CarrierId, OfferId>,
}

impl LoadCell {
    fn new(load: Load) -> Self {
        Self {
            load: RwLock::new(load),
            offers: DashMap::new(),
            active_by_carrier: DashMap::new(),
        }
    }

    /// Offers oldest first. Caller must hold the load lock.
    pub(crate) fn offers_sorted(&self) -> Vec<Offer> {
        let mut offers: Vec<Offer> = self.offers.iter().map(|e| e.value().clone()).collect();
        offers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        offers
    }
}

// ---------------------------------------------------------------------------
// Transition request
// ---------------------------------------------------------------------------

/// Target status plus the optional optimistic-concurrency and evidence
/// parameters of a transition.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TransitionRequest {
    pub target: LoadStatus,
    #[serde(default)]
    pub expected_version: Option<u64>,
    #[serde(default)]
    pub artifact: Option<ExitArtifact>,
}

impl TransitionRequest {
    pub fn to(target: LoadStatus) -> Self {
        Self {
            target,
            expected_version: None,
            artifact: None,
        }
    }

    pub fn at_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn with_artifact(mut self, artifact: ExitArtifact) -> Self {
        self.artifact = Some(artifact);
        self
    }
}

fn check_version(load: &Load, expected: Option<u64>) -> Result<()> {
    match expected {
        Some(expected) if expected != load.version => Err(MarketError::Conflict {
            load_id: load.id,
            expected,
            actual: load.version,
        }),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct LoadRegistry {
    loads: DashMap<LoadId, Arc<LoadCell>>,
    board: BoardIndex,
    events: EventBus,
}

impl Default for LoadRegistry {
    fn default() -> Self {
        Self::new(EventBus::default())
    }
}

impl LoadRegistry {
    pub fn new(events: EventBus) -> Self {
        Self {
            loads: DashMap::new(),
            board: BoardIndex::new(),
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.loads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loads.is_empty()
    }

    pub(crate) fn cell(&self, load_id: LoadId) -> Result<Arc<LoadCell>> {
        self.loads
            .get(&load_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| MarketError::load_not_found(load_id))
    }

    /// Arena entries, cloned out so no map guard is held across an await.
    fn cells(&self) -> Vec<Arc<LoadCell>> {
        self.loads.iter().map(|e| Arc::clone(e.value())).collect()
    }

    // -- Reads -------------------------------------------------------------

    pub async fn get(&self, load_id: LoadId) -> Result<Load> {
        let cell = self.cell(load_id)?;
        let load = cell.load.read().await;
        debug!(load_id = %load_id, version = load.version, "Load read");
        Ok(load.clone())
    }

    /// All loads, newest first.
    pub async fn list(&self) -> Vec<Load> {
        let mut loads = Vec::with_capacity(self.loads.len());
        for cell in self.cells() {
            loads.push(cell.load.read().await.clone());
        }
        loads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        loads
    }

    /// Loads currently in `status`, located through the board index.
    pub async fn loads_with_status(&self, status: LoadStatus) -> Vec<Load> {
        let mut loads = Vec::new();
        for id in self.board.ids_with_status(status).await {
            // The index may lag a concurrent transition by one commit.
            if let Ok(load) = self.get(id).await {
                if load.status == status {
                    loads.push(load);
                }
            }
        }
        loads
    }

    pub async fn board(&self) -> BoardView {
        self.board.view().await
    }

    // -- Mutations -----------------------------------------------------------

    /// Create a draft load on behalf of `shipper_id`.
    pub async fn create_draft(
        &self,
        shipper_id: &str,
        details: LoadDetails,
        actor: &Actor,
    ) -> Result<Load> {
        let load = Load::draft(shipper_id, details, actor.clone());
        transitions::authorize_owner(actor, &load)?;

        let created = load.clone();
        self.board.upsert(&load).await;
        self.loads.insert(load.id, Arc::new(LoadCell::new(load)));

        info!(load_id = %created.id, shipper_id, actor = %actor, "Draft load created");
        self.events.publish(LoadEvent::Created {
            load_id: created.id,
            version: created.version,
        });
        Ok(created)
    }

    /// Edit a draft's fields. Any other status is immutable here.
    pub async fn update_draft(
        &self,
        load_id: LoadId,
        details: LoadDetails,
        actor: &Actor,
        expected_version: Option<u64>,
    ) -> Result<Load> {
        let cell = self.cell(load_id)?;
        let mut load = cell.load.write().await;
        check_version(&load, expected_version)?;
        transitions::authorize_owner(actor, &load)?;
        if load.status != LoadStatus::Draft {
            return Err(MarketError::InvalidTransition {
                from: load.status,
                to: load.status,
                reason: "only draft loads can be edited".into(),
            });
        }

        details.apply_to(&mut load);
        load.version += 1;
        load.updated_at = Utc::now();
        self.board.upsert(&load).await;

        debug!(load_id = %load_id, version = load.version, "Draft updated");
        Ok(load.clone())
    }

    /// Move a load along the lifecycle graph.
    ///
    /// `accepted` is not reachable here: it is entered only through offer
    /// acceptance or [`LoadRegistry::assign_driver`].
    pub async fn transition(
        &self,
        load_id: LoadId,
        request: TransitionRequest,
        actor: &Actor,
    ) -> Result<Load> {
        let cell = self.cell(load_id)?;
        let (load, from, rejected) = {
            let mut load = cell.load.write().await;
            check_version(&load, request.expected_version)?;
            if request.target == LoadStatus::Accepted {
                return Err(MarketError::InvalidTransition {
                    from: load.status,
                    to: LoadStatus::Accepted,
                    reason: "accepted is reached by offer acceptance or driver assignment".into(),
                });
            }
            transitions::authorize(actor, &load, request.target)?;
            transitions::check(&load, request.target, request.artifact)?;

            let from = load.status;
            let rejected = self
                .commit_status(&cell, &mut load, request.target, actor)
                .await;
            (load.clone(), from, rejected)
        };

        self.publish_status(&load, from, actor, &rejected);
        Ok(load)
    }

    /// Award a tendered load directly to a driver, bypassing bidding.
    /// Pending offers are rejected in the same step.
    pub async fn assign_driver(
        &self,
        load_id: LoadId,
        driver_id: &str,
        actor: &Actor,
        expected_version: Option<u64>,
    ) -> Result<Load> {
        let cell = self.cell(load_id)?;
        let (load, rejected) = {
            let mut load = cell.load.write().await;
            check_version(&load, expected_version)?;
            transitions::authorize_owner(actor, &load)?;
            match load.status {
                LoadStatus::Tendered => {}
                LoadStatus::Draft => transitions::check(&load, LoadStatus::Accepted, None)?,
                status => return Err(MarketError::load_resolved(load_id, status)),
            }

            load.award = Some(Award::DirectAssignment {
                driver_id: driver_id.to_string(),
            });
            load.driver = Some(DriverRef {
                driver_id: driver_id.to_string(),
                confirmed: false,
                confirmed_at: None,
            });
            let rejected = self
                .commit_status(&cell, &mut load, LoadStatus::Accepted, actor)
                .await;
            (load.clone(), rejected)
        };

        info!(load_id = %load_id, driver_id, "Load assigned directly to driver");
        self.publish_status(&load, LoadStatus::Tendered, actor, &rejected);
        Ok(load)
    }

    /// Record the driver confirmed for an accepted load.
    pub async fn confirm_driver(
        &self,
        load_id: LoadId,
        driver_id: &str,
        actor: &Actor,
    ) -> Result<Load> {
        let cell = self.cell(load_id)?;
        let load = {
            let mut load = cell.load.write().await;
            if load.status != LoadStatus::Accepted {
                return Err(MarketError::InvalidTransition {
                    from: load.status,
                    to: load.status,
                    reason: "drivers are confirmed only while accepted".into(),
                });
            }

            let allowed = match actor {
                Actor::Driver(id) => id == driver_id && load.driver_id() == Some(driver_id),
                Actor::Carrier(id) => load.awarded_carrier() == Some(id.as_str()),
                _ => transitions::authorize_owner(actor, &load).is_ok(),
            };
            if !allowed {
                return Err(MarketError::Forbidden(format!(
                    "{actor} may not confirm a driver on load {load_id}"
                )));
            }
            if let Some(Award::DirectAssignment { driver_id: assigned }) = &load.award {
                if assigned != driver_id {
                    return Err(MarketError::Forbidden(format!(
                        "load {load_id} is assigned to driver {assigned}"
                    )));
                }
            }

            if matches!(&load.driver, Some(d) if d.confirmed && d.driver_id == driver_id) {
                return Ok(load.clone());
            }

            load.driver = Some(DriverRef {
                driver_id: driver_id.to_string(),
                confirmed: true,
                confirmed_at: Some(Utc::now()),
            });
            load.version += 1;
            load.updated_at = Utc::now();
            self.board.upsert(&load).await;
            load.clone()
        };

        info!(load_id = %load_id, driver_id, "Driver confirmed");
        self.events.publish(LoadEvent::DriverConfirmed {
            load_id,
            driver_id: driver_id.to_string(),
            version: load.version,
        });
        Ok(load)
    }

    /// Apply a validated status change. Caller holds the load's write lock.
    ///
    /// Leaving `tendered` closes bidding: every still-pending offer is
    /// rejected before the lock is released. Returns the rejected ids.
    pub(crate) async fn commit_status(
        &self,
        cell: &LoadCell,
        load: &mut Load,
        to: LoadStatus,
        actor: &Actor,
    ) -> Vec<OfferId> {
        let from = load.status;
        let now = Utc::now();

        load.status = to;
        load.version += 1;
        load.updated_at = now;
        load.history.push(StatusChange {
            from: Some(from),
            to,
            actor: actor.clone(),
            at: now,
        });
        match to {
            LoadStatus::Tendered => load.posted_at = Some(now),
            LoadStatus::Completed => load.archived = true,
            _ => {}
        }

        let rejected = if from == LoadStatus::Tendered {
            bidding::close_bidding(&cell.offers)
        } else {
            Vec::new()
        };

        self.board.upsert(load).await;

        info!(
            load_id = %load.id,
            from = %from,
            to = %to,
            version = load.version,
            actor = %actor,
            rejected_offers = rejected.len(),
            "Load transitioned"
        );
        rejected
    }

    pub(crate) fn publish_status(
        &self,
        load: &Load,
        from: LoadStatus,
        actor: &Actor,
        rejected: &[OfferId],
    ) {
        self.events.publish(LoadEvent::StatusChanged {
            load_id: load.id,
            from,
            to: load.status,
            version: load.version,
            actor: actor.clone(),
        });
        for offer_id in rejected {
            self.events.publish(LoadEvent::OfferResolved {
                load_id: load.id,
                offer_id: *offer_id,
                status: OfferStatus::Rejected,
            });
        }
    }

    // -- Snapshot ------------------------------------------------------------

    /// Consistent-per-load copy of every load and offer.
    pub async fn snapshot(&self) -> (Vec<Load>, Vec<Offer>) {
        let mut loads = Vec::with_capacity(self.loads.len());
        let mut offers = Vec::new();
        for cell in self.cells() {
            let load = cell.load.read().await;
            loads.push(load.clone());
            offers.extend(cell.offers_sorted());
        }
        loads.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        (loads, offers)
    }

    /// Replace the registry contents with previously exported state.
    /// Rebuilds the board index and per-carrier offer slots.
    pub async fn restore(&self, loads: Vec<Load>, offers: Vec<Offer>) -> anyhow::Result<usize> {
        let mut by_load: HashMap<LoadId, Vec<Offer>> = HashMap::new();
        for offer in offers {
            by_load.entry(offer.load_id).or_default().push(offer);
        }

        for load in &loads {
            let accepted = by_load
                .get(&load.id)
                .map(|o| o.iter().filter(|o| o.status == OfferStatus::Accepted).count())
                .unwrap_or(0);
            if accepted > 1 {
                bail!("Load {} has {accepted} accepted offers", load.id);
            }
        }

        self.loads.clear();
        self.board.clear().await;

        let count = loads.len();
        for load in loads {
            let cell = LoadCell::new(load.clone());
            for offer in by_load.remove(&load.id).unwrap_or_default() {
                if offer.status != OfferStatus::Withdrawn {
                    cell.active_by_carrier.insert(offer.carrier_id.clone(), offer.id);
                }
                cell.offers.insert(offer.id, offer);
            }
            self.board.upsert(&load).await;
            self.loads.insert(load.id, Arc::new(cell));
        }

        for (load_id, orphans) in by_load {
            warn!(load_id = %load_id, count = orphans.len(), "Dropping offers for unknown load");
        }

        info!(loads = count, "Registry restored");
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
