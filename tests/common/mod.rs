//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use loadboard::bidding::BidLedger;
use loadboard::eligibility::{EligibilityEvaluator, EligibilityPolicy, InMemoryDirectory};
use loadboard::lifecycle::{LoadRegistry, TransitionRequest};
use loadboard::marketplace::{MarketplaceConfig, MarketplaceService};
use loadboard::types::{
    Actor, EquipmentType, LoadDetails, LoadId, LoadStatus, Location, TimeWindow,
};

pub const CONSENT: &str = "carrier-agreement";
pub const SHIPPER: &str = "shipper-1";

pub struct Market {
    pub registry: Arc<LoadRegistry>,
    pub directory: Arc<InMemoryDirectory>,
    pub eligibility: Arc<EligibilityEvaluator>,
    pub ledger: Arc<BidLedger>,
    pub marketplace: MarketplaceService,
}

/// A market with `carriers` eligible carriers named `carrier-0..n`.
pub fn market(carriers: usize) -> Market {
    let directory = Arc::new(InMemoryDirectory::new([CONSENT]));
    for i in 0..carriers {
        let id = carrier(i);
        directory.set_score(&id, 80);
        directory.sign_consent(&id, CONSENT);
    }
    let eligibility = Arc::new(EligibilityEvaluator::new(
        directory.clone(),
        directory.clone(),
        EligibilityPolicy::default(),
    ));
    let registry = Arc::new(LoadRegistry::default());
    Market {
        ledger: Arc::new(BidLedger::new(registry.clone(), eligibility.clone())),
        marketplace: MarketplaceService::new(
            registry.clone(),
            eligibility.clone(),
            MarketplaceConfig::default(),
        ),
        registry,
        directory,
        eligibility,
    }
}

pub fn carrier(i: usize) -> String {
    format!("carrier-{i}")
}

pub fn shipper() -> Actor {
    Actor::Shipper(SHIPPER.to_string())
}

pub fn details(origin: &str, destination: &str) -> LoadDetails {
    LoadDetails {
        reference: Some("Mixed retail freight".to_string()),
        origin: Some(Location::new(origin, "TX")),
        destination: Some(Location::new(destination, "TN")),
        pickup: NaiveDate::from_ymd_opt(2026, 11, 2).map(TimeWindow::on),
        delivery: NaiveDate::from_ymd_opt(2026, 11, 3).map(TimeWindow::on),
        equipment: Some(EquipmentType::DryVan),
        weight_lbs: Some(38_000),
        rate: Some(dec!(1850)),
        distance_miles: Some(452),
    }
}

pub async fn tendered_load(registry: &LoadRegistry, origin: &str) -> LoadId {
    let load = registry
        .create_draft(SHIPPER, details(origin, "Memphis"), &shipper())
        .await
        .unwrap();
    registry
        .transition(load.id, TransitionRequest::to(LoadStatus::Tendered), &shipper())
        .await
        .unwrap();
    load.id
}
