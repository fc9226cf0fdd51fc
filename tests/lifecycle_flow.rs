//! End-to-end flows across registry, ledger, marketplace, and snapshots.

mod common;

use rust_decimal::Decimal;

use loadboard::bidding::OfferRequest;
use loadboard::error::MarketError;
use loadboard::lifecycle::{transitions, BoardColumn, LoadEvent, LoadRegistry, TransitionRequest};
use loadboard::marketplace::LoadQuery;
use loadboard::storage::{self, Snapshot};
use loadboard::types::{Actor, ExitArtifact, LoadStatus};

use common::{carrier, market, shipper, tendered_load};

#[tokio::test]
async fn won_load_runs_to_completion() {
    let m = market(2);
    let mut events = m.registry.events().subscribe();
    let load_id = tendered_load(&m.registry, "Dallas").await;

    let offer = m
        .ledger
        .place_offer(load_id, &carrier(0), OfferRequest::at(Decimal::from(1700)))
        .await
        .unwrap();
    m.ledger
        .accept_offer(load_id, offer.id, &shipper())
        .await
        .unwrap();

    let board = m.registry.board().await;
    assert_eq!(board.lane(BoardColumn::AwaitingDriver).unwrap().count, 1);

    let hauler = Actor::Carrier(carrier(0));
    m.registry
        .confirm_driver(load_id, "driver-9", &hauler)
        .await
        .unwrap();
    let board = m.registry.board().await;
    assert_eq!(board.lane(BoardColumn::DriverConfirmed).unwrap().count, 1);
    assert_eq!(board.lane(BoardColumn::AwaitingDriver).unwrap().count, 0);

    let driver = Actor::Driver("driver-9".to_string());
    m.registry
        .transition(
            load_id,
            TransitionRequest::to(LoadStatus::InTransit)
                .with_artifact(ExitArtifact::PickupConfirmed),
            &driver,
        )
        .await
        .unwrap();
    m.registry
        .transition(
            load_id,
            TransitionRequest::to(LoadStatus::Delivered)
                .with_artifact(ExitArtifact::ArrivalConfirmed),
            &driver,
        )
        .await
        .unwrap();

    // Completion belongs to the shipper, not the hauler.
    let err = m
        .registry
        .transition(
            load_id,
            TransitionRequest::to(LoadStatus::Completed)
                .with_artifact(ExitArtifact::ProofOfDelivery),
            &driver,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Forbidden(_)));

    let load = m
        .registry
        .transition(
            load_id,
            TransitionRequest::to(LoadStatus::Completed)
                .with_artifact(ExitArtifact::ProofOfDelivery),
            &shipper(),
        )
        .await
        .unwrap();

    assert!(load.archived);
    assert_eq!(
        load.status_path(),
        vec![
            LoadStatus::Draft,
            LoadStatus::Tendered,
            LoadStatus::Accepted,
            LoadStatus::InTransit,
            LoadStatus::Delivered,
            LoadStatus::Completed,
        ]
    );
    assert!(transitions::is_valid_path(&load.status_path()));

    // Completed loads are immutable.
    let err = m
        .registry
        .transition(load_id, TransitionRequest::to(LoadStatus::Cancelled), &shipper())
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidTransition { .. }));

    let mut seen_completed = false;
    while let Ok(event) = events.try_recv() {
        if let LoadEvent::StatusChanged { to: LoadStatus::Completed, .. } = event {
            seen_completed = true;
        }
    }
    assert!(seen_completed);
}

#[tokio::test]
async fn skipping_a_step_is_rejected() {
    let m = market(1);
    let load_id = tendered_load(&m.registry, "Dallas").await;
    m.registry
        .assign_driver(load_id, "driver-1", &shipper(), None)
        .await
        .unwrap();

    let err = m
        .registry
        .transition(
            load_id,
            TransitionRequest::to(LoadStatus::Delivered)
                .with_artifact(ExitArtifact::ArrivalConfirmed),
            &shipper(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MarketError::InvalidTransition {
            from: LoadStatus::Accepted,
            to: LoadStatus::Delivered,
            ..
        }
    ));

    let err = m
        .registry
        .transition(load_id, TransitionRequest::to(LoadStatus::InTransit), &shipper())
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidTransition { .. }));
}

#[tokio::test]
async fn cancelling_a_tendered_load_rejects_pending_offers() {
    let m = market(3);
    let load_id = tendered_load(&m.registry, "Dallas").await;
    for i in 0..3 {
        m.ledger
            .place_offer(load_id, &carrier(i), OfferRequest::at(Decimal::from(1500)))
            .await
            .unwrap();
    }

    m.registry
        .transition(load_id, TransitionRequest::to(LoadStatus::Cancelled), &shipper())
        .await
        .unwrap();

    let offers = m.ledger.offers_for_load(load_id).await.unwrap();
    assert!(offers.iter().all(|o| !o.is_pending()));
    assert_eq!(m.ledger.accepted_count(load_id).await.unwrap(), 0);
}

#[tokio::test]
async fn marketplace_filters_and_gates() {
    let m = market(1);
    tendered_load(&m.registry, "Dallas").await;
    tendered_load(&m.registry, "Fort Worth").await;
    tendered_load(&m.registry, "Houston").await;

    let query = LoadQuery {
        origin: Some("DALLAS".to_string()),
        ..LoadQuery::default()
    };
    let listing = m.marketplace.list(&carrier(0), &query).await.unwrap();
    assert_eq!(listing.total, 1);
    assert_eq!(
        listing.loads[0].origin.as_ref().unwrap().city,
        "Dallas".to_string()
    );

    // A carrier that drops below the threshold loses access on next entry.
    m.directory.set_score(&carrier(0), 59);
    m.eligibility.invalidate(&carrier(0));
    let listing = m
        .marketplace
        .list(&carrier(0), &LoadQuery::default())
        .await
        .unwrap();
    assert!(listing.loads.is_empty());
    assert!(!listing.eligibility.eligible);
}

#[tokio::test]
async fn snapshot_round_trip_preserves_board_and_offers() {
    let m = market(2);
    let load_id = tendered_load(&m.registry, "Dallas").await;
    let offer = m
        .ledger
        .place_offer(load_id, &carrier(0), OfferRequest::at(Decimal::from(1600)))
        .await
        .unwrap();
    m.ledger
        .place_offer(load_id, &carrier(1), OfferRequest::at(Decimal::from(1550)))
        .await
        .unwrap();
    tendered_load(&m.registry, "Austin").await;
    m.ledger
        .accept_offer(load_id, offer.id, &shipper())
        .await
        .unwrap();

    let mut path = std::env::temp_dir();
    path.push(format!("loadboard_flow_{}.json", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();
    storage::save_snapshot(&Snapshot::capture(&m.registry).await, Some(&path)).unwrap();

    let restored = LoadRegistry::default();
    let snapshot = storage::load_snapshot(Some(&path)).unwrap().unwrap();
    assert_eq!(snapshot.restore_into(&restored).await.unwrap(), 2);
    storage::delete_snapshot(Some(&path)).unwrap();

    let board = restored.board().await;
    assert_eq!(board.total, 2);
    assert_eq!(board.lane(BoardColumn::Tendered).unwrap().count, 1);
    assert_eq!(board.lane(BoardColumn::AwaitingDriver).unwrap().count, 1);

    let load = restored.get(load_id).await.unwrap();
    assert_eq!(load.status, LoadStatus::Accepted);
    assert_eq!(load.awarded_carrier(), Some(carrier(0).as_str()));
}
