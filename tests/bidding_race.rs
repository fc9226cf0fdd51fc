//! Concurrency tests for the bid ledger and load registry.
//!
//! Run on a multi-threaded runtime so contending tasks really interleave.

mod common;

use std::sync::Arc;

use futures::future::join_all;
use rust_decimal::Decimal;

use loadboard::bidding::OfferRequest;
use loadboard::error::MarketError;
use loadboard::lifecycle::TransitionRequest;
use loadboard::types::{Award, LoadStatus, OfferStatus};

use common::{carrier, market, shipper, tendered_load};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_have_exactly_one_winner() {
    let m = market(8);
    let load_id = tendered_load(&m.registry, "Dallas").await;

    let mut offer_ids = Vec::new();
    for i in 0..8 {
        let offer = m
            .ledger
            .place_offer(load_id, &carrier(i), OfferRequest::at(Decimal::from(1500 + i as i64)))
            .await
            .unwrap();
        offer_ids.push(offer.id);
    }

    let attempts = offer_ids.iter().map(|&offer_id| {
        let ledger = Arc::clone(&m.ledger);
        tokio::spawn(async move { ledger.accept_offer(load_id, offer_id, &shipper()).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    for result in &results {
        if let Err(e) = result {
            assert!(
                matches!(e, MarketError::AlreadyResolved { .. }),
                "loser got {e:?}"
            );
        }
    }

    let winner = winners[0];
    let offers = m.ledger.offers_for_load(load_id).await.unwrap();
    assert_eq!(
        offers.iter().filter(|o| o.status == OfferStatus::Accepted).count(),
        1
    );
    assert!(offers
        .iter()
        .filter(|o| o.id != winner.id)
        .all(|o| o.status == OfferStatus::Rejected));

    let load = m.registry.get(load_id).await.unwrap();
    assert_eq!(load.status, LoadStatus::Accepted);
    assert_eq!(
        load.award,
        Some(Award::WinningOffer {
            offer_id: winner.id,
            carrier_id: winner.carrier_id.clone(),
        })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bidders_all_get_pending_offers() {
    let m = market(32);
    let load_id = tendered_load(&m.registry, "Dallas").await;
    let version = m.registry.get(load_id).await.unwrap().version;

    let placements = (0..32).map(|i| {
        let ledger = Arc::clone(&m.ledger);
        tokio::spawn(async move {
            ledger
                .place_offer(load_id, &carrier(i), OfferRequest::at(Decimal::from(1200 + i as i64)))
                .await
        })
    });
    for joined in join_all(placements).await {
        let offer = joined.unwrap().unwrap();
        assert_eq!(offer.status, OfferStatus::Pending);
    }

    assert_eq!(m.ledger.offers_for_load(load_id).await.unwrap().len(), 32);
    // Placing offers never touches the load itself.
    let load = m.registry.get(load_id).await.unwrap();
    assert_eq!(load.version, version);
    assert_eq!(load.status, LoadStatus::Tendered);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_carrier_racing_itself_gets_one_offer() {
    let m = market(1);
    let load_id = tendered_load(&m.registry, "Dallas").await;

    let placements = (0..10).map(|i| {
        let ledger = Arc::clone(&m.ledger);
        tokio::spawn(async move {
            ledger
                .place_offer(load_id, &carrier(0), OfferRequest::at(Decimal::from(1000 + i)))
                .await
        })
    });
    let results: Vec<_> = join_all(placements)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, MarketError::DuplicateOffer { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn placing_while_accepting_never_leaves_stray_pending() {
    let m = market(16);
    let load_id = tendered_load(&m.registry, "Dallas").await;
    let first = m
        .ledger
        .place_offer(load_id, &carrier(0), OfferRequest::at(Decimal::from(1400)))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 1..16 {
        let ledger = Arc::clone(&m.ledger);
        tasks.push(tokio::spawn(async move {
            ledger
                .place_offer(load_id, &carrier(i), OfferRequest::at(Decimal::from(1400 + i as i64)))
                .await
                .map(|_| ())
        }));
    }
    let ledger = Arc::clone(&m.ledger);
    tasks.push(tokio::spawn(async move {
        ledger
            .accept_offer(load_id, first.id, &shipper())
            .await
            .map(|_| ())
    }));

    for joined in join_all(tasks).await {
        match joined.unwrap() {
            Ok(()) | Err(MarketError::LoadNotOpen { .. }) => {}
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }

    let offers = m.ledger.offers_for_load(load_id).await.unwrap();
    assert!(offers.iter().all(|o| o.status != OfferStatus::Pending));
    assert_eq!(m.ledger.accepted_count(load_id).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn offer_after_acceptance_is_rejected() {
    let m = market(2);
    let load_id = tendered_load(&m.registry, "Dallas").await;
    let offer = m
        .ledger
        .place_offer(load_id, &carrier(0), OfferRequest::at(Decimal::from(1500)))
        .await
        .unwrap();
    m.ledger
        .accept_offer(load_id, offer.id, &shipper())
        .await
        .unwrap();

    let err = m
        .ledger
        .place_offer(load_id, &carrier(1), OfferRequest::at(Decimal::from(1300)))
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::LoadNotOpen { status: LoadStatus::Accepted, .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stale_version_transitions_conflict() {
    let m = market(0);
    let load_id = tendered_load(&m.registry, "Dallas").await;
    let version = m.registry.get(load_id).await.unwrap().version;

    // Two clients both read `version`, then race a cancel.
    let attempts = (0..2).map(|_| {
        let registry = Arc::clone(&m.registry);
        tokio::spawn(async move {
            registry
                .transition(
                    load_id,
                    TransitionRequest::to(LoadStatus::Cancelled).at_version(version),
                    &shipper(),
                )
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(|r| r.err()).unwrap();
    assert!(err.is_retryable());
    assert!(matches!(err, MarketError::Conflict { expected, .. } if expected == version));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn assignment_and_acceptance_are_mutually_exclusive() {
    let m = market(4);
    for _ in 0..10 {
        let load_id = tendered_load(&m.registry, "Dallas").await;
        let offer = m
            .ledger
            .place_offer(load_id, &carrier(0), OfferRequest::at(Decimal::from(1500)))
            .await
            .unwrap();

        let ledger = Arc::clone(&m.ledger);
        let accept =
            tokio::spawn(async move { ledger.accept_offer(load_id, offer.id, &shipper()).await });
        let registry = Arc::clone(&m.registry);
        let assign = tokio::spawn(async move {
            registry
                .assign_driver(load_id, "driver-7", &shipper(), None)
                .await
        });

        let accepted = accept.await.unwrap().is_ok();
        let assigned = assign.await.unwrap().is_ok();
        assert!(accepted ^ assigned, "exactly one path may win");

        let load = m.registry.get(load_id).await.unwrap();
        match load.award {
            Some(Award::WinningOffer { .. }) => assert!(accepted),
            Some(Award::DirectAssignment { .. }) => {
                assert!(assigned);
                assert_eq!(m.ledger.accepted_count(load_id).await.unwrap(), 0);
            }
            None => panic!("accepted load without an award"),
        }
    }
}
