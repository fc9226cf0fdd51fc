//! API route handlers.
//!
//! Handlers are thin: decode, call the owning service, encode. Every
//! failure is a [`MarketError`] and maps to a status code in one place.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::bidding::OfferRequest;
use crate::error::{MarketError, Result};
use crate::lifecycle::{BoardView, TransitionRequest};
use crate::marketplace::{Listing, LoadQuery};
use crate::storage::Snapshot;
use crate::types::{
    Actor, CarrierId, DriverId, Eligibility, ExitArtifact, Load, LoadDetails, LoadId, LoadStatus,
    Offer, OfferId, ShipperId,
};

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let status = match &self {
            MarketError::NotFound { .. } => StatusCode::NOT_FOUND,
            MarketError::InvalidTransition { .. } | MarketError::InvalidOffer(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            MarketError::Conflict { .. }
            | MarketError::AlreadyResolved { .. }
            | MarketError::DuplicateOffer { .. }
            | MarketError::LoadNotOpen { .. } => StatusCode::CONFLICT,
            MarketError::NotEligible { .. } | MarketError::Forbidden(_) => StatusCode::FORBIDDEN,
            MarketError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let mut body = json!({
            "kind": self.kind(),
            "message": self.to_string(),
            "retryable": self.is_retryable(),
        });
        match &self {
            MarketError::NotEligible {
                reason,
                missing_consent_ids,
                ..
            } => {
                body["reason"] = json!(reason);
                body["missing_consent_ids"] = json!(missing_consent_ids);
            }
            MarketError::Store(e) => error!(error = ?e, "Collaborator failure"),
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateLoadBody {
    pub shipper_id: ShipperId,
    pub actor: Actor,
    #[serde(default)]
    pub details: LoadDetails,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLoadBody {
    pub actor: Actor,
    #[serde(default)]
    pub expected_version: Option<u64>,
    pub details: LoadDetails,
}

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    pub actor: Actor,
    pub target: LoadStatus,
    #[serde(default)]
    pub expected_version: Option<u64>,
    #[serde(default)]
    pub artifact: Option<ExitArtifact>,
}

impl TransitionBody {
    fn request(&self) -> TransitionRequest {
        TransitionRequest {
            target: self.target,
            expected_version: self.expected_version,
            artifact: self.artifact,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignBody {
    pub actor: Actor,
    pub driver_id: DriverId,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmDriverBody {
    pub actor: Actor,
    pub driver_id: DriverId,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOfferBody {
    pub carrier_id: CarrierId,
    pub rate: Decimal,
    #[serde(default)]
    pub eta: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptBody {
    pub actor: Actor,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawBody {
    pub carrier_id: CarrierId,
}

#[derive(Debug, Deserialize)]
pub struct LoadListParams {
    #[serde(default)]
    pub status: Option<LoadStatus>,
}

#[derive(Debug, Deserialize)]
pub struct OfferListParams {
    /// Pending offers cheapest first. Display only.
    #[serde(default)]
    pub ranked: bool,
}

#[derive(Debug, Deserialize)]
pub struct CarrierParam {
    pub carrier_id: CarrierId,
}

#[derive(Debug, Deserialize)]
pub struct ScoreBody {
    pub score: u8,
}

#[derive(Debug, Deserialize)]
pub struct ConsentBody {
    pub consent_id: String,
    #[serde(default = "default_signed")]
    pub signed: bool,
}

fn default_signed() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub loads: usize,
}

// ---------------------------------------------------------------------------
// Load handlers
// ---------------------------------------------------------------------------

/// POST /api/loads
pub async fn create_load(
    State(state): State<AppState>,
    Json(body): Json<CreateLoadBody>,
) -> Result<(StatusCode, Json<Load>)> {
    let load = state
        .registry
        .create_draft(&body.shipper_id, body.details, &body.actor)
        .await?;
    Ok((StatusCode::CREATED, Json(load)))
}

/// GET /api/loads
pub async fn list_loads(
    State(state): State<AppState>,
    Query(params): Query<LoadListParams>,
) -> Json<Vec<Load>> {
    let loads = match params.status {
        Some(status) => state.registry.loads_with_status(status).await,
        None => state.registry.list().await,
    };
    Json(loads)
}

/// GET /api/loads/:id
pub async fn get_load(
    State(state): State<AppState>,
    Path(id): Path<LoadId>,
) -> Result<Json<Load>> {
    Ok(Json(state.registry.get(id).await?))
}

/// PUT /api/loads/:id
pub async fn update_load(
    State(state): State<AppState>,
    Path(id): Path<LoadId>,
    Json(body): Json<UpdateLoadBody>,
) -> Result<Json<Load>> {
    let load = state
        .registry
        .update_draft(id, body.details, &body.actor, body.expected_version)
        .await?;
    Ok(Json(load))
}

/// POST /api/loads/:id/transition
pub async fn transition_load(
    State(state): State<AppState>,
    Path(id): Path<LoadId>,
    Json(body): Json<TransitionBody>,
) -> Result<Json<Load>> {
    let load = state
        .registry
        .transition(id, body.request(), &body.actor)
        .await?;
    Ok(Json(load))
}

/// POST /api/loads/:id/assign
pub async fn assign_driver(
    State(state): State<AppState>,
    Path(id): Path<LoadId>,
    Json(body): Json<AssignBody>,
) -> Result<Json<Load>> {
    let load = state
        .registry
        .assign_driver(id, &body.driver_id, &body.actor, body.expected_version)
        .await?;
    Ok(Json(load))
}

/// POST /api/loads/:id/confirm-driver
pub async fn confirm_driver(
    State(state): State<AppState>,
    Path(id): Path<LoadId>,
    Json(body): Json<ConfirmDriverBody>,
) -> Result<Json<Load>> {
    let load = state
        .registry
        .confirm_driver(id, &body.driver_id, &body.actor)
        .await?;
    Ok(Json(load))
}

// ---------------------------------------------------------------------------
// Offer handlers
// ---------------------------------------------------------------------------

/// POST /api/loads/:id/offers
pub async fn place_offer(
    State(state): State<AppState>,
    Path(id): Path<LoadId>,
    Json(body): Json<PlaceOfferBody>,
) -> Result<(StatusCode, Json<Offer>)> {
    let request = OfferRequest {
        rate: body.rate,
        eta: body.eta,
        notes: body.notes,
    };
    let offer = state.ledger.place_offer(id, &body.carrier_id, request).await?;
    Ok((StatusCode::CREATED, Json(offer)))
}

/// GET /api/loads/:id/offers
pub async fn list_offers(
    State(state): State<AppState>,
    Path(id): Path<LoadId>,
    Query(params): Query<OfferListParams>,
) -> Result<Json<Vec<Offer>>> {
    let offers = if params.ranked {
        state.ledger.advisory_ranking(id).await?
    } else {
        state.ledger.offers_for_load(id).await?
    };
    Ok(Json(offers))
}

/// POST /api/loads/:id/offers/:offer_id/accept
pub async fn accept_offer(
    State(state): State<AppState>,
    Path((id, offer_id)): Path<(LoadId, OfferId)>,
    Json(body): Json<AcceptBody>,
) -> Result<Json<Offer>> {
    let offer = state.ledger.accept_offer(id, offer_id, &body.actor).await?;
    Ok(Json(offer))
}

/// POST /api/loads/:id/offers/:offer_id/withdraw
pub async fn withdraw_offer(
    State(state): State<AppState>,
    Path((id, offer_id)): Path<(LoadId, OfferId)>,
    Json(body): Json<WithdrawBody>,
) -> Result<Json<Offer>> {
    let offer = state
        .ledger
        .withdraw_offer(id, offer_id, &body.carrier_id)
        .await?;
    Ok(Json(offer))
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// GET /api/board
pub async fn get_board(State(state): State<AppState>) -> Json<BoardView> {
    Json(state.registry.board().await)
}

/// GET /api/marketplace?carrier_id=...
pub async fn get_marketplace(
    State(state): State<AppState>,
    Query(carrier): Query<CarrierParam>,
    Query(query): Query<LoadQuery>,
) -> Result<Json<Listing>> {
    let listing = state.marketplace.list(&carrier.carrier_id, &query).await?;
    Ok(Json(listing))
}

// ---------------------------------------------------------------------------
// Carrier handlers
// ---------------------------------------------------------------------------

/// GET /api/carriers/:id/eligibility
pub async fn get_eligibility(
    State(state): State<AppState>,
    Path(carrier_id): Path<CarrierId>,
) -> Result<Json<Eligibility>> {
    Ok(Json(state.eligibility.evaluate(&carrier_id).await?))
}

/// GET /api/carriers/:id/offers
pub async fn carrier_offers(
    State(state): State<AppState>,
    Path(carrier_id): Path<CarrierId>,
) -> Json<Vec<Offer>> {
    Json(state.ledger.offers_for_carrier(&carrier_id).await)
}

/// PUT /api/carriers/:id/score
///
/// Onboarding-score webhook. Returns the fresh verdict.
pub async fn update_score(
    State(state): State<AppState>,
    Path(carrier_id): Path<CarrierId>,
    Json(body): Json<ScoreBody>,
) -> Result<Json<Eligibility>> {
    state.directory.set_score(&carrier_id, body.score.min(100));
    state.eligibility.invalidate(&carrier_id);
    info!(carrier_id = %carrier_id, score = body.score, "Onboarding score updated");
    Ok(Json(state.eligibility.revalidate(&carrier_id).await?))
}

/// POST /api/carriers/:id/consents
///
/// Consent webhook: sign (default) or revoke one consent.
pub async fn update_consent(
    State(state): State<AppState>,
    Path(carrier_id): Path<CarrierId>,
    Json(body): Json<ConsentBody>,
) -> Result<Json<Eligibility>> {
    if body.signed {
        state.directory.sign_consent(&carrier_id, &body.consent_id);
    } else {
        state.directory.revoke_consent(&carrier_id, &body.consent_id);
    }
    state.eligibility.invalidate(&carrier_id);
    info!(
        carrier_id = %carrier_id,
        consent_id = %body.consent_id,
        signed = body.signed,
        "Consent updated"
    );
    Ok(Json(state.eligibility.revalidate(&carrier_id).await?))
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

/// GET /api/export
pub async fn export_snapshot(State(state): State<AppState>) -> Json<Snapshot> {
    Json(Snapshot::capture(&state.registry).await)
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            loads: state.registry.len(),
        }),
    )
}
