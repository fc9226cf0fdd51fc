//! HTTP API: Axum server over the registry, ledger, and marketplace.
//!
//! Every endpoint speaks JSON. Callers identify themselves in the request
//! (an `actor` in bodies, `carrier_id` for carrier-facing reads); identity
//! is trusted here. CORS is open for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::bidding::BidLedger;
use crate::config::AppConfig;
use crate::eligibility::{EligibilityEvaluator, InMemoryDirectory};
use crate::lifecycle::{EventBus, LoadRegistry};
use crate::marketplace::MarketplaceService;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything a handler can reach.
pub struct AppContext {
    pub registry: Arc<LoadRegistry>,
    pub ledger: BidLedger,
    pub marketplace: MarketplaceService,
    pub eligibility: Arc<EligibilityEvaluator>,
    /// Backs both eligibility collaborators; written by the score and
    /// consent webhooks.
    pub directory: Arc<InMemoryDirectory>,
}

pub type AppState = Arc<AppContext>;

impl AppContext {
    /// Wire the services up from configuration.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let directory = Arc::new(InMemoryDirectory::new(
            cfg.eligibility.required_consents.iter().cloned(),
        ));
        let eligibility = Arc::new(EligibilityEvaluator::new(
            directory.clone(),
            directory.clone(),
            cfg.eligibility.policy(),
        ));
        let registry = Arc::new(LoadRegistry::new(EventBus::new(
            cfg.events.channel_capacity,
        )));

        Self {
            ledger: BidLedger::new(registry.clone(), eligibility.clone()),
            marketplace: MarketplaceService::new(
                registry.clone(),
                eligibility.clone(),
                cfg.marketplace.to_config(),
            ),
            registry,
            eligibility,
            directory,
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Start the API server in a background task.
pub fn spawn_api(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state)?;

    tokio::spawn(async move {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        info!(port, "API server starting on http://localhost:{port}");

        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(port, error = %e, "Failed to bind API port");
                return;
            }
        };

        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server error");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Result<Router> {
    let origin = "*"
        .parse::<HeaderValue>()
        .context("Invalid CORS origin")?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE]);

    let router = Router::new()
        // Loads
        .route(
            "/api/loads",
            get(routes::list_loads).post(routes::create_load),
        )
        .route(
            "/api/loads/:id",
            get(routes::get_load).put(routes::update_load),
        )
        .route("/api/loads/:id/transition", post(routes::transition_load))
        .route("/api/loads/:id/assign", post(routes::assign_driver))
        .route("/api/loads/:id/confirm-driver", post(routes::confirm_driver))
        // Offers
        .route(
            "/api/loads/:id/offers",
            get(routes::list_offers).post(routes::place_offer),
        )
        .route(
            "/api/loads/:id/offers/:offer_id/accept",
            post(routes::accept_offer),
        )
        .route(
            "/api/loads/:id/offers/:offer_id/withdraw",
            post(routes::withdraw_offer),
        )
        // Views
        .route("/api/board", get(routes::get_board))
        .route("/api/marketplace", get(routes::get_marketplace))
        // Carriers
        .route(
            "/api/carriers/:id/eligibility",
            get(routes::get_eligibility),
        )
        .route("/api/carriers/:id/offers", get(routes::carrier_offers))
        .route("/api/carriers/:id/score", put(routes::update_score))
        .route("/api/carriers/:id/consents", post(routes::update_consent))
        .route("/api/export", get(routes::export_snapshot))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state);

    Ok(router)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
