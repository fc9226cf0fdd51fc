//! Typed marketplace errors.
//!
//! Every rejection a caller can recover from is a variant here. Only
//! `Store` is fatal: it wraps a collaborator failure unchanged.

use std::collections::BTreeSet;

use thiserror::Error;
use uuid::Uuid;

use crate::types::{IneligibleReason, LoadStatus, OfferStatus};

pub type Result<T> = std::result::Result<T, MarketError>;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid transition {from} -> {to}: {reason}")]
    InvalidTransition {
        from: LoadStatus,
        to: LoadStatus,
        reason: String,
    },

    #[error("Version conflict on load {load_id}: expected {expected}, found {actual}")]
    Conflict {
        load_id: Uuid,
        expected: u64,
        actual: u64,
    },

    /// The load left `tendered`, or the offer itself is no longer
    /// pending (`offer` then carries the offer's status).
    #[error("Load {load_id} already resolved (status: {status}){}", offer_suffix(.offer))]
    AlreadyResolved {
        load_id: Uuid,
        status: LoadStatus,
        offer: Option<OfferStatus>,
    },

    #[error("Carrier {carrier_id} is not eligible: {reason}")]
    NotEligible {
        carrier_id: String,
        reason: IneligibleReason,
        missing_consent_ids: BTreeSet<String>,
    },

    #[error("Carrier {carrier_id} already holds offer {offer_id} on load {load_id}")]
    DuplicateOffer {
        load_id: Uuid,
        carrier_id: String,
        offer_id: Uuid,
    },

    #[error("Load {load_id} is not open for bidding (status: {status})")]
    LoadNotOpen { load_id: Uuid, status: LoadStatus },

    #[error("Invalid offer: {0}")]
    InvalidOffer(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Store unavailable: {0}")]
    Store(#[source] anyhow::Error),
}

fn offer_suffix(offer: &Option<OfferStatus>) -> String {
    match offer {
        Some(status) => format!("; offer is {status}"),
        None => String::new(),
    }
}

impl MarketError {
    pub fn load_resolved(load_id: Uuid, status: LoadStatus) -> Self {
        MarketError::AlreadyResolved {
            load_id,
            status,
            offer: None,
        }
    }

    pub fn offer_resolved(load_id: Uuid, status: LoadStatus, offer: OfferStatus) -> Self {
        MarketError::AlreadyResolved {
            load_id,
            status,
            offer: Some(offer),
        }
    }

    pub fn load_not_found(id: Uuid) -> Self {
        MarketError::NotFound {
            entity: "load",
            id: id.to_string(),
        }
    }

    pub fn offer_not_found(id: Uuid) -> Self {
        MarketError::NotFound {
            entity: "offer",
            id: id.to_string(),
        }
    }

    /// Stable machine-readable kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            MarketError::NotFound { .. } => "not_found",
            MarketError::InvalidTransition { .. } => "invalid_transition",
            MarketError::Conflict { .. } => "conflict",
            MarketError::AlreadyResolved { .. } => "already_resolved",
            MarketError::NotEligible { .. } => "not_eligible",
            MarketError::DuplicateOffer { .. } => "duplicate_offer",
            MarketError::LoadNotOpen { .. } => "load_not_open",
            MarketError::InvalidOffer(_) => "invalid_offer",
            MarketError::Forbidden(_) => "forbidden",
            MarketError::Store(_) => "store_unavailable",
        }
    }

    /// Whether the caller should refetch and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MarketError::Conflict { .. })
    }
}
