//! In-memory carrier directory.
//!
//! Mirrors the onboarding-score and consent services locally. The API's
//! webhook endpoints feed it; the evaluator reads it through the
//! collaborator traits like it would the real services.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ConsentDirectory, OnboardingScores};
use crate::types::CarrierId;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CarrierRecord {
    pub score: u8,
    pub signed: BTreeSet<String>,
}

#[derive(Default)]
pub struct InMemoryDirectory {
    carriers: DashMap<CarrierId, CarrierRecord>,
    required: RwLock<BTreeSet<String>>,
}

impl InMemoryDirectory {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            carriers: DashMap::new(),
            required: RwLock::new(required.into_iter().map(Into::into).collect()),
        }
    }

    pub fn set_score(&self, carrier_id: &str, score: u8) {
        self.carriers
            .entry(carrier_id.to_string())
            .or_default()
            .score = score.min(100);
        debug!(carrier_id, score, "Onboarding score updated");
    }

    pub fn sign_consent(&self, carrier_id: &str, consent_id: &str) {
        self.carriers
            .entry(carrier_id.to_string())
            .or_default()
            .signed
            .insert(consent_id.to_string());
        debug!(carrier_id, consent_id, "Consent signed");
    }

    /// Returns whether the consent had been signed.
    pub fn revoke_consent(&self, carrier_id: &str, consent_id: &str) -> bool {
        self.carriers
            .get_mut(carrier_id)
            .map(|mut record| record.signed.remove(consent_id))
            .unwrap_or(false)
    }

    pub async fn set_required<I, S>(&self, required: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.required.write().await = required.into_iter().map(Into::into).collect();
    }

    pub fn record(&self, carrier_id: &str) -> Option<CarrierRecord> {
        self.carriers.get(carrier_id).map(|r| r.value().clone())
    }
}

#[async_trait]
impl OnboardingScores for InMemoryDirectory {
    /// Unknown carriers have not started onboarding: score 0.
    async fn score(&self, carrier_id: &str) -> Result<u8> {
        Ok(self.carriers.get(carrier_id).map(|r| r.score).unwrap_or(0))
    }
}

#[async_trait]
impl ConsentDirectory for InMemoryDirectory {
    async fn signed_consents(&self, carrier_id: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .carriers
            .get(carrier_id)
            .map(|r| r.signed.clone())
            .unwrap_or_default())
    }

    async fn required_consents(&self) -> Result<BTreeSet<String>> {
        Ok(self.required.read().await.clone())
    }
}
