//! Eligibility evaluator: marketplace gating per carrier.
//!
//! A carrier may bid iff its onboarding score meets the configured
//! threshold and it has signed every required consent. Both inputs are
//! owned by external services behind the [`OnboardingScores`] and
//! [`ConsentDirectory`] traits.
//!
//! Revalidation policy: eligible verdicts are cached for a short TTL;
//! ineligible verdicts are never cached, so a carrier that fixes its
//! gating state is let in on the very next evaluation.

pub mod directory;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{MarketError, Result};
use crate::types::{CarrierId, Eligibility};

pub use directory::InMemoryDirectory;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Onboarding-score service: 0–100 completion score per carrier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OnboardingScores: Send + Sync {
    async fn score(&self, carrier_id: &str) -> AnyResult<u8>;
}

/// Consent/document service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsentDirectory: Send + Sync {
    /// Consent ids the carrier has signed.
    async fn signed_consents(&self, carrier_id: &str) -> AnyResult<BTreeSet<String>>;

    /// Consent ids every carrier must sign.
    async fn required_consents(&self) -> AnyResult<BTreeSet<String>>;
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EligibilityPolicy {
    /// Minimum onboarding score (inclusive).
    pub threshold: u8,
    /// How long an eligible verdict may be reused.
    pub cache_ttl: Duration,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self {
            threshold: 60,
            cache_ttl: Duration::seconds(300),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

pub struct EligibilityEvaluator {
    scores: Arc<dyn OnboardingScores>,
    consents: Arc<dyn ConsentDirectory>,
    policy: EligibilityPolicy,
    cache: DashMap<CarrierId, Eligibility>,
}

impl EligibilityEvaluator {
    pub fn new(
        scores: Arc<dyn OnboardingScores>,
        consents: Arc<dyn ConsentDirectory>,
        policy: EligibilityPolicy,
    ) -> Self {
        Self {
            scores,
            consents,
            policy,
            cache: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &EligibilityPolicy {
        &self.policy
    }

    /// Verdict for `carrier_id`, reusing a fresh eligible verdict if cached.
    pub async fn evaluate(&self, carrier_id: &str) -> Result<Eligibility> {
        if let Some(cached) = self.cached(carrier_id) {
            debug!(carrier_id, "Eligibility served from cache");
            return Ok(cached);
        }
        self.revalidate(carrier_id).await
    }

    /// Fetch fresh inputs and recompute, bypassing the cache.
    pub async fn revalidate(&self, carrier_id: &str) -> Result<Eligibility> {
        let (score, signed, required) = tokio::try_join!(
            self.scores.score(carrier_id),
            self.consents.signed_consents(carrier_id),
            self.consents.required_consents(),
        )
        .map_err(MarketError::Store)?;

        let verdict = Eligibility::compute(
            carrier_id,
            score.min(100),
            self.policy.threshold,
            &signed,
            &required,
        );

        if verdict.eligible {
            self.cache.insert(carrier_id.to_string(), verdict.clone());
        } else {
            self.cache.remove(carrier_id);
        }

        info!(
            carrier_id,
            eligible = verdict.eligible,
            score = verdict.score,
            reason = ?verdict.reason,
            missing = verdict.missing_consent_ids.len(),
            "Eligibility evaluated"
        );
        Ok(verdict)
    }

    /// Drop a cached verdict (e.g. a consent was revoked).
    pub fn invalidate(&self, carrier_id: &str) {
        self.cache.remove(carrier_id);
    }

    /// Evict every verdict older than the TTL. Returns how many were dropped.
    pub fn prune_expired(&self) -> usize {
        let before = self.cache.len();
        let cutoff = Utc::now() - self.policy.cache_ttl;
        self.cache.retain(|_, v| v.evaluated_at > cutoff);
        before.saturating_sub(self.cache.len())
    }

    /// Revalidate and turn an ineligible verdict into `NotEligible`.
    ///
    /// Gates offer placement, so it never trusts the cache.
    pub async fn require_eligible(&self, carrier_id: &str) -> Result<Eligibility> {
        let verdict = self.revalidate(carrier_id).await?;
        match verdict.reason {
            None => Ok(verdict),
            Some(reason) => Err(MarketError::NotEligible {
                carrier_id: carrier_id.to_string(),
                reason,
                missing_consent_ids: verdict.missing_consent_ids,
            }),
        }
    }

    fn cached(&self, carrier_id: &str) -> Option<Eligibility> {
        let entry = self.cache.get(carrier_id)?;
        let fresh = Utc::now() - entry.evaluated_at < self.policy.cache_ttl;
        fresh.then(|| entry.value().clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IneligibleReason;
    use std::sync::atomic::{AtomicU8, Ordering};

    fn consents(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn consent_mock(signed: &[&str], required: &[&str]) -> MockConsentDirectory {
        let signed = consents(signed);
        let required = consents(required);
        let mut mock = MockConsentDirectory::new();
        mock.expect_signed_consents()
            .returning(move |_| Ok(signed.clone()));
        mock.expect_required_consents()
            .returning(move || Ok(required.clone()));
        mock
    }

    fn evaluator(
        scores: impl OnboardingScores + 'static,
        consents: impl ConsentDirectory + 'static,
    ) -> EligibilityEvaluator {
        EligibilityEvaluator::new(
            Arc::new(scores),
            Arc::new(consents),
            EligibilityPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_score_below_threshold_then_raised() {
        let score = Arc::new(AtomicU8::new(59));
        let shared = Arc::clone(&score);
        let mut scores = MockOnboardingScores::new();
        scores
            .expect_score()
            .returning(move |_| Ok(shared.load(Ordering::SeqCst)));

        let eval = evaluator(scores, consent_mock(&["w9"], &["w9"]));

        let verdict = eval.evaluate("carrier-1").await.unwrap();
        assert!(!verdict.eligible);
        assert_eq!(verdict.reason, Some(IneligibleReason::ScoreTooLow));

        score.store(60, Ordering::SeqCst);
        let verdict = eval.evaluate("carrier-1").await.unwrap();
        assert!(verdict.eligible);
        assert_eq!(verdict.reason, None);
    }

    #[tokio::test]
    async fn test_eligible_verdict_is_cached() {
        let mut scores = MockOnboardingScores::new();
        scores.expect_score().times(1).returning(|_| Ok(95));
        let eval = evaluator(scores, consent_mock(&["w9"], &["w9"]));

        assert!(eval.evaluate("carrier-1").await.unwrap().eligible);
        assert!(eval.evaluate("carrier-1").await.unwrap().eligible);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let mut scores = MockOnboardingScores::new();
        scores.expect_score().times(2).returning(|_| Ok(95));
        let eval = evaluator(scores, consent_mock(&[], &[]));

        eval.evaluate("carrier-1").await.unwrap();
        eval.invalidate("carrier-1");
        eval.evaluate("carrier-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_consents_reported() {
        let mut scores = MockOnboardingScores::new();
        scores.expect_score().returning(|_| Ok(80));
        let eval = evaluator(
            scores,
            consent_mock(&["w9"], &["w9", "carrier-agreement", "insurance"]),
        );

        let err = eval.require_eligible("carrier-1").await.unwrap_err();
        match err {
            MarketError::NotEligible {
                reason,
                missing_consent_ids,
                ..
            } => {
                assert_eq!(reason, IneligibleReason::MissingConsents);
                assert_eq!(missing_consent_ids, consents(&["carrier-agreement", "insurance"]));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_require_eligible_ignores_cached_verdict() {
        let score = Arc::new(AtomicU8::new(90));
        let shared = Arc::clone(&score);
        let mut scores = MockOnboardingScores::new();
        scores
            .expect_score()
            .returning(move |_| Ok(shared.load(Ordering::SeqCst)));
        let eval = evaluator(scores, consent_mock(&["w9"], &["w9"]));

        assert!(eval.evaluate("carrier-1").await.unwrap().eligible);
        score.store(10, Ordering::SeqCst);

        // The cached verdict is still eligible; the gate is not.
        assert!(eval.evaluate("carrier-1").await.unwrap().eligible);
        let err = eval.require_eligible("carrier-1").await.unwrap_err();
        assert!(matches!(
            err,
            MarketError::NotEligible { reason: IneligibleReason::ScoreTooLow, .. }
        ));
    }

    #[tokio::test]
    async fn test_collaborator_failure_is_store_error() {
        let mut scores = MockOnboardingScores::new();
        scores
            .expect_score()
            .returning(|_| Err(anyhow::anyhow!("onboarding service unreachable")));
        let eval = evaluator(scores, consent_mock(&[], &[]));

        let err = eval.evaluate("carrier-1").await.unwrap_err();
        assert!(matches!(err, MarketError::Store(_)));
    }

    #[tokio::test]
    async fn test_score_clamped_to_hundred() {
        let mut scores = MockOnboardingScores::new();
        scores.expect_score().returning(|_| Ok(250));
        let eval = evaluator(scores, consent_mock(&[], &[]));
        assert_eq!(eval.evaluate("carrier-1").await.unwrap().score, 100);
    }

    #[tokio::test]
    async fn test_prune_expired_with_zero_ttl() {
        let mut scores = MockOnboardingScores::new();
        scores.expect_score().returning(|_| Ok(95));
        let eval = EligibilityEvaluator::new(
            Arc::new(scores),
            Arc::new(consent_mock(&[], &[])),
            EligibilityPolicy {
                threshold: 60,
                cache_ttl: Duration::zero(),
            },
        );
        eval.revalidate("carrier-1").await.unwrap();
        assert_eq!(eval.prune_expired(), 1);
    }
}
