//! Marketplace query service: what an eligible carrier sees.
//!
//! Read-only search over tendered loads. Access control runs first: an
//! ineligible carrier gets an empty listing no matter the filters.

pub mod query;

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::eligibility::EligibilityEvaluator;
use crate::error::Result;
use crate::lifecycle::LoadRegistry;
use crate::types::{Eligibility, Load, LoadStatus};

pub use query::{DistanceBucket, LoadQuery, SortKey, SortOrder};

#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            default_page_size: 25,
            max_page_size: 100,
        }
    }
}

/// One page of marketplace results plus the caller's verdict.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub eligibility: Eligibility,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub loads: Vec<Load>,
}

pub struct MarketplaceService {
    registry: Arc<LoadRegistry>,
    eligibility: Arc<EligibilityEvaluator>,
    config: MarketplaceConfig,
}

impl MarketplaceService {
    pub fn new(
        registry: Arc<LoadRegistry>,
        eligibility: Arc<EligibilityEvaluator>,
        config: MarketplaceConfig,
    ) -> Self {
        Self {
            registry,
            eligibility,
            config,
        }
    }

    /// Tendered loads visible to `carrier_id`, filtered, sorted, paged.
    ///
    /// Entering the marketplace always revalidates eligibility.
    pub async fn list(&self, carrier_id: &str, query: &LoadQuery) -> Result<Listing> {
        let verdict = self.eligibility.revalidate(carrier_id).await?;
        let per_page = query
            .per_page
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size.max(1));
        let page = query.page.unwrap_or(1).max(1);

        if !verdict.eligible {
            info!(carrier_id, reason = ?verdict.reason, "Marketplace hidden from ineligible carrier");
            return Ok(Listing {
                eligibility: verdict,
                total: 0,
                page,
                per_page,
                loads: Vec::new(),
            });
        }

        let mut loads: Vec<Load> = self
            .registry
            .loads_with_status(LoadStatus::Tendered)
            .await
            .into_iter()
            .filter(|load| query.matches(load))
            .collect();
        query.sort(&mut loads);

        let total = loads.len();
        let loads: Vec<Load> = loads
            .into_iter()
            .skip(page.saturating_sub(1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        debug!(carrier_id, total, page, returned = loads.len(), "Marketplace listing");
        Ok(Listing {
            eligibility: verdict,
            total,
            page,
            per_page,
            loads,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
