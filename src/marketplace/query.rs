//! Marketplace filter and sort parameters.
//!
//! All predicates are ANDed. Text predicates are case-insensitive
//! substring matches.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::types::{EquipmentType, Load};

// ---------------------------------------------------------------------------
// Distance buckets
// ---------------------------------------------------------------------------

/// Routed-distance range in miles. Lower bound inclusive, upper exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceBucket {
    #[serde(rename = "0-250")]
    Local,
    #[serde(rename = "250-500")]
    Regional,
    #[serde(rename = "500-1000")]
    LongHaul,
    #[serde(rename = "1000+")]
    Cross,
}

impl DistanceBucket {
    pub fn bounds(&self) -> (u32, Option<u32>) {
        match self {
            DistanceBucket::Local => (0, Some(250)),
            DistanceBucket::Regional => (250, Some(500)),
            DistanceBucket::LongHaul => (500, Some(1000)),
            DistanceBucket::Cross => (1000, None),
        }
    }

    pub fn contains(&self, miles: u32) -> bool {
        let (low, high) = self.bounds();
        miles >= low && high.map_or(true, |h| miles < h)
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// When the load was tendered.
    #[default]
    Posted,
    Pickup,
    Rate,
    Weight,
    Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Compare optional keys with `None` last in either direction.
fn cmp_present<T: Ord>(a: Option<T>, b: Option<T>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match order {
            SortOrder::Asc => a.cmp(&b),
            SortOrder::Desc => b.cmp(&a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadQuery {
    /// Free text over origin, destination, equipment, id, and reference.
    #[serde(default, rename = "q")]
    pub search: Option<String>,
    #[serde(default)]
    pub equipment: Option<EquipmentType>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub distance: Option<DistanceBucket>,
    /// Substring of the ISO pickup or delivery date, e.g. "2026-11".
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub sort: Option<SortKey>,
    #[serde(default)]
    pub order: Option<SortOrder>,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub per_page: Option<usize>,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.trim().to_lowercase())
}

fn blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.trim().is_empty())
}

impl LoadQuery {
    pub fn matches(&self, load: &Load) -> bool {
        if let Some(text) = blank(&self.search) {
            if !load.search_text().contains(&text.trim().to_lowercase()) {
                return false;
            }
        }

        if let Some(equipment) = self.equipment {
            if load.equipment != Some(equipment) {
                return false;
            }
        }

        if let Some(origin) = blank(&self.origin) {
            match &load.origin {
                Some(o) if contains_ci(&o.to_string(), origin) => {}
                _ => return false,
            }
        }

        if let Some(destination) = blank(&self.destination) {
            match &load.destination {
                Some(d) if contains_ci(&d.to_string(), destination) => {}
                _ => return false,
            }
        }

        if let Some(bucket) = self.distance {
            match load.distance_miles {
                Some(miles) if bucket.contains(miles) => {}
                _ => return false,
            }
        }

        if let Some(date) = blank(&self.date) {
            let date = date.trim();
            let hit = [&load.pickup, &load.delivery]
                .into_iter()
                .flatten()
                .any(|w| w.date.format("%Y-%m-%d").to_string().contains(date));
            if !hit {
                return false;
            }
        }

        true
    }

    /// Sort in place. Default: most recently posted first.
    pub fn sort(&self, loads: &mut [Load]) {
        let key = self.sort.unwrap_or_default();
        let order = self.order.unwrap_or(match key {
            SortKey::Posted => SortOrder::Desc,
            _ => SortOrder::Asc,
        });

        loads.sort_by(|a, b| {
            let primary = match key {
                SortKey::Posted => cmp_present(a.posted_at, b.posted_at, order),
                SortKey::Pickup => cmp_present(
                    a.pickup.as_ref().map(|w| w.date),
                    b.pickup.as_ref().map(|w| w.date),
                    order,
                ),
                SortKey::Rate => cmp_present(a.rate, b.rate, order),
                SortKey::Weight => cmp_present(a.weight_lbs, b.weight_lbs, order),
                SortKey::Distance => cmp_present(a.distance_miles, b.distance_miles, order),
            };
            primary.then_with(|| b.created_at.cmp(&a.created_at))
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
