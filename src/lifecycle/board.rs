//! Board index: status-keyed secondary index for kanban display.
//!
//! Derived from the registry, never authoritative. The registry upserts a
//! card on every committed mutation while still holding the load's write
//! lock, so a board read is one consistent snapshot without touching any
//! load lock.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::types::{DriverId, EquipmentType, Load, LoadId, LoadStatus, ShipperId};

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// Board column. `accepted` is split by driver confirmation; both lanes
/// are the same underlying status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardColumn {
    Draft,
    Tendered,
    AwaitingDriver,
    DriverConfirmed,
    InTransit,
    Delivered,
    Completed,
    Cancelled,
}

impl BoardColumn {
    pub const ALL: &'static [BoardColumn] = &[
        BoardColumn::Draft,
        BoardColumn::Tendered,
        BoardColumn::AwaitingDriver,
        BoardColumn::DriverConfirmed,
        BoardColumn::InTransit,
        BoardColumn::Delivered,
        BoardColumn::Completed,
        BoardColumn::Cancelled,
    ];

    pub fn of(load: &Load) -> Self {
        match load.status {
            LoadStatus::Draft => BoardColumn::Draft,
            LoadStatus::Tendered => BoardColumn::Tendered,
            LoadStatus::Accepted => match &load.driver {
                Some(d) if d.confirmed => BoardColumn::DriverConfirmed,
                _ => BoardColumn::AwaitingDriver,
            },
            LoadStatus::InTransit => BoardColumn::InTransit,
            LoadStatus::Delivered => BoardColumn::Delivered,
            LoadStatus::Completed => BoardColumn::Completed,
            LoadStatus::Cancelled => BoardColumn::Cancelled,
        }
    }

    pub fn status(&self) -> LoadStatus {
        match self {
            BoardColumn::Draft => LoadStatus::Draft,
            BoardColumn::Tendered => LoadStatus::Tendered,
            BoardColumn::AwaitingDriver | BoardColumn::DriverConfirmed => LoadStatus::Accepted,
            BoardColumn::InTransit => LoadStatus::InTransit,
            BoardColumn::Delivered => LoadStatus::Delivered,
            BoardColumn::Completed => LoadStatus::Completed,
            BoardColumn::Cancelled => LoadStatus::Cancelled,
        }
    }
}

// ---------------------------------------------------------------------------
// Cards & view
// ---------------------------------------------------------------------------

/// Display summary of one load on the board.
#[derive(Debug, Clone, Serialize)]
pub struct LoadCard {
    pub id: LoadId,
    pub shipper_id: ShipperId,
    pub origin: String,
    pub destination: String,
    pub pickup_date: Option<NaiveDate>,
    pub equipment: Option<EquipmentType>,
    pub rate: Option<Decimal>,
    pub status: LoadStatus,
    pub driver_id: Option<DriverId>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl LoadCard {
    pub fn from_load(load: &Load) -> Self {
        let place = |l: &Option<crate::types::Location>| {
            l.as_ref().map(|l| l.to_string()).unwrap_or_default()
        };
        Self {
            id: load.id,
            shipper_id: load.shipper_id.clone(),
            origin: place(&load.origin),
            destination: place(&load.destination),
            pickup_date: load.pickup.as_ref().map(|w| w.date),
            equipment: load.equipment,
            rate: load.rate,
            status: load.status,
            driver_id: load.driver_id().map(String::from),
            version: load.version,
            updated_at: load.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardLane {
    pub column: BoardColumn,
    pub status: LoadStatus,
    pub count: usize,
    pub loads: Vec<LoadCard>,
}

/// Board projection: every column in display order, cards newest first.
#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    pub lanes: Vec<BoardLane>,
    pub total: usize,
}

impl BoardView {
    pub fn lane(&self, column: BoardColumn) -> Option<&BoardLane> {
        self.lanes.iter().find(|l| l.column == column)
    }
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Columns {
    lanes: BTreeMap<BoardColumn, BTreeMap<LoadId, LoadCard>>,
    placement: HashMap<LoadId, BoardColumn>,
}

#[derive(Default)]
pub struct BoardIndex {
    inner: RwLock<Columns>,
}

impl BoardIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place or move `load`'s card into its current column.
    pub async fn upsert(&self, load: &Load) {
        let column = BoardColumn::of(load);
        let mut inner = self.inner.write().await;
        if let Some(previous) = inner.placement.insert(load.id, column) {
            if previous != column {
                if let Some(lane) = inner.lanes.get_mut(&previous) {
                    lane.remove(&load.id);
                }
            }
        }
        inner
            .lanes
            .entry(column)
            .or_default()
            .insert(load.id, LoadCard::from_load(load));
    }

    /// Ids currently placed under `status` (any sub-column).
    pub async fn ids_with_status(&self, status: LoadStatus) -> Vec<LoadId> {
        let inner = self.inner.read().await;
        BoardColumn::ALL
            .iter()
            .filter(|c| c.status() == status)
            .filter_map(|c| inner.lanes.get(c))
            .flat_map(|lane| lane.keys().copied())
            .collect()
    }

    pub async fn counts(&self) -> BTreeMap<LoadStatus, usize> {
        let inner = self.inner.read().await;
        let mut counts = BTreeMap::new();
        for (column, lane) in &inner.lanes {
            *counts.entry(column.status()).or_insert(0) += lane.len();
        }
        counts
    }

    pub async fn view(&self) -> BoardView {
        let inner = self.inner.read().await;
        let lanes: Vec<BoardLane> = BoardColumn::ALL
            .iter()
            .map(|column| {
                let mut loads: Vec<LoadCard> = inner
                    .lanes
                    .get(column)
                    .map(|lane| lane.values().cloned().collect())
                    .unwrap_or_default();
                loads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                BoardLane {
                    column: *column,
                    status: column.status(),
                    count: loads.len(),
                    loads,
                }
            })
            .collect();
        let total = lanes.iter().map(|l| l.count).sum();
        BoardView { lanes, total }
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.lanes.clear();
        inner.placement.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
