//! Shared types for the LOADBOARD core.
//!
//! These types form the data model used across all modules.
//! Registry, ledger, eligibility, and marketplace modules depend on
//! them without depending on each other.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

pub type LoadId = Uuid;
pub type OfferId = Uuid;
/// Carrier id as issued by the identity provider (trusted, opaque).
pub type CarrierId = String;
pub type ShipperId = String;
pub type DriverId = String;

// ---------------------------------------------------------------------------
// Load status
// ---------------------------------------------------------------------------

/// Canonical load lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Draft,
    Tendered,
    Accepted,
    InTransit,
    Delivered,
    Completed,
    Cancelled,
}

impl LoadStatus {
    pub const ALL: &'static [LoadStatus] = &[
        LoadStatus::Draft,
        LoadStatus::Tendered,
        LoadStatus::Accepted,
        LoadStatus::InTransit,
        LoadStatus::Delivered,
        LoadStatus::Completed,
        LoadStatus::Cancelled,
    ];

    /// Completed and cancelled loads are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadStatus::Completed | LoadStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStatus::Draft => "draft",
            LoadStatus::Tendered => "tendered",
            LoadStatus::Accepted => "accepted",
            LoadStatus::InTransit => "in_transit",
            LoadStatus::Delivered => "delivered",
            LoadStatus::Completed => "completed",
            LoadStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LoadStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "draft" => Ok(LoadStatus::Draft),
            "tendered" | "open" => Ok(LoadStatus::Tendered),
            "accepted" | "booked" => Ok(LoadStatus::Accepted),
            "in_transit" | "intransit" => Ok(LoadStatus::InTransit),
            "delivered" => Ok(LoadStatus::Delivered),
            "completed" => Ok(LoadStatus::Completed),
            "cancelled" | "canceled" => Ok(LoadStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Unknown load status: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Equipment
// ---------------------------------------------------------------------------

/// Trailer / equipment type required by a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentType {
    DryVan,
    Reefer,
    Flatbed,
    StepDeck,
    Tanker,
    PowerOnly,
    Other,
}

impl EquipmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentType::DryVan => "dry van",
            EquipmentType::Reefer => "reefer",
            EquipmentType::Flatbed => "flatbed",
            EquipmentType::StepDeck => "step deck",
            EquipmentType::Tanker => "tanker",
            EquipmentType::PowerOnly => "power only",
            EquipmentType::Other => "other",
        }
    }
}

impl fmt::Display for EquipmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempt to parse a string into an EquipmentType (case-insensitive).
impl std::str::FromStr for EquipmentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], " ").trim() {
            "dry van" | "van" | "dryvan" => Ok(EquipmentType::DryVan),
            "reefer" | "refrigerated" => Ok(EquipmentType::Reefer),
            "flatbed" | "flat" => Ok(EquipmentType::Flatbed),
            "step deck" | "stepdeck" => Ok(EquipmentType::StepDeck),
            "tanker" => Ok(EquipmentType::Tanker),
            "power only" | "poweronly" => Ok(EquipmentType::PowerOnly),
            "other" => Ok(EquipmentType::Other),
            _ => Err(anyhow::anyhow!("Unknown equipment type: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Location & windows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    /// State / province code.
    pub region: String,
    #[serde(default)]
    pub postal_code: Option<String>,
}

impl Location {
    pub fn new(city: &str, region: &str) -> Self {
        Self {
            city: city.to_string(),
            region: region.to_string(),
            postal_code: None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.city, self.region)?;
        if let Some(zip) = &self.postal_code {
            write!(f, " {zip}")?;
        }
        Ok(())
    }
}

/// Pickup or delivery window: a date plus optional open/close times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub date: NaiveDate,
    #[serde(default)]
    pub opens: Option<NaiveTime>,
    #[serde(default)]
    pub closes: Option<NaiveTime>,
}

impl TimeWindow {
    pub fn on(date: NaiveDate) -> Self {
        Self {
            date,
            opens: None,
            closes: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Actors, awards, artifacts
// ---------------------------------------------------------------------------

/// Authenticated party performing an operation. Identity is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Shipper(ShipperId),
    Carrier(CarrierId),
    Driver(DriverId),
    Dispatcher(String),
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Shipper(id) => write!(f, "shipper:{id}"),
            Actor::Carrier(id) => write!(f, "carrier:{id}"),
            Actor::Driver(id) => write!(f, "driver:{id}"),
            Actor::Dispatcher(id) => write!(f, "dispatcher:{id}"),
            Actor::System => write!(f, "system"),
        }
    }
}

/// How a load reached `accepted`. Exactly one path per load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Award {
    WinningOffer { offer_id: OfferId, carrier_id: CarrierId },
    DirectAssignment { driver_id: DriverId },
}

/// Driver attached to an accepted load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverRef {
    pub driver_id: DriverId,
    pub confirmed: bool,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// Evidence that the previous lifecycle step finished, supplied by the
/// tracking collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitArtifact {
    PickupConfirmed,
    ArrivalConfirmed,
    ProofOfDelivery,
}

impl fmt::Display for ExitArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitArtifact::PickupConfirmed => write!(f, "pickup_confirmed"),
            ExitArtifact::ArrivalConfirmed => write!(f, "arrival_confirmed"),
            ExitArtifact::ProofOfDelivery => write!(f, "proof_of_delivery"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    #[serde(default)]
    pub from: Option<LoadStatus>,
    pub to: LoadStatus,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// A shipment request needing carrier fulfilment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Load {
    pub id: LoadId,
    pub shipper_id: ShipperId,
    /// Shipper reference / commodity description.
    #[serde(default)]
    pub reference: Option<String>,
    pub origin: Option<Location>,
    pub destination: Option<Location>,
    pub pickup: Option<TimeWindow>,
    pub delivery: Option<TimeWindow>,
    pub equipment: Option<EquipmentType>,
    pub weight_lbs: Option<u32>,
    /// Posted rate in USD. `None` means negotiable.
    pub rate: Option<Decimal>,
    /// Routed distance for display; supplied by the geocoding collaborator.
    #[serde(default)]
    pub distance_miles: Option<u32>,
    pub status: LoadStatus,
    #[serde(default)]
    pub award: Option<Award>,
    #[serde(default)]
    pub driver: Option<DriverRef>,
    /// Bumped on every committed mutation.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When the load entered `tendered`.
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub history: Vec<StatusChange>,
}

impl fmt::Display for Load {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let place = |l: &Option<Location>| {
            l.as_ref()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "?".to_string())
        };
        let rate = self
            .rate
            .map(|r| format!("${r:.2}"))
            .unwrap_or_else(|| "negotiable".to_string());
        write!(
            f,
            "[{}] {} -> {} ({}, v{}, {rate})",
            self.id,
            place(&self.origin),
            place(&self.destination),
            self.status,
            self.version,
        )
    }
}

impl Load {
    /// A fresh draft owned by `shipper_id`.
    pub fn draft(shipper_id: &str, details: LoadDetails, actor: Actor) -> Self {
        let now = Utc::now();
        let mut load = Load {
            id: Uuid::new_v4(),
            shipper_id: shipper_id.to_string(),
            reference: None,
            origin: None,
            destination: None,
            pickup: None,
            delivery: None,
            equipment: None,
            weight_lbs: None,
            rate: None,
            distance_miles: None,
            status: LoadStatus::Draft,
            award: None,
            driver: None,
            version: 1,
            created_at: now,
            updated_at: now,
            posted_at: None,
            archived: false,
            history: vec![StatusChange {
                from: None,
                to: LoadStatus::Draft,
                actor,
                at: now,
            }],
        };
        details.apply_to(&mut load);
        load
    }

    /// Fields that must be set before the load can be tendered.
    pub fn missing_tender_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.origin.is_none() {
            missing.push("origin");
        }
        if self.destination.is_none() {
            missing.push("destination");
        }
        if self.pickup.is_none() {
            missing.push("pickup date");
        }
        if self.equipment.is_none() {
            missing.push("equipment type");
        }
        missing
    }

    pub fn is_negotiable(&self) -> bool {
        self.rate.is_none()
    }

    /// Carrier that won the load through bidding, if any.
    pub fn awarded_carrier(&self) -> Option<&str> {
        match &self.award {
            Some(Award::WinningOffer { carrier_id, .. }) => Some(carrier_id),
            _ => None,
        }
    }

    /// The driver attached to this load, if any.
    pub fn driver_id(&self) -> Option<&str> {
        self.driver.as_ref().map(|d| d.driver_id.as_str())
    }

    /// The sequence of statuses this load has passed through.
    pub fn status_path(&self) -> Vec<LoadStatus> {
        self.history.iter().map(|c| c.to).collect()
    }

    /// Lowercased haystack for free-text search.
    pub fn search_text(&self) -> String {
        let mut parts = vec![self.id.to_string()];
        if let Some(o) = &self.origin {
            parts.push(o.to_string());
        }
        if let Some(d) = &self.destination {
            parts.push(d.to_string());
        }
        if let Some(e) = &self.equipment {
            parts.push(e.to_string());
        }
        if let Some(r) = &self.reference {
            parts.push(r.clone());
        }
        parts.join(" ").to_lowercase()
    }

    /// Helper to build a tender-ready sample load.
    #[cfg(test)]
    pub fn sample(shipper_id: &str) -> Self {
        Load::draft(
            shipper_id,
            LoadDetails::sample(),
            Actor::Shipper(shipper_id.to_string()),
        )
    }
}

/// Editable load fields. Used for creation and draft edits; fields left
/// `None` are unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadDetails {
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub origin: Option<Location>,
    #[serde(default)]
    pub destination: Option<Location>,
    #[serde(default)]
    pub pickup: Option<TimeWindow>,
    #[serde(default)]
    pub delivery: Option<TimeWindow>,
    #[serde(default)]
    pub equipment: Option<EquipmentType>,
    #[serde(default)]
    pub weight_lbs: Option<u32>,
    #[serde(default)]
    pub rate: Option<Decimal>,
    #[serde(default)]
    pub distance_miles: Option<u32>,
}

impl LoadDetails {
    pub fn apply_to(self, load: &mut Load) {
        if self.reference.is_some() {
            load.reference = self.reference;
        }
        if self.origin.is_some() {
            load.origin = self.origin;
        }
        if self.destination.is_some() {
            load.destination = self.destination;
        }
        if self.pickup.is_some() {
            load.pickup = self.pickup;
        }
        if self.delivery.is_some() {
            load.delivery = self.delivery;
        }
        if self.equipment.is_some() {
            load.equipment = self.equipment;
        }
        if self.weight_lbs.is_some() {
            load.weight_lbs = self.weight_lbs;
        }
        if self.rate.is_some() {
            load.rate = self.rate;
        }
        if self.distance_miles.is_some() {
            load.distance_miles = self.distance_miles;
        }
    }

    #[cfg(test)]
    pub fn sample() -> Self {
        LoadDetails {
            reference: Some("Palletized paper goods".to_string()),
            origin: Some(Location::new("Dallas", "TX")),
            destination: Some(Location::new("Memphis", "TN")),
            pickup: NaiveDate::from_ymd_opt(2026, 11, 2).map(TimeWindow::on),
            delivery: NaiveDate::from_ymd_opt(2026, 11, 3).map(TimeWindow::on),
            equipment: Some(EquipmentType::DryVan),
            weight_lbs: Some(38_000),
            rate: Some(Decimal::new(1850, 0)),
            distance_miles: Some(452),
        }
    }
}

// ---------------------------------------------------------------------------
// Offers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferStatus::Pending => write!(f, "pending"),
            OfferStatus::Accepted => write!(f, "accepted"),
            OfferStatus::Rejected => write!(f, "rejected"),
            OfferStatus::Withdrawn => write!(f, "withdrawn"),
        }
    }
}

/// A carrier's proposal to haul a specific load at a proposed rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub load_id: LoadId,
    pub carrier_id: CarrierId,
    pub rate: Decimal,
    #[serde(default)]
    pub eta: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl fmt::Display for Offer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} bids ${:.2} on {} ({})",
            self.id, self.carrier_id, self.rate, self.load_id, self.status,
        )
    }
}

impl Offer {
    pub fn is_pending(&self) -> bool {
        self.status == OfferStatus::Pending
    }

    /// Move out of `pending` into `status`, stamping the resolution time.
    pub fn resolve(&mut self, status: OfferStatus) {
        self.status = status;
        self.resolved_at = Some(Utc::now());
    }
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibleReason {
    ScoreTooLow,
    MissingConsents,
    Both,
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IneligibleReason::ScoreTooLow => write!(f, "score_too_low"),
            IneligibleReason::MissingConsents => write!(f, "missing_consents"),
            IneligibleReason::Both => write!(f, "both"),
        }
    }
}

/// Marketplace access verdict for one carrier. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub carrier_id: CarrierId,
    pub eligible: bool,
    pub reason: Option<IneligibleReason>,
    pub missing_consent_ids: BTreeSet<String>,
    pub score: u8,
    pub threshold: u8,
    pub evaluated_at: DateTime<Utc>,
}

impl Eligibility {
    /// Compute the verdict from raw collaborator inputs.
    pub fn compute(
        carrier_id: &str,
        score: u8,
        threshold: u8,
        signed: &BTreeSet<String>,
        required: &BTreeSet<String>,
    ) -> Self {
        let missing: BTreeSet<String> = required.difference(signed).cloned().collect();
        let score_ok = score >= threshold;
        let reason = match (score_ok, missing.is_empty()) {
            (true, true) => None,
            (false, true) => Some(IneligibleReason::ScoreTooLow),
            (true, false) => Some(IneligibleReason::MissingConsents),
            (false, false) => Some(IneligibleReason::Both),
        };
        Eligibility {
            carrier_id: carrier_id.to_string(),
            eligible: reason.is_none(),
            reason,
            missing_consent_ids: missing,
            score,
            threshold,
            evaluated_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
