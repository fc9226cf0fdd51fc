//! Load state machine: the transition table, exit-artifact rules, and
//! actor authorization.
//!
//! This is the only place that knows which status may follow which.
//! Everything else asks [`check`] before mutating a load.

use crate::error::{MarketError, Result};
use crate::types::{Actor, ExitArtifact, Load, LoadStatus};

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// Statuses reachable in one step from `from`.
pub fn successors(from: LoadStatus) -> &'static [LoadStatus] {
    use LoadStatus::*;
    match from {
        Draft => &[Tendered, Cancelled],
        Tendered => &[Accepted, Cancelled],
        Accepted => &[InTransit, Cancelled],
        InTransit => &[Delivered, Cancelled],
        Delivered => &[Completed, Cancelled],
        Completed | Cancelled => &[],
    }
}

pub fn can_transition(from: LoadStatus, to: LoadStatus) -> bool {
    successors(from).contains(&to)
}

/// Artifact the previous step must have produced before `to` is allowed.
pub fn required_artifact(from: LoadStatus, to: LoadStatus) -> Option<ExitArtifact> {
    match (from, to) {
        (LoadStatus::Accepted, LoadStatus::InTransit) => Some(ExitArtifact::PickupConfirmed),
        (LoadStatus::InTransit, LoadStatus::Delivered) => Some(ExitArtifact::ArrivalConfirmed),
        (LoadStatus::Delivered, LoadStatus::Completed) => Some(ExitArtifact::ProofOfDelivery),
        _ => None,
    }
}

/// Whether `path` is a walk through the transition graph starting at draft.
pub fn is_valid_path(path: &[LoadStatus]) -> bool {
    match path.first() {
        Some(LoadStatus::Draft) => path.windows(2).all(|w| can_transition(w[0], w[1])),
        _ => false,
    }
}

fn invalid(load: &Load, to: LoadStatus, reason: impl Into<String>) -> MarketError {
    MarketError::InvalidTransition {
        from: load.status,
        to,
        reason: reason.into(),
    }
}

/// Validate moving `load` to `to` with the given exit artifact.
pub fn check(load: &Load, to: LoadStatus, artifact: Option<ExitArtifact>) -> Result<()> {
    if load.status.is_terminal() {
        return Err(invalid(load, to, "load is terminal"));
    }
    if !can_transition(load.status, to) {
        return Err(invalid(load, to, "target not reachable from current status"));
    }

    if to == LoadStatus::Tendered {
        let missing = load.missing_tender_fields();
        if !missing.is_empty() {
            return Err(invalid(load, to, format!("missing {}", missing.join(", "))));
        }
    }

    if let Some(required) = required_artifact(load.status, to) {
        match artifact {
            Some(given) if given == required => {}
            Some(given) => {
                return Err(invalid(load, to, format!("expected {required}, got {given}")));
            }
            None => return Err(invalid(load, to, format!("requires {required}"))),
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// Whether `actor` administers `load` (owning shipper, dispatcher, system).
pub fn authorize_owner(actor: &Actor, load: &Load) -> Result<()> {
    match actor {
        Actor::System | Actor::Dispatcher(_) => Ok(()),
        Actor::Shipper(id) if *id == load.shipper_id => Ok(()),
        other => Err(MarketError::Forbidden(format!(
            "{other} does not own load {}",
            load.id
        ))),
    }
}

/// Whether `actor` may move `load` to `to`.
///
/// Carriers and drivers only drive the haul itself (pickup and arrival),
/// and only on loads they won or drive.
pub fn authorize(actor: &Actor, load: &Load, to: LoadStatus) -> Result<()> {
    let hauler_step = matches!(to, LoadStatus::InTransit | LoadStatus::Delivered);
    match actor {
        Actor::Carrier(id) if hauler_step && load.awarded_carrier() == Some(id.as_str()) => Ok(()),
        Actor::Driver(id) if hauler_step && load.driver_id() == Some(id.as_str()) => Ok(()),
        Actor::Carrier(_) | Actor::Driver(_) => Err(MarketError::Forbidden(format!(
            "{actor} may not move load {} to {to}",
            load.id
        ))),
        _ => authorize_owner(actor, load),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
