//! Persistence layer.
//!
//! Saves and loads a snapshot of every load and offer to/from a JSON
//! file. The same snapshot backs the export endpoint; formatting beyond
//! JSON is left to consumers.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::lifecycle::LoadRegistry;
use crate::types::{Load, Offer};

/// Default snapshot file path.
pub const DEFAULT_SNAPSHOT_FILE: &str = "loadboard_snapshot.json";

/// Point-in-time copy of the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub exported_at: DateTime<Utc>,
    pub loads: Vec<Load>,
    pub offers: Vec<Offer>,
}

impl Snapshot {
    pub async fn capture(registry: &LoadRegistry) -> Self {
        let (loads, offers) = registry.snapshot().await;
        Self {
            exported_at: Utc::now(),
            loads,
            offers,
        }
    }

    /// Load this snapshot into `registry`, replacing its contents.
    pub async fn restore_into(self, registry: &LoadRegistry) -> Result<usize> {
        registry.restore(self.loads, self.offers).await
    }
}

/// Save a snapshot to a JSON file.
pub fn save_snapshot(snapshot: &Snapshot, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_FILE);
    let json = serde_json::to_string_pretty(snapshot).context("Failed to serialise snapshot")?;

    // The snapshot file is only ever replaced whole.
    let tmp = format!("{path}.tmp");
    std::fs::write(&tmp, &json).context(format!("Failed to write snapshot to {tmp}"))?;
    std::fs::rename(&tmp, path).context(format!("Failed to move snapshot into {path}"))?;

    debug!(
        path,
        loads = snapshot.loads.len(),
        offers = snapshot.offers.len(),
        "Snapshot saved"
    );
    Ok(())
}

/// Load a snapshot from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_snapshot(path: Option<&str>) -> Result<Option<Snapshot>> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved snapshot found, starting fresh");
        return Ok(None);
    }

    let json =
        std::fs::read_to_string(path).context(format!("Failed to read snapshot from {path}"))?;
    let snapshot: Snapshot =
        serde_json::from_str(&json).context(format!("Failed to parse snapshot from {path}"))?;

    info!(
        path,
        loads = snapshot.loads.len(),
        offers = snapshot.offers.len(),
        exported_at = %snapshot.exported_at,
        "Snapshot loaded from disk"
    );
    Ok(Some(snapshot))
}

/// Delete the snapshot file (for testing or reset).
pub fn delete_snapshot(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path).context(format!("Failed to delete snapshot file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::TransitionRequest;
    use crate::types::{Actor, LoadDetails, LoadStatus};

    fn temp_path() -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("loadboard_test_snapshot_{}.json", uuid::Uuid::new_v4()));
        p.to_string_lossy().to_string()
    }

    async fn populated_registry() -> LoadRegistry {
        let registry = LoadRegistry::default();
        let actor = Actor::Shipper("shipper-1".into());
        let load = registry
            .create_draft("shipper-1", LoadDetails::sample(), &actor)
            .await
            .unwrap();
        registry
            .transition(load.id, TransitionRequest::to(LoadStatus::Tendered), &actor)
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let path = temp_path();
        let registry = populated_registry().await;
        let snapshot = Snapshot::capture(&registry).await;
        save_snapshot(&snapshot, Some(&path)).unwrap();

        let loaded = load_snapshot(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.loads.len(), 1);
        assert_eq!(loaded.loads[0].status, LoadStatus::Tendered);
        assert_eq!(loaded.loads[0].history.len(), 2);

        delete_snapshot(Some(&path)).unwrap();
    }

    #[tokio::test]
    async fn test_restore_into_fresh_registry() {
        let path = temp_path();
        let registry = populated_registry().await;
        save_snapshot(&Snapshot::capture(&registry).await, Some(&path)).unwrap();

        let fresh = LoadRegistry::default();
        let snapshot = load_snapshot(Some(&path)).unwrap().unwrap();
        assert_eq!(snapshot.restore_into(&fresh).await.unwrap(), 1);
        assert_eq!(fresh.loads_with_status(LoadStatus::Tendered).await.len(), 1);

        delete_snapshot(Some(&path)).unwrap();
    }

    #[test]
    fn test_load_nonexistent() {
        let loaded = load_snapshot(Some("/tmp/loadboard_nonexistent_snapshot_12345.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_delete_nonexistent_ok() {
        let result = delete_snapshot(Some("/tmp/loadboard_does_not_exist_xyz.json"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_corrupt_snapshot_errors() {
        let path = temp_path();
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_snapshot(Some(&path)).is_err());
        delete_snapshot(Some(&path)).unwrap();
    }
}
