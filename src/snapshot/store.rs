//! Schema Snapshot Store
//!
//! Persists the last introspected snapshot as indented JSON so the next run
//! has a baseline to diff against.

use crate::error::AppResult;
use crate::introspection::SchemaSnapshot;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File-backed store holding a single baseline snapshot
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the snapshot, replacing any previous baseline
    pub async fn save(&self, snapshot: &SchemaSnapshot) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = snapshot.to_json()?;
        // Write beside the target and rename so a crash never leaves half a baseline
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        info!(
            "Saved snapshot of {} ({} tables) to {}",
            snapshot.database_name(),
            snapshot.tables().len(),
            self.path.display()
        );
        Ok(())
    }

    /// Load the baseline; `None` when no snapshot has been saved yet
    pub async fn load(&self) -> AppResult<Option<SchemaSnapshot>> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No snapshot at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        SchemaSnapshot::from_json(&json).map(Some)
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::introspection::tests::{column, relationship, snapshot, table};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshot.json"));
        assert!(store.load().await.unwrap().is_none());
        assert!(!store.exists().await);
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/state/snapshot.json"));
        let original = snapshot(
            vec![
                table("Customer", vec![column("ID", "int"), column("Email", "nvarchar")]),
                table("Order", vec![column("CustomerID", "int")]),
            ],
            vec![relationship("Customer", "ID", "Order", "CustomerID")],
        );

        store.save(&original).await.unwrap();
        let loaded = store.load().await.unwrap().expect("snapshot saved");

        assert_eq!(loaded, original);
        assert!(store.exists().await);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let result = SnapshotStore::new(&path).load().await;
        assert!(matches!(result, Err(AppError::Serialization(_))));
    }
}
