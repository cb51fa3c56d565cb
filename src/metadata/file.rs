//! File-backed metadata repository
//!
//! Keeps the metadata set and the generation log in one JSON document,
//! normally next to the baseline snapshot, so incremental planning works
//! across runs without a database.

use super::history::{select_history, GenerationHistoryRecord};
use super::state::MetadataState;
use super::store::MetadataRepository;
use crate::error::AppResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataDocument {
    #[serde(default)]
    state: MetadataState,
    #[serde(default)]
    history: Vec<GenerationHistoryRecord>,
}

pub struct FileMetadataRepository {
    path: PathBuf,
    // Serializes read-modify-write of the document within this process
    lock: Mutex<()>,
}

impl FileMetadataRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> AppResult<MetadataDocument> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No metadata at {}, starting empty", self.path.display());
                Ok(MetadataDocument::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, document: &MetadataDocument) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(document)?;
        let tmp = self
            .path
            .with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, json.as_bytes()).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

impl MetadataRepository for FileMetadataRepository {
    async fn load(&self) -> AppResult<MetadataState> {
        let _guard = self.lock.lock().await;
        Ok(self.read_document().await?.state)
    }

    async fn persist(&self, state: &MetadataState) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        document.state = state.clone();
        self.write_document(&document).await?;
        debug!(
            "Persisted {} table records to {}",
            state.tables.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn mark_generated(&self, table_keys: &[String], at: DateTime<Utc>) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        document.state.mark_generated_all(table_keys, at)?;
        self.write_document(&document).await
    }

    async fn record_history(&self, records: &[GenerationHistoryRecord]) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        document.history.extend_from_slice(records);
        self.write_document(&document).await
    }

    async fn history(&self, table_name: Option<&str>) -> AppResult<Vec<GenerationHistoryRecord>> {
        let _guard = self.lock.lock().await;
        let document = self.read_document().await?;
        Ok(select_history(&document.history, table_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspection::tests::{column, snapshot, table};
    use crate::metadata::{GenerationOutcome, MetadataStore};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileMetadataRepository::new(dir.path().join("state/metadata.json"));
        assert_eq!(repo.load().await.unwrap(), MetadataState::default());
        assert!(repo.history(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_state_survives_a_new_repository() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/metadata.json");
        let snap = snapshot(vec![table("Customer", vec![column("ID", "int")])], vec![]);

        let first = MetadataStore::new(FileMetadataRepository::new(&path));
        assert_eq!(first.sync_from_snapshot(&snap).await.unwrap().tables_changed, 1);
        first.mark_generated("dbo", "Customer").await.unwrap();

        let second = MetadataStore::new(FileMetadataRepository::new(&path));
        let sync = second.sync_from_snapshot(&snap).await.unwrap();
        assert_eq!(sync.tables_changed, 0);
        let state = second.state().await.unwrap();
        assert!(state.table("dbo", "Customer").unwrap().last_generated.is_some());

        let names: Vec<_> = std::fs::read_dir(dir.path().join("state"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["metadata.json".to_string()]);
    }

    #[tokio::test]
    async fn test_history_and_state_share_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        let repo = FileMetadataRepository::new(&path);
        let snap = snapshot(vec![table("Customer", vec![column("ID", "int")])], vec![]);
        MetadataStore::new(FileMetadataRepository::new(&path))
            .sync_from_snapshot(&snap)
            .await
            .unwrap();

        repo.record_history(&[GenerationHistoryRecord::new(
            "dbo",
            "Customer",
            "entity",
            Path::new("out/Customer.cs"),
            GenerationOutcome::Written,
        )])
        .await
        .unwrap();

        let reopened = FileMetadataRepository::new(&path);
        assert_eq!(reopened.history(Some("Customer")).await.unwrap().len(), 1);
        assert!(reopened.load().await.unwrap().table("dbo", "Customer").is_some());
    }

    #[tokio::test]
    async fn test_unknown_table_stamp_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        let store = MetadataStore::new(FileMetadataRepository::new(&path));
        let snap = snapshot(vec![table("Customer", vec![column("ID", "int")])], vec![]);
        store.sync_from_snapshot(&snap).await.unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let keys = vec!["dbo.Customer".to_string(), "dbo.Ghost".to_string()];
        assert!(store.mark_generated_all(&keys).await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(FileMetadataRepository::new(&path).load().await.is_err());
    }
}
