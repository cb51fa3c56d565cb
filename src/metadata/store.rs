//! Metadata Storage Layer
//!
//! `MetadataStore` owns the persisted hash state. Every operation is
//! load, decide, persist against a `MetadataRepository`; the store itself
//! holds no lock across calls.

use super::history::{select_history, GenerationHistoryRecord};
use super::plan::GenerationPlan;
use super::records::table_key;
use super::state::{MetadataState, SyncResult};
use crate::error::AppResult;
use crate::introspection::SchemaSnapshot;
use chrono::{DateTime, Utc};
use std::future::Future;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Backend that holds the metadata set and the generation log
pub trait MetadataRepository: Send + Sync {
    fn load(&self) -> impl Future<Output = AppResult<MetadataState>> + Send;

    fn persist(&self, state: &MetadataState) -> impl Future<Output = AppResult<()>> + Send;

    /// Stamp `last_generated` on the tables with these natural keys.
    /// Fails without stamping anything if a key is unknown.
    fn mark_generated(
        &self,
        table_keys: &[String],
        at: DateTime<Utc>,
    ) -> impl Future<Output = AppResult<()>> + Send;

    fn record_history(
        &self,
        records: &[GenerationHistoryRecord],
    ) -> impl Future<Output = AppResult<()>> + Send;

    /// Newest first; all tables when `table_name` is `None`
    fn history(
        &self,
        table_name: Option<&str>,
    ) -> impl Future<Output = AppResult<Vec<GenerationHistoryRecord>>> + Send;
}

/// Process-local repository, gone when the process exits
#[derive(Default)]
pub struct InMemoryMetadataRepository {
    state: RwLock<MetadataState>,
    history: RwLock<Vec<GenerationHistoryRecord>>,
}

impl InMemoryMetadataRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataRepository for InMemoryMetadataRepository {
    async fn load(&self) -> AppResult<MetadataState> {
        Ok(self.state.read().await.clone())
    }

    async fn persist(&self, state: &MetadataState) -> AppResult<()> {
        *self.state.write().await = state.clone();
        Ok(())
    }

    async fn mark_generated(&self, table_keys: &[String], at: DateTime<Utc>) -> AppResult<()> {
        self.state.write().await.mark_generated_all(table_keys, at)
    }

    async fn record_history(&self, records: &[GenerationHistoryRecord]) -> AppResult<()> {
        self.history.write().await.extend_from_slice(records);
        Ok(())
    }

    async fn history(&self, table_name: Option<&str>) -> AppResult<Vec<GenerationHistoryRecord>> {
        Ok(select_history(&self.history.read().await, table_name))
    }
}

pub struct MetadataStore<R> {
    repository: R,
}

impl<R: MetadataRepository> MetadataStore<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Sync the stored records against a fresh snapshot.
    /// Reports what changed; deciding what to regenerate is left to the plan.
    pub async fn sync_from_snapshot(&self, snapshot: &SchemaSnapshot) -> AppResult<SyncResult> {
        let mut state = self.repository.load().await?;
        let result = state.apply_snapshot(snapshot, Utc::now());
        self.repository.persist(&state).await?;

        info!(
            "Metadata sync for {}: {}/{} tables changed ({} new, {} deactivated), {} columns changed",
            snapshot.database_name(),
            result.tables_changed,
            result.tables_total,
            result.new_tables.len(),
            result.deactivated_tables.len(),
            result.columns_changed
        );
        Ok(result)
    }

    pub async fn state(&self) -> AppResult<MetadataState> {
        self.repository.load().await
    }

    pub async fn changed_tables_count(&self) -> AppResult<usize> {
        Ok(self.repository.load().await?.changed_tables_count())
    }

    pub async fn mark_generated(&self, schema: &str, table: &str) -> AppResult<()> {
        self.mark_generated_all(&[table_key(schema, table)]).await
    }

    /// Stamp a batch of tables (natural keys) in one repository call
    pub async fn mark_generated_all(&self, table_keys: &[String]) -> AppResult<()> {
        if table_keys.is_empty() {
            return Ok(());
        }
        self.repository.mark_generated(table_keys, Utc::now()).await?;
        debug!("Marked {} tables as generated", table_keys.len());
        Ok(())
    }

    pub async fn record_history(&self, records: &[GenerationHistoryRecord]) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.repository.record_history(records).await
    }

    pub async fn history(&self, table_name: Option<&str>) -> AppResult<Vec<GenerationHistoryRecord>> {
        self.repository.history(table_name).await
    }

    /// Decide which tables to regenerate after `sync`
    pub async fn plan(&self, sync: &SyncResult, include_unchanged: bool) -> AppResult<GenerationPlan> {
        let state = self.repository.load().await?;
        Ok(GenerationPlan::build(&state, sync, include_unchanged))
    }
}
