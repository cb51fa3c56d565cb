//! Metadata state and the snapshot sync algorithm
//!
//! `MetadataState` is the whole persisted metadata set as a plain value.
//! Syncing is a pure transformation of that value: hash every entity of the
//! snapshot, rotate the hashes that changed, create records for new entities
//! and deactivate the ones that disappeared. Nothing is ever deleted.

use super::hash::{column_hash, index_hash, relationship_hash, table_hash};
use super::records::{
    column_key, index_key, table_key, ColumnMetadata, HashState, IndexColumnMetadata,
    IndexMetadata, RelationshipMetadata, TableMetadata,
};
use crate::error::{not_found_error, AppResult};
use crate::introspection::{Column, Index, Relationship, SchemaSnapshot, Table};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Outcome of one sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// New plus modified tables
    pub tables_changed: usize,
    pub tables_total: usize,
    pub new_tables: Vec<String>,
    pub modified_tables: Vec<String>,
    pub deactivated_tables: Vec<String>,
    pub columns_changed: usize,
    pub synced_at: DateTime<Utc>,
}

impl SyncResult {
    pub fn is_changed(&self, table: &str) -> bool {
        self.new_tables.iter().any(|t| t == table) || self.modified_tables.iter().any(|t| t == table)
    }
}

/// All metadata records keyed by natural key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataState {
    pub tables: BTreeMap<String, TableMetadata>,
    pub columns: BTreeMap<String, ColumnMetadata>,
    pub indexes: BTreeMap<String, IndexMetadata>,
    pub relationships: BTreeMap<String, RelationshipMetadata>,
}

impl MetadataState {
    /// Bring the records in line with `snapshot`
    pub fn apply_snapshot(&mut self, snapshot: &SchemaSnapshot, now: DateTime<Utc>) -> SyncResult {
        let mut result = SyncResult {
            tables_changed: 0,
            tables_total: snapshot.tables().len(),
            new_tables: Vec::new(),
            modified_tables: Vec::new(),
            deactivated_tables: Vec::new(),
            columns_changed: 0,
            synced_at: now,
        };

        let mut seen_tables = HashSet::new();
        for table in snapshot.tables() {
            let key = table.qualified_name();
            let hash = table_hash(table);

            let table_id = match self.tables.get_mut(&key) {
                Some(record) => {
                    if record.hash.rotate(&hash) {
                        result.modified_tables.push(table.name.clone());
                    }
                    record.is_active = true;
                    record.last_synced = now;
                    record.id
                }
                None => {
                    let record = TableMetadata::new(&table.schema_name, &table.name, &hash, now);
                    let id = record.id;
                    self.tables.insert(key.clone(), record);
                    result.new_tables.push(table.name.clone());
                    id
                }
            };

            result.columns_changed += self.sync_columns(table, table_id);
            self.sync_indexes(table, table_id);
            seen_tables.insert(key);
        }

        for (key, record) in self.tables.iter_mut() {
            if record.is_active && !seen_tables.contains(key) {
                record.is_active = false;
                record.last_synced = now;
                result.deactivated_tables.push(record.table_name.clone());
            }
        }
        let inactive: HashSet<Uuid> = self
            .tables
            .values()
            .filter(|t| !t.is_active)
            .map(|t| t.id)
            .collect();
        for col in self.columns.values_mut() {
            if inactive.contains(&col.table_id) {
                col.is_active = false;
            }
        }
        for idx in self.indexes.values_mut() {
            if inactive.contains(&idx.table_id) {
                idx.is_active = false;
            }
        }

        self.sync_relationships(snapshot.relationships());

        result.tables_changed = result.new_tables.len() + result.modified_tables.len();
        result
    }

    /// Returns the number of new or rotated columns
    fn sync_columns(&mut self, table: &Table, table_id: Uuid) -> usize {
        let mut changed = 0;
        let mut seen = HashSet::new();

        for col in &table.columns {
            let key = column_key(&table.schema_name, &table.name, &col.name);
            let hash = column_hash(col);
            match self.columns.get_mut(&key) {
                Some(record) => {
                    if record.hash.rotate(&hash) {
                        changed += 1;
                    }
                    record.table_id = table_id;
                    record.is_active = true;
                    fill_column(record, col);
                }
                None => {
                    let mut record = ColumnMetadata {
                        id: Uuid::new_v4(),
                        table_id,
                        natural_key: key.clone(),
                        column_name: col.name.clone(),
                        data_type: String::new(),
                        max_length: None,
                        precision: None,
                        scale: None,
                        is_nullable: true,
                        is_primary_key: false,
                        is_identity: false,
                        is_computed: false,
                        is_foreign_key: false,
                        referenced_table: None,
                        referenced_column: None,
                        prefix: col.convention,
                        hash: HashState::new(hash),
                        is_active: true,
                    };
                    fill_column(&mut record, col);
                    self.columns.insert(key.clone(), record);
                    changed += 1;
                }
            }
            seen.insert(key);
        }

        for (key, record) in self.columns.iter_mut() {
            if record.table_id == table_id && !seen.contains(key) {
                record.is_active = false;
            }
        }
        changed
    }

    fn sync_indexes(&mut self, table: &Table, table_id: Uuid) {
        let mut seen = HashSet::new();

        for index in &table.indexes {
            let key = index_key(&table.schema_name, &table.name, &index.name);
            let hash = index_hash(index);
            match self.indexes.get_mut(&key) {
                Some(record) => {
                    record.hash.rotate(&hash);
                    record.table_id = table_id;
                    record.is_active = true;
                    record.is_unique = index.is_unique;
                    record.is_clustered = index.is_clustered;
                    record.columns = index_columns(index);
                }
                None => {
                    self.indexes.insert(
                        key.clone(),
                        IndexMetadata {
                            id: Uuid::new_v4(),
                            table_id,
                            natural_key: key.clone(),
                            index_name: index.name.clone(),
                            is_unique: index.is_unique,
                            is_clustered: index.is_clustered,
                            columns: index_columns(index),
                            hash: HashState::new(hash),
                            is_active: true,
                        },
                    );
                }
            }
            seen.insert(key);
        }

        for (key, record) in self.indexes.iter_mut() {
            if record.table_id == table_id && !seen.contains(key) {
                record.is_active = false;
            }
        }
    }

    fn sync_relationships(&mut self, relationships: &[Relationship]) {
        let mut seen = HashSet::new();

        for rel in relationships {
            let key = rel.key();
            let hash = relationship_hash(rel);
            match self.relationships.get_mut(&key) {
                Some(record) => {
                    record.hash.rotate(&hash);
                    record.is_active = true;
                    record.foreign_key_name = rel.foreign_key_name.clone();
                    record.relationship_type = rel.relationship_type;
                    record.on_delete = rel.on_delete.clone();
                    record.on_update = rel.on_update.clone();
                }
                None => {
                    self.relationships.insert(
                        key.clone(),
                        RelationshipMetadata {
                            id: Uuid::new_v4(),
                            natural_key: key.clone(),
                            foreign_key_name: rel.foreign_key_name.clone(),
                            parent_table: rel.parent_table.clone(),
                            parent_column: rel.parent_column.clone(),
                            child_table: rel.child_table.clone(),
                            child_column: rel.child_column.clone(),
                            relationship_type: rel.relationship_type,
                            on_delete: rel.on_delete.clone(),
                            on_update: rel.on_update.clone(),
                            hash: HashState::new(hash),
                            is_active: true,
                        },
                    );
                }
            }
            seen.insert(key);
        }

        for (key, record) in self.relationships.iter_mut() {
            if !seen.contains(key) {
                record.is_active = false;
            }
        }
    }

    pub fn table(&self, schema: &str, name: &str) -> Option<&TableMetadata> {
        self.tables.get(&table_key(schema, name))
    }

    pub fn active_tables(&self) -> impl Iterator<Item = &TableMetadata> {
        self.tables.values().filter(|t| t.is_active)
    }

    /// Active columns of a table
    pub fn columns_for(&self, table_id: Uuid) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns
            .values()
            .filter(move |c| c.table_id == table_id && c.is_active)
    }

    /// Active tables whose previous hash is absent or differs from the current one
    pub fn changed_tables_count(&self) -> usize {
        self.active_tables().filter(|t| t.hash.has_changed()).count()
    }

    /// Stamp a table as generated at `now`
    pub fn mark_generated(&mut self, schema: &str, name: &str, now: DateTime<Utc>) -> AppResult<()> {
        let record = self
            .tables
            .get_mut(&table_key(schema, name))
            .ok_or_else(|| not_found_error(format!("Table metadata {}.{}", schema, name)))?;
        record.last_generated = Some(now);
        Ok(())
    }

    /// Stamp every table in `keys`; nothing changes if any key is unknown
    pub fn mark_generated_all(&mut self, keys: &[String], now: DateTime<Utc>) -> AppResult<()> {
        if let Some(missing) = keys.iter().find(|k| !self.tables.contains_key(k.as_str())) {
            return Err(not_found_error(format!("Table metadata {}", missing)));
        }
        for key in keys {
            if let Some(record) = self.tables.get_mut(key) {
                record.last_generated = Some(now);
            }
        }
        Ok(())
    }
}

fn fill_column(record: &mut ColumnMetadata, col: &Column) {
    record.data_type = col.data_type.clone();
    record.max_length = col.max_length;
    record.precision = col.precision;
    record.scale = col.scale;
    record.is_nullable = col.is_nullable;
    record.is_primary_key = col.is_primary_key;
    record.is_identity = col.is_identity;
    record.is_computed = col.is_computed;
    record.is_foreign_key = col.is_foreign_key;
    record.referenced_table = col.referenced_table.clone();
    record.referenced_column = col.referenced_column.clone();
    record.prefix = col.convention;
}

fn index_columns(index: &Index) -> Vec<IndexColumnMetadata> {
    let key_columns = index.columns.iter().map(|name| (name, false));
    let included = index
        .included_columns
        .iter()
        .flatten()
        .map(|name| (name, true));

    key_columns
        .chain(included)
        .enumerate()
        .map(|(i, (name, is_included))| IndexColumnMetadata {
            column_name: name.clone(),
            key_ordinal: i as i32 + 1,
            is_descending: index.descending_columns.contains(name),
            is_included,
        })
        .collect()
}
