//! Schema Diff Engine
//!
//! Compares two schema snapshots and classifies what structurally changed.
//! Every level is keyed by name (relationships by their column-pair key), so
//! the uniqueness checks done at snapshot construction are a precondition here.
//!
//! The diff is pure: it reads both snapshots and never touches metadata.

use crate::introspection::{Column, Index, Relationship, SchemaSnapshot, Table};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Type of schema change detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Object was added
    Added,
    /// Object was removed
    Removed,
    /// Object was modified
    Modified,
}

/// Table added or removed. Table modification is implied by child changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableChange {
    pub change_type: ChangeType,
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_table: Option<Table>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_table: Option<Table>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnChange {
    pub change_type: ChangeType,
    pub table_name: String,
    pub column_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_column: Option<Column>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_column: Option<Column>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexChange {
    pub change_type: ChangeType,
    pub table_name: String,
    pub index_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_index: Option<Index>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_index: Option<Index>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipChange {
    pub change_type: ChangeType,
    /// `parentTable.parentColumn->childTable.childColumn`
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_relationship: Option<Relationship>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_relationship: Option<Relationship>,
    pub description: String,
}

/// Complete diff between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaChanges {
    pub table_changes: Vec<TableChange>,
    pub column_changes: Vec<ColumnChange>,
    pub index_changes: Vec<IndexChange>,
    pub relationship_changes: Vec<RelationshipChange>,
}

impl SchemaChanges {
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn total(&self) -> usize {
        self.table_changes.len()
            + self.column_changes.len()
            + self.index_changes.len()
            + self.relationship_changes.len()
    }

    /// Names of all tables touched by any change, including both ends of
    /// added or removed relationships
    pub fn affected_tables(&self) -> BTreeSet<String> {
        let mut tables = BTreeSet::new();
        tables.extend(self.table_changes.iter().map(|c| c.table_name.clone()));
        tables.extend(self.column_changes.iter().map(|c| c.table_name.clone()));
        tables.extend(self.index_changes.iter().map(|c| c.table_name.clone()));
        for change in &self.relationship_changes {
            if let Some(rel) = change
                .old_relationship
                .as_ref()
                .or(change.new_relationship.as_ref())
            {
                tables.insert(rel.parent_table.clone());
                tables.insert(rel.child_table.clone());
            }
        }
        tables
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        let count = |changes: &[ChangeType], kind: ChangeType| {
            changes.iter().filter(|c| **c == kind).count()
        };
        let tables: Vec<_> = self.table_changes.iter().map(|c| c.change_type).collect();
        let columns: Vec<_> = self.column_changes.iter().map(|c| c.change_type).collect();
        format!(
            "{} tables added, {} removed; {} columns added, {} removed, {} modified; {} index and {} relationship changes",
            count(&tables, ChangeType::Added),
            count(&tables, ChangeType::Removed),
            count(&columns, ChangeType::Added),
            count(&columns, ChangeType::Removed),
            count(&columns, ChangeType::Modified),
            self.index_changes.len(),
            self.relationship_changes.len()
        )
    }
}

/// The diff engine that compares schema snapshots
pub struct DiffEngine;

impl DiffEngine {
    /// Compare a baseline snapshot against a fresh one.
    ///
    /// A missing baseline yields an empty change set, not "everything added".
    /// Callers that want first-run behaviour must check for the baseline
    /// themselves (see `SnapshotStore::load`).
    pub fn diff(old: Option<&SchemaSnapshot>, new: &SchemaSnapshot) -> SchemaChanges {
        let Some(old) = old else {
            warn!(
                "No baseline snapshot for {}; reporting no changes",
                new.database_name()
            );
            return SchemaChanges::default();
        };

        let mut changes = SchemaChanges::default();
        Self::diff_tables(old.tables(), new.tables(), &mut changes);
        Self::diff_relationships(old.relationships(), new.relationships(), &mut changes);

        debug!("Schema diff: {}", changes.summary());
        changes
    }

    fn diff_tables(old_tables: &[Table], new_tables: &[Table], changes: &mut SchemaChanges) {
        let old_map: HashMap<&str, &Table> =
            old_tables.iter().map(|t| (t.name.as_str(), t)).collect();
        let new_map: HashMap<&str, &Table> =
            new_tables.iter().map(|t| (t.name.as_str(), t)).collect();

        // Snapshot order keeps the output deterministic
        for table in new_tables {
            match old_map.get(table.name.as_str()) {
                None => changes.table_changes.push(TableChange {
                    change_type: ChangeType::Added,
                    table_name: table.name.clone(),
                    old_table: None,
                    new_table: Some(table.clone()),
                    description: format!("Table '{}' was added", table.name),
                }),
                Some(old_table) => {
                    Self::diff_columns(old_table, table, changes);
                    Self::diff_indexes(old_table, table, changes);
                }
            }
        }

        for table in old_tables {
            if !new_map.contains_key(table.name.as_str()) {
                changes.table_changes.push(TableChange {
                    change_type: ChangeType::Removed,
                    table_name: table.name.clone(),
                    old_table: Some(table.clone()),
                    new_table: None,
                    description: format!("Table '{}' was removed", table.name),
                });
            }
        }
    }

    fn diff_columns(old_table: &Table, new_table: &Table, changes: &mut SchemaChanges) {
        let table_name = &new_table.name;
        let old_cols: HashMap<&str, &Column> = old_table
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c))
            .collect();

        for col in &new_table.columns {
            match old_cols.get(col.name.as_str()) {
                None => changes.column_changes.push(ColumnChange {
                    change_type: ChangeType::Added,
                    table_name: table_name.clone(),
                    column_name: col.name.clone(),
                    old_column: None,
                    new_column: Some(col.clone()),
                    description: format!("Column '{}.{}' was added", table_name, col.name),
                }),
                Some(old_col) => {
                    if let Some(description) = Self::compare_columns(table_name, old_col, col) {
                        changes.column_changes.push(ColumnChange {
                            change_type: ChangeType::Modified,
                            table_name: table_name.clone(),
                            column_name: col.name.clone(),
                            old_column: Some((*old_col).clone()),
                            new_column: Some(col.clone()),
                            description,
                        });
                    }
                }
            }
        }

        for col in &old_table.columns {
            if new_table.column(&col.name).is_none() {
                changes.column_changes.push(ColumnChange {
                    change_type: ChangeType::Removed,
                    table_name: table_name.clone(),
                    column_name: col.name.clone(),
                    old_column: Some(col.clone()),
                    new_column: None,
                    description: format!("Column '{}.{}' was removed", table_name, col.name),
                });
            }
        }
    }

    /// Describe the structural differences between two same-named columns.
    /// Only type, length, nullability and key flags count; `None` when they all match.
    fn compare_columns(table_name: &str, old: &Column, new: &Column) -> Option<String> {
        let mut modifications = Vec::new();

        if old.data_type != new.data_type {
            modifications.push(format!("type changed: {} → {}", old.data_type, new.data_type));
        }

        if old.max_length != new.max_length {
            modifications.push(format!(
                "length changed: {} → {}",
                describe_length(old.max_length),
                describe_length(new.max_length)
            ));
        }

        if old.is_nullable != new.is_nullable {
            modifications.push(format!(
                "nullability changed: {} → {}",
                describe_nullability(old.is_nullable),
                describe_nullability(new.is_nullable)
            ));
        }

        if old.is_primary_key != new.is_primary_key {
            modifications.push(format!(
                "primary key changed: {} → {}",
                old.is_primary_key, new.is_primary_key
            ));
        }

        if old.is_foreign_key != new.is_foreign_key {
            modifications.push(format!(
                "foreign key changed: {} → {}",
                old.is_foreign_key, new.is_foreign_key
            ));
        }

        if modifications.is_empty() {
            return None;
        }

        Some(format!(
            "Column '{}.{}' modified: {}",
            table_name,
            new.name,
            modifications.join(", ")
        ))
    }

    // Presence only: a same-named index with a different column list is not reported
    fn diff_indexes(old_table: &Table, new_table: &Table, changes: &mut SchemaChanges) {
        let table_name = &new_table.name;
        let old_indexes: HashMap<&str, &Index> = old_table
            .indexes
            .iter()
            .map(|i| (i.name.as_str(), i))
            .collect();
        let new_indexes: HashMap<&str, &Index> = new_table
            .indexes
            .iter()
            .map(|i| (i.name.as_str(), i))
            .collect();

        for index in &new_table.indexes {
            if !old_indexes.contains_key(index.name.as_str()) {
                changes.index_changes.push(IndexChange {
                    change_type: ChangeType::Added,
                    table_name: table_name.clone(),
                    index_name: index.name.clone(),
                    old_index: None,
                    new_index: Some(index.clone()),
                    description: format!("Index '{}' was added on '{}'", index.name, table_name),
                });
            }
        }

        for index in &old_table.indexes {
            if !new_indexes.contains_key(index.name.as_str()) {
                changes.index_changes.push(IndexChange {
                    change_type: ChangeType::Removed,
                    table_name: table_name.clone(),
                    index_name: index.name.clone(),
                    old_index: Some(index.clone()),
                    new_index: None,
                    description: format!(
                        "Index '{}' was removed from '{}'",
                        index.name, table_name
                    ),
                });
            }
        }
    }

    fn diff_relationships(old: &[Relationship], new: &[Relationship], changes: &mut SchemaChanges) {
        let old_map: HashMap<String, &Relationship> = old.iter().map(|r| (r.key(), r)).collect();
        let new_map: HashMap<String, &Relationship> = new.iter().map(|r| (r.key(), r)).collect();

        for rel in new {
            let key = rel.key();
            if !old_map.contains_key(&key) {
                changes.relationship_changes.push(RelationshipChange {
                    change_type: ChangeType::Added,
                    description: format!("Relationship added: {}", describe_relationship(rel)),
                    key,
                    old_relationship: None,
                    new_relationship: Some(rel.clone()),
                });
            }
        }

        for rel in old {
            let key = rel.key();
            if !new_map.contains_key(&key) {
                changes.relationship_changes.push(RelationshipChange {
                    change_type: ChangeType::Removed,
                    description: format!("Relationship removed: {}", describe_relationship(rel)),
                    key,
                    old_relationship: Some(rel.clone()),
                    new_relationship: None,
                });
            }
        }
    }
}

fn describe_length(length: Option<i32>) -> String {
    length.map_or_else(|| "none".to_string(), |l| l.to_string())
}

fn describe_nullability(nullable: bool) -> &'static str {
    if nullable {
        "NULL"
    } else {
        "NOT NULL"
    }
}

fn describe_relationship(rel: &Relationship) -> String {
    format!(
        "{}.{} -> {}.{}",
        rel.parent_table, rel.parent_column, rel.child_table, rel.child_column
    )
}
