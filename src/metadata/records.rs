//! Metadata records
//!
//! One record per table, column, index and relationship, each carrying the
//! structural hash of the entity and the hash it had before the last change.

use crate::convention::Convention;
use crate::introspection::RelationshipType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Two-slot hash history: the current digest and the one it replaced.
/// Older digests are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashState {
    current: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous: Option<String>,
}

impl HashState {
    /// State for an entity seen for the first time
    pub fn new(current: impl Into<String>) -> Self {
        Self {
            current: current.into(),
            previous: None,
        }
    }

    /// Rebuild a state read back from storage
    pub fn from_parts(current: impl Into<String>, previous: Option<String>) -> Self {
        Self {
            current: current.into(),
            previous,
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    /// Shift `current` into `previous` when `fresh` differs.
    /// Returns whether a rotation happened.
    pub fn rotate(&mut self, fresh: &str) -> bool {
        if self.current == fresh {
            return false;
        }
        let old = std::mem::replace(&mut self.current, fresh.to_string());
        self.previous = Some(old);
        true
    }

    /// Never rotated, or rotated to a different digest
    pub fn has_changed(&self) -> bool {
        self.previous.as_deref() != Some(self.current.as_str())
    }
}

/// Which artifact families are generated for a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationFlags {
    pub generate_entity: bool,
    pub generate_repository: bool,
    pub generate_controller: bool,
    pub generate_react_ui: bool,
    pub generate_stored_procedures: bool,
    pub generate_cqrs: bool,
}

impl Default for GenerationFlags {
    fn default() -> Self {
        Self {
            generate_entity: true,
            generate_repository: true,
            generate_controller: true,
            generate_react_ui: false,
            generate_stored_procedures: true,
            generate_cqrs: true,
        }
    }
}

impl GenerationFlags {
    pub fn any(&self) -> bool {
        self.generate_entity
            || self.generate_repository
            || self.generate_controller
            || self.generate_react_ui
            || self.generate_stored_procedures
            || self.generate_cqrs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    pub id: Uuid,
    /// `schema.table`
    pub natural_key: String,
    pub table_name: String,
    pub schema_name: String,
    pub hash: HashState,
    pub is_active: bool,
    pub last_generated: Option<DateTime<Utc>>,
    pub last_synced: DateTime<Utc>,
    pub flags: GenerationFlags,
}

impl TableMetadata {
    pub fn new(schema_name: &str, table_name: &str, hash: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            natural_key: table_key(schema_name, table_name),
            table_name: table_name.to_string(),
            schema_name: schema_name.to_string(),
            hash: HashState::new(hash),
            is_active: true,
            last_generated: None,
            last_synced: now,
            flags: GenerationFlags::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    pub id: Uuid,
    pub table_id: Uuid,
    /// `schema.table.column`
    pub natural_key: String,
    pub column_name: String,
    pub data_type: String,
    pub max_length: Option<i32>,
    pub precision: Option<i32>,
    pub scale: Option<i32>,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_identity: bool,
    pub is_computed: bool,
    pub is_foreign_key: bool,
    pub referenced_table: Option<String>,
    pub referenced_column: Option<String>,
    pub prefix: Convention,
    pub hash: HashState,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexColumnMetadata {
    pub column_name: String,
    /// 1-based position within the key; included columns follow the key columns
    pub key_ordinal: i32,
    pub is_descending: bool,
    pub is_included: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMetadata {
    pub id: Uuid,
    pub table_id: Uuid,
    /// `schema.table.index`
    pub natural_key: String,
    pub index_name: String,
    pub is_unique: bool,
    pub is_clustered: bool,
    pub columns: Vec<IndexColumnMetadata>,
    pub hash: HashState,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipMetadata {
    pub id: Uuid,
    /// `parentTable.parentColumn->childTable.childColumn`
    pub natural_key: String,
    pub foreign_key_name: String,
    pub parent_table: String,
    pub parent_column: String,
    pub child_table: String,
    pub child_column: String,
    pub relationship_type: RelationshipType,
    pub on_delete: String,
    pub on_update: String,
    pub hash: HashState,
    pub is_active: bool,
}

pub fn table_key(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table)
}

pub fn column_key(schema: &str, table: &str, column: &str) -> String {
    format!("{}.{}.{}", schema, table, column)
}

pub fn index_key(schema: &str, table: &str, index: &str) -> String {
    format!("{}.{}.{}", schema, table, index)
}
