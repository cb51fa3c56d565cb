//! Structural hashes
//!
//! SHA-256 over a canonical JSON rendering of the fields that define an
//! entity's shape. Timestamps, conventions and free-form properties are left
//! out so that re-introspecting an unchanged schema reproduces every digest.

use crate::introspection::{Column, Index, Relationship, Table};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

fn digest(value: &Value) -> String {
    // serde_json maps are key-sorted, so the rendering is canonical
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn column_shape(column: &Column) -> Value {
    json!({
        "name": column.name,
        "dataType": column.data_type,
        "maxLength": column.max_length,
        "precision": column.precision,
        "scale": column.scale,
        "isNullable": column.is_nullable,
        "isPrimaryKey": column.is_primary_key,
        "isIdentity": column.is_identity,
        "isComputed": column.is_computed,
        "isForeignKey": column.is_foreign_key,
        "referencedTable": column.referenced_table,
        "referencedColumn": column.referenced_column,
    })
}

fn index_shape(index: &Index) -> Value {
    json!({
        "name": index.name,
        "isUnique": index.is_unique,
        "isClustered": index.is_clustered,
        "columns": index.columns,
        "includedColumns": index.included_columns,
        "descendingColumns": index.descending_columns,
    })
}

/// Hash of the table's column set, key flags and index set.
/// Column and index order do not affect the result.
pub fn table_hash(table: &Table) -> String {
    let mut columns: Vec<&Column> = table.columns.iter().collect();
    columns.sort_by(|a, b| a.name.cmp(&b.name));
    let mut indexes: Vec<&Index> = table.indexes.iter().collect();
    indexes.sort_by(|a, b| a.name.cmp(&b.name));

    digest(&json!({
        "schemaName": table.schema_name,
        "name": table.name,
        "primaryKeyColumns": table.primary_key_columns,
        "columns": columns.into_iter().map(column_shape).collect::<Vec<_>>(),
        "indexes": indexes.into_iter().map(index_shape).collect::<Vec<_>>(),
    }))
}

pub fn column_hash(column: &Column) -> String {
    digest(&column_shape(column))
}

pub fn index_hash(index: &Index) -> String {
    digest(&index_shape(index))
}

pub fn relationship_hash(relationship: &Relationship) -> String {
    digest(&json!({
        "key": relationship.key(),
        "relationshipType": relationship.relationship_type,
        "onDelete": relationship.on_delete,
        "onUpdate": relationship.on_update,
    }))
}
