//! Render context
//!
//! The data each artifact template sees for one table: its columns with
//! resolved conventions plus the relationships it takes part in.

use crate::convention::{Convention, ConventionResolver};
use crate::introspection::{Column, Index, Relationship, SchemaSnapshot, Table};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnContext {
    pub name: String,
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
    pub convention: Convention,
    /// `ENO`, `CLC`, ... or `None` for plain columns
    pub convention_code: Option<&'static str>,
    pub is_read_only: bool,
    pub excluded_from_update: bool,
}

impl ColumnContext {
    fn new(column: &Column, convention: Convention) -> Self {
        Self {
            name: column.name.clone(),
            data_type: column.data_type.clone(),
            max_length: column.max_length,
            precision: column.precision,
            scale: column.scale,
            is_nullable: column.is_nullable,
            is_primary_key: column.is_primary_key,
            is_identity: column.is_identity,
            is_computed: column.is_computed,
            is_foreign_key: column.is_foreign_key,
            referenced_table: column.referenced_table.clone(),
            referenced_column: column.referenced_column.clone(),
            convention,
            convention_code: convention.code(),
            is_read_only: convention.is_read_only() || column.is_computed,
            excluded_from_update: convention.excluded_from_update()
                || column.is_computed
                || column.is_identity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableContext {
    pub name: String,
    pub schema: String,
    pub columns: Vec<ColumnContext>,
    pub primary_key_columns: Vec<String>,
    pub indexes: Vec<Index>,
    /// Relationships where this table is the child
    pub parents: Vec<Relationship>,
    /// Relationships where this table is the parent
    pub children: Vec<Relationship>,
}

impl TableContext {
    pub fn build(table: &Table, snapshot: &SchemaSnapshot, resolver: &ConventionResolver) -> Self {
        let columns = table
            .columns
            .iter()
            .map(|col| {
                // A stored convention survives when no rule fires on reload
                let resolved = match resolver.resolve(&col.name, Some(&col.extended_properties)) {
                    Convention::None => col.convention,
                    found => found,
                };
                ColumnContext::new(col, resolved)
            })
            .collect();

        let (parents, children): (Vec<Relationship>, Vec<Relationship>) = snapshot
            .relationships_for(&table.name)
            .cloned()
            .partition(|r| r.child_table == table.name);

        Self {
            name: table.name.clone(),
            schema: table.schema_name.clone(),
            columns,
            primary_key_columns: table.primary_key_columns.clone(),
            indexes: table.indexes.clone(),
            parents,
            children,
        }
    }
}
