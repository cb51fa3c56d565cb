//! PostgreSQL metadata repository
//!
//! Persists metadata records in the c_table / c_column / c_index /
//! c_index_column / c_relationship tables and the generation log in
//! c_generation_history, creating them on first use.

use super::history::{GenerationHistoryRecord, GenerationOutcome};
use super::records::{
    ColumnMetadata, GenerationFlags, HashState, IndexColumnMetadata, IndexMetadata,
    RelationshipMetadata, TableMetadata,
};
use super::state::MetadataState;
use super::store::MetadataRepository;
use crate::convention::Convention;
use crate::error::{not_found_error, AppResult};
use crate::introspection::RelationshipType;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS c_table (
    id UUID PRIMARY KEY,
    natural_key TEXT NOT NULL UNIQUE,
    table_name TEXT NOT NULL,
    schema_name TEXT NOT NULL,
    schema_hash TEXT NOT NULL,
    schema_hash_previous TEXT,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    last_generated TIMESTAMPTZ,
    last_synced TIMESTAMPTZ NOT NULL,
    generate_entity BOOLEAN NOT NULL DEFAULT TRUE,
    generate_repository BOOLEAN NOT NULL DEFAULT TRUE,
    generate_controller BOOLEAN NOT NULL DEFAULT TRUE,
    generate_react_ui BOOLEAN NOT NULL DEFAULT FALSE,
    generate_stored_procedures BOOLEAN NOT NULL DEFAULT TRUE,
    generate_cqrs BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS c_column (
    id UUID PRIMARY KEY,
    table_id UUID NOT NULL REFERENCES c_table(id),
    natural_key TEXT NOT NULL UNIQUE,
    column_name TEXT NOT NULL,
    data_type TEXT NOT NULL,
    max_length INT,
    precision INT,
    scale INT,
    is_nullable BOOLEAN NOT NULL,
    is_primary_key BOOLEAN NOT NULL,
    is_identity BOOLEAN NOT NULL,
    is_computed BOOLEAN NOT NULL,
    is_foreign_key BOOLEAN NOT NULL,
    referenced_table TEXT,
    referenced_column TEXT,
    prefix TEXT NOT NULL,
    column_hash TEXT NOT NULL,
    column_hash_previous TEXT,
    is_active BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS c_index (
    id UUID PRIMARY KEY,
    table_id UUID NOT NULL REFERENCES c_table(id),
    natural_key TEXT NOT NULL UNIQUE,
    index_name TEXT NOT NULL,
    is_unique BOOLEAN NOT NULL,
    is_clustered BOOLEAN NOT NULL,
    index_hash TEXT NOT NULL,
    index_hash_previous TEXT,
    is_active BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS c_index_column (
    index_id UUID NOT NULL REFERENCES c_index(id) ON DELETE CASCADE,
    column_name TEXT NOT NULL,
    key_ordinal INT NOT NULL,
    is_descending BOOLEAN NOT NULL,
    is_included BOOLEAN NOT NULL,
    PRIMARY KEY (index_id, key_ordinal)
);

CREATE TABLE IF NOT EXISTS c_relationship (
    id UUID PRIMARY KEY,
    natural_key TEXT NOT NULL UNIQUE,
    foreign_key_name TEXT NOT NULL,
    parent_table TEXT NOT NULL,
    parent_column TEXT NOT NULL,
    child_table TEXT NOT NULL,
    child_column TEXT NOT NULL,
    relationship_type TEXT NOT NULL,
    on_delete TEXT NOT NULL,
    on_update TEXT NOT NULL,
    relationship_hash TEXT NOT NULL,
    relationship_hash_previous TEXT,
    is_active BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS c_generation_history (
    id UUID PRIMARY KEY,
    schema_name TEXT NOT NULL,
    table_name TEXT NOT NULL,
    artifact TEXT NOT NULL,
    output_path TEXT NOT NULL,
    outcome TEXT NOT NULL,
    error TEXT,
    generated_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_generation_history_table
    ON c_generation_history (table_name, generated_at DESC);
"#;

pub struct PostgresMetadataRepository {
    pool: Pool,
}

impl PostgresMetadataRepository {
    /// Connect the repository and create the metadata tables if missing
    pub async fn new(pool: Pool) -> AppResult<Self> {
        let client = pool.get().await?;
        client.batch_execute(SCHEMA_SQL).await?;
        info!("Metadata tables ready");
        Ok(Self { pool })
    }
}

impl MetadataRepository for PostgresMetadataRepository {
    async fn load(&self) -> AppResult<MetadataState> {
        let client = self.pool.get().await?;
        let mut state = MetadataState::default();

        let rows = client
            .query(
                "SELECT id, natural_key, table_name, schema_name, schema_hash, schema_hash_previous,
                        is_active, last_generated, last_synced, generate_entity, generate_repository,
                        generate_controller, generate_react_ui, generate_stored_procedures, generate_cqrs
                 FROM c_table",
                &[],
            )
            .await?;
        for row in rows {
            let record = TableMetadata {
                id: row.get(0),
                natural_key: row.get(1),
                table_name: row.get(2),
                schema_name: row.get(3),
                hash: HashState::from_parts(row.get::<_, String>(4), row.get(5)),
                is_active: row.get(6),
                last_generated: row.get(7),
                last_synced: row.get(8),
                flags: GenerationFlags {
                    generate_entity: row.get(9),
                    generate_repository: row.get(10),
                    generate_controller: row.get(11),
                    generate_react_ui: row.get(12),
                    generate_stored_procedures: row.get(13),
                    generate_cqrs: row.get(14),
                },
            };
            state.tables.insert(record.natural_key.clone(), record);
        }

        let rows = client
            .query(
                "SELECT id, table_id, natural_key, column_name, data_type, max_length, precision, scale,
                        is_nullable, is_primary_key, is_identity, is_computed, is_foreign_key,
                        referenced_table, referenced_column, prefix, column_hash, column_hash_previous,
                        is_active
                 FROM c_column",
                &[],
            )
            .await?;
        for row in rows {
            let record = ColumnMetadata {
                id: row.get(0),
                table_id: row.get(1),
                natural_key: row.get(2),
                column_name: row.get(3),
                data_type: row.get(4),
                max_length: row.get(5),
                precision: row.get(6),
                scale: row.get(7),
                is_nullable: row.get(8),
                is_primary_key: row.get(9),
                is_identity: row.get(10),
                is_computed: row.get(11),
                is_foreign_key: row.get(12),
                referenced_table: row.get(13),
                referenced_column: row.get(14),
                prefix: row
                    .get::<_, String>(15)
                    .parse()
                    .unwrap_or(Convention::None),
                hash: HashState::from_parts(row.get::<_, String>(16), row.get(17)),
                is_active: row.get(18),
            };
            state.columns.insert(record.natural_key.clone(), record);
        }

        let mut index_columns: BTreeMap<Uuid, Vec<IndexColumnMetadata>> = BTreeMap::new();
        let rows = client
            .query(
                "SELECT index_id, column_name, key_ordinal, is_descending, is_included
                 FROM c_index_column ORDER BY index_id, key_ordinal",
                &[],
            )
            .await?;
        for row in rows {
            index_columns
                .entry(row.get(0))
                .or_default()
                .push(IndexColumnMetadata {
                    column_name: row.get(1),
                    key_ordinal: row.get(2),
                    is_descending: row.get(3),
                    is_included: row.get(4),
                });
        }

        let rows = client
            .query(
                "SELECT id, table_id, natural_key, index_name, is_unique, is_clustered,
                        index_hash, index_hash_previous, is_active
                 FROM c_index",
                &[],
            )
            .await?;
        for row in rows {
            let id: Uuid = row.get(0);
            let record = IndexMetadata {
                id,
                table_id: row.get(1),
                natural_key: row.get(2),
                index_name: row.get(3),
                is_unique: row.get(4),
                is_clustered: row.get(5),
                columns: index_columns.remove(&id).unwrap_or_default(),
                hash: HashState::from_parts(row.get::<_, String>(6), row.get(7)),
                is_active: row.get(8),
            };
            state.indexes.insert(record.natural_key.clone(), record);
        }

        let rows = client
            .query(
                "SELECT id, natural_key, foreign_key_name, parent_table, parent_column, child_table,
                        child_column, relationship_type, on_delete, on_update, relationship_hash,
                        relationship_hash_previous, is_active
                 FROM c_relationship",
                &[],
            )
            .await?;
        for row in rows {
            let record = RelationshipMetadata {
                id: row.get(0),
                natural_key: row.get(1),
                foreign_key_name: row.get(2),
                parent_table: row.get(3),
                parent_column: row.get(4),
                child_table: row.get(5),
                child_column: row.get(6),
                relationship_type: relationship_type_from_str(&row.get::<_, String>(7)),
                on_delete: row.get(8),
                on_update: row.get(9),
                hash: HashState::from_parts(row.get::<_, String>(10), row.get(11)),
                is_active: row.get(12),
            };
            state.relationships.insert(record.natural_key.clone(), record);
        }

        debug!(
            "Loaded metadata: {} tables, {} columns, {} indexes, {} relationships",
            state.tables.len(),
            state.columns.len(),
            state.indexes.len(),
            state.relationships.len()
        );
        Ok(state)
    }

    async fn persist(&self, state: &MetadataState) -> AppResult<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        for t in state.tables.values() {
            tx.execute(
                "INSERT INTO c_table (id, natural_key, table_name, schema_name, schema_hash,
                        schema_hash_previous, is_active, last_generated, last_synced, generate_entity,
                        generate_repository, generate_controller, generate_react_ui,
                        generate_stored_procedures, generate_cqrs)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                 ON CONFLICT (natural_key) DO UPDATE SET
                    schema_hash = EXCLUDED.schema_hash,
                    schema_hash_previous = EXCLUDED.schema_hash_previous,
                    is_active = EXCLUDED.is_active,
                    last_generated = EXCLUDED.last_generated,
                    last_synced = EXCLUDED.last_synced,
                    generate_entity = EXCLUDED.generate_entity,
                    generate_repository = EXCLUDED.generate_repository,
                    generate_controller = EXCLUDED.generate_controller,
                    generate_react_ui = EXCLUDED.generate_react_ui,
                    generate_stored_procedures = EXCLUDED.generate_stored_procedures,
                    generate_cqrs = EXCLUDED.generate_cqrs",
                &[
                    &t.id,
                    &t.natural_key,
                    &t.table_name,
                    &t.schema_name,
                    &t.hash.current(),
                    &t.hash.previous(),
                    &t.is_active,
                    &t.last_generated,
                    &t.last_synced,
                    &t.flags.generate_entity,
                    &t.flags.generate_repository,
                    &t.flags.generate_controller,
                    &t.flags.generate_react_ui,
                    &t.flags.generate_stored_procedures,
                    &t.flags.generate_cqrs,
                ],
            )
            .await?;
        }

        for c in state.columns.values() {
            let prefix = c.prefix.to_string();
            tx.execute(
                "INSERT INTO c_column (id, table_id, natural_key, column_name, data_type, max_length,
                        precision, scale, is_nullable, is_primary_key, is_identity, is_computed,
                        is_foreign_key, referenced_table, referenced_column, prefix, column_hash,
                        column_hash_previous, is_active)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
                 ON CONFLICT (natural_key) DO UPDATE SET
                    table_id = EXCLUDED.table_id,
                    data_type = EXCLUDED.data_type,
                    max_length = EXCLUDED.max_length,
                    precision = EXCLUDED.precision,
                    scale = EXCLUDED.scale,
                    is_nullable = EXCLUDED.is_nullable,
                    is_primary_key = EXCLUDED.is_primary_key,
                    is_identity = EXCLUDED.is_identity,
                    is_computed = EXCLUDED.is_computed,
                    is_foreign_key = EXCLUDED.is_foreign_key,
                    referenced_table = EXCLUDED.referenced_table,
                    referenced_column = EXCLUDED.referenced_column,
                    prefix = EXCLUDED.prefix,
                    column_hash = EXCLUDED.column_hash,
                    column_hash_previous = EXCLUDED.column_hash_previous,
                    is_active = EXCLUDED.is_active",
                &[
                    &c.id,
                    &c.table_id,
                    &c.natural_key,
                    &c.column_name,
                    &c.data_type,
                    &c.max_length,
                    &c.precision,
                    &c.scale,
                    &c.is_nullable,
                    &c.is_primary_key,
                    &c.is_identity,
                    &c.is_computed,
                    &c.is_foreign_key,
                    &c.referenced_table,
                    &c.referenced_column,
                    &prefix,
                    &c.hash.current(),
                    &c.hash.previous(),
                    &c.is_active,
                ],
            )
            .await?;
        }

        for i in state.indexes.values() {
            tx.execute(
                "INSERT INTO c_index (id, table_id, natural_key, index_name, is_unique, is_clustered,
                        index_hash, index_hash_previous, is_active)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (natural_key) DO UPDATE SET
                    table_id = EXCLUDED.table_id,
                    is_unique = EXCLUDED.is_unique,
                    is_clustered = EXCLUDED.is_clustered,
                    index_hash = EXCLUDED.index_hash,
                    index_hash_previous = EXCLUDED.index_hash_previous,
                    is_active = EXCLUDED.is_active",
                &[
                    &i.id,
                    &i.table_id,
                    &i.natural_key,
                    &i.index_name,
                    &i.is_unique,
                    &i.is_clustered,
                    &i.hash.current(),
                    &i.hash.previous(),
                    &i.is_active,
                ],
            )
            .await?;

            tx.execute("DELETE FROM c_index_column WHERE index_id = $1", &[&i.id])
                .await?;
            for col in &i.columns {
                tx.execute(
                    "INSERT INTO c_index_column (index_id, column_name, key_ordinal, is_descending, is_included)
                     VALUES ($1, $2, $3, $4, $5)",
                    &[
                        &i.id,
                        &col.column_name,
                        &col.key_ordinal,
                        &col.is_descending,
                        &col.is_included,
                    ],
                )
                .await?;
            }
        }

        for r in state.relationships.values() {
            let relationship_type = relationship_type_to_str(r.relationship_type);
            tx.execute(
                "INSERT INTO c_relationship (id, natural_key, foreign_key_name, parent_table,
                        parent_column, child_table, child_column, relationship_type, on_delete,
                        on_update, relationship_hash, relationship_hash_previous, is_active)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                 ON CONFLICT (natural_key) DO UPDATE SET
                    foreign_key_name = EXCLUDED.foreign_key_name,
                    relationship_type = EXCLUDED.relationship_type,
                    on_delete = EXCLUDED.on_delete,
                    on_update = EXCLUDED.on_update,
                    relationship_hash = EXCLUDED.relationship_hash,
                    relationship_hash_previous = EXCLUDED.relationship_hash_previous,
                    is_active = EXCLUDED.is_active",
                &[
                    &r.id,
                    &r.natural_key,
                    &r.foreign_key_name,
                    &r.parent_table,
                    &r.parent_column,
                    &r.child_table,
                    &r.child_column,
                    &relationship_type,
                    &r.on_delete,
                    &r.on_update,
                    &r.hash.current(),
                    &r.hash.previous(),
                    &r.is_active,
                ],
            )
            .await?;
        }

        tx.commit().await?;
        debug!("Persisted {} table records", state.tables.len());
        Ok(())
    }

    async fn mark_generated(&self, table_keys: &[String], at: DateTime<Utc>) -> AppResult<()> {
        let keys: Vec<String> = table_keys
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let updated = tx
            .execute(
                "UPDATE c_table SET last_generated = $1 WHERE natural_key = ANY($2)",
                &[&at, &keys],
            )
            .await?;
        if updated != keys.len() as u64 {
            // Dropping the transaction rolls the stamps back
            return Err(not_found_error(format!(
                "Table metadata for {} of {} keys",
                keys.len() as u64 - updated,
                keys.len()
            )));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn record_history(&self, records: &[GenerationHistoryRecord]) -> AppResult<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        for r in records {
            tx.execute(
                "INSERT INTO c_generation_history (id, schema_name, table_name, artifact, output_path,
                        outcome, error, generated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                &[
                    &r.id,
                    &r.schema_name,
                    &r.table_name,
                    &r.artifact,
                    &r.output_path,
                    &r.outcome.as_str(),
                    &r.error,
                    &r.generated_at,
                ],
            )
            .await?;
        }
        tx.commit().await?;
        debug!("Recorded {} generation history entries", records.len());
        Ok(())
    }

    async fn history(&self, table_name: Option<&str>) -> AppResult<Vec<GenerationHistoryRecord>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, schema_name, table_name, artifact, output_path, outcome, error, generated_at
                 FROM c_generation_history
                 WHERE $1::TEXT IS NULL OR table_name = $1
                 ORDER BY generated_at DESC",
                &[&table_name],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| GenerationHistoryRecord {
                id: row.get(0),
                schema_name: row.get(1),
                table_name: row.get(2),
                artifact: row.get(3),
                output_path: row.get(4),
                outcome: GenerationOutcome::parse(&row.get::<_, String>(5)),
                error: row.get(6),
                generated_at: row.get(7),
            })
            .collect())
    }
}

fn relationship_type_to_str(kind: RelationshipType) -> &'static str {
    match kind {
        RelationshipType::OneToMany => "OneToMany",
        RelationshipType::OneToOne => "OneToOne",
        RelationshipType::ManyToMany => "ManyToMany",
    }
}

fn relationship_type_from_str(value: &str) -> RelationshipType {
    match value {
        "OneToOne" => RelationshipType::OneToOne,
        "ManyToMany" => RelationshipType::ManyToMany,
        _ => RelationshipType::OneToMany,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_type_text_round_trip() {
        for kind in [
            RelationshipType::OneToMany,
            RelationshipType::OneToOne,
            RelationshipType::ManyToMany,
        ] {
            assert_eq!(relationship_type_from_str(relationship_type_to_str(kind)), kind);
        }
    }

    #[test]
    fn test_schema_creates_every_metadata_table() {
        for table in [
            "c_table",
            "c_column",
            "c_index",
            "c_index_column",
            "c_relationship",
            "c_generation_history",
        ] {
            assert!(SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", table)));
        }
    }
}
