//! Schema Introspection Module
//!
//! The schema snapshot model and the introspectors that produce it.
//! A snapshot is an immutable, point-in-time description of a database;
//! it is created fresh on every introspection and owned by the caller.

use crate::convention::{ConventionResolver, ExtendedProperties};
use crate::error::{validation_error, AppResult};
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use tracing::{debug, warn};

/// Complete schema snapshot at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSnapshot {
    database_name: String,
    server_name: String,
    version: String,
    analyzed_at: DateTime<Utc>,
    tables: Vec<Table>,
    relationships: Vec<Relationship>,
}

impl SchemaSnapshot {
    /// Build a snapshot, rejecting duplicate table, column, index or
    /// relationship keys (the diff and metadata layers key by name)
    pub fn new(
        database_name: impl Into<String>,
        server_name: impl Into<String>,
        version: impl Into<String>,
        analyzed_at: DateTime<Utc>,
        tables: Vec<Table>,
        relationships: Vec<Relationship>,
    ) -> AppResult<Self> {
        let snapshot = Self {
            database_name: database_name.into(),
            server_name: server_name.into(),
            version: version.into(),
            analyzed_at,
            tables,
            relationships,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn analyzed_at(&self) -> DateTime<Utc> {
        self.analyzed_at
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Look up a table by name
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Relationships in which `table` is the parent or the child
    pub fn relationships_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Relationship> {
        self.relationships
            .iter()
            .filter(move |r| r.parent_table == table || r.child_table == table)
    }

    /// Serialize to indented JSON (the snapshot file format)
    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON and re-check the naming invariants
    pub fn from_json(json: &str) -> AppResult<Self> {
        let snapshot: SchemaSnapshot = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn validate(&self) -> AppResult<()> {
        let mut table_names = HashSet::new();
        for table in &self.tables {
            if table.name.trim().is_empty() {
                return Err(validation_error("Table name must not be empty"));
            }
            if !table_names.insert(table.name.as_str()) {
                return Err(validation_error(format!(
                    "Duplicate table name '{}' in snapshot of {}",
                    table.name, self.database_name
                )));
            }
            table.validate()?;
        }

        let mut keys = HashSet::new();
        for rel in &self.relationships {
            if !keys.insert(rel.key()) {
                return Err(validation_error(format!(
                    "Duplicate relationship {}",
                    rel.key()
                )));
            }
        }
        Ok(())
    }
}

/// Table representation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub name: String,
    pub schema_name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub primary_key_columns: Vec<String>,
}

impl Table {
    /// `schema.name`, the natural key used by the metadata store
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn validate(&self) -> AppResult<()> {
        let mut seen = HashSet::new();
        for col in &self.columns {
            if !seen.insert(col.name.as_str()) {
                return Err(validation_error(format!(
                    "Duplicate column '{}' in table {}",
                    col.name, self.name
                )));
            }
        }
        let mut seen = HashSet::new();
        for idx in &self.indexes {
            if !seen.insert(idx.name.as_str()) {
                return Err(validation_error(format!(
                    "Duplicate index '{}' in table {}",
                    idx.name, self.name
                )));
            }
        }
        Ok(())
    }
}

/// Column representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<i32>,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_identity: bool,
    pub is_computed: bool,
    pub is_foreign_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_column: Option<String>,
    #[serde(default)]
    pub convention: crate::convention::Convention,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extended_properties: ExtendedProperties,
}

impl Default for Column {
    fn default() -> Self {
        Self {
            name: String::new(),
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
            convention: Default::default(),
            extended_properties: BTreeMap::new(),
        }
    }
}

/// Index representation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub name: String,
    pub is_unique: bool,
    pub is_clustered: bool,
    /// Key columns in key order
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub included_columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub descending_columns: Vec<String>,
}

/// Cardinality of a foreign-key relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RelationshipType {
    #[default]
    OneToMany,
    OneToOne,
    ManyToMany,
}

/// Foreign key relationship, one per parent/child column pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub foreign_key_name: String,
    pub parent_table: String,
    pub parent_column: String,
    pub child_table: String,
    pub child_column: String,
    #[serde(default)]
    pub relationship_type: RelationshipType,
    #[serde(default = "default_referential_action")]
    pub on_delete: String,
    #[serde(default = "default_referential_action")]
    pub on_update: String,
}

fn default_referential_action() -> String {
    "NoAction".to_string()
}

impl Relationship {
    /// Identity key: `parentTable.parentColumn->childTable.childColumn`.
    /// The constraint name is not part of it since tooling may regenerate it.
    pub fn key(&self) -> String {
        format!(
            "{}.{}->{}.{}",
            self.parent_table, self.parent_column, self.child_table, self.child_column
        )
    }
}

/// Source of fresh schema snapshots
pub trait Introspector: Send + Sync {
    fn introspect(&self) -> impl Future<Output = AppResult<SchemaSnapshot>> + Send;
}

/// Parse a `key=value;key=value` column comment into extended properties
pub fn parse_extended_properties(comment: &str) -> ExtendedProperties {
    comment
        .split(';')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Schema introspector for PostgreSQL
pub struct PostgresIntrospector {
    pool: Pool,
    resolver: ConventionResolver,
}

impl PostgresIntrospector {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            resolver: ConventionResolver::new(),
        }
    }

    /// Introspect the complete schema from a PostgreSQL database
    async fn snapshot(&self) -> AppResult<SchemaSnapshot> {
        let client = self.pool.get().await?;

        let info = client
            .query_one(
                "SELECT current_database()::text AS database_name,
                        COALESCE(inet_server_addr()::text, 'local') AS server_name,
                        version() AS version",
                &[],
            )
            .await?;

        let mut tables = self.get_tables(&client).await?;
        let mut indexes = Self::get_indexes(&client).await?;
        for table in &mut tables {
            table.indexes = indexes.remove(&table.qualified_name()).unwrap_or_default();
        }

        let relationships = Self::get_relationships(&client, &mut tables).await?;

        let snapshot = SchemaSnapshot::new(
            info.get::<_, String>("database_name"),
            info.get::<_, String>("server_name"),
            info.get::<_, String>("version"),
            Utc::now(),
            tables,
            relationships,
        )?;

        debug!(
            "Introspected schema with {} tables, {} relationships",
            snapshot.tables().len(),
            snapshot.relationships().len()
        );

        Ok(snapshot)
    }

    /// Get all tables with columns and primary keys
    async fn get_tables(&self, client: &deadpool_postgres::Client) -> AppResult<Vec<Table>> {
        let table_query = r#"
            SELECT
                t.table_schema::text AS table_schema,
                t.table_name::text AS table_name
            FROM information_schema.tables t
            WHERE t.table_schema NOT IN ('pg_catalog', 'information_schema')
              AND t.table_type = 'BASE TABLE'
              AND t.table_name NOT LIKE 'c\_%'
            ORDER BY t.table_schema, t.table_name
        "#;

        let table_rows = client.query(table_query, &[]).await?;
        let mut tables = Vec::new();
        let mut seen = HashSet::new();

        for row in table_rows {
            let schema: String = row.get("table_schema");
            let name: String = row.get("table_name");

            // Snapshots key tables by bare name; the first schema wins
            if !seen.insert(name.clone()) {
                warn!("Skipping {}.{}: table name already introspected from another schema", schema, name);
                continue;
            }

            let primary_key_columns = Self::get_primary_key(client, &schema, &name).await?;
            let mut columns = self.get_columns(client, &schema, &name).await?;
            for col in &mut columns {
                col.is_primary_key = primary_key_columns.contains(&col.name);
            }

            tables.push(Table {
                name,
                schema_name: schema,
                columns,
                indexes: Vec::new(),
                primary_key_columns,
            });
        }

        Ok(tables)
    }

    /// Get columns for a table
    async fn get_columns(
        &self,
        client: &deadpool_postgres::Client,
        schema: &str,
        table: &str,
    ) -> AppResult<Vec<Column>> {
        let query = r#"
            SELECT
                c.column_name::text AS column_name,
                c.data_type::text AS data_type,
                c.character_maximum_length::int4 AS max_length,
                c.numeric_precision::int4 AS precision,
                c.numeric_scale::int4 AS scale,
                c.is_nullable::text AS is_nullable,
                c.is_identity::text AS is_identity,
                c.is_generated::text AS is_generated,
                col_description(
                    format('%I.%I', c.table_schema, c.table_name)::regclass,
                    c.ordinal_position::int4
                ) AS comment
            FROM information_schema.columns c
            WHERE c.table_schema = $1 AND c.table_name = $2
            ORDER BY c.ordinal_position
        "#;

        let rows = client.query(query, &[&schema, &table]).await?;

        let columns = rows
            .iter()
            .map(|row| {
                let name: String = row.get("column_name");
                let extended_properties = row
                    .get::<_, Option<String>>("comment")
                    .map(|c| parse_extended_properties(&c))
                    .unwrap_or_default();
                let convention = self.resolver.resolve(&name, Some(&extended_properties));

                Column {
                    data_type: row.get("data_type"),
                    max_length: row.get("max_length"),
                    precision: row.get("precision"),
                    scale: row.get("scale"),
                    is_nullable: row.get::<_, String>("is_nullable") == "YES",
                    is_primary_key: false,
                    is_identity: row.get::<_, String>("is_identity") == "YES",
                    is_computed: row.get::<_, String>("is_generated") == "ALWAYS",
                    is_foreign_key: false,
                    referenced_table: None,
                    referenced_column: None,
                    convention,
                    extended_properties,
                    name,
                }
            })
            .collect();

        Ok(columns)
    }

    /// Get primary key columns for a table, in key order
    async fn get_primary_key(
        client: &deadpool_postgres::Client,
        schema: &str,
        table: &str,
    ) -> AppResult<Vec<String>> {
        let query = r#"
            SELECT kcu.column_name::text AS column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
                AND tc.table_name = kcu.table_name
            WHERE tc.constraint_type = 'PRIMARY KEY'
                AND tc.table_schema = $1
                AND tc.table_name = $2
            ORDER BY kcu.ordinal_position
        "#;

        let rows = client.query(query, &[&schema, &table]).await?;
        Ok(rows.iter().map(|row| row.get("column_name")).collect())
    }

    /// Get all indexes keyed by `schema.table`
    async fn get_indexes(
        client: &deadpool_postgres::Client,
    ) -> AppResult<HashMap<String, Vec<Index>>> {
        let query = r#"
            SELECT
                n.nspname::text AS schema_name,
                t.relname::text AS table_name,
                i.relname::text AS index_name,
                ix.indisunique AS is_unique,
                ix.indisclustered AS is_clustered,
                ix.indnkeyatts::int4 AS key_count,
                k.ord::int4 AS ord,
                a.attname::text AS column_name,
                COALESCE(ix.indoption[k.ord - 1]::int4, 0) AS options
            FROM pg_index ix
            JOIN pg_class t ON t.oid = ix.indrelid
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
            WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
              AND t.relkind = 'r'
            ORDER BY n.nspname, t.relname, i.relname, k.ord
        "#;

        let rows = client.query(query, &[]).await?;
        let mut by_table: HashMap<String, Vec<Index>> = HashMap::new();

        for row in rows {
            let table_key = format!(
                "{}.{}",
                row.get::<_, String>("schema_name"),
                row.get::<_, String>("table_name")
            );
            let index_name: String = row.get("index_name");
            let ord: i32 = row.get("ord");
            let key_count: i32 = row.get("key_count");
            let column: String = row.get("column_name");
            let options: i32 = row.get("options");

            let indexes = by_table.entry(table_key).or_default();
            if indexes.last().map(|i| i.name != index_name).unwrap_or(true) {
                indexes.push(Index {
                    name: index_name,
                    is_unique: row.get("is_unique"),
                    is_clustered: row.get("is_clustered"),
                    columns: Vec::new(),
                    included_columns: None,
                    descending_columns: Vec::new(),
                });
            }
            let Some(index) = indexes.last_mut() else {
                continue;
            };

            if ord > key_count {
                index.included_columns.get_or_insert_with(Vec::new).push(column);
            } else {
                // indoption bit 0 is DESC
                if options & 1 == 1 {
                    index.descending_columns.push(column.clone());
                }
                index.columns.push(column);
            }
        }

        Ok(by_table)
    }

    /// Get all foreign keys as column-pair relationships, flagging the
    /// child columns on the way
    async fn get_relationships(
        client: &deadpool_postgres::Client,
        tables: &mut [Table],
    ) -> AppResult<Vec<Relationship>> {
        let query = r#"
            SELECT
                con.conname::text AS constraint_name,
                child.relname::text AS child_table,
                child_att.attname::text AS child_column,
                parent.relname::text AS parent_table,
                parent_att.attname::text AS parent_column,
                con.confdeltype::text AS on_delete,
                con.confupdtype::text AS on_update
            FROM pg_constraint con
            JOIN pg_class child ON child.oid = con.conrelid
            JOIN pg_class parent ON parent.oid = con.confrelid
            JOIN pg_namespace n ON n.oid = child.relnamespace
            CROSS JOIN LATERAL unnest(con.conkey, con.confkey) AS k(child_attnum, parent_attnum)
            JOIN pg_attribute child_att
                ON child_att.attrelid = con.conrelid AND child_att.attnum = k.child_attnum
            JOIN pg_attribute parent_att
                ON parent_att.attrelid = con.confrelid AND parent_att.attnum = k.parent_attnum
            WHERE con.contype = 'f'
              AND n.nspname NOT IN ('pg_catalog', 'information_schema')
            ORDER BY child.relname, con.conname
        "#;

        let rows = client.query(query, &[]).await?;
        let mut relationships: Vec<Relationship> = Vec::new();
        let mut keys = HashSet::new();

        for row in rows {
            let child_table: String = row.get("child_table");
            let child_column: String = row.get("child_column");
            let parent_table: String = row.get("parent_table");
            let parent_column: String = row.get("parent_column");

            let one_to_one = tables
                .iter()
                .find(|t| t.name == child_table)
                .map(|t| {
                    t.primary_key_columns == [child_column.clone()]
                        || t.indexes
                            .iter()
                            .any(|i| i.is_unique && i.columns == [child_column.clone()])
                })
                .unwrap_or(false);

            if let Some(col) = tables
                .iter_mut()
                .find(|t| t.name == child_table)
                .and_then(|t| t.columns.iter_mut().find(|c| c.name == child_column))
            {
                col.is_foreign_key = true;
                col.referenced_table = Some(parent_table.clone());
                col.referenced_column = Some(parent_column.clone());
            }

            let rel = Relationship {
                foreign_key_name: row.get("constraint_name"),
                parent_table,
                parent_column,
                child_table,
                child_column,
                relationship_type: if one_to_one {
                    RelationshipType::OneToOne
                } else {
                    RelationshipType::OneToMany
                },
                on_delete: referential_action(&row.get::<_, String>("on_delete")),
                on_update: referential_action(&row.get::<_, String>("on_update")),
            };

            // Duplicate constraints over the same column pair collapse to one
            if keys.insert(rel.key()) {
                relationships.push(rel);
            }
        }

        Ok(relationships)
    }
}

impl Introspector for PostgresIntrospector {
    async fn introspect(&self) -> AppResult<SchemaSnapshot> {
        self.snapshot().await
    }
}

/// Map a `pg_constraint` action code to its name
fn referential_action(code: &str) -> String {
    match code {
        "r" => "Restrict",
        "c" => "Cascade",
        "n" => "SetNull",
        "d" => "SetDefault",
        _ => "NoAction",
    }
    .to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::convention::Convention;
    use crate::error::AppError;
    use pretty_assertions::assert_eq;

    pub(crate) fn column(name: &str, data_type: &str) -> Column {
        Column {
            name: name.to_string(),
            data_type: data_type.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn table(name: &str, columns: Vec<Column>) -> Table {
        Table {
            name: name.to_string(),
            schema_name: "dbo".to_string(),
            columns,
            ..Default::default()
        }
    }

    pub(crate) fn snapshot(tables: Vec<Table>, relationships: Vec<Relationship>) -> SchemaSnapshot {
        SchemaSnapshot::new("Shop", "localhost", "16.2", Utc::now(), tables, relationships)
            .expect("valid snapshot")
    }

    pub(crate) fn relationship(parent: &str, pcol: &str, child: &str, ccol: &str) -> Relationship {
        Relationship {
            foreign_key_name: format!("FK_{}_{}", child, parent),
            parent_table: parent.to_string(),
            parent_column: pcol.to_string(),
            child_table: child.to_string(),
            child_column: ccol.to_string(),
            relationship_type: RelationshipType::OneToMany,
            on_delete: default_referential_action(),
            on_update: default_referential_action(),
        }
    }

    fn sample() -> SchemaSnapshot {
        let mut id = column("ID", "int");
        id.is_primary_key = true;
        id.is_identity = true;
        id.is_nullable = false;
        let mut email = column("Email", "nvarchar");
        email.max_length = Some(100);
        let mut password = column("eno_Password", "varchar");
        password.convention = Convention::OneWayEncryption;
        password.extended_properties.insert("ccType".into(), "ENO".into());

        let mut customer = table("Customer", vec![id, email, password]);
        customer.primary_key_columns = vec!["ID".to_string()];
        customer.indexes = vec![Index {
            name: "IX_Customer_Email".to_string(),
            is_unique: true,
            is_clustered: false,
            columns: vec!["Email".to_string(), "ID".to_string()],
            included_columns: Some(vec!["eno_Password".to_string()]),
            descending_columns: vec!["ID".to_string()],
        }];

        let mut customer_id = column("CustomerID", "int");
        customer_id.is_foreign_key = true;
        customer_id.referenced_table = Some("Customer".to_string());
        customer_id.referenced_column = Some("ID".to_string());
        let order = table("Order", vec![column("ID", "int"), customer_id]);

        snapshot(
            vec![customer, order],
            vec![relationship("Customer", "ID", "Order", "CustomerID")],
        )
    }

    #[test]
    fn test_json_round_trip_preserves_graph() {
        let original = sample();
        let json = original.to_json().unwrap();
        let restored = SchemaSnapshot::from_json(&json).unwrap();
        assert_eq!(restored, original);
        assert_eq!(
            restored.table("Customer").unwrap().indexes[0].columns,
            vec!["Email".to_string(), "ID".to_string()]
        );
    }

    #[test]
    fn test_json_uses_camel_case_field_names() {
        let json = sample().to_json().unwrap();
        assert!(json.contains("\"databaseName\""));
        assert!(json.contains("\"primaryKeyColumns\""));
        assert!(json.contains("\"isNullable\""));
        assert!(json.contains("\"foreignKeyName\""));
        assert!(json.contains('\n'), "snapshot JSON is indented");
    }

    #[test]
    fn test_duplicate_table_names_rejected() {
        let result = SchemaSnapshot::new(
            "Shop",
            "localhost",
            "16",
            Utc::now(),
            vec![table("Customer", vec![]), table("Customer", vec![])],
            vec![],
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_duplicate_column_names_rejected() {
        let result = SchemaSnapshot::new(
            "Shop",
            "localhost",
            "16",
            Utc::now(),
            vec![table("Customer", vec![column("ID", "int"), column("ID", "bigint")])],
            vec![],
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_from_json_revalidates() {
        let json = r#"{
            "databaseName": "Shop", "serverName": "s", "version": "1",
            "analyzedAt": "2024-01-01T00:00:00Z",
            "tables": [
                {"name": "A", "schemaName": "dbo", "columns": []},
                {"name": "A", "schemaName": "dbo", "columns": []}
            ],
            "relationships": []
        }"#;
        assert!(matches!(
            SchemaSnapshot::from_json(json),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_relationship_key_ignores_constraint_name() {
        let mut a = relationship("Customer", "ID", "Order", "CustomerID");
        let b = relationship("Customer", "ID", "Order", "CustomerID");
        a.foreign_key_name = "FK_regenerated_123".to_string();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key(), "Customer.ID->Order.CustomerID");
    }

    #[test]
    fn test_parse_extended_properties() {
        let props = parse_extended_properties("ccType=ENT, secret; label = Card ;junk");
        assert_eq!(props.get("ccType").map(String::as_str), Some("ENT, secret"));
        assert_eq!(props.get("label").map(String::as_str), Some("Card"));
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn test_referential_action_codes() {
        assert_eq!(referential_action("c"), "Cascade");
        assert_eq!(referential_action("a"), "NoAction");
    }
}
