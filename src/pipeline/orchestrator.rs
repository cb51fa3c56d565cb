//! Orchestrator - one regeneration pass over a snapshot
//!
//! Sync metadata, plan, then render and write every configured artifact for
//! each table that needs it. Failures are scoped to the table: a protected
//! target is skipped, any other error is recorded and the run moves on.
//! Generated tables are stamped and every artifact attempt is logged to the
//! generation history once, at the end of the run.

use super::context::TableContext;
use crate::config::ArtifactSpec;
use crate::convention::ConventionResolver;
use crate::error::AppResult;
use crate::introspection::SchemaSnapshot;
use crate::metadata::records::table_key;
use crate::metadata::{
    GenerationFlags, GenerationHistoryRecord, GenerationOutcome, MetadataRepository, MetadataStore,
    SyncResult, TablePlan,
};
use crate::template::TemplateEngine;
use crate::writer::{ProtectedFileWriter, WriteOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// A table whose generation failed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableFailure {
    pub table_name: String,
    pub code: &'static str,
    pub error: String,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub sync: SyncResult,
    pub tables_planned: usize,
    pub tables_generated: Vec<String>,
    pub files_written: Vec<WriteOutcome>,
    pub skipped_protected: Vec<PathBuf>,
    pub failures: Vec<TableFailure>,
    pub history: Vec<GenerationHistoryRecord>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

#[derive(Default)]
struct TableOutput {
    written: Vec<WriteOutcome>,
    skipped: Vec<PathBuf>,
}

pub struct Pipeline<R> {
    metadata: MetadataStore<R>,
    templates: TemplateEngine,
    writer: ProtectedFileWriter,
    resolver: ConventionResolver,
    artifacts: Vec<ArtifactSpec>,
    output_root: PathBuf,
    include_unchanged: bool,
}

impl<R: MetadataRepository> Pipeline<R> {
    pub fn new(
        metadata: MetadataStore<R>,
        templates: TemplateEngine,
        writer: ProtectedFileWriter,
        artifacts: Vec<ArtifactSpec>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            metadata,
            templates,
            writer,
            resolver: ConventionResolver::new(),
            artifacts,
            output_root: output_root.into(),
            include_unchanged: false,
        }
    }

    /// Regenerate every table, not only changed ones
    pub fn include_unchanged(mut self, include: bool) -> Self {
        self.include_unchanged = include;
        self
    }

    pub fn with_resolver(mut self, resolver: ConventionResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn metadata(&self) -> &MetadataStore<R> {
        &self.metadata
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    pub async fn run(&self, snapshot: &SchemaSnapshot) -> AppResult<RunReport> {
        let started_at = Utc::now();
        let sync = self.metadata.sync_from_snapshot(snapshot).await?;
        let plan = self.metadata.plan(&sync, self.include_unchanged).await?;

        let mut report = RunReport {
            started_at,
            completed_at: started_at,
            tables_planned: plan.tables_to_generate(),
            sync,
            tables_generated: Vec::new(),
            files_written: Vec::new(),
            skipped_protected: Vec::new(),
            failures: Vec::new(),
            history: Vec::new(),
        };
        let mut generated_keys = Vec::new();

        for table_plan in plan.to_generate() {
            debug!(
                "Generating {}.{}: {}",
                table_plan.schema_name,
                table_plan.table_name,
                table_plan.reason.description()
            );

            match self.generate_table(snapshot, table_plan, &mut report.history).await {
                Ok(output) => {
                    report.files_written.extend(output.written);
                    report.skipped_protected.extend(output.skipped);
                    report.tables_generated.push(table_plan.table_name.clone());
                    generated_keys.push(table_key(&table_plan.schema_name, &table_plan.table_name));
                }
                Err(e) => {
                    warn!("Generation failed for {}: {}", table_plan.table_name, e);
                    report.failures.push(TableFailure {
                        table_name: table_plan.table_name.clone(),
                        code: e.code(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.metadata.mark_generated_all(&generated_keys).await?;
        self.metadata.record_history(&report.history).await?;

        report.completed_at = Utc::now();
        info!(
            "Run complete: {} tables generated, {} files written, {} protected skipped, {} failed ({} ms)",
            report.tables_generated.len(),
            report.files_written.len(),
            report.skipped_protected.len(),
            report.failures.len(),
            report.duration_ms()
        );
        Ok(report)
    }

    async fn generate_table(
        &self,
        snapshot: &SchemaSnapshot,
        plan: &TablePlan,
        history: &mut Vec<GenerationHistoryRecord>,
    ) -> AppResult<TableOutput> {
        let table = snapshot
            .tables()
            .iter()
            .find(|t| t.name == plan.table_name && t.schema_name == plan.schema_name)
            .ok_or_else(|| {
                crate::error::not_found_error(format!(
                    "Table {}.{} in snapshot",
                    plan.schema_name, plan.table_name
                ))
            })?;
        let context = TableContext::build(table, snapshot, &self.resolver);

        let mut output = TableOutput::default();
        for artifact in &self.artifacts {
            if !artifact_enabled(&plan.flags, &artifact.template) {
                debug!("Skipping {} for {}: disabled", artifact.template, table.name);
                continue;
            }

            let path = self
                .output_root
                .join(artifact.output_path(&table.schema_name, &table.name));
            let entry = |outcome| {
                GenerationHistoryRecord::new(
                    &table.schema_name,
                    &table.name,
                    &artifact.template,
                    &path,
                    outcome,
                )
            };

            let written = match self.templates.render(&artifact.template, &context).await {
                Ok(body) => self.writer.write_file(&path, &body).await,
                Err(e) => Err(e),
            };
            match written {
                Ok(outcome) => {
                    history.push(entry(GenerationOutcome::Written));
                    output.written.push(outcome);
                }
                Err(e) if e.is_protected() => {
                    info!("Skipping protected file {}", path.display());
                    history.push(entry(GenerationOutcome::SkippedProtected));
                    output.skipped.push(path);
                }
                Err(e) => {
                    history.push(entry(GenerationOutcome::Failed).with_error(e.to_string()));
                    return Err(e);
                }
            }
        }
        Ok(output)
    }
}

/// Map an artifact's template family onto the table's generation flags.
/// Templates outside the known families are always generated.
fn artifact_enabled(flags: &GenerationFlags, template: &str) -> bool {
    let family = template
        .split('/')
        .next()
        .unwrap_or(template)
        .to_ascii_lowercase();
    match family.as_str() {
        "entity" | "entities" => flags.generate_entity,
        "repository" | "repositories" => flags.generate_repository,
        "controller" | "controllers" | "api" => flags.generate_controller,
        "react" | "ui" => flags.generate_react_ui,
        "sql" | "sp" => flags.generate_stored_procedures,
        "cqrs" => flags.generate_cqrs,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspection::tests::{column, relationship, snapshot, table};
    use crate::metadata::{FileMetadataRepository, InMemoryMetadataRepository};
    use std::path::Path;

    const ENTITY: &str = "{% if name == \"Broken\" %}{{ explode() }}{% endif -%}\n\
        class {{ name }} {\n\
        {%- for col in columns %}\n    {{ col.dataType }} {{ col.name }};\
        {%- if col.conventionCode %} // {{ col.conventionCode }}{% endif %}\
        {%- endfor %}\n}";

    fn pipeline(dir: &Path) -> Pipeline<InMemoryMetadataRepository> {
        pipeline_with(dir, InMemoryMetadataRepository::new())
    }

    fn pipeline_with<R: MetadataRepository>(dir: &Path, repository: R) -> Pipeline<R> {
        let templates = dir.join("templates");
        std::fs::create_dir_all(&templates).unwrap();
        std::fs::write(templates.join("entity.j2"), ENTITY).unwrap();
        std::fs::write(templates.join("notes.j2"), "notes for {{ name }}").unwrap();

        Pipeline::new(
            MetadataStore::new(repository),
            TemplateEngine::new(templates),
            ProtectedFileWriter::new(),
            vec![
                "entity:{table}.cs".parse().unwrap(),
                "notes:{schema}/{table}.prt.md".parse().unwrap(),
            ],
            dir.join("out"),
        )
    }

    fn shop() -> SchemaSnapshot {
        snapshot(
            vec![
                table("Customer", vec![column("ID", "int"), column("eno_Password", "varchar")]),
                table("Broken", vec![column("ID", "int")]),
                table("Order", vec![column("ID", "int"), column("CustomerID", "int")]),
            ],
            vec![relationship("Customer", "ID", "Order", "CustomerID")],
        )
    }

    #[tokio::test]
    async fn test_run_generates_isolates_failures_and_skips_protected() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        let report = pipeline.run(&shop()).await.unwrap();

        assert_eq!(report.tables_planned, 3);
        assert_eq!(
            report.tables_generated,
            vec!["Customer".to_string(), "Order".to_string()]
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].table_name, "Broken");
        assert_eq!(report.failures[0].code, "RENDER_FAILED");
        assert_eq!(report.skipped_protected.len(), 2);
        assert!(!dir.path().join("out/dbo").exists());

        let customer = std::fs::read_to_string(dir.path().join("out/Customer.cs")).unwrap();
        assert_eq!(
            customer,
            "class Customer {\n    int ID;\n    varchar eno_Password; // ENO\n}"
        );
        assert!(!dir.path().join("out/Broken.cs").exists());
    }

    #[tokio::test]
    async fn test_second_run_only_retries_what_is_pending() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        pipeline.run(&shop()).await.unwrap();

        let report = pipeline.run(&shop()).await.unwrap();

        // Broken was never marked generated, so it is retried; the rest are unchanged
        assert_eq!(report.sync.tables_changed, 0);
        assert_eq!(report.tables_planned, 1);
        assert!(report.tables_generated.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert!(!dir.path().join("out/Customer.cs.bak").exists());
    }

    #[tokio::test]
    async fn test_changed_table_is_regenerated_with_backup() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        pipeline.run(&shop()).await.unwrap();

        let changed = snapshot(
            vec![
                table("Customer", vec![column("ID", "bigint"), column("eno_Password", "varchar")]),
                table("Order", vec![column("ID", "int"), column("CustomerID", "int")]),
            ],
            vec![relationship("Customer", "ID", "Order", "CustomerID")],
        );
        let report = pipeline.run(&changed).await.unwrap();

        assert_eq!(report.sync.modified_tables, vec!["Customer".to_string()]);
        assert_eq!(report.sync.deactivated_tables, vec!["Broken".to_string()]);
        assert_eq!(report.tables_generated, vec!["Customer".to_string()]);
        assert!(report.is_success());

        let out = dir.path().join("out");
        assert!(std::fs::read_to_string(out.join("Customer.cs")).unwrap().contains("bigint ID;"));
        assert!(std::fs::read_to_string(out.join("Customer.cs.bak")).unwrap().contains("int ID;"));
    }

    #[tokio::test]
    async fn test_include_unchanged_regenerates_everything() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path()).include_unchanged(true);
        pipeline.run(&shop()).await.unwrap();

        let report = pipeline.run(&shop()).await.unwrap();
        assert_eq!(report.tables_planned, 3);
        assert_eq!(report.tables_generated.len(), 2);
    }

    #[tokio::test]
    async fn test_history_records_every_artifact_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        let report = pipeline.run(&shop()).await.unwrap();
        assert_eq!(report.history.len(), 5);

        let broken = pipeline.metadata().history(Some("Broken")).await.unwrap();
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].artifact, "entity");
        assert_eq!(broken[0].outcome, GenerationOutcome::Failed);
        assert!(broken[0].error.as_deref().unwrap().contains("entity"));

        let mut customer: Vec<_> = pipeline
            .metadata()
            .history(Some("Customer"))
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.artifact, r.outcome, r.error))
            .collect();
        customer.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            customer,
            vec![
                ("entity".to_string(), GenerationOutcome::Written, None),
                ("notes".to_string(), GenerationOutcome::SkippedProtected, None),
            ]
        );
        let written = &report.files_written[0].path;
        assert!(report
            .history
            .iter()
            .any(|r| r.outcome == GenerationOutcome::Written && Path::new(&r.output_path) == written));
    }

    #[tokio::test]
    async fn test_file_backed_metadata_skips_unchanged_tables_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = dir.path().join("state/metadata.json");
        let schema = snapshot(
            vec![
                table("Customer", vec![column("ID", "int")]),
                table("Order", vec![column("ID", "int")]),
            ],
            vec![],
        );

        let first = pipeline_with(dir.path(), FileMetadataRepository::new(&metadata))
            .run(&schema)
            .await
            .unwrap();
        assert_eq!(first.tables_generated.len(), 2);

        // A fresh pipeline over the same file behaves like the next process run
        let second = pipeline_with(dir.path(), FileMetadataRepository::new(&metadata))
            .run(&schema)
            .await
            .unwrap();
        assert_eq!(second.sync.tables_changed, 0);
        assert_eq!(second.tables_planned, 0);
        assert!(second.files_written.is_empty());
        assert!(second.history.is_empty());
        assert!(!dir.path().join("out/Customer.cs.bak").exists());

        let history = FileMetadataRepository::new(&metadata).history(None).await.unwrap();
        assert_eq!(history.len(), 4);
    }

    #[test]
    fn test_artifact_flags() {
        let flags = GenerationFlags::default();
        assert!(artifact_enabled(&flags, "entity"));
        assert!(artifact_enabled(&flags, "api/controller"));
        assert!(!artifact_enabled(&flags, "react/list"));
        assert!(artifact_enabled(&flags, "notes"));
    }
}
