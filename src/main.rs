//! SchemaForge CLI
//!
//! Runs one regeneration pass: introspect the configured database, diff it
//! against the stored baseline, sync metadata, regenerate what changed and
//! store the new baseline.

use schemaforge::config::{MetadataBackend, Settings};
use schemaforge::db::create_pool;
use schemaforge::introspection::{Introspector, PostgresIntrospector};
use schemaforge::metadata::{
    FileMetadataRepository, InMemoryMetadataRepository, MetadataRepository, MetadataStore,
    PostgresMetadataRepository,
};
use schemaforge::{
    DiffEngine, Pipeline, ProtectedFileWriter, RunReport, SchemaSnapshot, SnapshotStore,
    TemplateEngine,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting SchemaForge...");

    let settings = Settings::load()?;
    info!("Configuration loaded successfully");

    let db = settings
        .database
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set to introspect a schema"))?;
    let pool = create_pool(db).await?;

    let snapshot = PostgresIntrospector::new(pool.clone()).introspect().await?;

    let store = SnapshotStore::new(&settings.snapshot_path);
    match store.load().await? {
        Some(baseline) => {
            let changes = DiffEngine::diff(Some(&baseline), &snapshot);
            for change in &changes.table_changes {
                info!("{}", change.description);
            }
            for change in &changes.column_changes {
                info!("{}", change.description);
            }
            for change in &changes.index_changes {
                info!("{}", change.description);
            }
            for change in &changes.relationship_changes {
                info!("{}", change.description);
            }
            info!("Schema diff: {}", changes.summary());
        }
        None => warn!(
            "No baseline at {}; treating this run as the first",
            store.path().display()
        ),
    }

    let templates = TemplateEngine::new(&settings.template_root);
    let loaded = templates.preload_all().await?;
    info!("{} templates ready", loaded);

    let report = match settings.metadata_backend {
        MetadataBackend::File => {
            let repository = FileMetadataRepository::new(&settings.metadata_path);
            run(&settings, templates, repository, &snapshot).await?
        }
        MetadataBackend::Memory => {
            warn!("In-memory metadata: every table will be treated as new");
            run(&settings, templates, InMemoryMetadataRepository::new(), &snapshot).await?
        }
        MetadataBackend::Postgres => {
            let repository = PostgresMetadataRepository::new(pool.clone()).await?;
            run(&settings, templates, repository, &snapshot).await?
        }
    };

    for failure in &report.failures {
        warn!("{} failed [{}]: {}", failure.table_name, failure.code, failure.error);
    }

    store.save(&snapshot).await?;

    if !report.is_success() {
        anyhow::bail!("{} tables failed to generate", report.failures.len());
    }
    info!("Done");
    Ok(())
}

async fn run<R: MetadataRepository>(
    settings: &Settings,
    templates: TemplateEngine,
    repository: R,
    snapshot: &SchemaSnapshot,
) -> anyhow::Result<RunReport> {
    let pipeline = Pipeline::new(
        MetadataStore::new(repository),
        templates,
        ProtectedFileWriter::new(),
        settings.artifacts.clone(),
        &settings.output_root,
    )
    .include_unchanged(settings.include_unchanged);

    Ok(pipeline.run(snapshot).await?)
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,schemaforge=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}
