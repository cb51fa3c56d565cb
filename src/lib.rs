//! SchemaForge - schema-driven code generation
//!
//! Introspects a relational schema, tracks structural change between runs
//! with two-slot hashes, renders templates per table and writes the output
//! without ever clobbering hand-maintained (`.prt.`) files or losing the
//! previous version of a regenerated one.

pub mod config;
pub mod convention;
pub mod db;
pub mod error;
pub mod introspection;
pub mod metadata;
pub mod pipeline;
pub mod snapshot;
pub mod template;
pub mod writer;

pub use convention::{Convention, ConventionResolver};
pub use error::{AppError, AppResult, TemplateError};
pub use introspection::{Column, Index, Introspector, Relationship, SchemaSnapshot, Table};
pub use metadata::{MetadataStore, SyncResult};
pub use pipeline::{Pipeline, RunReport};
pub use snapshot::{DiffEngine, SchemaChanges, SnapshotStore};
pub use template::{TemplateCache, TemplateEngine};
pub use writer::{ProtectedFileWriter, WriteOutcome};
