//! Metadata Module
//!
//! Persisted per-entity records with two-slot structural hashes, used to
//! decide whether a table changed since the last generation, plus a log of
//! every artifact each run produced.

pub mod file;
pub mod hash;
pub mod history;
pub mod plan;
pub mod postgres;
pub mod records;
pub mod state;
pub mod store;

pub use file::FileMetadataRepository;
pub use history::{GenerationHistoryRecord, GenerationOutcome};
pub use plan::{GenerationPlan, PlanReason, TablePlan};
pub use postgres::PostgresMetadataRepository;
pub use records::{
    ColumnMetadata, GenerationFlags, HashState, IndexColumnMetadata, IndexMetadata,
    RelationshipMetadata, TableMetadata,
};
pub use state::{MetadataState, SyncResult};
pub use store::{InMemoryMetadataRepository, MetadataRepository, MetadataStore};
