//! Schema Snapshot Module
//!
//! Detecting what changed in the database between two runs:
//! - Snapshot store (the persisted baseline)
//! - Diff engine (comparing snapshots)

pub mod diff;
pub mod store;

pub use diff::{
    ChangeType, ColumnChange, DiffEngine, IndexChange, RelationshipChange, SchemaChanges,
    TableChange,
};
pub use store::SnapshotStore;
