//! Generation Pipeline Module
//!
//! The orchestrating caller of the core: sync metadata from a snapshot,
//! plan, render each table's artifacts and write them through the
//! protected writer.

pub mod context;
pub mod orchestrator;

pub use context::{ColumnContext, TableContext};
pub use orchestrator::{Pipeline, RunReport, TableFailure};
