//! Output writing
//!
//! Generators hand complete file bodies to `ProtectedFileWriter`; it alone
//! decides whether and how they reach disk.

pub mod file_writer;
pub mod protection;

pub use file_writer::{ProtectedFileWriter, WriteOutcome};
pub use protection::{is_protected, PROTECTED_MARKER};
