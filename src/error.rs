//! Error handling module
//!
//! Provides unified error types and handling for the entire crate.
//! Every failure a caller can see is an `AppError`; template failures are
//! carried underneath `AppError::Render` so there is a single error surface.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{message}: appears {count} times (expected exactly 1)")]
    Ambiguous { message: String, count: usize },

    #[error("Cannot write protected file: {}", path.display())]
    ProtectedFile { path: PathBuf },

    #[error("Failed to render template '{template}'")]
    Render {
        template: String,
        #[source]
        source: TemplateError,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code for callers that surface errors to users
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidArgument(_) => "INVALID_ARGUMENT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Ambiguous { .. } => "AMBIGUOUS_OPERATION",
            AppError::ProtectedFile { .. } => "PROTECTED_FILE",
            AppError::Render { .. } => "RENDER_FAILED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Pool(_) => "POOL_EXHAUSTED",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the failure is a protected-file refusal
    pub fn is_protected(&self) -> bool {
        matches!(self, AppError::ProtectedFile { .. })
    }
}

/// Underlying cause of a template render failure
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template file not found: {}", path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read template file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template syntax error: {0}")]
    Syntax(#[source] minijinja::Error),

    #[error("template evaluation error: {0}")]
    Evaluation(#[source] minijinja::Error),

    #[error("render data could not be serialized: {0}")]
    Data(#[source] serde_json::Error),
}

/// Result type alias used across the crate
pub type AppResult<T> = Result<T, AppError>;

/// Helper function to create an invalid-argument error
pub fn invalid_argument(msg: impl Into<String>) -> AppError {
    AppError::InvalidArgument(msg.into())
}

/// Helper function to create a not found error
pub fn not_found_error(msg: impl Into<String>) -> AppError {
    AppError::NotFound(msg.into())
}

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}
