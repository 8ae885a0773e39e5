//! Error types for the export pipeline

use crate::orchestrator::ExportMode;
use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, Error>;

/// The single message shown to users when an export fails, whatever the cause.
pub const USER_FAILURE_MESSAGE: &str = "Could not generate the document right now.";

/// Errors that can occur while exporting a rendered surface
#[derive(Error, Debug)]
pub enum Error {
    /// The surface could not be turned into a raster (unmounted surface,
    /// rasterizer failure, tainted canvas)
    #[error("Capture failed: {0}")]
    CaptureError(String),

    /// The final document could not be composed
    #[error("Assembly failed: {0}")]
    AssemblyError(String),

    /// Page geometry leaves no room for content. This is a configuration bug,
    /// never retried.
    #[error("Pagination invariant violated: {0}")]
    PaginationInvariantViolation(String),

    /// An export of the same mode is already running
    #[error("An export of mode {0} is already in progress")]
    Busy(ExportMode),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// The artifact could not be handed over to its destination
    #[error("Delivery failed: {0}")]
    DeliveryError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error indicates a broken configuration rather than a
    /// transient failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::PaginationInvariantViolation(_) | Error::ConfigError(_)
        )
    }

    /// The text surfaced to users. Causes are only logged.
    pub fn user_message(&self) -> &'static str {
        USER_FAILURE_MESSAGE
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::AssemblyError(format!("image encoding failed: {}", err))
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::AssemblyError(format!("pdf writer failed: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}
