//! Error types for pipeline construction and execution.

use std::time::Duration;

use crate::registry::Family;

/// Exit code for configuration errors (unknown title, malformed spec,
/// conflicting flags).
pub const EXIT_CONFIG: i32 = 2;

/// Exit code for unrecoverable mid-run failures.
pub const EXIT_FAILURE: i32 = 1;

/// Error conditions surfaced by the Avalon pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AvalonError {
    /// Bad user input detected at startup.
    #[error("{0}")]
    Config(String),

    /// Two extensions of the same family declared the same title.
    #[error("duplicate {family} extension: {title}")]
    DuplicateExtension { family: Family, title: String },

    /// A generic lifecycle hook raised during startup.
    #[error("generic hook {title} failed: {source}")]
    GenericHookFailed {
        title: String,
        #[source]
        source: anyhow::Error,
    },

    /// A medium failed too many consecutive writes.
    #[error("medium gave up after {failures} consecutive write failures: {last}")]
    MediumGaveUp { failures: u32, last: String },

    /// A format failed too many consecutive batches.
    #[error("format gave up after {failures} consecutive batch failures: {last}")]
    FormatGaveUp { failures: u32, last: String },

    /// Every producer was retired before the record budget was met.
    #[error("all producers retired before the record budget was met")]
    AllProducersRetired,

    /// The writer queue did not drain within the shutdown window.
    #[error("shutdown timed out after {0:?} with writes outstanding")]
    ShutdownTimeout(Duration),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AvalonError {
    /// Process exit code this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            AvalonError::Config(_)
            | AvalonError::DuplicateExtension { .. }
            | AvalonError::GenericHookFailed { .. } => EXIT_CONFIG,
            _ => EXIT_FAILURE,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        AvalonError::Config(msg.into())
    }
}

/// Unrecoverable write failure reported by a medium.
///
/// `retriable` records whether the medium considered the cause transient;
/// either way the batch is lost and the count guard issues a replacement.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct WriteError {
    pub retriable: bool,
    #[source]
    pub source: anyhow::Error,
}

impl WriteError {
    pub fn retriable(source: impl Into<anyhow::Error>) -> Self {
        WriteError { retriable: true, source: source.into() }
    }

    pub fn fatal(source: impl Into<anyhow::Error>) -> Self {
        WriteError { retriable: false, source: source.into() }
    }
}
