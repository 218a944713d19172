//! Unified error type for the vidpress engine.
//!
//! Every failure mode funnels into [`Error`]. Probe, launch and encode
//! failures are captured inside the owning job and surfaced only through that
//! task's terminal event; [`Error::Validation`] is the one variant reported
//! synchronously to the submitter, before a task exists.

/// Unified error type covering all failure modes in vidpress.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request data failed validation (CRF out of range, odd resolution, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// ffprobe was unavailable, exited non-zero, or produced unusable output.
    #[error("Probe error: {0}")]
    Probe(String),

    /// An external tool (ffmpeg, ffprobe) could not be launched or failed.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "task", "input file").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The job was stopped by user request.
    #[error("Cancelled by user")]
    Cancelled,

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl std::fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
