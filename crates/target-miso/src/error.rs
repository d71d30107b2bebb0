//! Error types for target-miso
//!
//! Only fatal conditions are represented here. Per-record problems
//! (transform failures, unclassifiable records, dropped upload batches) are
//! logged where they happen and never reach this type.

use crate::api::ApiError;
use crate::message::MessageError;
use thiserror::Error;

/// Result type alias for target operations
pub type Result<T> = std::result::Result<T, TargetError>;

/// Errors that terminate a run
#[derive(Error, Debug)]
pub enum TargetError {
    /// Config file is missing fields or has invalid values
    #[error("Configuration error: {0}")]
    Config(String),

    /// A template in the template folder could not be read or compiled
    #[error("Invalid template '{path}': {message}")]
    Template { path: String, message: String },

    /// An input line could not be decoded into a message
    #[error("Unable to parse message on line {line}: {source}")]
    Message {
        line: usize,
        #[source]
        source: MessageError,
    },

    /// A message referenced a stream without a registered transformer
    #[error("Template for stream '{0}' not found. Add '{0}.expr' or '{0}.jinja' to the template folder.")]
    UnknownStream(String),

    /// Listing or deleting remote ids failed during reconciliation
    #[error("Reconciliation failed for stream '{stream}': {source}")]
    Reconcile {
        stream: String,
        #[source]
        source: ApiError,
    },

    /// The HTTP client could not be constructed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Reading input or template files failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl TargetError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a template error
    pub fn template(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Template {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create an unknown-stream error
    pub fn unknown_stream(stream: impl Into<String>) -> Self {
        Self::UnknownStream(stream.into())
    }
}
