//! Miso API client module
//!
//! HTTP client for the upload, id-listing and delete endpoints.

pub mod client;
pub mod endpoints;

pub use client::{ClientConfig, MisoClient, RetryPolicy};

use crate::classify::EntityKind;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by the Miso API client
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered with a non-success status
    #[error("Miso API returned {status} for {kind}: {body}")]
    Status {
        kind: EntityKind,
        status: StatusCode,
        body: String,
    },

    /// The request could not be sent or the response could not be read
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered 2xx with a body of unexpected shape
    #[error("Unexpected response from Miso API: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Create an unexpected-response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// HTTP status, when the server answered at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Http(e) => e.status(),
            ApiError::InvalidResponse(_) => None,
        }
    }
}
