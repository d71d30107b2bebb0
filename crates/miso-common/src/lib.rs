//! Miso Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the target-miso workspace.
//!
//! # Overview
//!
//! - **Checksums**: deterministic content hashes for upload deduplication
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use miso_common::checksum::content_hash;
//! use serde_json::json;
//!
//! let hash = content_hash(&json!({"product_id": "p-1", "title": "Shoe"}));
//! assert_eq!(hash.len(), 32);
//! ```

pub mod checksum;
pub mod logging;
