//! target-miso Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! A Singer target that transforms records with per-stream templates and
//! uploads them to the Miso data API.
//!
//! # Overview
//!
//! - **Messages**: newline-delimited SCHEMA / RECORD / STATE / ACTIVATE_VERSION
//!   messages are decoded by [`message`]
//! - **Transformers**: one template or callback per stream maps raw records to
//!   products, users or interactions ([`transform`])
//! - **Upload**: records are batched per entity kind and posted with retries
//!   ([`uploader`], [`api`])
//! - **Deduplication**: product content hashes travel inside the checkpoint so
//!   unchanged records are not uploaded again ([`state`])
//! - **Reconciliation**: ACTIVATE_VERSION deletes remote records the run did
//!   not see ([`reconcile`])
//!
//! # Example
//!
//! ```no_run
//! use target_miso::{BatchingUploader, Config, MisoClient, Pipeline};
//! use target_miso::transform::load_templates;
//!
//! # async fn run() -> target_miso::Result<()> {
//! let config = Config::load("config.json".as_ref())?;
//! let templates = load_templates(&config.template_folder)?;
//! let client = MisoClient::new(config.client_config())?;
//! let uploader = BatchingUploader::new(client, config.uploader_config());
//!
//! let mut pipeline = Pipeline::new(uploader, templates, config.pipeline_options());
//! let stdin = tokio::io::BufReader::new(tokio::io::stdin());
//! if let Some(state) = pipeline.run(stdin).await? {
//!     println!("{}", state);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod classify;
pub mod config;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod reconcile;
pub mod record;
pub mod state;
pub mod transform;
pub mod uploader;

// Re-export commonly used types
pub use api::{ApiError, MisoClient};
pub use classify::EntityKind;
pub use config::Config;
pub use error::{Result, TargetError};
pub use message::Message;
pub use pipeline::{Pipeline, PipelineOptions, RunSummary};
pub use state::{UploadStateTracker, UPLOAD_STATE_KEY};
pub use transform::{Transformer, TransformerRegistry};
pub use uploader::{BatchingUploader, RecordSink, UploaderConfig};
