//! Batching uploader
//!
//! Records are buffered per entity kind and sent as one request once a
//! buffer reaches its kind's threshold, or when the driver flushes. A batch
//! the server refuses is logged and dropped; the run continues.

use crate::api::{ApiError, MisoClient};
use crate::classify::{EntityKind, FLUSH_ORDER};
use crate::record::Record;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, error, info};

// ============================================================================
// Batch Size Constants
// ============================================================================

/// Products per upload request.
pub const DEFAULT_PRODUCT_BATCH_SIZE: usize = 200;

/// Users per upload request.
pub const DEFAULT_USER_BATCH_SIZE: usize = 200;

/// Interactions per upload request. Interactions are small, so batches are larger.
pub const DEFAULT_INTERACTION_BATCH_SIZE: usize = 1000;

/// Destination of classified records
///
/// The pipeline only talks to the remote API through this trait, so tests
/// can substitute an in-memory sink.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Buffer a record, sending its batch when the batch is full
    async fn write(&mut self, kind: EntityKind, record: Record);

    /// Send every non-empty batch
    async fn flush(&mut self);

    /// Ids currently stored remotely for a kind
    async fn existing_ids(&self, kind: EntityKind) -> Result<HashSet<String>, ApiError>;

    /// Delete records remotely
    async fn delete_records(&self, kind: EntityKind, ids: &BTreeSet<String>)
        -> Result<(), ApiError>;

    /// Counters for the run summary
    fn upload_stats(&self) -> UploadStats {
        UploadStats::default()
    }
}

/// Batch thresholds and dry-run switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploaderConfig {
    pub product_batch_size: usize,
    pub user_batch_size: usize,
    pub interaction_batch_size: usize,
    pub dry_run: bool,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            product_batch_size: DEFAULT_PRODUCT_BATCH_SIZE,
            user_batch_size: DEFAULT_USER_BATCH_SIZE,
            interaction_batch_size: DEFAULT_INTERACTION_BATCH_SIZE,
            dry_run: false,
        }
    }
}

impl UploaderConfig {
    /// Batch size for a kind, never below one
    pub fn threshold(&self, kind: EntityKind) -> usize {
        let size = match kind {
            EntityKind::Product => self.product_batch_size,
            EntityKind::User => self.user_batch_size,
            EntityKind::Interaction => self.interaction_batch_size,
        };
        size.max(1)
    }
}

/// Upload counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub batches_sent: usize,
    pub batches_dropped: usize,
    pub records_sent: BTreeMap<EntityKind, usize>,
    pub records_dropped: usize,
}

impl UploadStats {
    fn sent(&mut self, kind: EntityKind, count: usize) {
        self.batches_sent += 1;
        *self.records_sent.entry(kind).or_default() += count;
    }

    fn dropped(&mut self, count: usize) {
        self.batches_dropped += 1;
        self.records_dropped += count;
    }
}

/// [`RecordSink`] backed by the Miso API
pub struct BatchingUploader {
    client: MisoClient,
    config: UploaderConfig,
    buffers: HashMap<EntityKind, Vec<Record>>,
    stats: UploadStats,
}

impl BatchingUploader {
    pub fn new(client: MisoClient, config: UploaderConfig) -> Self {
        Self {
            client,
            config,
            buffers: HashMap::new(),
            stats: UploadStats::default(),
        }
    }

    /// Records buffered for a kind
    pub fn pending(&self, kind: EntityKind) -> usize {
        self.buffers.get(&kind).map(Vec::len).unwrap_or(0)
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    async fn send_batch(&mut self, kind: EntityKind, records: Vec<Record>) {
        if records.is_empty() {
            return;
        }
        let count = records.len();

        if self.config.dry_run {
            let payload = Value::from(records);
            info!(
                kind = %kind,
                count = count,
                payload = %payload,
                "Dry run, batch not sent"
            );
            self.stats.sent(kind, count);
            return;
        }

        info!(kind = %kind, count = count, "Sending batch to Miso");

        match self.client.upload(kind, &records).await {
            Ok(body) => {
                debug!(kind = %kind, response = %body, "Batch accepted");
                self.stats.sent(kind, count);
            },
            Err(e) => {
                if let ApiError::Status { body, .. } = &e {
                    for (index, detail) in rejected_indexes(body) {
                        if let Some(record) = records.get(index) {
                            let record = Value::Object(record.clone());
                            error!(
                                kind = %kind,
                                index = index,
                                error = %detail,
                                record = %record,
                                "Record rejected by Miso"
                            );
                        }
                    }
                }
                let payload = Value::from(records);
                error!(
                    kind = %kind,
                    count = count,
                    error = %e,
                    payload = %payload,
                    "Failed to upload batch, dropping it"
                );
                self.stats.dropped(count);
            },
        }
    }
}

#[async_trait]
impl RecordSink for BatchingUploader {
    async fn write(&mut self, kind: EntityKind, record: Record) {
        let threshold = self.config.threshold(kind);
        let buffer = self.buffers.entry(kind).or_default();
        buffer.push(record);

        if buffer.len() >= threshold {
            let batch = std::mem::take(buffer);
            self.send_batch(kind, batch).await;
        }
    }

    async fn flush(&mut self) {
        for kind in FLUSH_ORDER {
            let batch = self.buffers.remove(&kind).unwrap_or_default();
            self.send_batch(kind, batch).await;
        }
    }

    async fn existing_ids(&self, kind: EntityKind) -> Result<HashSet<String>, ApiError> {
        self.client.existing_ids(kind).await
    }

    async fn delete_records(
        &self,
        kind: EntityKind,
        ids: &BTreeSet<String>,
    ) -> Result<(), ApiError> {
        info!(kind = %kind, count = ids.len(), ids = ?ids, "Deleting stale records");

        if self.config.dry_run {
            info!(kind = %kind, "Dry run, delete not sent");
            return Ok(());
        }

        self.client.delete(kind, ids).await
    }

    fn upload_stats(&self) -> UploadStats {
        self.stats.clone()
    }
}

/// Per-record errors in a validation response
///
/// Miso reports rejected records as objects with an integer `index` under
/// `data` or `errors`. Any other body yields nothing.
pub fn rejected_indexes(body: &str) -> Vec<(usize, Value)> {
    let Ok(Value::Object(parsed)) = serde_json::from_str::<Value>(body) else {
        return Vec::new();
    };

    ["data", "errors"]
        .iter()
        .filter_map(|key| parsed.get(*key).and_then(Value::as_array))
        .flatten()
        .filter_map(|entry| {
            let index = entry.get("index")?.as_u64()?;
            Some((usize::try_from(index).ok()?, entry.clone()))
        })
        .collect()
}
