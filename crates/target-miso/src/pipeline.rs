//! Pipeline driver
//!
//! Reads protocol messages in order and routes them: records through their
//! stream's transformer into the sink, checkpoints into the working state,
//! version activations into reconciliation. Each message's side effects
//! finish before the next message is read.

use crate::classify::{classify, entity_id, EntityKind};
use crate::error::{Result, TargetError};
use crate::message::{Message, VersionToken};
use crate::reconcile::reconcile;
use crate::record::{is_empty_output, Record};
use crate::state::{UploadStateTracker, UPLOAD_STATE_KEY};
use crate::transform::{TransformError, TransformerRegistry};
use crate::uploader::{RecordSink, UploadStats};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info, warn};

/// Behavior switches for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Delete stale remote records on ACTIVATE_VERSION
    pub reconcile: bool,
    /// Track user content hashes, not only product hashes
    pub persist_user_hashes: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            reconcile: true,
            persist_user_hashes: false,
        }
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub messages: usize,
    pub records_received: usize,
    pub records_written: BTreeMap<EntityKind, usize>,
    pub transform_failures: usize,
    pub skipped_empty: usize,
    pub unclassified: usize,
    pub unchanged: usize,
    pub ids_deleted: usize,
    pub uploads: UploadStats,
}

impl RunSummary {
    /// Records handed to the sink across all kinds
    pub fn total_written(&self) -> usize {
        self.records_written.values().sum()
    }

    fn log(&self) {
        info!(
            messages = self.messages,
            records_received = self.records_received,
            records_written = self.total_written(),
            products = self.written(EntityKind::Product),
            users = self.written(EntityKind::User),
            interactions = self.written(EntityKind::Interaction),
            transform_failures = self.transform_failures,
            skipped_empty = self.skipped_empty,
            unclassified = self.unclassified,
            unchanged = self.unchanged,
            ids_deleted = self.ids_deleted,
            batches_sent = self.uploads.batches_sent,
            batches_dropped = self.uploads.batches_dropped,
            "Run complete"
        );
    }

    fn written(&self, kind: EntityKind) -> usize {
        self.records_written.get(&kind).copied().unwrap_or(0)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Drives one run from input messages to the final checkpoint
pub struct Pipeline<S: RecordSink> {
    sink: S,
    transformers: TransformerRegistry,
    options: PipelineOptions,
    schemas: HashMap<String, Value>,
    seen_ids: HashMap<String, HashSet<String>>,
    stream_kinds: HashMap<String, EntityKind>,
    upload_state: UploadStateTracker,
    checkpoint: Option<Value>,
    seeded: bool,
    summary: RunSummary,
}

impl<S: RecordSink> Pipeline<S> {
    pub fn new(sink: S, transformers: TransformerRegistry, options: PipelineOptions) -> Self {
        Self {
            sink,
            transformers,
            options,
            schemas: HashMap::new(),
            seen_ids: HashMap::new(),
            stream_kinds: HashMap::new(),
            upload_state: UploadStateTracker::new(),
            checkpoint: None,
            seeded: false,
            summary: RunSummary::default(),
        }
    }

    /// Consume newline-delimited messages and return the final checkpoint
    ///
    /// Returns `None` when no STATE message arrived and nothing was tracked.
    pub async fn run<R>(&mut self, input: R) -> Result<Option<Value>>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut line_number = 0;

        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }

            let message = Message::parse(&line).map_err(|source| TargetError::Message {
                line: line_number,
                source,
            })?;
            self.process(message).await?;
        }

        Ok(self.finish().await)
    }

    /// Handle one message
    pub async fn process(&mut self, message: Message) -> Result<()> {
        self.summary.messages += 1;

        if let Some(stream) = message.stream() {
            if !self.transformers.contains(stream) {
                return Err(TargetError::unknown_stream(stream));
            }
        }

        match message {
            Message::Schema {
                stream,
                schema,
                key_properties,
            } => {
                debug!(stream = %stream, key_properties = ?key_properties, "Received schema");
                self.schemas.insert(stream, schema);
            },
            Message::Record { stream, record } => {
                self.handle_record(&stream, &record).await?;
            },
            Message::State { value } => {
                self.handle_state(value);
            },
            Message::ActivateVersion { stream, version } => {
                self.handle_activate_version(&stream, &version).await?;
            },
            Message::Unknown { message_type, raw } => {
                warn!(message_type = %message_type, message = %raw, "Ignoring unknown message type");
            },
        }

        Ok(())
    }

    async fn handle_record(&mut self, stream: &str, raw: &Value) -> Result<()> {
        self.summary.records_received += 1;

        let transformer = self
            .transformers
            .get(stream)
            .ok_or_else(|| TargetError::unknown_stream(stream))?;

        let output = match transformer.transform(raw) {
            Ok(output) => output,
            Err(e) => {
                self.transform_failed(stream, raw, &e);
                return Ok(());
            },
        };

        if is_empty_output(&output) {
            debug!(stream = %stream, "Transform produced no record, skipping");
            self.summary.skipped_empty += 1;
            return Ok(());
        }

        let record = match output {
            Value::Object(record) => record,
            other => {
                let e = TransformError::NotAnObject(json_type_name(&other));
                self.transform_failed(stream, raw, &e);
                return Ok(());
            },
        };

        let classified = classify(&record).and_then(|kind| Ok((kind, entity_id(kind, &record)?)));
        let (kind, id) = match classified {
            Ok(classified) => classified,
            Err(e) => {
                let record = Value::Object(record);
                warn!(
                    stream = %stream,
                    error = %e,
                    record = %record,
                    "Unable to classify record, skipping"
                );
                self.summary.unclassified += 1;
                return Ok(());
            },
        };

        self.stream_kinds.insert(stream.to_string(), kind);

        let Some(id) = id else {
            self.write(kind, record).await;
            return Ok(());
        };

        self.seen_ids
            .entry(stream.to_string())
            .or_default()
            .insert(id.clone());

        if !self.upload_state.should_upload(stream, &id, &record) {
            debug!(stream = %stream, kind = %kind, id = %id, "Record unchanged, skipping upload");
            self.summary.unchanged += 1;
            return Ok(());
        }

        if kind == EntityKind::Product || self.options.persist_user_hashes {
            self.upload_state.record_upload(stream, &id, &record);
        }

        self.write(kind, record).await;
        Ok(())
    }

    fn transform_failed(&mut self, stream: &str, raw: &Value, e: &TransformError) {
        error!(stream = %stream, error = %e, record = %raw, "Unable to transform record");
        self.summary.transform_failures += 1;
    }

    async fn write(&mut self, kind: EntityKind, record: Record) {
        self.sink.write(kind, record).await;
        *self.summary.records_written.entry(kind).or_default() += 1;
    }

    fn handle_state(&mut self, value: Value) {
        if !self.seeded {
            self.seeded = true;
            if let Some(persisted) = value.get(UPLOAD_STATE_KEY) {
                self.upload_state.seed(persisted);
                debug!(tracked = self.upload_state.len(), "Seeded upload state from checkpoint");
            }
        }
        debug!(state = %value, "Setting state");
        self.checkpoint = Some(value);
    }

    async fn handle_activate_version(&mut self, stream: &str, version: &VersionToken) -> Result<()> {
        if !self.options.reconcile {
            info!(stream = %stream, version = %version, "insert_only is set, ignoring ACTIVATE_VERSION");
            return Ok(());
        }

        let kind = match self.stream_kinds.get(stream) {
            Some(kind) if kind.is_reconcilable() => *kind,
            other => {
                info!(
                    stream = %stream,
                    version = %version,
                    kind = ?other,
                    "Nothing to reconcile, ignoring ACTIVATE_VERSION"
                );
                return Ok(());
            },
        };

        info!(stream = %stream, version = %version, kind = %kind, "Reconciling stream");

        let seen = self.seen_ids.remove(stream).unwrap_or_default();
        let deleted = reconcile(&self.sink, stream, kind, &seen)
            .await
            .map_err(|source| TargetError::Reconcile {
                stream: stream.to_string(),
                source,
            })?;

        for id in &deleted {
            self.upload_state.forget(stream, id);
        }
        self.summary.ids_deleted += deleted.len();
        self.stream_kinds.remove(stream);

        Ok(())
    }

    /// Flush the sink and build the final checkpoint
    pub async fn finish(&mut self) -> Option<Value> {
        self.sink.flush().await;
        self.summary.uploads = self.sink.upload_stats();
        self.summary.log();

        if self.checkpoint.is_none() && self.upload_state.is_empty() {
            return None;
        }

        let mut checkpoint = match self.checkpoint.take() {
            Some(Value::Object(map)) => map,
            Some(other) => {
                warn!(state = %other, "Last STATE value is not an object, dropping it");
                Map::new()
            },
            None => Map::new(),
        };
        checkpoint.insert(UPLOAD_STATE_KEY.to_string(), self.upload_state.to_value());

        Some(Value::Object(checkpoint))
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn upload_state(&self) -> &UploadStateTracker {
        &self.upload_state
    }

    /// Ids seen for a stream since its last reconciliation
    pub fn seen_ids(&self, stream: &str) -> Option<&HashSet<String>> {
        self.seen_ids.get(stream)
    }

    /// Last schema received for a stream
    pub fn schema(&self, stream: &str) -> Option<&Value> {
        self.schemas.get(stream)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
