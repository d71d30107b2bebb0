//! Upload state: the last uploaded content hash per entity id per stream
//!
//! The tracker lives in memory for one run and travels between runs inside
//! the checkpoint under [`UPLOAD_STATE_KEY`].

use crate::record::Record;
use miso_common::checksum::record_hash;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Reserved checkpoint key holding the upload state
pub const UPLOAD_STATE_KEY: &str = "__miso_target_state__";

/// Tracks `{stream -> {entity_id -> content_hash}}`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadStateTracker {
    streams: BTreeMap<String, BTreeMap<String, String>>,
}

impl UploadStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a persisted upload state into this tracker
    ///
    /// Entries already present win over seeded ones. Entries that are not
    /// `stream -> {id -> hash string}` are skipped with a warning.
    pub fn seed(&mut self, persisted: &Value) {
        let Some(streams) = persisted.as_object() else {
            warn!(value = %persisted, "Ignoring upload state that is not an object");
            return;
        };

        for (stream, entries) in streams {
            let Some(entries) = entries.as_object() else {
                warn!(stream = %stream, "Ignoring upload state entry that is not an object");
                continue;
            };
            let tracked = self.streams.entry(stream.clone()).or_default();
            for (id, hash) in entries {
                match hash.as_str() {
                    Some(hash) => {
                        tracked
                            .entry(id.clone())
                            .or_insert_with(|| hash.to_string());
                    },
                    None => {
                        warn!(stream = %stream, id = %id, "Ignoring non-string upload hash");
                    },
                }
            }
        }
    }

    /// False when the record's content matches the last uploaded content
    pub fn should_upload(&self, stream: &str, id: &str, record: &Record) -> bool {
        match self.hash_of(stream, id) {
            Some(previous) => previous != record_hash(record),
            None => true,
        }
    }

    /// Remember the record's content hash as uploaded
    pub fn record_upload(&mut self, stream: &str, id: &str, record: &Record) {
        self.streams
            .entry(stream.to_string())
            .or_default()
            .insert(id.to_string(), record_hash(record));
    }

    /// Drop the tracked hash for an id; returns whether one existed
    pub fn forget(&mut self, stream: &str, id: &str) -> bool {
        self.streams
            .get_mut(stream)
            .map(|entries| entries.remove(id).is_some())
            .unwrap_or(false)
    }

    /// Tracked hash for an id
    pub fn hash_of(&self, stream: &str, id: &str) -> Option<&str> {
        self.streams
            .get(stream)
            .and_then(|entries| entries.get(id))
            .map(String::as_str)
    }

    /// Number of tracked ids across all streams
    pub fn len(&self) -> usize {
        self.streams.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize for embedding in the checkpoint
    pub fn to_value(&self) -> Value {
        let streams: Map<String, Value> = self
            .streams
            .iter()
            .map(|(stream, entries)| {
                let entries: Map<String, Value> = entries
                    .iter()
                    .map(|(id, hash)| (id.clone(), Value::String(hash.clone())))
                    .collect();
                (stream.clone(), Value::Object(entries))
            })
            .collect();
        Value::Object(streams)
    }
}
