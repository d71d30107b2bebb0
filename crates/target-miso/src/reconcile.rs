//! Stale-record reconciliation
//!
//! When a stream's version is activated, every id the server holds for that
//! stream's entity kind but the run did not see is deleted.

use crate::api::ApiError;
use crate::classify::EntityKind;
use crate::uploader::RecordSink;
use std::collections::{BTreeSet, HashSet};
use tracing::info;

/// Delete remote ids not seen in this run; returns the deleted ids
///
/// No delete request is made when nothing is stale.
pub async fn reconcile<S>(
    sink: &S,
    stream: &str,
    kind: EntityKind,
    seen: &HashSet<String>,
) -> Result<BTreeSet<String>, ApiError>
where
    S: RecordSink + ?Sized,
{
    let existing = sink.existing_ids(kind).await?;

    let stale: BTreeSet<String> = existing.difference(seen).cloned().collect();

    info!(
        stream = %stream,
        kind = %kind,
        existing = existing.len(),
        seen = seen.len(),
        stale = stale.len(),
        "Reconciled remote ids"
    );

    if !stale.is_empty() {
        sink.delete_records(kind, &stale).await?;
    }

    Ok(stale)
}
