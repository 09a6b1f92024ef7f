//! Stream fan-in harness.
//!
//! Each worker (event detector, aggregator, device-status updater, rollup
//! updater) consumes a change feed and must isolate per-record failures: one
//! bad record should not fail the whole batch, and the caller needs back the
//! exact set of records to retry. This module is that isolation boundary,
//! plus the tombstone filter — `Remove` records never reach a handler.

use std::future::Future;

use crate::persistence::{ChangeKind, ChangeRecord};

/// Kind reported by the underlying change feed, before filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawChangeKind {
    Insert,
    Modify,
    Remove,
}

/// One record as delivered by the raw change feed. `item` is `None` for a
/// `Remove` (the store doesn't hand back the deleted row).
#[derive(Debug, Clone)]
pub struct RawChangeRecord<T> {
    pub sequence_number: String,
    pub kind: RawChangeKind,
    pub item: Option<T>,
}

/// Drop tombstones and anything else the underlying feed couldn't attach an
/// item to; converts the rest into [`ChangeRecord`] for the workers.
pub fn filter_tombstones<T>(raw: Vec<RawChangeRecord<T>>) -> Vec<ChangeRecord<T>> {
    raw.into_iter()
        .filter_map(|record| {
            let kind = match record.kind {
                RawChangeKind::Insert => ChangeKind::Insert,
                RawChangeKind::Modify => ChangeKind::Modify,
                RawChangeKind::Remove => return None,
            };
            record.item.map(|item| ChangeRecord { sequence_number: record.sequence_number, kind, item })
        })
        .collect()
}

/// Run `handler` over every record, isolating failures: a record whose
/// handler returns `Err` is logged and its sequence number is collected, but
/// processing continues with the rest of the batch. The returned list is
/// exactly the set of sequence numbers the caller should report back to the
/// queue as failed (so only those are redelivered).
pub async fn process_batch_with_isolation<T, F, Fut>(records: Vec<ChangeRecord<T>>, handler: F) -> Vec<String>
where
    F: Fn(ChangeRecord<T>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let mut failed_sequence_numbers = Vec::new();
    for record in records {
        let sequence_number = record.sequence_number.clone();
        if let Err(err) = handler(record).await {
            tracing::error!(sequence_number = %sequence_number, error = %err, "stream record processing failed");
            failed_sequence_numbers.push(sequence_number);
        }
    }
    failed_sequence_numbers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstones_are_dropped() {
        let raw = vec![
            RawChangeRecord { sequence_number: "1".to_string(), kind: RawChangeKind::Insert, item: Some(1) },
            RawChangeRecord { sequence_number: "2".to_string(), kind: RawChangeKind::Remove, item: None },
            RawChangeRecord { sequence_number: "3".to_string(), kind: RawChangeKind::Modify, item: Some(3) },
        ];
        let filtered = filter_tombstones(raw);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].sequence_number, "1");
        assert_eq!(filtered[1].sequence_number, "3");
    }

    #[tokio::test]
    async fn one_failing_record_does_not_block_the_rest() {
        let records = vec![
            ChangeRecord { sequence_number: "1".to_string(), kind: ChangeKind::Insert, item: 1 },
            ChangeRecord { sequence_number: "2".to_string(), kind: ChangeKind::Insert, item: 2 },
            ChangeRecord { sequence_number: "3".to_string(), kind: ChangeKind::Insert, item: 3 },
        ];
        let processed = std::sync::Mutex::new(Vec::new());
        let failures = process_batch_with_isolation(records, |record| {
            let result = if record.item == 2 { Err(anyhow::anyhow!("boom")) } else { Ok(()) };
            processed.lock().unwrap().push(record.item);
            async move { result }
        })
        .await;
        assert_eq!(failures, vec!["2".to_string()]);
        assert_eq!(*processed.lock().unwrap(), vec![1, 2, 3]);
    }
}
