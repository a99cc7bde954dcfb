//! Bounded scan of a compacted checkpoint partition.
//!
//! The high-water-mark is captured once before consuming; the scan stops at
//! the record just below it and never waits for messages published later.

use tracing::{debug, info, instrument};

use crate::record::{decode_key, decode_task_snapshot, TaskKey, TaskSnapshot};
use crate::snapshot::Snapshot;
use crate::{metrics, CheckpointLog, Error, LogRecord, Result};

/// Checkpoint topics have a single partition.
pub const CHECKPOINT_PARTITION: i32 = 0;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub snapshot: Snapshot,
    /// High-water-mark captured at scan start.
    pub high_watermark: i64,
    pub consumed: u64,
    /// Records whose key or value did not decode.
    pub skipped: u64,
}

/// Fails with `TopologyMismatch` unless `topic` has exactly one partition.
pub async fn validate_topic<L>(log: &L, topic: &str) -> Result<()>
where
    L: CheckpointLog + ?Sized,
{
    debug!("validating topic {}", topic);
    let partitions = log.partition_count(topic).await?;
    if partitions != 1 {
        return Err(Error::TopologyMismatch {
            topic: topic.to_string(),
            reason: format!("expected 1 partition, got {partitions}"),
        });
    }
    Ok(())
}

/// Folds every record of `topic` up to the high-water-mark into a snapshot,
/// last write per key wins. Undecodable records are counted and skipped.
///
/// Checks the partition count itself before reading, so callers that drain
/// need no separate `validate_topic`. Reading starts at the low watermark,
/// which is 0 unless the broker deleted the head of the log.
#[instrument(name = "drain_topic", skip(log))]
pub async fn drain_topic<L>(log: &mut L, topic: &str) -> Result<DrainReport>
where
    L: CheckpointLog + ?Sized,
{
    validate_topic(&*log, topic).await?;

    let (low_watermark, high_watermark) = log.watermarks(topic, CHECKPOINT_PARTITION).await?;
    let mut report = DrainReport { high_watermark, ..Default::default() };
    if high_watermark <= low_watermark {
        info!("topic {} is empty", topic);
        return Ok(report);
    }

    log.start_consuming(topic, CHECKPOINT_PARTITION, low_watermark).await?;
    loop {
        let record = log.next_record().await?;
        report.consumed += 1;
        metrics::RECORDS_CONSUMED.inc();
        debug!(
            offset = record.offset,
            high_watermark,
            left = high_watermark - record.offset - 1,
            "restoring from topic"
        );

        match decode_record(&record) {
            Ok((key, streams)) => {
                report.snapshot.insert(key, streams);
            }
            Err((reason, e)) => {
                report.skipped += 1;
                metrics::RECORDS_SKIPPED.with_label_values(&[reason]).inc();
                debug!(offset = record.offset, "skipping record: {}", e);
            }
        }

        if record.offset + 1 >= high_watermark {
            break;
        }
    }

    info!(
        tasks = report.snapshot.len(),
        consumed = report.consumed,
        skipped = report.skipped,
        "drained {}",
        topic
    );
    Ok(report)
}

fn decode_record(record: &LogRecord) -> std::result::Result<(TaskKey, TaskSnapshot), (&'static str, Error)> {
    let key = record
        .key
        .as_deref()
        .ok_or_else(|| Error::MalformedRecord("record has no key".into()))
        .and_then(decode_key)
        .map_err(|e| ("key", e))?;
    let streams = record
        .value
        .as_deref()
        .ok_or_else(|| Error::MalformedRecord("record has no value".into()))
        .and_then(decode_task_snapshot)
        .map_err(|e| ("value", e))?;
    Ok((key, streams))
}
