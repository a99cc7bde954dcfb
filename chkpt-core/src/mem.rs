use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{CheckpointLog, CheckpointPublisher, Error, LogRecord, Result};

#[derive(Clone, Default)]
struct Partition {
    records: Vec<LogRecord>,
    /// Offset the next appended record gets.
    next_offset: i64,
}

impl Partition {
    fn low(&self) -> i64 {
        self.records.first().map_or(self.next_offset, |r| r.offset)
    }
}

#[derive(Default)]
struct Inner {
    topics: HashMap<String, Vec<Partition>>,
    /// Fail every publish once this many have succeeded.
    fail_after: Option<usize>,
    published: usize,
    reads: usize,
}

/// A broker held in memory. Clones share the same topics.
///
/// Each handle keeps its own consume position, so one clone can drain while
/// another publishes.
#[derive(Clone, Default)]
pub struct InMemoryLog {
    inner: Arc<Mutex<Inner>>,
    cursor: Option<(String, i32, i64)>,
}

impl InMemoryLog {
    /// Creates (or resets) a topic with `partitions` empty partitions.
    pub fn create_topic(&self, topic: &str, partitions: usize) {
        self.inner.lock().topics.insert(topic.to_string(), vec![Partition::default(); partitions]);
    }

    /// Appends a record to partition 0 and returns its offset.
    pub fn append(&self, topic: &str, key: Option<&[u8]>, value: Option<&[u8]>) -> i64 {
        let mut guard = self.inner.lock();
        let partitions = guard.topics.entry(topic.to_string()).or_insert_with(|| vec![Partition::default()]);
        let log = &mut partitions[0];
        let offset = log.next_offset;
        log.records.push(LogRecord {
            offset,
            key: key.map(<[u8]>::to_vec),
            value: value.map(<[u8]>::to_vec),
        });
        log.next_offset += 1;
        offset
    }

    /// Drops every record of partition 0 below `offset`, like a broker-side
    /// delete-records request. Offsets of the remaining records are kept.
    pub fn delete_records_before(&self, topic: &str, offset: i64) {
        if let Some(log) = self.inner.lock().topics.get_mut(topic).and_then(|p| p.first_mut()) {
            log.records.retain(|r| r.offset >= offset);
        }
    }

    pub fn records(&self, topic: &str) -> Vec<LogRecord> {
        self.inner
            .lock()
            .topics
            .get(topic)
            .and_then(|p| p.first())
            .map(|log| log.records.clone())
            .unwrap_or_default()
    }

    /// Makes every publish after the first `n` fail.
    pub fn fail_publish_after(&self, n: usize) {
        self.inner.lock().fail_after = Some(n);
    }

    /// Number of records handed out by `next_record` across all handles.
    pub fn reads(&self) -> usize {
        self.inner.lock().reads
    }
}

fn missing(topic: &str) -> Error {
    Error::TopologyMismatch { topic: topic.to_string(), reason: "topic does not exist".into() }
}

fn partition_of<'a>(topics: &'a HashMap<String, Vec<Partition>>, topic: &str, partition: i32) -> Result<&'a Partition> {
    let partitions = topics.get(topic).ok_or_else(|| missing(topic))?;
    usize::try_from(partition)
        .ok()
        .and_then(|p| partitions.get(p))
        .ok_or_else(|| Error::TransportFailure(format!("unknown partition {topic}/{partition}")))
}

#[async_trait]
impl CheckpointLog for InMemoryLog {
    async fn partition_count(&self, topic: &str) -> Result<usize> {
        self.inner.lock().topics.get(topic).map(Vec::len).ok_or_else(|| missing(topic))
    }

    async fn watermarks(&self, topic: &str, partition: i32) -> Result<(i64, i64)> {
        let guard = self.inner.lock();
        let log = partition_of(&guard.topics, topic, partition)?;
        Ok((log.low(), log.next_offset))
    }

    async fn start_consuming(&mut self, topic: &str, partition: i32, offset: i64) -> Result<()> {
        let guard = self.inner.lock();
        let log = partition_of(&guard.topics, topic, partition)?;
        if offset < log.low() || offset > log.next_offset {
            return Err(Error::TransportFailure(format!("offset {offset} out of range for {topic}/{partition}")));
        }
        drop(guard);
        self.cursor = Some((topic.to_string(), partition, offset));
        Ok(())
    }

    async fn next_record(&mut self) -> Result<LogRecord> {
        let (topic, partition, position) = self
            .cursor
            .as_mut()
            .ok_or_else(|| Error::TransportFailure("consumer is not assigned".into()))?;
        let mut guard = self.inner.lock();
        let record = partition_of(&guard.topics, topic, *partition)?
            .records
            .iter()
            .find(|r| r.offset >= *position)
            .cloned()
            .ok_or_else(|| Error::TransportFailure(format!("no record at offset {position} of {topic}")))?;
        *position = record.offset + 1;
        guard.reads += 1;
        Ok(record)
    }
}

#[async_trait]
impl CheckpointPublisher for InMemoryLog {
    async fn publish(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<()> {
        {
            let mut guard = self.inner.lock();
            if !guard.topics.contains_key(topic) {
                return Err(Error::PersistFailure(format!("unknown topic {topic}")));
            }
            let published = guard.published;
            if guard.fail_after.is_some_and(|n| published >= n) {
                return Err(Error::PersistFailure(format!("injected failure producing to {topic}")));
            }
            guard.published += 1;
        }
        self.append(topic, Some(key), Some(value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_consume_in_order() {
        let mut log = InMemoryLog::default();
        log.create_topic("t", 1);
        log.append("t", Some(&b"k0"[..]), Some(&b"v0"[..]));
        log.append("t", None, Some(&b"v1"[..]));

        assert_eq!(log.partition_count("t").await.unwrap(), 1);
        assert_eq!(log.watermarks("t", 0).await.unwrap(), (0, 2));

        log.start_consuming("t", 0, 1).await.unwrap();
        let rec = log.next_record().await.unwrap();
        assert_eq!(rec.offset, 1);
        assert_eq!(rec.key, None);
        assert!(log.next_record().await.is_err());
        assert_eq!(log.reads(), 1);
    }

    #[tokio::test]
    async fn deleted_records_raise_the_low_watermark() {
        let mut log = InMemoryLog::default();
        log.create_topic("t", 1);
        for v in [b"a", b"b", b"c"] {
            log.append("t", Some(&b"k"[..]), Some(&v[..]));
        }
        log.delete_records_before("t", 2);

        assert_eq!(log.watermarks("t", 0).await.unwrap(), (2, 3));
        assert!(log.start_consuming("t", 0, 0).await.is_err());
        log.start_consuming("t", 0, 2).await.unwrap();
        assert_eq!(log.next_record().await.unwrap().offset, 2);

        log.delete_records_before("t", 3);
        assert_eq!(log.watermarks("t", 0).await.unwrap(), (3, 3));
    }

    #[tokio::test]
    async fn missing_topic_is_topology_mismatch() {
        let log = InMemoryLog::default();
        assert!(matches!(log.partition_count("nope").await, Err(Error::TopologyMismatch { .. })));
    }

    #[tokio::test]
    async fn injected_publish_failure() {
        let log = InMemoryLog::default();
        log.create_topic("t", 1);
        log.fail_publish_after(1);
        log.publish("t", b"a", b"1").await.unwrap();
        let err = log.publish("t", b"b", b"2").await.unwrap_err();
        assert!(matches!(err, Error::PersistFailure(_)));
        assert_eq!(log.records("t").len(), 1);
    }
}
