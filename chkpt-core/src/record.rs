use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Kind marker carried by every checkpoint key.
pub const CHECKPOINT_KIND: &str = "checkpoint";

/// Identity of a consumer task's assignment, used as the message key on the
/// checkpoint topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    #[serde(rename = "systemstreampartition-grouper-factory")]
    pub grouper_factory: String,
    #[serde(rename = "taskName")]
    pub task_name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl TaskKey {
    pub fn new(grouper_factory: impl Into<String>, task_name: impl Into<String>) -> Self {
        Self {
            grouper_factory: grouper_factory.into(),
            task_name: task_name.into(),
            kind: CHECKPOINT_KIND.to_string(),
        }
    }
}

/// Last committed offset of one stream-partition. Offsets and partitions stay
/// in decimal text form, as they appear on the topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointValue {
    pub system: String,
    pub partition: String,
    pub offset: String,
    pub stream: String,
}

/// Opaque label of a stream-partition assignment, e.g.
/// `SystemStreamPartition [kafka, events, 3]`. Never parsed.
pub type StreamPartitionId = String;

/// Every stream-partition a task had committed.
pub type TaskSnapshot = BTreeMap<StreamPartitionId, CheckpointValue>;

pub fn decode_key(raw: &[u8]) -> Result<TaskKey> {
    serde_json::from_slice(raw).map_err(|e| Error::MalformedRecord(format!("task key: {e}")))
}

pub fn decode_task_snapshot(raw: &[u8]) -> Result<TaskSnapshot> {
    serde_json::from_slice(raw).map_err(|e| Error::MalformedRecord(format!("task snapshot: {e}")))
}

pub fn encode_key(key: &TaskKey) -> Result<String> {
    Ok(serde_json::to_string(key)?)
}

pub fn encode_task_snapshot(streams: &TaskSnapshot) -> Result<String> {
    Ok(serde_json::to_string(streams)?)
}
