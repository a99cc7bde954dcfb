//! chkpt-core: checkpoint snapshot model and the broker-facing algorithms.
//!
//! - `record`: `TaskKey`, `CheckpointValue`, `TaskSnapshot` and their JSON contract
//! - `snapshot`: `Snapshot` with filter and merge
//! - `drain`: bounded scan of a compacted checkpoint partition into a `Snapshot`
//! - `writer`: publish a `Snapshot` as one message per task
//! - Traits: `CheckpointLog`, `CheckpointPublisher` (implemented by `InMemoryLog`
//!   here and by the Kafka client in `chkpt-io`)
//!
//! Quick example:
//! ```no_run
//! use chkpt_core::{drain_topic, publish_snapshot, InMemoryLog, StreamFilter};
//! # #[tokio::main]
//! # async fn main() -> chkpt_core::Result<()> {
//! let mut log = InMemoryLog::default();
//! log.create_topic("__checkpoint_ver_1_for_wordcount_1", 1);
//! let report = drain_topic(&mut log, "__checkpoint_ver_1_for_wordcount_1").await?;
//! let narrowed = report.snapshot.filter(&StreamFilter::new(["events"], Vec::<String>::new()));
//! publish_snapshot(&log, "__checkpoint_ver_1_for_wordcount_1", &narrowed).await?;
//! # Ok(()) }
//! ```

pub mod config;
pub mod drain;
pub mod mem;
pub mod metrics;
pub mod record;
pub mod snapshot;
pub mod writer;

pub use drain::{drain_topic, validate_topic, DrainReport, CHECKPOINT_PARTITION};
pub use mem::InMemoryLog;
pub use record::{CheckpointValue, StreamPartitionId, TaskKey, TaskSnapshot, CHECKPOINT_KIND};
pub use snapshot::{Snapshot, StreamFilter};
pub use writer::publish_snapshot;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A key or value failed to decode.
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    /// The topic is missing or does not have exactly one partition.
    #[error("topology mismatch for topic {topic}: {reason}")]
    TopologyMismatch { topic: String, reason: String },
    /// A publish or a file write failed part way.
    #[error("persist failure: {0}")]
    PersistFailure(String),
    /// The broker client failed.
    #[error("transport failure: {0}")]
    TransportFailure(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// One message read from a log partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
}

/// Read side of the broker.
#[async_trait::async_trait]
pub trait CheckpointLog: Send {
    /// Number of partitions of `topic`. A missing topic is a `TopologyMismatch`.
    async fn partition_count(&self, topic: &str) -> Result<usize>;
    /// `(low, high)`: offset of the first retained record and offset one past
    /// the last record currently in the partition.
    async fn watermarks(&self, topic: &str, partition: i32) -> Result<(i64, i64)>;
    /// Positions the consumer so that `next_record` starts at `offset`.
    async fn start_consuming(&mut self, topic: &str, partition: i32, offset: i64) -> Result<()>;
    /// Next record in ascending offset order. May wait on the network.
    async fn next_record(&mut self) -> Result<LogRecord>;
}

/// Write side of the broker.
#[async_trait::async_trait]
pub trait CheckpointPublisher: Send + Sync {
    /// Resolves once the leader acknowledged the message. Failures are
    /// reported as `PersistFailure`.
    async fn publish(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<()>;
}
