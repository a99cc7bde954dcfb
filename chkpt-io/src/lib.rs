//! chkpt-io: checkpoint snapshot files and the Kafka collaborators.
//! - `read_snapshot_file` / `write_snapshot_file`: one `key<TAB>streams` JSON line per task
//! - `KafkaCheckpointLog` / `KafkaCheckpointPublisher` (feature `kafka`)

use std::path::Path;

use chkpt_core::record::{decode_key, decode_task_snapshot, encode_key, encode_task_snapshot};
use chkpt_core::{Error, Result, Snapshot, TaskKey, TaskSnapshot};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tracing::info;

/// Encodes one task as a file line, without the trailing newline.
pub fn encode_line(key: &TaskKey, streams: &TaskSnapshot) -> Result<String> {
    Ok(format!("{}\t{}", encode_key(key)?, encode_task_snapshot(streams)?))
}

/// Decodes one file line. Anything but exactly two tab separated JSON
/// fields is malformed.
pub fn decode_line(line: &str) -> Result<(TaskKey, TaskSnapshot)> {
    let mut fields = line.split('\t');
    let (Some(raw_key), Some(raw_streams), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(Error::MalformedRecord(format!("expected 2 tab separated fields in '{line}'")));
    };
    let key = decode_key(raw_key.as_bytes())
        .map_err(|e| Error::MalformedRecord(format!("unexpected key '{raw_key}': {e}")))?;
    let streams = decode_task_snapshot(raw_streams.as_bytes())
        .map_err(|e| Error::MalformedRecord(format!("unexpected streams '{raw_streams}': {e}")))?;
    Ok((key, streams))
}

/// Renders the whole snapshot in file format.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<String> {
    let mut out = String::new();
    for (key, streams) in snapshot {
        out.push_str(&encode_line(key, streams)?);
        out.push('\n');
    }
    Ok(out)
}

/// Parses file content. The first bad line fails the whole read; a later
/// line for the same task replaces an earlier one.
pub fn decode_snapshot(text: &str) -> Result<Snapshot> {
    let mut snapshot = Snapshot::new();
    for line in text.lines() {
        let (key, streams) = decode_line(line)?;
        snapshot.insert(key, streams);
    }
    Ok(snapshot)
}

pub async fn read_snapshot_file(path: impl AsRef<Path>) -> Result<Snapshot> {
    let path = path.as_ref();
    let mut lines = tokio::io::BufReader::new(tokio::fs::File::open(path).await?).lines();
    let mut snapshot = Snapshot::new();
    let mut n = 0usize;
    while let Some(line) = lines.next_line().await? {
        n += 1;
        let (key, streams) = decode_line(&line).map_err(|e| match e {
            Error::MalformedRecord(msg) => Error::MalformedRecord(format!("{}:{}: {}", path.display(), n, msg)),
            other => other,
        })?;
        snapshot.insert(key, streams);
    }
    info!(tasks = snapshot.len(), "read checkpoints from {}", path.display());
    Ok(snapshot)
}

/// Creates or truncates `path` and writes the snapshot to it.
pub async fn write_snapshot_file(path: impl AsRef<Path>, snapshot: &Snapshot) -> Result<()> {
    let path = path.as_ref();
    let data = encode_snapshot(snapshot)?;
    let persist = |e: std::io::Error| Error::PersistFailure(format!("writing {}: {}", path.display(), e));
    let mut f = tokio::fs::File::create(path).await.map_err(persist)?;
    f.write_all(data.as_bytes()).await.map_err(persist)?;
    f.flush().await.map_err(persist)?;
    chkpt_core::metrics::BYTES_WRITTEN.with_label_values(&["file"]).inc_by(data.len() as u64);
    Ok(())
}

// --- Optional Kafka integration (behind feature flag) ---
#[cfg(feature = "kafka")]
mod kafka;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaCheckpointLog, KafkaCheckpointPublisher, KafkaClientConfig};
