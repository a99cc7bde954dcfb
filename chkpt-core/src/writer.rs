use tracing::info;

use crate::record::{encode_key, encode_task_snapshot};
use crate::snapshot::Snapshot;
use crate::{metrics, CheckpointPublisher, Error, Result};

/// Publishes one message per task, each confirmed before the next is sent.
///
/// Not transactional: on the first failure the messages already sent stay
/// in the log and the error is returned as `PersistFailure`.
pub async fn publish_snapshot<P>(publisher: &P, topic: &str, snapshot: &Snapshot) -> Result<usize>
where
    P: CheckpointPublisher + ?Sized,
{
    let mut published = 0;
    for (key, streams) in snapshot {
        let k = encode_key(key)?;
        let v = encode_task_snapshot(streams)?;
        info!("producing {}: {}", k, v);
        publisher.publish(topic, k.as_bytes(), v.as_bytes()).await.map_err(|e| match e {
            Error::PersistFailure(_) => e,
            other => Error::PersistFailure(format!("unable to produce to {topic}: {other}")),
        })?;
        metrics::MESSAGES_PUBLISHED.inc();
        published += 1;
    }
    Ok(published)
}
