#![cfg(feature = "kafka")]

use std::collections::BTreeMap;
use std::time::Duration;

use chkpt_core::{drain_topic, publish_snapshot, CheckpointValue, Snapshot, TaskKey, TaskSnapshot};
use chkpt_io::{KafkaCheckpointLog, KafkaCheckpointPublisher, KafkaClientConfig};

/// Needs a broker in `KAFKA_BROKER` and an existing single-partition topic in
/// `KAFKA_CHECKPOINT_TOPIC`; skipped otherwise.
#[tokio::test]
async fn publish_then_drain_if_env_present() {
    let brokers = match std::env::var("KAFKA_BROKER") {
        Ok(v) => v,
        Err(_) => return,
    }; // skip if not configured
    let topic = match std::env::var("KAFKA_CHECKPOINT_TOPIC") {
        Ok(v) => v,
        Err(_) => return,
    };

    let cfg = KafkaClientConfig {
        brokers,
        group_id: "chkpt-integration".into(),
        request_timeout: Duration::from_secs(10),
        properties: BTreeMap::new(),
    };

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let key = TaskKey::new("GroupByPartitionFactory", format!("Partition-{nanos}"));
    let mut streams = TaskSnapshot::new();
    streams.insert(
        "SystemStreamPartition [kafka, events, 0]".into(),
        CheckpointValue {
            system: "kafka".into(),
            partition: "0".into(),
            offset: nanos.to_string(),
            stream: "events".into(),
        },
    );
    let mut snapshot = Snapshot::new();
    snapshot.insert(key.clone(), streams.clone());

    let publisher = KafkaCheckpointPublisher::connect(&cfg).expect("producer");
    publish_snapshot(&publisher, &topic, &snapshot).await.unwrap();

    let mut log = KafkaCheckpointLog::connect(&cfg).expect("consumer");
    let report = tokio::time::timeout(Duration::from_secs(30), drain_topic(&mut log, &topic))
        .await
        .expect("drain did not finish")
        .unwrap();
    assert_eq!(report.snapshot.get(&key), Some(&streams));
}
