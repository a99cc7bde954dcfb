use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use chkpt_core::config::ToolConfig;
use chkpt_core::{CheckpointLog, CheckpointPublisher, Error, LogRecord, Result};
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::info;

/// Connection settings shared by the consumer and the producer.
#[derive(Debug, Clone)]
pub struct KafkaClientConfig {
    pub brokers: String,
    pub group_id: String,
    pub request_timeout: Duration,
    pub properties: BTreeMap<String, String>,
}

impl KafkaClientConfig {
    pub fn from_tool_config(cfg: &ToolConfig) -> anyhow::Result<Self> {
        let timeout_ms = u64::try_from(cfg.request_timeout_ms()?).context("negative request timeout")?;
        Ok(Self {
            brokers: cfg.brokers.join(","),
            group_id: format!("chkpt-{}", cfg.job),
            request_timeout: Duration::from_millis(timeout_ms),
            properties: cfg.kafka.properties.clone(),
        })
    }

    fn client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::new();
        cfg.set("bootstrap.servers", &self.brokers);
        for (k, v) in &self.properties {
            cfg.set(k, v);
        }
        cfg
    }

    /// Assigned reader settings. With `auto.offset.reset` left at librdkafka's
    /// `latest`, an assigned offset below the log start would jump to the end
    /// and the bounded scan would wait for a record that never comes.
    fn consumer_config(&self) -> ClientConfig {
        let mut cfg = self.client_config();
        cfg.set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", "earliest");
        cfg
    }

    fn producer_config(&self) -> ClientConfig {
        let mut cfg = self.client_config();
        cfg.set("acks", "1").set("compression.type", "none").set("linger.ms", "0");
        cfg
    }
}

fn transport(e: KafkaError) -> Error {
    Error::TransportFailure(e.to_string())
}

/// Reads a checkpoint partition through an assigned (not subscribed)
/// consumer. Offsets are never committed.
pub struct KafkaCheckpointLog {
    consumer: Arc<StreamConsumer>,
    timeout: Duration,
}

impl KafkaCheckpointLog {
    pub fn connect(cfg: &KafkaClientConfig) -> anyhow::Result<Self> {
        let consumer: StreamConsumer =
            cfg.consumer_config().create().context("failed to create kafka consumer")?;
        info!("connected to {}", cfg.brokers);
        Ok(Self { consumer: Arc::new(consumer), timeout: cfg.request_timeout })
    }

    /// Runs a synchronous librdkafka request on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&StreamConsumer, Duration) -> std::result::Result<T, KafkaError> + Send + 'static,
    {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || f(&consumer, timeout))
            .await
            .map_err(|e| Error::TransportFailure(format!("metadata request aborted: {e}")))?
            .map_err(transport)
    }
}

#[async_trait]
impl CheckpointLog for KafkaCheckpointLog {
    async fn partition_count(&self, topic: &str) -> Result<usize> {
        let name = topic.to_string();
        let metadata = self.blocking(move |c, timeout| c.fetch_metadata(Some(&name), timeout)).await?;
        let mismatch = |reason: String| Error::TopologyMismatch { topic: topic.to_string(), reason };
        let t = metadata
            .topics()
            .iter()
            .find(|t| t.name() == topic)
            .ok_or_else(|| mismatch("topic not found in metadata".into()))?;
        if let Some(err) = t.error() {
            return Err(mismatch(format!("unable to get topic info: {:?}", RDKafkaErrorCode::from(err))));
        }
        Ok(t.partitions().len())
    }

    async fn watermarks(&self, topic: &str, partition: i32) -> Result<(i64, i64)> {
        let name = topic.to_string();
        self.blocking(move |c, timeout| c.fetch_watermarks(&name, partition, timeout)).await
    }

    async fn start_consuming(&mut self, topic: &str, partition: i32, offset: i64) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(topic, partition, Offset::Offset(offset)).map_err(transport)?;
        self.consumer.assign(&tpl).map_err(transport)
    }

    async fn next_record(&mut self) -> Result<LogRecord> {
        let m = self.consumer.recv().await.map_err(transport)?;
        Ok(LogRecord {
            offset: m.offset(),
            key: m.key().map(<[u8]>::to_vec),
            value: m.payload().map(<[u8]>::to_vec),
        })
    }
}

/// Producer waiting for the partition leader's acknowledgement of every message.
pub struct KafkaCheckpointPublisher {
    producer: FutureProducer,
}

impl KafkaCheckpointPublisher {
    pub fn connect(cfg: &KafkaClientConfig) -> anyhow::Result<Self> {
        let producer: FutureProducer =
            cfg.producer_config().create().context("failed to create kafka producer")?;
        Ok(Self { producer })
    }
}

#[async_trait]
impl CheckpointPublisher for KafkaCheckpointPublisher {
    async fn publish(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let record = FutureRecord::to(topic).key(key).payload(value);
        self.producer
            .send(record, Timeout::Never)
            .await
            .map(|_| ())
            .map_err(|(e, _)| Error::PersistFailure(format!("unable to produce to {topic}: {e}")))
    }
}
