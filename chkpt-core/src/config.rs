use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::snapshot::StreamFilter;

pub const DEFAULT_TOPIC_PREFIX: &str = "__checkpoint_ver_1_for_";

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Topic to file.
    Extract,
    /// File to topic.
    Replace,
    /// File merged into topic.
    Patch,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Extract => "extract",
            Mode::Replace => "replace",
            Mode::Patch => "patch",
        })
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    /// Metadata and watermark request timeout, e.g. "10s".
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
    /// Extra librdkafka properties applied to both clients.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_request_timeout() -> String {
    "10s".into()
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self { request_timeout: default_request_timeout(), properties: BTreeMap::new() }
    }
}

/// Settings that can be kept in a TOML file. Everything is optional; command
/// line flags fill in or override.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default)]
    pub brokers: Option<String>,
    #[serde(default)]
    pub job: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub topic_prefix: Option<String>,
    #[serde(default)]
    pub filter: StreamFilter,
    #[serde(default)]
    pub kafka: KafkaConfig,
}

impl FileConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Everything one run needs, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub brokers: Vec<String>,
    pub job: String,
    pub file: PathBuf,
    pub mode: Mode,
    pub filter: StreamFilter,
    /// Persist results; otherwise only print them.
    pub commit: bool,
    pub topic_prefix: String,
    pub kafka: KafkaConfig,
}

impl ToolConfig {
    pub fn new(mode: Mode, job: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            brokers: Vec::new(),
            job: job.into(),
            file: file.into(),
            mode,
            filter: StreamFilter::default(),
            commit: false,
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            kafka: KafkaConfig::default(),
        }
    }

    pub fn checkpoint_topic(&self) -> String {
        format!("{}{}_1", self.topic_prefix, self.job)
    }

    pub fn request_timeout_ms(&self) -> anyhow::Result<i64> {
        parse_duration_ms(&self.kafka.request_timeout)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.brokers.is_empty() {
            anyhow::bail!("no kafka brokers configured");
        }
        if self.job.trim().is_empty() {
            anyhow::bail!("job name must be set");
        }
        if self.file.as_os_str().is_empty() {
            anyhow::bail!("checkpoints file path must be set");
        }
        if self.request_timeout_ms()? <= 0 {
            anyhow::bail!("kafka.request_timeout must be positive");
        }
        Ok(())
    }
}

/// Splits a comma separated list, dropping empty items.
pub fn parse_stream_list(s: &str) -> Vec<String> {
    s.split(',').map(str::trim).filter(|x| !x.is_empty()).map(String::from).collect()
}

pub fn parse_duration_ms(s: &str) -> anyhow::Result<i64> {
    // values like "10s", "500ms", "2m"
    let s = s.trim();
    let (num, unit_ms) = if let Some(num) = s.strip_suffix("ms") {
        (num, 1)
    } else if let Some(num) = s.strip_suffix('s') {
        (num, 1_000)
    } else if let Some(num) = s.strip_suffix('m') {
        (num, 60_000)
    } else if let Some(num) = s.strip_suffix('h') {
        (num, 3_600_000)
    } else {
        // default assume seconds
        (s, 1_000)
    };
    match num.parse::<i64>()?.checked_mul(unit_ms) {
        Some(ms) => Ok(ms),
        None => anyhow::bail!("duration out of range: {s}"),
    }
}
