use std::path::PathBuf;

use anyhow::Context as _;
use chkpt_core::config::{parse_stream_list, FileConfig, Mode, ToolConfig, DEFAULT_TOPIC_PREFIX};
use chkpt_io::{KafkaCheckpointLog, KafkaCheckpointPublisher, KafkaClientConfig};
use clap::{Args, Parser, Subcommand};

mod run;

#[derive(Parser, Debug)]
#[command(name = "chkpt", version, about = "Move stream job checkpoints between a Kafka topic and a file")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract checkpoints from topic to file
    Extract(RunArgs),
    /// Replace checkpoints in topic with data from file
    Replace(RunArgs),
    /// Patch (merge) checkpoints in topic with data from file
    Patch(RunArgs),
}

impl Commands {
    fn into_parts(self) -> (Mode, RunArgs) {
        match self {
            Commands::Extract(args) => (Mode::Extract, args),
            Commands::Replace(args) => (Mode::Replace, args),
            Commands::Patch(args) => (Mode::Patch, args),
        }
    }
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// The Kafka brokers to connect to, as a comma separated list
    #[arg(long, env = "KAFKA_BROKERS")]
    brokers: Option<String>,
    /// Stream job name
    #[arg(short, long)]
    job: Option<String>,
    /// Checkpoints file path
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Include only these streams from input source (a comma separated list)
    #[arg(long, value_name = "STREAMS")]
    only: Option<String>,
    /// Exclude streams from input source (a comma separated list)
    #[arg(long, value_name = "STREAMS")]
    except: Option<String>,
    /// Commit data to file/topic, otherwise just print result
    #[arg(long)]
    commit: bool,
    /// TOML file with defaults for the options above
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// More logging
    #[arg(short, long)]
    verbose: bool,
    /// Dump prometheus counters to stderr on exit
    #[arg(long)]
    print_metrics: bool,
}

/// Layers command line flags over the file configuration.
fn build_config(mode: Mode, args: &RunArgs, file_cfg: FileConfig) -> ToolConfig {
    let brokers = args.brokers.clone().or(file_cfg.brokers).unwrap_or_default();
    let mut cfg = ToolConfig::new(
        mode,
        args.job.clone().or(file_cfg.job).unwrap_or_default(),
        args.file.clone().or(file_cfg.file).unwrap_or_default(),
    );
    cfg.brokers = parse_stream_list(&brokers);
    cfg.filter = file_cfg.filter;
    if let Some(only) = &args.only {
        cfg.filter.include = parse_stream_list(only).into_iter().collect();
    }
    if let Some(except) = &args.except {
        cfg.filter.exclude = parse_stream_list(except).into_iter().collect();
    }
    cfg.commit = args.commit;
    cfg.topic_prefix = file_cfg.topic_prefix.unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string());
    cfg.kafka = file_cfg.kafka;
    cfg
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (mode, args) = cli.command.into_parts();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into());
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let file_cfg = match &args.config {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading config {}", path.display()))?;
            FileConfig::from_toml_str(&text)?
        }
        None => FileConfig::default(),
    };
    let cfg = build_config(mode, &args, file_cfg);
    cfg.validate()?;
    tracing::info!("kafka brokers: {}", cfg.brokers.join(", "));

    let client = KafkaClientConfig::from_tool_config(&cfg)?;
    let mut log = KafkaCheckpointLog::connect(&client)?;
    let publisher = KafkaCheckpointPublisher::connect(&client)?;

    let outcome = run::execute(&cfg, &mut log, &publisher, &mut std::io::stdout()).await;
    if args.print_metrics {
        eprint!("{}", chkpt_core::metrics::render_prometheus());
    }
    let outcome = outcome.with_context(|| format!("{} of {} failed", mode, cfg.checkpoint_topic()))?;
    tracing::info!(
        tasks = outcome.tasks,
        checkpoints = outcome.checkpoints,
        persisted = outcome.persisted,
        skipped = outcome.skipped,
        "{} finished",
        outcome.mode
    );
    Ok(())
}
