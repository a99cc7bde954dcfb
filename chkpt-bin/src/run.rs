use std::io::Write;

use chkpt_core::config::{Mode, ToolConfig};
use chkpt_core::{drain_topic, publish_snapshot, validate_topic, CheckpointLog, CheckpointPublisher, Result, Snapshot};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub mode: Mode,
    /// Tasks in the resulting snapshot.
    pub tasks: usize,
    /// Stream-partition checkpoints across those tasks.
    pub checkpoints: usize,
    pub persisted: bool,
    /// Undecodable records skipped while draining the topic.
    pub skipped: u64,
}

/// Runs one extract, replace or patch. Without `commit` the result is
/// printed to `out` in file format and nothing is persisted.
pub async fn execute<L, P, W>(cfg: &ToolConfig, log: &mut L, publisher: &P, out: &mut W) -> Result<Outcome>
where
    L: CheckpointLog + ?Sized,
    P: CheckpointPublisher + ?Sized,
    W: Write + ?Sized,
{
    let topic = cfg.checkpoint_topic();
    let file = cfg.file.display();
    if cfg.commit {
        warn!("this run will result in persistent changes");
    } else {
        warn!("this is a test run, no changes will be committed to file/topic");
    }

    let mut skipped = 0;
    let result = match cfg.mode {
        Mode::Extract => {
            let report = drain_topic(log, &topic).await?;
            skipped = report.skipped;
            let filtered = report.snapshot.filter(&cfg.filter);
            if cfg.commit {
                chkpt_io::write_snapshot_file(&cfg.file, &filtered).await?;
                info!("successfully extracted {} to {}", topic, file);
            }
            filtered
        }
        Mode::Replace => {
            // the other modes validate inside drain_topic
            validate_topic(&*log, &topic).await?;
            let filtered = chkpt_io::read_snapshot_file(&cfg.file).await?.filter(&cfg.filter);
            if cfg.commit {
                publish_snapshot(publisher, &topic, &filtered).await?;
                info!("successfully replaced {} with {}", topic, file);
            }
            filtered
        }
        Mode::Patch => {
            let report = drain_topic(log, &topic).await?;
            skipped = report.skipped;
            let patch = chkpt_io::read_snapshot_file(&cfg.file).await?.filter(&cfg.filter);
            let patched = report.snapshot.merge(&patch);
            if cfg.commit {
                publish_snapshot(publisher, &topic, &patched).await?;
                info!("successfully patched {} with {}", topic, file);
            }
            patched
        }
    };

    if !cfg.commit {
        print_snapshot(&result, out)?;
    }
    Ok(Outcome {
        mode: cfg.mode,
        tasks: result.len(),
        checkpoints: result.checkpoint_count(),
        persisted: cfg.commit,
        skipped,
    })
}

fn print_snapshot<W: Write + ?Sized>(snapshot: &Snapshot, out: &mut W) -> Result<()> {
    out.write_all(chkpt_io::encode_snapshot(snapshot)?.as_bytes())?;
    out.flush()?;
    Ok(())
}
