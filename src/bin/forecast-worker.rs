//! Runs one model job read from stdin and writes the reply to stdout.

use std::io::{Read, Write};

use anyhow::{Context, Result};

use hybrid_forecast::config::LogFormat;
use hybrid_forecast::logging::{self, LogTarget};
use hybrid_forecast::runtime::protocol::{run_job, WorkerJob, WorkerReply};

fn main() -> Result<()> {
    logging::init("info", LogFormat::Json, LogTarget::Stderr);

    let mut input = Vec::new();
    std::io::stdin()
        .read_to_end(&mut input)
        .context("failed to read job from stdin")?;
    let job: WorkerJob = serde_json::from_slice(&input).context("failed to decode job")?;

    let started = std::time::Instant::now();
    let reply = run_job(&job);
    let failed = matches!(reply, WorkerReply::Failed { .. });
    tracing::info!(
        failed,
        seconds = started.elapsed().as_secs_f64(),
        "Worker job finished"
    );

    let out = serde_json::to_vec(&reply).context("failed to encode reply")?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&out).context("failed to write reply")?;
    stdout.flush().context("failed to flush reply")?;

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
