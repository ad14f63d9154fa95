//! taskq Worker - RabbitMQ consumer for the durable task queue.
//!
//! Pulls one message at a time from `task_queue`, sleeps one work unit per
//! `.` in the body, then acknowledges. Runs until SIGINT/SIGTERM.

use anyhow::{Context, Result};

use taskq::{consumer, processor::duration_millis, util::logging, Config};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    tracing::info!("worker_starting");

    // Load configuration from environment
    let config = Config::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        vhost = %config.vhost,
        work_unit_ms = duration_millis(config.work_unit),
        "config_loaded"
    );

    consumer::run(config).await.context("worker failed")?;

    Ok(())
}
