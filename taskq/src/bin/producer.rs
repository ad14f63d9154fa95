//! taskq Producer - publishes a single task and exits.
//!
//! The message body is the command-line arguments joined by spaces, or
//! `Hello RabbitMQ!` when none are given. SIGINT/SIGTERM before the publish
//! completes exits cleanly without sending.

use anyhow::{Context, Result};
use tracing::info;

use taskq::{
    message_from_args, publish_once, util::logging, util::signal::shutdown_signal, Config,
    PublishOutcome, TASK_QUEUE,
};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = Config::from_env();
    let message = message_from_args(std::env::args().skip(1));

    info!(host = %config.host, port = config.port, "producer_starting");

    let outcome = publish_once(&config, TASK_QUEUE, message.as_bytes(), shutdown_signal())
        .await
        .context("Failed to publish task")?;

    match outcome {
        PublishOutcome::Sent => info!(queue = TASK_QUEUE, message = %message, "producer_sent"),
        PublishOutcome::Interrupted => info!("producer_stopped"),
    }

    Ok(())
}
