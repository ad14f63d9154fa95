//! One-shot RabbitMQ publisher for enqueueing tasks.
//!
//! The publisher owns a [`BrokerSession`] for its whole life: connect,
//! publish, close. It does not reconnect. The channel runs in confirm mode,
//! so every publish waits for the broker to ack or nack the message.

use std::future::Future;

use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions},
    publisher_confirm::Confirmation,
    BasicProperties,
};
use tracing::{info, warn};

use super::broker::BrokerSession;
use super::types::PERSISTENT_DELIVERY_MODE;
use crate::config::Config;
use crate::error::{Result, TaskError};

/// Publishes persistent messages through the default exchange.
pub struct Publisher {
    session: BrokerSession,
}

/// How a [`publish_once`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The broker confirmed the message.
    Sent,
    /// Shutdown fired before the publish completed.
    Interrupted,
}

impl Publisher {
    /// Connect to the broker and put the channel in confirm mode.
    pub async fn connect(config: &Config) -> Result<Self> {
        let session = BrokerSession::connect(config).await?;

        session
            .channel()
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(TaskError::ConfirmSelect)?;

        info!("rabbitmq_confirms_enabled");

        Ok(Self { session })
    }

    /// Publish `body` to `queue`, marked persistent.
    ///
    /// The queue is declared durable first (idempotent), then the message is
    /// published as mandatory. Returns once the broker has confirmed it; a
    /// nack or an unroutable return is an error.
    pub async fn publish(&self, queue: &str, body: &[u8]) -> Result<()> {
        self.session.declare_queue(queue).await?;

        let publish_error = |source: lapin::Error| TaskError::Publish {
            queue: queue.to_string(),
            source,
        };

        let confirmation = self
            .session
            .channel()
            .basic_publish(
                "",
                queue,
                BasicPublishOptions {
                    mandatory: true,
                    ..Default::default()
                },
                body,
                BasicProperties::default()
                    .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
                    .with_content_type("text/plain".into()),
            )
            .await
            .map_err(publish_error)?
            .await
            .map_err(publish_error)?;

        check_confirmation(queue, &confirmation)?;

        info!(
            queue = queue,
            body_length = body.len(),
            message = %String::from_utf8_lossy(body),
            "rabbitmq_task_published"
        );

        Ok(())
    }

    /// Close the underlying session.
    pub async fn close(self) {
        self.session.close().await;
        info!("rabbitmq_publisher_closed");
    }
}

/// Map a publisher confirmation to success or a publish error.
fn check_confirmation(queue: &str, confirmation: &Confirmation) -> Result<()> {
    match confirmation {
        Confirmation::Ack(None) => Ok(()),
        Confirmation::Ack(Some(_)) => Err(TaskError::PublishReturned {
            queue: queue.to_string(),
        }),
        Confirmation::Nack(_) => Err(TaskError::PublishNacked {
            queue: queue.to_string(),
        }),
        Confirmation::NotRequested => Err(TaskError::PublishUnconfirmed {
            queue: queue.to_string(),
        }),
    }
}

/// Connect, publish `body` to `queue` and close, unless `shutdown` resolves
/// first.
pub async fn publish_once<S>(
    config: &Config,
    queue: &str,
    body: &[u8],
    shutdown: S,
) -> Result<PublishOutcome>
where
    S: Future<Output = ()>,
{
    let send = async {
        let publisher = Publisher::connect(config).await?;
        let published = publisher.publish(queue, body).await;

        // Close even when the publish failed.
        publisher.close().await;

        published
    };

    tokio::select! {
        biased;
        _ = shutdown => {
            warn!(queue = queue, "producer_interrupted");
            Ok(PublishOutcome::Interrupted)
        }
        result = send => result.map(|()| PublishOutcome::Sent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_confirmation_is_success() {
        assert!(check_confirmation("task_queue", &Confirmation::Ack(None)).is_ok());
    }

    #[test]
    fn test_nack_confirmation_is_error() {
        let result = check_confirmation("task_queue", &Confirmation::Nack(None));
        assert!(matches!(
            result,
            Err(TaskError::PublishNacked { ref queue }) if queue == "task_queue"
        ));
    }

    #[test]
    fn test_missing_confirmation_is_error() {
        let result = check_confirmation("task_queue", &Confirmation::NotRequested);
        assert!(matches!(result, Err(TaskError::PublishUnconfirmed { .. })));
    }

    #[tokio::test]
    async fn test_interrupt_before_connect_is_clean() {
        // Nothing listens on port 1; the interrupt wins before connecting.
        let config = Config {
            port: 1,
            ..Config::default()
        };

        let outcome = publish_once(&config, "task_queue", b"never sent", std::future::ready(()))
            .await
            .unwrap();

        assert_eq!(outcome, PublishOutcome::Interrupted);
    }
}
