//! Work queue constants and the task type handed to handlers.

use std::borrow::Cow;

/// Name of the durable work queue shared by producer and worker.
pub const TASK_QUEUE: &str = "task_queue";

/// Message body published when the producer is given no arguments.
pub const DEFAULT_MESSAGE: &str = "Hello RabbitMQ!";

/// Unacknowledged deliveries a worker may hold at once (fair dispatch).
pub const PREFETCH_COUNT: u16 = 1;

/// AMQP delivery mode asking the broker to write the message to disk.
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Build a message body from command-line words.
///
/// Words are joined with single spaces; an empty result falls back to
/// [`DEFAULT_MESSAGE`].
pub fn message_from_args<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let message = args
        .into_iter()
        .map(|w| w.as_ref().to_string())
        .collect::<Vec<String>>()
        .join(" ");

    if message.is_empty() {
        DEFAULT_MESSAGE.to_string()
    } else {
        message
    }
}

/// A single delivery as seen by a handler.
///
/// The handler gets the body and delivery metadata only; acknowledging is
/// the consume loop's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Broker-assigned tag identifying this delivery on its channel
    pub delivery_tag: u64,
    /// Whether the broker has delivered this message before
    pub redelivered: bool,
    /// Raw message body
    pub body: Vec<u8>,
}

impl Task {
    pub fn new(delivery_tag: u64, redelivered: bool, body: Vec<u8>) -> Self {
        Self {
            delivery_tag,
            redelivered,
            body,
        }
    }

    /// Body decoded as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

impl From<&lapin::message::Delivery> for Task {
    fn from(delivery: &lapin::message::Delivery) -> Self {
        Task::new(
            delivery.delivery_tag,
            delivery.redelivered,
            delivery.data.clone(),
        )
    }
}
