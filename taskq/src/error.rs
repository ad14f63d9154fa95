//! Error types for broker operations.
//!
//! Every variant is fatal for the invocation that hit it: nothing in this
//! crate retries or reconnects.

use thiserror::Error;

/// Failure of a single broker operation.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("invalid broker URI: {0}")]
    InvalidUri(String),

    #[error("queue name must not be empty")]
    EmptyQueueName,

    #[error("failed to connect to RabbitMQ")]
    Connect(#[source] lapin::Error),

    #[error("failed to open channel")]
    Channel(#[source] lapin::Error),

    #[error("failed to declare queue {queue}")]
    Declare {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    #[error("failed to set prefetch count")]
    Qos(#[source] lapin::Error),

    #[error("failed to start consumer on {queue}")]
    Consume {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    #[error("failed to publish to {queue}")]
    Publish {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    #[error("failed to enable publisher confirms")]
    ConfirmSelect(#[source] lapin::Error),

    #[error("broker rejected message published to {queue}")]
    PublishNacked { queue: String },

    #[error("message published to {queue} was returned as unroutable")]
    PublishReturned { queue: String },

    #[error("publish to {queue} was not confirmed by the broker")]
    PublishUnconfirmed { queue: String },

    #[error("delivery stream failed")]
    Delivery(#[source] lapin::Error),

    #[error("consumer was cancelled by the broker")]
    ConsumerCancelled,

    #[error("failed to acknowledge delivery {delivery_tag}")]
    Ack {
        delivery_tag: u64,
        #[source]
        source: lapin::Error,
    },
}

pub type Result<T> = std::result::Result<T, TaskError>;
