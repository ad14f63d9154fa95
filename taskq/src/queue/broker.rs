//! Explicitly scoped broker connection.
//!
//! A [`BrokerSession`] owns one AMQP connection and one channel. It is opened
//! with [`BrokerSession::connect`] and released with [`BrokerSession::close`];
//! nothing here lives in global state, so several sessions can coexist in one
//! process.

use lapin::{
    options::{BasicQosOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel, Connection, ConnectionProperties, Queue,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Result, TaskError};

/// An open connection plus the channel all operations go through.
pub struct BrokerSession {
    connection: Connection,
    channel: Channel,
}

impl BrokerSession {
    /// Connect to the broker described by `config` and open a channel.
    pub async fn connect(config: &Config) -> Result<Self> {
        let uri = config.amqp_uri()?;

        info!(
            host = %config.host,
            port = config.port,
            vhost = %config.vhost,
            "rabbitmq_connecting"
        );

        let connection = Connection::connect(&uri, ConnectionProperties::default())
            .await
            .map_err(TaskError::Connect)?;

        info!("rabbitmq_connected");

        let channel = connection
            .create_channel()
            .await
            .map_err(TaskError::Channel)?;

        info!(channel_id = channel.id(), "rabbitmq_channel_created");

        Ok(Self {
            connection,
            channel,
        })
    }

    /// The channel this session publishes and consumes on.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Declare a durable queue.
    ///
    /// Idempotent: declaring an existing queue with the same parameters is a
    /// no-op on the broker and returns the existing queue.
    pub async fn declare_queue(&self, queue: &str) -> Result<Queue> {
        if queue.is_empty() {
            return Err(TaskError::EmptyQueueName);
        }

        let declared = self
            .channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|source| TaskError::Declare {
                queue: queue.to_string(),
                source,
            })?;

        info!(
            queue = queue,
            message_count = declared.message_count(),
            consumer_count = declared.consumer_count(),
            "rabbitmq_queue_declared"
        );

        Ok(declared)
    }

    /// Limit the number of unacknowledged deliveries on this channel.
    pub async fn set_prefetch(&self, prefetch_count: u16) -> Result<()> {
        self.channel
            .basic_qos(prefetch_count, BasicQosOptions::default())
            .await
            .map_err(TaskError::Qos)?;

        info!(prefetch_count = prefetch_count, "rabbitmq_qos_set");
        Ok(())
    }

    /// Close the channel and then the connection.
    ///
    /// Deliveries still unacknowledged on the channel are returned to their
    /// queue by the broker.
    pub async fn close(self) {
        if let Err(e) = self.channel.close(200, "Normal shutdown").await {
            warn!(error = %e, "rabbitmq_channel_close_error");
        }

        if let Err(e) = self.connection.close(200, "Normal shutdown").await {
            warn!(error = %e, "rabbitmq_connection_close_error");
        }

        info!("rabbitmq_session_closed");
    }
}
