//! Queue module for RabbitMQ operations.
//!
//! This module provides:
//! - The scoped broker session shared by both roles
//! - The one-shot publisher used by the producer
//! - Queue constants and the task type handed to handlers
//!
//! ## Architecture
//!
//! ```text
//! Producer → task_queue (durable) → Worker (prefetch 1, manual ack)
//! ```

pub mod broker;
pub mod publisher;
pub mod types;

pub use broker::BrokerSession;
pub use publisher::{publish_once, PublishOutcome, Publisher};
pub use types::{
    message_from_args, Task, DEFAULT_MESSAGE, PERSISTENT_DELIVERY_MODE, PREFETCH_COUNT,
    TASK_QUEUE,
};
