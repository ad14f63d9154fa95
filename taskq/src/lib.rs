//! taskq - durable RabbitMQ work queue.
//!
//! This library provides shared modules for the two taskq binaries:
//! - `taskq-producer`: publishes one persistent message and exits
//! - `taskq-worker`: consumes messages one at a time, simulating work
//!
//! ## Architecture
//!
//! ```text
//! Producer → task_queue (durable) → Worker (prefetch 1, ack after work)
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod processor;
pub mod queue;
pub mod util;

// Re-export commonly used types
pub use config::Config;
pub use consumer::{consume, process_deliveries, Outcome};
pub use error::TaskError;
pub use processor::{process_task, work_duration, work_units};
pub use queue::{
    message_from_args, publish_once, BrokerSession, PublishOutcome, Publisher, Task,
    DEFAULT_MESSAGE, TASK_QUEUE,
};
