//! Process-level utilities shared by the worker and the producer.

pub mod logging;
pub mod signal;
