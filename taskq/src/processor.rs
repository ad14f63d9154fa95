//! Task processing module - simulated work.
//!
//! A task's work is proportional to the number of `.` bytes in its body:
//! one work unit per dot.

use std::time::Duration;

use tokio::time::sleep;
use tracing::info;

use crate::queue::Task;

/// Byte that costs one unit of simulated work.
pub const WORK_MARKER: u8 = b'.';

/// Number of work units in a message body.
pub fn work_units(body: &[u8]) -> usize {
    body.iter().filter(|&&b| b == WORK_MARKER).count()
}

/// Total simulated work for a message body, given the length of one unit.
pub fn work_duration(body: &[u8], unit: Duration) -> Duration {
    let units = u32::try_from(work_units(body)).unwrap_or(u32::MAX);
    unit.saturating_mul(units)
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Process a single task by sleeping for its work duration.
///
/// Returns the duration slept. The caller acknowledges the delivery only
/// after this future completes.
pub async fn process_task(task: &Task, unit: Duration) -> Duration {
    let duration = work_duration(&task.body, unit);

    info!(
        delivery_tag = task.delivery_tag,
        redelivered = task.redelivered,
        body_length = task.body.len(),
        message = %task.text(),
        "task_received"
    );

    if !duration.is_zero() {
        info!(
            delivery_tag = task.delivery_tag,
            work_units = work_units(&task.body),
            work_ms = duration_millis(duration),
            "task_processing"
        );
        sleep(duration).await;
    }

    info!(delivery_tag = task.delivery_tag, "task_done");

    duration
}
