//! RabbitMQ consumer module using lapin.
//!
//! This module consumes the work queue one delivery at a time: with a
//! prefetch count of one, the broker hands this consumer a new delivery only
//! after the previous one has been acknowledged. A delivery is acknowledged
//! strictly after its handler has completed. On shutdown the in-flight
//! delivery, if any, is left unacknowledged and the broker requeues it when
//! the session closes.

use std::future::Future;

use futures::{Stream, StreamExt};
use lapin::{
    options::{BasicAckOptions, BasicConsumeOptions},
    types::FieldTable,
};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Result, TaskError};
use crate::processor::process_task;
use crate::queue::{BrokerSession, Task, PREFETCH_COUNT, TASK_QUEUE};
use crate::util::signal::shutdown_signal;

/// Consumer tag announced to the broker.
pub const CONSUMER_TAG: &str = "taskq-worker";

/// What happened to a delivery handed to [`handle_delivery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler finished and the delivery was acknowledged.
    Acked,
    /// Shutdown fired first; the delivery was not acknowledged.
    Interrupted,
}

/// Drive `work` to completion, then acknowledge via `ack`.
///
/// If `shutdown` resolves before `work` does, `work` is dropped and `ack` is
/// never called.
pub async fn handle_delivery<W, A, AFut, S>(work: W, ack: A, shutdown: &mut S) -> Result<Outcome>
where
    W: Future<Output = ()>,
    A: FnOnce() -> AFut,
    AFut: Future<Output = Result<()>>,
    S: Future<Output = ()> + Unpin,
{
    tokio::select! {
        biased;
        _ = shutdown => return Ok(Outcome::Interrupted),
        _ = work => {}
    }

    ack().await?;
    Ok(Outcome::Acked)
}

/// Consume `queue` until `shutdown` resolves.
///
/// Declares the queue, sets the prefetch count to one and registers a
/// manual-ack consumer, then hands the delivery stream to
/// [`process_deliveries`].
///
/// Returns the number of deliveries acknowledged. A failed delivery stream
/// or a broker-side cancellation is an error.
pub async fn consume<H, Fut, S>(
    session: &BrokerSession,
    queue: &str,
    handler: H,
    shutdown: S,
) -> Result<u64>
where
    H: FnMut(Task) -> Fut,
    Fut: Future<Output = ()>,
    S: Future<Output = ()>,
{
    session.declare_queue(queue).await?;
    session.set_prefetch(PREFETCH_COUNT).await?;

    let channel = session.channel();
    let consumer = channel
        .basic_consume(
            queue,
            CONSUMER_TAG,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|source| TaskError::Consume {
            queue: queue.to_string(),
            source,
        })?;

    info!(queue = queue, "rabbitmq_consumer_started");
    info!("worker_waiting_for_messages");

    let deliveries = consumer.map(|next| next.map(|delivery| Task::from(&delivery)));

    let ack = move |delivery_tag: u64| async move {
        channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|source| TaskError::Ack {
                delivery_tag,
                source,
            })
    };

    process_deliveries(deliveries, handler, ack, shutdown).await
}

/// Run each task from `deliveries` through `handler`, acknowledging it with
/// `ack` once the handler completes.
///
/// Stops cleanly with the acknowledged count when `shutdown` resolves. An
/// error item on the stream, a failed ack, or the stream ending while no
/// shutdown was requested all return an error.
pub async fn process_deliveries<D, H, Fut, A, AFut, S>(
    deliveries: D,
    mut handler: H,
    mut ack: A,
    shutdown: S,
) -> Result<u64>
where
    D: Stream<Item = std::result::Result<Task, lapin::Error>>,
    H: FnMut(Task) -> Fut,
    Fut: Future<Output = ()>,
    A: FnMut(u64) -> AFut,
    AFut: Future<Output = Result<()>>,
    S: Future<Output = ()>,
{
    tokio::pin!(deliveries);
    tokio::pin!(shutdown);

    let mut acked = 0u64;

    loop {
        let next = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("worker_stopping");
                return Ok(acked);
            }
            next = deliveries.next() => next,
        };

        let task = match next {
            Some(Ok(task)) => task,
            Some(Err(e)) => {
                error!(error = %e, "rabbitmq_delivery_error");
                return Err(TaskError::Delivery(e));
            }
            None => {
                error!("rabbitmq_consumer_cancelled");
                return Err(TaskError::ConsumerCancelled);
            }
        };

        let delivery_tag = task.delivery_tag;

        match handle_delivery(handler(task), || ack(delivery_tag), &mut shutdown).await {
            Ok(Outcome::Acked) => {
                acked += 1;
                info!(delivery_tag = delivery_tag, "task_acked");
            }
            Ok(Outcome::Interrupted) => {
                warn!(delivery_tag = delivery_tag, "worker_interrupted_before_ack");
                return Ok(acked);
            }
            Err(e) => {
                error!(delivery_tag = delivery_tag, error = %e, "rabbitmq_ack_failed");
                return Err(e);
            }
        }
    }
}

/// Run the worker against the task queue until SIGINT or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let session = BrokerSession::connect(&config).await?;
    let unit = config.work_unit;

    let result = consume(
        &session,
        TASK_QUEUE,
        move |task| async move {
            process_task(&task, unit).await;
        },
        shutdown_signal(),
    )
    .await;

    session.close().await;

    let acked = result?;
    info!(acked = acked, "worker_shutdown_complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io;
    use std::sync::Arc;
    use std::time::Duration;

    use futures::stream;
    use tokio::time::{sleep, Instant};

    fn connection_reset() -> lapin::Error {
        lapin::Error::IOError(Arc::new(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_happens_after_work_completes() {
        let log = RefCell::new(Vec::new());
        let events = &log;
        let start = Instant::now();

        let outcome = handle_delivery(
            async {
                sleep(Duration::from_secs(3)).await;
                events.borrow_mut().push("work_done");
            },
            move || async move {
                events.borrow_mut().push("acked");
                assert!(start.elapsed() >= Duration::from_secs(3));
                Ok::<(), TaskError>(())
            },
            &mut std::future::pending::<()>(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, Outcome::Acked);
        assert_eq!(*log.borrow(), vec!["work_done", "acked"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_work_skips_ack() {
        let acked_cell = RefCell::new(false);
        let acked = &acked_cell;
        let mut shutdown = Box::pin(sleep(Duration::from_secs(1)));

        let outcome = handle_delivery(
            sleep(Duration::from_secs(3)),
            move || async move {
                *acked.borrow_mut() = true;
                Ok::<(), TaskError>(())
            },
            &mut shutdown,
        )
        .await
        .unwrap();

        assert_eq!(outcome, Outcome::Interrupted);
        assert!(!*acked_cell.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_work_without_dots_is_acked_immediately() {
        let task = Task::new(5, false, b"Hello RabbitMQ!".to_vec());
        let start = Instant::now();

        let outcome = handle_delivery(
            async {
                process_task(&task, Duration::from_secs(1)).await;
            },
            || async { Ok::<(), TaskError>(()) },
            &mut std::future::pending::<()>(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, Outcome::Acked);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_ack_failure_is_propagated() {
        let result = handle_delivery(
            async {},
            || async { Err::<(), TaskError>(TaskError::EmptyQueueName) },
            &mut std::future::pending::<()>(),
        )
        .await;

        assert!(matches!(result, Err(TaskError::EmptyQueueName)));
    }

    #[tokio::test]
    async fn test_delivery_stream_error_is_fatal() {
        let deliveries = stream::iter(vec![Err::<Task, lapin::Error>(connection_reset())]);

        let result = process_deliveries(
            deliveries,
            |_task| async {},
            |_tag| async { Ok::<(), TaskError>(()) },
            std::future::pending::<()>(),
        )
        .await;

        assert!(matches!(result, Err(TaskError::Delivery(_))));
    }

    #[tokio::test]
    async fn test_connection_loss_after_error_and_cancel_is_fatal() {
        // A dropped connection shows up as an error item followed by the end
        // of the stream.
        let deliveries = stream::iter(vec![
            Ok(Task::new(1, false, b"first".to_vec())),
            Err(connection_reset()),
        ]);
        let acked_tags = RefCell::new(Vec::new());
        let acked_tags_ref = &acked_tags;

        let result = process_deliveries(
            deliveries,
            |_task| async {},
            move |tag| async move {
                acked_tags_ref.borrow_mut().push(tag);
                Ok::<(), TaskError>(())
            },
            std::future::pending::<()>(),
        )
        .await;

        assert!(matches!(result, Err(TaskError::Delivery(_))));
        assert_eq!(*acked_tags.borrow(), vec![1]);
    }

    #[tokio::test]
    async fn test_stream_end_without_shutdown_is_cancellation() {
        let deliveries = stream::iter(Vec::<std::result::Result<Task, lapin::Error>>::new());

        let result = process_deliveries(
            deliveries,
            |_task| async {},
            |_tag| async { Ok::<(), TaskError>(()) },
            std::future::pending::<()>(),
        )
        .await;

        assert!(matches!(result, Err(TaskError::ConsumerCancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_are_acked_in_order_until_shutdown() {
        let deliveries = stream::iter(vec![
            Ok(Task::new(1, false, b"one.".to_vec())),
            Ok(Task::new(2, false, b"two..".to_vec())),
        ])
        .chain(stream::pending());
        let log = RefCell::new(Vec::new());
        let events = &log;

        let result = process_deliveries(
            deliveries,
            move |task| async move {
                events.borrow_mut().push(format!("start {}", task.delivery_tag));
                process_task(&task, Duration::from_secs(1)).await;
                events.borrow_mut().push(format!("done {}", task.delivery_tag));
            },
            move |tag| async move {
                events.borrow_mut().push(format!("ack {}", tag));
                Ok::<(), TaskError>(())
            },
            sleep(Duration::from_secs(10)),
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(
            *log.borrow(),
            vec!["start 1", "done 1", "ack 1", "start 2", "done 2", "ack 2"]
        );
    }

    #[tokio::test]
    async fn test_shutdown_before_delivery_stops_cleanly() {
        let deliveries = stream::iter(vec![Ok(Task::new(1, false, b"unseen".to_vec()))]);

        let result = process_deliveries(
            deliveries,
            |_task| async {},
            |_tag| async { Ok::<(), TaskError>(()) },
            std::future::ready(()),
        )
        .await;

        assert_eq!(result.unwrap(), 0);
    }
}
