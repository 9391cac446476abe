//! Sliding-window executor for independently failing tasks.

use std::future::Future;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::stop::StopFlag;

/// Why a task produced no value.
#[derive(Debug, Error)]
pub enum TaskError<E> {
    /// The task ran and returned an error.
    #[error("{0}")]
    Failed(E),

    /// The task panicked or was aborted.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// A stop was requested before the task started.
    #[error("task not started: stop requested")]
    Cancelled,
}

/// Runs tasks with at most `max_parallel` in flight.
///
/// Tasks start in FIFO order; a failed task never aborts the batch.
#[derive(Debug, Clone)]
pub struct BoundedTaskRunner {
    max_parallel: usize,
    stop: Option<StopFlag>,
}

impl BoundedTaskRunner {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            stop: None,
        }
    }

    /// Stops starting queued tasks once `stop` is set.
    pub fn with_stop(mut self, stop: StopFlag) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    fn should_stop(&self) -> bool {
        self.stop.as_ref().is_some_and(StopFlag::is_stopped)
    }

    /// Runs every task to completion.
    ///
    /// Results are returned in submission order.
    pub async fn run<T, E, F, Fut>(&self, tasks: Vec<F>) -> Vec<Result<T, TaskError<E>>>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let total = tasks.len();
        let mut results: Vec<Option<Result<T, TaskError<E>>>> = (0..total).map(|_| None).collect();
        let mut started = vec![false; total];
        let mut queue = tasks.into_iter().enumerate();
        let mut running: JoinSet<(usize, Result<T, E>)> = JoinSet::new();
        let mut exhausted = false;

        loop {
            while !exhausted && running.len() < self.max_parallel {
                if self.should_stop() {
                    exhausted = true;
                    break;
                }
                match queue.next() {
                    Some((index, task)) => {
                        started[index] = true;
                        let fut = task();
                        running.spawn(async move { (index, fut.await) });
                    }
                    None => exhausted = true,
                }
            }

            match running.join_next().await {
                Some(Ok((index, result))) => {
                    results[index] = Some(result.map_err(TaskError::Failed));
                }
                Some(Err(e)) => {
                    // The slot is resolved as panicked below
                    warn!(error = %e, "Task panicked");
                }
                None => break,
            }
        }

        let results: Vec<_> = results
            .into_iter()
            .zip(started)
            .map(|(slot, was_started)| match slot {
                Some(result) => result,
                None if was_started => Err(TaskError::Panicked("task did not complete".to_string())),
                None => Err(TaskError::Cancelled),
            })
            .collect();

        debug!(
            total,
            cancelled = results
                .iter()
                .filter(|r| matches!(r, Err(TaskError::Cancelled)))
                .count(),
            "Task batch finished"
        );
        results
    }
}

impl<E> TaskError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_all_tasks_complete_in_order() {
        let runner = BoundedTaskRunner::new(3);
        let tasks: Vec<_> = (0..10u32)
            .map(|i| {
                move || async move {
                    tokio::time::sleep(Duration::from_millis(u64::from(10 - i))).await;
                    Ok::<u32, String>(i * 2)
                }
            })
            .collect();

        let results = runner.run(tasks).await;
        let values: Vec<u32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, (0..10).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_never_exceeds_bound() {
        let runner = BoundedTaskRunner::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                move || async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), String>(())
                }
            })
            .collect();

        let results = runner.run(tasks).await;
        assert_eq!(results.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let runner = BoundedTaskRunner::new(2);
        let tasks: Vec<_> = (0..5)
            .map(|i| {
                move || async move {
                    if i % 2 == 0 {
                        Err(format!("task {} failed", i))
                    } else {
                        Ok(i)
                    }
                }
            })
            .collect();

        let results = runner.run(tasks).await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
        match &results[0] {
            Err(TaskError::Failed(msg)) => assert_eq!(msg, "task 0 failed"),
            other => panic!("unexpected result, ok = {}", other.is_ok()),
        }
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let runner = BoundedTaskRunner::new(1);
        let tasks: Vec<Box<dyn FnOnce() -> futures::future::BoxFuture<'static, Result<u8, String>>>> = vec![
            Box::new(|| Box::pin(async { panic!("boom") })),
            Box::new(|| Box::pin(async { Ok(7) })),
        ];

        let results = runner.run(tasks).await;
        assert!(matches!(results[0], Err(TaskError::Panicked(_))));
        assert_eq!(results[1].as_ref().ok(), Some(&7));
    }

    #[tokio::test]
    async fn test_stop_prevents_new_starts() {
        let stop = StopFlag::new();
        let runner = BoundedTaskRunner::new(1).with_stop(stop.clone());
        let started = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let stop = stop.clone();
                let started = Arc::clone(&started);
                move || async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    stop.stop();
                    Ok::<(), String>(())
                }
            })
            .collect();

        let results = runner.run(tasks).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(results[0].is_ok());
        assert!(results[1..]
            .iter()
            .all(|r| matches!(r, Err(e) if e.is_cancelled())));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let runner = BoundedTaskRunner::new(4);
        let tasks: Vec<fn() -> futures::future::Ready<Result<(), String>>> = Vec::new();
        assert!(runner.run(tasks).await.is_empty());
    }
}
