//! Order-preserving concurrent fan-out with per-task deadlines
//!
//! Each [`FanOutTask`] runs as its own tokio task and owns exactly one output
//! slot, fixed by its position in the input. A task that fails, panics or
//! misses its deadline resolves to the fallback value supplied with it; the
//! failure is logged and never propagated.

use futures::future::join_all;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

type TaskFuture<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'static>>;

/// One unit of work plus the value standing in for it on failure
pub struct FanOutTask<T> {
    label: String,
    fallback: T,
    work: TaskFuture<T>,
}

impl<T> FanOutTask<T> {
    pub fn new<F>(label: impl Into<String>, fallback: T, work: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            label: label.into(),
            fallback,
            work: Box::pin(work),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T: Default> FanOutTask<T> {
    /// Task whose fallback is the empty/default value
    pub fn or_default<F>(label: impl Into<String>, work: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::new(label, T::default(), work)
    }
}

/// Absolute point in time bounding a request or part of one
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(duration: Duration) -> Self {
        Self {
            at: Instant::now() + duration,
        }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Deadline `limit` from now, never later than `self`
    pub fn child(&self, limit: Duration) -> Self {
        Self {
            at: self.at.min(Instant::now() + limit),
        }
    }
}

/// Run every task concurrently and return their results in input order
///
/// With `per_task_timeout`, each task races its work against that timeout
/// and resolves to its fallback when the timeout wins.
pub async fn run<T>(tasks: Vec<FanOutTask<T>>, per_task_timeout: Option<Duration>) -> Vec<T>
where
    T: Send + 'static,
{
    run_tasks(tasks, per_task_timeout, None).await
}

/// Like [`run`], additionally bounded by a parent deadline that every
/// per-task deadline inherits
pub async fn run_within<T>(
    tasks: Vec<FanOutTask<T>>,
    per_task_timeout: Option<Duration>,
    deadline: Deadline,
) -> Vec<T>
where
    T: Send + 'static,
{
    run_tasks(tasks, per_task_timeout, Some(deadline)).await
}

/// Aborts still-running sub-tasks when the fan-out itself is dropped
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

async fn run_tasks<T>(
    tasks: Vec<FanOutTask<T>>,
    per_task_timeout: Option<Duration>,
    parent: Option<Deadline>,
) -> Vec<T>
where
    T: Send + 'static,
{
    let mut slots = Vec::with_capacity(tasks.len());
    let mut handles = Vec::with_capacity(tasks.len());

    for task in tasks {
        let deadline = match (parent, per_task_timeout) {
            (Some(parent), Some(limit)) => Some(parent.child(limit)),
            (Some(parent), None) => Some(parent),
            (None, Some(limit)) => Some(Deadline::after(limit)),
            (None, None) => None,
        };

        let work = task.work;
        handles.push(tokio::spawn(async move {
            match deadline {
                Some(deadline) => timeout_at(deadline.at(), work).await.ok(),
                None => Some(work.await),
            }
        }));
        slots.push((task.label, task.fallback));
    }

    let _guard = AbortOnDrop(handles.iter().map(|h| h.abort_handle()).collect());
    let outcomes = join_all(handles).await;

    slots
        .into_iter()
        .zip(outcomes)
        .map(|((label, fallback), outcome)| match outcome {
            Ok(Some(Ok(value))) => value,
            Ok(Some(Err(e))) => {
                warn!(task = %label, error = %e, "Sub-task failed, using fallback");
                fallback
            }
            Ok(None) => {
                debug!(task = %label, "Sub-task timed out, using fallback");
                fallback
            }
            Err(e) => {
                warn!(task = %label, error = %e, "Sub-task aborted, using fallback");
                fallback
            }
        })
        .collect()
}

/// First of (`future` completes) or (`deadline` passes)
pub async fn within<F: Future>(deadline: Deadline, future: F) -> Option<F::Output> {
    timeout_at(deadline.at(), future).await.ok()
}

/// Run two inner fetches concurrently; `None` when the deadline passes
/// before both are done
pub async fn join_within<A, B>(deadline: Deadline, a: A, b: B) -> Option<(A::Output, B::Output)>
where
    A: Future,
    B: Future,
{
    within(deadline, async { tokio::join!(a, b) }).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_never_outlives_parent() {
        let parent = Deadline::after(Duration::from_secs(5));
        assert_eq!(parent.child(Duration::from_secs(10)), parent);

        let child = parent.child(Duration::from_secs(1));
        assert!(child < parent);
        assert_eq!(child.remaining(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_within_reports_timeout() {
        let deadline = Deadline::after(Duration::from_millis(50));
        let slow = within(deadline, tokio::time::sleep(Duration::from_secs(1))).await;
        assert!(slow.is_none());
        assert!(deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_within_needs_both_halves() {
        let deadline = Deadline::after(Duration::from_millis(100));
        let both = join_within(deadline, async { 1 }, async { "two" }).await;
        assert_eq!(both, Some((1, "two")));

        let deadline = Deadline::after(Duration::from_millis(100));
        let partial = join_within(
            deadline,
            async { 1 },
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                2
            },
        )
        .await;
        assert_eq!(partial, None);
    }

    #[tokio::test]
    async fn test_panicking_task_resolves_to_fallback() {
        let tasks = vec![
            FanOutTask::new("ok", 0, async { Ok(1) }),
            FanOutTask::new("panics", -1, async {
                if true {
                    panic!("boom");
                }
                Ok(2)
            }),
        ];

        assert_eq!(run(tasks, None).await, vec![1, -1]);
    }

    #[tokio::test]
    async fn test_dropped_fan_out_aborts_running_tasks() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let tasks = vec![FanOutTask::new("slow", 0, async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(1)
        })];

        let cancelled = tokio::time::timeout(Duration::from_millis(20), run(tasks, None)).await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_empty_task_list() {
        let results: Vec<u8> = run(Vec::new(), Some(Duration::from_secs(1))).await;
        assert!(results.is_empty());
    }
}
