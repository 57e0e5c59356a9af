use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::ErrorKind;
use crate::metrics::Metrics;

/// Failure modes of [`InferenceDispatcher::submit`].
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The pool is saturated; the caller should fail fast rather than queue. Failing fast here
    /// preserves liveness for other sessions instead of backing up behind an unbounded queue.
    #[error("dispatcher pool saturated")]
    Busy,
    /// The per-call deadline expired before the inference future resolved.
    #[error("inference call exceeded its deadline")]
    Timeout,
    /// The caller's session was cancelled while waiting for a worker slot. A cancelled call
    /// never emits a Result: the caller should drop the segment silently.
    #[error("cancelled while waiting for a worker slot")]
    Cancelled,
    /// The underlying model returned an error.
    #[error("model call failed: {0}")]
    Model(anyhow::Error),
}

impl DispatchError {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            DispatchError::Busy => Some(ErrorKind::DispatcherBusy),
            DispatchError::Timeout => Some(ErrorKind::InferenceTimeout),
            DispatchError::Cancelled => None,
            DispatchError::Model(_) => Some(ErrorKind::ModelError),
        }
    }
}

/// Fixed-size worker pool shared across all open sessions.
///
/// Concurrency is bounded by a [`Semaphore`] rather than an actual thread pool: permits gate how
/// many inference futures may be in flight at once, while the futures themselves still run as
/// ordinary `tokio` tasks driven by the caller. `try_acquire_owned` gives fail-fast `Busy`
/// behavior instead of queueing submissions unboundedly.
pub struct InferenceDispatcher {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    deadline: Duration,
    metrics: Arc<Metrics>,
}

impl InferenceDispatcher {
    pub fn new(pool_size: usize, deadline: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(pool_size)),
            capacity: pool_size,
            deadline,
            metrics: Arc::new(Metrics::noop()),
        }
    }

    /// Attaches a metrics handle, reporting `dispatcher_inflight` and
    /// `inference_duration_seconds` for every call submitted afterward.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Number of worker slots currently occupied.
    pub fn inflight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Runs `make_future` under a worker permit, subject to the per-call deadline. `kind` labels
    /// the recorded inference duration (see [`crate::metrics::kind`]) and is otherwise inert.
    ///
    /// If no permit is immediately available, returns [`DispatchError::Busy`] without waiting,
    /// rather than queueing the submission unboundedly.
    /// If `cancel` fires before `make_future`'s future resolves, returns
    /// [`DispatchError::Cancelled`] — but only while waiting for the permit; once the call is
    /// running it is not preemptable mid-call, only its deadline still applies.
    pub async fn submit<F, Fut, T>(
        &self,
        kind: &str,
        cancel: &CancellationToken,
        make_future: F,
    ) -> Result<T, DispatchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send,
    {
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Err(DispatchError::Busy),
        };
        self.metrics.set_dispatcher_inflight(self.inflight() as i64);

        if cancel.is_cancelled() {
            drop(permit);
            self.metrics.set_dispatcher_inflight(self.inflight() as i64);
            return Err(DispatchError::Cancelled);
        }

        let started = Instant::now();
        let fut = make_future();
        let outcome = tokio::time::timeout(self.deadline, fut).await;
        let elapsed = started.elapsed();
        drop(permit);
        self.metrics.set_dispatcher_inflight(self.inflight() as i64);
        self.metrics.observe_inference_duration(kind, elapsed);

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(model_err)) => Err(DispatchError::Model(model_err)),
            Err(_elapsed) => Err(DispatchError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn busy_when_pool_saturated() {
        let dispatcher = InferenceDispatcher::new(1, StdDuration::from_millis(200));
        let cancel = CancellationToken::new();

        let sem = Arc::new(tokio::sync::Notify::new());
        let sem2 = sem.clone();
        let slow = dispatcher.submit("test", &cancel, || async move {
            sem2.notified().await;
            Ok::<_, anyhow::Error>(())
        });
        let slow_task = tokio::spawn(slow);
        tokio::task::yield_now().await;

        let busy = dispatcher
            .submit("test", &cancel, || async { Ok::<_, anyhow::Error>(()) })
            .await;
        assert!(matches!(busy, Err(DispatchError::Busy)));

        sem.notify_one();
        let _ = slow_task.await;
    }

    #[tokio::test]
    async fn timeout_when_call_exceeds_deadline() {
        let dispatcher = InferenceDispatcher::new(4, StdDuration::from_millis(10));
        let cancel = CancellationToken::new();
        let result = dispatcher
            .submit("test", &cancel, || async {
                tokio::time::sleep(StdDuration::from_millis(100)).await;
                Ok::<_, anyhow::Error>(())
            })
            .await;
        assert!(matches!(result, Err(DispatchError::Timeout)));
    }

    #[tokio::test]
    async fn cancelled_before_start_short_circuits() {
        let dispatcher = InferenceDispatcher::new(4, StdDuration::from_millis(200));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = dispatcher
            .submit("test", &cancel, || async { Ok::<_, anyhow::Error>(()) })
            .await;
        assert!(matches!(result, Err(DispatchError::Cancelled)));
    }

    #[tokio::test]
    async fn permit_is_released_after_completion() {
        let dispatcher = InferenceDispatcher::new(1, StdDuration::from_millis(200));
        let cancel = CancellationToken::new();
        let _ = dispatcher
            .submit("test", &cancel, || async { Ok::<_, anyhow::Error>(()) })
            .await;
        let result = dispatcher
            .submit("test", &cancel, || async { Ok::<_, anyhow::Error>(()) })
            .await;
        assert!(result.is_ok());
    }
}
