//! Bounded execution of query work.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{RetrievalEngine, StreamEvent};
use crate::error::{GenerationError, RagResult};

const STREAM_BUFFER: usize = 32;

// Aborts the wrapped task when dropped, which releases its permit.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs query work on the runtime with at most `max_concurrent` requests in
/// flight and a per-request deadline.
pub struct QueryPool {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    timeout: Duration,
}

impl QueryPool {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            timeout,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Runs `work` as its own task once a permit is free. Exceeding the
    /// deadline yields `GenerationError::Timeout`. Dropping the returned
    /// future aborts the task.
    pub async fn run<F, T>(&self, work: F) -> RagResult<T>
    where
        F: Future<Output = RagResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GenerationError::Unavailable)?;

        let deadline = self.timeout;
        let mut task = AbortOnDrop(tokio::spawn(async move {
            let _permit = permit;
            tokio::time::timeout(deadline, work).await
        }));

        match (&mut task.0).await {
            Ok(Ok(result)) => result,
            Ok(Err(_elapsed)) => {
                warn!(timeout_secs = deadline.as_secs(), "query exceeded its deadline");
                Err(GenerationError::Timeout.into())
            }
            Err(e) => Err(GenerationError::Provider(format!("query task failed: {}", e)).into()),
        }
    }

    /// Starts a streamed answer and hands back the receiving end. Dropping
    /// the receiver stops generation at the next chunk.
    pub async fn spawn_stream(
        &self,
        engine: Arc<RetrievalEngine>,
        query: String,
    ) -> RagResult<mpsc::Receiver<StreamEvent>> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GenerationError::Unavailable)?;

        let (sender, receiver) = mpsc::channel(STREAM_BUFFER);
        let deadline = self.timeout;
        tokio::spawn(async move {
            let _permit = permit;
            let fallback = sender.clone();
            if tokio::time::timeout(deadline, engine.stream_into(&query, sender))
                .await
                .is_err()
            {
                warn!(timeout_secs = deadline.as_secs(), "streamed query exceeded its deadline");
                let _ = fallback.send(GenerationError::Timeout.into()).await;
            }
            debug!("stream task finished");
        });
        Ok(receiver)
    }

    /// Stops admitting work. Requests already holding a permit finish;
    /// waiting and future ones fail with `GenerationError::Unavailable`.
    pub fn close(&self) {
        self.semaphore.close();
    }
}
