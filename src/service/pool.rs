//! Bounded worker pool that executes relay tasks.
//!
//! A fixed number of workers drain one shared queue whose capacity is twice
//! the worker count. Submitting into a full queue waits for room, which pushes
//! back on whoever produces the tasks (ultimately the chat event callback).
//! Shutdown closes the queue and waits for every queued task to finish.

use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex},
};

use futures::FutureExt;
use tokio::{
    sync::{Mutex as AsyncMutex, mpsc},
    task::JoinHandle,
};
use tracing::{Instrument, debug, error, info, info_span, instrument};

use crate::base::error::RelayError;

// Traits.

/// A deferred unit of work owned by the pool once submitted.
pub trait Task: Send + 'static {
    /// Run the task to completion. Tasks handle their own failures.
    fn run(self) -> impl Future<Output = ()> + Send;
}

// Structs.

/// Worker pool for the application.
///
/// It is designed to be trivially cloneable; every clone feeds the same queue.
pub struct TaskPool<T: Task> {
    inner: Arc<TaskPoolInner<T>>,
}

impl<T: Task> Clone for TaskPool<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

struct TaskPoolInner<T> {
    size: usize,
    sender: Mutex<Option<mpsc::Sender<T>>>,
    workers: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl<T: Task> TaskPool<T> {
    /// Start `size` workers (at least one) over a queue of `2 * size` slots.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(name = "TaskPool::new", skip_all)]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<T>(size * 2);
        let receiver = Arc::new(AsyncMutex::new(receiver));

        let workers = (0..size).map(|index| tokio::spawn(worker(index, receiver.clone()))).collect();

        info!("Started {size} relay workers.");

        Self {
            inner: Arc::new(TaskPoolInner {
                size,
                sender: Mutex::new(Some(sender)),
                workers: AsyncMutex::new(workers),
            }),
        }
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Whether shutdown has begun.
    pub fn is_closed(&self) -> bool {
        self.sender().is_none()
    }

    /// Queue a task, waiting while the queue is full.
    ///
    /// Fails with [`RelayError::PoolClosed`] once shutdown has begun.
    pub async fn submit(&self, task: T) -> Result<(), RelayError> {
        let sender = self.sender().ok_or(RelayError::PoolClosed)?;

        sender.send(task).await.map_err(|_| RelayError::PoolClosed)
    }

    /// Stop accepting tasks and wait until every queued task has run.
    ///
    /// Calling this more than once is harmless.
    #[instrument(name = "TaskPool::shutdown", skip_all)]
    pub async fn shutdown(&self) {
        // Dropping the last sender closes the queue once in-flight submits land.
        let sender = match self.inner.sender.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let workers = std::mem::take(&mut *self.inner.workers.lock().await);

        for handle in workers {
            if let Err(err) = handle.await {
                error!("Relay worker terminated abnormally: {err}");
            }
        }

        info!("Task pool drained.");
    }

    fn sender(&self) -> Option<mpsc::Sender<T>> {
        match self.inner.sender.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Worker loop: pull one task, run it to completion, repeat until the queue is closed and empty.
async fn worker<T: Task>(index: usize, receiver: Arc<AsyncMutex<mpsc::Receiver<T>>>) {
    loop {
        // The lock is released before the task runs, so other workers keep pulling.
        let task = receiver.lock().await.recv().await;

        let Some(task) = task else {
            debug!("Relay worker {index} stopping.");
            break;
        };

        let result = AssertUnwindSafe(task.run()).catch_unwind().instrument(info_span!("relay_worker", worker = index)).await;

        if result.is_err() {
            error!("Relay task panicked on worker {index}.");
        }
    }
}

// Tests.
