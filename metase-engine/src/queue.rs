//! Bounded-concurrency worker pool for outbound fetches.
//!
//! Jobs are pushed onto an unbounded FIFO queue and consumed by a fixed set of
//! long-lived workers. The pool runs `2 × max_clients` workers: a page fetch
//! may be followed by URL-resolution fetches for the same source, and both
//! kinds compete for the same pool.
//!
//! A failing job is logged and dropped; the worker moves straight on to the
//! next job.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::{EngineError, Result};

/// A unit of work accepted by the pool.
pub type Job = BoxFuture<'static, Result<()>>;

struct Shared {
    tx: mpsc::UnboundedSender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

/// FIFO work queue drained by a fixed pool of workers.
///
/// Cloning yields another handle to the same pool. Workers are aborted when
/// the last handle is dropped.
#[derive(Clone)]
pub struct WorkQueue {
    shared: Arc<Shared>,
}

impl WorkQueue {
    /// Start a pool sized for `max_clients` concurrent outbound connections.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(max_clients: usize) -> Self {
        Self::with_workers(max_clients.max(1) * 2)
    }

    /// Start a pool with exactly `count` workers.
    pub fn with_workers(count: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let workers = (0..count.max(1))
            .map(|id| {
                let rx = Arc::clone(&rx);
                tokio::spawn(worker_loop(id, rx))
            })
            .collect();
        tracing::debug!(workers = count.max(1), "work queue started");
        Self {
            shared: Arc::new(Shared { tx, workers }),
        }
    }

    /// Number of workers in the pool.
    pub fn worker_count(&self) -> usize {
        self.shared.workers.len()
    }

    /// Enqueue a job. Never waits for a free worker.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Queue`] if every worker has exited.
    pub fn push<F>(&self, job: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.shared
            .tx
            .send(job.boxed())
            .map_err(|_| EngineError::Queue)
    }
}

async fn worker_loop(id: usize, rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            tracing::debug!(worker = id, "work queue closed, worker exiting");
            return;
        };
        if let Err(e) = job.await {
            tracing::warn!(worker = id, error = %e, "queued job failed");
        }
    }
}
