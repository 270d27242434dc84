//! Bounded-concurrency fan-out / fan-in.
//!
//! [`ConcurrentTaskRunner::run`] starts exactly `k` logical workers. Each worker claims
//! its own units of work (under whatever lock the caller owns) until none remain,
//! publishing results on a shared channel. The caller consumes one merged stream that
//! ends after every worker has returned and the channel is drained.

use crate::error::Result;
use futures::stream::{self, BoxStream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default capacity of the results channel per worker
const RESULTS_PER_WORKER: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct ConcurrentTaskRunner {
    concurrency: usize,
}

impl ConcurrentTaskRunner {
    /// Runner with `concurrency` workers (at least one)
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Start the workers and return the merged result stream.
    ///
    /// `work` receives the worker number and a sender. An error returned by a worker is
    /// logged and ends only that worker; the others keep going. A panicking worker is
    /// treated the same way.
    pub fn run<T, F, Fut>(&self, work: F) -> BoxStream<'static, T>
    where
        T: Send + 'static,
        F: Fn(usize, mpsc::Sender<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.concurrency * RESULTS_PER_WORKER);
        let work = Arc::new(work);

        let handles: Vec<_> = (0..self.concurrency)
            .map(|worker| {
                let tx = tx.clone();
                let work = Arc::clone(&work);
                tokio::spawn(async move {
                    if let Err(e) = work(worker, tx).await {
                        log::warn!("Worker {} stopped: {}", worker, e);
                    }
                })
            })
            .collect();

        // Only the workers hold senders now; the stream ends when the last one returns.
        drop(tx);

        tokio::spawn(async move {
            for (worker, handle) in handles.into_iter().enumerate() {
                if let Err(e) = handle.await {
                    log::error!("Worker {} panicked: {}", worker, e);
                }
            }
        });

        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
    }
}
