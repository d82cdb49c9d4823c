//! Off-thread scan execution
//!
//! A fixed number of permits bounds how many scans run at once. Each
//! submitted job waits for a permit on the Tokio runtime, then runs on the
//! blocking pool so long scans never stall async callers. The caller gets a
//! [`ScanHandle`] future and only suspends when it awaits it.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::DispatchConfig;
use crate::error::{Error, Result};

/// Shared cancellation flag checked by running scans
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an untriggered token
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the scan holding this token to stop
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// `Err(Error::Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Bounded pool running scans off the caller's thread
///
/// Must be used from within a Tokio runtime.
pub struct ScanPool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl ScanPool {
    /// Create a pool allowing `config.workers` concurrent scans
    pub fn new(config: &DispatchConfig) -> Self {
        let workers = config.workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Queue a job; it starts once a worker slot is free
    ///
    /// The job receives the handle's [`CancelToken`] and should poll it while
    /// scanning. A job cancelled before it starts never runs.
    pub fn submit<T, F>(&self, job: F) -> ScanHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&CancelToken) -> Result<T> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let token = CancelToken::new();
        let job_token = token.clone();

        let join = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| Error::ScanFailure("scan pool closed".to_string()))?;
            if job_token.is_cancelled() {
                debug!("Scan cancelled before start");
                return Err(Error::Cancelled);
            }
            match tokio::task::spawn_blocking(move || job(&job_token)).await {
                Ok(result) => result,
                Err(e) => Err(Error::ScanFailure(e.to_string())),
            }
        });

        ScanHandle { join, token }
    }

    /// Refuse new scans; queued scans that have not started fail
    pub fn close(&self) {
        self.permits.close();
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Configured number of concurrent scans
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Worker slots currently free
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Future resolving to a scan's result
pub struct ScanHandle<T> {
    join: JoinHandle<Result<T>>,
    token: CancelToken,
}

impl<T> ScanHandle<T> {
    /// Request cancellation; the future then resolves to `Error::Cancelled`
    /// unless the scan already finished
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token shared with the running job
    pub fn cancel_token(&self) -> &CancelToken {
        &self.token
    }
}

impl<T> Future for ScanHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.join).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) if e.is_cancelled() => Poll::Ready(Err(Error::Cancelled)),
            Poll::Ready(Err(e)) => Poll::Ready(Err(Error::ScanFailure(e.to_string()))),
            Poll::Pending => Poll::Pending,
        }
    }
}
