//! Fixed-size pool of worker threads with cooperative cancellation.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Shared cancellation flag, polled by jobs around their blocking calls.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` unless cancelled first. Returns `false` when
    /// the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(5);

        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLICE.min(deadline - now));
        }
    }
}

pub type Job = Box<dyn FnOnce(&CancelToken) + Send + 'static>;

/// A fixed set of threads fed from one job queue.
///
/// [`WorkerPool::shutdown_now`] cancels the shared token, closes the queue
/// and drops jobs that never started; running jobs finish at their next
/// cancellation check.
pub struct WorkerPool {
    job_tx: Option<Sender<Job>>,
    job_rx: Receiver<Job>,
    exit_rx: Receiver<()>,
    token: CancelToken,
    size: usize,
    exited: usize,
}

impl WorkerPool {
    pub fn new(size: usize, name: &str) -> std::io::Result<Self> {
        let size = size.max(1);
        let (job_tx, job_rx) = unbounded::<Job>();
        let (exit_tx, exit_rx) = unbounded::<()>();
        let token = CancelToken::new();

        for index in 0..size {
            let jobs = job_rx.clone();
            let exit_tx = exit_tx.clone();
            let token = token.clone();
            thread::Builder::new()
                .name(format!("{}-{}", name, index))
                .spawn(move || {
                    while let Ok(job) = jobs.recv() {
                        if token.is_cancelled() {
                            continue;
                        }
                        if catch_unwind(AssertUnwindSafe(|| job(&token))).is_err() {
                            log::error!("worker job panicked");
                        }
                    }
                    let _ = exit_tx.send(());
                })?;
        }

        Ok(Self {
            job_tx: Some(job_tx),
            job_rx,
            exit_rx,
            token,
            size,
            exited: 0,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Queues a job. Returns `false` after shutdown.
    pub fn execute(&self, job: Job) -> bool {
        match &self.job_tx {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        }
    }

    /// Lets queued jobs finish, then the workers exit.
    pub fn shutdown(&mut self) {
        self.job_tx = None;
    }

    /// Interrupts running jobs and discards queued ones. Returns the number
    /// of jobs that never started.
    pub fn shutdown_now(&mut self) -> usize {
        self.token.cancel();
        self.job_tx = None;
        self.job_rx.try_iter().count()
    }

    pub fn is_shutdown(&self) -> bool {
        self.job_tx.is_none()
    }

    /// Waits up to `timeout` for every worker to exit after a shutdown.
    pub fn await_termination(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.exited < self.size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.exit_rx.recv_timeout(remaining) {
                Ok(()) => self.exited += 1,
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => {
                    self.exited = self.size;
                }
            }
        }
        true
    }

    pub fn is_terminated(&self) -> bool {
        self.exited >= self.size
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Detached workers exit on their own once the queue is closed.
        self.job_tx = None;
    }
}
