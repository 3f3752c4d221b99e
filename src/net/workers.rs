//! The worker pool driving every I/O completion.
//!
//! A multi-threaded Tokio runtime is the shared completion queue: its N
//! worker threads resume whichever accept, connect, read or write finished
//! next. There is no thread per session.

use crate::shutdown::Shutdown;
use std::io;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::info;

/// Upper bound on worker threads, whatever was asked for.
pub const MAX_WORKER_THREADS: usize = 100;

/// How long `wait` gives in-flight tasks to wind down.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves a requested thread count: `0` means one per available CPU, and
/// the result always lies in `1..=MAX_WORKER_THREADS`.
pub fn clamp_threads(requested: usize) -> usize {
    let threads = if requested == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        requested
    };
    threads.clamp(1, MAX_WORKER_THREADS)
}

#[derive(Debug)]
pub struct WorkerPool {
    runtime: Runtime,
    threads: usize,
    stop: Shutdown,
}

impl WorkerPool {
    /// Spawns the worker threads.
    pub fn start(threads: usize) -> io::Result<Self> {
        let threads = clamp_threads(threads);
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name("netsession-worker")
            .enable_all()
            .build()?;

        info!(threads, "Worker pool started");

        Ok(Self {
            runtime,
            threads,
            stop: Shutdown::new(),
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn handle(&self) -> &Handle {
        self.runtime.handle()
    }

    /// A clone of the stop signal, usable from any thread or task.
    pub fn stop_handle(&self) -> Shutdown {
        self.stop.clone()
    }

    /// Requests a stop. Safe to call from a worker, including from inside a
    /// packet handler. Returns `true` for the call that requested it.
    pub fn stop(&self) -> bool {
        self.stop.trigger()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_triggered()
    }

    /// Blocks until [`stop`](Self::stop) is called, then shuts the runtime
    /// down and joins the workers.
    ///
    /// # Panics
    ///
    /// Panics if called from inside an async context.
    pub fn wait(self) {
        let mut stopped = self.stop.listener();
        self.runtime.block_on(stopped.wait());
        self.shutdown();
    }

    /// Shuts the runtime down without waiting for a stop request.
    pub fn shutdown(self) {
        self.stop.trigger();
        self.runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
        info!(threads = self.threads, "Worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_clamp_threads() {
        assert!(clamp_threads(0) >= 1);
        assert!(clamp_threads(0) <= MAX_WORKER_THREADS);
        assert_eq!(clamp_threads(1), 1);
        assert_eq!(clamp_threads(8), 8);
        assert_eq!(clamp_threads(100), 100);
        assert_eq!(clamp_threads(5000), MAX_WORKER_THREADS);
    }

    #[test]
    fn test_start_clamps() {
        let pool = WorkerPool::start(1000).unwrap();
        assert_eq!(pool.threads(), MAX_WORKER_THREADS);
        pool.shutdown();
    }

    #[test]
    fn test_tasks_run_on_workers() {
        let pool = WorkerPool::start(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.handle().spawn(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            pool.handle().block_on(handle).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);
        pool.shutdown();
    }

    #[test]
    fn test_stop_from_other_thread_releases_wait() {
        let pool = WorkerPool::start(1).unwrap();
        let stop = pool.stop_handle();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            stop.trigger()
        });

        pool.wait();
        assert!(stopper.join().unwrap());
    }

    #[test]
    fn test_stop_from_inside_task() {
        let pool = WorkerPool::start(2).unwrap();
        let stop = pool.stop_handle();
        pool.handle().spawn(async move {
            stop.trigger();
        });

        pool.wait();
    }

    #[test]
    fn test_stop_once() {
        let pool = WorkerPool::start(1).unwrap();
        assert!(!pool.is_stopped());
        assert!(pool.stop());
        assert!(!pool.stop());
        assert!(pool.is_stopped());
        pool.wait();
    }
}
