//! Explicitly owned worker pool.
//!
//! The pipeline never touches a process-wide pool: whoever creates the
//! pipeline hands it a [`WorkerPool`], and the same handle is given to image
//! textures for asynchronous decoding. Both uses are join-before-continue.

use parking_lot::Mutex;
use std::fmt;
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, OnceLock};

use crate::util::{Error, Result};

/// Cloneable handle to a rayon thread pool.
#[derive(Clone)]
pub struct WorkerPool {
    pool: Arc<rayon::ThreadPool>,
}

impl WorkerPool {
    /// Pool with `threads` workers (0 lets rayon pick).
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("lumen-worker-{i}"))
            // Without a handler a panicking spawned job aborts the process.
            .panic_handler(|_| tracing::error!("worker job panicked"))
            .build()?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `op` inside the pool; rayon parallel iterators used by `op`
    /// execute on this pool's threads. Blocks until `op` returns.
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// Start `job` in the background; the result is collected by
    /// [`AsyncTask::wait`].
    pub fn spawn_async<T, F>(&self, job: F) -> AsyncTask<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = channel();
        self.pool.spawn(move || {
            // Receiver gone means nobody wants the result.
            let _ = tx.send(job());
        });
        AsyncTask {
            rx: Mutex::new(Some(rx)),
            value: OnceLock::new(),
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads())
            .finish()
    }
}

/// Result of a job started with [`WorkerPool::spawn_async`].
pub struct AsyncTask<T> {
    rx: Mutex<Option<Receiver<T>>>,
    value: OnceLock<T>,
}

impl<T> AsyncTask<T> {
    /// Block until the job finished and borrow its value.
    pub fn wait(&self) -> Result<&T> {
        if let Some(v) = self.value.get() {
            return Ok(v);
        }
        let mut rx = self.rx.lock();
        if let Some(v) = self.value.get() {
            return Ok(v);
        }
        let value = rx
            .take()
            .ok_or(Error::WorkerDisconnected)?
            .recv()
            .map_err(|_| Error::WorkerDisconnected)?;
        Ok(self.value.get_or_init(|| value))
    }

    /// Whether the value has already been collected.
    pub fn is_ready(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<T> fmt::Debug for AsyncTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTask")
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_install_runs_parallel_iterators() {
        let pool = WorkerPool::new(2).unwrap();
        let sum: u64 = pool.install(|| (0..1000u64).into_par_iter().sum());
        assert_eq!(sum, 499_500);
    }

    #[test]
    fn test_async_task() {
        let pool = WorkerPool::new(1).unwrap();
        let task = pool.spawn_async(|| 6 * 7);
        assert_eq!(*task.wait().unwrap(), 42);
        assert!(task.is_ready());
        // Second wait returns the cached value.
        assert_eq!(*task.wait().unwrap(), 42);
    }

    #[test]
    fn test_async_task_panicking_job() {
        let pool = WorkerPool::new(1).unwrap();
        let task: AsyncTask<u32> = pool.spawn_async(|| panic!("decode failed"));
        assert!(matches!(task.wait(), Err(Error::WorkerDisconnected)));
    }
}
