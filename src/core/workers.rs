//! Background thread pool for session load, import and save jobs.
//!
//! Work-stealing deques from crossbeam: jobs enter a global injector and
//! idle threads steal from each other. Jobs run to completion; there is no
//! cancellation. Results travel back on channels owned by the caller, so a
//! job whose receiver is gone simply drops its result.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::deque::{Injector, Stealer, Worker};
use log::{trace, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// How long `Drop` waits for running jobs before leaving threads behind.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
}

impl std::fmt::Debug for Workers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workers")
            .field("threads", &self.handles.len())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Workers {
    /// Spawn `num_threads` workers (at least one).
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let pending = Arc::new(AtomicUsize::new(0));

        let locals: Vec<Worker<Job>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Job>> = locals.iter().map(Worker::stealer).collect();

        let mut handles = Vec::with_capacity(num_threads);
        for (worker_id, local) in locals.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let pending = Arc::clone(&pending);
            let stealers = stealers.clone();

            let spawned = thread::Builder::new()
                .name(format!("mixa-worker-{}", worker_id))
                .spawn(move || {
                    trace!("Worker {} started", worker_id);
                    loop {
                        let job = local
                            .pop()
                            .or_else(|| injector.steal_batch_and_pop(&local).success())
                            .or_else(|| stealers.iter().find_map(|s| s.steal().success()));

                        match job {
                            Some(job) => {
                                job();
                                pending.fetch_sub(1, Ordering::SeqCst);
                            }
                            None if shutdown.load(Ordering::Relaxed) => break,
                            None => thread::sleep(Duration::from_millis(1)),
                        }
                    }
                    trace!("Worker {} stopped", worker_id);
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("Failed to spawn worker thread {}: {}", worker_id, e),
            }
        }

        trace!("Workers initialized: {} threads", handles.len());
        Self { injector, handles, shutdown, pending }
    }

    /// Queue a job. Without any live thread the job runs inline.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.handles.is_empty() {
            f();
            return;
        }
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.injector.push(Box::new(f));
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl Default for Workers {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + SHUTDOWN_GRACE;

        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Worker shutdown timeout, detaching remaining threads");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }
        trace!("All workers stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn test_execute_runs_jobs() {
        let workers = Workers::new(2);
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..8 {
            let tx = tx.clone();
            workers.execute(move || {
                let _ = tx.send(i);
            });
        }
        let mut got: Vec<i32> = (0..8)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        got.sort();
        assert_eq!(got, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_dropped_receiver_discards_result() {
        let workers = Workers::new(1);
        let done = Arc::new(AtomicI32::new(0));
        let (tx, rx) = crossbeam_channel::bounded::<i32>(1);
        drop(rx);
        let d = Arc::clone(&done);
        workers.execute(move || {
            assert!(tx.send(1).is_err());
            d.store(1, Ordering::SeqCst);
        });
        let deadline = Instant::now() + Duration::from_secs(2);
        while done.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
