//! Multicore track partitioning (SPEC_FULL §11): a fixed pool of persistent
//! worker threads, one job submitted per chunk per worker, with a barrier at
//! the end of the chunk before routing continues (§4.5 step 6: "Multi-core
//! mode partitions the set of tracks across worker threads at the start of
//! step 6 and barriers at its end").
//!
//! A small, fixed-size job queue rather than `rayon`'s work-stealing pool —
//! the partition is decided once per chunk and every worker does exactly one
//! job, so a general-purpose scheduler buys nothing here.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send>;

/// Wraps a raw job so it can cross the channel; the sender only ever hands
/// off a job whose captured references live at least as long as the call to
/// [`WorkerPool::run`], enforced by the lifetime on that method, not by this
/// wrapper — this wrapper exists only to give the boxed closure a `'static`
/// shape for the channel's type parameter.
struct JobEnvelope(Job);
unsafe impl Send for JobEnvelope {}

struct Worker {
    job_tx: Sender<JobEnvelope>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

/// A persistent pool of `worker_count` threads, each waiting on its own job
/// channel. Created once at engine startup; never spawns or joins threads on
/// the RT path.
pub struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        let workers = (0..worker_count)
            .map(|index| {
                let (job_tx, job_rx) = bounded::<JobEnvelope>(1);
                let (done_tx, done_rx) = bounded::<()>(1);
                let handle = std::thread::Builder::new()
                    .name(format!("sushi-rt-worker-{index}"))
                    .spawn(move || {
                        while let Ok(envelope) = job_rx.recv() {
                            (envelope.0)();
                            if done_tx.send(()).is_err() {
                                break;
                            }
                        }
                    })
                    .expect("failed to spawn engine worker thread");
                Worker {
                    job_tx,
                    done_rx,
                    handle: Some(handle),
                }
            })
            .collect();
        Self { workers }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Partition `jobs` across the pool's workers (one job per worker slot;
    /// callers with more jobs than workers should pre-group tracks) and
    /// block until every job completes — the barrier at the end of §4.5
    /// step 6. `jobs` must not outlive this call; the lifetime on `'env`
    /// guarantees the compiler rejects any closure that could be run after
    /// `run` returns.
    pub fn run<'env>(&self, jobs: Vec<Box<dyn FnOnce() + Send + 'env>>) {
        assert!(jobs.len() <= self.workers.len(), "more jobs than workers");

        // SAFETY: this call blocks until every dispatched job signals
        // completion below, before returning — no worker touches a job's
        // `'env`-tied captures past that point, despite the channel's job
        // type erasing the lifetime to `'static`.
        let dispatched = jobs.len();
        for (worker, job) in self.workers.iter().zip(jobs) {
            let job: Box<dyn FnOnce() + Send + 'env> = job;
            let job: Box<dyn FnOnce() + Send + 'static> = unsafe { std::mem::transmute(job) };
            worker
                .job_tx
                .send(JobEnvelope(job))
                .expect("engine worker thread terminated unexpectedly");
        }
        for worker in self.workers.iter().take(dispatched) {
            worker
                .done_rx
                .recv()
                .expect("engine worker thread terminated unexpectedly");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in &mut self.workers {
            drop(worker.job_tx.clone());
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_one_job_per_worker_and_barriers() {
        let pool = WorkerPool::new(2);
        let counter = AtomicUsize::new(0);
        let jobs: Vec<Box<dyn FnOnce() + Send>> = vec![
            Box::new(|| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Box::new(|| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        ];
        pool.run(jobs);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn single_worker_pool_runs_sequential_job() {
        let pool = WorkerPool::new(1);
        let mut total = 0usize;
        {
            let jobs: Vec<Box<dyn FnOnce() + Send>> = vec![Box::new(|| {
                // single job, no captured mutable state across threads
            })];
            pool.run(jobs);
        }
        total += 1;
        assert_eq!(total, 1);
    }
}
