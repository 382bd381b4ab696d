use std::{
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver, RecvError, Sender};
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs submitted jobs somewhere and hands back a handle to wait on their result.
pub(crate) trait Executor {
    fn submit<T, F>(&self, job: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static;
}

/// Completion handle for one submitted job.
#[derive(Debug)]
pub(crate) struct TaskHandle<T>(Receiver<T>);

impl<T> TaskHandle<T> {
    /// Blocks until the job finished. Fails only if the job never produced a value.
    pub(crate) fn wait(self) -> Result<T, RecvError> {
        self.0.recv()
    }
}

pub(crate) fn completion<T>() -> (Sender<T>, TaskHandle<T>) {
    let (sender, receiver) = channel::bounded(1);
    (sender, TaskHandle(receiver))
}

/// Fixed number of threads pulling jobs from a shared queue.
///
/// Dropping the pool stops accepting jobs and joins the workers after the queue is drained,
/// so jobs already submitted always run to completion.
pub(crate) struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn new(size: NonZeroUsize) -> Result<Self> {
        let (sender, receiver) = channel::unbounded::<Job>();
        let workers = (0..size.get())
            .map(|id| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("loadgen-worker-{}", id))
                    .spawn(move || work(id, receiver))
                    .with_context(|| format!("spawning worker {}", id))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("started {} workers", workers.len());
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    pub(crate) fn with_available_parallelism() -> Result<Self> {
        let size = thread::available_parallelism().context("querying available parallelism")?;
        Self::new(size)
    }

    pub(crate) fn size(&self) -> usize {
        self.workers.len()
    }
}

fn work(id: usize, receiver: Receiver<Job>) {
    for job in receiver {
        // a panicking job drops its completion sender, the waiting side observes that
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("job panicked on worker {}", id);
        }
    }
}

impl Executor for WorkerPool {
    fn submit<T, F>(&self, job: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (sender, handle) = completion();
        let job: Job = Box::new(move || {
            // receiver may be gone if the orchestrator returned early, the result is dropped then
            _ = sender.send(job());
        });
        if let Some(queue) = &self.sender {
            // workers hold the receiving side for as long as the pool lives
            _ = queue.send(job);
        }
        handle
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}
