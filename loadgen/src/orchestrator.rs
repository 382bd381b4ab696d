use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, info, info_span};

use crate::{
    config::GenerationRequest,
    error::Error,
    materializer::{Materializer, RandomFill, TaskOutcome},
    naming::{file_name, file_path},
    pool::{Executor, TaskHandle},
    regulator::{extra_wait, Sleeper},
    sizer::{size_descriptor, SizeDescriptor},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Submitting,
    AwaitingCompletion,
    Draining,
    Done,
}

/// One file to generate. Built during submission and handed to exactly one worker.
#[derive(Debug, Clone)]
pub(crate) struct FileTask {
    pub index: usize,
    pub file_name: String,
    pub path: PathBuf,
    pub size: SizeDescriptor,
}

#[derive(Debug)]
pub(crate) struct RunReport {
    /// Outcomes in submission order.
    pub outcomes: Vec<TaskOutcome>,
    /// Total time spent in regulator waits.
    pub waited: Duration,
    pub elapsed: Duration,
}

impl RunReport {
    pub(crate) fn bytes_written(&self) -> u64 {
        self.outcomes.iter().map(TaskOutcome::bytes).sum()
    }

    pub(crate) fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_written() as f64 / secs
        } else {
            0.0
        }
    }
}

/// Drives a single run: submits every file up front, then drains completions in submission
/// order and holds each one back until its time budget is used up.
pub(crate) struct Orchestrator<'a, E, R, S>
where
    E: Executor,
    R: RandomFill + 'static,
    S: Sleeper,
{
    request: GenerationRequest,
    executor: &'a E,
    materializer: Arc<Materializer<R>>,
    sleeper: S,
    phase: Phase,
}

impl<'a, E, R, S> Orchestrator<'a, E, R, S>
where
    E: Executor,
    R: RandomFill + 'static,
    S: Sleeper,
{
    pub(crate) fn new(request: GenerationRequest, executor: &'a E, materializer: Materializer<R>, sleeper: S) -> Self {
        Self {
            request,
            executor,
            materializer: Arc::new(materializer),
            sleeper,
            phase: Phase::Idle,
        }
    }

    /// Consumes the orchestrator, a run is never repeated on the same instance.
    ///
    /// The first failure in submission order is returned. Tasks that are still running
    /// are not cancelled and finish in the background of the executor.
    pub(crate) fn run(mut self) -> Result<RunReport, Error> {
        let span = info_span!("run", host = self.request.host(), files = self.request.file_count());
        let _guard = span.enter();
        let start = Instant::now();
        let budget = self.request.time_budget();

        self.transition(Phase::Submitting);
        let size = size_descriptor(self.request.file_size_bytes())?;
        info!(
            "generating {} files of {} bytes into {} at {} bytes/s, time budget per file {}",
            self.request.file_count(),
            size.bytes(),
            self.request.directory().display(),
            self.request.bandwidth_bytes_per_sec(),
            humantime::format_duration(budget)
        );
        let pending = (1..=self.request.file_count())
            .map(|index| {
                let task = self.task(index, size);
                let file_name = task.file_name.clone();
                (file_name, self.submit(task))
            })
            .collect::<Vec<_>>();

        self.transition(Phase::AwaitingCompletion);
        let mut outcomes = Vec::with_capacity(pending.len());
        let mut waited = Duration::ZERO;
        // the caller reports the returned error, it is not logged here
        for (file_name, handle) in pending {
            let outcome = match handle.wait() {
                Ok(rst) => rst?,
                Err(_) => return Err(Error::TaskLost { file_name }),
            };
            let wait = extra_wait(budget, outcome.elapsed);
            if !wait.is_zero() {
                debug!("holding {} back for {}", file_name, humantime::format_duration(wait));
                self.sleeper.sleep(wait);
                waited += wait;
            }
            info!("file {} generated successfully", outcome.file_name);
            outcomes.push(outcome);
        }

        self.transition(Phase::Draining);
        let report = RunReport {
            outcomes,
            waited,
            elapsed: start.elapsed(),
        };
        info!(
            "wrote {} bytes in {:.3}s ({:.3}s spent pacing), observed throughput {:.3} GB/s",
            report.bytes_written(),
            report.elapsed.as_secs_f64(),
            report.waited.as_secs_f64(),
            report.throughput() / crate::config::GIGABYTE
        );
        self.transition(Phase::Done);
        Ok(report)
    }

    fn task(&self, index: usize, size: SizeDescriptor) -> FileTask {
        let host = self.request.host();
        FileTask {
            index,
            file_name: file_name(host, index),
            path: file_path(self.request.directory(), host, index),
            size,
        }
    }

    fn submit(&self, task: FileTask) -> TaskHandle<Result<TaskOutcome, Error>> {
        info!("submitting file {} to {}", task.index, task.path.display());
        let materializer = self.materializer.clone();
        let span = info_span!("file", index = task.index);
        self.executor.submit(move || {
            let _guard = span.enter();
            materializer.materialize(&task.file_name, &task.path, task.size)
        })
    }

    fn transition(&mut self, next: Phase) {
        debug!("{:?} -> {:?}", self.phase, next);
        self.phase = next;
    }
}
