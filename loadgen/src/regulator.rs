use std::{thread, time::Duration};

/// How much longer a finished task has to be held back so that it takes at least `time_budget`.
///
/// Slow tasks are not compensated for: a task that overran its budget gets zero,
/// and later tasks are not paced any harder because of it.
pub(crate) fn extra_wait(time_budget: Duration, elapsed: Duration) -> Duration {
    time_budget.saturating_sub(elapsed)
}

/// Blocking wait performed by the orchestrator between completions.
pub(crate) trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
