use std::time::Duration;

use crate::runner::TickContext;

/// Identifies a task within one [`crate::TaskRunner`]. Ids are never reused
/// by the runner that minted them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) u64);

/// Error produced by a task callback. The runner logs it and routes it to
/// the task's `on_error` hook; sibling tasks are unaffected.
pub type TaskError = Box<dyn std::error::Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Continue,
    /// Stop this task regardless of any remaining `repeat` budget.
    Stop,
}

/// The work a task performs on each due tick.
pub trait Runnable {
    fn run(&mut self, cx: &mut TickContext<'_>) -> Result<TaskOutcome, TaskError>;

    /// Called after `run` returns an error. Default: nothing.
    fn on_error(&mut self, _error: &TaskError) {}

    /// Called once when the task transitions to stopped.
    fn on_stop(&mut self) {}
}

impl<F> Runnable for F
where
    F: FnMut(&mut TickContext<'_>) -> Result<TaskOutcome, TaskError>,
{
    fn run(&mut self, cx: &mut TickContext<'_>) -> Result<TaskOutcome, TaskError> {
        self(cx)
    }
}

/// Boxes a closure as a task callback.
pub fn task_fn<F>(f: F) -> Box<dyn Runnable>
where
    F: FnMut(&mut TickContext<'_>) -> Result<TaskOutcome, TaskError> + 'static,
{
    Box::new(f)
}

#[derive(Debug, Clone, Copy)]
pub struct TaskConfig {
    /// How often to run the task.
    pub interval: Duration,
    /// Maximum lifetime before the task stops automatically.
    pub duration: Option<Duration>,
    /// Maximum invocation count before the task stops automatically.
    pub repeat: Option<u32>,
    /// When `true` (the default) the task is due on the very first tick
    /// after `start` instead of waiting out its initial interval.
    pub fire_on_start: bool,
}

impl TaskConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            duration: None,
            repeat: None,
            fire_on_start: true,
        }
    }
}
