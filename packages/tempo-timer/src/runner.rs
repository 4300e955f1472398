use std::rc::Rc;
use std::time::{Duration, Instant};

use smallvec::SmallVec;

use crate::clock::{Clock, SystemClock};
use crate::error::TimerError;
use crate::task::{Runnable, TaskConfig, TaskId, TaskOutcome};

const DEFAULT_INTERVAL: Duration = Duration::from_millis(10);

struct TaskEntry {
    id: TaskId,
    config: TaskConfig,
    /// Taken out while the callback runs so the runner can be borrowed
    /// mutably by the callback's [`TickContext`].
    runnable: Option<Box<dyn Runnable>>,
    started_at: Instant,
    /// `None` until the first invocation, which makes a `fire_on_start`
    /// task due on the first tick.
    last_run_at: Option<Instant>,
    run_count: u32,
    stopped: bool,
    /// The `on_stop` hook could not fire because the callback was detached
    /// (the task stopped itself mid-run); deliver it after reattach.
    on_stop_pending: bool,
}

impl TaskEntry {
    fn next_expiry(&self, now: Instant) -> Instant {
        match self.last_run_at {
            Some(at) => at + self.config.interval,
            None => now,
        }
    }
}

/// Drives many independent tasks off one armed deadline.
///
/// The runner never owns an OS timer; the host asks [`next_deadline`] when
/// to wake up and calls [`poll`] (or [`on_tick`] directly) when it does.
/// Stopping a task only flags it; the entry is pruned at the end of the
/// next tick pass so an in-progress iteration is never corrupted.
///
/// [`next_deadline`]: TaskRunner::next_deadline
/// [`poll`]: TaskRunner::poll
/// [`on_tick`]: TaskRunner::on_tick
pub struct TaskRunner {
    interval: Duration,
    clock: Rc<dyn Clock>,
    tasks: SmallVec<[TaskEntry; 4]>,
    next_id: u64,
    next_expires: Option<Instant>,
    firing: bool,
}

/// Handed to task callbacks; gives them their identity, the current run
/// count, and mutable access to the runner so they may start, stop, or
/// restart tasks mid-tick.
pub struct TickContext<'a> {
    pub(crate) runner: &'a mut TaskRunner,
    pub(crate) task: TaskId,
    pub(crate) run_count: u32,
}

impl TickContext<'_> {
    pub fn task_id(&self) -> TaskId {
        self.task
    }

    /// Invocation count including the in-progress run.
    pub fn run_count(&self) -> u32 {
        self.run_count
    }

    pub fn runner(&mut self) -> &mut TaskRunner {
        self.runner
    }
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::with_clock(DEFAULT_INTERVAL, Rc::new(SystemClock))
    }

    /// `interval` is the runner's granularity: polls are never requested
    /// closer together than this, and deadline improvements smaller than
    /// it do not reschedule the armed timer.
    pub fn with_interval(interval: Duration) -> Self {
        Self::with_clock(interval, Rc::new(SystemClock))
    }

    pub fn with_clock(interval: Duration, clock: Rc<dyn Clock>) -> Self {
        Self {
            interval,
            clock,
            tasks: SmallVec::new(),
            next_id: 0,
            next_expires: None,
            firing: false,
        }
    }

    /// Registers and starts a task. The first invocation happens on the
    /// first tick after `start` when `fire_on_start` is set, otherwise one
    /// interval later.
    pub fn start(
        &mut self,
        config: TaskConfig,
        runnable: Box<dyn Runnable>,
    ) -> Result<TaskId, TimerError> {
        if config.interval.is_zero() {
            return Err(TimerError::ZeroInterval);
        }

        let id = TaskId(self.next_id);
        self.next_id += 1;

        let now = self.clock.now();
        let fire_on_start = config.fire_on_start;
        let interval = config.interval;

        self.tasks.push(TaskEntry {
            id,
            config,
            runnable: Some(runnable),
            started_at: now,
            last_run_at: if fire_on_start { None } else { Some(now) },
            run_count: 0,
            stopped: false,
            on_stop_pending: false,
        });

        if !self.firing {
            let delay = if fire_on_start { Duration::ZERO } else { interval };
            self.arm(delay, now);
        }

        tracing::debug!(task = ?id, ?interval, fire_on_start, "task started");
        Ok(id)
    }

    /// Restarts a live task, clearing its run count, lifetime, and stopped
    /// flag. Only works until the entry is pruned; after that the task is
    /// gone and must be `start`ed anew.
    pub fn restart(&mut self, id: TaskId, interval: Option<Duration>) -> Result<(), TimerError> {
        if let Some(interval) = interval {
            if interval.is_zero() {
                return Err(TimerError::ZeroInterval);
            }
        }

        let now = self.clock.now();
        let entry = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TimerError::UnknownTask)?;

        if let Some(interval) = interval {
            entry.config.interval = interval;
        }
        entry.stopped = false;
        entry.on_stop_pending = false;
        entry.started_at = now;
        entry.run_count = 0;
        entry.last_run_at = if entry.config.fire_on_start {
            None
        } else {
            Some(now)
        };

        let delay = if entry.config.fire_on_start {
            Duration::ZERO
        } else {
            entry.config.interval
        };
        if !self.firing {
            self.arm(delay, now);
        }
        Ok(())
    }

    /// Flags the task stopped and fires its `on_stop` hook. The entry is
    /// not removed here; pruning happens at the end of the next tick pass.
    pub fn stop(&mut self, id: TaskId) -> bool {
        if let Some(entry) = self.tasks.iter_mut().find(|t| t.id == id) {
            if !entry.stopped {
                entry.stopped = true;
                match entry.runnable.as_mut() {
                    Some(runnable) => runnable.on_stop(),
                    // stopped from inside its own run; hook fires on reattach
                    None => entry.on_stop_pending = true,
                }
                tracing::debug!(task = ?id, "task stopped");
                return true;
            }
        }
        false
    }

    pub fn stop_all(&mut self) {
        let ids: Vec<TaskId> = self.tasks.iter().map(|t| t.id).collect();
        for id in ids {
            self.stop(id);
        }
    }

    /// Number of tasks that have not been stopped.
    pub fn active_tasks(&self) -> usize {
        self.tasks.iter().filter(|t| !t.stopped).count()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_expires
    }

    /// Runs a tick pass if the armed deadline has expired. Returns whether
    /// a pass ran.
    pub fn poll(&mut self) -> bool {
        match self.next_expires {
            Some(deadline) if deadline <= self.clock.now() => {
                self.on_tick();
                true
            }
            _ => false,
        }
    }

    /// One pass over the task list. Due tasks are invoked; tasks started by
    /// callbacks are appended and visited in the same pass. Stopped tasks
    /// are pruned afterwards and a single deadline is re-armed at the
    /// earliest surviving expiration.
    pub fn on_tick(&mut self) {
        if self.firing {
            tracing::warn!("tick re-entered from a task callback; ignoring");
            return;
        }

        let now = self.clock.now();
        self.next_expires = None;
        self.firing = true;

        let mut next_due: Option<Instant> = None;

        // Index loop: callbacks may push new tasks, so the length is
        // re-checked every iteration. Nothing is removed during the pass.
        let mut i = 0;
        while i < self.tasks.len() {
            let id = self.tasks[i].id;

            if !self.tasks[i].stopped {
                if self.tasks[i].next_expiry(now) <= now {
                    self.tasks[i].run_count += 1;
                    self.tasks[i].last_run_at = Some(now);
                    let run_count = self.tasks[i].run_count;

                    if let Some(mut runnable) = self.tasks[i].runnable.take() {
                        let outcome = runnable.run(&mut TickContext {
                            runner: self,
                            task: id,
                            run_count,
                        });

                        let entry = &mut self.tasks[i];
                        entry.runnable = Some(runnable);
                        if entry.on_stop_pending {
                            entry.on_stop_pending = false;
                            if let Some(runnable) = entry.runnable.as_mut() {
                                runnable.on_stop();
                            }
                        }

                        match outcome {
                            Ok(TaskOutcome::Continue) => {}
                            Ok(TaskOutcome::Stop) => {
                                self.stop(id);
                            }
                            Err(error) => {
                                tracing::error!(task = ?id, %error, "task callback failed");
                                if let Some(runnable) = self.tasks[i].runnable.as_mut() {
                                    runnable.on_error(&error);
                                }
                            }
                        }
                    }

                    let reached_repeat = {
                        let entry = &self.tasks[i];
                        !entry.stopped && entry.config.repeat == Some(entry.run_count)
                    };
                    if reached_repeat {
                        self.stop(id);
                    }
                }

                // Lifetime applies on every tick, due or not.
                let expired = {
                    let entry = &self.tasks[i];
                    !entry.stopped
                        && entry
                            .config
                            .duration
                            .is_some_and(|d| now.duration_since(entry.started_at) >= d)
                };
                if expired {
                    self.stop(id);
                }
            }

            let entry = &self.tasks[i];
            if !entry.stopped {
                let expires = entry.next_expiry(now);
                next_due = Some(next_due.map_or(expires, |d| d.min(expires)));
            }

            i += 1;
        }

        self.firing = false;
        self.tasks.retain(|t| !t.stopped);

        if let Some(deadline) = next_due {
            // Base the delay on the time after the callbacks, which may
            // have taken a while.
            let after = self.clock.now();
            self.arm(deadline.saturating_duration_since(after), after);
        }
    }

    /// Arms the shared deadline, clamped to the runner's granularity. An
    /// already-armed deadline is only pulled in when the improvement
    /// exceeds the granularity, so near-simultaneous requests coalesce
    /// instead of thrashing the timer.
    fn arm(&mut self, timeout: Duration, now: Instant) {
        let requested = now + timeout;

        if let Some(current) = self.next_expires {
            if current > requested && current - requested > self.interval {
                self.next_expires = None;
            }
        }

        if self.next_expires.is_none() {
            self.next_expires = Some(now + timeout.max(self.interval));
        }
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}
