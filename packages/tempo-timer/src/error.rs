use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimerError {
    /// A zero interval would make the runner spin on every poll.
    #[error("task interval must be non-zero")]
    ZeroInterval,

    /// The id does not name a live task. Stopped tasks are pruned on the
    /// tick after they stop, so a stale id lands here.
    #[error("unknown task id")]
    UnknownTask,
}
