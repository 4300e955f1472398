//! Cooperative, single-threaded timer driver.
//!
//! A [`TaskRunner`] manages any number of independent periodic or
//! bounded-repeat tasks behind a single armed deadline. The host drives it
//! by calling [`TaskRunner::poll`] from its event loop; tasks never block
//! and a long-running callback simply delays its siblings.

pub mod clock;
pub mod error;
pub mod runner;
pub mod task;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TimerError;
pub use runner::{TaskRunner, TickContext};
pub use task::{Runnable, TaskConfig, TaskError, TaskId, TaskOutcome, task_fn};
