//! Dependency-ordered batch scheduler.
//!
//! Work items implement [`Schedulable`] and live inside a [`Scheduler`].
//! Calling [`Scheduler::schedule`] flags an item for service; when the
//! scheduler's tick fires, every flagged item has its `react` method
//! invoked exactly once per pass, in the order determined by a topological
//! sort over the dependencies each item declares in its `sort` method.
//!
//! The model is single-threaded and cooperative: the host drives the
//! scheduler with [`Scheduler::poll`] (or calls [`Scheduler::notify`]
//! directly) and nothing ever blocks.

pub mod error;
pub mod item;
pub mod scheduler;
pub mod sort;

pub use error::SchedulerError;
pub use item::{ItemId, Schedulable};
pub use scheduler::{CyclePolicy, PreSort, Reaction, Scheduler, SchedulerConfig, pre_sort_by_rank};
pub use sort::SortPass;
