use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// The dependency graph has no valid execution order. `chain` is the
    /// path of item names from the first repeated item back to itself.
    #[error("dependency cycle detected: {}", chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    /// The id does not name an item owned by this scheduler.
    #[error("item does not belong to this scheduler")]
    UnknownItem,

    /// Structural removal would corrupt an in-progress sort.
    #[error("items cannot be removed during a sort")]
    RemoveDuringSort,

    /// `notify` was invoked from inside a firing pass.
    #[error("notify cannot be called recursively")]
    NotifyReentered,

    /// Raised under [`crate::CyclePolicy::Error`] when one `notify` call
    /// exhausts its pass budget; remaining items stay scheduled.
    #[error("exceeded cycle limit of {limit} passes")]
    CycleLimitExceeded { limit: u32 },
}
