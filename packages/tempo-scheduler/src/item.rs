use slotmap::new_key_type;

use crate::error::SchedulerError;
use crate::scheduler::Reaction;
use crate::sort::SortPass;

new_key_type! {
    /// Key of an item within the scheduler that owns it. Ids from one
    /// scheduler are meaningless to another.
    pub struct ItemId;
}

/// A unit of deferred work with declared dependencies.
///
/// Items are owned by a [`crate::Scheduler`]. Requesting service is done
/// through the scheduler (or a [`Reaction`] during a firing pass), not on
/// the item itself.
pub trait Schedulable {
    /// Label used in cycle reports and logs.
    fn name(&self) -> &str {
        "schedulable"
    }

    /// Advisory key consulted by pre-sort comparators such as
    /// [`crate::scheduler::pre_sort_by_rank`]. Has no effect unless the
    /// scheduler is configured with a pre-sort.
    fn rank(&self) -> i64 {
        0
    }

    /// Declares the items this one depends on by visiting them through
    /// `pass`. Every item visited here is ordered before this item. The
    /// default declares nothing.
    fn sort(&self, _pass: &mut SortPass<'_>) -> Result<(), SchedulerError> {
        Ok(())
    }

    /// Invoked when the item's turn comes in a notify pass. May schedule
    /// further work (including this item) through `cx`.
    fn react(&mut self, cx: &mut Reaction<'_>);
}
