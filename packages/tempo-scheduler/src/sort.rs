use std::cmp::Ordering;

use crate::error::SchedulerError;
use crate::item::{ItemId, Schedulable};
use crate::scheduler::Scheduler;

/// Visitation state during a sort. Unvisited items are absent from the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SortMark {
    InProgress,
    Done,
}

/// Handed to an item's `sort`; the only way to declare dependencies.
///
/// Visiting item B from item A's `sort` guarantees B is ordered before A.
/// A pass may also register items that were not previously known to the
/// scheduler and visit them in the same sort.
pub struct SortPass<'a> {
    pub(crate) scheduler: &'a mut Scheduler,
}

impl SortPass<'_> {
    /// Declares a dependency on one item and orders it now if it has not
    /// been visited yet. Detects cycles.
    pub fn sort_item(&mut self, id: ItemId) -> Result<(), SchedulerError> {
        self.scheduler.sort_item(id)
    }

    /// Bulk form of [`sort_item`](Self::sort_item).
    pub fn sort_items(&mut self, ids: &[ItemId]) -> Result<(), SchedulerError> {
        for &id in ids {
            self.scheduler.sort_item(id)?;
        }
        Ok(())
    }

    /// Registers a new item mid-sort; it is picked up by this sort.
    pub fn add(&mut self, item: Box<dyn Schedulable>) -> ItemId {
        self.scheduler.add(item)
    }
}

impl Scheduler {
    /// Recomputes the topological order of all items. Called lazily by
    /// `notify` whenever the cached order has been invalidated; may be
    /// called directly to force a resort.
    ///
    /// On a cycle the cached order stays invalidated; a partial order is
    /// never published.
    pub fn sort(&mut self) -> Result<(), SchedulerError> {
        self.sorts += 1;
        self.sorting = true;
        self.sort_map.clear();
        self.sort_stack.clear();
        self.ordered = Some(Vec::with_capacity(self.items.len()));

        let result = self.run_sort();

        self.sorting = false;
        self.sort_map.clear();
        self.sort_stack.clear();
        if result.is_err() {
            self.ordered = None;
        }
        result
    }

    fn run_sort(&mut self) -> Result<(), SchedulerError> {
        // Items can be registered while the sort runs, so re-scan until
        // every known item has been visited.
        loop {
            let mut pending: Vec<ItemId> = self
                .items
                .keys()
                .filter(|id| !self.sort_map.contains_key(id))
                .collect();
            if pending.is_empty() {
                return Ok(());
            }

            if let Some(compare) = self.pre_sort.as_ref() {
                pending.sort_by(|&a, &b| {
                    match (self.items[a].item.as_deref(), self.items[b].item.as_deref()) {
                        (Some(lhs), Some(rhs)) => compare(lhs, rhs),
                        _ => Ordering::Equal,
                    }
                });
            }

            for id in pending {
                if !self.sort_map.contains_key(&id) {
                    self.sort_item(id)?;
                }
            }
        }
    }

    /// Visit one item: depth-first over its declared dependencies, then
    /// append it to the order. Re-entering an in-progress item means the
    /// declarations form a cycle.
    pub(crate) fn sort_item(&mut self, id: ItemId) -> Result<(), SchedulerError> {
        match self.sort_map.get(&id) {
            Some(SortMark::Done) => return Ok(()),
            Some(SortMark::InProgress) => return Err(self.cycle_error(id)),
            None => {}
        }
        if !self.items.contains_key(id) {
            return Err(SchedulerError::UnknownItem);
        }

        self.sort_map.insert(id, SortMark::InProgress);
        self.sort_stack.push(id);

        let boxed = self.items.get_mut(id).and_then(|entry| entry.item.take());
        let result = match boxed {
            Some(item) => {
                let result = item.sort(&mut SortPass { scheduler: self });
                if let Some(entry) = self.items.get_mut(id) {
                    entry.item = Some(item);
                }
                result
            }
            None => Ok(()),
        };

        self.sort_stack.pop();
        result?;

        self.sort_map.insert(id, SortMark::Done);
        if let Some(entry) = self.items.get_mut(id) {
            if let Some(ordered) = self.ordered.as_mut() {
                entry.order = Some(ordered.len());
                ordered.push(id);
            }
        }
        Ok(())
    }

    fn cycle_error(&self, id: ItemId) -> SchedulerError {
        let mut chain: Vec<String> = self
            .sort_stack
            .iter()
            .map(|&stacked| self.item_name(stacked))
            .collect();
        chain.push(self.item_name(id));
        SchedulerError::DependencyCycle { chain }
    }

    fn item_name(&self, id: ItemId) -> String {
        self.items
            .get(id)
            .map(|entry| entry.name.clone())
            .unwrap_or_else(|| String::from("<removed>"))
    }
}
