use std::cmp::Ordering;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;
use tempo_timer::{Clock, SystemClock};

use crate::error::SchedulerError;
use crate::item::{ItemId, Schedulable};
use crate::sort::SortMark;

/// Comparator applied to the raw item set before the dependency sort.
/// Dependencies still win: the pre-sort only breaks ties between items
/// with no edges between them.
pub type PreSort = Box<dyn Fn(&dyn Schedulable, &dyn Schedulable) -> Ordering>;

/// Pre-sort comparator ordering items by ascending [`Schedulable::rank`].
pub fn pre_sort_by_rank() -> PreSort {
    Box::new(|a, b| a.rank().cmp(&b.rank()))
}

/// What `notify` does when one call exhausts its pass budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePolicy {
    /// Log a warning and stop; still-scheduled items carry over to the
    /// next tick. Nothing is lost, only delayed.
    #[default]
    Truncate,
    /// Return [`SchedulerError::CycleLimitExceeded`].
    Error,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Maximum notify passes per `notify` call, guarding against runaway
    /// mutual re-scheduling.
    pub cycle_limit: u32,
    /// Delay between the first `schedule` request and the tick that
    /// services it.
    pub tick_delay: Duration,
    pub cycle_policy: CyclePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_limit: 5,
            tick_delay: Duration::from_millis(5),
            cycle_policy: CyclePolicy::Truncate,
        }
    }
}

pub(crate) struct ItemEntry {
    /// Taken out while the item's own `sort` or `react` runs, so those
    /// callbacks can borrow the scheduler mutably.
    pub(crate) item: Option<Box<dyn Schedulable>>,
    /// Cached for diagnostics; the live box may be detached when a cycle
    /// report is being built.
    pub(crate) name: String,
    pub(crate) scheduled: bool,
    /// Position assigned by the last completed sort.
    pub(crate) order: Option<usize>,
}

/// Bulk-schedules a set of [`Schedulable`] items and fires their `react`
/// methods in dependency order, once per tick.
pub struct Scheduler {
    pub(crate) items: SlotMap<ItemId, ItemEntry>,
    /// Cached topological order; `None` means a resort is needed.
    pub(crate) ordered: Option<Vec<ItemId>>,
    pub(crate) scheduled_count: usize,
    pub(crate) firing: bool,
    pub(crate) notify_index: Option<usize>,
    pub(crate) sorting: bool,
    /// Transient tri-state visitation map, only populated during a sort.
    pub(crate) sort_map: FxHashMap<ItemId, SortMark>,
    pub(crate) sort_stack: SmallVec<[ItemId; 8]>,
    pub(crate) pre_sort: Option<PreSort>,

    cycle_limit: u32,
    tick_delay: Duration,
    cycle_policy: CyclePolicy,

    clock: Rc<dyn Clock>,
    tick_at: Option<Instant>,

    busy_counter: i64,
    last_busy_counter: i64,
    busy_callbacks: Vec<Box<dyn FnMut()>>,
    idle_callbacks: Vec<Box<dyn FnMut()>>,

    passes: u64,
    pub(crate) sorts: u64,
}

/// Handed to an item's `react`; lets the reaction schedule itself or other
/// items, mutate the item set, and adjust the busy counter without
/// re-entering the firing loop.
pub struct Reaction<'a> {
    pub(crate) scheduler: &'a mut Scheduler,
    pub(crate) id: ItemId,
}

impl Reaction<'_> {
    /// Id of the item currently reacting.
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn schedule(&mut self, id: ItemId) -> Result<(), SchedulerError> {
        self.scheduler.schedule(id)
    }

    pub fn schedule_self(&mut self) {
        // The entry exists for as long as the item has not removed itself.
        let _ = self.scheduler.schedule(self.id);
    }

    pub fn unschedule(&mut self, id: ItemId) -> Result<(), SchedulerError> {
        self.scheduler.unschedule(id)
    }

    pub fn add(&mut self, item: Box<dyn Schedulable>) -> ItemId {
        self.scheduler.add(item)
    }

    /// Removes another item mid-pass. If that item was still scheduled in
    /// the current pass it will not fire.
    pub fn remove(&mut self, id: ItemId) -> Result<Option<Box<dyn Schedulable>>, SchedulerError> {
        self.scheduler.remove(id)
    }

    /// Removes the reacting item itself. Its box is currently detached and
    /// will be dropped when the reaction returns.
    pub fn remove_self(&mut self) {
        let _ = self.scheduler.remove(self.id);
    }

    pub fn adjust_busy(&mut self, adjustment: i64) {
        self.scheduler.adjust_busy(adjustment);
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self::with_clock(config, Rc::new(SystemClock))
    }

    pub fn with_clock(config: SchedulerConfig, clock: Rc<dyn Clock>) -> Self {
        Self {
            items: SlotMap::with_key(),
            ordered: None,
            scheduled_count: 0,
            firing: false,
            notify_index: None,
            sorting: false,
            sort_map: FxHashMap::default(),
            sort_stack: SmallVec::new(),
            pre_sort: None,
            cycle_limit: config.cycle_limit,
            tick_delay: config.tick_delay,
            cycle_policy: config.cycle_policy,
            clock,
            tick_at: None,
            busy_counter: 0,
            last_busy_counter: 0,
            busy_callbacks: Vec::new(),
            idle_callbacks: Vec::new(),
            passes: 0,
            sorts: 0,
        }
    }

    pub fn set_pre_sort(&mut self, pre_sort: PreSort) {
        self.pre_sort = Some(pre_sort);
        self.ordered = None;
    }

    //-------------------------------------------------------------------
    // Item registration

    /// Takes ownership of an item and registers it. Invalidates the cached
    /// order unless a sort is in progress, in which case the in-progress
    /// sort picks the item up itself.
    pub fn add(&mut self, item: Box<dyn Schedulable>) -> ItemId {
        let name = item.name().to_string();
        let id = self.items.insert(ItemEntry {
            item: Some(item),
            name,
            scheduled: false,
            order: None,
        });
        if !self.sorting {
            self.ordered = None;
        }
        id
    }

    /// Removes an item, returning its box. Returns `Ok(None)` when the item
    /// is removing itself from inside its own `react` (the box is detached
    /// at that moment and is dropped when the reaction returns).
    pub fn remove(&mut self, id: ItemId) -> Result<Option<Box<dyn Schedulable>>, SchedulerError> {
        if self.sorting {
            return Err(SchedulerError::RemoveDuringSort);
        }
        let mut entry = self
            .items
            .remove(id)
            .ok_or(SchedulerError::UnknownItem)?;
        if entry.scheduled {
            self.scheduled_count -= 1;
        }
        self.ordered = None;
        Ok(entry.item.take())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(id)
    }

    /// Position from the last completed sort, if any.
    pub fn order_of(&self, id: ItemId) -> Option<usize> {
        self.items.get(id).and_then(|e| e.order)
    }

    pub fn is_scheduled(&self, id: ItemId) -> bool {
        self.items.get(id).is_some_and(|e| e.scheduled)
    }

    //-------------------------------------------------------------------
    // Callback scheduling

    /// Flags an item for service on the next tick. Idempotent between
    /// ticks: flagging an already-scheduled item does nothing.
    pub fn schedule(&mut self, id: ItemId) -> Result<(), SchedulerError> {
        let firing = self.firing;
        let notify_index = self.notify_index;

        let entry = self.items.get_mut(id).ok_or(SchedulerError::UnknownItem)?;
        if entry.scheduled {
            return Ok(());
        }
        entry.scheduled = true;

        if firing {
            if let (Some(order), Some(index)) = (entry.order, notify_index) {
                if order <= index {
                    // Diagnostic only: the item re-enters the queue behind
                    // the cursor and costs an extra pass.
                    tracing::warn!(
                        item = %entry.name,
                        order,
                        index,
                        "suboptimal order: item scheduled at or behind the current notify position"
                    );
                }
            }
        }

        tracing::debug!(item = %entry.name, "item scheduled");
        self.scheduled_count += 1;

        if self.tick_at.is_none() && !self.firing {
            self.schedule_tick();
        }
        Ok(())
    }

    /// Clears an item's pending flag before its turn comes.
    pub fn unschedule(&mut self, id: ItemId) -> Result<(), SchedulerError> {
        let entry = self.items.get_mut(id).ok_or(SchedulerError::UnknownItem)?;
        if entry.scheduled {
            entry.scheduled = false;
            self.scheduled_count -= 1;
        }
        Ok(())
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled_count
    }

    /// Number of notify passes made over the queue since construction.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Number of dependency sorts performed since construction.
    pub fn sorts(&self) -> u64 {
        self.sorts
    }

    fn schedule_tick(&mut self) {
        if self.tick_at.is_none() {
            self.tick_at = Some(self.clock.now() + self.tick_delay);
        }
    }

    /// Deadline of the armed tick, for hosts integrating the scheduler
    /// into an event loop or a task runner.
    pub fn next_tick(&self) -> Option<Instant> {
        self.tick_at
    }

    /// Runs `notify` if the armed tick has expired. Returns whether it ran.
    pub fn poll(&mut self) -> Result<bool, SchedulerError> {
        match self.tick_at {
            Some(deadline) if deadline <= self.clock.now() => {
                self.notify()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Delivers every scheduled item, in dependency order, at most
    /// `cycle_limit` passes. Items scheduled downstream of the cursor fire
    /// in the same pass; items scheduled at or behind it carry to the next
    /// pass. Called automatically by `poll`; may also be called directly to
    /// force delivery.
    pub fn notify(&mut self) -> Result<(), SchedulerError> {
        self.tick_at = None;

        if self.firing {
            return Err(SchedulerError::NotifyReentered);
        }

        let result = self.run_notify();

        self.firing = false;
        self.notify_index = None;

        if result.is_ok() {
            self.resolve_busy_transition();
        }
        result
    }

    fn run_notify(&mut self) -> Result<(), SchedulerError> {
        let mut cycles_left = self.cycle_limit;

        while self.scheduled_count > 0 {
            if cycles_left == 0 {
                match self.cycle_policy {
                    CyclePolicy::Truncate => {
                        tracing::warn!(
                            limit = self.cycle_limit,
                            remaining = self.scheduled_count,
                            "cycle limit exceeded; deferring remaining items to the next tick"
                        );
                        return Ok(());
                    }
                    CyclePolicy::Error => {
                        return Err(SchedulerError::CycleLimitExceeded {
                            limit: self.cycle_limit,
                        });
                    }
                }
            }
            cycles_left -= 1;
            self.passes += 1;

            // Sort before firing: reactions in the previous pass may have
            // added or removed items.
            if self.ordered.is_none() {
                self.sort()?;
            }
            let queue = match self.ordered.clone() {
                Some(queue) => queue,
                None => break,
            };

            self.firing = true;
            for (index, &id) in queue.iter().enumerate() {
                let taken = match self.items.get_mut(id) {
                    Some(entry) if entry.scheduled => {
                        entry.scheduled = false;
                        Some(entry.item.take())
                    }
                    // Removed or not scheduled; the snapshot just skips it.
                    _ => None,
                };
                let Some(boxed) = taken else { continue };

                self.scheduled_count -= 1;
                self.notify_index = Some(index);

                if let Some(mut item) = boxed {
                    item.react(&mut Reaction {
                        scheduler: self,
                        id,
                    });
                    // Reattach unless the reaction removed the item.
                    if let Some(entry) = self.items.get_mut(id) {
                        entry.item = Some(item);
                    }
                }

                if self.scheduled_count == 0 {
                    break;
                }
            }
            self.firing = false;
        }
        Ok(())
    }

    //-------------------------------------------------------------------
    // Busy/idle state tracking

    /// Adjusts the count of busy contributors; `adjustment` should be `1`
    /// or `-1`. Going busy fires the `busy` callbacks synchronously. Going
    /// idle is deferred to the next tick so that one contributor ending
    /// exactly as another begins does not flap the state.
    pub fn adjust_busy(&mut self, adjustment: i64) {
        self.busy_counter += adjustment;

        if self.busy_counter > 0 {
            if self.last_busy_counter == 0 {
                self.last_busy_counter = self.busy_counter;
                self.fire_busy();
            }
        } else if self.last_busy_counter != 0 && self.tick_at.is_none() {
            self.schedule_tick();
        }
    }

    /// True if any contributor is busy, including a not-yet-confirmed
    /// transition back to idle.
    pub fn is_busy(&self) -> bool {
        !self.is_idle()
    }

    pub fn is_idle(&self) -> bool {
        self.busy_counter + self.last_busy_counter == 0
    }

    pub fn on_busy(&mut self, callback: Box<dyn FnMut()>) {
        self.busy_callbacks.push(callback);
    }

    pub fn on_idle(&mut self, callback: Box<dyn FnMut()>) {
        self.idle_callbacks.push(callback);
    }

    /// Runs at the end of `notify`, once everything queued up has been
    /// dispatched: if the counter settled at zero, this is the deferred
    /// busy-to-idle transition.
    fn resolve_busy_transition(&mut self) {
        if self.busy_counter != self.last_busy_counter {
            self.last_busy_counter = self.busy_counter;
            if self.busy_counter == 0 {
                self.fire_idle();
            }
        }
    }

    fn fire_busy(&mut self) {
        let mut callbacks = std::mem::take(&mut self.busy_callbacks);
        for callback in callbacks.iter_mut() {
            callback();
        }
        let late = std::mem::replace(&mut self.busy_callbacks, callbacks);
        self.busy_callbacks.extend(late);
    }

    fn fire_idle(&mut self) {
        let mut callbacks = std::mem::take(&mut self.idle_callbacks);
        for callback in callbacks.iter_mut() {
            callback();
        }
        let late = std::mem::replace(&mut self.idle_callbacks, callbacks);
        self.idle_callbacks.extend(late);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
