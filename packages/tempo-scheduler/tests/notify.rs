mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{TestItem, concat, joined, new_log};
use tempo_scheduler::{
    CyclePolicy, ItemId, Reaction, Scheduler, SchedulerConfig, SchedulerError,
};

type IdCell = Rc<Cell<Option<ItemId>>>;

fn id_cell() -> IdCell {
    Rc::new(Cell::new(None))
}

#[test]
fn items_scheduled_downstream_fire_in_the_same_pass() {
    let log = new_log();
    let mut scheduler = Scheduler::new();

    let mut item1 = TestItem::new("item1", &log);
    let item2 = TestItem::new("item2", &log);
    let item2_depends = item2.depends.clone();

    let id2_cell = id_cell();
    let captured = id2_cell.clone();
    item1.on_react = Some(Box::new(move |cx: &mut Reaction<'_>| {
        cx.schedule(captured.get().unwrap()).unwrap();
    }));

    let id1 = scheduler.add(Box::new(item1));
    let id2 = scheduler.add(Box::new(item2));
    item2_depends.borrow_mut().push(id1);
    id2_cell.set(Some(id2));

    scheduler.schedule(id1).unwrap();
    scheduler.notify().unwrap();

    assert_eq!(joined(&log), "item1/item2");
    assert_eq!(scheduler.passes(), 1);
}

#[test]
fn items_scheduled_upstream_wait_for_the_next_pass() {
    let log = new_log();
    let mut scheduler = Scheduler::new();

    let item1 = TestItem::new("item1", &log);
    let mut item2 = TestItem::new("item2", &log);
    let item2_depends = item2.depends.clone();

    let id1_cell = id_cell();
    let captured = id1_cell.clone();
    item2.on_react = Some(Box::new(move |cx: &mut Reaction<'_>| {
        cx.schedule(captured.get().unwrap()).unwrap();
    }));

    let id1 = scheduler.add(Box::new(item1));
    let id2 = scheduler.add(Box::new(item2));
    item2_depends.borrow_mut().push(id1);
    id1_cell.set(Some(id1));

    scheduler.schedule(id2).unwrap();
    scheduler.notify().unwrap();

    assert_eq!(joined(&log), "item2/item1");
    assert_eq!(scheduler.passes(), 2);
}

#[test]
fn an_item_rescheduling_itself_fires_again_next_pass() {
    let log = new_log();
    let mut scheduler = Scheduler::new();

    let item1 = TestItem::new("item1", &log);
    let mut item2 = TestItem::new("item2", &log);
    let item2_depends = item2.depends.clone();

    let again = Cell::new(true);
    item2.on_react = Some(Box::new(move |cx: &mut Reaction<'_>| {
        if again.replace(false) {
            cx.schedule_self();
        }
    }));

    let id1 = scheduler.add(Box::new(item1));
    let id2 = scheduler.add(Box::new(item2));
    item2_depends.borrow_mut().push(id1);

    scheduler.schedule(id2).unwrap();
    scheduler.notify().unwrap();

    assert_eq!(joined(&log), "item2/item2");
    assert_eq!(scheduler.passes(), 2);
    assert!(!scheduler.is_scheduled(id2));
}

/// Two items endlessly rescheduling each other are cut off by the pass
/// budget; what is left over carries to the next call.
#[test]
fn truncate_policy_defers_runaway_rescheduling() {
    let log = new_log();
    let mut scheduler = Scheduler::with_config(SchedulerConfig {
        cycle_limit: 4,
        ..SchedulerConfig::default()
    });

    let mut a = TestItem::new("A", &log);
    let mut b = TestItem::new("B", &log);
    let b_depends = b.depends.clone();

    let id_a_cell = id_cell();
    let id_b_cell = id_cell();

    let captured = id_b_cell.clone();
    a.on_react = Some(Box::new(move |cx: &mut Reaction<'_>| {
        cx.schedule(captured.get().unwrap()).unwrap();
    }));
    let captured = id_a_cell.clone();
    b.on_react = Some(Box::new(move |cx: &mut Reaction<'_>| {
        cx.schedule(captured.get().unwrap()).unwrap();
    }));

    let id_a = scheduler.add(Box::new(a));
    let id_b = scheduler.add(Box::new(b));
    b_depends.borrow_mut().push(id_a);
    id_a_cell.set(Some(id_a));
    id_b_cell.set(Some(id_b));

    scheduler.schedule(id_b).unwrap();
    scheduler.notify().unwrap();

    assert_eq!(concat(&log), "BABABAB");
    assert_eq!(scheduler.passes(), 4);
    assert_eq!(scheduler.scheduled_count(), 1);

    scheduler.notify().unwrap();

    assert_eq!(concat(&log), "BABABABABABABAB");
    assert_eq!(scheduler.passes(), 8);
}

#[test]
fn error_policy_reports_an_exhausted_pass_budget() {
    let log = new_log();
    let mut scheduler = Scheduler::with_config(SchedulerConfig {
        cycle_limit: 2,
        cycle_policy: CyclePolicy::Error,
        ..SchedulerConfig::default()
    });

    let mut a = TestItem::new("A", &log);
    let mut b = TestItem::new("B", &log);
    let b_depends = b.depends.clone();

    let id_a_cell = id_cell();
    let id_b_cell = id_cell();

    let captured = id_b_cell.clone();
    a.on_react = Some(Box::new(move |cx: &mut Reaction<'_>| {
        cx.schedule(captured.get().unwrap()).unwrap();
    }));
    let captured = id_a_cell.clone();
    b.on_react = Some(Box::new(move |cx: &mut Reaction<'_>| {
        cx.schedule(captured.get().unwrap()).unwrap();
    }));

    let id_a = scheduler.add(Box::new(a));
    let id_b = scheduler.add(Box::new(b));
    b_depends.borrow_mut().push(id_a);
    id_a_cell.set(Some(id_a));
    id_b_cell.set(Some(id_b));

    scheduler.schedule(id_b).unwrap();

    assert_eq!(
        scheduler.notify(),
        Err(SchedulerError::CycleLimitExceeded { limit: 2 })
    );
}

#[test]
fn a_reaction_may_remove_a_still_pending_item() {
    let log = new_log();
    let mut scheduler = Scheduler::new();

    let mut first = TestItem::new("first", &log);
    let second = TestItem::new("second", &log);
    let second_depends = second.depends.clone();

    let victim_cell = id_cell();
    let captured = victim_cell.clone();
    first.on_react = Some(Box::new(move |cx: &mut Reaction<'_>| {
        cx.remove(captured.get().unwrap()).unwrap();
    }));

    let id_first = scheduler.add(Box::new(first));
    let id_second = scheduler.add(Box::new(second));
    second_depends.borrow_mut().push(id_first);
    victim_cell.set(Some(id_second));

    scheduler.schedule(id_first).unwrap();
    scheduler.schedule(id_second).unwrap();
    scheduler.notify().unwrap();

    // The removed item never fires even though it was scheduled.
    assert_eq!(joined(&log), "first");
    assert!(!scheduler.contains(id_second));
    assert_eq!(scheduler.scheduled_count(), 0);
}

#[test]
fn a_reaction_may_add_and_schedule_a_new_item() {
    let log = new_log();
    let mut scheduler = Scheduler::new();

    let mut seed = TestItem::new("seed", &log);
    let spawn_log = log.clone();
    seed.on_react = Some(Box::new(move |cx: &mut Reaction<'_>| {
        let spawned = TestItem::new("spawned", &spawn_log);
        let id = cx.add(Box::new(spawned));
        cx.schedule(id).unwrap();
    }));

    let id = scheduler.add(Box::new(seed));
    scheduler.schedule(id).unwrap();

    assert_eq!(scheduler.sorts(), 0);
    scheduler.notify().unwrap();

    // The addition invalidates the order, so the new item fires in a
    // freshly sorted second pass.
    assert_eq!(joined(&log), "seed/spawned");
    assert_eq!(scheduler.passes(), 2);
    assert_eq!(scheduler.sorts(), 2);
}

#[test]
fn an_item_may_remove_itself_while_reacting() {
    let log = new_log();
    let mut scheduler = Scheduler::new();

    let mut item = TestItem::new("ephemeral", &log);
    item.on_react = Some(Box::new(|cx: &mut Reaction<'_>| {
        cx.remove_self();
    }));

    let id = scheduler.add(Box::new(item));
    scheduler.schedule(id).unwrap();
    scheduler.notify().unwrap();

    assert_eq!(joined(&log), "ephemeral");
    assert!(!scheduler.contains(id));
    assert_eq!(scheduler.schedule(id), Err(SchedulerError::UnknownItem));
}

#[test]
fn notify_with_nothing_scheduled_is_a_no_op() {
    let log = new_log();
    let mut scheduler = Scheduler::new();
    scheduler.add(Box::new(TestItem::new("quiet", &log)));

    scheduler.notify().unwrap();

    assert!(log.borrow().is_empty());
    assert_eq!(scheduler.passes(), 0);
    assert_eq!(scheduler.sorts(), 0);
}
