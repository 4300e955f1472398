use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tempo_scheduler::{ItemId, Reaction, Schedulable, Scheduler, SchedulerError, SortPass};

struct Leaf;

impl Schedulable for Leaf {
    fn react(&mut self, _cx: &mut Reaction<'_>) {
        black_box(());
    }
}

struct Link {
    dep: Option<ItemId>,
}

impl Schedulable for Link {
    fn sort(&self, pass: &mut SortPass<'_>) -> Result<(), SchedulerError> {
        if let Some(dep) = self.dep {
            pass.sort_item(dep)?;
        }
        Ok(())
    }

    fn react(&mut self, _cx: &mut Reaction<'_>) {
        black_box(());
    }
}

fn bench_schedule_and_notify(c: &mut Criterion) {
    c.bench_function("schedule_notify_1000_independent", |b| {
        b.iter(|| {
            let mut scheduler = Scheduler::new();
            let ids: Vec<ItemId> = (0..1000).map(|_| scheduler.add(Box::new(Leaf))).collect();
            for &id in &ids {
                scheduler.schedule(id).unwrap();
            }
            scheduler.notify().unwrap();
            black_box(scheduler.passes())
        })
    });
}

fn bench_chain_sort(c: &mut Criterion) {
    c.bench_function("dependency_chain_sort_1000", |b| {
        b.iter(|| {
            let mut scheduler = Scheduler::new();
            let mut prev = None;
            for _ in 0..1000 {
                prev = Some(scheduler.add(Box::new(Link { dep: prev })));
            }
            scheduler.sort().unwrap();
            black_box(scheduler.order_of(prev.unwrap()))
        })
    });
}

fn bench_resort_after_add(c: &mut Criterion) {
    c.bench_function("resort_after_single_add_1000", |b| {
        let mut scheduler = Scheduler::new();
        for _ in 0..1000 {
            scheduler.add(Box::new(Leaf));
        }
        scheduler.sort().unwrap();
        b.iter(|| {
            scheduler.add(Box::new(Leaf));
            scheduler.sort().unwrap();
            black_box(scheduler.len())
        })
    });
}

criterion_group!(
    benches,
    bench_schedule_and_notify,
    bench_chain_sort,
    bench_resort_after_add
);
criterion_main!(benches);
