#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use tempo_scheduler::{ItemId, Reaction, Schedulable, SchedulerError, SortPass};

pub type Log = Rc<RefCell<Vec<String>>>;
pub type ReactFn = Box<dyn FnMut(&mut Reaction<'_>)>;

/// Item that logs its name on react, declares its dependencies from a
/// shared handle (so tests can set them after ids are known), and runs an
/// optional extra reaction.
pub struct TestItem {
    pub name: String,
    pub rank: i64,
    pub depends: Rc<RefCell<Vec<ItemId>>>,
    pub log: Log,
    pub on_react: Option<ReactFn>,
}

impl TestItem {
    pub fn new(name: &str, log: &Log) -> Self {
        Self {
            name: name.to_string(),
            rank: 0,
            depends: Rc::new(RefCell::new(Vec::new())),
            log: log.clone(),
            on_react: None,
        }
    }
}

impl Schedulable for TestItem {
    fn name(&self) -> &str {
        &self.name
    }

    fn rank(&self) -> i64 {
        self.rank
    }

    fn sort(&self, pass: &mut SortPass<'_>) -> Result<(), SchedulerError> {
        pass.sort_items(&self.depends.borrow())
    }

    fn react(&mut self, cx: &mut Reaction<'_>) {
        self.log.borrow_mut().push(self.name.clone());
        if let Some(on_react) = self.on_react.as_mut() {
            on_react(cx);
        }
    }
}

pub fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn joined(log: &Log) -> String {
    log.borrow().join("/")
}

pub fn concat(log: &Log) -> String {
    log.borrow().concat()
}
