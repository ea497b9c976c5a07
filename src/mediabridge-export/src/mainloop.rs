//! Timer scheduling on the gateway's single-threaded event loop.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

pub type Task = Box<dyn FnOnce()>;

/// One-shot timers driven by the event loop.
///
/// Tasks always run from the loop itself, never from inside `schedule`.
pub trait Scheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancelling a timer that already fired is a no-op.
    fn cancel(&self, id: TimerId);

    /// Runs `task` on the next loop iteration.
    fn idle(&self, task: Task) -> TimerId {
        self.schedule(Duration::ZERO, task)
    }
}

/// Scheduler backed by tokio local tasks.
///
/// Must be used from within a [`tokio::task::LocalSet`].
#[derive(Debug, Default)]
pub struct LocalScheduler {
    next_id: Cell<u64>,
    pending: Rc<RefCell<HashMap<TimerId, JoinHandle<()>>>>,
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl Scheduler for LocalScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let pending = Rc::clone(&self.pending);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            pending.borrow_mut().remove(&id);
            task();
        });
        self.pending.borrow_mut().insert(id, handle);
        id
    }

    fn cancel(&self, id: TimerId) {
        if let Some(handle) = self.pending.borrow_mut().remove(&id) {
            handle.abort();
        }
    }
}

/// Scheduler with a virtual clock that only moves when told to.
///
/// Used by tests and by hosts that drive time themselves.
#[derive(Default)]
pub struct ManualScheduler {
    now: Cell<Duration>,
    next_id: Cell<u64>,
    queue: RefCell<BTreeMap<(Duration, TimerId), Task>>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.now.get())
            .field("pending", &self.queue.borrow().len())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Moves the clock forward, running every task that falls due in order.
    /// Tasks scheduled while advancing run too if they are due in time.
    pub fn advance(&self, by: Duration) {
        let target = self.now.get() + by;
        loop {
            let due = {
                let mut queue = self.queue.borrow_mut();
                let ready = queue
                    .first_key_value()
                    .map_or(false, |(&(at, _), _)| at <= target);
                if ready {
                    queue.pop_first()
                } else {
                    None
                }
            };
            let Some(((at, _), task)) = due else { break };
            self.now.set(at);
            task();
        }
        self.now.set(target);
    }

    /// Runs tasks that are already due without moving the clock.
    pub fn run_pending(&self) {
        self.advance(Duration::ZERO);
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.queue
            .borrow_mut()
            .insert((self.now.get() + delay, id), task);
        id
    }

    fn cancel(&self, id: TimerId) {
        self.queue.borrow_mut().retain(|(_, queued), _| *queued != id);
    }
}
