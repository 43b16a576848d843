// Deferred-action queue bridging receive threads and the consumer loop.
//
// Receive threads must never touch entity state directly — the consumer
// side owns it single-threaded. Instead they enqueue a closure here, and
// the consumer drains the queue once per tick on its own thread. The queue
// is the only hand-off point between the transport and the state it feeds:
// FIFO per producer, every action runs exactly once, and no two actions
// from the same queue ever run concurrently.
//
// `drain` swaps the whole backlog out under the lock and runs it after
// release. A panicking action therefore unwinds into the consumer loop
// without wedging the queue: the remainder of that batch is dropped with
// the unwind, and the next pass starts from whatever was enqueued since.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

type Action = Box<dyn FnOnce() + Send>;

/// Thread-safe FIFO of deferred actions with a single designated consumer.
#[derive(Default)]
pub struct TaskQueue {
    backlog: Mutex<VecDeque<Action>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action. Callable from any thread; never blocks beyond the
    /// lock hold and never fails.
    pub fn enqueue(&self, action: impl FnOnce() + Send + 'static) {
        self.lock().push_back(Box::new(action));
    }

    /// Run every action queued so far, in order, on the calling thread.
    /// Only the designated consumer thread may call this. Returns how many
    /// actions ran.
    pub fn drain(&self) -> usize {
        let batch = std::mem::take(&mut *self.lock());
        let count = batch.len();
        for action in batch {
            action();
        }
        count
    }

    /// Number of actions currently waiting.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Action>> {
        self.backlog.lock().expect("task queue lock poisoned")
    }
}
