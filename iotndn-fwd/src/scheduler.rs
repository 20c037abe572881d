use std::collections::VecDeque;
use std::fmt;

use log::trace;

use crate::forwarder::Forwarder;
use crate::slots::CapacityError;

pub type Task = Box<dyn FnOnce(&mut Forwarder)>;

struct ScheduledTask {
    due_ms: u64,
    task: Task,
}

/// Bounded FIFO of deferred tasks, drained by `Forwarder::process`
pub struct Scheduler {
    queue: VecDeque<ScheduledTask>,
    capacity: usize,
}

impl Scheduler {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn schedule(&mut self, due_ms: u64, task: Task) -> Result<(), CapacityError> {
        if self.queue.len() >= self.capacity {
            return Err(CapacityError(self.capacity));
        }
        trace!("Scheduled task due at {}", due_ms);
        self.queue.push_back(ScheduledTask { due_ms, task });
        Ok(())
    }

    /// Remove and return every task due at `now_ms`, in submission order.
    /// Tasks that are not yet due keep their place in the queue.
    pub fn take_due(&mut self, now_ms: u64) -> Vec<Task> {
        let mut due = Vec::new();
        let mut pending = VecDeque::with_capacity(self.queue.len());
        for scheduled in self.queue.drain(..) {
            if scheduled.due_ms <= now_ms {
                due.push(scheduled.task);
            } else {
                pending.push_back(scheduled);
            }
        }
        self.queue = pending;
        due
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.queue.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
