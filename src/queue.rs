use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::warn;

use crate::task::Task;

/// Pending-work buffer: any number of concurrent producers, one consumer
/// (the scheduler control loop) draining non-blockingly.
pub struct TaskQueue {
    tx: Sender<Task>,
    rx: Receiver<Task>,
}

/// Cloneable producer handle for enqueueing from outside the control
/// loop.
#[derive(Clone)]
pub struct QueueProducer {
    tx: Sender<Task>,
}

impl QueueProducer {
    pub fn push(&self, task: Task) {
        if self.tx.send(task).is_err() {
            warn!("task queue closed; dropping enqueued task");
        }
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn producer(&self) -> QueueProducer {
        QueueProducer { tx: self.tx.clone() }
    }

    pub fn push(&self, task: Task) {
        if self.tx.send(task).is_err() {
            warn!("task queue closed; dropping enqueued task");
        }
    }

    /// Take every currently queued task without blocking, preserving
    /// arrival order.
    pub fn drain(&self) -> Vec<Task> {
        let mut drained = Vec::new();
        while let Ok(task) = self.rx.try_recv() {
            drained.push(task);
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
