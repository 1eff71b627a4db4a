//! FIFO of commands submitted while the channel is not open.
//!
//! Nothing is dropped or reordered. The queue is unbounded and survives an
//! explicit close. An open channel takes entries one at a time, so whatever
//! was not yet handed over when the channel drops stays queued.

use std::collections::VecDeque;

use super::message::Command;

#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    pending: VecDeque<Command>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command to the back of the queue.
    pub fn enqueue(&mut self, command: Command) {
        self.pending.push_back(command);
    }

    /// Removes and returns the oldest command.
    pub fn dequeue(&mut self) -> Option<Command> {
        self.pending.pop_front()
    }

    /// Removes and returns every queued command in submission order.
    pub fn drain(&mut self) -> Vec<Command> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Borrowing view in submission order.
    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.pending.iter()
    }
}
