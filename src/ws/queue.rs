//! Outbound queue for commands issued while the connection is down.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use super::types::request::Command;

/// A command waiting for the connection to come up.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub command: Command,
    pub enqueued_at: DateTime<Utc>,
}

impl OutboundMessage {
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            command,
            enqueued_at: Utc::now(),
        }
    }
}

/// Result of [`Connection::send`](crate::ws::Connection::send).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The connection was up; the command went straight to the transport
    Sent,
    /// The connection was down; the command will be sent once it is re-established
    Queued,
    /// A heartbeat `ping` while disconnected; pings are never queued
    Skipped,
}

/// Bounded FIFO of pending commands. Overflow drops the oldest entry.
#[derive(Debug)]
pub struct OutboundQueue {
    capacity: usize,
    messages: VecDeque<OutboundMessage>,
    dropped: u64,
}

impl OutboundQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            messages: VecDeque::new(),
            dropped: 0,
        }
    }

    /// Append a message, returning the entry evicted to make room, if any.
    ///
    /// A zero-capacity queue keeps nothing: the pushed message itself is returned.
    pub fn push(&mut self, message: OutboundMessage) -> Option<OutboundMessage> {
        if self.capacity == 0 {
            self.dropped = self.dropped.saturating_add(1);
            return Some(message);
        }

        let evicted = if self.messages.len() >= self.capacity {
            self.dropped = self.dropped.saturating_add(1);
            self.messages.pop_front()
        } else {
            None
        };
        self.messages.push_back(message);
        evicted
    }

    /// Put a message back at the head of the queue (used when a flush is interrupted).
    pub fn requeue_front(&mut self, message: OutboundMessage) {
        if self.messages.len() >= self.capacity {
            self.dropped = self.dropped.saturating_add(1);
            return;
        }
        self.messages.push_front(message);
    }

    pub fn pop(&mut self) -> Option<OutboundMessage> {
        self.messages.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total messages discarded because the queue was full.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(n: usize) -> OutboundMessage {
        OutboundMessage::new(Command::subscribe_token(format!("0x{n}")))
    }

    fn drain(queue: &mut OutboundQueue) -> Vec<Command> {
        std::iter::from_fn(|| queue.pop())
            .map(|message| message.command)
            .collect()
    }

    #[test]
    fn drains_in_fifo_order() {
        let mut queue = OutboundQueue::new(10);
        for n in 0..3 {
            assert!(queue.push(token(n)).is_none());
        }

        assert_eq!(
            drain(&mut queue),
            vec![
                Command::subscribe_token("0x0"),
                Command::subscribe_token("0x1"),
                Command::subscribe_token("0x2"),
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut queue = OutboundQueue::new(2);
        queue.push(token(0));
        queue.push(token(1));

        let evicted = queue.push(token(2)).unwrap();

        assert_eq!(evicted.command, Command::subscribe_token("0x0"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(
            drain(&mut queue),
            vec![
                Command::subscribe_token("0x1"),
                Command::subscribe_token("0x2"),
            ]
        );
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut queue = OutboundQueue::new(0);

        assert!(queue.push(token(0)).is_some());
        assert!(queue.is_empty());
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn requeue_front_restores_head() {
        let mut queue = OutboundQueue::new(5);
        queue.push(token(0));
        queue.push(token(1));

        let head = queue.pop().unwrap();
        queue.requeue_front(head);

        assert_eq!(queue.pop().unwrap().command, Command::subscribe_token("0x0"));
    }
}
