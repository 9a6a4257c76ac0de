//! Outbound frame queue.
//!
//! FIFO with head insertion. The send loop peeks the head, writes it, and
//! only then removes it by id, so a failed write leaves the item in place
//! and a concurrent head insertion cannot make it remove the wrong one.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

/// One queued wire buffer.
#[derive(Debug, Clone)]
pub(crate) struct Outbound {
    pub(crate) id: u64,
    pub(crate) wire: Bytes,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<Outbound>,
    next_id: u64,
    closed: bool,
}

#[derive(Default)]
pub(crate) struct OutboundQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl OutboundQueue {
    pub(crate) fn push_back(&self, wire: Bytes) -> u64 {
        self.push(wire, false)
    }

    pub(crate) fn push_front(&self, wire: Bytes) -> u64 {
        self.push(wire, true)
    }

    fn push(&self, wire: Bytes, first: bool) -> u64 {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        let item = Outbound { id, wire };
        if first {
            state.items.push_front(item);
        } else {
            state.items.push_back(item);
        }
        self.ready.notify_all();
        id
    }

    /// Block until the queue has a head item or is closed.
    pub(crate) fn peek_wait(&self) -> Option<Outbound> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(head) = state.items.front() {
                return Some(head.clone());
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Remove a delivered item.
    pub(crate) fn complete(&self, id: u64) -> bool {
        let mut state = self.lock();
        match state.items.iter().position(|item| item.id == id) {
            Some(index) => state.items.remove(index).is_some(),
            None => false,
        }
    }

    /// Wake every waiter; `peek_wait` returns `None` from now on.
    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().items.len()
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Vec<Bytes> {
        self.lock().items.iter().map(|item| item.wire.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn head_insertion_order() {
        let queue = OutboundQueue::default();
        queue.push_back(Bytes::from_static(b"A"));
        queue.push_back(Bytes::from_static(b"B"));
        queue.push_front(Bytes::from_static(b"C"));

        assert_eq!(
            queue.snapshot(),
            vec![
                Bytes::from_static(b"C"),
                Bytes::from_static(b"A"),
                Bytes::from_static(b"B")
            ]
        );
    }

    #[test]
    fn complete_removes_by_id_not_position() {
        let queue = OutboundQueue::default();
        queue.push_back(Bytes::from_static(b"A"));
        let head = queue.peek_wait().unwrap();
        queue.push_front(Bytes::from_static(b"urgent"));

        assert!(queue.complete(head.id));
        assert!(!queue.complete(head.id));
        assert_eq!(queue.snapshot(), vec![Bytes::from_static(b"urgent")]);
    }

    #[test]
    fn peek_leaves_item_queued() {
        let queue = OutboundQueue::default();
        queue.push_back(Bytes::from_static(b"A"));
        let first = queue.peek_wait().unwrap();
        let again = queue.peek_wait().unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn peek_wakes_on_push() {
        let queue = Arc::new(OutboundQueue::default());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.peek_wait().map(|item| item.wire))
        };

        thread::sleep(Duration::from_millis(20));
        queue.push_back(Bytes::from_static(b"late"));
        assert_eq!(waiter.join().unwrap(), Some(Bytes::from_static(b"late")));
    }

    #[test]
    fn close_wakes_waiters() {
        let queue = Arc::new(OutboundQueue::default());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.peek_wait().is_none())
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(waiter.join().unwrap());
    }
}
