// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 fetchcore contributors
//
// The channel's two thread-crossing rings. `IncomingSync` pairs a `Mutex`
// with a `Condvar` so the worker can block until work arrives; `OutgoingSync`
// is a plain `Mutex` since nothing blocks on it (spec.md §4.3, §4.5).
//
// Generalizes the teacher crate's named, cross-process `Waiter`
// (`waiter.rs`, itself a `pthread_cond_t` + `pthread_mutex_t` pair in shared
// memory) down to an in-process `std::sync::Condvar` - this engine's worker
// and user thread share one address space, so there is no need for named
// OS-level synchronization objects.

use std::sync::{Condvar, Mutex};

use crate::ring::RingQueue;

/// `thread_incoming`: the worker blocks here while empty and no stop has
/// been requested.
pub(crate) struct IncomingSync {
    state: Mutex<IncomingState>,
    cond: Condvar,
}

struct IncomingState {
    ring: RingQueue,
    stop_requested: bool,
}

impl IncomingSync {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(IncomingState {
                ring: RingQueue::new(capacity),
                stop_requested: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Splice `ids` onto the ring and wake the worker. Caller guarantees
    /// `ids.len()` does not exceed remaining capacity (lane count bounds
    /// this by construction - see `Channel::cross_to_worker`).
    pub(crate) fn push_many(&self, ids: &[u32]) {
        if ids.is_empty() {
            return;
        }
        let mut guard = self.state.lock().unwrap();
        for &id in ids {
            guard.ring.enqueue(id);
        }
        drop(guard);
        self.cond.notify_one();
    }

    /// Drain every id currently in `src` straight onto this ring, without an
    /// intermediate allocation, and wake the worker if anything moved.
    /// Caller guarantees `src`'s contents fit (lane count bounds both rings
    /// to the same capacity).
    pub(crate) fn splice_from(&self, src: &mut RingQueue) {
        if src.empty() {
            return;
        }
        let mut guard = self.state.lock().unwrap();
        while !src.empty() {
            guard.ring.enqueue(src.dequeue());
        }
        drop(guard);
        self.cond.notify_one();
    }

    /// Block until an item is available or stop is requested. Returns
    /// `None` only when stop was requested and the ring is empty.
    pub(crate) fn wait_pop(&self) -> Option<u32> {
        let mut guard = self.state.lock().unwrap();
        while guard.ring.empty() && !guard.stop_requested {
            guard = self.cond.wait(guard).unwrap();
        }
        if guard.ring.empty() {
            return None;
        }
        Some(guard.ring.dequeue())
    }

    /// Signal the worker to stop and wake it.
    pub(crate) fn request_stop(&self) {
        let mut guard = self.state.lock().unwrap();
        guard.stop_requested = true;
        drop(guard);
        self.cond.notify_all();
    }
}

/// `thread_outgoing`: results the worker pushes back for the user thread to
/// drain on the next pump. No condvar - the user thread polls it.
pub(crate) struct OutgoingSync {
    ring: Mutex<RingQueue>,
}

impl OutgoingSync {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(RingQueue::new(capacity)),
        }
    }

    pub(crate) fn push(&self, id: u32) {
        let mut guard = self.ring.lock().unwrap();
        debug_assert!(!guard.full(), "thread_outgoing overflow");
        guard.enqueue(id);
    }

    /// Drain everything currently queued straight onto `dst`, without an
    /// intermediate allocation.
    pub(crate) fn splice_into(&self, dst: &mut RingQueue) {
        let mut guard = self.ring.lock().unwrap();
        while !guard.empty() {
            dst.enqueue(guard.dequeue());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_pop_blocks_until_push() {
        let sync = Arc::new(IncomingSync::new(4));
        let s2 = Arc::clone(&sync);
        let worker = thread::spawn(move || s2.wait_pop());
        thread::sleep(Duration::from_millis(20));
        sync.push_many(&[42]);
        assert_eq!(worker.join().unwrap(), Some(42));
    }

    #[test]
    fn request_stop_wakes_waiter_with_none() {
        let sync = Arc::new(IncomingSync::new(4));
        let s2 = Arc::clone(&sync);
        let worker = thread::spawn(move || s2.wait_pop());
        thread::sleep(Duration::from_millis(20));
        sync.request_stop();
        assert_eq!(worker.join().unwrap(), None);
    }

    #[test]
    fn outgoing_drain_preserves_order() {
        let sync = OutgoingSync::new(4);
        sync.push(1);
        sync.push(2);
        sync.push(3);
        let mut dst = RingQueue::new(4);
        sync.splice_into(&mut dst);
        assert_eq!(dst.dequeue(), 1);
        assert_eq!(dst.dequeue(), 2);
        assert_eq!(dst.dequeue(), 3);
    }
}
