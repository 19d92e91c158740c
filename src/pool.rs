// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 fetchcore contributors
//
// Fixed-capacity request slab with generation-stamped handles (spec.md
// §4.1). Slot 0 is reserved as the sentinel "invalid" index. All
// bookkeeping (`generations`, `free_stack`) is touched only by the user
// thread per spec.md §5 ("The pool and the lane allocator are touched only
// by the user thread") - exact alloc/free/lookup shape follows
// `sokol_fetch.h`'s `_sfetch_pool_*` family.

use std::cell::UnsafeCell;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::handle::Handle;
use crate::request::{PauseIntent, Request};

/// Shared slot storage. Exclusive access to slot `i` is guaranteed by the
/// ring hand-off protocol (a slot-id only ever sits in one ring at a time,
/// and only the side that currently holds it may dereference the slot) -
/// never by a lock on this container. This mirrors the teacher crate's
/// `SpinLock`/`RingSlot` precedent of a documented `unsafe impl Send + Sync`
/// over raw shared memory, generalized to an in-process `Arc`.
///
/// The one exception is `Request::user`'s `cancel`/`pending_pause` fields:
/// the public `Engine::pause`/`continue_`/`cancel` API must be callable "at
/// any time" (spec.md §5), including while a worker thread holds the rest of
/// the same slot through a live `ThreadView`. `Self::get` hands out a `&mut
/// Request` spanning the *whole* slot and must never be called for that
/// purpose - use `Self::set_cancel`/`Self::set_pending_pause` instead, which
/// write only those two atomic fields via a raw-pointer field projection and
/// so never alias a concurrently-held `&mut Request`/`ThreadView`.
pub(crate) struct SlotStorage {
    slots: Box<[UnsafeCell<Request>]>,
}

unsafe impl Send for SlotStorage {}
unsafe impl Sync for SlotStorage {}

impl SlotStorage {
    fn new(len: usize) -> Self {
        let mut v = Vec::with_capacity(len);
        for _ in 0..len {
            v.push(UnsafeCell::new(Request::empty()));
        }
        Self {
            slots: v.into_boxed_slice(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// # Safety
    /// The caller must hold exclusive logical ownership of slot `index` (as
    /// conferred by the ring protocol) - i.e. this is for the pump and the
    /// worker's `ThreadView`, never for the racing `pause`/`continue_`/
    /// `cancel` control API (see the struct docs above).
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn get(&self, index: u16) -> &mut Request {
        &mut *self.slots[index as usize].get()
    }

    /// Set `index`'s `cancel` flag. Writes only that one `AtomicBool` field
    /// through a raw-pointer projection off the slot - no `&mut Request` (or
    /// even `&mut UserSide`) is ever formed, so this is sound to call
    /// concurrently with a worker thread's `ThreadView` over the rest of the
    /// same slot (spec.md §5).
    ///
    /// # Safety
    /// `index` must be in bounds.
    pub(crate) unsafe fn set_cancel(&self, index: u16) {
        let ptr = self.slots[index as usize].get();
        (*ptr).user.cancel.store(true, Ordering::Relaxed);
    }

    /// Set `index`'s pending pause/continue intent, last-write-wins. Same
    /// raw-pointer field projection and soundness argument as
    /// [`Self::set_cancel`].
    ///
    /// # Safety
    /// `index` must be in bounds.
    pub(crate) unsafe fn set_pending_pause(&self, index: u16, intent: PauseIntent) {
        let ptr = self.slots[index as usize].get();
        (*ptr).user.pending_pause.store(intent.tag(), Ordering::Relaxed);
    }
}

/// The fixed-size request pool: `max_requests + 1` slots, a parallel
/// generation array, and a LIFO free-stack of indices.
pub(crate) struct RequestPool {
    pub(crate) slots: Arc<SlotStorage>,
    generations: Vec<u16>,
    free_stack: Vec<u16>,
}

impl RequestPool {
    pub(crate) fn new(max_requests: u32) -> Self {
        let len = max_requests as usize + 1;
        let mut free_stack: Vec<u16> = (1..len as u32).rev().map(|i| i as u16).collect();
        free_stack.shrink_to_fit();
        Self {
            slots: Arc::new(SlotStorage::new(len)),
            generations: vec![0u16; len],
            free_stack,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    /// Allocate a slot. Returns `Handle::INVALID` if the free-stack is empty.
    pub(crate) fn alloc(&mut self) -> Handle {
        let Some(index) = self.free_stack.pop() else {
            return Handle::INVALID;
        };
        let generation = self.generations[index as usize].wrapping_add(1).max(1);
        self.generations[index as usize] = generation;
        let handle = Handle::new(index, generation);
        let slot = unsafe { self.slots.get(index) };
        slot.clear();
        slot.handle_id = handle.id();
        handle
    }

    /// Return a slot to the free-list, bumping its generation so any
    /// still-held handle becomes stale. Double-free is only checked in debug
    /// builds (programming error per spec.md §4.1).
    pub(crate) fn free(&mut self, handle: Handle) {
        let index = handle.index();
        debug_assert!(
            (index as usize) > 0 && (index as usize) < self.slots.len(),
            "free() on an out-of-range handle"
        );
        debug_assert_eq!(
            self.generations[index as usize],
            handle.generation(),
            "double-free or stale handle passed to free()"
        );
        let slot = unsafe { self.slots.get(index) };
        slot.clear();
        self.free_stack.push(index);
    }

    /// Resolve a handle to its slot, failing closed (returning `None`) if the
    /// index is out of range or the generation doesn't match.
    pub(crate) fn lookup(&self, handle: Handle) -> Option<&mut Request> {
        if !handle.is_valid() {
            return None;
        }
        let index = handle.index();
        if index == 0 || index as usize >= self.slots.len() {
            return None;
        }
        if self.generations[index as usize] != handle.generation() {
            return None;
        }
        let slot = unsafe { self.slots.get(index) };
        if slot.handle_id != handle.id() {
            return None;
        }
        Some(slot)
    }

    /// Resolve a handle's slot index without ever forming a `&Request`/`&mut
    /// Request` - the generation check alone is enough to answer "is this
    /// handle still live", which is all `request_cancel`/`request_pause` need
    /// before touching the slot through a raw-pointer field projection.
    fn validate(&self, handle: Handle) -> Option<u16> {
        if !handle.is_valid() {
            return None;
        }
        let index = handle.index();
        if index == 0 || index as usize >= self.generations.len() {
            return None;
        }
        if self.generations[index as usize] != handle.generation() {
            return None;
        }
        Some(index)
    }

    /// Is `handle` still live (not freed/stale)? Used by `Engine::handle_valid`
    /// so callers can probe liveness without the full `&mut Request` borrow
    /// `lookup` produces.
    pub(crate) fn is_live(&self, handle: Handle) -> bool {
        self.validate(handle).is_some()
    }

    /// Set `handle`'s cancel flag, callable at any time per spec.md §5. Never
    /// forms a `&mut Request`, so it is sound even while a worker thread's
    /// `ThreadView` holds the rest of the same slot.
    pub(crate) fn request_cancel(&self, handle: Handle) {
        if let Some(index) = self.validate(handle) {
            unsafe { self.slots.set_cancel(index) };
        }
    }

    /// Set `handle`'s pending pause/continue intent, same soundness argument
    /// as [`Self::request_cancel`].
    pub(crate) fn request_pause(&self, handle: Handle, intent: PauseIntent) {
        if let Some(index) = self.validate(handle) {
            unsafe { self.slots.set_pending_pause(index, intent) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_free_recycles_index_with_bumped_generation() {
        let mut pool = RequestPool::new(4);
        let h1 = pool.alloc();
        assert!(h1.is_valid());
        let idx1 = h1.index();
        pool.free(h1);
        let h2 = pool.alloc();
        assert_eq!(h2.index(), idx1);
        assert_ne!(h2.generation(), h1.generation());
    }

    #[test]
    fn stale_handle_lookup_fails_closed() {
        let mut pool = RequestPool::new(4);
        let h1 = pool.alloc();
        pool.free(h1);
        let _h2 = pool.alloc();
        assert!(pool.lookup(h1).is_none());
    }

    #[test]
    fn pool_exhaustion_returns_invalid_handle() {
        let mut pool = RequestPool::new(2);
        let h1 = pool.alloc();
        let h2 = pool.alloc();
        let h3 = pool.alloc();
        assert!(h1.is_valid());
        assert!(h2.is_valid());
        assert!(!h3.is_valid());
    }

    #[test]
    fn slot_zero_is_never_issued() {
        let mut pool = RequestPool::new(1);
        let h = pool.alloc();
        assert_ne!(h.index(), 0);
    }
}
