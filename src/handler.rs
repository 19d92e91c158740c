// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 fetchcore contributors
//
// The pluggable I/O capability (spec.md §4.6/§4.7, design note "Backends as
// a capability"). A `RequestHandler` performs one backend-specific step for
// a single slot; the filesystem and HTTP backends are two implementations
// of this one trait.

use crate::request::{Request, State};

/// A view over the parts of a request slot a `RequestHandler` is allowed to
/// touch while the worker owns it (state in `Opening` or `Fetching`).
///
/// This is the only way backend code can reach a slot - `Request` itself is
/// crate-private, so an external backend crate implementing
/// [`RequestHandler`] can only go through this narrow, checked surface.
pub struct ThreadView<'a> {
    req: &'a mut Request,
    index: u16,
}

impl<'a> ThreadView<'a> {
    pub(crate) fn new(req: &'a mut Request, index: u16) -> Self {
        Self { req, index }
    }

    /// The slot's index in the pool's slab. Single-threaded backends (the
    /// wasm32 HTTP backend) need this to safely re-enter the slot later from
    /// an asynchronous completion callback, after this `ThreadView` itself
    /// has gone out of scope.
    pub fn slot_index(&self) -> u16 {
        self.index
    }

    /// The slot's full composite handle id, for the same reason as
    /// [`Self::slot_index`] plus staleness re-validation on re-entry.
    pub fn handle_id(&self) -> u32 {
        self.req.handle_id
    }

    /// The request's current lifecycle state (`Opening` or `Fetching` for
    /// any live step; anything else is a no-op for the handler).
    pub fn is_opening(&self) -> bool {
        self.req.state == State::Opening
    }

    /// Whether the request is in `Fetching`.
    pub fn is_fetching(&self) -> bool {
        self.req.state == State::Fetching
    }

    /// The request's path.
    pub fn path(&self) -> &str {
        self.req.user.path_str()
    }

    /// The currently bound buffer, if any, as `(ptr, len)`.
    pub fn buffer(&self) -> Option<(*mut u8, usize)> {
        let buf = self.req.user.buffer;
        buf.is_bound().then_some((buf.ptr, buf.size))
    }

    /// Full resource size as currently known to the worker.
    pub fn content_size(&self) -> u64 {
        self.req.thread.content_size
    }

    /// Set the full resource size (called once, on open success).
    pub fn set_content_size(&mut self, size: u64) {
        self.req.thread.content_size = size;
    }

    /// Where the next read should start. Distinct from the `content_offset`
    /// a callback sees: that field reports the *start* of the
    /// most-recently-fetched chunk, while this is the cursor past it.
    pub fn read_offset(&self) -> u64 {
        self.req.thread.cursor
    }

    /// Record that `fetched` bytes were read starting at the current read
    /// cursor, then advance the cursor past them. `content_offset` is set to
    /// the cursor's pre-advance value, so the response reports this chunk's
    /// start, not the next one's (spec.md §3).
    pub fn advance(&mut self, fetched: u64) {
        self.req.thread.content_offset = self.req.thread.cursor;
        self.req.thread.fetched_size = fetched;
        self.req.thread.cursor += fetched;
    }

    /// Mark the step as failed. The pump will classify this as `Failed` on
    /// the next drain.
    pub fn mark_failed(&mut self) {
        self.req.thread.failed = true;
        self.req.thread.finished = true;
    }

    /// Mark the step (and, implicitly, the whole request) finished.
    pub fn mark_finished(&mut self) {
        self.req.thread.finished = true;
    }

    /// Whether all of `content_size` bytes have now been fetched.
    pub fn is_exhausted(&self) -> bool {
        self.req.thread.cursor >= self.req.thread.content_size
    }

    /// Whether this step has already been marked failed.
    pub fn failed(&self) -> bool {
        self.req.thread.failed
    }

    /// Stash an open file handle across the `Opening` -> `Fetching` hop
    /// (native filesystem backend only; other backends can ignore this).
    pub fn set_file(&mut self, file: Option<std::fs::File>) {
        self.req.thread.file = file;
    }

    /// Take the stashed file handle, if any.
    pub fn take_file(&mut self) -> Option<std::fs::File> {
        self.req.thread.file.take()
    }

    /// Borrow the stashed file handle, if any.
    pub fn file_mut(&mut self) -> Option<&mut std::fs::File> {
        self.req.thread.file.as_mut()
    }
}

/// The pluggable per-step I/O capability a channel drives its worker with.
///
/// `run_step` performs exactly one backend-specific step (open, or read one
/// chunk) for the slot behind `view`, then returns - it must never block
/// indefinitely on anything other than the I/O itself, and must never retry
/// (spec.md §1: "no retries on transient errors" is a non-goal).
pub trait RequestHandler: Send + Sync {
    fn run_step(&self, view: ThreadView<'_>);
}
