// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 fetchcore contributors
//
// The request slot record (spec.md §3). Split into `UserSide` and
// `ThreadSide` sub-structs so ownership of each half moves with the slot-id
// between threads without per-field locking - the queue hand-off itself is
// the synchronization (spec.md design note "Partitioned records vs. shared
// mutable state").
//
// `cancel` and `pending_pause` are the one exception to "the queue hand-off
// is the synchronization": spec.md §5 requires them callable "at any time",
// including while a worker thread's `ThreadView` holds the rest of this same
// slot mid-I/O. They are therefore plain atomics, written through a raw
// pointer field projection (`SlotStorage::set_cancel`/`set_pending_pause`)
// that never materializes a `&mut Request` - see `pool.rs`.

use std::fs::File;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::config::{MAX_PATH, MAX_USERDATA_BYTES};
use crate::handle::Handle;

/// Lane index sentinel meaning "not yet assigned a lane".
pub(crate) const LANE_INVALID: u32 = u32::MAX;

/// A user-provided response callback.
pub type Callback = fn(&Response);

/// Lifecycle state of a request slot (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Initial,
    Allocated,
    Opening,
    Opened,
    Fetching,
    Fetched,
    Paused,
    Failed,
}

/// A raw pointer bundle that crosses the user/worker boundary. Exclusive
/// access is guaranteed by the ring hand-off protocol (only one side ever
/// holds the slot-id at a time), so `Send` is sound even though raw pointers
/// are not `Send` by default.
#[derive(Clone, Copy)]
pub(crate) struct RawBuffer {
    pub ptr: *mut u8,
    pub size: usize,
}

unsafe impl Send for RawBuffer {}

impl RawBuffer {
    pub(crate) const NONE: RawBuffer = RawBuffer {
        ptr: std::ptr::null_mut(),
        size: 0,
    };

    pub(crate) fn is_bound(&self) -> bool {
        !self.ptr.is_null() && self.size > 0
    }
}

/// A pending `pause`/`continue` request, last-call-wins (spec.md §8 law
/// "Idempotence of pause and continue"). Overwritten, not OR'd, on every
/// call to `Engine::pause`/`Engine::continue_` - whichever was called most
/// recently before the next pump is the one that takes effect. Stored on the
/// slot as the `AtomicU8` tag below, not this enum directly, so it can be
/// set via a raw-pointer field projection without a `&mut UserSide`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PauseIntent {
    Pause,
    Continue,
}

impl PauseIntent {
    pub(crate) const NONE_TAG: u8 = 0;
    const PAUSE_TAG: u8 = 1;
    const CONTINUE_TAG: u8 = 2;

    pub(crate) fn tag(self) -> u8 {
        match self {
            PauseIntent::Pause => Self::PAUSE_TAG,
            PauseIntent::Continue => Self::CONTINUE_TAG,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            Self::PAUSE_TAG => Some(PauseIntent::Pause),
            Self::CONTINUE_TAG => Some(PauseIntent::Continue),
            _ => None,
        }
    }
}

/// Data only the user thread may read or write, except `cancel` and
/// `pending_pause` (see module docs) which the public control API may touch
/// from any point in time, racing a worker thread's hold of this slot's
/// `ThreadSide`.
pub(crate) struct UserSide {
    pub pending_pause: AtomicU8,
    pub cancel: AtomicBool,
    pub finished: bool,
    pub content_size: u64,
    pub content_offset: u64,
    pub fetched_size: u64,
    pub user_data_len: u16,
    pub user_data: [u8; MAX_USERDATA_BYTES],
    pub path_len: u16,
    pub path: [u8; MAX_PATH],
    pub buffer: RawBuffer,
}

impl UserSide {
    fn reset(&mut self) {
        self.pending_pause.store(PauseIntent::NONE_TAG, Ordering::Relaxed);
        self.cancel.store(false, Ordering::Relaxed);
        self.finished = false;
        self.content_size = 0;
        self.content_offset = 0;
        self.fetched_size = 0;
        self.user_data_len = 0;
        self.path_len = 0;
        self.buffer = RawBuffer::NONE;
    }

    pub fn path_str(&self) -> &str {
        std::str::from_utf8(&self.path[..self.path_len as usize]).unwrap_or("")
    }
}

/// Data only the worker thread may read or write while a request is in
/// `Opening`/`Fetching`.
pub(crate) struct ThreadSide {
    pub content_size: u64,
    /// Start offset of the *current* chunk - what gets reported to the user
    /// (spec.md §3: "offset of the current chunk"). Distinct from `cursor`,
    /// which is where the next read actually begins.
    pub content_offset: u64,
    pub fetched_size: u64,
    /// Internal read cursor: total bytes consumed so far. Advances past
    /// `content_offset` on every successful read; `content_offset` itself is
    /// only set to the cursor's *pre*-advance value, so the response a
    /// caller sees always names where this chunk began, not where the next
    /// one will.
    pub cursor: u64,
    pub failed: bool,
    pub finished: bool,
    pub file: Option<File>,
}

impl ThreadSide {
    fn reset(&mut self) {
        self.content_size = 0;
        self.content_offset = 0;
        self.fetched_size = 0;
        self.cursor = 0;
        self.failed = false;
        self.finished = false;
        self.file = None;
    }
}

/// One slot in the request pool's slab.
pub(crate) struct Request {
    pub handle_id: u32,
    pub state: State,
    pub channel_index: u32,
    pub lane_index: u32,
    pub callback: Option<Callback>,
    pub user: UserSide,
    pub thread: ThreadSide,
}

impl Request {
    pub(crate) fn empty() -> Self {
        Self {
            handle_id: 0,
            state: State::Initial,
            channel_index: 0,
            lane_index: LANE_INVALID,
            callback: None,
            user: UserSide {
                pending_pause: AtomicU8::new(PauseIntent::NONE_TAG),
                cancel: AtomicBool::new(false),
                finished: false,
                content_size: 0,
                content_offset: 0,
                fetched_size: 0,
                user_data_len: 0,
                user_data: [0u8; MAX_USERDATA_BYTES],
                path_len: 0,
                path: [0u8; MAX_PATH],
                buffer: RawBuffer::NONE,
            },
            thread: ThreadSide {
                content_size: 0,
                content_offset: 0,
                fetched_size: 0,
                cursor: 0,
                failed: false,
                finished: false,
                file: None,
            },
        }
    }

    /// Reset a slot to its post-free state. Called by the pool on both
    /// `alloc` (clearing stale data from a previous occupant) and `free`.
    pub(crate) fn clear(&mut self) {
        self.handle_id = 0;
        self.state = State::Initial;
        self.channel_index = 0;
        self.lane_index = LANE_INVALID;
        self.callback = None;
        self.user.reset();
        self.thread.reset();
    }
}

/// The record delivered to the user callback each time the pump invokes it
/// (spec.md §6).
pub struct Response {
    pub handle: Handle,
    pub channel: u32,
    pub lane: u32,
    pub opened: bool,
    pub fetched: bool,
    pub paused: bool,
    pub finished: bool,
    pub failed: bool,
    pub cancelled: bool,
    pub path: *const u8,
    pub path_len: usize,
    pub user_data: *mut u8,
    pub user_data_len: usize,
    pub content_size: u64,
    pub content_offset: u64,
    pub fetched_size: u64,
    pub buffer_ptr: *mut u8,
    pub buffer_size: usize,
}

impl Response {
    /// Borrow the path as a `&str`. Valid only for the duration of the
    /// callback call.
    pub fn path(&self) -> &str {
        if self.path.is_null() {
            return "";
        }
        let slice = unsafe { std::slice::from_raw_parts(self.path, self.path_len) };
        std::str::from_utf8(slice).unwrap_or("")
    }

    /// Borrow the user-data blob. Valid only for the duration of the
    /// callback call.
    pub fn user_data(&self) -> &[u8] {
        if self.user_data.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.user_data, self.user_data_len) }
    }

    /// Borrow the currently bound buffer's fetched prefix
    /// (`buffer_ptr[0..fetched_size]`), if any.
    pub fn fetched_data(&self) -> &[u8] {
        if self.buffer_ptr.is_null() || self.fetched_size == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.buffer_ptr, self.fetched_size as usize) }
    }
}
