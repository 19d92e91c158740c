// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 fetchcore contributors
//
// Thread-local, allocation-free asynchronous resource-loading engine. One
// `Engine` belongs to exactly one thread for its whole life (spec.md §2,
// §5, §9 design note "Thread-local engine") - there is no global instance
// and no cross-thread sharing; callers that want one engine per worker
// thread construct one per thread, e.g. via `thread_local!`.

mod backend;
mod channel;
mod config;
mod error;
mod handle;
mod handler;
mod pool;
mod request;
mod ring;
mod sync_queue;

mod pump;

pub use backend::fs::FilesystemHandler;
#[cfg(target_arch = "wasm32")]
pub use backend::http::HttpHandler;
pub use config::{Config, MAX_CHANNELS, MAX_PATH, MAX_USERDATA_BYTES, MAX_USERDATA_UINT64};
pub use error::BufferError;
pub use handle::Handle;
pub use handler::{RequestHandler, ThreadView};
pub use request::{Callback, Response};

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::ThreadId;

use channel::Channel;
use error::SendError;
use pool::RequestPool;
use request::{PauseIntent, RawBuffer, State};

#[cfg(target_arch = "wasm32")]
use sync_queue::OutgoingSync;

/// The parts of an `Engine` that `bind_buffer`/`unbind_buffer` need to reach
/// back into from inside a response callback. The callback type is a bare
/// `fn(&Response)` (spec.md §6) with no engine handle of its own - mirroring
/// the original C ABI, where the engine is implicit and callback code reaches
/// it through the one thread-local instance (spec.md §9 design note
/// "Thread-local engine"). `Engine::do_work` populates this for the exact
/// duration of the two pump passes it runs.
#[derive(Clone, Copy)]
struct CallbackContext {
    pool: *const RequestPool,
    in_callback: *const Cell<bool>,
}

thread_local! {
    static CURRENT: Cell<Option<CallbackContext>> = Cell::new(None);
}

/// Bind a buffer to `handle` from within the response callback currently
/// running on this thread (spec.md §3: "`bind_buffer`/`unbind_buffer` may be
/// called only inside the response callback"). Returns
/// [`BufferError::NotInCallback`] if called from anywhere else, including a
/// callback belonging to a *different* engine's `do_work` on this thread (an
/// engine only populates the thread-local context for the duration of its own
/// `do_work` call).
pub fn bind_buffer(handle: Handle, ptr: *mut u8, size: usize) -> Result<(), BufferError> {
    CURRENT.with(|c| {
        let Some(ctx) = c.get() else {
            return Err(BufferError::NotInCallback);
        };
        // Safety: `ctx` is only ever set by `Engine::do_work`, which keeps
        // `self.pool`/`self.in_callback` alive and unmoved for the whole
        // duration the context is populated.
        let in_callback = unsafe { &*ctx.in_callback };
        if !in_callback.get() {
            return Err(BufferError::NotInCallback);
        }
        let pool = unsafe { &*ctx.pool };
        let Some(req) = pool.lookup(handle) else {
            return Err(BufferError::InvalidHandle);
        };
        if req.user.buffer.is_bound() {
            return Err(BufferError::AlreadyBound);
        }
        req.user.buffer = RawBuffer { ptr, size };
        Ok(())
    })
}

/// Unbind `handle`'s buffer, returning the previous `(ptr, size)` if one was
/// bound. Only valid from within the response callback; a no-op returning
/// `None` otherwise.
pub fn unbind_buffer(handle: Handle) -> Option<(*mut u8, usize)> {
    CURRENT.with(|c| {
        let ctx = c.get()?;
        let in_callback = unsafe { &*ctx.in_callback };
        if !in_callback.get() {
            return None;
        }
        let pool = unsafe { &*ctx.pool };
        let req = pool.lookup(handle)?;
        let prev = req.user.buffer;
        req.user.buffer = RawBuffer::NONE;
        prev.is_bound().then_some((prev.ptr, prev.size))
    })
}

/// Parameters for [`Engine::send`]. Build with [`SendParams::new`] and the
/// `with_*` setters; only `path` and `callback` are required (spec.md §6).
pub struct SendParams<'a> {
    channel: u32,
    path: &'a str,
    callback: Callback,
    buffer: Option<(*mut u8, usize)>,
    user_data: Option<&'a [u8]>,
}

impl<'a> SendParams<'a> {
    pub fn new(path: &'a str, callback: Callback) -> Self {
        Self {
            channel: 0,
            path,
            callback,
            buffer: None,
            user_data: None,
        }
    }

    pub fn with_channel(mut self, channel: u32) -> Self {
        self.channel = channel;
        self
    }

    /// Pre-bind a buffer at send time. `ptr` must stay valid for the
    /// request's whole life, or until it is rebound/unbound from a
    /// callback.
    pub fn with_buffer(mut self, ptr: *mut u8, size: usize) -> Self {
        self.buffer = Some((ptr, size));
        self
    }

    pub fn with_user_data(mut self, data: &'a [u8]) -> Self {
        self.user_data = Some(data);
        self
    }
}

/// The engine itself: a request pool shared by a fixed set of channels.
/// Construct with [`Engine::setup`]; never move it to another thread (debug
/// builds assert this on every call).
pub struct Engine {
    config: Config,
    pool: RequestPool,
    channels: Vec<Channel>,
    in_callback: Cell<bool>,
    owner_thread: ThreadId,
    // Raw-pointer marker: forbids auto-derived `Send`/`Sync`. An `Engine` is
    // thread-local by construction (spec.md §9) - there is deliberately no
    // escape hatch for sharing one across threads.
    _not_send_sync: PhantomData<*const ()>,
}

impl Engine {
    /// Construct a new engine. This is the only point at which the engine
    /// allocates memory - everything after this is allocation-free
    /// (spec.md §4.1, §8 invariant "No memory allocation occurs between
    /// `setup` and `shutdown`").
    pub fn setup(config: Config) -> Self {
        let config = config.clamp();
        let pool = RequestPool::new(config.max_requests);
        let mut channels = Vec::with_capacity(config.num_channels as usize);
        for index in 0..config.num_channels {
            channels.push(Self::build_channel(index, &config, &pool));
        }
        log::debug!(
            "fetchcore: engine ready (max_requests={}, num_channels={}, num_lanes={})",
            config.max_requests,
            config.num_channels,
            config.num_lanes
        );
        Self {
            config,
            pool,
            channels,
            in_callback: Cell::new(false),
            owner_thread: std::thread::current().id(),
            _not_send_sync: PhantomData,
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn build_channel(index: u32, config: &Config, pool: &RequestPool) -> Channel {
        let handler: Arc<dyn RequestHandler> = Arc::new(FilesystemHandler::new());
        Channel::new(index, config.max_requests, config.num_lanes, Arc::clone(&pool.slots), handler)
    }

    #[cfg(target_arch = "wasm32")]
    fn build_channel(index: u32, config: &Config, pool: &RequestPool) -> Channel {
        let async_outgoing = Arc::new(OutgoingSync::new(config.num_lanes as usize));
        let handler: Arc<dyn RequestHandler> = Arc::new(HttpHandler::new(
            Arc::clone(&pool.slots),
            Arc::clone(&async_outgoing),
        ));
        Channel::new(
            index,
            config.max_requests,
            config.num_lanes,
            Arc::clone(&pool.slots),
            handler,
            async_outgoing,
        )
    }

    fn assert_owner_thread(&self) {
        debug_assert_eq!(
            std::thread::current().id(),
            self.owner_thread,
            "fetchcore: Engine used from a thread other than the one that called setup()"
        );
    }

    /// Submit a new request. Returns `Handle::INVALID` (id 0) on pool
    /// exhaustion, validation failure, or channel-queue overflow - no
    /// callback is ever delivered for an invalid handle (spec.md §6, §7).
    pub fn send(&mut self, params: SendParams<'_>) -> Handle {
        self.assert_owner_thread();

        if params.channel >= self.config.num_channels {
            log::warn!("fetchcore: {}", SendError::Validation("channel out of range"));
            return Handle::INVALID;
        }
        if params.path.is_empty() || params.path.len() >= MAX_PATH {
            log::warn!("fetchcore: {}", SendError::Validation("path empty or >= MAX_PATH"));
            return Handle::INVALID;
        }
        if let Some(data) = params.user_data {
            if data.len() > MAX_USERDATA_BYTES {
                log::warn!("fetchcore: {}", SendError::Validation("user_data exceeds MAX_USERDATA_BYTES"));
                return Handle::INVALID;
            }
        }

        let handle = self.pool.alloc();
        if !handle.is_valid() {
            log::warn!("fetchcore: send() rejected, {}", SendError::PoolExhausted);
            return Handle::INVALID;
        }

        let req = self.pool.lookup(handle).expect("slot just allocated");
        req.channel_index = params.channel;
        req.state = State::Allocated;
        req.callback = Some(params.callback);

        let path_bytes = params.path.as_bytes();
        req.user.path[..path_bytes.len()].copy_from_slice(path_bytes);
        req.user.path_len = path_bytes.len() as u16;

        if let Some(data) = params.user_data {
            req.user.user_data[..data.len()].copy_from_slice(data);
            req.user.user_data_len = data.len() as u16;
        }
        if let Some((ptr, size)) = params.buffer {
            req.user.buffer = RawBuffer { ptr, size };
        }

        let channel = &mut self.channels[params.channel as usize];
        if channel.user_sent.full() {
            log::warn!(
                "fetchcore: send() on channel {} rejected, {}",
                params.channel,
                SendError::QueueOverflow
            );
            self.pool.free(handle);
            return Handle::INVALID;
        }
        channel.user_sent.enqueue(handle.id());
        handle
    }

    /// Advance every channel by one tick (two internal passes - spec.md
    /// §4.4). Must be called repeatedly for any request to make progress or
    /// reach its terminal callback.
    pub fn do_work(&mut self) {
        self.assert_owner_thread();
        let ctx = CallbackContext {
            pool: &self.pool as *const RequestPool,
            in_callback: &self.in_callback as *const Cell<bool>,
        };
        CURRENT.with(|c| c.set(Some(ctx)));
        pump::do_work(&mut self.channels, &mut self.pool, &self.in_callback);
        CURRENT.with(|c| c.set(None));
    }

    /// Request that `handle` pause at the next pump boundary. Last call
    /// before the next `do_work` wins over a prior `continue_` (spec.md §8
    /// law "Idempotence of pause and continue").
    pub fn pause(&mut self, handle: Handle) {
        self.assert_owner_thread();
        self.pool.request_pause(handle, PauseIntent::Pause);
    }

    /// Request that a paused `handle` resume at the next pump boundary.
    /// No-op if the request is not currently `Paused` by then.
    pub fn continue_(&mut self, handle: Handle) {
        self.assert_owner_thread();
        self.pool.request_pause(handle, PauseIntent::Continue);
    }

    /// Request cancellation. Dominates any pending `pause`/`continue_` set
    /// in the same pre-pump window (spec.md §8 law "cancel dominates").
    /// In-flight I/O already committed to the backend still runs to
    /// completion; cancellation is observed at the next pump boundary.
    pub fn cancel(&mut self, handle: Handle) {
        self.assert_owner_thread();
        self.pool.request_cancel(handle);
    }

    /// Whether `handle` currently resolves to a live, in-flight request.
    pub fn handle_valid(&self, handle: Handle) -> bool {
        self.assert_owner_thread();
        self.pool.is_live(handle)
    }

    /// Total configured pool capacity.
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Stop every channel's worker thread and join it. No further callbacks
    /// are emitted after this returns.
    pub fn shutdown(mut self) {
        self.assert_owner_thread();
        for channel in self.channels.iter_mut() {
            channel.shutdown();
        }
        log::debug!("fetchcore: engine shut down");
    }
}
