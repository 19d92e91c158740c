// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 fetchcore contributors
//
// A channel: its five (native target: seven) rings, its lane allocator, and
// - on native targets - its dedicated worker thread (spec.md §4.3/§4.5).
// The worker loop shape (wait on condvar, dequeue one id, run one step,
// push the result) carries over directly from the teacher crate's
// `ChanInner`/`Waiter` send-receive pattern, generalized from a
// cross-process shared-memory ring to an in-process one.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::handle::Handle;
use crate::handler::RequestHandler;
use crate::pool::{RequestPool, SlotStorage};
use crate::request::State;
use crate::ring::RingQueue;
use crate::sync_queue::{IncomingSync, OutgoingSync};

#[cfg(not(target_arch = "wasm32"))]
struct Worker {
    thread_incoming: Arc<IncomingSync>,
    thread_outgoing: Arc<OutgoingSync>,
    join: Option<JoinHandle<()>>,
}

#[cfg(not(target_arch = "wasm32"))]
impl Worker {
    fn spawn(channel_index: u32, num_lanes: u32, slots: Arc<SlotStorage>, handler: Arc<dyn RequestHandler>) -> Self {
        let thread_incoming = Arc::new(IncomingSync::new(num_lanes as usize));
        let thread_outgoing = Arc::new(OutgoingSync::new(num_lanes as usize));
        let incoming = Arc::clone(&thread_incoming);
        let outgoing = Arc::clone(&thread_outgoing);
        let join = std::thread::Builder::new()
            .name(format!("fetchcore-ch{channel_index}"))
            .spawn(move || Self::run(incoming, outgoing, slots, handler))
            .expect("failed to spawn channel worker thread");
        Self {
            thread_incoming,
            thread_outgoing,
            join: Some(join),
        }
    }

    fn run(incoming: Arc<IncomingSync>, outgoing: Arc<OutgoingSync>, slots: Arc<SlotStorage>, handler: Arc<dyn RequestHandler>) {
        use crate::handler::ThreadView;
        loop {
            let Some(id) = incoming.wait_pop() else {
                break;
            };
            let index = Handle::from_id(id).index();
            let req = unsafe { slots.get(index) };
            let view = ThreadView::new(req, index);
            handler.run_step(view);
            outgoing.push(id);
        }
    }

    fn shutdown(&mut self) {
        self.thread_incoming.request_stop();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// One channel's queues, lane allocator, and (native) worker thread.
pub(crate) struct Channel {
    pub(crate) index: u32,
    pub(crate) free_lanes: RingQueue,
    pub(crate) user_sent: RingQueue,
    pub(crate) user_incoming: RingQueue,
    pub(crate) user_outgoing: RingQueue,
    #[cfg(not(target_arch = "wasm32"))]
    worker: Worker,
    #[cfg(target_arch = "wasm32")]
    handler: Arc<dyn RequestHandler>,
    #[cfg(target_arch = "wasm32")]
    slots: Arc<SlotStorage>,
    /// On wasm32, the `HttpHandler` is handed a clone of this same
    /// `OutgoingSync` so its asynchronous JS completion closures - which may
    /// fire well after `cross_to_worker` returns, between `do_work` calls -
    /// have somewhere to deposit finished slot ids. `cross_to_worker` drains
    /// it into `user_outgoing` on every call, picking up anything that
    /// completed since the previous tick.
    #[cfg(target_arch = "wasm32")]
    async_outgoing: Arc<OutgoingSync>,
}

impl Channel {
    #[cfg(not(target_arch = "wasm32"))]
    pub(crate) fn new(
        index: u32,
        max_requests: u32,
        num_lanes: u32,
        slots: Arc<SlotStorage>,
        handler: Arc<dyn RequestHandler>,
    ) -> Self {
        let mut free_lanes = RingQueue::new(num_lanes as usize);
        for lane in 0..num_lanes {
            free_lanes.enqueue(lane);
        }
        let worker = Worker::spawn(index, num_lanes, Arc::clone(&slots), handler);
        Self {
            index,
            free_lanes,
            user_sent: RingQueue::new(max_requests as usize),
            user_incoming: RingQueue::new(num_lanes as usize),
            user_outgoing: RingQueue::new(num_lanes as usize),
            worker,
        }
    }

    /// `async_outgoing` must be the same instance the caller built `handler`
    /// with (see [`HttpHandler::new`](crate::backend::http::HttpHandler::new)) -
    /// it is the channel's only path for an asynchronous JS completion to
    /// reach `user_outgoing`.
    #[cfg(target_arch = "wasm32")]
    pub(crate) fn new(
        index: u32,
        max_requests: u32,
        num_lanes: u32,
        slots: Arc<SlotStorage>,
        handler: Arc<dyn RequestHandler>,
        async_outgoing: Arc<OutgoingSync>,
    ) -> Self {
        let mut free_lanes = RingQueue::new(num_lanes as usize);
        for lane in 0..num_lanes {
            free_lanes.enqueue(lane);
        }
        Self {
            index,
            free_lanes,
            user_sent: RingQueue::new(max_requests as usize),
            user_incoming: RingQueue::new(num_lanes as usize),
            user_outgoing: RingQueue::new(num_lanes as usize),
            handler,
            slots,
            async_outgoing,
        }
    }

    /// Step 3 of the pump (spec.md §4.4): hand `user_incoming` to the
    /// worker and pull anything it has finished back into `user_outgoing`.
    /// On wasm32 there is no worker thread - the handler runs inline and
    /// deposits completions (synchronous or asynchronous) into
    /// `async_outgoing`, which is drained here on every call.
    ///
    /// Only slots actually in `Opening`/`Fetching` cross to the real worker
    /// thread - a `Paused` slot has nothing for a `RequestHandler` to do,
    /// and a slot `apply_flags_and_progress` just terminated via `cancel`
    /// needs its one terminal callback delivered within this same tick, not
    /// after a round trip through another thread's scheduling latency.
    /// Those go straight onto `user_outgoing`.
    #[cfg(not(target_arch = "wasm32"))]
    pub(crate) fn cross_to_worker(&mut self, pool: &RequestPool) {
        let count = self.user_incoming.count();
        for _ in 0..count {
            let id = self.user_incoming.dequeue();
            let needs_io = pool
                .lookup(Handle::from_id(id))
                .map(|req| matches!(req.state, State::Opening | State::Fetching))
                .unwrap_or(false);
            if needs_io {
                self.worker.thread_incoming.push_many(&[id]);
            } else {
                self.user_outgoing.enqueue(id);
            }
        }
        self.worker.thread_outgoing.splice_into(&mut self.user_outgoing);
    }

    #[cfg(target_arch = "wasm32")]
    pub(crate) fn cross_to_worker(&mut self, _pool: &RequestPool) {
        use crate::handler::ThreadView;
        while !self.user_incoming.empty() {
            let id = self.user_incoming.dequeue();
            let index = Handle::from_id(id).index();
            let req = unsafe { self.slots.get(index) };
            let view = ThreadView::new(req, index);
            self.handler.run_step(view);
        }
        self.async_outgoing.splice_into(&mut self.user_outgoing);
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub(crate) fn shutdown(&mut self) {
        self.worker.shutdown();
    }

    #[cfg(target_arch = "wasm32")]
    pub(crate) fn shutdown(&mut self) {}
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
