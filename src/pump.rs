// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 fetchcore contributors
//
// The `do_work` pump (spec.md §4.4): the per-tick, per-channel orchestrator
// that promotes backlog into lanes, applies control flags and state
// progression, crosses to the worker, and drains results back out to user
// callbacks. Runs two passes per tick as a latency optimization (spec.md §9
// design note "The two-pass pump") so a request that opens and gets a
// buffer bound in the first-pass callback can be dispatched to fetch in the
// same tick.

use std::cell::Cell;
use std::sync::atomic::Ordering;

use crate::channel::Channel;
use crate::handle::Handle;
use crate::pool::RequestPool;
use crate::request::{PauseIntent, Request, Response, State};

/// Run both passes of one tick across every channel. `in_callback` is set
/// for the duration of every user callback invocation (spec.md §3:
/// `bind_buffer`/`unbind_buffer` are only permitted while it is set).
pub(crate) fn do_work(channels: &mut [Channel], pool: &mut RequestPool, in_callback: &Cell<bool>) {
    for _pass in 0..2 {
        for channel in channels.iter_mut() {
            promote_sent(channel, pool);
            apply_flags_and_progress(channel, pool);
            channel.cross_to_worker(pool);
            drain_outgoing(channel, pool, in_callback);
        }
    }
}

/// Step 1: move `min(count(user_sent), count(free_lanes))` slots from
/// `user_sent` into `user_incoming`, each claiming a lane id.
fn promote_sent(channel: &mut Channel, pool: &RequestPool) {
    let movable = channel.user_sent.count().min(channel.free_lanes.count());
    for _ in 0..movable {
        let id = channel.user_sent.dequeue();
        let lane = channel.free_lanes.dequeue();
        if let Some(req) = pool.lookup(Handle::from_id(id)) {
            req.lane_index = lane;
        }
        channel.user_incoming.enqueue(id);
    }
}

/// Step 2: apply pending control flags to everything now sitting in
/// `user_incoming`, then the normal state progression.
fn apply_flags_and_progress(channel: &mut Channel, pool: &RequestPool) {
    let count = channel.user_incoming.count();
    for i in 0..count {
        let id = channel.user_incoming.peek(i);
        let handle = Handle::from_id(id);
        let Some(req) = pool.lookup(handle) else {
            continue;
        };

        if req.user.cancel.load(Ordering::Relaxed) {
            req.state = State::Failed;
            req.user.finished = true;
            continue;
        }
        let pending = req.user.pending_pause.swap(PauseIntent::NONE_TAG, Ordering::Relaxed);
        match PauseIntent::from_tag(pending) {
            Some(PauseIntent::Pause) => {
                req.state = State::Paused;
                continue;
            }
            Some(PauseIntent::Continue) if req.state == State::Paused => {
                req.state = State::Fetched;
            }
            _ => {}
        }

        req.state = match req.state {
            State::Allocated => State::Opening,
            State::Opened | State::Fetched => State::Fetching,
            other => other,
        };
    }
}

/// Step 4: classify, build the response, invoke the callback, and either
/// recycle the slot or requeue it for another hop.
fn drain_outgoing(channel: &mut Channel, pool: &mut RequestPool, in_callback: &Cell<bool>) {
    while !channel.user_outgoing.empty() {
        let id = channel.user_outgoing.dequeue();
        let handle = Handle::from_id(id);
        let Some(req) = pool.lookup(handle) else {
            continue;
        };

        req.user.content_size = req.thread.content_size;
        req.user.content_offset = req.thread.content_offset;
        req.user.fetched_size = req.thread.fetched_size;

        let was_opening = req.state == State::Opening;
        let fell_through = was_opening && req.user.buffer.is_bound();

        if req.thread.failed {
            req.state = State::Failed;
            req.user.finished = true;
        } else if fell_through {
            req.state = State::Fetched;
        } else {
            req.state = match req.state {
                State::Opening => State::Opened,
                State::Fetching => State::Fetched,
                other => other,
            };
        }
        if req.thread.finished {
            req.user.finished = true;
        }

        let response = build_response(handle, channel.index, req);
        let finished = response.finished;
        if let Some(callback) = req.callback {
            in_callback.set(true);
            callback(&response);
            in_callback.set(false);
        }

        if finished {
            channel.free_lanes.enqueue(req.lane_index);
            pool.free(handle);
        } else {
            channel.user_incoming.enqueue(id);
        }
    }
}

fn build_response(handle: Handle, channel: u32, req: &mut Request) -> Response {
    let opened = req.state == State::Opened;
    let fetched = req.state == State::Fetched;
    let paused = req.state == State::Paused;
    let failed = req.state == State::Failed;
    let cancelled = failed && req.user.cancel.load(Ordering::Relaxed);

    Response {
        handle,
        channel,
        lane: req.lane_index,
        opened,
        fetched,
        paused,
        finished: req.user.finished,
        failed,
        cancelled,
        path: req.user.path.as_ptr(),
        path_len: req.user.path_len as usize,
        user_data: req.user.user_data.as_mut_ptr(),
        user_data_len: req.user.user_data_len as usize,
        content_size: req.user.content_size,
        content_offset: req.user.content_offset,
        fetched_size: req.user.fetched_size,
        buffer_ptr: req.user.buffer.ptr,
        buffer_size: req.user.buffer.size,
    }
}
