// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 fetchcore contributors
//
// Single-threaded HTTP `RequestHandler` for the wasm32 target (spec.md
// §4.7). The browser has no worker thread to dispatch to, so this backend
// issues an `XMLHttpRequest` via `web-sys` and arranges for the completion
// to be pushed directly onto `user_outgoing` from the JS callback, exactly
// as `sokol_fetch.h`'s emscripten path does with
// `_sfetch_emsc_head_response`/`_sfetch_emsc_range_response`/
// `_sfetch_emsc_failed`. Not exercised by this crate's native test suite -
// the concrete I/O backend is an external-collaborator concern per
// spec.md §1; this implements the capability contract structurally.
#![cfg(target_arch = "wasm32")]

use std::sync::Arc;

use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys::XmlHttpRequest;

use crate::error::HandlerError;
use crate::handler::{RequestHandler, ThreadView};
use crate::pool::SlotStorage;
use crate::sync_queue::OutgoingSync;

/// Issues HEAD-then-ranged-GET requests against `path` treated as a URL.
pub struct HttpHandler {
    slots: Arc<SlotStorage>,
    outgoing: Arc<OutgoingSync>,
}

impl HttpHandler {
    /// `slots` and `outgoing` must be the same instances the owning
    /// `Channel` was built with - this backend reaches back into them from
    /// asynchronous JS callbacks, outside the normal pump call stack.
    pub fn new(slots: Arc<SlotStorage>, outgoing: Arc<OutgoingSync>) -> Self {
        Self { slots, outgoing }
    }

    /// Re-enter `index`, checking the captured `handle_id` still matches
    /// (the slot may have been recycled while the async request was in
    /// flight - spec.md §1: cancellation is only observed at pump
    /// boundaries, so an in-flight request's completion must still be
    /// discarded safely if its slot was freed and reused).
    fn with_live_slot<F: FnOnce(&mut crate::request::Request)>(
        slots: &SlotStorage,
        index: u16,
        handle_id: u32,
        f: F,
    ) {
        let req = unsafe { slots.get(index) };
        if req.handle_id == handle_id {
            f(req);
        }
    }

    fn send_range_request(slots: Arc<SlotStorage>, outgoing: Arc<OutgoingSync>, index: u16, handle_id: u32) {
        let (path, offset, to_read, buf_ptr) = {
            let req = unsafe { slots.get(index) };
            if req.handle_id != handle_id {
                return;
            }
            let buf = req.user.buffer;
            if !buf.is_bound() {
                log::warn!("fetchcore: {} ({})", HandlerError::NoBuffer, req.user.path_str());
                req.thread.failed = true;
                req.thread.finished = true;
                outgoing.push(handle_id);
                return;
            }
            let remaining = req.thread.content_size.saturating_sub(req.thread.cursor);
            let to_read = remaining.min(buf.size as u64) as usize;
            (
                req.user.path_str().to_string(),
                req.thread.cursor,
                to_read,
                buf.ptr,
            )
        };

        let xhr = match XmlHttpRequest::new() {
            Ok(xhr) => xhr,
            Err(_) => {
                log::warn!(
                    "fetchcore: {} ({})",
                    HandlerError::Transport("failed to construct XMLHttpRequest".into()),
                    path
                );
                Self::with_live_slot(&slots, index, handle_id, |req| {
                    req.thread.failed = true;
                    req.thread.finished = true;
                });
                outgoing.push(handle_id);
                return;
            }
        };
        let _ = xhr.open("GET", &path);
        xhr.set_response_type(web_sys::XmlHttpRequestResponseType::Arraybuffer);
        let need_range = !(offset == 0 && to_read as u64 == {
            let req = unsafe { slots.get(index) };
            req.thread.content_size
        });
        if need_range {
            let _ = xhr.set_request_header("Range", &format!("bytes={}-{}", offset, offset + to_read as u64));
        }

        let xhr_clone = xhr.clone();
        let slots_cb = Arc::clone(&slots);
        let outgoing_cb = Arc::clone(&outgoing);
        let onload = Closure::<dyn FnMut()>::new(move || {
            if xhr_clone.ready_state() != XmlHttpRequest::DONE {
                return;
            }
            let status = xhr_clone.status().unwrap_or(0);
            let ok = status == 206 || (status == 200 && !need_range);
            if ok {
                if let Ok(resp) = xhr_clone.response() {
                    let array = js_sys::Uint8Array::new(&resp);
                    let got = array.length() as usize;
                    Self::with_live_slot(&slots_cb, index, handle_id, |req| unsafe {
                        let dest = std::slice::from_raw_parts_mut(buf_ptr, got);
                        array.copy_to(dest);
                        req.thread.content_offset = req.thread.cursor;
                        req.thread.fetched_size = got as u64;
                        req.thread.cursor += got as u64;
                        if req.thread.cursor >= req.thread.content_size {
                            req.thread.finished = true;
                        }
                    });
                    outgoing_cb.push(handle_id);
                    return;
                }
            }
            Self::with_live_slot(&slots_cb, index, handle_id, |req| {
                req.thread.failed = true;
                req.thread.finished = true;
            });
            outgoing_cb.push(handle_id);
        });
        xhr.set_onreadystatechange(Some(onload.as_ref().unchecked_ref()));
        onload.forget();
        let _ = xhr.send();
    }

    fn send_head_request(slots: Arc<SlotStorage>, outgoing: Arc<OutgoingSync>, index: u16, handle_id: u32) {
        let path = {
            let req = unsafe { slots.get(index) };
            if req.handle_id != handle_id {
                return;
            }
            req.user.path_str().to_string()
        };
        let xhr = match XmlHttpRequest::new() {
            Ok(xhr) => xhr,
            Err(_) => {
                Self::with_live_slot(&slots, index, handle_id, |req| {
                    req.thread.failed = true;
                    req.thread.finished = true;
                });
                outgoing.push(handle_id);
                return;
            }
        };
        let _ = xhr.open("HEAD", &path);
        let xhr_clone = xhr.clone();
        let slots_cb = Arc::clone(&slots);
        let outgoing_cb = Arc::clone(&outgoing);
        let onload = Closure::<dyn FnMut()>::new(move || {
            if xhr_clone.ready_state() != XmlHttpRequest::DONE {
                return;
            }
            let status = xhr_clone.status().unwrap_or(0);
            if status == 200 {
                let content_length: u64 = xhr_clone
                    .get_response_header("Content-Length")
                    .ok()
                    .flatten()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                let has_buffer = {
                    let req = unsafe { slots_cb.get(index) };
                    if req.handle_id != handle_id {
                        return;
                    }
                    req.thread.content_size = content_length;
                    req.user.buffer.is_bound()
                };
                if has_buffer {
                    Self::send_range_request(Arc::clone(&slots_cb), Arc::clone(&outgoing_cb), index, handle_id);
                } else {
                    outgoing_cb.push(handle_id);
                }
            } else {
                Self::with_live_slot(&slots_cb, index, handle_id, |req| {
                    req.thread.failed = true;
                    req.thread.finished = true;
                });
                outgoing_cb.push(handle_id);
            }
        });
        xhr.set_onreadystatechange(Some(onload.as_ref().unchecked_ref()));
        onload.forget();
        let _ = xhr.send();
    }
}

impl RequestHandler for HttpHandler {
    fn run_step(&self, view: ThreadView<'_>) {
        let index = view.slot_index();
        let handle_id = view.handle_id();
        let is_opening = view.is_opening();
        let is_fetching = view.is_fetching();
        drop(view);

        if is_opening {
            Self::send_head_request(Arc::clone(&self.slots), Arc::clone(&self.outgoing), index, handle_id);
        } else if is_fetching {
            Self::send_range_request(Arc::clone(&self.slots), Arc::clone(&self.outgoing), index, handle_id);
        } else {
            // Paused/cancelled/other: re-enqueue unchanged so it is not lost.
            self.outgoing.push(handle_id);
        }
    }
}

// Safety: all mutable access to a slot from JS callbacks re-checks the
// captured handle_id against the slot's current occupant before touching
// any field, matching the pool's own staleness protocol.
unsafe impl Send for HttpHandler {}
unsafe impl Sync for HttpHandler {}
