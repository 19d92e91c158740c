// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 fetchcore contributors
//
// Native filesystem `RequestHandler` (spec.md §4.6). Runs on a channel's
// worker thread. Exact open/size/read/close sequencing and the
// OPENING-falls-through-to-FETCHING-if-a-buffer-is-already-bound shortcut
// follow `sokol_fetch.h`'s `_sfetch_file_*` wrappers and
// `_sfetch_channel_thread_func` step logic line for line.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::error::HandlerError;
use crate::handler::{RequestHandler, ThreadView};

/// Reads local files with `std::fs`/`std::io`. The one always-compiled
/// backend - used by every native (non-wasm32) end-to-end test and the
/// default choice for desktop/server embedders.
#[derive(Default)]
pub struct FilesystemHandler;

impl FilesystemHandler {
    pub fn new() -> Self {
        Self
    }
}

impl RequestHandler for FilesystemHandler {
    fn run_step(&self, mut view: ThreadView<'_>) {
        if view.is_opening() {
            let opened = self.open(&mut view);
            // Falls through to fetching in the same step if a buffer was
            // already bound at send() time - latency shortcut (spec.md §4.6).
            if opened && view.buffer().is_some() {
                self.fetch(&mut view);
            }
            return;
        }
        if view.is_fetching() {
            self.fetch(&mut view);
        }
        // Paused/Failed: no-op, the pump handles these.
    }
}

impl FilesystemHandler {
    /// Returns `true` if the file was opened successfully.
    fn open(&self, view: &mut ThreadView<'_>) -> bool {
        match File::open(view.path()) {
            Ok(mut file) => {
                let size = file.seek(SeekFrom::End(0)).unwrap_or(0);
                let _ = file.seek(SeekFrom::Start(0));
                view.set_content_size(size);
                view.set_file(Some(file));
                true
            }
            Err(err) => {
                log::warn!(
                    "fetchcore: {} ({:?})",
                    HandlerError::Open(err),
                    view.path()
                );
                view.mark_failed();
                false
            }
        }
    }

    fn fetch(&self, view: &mut ThreadView<'_>) {
        let Some((buf_ptr, buf_size)) = view.buffer() else {
            log::warn!("fetchcore: {} ({:?})", HandlerError::NoBuffer, view.path());
            view.mark_failed();
            return;
        };
        if buf_size == 0 {
            log::warn!("fetchcore: {} ({:?})", HandlerError::NoBuffer, view.path());
            view.mark_failed();
            return;
        }
        let remaining = view.content_size().saturating_sub(view.read_offset());
        let to_read = remaining.min(buf_size as u64) as usize;
        let offset = view.read_offset();

        let result = view.file_mut().and_then(|file| {
            if file.seek(SeekFrom::Start(offset)).is_err() {
                return None;
            }
            let dest = unsafe { std::slice::from_raw_parts_mut(buf_ptr, to_read) };
            let mut total = 0usize;
            while total < to_read {
                match file.read(&mut dest[total..]) {
                    Ok(0) => break,
                    Ok(n) => total += n,
                    Err(_) => return None,
                }
            }
            Some(total)
        });

        match result {
            Some(got) if got == to_read => {
                view.advance(got as u64);
            }
            other => {
                let got = other.unwrap_or(0);
                log::warn!(
                    "fetchcore: {} ({:?})",
                    HandlerError::ShortRead { expected: to_read, got },
                    view.path()
                );
                view.mark_failed();
            }
        }

        if view.failed() || view.is_exhausted() {
            view.take_file();
            view.mark_finished();
        }
    }
}
