// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 fetchcore contributors
//
// Internal error taxonomy. Neither enum crosses the public `send`/`do_work`
// boundary directly - `send` still returns `Handle::INVALID` regardless of
// which `SendError` rejected it, and a `HandlerError` still collapses to the
// `failed`/`finished` flags on the `Response` the callback sees (spec.md
// §7). They exist so the rejection/failure reason is logged with real
// detail instead of ad hoc strings.

use std::io;

/// Why `Engine::send` rejected a request before a slot ever reached a
/// channel worker.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("invalid send parameters: {0}")]
    Validation(&'static str),
    #[error("request pool exhausted")]
    PoolExhausted,
    #[error("channel's user_sent queue overflowed")]
    QueueOverflow,
}

/// Why a `RequestHandler` step failed. Classified by the backend, consumed
/// by the pump when building the terminal `Response`.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("failed to open resource: {0}")]
    Open(#[source] io::Error),
    #[error("entered fetching state with no buffer bound")]
    NoBuffer,
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
    #[error("transport error: {0}")]
    Transport(String),
}

/// Why `Engine::bind_buffer`/`Engine::unbind_buffer` rejected a call
/// (spec.md §3: "`bind_buffer`/`unbind_buffer` may be called only inside
/// the response callback").
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("bind_buffer/unbind_buffer called outside the response callback")]
    NotInCallback,
    #[error("handle does not refer to a live request")]
    InvalidHandle,
    #[error("a buffer is already bound; unbind it first")]
    AlreadyBound,
}
