// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 fetchcore contributors
//
// End-to-end lifecycle scenarios against the native filesystem backend:
// a small file with a buffer pre-bound at send time, a file streamed in
// chunks through a buffer smaller than the file, and a missing file.

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fetchcore::{Config, Engine, Response, SendParams};

mod support;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{n}")
}

#[derive(Clone, Debug)]
struct Recorded {
    opened: bool,
    fetched: bool,
    paused: bool,
    finished: bool,
    failed: bool,
    cancelled: bool,
    content_size: u64,
    content_offset: u64,
    fetched_size: u64,
    data: Vec<u8>,
}

thread_local! {
    static LOG: RefCell<Vec<Recorded>> = RefCell::new(Vec::new());
}

fn record(resp: &Response) {
    LOG.with(|log| {
        log.borrow_mut().push(Recorded {
            opened: resp.opened,
            fetched: resp.fetched,
            paused: resp.paused,
            finished: resp.finished,
            failed: resp.failed,
            cancelled: resp.cancelled,
            content_size: resp.content_size,
            content_offset: resp.content_offset,
            fetched_size: resp.fetched_size,
            data: resp.fetched_data().to_vec(),
        });
    });
}

fn take_log() -> Vec<Recorded> {
    LOG.with(|log| log.borrow_mut().drain(..).collect())
}

/// Keep pumping until `finished` is observed (or `max_iters` ticks pass),
/// returning every callback observed along the way in order.
fn pump_until_finished(engine: &mut Engine, max_iters: usize) -> Vec<Recorded> {
    let mut all = Vec::new();
    for _ in 0..max_iters {
        engine.do_work();
        all.extend(take_log());
        if all.iter().any(|r| r.finished) {
            return all;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    all
}

#[test]
fn small_file_buffer_prebound() {
    support::init_logging();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(unique_name("small"));
    std::fs::write(&path, b"hello").expect("write fixture");

    let mut engine = Engine::setup(Config {
        max_requests: 8,
        num_channels: 1,
        num_lanes: 1,
    });

    let mut buf = vec![0u8; 64];
    let handle = engine.send(
        SendParams::new(path.to_str().unwrap(), record).with_buffer(buf.as_mut_ptr(), buf.len()),
    );
    assert!(handle.is_valid());

    let log = pump_until_finished(&mut engine, 200);

    assert_eq!(log.len(), 1, "expected exactly one callback, got {log:?}");
    let r = &log[0];
    assert!(r.fetched);
    assert!(r.finished);
    assert!(!r.failed);
    assert_eq!(r.content_size, 5);
    assert_eq!(r.content_offset, 0);
    assert_eq!(r.fetched_size, 5);
    assert_eq!(r.data, b"hello");

    engine.shutdown();
}

#[test]
fn streamed_in_chunks() {
    support::init_logging();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(unique_name("chunks"));
    std::fs::write(&path, b"0123456789").expect("write fixture");

    let mut engine = Engine::setup(Config {
        max_requests: 8,
        num_channels: 1,
        num_lanes: 1,
    });

    let mut buf = vec![0u8; 4];
    let handle = engine.send(
        SendParams::new(path.to_str().unwrap(), record).with_buffer(buf.as_mut_ptr(), buf.len()),
    );
    assert!(handle.is_valid());

    let log = pump_until_finished(&mut engine, 400);

    assert_eq!(log.len(), 3, "expected three chunks, got {log:?}");
    assert!(log.iter().all(|r| r.fetched && !r.failed));

    assert_eq!(log[0].content_offset, 0);
    assert_eq!(log[0].fetched_size, 4);
    assert_eq!(log[0].data, b"0123");
    assert!(!log[0].finished);

    assert_eq!(log[1].content_offset, 4);
    assert_eq!(log[1].fetched_size, 4);
    assert_eq!(log[1].data, b"4567");
    assert!(!log[1].finished);

    assert_eq!(log[2].content_offset, 8);
    assert_eq!(log[2].fetched_size, 2);
    assert_eq!(log[2].data, b"89");
    assert!(log[2].finished);

    engine.shutdown();
}

#[test]
fn missing_file_fails() {
    support::init_logging();
    let mut engine = Engine::setup(Config {
        max_requests: 8,
        num_channels: 1,
        num_lanes: 1,
    });

    let handle = engine.send(SendParams::new("/does/not/exist/fetchcore-test", record));
    assert!(handle.is_valid());

    let log = pump_until_finished(&mut engine, 200);

    assert_eq!(log.len(), 1, "expected exactly one callback, got {log:?}");
    let r = &log[0];
    assert!(r.failed);
    assert!(r.finished);
    assert!(!r.cancelled);
    assert_eq!(r.content_size, 0);

    engine.shutdown();
}
