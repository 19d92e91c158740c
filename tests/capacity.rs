// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 fetchcore contributors
//
// Capacity invariants: a third `send` past pool exhaustion is rejected, the
// per-channel lane cap bounds how many requests are ever mid-flight at once,
// and a handle goes stale (and every control call on it becomes a no-op)
// once its terminal callback has fired.

use std::cell::RefCell;
use std::collections::HashSet;
use std::time::Duration;

use fetchcore::{Config, Engine, Handle, Response, SendParams};

mod support;

#[derive(Clone, Debug)]
struct Recorded {
    handle: Handle,
    finished: bool,
}

thread_local! {
    static LOG: RefCell<Vec<Recorded>> = RefCell::new(Vec::new());
}

fn record(resp: &Response) {
    LOG.with(|log| {
        log.borrow_mut().push(Recorded {
            handle: resp.handle,
            finished: resp.finished,
        });
    });
}

fn take_log() -> Vec<Recorded> {
    LOG.with(|log| log.borrow_mut().drain(..).collect())
}

#[test]
fn pool_exhaustion_rejects_third_send() {
    support::init_logging();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("exhaust.txt");
    std::fs::write(&path, b"x").expect("write fixture");
    let path = path.to_str().unwrap();

    let mut engine = Engine::setup(Config {
        max_requests: 2,
        num_channels: 1,
        num_lanes: 1,
    });

    // Do not do_work() between sends, so nothing gets freed: both slots
    // (capacity 2) stay occupied and the third send has nowhere to go.
    let a = engine.send(SendParams::new(path, record));
    let b = engine.send(SendParams::new(path, record));
    let c = engine.send(SendParams::new(path, record));

    assert!(a.is_valid());
    assert!(b.is_valid());
    assert!(!c.is_valid(), "third send should fail once the pool is exhausted");
    assert_eq!(c.id(), 0);
    assert!(!engine.handle_valid(c));

    engine.shutdown();
}

#[test]
fn stale_handle_rejects_control_calls() {
    support::init_logging();
    let mut engine = Engine::setup(Config {
        max_requests: 4,
        num_channels: 1,
        num_lanes: 1,
    });

    let handle = engine.send(SendParams::new("/does/not/exist/fetchcore-stale", record));
    assert!(handle.is_valid());

    let mut finished = false;
    for _ in 0..200 {
        engine.do_work();
        if take_log().iter().any(|r| r.finished) {
            finished = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(finished, "missing-file request should fail and finish quickly");
    assert!(!engine.handle_valid(handle));

    // None of these should panic; they are documented no-ops on a stale handle.
    engine.pause(handle);
    engine.continue_(handle);
    engine.cancel(handle);
    engine.do_work();
    assert!(take_log().is_empty(), "a stale handle must never produce another callback");

    engine.shutdown();
}

#[test]
fn lane_cap_bounds_concurrent_fetching() {
    support::init_logging();
    const NUM_LANES: u32 = 2;

    let dir = tempfile::tempdir().expect("tempdir");
    let mut paths = Vec::new();
    for i in 0..4 {
        let p = dir.path().join(format!("lane_{i}.bin"));
        std::fs::write(&p, vec![9u8; 4096]).expect("write fixture");
        paths.push(p);
    }

    let mut engine = Engine::setup(Config {
        max_requests: 16,
        num_channels: 1,
        num_lanes: NUM_LANES,
    });

    let mut bufs: Vec<Vec<u8>> = (0..4).map(|_| vec![0u8; 256]).collect();
    let mut handles = Vec::new();
    for (i, p) in paths.iter().enumerate() {
        let h = engine.send(
            SendParams::new(p.to_str().unwrap(), record).with_buffer(bufs[i].as_mut_ptr(), bufs[i].len()),
        );
        assert!(h.is_valid());
        handles.push(h);
    }

    let mut active: HashSet<Handle> = HashSet::new();
    let mut max_seen = 0usize;
    for _ in 0..500 {
        engine.do_work();
        for r in take_log() {
            if r.finished {
                active.remove(&r.handle);
            } else {
                active.insert(r.handle);
            }
        }
        max_seen = max_seen.max(active.len());
        if handles.iter().all(|h| !engine.handle_valid(*h)) {
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    assert!(
        handles.iter().all(|h| !engine.handle_valid(*h)),
        "all four requests should have finished"
    );
    assert!(
        max_seen as u32 <= NUM_LANES,
        "observed {max_seen} concurrently in-flight requests, expected <= {NUM_LANES}"
    );

    engine.shutdown();
}
