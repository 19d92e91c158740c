// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 fetchcore contributors
//
// Pump throughput: the cost of an idle `do_work` tick (no requests
// in flight) and the cost of driving a small pre-bound-buffer fetch to
// completion, end to end.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use fetchcore::{Config, Engine, Response, SendParams};

fn noop_callback(_resp: &Response) {}

fn bench_idle_tick(c: &mut Criterion) {
    let mut engine = Engine::setup(Config {
        max_requests: 128,
        num_channels: 1,
        num_lanes: 4,
    });

    c.bench_function("do_work_idle_tick", |b| {
        b.iter(|| {
            engine.do_work();
        })
    });

    engine.shutdown();
}

fn bench_small_file_round_trip(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bench.bin");
    std::fs::write(&path, vec![0xABu8; 512]).expect("write fixture");
    let path = path.to_str().unwrap();

    let mut engine = Engine::setup(Config {
        max_requests: 128,
        num_channels: 1,
        num_lanes: 4,
    });
    let mut buf = vec![0u8; 1024];

    c.bench_function("small_file_round_trip", |b| {
        b.iter(|| {
            let handle = engine.send(
                SendParams::new(path, noop_callback).with_buffer(buf.as_mut_ptr(), buf.len()),
            );
            black_box(handle);
            while engine.handle_valid(handle) {
                engine.do_work();
            }
        })
    });

    engine.shutdown();
}

criterion_group!(benches, bench_idle_tick, bench_small_file_round_trip);
criterion_main!(benches);
