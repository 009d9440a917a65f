//! Benchmarks for the two hot paths: identifier hashing at registration time
//! and value updates through a live mapping.

#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use mmv::{Client, Config, Counter, FileFlags, Gauge};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

const NAMES: &[&str] = &[
    "a",
    "requests.total",
    "sheep.legs.available",
    "it_takes_a_big_man_to_cry_but_it_takes_a_bigger_man_to_laugh_at_that_man",
];

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration");

    group.bench_function("counter_new", |b| {
        b.iter(|| Counter::new(black_box(0), black_box("bench.counter")));
    });

    group.finish();

    let mut group = c.benchmark_group("mapped_updates");

    let dir = tempfile::tempdir().unwrap();
    let config = Config::empty()
        .with_root("/")
        .with_value("PCP_TMP_DIR", dir.path().to_str().unwrap());

    let client = Client::with_config("bench", FileFlags::PROCESS, &config).unwrap();
    let counter = Counter::new(0, "bench.counter").unwrap();
    let gauge = Gauge::new(0.0, "bench.gauge").unwrap();
    client.register(&counter).unwrap();
    client.register(&gauge).unwrap();
    client.start().unwrap();

    group.bench_function("counter_up", |b| {
        b.iter(|| counter.up());
    });

    group.bench_function("gauge_set_changed", |b| {
        let mut v = 0.0_f64;
        b.iter(|| {
            v += 1.0;
            gauge.set(black_box(v)).unwrap();
        });
    });

    group.bench_function("gauge_set_unchanged", |b| {
        gauge.set(1.0).unwrap();
        b.iter(|| gauge.set(black_box(1.0)).unwrap());
    });

    group.finish();

    client.stop().unwrap();

    // Hashing dominates identifier derivation for long names; measure a
    // spread of lengths the way metrics are actually named.
    let mut group = c.benchmark_group("name_hash");

    for name in NAMES {
        group.bench_function(format!("len_{}", name.len()), |b| {
            b.iter(|| Counter::new(0, black_box(name)));
        });
    }

    group.finish();
}
