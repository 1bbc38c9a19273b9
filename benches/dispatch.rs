//! Benchmarks for the interception hot path.
//!
//! Every instrumented call pays for a lookup, so these cover:
//! - Lookup misses against a populated registry
//! - Matched dispatch with one and with several observers
//! - Split-form enter/exit as used by trampolines

extern crate hybridscope;

use criterion::{criterion_group, criterion_main, Criterion};
use hybridscope::hook::{CallSite, Hook, Registry, TargetDescriptor, ValueCarrier};
use std::hint::black_box;

/// Registry with 1024 unrelated targets, one observer each.
fn populated() -> Registry {
    let registry = Registry::new();
    for i in 0..1024 {
        registry.register(
            Hook::new(
                "filler",
                TargetDescriptor::new("Game.dll", "Core", "Filler", format!("Method{i}"), 1),
            )
            .pre(|_, _| {}),
        );
    }
    registry
}

/// Benchmark a call that matches nothing.
fn bench_lookup_miss(c: &mut Criterion) {
    let registry = populated();
    let site = CallSite::new("Game.dll", "Core", "Player", "Update", 0);

    c.bench_function("dispatch_miss", |b| {
        b.iter(|| {
            let ret = registry.dispatch(black_box(&site), &[], || None);
            black_box(ret)
        });
    });
}

/// Benchmark a call matched by a single no-op observer.
fn bench_dispatch_single(c: &mut Criterion) {
    let registry = populated();
    registry.register(
        Hook::new("noop", TargetDescriptor::new("Game.dll", "Core", "Player", "TakeDamage", 1))
            .pre(|_, args| {
                black_box(args[0].as_i32());
            })
            .post(|_, ret| {
                black_box(ret);
            }),
    );
    let site = CallSite::new("Game.dll", "Core", "Player", "TakeDamage", 1);
    let args = [ValueCarrier::from_i32(25)];

    c.bench_function("dispatch_single_observer", |b| {
        b.iter(|| {
            let ret = registry.dispatch(black_box(&site), black_box(&args), || {
                Some(ValueCarrier::from_i32(0))
            });
            black_box(ret)
        });
    });
}

/// Benchmark fan-out to eight observers.
fn bench_dispatch_fan_out(c: &mut Criterion) {
    let registry = populated();
    let target = TargetDescriptor::new("Game.dll", "Core", "Player", "TakeDamage", 1);
    for _ in 0..8 {
        registry.register(Hook::new("noop", target.clone()).pre(|_, _| {}).post(|_, _| {}));
    }
    let site = CallSite::new("Game.dll", "Core", "Player", "TakeDamage", 1);
    let args = [ValueCarrier::from_i32(25)];

    c.bench_function("dispatch_eight_observers", |b| {
        b.iter(|| {
            let ret = registry.dispatch(black_box(&site), black_box(&args), || None);
            black_box(ret)
        });
    });
}

/// Benchmark the split enter/exit form.
fn bench_enter_exit(c: &mut Criterion) {
    let registry = populated();
    registry.register(Hook::new(
        "noop",
        TargetDescriptor::new("Game.dll", "Core", "Player", "TakeDamage", 1),
    ));
    let site = CallSite::new("Game.dll", "Core", "Player", "TakeDamage", 1);
    let args = [ValueCarrier::from_i32(25)];
    let ret = ValueCarrier::from_i32(0);

    c.bench_function("enter_exit_frame", |b| {
        b.iter(|| {
            let frame = registry.enter(black_box(&site), black_box(&args));
            frame.exit(Some(black_box(&ret)));
        });
    });
}

criterion_group!(
    benches,
    bench_lookup_miss,
    bench_dispatch_single,
    bench_dispatch_fan_out,
    bench_enter_exit
);
criterion_main!(benches);
