//! Propagation benchmarks: fan-out writes, deep chains, diamonds and
//! batched writes.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use lattice_signals::{batch, computed, effect, signal, Computed, Dispose, Signal};

fn chain(source: &Signal<u64>, depth: usize) -> Computed<u64> {
    let read = source.clone();
    let mut tail = computed(move |_| read.get());
    for _ in 1..depth {
        let prev = tail.clone();
        tail = computed(move |_| prev.get() + 1);
    }
    tail
}

fn watch(node: &Computed<u64>) -> Dispose {
    let read = node.clone();
    effect(move |_| {
        black_box(read.get());
    })
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for &width in &[10_usize, 100, 1_000] {
        let source = signal(0_u64);
        let stops: Vec<Dispose> = (0..width)
            .map(|i| {
                let read = source.clone();
                let derived = computed(move |_| read.get() + i as u64);
                watch(&derived)
            })
            .collect();

        let mut next = 0;
        group.bench_function(format!("width={width}"), |b| {
            b.iter(|| {
                next += 1;
                source.set(next);
            })
        });

        for stop in stops {
            stop.dispose();
        }
    }
    group.finish();
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");
    for &depth in &[10_usize, 100, 200] {
        let source = signal(0_u64);
        let tail = chain(&source, depth);
        let stop = watch(&tail);

        let mut next = 0;
        group.bench_function(format!("depth={depth}"), |b| {
            b.iter(|| {
                next += 1;
                source.set(next);
            })
        });
        stop.dispose();
    }
    group.finish();
}

fn bench_diamond_and_batch(c: &mut Criterion) {
    let source = signal(0_u64);
    let read = source.clone();
    let left = computed(move |_| read.get() + 1);
    let read = source.clone();
    let right = computed(move |_| read.get() * 2);
    let bottom = computed(move |_| left.get() + right.get());
    let stop = watch(&bottom);

    let mut next = 0;
    c.bench_function("diamond_write", |b| {
        b.iter(|| {
            next += 1;
            source.set(next);
        })
    });

    let others: Vec<Signal<u64>> = (0..32).map(signal).collect();
    let reads = others.clone();
    let sum = computed(move |_| reads.iter().map(Signal::get).sum::<u64>());
    let sum_stop = watch(&sum);

    let mut round = 0;
    c.bench_function("batch_32_writes", |b| {
        b.iter(|| {
            round += 1;
            batch(|| {
                for other in &others {
                    other.set(round);
                }
            });
        })
    });

    sum_stop.dispose();
    stop.dispose();
}

fn bench_pull(c: &mut Criterion) {
    let source = signal(0_u64);
    let tail = chain(&source, 100);

    let mut next = 0;
    c.bench_function("unwatched_pull_depth=100", |b| {
        b.iter(|| {
            next += 1;
            source.set(next);
            black_box(tail.get())
        })
    });
}

criterion_group!(
    benches,
    bench_fan_out,
    bench_chain,
    bench_diamond_and_batch,
    bench_pull
);
criterion_main!(benches);
