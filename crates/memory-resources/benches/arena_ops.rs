// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for arena construction and allocation throughput.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use memory_resources::{Arena, Capacity};

fn bench_arena_create(c: &mut Criterion) {
    c.bench_function("arena_create_default", |b| {
        b.iter(|| {
            let arena = Arena::new().unwrap();
            black_box(arena.total_size())
        });
    });
}

fn bench_allocate_release(c: &mut Criterion) {
    c.bench_function("arena_alloc_dealloc_64b", |b| {
        let mut arena = Arena::new().unwrap();
        b.iter(|| {
            let p = arena.allocate(black_box(64), 8).unwrap();
            arena.deallocate(p, 64, 8);
        });
    });
}

fn bench_bulk_int_inserts(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_insert_1024_ints");

    group.bench_function("arena", |b| {
        b.iter_batched_ref(
            || Arena::with_capacity(Capacity::from_mib(4)).unwrap(),
            |arena| {
                for i in 0..1024i32 {
                    let p = arena.allocate(4, 4).unwrap();
                    unsafe { p.as_ptr().cast::<i32>().write(i) };
                }
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("vec_baseline", |b| {
        b.iter(|| {
            let mut values = Vec::new();
            for i in 0..1024i32 {
                values.push(black_box(i));
            }
            black_box(values.len())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_arena_create,
    bench_allocate_release,
    bench_bulk_int_inserts
);
criterion_main!(benches);
