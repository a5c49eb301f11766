//! Allocator benchmarks.

use std::ptr::NonNull;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tagalloc::{Heap, DEFAULT_POWER};

const ARENA_WORDS: usize = 1 << 20;

fn with_heap(f: impl FnOnce(&mut Heap)) {
    let mut arena = vec![0u32; ARENA_WORDS];

    unsafe {
        let mut heap = Heap::new(
            NonNull::new_unchecked(arena.as_mut_ptr().cast()),
            ARENA_WORDS * 4,
            DEFAULT_POWER,
        )
        .unwrap();
        f(&mut heap);
    }
}

fn bench_alloc_release_cycle(c: &mut Criterion) {
    let sizes: &[usize] = &[16, 64, 256, 1024, 4096, 32768];
    let mut group = c.benchmark_group("alloc_release_cycle");

    for &size in sizes {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            with_heap(|heap| {
                b.iter(|| unsafe {
                    let p = heap.allocate(black_box(size)).unwrap();
                    heap.deallocate(Some(black_box(p)));
                });
            });
        });
    }
    group.finish();
}

fn bench_alloc_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_burst");

    group.bench_function("1000x64B", |b| {
        with_heap(|heap| {
            let mut pointers = Vec::with_capacity(1000);
            b.iter(|| unsafe {
                for _ in 0..1000 {
                    pointers.push(heap.allocate(black_box(64)).unwrap());
                }
                for &p in pointers.iter().rev() {
                    heap.deallocate(Some(p));
                }
                pointers.clear();
            });
        });
    });

    group.finish();
}

fn bench_grow_in_place(c: &mut Criterion) {
    let mut group = c.benchmark_group("resize");

    group.bench_function("grow_16B_to_16KiB", |b| {
        with_heap(|heap| {
            b.iter(|| unsafe {
                let mut p = heap.allocate(16).unwrap();
                let mut bytes = 16;
                while bytes < 16 * 1024 {
                    bytes *= 2;
                    p = heap.reallocate(Some(p), black_box(bytes)).unwrap();
                }
                heap.deallocate(Some(p));
            });
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_alloc_release_cycle,
    bench_alloc_burst,
    bench_grow_in_place
);
criterion_main!(benches);
