//! # Pool Benchmark
//!
//! Measures what the custom allocators cost against the system heap:
//! 1. Pool construct/destruct vs `Box::new`/drop
//! 2. Tracked allocate/deallocate vs raw `std::alloc`
//!
//! Target: pool churn well under the cost of a heap round trip.

#![allow(unsafe_code)]
#![allow(missing_docs)]

use std::alloc::{self, Layout};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use memlab_core::{PoolAllocator, TrackingAllocator};

#[derive(Default)]
struct Particle {
    position: [f32; 3],
    velocity: [f32; 3],
    life: f32,
}

const POOL_SIZE: usize = 4096;

/// Benchmark filling and draining a pool vs boxing the same objects
fn bench_pool_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_churn");

    for batch in [64usize, 512, POOL_SIZE] {
        let mut pool: PoolAllocator<Particle, POOL_SIZE> = PoolAllocator::new();
        let mut handles = Vec::with_capacity(batch);

        group.bench_with_input(BenchmarkId::new("pool", batch), &batch, |b, &batch| {
            b.iter(|| {
                for i in 0..batch {
                    let particle = Particle {
                        life: i as f32,
                        ..Particle::default()
                    };
                    handles.push(pool.construct(particle).unwrap());
                }
                for handle in handles.drain(..) {
                    black_box(pool.take(handle).unwrap());
                }
            });
        });

        let mut boxes = Vec::with_capacity(batch);
        group.bench_with_input(BenchmarkId::new("box", batch), &batch, |b, &batch| {
            b.iter(|| {
                for i in 0..batch {
                    boxes.push(Box::new(Particle {
                        life: i as f32,
                        ..Particle::default()
                    }));
                }
                for particle in boxes.drain(..) {
                    black_box(particle);
                }
            });
        });
    }

    group.finish();
}

/// Benchmark the header bookkeeping on top of the system allocator
fn bench_tracking_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracking_overhead");

    for count in [1usize, 64, 4096] {
        let mut tracker: TrackingAllocator<u64> = TrackingAllocator::new();
        group.bench_with_input(BenchmarkId::new("tracked", count), &count, |b, &count| {
            b.iter(|| {
                let block = tracker.allocate(black_box(count)).unwrap();
                // SAFETY: released once, by the tracker that allocated it.
                unsafe { tracker.deallocate(block.as_ptr()) };
            });
        });

        let layout = Layout::array::<u64>(count).unwrap();
        group.bench_with_input(BenchmarkId::new("system", count), &layout, |b, &layout| {
            b.iter(|| {
                // SAFETY: non-zero layout, freed with the same layout.
                unsafe {
                    let block = alloc::alloc(black_box(layout));
                    alloc::dealloc(block, layout);
                }
            });
        });
    }

    group.finish();
}

fn read_particle(p: &Particle) -> f32 {
    p.position[0] + p.velocity[0] + p.life
}

/// Benchmark handle lookups in a full pool
fn bench_pool_lookup(c: &mut Criterion) {
    let mut pool: PoolAllocator<Particle, POOL_SIZE> = PoolAllocator::new();
    let handles: Vec<_> = (0..POOL_SIZE)
        .map(|_| pool.construct_default().unwrap())
        .collect();

    c.bench_function("pool_lookup_all", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for &handle in &handles {
                sum += read_particle(pool.get(handle).unwrap());
            }
            black_box(sum)
        });
    });
}

criterion_group!(benches, bench_pool_churn, bench_tracking_overhead, bench_pool_lookup);
criterion_main!(benches);
