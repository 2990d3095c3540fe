//! Increment queue benchmark — enqueue/dequeue throughput at the default
//! and a saturated queue depth.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use motion_server::queue::{Increment, IncrementQueue};

#[inline(never)]
fn fill_and_drain(queue: &IncrementQueue, count: usize) {
    for i in 0..count {
        queue.enqueue(
            Increment { time_ms: i as i64, ..Default::default() },
            Duration::from_millis(1),
            || true,
        );
    }
    while queue.dequeue_one().is_some() {}
}

fn bench_queue(c: &mut Criterion) {
    let mut group_benchmark = c.benchmark_group("increment_queue");
    for &capacity in &[50usize, 200, 1000] {
        group_benchmark.bench_with_input(BenchmarkId::new("capacity", capacity), &capacity, |b, &capacity| {
            let queue = IncrementQueue::new(capacity);
            b.iter(|| fill_and_drain(&queue, capacity));
        });
    }
    group_benchmark.finish();
}

criterion_group!(benches, bench_queue);
criterion_main!(benches);
