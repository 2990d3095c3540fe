//! Interpolator benchmark — measure one segment's cubic-Hermite stepping
//! cost across group sizes and segment durations.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use motion_common::config::GroupConfig;
use motion_common::consts::MAX_AXES_PER_GROUP;
use motion_server::group::{ControlGroup, JointMotionData};
use motion_server::interpolator::run_segment;

fn group_config(num_axes: usize) -> GroupConfig {
    GroupConfig {
        group_no: 0,
        name: "Bench".to_string(),
        num_axes,
        max_increment: [100_000; MAX_AXES_PER_GROUP],
        max_speed: [10.0; MAX_AXES_PER_GROUP],
        pulse_per_radian: [10_000.0; MAX_AXES_PER_GROUP],
        b_axis_slave: false,
    }
}

#[inline(never)]
fn run_one_segment(num_axes: usize, segment_ms: i64, period_ms: i64) {
    let mut group = ControlGroup::new(&group_config(num_axes), 4096);
    group.pending_traj = JointMotionData {
        valid_fields: 0b111,
        time_ms: segment_ms,
        pos: [0.5; MAX_AXES_PER_GROUP],
        vel: [0.1; MAX_AXES_PER_GROUP],
        acc: [0.0; MAX_AXES_PER_GROUP],
    };
    group.set_has_pending(true);
    run_segment(&mut group, period_ms, || true);
}

fn bench_interpolator(c: &mut Criterion) {
    let mut group_benchmark = c.benchmark_group("interpolator_segment");
    for &num_axes in &[1usize, 4, 8] {
        group_benchmark.bench_with_input(BenchmarkId::new("axes", num_axes), &num_axes, |b, &num_axes| {
            b.iter(|| run_one_segment(num_axes, 1000, 4));
        });
    }
    group_benchmark.finish();
}

criterion_group!(benches, bench_interpolator);
criterion_main!(benches);
