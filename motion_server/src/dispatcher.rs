//! Realtime Dispatcher (§4.F): one task pinned to the interpolation clock,
//! draining every group's queue and calling the increment-move primitive.
//!
//! Follows the teacher's `CycleRunner` split: a `#[cfg(feature = "rt")]`
//! path paced by `clock_nanosleep(TIMER_ABSTIME)` on `CLOCK_MONOTONIC`, and
//! a `#[cfg(not(feature = "rt"))]` path using `std::thread::sleep` for
//! development and tests. Unlike the axis-control cycle this is modeled on,
//! a cycle overrun here is recorded and logged, never treated as fatal —
//! this loop's correctness requirement is bounded dispatch lateness, not
//! hard real-time termination of a safety loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use motion_common::consts::MAX_AXES_PER_GROUP;

use crate::group::ControlGroup;
use crate::primitives::MotionPrimitives;

/// O(1) per-tick timing statistics, no allocation in the hot path.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchStats {
    pub tick_count: u64,
    pub last_tick_ns: i64,
    pub max_tick_ns: i64,
    pub overruns: u64,
}

impl DispatchStats {
    fn record(&mut self, duration_ns: i64, period_ns: i64) {
        self.tick_count += 1;
        self.last_tick_ns = duration_ns;
        if duration_ns > self.max_tick_ns {
            self.max_tick_ns = duration_ns;
        }
        if duration_ns > period_ns {
            self.overruns += 1;
        }
    }
}

/// Per-group result of one dispatch tick: the `increment_move` return code.
pub type TickResults = Vec<i32>;

/// Run one dispatch tick over every group (§4.F steps 1–3). Returns the
/// per-group primitive return codes, or an empty vec if nothing was sent.
pub fn dispatch_tick(
    groups: &mut [ControlGroup],
    primitives: &dyn MotionPrimitives,
    period_ms: i64,
    motion_ready: bool,
    stop_motion: bool,
) -> TickResults {
    if !motion_ready || stop_motion {
        return TickResults::new();
    }
    let any_data = groups.iter().any(|g| g.queue.count().unwrap_or(0) > 0);
    if !any_data {
        return TickResults::new();
    }

    let mut results = Vec::with_capacity(groups.len());
    for (idx, group) in groups.iter_mut().enumerate() {
        let merged = match group.queue.dequeue_one() {
            None => [0i32; MAX_AXES_PER_GROUP],
            Some(first) => {
                let mut merged = first.inc;
                let mut q_time = first.time_ms;
                loop {
                    match group.queue.peek_head() {
                        Some(next)
                            if next.time_ms - q_time <= period_ms
                                && next.tool == first.tool
                                && next.frame == first.frame
                                && next.user == first.user =>
                        {
                            let popped = group
                                .queue
                                .dequeue_one()
                                .expect("head just peeked must still be present: single reader");
                            for i in 0..MAX_AXES_PER_GROUP {
                                merged[i] += popped.inc[i];
                            }
                            q_time = popped.time_ms;
                        }
                        _ => break,
                    }
                }
                group.q_time = q_time;
                merged
            }
        };

        let rc = primitives.increment_move(idx, merged);
        match rc {
            0 => {}
            -3 => tracing::error!(group = idx, "increment_move rejected: invalid group mask"),
            other => tracing::warn!(group = idx, rc = other, "increment_move returned non-zero"),
        }
        results.push(rc);
    }
    results
}

/// Shared inputs the dispatch loop polls every tick.
pub struct DispatchInputs {
    pub groups: Arc<Mutex<Vec<ControlGroup>>>,
    pub primitives: Arc<dyn MotionPrimitives>,
    pub stop_motion: Arc<AtomicBool>,
    pub running: Arc<AtomicBool>,
}

/// Pacing configuration for the dispatch loop.
pub struct RealtimeDispatcher {
    period: Duration,
    stats: DispatchStats,
}

impl RealtimeDispatcher {
    pub fn new(period_ms: u32) -> Self {
        Self {
            period: Duration::from_millis(period_ms as u64),
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Enter the dispatch loop; returns when `inputs.running` is cleared.
    pub fn run(&mut self, inputs: &DispatchInputs) {
        #[cfg(feature = "rt")]
        {
            self.run_rt_loop(inputs)
        }
        #[cfg(not(feature = "rt"))]
        {
            self.run_sim_loop(inputs)
        }
    }

    fn one_tick(&mut self, inputs: &DispatchInputs) {
        let motion_ready = inputs.primitives.status_update().is_motion_ready();
        let stop_motion = inputs.stop_motion.load(Ordering::SeqCst);
        let mut groups = inputs.groups.lock().unwrap();
        dispatch_tick(&mut groups, inputs.primitives.as_ref(), self.period.as_millis() as i64, motion_ready, stop_motion);
    }

    #[cfg(not(feature = "rt"))]
    fn run_sim_loop(&mut self, inputs: &DispatchInputs) {
        let period_ns = self.period.as_nanos() as i64;
        while inputs.running.load(Ordering::SeqCst) {
            let start = Instant::now();
            self.one_tick(inputs);
            let elapsed_ns = start.elapsed().as_nanos() as i64;
            self.stats.record(elapsed_ns, period_ns);
            if let Some(remaining) = self.period.checked_sub(start.elapsed()) {
                std::thread::sleep(remaining);
            }
        }
    }

    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self, inputs: &DispatchInputs) {
        use nix::time::{clock_gettime, clock_nanosleep, ClockId, ClockNanosleepFlags};

        let clock = ClockId::CLOCK_MONOTONIC;
        let period_ns = self.period.as_nanos() as i64;
        let mut next_wake = match clock_gettime(clock) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!("clock_gettime failed, dispatcher cannot start: {e}");
                return;
            }
        };

        while inputs.running.load(Ordering::SeqCst) {
            next_wake = timespec_add_ns(next_wake, period_ns);

            let cycle_start = match clock_gettime(clock) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!("clock_gettime failed mid-loop: {e}");
                    return;
                }
            };

            self.one_tick(inputs);

            let cycle_end = clock_gettime(clock).unwrap_or(cycle_start);
            let duration_ns = timespec_diff_ns(&cycle_end, &cycle_start);
            self.stats.record(duration_ns, period_ns);
            if duration_ns > period_ns {
                tracing::warn!(duration_ns, period_ns, "dispatch tick overran its period");
            }

            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
    }
}

#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

#[cfg(feature = "rt")]
fn timespec_diff_ns(end: &nix::sys::time::TimeSpec, start: &nix::sys::time::TimeSpec) -> i64 {
    (end.tv_sec() - start.tv_sec()) * 1_000_000_000 + (end.tv_nsec() - start.tv_nsec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::SimulatedPrimitives;
    use crate::queue::{EnqueueOutcome, Increment};
    use motion_common::config::GroupConfig;

    fn sample_group() -> ControlGroup {
        ControlGroup::new(
            &GroupConfig {
                group_no: 0,
                name: "Arm".into(),
                num_axes: 2,
                max_increment: [1000; MAX_AXES_PER_GROUP],
                max_speed: [2.0; MAX_AXES_PER_GROUP],
                pulse_per_radian: [10000.0; MAX_AXES_PER_GROUP],
                b_axis_slave: false,
            },
            50,
        )
    }

    #[test]
    fn empty_queues_emit_nothing() {
        let mut groups = vec![sample_group()];
        let sim = SimulatedPrimitives::new(1);
        sim.with_status(|s| {
            s.remote = true;
            s.servo_on = true;
            s.in_traj_mode = true;
        });
        let results = dispatch_tick(&mut groups, &sim, 4, true, false);
        assert!(results.is_empty());
    }

    #[test]
    fn not_ready_suppresses_dispatch_even_with_data() {
        let mut groups = vec![sample_group()];
        groups[0].queue.enqueue(
            Increment { time_ms: 4, inc: [1; MAX_AXES_PER_GROUP], ..Default::default() },
            Duration::from_millis(4),
            || true,
        );
        let sim = SimulatedPrimitives::new(1);
        let results = dispatch_tick(&mut groups, &sim, 4, false, false);
        assert!(results.is_empty());
    }

    #[test]
    fn single_group_single_increment_dispatches_once() {
        let mut groups = vec![sample_group()];
        let outcome = groups[0].queue.enqueue(
            Increment { time_ms: 4, inc: [7, 0, 0, 0, 0, 0, 0, 0], ..Default::default() },
            Duration::from_millis(4),
            || true,
        );
        assert_eq!(outcome, EnqueueOutcome::Enqueued);
        let sim = SimulatedPrimitives::new(1);
        let results = dispatch_tick(&mut groups, &sim, 4, true, false);
        assert_eq!(results, vec![0]);
        assert_eq!(sim.get_fb_pulse_pos(0)[0], 7);
        assert_eq!(groups[0].q_time, 4);
    }

    #[test]
    fn merges_consecutive_increments_within_one_period() {
        let mut groups = vec![sample_group()];
        groups[0].queue.enqueue(Increment { time_ms: 2, inc: [1, 0, 0, 0, 0, 0, 0, 0], ..Default::default() }, Duration::from_millis(4), || true);
        groups[0].queue.enqueue(Increment { time_ms: 4, inc: [2, 0, 0, 0, 0, 0, 0, 0], ..Default::default() }, Duration::from_millis(4), || true);
        groups[0].queue.enqueue(Increment { time_ms: 20, inc: [99, 0, 0, 0, 0, 0, 0, 0], ..Default::default() }, Duration::from_millis(4), || true);
        let sim = SimulatedPrimitives::new(1);
        dispatch_tick(&mut groups, &sim, 4, true, false);
        assert_eq!(sim.get_fb_pulse_pos(0)[0], 3);
        assert_eq!(groups[0].queue.count(), Some(1));
    }

    #[test]
    fn stop_motion_suppresses_dispatch() {
        let mut groups = vec![sample_group()];
        groups[0].queue.enqueue(Increment { time_ms: 4, ..Default::default() }, Duration::from_millis(4), || true);
        let sim = SimulatedPrimitives::new(1);
        let results = dispatch_tick(&mut groups, &sim, 4, true, true);
        assert!(results.is_empty());
        assert_eq!(groups[0].queue.count(), Some(1));
    }
}
