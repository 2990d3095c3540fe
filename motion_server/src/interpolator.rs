//! Interpolator (§4.B): converts one (start,end) trajectory segment into a
//! stream of per-period pulse-delta increments.
//!
//! Cubic Hermite on position with matched velocities; acceleration is
//! derived, never taken from the wire message.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use motion_common::consts::MAX_AXES_PER_GROUP;

use crate::group::{ControlGroup, JointMotionData};
use crate::primitives::MotionPrimitives;
use crate::queue::{EnqueueOutcome, Increment, FRAME_PULSE_INC};

/// Per-axis Hermite coefficients for one segment.
struct Coeffs {
    a1: [f64; MAX_AXES_PER_GROUP],
    a2: [f64; MAX_AXES_PER_GROUP],
}

/// `a1 = 6·(p_e − p_s)/Δ² − 2·(v_e + 2·v_s)/Δ`
/// `a2 = −12·(p_e − p_s)/Δ³ + 6·(v_e + v_s)/Δ²`
fn hermite_coeffs(start: &JointMotionData, end: &JointMotionData, delta_s: f64, num_axes: usize) -> Coeffs {
    let mut a1 = [0.0; MAX_AXES_PER_GROUP];
    let mut a2 = [0.0; MAX_AXES_PER_GROUP];
    let d2 = delta_s * delta_s;
    let d3 = d2 * delta_s;
    for i in 0..num_axes {
        let dp = end.pos[i] - start.pos[i];
        a1[i] = 6.0 * dp / d2 - 2.0 * (end.vel[i] + 2.0 * start.vel[i]) / delta_s;
        a2[i] = -12.0 * dp / d3 + 6.0 * (end.vel[i] + start.vel[i]) / d2;
    }
    Coeffs { a1, a2 }
}

/// `p(τ) = p_s + v_s·τ + a1·τ²/2 + a2·τ³/6`
fn position_at(start: &JointMotionData, coeffs: &Coeffs, tau_s: f64, num_axes: usize) -> [f64; MAX_AXES_PER_GROUP] {
    let mut out = [0.0; MAX_AXES_PER_GROUP];
    let tau2 = tau_s * tau_s;
    let tau3 = tau2 * tau_s;
    for i in 0..num_axes {
        out[i] = start.pos[i] + start.vel[i] * tau_s + coeffs.a1[i] * tau2 / 2.0 + coeffs.a2[i] * tau3 / 6.0;
    }
    out
}

/// `v(τ) = v_s + a1·τ + a2·τ²/2`
fn velocity_at(start: &JointMotionData, coeffs: &Coeffs, tau_s: f64, num_axes: usize) -> [f64; MAX_AXES_PER_GROUP] {
    let mut out = [0.0; MAX_AXES_PER_GROUP];
    for i in 0..num_axes {
        out[i] = start.vel[i] + coeffs.a1[i] * tau_s + coeffs.a2[i] * tau_s * tau_s / 2.0;
    }
    out
}

/// Result of running one segment to completion or abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// All increments for the segment were enqueued.
    Completed { steps: usize },
    /// Motion readiness was lost partway through; remaining steps dropped.
    Aborted { steps: usize },
    /// The increment queue's mutex could not be acquired.
    QueueLockTimeout { steps: usize },
}

/// Runs one (`cur_traj`,`pending_traj`) segment to completion, enqueueing
/// one `Increment` per interpolation period into `group.queue`.
///
/// `is_ready` is polled before every enqueue (§4.B "Abort") and passed
/// through to `IncrementQueue::enqueue` as the queue-full wait condition.
pub fn run_segment(group: &mut ControlGroup, period_ms: i64, is_ready: impl Fn() -> bool) -> SegmentOutcome {
    let num_axes = group.num_axes;
    let mut end = group.pending_traj;
    group.apply_b_axis_slaving(&mut end);
    let start = group.cur_traj;

    let delta_ms = end.time_ms - start.time_ms;
    if delta_ms <= 0 {
        tracing::warn!(group = group.group_no, delta_ms, "non-positive segment duration, skipping");
        group.set_has_pending(false);
        return SegmentOutcome::Completed { steps: 0 };
    }
    let delta_s = delta_ms as f64 / 1000.0;
    let coeffs = hermite_coeffs(&start, &end, delta_s, num_axes);

    let mut cursor_ms: i64 = 0;
    let mut first_step = true;
    let mut steps = 0usize;

    loop {
        if !is_ready() {
            group.set_has_pending(false);
            return SegmentOutcome::Aborted { steps };
        }

        let step_ms = if first_step && group.time_leftover_ms != 0 {
            group.time_leftover_ms
        } else {
            period_ms
        };
        first_step = false;
        let next_ms = cursor_ms + step_ms;

        let (pos, vel, cur_time_ms, reached_end) = if next_ms >= delta_ms {
            group.time_leftover_ms = next_ms - delta_ms;
            (end.pos, end.vel, end.time_ms, true)
        } else {
            let tau_s = next_ms as f64 / 1000.0;
            let pos = position_at(&start, &coeffs, tau_s, num_axes);
            let vel = velocity_at(&start, &coeffs, tau_s, num_axes);
            (pos, vel, start.time_ms + next_ms, false)
        };

        group.cur_traj = JointMotionData {
            valid_fields: end.valid_fields,
            time_ms: cur_time_ms,
            pos,
            vel,
            acc: end.acc,
        };

        let new_pulse = group.to_pulse(&pos);
        let mut inc = [0i32; MAX_AXES_PER_GROUP];
        for i in 0..num_axes {
            inc[i] = new_pulse[i] - group.prev_pulse[i];
        }
        group.prev_pulse = new_pulse;

        let increment = Increment {
            time_ms: cur_time_ms,
            inc,
            tool: 0,
            frame: FRAME_PULSE_INC,
            user: 0,
        };
        match group.queue.enqueue(increment, std::time::Duration::from_millis(period_ms as u64), &is_ready) {
            EnqueueOutcome::Enqueued => steps += 1,
            EnqueueOutcome::AbortedNotReady => {
                group.set_has_pending(false);
                return SegmentOutcome::Aborted { steps };
            }
            EnqueueOutcome::LockTimeout => {
                group.set_has_pending(false);
                return SegmentOutcome::QueueLockTimeout { steps };
            }
        }

        cursor_ms = next_ms;
        if reached_end {
            group.set_has_pending(false);
            return SegmentOutcome::Completed { steps };
        }
    }
}

/// Per-group interpolator task body (§4.B): sleeps one interpolation
/// period, and if a follow-up segment is pending, runs it to completion
/// or abort. Runs until `running` is cleared (§5 "Time-critical" band).
pub fn run_loop(
    group_idx: usize,
    groups: Arc<Mutex<Vec<ControlGroup>>>,
    period_ms: i64,
    primitives: Arc<dyn MotionPrimitives>,
    stop_motion: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
) {
    let period = Duration::from_millis(period_ms as u64);
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(period);
        let has_pending = {
            let guard = groups.lock().unwrap();
            guard[group_idx].has_pending()
        };
        if !has_pending {
            continue;
        }
        let is_ready = || primitives.status_update().is_motion_ready() && !stop_motion.load(Ordering::SeqCst);
        let mut guard = groups.lock().unwrap();
        run_segment(&mut guard[group_idx], period_ms, is_ready);
    }
}
