//! Per-group state (§3 `ControlGroup`, `JointMotionData`).

use motion_common::config::GroupConfig;
use motion_common::consts::MAX_AXES_PER_GROUP;
use motion_common::wire::valid_fields;

use crate::queue::IncrementQueue;

/// A trajectory point in engineering units (§3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointMotionData {
    /// Bitmap: see `motion_common::wire::valid_fields`.
    pub valid_fields: u32,
    /// Time in integer milliseconds from trajectory start.
    pub time_ms: i64,
    pub pos: [f64; MAX_AXES_PER_GROUP],
    pub vel: [f64; MAX_AXES_PER_GROUP],
    pub acc: [f64; MAX_AXES_PER_GROUP],
}

impl Default for JointMotionData {
    fn default() -> Self {
        Self {
            valid_fields: 0,
            time_ms: 0,
            pos: [0.0; MAX_AXES_PER_GROUP],
            vel: [0.0; MAX_AXES_PER_GROUP],
            acc: [0.0; MAX_AXES_PER_GROUP],
        }
    }
}

impl JointMotionData {
    pub fn has_required_fields(&self) -> bool {
        self.valid_fields & valid_fields::REQUIRED == valid_fields::REQUIRED
    }
}

/// Per joint group: geometry, limits, interpolator state, and the
/// group's bounded increment queue.
pub struct ControlGroup {
    pub group_no: u8,
    pub num_axes: usize,
    pub max_increment: [i32; MAX_AXES_PER_GROUP],
    pub max_speed: [f64; MAX_AXES_PER_GROUP],
    pub pulse_per_radian: [f64; MAX_AXES_PER_GROUP],
    pub b_axis_slave: bool,

    /// Interpolator's current position in the active segment (start side).
    pub cur_traj: JointMotionData,
    /// The pending input segment (end side), written by the Validator.
    pub pending_traj: JointMotionData,
    /// Set by the Validator when a follow-up point has been written;
    /// cleared by the Interpolator once it has consumed the segment.
    pub has_pending: std::sync::atomic::AtomicBool,
    /// Residual time carried from the previous segment's final partial step.
    pub time_leftover_ms: i64,
    /// Previously commanded absolute pulse vector.
    pub prev_pulse: [i32; MAX_AXES_PER_GROUP],
    /// Dispatcher's running read position in the queue's time axis.
    pub q_time: i64,

    pub queue: IncrementQueue,
}

impl ControlGroup {
    pub fn new(config: &GroupConfig, queue_capacity: usize) -> Self {
        Self {
            group_no: config.group_no,
            num_axes: config.num_axes,
            max_increment: config.max_increment,
            max_speed: config.max_speed,
            pulse_per_radian: config.pulse_per_radian,
            b_axis_slave: config.b_axis_slave,
            cur_traj: JointMotionData::default(),
            pending_traj: JointMotionData::default(),
            has_pending: std::sync::atomic::AtomicBool::new(false),
            time_leftover_ms: 0,
            prev_pulse: [0; MAX_AXES_PER_GROUP],
            q_time: 0,
            queue: IncrementQueue::new(queue_capacity),
        }
    }

    /// Convert a radian position vector to absolute pulses, per-axis.
    pub fn to_pulse(&self, pos: &[f64; MAX_AXES_PER_GROUP]) -> [i32; MAX_AXES_PER_GROUP] {
        let mut out = [0i32; MAX_AXES_PER_GROUP];
        for i in 0..self.num_axes {
            out[i] = (pos[i] * self.pulse_per_radian[i]).round() as i32;
        }
        out
    }

    /// Convert an absolute pulse vector back to radians, per-axis.
    pub fn to_rad(&self, pulse: &[i32; MAX_AXES_PER_GROUP]) -> [f64; MAX_AXES_PER_GROUP] {
        let mut out = [0.0f64; MAX_AXES_PER_GROUP];
        for i in 0..self.num_axes {
            out[i] = pulse[i] as f64 / self.pulse_per_radian[i];
        }
        out
    }

    pub fn has_pending(&self) -> bool {
        self.has_pending.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn set_has_pending(&self, v: bool) {
        self.has_pending.store(v, std::sync::atomic::Ordering::Release);
    }

    /// Apply B-axis slaving (§4.B): for models with `b_axis_slave`, axis
    /// index 2 (B) is mechanically coupled to axes 0 and 1 (L, U).
    pub fn apply_b_axis_slaving(&self, traj: &mut JointMotionData) {
        if !self.b_axis_slave || self.num_axes < 3 {
            return;
        }
        traj.pos[2] += -traj.pos[0] + traj.pos[1];
        traj.vel[2] += -traj.vel[0] + traj.vel[1];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> GroupConfig {
        GroupConfig {
            group_no: 0,
            name: "Arm".to_string(),
            num_axes: 3,
            max_increment: [500; MAX_AXES_PER_GROUP],
            max_speed: [3.0; MAX_AXES_PER_GROUP],
            pulse_per_radian: [10000.0; MAX_AXES_PER_GROUP],
            b_axis_slave: true,
        }
    }

    #[test]
    fn pulse_rad_roundtrip_within_one_lsb() {
        let group = ControlGroup::new(&sample_config(), 10);
        let pos = [0.12345, -0.5, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let pulse = group.to_pulse(&pos);
        let back = group.to_rad(&pulse);
        for i in 0..3 {
            assert!((back[i] - pos[i]).abs() <= 1.0 / 10000.0);
        }
    }

    #[test]
    fn b_axis_slaving_couples_to_l_and_u() {
        let group = ControlGroup::new(&sample_config(), 10);
        let mut traj = JointMotionData { pos: [0.1, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], ..Default::default() };
        group.apply_b_axis_slaving(&mut traj);
        assert!((traj.pos[2] - 0.1).abs() < 1e-9);
    }

    #[test]
    fn b_axis_slaving_noop_when_not_flagged() {
        let mut cfg = sample_config();
        cfg.b_axis_slave = false;
        let group = ControlGroup::new(&cfg, 10);
        let mut traj = JointMotionData { pos: [0.1, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], ..Default::default() };
        group.apply_b_axis_slaving(&mut traj);
        assert_eq!(traj.pos[2], 0.0);
    }

    #[test]
    fn has_pending_flag_roundtrip() {
        let group = ControlGroup::new(&sample_config(), 10);
        assert!(!group.has_pending());
        group.set_has_pending(true);
        assert!(group.has_pending());
    }
}
