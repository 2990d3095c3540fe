//! `MotionPrimitives` trait and its in-memory simulation (§6 "Primitive
//! interface used", §9 "global controller singleton").
//!
//! Every controller-kernel collaborator listed in §6 (I/O read/write, pulse
//! feedback, servo power, alarm query/reset, job start, increment-move) is
//! represented here as a single object-safe trait, the same way the HAL
//! layer in this codebase puts pluggable hardware backends behind one
//! trait and ships a simulation backend for development and tests.

use std::sync::Mutex;

use motion_common::consts::MAX_AXES_PER_GROUP;

/// Reasons `is_motion_ready` can be false, used to fill a NOT_READY subcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    Estop,
    Hold,
    NotRemote,
    Alarm,
    ServoOff,
    NotInTrajMode,
    Operating,
    Error,
}

/// Snapshot of controller status, refreshed by `status_update` (§4.E).
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusSnapshot {
    pub servo_on: bool,
    pub eco_mode: bool,
    pub alarm: bool,
    pub error: bool,
    pub estop: bool,
    pub hold: bool,
    pub remote: bool,
    pub operating: bool,
    pub in_traj_mode: bool,
}

impl StatusSnapshot {
    /// Composite "motion ready" predicate from the Glossary.
    pub fn is_motion_ready(&self) -> bool {
        self.in_traj_mode
            && self.servo_on
            && !self.alarm
            && !self.estop
            && !self.hold
            && self.remote
            && !self.operating
            && !self.error
    }

    /// First reason motion is not ready, in the priority order §4.E uses.
    pub fn not_ready_reason(&self) -> Option<NotReadyReason> {
        if self.operating {
            return Some(NotReadyReason::Operating);
        }
        if self.estop {
            return Some(NotReadyReason::Estop);
        }
        if self.hold {
            return Some(NotReadyReason::Hold);
        }
        if !self.remote {
            return Some(NotReadyReason::NotRemote);
        }
        if self.error {
            return Some(NotReadyReason::Error);
        }
        if self.alarm {
            return Some(NotReadyReason::Alarm);
        }
        if !self.servo_on {
            return Some(NotReadyReason::ServoOff);
        }
        if !self.in_traj_mode {
            return Some(NotReadyReason::NotInTrajMode);
        }
        None
    }
}

impl NotReadyReason {
    /// Map to the wire subcode used for the reply's upper 16 bits.
    pub fn subcode(self) -> motion_common::result_code::Subcode {
        use motion_common::result_code::Subcode;
        match self {
            NotReadyReason::Estop => Subcode::NotReadyEstop,
            NotReadyReason::Hold => Subcode::NotReadyHold,
            NotReadyReason::NotRemote => Subcode::NotReadyNotRemote,
            NotReadyReason::Alarm => Subcode::NotReadyAlarm,
            NotReadyReason::ServoOff => Subcode::NotReadyServoOff,
            NotReadyReason::NotInTrajMode => Subcode::NotReadyNotInTrajMode,
            NotReadyReason::Operating => Subcode::NotReadyOperating,
            NotReadyReason::Error => Subcode::NotReadyError,
        }
    }
}

/// Outcome of a fallible primitive call: `Ok(())` or a native error number,
/// matching the original's `err_no` convention (§7 "Primitive" error kind).
pub type PrimitiveResult = Result<(), u16>;

/// The controller-kernel collaborators this crate treats as black boxes (§6).
pub trait MotionPrimitives: Send + Sync {
    /// Refresh and return the current status snapshot.
    fn status_update(&self) -> StatusSnapshot;

    fn is_alarm(&self) -> bool;
    fn get_alarm_code(&self) -> u32;
    fn reset_alarm(&self) -> PrimitiveResult;
    fn cancel_error(&self) -> PrimitiveResult;

    fn is_servo_on(&self) -> bool;
    fn is_eco_mode(&self) -> bool;
    fn set_servo_power(&self, on: bool) -> PrimitiveResult;

    /// Starts the resident trajectory-mode job (`INIT_ROS`, task 0).
    fn start_job(&self, job_name: &str, task: u32) -> PrimitiveResult;

    /// Per-axis commanded pulse position for a group (interpolator seed).
    fn get_pulse_pos_cmd(&self, group_no: usize) -> [i32; MAX_AXES_PER_GROUP];

    /// Per-axis feedback pulse position for a group.
    fn get_fb_pulse_pos(&self, group_no: usize) -> [i32; MAX_AXES_PER_GROUP];

    /// Per-axis feedback torque for a group.
    fn get_torque(&self, group_no: usize) -> [i32; MAX_AXES_PER_GROUP];

    fn read_io(&self, address: i32) -> Result<bool, u16>;
    fn write_io(&self, address: i32, value: bool) -> PrimitiveResult;

    /// Realtime-clock timestamp used for "power on timestamp" reply fields.
    fn rtc(&self) -> i32;

    /// Dispatch one realtime increment-move call for a group.
    fn increment_move(&self, group_no: usize, inc: [i32; MAX_AXES_PER_GROUP]) -> i32;
}

/// In-memory simulation of every `MotionPrimitives` collaborator.
///
/// Used by default, by tests, and by benches. Tracks commanded pulse
/// position per group and echoes it back as feedback; servo/eco/alarm/
/// estop/hold/remote/operating flags are plain fields that tests flip
/// directly to exercise the not-ready paths.
pub struct SimulatedPrimitives {
    inner: Mutex<SimState>,
    num_groups: usize,
}

struct SimState {
    status: StatusSnapshot,
    alarm_code: u32,
    pulse_cmd: Vec<[i32; MAX_AXES_PER_GROUP]>,
    fail_start_job: bool,
    fail_set_servo_power: bool,
}

impl SimulatedPrimitives {
    pub fn new(num_groups: usize) -> Self {
        Self {
            inner: Mutex::new(SimState {
                status: StatusSnapshot {
                    remote: true,
                    ..Default::default()
                },
                alarm_code: 0,
                pulse_cmd: vec![[0; MAX_AXES_PER_GROUP]; num_groups],
                fail_start_job: false,
                fail_set_servo_power: false,
            }),
            num_groups,
        }
    }

    /// Directly mutate the status snapshot (test helper).
    pub fn with_status(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        f(&mut self.inner.lock().unwrap().status);
    }

    pub fn set_pulse_cmd(&self, group_no: usize, pulse: [i32; MAX_AXES_PER_GROUP]) {
        self.inner.lock().unwrap().pulse_cmd[group_no] = pulse;
    }

    pub fn set_fail_start_job(&self, fail: bool) {
        self.inner.lock().unwrap().fail_start_job = fail;
    }

    pub fn set_fail_servo_power(&self, fail: bool) {
        self.inner.lock().unwrap().fail_set_servo_power = fail;
    }
}

impl MotionPrimitives for SimulatedPrimitives {
    fn status_update(&self) -> StatusSnapshot {
        self.inner.lock().unwrap().status
    }

    fn is_alarm(&self) -> bool {
        self.inner.lock().unwrap().status.alarm
    }

    fn get_alarm_code(&self) -> u32 {
        self.inner.lock().unwrap().alarm_code
    }

    fn reset_alarm(&self) -> PrimitiveResult {
        let mut s = self.inner.lock().unwrap();
        s.status.alarm = false;
        s.alarm_code = 0;
        Ok(())
    }

    fn cancel_error(&self) -> PrimitiveResult {
        self.inner.lock().unwrap().status.error = false;
        Ok(())
    }

    fn is_servo_on(&self) -> bool {
        self.inner.lock().unwrap().status.servo_on
    }

    fn is_eco_mode(&self) -> bool {
        self.inner.lock().unwrap().status.eco_mode
    }

    fn set_servo_power(&self, on: bool) -> PrimitiveResult {
        let mut s = self.inner.lock().unwrap();
        if s.fail_set_servo_power {
            return Err(1);
        }
        s.status.servo_on = on;
        if on {
            s.status.eco_mode = false;
        }
        Ok(())
    }

    fn start_job(&self, _job_name: &str, _task: u32) -> PrimitiveResult {
        let mut s = self.inner.lock().unwrap();
        if s.fail_start_job {
            return Err(2);
        }
        s.status.in_traj_mode = true;
        Ok(())
    }

    fn get_pulse_pos_cmd(&self, group_no: usize) -> [i32; MAX_AXES_PER_GROUP] {
        self.inner.lock().unwrap().pulse_cmd[group_no]
    }

    fn get_fb_pulse_pos(&self, group_no: usize) -> [i32; MAX_AXES_PER_GROUP] {
        self.inner.lock().unwrap().pulse_cmd[group_no]
    }

    fn get_torque(&self, _group_no: usize) -> [i32; MAX_AXES_PER_GROUP] {
        [0; MAX_AXES_PER_GROUP]
    }

    fn read_io(&self, _address: i32) -> Result<bool, u16> {
        Ok(false)
    }

    fn write_io(&self, _address: i32, _value: bool) -> PrimitiveResult {
        Ok(())
    }

    fn rtc(&self) -> i32 {
        0
    }

    fn increment_move(&self, group_no: usize, inc: [i32; MAX_AXES_PER_GROUP]) -> i32 {
        let mut s = self.inner.lock().unwrap();
        if group_no >= self.num_groups {
            return -3;
        }
        let cmd = &mut s.pulse_cmd[group_no];
        for i in 0..MAX_AXES_PER_GROUP {
            cmd[i] += inc[i];
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_ready_requires_all_conditions() {
        let mut s = StatusSnapshot { remote: true, in_traj_mode: true, servo_on: true, ..Default::default() };
        assert!(s.is_motion_ready());
        s.alarm = true;
        assert!(!s.is_motion_ready());
        assert_eq!(s.not_ready_reason(), Some(NotReadyReason::Alarm));
    }

    #[test]
    fn not_ready_reason_priority_order() {
        let s = StatusSnapshot { operating: true, estop: true, ..Default::default() };
        assert_eq!(s.not_ready_reason(), Some(NotReadyReason::Operating));
    }

    #[test]
    fn simulated_increment_move_accumulates_pulse() {
        let sim = SimulatedPrimitives::new(1);
        assert_eq!(sim.increment_move(0, [1; MAX_AXES_PER_GROUP]), 0);
        assert_eq!(sim.increment_move(0, [1; MAX_AXES_PER_GROUP]), 0);
        assert_eq!(sim.get_fb_pulse_pos(0)[0], 2);
    }

    #[test]
    fn simulated_increment_move_rejects_bad_group() {
        let sim = SimulatedPrimitives::new(1);
        assert_eq!(sim.increment_move(5, [0; MAX_AXES_PER_GROUP]), -3);
    }

    #[test]
    fn simulated_servo_power_toggles() {
        let sim = SimulatedPrimitives::new(1);
        assert!(!sim.is_servo_on());
        sim.set_servo_power(true).unwrap();
        assert!(sim.is_servo_on());
    }

    #[test]
    fn simulated_start_job_can_be_forced_to_fail() {
        let sim = SimulatedPrimitives::new(1);
        sim.set_fail_start_job(true);
        assert_eq!(sim.start_job("INIT_ROS", 0), Err(2));
    }
}
