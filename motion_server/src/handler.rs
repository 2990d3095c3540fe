//! Motion Control Handler (§4.E): dispatches `MOTO_MOTION_CTRL` sub-commands
//! and owns the servo-power / trajectory-mode state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use motion_common::consts::{INC_MOVE_DONE_IO_ADDR, SERVO_POWER_RETRY_ATTEMPTS};
use motion_common::result_code::{pack_mp_failure, pack_result, ResultCode, Subcode};

use crate::group::ControlGroup;
use crate::primitives::MotionPrimitives;

/// Polling/wait bounds used by the state machine below, loaded from config.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub motion_start_timeout_ms: u64,
    pub motion_start_check_period_ms: u64,
    pub motion_stop_timeout_ms: u64,
}

/// Poll `predicate` every `period`, up to `timeout` total, sleeping via
/// `sleep` between attempts. Returns `true` the moment it first sees
/// `predicate() == true` (checked immediately, before the first sleep).
fn poll_until(timeout: Duration, period: Duration, sleep: &dyn Fn(Duration), mut predicate: impl FnMut() -> bool) -> bool {
    if predicate() {
        return true;
    }
    let deadline = Instant::now() + timeout;
    loop {
        sleep(period);
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
    }
}

/// `check-motion-ready` (§4.E).
pub fn check_motion_ready(primitives: &dyn MotionPrimitives) -> u32 {
    let status = primitives.status_update();
    if status.is_motion_ready() {
        pack_result(ResultCode::True, Subcode::None)
    } else {
        let reason = status.not_ready_reason().expect("not ready implies a reason");
        pack_result(ResultCode::False, reason.subcode())
    }
}

/// `check-queue-count(group)` (§4.E). `None` on bad group number.
pub fn check_queue_count(groups: &[ControlGroup], group_no: usize) -> i32 {
    match groups.get(group_no) {
        None => -1,
        Some(group) => group.queue.count().map(|c| c as i32).unwrap_or(-1),
    }
}

/// `stop-motion` (§4.E): set `stop_motion`, wait for every group's
/// `has_pending` to clear, then drain every queue.
pub fn stop_motion(
    groups: &[ControlGroup],
    stop_flag: &AtomicBool,
    timeouts: &Timeouts,
    sleep: &dyn Fn(Duration),
) -> u32 {
    stop_flag.store(true, Ordering::SeqCst);
    let drained = poll_until(
        Duration::from_millis(timeouts.motion_stop_timeout_ms),
        Duration::from_millis(1),
        sleep,
        || groups.iter().all(|g| !g.has_pending()),
    );
    let cleared = groups.iter().all(|g| g.queue.clear());
    stop_flag.store(false, Ordering::SeqCst);
    if drained && cleared {
        pack_result(ResultCode::Success, Subcode::None)
    } else {
        pack_result(ResultCode::Failure, Subcode::None)
    }
}

/// `reset-alarm` (§4.E).
pub fn reset_alarm(primitives: &dyn MotionPrimitives) -> u32 {
    let mut ok = true;
    if primitives.is_alarm() && primitives.reset_alarm().is_err() {
        ok = false;
    }
    let status = primitives.status_update();
    if status.error && primitives.cancel_error().is_err() {
        ok = false;
    }
    primitives.status_update();
    if ok {
        pack_result(ResultCode::Success, Subcode::None)
    } else {
        pack_result(ResultCode::Failure, Subcode::None)
    }
}

/// Leave eco mode by issuing servo-power-off and waiting for the flag to clear.
fn disable_eco_mode(primitives: &dyn MotionPrimitives, timeouts: &Timeouts, sleep: &dyn Fn(Duration)) -> bool {
    if !primitives.is_eco_mode() {
        return true;
    }
    if primitives.set_servo_power(false).is_err() {
        return false;
    }
    poll_until(
        Duration::from_millis(timeouts.motion_start_timeout_ms),
        Duration::from_millis(timeouts.motion_start_check_period_ms),
        sleep,
        || !primitives.is_eco_mode(),
    )
}

/// `start-servos` / `stop-servos` (§4.E, O3): skip re-toggling when the
/// controller already reports the requested servo state.
pub fn set_servo_power(
    primitives: &dyn MotionPrimitives,
    groups: &[ControlGroup],
    stop_flag: &AtomicBool,
    on: bool,
    timeouts: &Timeouts,
    sleep: &dyn Fn(Duration),
) -> u32 {
    if primitives.is_servo_on() == on {
        return pack_result(ResultCode::Success, Subcode::None);
    }

    if !on {
        stop_motion(groups, stop_flag, timeouts, sleep);
    } else if !disable_eco_mode(primitives, timeouts, sleep) {
        return pack_result(ResultCode::Failure, Subcode::None);
    }

    let mut last_err = None;
    for _ in 0..SERVO_POWER_RETRY_ATTEMPTS {
        match primitives.set_servo_power(on) {
            Ok(()) => {
                last_err = None;
                break;
            }
            Err(e) => last_err = Some(e),
        }
    }
    if last_err.is_some() {
        return pack_result(ResultCode::Failure, Subcode::None);
    }

    let confirmed = poll_until(
        Duration::from_millis(timeouts.motion_start_timeout_ms),
        Duration::from_millis(timeouts.motion_start_check_period_ms),
        sleep,
        || primitives.is_servo_on() == on,
    );
    if confirmed {
        pack_result(ResultCode::Success, Subcode::None)
    } else {
        pack_result(ResultCode::Failure, Subcode::None)
    }
}

/// `start-traj-mode` (§4.E): full 9-step IDLE → READY sequence.
pub fn start_traj_mode(
    primitives: &dyn MotionPrimitives,
    groups: &mut [ControlGroup],
    timeouts: &Timeouts,
    sleep: &dyn Fn(Duration),
) -> u32 {
    // Step 1.
    let status = primitives.status_update();
    if status.is_motion_ready() {
        return pack_result(ResultCode::Success, Subcode::None);
    }

    // Step 2.
    if status.operating {
        return pack_result(ResultCode::NotReady, Subcode::NotReadyOperating);
    }
    // Step 3.
    if status.estop {
        return pack_result(ResultCode::NotReady, Subcode::NotReadyEstop);
    }
    if status.hold {
        return pack_result(ResultCode::NotReady, Subcode::NotReadyHold);
    }
    if !status.remote {
        return pack_result(ResultCode::NotReady, Subcode::NotReadyNotRemote);
    }
    // Step 4.
    if status.error && primitives.cancel_error().is_err() {
        return pack_result(ResultCode::NotReady, Subcode::NotReadyError);
    }
    // Step 5 (O2: break as soon as the alarm clears, rather than always
    // sleeping the full timeout).
    if primitives.is_alarm() {
        let _ = primitives.reset_alarm();
        let cleared = poll_until(
            Duration::from_millis(timeouts.motion_start_timeout_ms),
            Duration::from_millis(timeouts.motion_start_check_period_ms),
            sleep,
            || !primitives.is_alarm(),
        );
        if !cleared {
            return pack_result(ResultCode::NotReady, Subcode::NotReadyAlarm);
        }
    }
    // Step 6.
    if !primitives.is_servo_on() {
        if !disable_eco_mode(primitives, timeouts, sleep) {
            return pack_result(ResultCode::NotReady, Subcode::NotReadyServoOff);
        }
        let mut servo_ok = false;
        for _ in 0..SERVO_POWER_RETRY_ATTEMPTS {
            if primitives.set_servo_power(true).is_ok() {
                servo_ok = true;
                break;
            }
        }
        if !servo_ok {
            return pack_result(ResultCode::NotReady, Subcode::NotReadyServoOff);
        }
        let confirmed = poll_until(
            Duration::from_millis(timeouts.motion_start_timeout_ms),
            Duration::from_millis(timeouts.motion_start_check_period_ms),
            sleep,
            || primitives.is_servo_on(),
        );
        if !confirmed {
            return pack_result(ResultCode::NotReady, Subcode::NotReadyServoOff);
        }
    }

    // Step 7.
    for (idx, group) in groups.iter_mut().enumerate() {
        group.prev_pulse = primitives.get_pulse_pos_cmd(idx);
    }

    // Step 8.
    if let Err(err_no) = primitives.start_job("INIT_ROS", 0) {
        return pack_mp_failure(err_no);
    }

    // Step 9.
    let ready = poll_until(
        Duration::from_millis(timeouts.motion_start_timeout_ms),
        Duration::from_millis(timeouts.motion_start_check_period_ms),
        sleep,
        || primitives.status_update().is_motion_ready(),
    );
    if ready {
        pack_result(ResultCode::Success, Subcode::None)
    } else {
        pack_result(ResultCode::NotReady, Subcode::NotReadyNotInTrajMode)
    }
}

/// `stop-traj-mode` / `disconnect` (§4.E): requires every group's queue be
/// empty, then runs `stop-motion`, then raises the "inc-move-done" I/O bit.
/// `disconnect` additionally tells the caller to close the reader, which
/// this function surfaces through its `bool` return (closure to invoke).
pub fn stop_traj_mode(
    primitives: &dyn MotionPrimitives,
    groups: &[ControlGroup],
    stop_flag: &AtomicBool,
    timeouts: &Timeouts,
    sleep: &dyn Fn(Duration),
) -> u32 {
    let queues_empty = groups.iter().all(|g| g.queue.count() == Some(0));
    if !queues_empty {
        return pack_result(ResultCode::Failure, Subcode::None);
    }
    let stopped = stop_motion(groups, stop_flag, timeouts, sleep);
    let (r, _) = motion_common::result_code::unpack_result(stopped);
    if r != Some(ResultCode::Success) {
        return stopped;
    }
    if primitives.write_io(INC_MOVE_DONE_IO_ADDR, true).is_err() {
        return pack_result(ResultCode::Failure, Subcode::None);
    }
    pack_result(ResultCode::Success, Subcode::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::SimulatedPrimitives;
    use motion_common::config::GroupConfig;
    use motion_common::result_code::unpack_result;

    fn no_sleep(_: Duration) {}

    fn timeouts() -> Timeouts {
        Timeouts {
            motion_start_timeout_ms: 20,
            motion_start_check_period_ms: 1,
            motion_stop_timeout_ms: 20,
        }
    }

    fn sample_groups() -> Vec<ControlGroup> {
        vec![ControlGroup::new(
            &GroupConfig {
                group_no: 0,
                name: "Arm".into(),
                num_axes: 2,
                max_increment: [1000; motion_common::consts::MAX_AXES_PER_GROUP],
                max_speed: [2.0; motion_common::consts::MAX_AXES_PER_GROUP],
                pulse_per_radian: [10000.0; motion_common::consts::MAX_AXES_PER_GROUP],
                b_axis_slave: false,
            },
            10,
        )]
    }

    #[test]
    fn check_motion_ready_reports_false_with_reason() {
        let sim = SimulatedPrimitives::new(1);
        let packed = check_motion_ready(&sim);
        let (r, s) = unpack_result(packed);
        assert_eq!(r, Some(ResultCode::False));
        assert_eq!(s, Some(Subcode::NotReadyServoOff));
    }

    #[test]
    fn start_traj_mode_happy_path_reaches_success() {
        let sim = SimulatedPrimitives::new(1);
        sim.with_status(|s| s.remote = true);
        let mut groups = sample_groups();
        let result = start_traj_mode(&sim, &mut groups, &timeouts(), &no_sleep);
        let (r, _) = unpack_result(result);
        assert_eq!(r, Some(ResultCode::Success));
        assert!(sim.status_update().is_motion_ready());
    }

    #[test]
    fn start_traj_mode_refuses_when_estopped() {
        let sim = SimulatedPrimitives::new(1);
        sim.with_status(|s| {
            s.remote = true;
            s.estop = true;
        });
        let mut groups = sample_groups();
        let result = start_traj_mode(&sim, &mut groups, &timeouts(), &no_sleep);
        let (r, s) = unpack_result(result);
        assert_eq!(r, Some(ResultCode::NotReady));
        assert_eq!(s, Some(Subcode::NotReadyEstop));
    }

    #[test]
    fn start_traj_mode_surfaces_mp_failure_from_start_job() {
        let sim = SimulatedPrimitives::new(1);
        sim.with_status(|s| s.remote = true);
        sim.set_fail_start_job(true);
        let mut groups = sample_groups();
        let result = start_traj_mode(&sim, &mut groups, &timeouts(), &no_sleep);
        let (r, _) = unpack_result(result);
        assert_eq!(r, Some(ResultCode::MpFailure));
        assert_eq!(result >> 16, 2);
    }

    #[test]
    fn set_servo_power_skips_retoggle_when_already_matching() {
        let sim = SimulatedPrimitives::new(1);
        let groups = sample_groups();
        let stop = AtomicBool::new(false);
        // Already off; request off again must not touch set_fail_servo_power path.
        sim.set_fail_servo_power(true);
        let result = set_servo_power(&sim, &groups, &stop, false, &timeouts(), &no_sleep);
        let (r, _) = unpack_result(result);
        assert_eq!(r, Some(ResultCode::Success));
    }

    #[test]
    fn set_servo_power_turns_on_when_off() {
        let sim = SimulatedPrimitives::new(1);
        let groups = sample_groups();
        let stop = AtomicBool::new(false);
        let result = set_servo_power(&sim, &groups, &stop, true, &timeouts(), &no_sleep);
        let (r, _) = unpack_result(result);
        assert_eq!(r, Some(ResultCode::Success));
        assert!(sim.is_servo_on());
    }

    #[test]
    fn stop_motion_drains_queues_and_clears_flag() {
        let groups = sample_groups();
        let stop = AtomicBool::new(false);
        let result = stop_motion(&groups, &stop, &timeouts(), &no_sleep);
        let (r, _) = unpack_result(result);
        assert_eq!(r, Some(ResultCode::Success));
        assert!(!stop.load(Ordering::SeqCst));
    }

    #[test]
    fn check_queue_count_reports_bad_group() {
        let groups = sample_groups();
        assert_eq!(check_queue_count(&groups, 9), -1);
        assert_eq!(check_queue_count(&groups, 0), 0);
    }

    #[test]
    fn stop_traj_mode_fails_when_queue_not_empty() {
        let sim = SimulatedPrimitives::new(1);
        let mut groups = sample_groups();
        groups[0].queue.enqueue(crate::queue::Increment::default(), Duration::from_millis(1), || true);
        let stop = AtomicBool::new(false);
        let result = stop_traj_mode(&sim, &groups, &stop, &timeouts(), &no_sleep);
        let (r, _) = unpack_result(result);
        assert_eq!(r, Some(ResultCode::Failure));
    }

    #[test]
    fn stop_traj_mode_succeeds_on_empty_queues() {
        let sim = SimulatedPrimitives::new(1);
        let groups = sample_groups();
        let stop = AtomicBool::new(false);
        let result = stop_traj_mode(&sim, &groups, &stop, &timeouts(), &no_sleep);
        let (r, _) = unpack_result(result);
        assert_eq!(r, Some(ResultCode::Success));
    }

    #[test]
    fn reset_alarm_clears_active_alarm() {
        let sim = SimulatedPrimitives::new(1);
        sim.with_status(|s| s.alarm = true);
        let result = reset_alarm(&sim);
        let (r, _) = unpack_result(result);
        assert_eq!(r, Some(ResultCode::Success));
        assert!(!sim.is_alarm());
    }
}
