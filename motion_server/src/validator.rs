//! Trajectory Validator (§4.C): per-point admission checks before a point
//! is handed to the Interpolator.

use motion_common::consts::MAX_AXES_PER_GROUP;
use motion_common::result_code::{pack_result, ResultCode, Subcode};
use motion_common::wire::valid_fields;

use crate::group::{ControlGroup, JointMotionData};
use crate::primitives::{NotReadyReason, StatusSnapshot};

/// One incoming trajectory point, already decoded off the wire.
pub struct IncomingPoint {
    pub group_no: i32,
    pub sequence: i32,
    pub valid_fields: u32,
    pub time_ms: i64,
    pub pos: [f64; MAX_AXES_PER_GROUP],
    pub vel: [f64; MAX_AXES_PER_GROUP],
    pub acc: [f64; MAX_AXES_PER_GROUP],
}

/// Validate and, on acceptance, apply a point to the named group's pending
/// trajectory state. Returns the packed wire result on rejection, or `Ok(())`
/// on acceptance (the reply is `SUCCESS` in that case).
pub fn validate_and_apply(
    groups: &mut [ControlGroup],
    status: &StatusSnapshot,
    point: &IncomingPoint,
) -> Result<(), u32> {
    if !status.is_motion_ready() {
        let reason = status.not_ready_reason().unwrap_or(NotReadyReason::Error);
        return Err(pack_result(ResultCode::NotReady, reason.subcode()));
    }

    if point.group_no < 0 || point.group_no as usize >= groups.len() {
        return Err(pack_result(ResultCode::Invalid, Subcode::InvalidGroupNo));
    }
    let group = &mut groups[point.group_no as usize];

    if point.valid_fields & valid_fields::REQUIRED != valid_fields::REQUIRED {
        return Err(pack_result(ResultCode::Invalid, Subcode::InvalidDataInsufficient));
    }

    if point.sequence == 0 {
        let commanded_pulse = group.prev_pulse;
        let requested_pulse = group.to_pulse(&point.pos);
        for i in 0..group.num_axes {
            let diff = (requested_pulse[i] - commanded_pulse[i]).abs();
            if diff > group.max_increment[i] {
                return Err(pack_result(ResultCode::Invalid, Subcode::InvalidDataStartPos));
            }
        }
    } else if point.sequence < 0 {
        return Err(pack_result(ResultCode::Invalid, Subcode::InvalidSequence));
    }

    for i in 0..group.num_axes {
        if point.vel[i].abs() > group.max_speed[i] {
            return Err(pack_result(ResultCode::Invalid, Subcode::InvalidDataSpeed));
        }
    }

    if point.sequence > 0 && group.has_pending() {
        return Err(pack_result(ResultCode::Busy, Subcode::None));
    }

    let traj = JointMotionData {
        valid_fields: point.valid_fields,
        time_ms: point.time_ms,
        pos: point.pos,
        vel: point.vel,
        acc: point.acc,
    };

    if point.sequence == 0 {
        group.cur_traj = traj;
        group.prev_pulse = group.to_pulse(&point.pos);
        group.q_time = point.time_ms;
        group.time_leftover_ms = 0;
    } else {
        group.pending_traj = traj;
        group.set_has_pending(true);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use motion_common::config::GroupConfig;

    fn sample_config() -> GroupConfig {
        GroupConfig {
            group_no: 0,
            name: "Arm".to_string(),
            num_axes: 2,
            max_increment: [1000; MAX_AXES_PER_GROUP],
            max_speed: [2.0; MAX_AXES_PER_GROUP],
            pulse_per_radian: [10000.0; MAX_AXES_PER_GROUP],
            b_axis_slave: false,
        }
    }

    fn ready_status() -> StatusSnapshot {
        StatusSnapshot {
            servo_on: true,
            in_traj_mode: true,
            remote: true,
            ..Default::default()
        }
    }

    fn point(sequence: i32, time_ms: i64, pos0: f64, vel0: f64) -> IncomingPoint {
        IncomingPoint {
            group_no: 0,
            sequence,
            valid_fields: valid_fields::REQUIRED,
            time_ms,
            pos: [pos0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            vel: [vel0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            acc: [0.0; MAX_AXES_PER_GROUP],
        }
    }

    #[test]
    fn rejects_when_not_motion_ready() {
        let mut groups = vec![ControlGroup::new(&sample_config(), 10)];
        let status = StatusSnapshot::default();
        let err = validate_and_apply(&mut groups, &status, &point(0, 4, 0.0, 0.0)).unwrap_err();
        let (r, _) = motion_common::result_code::unpack_result(err);
        assert_eq!(r, Some(ResultCode::NotReady));
    }

    #[test]
    fn rejects_bad_group_number() {
        let mut groups = vec![ControlGroup::new(&sample_config(), 10)];
        let status = ready_status();
        let mut p = point(0, 4, 0.0, 0.0);
        p.group_no = 9;
        let err = validate_and_apply(&mut groups, &status, &p).unwrap_err();
        let (r, s) = motion_common::result_code::unpack_result(err);
        assert_eq!(r, Some(ResultCode::Invalid));
        assert_eq!(s, Some(Subcode::InvalidGroupNo));
    }

    #[test]
    fn rejects_missing_required_fields() {
        let mut groups = vec![ControlGroup::new(&sample_config(), 10)];
        let status = ready_status();
        let mut p = point(0, 4, 0.0, 0.0);
        p.valid_fields = valid_fields::TIME;
        let err = validate_and_apply(&mut groups, &status, &p).unwrap_err();
        let (r, s) = motion_common::result_code::unpack_result(err);
        assert_eq!(r, Some(ResultCode::Invalid));
        assert_eq!(s, Some(Subcode::InvalidDataInsufficient));
    }

    #[test]
    fn rejects_start_pos_mismatch() {
        let mut groups = vec![ControlGroup::new(&sample_config(), 10)];
        let status = ready_status();
        let p = point(0, 4, 1.0, 0.0);
        let err = validate_and_apply(&mut groups, &status, &p).unwrap_err();
        let (r, s) = motion_common::result_code::unpack_result(err);
        assert_eq!(r, Some(ResultCode::Invalid));
        assert_eq!(s, Some(Subcode::InvalidDataStartPos));
    }

    #[test]
    fn rejects_over_speed() {
        let mut groups = vec![ControlGroup::new(&sample_config(), 10)];
        let status = ready_status();
        let p = point(0, 4, 0.0, 5.0);
        let err = validate_and_apply(&mut groups, &status, &p).unwrap_err();
        let (r, s) = motion_common::result_code::unpack_result(err);
        assert_eq!(r, Some(ResultCode::Invalid));
        assert_eq!(s, Some(Subcode::InvalidDataSpeed));
    }

    #[test]
    fn rejects_follow_up_when_busy() {
        let mut groups = vec![ControlGroup::new(&sample_config(), 10)];
        let status = ready_status();
        assert!(validate_and_apply(&mut groups, &status, &point(0, 4, 0.0, 0.0)).is_ok());
        groups[0].set_has_pending(true);
        let err = validate_and_apply(&mut groups, &status, &point(1, 8, 0.001, 0.0)).unwrap_err();
        let (r, _) = motion_common::result_code::unpack_result(err);
        assert_eq!(r, Some(ResultCode::Busy));
    }

    #[test]
    fn sequence_zero_initializes_and_sequence_positive_appends() {
        let mut groups = vec![ControlGroup::new(&sample_config(), 10)];
        let status = ready_status();
        assert!(validate_and_apply(&mut groups, &status, &point(0, 4, 0.0, 0.0)).is_ok());
        assert_eq!(groups[0].time_leftover_ms, 0);
        assert!(validate_and_apply(&mut groups, &status, &point(1, 8, 0.001, 0.0)).is_ok());
        assert!(groups[0].has_pending());
    }

    #[test]
    fn seq_zero_from_nonzero_current_pulse_seeds_segment_at_current_pos() {
        // Mirrors spec scenario 2 ([1000,...] starting pulse) but on the
        // accept path: seq0's position matches the current commanded pulse,
        // so the first segment must interpolate start->end relative to that
        // pulse, not from an implicit zero origin.
        let mut groups = vec![ControlGroup::new(&sample_config(), 10)];
        groups[0].prev_pulse[0] = 1000;
        let status = ready_status();

        // pos0 = 0.1 rad * 10000 pulse/rad = 1000 pulse: matches prev_pulse.
        assert!(validate_and_apply(&mut groups, &status, &point(0, 0, 0.1, 0.0)).is_ok());
        assert_eq!(groups[0].cur_traj.pos[0], 0.1);
        assert_eq!(groups[0].prev_pulse[0], 1000);

        assert!(validate_and_apply(&mut groups, &status, &point(1, 1000, 0.2, 0.1)).is_ok());

        let always_ready = || true;
        let outcome = crate::interpolator::run_segment(&mut groups[0], 4, always_ready);
        assert!(matches!(outcome, crate::interpolator::SegmentOutcome::Completed { .. }));

        let mut total = 0i32;
        while let Some(inc) = groups[0].queue.dequeue_one() {
            total += inc.inc[0];
        }
        let expected = groups[0].to_pulse(&[0.2, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])[0]
            - groups[0].to_pulse(&[0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])[0];
        assert_eq!(total, expected);
        assert_eq!(total, 1000);
    }

    #[test]
    fn negative_sequence_is_invalid() {
        let mut groups = vec![ControlGroup::new(&sample_config(), 10)];
        let status = ready_status();
        let err = validate_and_apply(&mut groups, &status, &point(-1, 4, 0.0, 0.0)).unwrap_err();
        let (r, s) = motion_common::result_code::unpack_result(err);
        assert_eq!(r, Some(ResultCode::Invalid));
        assert_eq!(s, Some(Subcode::InvalidSequence));
    }
}
