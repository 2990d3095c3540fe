//! Variant dispatch (§9 "Variant dispatch"): decode a framed request body by
//! `header.msg_type`, route it to the trajectory validator, the motion
//! control handler, or the I/O primitives, and encode the reply.

use std::sync::Arc;
use std::time::Duration;

use motion_common::consts::MOTION_SERVER_CONNECTED_IO_ADDR;
use motion_common::result_code::{pack_result, ResultCode, Subcode};
use motion_common::wire::{
    self, ExpectedSize, GetVersionReplyBody, Header, IoBitReqBody, JointTrajPtFullBody,
    JointTrajPtFullExBody, MotoMotionCtrlBody, MotoMotionReplyBody, MotionCtrlCommand, MsgType,
    ReadIoBitReplyBody, WriteIoBitReplyBody,
};
use motion_server::controller::Controller;
use motion_server::handler::{self, Timeouts};
use motion_server::validator::{validate_and_apply, IncomingPoint};

/// Outcome of dispatching one request: the framed reply bytes, plus whether
/// the reader should close the connection after sending them (DISCONNECT).
pub struct DispatchOutcome {
    pub framed_reply: Vec<u8>,
    pub close: bool,
}

fn blocking_sleep(d: Duration) {
    std::thread::sleep(d);
}

fn empty_reply_body() -> MotoMotionReplyBody {
    MotoMotionReplyBody {
        group_no: -1,
        sequence: -1,
        command: -1,
        result: 0,
        data: [0; 10],
        data2: [0; 10],
        io_value: 0,
        power_on_timestamp: 0,
    }
}

fn frame_motion_reply(body: MotoMotionReplyBody) -> Vec<u8> {
    let header = Header { msg_type: MsgType::MotoMotionReply as u32, comm_type: 0, reply_type: 0 };
    let mut out = Vec::new();
    header.encode(&mut out);
    body.encode(&mut out);
    wire::frame(&out)
}

fn invalid_reply(subcode: Subcode) -> Vec<u8> {
    let mut body = empty_reply_body();
    body.result = pack_result(ResultCode::Invalid, subcode);
    frame_motion_reply(body)
}

/// Build the trajectory-point ack: every reply carries observed pulse
/// position (radians), torque, and the power-on RTC timestamp (§6).
fn traj_point_reply(controller: &Controller, group_no: i32, sequence: i32, result: u32) -> Vec<u8> {
    let mut body = empty_reply_body();
    body.group_no = group_no;
    body.sequence = sequence;
    body.command = -1;
    body.result = result;
    if group_no >= 0 {
        let fb_pulse = controller.primitives.get_fb_pulse_pos(group_no as usize);
        let torque = controller.primitives.get_torque(group_no as usize);
        let groups = controller.groups.lock().unwrap();
        if let Some(group) = groups.get(group_no as usize) {
            let rad = group.to_rad(&fb_pulse);
            for i in 0..group.num_axes.min(10) {
                body.data[i] = rad[i] as i32;
            }
        }
        for i in 0..10.min(torque.len()) {
            body.data2[i] = torque[i];
        }
    }
    body.power_on_timestamp = controller.primitives.rtc();
    frame_motion_reply(body)
}

fn timeouts_of(controller: &Controller) -> Timeouts {
    controller.timeouts
}

fn incoming_point_from_full(body: &JointTrajPtFullBody) -> IncomingPoint {
    let mut point = IncomingPoint {
        group_no: body.group_no,
        sequence: body.sequence,
        valid_fields: body.valid_fields,
        time_ms: (body.time_s as f64 * 1000.0).round() as i64,
        pos: [0.0; motion_common::consts::MAX_AXES_PER_GROUP],
        vel: [0.0; motion_common::consts::MAX_AXES_PER_GROUP],
        acc: [0.0; motion_common::consts::MAX_AXES_PER_GROUP],
    };
    for i in 0..motion_common::consts::MAX_AXES_PER_GROUP {
        point.pos[i] = body.pos[i] as f64;
        point.vel[i] = body.vel[i] as f64;
        point.acc[i] = body.acc[i] as f64;
    }
    point
}

fn incoming_point_from_ex(sequence: i32, data: &wire::ExData) -> IncomingPoint {
    let mut point = IncomingPoint {
        group_no: data.group_no,
        sequence,
        valid_fields: data.valid_fields,
        time_ms: (data.time_s as f64 * 1000.0).round() as i64,
        pos: [0.0; motion_common::consts::MAX_AXES_PER_GROUP],
        vel: [0.0; motion_common::consts::MAX_AXES_PER_GROUP],
        acc: [0.0; motion_common::consts::MAX_AXES_PER_GROUP],
    };
    for i in 0..motion_common::consts::MAX_AXES_PER_GROUP {
        point.pos[i] = data.pos[i] as f64;
        point.vel[i] = data.vel[i] as f64;
        point.acc[i] = data.acc[i] as f64;
    }
    point
}

fn validate_result_to_reply(controller: &Controller, group_no: i32, sequence: i32, outcome: Result<(), u32>) -> Vec<u8> {
    match outcome {
        Ok(()) => traj_point_reply(controller, group_no, sequence, pack_result(ResultCode::Success, Subcode::None)),
        Err(packed) => traj_point_reply(controller, group_no, sequence, packed),
    }
}

async fn handle_joint_traj_pt_full(controller: &Arc<Controller>, body: &[u8]) -> Vec<u8> {
    let decoded = match JointTrajPtFullBody::decode(body) {
        Ok(d) => d,
        Err(_) => return invalid_reply(Subcode::InvalidMsgSize),
    };
    let point = incoming_point_from_full(&decoded);
    let status = controller.primitives.status_update();
    let mut groups = controller.groups.lock().unwrap();
    let outcome = validate_and_apply(&mut groups, &status, &point);
    drop(groups);
    validate_result_to_reply(controller, decoded.group_no, decoded.sequence, outcome)
}

/// §9 Open Question O4: stop and reply with the first group's error; later
/// groups in the same message receive no reply at all.
async fn handle_joint_traj_pt_full_ex(controller: &Arc<Controller>, body: &[u8]) -> Vec<u8> {
    let decoded = match JointTrajPtFullExBody::decode(body) {
        Ok(d) => d,
        Err(_) => return invalid_reply(Subcode::InvalidMsgSize),
    };
    let status = controller.primitives.status_update();
    let mut last_group = -1;
    for ex in &decoded.groups {
        let point = incoming_point_from_ex(decoded.sequence, ex);
        let mut groups = controller.groups.lock().unwrap();
        let outcome = validate_and_apply(&mut groups, &status, &point);
        drop(groups);
        last_group = ex.group_no;
        if let Err(packed) = outcome {
            return traj_point_reply(controller, ex.group_no, decoded.sequence, packed);
        }
    }
    traj_point_reply(controller, last_group, decoded.sequence, pack_result(ResultCode::Success, Subcode::None))
}

async fn handle_motion_ctrl(controller: &Arc<Controller>, body: &[u8]) -> DispatchOutcome {
    let decoded = match MotoMotionCtrlBody::decode(body) {
        Ok(d) => d,
        Err(_) => return DispatchOutcome { framed_reply: invalid_reply(Subcode::InvalidMsgSize), close: false },
    };
    let command = match MotionCtrlCommand::from_i32(decoded.command) {
        Some(c) => c,
        None => {
            let mut reply = empty_reply_body();
            reply.group_no = decoded.group_no;
            reply.sequence = decoded.sequence;
            reply.command = decoded.command;
            reply.result = pack_result(ResultCode::Invalid, Subcode::InvalidMsgType);
            return DispatchOutcome { framed_reply: frame_motion_reply(reply), close: false };
        }
    };

    let controller = Arc::clone(controller);
    let group_no = decoded.group_no;
    let sequence = decoded.sequence;
    let command_i32 = decoded.command;

    let (result, close) = tokio::task::spawn_blocking(move || run_motion_ctrl(&controller, command, group_no))
        .await
        .unwrap_or_else(|_| (pack_result(ResultCode::Failure, Subcode::None), false));

    let mut reply = empty_reply_body();
    reply.group_no = group_no;
    reply.sequence = sequence;
    reply.command = command_i32;
    reply.result = result;
    DispatchOutcome { framed_reply: frame_motion_reply(reply), close }
}

/// Runs on a blocking-pool thread: the motion-mode state machine polls with
/// real sleeps for up to `motion_start_timeout_ms`/`motion_stop_timeout_ms`.
fn run_motion_ctrl(controller: &Controller, command: MotionCtrlCommand, group_no: i32) -> (u32, bool) {
    let timeouts = timeouts_of(controller);
    let primitives = controller.primitives.as_ref();
    match command {
        MotionCtrlCommand::CheckMotionReady => (handler::check_motion_ready(primitives), false),
        MotionCtrlCommand::CheckQueueCnt => {
            let groups = controller.groups.lock().unwrap();
            let count = handler::check_queue_count(&groups, group_no.max(0) as usize);
            let result = if count >= 0 {
                pack_result(ResultCode::Success, Subcode::None)
            } else {
                pack_result(ResultCode::Failure, Subcode::None)
            };
            (result, false)
        }
        MotionCtrlCommand::StopMotion => {
            let groups = controller.groups.lock().unwrap();
            (handler::stop_motion(&groups, &controller.stop_motion, &timeouts, &blocking_sleep), false)
        }
        MotionCtrlCommand::StartServos => {
            let groups = controller.groups.lock().unwrap();
            (handler::set_servo_power(primitives, &groups, &controller.stop_motion, true, &timeouts, &blocking_sleep), false)
        }
        MotionCtrlCommand::StopServos => {
            let groups = controller.groups.lock().unwrap();
            (handler::set_servo_power(primitives, &groups, &controller.stop_motion, false, &timeouts, &blocking_sleep), false)
        }
        MotionCtrlCommand::ResetAlarm => (handler::reset_alarm(primitives), false),
        MotionCtrlCommand::StartTrajMode => {
            let mut groups = controller.groups.lock().unwrap();
            (handler::start_traj_mode(primitives, &mut groups, &timeouts, &blocking_sleep), false)
        }
        MotionCtrlCommand::StopTrajMode => {
            let groups = controller.groups.lock().unwrap();
            (handler::stop_traj_mode(primitives, &groups, &controller.stop_motion, &timeouts, &blocking_sleep), false)
        }
        MotionCtrlCommand::Disconnect => {
            let groups = controller.groups.lock().unwrap();
            let result = handler::stop_traj_mode(primitives, &groups, &controller.stop_motion, &timeouts, &blocking_sleep);
            (result, true)
        }
    }
}

fn group_bit_addresses(base: i32) -> [i32; 8] {
    let mut out = [0; 8];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = base * 10 + i as i32;
    }
    out
}

async fn handle_read_io(controller: &Arc<Controller>, body: &[u8], group: bool) -> Vec<u8> {
    let req = match IoBitReqBody::decode(body) {
        Ok(r) => r,
        Err(_) => return invalid_reply(Subcode::InvalidMsgSize),
    };
    let controller = Arc::clone(controller);
    let address = req.io_address;
    let (value, ok) = tokio::task::spawn_blocking(move || {
        if group {
            let mut packed = 0i32;
            for (i, addr) in group_bit_addresses(address).iter().enumerate() {
                match controller.primitives.read_io(*addr) {
                    Ok(true) => packed |= 1 << i,
                    Ok(false) => {}
                    Err(_) => return (0, false),
                }
            }
            (packed, true)
        } else {
            match controller.primitives.read_io(address) {
                Ok(v) => (v as i32, true),
                Err(_) => (0, false),
            }
        }
    })
    .await
    .unwrap_or((0, false));

    let reply_type = if group { MsgType::ReadIoGroupReply } else { MsgType::ReadIoBitReply };
    let result = if ok {
        pack_result(ResultCode::Success, Subcode::None) as i32
    } else {
        pack_result(ResultCode::Invalid, Subcode::InvalidReadIo) as i32
    };
    let body = ReadIoBitReplyBody { value, result };
    let header = Header { msg_type: reply_type as u32, comm_type: 0, reply_type: 0 };
    let mut out = Vec::new();
    header.encode(&mut out);
    body.encode(&mut out);
    wire::frame(&out)
}

async fn handle_write_io(controller: &Arc<Controller>, body: &[u8], group: bool) -> Vec<u8> {
    let req = match wire::WriteIoBitReqBody::decode(body) {
        Ok(r) => r,
        Err(_) => return invalid_reply(Subcode::InvalidMsgSize),
    };
    let controller = Arc::clone(controller);
    let address = req.io_address;
    let value = req.io_value;
    let ok = tokio::task::spawn_blocking(move || {
        if group {
            for (i, addr) in group_bit_addresses(address).iter().enumerate() {
                let bit = (value >> i) & 1 != 0;
                if controller.primitives.write_io(*addr, bit).is_err() {
                    return false;
                }
            }
            true
        } else {
            controller.primitives.write_io(address, value != 0).is_ok()
        }
    })
    .await
    .unwrap_or(false);

    let reply_type = if group { MsgType::WriteIoGroupReply } else { MsgType::WriteIoBitReply };
    let result = if ok {
        pack_result(ResultCode::Success, Subcode::None) as i32
    } else {
        pack_result(ResultCode::Invalid, Subcode::None) as i32
    };
    let body = WriteIoBitReplyBody { result };
    let header = Header { msg_type: reply_type as u32, comm_type: 0, reply_type: 0 };
    let mut out = Vec::new();
    header.encode(&mut out);
    body.encode(&mut out);
    wire::frame(&out)
}

fn handle_get_version() -> Vec<u8> {
    let body = GetVersionReplyBody { version: motion_common::consts::APPLICATION_VERSION.to_string() };
    let header = Header { msg_type: MsgType::GetVersionReply as u32, comm_type: 0, reply_type: 0 };
    let mut out = Vec::new();
    header.encode(&mut out);
    body.encode(&mut out);
    wire::frame(&out)
}

/// §4.D steps 2-7: validate `expected_body_size` against what was actually
/// received, then dispatch one message to its handler.
pub async fn dispatch(controller: &Arc<Controller>, header: Header, body: &[u8]) -> DispatchOutcome {
    match wire::expected_body_size(header.msg_type, body) {
        ExpectedSize::UnknownType => DispatchOutcome { framed_reply: invalid_reply(Subcode::InvalidMsgType), close: false },
        ExpectedSize::NeedMoreToPeek => DispatchOutcome { framed_reply: invalid_reply(Subcode::InvalidMsgSize), close: false },
        ExpectedSize::Known(expected) if expected != body.len() => {
            DispatchOutcome { framed_reply: invalid_reply(Subcode::InvalidMsgSize), close: false }
        }
        ExpectedSize::Known(_) => match MsgType::from_u32(header.msg_type) {
            Some(MsgType::GetVersion) => DispatchOutcome { framed_reply: handle_get_version(), close: false },
            Some(MsgType::JointTrajPtFull) => {
                DispatchOutcome { framed_reply: handle_joint_traj_pt_full(controller, body).await, close: false }
            }
            Some(MsgType::JointTrajPtFullEx) => {
                DispatchOutcome { framed_reply: handle_joint_traj_pt_full_ex(controller, body).await, close: false }
            }
            Some(MsgType::MotoMotionCtrl) => handle_motion_ctrl(controller, body).await,
            Some(MsgType::ReadIoBit) => DispatchOutcome { framed_reply: handle_read_io(controller, body, false).await, close: false },
            Some(MsgType::ReadIoGroup) => DispatchOutcome { framed_reply: handle_read_io(controller, body, true).await, close: false },
            Some(MsgType::WriteIoBit) => DispatchOutcome { framed_reply: handle_write_io(controller, body, false).await, close: false },
            Some(MsgType::WriteIoGroup) => DispatchOutcome { framed_reply: handle_write_io(controller, body, true).await, close: false },
            _ => DispatchOutcome { framed_reply: invalid_reply(Subcode::InvalidMsgType), close: false },
        },
    }
}

/// Raise or clear the "motion-server-connected" I/O bit (§4.G) as the set of
/// live connections transitions to/from empty.
pub fn update_connected_io(controller: &Controller, connected: bool) {
    let _ = controller.primitives.write_io(MOTION_SERVER_CONNECTED_IO_ADDR, connected);
}

