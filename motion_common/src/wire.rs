//! Binary wire protocol (§6): `prefix(u32 LE length) | header | body`.
//!
//! `length` in the prefix is the byte count from the start of `header`
//! through the end of `body`. Every request receives exactly one reply.
//! Multi-byte integers and floats are little-endian throughout.

use crate::consts::MAX_AXES_PER_GROUP;
use crate::error::ProtocolError;

pub const PREFIX_SIZE: usize = 4;
pub const HEADER_SIZE: usize = 12;

/// `valid_fields` bitmap bits (§6).
pub mod valid_fields {
    pub const TIME: u32 = 1 << 0;
    pub const POS: u32 = 1 << 1;
    pub const VEL: u32 = 1 << 2;
    pub const ACC: u32 = 1 << 3;
    pub const IO_READ: u32 = 1 << 4;

    pub const REQUIRED: u32 = TIME | POS | VEL;
}

/// Control sub-commands carried inside a `MOTO_MOTION_CTRL` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MotionCtrlCommand {
    CheckMotionReady = 0,
    CheckQueueCnt = 1,
    StopMotion = 2,
    StartServos = 3,
    StopServos = 4,
    ResetAlarm = 5,
    StartTrajMode = 6,
    StopTrajMode = 7,
    Disconnect = 8,
}

impl MotionCtrlCommand {
    pub const fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::CheckMotionReady),
            1 => Some(Self::CheckQueueCnt),
            2 => Some(Self::StopMotion),
            3 => Some(Self::StartServos),
            4 => Some(Self::StopServos),
            5 => Some(Self::ResetAlarm),
            6 => Some(Self::StartTrajMode),
            7 => Some(Self::StopTrajMode),
            8 => Some(Self::Disconnect),
            _ => None,
        }
    }
}

/// Recognized `header.msg_type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MsgType {
    GetVersion = 1,
    GetVersionReply = 2,
    JointTrajPtFull = 3,
    JointTrajPtFullEx = 4,
    MotoMotionCtrl = 5,
    MotoMotionReply = 6,
    ReadIoBit = 7,
    ReadIoBitReply = 8,
    WriteIoBit = 9,
    WriteIoBitReply = 10,
    ReadIoGroup = 11,
    ReadIoGroupReply = 12,
    WriteIoGroup = 13,
    WriteIoGroupReply = 14,
}

impl MsgType {
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::GetVersion),
            2 => Some(Self::GetVersionReply),
            3 => Some(Self::JointTrajPtFull),
            4 => Some(Self::JointTrajPtFullEx),
            5 => Some(Self::MotoMotionCtrl),
            6 => Some(Self::MotoMotionReply),
            7 => Some(Self::ReadIoBit),
            8 => Some(Self::ReadIoBitReply),
            9 => Some(Self::WriteIoBit),
            10 => Some(Self::WriteIoBitReply),
            11 => Some(Self::ReadIoGroup),
            12 => Some(Self::ReadIoGroupReply),
            13 => Some(Self::WriteIoGroup),
            14 => Some(Self::WriteIoGroupReply),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: u32,
    pub comm_type: u32,
    pub reply_type: i32,
}

impl Header {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.msg_type.to_le_bytes());
        out.extend_from_slice(&self.comm_type.to_le_bytes());
        out.extend_from_slice(&self.reply_type.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < HEADER_SIZE {
            return Err(ProtocolError::ShortRead { expected: HEADER_SIZE, got: buf.len() });
        }
        Ok(Self {
            msg_type: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            comm_type: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            reply_type: i32::from_le_bytes(buf[8..12].try_into().unwrap()),
        })
    }
}

/// Write the 4-byte LE length prefix ahead of an already-encoded `header+body`.
pub fn frame(header_and_body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(PREFIX_SIZE + header_and_body.len());
    out.extend_from_slice(&(header_and_body.len() as u32).to_le_bytes());
    out.extend_from_slice(header_and_body);
    out
}

fn read_f32(buf: &[u8], off: usize) -> f32 {
    f32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}
fn read_i32(buf: &[u8], off: usize) -> i32 {
    i32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}
fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

/// One trajectory point in wire units: `time` is seconds (`f32`), per §3's
/// "Wire note" — the seconds→milliseconds conversion happens one layer up,
/// in the decoder that builds a `JointMotionData`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointTrajPtFullBody {
    pub group_no: i32,
    pub sequence: i32,
    pub valid_fields: u32,
    pub time_s: f32,
    pub pos: [f32; MAX_AXES_PER_GROUP],
    pub vel: [f32; MAX_AXES_PER_GROUP],
    pub acc: [f32; MAX_AXES_PER_GROUP],
    pub io_read_addr: i32,
}

pub const JOINT_TRAJ_PT_FULL_SIZE: usize =
    4 + 4 + 4 + 4 + MAX_AXES_PER_GROUP * 4 * 3 + 4;

impl JointTrajPtFullBody {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.group_no.to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.extend_from_slice(&self.valid_fields.to_le_bytes());
        out.extend_from_slice(&self.time_s.to_le_bytes());
        for v in &self.pos {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in &self.vel {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in &self.acc {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&self.io_read_addr.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < JOINT_TRAJ_PT_FULL_SIZE {
            return Err(ProtocolError::ShortRead {
                expected: JOINT_TRAJ_PT_FULL_SIZE,
                got: buf.len(),
            });
        }
        let mut pos = [0f32; MAX_AXES_PER_GROUP];
        let mut vel = [0f32; MAX_AXES_PER_GROUP];
        let mut acc = [0f32; MAX_AXES_PER_GROUP];
        let mut off = 16;
        for v in pos.iter_mut() {
            *v = read_f32(buf, off);
            off += 4;
        }
        for v in vel.iter_mut() {
            *v = read_f32(buf, off);
            off += 4;
        }
        for v in acc.iter_mut() {
            *v = read_f32(buf, off);
            off += 4;
        }
        Ok(Self {
            group_no: read_i32(buf, 0),
            sequence: read_i32(buf, 4),
            valid_fields: read_u32(buf, 8),
            time_s: read_f32(buf, 12),
            pos,
            vel,
            acc,
            io_read_addr: read_i32(buf, off),
        })
    }
}

/// One group's payload inside a `JOINT_TRAJ_PT_FULL_EX` body; `sequence`
/// is shared at the message level and not repeated here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExData {
    pub group_no: i32,
    pub valid_fields: u32,
    pub time_s: f32,
    pub pos: [f32; MAX_AXES_PER_GROUP],
    pub vel: [f32; MAX_AXES_PER_GROUP],
    pub acc: [f32; MAX_AXES_PER_GROUP],
    pub io_read_addr: i32,
}

pub const EX_DATA_SIZE: usize = 4 + 4 + 4 + MAX_AXES_PER_GROUP * 4 * 3 + 4;

impl ExData {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.group_no.to_le_bytes());
        out.extend_from_slice(&self.valid_fields.to_le_bytes());
        out.extend_from_slice(&self.time_s.to_le_bytes());
        for v in &self.pos {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in &self.vel {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in &self.acc {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&self.io_read_addr.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < EX_DATA_SIZE {
            return Err(ProtocolError::ShortRead { expected: EX_DATA_SIZE, got: buf.len() });
        }
        let mut pos = [0f32; MAX_AXES_PER_GROUP];
        let mut vel = [0f32; MAX_AXES_PER_GROUP];
        let mut acc = [0f32; MAX_AXES_PER_GROUP];
        let mut off = 12;
        for v in pos.iter_mut() {
            *v = read_f32(buf, off);
            off += 4;
        }
        for v in vel.iter_mut() {
            *v = read_f32(buf, off);
            off += 4;
        }
        for v in acc.iter_mut() {
            *v = read_f32(buf, off);
            off += 4;
        }
        Ok(Self {
            group_no: read_i32(buf, 0),
            valid_fields: read_u32(buf, 4),
            time_s: read_f32(buf, 8),
            pos,
            vel,
            acc,
            io_read_addr: read_i32(buf, off),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JointTrajPtFullExBody {
    pub sequence: i32,
    pub groups: Vec<ExData>,
}

impl JointTrajPtFullExBody {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.groups.len() as i32).to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        for g in &self.groups {
            g.encode(out);
        }
    }

    /// Peek `number_of_valid_groups` from the start of the body without
    /// requiring the rest of the message to be present yet (§4.D step 3).
    pub fn peek_num_groups(buf: &[u8]) -> Result<i32, ProtocolError> {
        if buf.len() < 4 {
            return Err(ProtocolError::ShortRead { expected: 4, got: buf.len() });
        }
        Ok(read_i32(buf, 0))
    }

    /// Total body size for a given `number_of_valid_groups`.
    pub const fn body_size_for(num_groups: usize) -> usize {
        4 + 4 + num_groups * EX_DATA_SIZE
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let n = Self::peek_num_groups(buf)?;
        if n < 0 {
            return Err(ProtocolError::ShortRead { expected: 0, got: 0 });
        }
        let n = n as usize;
        let needed = Self::body_size_for(n);
        if buf.len() < needed {
            return Err(ProtocolError::ShortRead { expected: needed, got: buf.len() });
        }
        let sequence = read_i32(buf, 4);
        let mut groups = Vec::with_capacity(n);
        let mut off = 8;
        for _ in 0..n {
            groups.push(ExData::decode(&buf[off..off + EX_DATA_SIZE])?);
            off += EX_DATA_SIZE;
        }
        Ok(Self { sequence, groups })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotoMotionCtrlBody {
    pub group_no: i32,
    pub sequence: i32,
    pub command: i32,
    pub data: [i32; 10],
}

pub const MOTO_MOTION_CTRL_SIZE: usize = 4 + 4 + 4 + 10 * 4;

impl MotoMotionCtrlBody {
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < MOTO_MOTION_CTRL_SIZE {
            return Err(ProtocolError::ShortRead { expected: MOTO_MOTION_CTRL_SIZE, got: buf.len() });
        }
        let mut data = [0i32; 10];
        let mut off = 12;
        for v in data.iter_mut() {
            *v = read_i32(buf, off);
            off += 4;
        }
        Ok(Self {
            group_no: read_i32(buf, 0),
            sequence: read_i32(buf, 4),
            command: read_i32(buf, 8),
            data,
        })
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.group_no.to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.extend_from_slice(&self.command.to_le_bytes());
        for v in &self.data {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotoMotionReplyBody {
    pub group_no: i32,
    pub sequence: i32,
    pub command: i32,
    pub result: u32,
    pub data: [i32; 10],
    pub data2: [i32; 10],
    pub io_value: i32,
    pub power_on_timestamp: i32,
}

pub const MOTO_MOTION_REPLY_SIZE: usize = 4 + 4 + 4 + 4 + 10 * 4 + 10 * 4 + 4 + 4;

impl MotoMotionReplyBody {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.group_no.to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.extend_from_slice(&self.command.to_le_bytes());
        out.extend_from_slice(&self.result.to_le_bytes());
        for v in &self.data {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in &self.data2 {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&self.io_value.to_le_bytes());
        out.extend_from_slice(&self.power_on_timestamp.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < MOTO_MOTION_REPLY_SIZE {
            return Err(ProtocolError::ShortRead { expected: MOTO_MOTION_REPLY_SIZE, got: buf.len() });
        }
        let mut data = [0i32; 10];
        let mut data2 = [0i32; 10];
        let mut off = 16;
        for v in data.iter_mut() {
            *v = read_i32(buf, off);
            off += 4;
        }
        for v in data2.iter_mut() {
            *v = read_i32(buf, off);
            off += 4;
        }
        Ok(Self {
            group_no: read_i32(buf, 0),
            sequence: read_i32(buf, 4),
            command: read_i32(buf, 8),
            result: read_u32(buf, 12),
            data,
            data2,
            io_value: read_i32(buf, off),
            power_on_timestamp: read_i32(buf, off + 4),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IoBitReqBody {
    pub io_address: i32,
}
pub const IO_BIT_REQ_SIZE: usize = 4;
impl IoBitReqBody {
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < IO_BIT_REQ_SIZE {
            return Err(ProtocolError::ShortRead { expected: IO_BIT_REQ_SIZE, got: buf.len() });
        }
        Ok(Self { io_address: read_i32(buf, 0) })
    }
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.io_address.to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadIoBitReplyBody {
    pub value: i32,
    pub result: i32,
}
pub const READ_IO_BIT_REPLY_SIZE: usize = 8;
impl ReadIoBitReplyBody {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend_from_slice(&self.result.to_le_bytes());
    }
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < READ_IO_BIT_REPLY_SIZE {
            return Err(ProtocolError::ShortRead { expected: READ_IO_BIT_REPLY_SIZE, got: buf.len() });
        }
        Ok(Self { value: read_i32(buf, 0), result: read_i32(buf, 4) })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteIoBitReqBody {
    pub io_address: i32,
    pub io_value: i32,
}
pub const WRITE_IO_BIT_REQ_SIZE: usize = 8;
impl WriteIoBitReqBody {
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < WRITE_IO_BIT_REQ_SIZE {
            return Err(ProtocolError::ShortRead { expected: WRITE_IO_BIT_REQ_SIZE, got: buf.len() });
        }
        Ok(Self { io_address: read_i32(buf, 0), io_value: read_i32(buf, 4) })
    }
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.io_address.to_le_bytes());
        out.extend_from_slice(&self.io_value.to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteIoBitReplyBody {
    pub result: i32,
}
pub const WRITE_IO_BIT_REPLY_SIZE: usize = 4;
impl WriteIoBitReplyBody {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.result.to_le_bytes());
    }
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < WRITE_IO_BIT_REPLY_SIZE {
            return Err(ProtocolError::ShortRead { expected: WRITE_IO_BIT_REPLY_SIZE, got: buf.len() });
        }
        Ok(Self { result: read_i32(buf, 0) })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetVersionReplyBody {
    pub version: String,
}

impl GetVersionReplyBody {
    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut buf = [0u8; crate::consts::VERSION_MAX_LEN];
        let bytes = self.version.as_bytes();
        let n = bytes.len().min(crate::consts::VERSION_MAX_LEN - 1);
        buf[..n].copy_from_slice(&bytes[..n]);
        out.extend_from_slice(&buf);
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < crate::consts::VERSION_MAX_LEN {
            return Err(ProtocolError::ShortRead {
                expected: crate::consts::VERSION_MAX_LEN,
                got: buf.len(),
            });
        }
        let end = buf[..crate::consts::VERSION_MAX_LEN]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(crate::consts::VERSION_MAX_LEN);
        let version = String::from_utf8_lossy(&buf[..end]).into_owned();
        Ok(Self { version })
    }
}

/// Result of trying to determine how many bytes a message body needs,
/// given only the header and whatever bytes have arrived so far (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedSize {
    /// The body is exactly this many bytes (fixed-size message types).
    Known(usize),
    /// `JOINT_TRAJ_PT_FULL_EX`: not enough bytes yet to read `number_of_valid_groups`.
    NeedMoreToPeek,
    /// `header.msg_type` did not match any recognized type.
    UnknownType,
}

/// Compute the expected body size for a message type, given the bytes
/// received so far after the header (§4.D steps 2-3).
pub fn expected_body_size(msg_type: u32, body_so_far: &[u8]) -> ExpectedSize {
    match MsgType::from_u32(msg_type) {
        Some(MsgType::GetVersion) => ExpectedSize::Known(0),
        Some(MsgType::GetVersionReply) => ExpectedSize::Known(crate::consts::VERSION_MAX_LEN),
        Some(MsgType::JointTrajPtFull) => ExpectedSize::Known(JOINT_TRAJ_PT_FULL_SIZE),
        Some(MsgType::JointTrajPtFullEx) => {
            if body_so_far.len() < 4 {
                ExpectedSize::NeedMoreToPeek
            } else {
                let n = JointTrajPtFullExBody::peek_num_groups(body_so_far).unwrap_or(0).max(0) as usize;
                ExpectedSize::Known(JointTrajPtFullExBody::body_size_for(n))
            }
        }
        Some(MsgType::MotoMotionCtrl) => ExpectedSize::Known(MOTO_MOTION_CTRL_SIZE),
        Some(MsgType::MotoMotionReply) => ExpectedSize::Known(MOTO_MOTION_REPLY_SIZE),
        Some(MsgType::ReadIoBit) | Some(MsgType::ReadIoGroup) => ExpectedSize::Known(IO_BIT_REQ_SIZE),
        Some(MsgType::ReadIoBitReply) | Some(MsgType::ReadIoGroupReply) => {
            ExpectedSize::Known(READ_IO_BIT_REPLY_SIZE)
        }
        Some(MsgType::WriteIoBit) | Some(MsgType::WriteIoGroup) => {
            ExpectedSize::Known(WRITE_IO_BIT_REQ_SIZE)
        }
        Some(MsgType::WriteIoBitReply) | Some(MsgType::WriteIoGroupReply) => {
            ExpectedSize::Known(WRITE_IO_BIT_REPLY_SIZE)
        }
        None => ExpectedSize::UnknownType,
    }
}
