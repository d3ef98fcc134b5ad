use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::header::{Header, HeaderKind, FRAME_LEN, TERMINATOR};

/// Largest value a 3-byte field can carry.
pub const FIELD_MAX: u32 = 0x00FF_FFFF;

/// Duty percentages travel as `percent * DUTY_SCALE` (0.001 % resolution).
pub const DUTY_SCALE: f64 = 1000.0;

/// Millivolt and milliamp readings travel as `value * READING_SCALE`.
pub const READING_SCALE: f64 = 100.0;

const FIELD_A: usize = 1;
const FIELD_B: usize = 4;

/// A validated frame: a recognized header and two 24-bit fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    header: Header,
    field_a: u32,
    field_b: u32,
}

impl Frame {
    /// Build a frame, rejecting field values wider than 24 bits.
    pub fn new(header: Header, field_a: u32, field_b: u32) -> Result<Self> {
        check_field("field A", field_a)?;
        check_field("field B", field_b)?;
        Ok(Self {
            header,
            field_a,
            field_b,
        })
    }

    pub fn header(&self) -> Header {
        self.header
    }

    pub fn field_a(&self) -> u32 {
        self.field_a
    }

    pub fn field_b(&self) -> u32 {
        self.field_b
    }

    /// Encode into the wire format.
    ///
    /// ```text
    /// ┌──────────┬────────────────┬────────────────┬────────────┐
    /// │ Header   │ Field A        │ Field B        │ Terminator │
    /// │ (1B)     │ (3B BE)        │ (3B BE)        │ 0xFF       │
    /// └──────────┴────────────────┴────────────────┴────────────┘
    /// ```
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut out = [0u8; FRAME_LEN];
        out[0] = self.header.as_byte();
        out[FIELD_A..FIELD_A + 3].copy_from_slice(&u24_be(self.field_a));
        out[FIELD_B..FIELD_B + 3].copy_from_slice(&u24_be(self.field_b));
        out[FRAME_LEN - 1] = TERMINATOR;
        out
    }

    /// Interpret the frame by header.
    pub fn message(&self) -> Message {
        match self.header.kind() {
            HeaderKind::Command => Message::Duty(DutyCommand::from_frame_unchecked(self)),
            HeaderKind::Telemetry => Message::Telemetry(TelemetryReading {
                channel: self.header.channel().unwrap_or(0),
                millivolts: f64::from(self.field_a) / READING_SCALE,
                milliamps: f64::from(self.field_b) / READING_SCALE,
            }),
            HeaderKind::DeviceError => Message::HeaterNotFound(DeviceFault {
                code: self.field_a,
            }),
        }
    }
}

/// Append the encoded frame to `dst`.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    dst.reserve(FRAME_LEN);
    dst.put_u8(frame.header.as_byte());
    dst.put_uint(u64::from(frame.field_a), 3);
    dst.put_uint(u64::from(frame.field_b), 3);
    dst.put_u8(TERMINATOR);
}

/// Decode exactly one frame.
///
/// Returns `None` unless `bytes` is exactly [`FRAME_LEN`] long, starts with a
/// recognized header and ends with [`TERMINATOR`].
pub fn try_decode(bytes: &[u8]) -> Option<Frame> {
    if bytes.len() != FRAME_LEN || bytes[FRAME_LEN - 1] != TERMINATOR {
        return None;
    }
    let header = Header::from_byte(bytes[0])?;
    Some(Frame {
        header,
        field_a: read_u24(&bytes[FIELD_A..FIELD_A + 3]),
        field_b: read_u24(&bytes[FIELD_B..FIELD_B + 3]),
    })
}

fn read_u24(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &byte| (acc << 8) | u32::from(byte))
}

fn u24_be(value: u32) -> [u8; 3] {
    let [_, hi, mid, lo] = value.to_be_bytes();
    [hi, mid, lo]
}

fn check_field(field: &'static str, value: u32) -> Result<()> {
    if value > FIELD_MAX {
        return Err(FrameError::FieldOutOfRange { field, value });
    }
    Ok(())
}

/// Decoded payload of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    Duty(DutyCommand),
    Telemetry(TelemetryReading),
    HeaterNotFound(DeviceFault),
}

/// A duty-cycle setpoint for one or both heaters, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DutyCommand {
    Heater0(f64),
    Heater1(f64),
    Both { heater0: f64, heater1: f64 },
}

impl DutyCommand {
    /// Both heaters off.
    pub const ZERO: DutyCommand = DutyCommand::Both {
        heater0: 0.0,
        heater1: 0.0,
    };

    /// Encode as a frame. Percentages must already be within `[0, 100]`.
    pub fn to_frame(&self) -> Result<Frame> {
        match *self {
            DutyCommand::Heater0(percent) => {
                Frame::new(Header::DutyHeater0, duty_field(0, percent)?, 0)
            }
            DutyCommand::Heater1(percent) => {
                Frame::new(Header::DutyHeater1, duty_field(1, percent)?, 0)
            }
            DutyCommand::Both { heater0, heater1 } => Frame::new(
                Header::DutyBoth,
                duty_field(0, heater0)?,
                duty_field(1, heater1)?,
            ),
        }
    }

    /// Interpret a command frame. Returns `None` for other kinds.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        match frame.header.kind() {
            HeaderKind::Command => Some(Self::from_frame_unchecked(frame)),
            _ => None,
        }
    }

    fn from_frame_unchecked(frame: &Frame) -> Self {
        let a = f64::from(frame.field_a) / DUTY_SCALE;
        let b = f64::from(frame.field_b) / DUTY_SCALE;
        match frame.header {
            Header::DutyHeater0 => DutyCommand::Heater0(a),
            Header::DutyHeater1 => DutyCommand::Heater1(a),
            _ => DutyCommand::Both {
                heater0: a,
                heater1: b,
            },
        }
    }
}

fn duty_field(heater: u8, percent: f64) -> Result<u32> {
    if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
        return Err(FrameError::DutyOutOfRange { heater, percent });
    }
    // 100 % scales to 100_000, well inside 24 bits.
    Ok((percent * DUTY_SCALE).round() as u32)
}

/// INA260 reading for one heater channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryReading {
    pub channel: u8,
    pub millivolts: f64,
    pub milliamps: f64,
}

/// Diagnostic carried by a heater-not-found frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFault {
    pub code: u32,
}
