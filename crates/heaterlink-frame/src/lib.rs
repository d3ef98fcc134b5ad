//! Fixed-length framing for the heater board serial protocol.
//!
//! Every message on the wire is exactly eight bytes:
//! - a 1-byte header naming the message kind and heater channel
//! - two 3-byte big-endian fields
//! - a 1-byte `0xFF` terminator
//!
//! Decoding never fails loudly: anything that is not a valid frame is simply
//! not a frame, and the [`Reassembler`] keeps scanning.

pub mod codec;
pub mod error;
pub mod header;
pub mod reassembler;
pub mod writer;

pub use codec::{
    encode_frame, try_decode, DeviceFault, DutyCommand, Frame, Message, TelemetryReading,
    DUTY_SCALE, FIELD_MAX, READING_SCALE,
};
pub use error::{FrameError, Result};
pub use header::{Header, HeaderKind, FRAME_LEN, TERMINATOR};
pub use reassembler::Reassembler;
pub use writer::FrameWriter;
