//! Transport layer for heaterlink.
//!
//! - [`SerialLink`]: a serial port to the heater board, split into
//!   independent read and write halves
//! - [`discovery`]: enumerate and validate serial devices
//! - [`pump`]: drive the blocking read half and hand chunks to async tasks
//! - [`uds`]: Unix-socket listener used by the control plane
//!
//! This is the lowest layer. Framing lives in `heaterlink-frame`.

pub mod discovery;
pub mod error;
pub mod pump;
pub mod serial;

#[cfg(unix)]
pub mod uds;

pub use discovery::{available_ports, select_port, validate_port, PortInfo, PortKind};
pub use error::{Result, TransportError};
pub use pump::{spawn_read_pump, Chunk, DEFAULT_READ_CHUNK_SIZE};
pub use serial::{LinkConfig, SerialLink, DEFAULT_BAUD_RATE};

#[cfg(unix)]
pub use uds::ControlSocket;
