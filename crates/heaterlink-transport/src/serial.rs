use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Baud rate the heater board firmware uses unless told otherwise.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial link settings.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Line speed in baud.
    pub baud_rate: u32,
    /// Per-call timeout applied to both reads and writes.
    ///
    /// Reads time out routinely while the board is quiet; the read pump
    /// uses each timeout as a chance to check for cancellation.
    pub timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(100),
        }
    }
}

/// An open serial port to the heater board. Implements `Read + Write`.
///
/// The link is full duplex: [`SerialLink::split`] hands out a read half and a
/// write half backed by separate handles to the same device, so the inbound
/// reader and the duty-cycle writer never contend for a lock.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialLink {
    /// Open `name` with the given settings.
    pub fn open(name: &str, config: &LinkConfig) -> Result<Self> {
        let port = serialport::new(name, config.baud_rate)
            .timeout(config.timeout)
            .open()
            .map_err(|source| TransportError::Open {
                port: name.to_string(),
                source,
            })?;

        info!(port = name, baud = config.baud_rate, "opened serial link");

        Ok(Self {
            port,
            name: name.to_string(),
        })
    }

    /// Split into `(read_half, write_half)`.
    pub fn split(self) -> Result<(SerialLink, SerialLink)> {
        let writer = self.port.try_clone()?;
        debug!(port = %self.name, "split serial link into read/write halves");
        let write_half = SerialLink {
            port: writer,
            name: self.name.clone(),
        };
        Ok((self, write_half))
    }

    /// The port identifier this link was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Discard anything the OS has buffered in either direction.
    pub fn clear_buffers(&self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port.flush()
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        debug!(port = %self.name, "closing serial link handle");
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("name", &self.name)
            .finish()
    }
}
