use std::path::PathBuf;

/// Errors that can occur on the serial link or control socket.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the serial port.
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        source: serialport::Error,
    },

    /// Serial device enumeration failed.
    #[error("failed to enumerate serial ports: {0}")]
    Discovery(serialport::Error),

    /// The requested port is not among the discovered devices.
    #[error("serial port {port} not found (available: {})", list_or_none(.available))]
    PortNotFound {
        port: String,
        available: Vec<String>,
    },

    /// No port was requested and no single USB device could be chosen.
    #[error("no serial port given and automatic selection failed (candidates: {})", list_or_none(.candidates))]
    NoPortSelected { candidates: Vec<String> },

    /// Failed to bind the control socket.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the control socket.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// An I/O error occurred on the link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device side closed the link.
    #[error("link closed by device")]
    Closed,
}

impl From<serialport::Error> for TransportError {
    fn from(err: serialport::Error) -> Self {
        TransportError::Io(err.into())
    }
}

fn list_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
