//! Serial device discovery.
//!
//! The board shows up as a USB CDC device. When the operator does not name a
//! port, the single USB serial device is chosen; anything else is ambiguous
//! and must be resolved by hand.

use serialport::SerialPortType;
use tracing::debug;

use crate::error::{Result, TransportError};

/// What kind of bus a serial device sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Usb,
    Pci,
    Bluetooth,
    Unknown,
}

impl PortKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PortKind::Usb => "usb",
            PortKind::Pci => "pci",
            PortKind::Bluetooth => "bluetooth",
            PortKind::Unknown => "unknown",
        }
    }
}

/// A discovered serial device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub kind: PortKind,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// A port with no USB metadata.
    pub fn new(name: impl Into<String>, kind: PortKind) -> Self {
        Self {
            name: name.into(),
            kind,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => PortInfo {
                name: info.port_name,
                kind: PortKind::Usb,
                manufacturer: usb.manufacturer,
                product: usb.product,
                serial_number: usb.serial_number,
            },
            SerialPortType::PciPort => PortInfo::new(info.port_name, PortKind::Pci),
            SerialPortType::BluetoothPort => PortInfo::new(info.port_name, PortKind::Bluetooth),
            SerialPortType::Unknown => PortInfo::new(info.port_name, PortKind::Unknown),
        }
    }
}

/// Enumerate serial devices on this machine.
pub fn available_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(TransportError::Discovery)?;
    debug!(count = ports.len(), "enumerated serial ports");
    Ok(ports.into_iter().map(PortInfo::from).collect())
}

/// Check that `name` is one of `ports`.
pub fn validate_port(name: &str, ports: &[PortInfo]) -> Result<()> {
    if ports.iter().any(|port| port.name == name) {
        return Ok(());
    }
    Err(TransportError::PortNotFound {
        port: name.to_string(),
        available: ports.iter().map(|port| port.name.clone()).collect(),
    })
}

/// Resolve the port to open.
///
/// A requested port must exist in `ports`. Without a request, the only USB
/// device is used.
pub fn select_port(requested: Option<&str>, ports: &[PortInfo]) -> Result<String> {
    if let Some(name) = requested {
        validate_port(name, ports)?;
        return Ok(name.to_string());
    }

    let usb: Vec<&PortInfo> = ports
        .iter()
        .filter(|port| port.kind == PortKind::Usb)
        .collect();

    match usb.as_slice() {
        [only] => {
            debug!(port = %only.name, "selected the only usb serial device");
            Ok(only.name.clone())
        }
        _ => Err(TransportError::NoPortSelected {
            candidates: ports.iter().map(|port| port.name.clone()).collect(),
        }),
    }
}
