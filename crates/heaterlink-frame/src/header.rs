//! Header bytes and fixed frame geometry.
//!
//! Commands flow host → board (`0x0_`), telemetry board → host (`0x1_`),
//! device-reported errors board → host (`0x2_`).

/// Every frame is exactly this long.
pub const FRAME_LEN: usize = 8;

/// Last byte of every frame.
pub const TERMINATOR: u8 = 0xFF;

/// Recognized frame headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Header {
    /// Duty cycle for heater 0.
    DutyHeater0 = 0x01,
    /// Duty cycle for heater 1.
    DutyHeater1 = 0x02,
    /// Duty cycles for both heaters in one frame.
    DutyBoth = 0x03,
    /// INA260 voltage/current reading for heater 0.
    TelemetryHeater0 = 0x11,
    /// INA260 voltage/current reading for heater 1.
    TelemetryHeater1 = 0x12,
    /// The board could not find a heater on a channel.
    HeaterNotFound = 0x21,
}

/// Broad class of a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    Command,
    Telemetry,
    DeviceError,
}

impl Header {
    pub const ALL: [Header; 6] = [
        Header::DutyHeater0,
        Header::DutyHeater1,
        Header::DutyBoth,
        Header::TelemetryHeater0,
        Header::TelemetryHeater1,
        Header::HeaterNotFound,
    ];

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Header::DutyHeater0),
            0x02 => Some(Header::DutyHeater1),
            0x03 => Some(Header::DutyBoth),
            0x11 => Some(Header::TelemetryHeater0),
            0x12 => Some(Header::TelemetryHeater1),
            0x21 => Some(Header::HeaterNotFound),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn kind(self) -> HeaderKind {
        match self {
            Header::DutyHeater0 | Header::DutyHeater1 | Header::DutyBoth => HeaderKind::Command,
            Header::TelemetryHeater0 | Header::TelemetryHeater1 => HeaderKind::Telemetry,
            Header::HeaterNotFound => HeaderKind::DeviceError,
        }
    }

    /// Heater channel a single-channel header refers to.
    pub fn channel(self) -> Option<u8> {
        match self {
            Header::DutyHeater0 | Header::TelemetryHeater0 => Some(0),
            Header::DutyHeater1 | Header::TelemetryHeater1 => Some(1),
            Header::DutyBoth | Header::HeaterNotFound => None,
        }
    }

    /// Human-readable name for logs and output.
    pub fn name(self) -> &'static str {
        match self {
            Header::DutyHeater0 => "DUTY_HEATER0",
            Header::DutyHeater1 => "DUTY_HEATER1",
            Header::DutyBoth => "DUTY_BOTH",
            Header::TelemetryHeater0 => "TELEMETRY_HEATER0",
            Header::TelemetryHeater1 => "TELEMETRY_HEATER1",
            Header::HeaterNotFound => "HEATER_NOT_FOUND",
        }
    }
}

/// Returns true if `byte` starts a recognized frame.
pub fn is_header(byte: u8) -> bool {
    Header::from_byte(byte).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_mapping_roundtrips() {
        for header in Header::ALL {
            assert_eq!(Header::from_byte(header.as_byte()), Some(header));
        }
    }

    #[test]
    fn unknown_bytes_are_not_headers() {
        let known: Vec<u8> = Header::ALL.iter().map(|h| h.as_byte()).collect();
        for byte in 0..=u8::MAX {
            assert_eq!(is_header(byte), known.contains(&byte), "byte {byte:#04x}");
        }
    }

    #[test]
    fn kinds_and_channels() {
        assert_eq!(Header::DutyBoth.kind(), HeaderKind::Command);
        assert_eq!(Header::TelemetryHeater1.kind(), HeaderKind::Telemetry);
        assert_eq!(Header::HeaterNotFound.kind(), HeaderKind::DeviceError);
        assert_eq!(Header::TelemetryHeater0.channel(), Some(0));
        assert_eq!(Header::DutyHeater1.channel(), Some(1));
        assert_eq!(Header::DutyBoth.channel(), None);
    }
}
