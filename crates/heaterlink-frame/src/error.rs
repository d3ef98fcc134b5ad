/// Errors that can occur while building or sending frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A 3-byte field was given a value that does not fit in 24 bits.
    #[error("{field} value {value} does not fit in 24 bits")]
    FieldOutOfRange { field: &'static str, value: u32 },

    /// A duty percentage outside `[0, 100]` (or not a number) reached the encoder.
    #[error("duty cycle for heater {heater} out of range: {percent}")]
    DutyOutOfRange { heater: u8, percent: f64 },

    /// An I/O error occurred while writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link accepted zero bytes mid-frame.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
