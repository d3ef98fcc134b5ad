use crate::params::Mode;

/// Errors raised by the control session.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Serial link or control socket failure.
    #[error("transport error: {0}")]
    Transport(#[from] heaterlink_transport::TransportError),

    /// Frame encoding or write failure.
    #[error("frame error: {0}")]
    Frame(#[from] heaterlink_frame::FrameError),

    /// Parameters that must not reach the control loop.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Run storage failure.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Control-plane message could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Plain I/O outside the serial link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid control or heater parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("unrecognized test mode {0:?}")]
    UnknownMode(String),

    #[error("{} mode is not implemented", .0.as_str())]
    UnsupportedMode(Mode),

    #[error("frequency must be finite and > 0 Hz, got {0}")]
    InvalidFrequency(f64),

    #[error("amplitude must be finite and >= 0, got {0}")]
    InvalidAmplitude(f64),

    #[error("control tick must be greater than zero")]
    ZeroTick,

    #[error("{name} must be finite and > 0, got {value}")]
    InvalidHeaterConstant { name: &'static str, value: f64 },

    #[error("run id {0:?} must be 1-64 characters of [A-Za-z0-9_-]")]
    InvalidRunId(String),
}

/// Run storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O error on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    InvalidRunId(#[from] ConfigError),

    #[error("telemetry store unavailable")]
    Unavailable,
}

pub type Result<T> = std::result::Result<T, ControlError>;
