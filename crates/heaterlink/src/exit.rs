use std::fmt;
use std::io;

use heaterlink_control::{ConfigError, ControlError, ShutdownTrigger, StoreError};
use heaterlink_frame::FrameError;
use heaterlink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const CONFIG_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
            io_error(context, source)
        }
        TransportError::Open { ref source, .. }
            if matches!(
                source.kind(),
                serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied)
            ) =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::PortNotFound { .. }
        | TransportError::NoPortSelected { .. }
        | TransportError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(_) | FrameError::ConnectionClosed => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn config_error(context: &str, err: ConfigError) -> CliError {
    CliError::new(CONFIG_INVALID, format!("{context}: {err}"))
}

pub fn store_error(context: &str, err: StoreError) -> CliError {
    match err {
        StoreError::Io { source, path } => {
            io_error(&format!("{context} ({})", path.display()), source)
        }
        StoreError::InvalidRunId(err) => config_error(context, err),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

pub fn control_error(context: &str, err: ControlError) -> CliError {
    match err {
        ControlError::Transport(err) => transport_error(context, err),
        ControlError::Frame(err) => frame_error(context, err),
        ControlError::Config(err) => config_error(context, err),
        ControlError::Store(err) => store_error(context, err),
        ControlError::Io(err) => io_error(context, err),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

/// Exit code for a session that has completed its shutdown sequence.
pub fn shutdown_code(trigger: &ShutdownTrigger) -> i32 {
    match trigger {
        ShutdownTrigger::Signal(_) | ShutdownTrigger::TestEnded => SUCCESS,
        ShutdownTrigger::TransportFault(_) => TRANSPORT_ERROR,
        ShutdownTrigger::ConfigFault(_) => CONFIG_INVALID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_codes() {
        assert_eq!(shutdown_code(&ShutdownTrigger::Signal("SIGINT")), SUCCESS);
        assert_eq!(shutdown_code(&ShutdownTrigger::TestEnded), SUCCESS);
        assert_eq!(
            shutdown_code(&ShutdownTrigger::TransportFault("eof".into())),
            TRANSPORT_ERROR
        );
        assert_eq!(
            shutdown_code(&ShutdownTrigger::ConfigFault("mode".into())),
            CONFIG_INVALID
        );
    }

    #[test]
    fn port_selection_errors_are_usage() {
        let err = transport_error(
            "select port",
            TransportError::PortNotFound {
                port: "/dev/ttyUSB9".into(),
                available: vec![],
            },
        );
        assert_eq!(err.code, USAGE);
        assert!(err.message.contains("/dev/ttyUSB9"));
    }

    #[test]
    fn invalid_run_id_is_config_invalid() {
        let err = store_error(
            "open run store",
            StoreError::InvalidRunId(ConfigError::InvalidRunId("../x".into())),
        );
        assert_eq!(err.code, CONFIG_INVALID);
    }

    #[test]
    fn permission_denied_maps() {
        let err = io_error("open", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.code, PERMISSION_DENIED);
    }
}
