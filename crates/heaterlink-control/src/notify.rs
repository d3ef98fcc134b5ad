//! Control-plane notifications.
//!
//! Clients write newline-delimited JSON messages to the session's control
//! socket. A message only says that something happened; settings themselves
//! are always re-read from the run store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message type: new settings were written to the run store.
pub const SETTINGS_CHANGED: &str = "settings_changed";
/// Message type: the operator ended the test.
pub const TEST_ENDED: &str = "test_ended";

/// Edge-triggered events delivered to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    SettingsChanged,
    TestEnded,
}

impl Notification {
    pub fn as_str(self) -> &'static str {
        match self {
            Notification::SettingsChanged => SETTINGS_CHANGED,
            Notification::TestEnded => TEST_ENDED,
        }
    }

    pub fn from_type(msg_type: &str) -> Option<Self> {
        match msg_type {
            SETTINGS_CHANGED => Some(Notification::SettingsChanged),
            TEST_ENDED => Some(Notification::TestEnded),
            _ => None,
        }
    }
}

/// Wire form of a control-plane message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ControlMessage {
    pub fn new(notification: Notification) -> Self {
        Self {
            msg_type: notification.as_str().to_string(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn settings_changed() -> Self {
        Self::new(Notification::SettingsChanged)
    }

    pub fn test_ended() -> Self {
        Self::new(Notification::TestEnded)
    }

    pub fn notification(&self) -> Option<Notification> {
        Notification::from_type(&self.msg_type)
    }

    /// Encode as one JSON line, newline included.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }
}

#[cfg(unix)]
pub use self::unix::{send_notification, serve};

#[cfg(unix)]
mod unix {
    use std::io::Write;
    use std::path::Path;

    use heaterlink_transport::ControlSocket;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::UnixStream;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use tracing::{debug, info, warn};

    use super::{ControlMessage, Notification};
    use crate::error::Result;

    /// Accept control-plane clients until cancelled, forwarding their
    /// notifications in arrival order per connection.
    pub async fn serve(
        socket: ControlSocket,
        notifications: mpsc::Sender<Notification>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                accepted = socket.accept() => match accepted {
                    Ok(stream) => {
                        tokio::spawn(read_messages(stream, notifications.clone(), cancel.clone()));
                    }
                    Err(err) => warn!(%err, "control socket accept failed"),
                },
            }
        }
        debug!(path = ?socket.path(), "control socket closed");
    }

    async fn read_messages(
        stream: UnixStream,
        notifications: mpsc::Sender<Notification>,
        cancel: CancellationToken,
    ) {
        let mut lines = BufReader::new(stream).lines();
        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => return,
                Err(err) => {
                    warn!(%err, "control connection read failed");
                    return;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let message = match ControlMessage::parse(&line) {
                Ok(message) => message,
                Err(err) => {
                    warn!(%err, "malformed control message ignored");
                    continue;
                }
            };
            match message.notification() {
                Some(notification) => {
                    info!(kind = notification.as_str(), "control notification");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        sent = notifications.send(notification) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
                None => warn!(kind = %message.msg_type, "unknown control message ignored"),
            }
        }
    }

    /// Send one notification to a listening session (blocking).
    pub fn send_notification(path: impl AsRef<Path>, notification: Notification) -> Result<()> {
        let mut stream = ControlSocket::connect(path)?;
        let line = ControlMessage::new(notification).to_line()?;
        stream.write_all(line.as_bytes())?;
        stream.flush()?;
        Ok(())
    }
}
