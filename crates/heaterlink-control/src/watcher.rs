use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ControlError, Result};
use crate::notify::Notification;
use crate::params::ControlParameters;
use crate::shutdown::{ShutdownHandle, ShutdownTrigger};
use crate::store::SettingsSource;

/// Single writer of the control parameters.
///
/// A notification only means "look again": the settings store is re-read and
/// the result compared with the parameters last applied. The waveform epoch
/// moves only when mode, frequency or amplitude actually changed.
pub struct ConfigWatcher<S> {
    source: S,
    params: watch::Sender<ControlParameters>,
}

impl<S: SettingsSource> ConfigWatcher<S> {
    pub fn new(source: S, params: watch::Sender<ControlParameters>) -> Self {
        Self { source, params }
    }

    /// Parameters currently applied.
    pub fn current(&self) -> ControlParameters {
        *self.params.borrow()
    }

    /// Pull the latest settings and apply them if they differ.
    ///
    /// Returns `Ok(true)` when new parameters were applied. Invalid settings
    /// are refused with [`ControlError::Config`] and nothing is applied.
    pub fn refresh(&mut self) -> Result<bool> {
        let Some(record) = self.source.latest()? else {
            debug!("no settings recorded yet");
            return Ok(false);
        };
        let waveform = record.to_waveform()?;

        let applied = self.params.send_if_modified(|current| {
            if current.waveform == waveform {
                return false;
            }
            *current = ControlParameters::new(waveform, Instant::now());
            true
        });

        if applied {
            info!(
                mode = waveform.mode.as_str(),
                frequency = waveform.frequency,
                amplitude = waveform.amplitude,
                "control parameters updated"
            );
        } else {
            debug!("settings unchanged");
        }
        Ok(applied)
    }

    pub async fn run(
        mut self,
        mut notifications: mpsc::Receiver<Notification>,
        cancel: CancellationToken,
        shutdown: ShutdownHandle,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                notification = notifications.recv() => match notification {
                    Some(Notification::SettingsChanged) => match self.refresh() {
                        Ok(_) => {}
                        Err(ControlError::Config(err)) => {
                            error!(%err, "refusing invalid settings");
                            shutdown.trigger(ShutdownTrigger::ConfigFault(err.to_string()));
                            break;
                        }
                        Err(err) => warn!(%err, "settings refresh failed"),
                    },
                    Some(Notification::TestEnded) => {
                        info!("test ended");
                        shutdown.trigger(ShutdownTrigger::TestEnded);
                    }
                    None => {
                        debug!("notification channel closed");
                        cancel.cancelled().await;
                        break;
                    }
                },
            }
        }
        debug!("config watcher stopped");
    }
}
