use std::io::Write;
use std::time::Duration;

use heaterlink_frame::{DutyCommand, FrameWriter};
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{ControlError, Result};
use crate::params::{ControlParameters, DutyCycles, HeaterConstants};
use crate::shutdown::{ShutdownHandle, ShutdownTrigger};

/// Wait between the zero-duty frame and releasing the link.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Default control tick.
pub const DEFAULT_TICK: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Running,
    /// Terminal.
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerReport {
    /// Frames written, the zero frame included.
    pub frames_sent: u64,
    /// Whether the final zero-duty frame went out.
    pub zero_sent: bool,
    pub final_state: ControllerState,
}

/// Periodic duty-cycle task and sole writer to the serial link.
///
/// Every tick reads one parameter snapshot, computes both duty cycles and
/// sends a combined command. On cancellation it always attempts a zero-duty
/// frame, waits [`SHUTDOWN_GRACE`], and only then closes the link.
pub struct DutyCycleController<W: Write> {
    writer: FrameWriter<W>,
    params: watch::Receiver<ControlParameters>,
    heaters: HeaterConstants,
    tick: Duration,
    duty: watch::Sender<DutyCycles>,
    state: ControllerState,
}

impl<W: Write> DutyCycleController<W> {
    pub fn new(
        link: W,
        params: watch::Receiver<ControlParameters>,
        heaters: HeaterConstants,
        tick: Duration,
        duty: watch::Sender<DutyCycles>,
    ) -> Self {
        Self {
            writer: FrameWriter::new(link),
            params,
            heaters,
            tick,
            duty,
            state: ControllerState::Running,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Compute and send one setpoint for `now`.
    pub fn tick_at(&mut self, now: Instant) -> Result<DutyCycles> {
        let params = *self.params.borrow();
        let duty = self.heaters.duty_cycles(&params, now)?;
        self.duty.send_replace(duty);
        self.writer.send(&duty.to_command())?;
        trace!(heater0 = duty.heater0, heater1 = duty.heater1, "duty cycle sent");
        Ok(duty)
    }

    /// Run until `cancel` fires, then shut down.
    ///
    /// A failed tick is reported through `shutdown` and no further ticks are
    /// sent; the zero-duty sequence still runs once cancellation arrives.
    pub async fn run(mut self, cancel: CancellationToken, shutdown: ShutdownHandle) -> ControllerReport {
        let mut ticker = time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tick_ms = self.tick.as_millis() as u64, "duty-cycle controller running");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.tick_at(Instant::now()) {
                        error!(%err, "duty-cycle tick failed");
                        shutdown.trigger(fault(&err));
                        cancel.cancelled().await;
                        break;
                    }
                }
            }
        }

        self.shut_down().await
    }

    async fn shut_down(mut self) -> ControllerReport {
        self.state = ControllerState::ShuttingDown;
        self.duty.send_replace(DutyCycles::ZERO);

        let zero_sent = match self.writer.send(&DutyCommand::ZERO) {
            Ok(()) => {
                info!("zero duty cycle sent");
                true
            }
            Err(err) => {
                error!(%err, "failed to send zero duty cycle");
                false
            }
        };

        time::sleep(SHUTDOWN_GRACE).await;

        let frames_sent = self.writer.frames_sent();
        if let Err(err) = self.writer.close() {
            warn!(%err, "closing serial link failed");
        }
        debug!(frames_sent, "serial link released");

        ControllerReport {
            frames_sent,
            zero_sent,
            final_state: self.state,
        }
    }
}

fn fault(err: &ControlError) -> ShutdownTrigger {
    match err {
        ControlError::Config(err) => ShutdownTrigger::ConfigFault(err.to_string()),
        other => ShutdownTrigger::TransportFault(other.to_string()),
    }
}
