use heaterlink_frame::Reassembler;
use heaterlink_transport::Chunk;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::router::{Routed, TelemetryRouter};
use crate::shutdown::{ShutdownHandle, ShutdownTrigger};

/// Inbound half of the session: raw chunks in, routed frames out.
pub struct Inbound {
    reassembler: Reassembler,
    router: TelemetryRouter,
}

impl Inbound {
    pub fn new(router: TelemetryRouter) -> Self {
        Self {
            reassembler: Reassembler::new(),
            router,
        }
    }

    /// Reassemble one chunk and route every frame it completes, in order.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<Routed> {
        self.reassembler
            .push(chunk)
            .iter()
            .map(|frame| self.router.route(frame))
            .collect()
    }

    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }

    /// Consume chunks until cancelled. A link fault triggers shutdown.
    pub async fn run(
        mut self,
        mut chunks: mpsc::Receiver<Chunk>,
        cancel: CancellationToken,
        shutdown: ShutdownHandle,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                chunk = chunks.recv() => match chunk {
                    Some(Ok(bytes)) => {
                        self.process(&bytes);
                    }
                    Some(Err(err)) => {
                        error!(%err, "serial link failed");
                        shutdown.trigger(ShutdownTrigger::TransportFault(err.to_string()));
                        break;
                    }
                    None => {
                        if !cancel.is_cancelled() {
                            error!("read pump stopped unexpectedly");
                            shutdown.trigger(ShutdownTrigger::TransportFault(
                                "read pump stopped".to_string(),
                            ));
                        }
                        break;
                    }
                },
            }
        }
        debug!(
            frames = self.reassembler.emitted(),
            discarded = self.reassembler.discarded(),
            "inbound stopped"
        );
    }
}
