use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::StoreError;
use crate::router::TelemetrySample;
use crate::session::SessionStats;
use crate::store::TelemetryStore;

/// Drains telemetry samples into a store, one at a time.
///
/// Durability is best effort: a failed write is logged and the sample
/// dropped, and samples still queued at cancellation are discarded. Store
/// calls run on the blocking pool so a slow disk never stalls the runtime.
pub struct PersistenceSink<S> {
    store: Option<S>,
    stats: Arc<SessionStats>,
}

impl<S: TelemetryStore + 'static> PersistenceSink<S> {
    pub fn new(store: S, stats: Arc<SessionStats>) -> Self {
        Self {
            store: Some(store),
            stats,
        }
    }

    pub async fn run(mut self, mut samples: mpsc::Receiver<TelemetrySample>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sample = samples.recv() => match sample {
                    Some(sample) => self.persist(sample).await,
                    None => break,
                },
            }
        }

        let pending = samples.len();
        if pending > 0 {
            warn!(pending, "discarding queued telemetry at shutdown");
        }
        if let Err(err) = self.with_store(|store| store.flush()).await {
            warn!(%err, "final telemetry flush failed");
        }
        debug!("persistence sink stopped");
    }

    async fn persist(&mut self, sample: TelemetrySample) {
        let channel = sample.channel;
        match self.with_store(move |store| store.append(&sample)).await {
            Ok(()) => self.stats.record_persisted(),
            Err(err) => {
                self.stats.record_store_failure();
                warn!(%err, channel, "telemetry write failed; sample dropped");
            }
        }
    }

    /// Run `op` against the store on the blocking pool.
    ///
    /// A panicking store is not handed back; every later call fails.
    async fn with_store<F>(&mut self, op: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut S) -> Result<(), StoreError> + Send + 'static,
    {
        let Some(mut store) = self.store.take() else {
            return Err(StoreError::Unavailable);
        };
        match tokio::task::spawn_blocking(move || {
            let result = op(&mut store);
            (store, result)
        })
        .await
        {
            Ok((store, result)) => {
                self.store = Some(store);
                result
            }
            Err(err) => {
                error!(%err, "telemetry store task failed; persistence disabled");
                Err(StoreError::Unavailable)
            }
        }
    }
}
