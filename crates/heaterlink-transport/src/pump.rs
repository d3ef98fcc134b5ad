//! Inbound read pump.
//!
//! Serial reads block, so the read half lives on a blocking-pool thread and
//! forwards every chunk it reads to an async channel. The pump exits when
//! cancelled, when the receiver is dropped, or on the first link fault; a
//! fault is forwarded as the last item before the channel closes.

use std::io::{ErrorKind, Read};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TransportError;

/// Default number of bytes requested per read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 256;

const CHANNEL_DEPTH: usize = 64;

/// One inbound read: raw bytes, or the fault that ended the link.
pub type Chunk = Result<Bytes, TransportError>;

/// Start pumping `reader` into a channel.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_read_pump<R>(
    reader: R,
    chunk_size: usize,
    cancel: CancellationToken,
) -> (mpsc::Receiver<Chunk>, JoinHandle<()>)
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    let handle = tokio::task::spawn_blocking(move || pump(reader, chunk_size.max(1), tx, cancel));
    (rx, handle)
}

fn pump<R: Read>(
    mut reader: R,
    chunk_size: usize,
    tx: mpsc::Sender<Chunk>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; chunk_size];

    while !cancel.is_cancelled() {
        match reader.read(&mut buf) {
            Ok(0) => {
                debug!("read pump reached end of stream");
                if tx.blocking_send(Err(TransportError::Closed)).is_err() {
                    debug!("read pump receiver dropped before end of stream was reported");
                }
                return;
            }
            Ok(n) => {
                if tx
                    .blocking_send(Ok(Bytes::copy_from_slice(&buf[..n])))
                    .is_err()
                {
                    debug!("read pump receiver dropped");
                    return;
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(err) => {
                warn!(error = %err, "read pump stopped on link error");
                if tx.blocking_send(Err(TransportError::Io(err))).is_err() {
                    debug!("read pump receiver dropped before link error was reported");
                }
                return;
            }
        }
    }

    debug!("read pump cancelled");
}
