use heaterlink_frame::Reassembler;
use heaterlink_transport::{spawn_read_pump, SerialLink, DEFAULT_READ_CHUNK_SIZE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cmd::{open_link, MonitorArgs};
use crate::exit::{io_error, transport_error, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let link = open_link(args.port.as_deref(), args.baud)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime start failed", err))?;
    runtime.block_on(monitor(link, args.count, format))
}

async fn monitor(link: SerialLink, count: Option<usize>, format: OutputFormat) -> CliResult<i32> {
    info!(port = link.name(), "monitoring");
    let cancel = CancellationToken::new();
    let (mut chunks, pump) = spawn_read_pump(link, DEFAULT_READ_CHUNK_SIZE, cancel.clone());
    let mut reassembler = Reassembler::new();
    let mut printed = 0usize;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = loop {
        let chunk = tokio::select! {
            _ = &mut ctrl_c => break Ok(SUCCESS),
            chunk = chunks.recv() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                for frame in reassembler.push(&bytes) {
                    if count.is_some_and(|limit| printed >= limit) {
                        break;
                    }
                    print_frame(&frame, format);
                    printed += 1;
                }
                if count.is_some_and(|limit| printed >= limit) {
                    break Ok(SUCCESS);
                }
            }
            Some(Err(err)) => break Err(transport_error("serial read failed", err)),
            None => break Ok(TRANSPORT_ERROR),
        }
    };

    cancel.cancel();
    let _ = pump.await;
    debug!(
        printed,
        discarded = reassembler.discarded(),
        "monitor stopped"
    );
    result
}
