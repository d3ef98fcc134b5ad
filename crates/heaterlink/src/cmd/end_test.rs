use heaterlink_control::{send_notification, Notification};
use tracing::info;

use crate::cmd::EndTestArgs;
use crate::exit::{control_error, CliResult, SUCCESS};

pub fn run(args: EndTestArgs) -> CliResult<i32> {
    send_notification(&args.socket, Notification::TestEnded)
        .map_err(|err| control_error("notify failed", err))?;
    info!(socket = %args.socket.display(), "test end requested");
    Ok(SUCCESS)
}
