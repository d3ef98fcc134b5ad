use heaterlink_transport::{available_ports, PortKind};

use crate::cmd::PortsArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_ports, OutputFormat};

pub fn run(args: PortsArgs, format: OutputFormat) -> CliResult<i32> {
    let mut ports =
        available_ports().map_err(|err| transport_error("port enumeration failed", err))?;
    if args.usb {
        ports.retain(|port| port.kind == PortKind::Usb);
    }
    print_ports(&ports, format);
    Ok(SUCCESS)
}
