use dutlink_transport::list_ports;

use crate::cmd::{Context, PortsArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::print_ports;

pub fn run(_args: PortsArgs, ctx: &Context) -> CliResult<i32> {
    let mut ports = list_ports().map_err(|err| transport_error("port enumeration failed", err))?;
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    print_ports(&ports, ctx.format);
    Ok(SUCCESS)
}
