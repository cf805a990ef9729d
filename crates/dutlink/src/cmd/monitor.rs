use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dutlink_at::take_complete_lines;
use dutlink_dut::INDICATION_READ_LEN;
use tracing::info;

use crate::cmd::{open_device, parse_duration, Context, LinkArgs, MonitorArgs};
use crate::exit::{at_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::print_received_line;

pub fn run(args: MonitorArgs, ctx: &Context) -> CliResult<i32> {
    let idle = args.idle.as_deref().map(parse_duration).transpose()?;
    let link = LinkArgs {
        newline: args.newline.clone(),
        baud: args.baud,
        ..LinkArgs::default()
    };
    let station = ctx.station_with(&link)?;
    let mut device = open_device(&args.port, &station)?;
    let newline = device.messenger().newline().to_string();

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut raw = Vec::new();
    let mut printed = 0usize;
    let mut last_rx = Instant::now();

    while running.load(Ordering::SeqCst) {
        let chunk = device
            .messenger_mut()
            .read(INDICATION_READ_LEN, false)
            .map_err(|err| at_error("receive failed", err))?;

        if chunk.is_empty() {
            if let Some(idle) = idle {
                if last_rx.elapsed() >= idle {
                    flush_partial(&args.port, &mut raw, ctx);
                    return match args.count {
                        Some(count) if printed < count => Err(CliError::new(
                            TIMEOUT,
                            format!("idle for {idle:?} after {printed} of {count} line(s)"),
                        )),
                        _ => Ok(SUCCESS),
                    };
                }
            }
            continue;
        }

        last_rx = Instant::now();
        raw.extend_from_slice(&chunk);
        let Some(mut text) = take_complete_lines(&mut raw, &newline) else {
            continue;
        };
        while let Some(end) = text.find(&newline) {
            let line: String = text.drain(..end + newline.len()).collect();
            let line = line.trim_end_matches(newline.as_str());
            if line.trim().is_empty() {
                continue;
            }
            print_received_line(&args.port, line, ctx.format);
            printed = printed.saturating_add(1);

            if args.count.is_some_and(|count| printed >= count) {
                return Ok(SUCCESS);
            }
        }
    }

    info!(lines = printed, "monitor interrupted");
    flush_partial(&args.port, &mut raw, ctx);
    Ok(SUCCESS)
}

/// Print whatever arrived without a trailing newline.
fn flush_partial(port: &str, raw: &mut Vec<u8>, ctx: &Context) {
    let text = String::from_utf8_lossy(raw);
    if !text.trim().is_empty() {
        print_received_line(port, &text, ctx.format);
    }
    raw.clear();
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
