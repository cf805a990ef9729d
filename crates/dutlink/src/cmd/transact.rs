use std::time::Instant;

use dutlink_at::Transaction;
use dutlink_dut::DutError;
use tracing::debug;

use crate::cmd::{open_device, Context, TransactArgs};
use crate::exit::{dut_error, CliResult, SUCCESS};
use crate::output::{print_transaction, TransactOutput};

pub fn run(args: TransactArgs, ctx: &Context) -> CliResult<i32> {
    let station = ctx.station_with(&args.link)?;
    let timeout = station.timeout();
    let mut device = open_device(&args.port, &station)?;

    let started = Instant::now();
    let mut attempts = 0;
    let mut last: Option<Transaction> = None;
    let result = station.retry_policy().run(|attempt| {
        attempts = attempt;
        let outcome = device
            .messenger_mut()
            .transact_outcome(&args.command, timeout)?;
        debug!(attempt, outcome = outcome_name(&outcome), "transaction finished");
        last = Some(outcome.clone());
        outcome.into_result().map_err(DutError::from)
    });

    if let Some(outcome) = &last {
        let out = TransactOutput {
            port: &args.port,
            command: &args.command,
            outcome: outcome_name(outcome),
            lines: outcome_lines(outcome),
            attempts,
            elapsed_ms: started.elapsed().as_millis(),
        };
        print_transaction(&out, ctx.format);
    }

    result
        .map(|_| SUCCESS)
        .map_err(|err| dut_error(&format!("{} failed", args.command), err))
}

fn outcome_name(outcome: &Transaction) -> &'static str {
    match outcome {
        Transaction::Complete(_) => "ok",
        Transaction::DeviceRejected(_) => "error",
        Transaction::NoResponse => "no-response",
        Transaction::Incomplete(_) => "incomplete",
        Transaction::MissingEcho(_) => "missing-echo",
    }
}

fn outcome_lines(outcome: &Transaction) -> &[String] {
    match outcome {
        Transaction::Complete(lines)
        | Transaction::DeviceRejected(lines)
        | Transaction::Incomplete(lines)
        | Transaction::MissingEcho(lines) => lines,
        Transaction::NoResponse => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_names_and_lines() {
        let rejected = Transaction::DeviceRejected(vec!["+CME: 3".into()]);
        assert_eq!(outcome_name(&rejected), "error");
        assert_eq!(outcome_lines(&rejected), ["+CME: 3".to_string()]);
        assert_eq!(outcome_name(&Transaction::NoResponse), "no-response");
        assert!(outcome_lines(&Transaction::NoResponse).is_empty());
    }
}
