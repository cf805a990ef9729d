mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::{Command, Context};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "dutlink", version, about = "AT-command links to devices under test")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Station configuration file (JSON).
    #[arg(long, value_name = "FILE", env = "DUTLINK_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() {
                exit::USAGE
            } else {
                exit::SUCCESS
            };
            std::process::exit(code);
        }
    };
    init_logging(cli.log_format, cli.log_level);

    let ctx = Context {
        format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
        config: cli.config,
    };
    let result = cmd::run(cli.command, &ctx);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::{ChargerAction, DtsAction};

    #[test]
    fn parses_transact_subcommand() {
        let cli = Cli::try_parse_from([
            "dutlink",
            "transact",
            "/dev/ttyUSB0",
            "AT+BATTERY?",
            "--timeout",
            "500ms",
            "--echo",
        ])
        .expect("transact args should parse");

        let Command::Transact(args) = cli.command else {
            panic!("expected transact");
        };
        assert_eq!(args.command, "AT+BATTERY?");
        assert_eq!(args.link.timeout.as_deref(), Some("500ms"));
        assert!(args.link.echo);
    }

    #[test]
    fn transact_requires_command() {
        let err = Cli::try_parse_from(["dutlink", "transact", "/dev/ttyUSB0"])
            .expect_err("missing command should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_charger_led() {
        let cli = Cli::try_parse_from(["dutlink", "charger", "COM7", "led", "magenta"])
            .expect("charger args should parse");
        let Command::Charger(args) = cli.command else {
            panic!("expected charger");
        };
        assert!(matches!(
            args.action,
            ChargerAction::Led {
                mode: dutlink_dut::LedMode::Magenta
            }
        ));
    }

    #[test]
    fn rejects_unknown_led_mode() {
        let err = Cli::try_parse_from(["dutlink", "charger", "COM7", "led", "purple"])
            .expect_err("unknown mode should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_dts_with_global_format() {
        let cli = Cli::try_parse_from([
            "dutlink", "dts", "/dev/rfcomm0", "--retries", "2", "rssi", "--format", "json",
        ])
        .expect("dts args should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        let Command::Dts(args) = cli.command else {
            panic!("expected dts");
        };
        assert_eq!(args.link.retries, Some(2));
        assert!(matches!(args.action, DtsAction::Rssi));
    }

    #[test]
    fn parses_charger_gpio() {
        let cli = Cli::try_parse_from(["dutlink", "charger", "COM7", "gpio", "b12"])
            .expect("gpio args should parse");
        let Command::Charger(args) = cli.command else {
            panic!("expected charger");
        };
        let ChargerAction::Gpio { pin } = args.action else {
            panic!("expected gpio");
        };
        assert_eq!(pin.to_string(), "B12");

        let err = Cli::try_parse_from(["dutlink", "charger", "COM7", "gpio", "D1"])
            .expect_err("port D should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_dts_auth_key() {
        let cli = Cli::try_parse_from([
            "dutlink",
            "dts",
            "/dev/rfcomm0",
            "--auth-key",
            "0x2b,0x7e,0x15,0x16,0x28,0xae,0xd2,0xa6,0xab,0xf7,0x15,0x88,0x09,0xcf,0x4f,0x3c",
            "auth",
        ])
        .expect("dts auth args should parse");
        let Command::Dts(args) = cli.command else {
            panic!("expected dts");
        };
        assert!(args.auth_key.is_some());
        assert!(matches!(args.action, DtsAction::Auth));
    }
}
