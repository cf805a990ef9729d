use dutlink_dut::{AuthKey, DtsDevice, StationConfig};
use serde::Serialize;

use crate::cmd::{open_device, Context, DtsAction, DtsArgs};
use crate::exit::{dut_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::print_fields;

#[derive(Serialize)]
struct DtsOutput<'a> {
    port: &'a str,
    query: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature_c: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    battery_mv: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rssi_dbm: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authenticated: Option<bool>,
}

impl<'a> DtsOutput<'a> {
    fn new(port: &'a str, query: &'static str) -> Self {
        Self {
            port,
            query,
            temperature_c: None,
            battery_mv: None,
            rssi_dbm: None,
            address: None,
            authenticated: None,
        }
    }
}

pub fn run(args: DtsArgs, ctx: &Context) -> CliResult<i32> {
    let mut station = ctx.station_with(&args.link)?;
    let key = auth_key(&mut station, args.auth_key)?;
    if matches!(args.action, DtsAction::Auth) && key.is_none() {
        return Err(CliError::new(
            USAGE,
            "no DTS authentication key: pass --auth-key or set dts_auth_key",
        ));
    }
    let policy = station.retry_policy();
    let mut dts = DtsDevice::new(open_device(&args.port, &station)?);
    if let Some(key) = &key {
        dts.authenticate(key)
            .map_err(|err| dut_error("DTS authentication failed", err))?;
    }

    match args.action {
        DtsAction::Temperature => {
            let temp = policy
                .run(|_| dts.temperature_c())
                .map_err(|err| dut_error("temperature read failed", err))?;
            let out = DtsOutput {
                temperature_c: Some(temp),
                ..DtsOutput::new(&args.port, "temperature")
            };
            let fields = [("temperature_c", temp.to_string())];
            print_fields("DTS temperature", &fields, &out, ctx.format);
        }
        DtsAction::Battery => {
            let mv = policy
                .run(|_| dts.battery_mv())
                .map_err(|err| dut_error("battery read failed", err))?;
            let out = DtsOutput {
                battery_mv: Some(mv),
                ..DtsOutput::new(&args.port, "battery")
            };
            let fields = [("battery_mv", mv.to_string())];
            print_fields("DTS battery", &fields, &out, ctx.format);
        }
        DtsAction::Rssi => {
            let report = policy
                .run(|_| dts.rssi())
                .map_err(|err| dut_error("RSSI read failed", err))?;
            let fields = [
                ("address", report.address.clone()),
                ("rssi_dbm", report.rssi_dbm.to_string()),
            ];
            let out = DtsOutput {
                rssi_dbm: Some(report.rssi_dbm),
                address: Some(report.address),
                ..DtsOutput::new(&args.port, "rssi")
            };
            print_fields("DTS RSSI", &fields, &out, ctx.format);
        }
        DtsAction::Auth => {
            let out = DtsOutput {
                authenticated: Some(true),
                ..DtsOutput::new(&args.port, "auth")
            };
            print_fields(
                "DTS authentication",
                &[("authenticated", "true".to_string())],
                &out,
                ctx.format,
            );
        }
    }

    Ok(SUCCESS)
}

/// The command-line key wins over the station file's.
fn auth_key(station: &mut StationConfig, arg: Option<String>) -> CliResult<Option<AuthKey>> {
    if arg.is_some() {
        station.dts_auth_key = arg;
    }
    station
        .auth_key()
        .map_err(|err| dut_error("invalid DTS authentication key", err))
}
