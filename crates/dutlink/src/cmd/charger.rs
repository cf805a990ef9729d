use dutlink_dut::ChargerDevice;
use serde::Serialize;
use serde_json::json;

use crate::cmd::{open_device, ChargerAction, ChargerArgs, Context};
use crate::exit::{dut_error, CliResult, SUCCESS};
use crate::output::print_fields;

#[derive(Serialize)]
struct ChargerOutput<'a, T: Serialize> {
    port: &'a str,
    query: &'static str,
    #[serde(flatten)]
    value: T,
}

pub fn run(args: ChargerArgs, ctx: &Context) -> CliResult<i32> {
    let station = ctx.station_with(&args.link)?;
    let policy = station.retry_policy();
    let mut charger = ChargerDevice::new(open_device(&args.port, &station)?);
    charger
        .device_mut()
        .purge()
        .map_err(|err| dut_error("purge failed", err))?;

    let port = args.port.as_str();
    match args.action {
        ChargerAction::Battery => {
            let mv = policy
                .run(|_| charger.battery_mv())
                .map_err(|err| dut_error("battery read failed", err))?;
            print_fields(
                "Charger battery",
                &[("battery_mv", mv.to_string())],
                &output(port, "battery", json!({ "battery_mv": mv })),
                ctx.format,
            );
        }
        ChargerAction::ConfigGet { name } => {
            let value = policy
                .run(|_| charger.config_read(&name))
                .map_err(|err| dut_error("config read failed", err))?;
            print_fields(
                "Charger config",
                &[("name", name.clone()), ("value", value.clone())],
                &output(port, "config-get", json!({ "name": name, "value": value })),
                ctx.format,
            );
        }
        ChargerAction::ConfigSet { name, value } => {
            policy
                .run(|_| charger.config_write(&name, &value))
                .map_err(|err| dut_error("config write failed", err))?;
            print_fields(
                "Charger config written",
                &[("name", name.clone()), ("value", value.clone())],
                &output(port, "config-set", json!({ "name": name, "value": value })),
                ctx.format,
            );
        }
        ChargerAction::Led { mode } => {
            policy
                .run(|_| charger.led_set(mode))
                .map_err(|err| dut_error("LED set failed", err))?;
            print_fields(
                "Charger LED",
                &[("led", mode.to_string())],
                &output(port, "led", json!({ "led": mode })),
                ctx.format,
            );
        }
        ChargerAction::Earbuds => {
            let status = policy
                .run(|_| charger.earbud_status())
                .map_err(|err| dut_error("earbud status failed", err))?;
            print_fields(
                "Earbud status",
                &[("left", status.left.clone()), ("right", status.right.clone())],
                &output(port, "earbuds", &status),
                ctx.format,
            );
        }
        ChargerAction::Id => {
            let id = policy
                .run(|_| charger.identify())
                .map_err(|err| dut_error("identify failed", err))?;
            print_fields(
                "Charger identity",
                &[
                    ("variant", id.variant.clone()),
                    ("board_number", id.board_number.to_string()),
                    ("firmware_id", id.firmware_id.to_string()),
                    ("firmware_name", id.firmware_name.clone()),
                    ("fast_comms", id.supports_fast_comms().to_string()),
                ],
                &output(port, "id", &id),
                ctx.format,
            );
        }
        ChargerAction::Gpio { pin } => {
            let status = policy
                .run(|_| charger.gpio(pin))
                .map_err(|err| dut_error("GPIO read failed", err))?;
            print_fields(
                "Charger GPIO",
                &[
                    ("pin", pin.to_string()),
                    ("function", status.function.to_string()),
                    ("state", status.state.to_string()),
                ],
                &output(
                    port,
                    "gpio",
                    json!({
                        "pin": pin.to_string(),
                        "function": status.function,
                        "state": status.state,
                    }),
                ),
                ctx.format,
            );
        }
    }

    Ok(SUCCESS)
}

fn output<T: Serialize>(port: &str, query: &'static str, value: T) -> ChargerOutput<'_, T> {
    ChargerOutput { port, query, value }
}
