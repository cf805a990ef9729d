use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use dutlink_transport::PortInfo;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
pub struct TransactOutput<'a> {
    pub port: &'a str,
    pub command: &'a str,
    pub outcome: &'static str,
    pub lines: &'a [String],
    pub attempts: u32,
    pub elapsed_ms: u128,
}

#[derive(Serialize)]
struct LineOutput<'a> {
    port: &'a str,
    line: &'a str,
    timestamp: String,
}

#[derive(Serialize)]
struct PortOutput<'a> {
    name: &'a str,
    kind: &'a str,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_transaction(out: &TransactOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "RESPONSE"]);
            for (index, line) in out.lines.iter().enumerate() {
                table.add_row(vec![(index + 1).to_string(), line.clone()]);
            }
            println!("{table}");
            println!(
                "{} -> {} ({} line(s), {} ms)",
                out.command,
                out.outcome,
                out.lines.len(),
                out.elapsed_ms
            );
        }
        OutputFormat::Pretty => {
            println!("{} on {}: {}", out.command, out.port, out.outcome);
            for line in out.lines {
                println!("  {line}");
            }
        }
        OutputFormat::Raw => {
            for line in out.lines {
                println!("{line}");
            }
        }
    }
}

/// Print a flat record: `fields` for humans, `json` for machines.
pub fn print_fields<T: Serialize>(
    title: &str,
    fields: &[(&str, String)],
    json: &T,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => print_json(json),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (name, value) in fields {
                table.add_row(vec![name.to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{title}:");
            let width = fields.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
            for (name, value) in fields {
                println!("  {name:<width$}  {value}");
            }
        }
        OutputFormat::Raw => {
            for (_, value) in fields {
                println!("{value}");
            }
        }
    }
}

pub fn print_received_line(port: &str, line: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&LineOutput {
            port,
            line,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("[{}] {port} < {line}", now_unix_seconds());
        }
        OutputFormat::Raw => {
            print_raw(line.as_bytes());
            print_raw(b"\n");
        }
    }
}

pub fn print_ports(ports: &[PortInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out: Vec<PortOutput<'_>> = ports
                .iter()
                .map(|p| PortOutput {
                    name: &p.name,
                    kind: &p.kind,
                })
                .collect();
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PORT", "KIND"]);
            for port in ports {
                table.add_row(vec![port.name.clone(), port.kind.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if ports.is_empty() {
                println!("No serial ports found.");
            }
            for port in ports {
                println!("{}  ({})", port.name, port.kind);
            }
        }
        OutputFormat::Raw => {
            for port in ports {
                println!("{}", port.name);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
