use std::io::Write;

use clap::ValueEnum;
use prettytable::{row, Table};
use serde::Serialize;

use crate::core::scheduler::interface::WeighedHost;

#[derive(Debug, Default, Clone, Copy, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Serialize)]
struct PlacementJSON<'a> {
    request_id: &'a str,
    placements: Vec<PlacementEntry<'a>>,
}

#[derive(Serialize)]
struct PlacementEntry<'a> {
    host: &'a str,
    nodename: &'a str,
    instance_uuid: Option<&'a str>,
    weight: f64,
}

pub fn print_placements<W: Write>(
    out: &mut W,
    request_id: &str,
    placements: &[WeighedHost],
    format: OutputFormat,
) -> std::io::Result<()> {
    match format {
        OutputFormat::Table => print_placements_as_pretty_table(out, placements),
        OutputFormat::Json => print_placements_as_json(out, request_id, placements),
    }
}

pub fn print_placements_as_pretty_table<W: Write>(
    out: &mut W,
    placements: &[WeighedHost],
) -> std::io::Result<()> {
    let mut table = Table::new();
    table.add_row(row!["Instance", "Host", "Node", "Weight"]);
    for placement in placements {
        table.add_row(row![
            placement.instance_uuid.as_deref().unwrap_or("-"),
            placement.host.host,
            placement.host.nodename,
            placement.weight
        ]);
    }
    table.print(out)?;
    Ok(())
}

pub fn print_placements_as_json<W: Write>(
    out: &mut W,
    request_id: &str,
    placements: &[WeighedHost],
) -> std::io::Result<()> {
    let json = PlacementJSON {
        request_id,
        placements: placements
            .iter()
            .map(|placement| PlacementEntry {
                host: &placement.host.host,
                nodename: &placement.host.nodename,
                instance_uuid: placement.instance_uuid.as_deref(),
                weight: placement.weight,
            })
            .collect(),
    };
    serde_json::to_writer_pretty(&mut *out, &json)?;
    writeln!(out)
}
