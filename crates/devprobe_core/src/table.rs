//! Flat-file device table matching
//!
//! The table maps `(vendor, device[, subvendor, subdevice])` to a description
//! and a module name, one tab separated row per line:
//!
//! ```text
//! 0x10ec\t0x8139\tRealtek|RTL-8139\t8139too
//! 0x1002\t0x4158\t0x1002\t0x0908\tATI|210888CX [Mach32]\tunknown
//! ```
//!
//! Matching is O(rows x devices); both are small enough that no indexing is
//! warranted.

use crate::BusKind;
use crate::DeviceEntry;
use crate::USB_HUB_CLASS;
use crate::modalias;
use std::path::Path;
use winnow::ModalResult;
use winnow::Parser;
use winnow::ascii::hex_digit1;
use winnow::combinator::opt;
use winnow::combinator::preceded;
use winnow::token::rest;
use winnow::combinator::trace;
use winnow::token::take_till;

/// How the matcher treats a row's description text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionSource {
    /// Apply descriptions from the table
    Table,
    /// Keep the descriptions assembled during enumeration
    Probe,
}

/// Sentinel module name meaning "no specific module"
const UNKNOWN_MODULE: &str = "unknown";

#[derive(Debug, PartialEq, Eq)]
struct TableRow<'input> {
    vendor: u16,
    device: u16,
    subids: Option<(u16, u16)>,
    description: &'input str,
    module: Option<&'input str>,
}

/// Decorate `devices` from the table at `table_path`, then resolve anything
/// still without a module through the module alias index.
///
/// An unreadable table degrades to an empty one; this never fails.
pub fn find_modules(
    devices: &mut [DeviceEntry],
    table_path: &Path,
    description: DescriptionSource,
    bus: BusKind,
) {
    match std::fs::read_to_string(table_path) {
        Ok(table) => apply_table(devices, &table, description),
        Err(err) => tracing::warn!("unable to read {}: {err}", table_path.display()),
    }
    modalias::resolve_missing(bus, devices);
}

/// Match every table row against every device record
///
/// Mutation contract per device: `module` is set from the first matching row
/// that names one, `description` is overwritten when `description` is
/// [`DescriptionSource::Table`] (with the hub/zero-id exclusions below), and
/// `already_matched` is set by a row whose subsystem ids matched, blocking
/// all later rows for that device.
pub fn apply_table(devices: &mut [DeviceEntry], table: &str, description: DescriptionSource) {
    for (idx, raw) in table.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = match row.parse(line) {
            Ok(row) => row,
            Err(_) => {
                tracing::warn!("table line {line_no}: bad row");
                continue;
            }
        };
        for entry in devices.iter_mut() {
            apply_row(&row, entry, description);
        }
    }
}

fn apply_row(row: &TableRow<'_>, entry: &mut DeviceEntry, description: DescriptionSource) {
    if entry.already_matched {
        // Already matched with subsystem ids, nothing may overwrite that
        return;
    }
    if row.vendor != entry.vendor || row.device != entry.device {
        return;
    }
    if let Some((subvendor, subdevice)) = row.subids {
        if subvendor != entry.subvendor || subdevice != entry.subdevice {
            return;
        }
    }

    if let Some(module) = row.module {
        if module != UNKNOWN_MODULE {
            entry.module = Some(module.into());
        }
    }

    // Zero-id and hub entries keep their probed text: guards against a known
    // malformed usbtable row
    if description == DescriptionSource::Table
        && !row.description.is_empty()
        && row.vendor != 0
        && row.device != 0
        && entry.class_id != USB_HUB_CLASS
    {
        entry.description = row.description.to_owned();
    }

    if row.subids.is_some() {
        entry.already_matched = true;
    }
}

fn row<'input>(i: &mut &'input str) -> ModalResult<TableRow<'input>> {
    let subids = opt(preceded('\t', (hex_id, '\t', hex_id)).map(|(sv, _, sd)| (sv, sd)));
    let module = opt(preceded('\t', rest.map(str::trim_end)))
        .map(|module| module.filter(|m: &&str| !m.is_empty()));
    let parser = (
        hex_id,
        '\t',
        hex_id,
        subids,
        '\t',
        take_till(0.., '\t').map(str::trim_end),
        module,
    )
        .map(
            |(vendor, _, device, subids, _, description, module)| TableRow {
                vendor,
                device,
                subids,
                description,
                module,
            },
        );
    trace("row", parser).parse_next(i)
}

fn hex_id(i: &mut &str) -> ModalResult<u16> {
    preceded("0x", hex_digit1.try_map(|s| u16::from_str_radix(s, 16))).parse_next(i)
}
