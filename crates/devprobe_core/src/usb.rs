//! USB device enumeration from the kernel's per-bus device listing
//!
//! The kernel exposes one text stanza per device (`T:`, `P:`, `I:`, `S:`
//! lines); this module reconstructs ordered device records from it. The same
//! format has lived at two paths over the years (debugfs now, procfs on old
//! kernels), so the source is configurable; the debugfs location is the
//! default.

use crate::DeviceEntry;
use crate::MAX_DEVICES;
use devprobe_ids::IdDb;
use std::path::Path;
use winnow::Parser;

mod parser;

/// Default enumeration source (requires debugfs to be mounted)
pub const USB_DEVICES_PATH: &str = "/sys/kernel/debug/usb/devices";

/// USB audio control interface: class 01, subclass 01
const AUDIO_CONTROL_CLASS: u32 = 0x0101;

/// Enumerate USB devices from the default source
///
/// The ID database, when given, fills in vendor/product names for devices
/// that do not carry their own string descriptors.
pub fn probe(ids: Option<&IdDb>) -> eyre::Result<Vec<DeviceEntry>> {
    probe_from(Path::new(USB_DEVICES_PATH), ids)
}

/// Enumerate USB devices from an alternate source path
pub fn probe_from(path: &Path, ids: Option<&IdDb>) -> eyre::Result<Vec<DeviceEntry>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_devices(&contents, ids))
}

/// In-progress record plus the string fragments that may arrive before the
/// record is complete. Flushed exactly once: on the next `T:` line or at end
/// of input.
#[derive(Debug, Default)]
struct PendingDevice {
    entry: DeviceEntry,
    manufacturer: Option<String>,
    product: Option<String>,
}

impl PendingDevice {
    fn finish(self, ids: Option<&IdDb>) -> DeviceEntry {
        let mut entry = self.entry;
        let manufacturer = self
            .manufacturer
            .or_else(|| {
                ids.and_then(|db| db.vendor(entry.vendor))
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| "Unknown".to_owned());
        let product = self
            .product
            .or_else(|| {
                ids.and_then(|db| db.product(entry.vendor, entry.device))
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| "Unknown".to_owned());
        entry.description = format!("{manufacturer}|{product}");
        entry
    }
}

/// Reconstruct device records from the enumeration text
///
/// Malformed lines leave the affected fields at their defaults and are
/// logged; they never abort the parse. Output is capped at [`MAX_DEVICES`],
/// further stanzas are ignored.
#[must_use]
pub fn parse_devices(input: &str, ids: Option<&IdDb>) -> Vec<DeviceEntry> {
    let mut out = Vec::new();
    let mut pending: Option<PendingDevice> = None;

    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        match line.as_bytes().first() {
            Some(b'T') => {
                if let Some(done) = pending.take() {
                    out.push(done.finish(ids));
                }
                if out.len() >= MAX_DEVICES {
                    break;
                }
                let mut next = PendingDevice::default();
                match parser::t_line.parse(line) {
                    Ok(t) => {
                        next.entry.usb_bus = t.bus;
                        next.entry.usb_port = t.port;
                        next.entry.usb_device_number = t.device_number;
                    }
                    Err(_) => tracing::warn!("line {line_no}: unrecognised `T' line"),
                }
                pending = Some(next);
            }
            Some(b'P') => {
                let Some(current) = pending.as_mut() else {
                    tracing::warn!("line {line_no}: `P' line before any `T' line");
                    continue;
                };
                match parser::p_line.parse(line) {
                    Ok(p) => {
                        current.entry.vendor = p.vendor;
                        current.entry.device = p.product;
                    }
                    Err(_) => tracing::warn!("line {line_no}: unrecognised `P' line"),
                }
            }
            Some(b'I') => {
                let Some(current) = pending.as_mut() else {
                    tracing::warn!("line {line_no}: `I' line before any `T' line");
                    continue;
                };
                apply_interface(&mut current.entry, line, line_no);
            }
            Some(b'S') => {
                let Some(current) = pending.as_mut() else {
                    continue;
                };
                if let Ok(s) = parser::s_line.parse(line) {
                    match s {
                        parser::SLine::Manufacturer(text) => {
                            current.manufacturer = Some(text.to_owned());
                        }
                        parser::SLine::Product(text) => {
                            current.product = Some(text.to_owned());
                        }
                        parser::SLine::Other => {}
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(done) = pending.take() {
        out.push(done.finish(ids));
    }

    out
}

/// First interface wins, unless a later interface names an active driver,
/// which then also decides the class.
fn apply_interface(entry: &mut DeviceEntry, line: &str, line_no: usize) {
    if entry.class_id != 0 && entry.module.is_some() {
        return;
    }
    let interface = match parser::i_line.parse(line) {
        Ok(interface) => interface,
        Err(_) => {
            tracing::warn!("line {line_no}: unrecognised `I' line");
            return;
        }
    };
    if !interface.active {
        return;
    }

    let class_id = (u32::from(interface.class) << 16)
        | (u32::from(interface.subclass) << 8)
        | u32::from(interface.protocol);
    if entry.class_id == 0 {
        entry.class_id = class_id;
    }
    if let Some(driver) = interface.driver {
        if driver != "(none)" {
            entry.class_id = class_id;
            // Module alias naming uses underscores
            entry.module = Some(driver.replace('-', "_").into());
        }
    }
    // The kernel does not always bind a driver to audio control interfaces,
    // but the audio module claims them regardless
    if entry.class_id >> 8 == AUDIO_CONTROL_CLASS {
        entry.module = Some("snd_usb_audio".into());
    }
}
