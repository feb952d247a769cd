//! PCI device enumeration via `/sys/bus/pci/devices`
//!
//! Deliberately thin: per-device attribute files only, no config space
//! access. Descriptions are left empty here, the device table fills them in.

use crate::DeviceEntry;
use crate::MAX_DEVICES;
use eyre::WrapErr;
use std::path::Path;
use winnow::ModalResult;
use winnow::Parser;
use winnow::ascii::hex_digit1;

/// Default sysfs location of the PCI bus
pub const PCI_DEVICES_PATH: &str = "/sys/bus/pci/devices";

/// Enumerate the PCI bus
pub fn probe() -> eyre::Result<Vec<DeviceEntry>> {
    probe_from(Path::new(PCI_DEVICES_PATH))
}

/// Enumerate PCI devices from an alternative sysfs root
///
/// Devices with unreadable or malformed attributes are skipped with a
/// warning. Results are in bus address order.
pub fn probe_from(path: &Path) -> eyre::Result<Vec<DeviceEntry>> {
    let mut names = vec![];
    for entry in std::fs::read_dir(path).wrap_err_with(|| format!("reading {}", path.display()))? {
        let entry = entry?;
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort_unstable();

    let mut entries = vec![];
    for name in names {
        if entries.len() == MAX_DEVICES {
            tracing::warn!("more than {MAX_DEVICES} PCI devices, ignoring the rest");
            break;
        }
        match from_directory(&path.join(&name), &name) {
            Ok(entry) => entries.push(entry),
            Err(err) => tracing::warn!("skipping PCI device {name}: {err}"),
        }
    }
    Ok(entries)
}

/// Load one device from its sysfs directory, named `dddd:bb:dd.f`
fn from_directory(path: &Path, name: &str) -> eyre::Result<DeviceEntry> {
    let (domain, _, bus, _, device, _, function) = (address_u16, ':', hex_u8, ':', hex_u8, '.', hex_u8)
        .parse(name)
        .map_err(|_| eyre::eyre!("bad bus address"))?;

    Ok(DeviceEntry {
        vendor: u16::try_from(read_hex_attr(path, "vendor")?)?,
        device: u16::try_from(read_hex_attr(path, "device")?)?,
        subvendor: u16::try_from(read_hex_attr(path, "subsystem_vendor")?)?,
        subdevice: u16::try_from(read_hex_attr(path, "subsystem_device")?)?,
        class_id: read_hex_attr(path, "class")?,
        pci_domain: domain,
        pci_bus: bus,
        pci_device: device,
        pci_function: function,
        pci_revision: u8::try_from(read_hex_attr(path, "revision")?)?,
        ..Default::default()
    })
}

/// Sysfs attributes are `0x`-prefixed hex with a trailing newline
fn read_hex_attr(dir: &Path, attr: &str) -> eyre::Result<u32> {
    let raw = std::fs::read_to_string(dir.join(attr)).wrap_err_with(|| attr.to_owned())?;
    let raw = raw.trim();
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    u32::from_str_radix(raw, 16).wrap_err_with(|| attr.to_owned())
}

fn address_u16(i: &mut &str) -> ModalResult<u16> {
    hex_digit1
        .try_map(|s| u16::from_str_radix(s, 16))
        .parse_next(i)
}

fn hex_u8(i: &mut &str) -> ModalResult<u8> {
    hex_digit1
        .try_map(|s| u8::from_str_radix(s, 16))
        .parse_next(i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_device(root: &Path, address: &str, attrs: &[(&str, &str)]) {
        let dir = root.join(address);
        std::fs::create_dir(&dir).unwrap();
        for (attr, value) in attrs {
            std::fs::write(dir.join(attr), value).unwrap();
        }
    }

    const FULL_ATTRS: &[(&str, &str)] = &[
        ("vendor", "0x8086\n"),
        ("device", "0x51f0\n"),
        ("class", "0x028000\n"),
        ("revision", "0x01\n"),
        ("subsystem_vendor", "0x8086\n"),
        ("subsystem_device", "0x0094\n"),
    ];

    #[test]
    fn test_probe_from_sysfs_tree() {
        let root = tempfile::tempdir().unwrap();
        write_device(root.path(), "0000:14:03.0", FULL_ATTRS);

        let entries = probe_from(root.path()).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.vendor, 0x8086);
        assert_eq!(entry.device, 0x51f0);
        assert_eq!(entry.class_id, 0x028000);
        assert_eq!(entry.pci_revision, 0x01);
        assert_eq!(entry.subvendor, 0x8086);
        assert_eq!(entry.subdevice, 0x0094);
        assert_eq!(entry.pci_address(), "0000:14:03.0");
        assert_eq!(entry.module, None);
        assert_eq!(entry.description, "");
    }

    #[test]
    fn test_probe_is_address_ordered() {
        let root = tempfile::tempdir().unwrap();
        write_device(root.path(), "0000:1f:00.0", FULL_ATTRS);
        write_device(root.path(), "0000:00:02.0", FULL_ATTRS);

        let entries = probe_from(root.path()).unwrap();
        let addresses: Vec<_> = entries.iter().map(DeviceEntry::pci_address).collect();
        assert_eq!(addresses, ["0000:00:02.0", "0000:1f:00.0"]);
    }

    #[test]
    fn test_incomplete_device_skipped() {
        let root = tempfile::tempdir().unwrap();
        write_device(root.path(), "0000:00:01.0", &[("vendor", "0x8086\n")]);
        write_device(root.path(), "0000:00:02.0", FULL_ATTRS);

        let entries = probe_from(root.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pci_address(), "0000:00:02.0");
    }

    #[test]
    fn test_bad_address_skipped() {
        let root = tempfile::tempdir().unwrap();
        write_device(root.path(), "power", FULL_ATTRS);

        let entries = probe_from(root.path()).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_missing_root_is_an_error() {
        assert!(probe_from(Path::new("/nonexistent/devprobe-test")).is_err());
    }
}
