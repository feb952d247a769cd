//! Core types shared by the probe, matcher and resolver stages

use compact_str::CompactString;

/// Upper bound on the number of device records a single probe returns.
/// Enumeration input beyond this is ignored silently.
pub const MAX_DEVICES: usize = 256;

/// Composite class id (`0xCCSSPP`) of a USB hub
pub const USB_HUB_CLASS: u32 = 0x09_0000;

/// Which bus a set of device records came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusKind {
    Pci,
    Usb,
}

impl std::fmt::Display for BusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pci => write!(f, "pci"),
            Self::Usb => write!(f, "usb"),
        }
    }
}

/// One device discovered during enumeration
///
/// Created by the enumeration stage, decorated in place by the device table
/// matcher and the modalias resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub vendor: u16,
    pub device: u16,
    /// `0xffff` when the bus does not expose subsystem ids
    pub subvendor: u16,
    /// `0xffff` when the bus does not expose subsystem ids
    pub subdevice: u16,
    /// Composite class id (`0xCCSSPP`), 0 if unknown
    pub class_id: u32,

    pub pci_domain: u16,
    pub pci_bus: u8,
    pub pci_device: u8,
    pub pci_function: u8,
    pub pci_revision: u8,

    /// USB bus number
    pub usb_bus: u8,
    /// USB port number as enumerated by the kernel listing (0-based)
    pub usb_port: u16,
    /// USB device number on its bus
    pub usb_device_number: u8,

    /// Set when a table row with matching subsystem ids has been applied;
    /// blocks any later, less specific row from overwriting the match
    pub already_matched: bool,

    /// Resolved kernel module, `None` until resolved
    pub module: Option<CompactString>,
    /// Human readable `vendor|product` text
    pub description: String,
}

impl Default for DeviceEntry {
    fn default() -> Self {
        Self {
            vendor: 0,
            device: 0,
            subvendor: 0xffff,
            subdevice: 0xffff,
            class_id: 0,
            pci_domain: 0,
            pci_bus: 0,
            pci_device: 0,
            pci_function: 0,
            pci_revision: 0,
            usb_bus: 0,
            usb_port: 0,
            usb_device_number: 0,
            already_matched: false,
            module: None,
            description: String::new(),
        }
    }
}

impl DeviceEntry {
    /// Sysfs address of a PCI device (`dddd:bb:dd.f`)
    #[must_use]
    pub fn pci_address(&self) -> String {
        format!(
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.pci_domain, self.pci_bus, self.pci_device, self.pci_function
        )
    }
}
