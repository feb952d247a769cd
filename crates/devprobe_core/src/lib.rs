//! Device identification and kernel module resolution for PCI and USB
//!
//! The pipeline is: enumerate devices (from sysfs for PCI, from the kernel's
//! debugfs listing for USB), decorate them with descriptions and module names
//! from the static device tables, then fall back to the kernel's module alias
//! index for anything the tables did not cover.
//!
//! Everything here is Linux only. Reading the USB enumeration file requires
//! access to debugfs; the rest works without root.

pub mod modalias;
pub mod pci;
pub mod table;
pub mod usb;

mod types;

pub use types::BusKind;
pub use types::DeviceEntry;
pub use types::MAX_DEVICES;
pub use types::USB_HUB_CLASS;
