use clap::Parser;
use devprobe_core::BusKind;
use std::fmt::Display;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Which bus(es) to probe
    #[arg(short, long, default_value_t = Bus::All)]
    pub bus: Bus,
    /// USB enumeration file (kernel debugfs format)
    #[arg(short = 'u', long, default_value = devprobe_core::usb::USB_DEVICES_PATH)]
    pub usb_devices: PathBuf,
    /// usb.ids database, used to name devices without string descriptors
    #[arg(short = 'i', long, default_value = devprobe_ids::DEFAULT_PATH)]
    pub ids: PathBuf,
    /// PCI device table
    #[arg(long, default_value = "/usr/share/devprobe/pcitable")]
    pub pcitable: PathBuf,
    /// USB device table
    #[arg(long, default_value = "/usr/share/devprobe/usbtable")]
    pub usbtable: PathBuf,
}

/// Which bus(es) to probe
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, clap::ValueEnum)]
pub enum Bus {
    /// Probe every supported bus
    All,
    /// PCI only
    Pci,
    /// USB only
    Usb,
}

impl Bus {
    pub fn wants(self, bus: BusKind) -> bool {
        match self {
            Bus::All => true,
            Bus::Pci => bus == BusKind::Pci,
            Bus::Usb => bus == BusKind::Usb,
        }
    }
}

impl Display for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bus::All => write!(f, "all"),
            Bus::Pci => write!(f, "pci"),
            Bus::Usb => write!(f, "usb"),
        }
    }
}
