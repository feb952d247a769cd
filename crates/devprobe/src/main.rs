//! Implements the CLI for devprobe

mod cli;

use clap::Parser;
use cli::Cli;
use devprobe_core::BusKind;
use devprobe_core::DeviceEntry;
use devprobe_core::pci;
use devprobe_core::table;
use devprobe_core::table::DescriptionSource;
use devprobe_core::usb;
use devprobe_ids::IdDb;
use proc_exit::Code;
use proc_exit::Exit;

fn main() -> eyre::Result<Exit> {
    // Set up logging with tracing
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::WARN.into())
        .from_env()?;
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    let cli = Cli::parse();

    let mut devices = vec![];
    let mut probed_any = false;

    if cli.bus.wants(BusKind::Pci) {
        match pci::probe() {
            Ok(mut entries) => {
                table::find_modules(
                    &mut entries,
                    &cli.pcitable,
                    DescriptionSource::Table,
                    BusKind::Pci,
                );
                devices.append(&mut entries);
                probed_any = true;
            }
            Err(err) => tracing::error!("PCI probe failed: {err}"),
        }
    }

    if cli.bus.wants(BusKind::Usb) {
        let ids = match IdDb::parse_file(&cli.ids) {
            Ok(db) => Some(db),
            Err(err) => {
                tracing::warn!("no usb.ids database ({}): {err}", cli.ids.display());
                None
            }
        };
        match usb::probe_from(&cli.usb_devices, ids.as_ref()) {
            Ok(mut entries) => {
                table::find_modules(
                    &mut entries,
                    &cli.usbtable,
                    DescriptionSource::Probe,
                    BusKind::Usb,
                );
                devices.append(&mut entries);
                probed_any = true;
            }
            Err(err) => tracing::error!("USB probe failed: {err}"),
        }
    }

    for entry in &devices {
        print_device(entry);
    }

    Ok(if probed_any {
        Exit::new(Code::SUCCESS)
    } else {
        Exit::new(Code::FAILURE)
    })
}

fn print_device(entry: &DeviceEntry) {
    let module = entry.module.as_deref().unwrap_or("unknown");
    println!(
        "{module:<16}: {} [{:04x}:{:04x}]",
        entry.description, entry.vendor, entry.device
    );
}
