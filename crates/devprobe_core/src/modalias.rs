//! Kernel module alias resolution
//!
//! Builds an in-memory index of `alias <pattern> <module>` definitions from
//! the same multi-source search path the module tools use, then matches
//! device modalias strings against it. Candidates on the deny list
//! (`blacklist` directives in modprobe.d) are filtered out; of the survivors
//! the first defined wins.

use crate::BusKind;
use crate::DeviceEntry;
use ahash::AHashSet;
use compact_str::CompactString;
use compact_str::ToCompactString;
use std::path::Path;
use std::path::PathBuf;

/// Packaged fallback alias file, used when the running kernel's
/// `modules.alias` is missing or older
pub const FALLBACK_ALIAS_FILE: &str = "/usr/share/devprobe/fallback-modules.alias";

/// Packaged DKMS alias file, consulted as a last resort
pub const DKMS_ALIAS_FILE: &str = "/usr/share/devprobe/dkms-modules.alias";

/// One source of alias definitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasSource {
    /// A modprobe.d style directory: `alias` and `blacklist` directives are
    /// read from `*.conf` files, anything else is ignored
    ConfDir(PathBuf),
    /// A `modules.alias` style file: one `alias <pattern> <module>` per line
    AliasFile(PathBuf),
}

/// The default search path, highest priority first
#[must_use]
pub fn default_sources() -> Vec<AliasSource> {
    vec![
        AliasSource::ConfDir(PathBuf::from("/run/modprobe.d")),
        AliasSource::ConfDir(PathBuf::from("/etc/modprobe.d")),
        AliasSource::ConfDir(PathBuf::from("/lib/modprobe.d")),
        AliasSource::AliasFile(PathBuf::from("/usr/share/devprobe/extra-modules.alias")),
        AliasSource::AliasFile(select_kernel_alias_file(
            &Path::new("/lib/modules")
                .join(kernel_release())
                .join("modules.alias"),
            Path::new(FALLBACK_ALIAS_FILE),
        )),
        AliasSource::AliasFile(PathBuf::from(DKMS_ALIAS_FILE)),
    ]
}

/// The running kernel's `modules.alias`, or the packaged fallback if the
/// kernel's copy is missing or older than the fallback
fn select_kernel_alias_file(kernel: &Path, fallback: &Path) -> PathBuf {
    let kernel_mtime = kernel.metadata().and_then(|m| m.modified());
    let fallback_mtime = fallback.metadata().and_then(|m| m.modified());
    match (kernel_mtime, fallback_mtime) {
        (Err(_), _) => fallback.to_path_buf(),
        (Ok(kernel_time), Ok(fallback_time)) if fallback_time > kernel_time => {
            fallback.to_path_buf()
        }
        _ => kernel.to_path_buf(),
    }
}

fn kernel_release() -> String {
    match nix::sys::utsname::uname() {
        Ok(info) => info.release().to_string_lossy().into_owned(),
        Err(err) => {
            tracing::warn!("uname failed: {err}");
            String::new()
        }
    }
}

#[derive(Debug)]
struct Alias {
    pattern: glob::Pattern,
    module: CompactString,
}

/// An owned index over the module alias search path
///
/// Construct once per probe, query per device. All I/O failures during
/// construction degrade to an emptier index, never an error.
#[derive(Debug, Default)]
pub struct AliasIndex {
    /// Source-priority then declaration order
    aliases: Vec<Alias>,
    denied: AHashSet<CompactString>,
}

impl AliasIndex {
    /// Build from the default search path
    #[must_use]
    pub fn load_default() -> Self {
        Self::from_sources(&default_sources())
    }

    /// Build from an explicit list of sources, highest priority first
    #[must_use]
    pub fn from_sources(sources: &[AliasSource]) -> Self {
        let mut index = Self::default();
        for source in sources {
            match source {
                AliasSource::ConfDir(dir) => index.load_conf_dir(dir),
                AliasSource::AliasFile(file) => index.load_alias_file(file),
            }
        }
        index
    }

    /// Best matching module for a modalias string
    ///
    /// Returns the first candidate, in declaration order, whose pattern
    /// matches and whose module is not deny-listed.
    #[must_use]
    pub fn resolve(&self, modalias: &str) -> Option<CompactString> {
        self.aliases
            .iter()
            .filter(|alias| alias.pattern.matches(modalias))
            .map(|alias| &alias.module)
            .find(|module| !self.denied.contains(module.as_str()))
            .cloned()
    }

    fn load_conf_dir(&mut self, dir: &Path) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!("skipping {}: {err}", dir.display());
                return;
            }
        };
        let mut paths: Vec<_> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "conf"))
            .collect();
        paths.sort();
        for path in paths {
            let Ok(contents) = std::fs::read_to_string(&path) else {
                tracing::warn!("unable to read {}", path.display());
                continue;
            };
            for (idx, line) in contents.lines().enumerate() {
                match line.split_whitespace().collect::<Vec<_>>().as_slice() {
                    ["alias", pattern, module] => self.add_alias(pattern, module, &path, idx + 1),
                    ["blacklist", module] => {
                        self.denied.insert(module.to_compact_string());
                    }
                    // Comments and unrelated directives (options, install, ...)
                    _ => {}
                }
            }
        }
    }

    fn load_alias_file(&mut self, path: &Path) {
        let Ok(contents) = std::fs::read_to_string(path) else {
            tracing::debug!("skipping {}", path.display());
            return;
        };
        for (idx, line) in contents.lines().enumerate() {
            match line.split_whitespace().collect::<Vec<_>>().as_slice() {
                ["alias", pattern, module] => self.add_alias(pattern, module, path, idx + 1),
                _ => {}
            }
        }
    }

    fn add_alias(&mut self, pattern: &str, module: &str, path: &Path, line_no: usize) {
        match glob::Pattern::new(pattern) {
            Ok(pattern) => self.aliases.push(Alias {
                pattern,
                module: module.to_compact_string(),
            }),
            Err(err) => {
                tracing::warn!("{} line {line_no}: bad alias pattern: {err}", path.display());
            }
        }
    }
}

/// Resolve modules for any entries the static tables left unresolved
pub fn resolve_missing(bus: BusKind, entries: &mut [DeviceEntry]) {
    let index = AliasIndex::load_default();
    resolve_missing_with(&index, bus, entries, Path::new("/sys"));
}

/// As [`resolve_missing`] but with an explicit index and sysfs root
pub fn resolve_missing_with(
    index: &AliasIndex,
    bus: BusKind,
    entries: &mut [DeviceEntry],
    sysfs_root: &Path,
) {
    for entry in entries.iter_mut().filter(|e| e.module.is_none()) {
        match bus {
            BusKind::Pci => resolve_pci_entry(index, entry, sysfs_root),
            BusKind::Usb => resolve_usb_entry(index, entry, sysfs_root),
        }
    }
}

fn resolve_pci_entry(index: &AliasIndex, entry: &mut DeviceEntry, sysfs_root: &Path) {
    let path = sysfs_root.join(format!("bus/pci/devices/{}/modalias", entry.pci_address()));
    if let Some(modalias) = read_modalias(&path) {
        entry.module = index.resolve(&modalias);
    }
}

/// USB ports are numbered from 1 in sysfs but from 0 in the enumeration
/// listing, and the exact interface path cannot be predicted, so scan the
/// children of the expected port directory for entries with the bus prefix.
/// The first one that resolves to a module wins.
fn resolve_usb_entry(index: &AliasIndex, entry: &mut DeviceEntry, sysfs_root: &Path) {
    let prefix = format!("{}-", entry.usb_bus);
    let device_dir = sysfs_root.join(format!(
        "bus/usb/devices/{}-{}",
        entry.usb_bus,
        entry.usb_port + 1
    ));
    let children = match std::fs::read_dir(&device_dir) {
        Ok(children) => children,
        Err(err) => {
            tracing::debug!("skipping {}: {err}", device_dir.display());
            return;
        }
    };
    let mut names: Vec<_> = children
        .flatten()
        .filter(|child| child.path().is_dir())
        .map(|child| child.file_name())
        .filter(|name| name.to_string_lossy().starts_with(&prefix))
        .collect();
    // readdir order is not deterministic
    names.sort();
    for name in names {
        let Some(modalias) = read_modalias(&device_dir.join(&name).join("modalias")) else {
            continue;
        };
        if let Some(module) = index.resolve(&modalias) {
            entry.module = Some(module);
            break;
        }
    }
}

/// First line of a modalias pseudo-file; unreadable files degrade to `None`
fn read_modalias(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents
            .lines()
            .next()
            .map(|line| line.trim_end().to_owned())
            .filter(|line| !line.is_empty()),
        Err(err) => {
            tracing::warn!("unable to read modalias from {}: {err}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn write(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn set_mtime(path: &Path, secs_since_epoch: u64) {
        let time = std::time::UNIX_EPOCH + std::time::Duration::from_secs(secs_since_epoch);
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn test_kernel_alias_file_used_when_fallback_missing() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = dir.path().join("modules.alias");
        let fallback = dir.path().join("fallback-modules.alias");
        write(&kernel, "");

        assert_eq!(select_kernel_alias_file(&kernel, &fallback), kernel);
    }

    #[test]
    fn test_fallback_alias_file_replaces_missing_kernel_copy() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = dir.path().join("modules.alias");
        let fallback = dir.path().join("fallback-modules.alias");
        write(&fallback, "");

        assert_eq!(select_kernel_alias_file(&kernel, &fallback), fallback);
    }

    #[test]
    fn test_newer_alias_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = dir.path().join("modules.alias");
        let fallback = dir.path().join("fallback-modules.alias");
        write(&kernel, "");
        write(&fallback, "");

        set_mtime(&kernel, 2000);
        set_mtime(&fallback, 1000);
        assert_eq!(select_kernel_alias_file(&kernel, &fallback), kernel);

        set_mtime(&fallback, 3000);
        assert_eq!(select_kernel_alias_file(&kernel, &fallback), fallback);
    }

    /// Priority order of the default search path: overrides first, the
    /// kernel's alias index near the bottom, DKMS last
    #[test]
    fn test_default_sources_order() {
        let sources = default_sources();
        assert_eq!(sources.len(), 6);
        assert_eq!(
            sources[..4],
            [
                AliasSource::ConfDir(PathBuf::from("/run/modprobe.d")),
                AliasSource::ConfDir(PathBuf::from("/etc/modprobe.d")),
                AliasSource::ConfDir(PathBuf::from("/lib/modprobe.d")),
                AliasSource::AliasFile(PathBuf::from(
                    "/usr/share/devprobe/extra-modules.alias"
                )),
            ]
        );
        assert_eq!(
            sources[5],
            AliasSource::AliasFile(PathBuf::from(DKMS_ALIAS_FILE))
        );
    }

    #[test]
    fn test_resolve_first_defined_wins() {
        let dir = tempfile::tempdir().unwrap();
        let aliases = dir.path().join("modules.alias");
        write(
            &aliases,
            indoc! {"
                # Aliases extracted at build time
                alias usb:v1234p5678d*dc*dsc*dp*ic*isc*ip*in* first_module
                alias usb:v1234p*d*dc*dsc*dp*ic*isc*ip*in* second_module
            "},
        );
        let index = AliasIndex::from_sources(&[AliasSource::AliasFile(aliases)]);

        assert_eq!(
            index.resolve("usb:v1234p5678d0100dc00dsc00dp00ic03isc01ip02in00"),
            Some("first_module".into())
        );
        assert_eq!(
            index.resolve("usb:v1234p9999d0100dc00dsc00dp00ic03isc01ip02in00"),
            Some("second_module".into())
        );
        assert_eq!(index.resolve("usb:v5678p0000d0000"), None);
    }

    #[test]
    fn test_deny_list_filters_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let confdir = dir.path().join("modprobe.d");
        write(
            &confdir.join("local.conf"),
            indoc! {"
                # Locally banned
                blacklist bad_module
                options other_module foo=1
            "},
        );
        let aliases = dir.path().join("modules.alias");
        write(
            &aliases,
            indoc! {"
                alias pci:v00001234d* bad_module
                alias pci:v00001234d* good_module
            "},
        );
        let index = AliasIndex::from_sources(&[
            AliasSource::ConfDir(confdir),
            AliasSource::AliasFile(aliases),
        ]);

        assert_eq!(
            index.resolve("pci:v00001234d00005678sv00000000"),
            Some("good_module".into())
        );
    }

    #[test]
    fn test_conf_dir_aliases_outrank_alias_files() {
        let dir = tempfile::tempdir().unwrap();
        let confdir = dir.path().join("modprobe.d");
        write(&confdir.join("override.conf"), "alias pci:v0000AAAAd* override_module\n");
        // Non-conf files are ignored
        write(&confdir.join("README"), "alias pci:v0000AAAAd* readme_module\n");
        let aliases = dir.path().join("modules.alias");
        write(&aliases, "alias pci:v0000AAAAd* stock_module\n");
        let index = AliasIndex::from_sources(&[
            AliasSource::ConfDir(confdir),
            AliasSource::AliasFile(aliases),
        ]);

        assert_eq!(
            index.resolve("pci:v0000AAAAd00000001"),
            Some("override_module".into())
        );
    }

    #[test]
    fn test_missing_sources_degrade_to_empty() {
        let index = AliasIndex::from_sources(&[
            AliasSource::ConfDir(PathBuf::from("/nonexistent/modprobe.d")),
            AliasSource::AliasFile(PathBuf::from("/nonexistent/modules.alias")),
        ]);
        assert_eq!(index.resolve("usb:v1234p5678"), None);
    }

    #[test]
    fn test_resolve_missing_pci() {
        let dir = tempfile::tempdir().unwrap();
        let sysfs = dir.path();
        write(
            &sysfs.join("bus/pci/devices/0000:00:1f.3/modalias"),
            "pci:v00008086d0000A348sv00001043sd00008694bc04sc03i00\n",
        );
        let aliases = dir.path().join("modules.alias");
        write(
            &aliases,
            "alias pci:v00008086d0000A348sv*sd*bc*sc*i* snd_hda_intel\n",
        );
        let index = AliasIndex::from_sources(&[AliasSource::AliasFile(aliases)]);

        let mut entries = vec![DeviceEntry {
            vendor: 0x8086,
            device: 0xa348,
            pci_bus: 0x00,
            pci_device: 0x1f,
            pci_function: 0x3,
            ..Default::default()
        }];
        resolve_missing_with(&index, BusKind::Pci, &mut entries, sysfs);
        assert_eq!(entries[0].module, Some("snd_hda_intel".into()));
    }

    #[test]
    fn test_resolve_missing_usb_scans_interfaces() {
        let dir = tempfile::tempdir().unwrap();
        let sysfs = dir.path();
        // Port 2 in the enumeration listing is 1-3 in sysfs
        write(
            &sysfs.join("bus/usb/devices/1-3/1-3:1.0/modalias"),
            "usb:v046DpC52Bd1203dc00dsc00dp00ic03isc01ip01in00\n",
        );
        // Not matching the bus prefix, must be skipped
        write(
            &sysfs.join("bus/usb/devices/1-3/ep_00/modalias"),
            "usb:v0000p0000\n",
        );
        let aliases = dir.path().join("modules.alias");
        write(
            &aliases,
            "alias usb:v046DpC52Bd*dc*dsc*dp*ic03isc01ip01in* usbhid\n",
        );
        let index = AliasIndex::from_sources(&[AliasSource::AliasFile(aliases)]);

        let mut entries = vec![DeviceEntry {
            vendor: 0x046d,
            device: 0xc52b,
            usb_bus: 1,
            usb_port: 2,
            ..Default::default()
        }];
        resolve_missing_with(&index, BusKind::Usb, &mut entries, sysfs);
        assert_eq!(entries[0].module, Some("usbhid".into()));
    }

    /// Entries that already have a module are left alone
    #[test]
    fn test_resolve_missing_skips_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let index = AliasIndex::default();
        let mut entries = vec![DeviceEntry {
            module: Some("e1000e".into()),
            ..Default::default()
        }];
        resolve_missing_with(&index, BusKind::Pci, &mut entries, dir.path());
        assert_eq!(entries[0].module, Some("e1000e".into()));
    }
}
