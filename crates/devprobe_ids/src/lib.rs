//! Parser and lookup tables for the `usb.ids` hardware ID database
//!
//! The database file is a line oriented, indentation sensitive text format
//! shipped by most distributions as `/usr/share/usb.ids`. It maps numeric
//! identifiers (vendors, products, device classes, HID usages, ...) to
//! human readable names.
//!
//! Everything here is Linux only and should work without root access.

use ahash::AHashMap;

mod parser;

/// Default location of the database on most distributions
pub const DEFAULT_PATH: &str = "/usr/share/usb.ids";

/// A database of hardware ID to name mappings
///
/// Built once from the text database, immutable afterwards. Dropping it
/// releases all tables. Within each table the first definition of a key wins;
/// later duplicates are logged and discarded during parsing.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IdDb {
    pub(crate) vendors: AHashMap<u16, String>,
    pub(crate) products: AHashMap<(u16, u16), String>,
    pub(crate) classes: AHashMap<u8, String>,
    pub(crate) subclasses: AHashMap<(u8, u8), String>,
    pub(crate) protocols: AHashMap<(u8, u8, u8), String>,
    pub(crate) audio_terminals: AHashMap<u16, String>,
    pub(crate) video_terminals: AHashMap<u16, String>,
    pub(crate) hid_descriptor_types: AHashMap<u8, String>,
    pub(crate) report_tags: AHashMap<u8, String>,
    pub(crate) usage_pages: AHashMap<u16, String>,
    pub(crate) usages: AHashMap<u32, String>,
    pub(crate) lang_ids: AHashMap<u32, String>,
    pub(crate) physical_descriptors: AHashMap<u8, String>,
    pub(crate) bias_types: AHashMap<u8, String>,
    pub(crate) country_codes: AHashMap<u32, String>,
}

impl IdDb {
    /// Create from a string containing the `usb.ids` text
    ///
    /// Cannot fail: malformed lines and duplicate keys are logged and
    /// skipped, everything else is loaded.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        parser::parse_db(s)
    }

    /// Create from a file containing `usb.ids`
    pub fn parse_file(path: &std::path::Path) -> eyre::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::parse(&s))
    }

    /// Vendor name for a vendor id
    pub fn vendor(&self, vendor: u16) -> Option<&str> {
        self.vendors.get(&vendor).map(String::as_str)
    }

    /// Product name for a (vendor, product) id pair
    pub fn product(&self, vendor: u16, product: u16) -> Option<&str> {
        self.products.get(&(vendor, product)).map(String::as_str)
    }

    /// Device class name
    pub fn class(&self, class: u8) -> Option<&str> {
        self.classes.get(&class).map(String::as_str)
    }

    /// Device subclass name
    pub fn subclass(&self, class: u8, subclass: u8) -> Option<&str> {
        self.subclasses.get(&(class, subclass)).map(String::as_str)
    }

    /// Protocol name within a (class, subclass)
    pub fn protocol(&self, class: u8, subclass: u8, protocol: u8) -> Option<&str> {
        self.protocols
            .get(&(class, subclass, protocol))
            .map(String::as_str)
    }

    /// Audio terminal type name
    pub fn audio_terminal(&self, terminal_type: u16) -> Option<&str> {
        self.audio_terminals
            .get(&terminal_type)
            .map(String::as_str)
    }

    /// Video terminal type name
    pub fn video_terminal(&self, terminal_type: u16) -> Option<&str> {
        self.video_terminals
            .get(&terminal_type)
            .map(String::as_str)
    }

    /// HID descriptor type name
    pub fn hid_descriptor_type(&self, descriptor_type: u8) -> Option<&str> {
        self.hid_descriptor_types
            .get(&descriptor_type)
            .map(String::as_str)
    }

    /// HID report tag name
    pub fn report_tag(&self, tag: u8) -> Option<&str> {
        self.report_tags.get(&tag).map(String::as_str)
    }

    /// HID usage page name
    pub fn usage_page(&self, page: u16) -> Option<&str> {
        self.usage_pages.get(&page).map(String::as_str)
    }

    /// HID usage name within a usage page
    pub fn usage(&self, page: u16, usage: u16) -> Option<&str> {
        self.usages
            .get(&((u32::from(page) << 16) | u32::from(usage)))
            .map(String::as_str)
    }

    /// Language name for a language id
    pub fn lang_id(&self, lang: u16) -> Option<&str> {
        self.lang_ids.get(&u32::from(lang)).map(String::as_str)
    }

    /// Dialect name for a (language, dialect) pair
    pub fn lang_dialect(&self, lang: u16, dialect: u16) -> Option<&str> {
        self.lang_ids
            .get(&(u32::from(lang) + (u32::from(dialect) << 10)))
            .map(String::as_str)
    }

    /// HID physical descriptor type name
    pub fn physical_descriptor(&self, descriptor: u8) -> Option<&str> {
        self.physical_descriptors
            .get(&descriptor)
            .map(String::as_str)
    }

    /// HID physical descriptor bias name
    pub fn bias_type(&self, bias: u8) -> Option<&str> {
        self.bias_types.get(&bias).map(String::as_str)
    }

    /// HID country code name (decimal in the database)
    pub fn country_code(&self, code: u32) -> Option<&str> {
        self.country_codes.get(&code).map(String::as_str)
    }
}
