//! Parser for the `usb.ids` text format
//!
//! The format is line oriented: each line is classified by a prefix tag, and
//! indented lines are interpreted against whichever context (vendor, class,
//! usage page or language id) the most recent top level line opened.
//!
//! The classifier is a single ordered alternation with the most specific tags
//! first, since several tags share a leading letter (`PHYSDES` vs `PHY`, a
//! class line `C ` vs a vendor id that happens to start with a hex `C`).

use crate::IdDb;
use ahash::AHashMap;
use std::collections::hash_map::Entry;
use winnow::ModalResult;
use winnow::Parser;
use winnow::ascii::digit1;
use winnow::ascii::hex_digit1;
use winnow::ascii::space1;
use winnow::combinator::alt;
use winnow::combinator::trace;
use winnow::token::rest;

/// One classified line of the database
#[derive(Debug, PartialEq, Eq)]
enum Line<'input> {
    /// Bare hex id at column 0
    Vendor { id: u16, name: &'input str },
    /// One tab of indent: product, subclass, usage or language dialect,
    /// depending on the open context
    SubEntry { id: u32, name: &'input str },
    /// Two tabs of indent: protocol under an open class/subclass
    Protocol { id: u8, name: &'input str },
    /// `C ` tag
    Class { id: u8, name: &'input str },
    /// `AT ` tag
    AudioTerminal { id: u16, name: &'input str },
    /// `VT ` tag
    VideoTerminal { id: u16, name: &'input str },
    /// `HID ` tag
    HidDescriptorType { id: u8, name: &'input str },
    /// `HUT ` tag
    UsagePage { id: u16, name: &'input str },
    /// `R ` tag
    ReportTag { id: u8, name: &'input str },
    /// `L ` tag
    LangId { id: u16, name: &'input str },
    /// `PHY ` / `PHYSDES ` tags (one table, two spellings)
    PhysicalDescriptor { id: u8, name: &'input str },
    /// `BIAS ` tag
    BiasType { id: u8, name: &'input str },
    /// `HCC ` tag, decimal key
    CountryCode { id: u32, name: &'input str },
}

/// The context opened by the most recent top level line
///
/// Only one of these is open at a time: opening a new one closes the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    None,
    Vendor(u16),
    Class { class: u8, subclass: Option<u8> },
    UsagePage(u16),
    LangId(u16),
}

pub(crate) fn parse_db(input: &str) -> IdDb {
    let mut db = IdDb::default();
    let mut ctx = Context::None;

    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match classify.parse(line) {
            Ok(parsed) => apply_line(&mut db, &mut ctx, parsed, line_no),
            Err(_) => tracing::warn!("usb.ids line {line_no}: unrecognised line"),
        }
    }

    db
}

fn apply_line(db: &mut IdDb, ctx: &mut Context, line: Line<'_>, line_no: usize) {
    match line {
        Line::Vendor { id, name } => {
            insert_first(&mut db.vendors, id, name, "vendor", line_no);
            *ctx = Context::Vendor(id);
        }
        Line::Class { id, name } => {
            insert_first(&mut db.classes, id, name, "class", line_no);
            *ctx = Context::Class {
                class: id,
                subclass: None,
            };
        }
        Line::UsagePage { id, name } => {
            insert_first(&mut db.usage_pages, id, name, "usage page", line_no);
            *ctx = Context::UsagePage(id);
        }
        Line::LangId { id, name } => {
            insert_first(&mut db.lang_ids, u32::from(id), name, "language id", line_no);
            *ctx = Context::LangId(id);
        }
        Line::SubEntry { id, name } => match *ctx {
            Context::Vendor(vendor) => match u16::try_from(id) {
                Ok(product) => {
                    insert_first(&mut db.products, (vendor, product), name, "product", line_no);
                }
                Err(_) => tracing::warn!("usb.ids line {line_no}: product id out of range"),
            },
            Context::Class { class, .. } => match u8::try_from(id) {
                Ok(subclass) => {
                    insert_first(
                        &mut db.subclasses,
                        (class, subclass),
                        name,
                        "subclass",
                        line_no,
                    );
                    *ctx = Context::Class {
                        class,
                        subclass: Some(subclass),
                    };
                }
                Err(_) => tracing::warn!("usb.ids line {line_no}: subclass id out of range"),
            },
            Context::UsagePage(page) => match u16::try_from(id) {
                Ok(usage) => {
                    insert_first(
                        &mut db.usages,
                        (u32::from(page) << 16) | u32::from(usage),
                        name,
                        "usage",
                        line_no,
                    );
                }
                Err(_) => tracing::warn!("usb.ids line {line_no}: usage id out of range"),
            },
            Context::LangId(lang) => {
                // Dialect ids are 6 bits wide in the USB string descriptor
                if id <= 0x3f {
                    insert_first(
                        &mut db.lang_ids,
                        u32::from(lang) + (id << 10),
                        name,
                        "language dialect",
                        line_no,
                    );
                } else {
                    tracing::warn!("usb.ids line {line_no}: dialect id out of range");
                }
            }
            Context::None => tracing::warn!(
                "usb.ids line {line_no}: indented entry without a preceding vendor or class"
            ),
        },
        Line::Protocol { id, name } => match *ctx {
            Context::Class {
                class,
                subclass: Some(subclass),
            } => {
                insert_first(
                    &mut db.protocols,
                    (class, subclass, id),
                    name,
                    "protocol",
                    line_no,
                );
            }
            _ => tracing::warn!(
                "usb.ids line {line_no}: protocol entry without a preceding class and subclass"
            ),
        },
        Line::AudioTerminal { id, name } => {
            insert_first(&mut db.audio_terminals, id, name, "audio terminal", line_no);
        }
        Line::VideoTerminal { id, name } => {
            insert_first(&mut db.video_terminals, id, name, "video terminal", line_no);
        }
        Line::HidDescriptorType { id, name } => {
            insert_first(
                &mut db.hid_descriptor_types,
                id,
                name,
                "HID descriptor type",
                line_no,
            );
        }
        Line::ReportTag { id, name } => {
            insert_first(&mut db.report_tags, id, name, "report tag", line_no);
        }
        Line::PhysicalDescriptor { id, name } => {
            insert_first(
                &mut db.physical_descriptors,
                id,
                name,
                "physical descriptor",
                line_no,
            );
        }
        Line::BiasType { id, name } => {
            insert_first(&mut db.bias_types, id, name, "bias type", line_no);
        }
        Line::CountryCode { id, name } => {
            insert_first(&mut db.country_codes, id, name, "country code", line_no);
        }
    }
}

/// Insert keeping the first definition; duplicates are logged and discarded
fn insert_first<K>(table: &mut AHashMap<K, String>, key: K, name: &str, what: &str, line_no: usize)
where
    K: std::hash::Hash + Eq,
{
    match table.entry(key) {
        Entry::Occupied(_) => {
            tracing::warn!("usb.ids line {line_no}: duplicate {what} entry: {name}");
        }
        Entry::Vacant(slot) => {
            slot.insert(name.to_owned());
        }
    }
}

/// Classify a single line (without its newline)
///
/// Ordered most specific first. The bare-hex vendor line must come last: tag
/// letters like `B` (`BIAS`) and `C` (class) are themselves hex digits.
fn classify<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    alt((
        physdes_long,
        physdes_short,
        bias_type,
        country_code,
        hid_descriptor_type,
        usage_page,
        audio_terminal,
        video_terminal,
        alt((report_tag, lang_id, class, protocol, sub_entry, vendor)),
    ))
    .parse_next(i)
}

fn vendor<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser = (hex_u16, space1, name).map(|(id, _, name)| Line::Vendor { id, name });
    trace("vendor", parser).parse_next(i)
}

fn sub_entry<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser =
        ('\t', hex_u32, space1, name).map(|(_, id, _, name)| Line::SubEntry { id, name });
    trace("sub_entry", parser).parse_next(i)
}

fn protocol<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser =
        ("\t\t", hex_u8, space1, name).map(|(_, id, _, name)| Line::Protocol { id, name });
    trace("protocol", parser).parse_next(i)
}

fn class<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser =
        ('C', space1, hex_u8, space1, name).map(|(_, _, id, _, name)| Line::Class { id, name });
    trace("class", parser).parse_next(i)
}

fn audio_terminal<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser = ("AT", space1, hex_u16, space1, name)
        .map(|(_, _, id, _, name)| Line::AudioTerminal { id, name });
    trace("audio_terminal", parser).parse_next(i)
}

fn video_terminal<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser = ("VT", space1, hex_u16, space1, name)
        .map(|(_, _, id, _, name)| Line::VideoTerminal { id, name });
    trace("video_terminal", parser).parse_next(i)
}

fn hid_descriptor_type<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser = ("HID", space1, hex_u8, space1, name)
        .map(|(_, _, id, _, name)| Line::HidDescriptorType { id, name });
    trace("hid_descriptor_type", parser).parse_next(i)
}

fn usage_page<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser = ("HUT", space1, hex_u16, space1, name)
        .map(|(_, _, id, _, name)| Line::UsagePage { id, name });
    trace("usage_page", parser).parse_next(i)
}

fn report_tag<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser = ('R', space1, hex_u8, space1, name)
        .map(|(_, _, id, _, name)| Line::ReportTag { id, name });
    trace("report_tag", parser).parse_next(i)
}

fn lang_id<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser =
        ('L', space1, hex_u16, space1, name).map(|(_, _, id, _, name)| Line::LangId { id, name });
    trace("lang_id", parser).parse_next(i)
}

fn physdes_long<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser = ("PHYSDES", space1, hex_u8, space1, name)
        .map(|(_, _, id, _, name)| Line::PhysicalDescriptor { id, name });
    trace("physdes_long", parser).parse_next(i)
}

fn physdes_short<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser = ("PHY", space1, hex_u8, space1, name)
        .map(|(_, _, id, _, name)| Line::PhysicalDescriptor { id, name });
    trace("physdes_short", parser).parse_next(i)
}

fn bias_type<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser = ("BIAS", space1, hex_u8, space1, name)
        .map(|(_, _, id, _, name)| Line::BiasType { id, name });
    trace("bias_type", parser).parse_next(i)
}

fn country_code<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser = ("HCC", space1, dec_u32, space1, name)
        .map(|(_, _, id, _, name)| Line::CountryCode { id, name });
    trace("country_code", parser).parse_next(i)
}

/// The name is the rest of the line, trailing whitespace stripped
fn name<'input>(i: &mut &'input str) -> ModalResult<&'input str> {
    trace(
        "name",
        rest.map(str::trim_end).verify(|s: &&str| !s.is_empty()),
    )
    .parse_next(i)
}

fn hex_u8(i: &mut &str) -> ModalResult<u8> {
    hex_digit1
        .try_map(|s| u8::from_str_radix(s, 16))
        .parse_next(i)
}

fn hex_u16(i: &mut &str) -> ModalResult<u16> {
    hex_digit1
        .try_map(|s| u16::from_str_radix(s, 16))
        .parse_next(i)
}

fn hex_u32(i: &mut &str) -> ModalResult<u32> {
    hex_digit1
        .try_map(|s| u32::from_str_radix(s, 16))
        .parse_next(i)
}

fn dec_u32(i: &mut &str) -> ModalResult<u32> {
    digit1.try_map(str::parse).parse_next(i)
}
