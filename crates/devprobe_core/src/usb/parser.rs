//! Line parsers for the kernel's USB device enumeration format
//!
//! One stanza per device; the line tag is the first byte. Fields are
//! `Key=Value` pairs where the value may be padded with spaces.

use winnow::ModalResult;
use winnow::Parser;
use winnow::ascii::digit1;
use winnow::ascii::hex_digit1;
use winnow::ascii::space0;
use winnow::ascii::space1;
use winnow::combinator::alt;
use winnow::combinator::delimited;
use winnow::combinator::opt;
use winnow::combinator::preceded;
use winnow::token::rest;
use winnow::combinator::trace;
use winnow::error::ContextError;
use winnow::error::ErrMode;
use winnow::token::take_till;
use winnow::token::take_until;

/// `T:` topology line: where the device sits
#[derive(Debug, PartialEq, Eq)]
pub(super) struct TLine {
    pub(super) bus: u8,
    pub(super) port: u16,
    pub(super) device_number: u8,
}

/// `P:` product line: who the device is
#[derive(Debug, PartialEq, Eq)]
pub(super) struct PLine {
    pub(super) vendor: u16,
    pub(super) product: u16,
}

/// `I:` interface line
#[derive(Debug, PartialEq, Eq)]
pub(super) struct ILine<'input> {
    /// `I:*` marks the active alternate setting; `I: ` lines are ignored
    pub(super) active: bool,
    pub(super) class: u8,
    pub(super) subclass: u8,
    pub(super) protocol: u8,
    /// Bound driver, still carrying the `(none)` sentinel if unbound
    pub(super) driver: Option<&'input str>,
}

/// `S:` string descriptor line
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum SLine<'input> {
    Manufacturer(&'input str),
    Product(&'input str),
    /// Serial number and friends
    Other,
}

pub(super) fn t_line(i: &mut &str) -> ModalResult<TLine> {
    let parser = (
        ("T:", space1),
        dec_field::<u8>("Bus"),
        (space1, dec_field::<u8>("Lev")),
        (space1, dec_field::<u8>("Prnt")),
        (space1, dec_field::<u16>("Port")),
        (space1, dec_field::<u8>("Cnt")),
        (space1, dec_field::<u8>("Dev#")),
        rest,
    )
        .map(
            |(_, bus, _lev, _prnt, (_, port), _cnt, (_, device_number), _)| TLine {
                bus,
                port,
                device_number,
            },
        );
    trace("t_line", parser).parse_next(i)
}

pub(super) fn p_line(i: &mut &str) -> ModalResult<PLine> {
    let parser = (
        ("P:", space1),
        hex_field("Vendor"),
        space1,
        hex_field("ProdID"),
        rest,
    )
        .map(|(_, vendor, _, product, _)| PLine { vendor, product });
    trace("p_line", parser).parse_next(i)
}

pub(super) fn i_line<'input>(i: &mut &'input str) -> ModalResult<ILine<'input>> {
    let header = ("I:", alt(('*'.value(true), ' '.value(false))), space1);
    // Cls=09(hub  )
    let cls = preceded(
        ("Cls=", space0),
        (
            hex_u8,
            delimited('(', take_until(0.., ')'), ')').void(),
        ),
    )
    .map(|(class, ())| class);
    let driver = opt(preceded(
        (space1, "Driver="),
        take_till(1.., [' ', '\t']),
    ));
    let parser = (
        header,
        dec_field::<u8>("If#"),
        (space1, dec_field::<u8>("Alt")),
        (space1, dec_field::<u8>("#EPs")),
        (space1, cls),
        (space1, hex_field_u8("Sub")),
        (space1, hex_field_u8("Prot")),
        driver,
        rest,
    )
        .map(
            |((_, active, _), _if, _alt, _eps, (_, class), (_, subclass), (_, protocol), driver, _)| {
                ILine {
                    active,
                    class,
                    subclass,
                    protocol,
                    driver,
                }
            },
        );
    trace("i_line", parser).parse_next(i)
}

pub(super) fn s_line<'input>(i: &mut &'input str) -> ModalResult<SLine<'input>> {
    let parser = preceded(
        ("S:", space1),
        alt((
            preceded("Manufacturer=", rest).map(|s: &str| SLine::Manufacturer(s.trim_end())),
            preceded("Product=", rest).map(|s: &str| SLine::Product(s.trim_end())),
            rest.value(SLine::Other),
        )),
    );
    trace("s_line", parser).parse_next(i)
}

/// `<label>=` then a space padded decimal value
fn dec_field<'i, T>(label: &'static str) -> impl Parser<&'i str, T, ErrMode<ContextError>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    preceded((label, '=', space0), digit1.try_map(str::parse::<T>))
}

/// `<label>=` then a space padded hex value
fn hex_field<'i>(label: &'static str) -> impl Parser<&'i str, u16, ErrMode<ContextError>> {
    preceded(
        (label, '=', space0),
        hex_digit1.try_map(|s| u16::from_str_radix(s, 16)),
    )
}

fn hex_field_u8<'i>(label: &'static str) -> impl Parser<&'i str, u8, ErrMode<ContextError>> {
    preceded(
        (label, '=', space0),
        hex_digit1.try_map(|s| u8::from_str_radix(s, 16)),
    )
}

fn hex_u8(i: &mut &str) -> ModalResult<u8> {
    hex_digit1
        .try_map(|s| u8::from_str_radix(s, 16))
        .parse_next(i)
}
