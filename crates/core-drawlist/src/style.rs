//! Builder-side style model and its wire encoding.
//!
//! A `Style` expresses overrides only: unset colors and empty attribute sets
//! encode as zero words, and a style that overrides nothing is a no-op for
//! fill operations. Link refs are not part of `Style`; the builder carries
//! an active-link context (OSC 8 semantics) and injects the interned refs at
//! encode time.

use core_protocol::drawlist::{
    COLOR_SET, UNDERLINE_DASHED, UNDERLINE_DOTTED, UNDERLINE_DOUBLE, UNDERLINE_CURLY,
    UNDERLINE_STRAIGHT,
};
use core_protocol::StyleWire;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Wire form: presence bit plus 0xRRGGBB.
    fn packed(self) -> u32 {
        COLOR_SET | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }
}

bitflags::bitflags! {
    /// Cell attribute bits, wire-stable.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct StyleAttrs: u32 {
        const BOLD          = 1 << 0;
        const ITALIC        = 1 << 1;
        const UNDERLINE     = 1 << 2;
        const INVERSE       = 1 << 3;
        const DIM           = 1 << 4;
        const STRIKETHROUGH = 1 << 5;
        const OVERLINE      = 1 << 6;
        const BLINK         = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnderlineStyle {
    Straight,
    Double,
    Curly,
    Dotted,
    Dashed,
}

impl UnderlineStyle {
    fn wire(self) -> u32 {
        match self {
            UnderlineStyle::Straight => UNDERLINE_STRAIGHT,
            UnderlineStyle::Double => UNDERLINE_DOUBLE,
            UnderlineStyle::Curly => UNDERLINE_CURLY,
            UnderlineStyle::Dotted => UNDERLINE_DOTTED,
            UnderlineStyle::Dashed => UNDERLINE_DASHED,
        }
    }
}

/// Interned link refs from the builder's active-link context. Both zero
/// means "no link".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkRefs {
    pub uri: u32,
    pub id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    pub fg: Option<Rgb>,
    pub bg: Option<Rgb>,
    pub attrs: StyleAttrs,
    pub underline_style: Option<UnderlineStyle>,
    pub underline_color: Option<Rgb>,
}

impl Style {
    pub fn to_wire(&self, link: LinkRefs) -> StyleWire {
        StyleWire {
            fg: self.fg.map(Rgb::packed).unwrap_or(0),
            bg: self.bg.map(Rgb::packed).unwrap_or(0),
            attrs: self.attrs.bits(),
            reserved: self.underline_style.map(UnderlineStyle::wire).unwrap_or(0),
            underline_rgb: self.underline_color.map(Rgb::packed).unwrap_or(0),
            link_uri_ref: link.uri,
            link_id_ref: link.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_style_encodes_empty() {
        assert!(Style::default().to_wire(LinkRefs::default()).is_empty());
    }

    #[test]
    fn active_link_makes_style_nonempty() {
        let wire = Style::default().to_wire(LinkRefs { uri: 4, id: 0 });
        assert!(!wire.is_empty());
        assert_eq!(wire.link_uri_ref, 4);
    }

    #[test]
    fn color_packing_sets_presence_bit() {
        let s = Style {
            fg: Some(Rgb::new(0xFF, 0x88, 0x00)),
            ..Style::default()
        };
        let wire = s.to_wire(LinkRefs::default());
        assert_eq!(wire.fg, COLOR_SET | 0xFF8800);
        assert_eq!(wire.bg, 0);
    }

    #[test]
    fn underline_style_lands_in_reserved_word() {
        let s = Style {
            attrs: StyleAttrs::UNDERLINE,
            underline_style: Some(UnderlineStyle::Curly),
            underline_color: Some(Rgb::new(0, 255, 0)),
            ..Style::default()
        };
        let wire = s.to_wire(LinkRefs::default());
        assert_eq!(wire.underline_style(), UNDERLINE_CURLY);
        assert_eq!(wire.attrs, StyleAttrs::UNDERLINE.bits());
        assert_eq!(wire.underline_rgb, COLOR_SET | 0x00FF00);
    }
}
