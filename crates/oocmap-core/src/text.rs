//! String code-unit codec.
//!
//! Strings are stored as fixed-width code units, with the width chosen from
//! content: 1-byte units if every scalar value fits a byte, 2-byte units if
//! everything sits in the basic plane, 4-byte units otherwise. Units are
//! little-endian. The width is carried by the type code and preserved
//! through storage; whether the payload lives inline or in the strings
//! table is purely a length decision made elsewhere.

use crate::error::FormatError;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TextWidth {
    One,
    Two,
    Four,
}

impl TextWidth {
    pub fn bytes(self) -> usize {
        match self {
            TextWidth::One => 1,
            TextWidth::Two => 2,
            TextWidth::Four => 4,
        }
    }
}

/// The narrowest width that can represent every scalar in `s`.
pub fn width_for(s: &str) -> TextWidth {
    let mut width = TextWidth::One;
    for c in s.chars() {
        let cp = c as u32;
        if cp > 0xFFFF {
            return TextWidth::Four;
        }
        if cp > 0xFF {
            width = TextWidth::Two;
        }
    }
    width
}

pub fn encode_units(s: &str, width: TextWidth) -> Vec<u8> {
    match width {
        TextWidth::One => s.chars().map(|c| c as u8).collect(),
        TextWidth::Two => s
            .chars()
            .flat_map(|c| (c as u16).to_le_bytes())
            .collect(),
        TextWidth::Four => s
            .chars()
            .flat_map(|c| (c as u32).to_le_bytes())
            .collect(),
    }
}

pub fn decode_units(bytes: &[u8], width: TextWidth) -> Result<String, FormatError> {
    let unit = width.bytes();
    if bytes.len() % unit != 0 {
        return Err(FormatError::MisalignedText {
            len: bytes.len(),
            width: unit,
        });
    }
    match width {
        TextWidth::One => Ok(bytes.iter().map(|&b| b as char).collect()),
        TextWidth::Two => bytes
            .chunks_exact(2)
            .map(|c| {
                let cp = u16::from_le_bytes([c[0], c[1]]) as u32;
                char::from_u32(cp).ok_or(FormatError::InvalidCodeUnit(cp))
            })
            .collect(),
        TextWidth::Four => bytes
            .chunks_exact(4)
            .map(|c| {
                let cp = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                char::from_u32(cp).ok_or(FormatError::InvalidCodeUnit(cp))
            })
            .collect(),
    }
}
