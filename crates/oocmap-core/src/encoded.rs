//! The 9-byte universal record.
//!
//! Every value stored anywhere in an oocmap environment is one of these:
//! eight payload bytes (raw inline data, a 64-bit number, a content hash, or
//! a container id) followed by one tag byte. The tag packs a 5-bit type code
//! in the low bits and, for inline payloads, the payload length minus one in
//! the high three bits. A length field of zero doubles as "the payload is a
//! reference, not inline data".

use crate::error::FormatError;

/// Type codes (the low 5 bits of the tag byte).
pub mod type_code {
    pub const HARDCODED: u8 = 0;
    pub const SHORT_POSITIVE_INT: u8 = 1;
    pub const SHORT_NEGATIVE_INT: u8 = 2;
    pub const LONG_POSITIVE_INT: u8 = 3;
    pub const LONG_NEGATIVE_INT: u8 = 4;
    pub const FLOAT: u8 = 5;
    /// Legacy wide code units, pinned at format level to 4-byte units.
    /// Accepted on read, never produced.
    pub const TEXT_SHORT_WIDE: u8 = 6;
    pub const TEXT_SHORT_1: u8 = 7;
    pub const TEXT_SHORT_2: u8 = 8;
    pub const TEXT_SHORT_4: u8 = 9;
    pub const TEXT_LONG_WIDE: u8 = 10;
    pub const TEXT_LONG_1: u8 = 11;
    pub const TEXT_LONG_2: u8 = 12;
    pub const TEXT_LONG_4: u8 = 13;
    pub const TUPLE: u8 = 14;
    pub const LIST: u8 = 15;
    pub const DICT: u8 = 16;
    // Reserved for value kinds the format names but does not support yet.
    pub const SET: u8 = 17;
    pub const COMPLEX: u8 = 18;
    pub const BYTES: u8 = 19;
    pub const BYTEARRAY: u8 = 20;

    /// Distance from a short text code to its spilled-to-table counterpart.
    pub const TEXT_LONG_OFFSET: u8 = TEXT_LONG_WIDE - TEXT_SHORT_WIDE;
}

/// Discriminators for [`type_code::HARDCODED`] records, carried in the
/// payload as a little-endian u64.
pub mod hardcoded {
    /// All-zero record. Never stored; only ever a freshly-reserved memo slot.
    pub const UNINITIALIZED: u64 = 0;
    pub const NONE: u64 = 1;
    pub const INT_ZERO: u64 = 2;
    pub const TRUE: u64 = 3;
    pub const FALSE: u64 = 4;
    pub const EMPTY_TUPLE: u64 = 5;
    pub const EMPTY_TEXT: u64 = 6;
}

/// The list index reserved for the record that stores a list's length.
/// No item may ever sit at this index, so lists top out at 2^32 - 1 items.
pub const LIST_LENGTH_INDEX: u32 = u32::MAX;

const TYPE_CODE_MASK: u8 = 0x1F;
const LENGTH_SHIFT: u32 = 5;

/// The 9-byte on-disk representation of any value.
///
/// Equality and hashing cover all nine bytes, so two records are equal
/// exactly when their stored form is identical.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EncodedValue {
    payload: [u8; 8],
    tag: u8,
}

impl EncodedValue {
    pub const SIZE: usize = 9;

    pub const UNINITIALIZED: EncodedValue = EncodedValue::from_hardcoded(hardcoded::UNINITIALIZED);
    pub const NONE: EncodedValue = EncodedValue::from_hardcoded(hardcoded::NONE);
    pub const INT_ZERO: EncodedValue = EncodedValue::from_hardcoded(hardcoded::INT_ZERO);
    pub const TRUE: EncodedValue = EncodedValue::from_hardcoded(hardcoded::TRUE);
    pub const FALSE: EncodedValue = EncodedValue::from_hardcoded(hardcoded::FALSE);
    pub const EMPTY_TUPLE: EncodedValue = EncodedValue::from_hardcoded(hardcoded::EMPTY_TUPLE);
    pub const EMPTY_TEXT: EncodedValue = EncodedValue::from_hardcoded(hardcoded::EMPTY_TEXT);

    pub const fn from_hardcoded(discriminator: u64) -> Self {
        Self::from_u64(type_code::HARDCODED, discriminator)
    }

    /// A record whose payload is a 64-bit number (a content hash, a float's
    /// bit pattern, or a hardcoded discriminator). The length field is zero.
    pub const fn from_u64(code: u8, value: u64) -> Self {
        Self {
            payload: value.to_le_bytes(),
            tag: code,
        }
    }

    /// A record with 1..=8 inline payload bytes; the rest are zeroed.
    pub fn from_inline(code: u8, bytes: &[u8]) -> Self {
        debug_assert!(!bytes.is_empty() && bytes.len() <= 8);
        let mut payload = [0u8; 8];
        payload[..bytes.len()].copy_from_slice(bytes);
        Self {
            payload,
            tag: code | (((bytes.len() - 1) as u8) << LENGTH_SHIFT),
        }
    }

    /// A reference to a whole list: the id in the high half, the length
    /// sentinel index in the low half.
    pub fn list_ref(list_id: u32) -> Self {
        Self::from_u64(
            type_code::LIST,
            ((list_id as u64) << 32) | LIST_LENGTH_INDEX as u64,
        )
    }

    /// A reference to a whole dict: the id in the low half, high half zero.
    pub fn dict_ref(dict_id: u32) -> Self {
        Self::from_u64(type_code::DICT, dict_id as u64)
    }

    pub fn type_code(&self) -> u8 {
        self.tag & TYPE_CODE_MASK
    }

    /// Inline payload length in bytes. Only meaningful for inline records.
    pub fn inline_len(&self) -> usize {
        ((self.tag >> LENGTH_SHIFT) as usize) + 1
    }

    pub fn inline_bytes(&self) -> &[u8] {
        &self.payload[..self.inline_len()]
    }

    pub fn as_u64(&self) -> u64 {
        u64::from_le_bytes(self.payload)
    }

    pub fn as_f64(&self) -> f64 {
        f64::from_le_bytes(self.payload)
    }

    pub fn list_id(&self) -> u32 {
        (self.as_u64() >> 32) as u32
    }

    pub fn list_index(&self) -> u32 {
        self.as_u64() as u32
    }

    pub fn dict_id(&self) -> u32 {
        self.as_u64() as u32
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..8].copy_from_slice(&self.payload);
        out[8] = self.tag;
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() != Self::SIZE {
            return Err(FormatError::BadRecordLength {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        let mut payload = [0u8; 8];
        payload.copy_from_slice(&bytes[..8]);
        Ok(Self {
            payload,
            tag: bytes[8],
        })
    }
}
