//! The decode protocol: a 9-byte record in, a host value out.
//!
//! Pure dispatch on the 5-bit type code; reads, never writes. Scalars come
//! back eagerly (short variants from the inline bytes, long variants from
//! their table). Composites come back as lazy handles carrying only the
//! store and an id, so reading a deeply nested collection costs the same as
//! reading a scalar. Cycles never recurse, because nothing is followed
//! until it is asked for.

use num_bigint::{BigInt, Sign};
use oocmap_core::{hardcoded, text, type_code, EncodedValue, FormatError, TextWidth};

use crate::db::Txn;
use crate::dict::LazyDict;
use crate::error::{OocMapError, Result};
use crate::list::LazyList;
use crate::map::OocMap;
use crate::tables::hash_key;
use crate::tuple::LazyTuple;
use crate::value::Value;

pub(crate) fn decode(map: &OocMap, encoded: &EncodedValue, txn: &Txn<'_>) -> Result<Value> {
    let tables = *map.tables();
    match encoded.type_code() {
        type_code::HARDCODED => match encoded.as_u64() {
            hardcoded::NONE => Ok(Value::None),
            hardcoded::INT_ZERO => Ok(Value::Int(0)),
            hardcoded::TRUE => Ok(Value::Bool(true)),
            hardcoded::FALSE => Ok(Value::Bool(false)),
            hardcoded::EMPTY_TUPLE => Ok(Value::tuple(Vec::new())),
            hardcoded::EMPTY_TEXT => Ok(Value::from("")),
            other => Err(FormatError::UnknownHardcodedValue(other).into()),
        },
        type_code::SHORT_POSITIVE_INT => int_from_magnitude(false, encoded.inline_bytes()),
        type_code::SHORT_NEGATIVE_INT => int_from_magnitude(true, encoded.inline_bytes()),
        type_code::LONG_POSITIVE_INT | type_code::LONG_NEGATIVE_INT => {
            let negative = encoded.type_code() == type_code::LONG_NEGATIVE_INT;
            let magnitude = txn
                .get(tables.ints, &hash_key(encoded.as_u64()))?
                .ok_or(OocMapError::UnexpectedData)?;
            int_from_magnitude(negative, magnitude)
        }
        type_code::FLOAT => Ok(Value::Float(encoded.as_f64())),
        type_code::TEXT_SHORT_WIDE
        | type_code::TEXT_SHORT_1
        | type_code::TEXT_SHORT_2
        | type_code::TEXT_SHORT_4 => {
            let width = text_width(encoded.type_code());
            let s = text::decode_units(encoded.inline_bytes(), width)?;
            Ok(Value::from(s))
        }
        type_code::TEXT_LONG_WIDE
        | type_code::TEXT_LONG_1
        | type_code::TEXT_LONG_2
        | type_code::TEXT_LONG_4 => {
            let width = text_width(encoded.type_code());
            let units = txn
                .get(tables.strings, &hash_key(encoded.as_u64()))?
                .ok_or(OocMapError::UnexpectedData)?;
            Ok(Value::from(text::decode_units(units, width)?))
        }
        type_code::TUPLE => Ok(Value::LazyTuple(LazyTuple::new(
            map.clone(),
            encoded.as_u64(),
        ))),
        type_code::LIST => Ok(Value::LazyList(LazyList::new(
            map.clone(),
            encoded.list_id(),
        ))),
        type_code::DICT => Ok(Value::LazyDict(LazyDict::new(
            map.clone(),
            encoded.dict_id(),
        ))),
        type_code::SET => Err(FormatError::UnsupportedKind("set").into()),
        type_code::COMPLEX => Err(FormatError::UnsupportedKind("complex").into()),
        type_code::BYTES => Err(FormatError::UnsupportedKind("bytes").into()),
        type_code::BYTEARRAY => Err(FormatError::UnsupportedKind("bytearray").into()),
        other => Err(FormatError::UnknownTypeCode(other).into()),
    }
}

/// Code-unit width carried by a text type code. The legacy wide codes are
/// pinned to 4-byte units.
fn text_width(code: u8) -> TextWidth {
    match code {
        type_code::TEXT_SHORT_1 | type_code::TEXT_LONG_1 => TextWidth::One,
        type_code::TEXT_SHORT_2 | type_code::TEXT_LONG_2 => TextWidth::Two,
        _ => TextWidth::Four,
    }
}

/// Rebuild an integer from its sign and trimmed little-endian magnitude,
/// using the machine word when it fits and a big integer otherwise.
fn int_from_magnitude(negative: bool, magnitude: &[u8]) -> Result<Value> {
    if magnitude.is_empty() {
        // Zero is a hardcoded singleton; an empty magnitude is corruption.
        return Err(OocMapError::UnexpectedData);
    }
    if let Some(value) = oocmap_core::num::u64_from_magnitude(magnitude) {
        if !negative && value <= i64::MAX as u64 {
            return Ok(Value::Int(value as i64));
        }
        if negative && value <= (i64::MAX as u64) + 1 {
            return Ok(Value::Int((-(value as i128)) as i64));
        }
    }
    let sign = if negative { Sign::Minus } else { Sign::Plus };
    Ok(Value::from(BigInt::from_bytes_le(sign, magnitude)))
}
