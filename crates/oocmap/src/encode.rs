//! The encode protocol: a host value graph in, a 9-byte record out, with
//! every payload that does not fit inline routed to its table.
//!
//! Mutable containers get a random id allocated up front and are memoized
//! under their identity before their children are encoded, so
//! self-references resolve to the already-allocated id instead of recursing
//! forever. Immutable payloads are content-addressed through
//! [`put_immutable`], which in read-only mode turns writes into lookups.

use num_bigint::Sign;
use num_traits::Zero;
use tracing::trace;

use lmdb::Database;
use oocmap_core::{num, text, type_code, EncodedValue, TextWidth};

use crate::db::{put_immutable, Txn};
use crate::error::{OocMapError, Result};
use crate::map::OocMap;
use crate::tables::{dict_header_key, dict_item_key, list_key, list_length_key};
use crate::value::Value;

/// What an encode is allowed to do.
///
/// `deny_mutable` enforces hashable-key semantics: lists and dicts (and
/// their handles) are rejected. `deny_writes` turns every side-effectful
/// branch into a lookup, so read-side key encodes can prove absence instead
/// of accidentally inserting.
#[derive(Clone, Copy, Default)]
pub(crate) struct EncodePolicy {
    pub deny_mutable: bool,
    pub deny_writes: bool,
}

impl EncodePolicy {
    pub(crate) const DEFAULT: EncodePolicy = EncodePolicy {
        deny_mutable: false,
        deny_writes: false,
    };

    /// For dict keys on the write path.
    pub(crate) const HASHABLE: EncodePolicy = EncodePolicy {
        deny_mutable: true,
        deny_writes: false,
    };

    /// For keys on the read path: hashable, and must already exist.
    pub(crate) const LOOKUP: EncodePolicy = EncodePolicy {
        deny_mutable: true,
        deny_writes: true,
    };
}

pub(crate) fn encode(
    map: &OocMap,
    value: &Value,
    txn: &mut Txn<'_>,
    policy: EncodePolicy,
) -> Result<EncodedValue> {
    if let Some(identity) = value.memo_identity() {
        if let Some(encoded) = txn.memo.get(identity) {
            return Ok(encoded);
        }
    }

    let tables = *map.tables();
    match value {
        Value::None => Ok(EncodedValue::NONE),
        Value::Bool(true) => Ok(EncodedValue::TRUE),
        Value::Bool(false) => Ok(EncodedValue::FALSE),
        Value::Int(0) => Ok(EncodedValue::INT_ZERO),
        Value::Int(n) => Ok(encode_i64(*n)),
        Value::BigInt(n) => {
            if n.is_zero() {
                return Ok(EncodedValue::INT_ZERO);
            }
            let (sign, magnitude) = n.to_bytes_le();
            encode_magnitude(txn, tables.ints, sign == Sign::Minus, &magnitude, policy)
        }
        Value::Float(f) => Ok(EncodedValue::from_u64(type_code::FLOAT, f.to_bits())),
        Value::Str(s) => {
            let encoded = encode_str(txn, tables.strings, s, policy)?;
            memoize(txn, value, encoded);
            Ok(encoded)
        }
        Value::Tuple(items) => {
            let encoded = if items.is_empty() {
                EncodedValue::EMPTY_TUPLE
            } else {
                let mut packed = Vec::with_capacity(items.len() * EncodedValue::SIZE);
                for item in items.iter() {
                    let encoded_item = encode(map, item, txn, policy)?;
                    packed.extend_from_slice(&encoded_item.to_bytes());
                }
                let hash = put_immutable(
                    txn,
                    tables.tuples,
                    &packed,
                    type_code::TUPLE,
                    policy.deny_writes,
                )?;
                EncodedValue::from_u64(type_code::TUPLE, hash)
            };
            memoize(txn, value, encoded);
            Ok(encoded)
        }
        Value::List(cell) => {
            if policy.deny_mutable {
                return Err(OocMapError::MutableValueNotAllowed);
            }
            if policy.deny_writes {
                return Err(OocMapError::WriteNotAllowed);
            }
            let items = cell.borrow();
            let list_id = allocate_list_id(txn, tables.lists, items.len() as u32)?;
            let encoded = EncodedValue::list_ref(list_id);
            // Memoize before the children: the list may contain itself.
            memoize(txn, value, encoded);
            let written: Result<()> = (|| {
                for (index, item) in items.iter().enumerate() {
                    let encoded_item = encode(map, item, txn, policy)?;
                    txn.put(
                        tables.lists,
                        &list_key(list_id, index as u32),
                        &encoded_item.to_bytes(),
                    )?;
                }
                Ok(())
            })();
            finish_container(txn, value, encoded, written)
        }
        Value::Dict(cell) => {
            if policy.deny_mutable {
                return Err(OocMapError::MutableValueNotAllowed);
            }
            if policy.deny_writes {
                return Err(OocMapError::WriteNotAllowed);
            }
            let entries = cell.borrow();
            let dict_id = allocate_dict_id(txn, tables.dicts, entries.len() as u64)?;
            let encoded = EncodedValue::dict_ref(dict_id);
            memoize(txn, value, encoded);
            let written: Result<()> = (|| {
                for (entry_key, entry_value) in entries.iter() {
                    let encoded_key = encode(map, entry_key, txn, EncodePolicy::HASHABLE)?;
                    let encoded_value = encode(map, entry_value, txn, policy)?;
                    txn.put(
                        tables.dicts,
                        &dict_item_key(dict_id, &encoded_key),
                        &encoded_value.to_bytes(),
                    )?;
                }
                Ok(())
            })();
            finish_container(txn, value, encoded, written)
        }
        Value::LazyTuple(handle) => {
            if map.same_store(handle.map()) {
                return Ok(EncodedValue::from_u64(type_code::TUPLE, handle.id()));
            }
            if policy.deny_writes {
                return Err(OocMapError::WriteNotAllowed);
            }
            // Foreign handle: materialize from its own store, then encode
            // the native form into this one.
            let eager = Value::Tuple(handle.eager()?);
            encode(
                map,
                &eager,
                txn,
                EncodePolicy {
                    deny_mutable: policy.deny_mutable,
                    deny_writes: false,
                },
            )
        }
        Value::LazyList(handle) => {
            if policy.deny_mutable {
                return Err(OocMapError::MutableValueNotAllowed);
            }
            if map.same_store(handle.map()) {
                return Ok(EncodedValue::list_ref(handle.id()));
            }
            if policy.deny_writes {
                return Err(OocMapError::WriteNotAllowed);
            }
            let eager = Value::list(handle.eager()?);
            encode(map, &eager, txn, EncodePolicy::DEFAULT)
        }
        Value::LazyDict(handle) => {
            if policy.deny_mutable {
                return Err(OocMapError::MutableValueNotAllowed);
            }
            if map.same_store(handle.map()) {
                return Ok(EncodedValue::dict_ref(handle.id()));
            }
            if policy.deny_writes {
                return Err(OocMapError::WriteNotAllowed);
            }
            let eager = Value::Dict(std::rc::Rc::new(std::cell::RefCell::new(handle.eager()?)));
            encode(map, &eager, txn, EncodePolicy::DEFAULT)
        }
    }
}

fn memoize(txn: &mut Txn<'_>, value: &Value, encoded: EncodedValue) {
    if let Some(identity) = value.memo_identity() {
        txn.memo.insert(identity, value, encoded);
    }
}

/// Drop the memo slot again if writing a container's children failed, so a
/// later retry does not resolve to a half-written id.
fn finish_container(
    txn: &mut Txn<'_>,
    value: &Value,
    encoded: EncodedValue,
    written: Result<()>,
) -> Result<EncodedValue> {
    match written {
        Ok(()) => Ok(encoded),
        Err(e) => {
            if let Some(identity) = value.memo_identity() {
                txn.memo.remove(identity);
            }
            Err(e)
        }
    }
}

fn encode_i64(n: i64) -> EncodedValue {
    debug_assert!(n != 0);
    let (buf, len) = num::u64_magnitude(n.unsigned_abs());
    let code = if n < 0 {
        type_code::SHORT_NEGATIVE_INT
    } else {
        type_code::SHORT_POSITIVE_INT
    };
    EncodedValue::from_inline(code, &buf[..len])
}

fn encode_magnitude(
    txn: &mut Txn<'_>,
    ints: Database,
    negative: bool,
    magnitude: &[u8],
    policy: EncodePolicy,
) -> Result<EncodedValue> {
    if magnitude.len() <= 8 {
        let code = if negative {
            type_code::SHORT_NEGATIVE_INT
        } else {
            type_code::SHORT_POSITIVE_INT
        };
        return Ok(EncodedValue::from_inline(code, magnitude));
    }
    let code = if negative {
        type_code::LONG_NEGATIVE_INT
    } else {
        type_code::LONG_POSITIVE_INT
    };
    let hash = put_immutable(txn, ints, magnitude, code, policy.deny_writes)?;
    Ok(EncodedValue::from_u64(code, hash))
}

fn encode_str(
    txn: &mut Txn<'_>,
    strings: Database,
    s: &str,
    policy: EncodePolicy,
) -> Result<EncodedValue> {
    if s.is_empty() {
        return Ok(EncodedValue::EMPTY_TEXT);
    }
    let width = text::width_for(s);
    let short_code = match width {
        TextWidth::One => type_code::TEXT_SHORT_1,
        TextWidth::Two => type_code::TEXT_SHORT_2,
        TextWidth::Four => type_code::TEXT_SHORT_4,
    };
    let units = text::encode_units(s, width);
    if units.len() <= 8 {
        return Ok(EncodedValue::from_inline(short_code, &units));
    }
    let code = short_code + type_code::TEXT_LONG_OFFSET;
    let hash = put_immutable(txn, strings, &units, code, policy.deny_writes)?;
    Ok(EncodedValue::from_u64(code, hash))
}

/// Draw random u32 ids until one is free, claiming it by writing the list's
/// length sentinel. Collisions just redraw; at realistic list counts they
/// are rare enough that this terminates quickly.
fn allocate_list_id(txn: &mut Txn<'_>, lists: Database, length: u32) -> Result<u32> {
    loop {
        let id: u32 = rand::random();
        if txn.try_put_new(lists, &list_length_key(id), &length.to_le_bytes())? {
            return Ok(id);
        }
        trace!(id, "list id already taken, redrawing");
    }
}

fn allocate_dict_id(txn: &mut Txn<'_>, dicts: Database, length: u64) -> Result<u32> {
    loop {
        let id: u32 = rand::random();
        if txn.try_put_new(dicts, &dict_header_key(id), &length.to_le_bytes())? {
            return Ok(id);
        }
        trace!(id, "dict id already taken, redrawing");
    }
}
