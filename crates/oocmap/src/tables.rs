//! The six named tables of an environment, and their key layouts.
//!
//! - `root`: 9-byte encoded key -> 9-byte encoded value
//! - `ints`, `strings`, `tuples`: u64 content hash -> payload bytes
//! - `lists`: u64 `(listId << 32) | listIndex` -> 9-byte item
//!   (index `u32::MAX` holds the u32 length instead)
//! - `dicts`: 4-byte id -> u64 length header, and 13-byte `(id, encoded key)`
//!   -> 9-byte item, in one table
//!
//! Hash- and list-keyed tables use the store's native integer-key mode, so
//! keys are compared as native u64s: one list's items stay contiguous and
//! ordered by index, with the length sentinel at the high end, on any byte
//! order.

use lmdb::{Database, DatabaseFlags, Environment};

use oocmap_core::{EncodedValue, LIST_LENGTH_INDEX};

use crate::error::{OocMapError, Result};

pub(crate) const ROOT: &str = "root";
pub(crate) const INTS: &str = "ints";
pub(crate) const STRINGS: &str = "strings";
pub(crate) const LISTS: &str = "lists";
pub(crate) const TUPLES: &str = "tuples";
pub(crate) const DICTS: &str = "dicts";

#[derive(Clone, Copy)]
pub(crate) struct Tables {
    pub root: Database,
    pub ints: Database,
    pub strings: Database,
    pub lists: Database,
    pub tuples: Database,
    pub dicts: Database,
}

impl Tables {
    /// Open all six tables, creating them on first use.
    pub(crate) fn open(env: &Environment) -> Result<Self> {
        Ok(Tables {
            root: env.create_db(Some(ROOT), DatabaseFlags::empty())?,
            ints: env.create_db(Some(INTS), DatabaseFlags::INTEGER_KEY)?,
            strings: env.create_db(Some(STRINGS), DatabaseFlags::INTEGER_KEY)?,
            lists: env.create_db(Some(LISTS), DatabaseFlags::INTEGER_KEY)?,
            tuples: env.create_db(Some(TUPLES), DatabaseFlags::INTEGER_KEY)?,
            dicts: env.create_db(Some(DICTS), DatabaseFlags::empty())?,
        })
    }
}

/// Key of one list item (or, at [`LIST_LENGTH_INDEX`], the length sentinel).
pub(crate) fn list_key(list_id: u32, index: u32) -> [u8; 8] {
    (((list_id as u64) << 32) | index as u64).to_ne_bytes()
}

pub(crate) fn list_length_key(list_id: u32) -> [u8; 8] {
    list_key(list_id, LIST_LENGTH_INDEX)
}

/// Key of a content-hashed entry in `ints`, `strings` or `tuples`.
pub(crate) fn hash_key(hash: u64) -> [u8; 8] {
    hash.to_ne_bytes()
}

/// Key of a dict's length header.
pub(crate) fn dict_header_key(dict_id: u32) -> [u8; 4] {
    dict_id.to_le_bytes()
}

/// Key of one dict item: the 4-byte id followed by the 9-byte encoded key.
pub(crate) fn dict_item_key(dict_id: u32, key: &EncodedValue) -> [u8; 13] {
    let mut out = [0u8; 13];
    out[..4].copy_from_slice(&dict_id.to_le_bytes());
    out[4..].copy_from_slice(&key.to_bytes());
    out
}

/// Split a raw dict-item key back into id and encoded key.
pub(crate) fn split_dict_item_key(raw: &[u8]) -> Result<(u32, EncodedValue)> {
    if raw.len() != 13 {
        return Err(OocMapError::UnexpectedData);
    }
    let id = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
    let key = EncodedValue::from_bytes(&raw[4..])?;
    Ok((id, key))
}

/// Read the u32 length out of a list sentinel record.
pub(crate) fn list_length_value(raw: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = raw.try_into().map_err(|_| OocMapError::UnexpectedData)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Read the u64 length out of a dict header record.
pub(crate) fn dict_length_value(raw: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = raw.try_into().map_err(|_| OocMapError::UnexpectedData)?;
    Ok(u64::from_le_bytes(bytes))
}
