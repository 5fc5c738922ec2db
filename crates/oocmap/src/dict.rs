//! Lazy handle for stored dicts.
//!
//! One table holds two record shapes: a 4-byte header key carrying the
//! dict's length, and 13-byte `(dictId, encodedKey)` keys carrying the
//! items. Because the header key is a strict prefix of every item key, a
//! dict's header and items sit next to each other, and iteration is a walk
//! from the header until the id prefix changes.

use std::collections::HashMap;

use lmdb_sys as ffi;
use oocmap_core::EncodedValue;

use crate::db::{cursor_get, IterTxn, Txn};
use crate::decode::decode;
use crate::encode::{encode, EncodePolicy};
use crate::error::{OocMapError, Result};
use crate::map::OocMap;
use crate::tables::{dict_header_key, dict_item_key, dict_length_value, split_dict_item_key};
use crate::value::Value;

#[derive(Clone, Debug)]
pub struct LazyDict {
    map: OocMap,
    dict_id: u32,
}

impl LazyDict {
    pub(crate) fn new(map: OocMap, dict_id: u32) -> Self {
        LazyDict { map, dict_id }
    }

    pub fn id(&self) -> u32 {
        self.dict_id
    }

    pub(crate) fn map(&self) -> &OocMap {
        &self.map
    }

    pub(crate) fn same_identity(&self, other: &LazyDict) -> bool {
        self.map.same_store(&other.map) && self.dict_id == other.dict_id
    }

    pub(crate) fn identity(&self) -> (usize, u32) {
        (self.map.store_address(), self.dict_id)
    }

    fn len_in(&self, txn: &Txn<'_>) -> Result<u64> {
        let raw = txn
            .get(self.map.tables().dicts, &dict_header_key(self.dict_id))?
            .ok_or(OocMapError::UnexpectedData)?;
        dict_length_value(raw)
    }

    fn write_len(&self, txn: &mut Txn<'_>, length: u64) -> Result<()> {
        txn.put(
            self.map.tables().dicts,
            &dict_header_key(self.dict_id),
            &length.to_le_bytes(),
        )
    }

    /// Encode a key for the read path, translating the encode errors into
    /// what they mean at a lookup boundary. `Ok(None)` means the key
    /// provably cannot be in this dict.
    fn encode_lookup_key(
        &self,
        key: &Value,
        txn: &mut Txn<'_>,
    ) -> Result<Option<EncodedValue>> {
        match encode(&self.map, key, txn, EncodePolicy::LOOKUP) {
            Ok(encoded) => Ok(Some(encoded)),
            Err(OocMapError::MutableValueNotAllowed) => {
                Err(OocMapError::Unhashable(key.kind_name()))
            }
            Err(e) if e.proves_absence() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn len(&self) -> Result<usize> {
        let txn = Txn::begin(self.map.env(), false)?;
        let len = self.len_in(&txn)?;
        txn.commit()?;
        Ok(len as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, key: &Value) -> Result<Value> {
        let mut txn = Txn::begin(self.map.env(), false)?;
        let encoded_key = match self.encode_lookup_key(key, &mut txn)? {
            Some(encoded) => encoded,
            None => {
                txn.abort();
                return Err(key_not_found(key));
            }
        };
        let raw = txn
            .get(
                self.map.tables().dicts,
                &dict_item_key(self.dict_id, &encoded_key),
            )?
            .ok_or_else(|| key_not_found(key))?;
        let encoded_value = EncodedValue::from_bytes(raw)?;
        let value = decode(&self.map, &encoded_value, &txn)?;
        txn.commit()?;
        Ok(value)
    }

    /// Insert or overwrite. Writing a value whose encoding matches the
    /// stored one byte for byte is a no-op.
    pub fn insert(&self, key: &Value, value: &Value) -> Result<()> {
        let mut txn = Txn::begin(self.map.env(), true)?;
        let encoded_key = match encode(&self.map, key, &mut txn, EncodePolicy::HASHABLE) {
            Ok(encoded) => encoded,
            Err(OocMapError::MutableValueNotAllowed) => {
                return Err(OocMapError::Unhashable(key.kind_name()))
            }
            Err(e) => return Err(e),
        };
        let item_key = dict_item_key(self.dict_id, &encoded_key);
        let existing = match txn.get(self.map.tables().dicts, &item_key)? {
            Some(raw) => Some(EncodedValue::from_bytes(raw)?),
            None => None,
        };
        let encoded_value = encode(&self.map, value, &mut txn, EncodePolicy::DEFAULT)?;
        match existing {
            None => {
                txn.put(self.map.tables().dicts, &item_key, &encoded_value.to_bytes())?;
                let len = self.len_in(&txn)?;
                self.write_len(&mut txn, len + 1)?;
            }
            Some(old) if old == encoded_value => {}
            Some(_) => {
                txn.put(self.map.tables().dicts, &item_key, &encoded_value.to_bytes())?;
            }
        }
        txn.commit()
    }

    /// Remove a key, reporting whether it was present. The key is encoded
    /// in read-only mode, so removing a never-stored key writes nothing.
    pub fn remove(&self, key: &Value) -> Result<bool> {
        let mut txn = Txn::begin(self.map.env(), true)?;
        let encoded_key = match self.encode_lookup_key(key, &mut txn)? {
            Some(encoded) => encoded,
            None => {
                txn.abort();
                return Ok(false);
            }
        };
        let removed = txn.del(
            self.map.tables().dicts,
            &dict_item_key(self.dict_id, &encoded_key),
        )?;
        if removed {
            let len = self.len_in(&txn)?;
            self.write_len(&mut txn, len - 1)?;
        }
        txn.commit()?;
        Ok(removed)
    }

    pub fn contains(&self, key: &Value) -> Result<bool> {
        let mut txn = Txn::begin(self.map.env(), false)?;
        let encoded_key = match self.encode_lookup_key(key, &mut txn)? {
            Some(encoded) => encoded,
            None => {
                txn.abort();
                return Ok(false);
            }
        };
        let present = txn
            .get(
                self.map.tables().dicts,
                &dict_item_key(self.dict_id, &encoded_key),
            )?
            .is_some();
        txn.commit()?;
        Ok(present)
    }

    /// Materialize into a native map.
    pub fn eager(&self) -> Result<HashMap<Value, Value>> {
        let txn = Txn::begin(self.map.env(), false)?;
        let result = self.eager_in(&txn)?;
        txn.commit()?;
        Ok(result)
    }

    pub(crate) fn eager_in(&self, txn: &Txn<'_>) -> Result<HashMap<Value, Value>> {
        let mut out = HashMap::new();
        let header = dict_header_key(self.dict_id);
        let cursor = txn.ro_cursor(self.map.tables().dicts)?;
        if cursor_get(&cursor, Some(&header[..]), ffi::MDB_SET_KEY)?.is_none() {
            return Err(OocMapError::UnexpectedData);
        }
        loop {
            let (raw_key, raw_value) = match cursor_get(&cursor, None, ffi::MDB_NEXT)? {
                Some(record) => record,
                None => break,
            };
            if raw_key.len() < 4 || raw_key[..4] != header[..] {
                break;
            }
            let (_, encoded_key) = split_dict_item_key(raw_key)?;
            let encoded_value = EncodedValue::from_bytes(raw_value)?;
            let key = decode(&self.map, &encoded_key, txn)?;
            let value = decode(&self.map, &encoded_value, txn)?;
            out.insert(key, value);
        }
        Ok(out)
    }

    /// Iterate `(key, value)` pairs under one read transaction.
    pub fn iter(&self) -> Result<LazyDictIter> {
        LazyDictIter::new(self)
    }

    pub fn keys(&self) -> Result<LazyDictKeys> {
        Ok(LazyDictKeys {
            inner: self.iter()?,
        })
    }

    pub fn values(&self) -> Result<LazyDictValues> {
        Ok(LazyDictValues {
            inner: self.iter()?,
        })
    }
}

impl PartialEq for LazyDict {
    fn eq(&self, other: &Self) -> bool {
        self.same_identity(other)
            || match (self.eager(), other.eager()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            }
    }
}

fn key_not_found(key: &Value) -> OocMapError {
    OocMapError::KeyNotFound(format!("{key:?}"))
}

enum Step {
    End,
    Skip(Vec<u8>),
    Item(Vec<u8>, Value, Value),
}

/// Iterates a dict under one long-lived read transaction. Each step seeks
/// past the last key it returned, so the cursor itself does not need to
/// outlive the call.
pub struct LazyDictIter {
    txn: IterTxn,
    dict: LazyDict,
    seek: Vec<u8>,
}

impl LazyDictIter {
    fn new(dict: &LazyDict) -> Result<Self> {
        let txn = IterTxn::begin(&dict.map)?;
        Ok(LazyDictIter {
            txn,
            dict: dict.clone(),
            // Start at the header; the first step skips over it.
            seek: dict_header_key(dict.dict_id).to_vec(),
        })
    }

    /// Release the snapshot now instead of waiting for drop.
    pub fn close(mut self) -> Result<()> {
        self.txn.finish()
    }

    fn read_next(&mut self) -> Result<Option<(Value, Value)>> {
        if self.txn.is_finished() {
            return Ok(None);
        }
        let prefix = dict_header_key(self.dict.dict_id);
        loop {
            let step = {
                let txn = self.txn.txn()?;
                let cursor = txn.ro_cursor(self.dict.map.tables().dicts)?;
                match cursor_get(&cursor, Some(self.seek.as_slice()), ffi::MDB_SET_RANGE)? {
                    None => Step::End,
                    Some((raw_key, raw_value)) => {
                        if raw_key.len() < 4 || raw_key[..4] != prefix[..] {
                            Step::End
                        } else if raw_key.len() == prefix.len() {
                            // The length header itself.
                            Step::Skip(seek_past(raw_key))
                        } else {
                            let (_, encoded_key) = split_dict_item_key(raw_key)?;
                            let encoded_value = EncodedValue::from_bytes(raw_value)?;
                            let key = decode(self.txn.map(), &encoded_key, txn)?;
                            let value = decode(self.txn.map(), &encoded_value, txn)?;
                            Step::Item(seek_past(raw_key), key, value)
                        }
                    }
                }
            };
            match step {
                Step::End => {
                    self.txn.finish()?;
                    return Ok(None);
                }
                Step::Skip(seek) => self.seek = seek,
                Step::Item(seek, key, value) => {
                    self.seek = seek;
                    return Ok(Some((key, value)));
                }
            }
        }
    }
}

impl Iterator for LazyDictIter {
    type Item = Result<(Value, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

/// The smallest key strictly greater than `key`.
fn seek_past(key: &[u8]) -> Vec<u8> {
    let mut next = key.to_vec();
    next.push(0);
    next
}

pub struct LazyDictKeys {
    inner: LazyDictIter,
}

impl Iterator for LazyDictKeys {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|r| r.map(|(key, _)| key))
    }
}

impl LazyDictKeys {
    pub fn close(self) -> Result<()> {
        self.inner.close()
    }
}

pub struct LazyDictValues {
    inner: LazyDictIter,
}

impl Iterator for LazyDictValues {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|r| r.map(|(_, value)| value))
    }
}

impl LazyDictValues {
    pub fn close(self) -> Result<()> {
        self.inner.close()
    }
}
