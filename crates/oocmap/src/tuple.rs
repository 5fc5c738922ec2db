//! Lazy handle for stored tuples.
//!
//! A stored tuple is one content-addressed record: the packed array of its
//! items' 9-byte encodings. The handle reads single items by offset and
//! caches the fully materialized form once anything asks for it, since the
//! record is immutable and cannot go stale.

use std::cell::RefCell;
use std::rc::Rc;

use oocmap_core::EncodedValue;

use crate::db::Txn;
use crate::decode::decode;
use crate::encode::{encode, EncodePolicy};
use crate::error::{OocMapError, Result};
use crate::list::normalize_range;
use crate::map::OocMap;
use crate::tables::hash_key;
use crate::value::Value;

#[derive(Clone, Debug)]
pub struct LazyTuple {
    map: OocMap,
    tuple_id: u64,
    cache: Rc<RefCell<Option<Rc<[Value]>>>>,
}

impl LazyTuple {
    pub(crate) fn new(map: OocMap, tuple_id: u64) -> Self {
        LazyTuple {
            map,
            tuple_id,
            cache: Rc::new(RefCell::new(None)),
        }
    }

    /// The content hash this handle points at.
    pub fn id(&self) -> u64 {
        self.tuple_id
    }

    pub(crate) fn map(&self) -> &OocMap {
        &self.map
    }

    pub(crate) fn same_identity(&self, other: &LazyTuple) -> bool {
        self.map.same_store(&other.map) && self.tuple_id == other.tuple_id
    }

    fn cached(&self) -> Option<Rc<[Value]>> {
        self.cache.borrow().clone()
    }

    /// The raw packed record; its length is a multiple of the record size.
    fn raw<'t>(&self, txn: &'t Txn<'_>) -> Result<&'t [u8]> {
        let raw = txn
            .get(self.map.tables().tuples, &hash_key(self.tuple_id))?
            .ok_or(OocMapError::UnexpectedData)?;
        if raw.len() % EncodedValue::SIZE != 0 {
            return Err(OocMapError::UnexpectedData);
        }
        Ok(raw)
    }

    pub fn len(&self) -> Result<usize> {
        if let Some(items) = self.cached() {
            return Ok(items.len());
        }
        let txn = Txn::begin(self.map.env(), false)?;
        let len = self.raw(&txn)?.len() / EncodedValue::SIZE;
        txn.commit()?;
        Ok(len)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, index: usize) -> Result<Value> {
        if let Some(items) = self.cached() {
            let len = items.len();
            return items
                .get(index)
                .cloned()
                .ok_or(OocMapError::IndexOutOfRange { index, len });
        }
        let txn = Txn::begin(self.map.env(), false)?;
        let raw = self.raw(&txn)?;
        let len = raw.len() / EncodedValue::SIZE;
        if index >= len {
            return Err(OocMapError::IndexOutOfRange { index, len });
        }
        let start = index * EncodedValue::SIZE;
        let encoded = EncodedValue::from_bytes(&raw[start..start + EncodedValue::SIZE])?;
        let value = decode(&self.map, &encoded, &txn)?;
        txn.commit()?;
        Ok(value)
    }

    /// Materialize every item. The result is cached on the handle.
    pub fn eager(&self) -> Result<Rc<[Value]>> {
        if let Some(items) = self.cached() {
            return Ok(items);
        }
        let txn = Txn::begin(self.map.env(), false)?;
        let items = self.eager_in(&txn)?;
        txn.commit()?;
        Ok(items)
    }

    pub(crate) fn eager_in(&self, txn: &Txn<'_>) -> Result<Rc<[Value]>> {
        if let Some(items) = self.cached() {
            return Ok(items);
        }
        let raw = self.raw(txn)?;
        let mut items = Vec::with_capacity(raw.len() / EncodedValue::SIZE);
        for chunk in raw.chunks_exact(EncodedValue::SIZE) {
            items.push(decode(&self.map, &EncodedValue::from_bytes(chunk)?, txn)?);
        }
        let items: Rc<[Value]> = items.into();
        *self.cache.borrow_mut() = Some(items.clone());
        Ok(items)
    }

    pub fn index_of(&self, needle: &Value) -> Result<Option<usize>> {
        self.index_of_range(needle, 0, isize::MAX)
    }

    /// First position of `needle` within `start..stop`. Negative bounds
    /// count from the end. An immutable needle is compared by its encoded
    /// bytes; a needle the store has never seen cannot match at all; a
    /// mutable needle falls back to decoding each candidate.
    pub fn index_of_range(
        &self,
        needle: &Value,
        start: isize,
        stop: isize,
    ) -> Result<Option<usize>> {
        let mut txn = Txn::begin(self.map.env(), false)?;
        let needle_encoded = match encode(&self.map, needle, &mut txn, EncodePolicy::LOOKUP) {
            Ok(encoded) => Some(encoded),
            Err(OocMapError::MutableValueNotAllowed) => None,
            Err(e) if e.proves_absence() => {
                txn.commit()?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let raw = self.raw(&txn)?;
        let len = raw.len() / EncodedValue::SIZE;
        let (start, stop) = normalize_range(start, stop, len);
        for index in start..stop {
            let offset = index * EncodedValue::SIZE;
            let chunk = &raw[offset..offset + EncodedValue::SIZE];
            let hit = match &needle_encoded {
                Some(encoded) => chunk == &encoded.to_bytes()[..],
                None => decode(&self.map, &EncodedValue::from_bytes(chunk)?, &txn)? == *needle,
            };
            if hit {
                txn.commit()?;
                return Ok(Some(index));
            }
        }
        txn.commit()?;
        Ok(None)
    }

    pub fn count(&self, needle: &Value) -> Result<usize> {
        let mut txn = Txn::begin(self.map.env(), false)?;
        let needle_encoded = match encode(&self.map, needle, &mut txn, EncodePolicy::LOOKUP) {
            Ok(encoded) => Some(encoded),
            Err(OocMapError::MutableValueNotAllowed) => None,
            Err(e) if e.proves_absence() => {
                txn.commit()?;
                return Ok(0);
            }
            Err(e) => return Err(e),
        };
        let raw = self.raw(&txn)?;
        let mut count = 0;
        for chunk in raw.chunks_exact(EncodedValue::SIZE) {
            let hit = match &needle_encoded {
                Some(encoded) => chunk == &encoded.to_bytes()[..],
                None => decode(&self.map, &EncodedValue::from_bytes(chunk)?, &txn)? == *needle,
            };
            if hit {
                count += 1;
            }
        }
        txn.commit()?;
        Ok(count)
    }

    pub fn contains(&self, needle: &Value) -> Result<bool> {
        Ok(self.index_of(needle)?.is_some())
    }

    /// Concatenation materializes; the result is a native sequence.
    pub fn concat(&self, other: &Value) -> Result<Vec<Value>> {
        let mut out = self.eager()?.to_vec();
        match other {
            Value::Tuple(items) => out.extend(items.iter().cloned()),
            Value::LazyTuple(handle) => out.extend(handle.eager()?.iter().cloned()),
            other => {
                return Err(OocMapError::KindMismatch {
                    expected: "tuple",
                    actual: other.kind_name(),
                })
            }
        }
        Ok(out)
    }

    pub fn repeat(&self, count: usize) -> Result<Vec<Value>> {
        let items = self.eager()?;
        let mut out = Vec::with_capacity(items.len() * count);
        for _ in 0..count {
            out.extend(items.iter().cloned());
        }
        Ok(out)
    }
}

impl PartialEq for LazyTuple {
    fn eq(&self, other: &Self) -> bool {
        self.same_identity(other)
            || match (self.eager(), other.eager()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            }
    }
}
