//! Lazy handle for stored lists.
//!
//! A list's items live as individual records keyed by `(listId, index)`,
//! with one extra record at the reserved sentinel index holding the length.
//! All keys of one list are adjacent in the table, so every operation here
//! is either a point read/write by index or a bounded walk of that range.
//! Mutations keep the length invariant: indices always form `0..length`
//! with no gaps, and the sentinel always matches.

use oocmap_core::EncodedValue;

use crate::db::{IterTxn, Txn};
use crate::decode::decode;
use crate::encode::{encode, EncodePolicy};
use crate::error::{OocMapError, Result};
use crate::map::OocMap;
use crate::tables::{list_key, list_length_key, list_length_value};
use crate::value::Value;

#[derive(Clone, Debug)]
pub struct LazyList {
    map: OocMap,
    list_id: u32,
}

impl LazyList {
    pub(crate) fn new(map: OocMap, list_id: u32) -> Self {
        LazyList { map, list_id }
    }

    pub fn id(&self) -> u32 {
        self.list_id
    }

    pub(crate) fn map(&self) -> &OocMap {
        &self.map
    }

    pub(crate) fn same_identity(&self, other: &LazyList) -> bool {
        self.map.same_store(&other.map) && self.list_id == other.list_id
    }

    pub(crate) fn identity(&self) -> (usize, u32) {
        (self.map.store_address(), self.list_id)
    }

    pub(crate) fn len_in(&self, txn: &Txn<'_>) -> Result<u32> {
        let raw = txn
            .get(self.map.tables().lists, &list_length_key(self.list_id))?
            .ok_or(OocMapError::UnexpectedData)?;
        list_length_value(raw)
    }

    fn item_in(&self, txn: &Txn<'_>, index: u32) -> Result<EncodedValue> {
        let raw = txn
            .get(self.map.tables().lists, &list_key(self.list_id, index))?
            .ok_or(OocMapError::UnexpectedData)?;
        Ok(EncodedValue::from_bytes(raw)?)
    }

    fn write_len(&self, txn: &mut Txn<'_>, length: u32) -> Result<()> {
        txn.put(
            self.map.tables().lists,
            &list_length_key(self.list_id),
            &length.to_le_bytes(),
        )
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

    pub fn get(&self, index: usize) -> Result<Value> {
        let txn = Txn::begin(self.map.env(), false)?;
        let len = self.len_in(&txn)? as usize;
        if index >= len {
            return Err(OocMapError::IndexOutOfRange { index, len });
        }
        let encoded = self.item_in(&txn, index as u32)?;
        let value = decode(&self.map, &encoded, &txn)?;
        txn.commit()?;
        Ok(value)
    }

    /// Overwrite an existing position. Appending goes through [`push`].
    ///
    /// [`push`]: LazyList::push
    pub fn set(&self, index: usize, value: &Value) -> Result<()> {
        let mut txn = Txn::begin(self.map.env(), true)?;
        let len = self.len_in(&txn)? as usize;
        if index >= len {
            return Err(OocMapError::IndexOutOfRange { index, len });
        }
        let encoded = encode(&self.map, value, &mut txn, EncodePolicy::DEFAULT)?;
        txn.put(
            self.map.tables().lists,
            &list_key(self.list_id, index as u32),
            &encoded.to_bytes(),
        )?;
        txn.commit()
    }

    /// Remove one position, shifting everything after it forward by one.
    /// Single pass over the tail; the rest of the list is untouched.
    pub fn remove(&self, index: usize) -> Result<()> {
        let mut txn = Txn::begin(self.map.env(), true)?;
        let len = self.len_in(&txn)? as usize;
        if index >= len {
            return Err(OocMapError::IndexOutOfRange { index, len });
        }
        let lists = self.map.tables().lists;
        for position in index..len - 1 {
            let moved = self.item_in(&txn, position as u32 + 1)?;
            txn.put(
                lists,
                &list_key(self.list_id, position as u32),
                &moved.to_bytes(),
            )?;
        }
        if !txn.del(lists, &list_key(self.list_id, (len - 1) as u32))? {
            return Err(OocMapError::UnexpectedData);
        }
        self.write_len(&mut txn, (len - 1) as u32)?;
        txn.commit()
    }

    pub fn push(&self, value: &Value) -> Result<()> {
        let mut txn = Txn::begin(self.map.env(), true)?;
        let len = self.len_in(&txn)?;
        let encoded = encode(&self.map, value, &mut txn, EncodePolicy::DEFAULT)?;
        txn.put(
            self.map.tables().lists,
            &list_key(self.list_id, len),
            &encoded.to_bytes(),
        )?;
        self.write_len(&mut txn, len + 1)?;
        txn.commit()
    }

    /// Append every yielded value; the sentinel is updated once at the end.
    pub fn extend<I>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut txn = Txn::begin(self.map.env(), true)?;
        let mut next = self.len_in(&txn)?;
        for value in values {
            let encoded = encode(&self.map, &value, &mut txn, EncodePolicy::DEFAULT)?;
            txn.put(
                self.map.tables().lists,
                &list_key(self.list_id, next),
                &encoded.to_bytes(),
            )?;
            next += 1;
        }
        self.write_len(&mut txn, next)?;
        txn.commit()
    }

    /// Append another stored list. Within the same store the item records
    /// are copied directly, no decode or re-encode; extending a list with
    /// itself doubles it in place.
    pub fn extend_list(&self, other: &LazyList) -> Result<()> {
        if !self.map.same_store(&other.map) {
            return self.extend(other.eager()?);
        }
        if self.list_id == other.list_id {
            return self.repeat_in_place(2);
        }
        let mut txn = Txn::begin(self.map.env(), true)?;
        let mut next = self.len_in(&txn)?;
        let other_len = other.len_in(&txn)?;
        let lists = self.map.tables().lists;
        for index in 0..other_len {
            let moved = other.item_in(&txn, index)?;
            txn.put(lists, &list_key(self.list_id, next), &moved.to_bytes())?;
            next += 1;
        }
        self.write_len(&mut txn, next)?;
        txn.commit()
    }

    /// Repeat the current contents in place, `count` times total.
    /// `count == 0` clears. The copy reads from the front while writing at
    /// the back; once the read position crosses the original length it picks
    /// up records this same pass wrote, which is the repetition wanted.
    pub fn repeat_in_place(&self, count: usize) -> Result<()> {
        if count == 0 {
            return self.clear();
        }
        if count == 1 {
            return Ok(());
        }
        let mut txn = Txn::begin(self.map.env(), true)?;
        let len = self.len_in(&txn)? as u64;
        if len == 0 {
            return txn.commit();
        }
        let total = len * count as u64;
        if total >= u64::from(oocmap_core::LIST_LENGTH_INDEX) {
            return Err(OocMapError::InvalidState("list would exceed maximum length"));
        }
        let lists = self.map.tables().lists;
        for dest in len..total {
            let moved = self.item_in(&txn, (dest - len) as u32)?;
            txn.put(lists, &list_key(self.list_id, dest as u32), &moved.to_bytes())?;
        }
        self.write_len(&mut txn, total as u32)?;
        txn.commit()
    }

    /// Delete every item record and reset the sentinel to zero.
    pub fn clear(&self) -> Result<()> {
        let mut txn = Txn::begin(self.map.env(), true)?;
        let len = self.len_in(&txn)?;
        let lists = self.map.tables().lists;
        for index in 0..len {
            if !txn.del(lists, &list_key(self.list_id, index))? {
                return Err(OocMapError::UnexpectedData);
            }
        }
        self.write_len(&mut txn, 0)?;
        txn.commit()
    }

    pub fn index_of(&self, needle: &Value) -> Result<Option<usize>> {
        self.index_of_range(needle, 0, isize::MAX)
    }

    /// First position of `needle` within `start..stop`, with negative
    /// bounds counted from the end. Immutable needles are matched on their
    /// encoded bytes; needles the store has never seen cannot be present;
    /// mutable needles are matched by decoding each candidate.
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
        let len = self.len_in(&txn)? as usize;
        let (start, stop) = normalize_range(start, stop, len);
        for index in start..stop {
            let encoded = self.item_in(&txn, index as u32)?;
            let hit = match &needle_encoded {
                Some(needle_encoded) => encoded == *needle_encoded,
                None => decode(&self.map, &encoded, &txn)? == *needle,
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
        let len = self.len_in(&txn)?;
        let mut count = 0;
        for index in 0..len {
            let encoded = self.item_in(&txn, index)?;
            let hit = match &needle_encoded {
                Some(needle_encoded) => encoded == *needle_encoded,
                None => decode(&self.map, &encoded, &txn)? == *needle,
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

    /// Materialize every item into a native vector.
    pub fn eager(&self) -> Result<Vec<Value>> {
        let txn = Txn::begin(self.map.env(), false)?;
        let len = self.len_in(&txn)?;
        let mut items = Vec::with_capacity(len as usize);
        for index in 0..len {
            let encoded = self.item_in(&txn, index)?;
            items.push(decode(&self.map, &encoded, &txn)?);
        }
        txn.commit()?;
        Ok(items)
    }

    pub fn iter(&self) -> Result<LazyListIter> {
        LazyListIter::new(self)
    }

    /// Concatenation materializes; the result is a native sequence.
    pub fn concat(&self, other: &Value) -> Result<Vec<Value>> {
        let mut out = self.eager()?;
        match other {
            Value::List(cell) => out.extend(cell.borrow().iter().cloned()),
            Value::LazyList(handle) => out.extend(handle.eager()?),
            other => {
                return Err(OocMapError::KindMismatch {
                    expected: "list",
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

impl PartialEq for LazyList {
    fn eq(&self, other: &Self) -> bool {
        self.same_identity(other)
            || match (self.eager(), other.eager()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            }
    }
}

/// Clamp a possibly-negative `start..stop` against a length, counting
/// negative bounds from the end the way sequence slicing does.
pub(crate) fn normalize_range(start: isize, stop: isize, len: usize) -> (usize, usize) {
    let len = len as isize;
    let start = if start < 0 { start + len } else { start };
    let stop = if stop < 0 { stop + len } else { stop };
    let start = start.clamp(0, len) as usize;
    let stop = stop.clamp(0, len) as usize;
    (start, stop)
}

/// Iterates a list under one read transaction, so a consumer that pauses
/// between items still sees the snapshot it started with.
pub struct LazyListIter {
    txn: IterTxn,
    list: LazyList,
    length: u32,
    next_index: u32,
}

impl LazyListIter {
    fn new(list: &LazyList) -> Result<Self> {
        let txn = IterTxn::begin(&list.map)?;
        let length = list.len_in(txn.txn()?)?;
        Ok(LazyListIter {
            txn,
            list: list.clone(),
            length,
            next_index: 0,
        })
    }

    /// Release the snapshot now instead of waiting for drop.
    pub fn close(mut self) -> Result<()> {
        self.txn.finish()
    }

    fn read_next(&mut self) -> Result<Option<Value>> {
        if self.txn.is_finished() {
            return Ok(None);
        }
        if self.next_index >= self.length {
            self.txn.finish()?;
            return Ok(None);
        }
        let value = {
            let txn = self.txn.txn()?;
            let encoded = self.list.item_in(txn, self.next_index)?;
            decode(self.txn.map(), &encoded, txn)?
        };
        self.next_index += 1;
        Ok(Some(value))
    }
}

impl Iterator for LazyListIter {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_range;

    #[test]
    fn range_normalization_mirrors_slicing() {
        assert_eq!(normalize_range(0, isize::MAX, 4), (0, 4));
        assert_eq!(normalize_range(-2, isize::MAX, 4), (2, 4));
        assert_eq!(normalize_range(-9, isize::MAX, 4), (0, 4));
        assert_eq!(normalize_range(1, -1, 4), (1, 3));
        assert_eq!(normalize_range(0, -9, 4), (0, 0));
        assert_eq!(normalize_range(3, 2, 4), (3, 2));
    }
}
