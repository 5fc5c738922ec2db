//! Thin façade over LMDB.
//!
//! Everything the rest of the crate needs from the store goes through here:
//! environment setup, the [`Txn`] wrapper with its abort-on-drop semantics
//! and map-resize retry, point get/put/delete, cursor positioning, entry
//! counts, and the content-addressed write protocol for immutable payloads.

use std::collections::HashMap;
use std::mem::MaybeUninit;
use std::path::Path;

use lmdb::{Cursor, Database, Environment, EnvironmentFlags, RoCursor, RoTransaction, RwTransaction, Transaction, WriteFlags};
use lmdb_sys as ffi;
use tracing::warn;

use oocmap_core::{content_hash, EncodedValue};

use crate::error::{OocMapError, Result};
use crate::map::OocMap;
use crate::value::Value;

/// How many times a begin retries after the store reports a map resize.
const MAP_RESIZE_RETRIES: u32 = 10;

/// Number of named tables in one environment.
pub(crate) const MAX_TABLES: u32 = 6;

pub(crate) fn open_env(path: &Path, map_size: usize, max_readers: u32) -> Result<Environment> {
    let mut builder = Environment::new();
    builder.set_max_dbs(MAX_TABLES);
    builder.set_max_readers(max_readers);
    builder.set_map_size(map_size);
    // One file per environment, aggressive flags: throughput over strict
    // durability. A crash can lose recent commits but not corrupt the file
    // beyond what WRITE_MAP already implies.
    builder.set_flags(
        EnvironmentFlags::NO_SUB_DIR
            | EnvironmentFlags::NO_SYNC
            | EnvironmentFlags::WRITE_MAP
            | EnvironmentFlags::NO_META_SYNC
            | EnvironmentFlags::MAP_ASYNC
            | EnvironmentFlags::NO_MEM_INIT
            | EnvironmentFlags::NO_TLS,
    );
    Ok(builder.open(path)?)
}

enum TxnInner<'env> {
    Ro(RoTransaction<'env>),
    Rw(RwTransaction<'env>),
}

/// Per-transaction memo from host-value identity to its assigned encoding.
///
/// Inserting a container's encoding before recursing into its children is
/// what terminates cyclic encodes: the back-reference resolves to the
/// already-allocated id. Entries pin a clone of their value so the identity
/// (the `Rc` allocation address) stays valid for the whole transaction.
#[derive(Default)]
pub(crate) struct EncodeMemo {
    entries: HashMap<usize, EncodedValue>,
    pinned: Vec<Value>,
}

impl EncodeMemo {
    pub(crate) fn get(&self, identity: usize) -> Option<EncodedValue> {
        self.entries.get(&identity).copied()
    }

    pub(crate) fn insert(&mut self, identity: usize, value: &Value, encoded: EncodedValue) {
        self.entries.insert(identity, encoded);
        self.pinned.push(value.clone());
    }

    pub(crate) fn remove(&mut self, identity: usize) {
        self.entries.remove(&identity);
    }
}

/// A scoped transaction. Commit and abort are explicit and consume the
/// transaction; dropping one that was neither committed nor aborted aborts
/// it. Carries the encode memo for its lifetime.
pub(crate) struct Txn<'env> {
    inner: Option<TxnInner<'env>>,
    readonly: bool,
    pub(crate) memo: EncodeMemo,
}

impl<'env> Txn<'env> {
    /// Begin a transaction, adopting the on-disk map size and retrying a
    /// bounded number of times when another process has grown the file.
    pub(crate) fn begin(env: &'env Environment, write: bool) -> Result<Self> {
        let mut patience = MAP_RESIZE_RETRIES;
        loop {
            let attempt = if write {
                env.begin_rw_txn().map(TxnInner::Rw)
            } else {
                env.begin_ro_txn().map(TxnInner::Ro)
            };
            match attempt {
                Ok(inner) => {
                    return Ok(Txn {
                        inner: Some(inner),
                        readonly: !write,
                        memo: EncodeMemo::default(),
                    })
                }
                Err(lmdb::Error::MapResized) if patience > 0 => {
                    patience -= 1;
                    warn!("map resized by another process, adopting new size");
                    // Size zero means "take whatever is on disk now".
                    env.set_map_size(0)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub(crate) fn readonly(&self) -> bool {
        self.readonly
    }

    fn inner(&self) -> Result<&TxnInner<'env>> {
        self.inner
            .as_ref()
            .ok_or(OocMapError::InvalidState("transaction already finished"))
    }

    fn rw(&mut self) -> Result<&mut RwTransaction<'env>> {
        match self.inner.as_mut() {
            Some(TxnInner::Rw(txn)) => Ok(txn),
            Some(TxnInner::Ro(_)) => Err(OocMapError::WriteNotAllowed),
            None => Err(OocMapError::InvalidState("transaction already finished")),
        }
    }

    /// Point lookup. Absence is a non-error; the caller decides what it means.
    pub(crate) fn get(&self, db: Database, key: &[u8]) -> Result<Option<&[u8]>> {
        let found = match self.inner()? {
            TxnInner::Ro(txn) => txn.get(db, &key),
            TxnInner::Rw(txn) => txn.get(db, &key),
        };
        match found {
            Ok(bytes) => Ok(Some(bytes)),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn put(&mut self, db: Database, key: &[u8], value: &[u8]) -> Result<()> {
        Ok(self.rw()?.put(db, &key, &value, WriteFlags::empty())?)
    }

    /// Insert only if the key is absent. Returns false when it already
    /// exists, which id allocation uses as its redraw signal.
    pub(crate) fn try_put_new(&mut self, db: Database, key: &[u8], value: &[u8]) -> Result<bool> {
        match self.rw()?.put(db, &key, &value, WriteFlags::NO_OVERWRITE) {
            Ok(()) => Ok(true),
            Err(lmdb::Error::KeyExist) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a key. Returns whether it was present.
    pub(crate) fn del(&mut self, db: Database, key: &[u8]) -> Result<bool> {
        match self.rw()?.del(db, &key, None) {
            Ok(()) => Ok(true),
            Err(lmdb::Error::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Reserve `len` writable bytes under `key` for the caller to fill.
    pub(crate) fn reserve(&mut self, db: Database, key: &[u8], len: usize) -> Result<&mut [u8]> {
        Ok(self.rw()?.reserve(db, &key, len, WriteFlags::empty())?)
    }

    pub(crate) fn ro_cursor(&self, db: Database) -> Result<RoCursor<'_>> {
        let cursor = match self.inner()? {
            TxnInner::Ro(txn) => txn.open_ro_cursor(db)?,
            TxnInner::Rw(txn) => txn.open_ro_cursor(db)?,
        };
        Ok(cursor)
    }

    /// Number of entries in a table, via the store's stat call.
    pub(crate) fn entry_count(&self, db: Database) -> Result<u64> {
        let raw = match self.inner()? {
            TxnInner::Ro(txn) => txn.txn(),
            TxnInner::Rw(txn) => txn.txn(),
        };
        let mut stat = MaybeUninit::<ffi::MDB_stat>::uninit();
        let rc = unsafe { ffi::mdb_stat(raw, db.dbi(), stat.as_mut_ptr()) };
        if rc != 0 {
            return Err(lmdb::Error::from_err_code(rc).into());
        }
        Ok(unsafe { stat.assume_init() }.ms_entries as u64)
    }

    pub(crate) fn commit(mut self) -> Result<()> {
        match self.inner.take() {
            Some(TxnInner::Ro(txn)) => txn.commit()?,
            Some(TxnInner::Rw(txn)) => txn.commit()?,
            None => {}
        }
        Ok(())
    }

    pub(crate) fn abort(mut self) {
        self.abort_in_place();
    }

    fn abort_in_place(&mut self) {
        match self.inner.take() {
            Some(TxnInner::Ro(txn)) => txn.abort(),
            Some(TxnInner::Rw(txn)) => txn.abort(),
            None => {}
        }
    }
}

impl Drop for Txn<'_> {
    fn drop(&mut self) {
        self.abort_in_place();
    }
}

/// Position a cursor and return the record it lands on, or `None` when the
/// store has nothing there. `op` is one of the store's cursor positioning
/// ops (SET_KEY, SET_RANGE, NEXT, ...), all of which report the full key.
pub(crate) fn cursor_get<'txn>(
    cursor: &RoCursor<'txn>,
    key: Option<&[u8]>,
    op: ffi::MDB_cursor_op,
) -> Result<Option<(&'txn [u8], &'txn [u8])>> {
    match cursor.get(key, None, op) {
        Ok((Some(key), value)) => Ok(Some((key, value))),
        Ok((None, _)) => Err(OocMapError::UnexpectedData),
        Err(lmdb::Error::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Content-addressed write of an immutable payload.
///
/// Hashes the payload salted with the type code and stores it under that
/// hash. In readonly mode the write turns into a lookup: a missing entry
/// means the value cannot exist in this store, which the caller reports as
/// `ImmutableValueNotFound`. The payload of an existing entry is not
/// verified against the new one; hash collisions are accepted.
pub(crate) fn put_immutable(
    txn: &mut Txn<'_>,
    db: Database,
    payload: &[u8],
    type_code: u8,
    readonly: bool,
) -> Result<u64> {
    let hash = content_hash(payload, type_code);
    let key = hash.to_ne_bytes();
    if readonly || txn.readonly() {
        if txn.get(db, &key)?.is_none() {
            return Err(OocMapError::ImmutableValueNotFound);
        }
    } else {
        txn.reserve(db, &key, payload.len())?
            .copy_from_slice(payload);
    }
    Ok(hash)
}

/// A read transaction that outlives a single call frame, for iterators that
/// may be paused indefinitely between yields.
///
/// The transaction borrows the environment inside the store's shared inner
/// allocation; holding a clone of the store handle alongside keeps that
/// allocation alive, and the field order drops the transaction first.
pub(crate) struct IterTxn {
    txn: Option<Txn<'static>>,
    map: OocMap,
}

impl IterTxn {
    pub(crate) fn begin(map: &OocMap) -> Result<Self> {
        let txn = Txn::begin(map.env(), false)?;
        // SAFETY: the transaction borrows the Environment owned by the Arc
        // inside `map`. The clone stored below holds that Arc for as long as
        // this struct lives, the Environment is never moved out of it, and
        // `txn` is declared before `map` so it drops first.
        let txn: Txn<'static> = unsafe { std::mem::transmute::<Txn<'_>, Txn<'static>>(txn) };
        Ok(IterTxn {
            txn: Some(txn),
            map: map.clone(),
        })
    }

    pub(crate) fn txn(&self) -> Result<&Txn<'static>> {
        self.txn
            .as_ref()
            .ok_or(OocMapError::InvalidState("iterator transaction finished"))
    }

    pub(crate) fn map(&self) -> &OocMap {
        &self.map
    }

    /// Commit the snapshot. Called when iteration is exhausted or closed;
    /// dropping without finishing aborts instead.
    pub(crate) fn finish(&mut self) -> Result<()> {
        match self.txn.take() {
            Some(txn) => txn.commit(),
            None => Ok(()),
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.txn.is_none()
    }
}
