//! The top-level map: the public root mapping of an environment.
//!
//! Every operation is one scoped transaction: encode the key (hashable on
//! the write path, read-only on the read path), touch the root table,
//! decode lazily, commit. An error anywhere drops the transaction, which
//! aborts it, so nothing half-written survives.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lmdb::Environment;
use tracing::info;

use oocmap_core::EncodedValue;

use crate::config::OpenOptions;
use crate::db::{open_env, Txn};
use crate::decode::decode;
use crate::encode::{encode, EncodePolicy};
use crate::error::{OocMapError, Result};
use crate::tables::Tables;
use crate::value::Value;

pub(crate) struct StoreInner {
    env: Environment,
    tables: Tables,
    path: PathBuf,
}

/// A persistent, disk-backed map. Cheap to clone; all clones share one
/// environment. Values read back from it are materialized lazily: scalars
/// eagerly, collections as handles that read on demand.
///
/// The handle must outlive every lazy handle and iterator derived from it,
/// which the handles enforce by holding a clone.
#[derive(Clone)]
pub struct OocMap {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for OocMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OocMap")
            .field("path", &self.inner.path)
            .finish()
    }
}

/// Entry counts of every table, mostly useful for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub root_entries: u64,
    pub int_entries: u64,
    pub string_entries: u64,
    pub tuple_entries: u64,
    pub list_entries: u64,
    pub dict_entries: u64,
}

impl OocMap {
    /// Open (or create) the environment at `path` with default options.
    /// The environment is a single file, not a directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, OpenOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let env = open_env(&path, options.map_size, options.max_readers)?;
        let tables = Tables::open(&env)?;
        info!(path = %path.display(), map_size = options.map_size, "opened environment");
        Ok(OocMap {
            inner: Arc::new(StoreInner { env, tables, path }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub(crate) fn env(&self) -> &Environment {
        &self.inner.env
    }

    pub(crate) fn tables(&self) -> &Tables {
        &self.inner.tables
    }

    pub(crate) fn same_store(&self, other: &OocMap) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn store_address(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Number of keys in the root mapping.
    pub fn len(&self) -> Result<u64> {
        let txn = Txn::begin(self.env(), false)?;
        let count = txn.entry_count(self.tables().root)?;
        txn.commit()?;
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Look up a key. A key that is unhashable reports as such; a key the
    /// store has never seen reports as missing without writing anything.
    pub fn get(&self, key: &Value) -> Result<Value> {
        let mut txn = Txn::begin(self.env(), false)?;
        let encoded_key = match self.encode_lookup_key(key, &mut txn)? {
            Some(encoded) => encoded,
            None => {
                txn.abort();
                return Err(key_not_found(key));
            }
        };
        let raw = txn
            .get(self.tables().root, &encoded_key.to_bytes())?
            .ok_or_else(|| key_not_found(key))?;
        let encoded_value = EncodedValue::from_bytes(raw)?;
        let value = decode(self, &encoded_value, &txn)?;
        txn.commit()?;
        Ok(value)
    }

    /// Insert or overwrite. The key must be hashable; the value may be any
    /// supported kind, including cyclic containers and handles owned by
    /// another store (which are copied over eagerly).
    pub fn insert(&self, key: &Value, value: &Value) -> Result<()> {
        let mut txn = Txn::begin(self.env(), true)?;
        let encoded_key = match encode(self, key, &mut txn, EncodePolicy::HASHABLE) {
            Ok(encoded) => encoded,
            Err(OocMapError::MutableValueNotAllowed) => {
                return Err(OocMapError::Unhashable(key.kind_name()))
            }
            Err(e) => return Err(e),
        };
        let encoded_value = encode(self, value, &mut txn, EncodePolicy::DEFAULT)?;
        txn.put(
            self.tables().root,
            &encoded_key.to_bytes(),
            &encoded_value.to_bytes(),
        )?;
        txn.commit()
    }

    /// Delete a key. Missing keys report as not found; the key itself is
    /// encoded in read-only mode, so deleting never writes.
    pub fn remove(&self, key: &Value) -> Result<()> {
        let mut txn = Txn::begin(self.env(), true)?;
        let encoded_key = match self.encode_lookup_key(key, &mut txn)? {
            Some(encoded) => encoded,
            None => {
                txn.abort();
                return Err(key_not_found(key));
            }
        };
        if !txn.del(self.tables().root, &encoded_key.to_bytes())? {
            return Err(key_not_found(key));
        }
        txn.commit()
    }

    pub fn contains(&self, key: &Value) -> Result<bool> {
        let mut txn = Txn::begin(self.env(), false)?;
        let encoded_key = match self.encode_lookup_key(key, &mut txn)? {
            Some(encoded) => encoded,
            None => {
                txn.abort();
                return Ok(false);
            }
        };
        let present = txn
            .get(self.tables().root, &encoded_key.to_bytes())?
            .is_some();
        txn.commit()?;
        Ok(present)
    }

    /// Per-table entry counts.
    pub fn stats(&self) -> Result<StoreStats> {
        let txn = Txn::begin(self.env(), false)?;
        let tables = self.tables();
        let stats = StoreStats {
            root_entries: txn.entry_count(tables.root)?,
            int_entries: txn.entry_count(tables.ints)?,
            string_entries: txn.entry_count(tables.strings)?,
            tuple_entries: txn.entry_count(tables.tuples)?,
            list_entries: txn.entry_count(tables.lists)?,
            dict_entries: txn.entry_count(tables.dicts)?,
        };
        txn.commit()?;
        Ok(stats)
    }

    /// `Ok(None)` means the key provably cannot be in the root mapping.
    fn encode_lookup_key(
        &self,
        key: &Value,
        txn: &mut Txn<'_>,
    ) -> Result<Option<EncodedValue>> {
        match encode(self, key, txn, EncodePolicy::LOOKUP) {
            Ok(encoded) => Ok(Some(encoded)),
            Err(OocMapError::MutableValueNotAllowed) => {
                Err(OocMapError::Unhashable(key.kind_name()))
            }
            Err(e) if e.proves_absence() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn key_not_found(key: &Value) -> OocMapError {
    OocMapError::KeyNotFound(format!("{key:?}"))
}
