//! Out-of-core map: a persistent, LMDB-backed associative container.
//!
//! Stores a dynamically typed value graph (scalars, strings, tuples,
//! lists, dicts, including cyclic structures) in a memory-mapped B+tree
//! file, and reads it back lazily, one element at a time.
//!
//! Key properties:
//! - Every stored value is a uniform 9-byte record; payloads that do not
//!   fit inline go to per-kind tables
//! - Immutable payloads are content-addressed, so equal values collapse to
//!   one stored copy
//! - Reads of collections return lazy handles: O(1) regardless of how much
//!   hangs below them
//! - Cyclic values encode safely via per-transaction memoization
//! - Single writer at a time (enforced by the store), snapshot-isolated
//!   readers, abort-on-drop transactions
//!
//! # Example
//!
//! ```no_run
//! use oocmap::{OocMap, Value};
//!
//! # fn main() -> oocmap::Result<()> {
//! let m = OocMap::open("./data.oocmap")?;
//! m.insert(&Value::from("answer"), &Value::from(42))?;
//! assert_eq!(m.get(&Value::from("answer"))?, Value::from(42));
//!
//! m.insert(&Value::from("xs"), &Value::list(vec![Value::from(1), Value::from(2)]))?;
//! let xs = m.get(&Value::from("xs"))?;
//! let xs = xs.as_lazy_list().unwrap();
//! xs.push(&Value::from(3))?;
//! assert_eq!(xs.len()?, 3);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dict;
pub mod error;
pub mod list;
pub mod map;
pub mod tuple;
pub mod value;

mod db;
mod decode;
mod encode;
mod tables;

pub use config::OpenOptions;
pub use dict::{LazyDict, LazyDictIter, LazyDictKeys, LazyDictValues};
pub use error::{OocMapError, Result};
pub use list::{LazyList, LazyListIter};
pub use map::{OocMap, StoreStats};
pub use tuple::LazyTuple;
pub use value::Value;
