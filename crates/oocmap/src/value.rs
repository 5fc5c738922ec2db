//! The host value model.
//!
//! A [`Value`] is a dynamically typed, possibly cyclic object graph: the
//! scalar kinds, immutable tuples, mutable lists and dicts (shared through
//! `Rc<RefCell<...>>`), and the lazy handles that reads hand back. The graph
//! is single-threaded by design; the store underneath is freely shareable.
//!
//! Equality is structural and numeric across `Int`/`BigInt`. Hashing is
//! consistent with equality for every hashable kind; mutable containers and
//! their lazy handles hash by identity. Two mutable containers that are
//! equal by content may therefore hash differently, but the store rejects
//! them as dict keys anyway, so they never land in a position where that
//! matters.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use num_bigint::{BigInt, Sign};
use num_traits::{ToPrimitive, Zero};

use crate::dict::LazyDict;
use crate::list::LazyList;
use crate::tuple::LazyTuple;

#[derive(Clone, Debug)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    BigInt(Rc<BigInt>),
    Float(f64),
    Str(Rc<str>),
    Tuple(Rc<[Value]>),
    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<HashMap<Value, Value>>>),
    LazyTuple(LazyTuple),
    LazyList(LazyList),
    LazyDict(LazyDict),
}

impl Value {
    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(items.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn dict(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Value::Dict(Rc::new(RefCell::new(pairs.into_iter().collect())))
    }

    /// The kind of this value, as shown in errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::BigInt(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Tuple(_) | Value::LazyTuple(_) => "tuple",
            Value::List(_) | Value::LazyList(_) => "list",
            Value::Dict(_) | Value::LazyDict(_) => "dict",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::BigInt(n) => n.to_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_lazy_tuple(&self) -> Option<&LazyTuple> {
        match self {
            Value::LazyTuple(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_lazy_list(&self) -> Option<&LazyList> {
        match self {
            Value::LazyList(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_lazy_dict(&self) -> Option<&LazyDict> {
        match self {
            Value::LazyDict(d) => Some(d),
            _ => None,
        }
    }

    /// Identity of this value for the per-transaction encode memo: the
    /// shared allocation's address, for the kinds where re-encountering the
    /// same allocation must produce the same encoding.
    pub(crate) fn memo_identity(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(Rc::as_ptr(s) as *const u8 as usize),
            Value::Tuple(t) => Some(Rc::as_ptr(t) as *const Value as usize),
            Value::List(l) => Some(Rc::as_ptr(l) as usize),
            Value::Dict(d) => Some(Rc::as_ptr(d) as usize),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Rc::from(v.as_str()))
    }
}

impl From<BigInt> for Value {
    fn from(v: BigInt) -> Self {
        Value::BigInt(Rc::new(v))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (None, None) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (BigInt(a), BigInt(b)) => a == b,
            (Int(a), BigInt(b)) => &num_bigint::BigInt::from(*a) == b.as_ref(),
            (BigInt(a), Int(b)) => a.as_ref() == &num_bigint::BigInt::from(*b),
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Str(a), Str(b)) => a == b,
            (Tuple(a), Tuple(b)) => a == b,
            (List(a), List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Dict(a), Dict(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (LazyTuple(a), LazyTuple(b)) => {
                a.same_identity(b)
                    || match (a.eager(), b.eager()) {
                        (Ok(x), Ok(y)) => x == y,
                        _ => false,
                    }
            }
            (LazyTuple(a), Tuple(b)) => a.eager().map(|x| x[..] == b[..]).unwrap_or(false),
            (Tuple(a), LazyTuple(b)) => b.eager().map(|y| y[..] == a[..]).unwrap_or(false),
            (LazyList(a), LazyList(b)) => {
                a.same_identity(b)
                    || match (a.eager(), b.eager()) {
                        (Ok(x), Ok(y)) => x == y,
                        _ => false,
                    }
            }
            (LazyList(a), List(b)) => a.eager().map(|x| x == *b.borrow()).unwrap_or(false),
            (List(a), LazyList(b)) => b.eager().map(|y| y == *a.borrow()).unwrap_or(false),
            (LazyDict(a), LazyDict(b)) => {
                a.same_identity(b)
                    || match (a.eager(), b.eager()) {
                        (Ok(x), Ok(y)) => x == y,
                        _ => false,
                    }
            }
            (LazyDict(a), Dict(b)) => a.eager().map(|x| x == *b.borrow()).unwrap_or(false),
            (Dict(a), LazyDict(b)) => b.eager().map(|y| y == *a.borrow()).unwrap_or(false),
            _ => false,
        }
    }
}

impl Eq for Value {}

// Kind tags for hashing. Int and BigInt share one tag because they compare
// equal numerically; the same goes for Tuple and LazyTuple.
const HASH_KIND_NONE: u8 = 0;
const HASH_KIND_BOOL: u8 = 1;
const HASH_KIND_INT: u8 = 2;
const HASH_KIND_FLOAT: u8 = 3;
const HASH_KIND_TEXT: u8 = 4;
const HASH_KIND_TUPLE: u8 = 5;
const HASH_KIND_LIST: u8 = 6;
const HASH_KIND_DICT: u8 = 7;

fn hash_int_parts<H: Hasher>(negative: bool, magnitude: &[u8], state: &mut H) {
    state.write_u8(HASH_KIND_INT);
    negative.hash(state);
    magnitude.hash(state);
}

fn hash_items<H: Hasher>(items: &[Value], state: &mut H) {
    state.write_u8(HASH_KIND_TUPLE);
    state.write_usize(items.len());
    for item in items {
        item.hash(state);
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::None => state.write_u8(HASH_KIND_NONE),
            Value::Bool(b) => {
                state.write_u8(HASH_KIND_BOOL);
                b.hash(state);
            }
            Value::Int(0) => hash_int_parts(false, &[], state),
            Value::Int(n) => {
                let (buf, len) = oocmap_core::num::u64_magnitude(n.unsigned_abs());
                hash_int_parts(*n < 0, &buf[..len], state);
            }
            Value::BigInt(n) if n.is_zero() => hash_int_parts(false, &[], state),
            Value::BigInt(n) => {
                let (sign, bytes) = n.to_bytes_le();
                hash_int_parts(sign == Sign::Minus, &bytes, state);
            }
            Value::Float(f) => {
                state.write_u8(HASH_KIND_FLOAT);
                state.write_u64(f.to_bits());
            }
            Value::Str(s) => {
                state.write_u8(HASH_KIND_TEXT);
                s.hash(state);
            }
            Value::Tuple(items) => hash_items(items, state),
            // Must hash like the equal native tuple would, so it works as a
            // key in native dicts interchangeably. Falls back to the id when
            // the store is unreadable, in which case every other operation
            // on it fails too.
            Value::LazyTuple(t) => match t.eager() {
                Ok(items) => hash_items(&items, state),
                Err(_) => {
                    state.write_u8(HASH_KIND_TUPLE);
                    state.write_u64(t.id());
                }
            },
            Value::List(l) => {
                state.write_u8(HASH_KIND_LIST);
                state.write_usize(Rc::as_ptr(l) as usize);
            }
            Value::LazyList(l) => {
                state.write_u8(HASH_KIND_LIST);
                l.identity().hash(state);
            }
            Value::Dict(d) => {
                state.write_u8(HASH_KIND_DICT);
                state.write_usize(Rc::as_ptr(d) as usize);
            }
            Value::LazyDict(d) => {
                state.write_u8(HASH_KIND_DICT);
                d.identity().hash(state);
            }
        }
    }
}

fn seq_partial_cmp(a: &[Value], b: &[Value]) -> Option<Ordering> {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.partial_cmp(y)? {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(a.len().cmp(&b.len()))
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (None, None) => Some(Ordering::Equal),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (BigInt(a), BigInt(b)) => Some(a.cmp(b)),
            (Int(a), BigInt(b)) => Some(num_bigint::BigInt::from(*a).cmp(b.as_ref())),
            (BigInt(a), Int(b)) => Some(a.as_ref().cmp(&num_bigint::BigInt::from(*b))),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Str(a), Str(b)) => Some(a.cmp(b)),
            (Tuple(a), Tuple(b)) => seq_partial_cmp(a, b),
            (List(a), List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Some(Ordering::Equal);
                }
                seq_partial_cmp(&a.borrow(), &b.borrow())
            }
            (LazyTuple(a), LazyTuple(b)) => seq_partial_cmp(&a.eager().ok()?, &b.eager().ok()?),
            (LazyTuple(a), Tuple(b)) => seq_partial_cmp(&a.eager().ok()?, b),
            (Tuple(a), LazyTuple(b)) => seq_partial_cmp(a, &b.eager().ok()?),
            (LazyList(a), LazyList(b)) => seq_partial_cmp(&a.eager().ok()?, &b.eager().ok()?),
            (LazyList(a), List(b)) => seq_partial_cmp(&a.eager().ok()?, &b.borrow()),
            (List(a), LazyList(b)) => seq_partial_cmp(&a.borrow(), &b.eager().ok()?),
            _ => Option::None,
        }
    }
}
