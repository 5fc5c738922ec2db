//! Cyclic and aliased value graphs: encoding terminates, back-references
//! resolve to the same stored id, and decoding never recurses because it
//! only hands out handles.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use oocmap::{OocMap, OpenOptions, Value};
use tempfile::TempDir;

fn open_map() -> (OocMap, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let map = OocMap::open_with(
        dir.path().join("data.oocmap"),
        OpenOptions::with_map_size(32 * 1024 * 1024),
    )
    .unwrap();
    (map, dir)
}

#[test]
fn self_referential_list() {
    let (map, _dir) = open_map();

    // L = [1]; L.append(L)
    let cell = Rc::new(RefCell::new(vec![Value::from(1)]));
    cell.borrow_mut().push(Value::List(cell.clone()));
    map.insert(&Value::from("L"), &Value::List(cell)).unwrap();

    let outer = map.get(&Value::from("L")).unwrap();
    let outer = outer.as_lazy_list().unwrap();
    assert_eq!(outer.len().unwrap(), 2);
    assert_eq!(outer.get(0).unwrap(), Value::from(1));

    // Following the cycle any number of times lands on the same id.
    let level1 = outer.get(1).unwrap();
    let level1 = level1.as_lazy_list().unwrap();
    assert_eq!(level1.id(), outer.id());

    let level2 = level1.get(1).unwrap();
    let level2 = level2.as_lazy_list().unwrap();
    assert_eq!(level2.get(0).unwrap(), Value::from(1));
    assert_eq!(level2.id(), outer.id());

    // Identity equality between the handle and its own back-reference.
    assert_eq!(map.get(&Value::from("L")).unwrap(), outer.get(1).unwrap());

    // Exactly one list exists: two items plus one sentinel.
    assert_eq!(map.stats().unwrap().list_entries, 3);
}

#[test]
fn self_referential_dict() {
    let (map, _dir) = open_map();

    // D = {1: D}
    let cell = Rc::new(RefCell::new(HashMap::new()));
    cell.borrow_mut()
        .insert(Value::from(1), Value::Dict(cell.clone()));
    map.insert(&Value::from("D"), &Value::Dict(cell)).unwrap();

    let outer = map.get(&Value::from("D")).unwrap();
    let outer = outer.as_lazy_dict().unwrap();
    assert_eq!(outer.len().unwrap(), 1);

    let inner = outer.get(&Value::from(1)).unwrap();
    let inner = inner.as_lazy_dict().unwrap();
    assert_eq!(inner.id(), outer.id());

    let deeper = inner.get(&Value::from(1)).unwrap();
    let deeper = deeper.as_lazy_dict().unwrap();
    assert_eq!(deeper.id(), outer.id());

    // One dict: one item plus one header.
    assert_eq!(map.stats().unwrap().dict_entries, 2);
}

#[test]
fn mutually_referential_list_and_dict() {
    let (map, _dir) = open_map();

    let list = Rc::new(RefCell::new(vec![Value::from("head")]));
    let dict = Rc::new(RefCell::new(HashMap::new()));
    dict.borrow_mut()
        .insert(Value::from("loop"), Value::List(list.clone()));
    list.borrow_mut().push(Value::Dict(dict.clone()));

    map.insert(&Value::from("cycle"), &Value::List(list)).unwrap();

    let outer = map.get(&Value::from("cycle")).unwrap();
    let outer = outer.as_lazy_list().unwrap();
    let dict_handle = outer.get(1).unwrap();
    let dict_handle = dict_handle.as_lazy_dict().unwrap();
    let back = dict_handle.get(&Value::from("loop")).unwrap();
    let back = back.as_lazy_list().unwrap();

    assert_eq!(back.id(), outer.id());
    assert_eq!(back.get(0).unwrap(), Value::from("head"));

    // One list (two items + sentinel), one dict (one item + header).
    let stats = map.stats().unwrap();
    assert_eq!(stats.list_entries, 3);
    assert_eq!(stats.dict_entries, 2);
}

#[test]
fn aliased_values_encode_to_one_container() {
    let (map, _dir) = open_map();

    // The same list appears twice in its parent; both slots must point at
    // one stored list, not two copies.
    let shared = Value::list(vec![Value::from(1)]);
    let outer = Value::list(vec![shared.clone(), shared]);
    map.insert(&Value::from("outer"), &outer).unwrap();

    let read = map.get(&Value::from("outer")).unwrap();
    let read = read.as_lazy_list().unwrap();
    let first = read.get(0).unwrap();
    let second = read.get(1).unwrap();
    assert_eq!(
        first.as_lazy_list().unwrap().id(),
        second.as_lazy_list().unwrap().id()
    );

    // Two lists total: outer (2 items + sentinel) and inner (1 + sentinel).
    assert_eq!(map.stats().unwrap().list_entries, 5);
}

#[test]
fn mutating_through_one_alias_is_visible_through_the_other() {
    let (map, _dir) = open_map();

    let shared = Value::list(vec![Value::from(1)]);
    let outer = Value::list(vec![shared.clone(), shared]);
    map.insert(&Value::from("outer"), &outer).unwrap();

    let read = map.get(&Value::from("outer")).unwrap();
    let read = read.as_lazy_list().unwrap();
    let first = read.get(0).unwrap();
    let second = read.get(1).unwrap();

    first.as_lazy_list().unwrap().push(&Value::from(2)).unwrap();
    assert_eq!(
        second.as_lazy_list().unwrap().eager().unwrap(),
        vec![Value::from(1), Value::from(2)]
    );
}
