//! Transplanting values between stores: a lazy handle owned by store A,
//! written into store B, materializes from A and is copied into B without
//! touching A.

use oocmap::{OocMap, OpenOptions, Value};
use tempfile::TempDir;

fn open_map(name: &str) -> (OocMap, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let map = OocMap::open_with(
        dir.path().join(name),
        OpenOptions::with_map_size(32 * 1024 * 1024),
    )
    .unwrap();
    (map, dir)
}

#[test]
fn list_handles_transplant_between_stores() {
    let (a, _dir_a) = open_map("a.oocmap");
    let (b, _dir_b) = open_map("b.oocmap");

    let items: Vec<Value> = (0..1000i64).map(Value::from).collect();
    a.insert(&Value::from("xs"), &Value::list(items.clone()))
        .unwrap();

    // Assign A's lazy handle into B.
    let handle = a.get(&Value::from("xs")).unwrap();
    b.insert(&Value::from("copy"), &handle).unwrap();

    let copied = b.get(&Value::from("copy")).unwrap();
    let copied = copied.as_lazy_list().unwrap();
    assert_eq!(copied.len().unwrap(), 1000);
    assert_eq!(copied.eager().unwrap(), items);
    assert_eq!(copied.get(999).unwrap(), Value::from(999));

    // A is unaffected.
    let original = a.get(&Value::from("xs")).unwrap();
    let original = original.as_lazy_list().unwrap();
    assert_eq!(original.len().unwrap(), 1000);
    assert_eq!(a.stats().unwrap().list_entries, 1001);

    // The copy is independent: mutating B leaves A alone.
    copied.push(&Value::from("extra")).unwrap();
    assert_eq!(original.len().unwrap(), 1000);
}

#[test]
fn nested_structures_transplant_deeply() {
    let (a, _dir_a) = open_map("a.oocmap");
    let (b, _dir_b) = open_map("b.oocmap");

    a.insert(
        &Value::from(1033),
        &Value::list(vec![
            Value::from("one"),
            Value::from("two"),
            Value::from("three"),
        ]),
    )
    .unwrap();
    a.insert(
        &Value::from(1031),
        &Value::list(vec![
            Value::from("eins"),
            Value::from("zwei"),
            Value::from("drei"),
        ]),
    )
    .unwrap();
    a.insert(
        &Value::from(1041),
        &Value::list(vec![
            Value::from("一"),
            Value::from("二"),
            Value::from("三"),
        ]),
    )
    .unwrap();

    let combined = Value::list(vec![
        a.get(&Value::from(1033)).unwrap(),
        a.get(&Value::from(1031)).unwrap(),
        a.get(&Value::from(1041)).unwrap(),
    ]);
    b.insert(&Value::from(0), &combined).unwrap();

    let expected = Value::list(vec![
        Value::list(vec![
            Value::from("one"),
            Value::from("two"),
            Value::from("three"),
        ]),
        Value::list(vec![
            Value::from("eins"),
            Value::from("zwei"),
            Value::from("drei"),
        ]),
        Value::list(vec![
            Value::from("一"),
            Value::from("二"),
            Value::from("三"),
        ]),
    ]);
    assert_eq!(b.get(&Value::from(0)).unwrap(), expected);
}

#[test]
fn tuple_handles_transplant_between_stores() {
    let (a, _dir_a) = open_map("a.oocmap");
    let (b, _dir_b) = open_map("b.oocmap");

    let tuple = Value::tuple(vec![Value::from(1), Value::from("two"), Value::from(3.0)]);
    a.insert(&Value::from("t"), &tuple).unwrap();

    let handle = a.get(&Value::from("t")).unwrap();
    b.insert(&Value::from("t"), &handle).unwrap();

    assert_eq!(b.get(&Value::from("t")).unwrap(), tuple);
    assert_eq!(b.stats().unwrap().tuple_entries, 1);
}

#[test]
fn dict_handles_transplant_between_stores() {
    let (a, _dir_a) = open_map("a.oocmap");
    let (b, _dir_b) = open_map("b.oocmap");

    let dict = Value::dict(vec![
        (Value::from("k1"), Value::from(1)),
        (Value::from("k2"), Value::list(vec![Value::from(2)])),
    ]);
    a.insert(&Value::from("d"), &dict).unwrap();

    let handle = a.get(&Value::from("d")).unwrap();
    b.insert(&Value::from("d"), &handle).unwrap();

    let copied = b.get(&Value::from("d")).unwrap();
    assert_eq!(copied, dict);

    // Mutating the copy does not reach back into A.
    copied
        .as_lazy_dict()
        .unwrap()
        .insert(&Value::from("k3"), &Value::from(3))
        .unwrap();
    let original = a.get(&Value::from("d")).unwrap();
    assert_eq!(original.as_lazy_dict().unwrap().len().unwrap(), 2);
}

#[test]
fn same_store_handles_reencode_by_reference() {
    let (a, _dir_a) = open_map("a.oocmap");

    a.insert(&Value::from("xs"), &Value::list(vec![Value::from(1)]))
        .unwrap();
    let handle = a.get(&Value::from("xs")).unwrap();

    // Storing the handle under a second key must alias, not copy.
    a.insert(&Value::from("same"), &handle).unwrap();
    let first = a.get(&Value::from("xs")).unwrap();
    let second = a.get(&Value::from("same")).unwrap();
    assert_eq!(
        first.as_lazy_list().unwrap().id(),
        second.as_lazy_list().unwrap().id()
    );

    // Still just one stored list.
    assert_eq!(a.stats().unwrap().list_entries, 2);

    second.as_lazy_list().unwrap().push(&Value::from(2)).unwrap();
    assert_eq!(first.as_lazy_list().unwrap().len().unwrap(), 2);
}
