//! End-to-end tests for the root mapping: every supported value kind round
//! trips, dedup of immutable payloads, persistence across reopen, and the
//! failure paths that must leave no partial state behind.

use num_bigint::BigInt;
use oocmap::{OocMap, OocMapError, OpenOptions, Value};
use tempfile::TempDir;

const SMALL_MAP: usize = 32 * 1024 * 1024;

fn open_map() -> (OocMap, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let map = OocMap::open_with(
        dir.path().join("data.oocmap"),
        OpenOptions::with_map_size(SMALL_MAP),
    )
    .unwrap();
    (map, dir)
}

fn sample_values() -> Vec<(&'static str, Value)> {
    vec![
        ("smallint", Value::from(42)),
        (
            "largeint",
            Value::from("162259276829213363391578010288127".parse::<BigInt>().unwrap()),
        ),
        ("negint", Value::from(-81985529216486895i64)),
        ("float", Value::Float(1.0 / 3.0)),
        ("smallstr", Value::from("ok")),
        ("longstr", Value::from("Wer lesen kann ist klar im Vorteil.")),
        ("eightstr", Value::from("12345678")),
        ("unicode", Value::from("八百屋 🦀")),
        ("bool", Value::from(true)),
        ("none", Value::None),
        ("emptytuple", Value::tuple(vec![])),
        (
            "tuple",
            Value::tuple(vec![
                Value::from(1),
                Value::from(true),
                Value::from(false),
                Value::from(0),
                Value::from(2),
                Value::from(3),
            ]),
        ),
        ("list", Value::list(vec![Value::from(2), Value::from(3)])),
        (
            "dict",
            Value::dict(vec![
                (Value::from(1), Value::from("eins")),
                (Value::from(2), Value::from("zwei")),
            ]),
        ),
    ]
}

#[test]
fn every_kind_round_trips() {
    let (map, _dir) = open_map();
    let values = sample_values();

    for (key, value) in &values {
        map.insert(&Value::from(*key), value).unwrap();
    }
    assert_eq!(map.len().unwrap(), values.len() as u64);

    for (key, value) in &values {
        let retrieved = map.get(&Value::from(*key)).unwrap();
        assert_eq!(&retrieved, value, "round trip failed for {key}");

        map.remove(&Value::from(*key)).unwrap();
        assert!(matches!(
            map.get(&Value::from(*key)),
            Err(OocMapError::KeyNotFound(_))
        ));
        assert!(!map.contains(&Value::from(*key)).unwrap());
    }
    assert_eq!(map.len().unwrap(), 0);
}

#[test]
fn values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.oocmap");

    {
        let map =
            OocMap::open_with(&path, OpenOptions::with_map_size(SMALL_MAP)).unwrap();
        map.insert(&Value::from("answer"), &Value::from(42)).unwrap();
        assert_eq!(map.len().unwrap(), 1);
    }

    let map = OocMap::open_with(&path, OpenOptions::with_map_size(SMALL_MAP)).unwrap();
    assert_eq!(map.len().unwrap(), 1);
    assert_eq!(map.get(&Value::from("answer")).unwrap(), Value::from(42));

    map.remove(&Value::from("answer")).unwrap();
    assert!(!map.contains(&Value::from("answer")).unwrap());
}

#[test]
fn equal_strings_are_stored_once() {
    let (map, _dir) = open_map();
    map.insert(&Value::from("a"), &Value::from("aaaaaaaaaa"))
        .unwrap();
    map.insert(&Value::from("b"), &Value::from("aaaaaaaaaa"))
        .unwrap();

    let stats = map.stats().unwrap();
    assert_eq!(stats.root_entries, 2);
    assert_eq!(stats.string_entries, 1);
}

#[test]
fn content_hashes_are_stable_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.oocmap");
    let long = "the same long string in both sessions";

    {
        let map =
            OocMap::open_with(&path, OpenOptions::with_map_size(SMALL_MAP)).unwrap();
        map.insert(&Value::from("first"), &Value::from(long)).unwrap();
    }

    let map = OocMap::open_with(&path, OpenOptions::with_map_size(SMALL_MAP)).unwrap();
    map.insert(&Value::from("second"), &Value::from(long)).unwrap();
    assert_eq!(map.stats().unwrap().string_entries, 1);
}

#[test]
fn equal_tuples_are_stored_once() {
    let (map, _dir) = open_map();
    let tuple = Value::tuple(vec![Value::from(1), Value::from("two"), Value::from(3.0)]);
    map.insert(&Value::from("x"), &tuple).unwrap();
    map.insert(&Value::from("y"), &tuple).unwrap();
    assert_eq!(map.stats().unwrap().tuple_entries, 1);
}

#[test]
fn big_integers_spill_to_their_table() {
    let (map, _dir) = open_map();

    // Nine magnitude bytes force the content-addressed path.
    let big: BigInt = "18446744073709551616".parse().unwrap(); // 2^64
    map.insert(&Value::from("big"), &Value::from(big.clone()))
        .unwrap();
    assert_eq!(map.stats().unwrap().int_entries, 1);
    assert_eq!(map.get(&Value::from("big")).unwrap(), Value::from(big));

    // Eight magnitude bytes still fit inline.
    let edge: BigInt = "18446744073709551615".parse().unwrap(); // 2^64 - 1
    map.insert(&Value::from("edge"), &Value::from(edge.clone()))
        .unwrap();
    assert_eq!(map.stats().unwrap().int_entries, 1);
    assert_eq!(map.get(&Value::from("edge")).unwrap(), Value::from(edge));

    let negative: BigInt = "-162259276829213363391578010288127".parse().unwrap();
    map.insert(&Value::from("neg"), &Value::from(negative.clone()))
        .unwrap();
    assert_eq!(map.get(&Value::from("neg")).unwrap(), Value::from(negative));
}

#[test]
fn i64_extremes_round_trip() {
    let (map, _dir) = open_map();
    for (key, value) in [
        ("min", i64::MIN),
        ("max", i64::MAX),
        ("minus_one", -1),
        ("zero", 0),
    ] {
        map.insert(&Value::from(key), &Value::from(value)).unwrap();
        assert_eq!(
            map.get(&Value::from(key)).unwrap(),
            Value::from(value),
            "failed for {key}"
        );
    }
}

#[test]
fn unhashable_keys_are_rejected_without_side_effects() {
    let (map, _dir) = open_map();

    let dict_key = Value::dict(vec![]);
    assert!(matches!(
        map.insert(&dict_key, &Value::from(1)),
        Err(OocMapError::Unhashable("dict"))
    ));

    let list_key = Value::list(vec![Value::from(1)]);
    assert!(matches!(
        map.insert(&list_key, &Value::from(1)),
        Err(OocMapError::Unhashable("list"))
    ));
    assert!(matches!(
        map.get(&list_key),
        Err(OocMapError::Unhashable("list"))
    ));

    assert_eq!(map.len().unwrap(), 0);
    let stats = map.stats().unwrap();
    assert_eq!(stats.list_entries, 0);
    assert_eq!(stats.dict_entries, 0);
}

#[test]
fn failed_value_encode_leaves_no_partial_state() {
    let (map, _dir) = open_map();

    // The value is a dict with a list as key: the key is only discovered
    // unhashable while the value is being encoded, after the root key went
    // through. The aborted transaction must drop all of it.
    let bad_value = Value::dict(vec![(
        Value::list(vec![Value::from(1)]),
        Value::from("x"),
    )]);
    assert!(matches!(
        map.insert(&Value::from("k"), &bad_value),
        Err(OocMapError::MutableValueNotAllowed)
    ));

    assert_eq!(map.len().unwrap(), 0);
    let stats = map.stats().unwrap();
    assert_eq!(stats.dict_entries, 0);
    assert_eq!(stats.list_entries, 0);
    assert_eq!(stats.string_entries, 0);
}

#[test]
fn missing_key_lookup_writes_nothing() {
    let (map, _dir) = open_map();

    let absent = Value::from("a key nobody ever inserted");
    assert!(matches!(
        map.get(&absent),
        Err(OocMapError::KeyNotFound(_))
    ));

    let absent_tuple = Value::tuple(vec![Value::from("absent"), Value::from(99)]);
    assert!(matches!(
        map.get(&absent_tuple),
        Err(OocMapError::KeyNotFound(_))
    ));

    let stats = map.stats().unwrap();
    assert_eq!(stats.string_entries, 0);
    assert_eq!(stats.tuple_entries, 0);
    assert_eq!(stats.int_entries, 0);
}

#[test]
fn removing_a_missing_key_reports_not_found() {
    let (map, _dir) = open_map();
    assert!(matches!(
        map.remove(&Value::from("absent")),
        Err(OocMapError::KeyNotFound(_))
    ));
    // A never-seen long key proves its own absence without being written.
    assert!(matches!(
        map.remove(&Value::from("an absent key that is long enough to spill")),
        Err(OocMapError::KeyNotFound(_))
    ));
    assert_eq!(map.stats().unwrap().string_entries, 0);
}

#[test]
fn overwriting_a_key_keeps_len_stable() {
    let (map, _dir) = open_map();
    let key = Value::from("k");
    map.insert(&key, &Value::from(1)).unwrap();
    map.insert(&key, &Value::from("now a string")).unwrap();
    assert_eq!(map.len().unwrap(), 1);
    assert_eq!(map.get(&key).unwrap(), Value::from("now a string"));
}

#[test]
fn heterogeneous_keys_coexist() {
    let (map, _dir) = open_map();
    map.insert(&Value::from(999), &Value::from("int key")).unwrap();
    map.insert(&Value::from("999"), &Value::from("str key")).unwrap();
    map.insert(&Value::None, &Value::from("none key")).unwrap();
    map.insert(&Value::from(true), &Value::from("bool key")).unwrap();
    map.insert(
        &Value::tuple(vec![Value::from(9), Value::from(9)]),
        &Value::from("tuple key"),
    )
    .unwrap();

    assert_eq!(map.len().unwrap(), 5);
    assert_eq!(map.get(&Value::from(999)).unwrap(), Value::from("int key"));
    assert_eq!(map.get(&Value::from("999")).unwrap(), Value::from("str key"));
    assert_eq!(map.get(&Value::None).unwrap(), Value::from("none key"));
    assert_eq!(map.get(&Value::from(true)).unwrap(), Value::from("bool key"));
    assert_eq!(
        map.get(&Value::tuple(vec![Value::from(9), Value::from(9)]))
            .unwrap(),
        Value::from("tuple key")
    );
}
