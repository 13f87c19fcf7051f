use indexmap::IndexMap;
use serde_json::json;

use crate::{
    CodecError, Node, OpaqueRef, ReplyCell, ScriptValue, TableKey, node_from_cell,
    node_from_script, nodes_from_cells, script_from_node,
};

fn table(pairs: Vec<(TableKey, ScriptValue)>) -> ScriptValue {
    ScriptValue::Table(pairs)
}

fn skey(k: &str) -> TableKey {
    TableKey::Str(k.to_string())
}

#[test]
fn scalars_round_trip() {
    for node in [
        Node::Null,
        Node::Bool(true),
        Node::Int(-42),
        Node::Float(3.5),
        Node::Str("hello".into()),
    ] {
        let value = script_from_node(&node);
        assert_eq!(node_from_script(&value).unwrap(), node);
    }
}

#[test]
fn nested_nodes_round_trip() {
    let node = Node::Object(IndexMap::from_iter([
        ("uid".to_string(), Node::Str("demo".into())),
        (
            "values".to_string(),
            Node::Array(vec![Node::Int(1), Node::Float(2.5), Node::Null]),
        ),
        (
            "inner".to_string(),
            Node::Object(IndexMap::from_iter([("ok".to_string(), Node::Bool(true))])),
        ),
    ]));

    let value = script_from_node(&node);
    assert_eq!(node_from_script(&value).unwrap(), node);
}

#[test]
fn integral_float_encodes_as_integer() {
    assert_eq!(
        node_from_script(&ScriptValue::Float(3.0)).unwrap(),
        Node::Int(3)
    );
    assert_eq!(
        node_from_script(&ScriptValue::Float(3.5)).unwrap(),
        Node::Float(3.5)
    );
    assert_eq!(
        node_from_script(&ScriptValue::Float(-7.0)).unwrap(),
        Node::Int(-7)
    );
}

#[test]
fn float_decodes_as_float() {
    assert_eq!(script_from_node(&Node::Float(3.5)), ScriptValue::Float(3.5));
    assert_eq!(script_from_node(&Node::Int(3)), ScriptValue::Int(3));
}

#[test]
fn null_decodes_as_nil() {
    assert_eq!(script_from_node(&Node::Null), ScriptValue::Nil);
    assert_eq!(node_from_script(&ScriptValue::Nil).unwrap(), Node::Null);
}

#[test]
fn mixed_keys_are_rejected() {
    let value = table(vec![
        (TableKey::Int(1), ScriptValue::Int(10)),
        (skey("a"), ScriptValue::Int(20)),
    ]);
    assert_eq!(node_from_script(&value), Err(CodecError::MixedKeys));

    // same rejection the other way around
    let value = table(vec![
        (skey("a"), ScriptValue::Int(20)),
        (TableKey::Int(1), ScriptValue::Int(10)),
    ]);
    assert_eq!(node_from_script(&value), Err(CodecError::MixedKeys));
}

#[test]
fn sparse_integer_keys_are_rejected() {
    let value = table(vec![
        (TableKey::Int(1), ScriptValue::Int(10)),
        (TableKey::Int(3), ScriptValue::Int(30)),
    ]);
    assert_eq!(node_from_script(&value), Err(CodecError::SparseKeys));

    let value = table(vec![(TableKey::Int(5), ScriptValue::Int(50))]);
    assert_eq!(node_from_script(&value), Err(CodecError::SparseKeys));
}

#[test]
fn dense_tables_become_arrays_in_key_order() {
    // 1-based, deliberately out of encounter order
    let value = table(vec![
        (TableKey::Int(2), ScriptValue::str("b")),
        (TableKey::Int(1), ScriptValue::str("a")),
        (TableKey::Int(3), ScriptValue::str("c")),
    ]);
    assert_eq!(
        node_from_script(&value).unwrap(),
        Node::Array(vec![
            Node::Str("a".into()),
            Node::Str("b".into()),
            Node::Str("c".into())
        ])
    );

    // 0-based is also accepted
    let value = table(vec![
        (TableKey::Int(0), ScriptValue::Int(1)),
        (TableKey::Int(1), ScriptValue::Int(2)),
    ]);
    assert_eq!(
        node_from_script(&value).unwrap(),
        Node::Array(vec![Node::Int(1), Node::Int(2)])
    );
}

#[test]
fn empty_table_encodes_as_empty_object() {
    assert_eq!(node_from_script(&table(vec![])).unwrap(), Node::object());
}

#[test]
fn arrays_decode_one_based() {
    let node = Node::Array(vec![Node::Str("x".into()), Node::Str("y".into())]);
    let ScriptValue::Table(pairs) = script_from_node(&node) else {
        panic!("expected a table");
    };
    assert_eq!(pairs[0].0, TableKey::Int(1));
    assert_eq!(pairs[1].0, TableKey::Int(2));
}

#[test]
fn opaque_round_trips_through_containers() {
    let marker = OpaqueRef::new(String::from("payload"));
    let value = table(vec![
        (skey("ref"), ScriptValue::Opaque(marker.clone())),
        (skey("tag"), ScriptValue::str("x")),
    ]);

    let node = node_from_script(&value).unwrap();
    let back = script_from_node(&node);
    let ScriptValue::Table(pairs) = back else {
        panic!("expected a table");
    };
    let restored = pairs
        .iter()
        .find(|(k, _)| *k == skey("ref"))
        .and_then(|(_, v)| v.as_opaque())
        .expect("opaque survived");
    // pointer identity is preserved
    assert_eq!(*restored, marker);
    assert_eq!(
        restored.downcast::<String>().unwrap().as_str(),
        "payload"
    );
}

#[test]
fn opaque_is_not_serializable() {
    let node = Node::Array(vec![Node::Opaque(OpaqueRef::new(7_u8))]);
    assert_eq!(node.to_json(), Err(CodecError::OpaqueNotSerializable));
}

#[test]
fn reply_cells_convert() {
    assert_eq!(
        node_from_cell(&ReplyCell::Str("pong".into())).unwrap(),
        Node::Str("pong".into())
    );
    assert_eq!(node_from_cell(&ReplyCell::Bool(true)).unwrap(), Node::Bool(true));
    assert_eq!(node_from_cell(&ReplyCell::I16(-3)).unwrap(), Node::Int(-3));
    assert_eq!(node_from_cell(&ReplyCell::U64(9)).unwrap(), Node::Int(9));
    assert_eq!(node_from_cell(&ReplyCell::F64(1.25)).unwrap(), Node::Float(1.25));
    assert_eq!(
        node_from_cell(&ReplyCell::Json(json!({"a": 1}))).unwrap(),
        Node::Object(IndexMap::from_iter([("a".to_string(), Node::Int(1))]))
    );
}

#[test]
fn blob_cell_is_unsupported() {
    assert_eq!(
        node_from_cell(&ReplyCell::Blob(vec![1, 2, 3])),
        Err(CodecError::UnsupportedReplyType("blob"))
    );
    // the error names the first offending cell, not the whole batch
    assert!(nodes_from_cells(&[ReplyCell::Bool(true), ReplyCell::Blob(vec![])]).is_err());
}

#[test]
fn json_projection_round_trips() {
    let json = json!({"uid": "demo", "count": 3, "ratio": 0.5, "tags": ["a", "b"], "none": null});
    let node = Node::from_json(&json);
    assert_eq!(node.to_json().unwrap(), json);
}
