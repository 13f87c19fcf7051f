//! Conversion rules between interpreter values and structured-data nodes.

use indexmap::IndexMap;

use crate::error::CodecError;
use crate::node::Node;
use crate::script::{ScriptValue, TableKey};

/// Converts an interpreter value into a structured-data node.
///
/// Scalars map directly. Tables become objects when every key is a string
/// and arrays when every key is an integer forming a dense 0- or 1-based
/// range; an empty table becomes an empty object.
///
/// # Errors
///
/// [`CodecError::MixedKeys`] when a table carries both string and integer
/// keys, [`CodecError::SparseKeys`] when integer keys are not dense.
pub fn node_from_script(value: &ScriptValue) -> Result<Node, CodecError> {
    match value {
        ScriptValue::Nil => Ok(Node::Null),
        ScriptValue::Bool(b) => Ok(Node::Bool(*b)),
        ScriptValue::Int(i) => Ok(Node::Int(*i)),
        ScriptValue::Float(f) => Ok(float_node(*f)),
        ScriptValue::Str(s) => Ok(Node::Str(s.clone())),
        ScriptValue::Opaque(r) => Ok(Node::Opaque(r.clone())),
        ScriptValue::Table(pairs) => table_to_node(pairs),
    }
}

/// Converts a node back into an interpreter value.
///
/// Objects become string-keyed tables in key order, arrays become 1-based
/// integer-keyed tables, null becomes a real nil value.
pub fn script_from_node(node: &Node) -> ScriptValue {
    match node {
        Node::Null => ScriptValue::Nil,
        Node::Bool(b) => ScriptValue::Bool(*b),
        Node::Int(i) => ScriptValue::Int(*i),
        Node::Float(f) => ScriptValue::Float(*f),
        Node::Str(s) => ScriptValue::Str(s.clone()),
        Node::Opaque(r) => ScriptValue::Opaque(r.clone()),
        Node::Array(items) => ScriptValue::Table(
            items
                .iter()
                .enumerate()
                .map(|(idx, item)| (TableKey::Int(idx as i64 + 1), script_from_node(item)))
                .collect(),
        ),
        Node::Object(map) => ScriptValue::Table(
            map.iter()
                .map(|(key, item)| (TableKey::Str(key.clone()), script_from_node(item)))
                .collect(),
        ),
    }
}

/// Floats numerically equal to their integer truncation encode as integer
/// nodes, preserving the interpreter's single-number-type round trip.
pub(crate) fn float_node(f: f64) -> Node {
    let truncated = f.trunc();
    if f == truncated && (i64::MIN as f64..=i64::MAX as f64).contains(&truncated) {
        Node::Int(truncated as i64)
    } else {
        Node::Float(f)
    }
}

fn table_to_node(pairs: &[(TableKey, ScriptValue)]) -> Result<Node, CodecError> {
    // An empty table carries no key evidence either way; encode it as an
    // empty object rather than dropping the value.
    if pairs.is_empty() {
        return Ok(Node::object());
    }

    let mut object: Option<IndexMap<String, Node>> = None;
    let mut array: Option<Vec<(i64, Node)>> = None;

    for (key, value) in pairs {
        let node = node_from_script(value)?;
        match key {
            TableKey::Str(k) => {
                if array.is_some() {
                    return Err(CodecError::MixedKeys);
                }
                object.get_or_insert_with(IndexMap::new).insert(k.clone(), node);
            }
            TableKey::Int(i) => {
                if object.is_some() {
                    return Err(CodecError::MixedKeys);
                }
                array.get_or_insert_with(Vec::new).push((*i, node));
            }
        }
    }

    if let Some(map) = object {
        return Ok(Node::Object(map));
    }

    let mut entries = array.unwrap_or_default();
    entries.sort_by_key(|(idx, _)| *idx);
    let base = entries[0].0;
    if base != 0 && base != 1 {
        return Err(CodecError::SparseKeys);
    }
    let dense = entries
        .iter()
        .enumerate()
        .all(|(pos, (idx, _))| *idx == base + pos as i64);
    if !dense {
        return Err(CodecError::SparseKeys);
    }

    Ok(Node::Array(entries.into_iter().map(|(_, node)| node).collect()))
}
