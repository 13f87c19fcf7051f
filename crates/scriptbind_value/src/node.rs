use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::CodecError;

/// Generic structured-data node exchanged between the interpreter and the
/// host runtime.
///
/// Object keys are unique, arrays preserve order, and [`Node::Opaque`]
/// carries an in-process reference that is never serialized. Opaque
/// references are a first-class variant rather than an empty-string
/// convention, so they pass through nested objects and arrays without being
/// mistaken for text.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Node>),
    Object(IndexMap<String, Node>),
    Opaque(OpaqueRef),
}

impl Node {
    /// Empty object node.
    pub fn object() -> Self {
        Node::Object(IndexMap::new())
    }

    /// Object member lookup; `None` for non-objects and missing keys.
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Node::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Projects the node onto JSON.
    ///
    /// # Errors
    ///
    /// Fails with [`CodecError::OpaqueNotSerializable`] if the node contains
    /// an opaque reference at any depth.
    pub fn to_json(&self) -> Result<serde_json::Value, CodecError> {
        match self {
            Node::Null => Ok(serde_json::Value::Null),
            Node::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Node::Int(i) => Ok(serde_json::Value::from(*i)),
            Node::Float(f) => Ok(serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number)),
            Node::Str(s) => Ok(serde_json::Value::String(s.clone())),
            Node::Array(items) => Ok(serde_json::Value::Array(
                items
                    .iter()
                    .map(Node::to_json)
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            Node::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key.clone(), value.to_json()?);
                }
                Ok(serde_json::Value::Object(out))
            }
            Node::Opaque(_) => Err(CodecError::OpaqueNotSerializable),
        }
    }

    /// Builds a node from JSON. Numbers that fit an `i64` become
    /// [`Node::Int`], everything else numeric becomes [`Node::Float`].
    pub fn from_json(value: &serde_json::Value) -> Node {
        match value {
            serde_json::Value::Null => Node::Null,
            serde_json::Value::Bool(b) => Node::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Node::Int(i)
                } else {
                    Node::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Node::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Node::Array(items.iter().map(Node::from_json).collect())
            }
            serde_json::Value::Object(map) => Node::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Node::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Shared in-process reference smuggled through generic containers.
///
/// Equality is pointer identity: two refs are equal only when they share the
/// same allocation. The payload is type-erased; [`OpaqueRef::downcast`]
/// recovers it.
#[derive(Clone)]
pub struct OpaqueRef(Arc<dyn Any + Send + Sync>);

impl OpaqueRef {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn from_arc(value: Arc<dyn Any + Send + Sync>) -> Self {
        Self(value)
    }

    /// Recovers the payload when the concrete type matches.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }
}

impl PartialEq for OpaqueRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for OpaqueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpaqueRef({:p})", Arc::as_ptr(&self.0).cast::<()>())
    }
}
