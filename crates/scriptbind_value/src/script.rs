use crate::node::OpaqueRef;

/// A value as the embedded interpreter sees it.
///
/// Tables keep their entries in encounter order; whether a table is an
/// "array" or an "object" is decided at conversion time from its keys.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Table(Vec<(TableKey, ScriptValue)>),
    Opaque(OpaqueRef),
}

/// Table key; interpreters in scope index tables by strings or integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableKey {
    Int(i64),
    Str(String),
}

impl ScriptValue {
    pub fn str(value: impl Into<String>) -> Self {
        ScriptValue::Str(value.into())
    }

    /// Wraps a shareable payload as an opaque reference value.
    pub fn opaque<T: std::any::Any + Send + Sync>(value: T) -> Self {
        ScriptValue::Opaque(OpaqueRef::new(value))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScriptValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&OpaqueRef> {
        match self {
            ScriptValue::Opaque(r) => Some(r),
            _ => None,
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        ScriptValue::Bool(value)
    }
}

impl From<i64> for ScriptValue {
    fn from(value: i64) -> Self {
        ScriptValue::Int(value)
    }
}

impl From<f64> for ScriptValue {
    fn from(value: f64) -> Self {
        ScriptValue::Float(value)
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        ScriptValue::Str(value.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        ScriptValue::Str(value)
    }
}
