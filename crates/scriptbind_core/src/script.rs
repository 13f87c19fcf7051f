//! The script side of the bridge: callback references, interpreter flows
//! and error diagnostics.
//!
//! The interpreter engine itself is an external collaborator. The bridge
//! only ever sees it through [`ScriptRef`] closures captured at
//! registration time, so a callback stays invocable for as long as the
//! bridge retains it regardless of what the script does to its globals.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use scriptbind_value::{Node, ScriptValue};
use thiserror::Error;

static NEXT_THREAD: AtomicU64 = AtomicU64::new(1);

/// One interpreter flow. Every dispatch that re-enters the interpreter
/// runs on its own flow derived from the flow that registered it, so a
/// suspended caller never shares a stack with the callback.
#[derive(Debug, Clone)]
pub struct ScriptThread {
    id: u64,
    parent: Option<u64>,
}

impl ScriptThread {
    /// The flow the embedding application starts on.
    #[must_use]
    pub fn main() -> Self {
        Self {
            id: NEXT_THREAD.fetch_add(1, Ordering::Relaxed),
            parent: None,
        }
    }

    /// A fresh flow for a callback dispatched on behalf of this one.
    #[must_use]
    pub fn derive(&self) -> Self {
        Self {
            id: NEXT_THREAD.fetch_add(1, Ordering::Relaxed),
            parent: Some(self.id),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn parent(&self) -> Option<u64> {
        self.parent
    }
}

/// Failure raised by script code during a callback.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ScriptError {
    pub message: String,
    /// Chunk or file the failing code came from. Named `chunk` so the
    /// derive does not treat it as an error cause.
    pub chunk: Option<String>,
    pub line: Option<u32>,
    /// Name of the failing function, when the interpreter knows it.
    pub function: Option<String>,
}

impl ScriptError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            chunk: None,
            line: None,
            function: None,
        }
    }
}

/// Diagnostic payload sent back to callers when a callback fails.
pub(crate) fn diagnostic_node(info: &str, error: &ScriptError) -> Node {
    let mut node = Node::object();
    if let Node::Object(map) = &mut node {
        map.insert("info".to_owned(), Node::Str(info.to_owned()));
        map.insert(
            "source".to_owned(),
            error
                .chunk
                .as_ref()
                .map_or(Node::Null, |chunk| Node::Str(chunk.clone())),
        );
        map.insert(
            "line".to_owned(),
            error.line.map_or(Node::Null, |line| Node::Int(i64::from(line))),
        );
        map.insert(
            "name".to_owned(),
            error
                .function
                .as_ref()
                .map_or(Node::Null, |name| Node::Str(name.clone())),
        );
        map.insert("error".to_owned(), Node::Str(error.message.clone()));
    }
    node
}

type ScriptFn =
    Arc<dyn Fn(&ScriptThread, Vec<ScriptValue>) -> Result<Vec<ScriptValue>, ScriptError> + Send + Sync>;

/// A callable script function, captured when the script registers it.
#[derive(Clone)]
pub struct ScriptRef {
    name: Arc<str>,
    func: ScriptFn,
}

impl ScriptRef {
    pub fn new(
        name: impl Into<Arc<str>>,
        func: impl Fn(&ScriptThread, Vec<ScriptValue>) -> Result<Vec<ScriptValue>, ScriptError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the callback on `thread`.
    ///
    /// # Errors
    ///
    /// Propagates whatever the script code raised.
    pub fn call(
        &self,
        thread: &ScriptThread,
        args: Vec<ScriptValue>,
    ) -> Result<Vec<ScriptValue>, ScriptError> {
        (self.func)(thread, args)
    }
}

impl fmt::Debug for ScriptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRef").field("name", &self.name).finish()
    }
}
