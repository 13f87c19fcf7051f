use scriptbind_host::HostError;
use scriptbind_value::CodecError;
use thiserror::Error;

use crate::handle::HandleTag;
use crate::script::ScriptError;

/// Everything the bridge can refuse to do, surfaced to the script layer.
#[derive(Debug, Error)]
pub enum GlueError {
    #[error("expected a {expected} handle, got a {actual} handle")]
    WrongHandleKind {
        expected: HandleTag,
        actual: HandleTag,
    },

    #[error("invalid {0} argument")]
    InvalidArgument(&'static str),

    #[error("bad {hint} config: {source}")]
    ConfigSchema {
        hint: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("request already replied")]
    AlreadyReplied,

    #[error("binder already configured")]
    AlreadyConfigured,

    #[error("callback returned a non-integer status")]
    BadCallbackReturn,

    #[error("event is no longer valid")]
    DefunctEvent,

    #[error("timer already released")]
    TimerReleased,

    #[error("no config attached to {0} handle")]
    NoConfig(HandleTag),

    #[error("host call failed: {0}")]
    Host(#[from] HostError),

    #[error("script error: {0}")]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
