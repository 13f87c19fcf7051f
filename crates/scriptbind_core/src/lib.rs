//! Bidirectional glue between an embedded scripting interpreter and an
//! asynchronous RPC binder host.
//!
//! Scripts register APIs, verbs, events, timers and jobs through a
//! [`Bridge`]; the host dispatches inbound traffic back into script
//! callbacks captured as [`ScriptRef`] closures. Every object a script can
//! hold across the boundary is a tag-checked [`GlueHandle`], and every
//! value crossing it goes through the conversion pipeline of
//! `scriptbind_value`.
//!
//! The interpreter engine and the RPC transport are external collaborators:
//! the former is reached only through [`ScriptRef`], the latter only
//! through the `scriptbind_host` traits.

mod bridge;
mod config;
mod dispatch;
mod error;
mod events;
mod handle;
mod jobs;
mod logging;
mod request;
mod script;
mod timers;


pub use bridge::Bridge;
pub use config::{ApiConfig, HandlerConfig, TimerConfig, VerbConfig};
pub use error::GlueError;
pub use handle::{GlueHandle, HandleTag};
pub use logging::LogLevel;
pub use script::{ScriptError, ScriptRef, ScriptThread};
