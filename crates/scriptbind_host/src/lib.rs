//! Host-runtime contract consumed by the script bridge.
//!
//! The RPC binder, its event bus, scheduler and timer wheel are external
//! collaborators; this crate defines the operations the bridge consumes from
//! them ([`HostRuntime`] and the native-object traits) without implementing
//! any transport. The [`mock`] module provides a complete in-memory host
//! used by the bridge test-suite.

mod error;
pub mod mock;
mod runtime;

pub use error::HostError;
pub use runtime::{
    ApiHooks, ApiRef, ApiState, ControlDispatch, EventDispatch, HostRuntime, InfoDispatch,
    JobDispatch, JobId, NativeApi, NativeEvent, NativeRequest, NativeTimer, ReplyDispatch,
    SchedToken, StartupDispatch, TimerDispatch, VerbDispatch, WaitDispatch,
};
