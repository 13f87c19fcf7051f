//! Operation surface the bridge consumes from the host runtime.

use std::any::Any;
use std::sync::Arc;

use scriptbind_value::{Node, ReplyCell};

use crate::HostError;

/// Identity of an API registered with (or imported into) the host.
pub trait NativeApi: Send + Sync {
    fn name(&self) -> &str;
}

pub type ApiRef = Arc<dyn NativeApi>;

/// An inbound RPC request owned by the host.
///
/// The host serializes all re-entries into a given interpreter state; a
/// request is only ever touched by the flow currently dispatching it.
pub trait NativeRequest: Send + Sync {
    fn api(&self) -> ApiRef;

    fn verb(&self) -> &str;

    /// Submits the reply. Delivery and request release belong to the host;
    /// the bridge guarantees it calls this at most once per request.
    fn reply(&self, status: i32, cells: Vec<ReplyCell>);

    /// Subscribes the requesting client to an event.
    ///
    /// # Errors
    ///
    /// Fails when the event is no longer valid or the session is gone.
    fn subscribe(&self, event: &dyn NativeEvent) -> Result<(), HostError>;

    /// # Errors
    ///
    /// Fails when the client was not subscribed or the event is invalid.
    fn unsubscribe(&self, event: &dyn NativeEvent) -> Result<(), HostError>;

    /// Session/client description, when the transport carries one.
    fn client_info(&self) -> Option<Node>;

    /// Sets the session level of assurance.
    ///
    /// # Errors
    ///
    /// Fails when the request has no valid session.
    fn set_loa(&self, level: i32) -> Result<(), HostError>;

    /// Registers a finalizer run when the host releases the request object.
    fn on_release(&self, finalizer: Box<dyn FnOnce() + Send>);
}

/// A broadcastable event owned by the host.
pub trait NativeEvent: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the underlying event object is still usable.
    fn is_valid(&self) -> bool;

    /// Pushes a payload to current subscribers.
    ///
    /// # Errors
    ///
    /// Fails when the event object is no longer valid.
    fn push(&self, cells: Vec<ReplyCell>) -> Result<(), HostError>;
}

/// A periodic timer owned by the host's timer wheel.
pub trait NativeTimer: Send + Sync {
    fn addref(&self);
    fn unref(&self);
}

/// Suspension token handed to a scheduler-wait callback; releasing it
/// through [`HostRuntime::sched_leave`] resumes the parked flow.
pub trait SchedToken: Send + Sync {
    /// Concrete-token escape hatch for host implementations.
    fn as_any(&self) -> &dyn Any;
}

/// Identifier of a posted deferred job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub i64);

/// Lifecycle states forwarded to an API control callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiState {
    Root,
    Config,
    Ready,
    Class,
    Orphan,
    Exit,
}

impl ApiState {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiState::Root => "root",
            ApiState::Config => "config",
            ApiState::Ready => "ready",
            ApiState::Class => "class",
            ApiState::Orphan => "orphan",
            ApiState::Exit => "exit",
        }
    }
}

/// Invoked by the host for each inbound call on a registered verb.
pub type VerbDispatch = Arc<dyn Fn(Arc<dyn NativeRequest>, Vec<ReplyCell>) + Send + Sync>;

/// Invoked by the host for each delivered event; arguments are the concrete
/// event name and the payload cells.
pub type EventDispatch = Arc<dyn Fn(&str, Vec<ReplyCell>) + Send + Sync>;

/// Invoked by the host on each timer tick with the remaining run count
/// (1 on the final tick of a bounded timer, 0 for unbounded timers).
pub type TimerDispatch = Arc<dyn Fn(u32) + Send + Sync>;

/// Invoked by the host on API lifecycle transitions; returns a status
/// (non-zero aborts the transition).
pub type ControlDispatch = Arc<dyn Fn(ApiState) -> i32 + Send + Sync>;

/// Invoked by the host for the auto-generated introspection verb.
pub type InfoDispatch = Arc<dyn Fn(Arc<dyn NativeRequest>) + Send + Sync>;

/// Invoked exactly once when an asynchronous subcall completes. `Err` means
/// the binder refused the call and no verb ever ran.
pub type ReplyDispatch = Box<dyn FnOnce(Result<(i32, Vec<ReplyCell>), HostError>) + Send>;

/// Invoked exactly once inside the scheduler once the calling flow is
/// parked; receives the token that resumes it.
pub type WaitDispatch = Box<dyn FnOnce(Arc<dyn SchedToken>) + Send>;

/// Invoked exactly once when a posted job fires. An aborted job is simply
/// dropped without invocation.
pub type JobDispatch = Box<dyn FnOnce() + Send + Sync>;

/// Invoked once inside the mainloop when the host is ready to serve.
pub type StartupDispatch = Box<dyn FnOnce() -> i32 + Send>;

/// Callbacks wired into an API at registration time.
pub struct ApiHooks {
    pub control: Option<ControlDispatch>,
    pub info: InfoDispatch,
    /// Catch-all dispatch for verbs without an individual registration.
    pub verb: VerbDispatch,
    /// Orphan-event sink for events reaching the API without a handler.
    pub event: EventDispatch,
}

/// The host runtime as the bridge consumes it.
///
/// Implementations are free to be multi-threaded internally but must
/// serialize all invocations of the dispatch closures they were handed;
/// the bridge relies on one active interpreter call at a time.
pub trait HostRuntime: Send + Sync {
    /// Registers a local API and wires its lifecycle hooks.
    ///
    /// # Errors
    ///
    /// Fails when the name is taken or the config is unusable.
    fn register_api(&self, config: &Node, hooks: ApiHooks) -> Result<ApiRef, HostError>;

    /// Imports a remote API advertised at a URI.
    ///
    /// # Errors
    ///
    /// Fails when the import target cannot be resolved.
    fn import_api(&self, config: &Node) -> Result<(), HostError>;

    /// The process-default API scope.
    fn root_api(&self) -> ApiRef;

    /// Registers one verb on an API.
    ///
    /// # Errors
    ///
    /// Fails when the config lacks a verb name or the verb already exists.
    fn register_verb(
        &self,
        api: &ApiRef,
        config: &Node,
        dispatch: VerbDispatch,
    ) -> Result<(), HostError>;

    /// Registers an event-pattern handler on an API.
    ///
    /// # Errors
    ///
    /// Fails when the pattern is invalid or the uid is taken.
    fn register_event_handler(
        &self,
        api: &ApiRef,
        uid: &str,
        pattern: &str,
        dispatch: EventDispatch,
    ) -> Result<(), HostError>;

    /// Creates a broadcastable event scoped to an API.
    ///
    /// # Errors
    ///
    /// Fails when the API cannot own events.
    fn create_event(&self, api: &ApiRef, label: &str) -> Result<Arc<dyn NativeEvent>, HostError>;

    /// Creates a timer firing every `period_ms`, `count` times (0 means
    /// unbounded). The returned timer starts with one host-side reference.
    ///
    /// # Errors
    ///
    /// Fails when the timer wheel rejects the parameters.
    fn create_timer(
        &self,
        period_ms: u32,
        count: u32,
        dispatch: TimerDispatch,
    ) -> Result<Arc<dyn NativeTimer>, HostError>;

    /// Issues an asynchronous subcall; `on_reply` is consumed exactly once.
    fn call(
        &self,
        api: &ApiRef,
        api_name: &str,
        verb: &str,
        args: Vec<ReplyCell>,
        on_reply: ReplyDispatch,
    );

    /// Issues a subcall and parks the calling flow until it completes.
    ///
    /// # Errors
    ///
    /// `Err` is a binder refusal: the call never reached a verb.
    fn call_sync(
        &self,
        api: &ApiRef,
        api_name: &str,
        verb: &str,
        args: Vec<ReplyCell>,
    ) -> Result<(i32, Vec<ReplyCell>), HostError>;

    /// Parks the calling flow and runs `wait` inside the scheduler with the
    /// resumption token. Returns once the token is released or the timeout
    /// elapses.
    ///
    /// # Errors
    ///
    /// Fails on timeout or scheduler rejection.
    fn sched_enter(&self, timeout_ms: i32, wait: WaitDispatch) -> Result<(), HostError>;

    /// Releases a suspension token, resuming the parked flow.
    ///
    /// # Errors
    ///
    /// Fails when the token is unknown or already released.
    fn sched_leave(&self, token: &Arc<dyn SchedToken>) -> Result<(), HostError>;

    /// Schedules a deferred job.
    ///
    /// # Errors
    ///
    /// Fails when the scheduler rejects the job.
    fn post_job(&self, delay_ms: i32, job: JobDispatch) -> Result<JobId, HostError>;

    /// Aborts a posted job before it fires.
    ///
    /// # Errors
    ///
    /// Fails when the job already fired or is unknown.
    fn abort_job(&self, id: JobId) -> Result<(), HostError>;

    /// Loads an external binding described by `config`.
    ///
    /// # Errors
    ///
    /// Fails when the binding cannot be located or initialized.
    fn load_binding(&self, config: &Node) -> Result<(), HostError>;

    /// Enters the mainloop; `startup` runs once the host is ready. Returns
    /// the final exit status.
    fn start(&self, startup: Option<StartupDispatch>) -> i32;

    /// Requests process shutdown with `code`.
    fn exit(&self, code: i32);
}
