//! Tagged handles exchanged with script code.
//!
//! Every bridge object a script can hold (the binder itself, APIs,
//! requests, events, timers, scheduler locks, jobs, event handlers) is a
//! [`GlueHandle`]. Scripts receive them as opaque values and pass them
//! back as the first argument of bridge operations; the tag check turns a
//! handle of the wrong kind into a typed error instead of undefined
//! behavior.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use scriptbind_host::{ApiRef, HostRuntime, JobId, NativeEvent, NativeRequest, NativeTimer, SchedToken};
use scriptbind_value::{Node, ScriptValue};

use crate::error::GlueError;
use crate::script::{ScriptRef, ScriptThread};

/// Handle discriminant, used in error messages and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleTag {
    Binder,
    Api,
    Request,
    Event,
    Timer,
    Lock,
    Job,
    Handler,
}

impl fmt::Display for HandleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HandleTag::Binder => "binder",
            HandleTag::Api => "api",
            HandleTag::Request => "request",
            HandleTag::Event => "event",
            HandleTag::Timer => "timer",
            HandleTag::Lock => "lock",
            HandleTag::Job => "job",
            HandleTag::Handler => "handler",
        };
        f.write_str(label)
    }
}

pub(crate) struct BinderHandle {
    pub(crate) config: OnceLock<Node>,
    pub(crate) ping_count: AtomicI64,
}

pub(crate) struct ApiHandle {
    pub(crate) config: Node,
    /// Set once the host finishes registering the API; stays empty for
    /// imported APIs, which only exist on the host side.
    pub(crate) native: OnceLock<ApiRef>,
    /// Verb configs accumulated for the introspection verb.
    pub(crate) verbs: RwLock<Vec<Node>>,
}

pub(crate) struct RequestHandle {
    pub(crate) api: GlueHandle,
    pub(crate) native: Arc<dyn NativeRequest>,
    pub(crate) thread: ScriptThread,
    pub(crate) replied: AtomicBool,
}

pub(crate) struct EventHandle {
    pub(crate) api: GlueHandle,
    pub(crate) native: Arc<dyn NativeEvent>,
    pub(crate) pushed: AtomicU64,
}

pub(crate) struct TimerHandle {
    /// Handle the timer was created on; subcalls and api lookups resolve
    /// through it.
    pub(crate) scope: GlueHandle,
    pub(crate) config: Node,
    pub(crate) callback: ScriptRef,
    pub(crate) context: ScriptValue,
    pub(crate) native: OnceLock<Arc<dyn NativeTimer>>,
    /// Script-visible reference count; the bridge holds the initial one.
    pub(crate) usage: AtomicI32,
}

pub(crate) struct LockHandle {
    pub(crate) scope: GlueHandle,
    pub(crate) callback: ScriptRef,
    pub(crate) context: ScriptValue,
    pub(crate) token: Mutex<Option<Arc<dyn SchedToken>>>,
    pub(crate) status: AtomicI32,
}

pub(crate) struct JobHandle {
    pub(crate) scope: GlueHandle,
    /// Assigned once the scheduler accepts the job.
    pub(crate) id: OnceLock<JobId>,
}

pub(crate) struct HandlerHandle {
    pub(crate) scope: GlueHandle,
    pub(crate) config: Node,
    pub(crate) callback: ScriptRef,
    pub(crate) context: ScriptValue,
}

pub(crate) enum HandleKind {
    Binder(BinderHandle),
    Api(ApiHandle),
    Request(RequestHandle),
    Event(EventHandle),
    Timer(TimerHandle),
    Lock(LockHandle),
    Job(JobHandle),
    Handler(HandlerHandle),
}

/// A shared, tag-checked bridge object.
#[derive(Clone)]
pub struct GlueHandle {
    inner: Arc<HandleKind>,
}

impl GlueHandle {
    pub(crate) fn binder() -> Self {
        Self::wrap(HandleKind::Binder(BinderHandle {
            config: OnceLock::new(),
            ping_count: AtomicI64::new(0),
        }))
    }

    pub(crate) fn api(config: Node) -> Self {
        Self::wrap(HandleKind::Api(ApiHandle {
            config,
            native: OnceLock::new(),
            verbs: RwLock::new(Vec::new()),
        }))
    }

    pub(crate) fn request(
        api: GlueHandle,
        native: Arc<dyn NativeRequest>,
        thread: ScriptThread,
    ) -> Self {
        Self::wrap(HandleKind::Request(RequestHandle {
            api,
            native,
            thread,
            replied: AtomicBool::new(false),
        }))
    }

    pub(crate) fn event(api: GlueHandle, native: Arc<dyn NativeEvent>) -> Self {
        Self::wrap(HandleKind::Event(EventHandle {
            api,
            native,
            pushed: AtomicU64::new(0),
        }))
    }

    pub(crate) fn timer(
        scope: GlueHandle,
        config: Node,
        callback: ScriptRef,
        context: ScriptValue,
    ) -> Self {
        Self::wrap(HandleKind::Timer(TimerHandle {
            scope,
            config,
            callback,
            context,
            native: OnceLock::new(),
            usage: AtomicI32::new(1),
        }))
    }

    pub(crate) fn lock(scope: GlueHandle, callback: ScriptRef, context: ScriptValue) -> Self {
        Self::wrap(HandleKind::Lock(LockHandle {
            scope,
            callback,
            context,
            token: Mutex::new(None),
            status: AtomicI32::new(0),
        }))
    }

    pub(crate) fn job(scope: GlueHandle) -> Self {
        Self::wrap(HandleKind::Job(JobHandle {
            scope,
            id: OnceLock::new(),
        }))
    }

    pub(crate) fn handler(
        scope: GlueHandle,
        config: Node,
        callback: ScriptRef,
        context: ScriptValue,
    ) -> Self {
        Self::wrap(HandleKind::Handler(HandlerHandle {
            scope,
            config,
            callback,
            context,
        }))
    }

    fn wrap(kind: HandleKind) -> Self {
        Self {
            inner: Arc::new(kind),
        }
    }

    #[must_use]
    pub fn tag(&self) -> HandleTag {
        match &*self.inner {
            HandleKind::Binder(_) => HandleTag::Binder,
            HandleKind::Api(_) => HandleTag::Api,
            HandleKind::Request(_) => HandleTag::Request,
            HandleKind::Event(_) => HandleTag::Event,
            HandleKind::Timer(_) => HandleTag::Timer,
            HandleKind::Lock(_) => HandleTag::Lock,
            HandleKind::Job(_) => HandleTag::Job,
            HandleKind::Handler(_) => HandleTag::Handler,
        }
    }

    /// The api handle this object belongs to; an api handle resolves to
    /// itself, the binder to `None` (it scopes the whole process).
    #[must_use]
    pub fn owning_api(&self) -> Option<GlueHandle> {
        match &*self.inner {
            HandleKind::Binder(_) => None,
            HandleKind::Api(_) => Some(self.clone()),
            HandleKind::Request(request) => Some(request.api.clone()),
            HandleKind::Event(event) => Some(event.api.clone()),
            HandleKind::Timer(timer) => timer.scope.owning_api(),
            HandleKind::Lock(lock) => lock.scope.owning_api(),
            HandleKind::Job(job) => job.scope.owning_api(),
            HandleKind::Handler(handler) => handler.scope.owning_api(),
        }
    }

    /// Packs the handle into an opaque script value.
    #[must_use]
    pub fn to_value(&self) -> ScriptValue {
        ScriptValue::opaque(self.clone())
    }

    /// Recovers a handle a script passed back.
    ///
    /// # Errors
    ///
    /// Fails when the value is not an opaque handle.
    pub fn from_value(value: &ScriptValue) -> Result<Self, GlueError> {
        value
            .as_opaque()
            .and_then(|opaque| opaque.downcast::<GlueHandle>())
            .map(|handle| (*handle).clone())
            .ok_or(GlueError::InvalidArgument("handle"))
    }

    fn mismatch(&self, expected: HandleTag) -> GlueError {
        GlueError::WrongHandleKind {
            expected,
            actual: self.tag(),
        }
    }

    pub(crate) fn as_binder(&self) -> Result<&BinderHandle, GlueError> {
        match &*self.inner {
            HandleKind::Binder(binder) => Ok(binder),
            _ => Err(self.mismatch(HandleTag::Binder)),
        }
    }

    pub(crate) fn as_api(&self) -> Result<&ApiHandle, GlueError> {
        match &*self.inner {
            HandleKind::Api(api) => Ok(api),
            _ => Err(self.mismatch(HandleTag::Api)),
        }
    }

    pub(crate) fn as_request(&self) -> Result<&RequestHandle, GlueError> {
        match &*self.inner {
            HandleKind::Request(request) => Ok(request),
            _ => Err(self.mismatch(HandleTag::Request)),
        }
    }

    pub(crate) fn as_event(&self) -> Result<&EventHandle, GlueError> {
        match &*self.inner {
            HandleKind::Event(event) => Ok(event),
            _ => Err(self.mismatch(HandleTag::Event)),
        }
    }

    pub(crate) fn as_timer(&self) -> Result<&TimerHandle, GlueError> {
        match &*self.inner {
            HandleKind::Timer(timer) => Ok(timer),
            _ => Err(self.mismatch(HandleTag::Timer)),
        }
    }

    pub(crate) fn as_lock(&self) -> Result<&LockHandle, GlueError> {
        match &*self.inner {
            HandleKind::Lock(lock) => Ok(lock),
            _ => Err(self.mismatch(HandleTag::Lock)),
        }
    }

    pub(crate) fn as_job(&self) -> Result<&JobHandle, GlueError> {
        match &*self.inner {
            HandleKind::Job(job) => Ok(job),
            _ => Err(self.mismatch(HandleTag::Job)),
        }
    }

    pub(crate) fn as_handler(&self) -> Result<&HandlerHandle, GlueError> {
        match &*self.inner {
            HandleKind::Handler(handler) => Ok(handler),
            _ => Err(self.mismatch(HandleTag::Handler)),
        }
    }

    /// Host API scope a subcall issued on this handle runs under.
    pub(crate) fn call_scope(&self, host: &Arc<dyn HostRuntime>) -> Result<ApiRef, GlueError> {
        match &*self.inner {
            HandleKind::Binder(_) => Ok(host.root_api()),
            HandleKind::Api(api) => api
                .native
                .get()
                .map(Arc::clone)
                .ok_or(GlueError::InvalidArgument("imported api")),
            HandleKind::Request(request) => Ok(request.native.api()),
            HandleKind::Event(event) => event.api.call_scope(host),
            HandleKind::Timer(timer) => timer.scope.call_scope(host),
            HandleKind::Lock(lock) => lock.scope.call_scope(host),
            HandleKind::Job(job) => job.scope.call_scope(host),
            HandleKind::Handler(handler) => handler.scope.call_scope(host),
        }
    }

    /// Label used when logging on behalf of this handle.
    pub(crate) fn log_scope(&self) -> String {
        match &*self.inner {
            HandleKind::Binder(_) => "binder".to_owned(),
            HandleKind::Api(api) => api
                .native
                .get()
                .map_or_else(|| "api".to_owned(), |native| native.name().to_owned()),
            HandleKind::Request(request) => {
                format!("{}/{}", request.native.api().name(), request.native.verb())
            }
            _ => self.tag().to_string(),
        }
    }

    pub(crate) fn ptr_eq(&self, other: &GlueHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for GlueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlueHandle({})", self.tag())
    }
}

impl TimerHandle {
    /// Drops one usage reference; the host-side timer goes with the last
    /// one.
    ///
    /// # Errors
    ///
    /// Fails when the timer was already fully released.
    pub(crate) fn release(&self) -> Result<i32, GlueError> {
        let previous = self
            .usage
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |usage| {
                (usage > 0).then_some(usage - 1)
            })
            .map_err(|_| GlueError::TimerReleased)?;
        if let Some(native) = self.native.get() {
            native.unref();
        }
        Ok(previous - 1)
    }

    pub(crate) fn retain(&self) -> Result<(), GlueError> {
        self.usage
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |usage| {
                (usage > 0).then_some(usage + 1)
            })
            .map_err(|_| GlueError::TimerReleased)?;
        if let Some(native) = self.native.get() {
            native.addref();
        }
        Ok(())
    }
}
