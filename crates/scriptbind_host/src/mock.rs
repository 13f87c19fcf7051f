//! In-process host double used by the bridge test suites.
//!
//! The mock keeps every registration in one table and exposes test hooks to
//! drive dispatches from the outside: [`MockHost::dispatch_verb`],
//! [`MockHost::fire_timer`], [`MockHost::deliver_event`] and
//! [`MockHost::run_job`]. Subcalls answer from canned results installed with
//! [`MockHost::set_call_result`].

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use scriptbind_value::{Node, ReplyCell};

use crate::runtime::{
    ApiHooks, ApiRef, ApiState, EventDispatch, HostRuntime, JobDispatch, JobId, NativeApi,
    NativeEvent, NativeRequest, NativeTimer, ReplyDispatch, SchedToken, StartupDispatch,
    TimerDispatch, VerbDispatch, WaitDispatch,
};
use crate::HostError;

pub struct MockApi {
    name: String,
}

impl NativeApi for MockApi {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Request double that records everything submitted through it.
pub struct MockRequest {
    api: ApiRef,
    verb: String,
    client: Option<Node>,
    loa: AtomicI32,
    replies: Mutex<Vec<(i32, Vec<ReplyCell>)>>,
    subscriptions: Mutex<Vec<String>>,
    finalizers: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl MockRequest {
    fn new(api: ApiRef, verb: &str, client: Option<Node>) -> Self {
        Self {
            api,
            verb: verb.to_owned(),
            client,
            loa: AtomicI32::new(0),
            replies: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            finalizers: Mutex::new(Vec::new()),
        }
    }

    /// Replies recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the reply lock is poisoned.
    pub fn replies(&self) -> Vec<(i32, Vec<ReplyCell>)> {
        self.replies.lock().unwrap().clone()
    }

    /// Event names the client was subscribed to.
    ///
    /// # Panics
    ///
    /// Panics if the subscription lock is poisoned.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn loa(&self) -> i32 {
        self.loa.load(Ordering::SeqCst)
    }

    /// Simulates the host releasing the request object, running the
    /// registered finalizers.
    ///
    /// # Panics
    ///
    /// Panics if the finalizer lock is poisoned.
    pub fn release(&self) {
        let finalizers: Vec<_> = self.finalizers.lock().unwrap().drain(..).collect();
        for finalizer in finalizers {
            finalizer();
        }
    }
}

impl NativeRequest for MockRequest {
    fn api(&self) -> ApiRef {
        Arc::clone(&self.api)
    }

    fn verb(&self) -> &str {
        &self.verb
    }

    fn reply(&self, status: i32, cells: Vec<ReplyCell>) {
        self.replies.lock().unwrap().push((status, cells));
    }

    fn subscribe(&self, event: &dyn NativeEvent) -> Result<(), HostError> {
        if !event.is_valid() {
            return Err(HostError::msg("subscribe on invalid event"));
        }
        self.subscriptions
            .lock()
            .unwrap()
            .push(event.name().to_owned());
        Ok(())
    }

    fn unsubscribe(&self, event: &dyn NativeEvent) -> Result<(), HostError> {
        let mut subs = self.subscriptions.lock().unwrap();
        match subs.iter().position(|name| name == event.name()) {
            Some(index) => {
                subs.remove(index);
                Ok(())
            }
            None => Err(HostError::msg("not subscribed")),
        }
    }

    fn client_info(&self) -> Option<Node> {
        self.client.clone()
    }

    fn set_loa(&self, level: i32) -> Result<(), HostError> {
        self.loa.store(level, Ordering::SeqCst);
        Ok(())
    }

    fn on_release(&self, finalizer: Box<dyn FnOnce() + Send>) {
        self.finalizers.lock().unwrap().push(finalizer);
    }
}

/// Event double; payloads pushed through it are recorded.
pub struct MockEvent {
    name: String,
    valid: AtomicBool,
    pushed: Mutex<Vec<Vec<ReplyCell>>>,
}

impl MockEvent {
    /// Marks the event object as defunct, as the host does when the owning
    /// API goes away.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    /// Payloads pushed so far.
    ///
    /// # Panics
    ///
    /// Panics if the payload lock is poisoned.
    pub fn pushed(&self) -> Vec<Vec<ReplyCell>> {
        self.pushed.lock().unwrap().clone()
    }
}

impl NativeEvent for MockEvent {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn push(&self, cells: Vec<ReplyCell>) -> Result<(), HostError> {
        if !self.is_valid() {
            return Err(HostError::msg("push on invalid event"));
        }
        self.pushed.lock().unwrap().push(cells);
        Ok(())
    }
}

/// Timer double; the host-side reference count starts at one and the timer
/// stops firing once it drops to zero.
pub struct MockTimer {
    refs: AtomicI32,
}

impl MockTimer {
    pub fn is_active(&self) -> bool {
        self.refs.load(Ordering::SeqCst) > 0
    }
}

impl NativeTimer for MockTimer {
    fn addref(&self) {
        self.refs.fetch_add(1, Ordering::SeqCst);
    }

    fn unref(&self) {
        self.refs.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MockToken {
    released: AtomicBool,
}

impl SchedToken for MockToken {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct TimerSlot {
    timer: Arc<MockTimer>,
    dispatch: TimerDispatch,
    count: u32,
    fired: u32,
}

#[derive(Default)]
struct State {
    apis: Vec<(String, ApiHooks)>,
    imports: Vec<Node>,
    verbs: HashMap<(String, String), VerbDispatch>,
    handlers: Vec<(String, String, EventDispatch)>,
    timers: Vec<TimerSlot>,
    events: Vec<Arc<MockEvent>>,
    canned: HashMap<(String, String), Result<(i32, Vec<ReplyCell>), HostError>>,
    jobs: HashMap<i64, JobDispatch>,
    next_job: i64,
    bindings: Vec<Node>,
    exit_code: Option<i32>,
}

/// The mock host. Cheap to clone; clones share all state.
#[derive(Clone, Default)]
pub struct MockHost {
    state: Arc<RwLock<State>>,
}

impl MockHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the outcome of future subcalls to `api/verb`.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub fn set_call_result(&self, api: &str, verb: &str, status: i32, cells: Vec<ReplyCell>) {
        self.state
            .write()
            .unwrap()
            .canned
            .insert((api.to_owned(), verb.to_owned()), Ok((status, cells)));
    }

    /// Makes future subcalls to `api/verb` fail with a binder refusal.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub fn set_call_refusal(&self, api: &str, verb: &str, error: HostError) {
        self.state
            .write()
            .unwrap()
            .canned
            .insert((api.to_owned(), verb.to_owned()), Err(error));
    }

    /// Drives one inbound call through the registered verb dispatch and
    /// returns the request double for inspection.
    ///
    /// # Errors
    ///
    /// Fails when no verb is registered under `api/verb`.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub fn dispatch_verb(
        &self,
        api: &str,
        verb: &str,
        cells: Vec<ReplyCell>,
    ) -> Result<Arc<MockRequest>, HostError> {
        // Clone the dispatch out and drop the lock first; the callback is
        // free to call back into the host.
        let dispatch = {
            let state = self.state.read().unwrap();
            state
                .verbs
                .get(&(api.to_owned(), verb.to_owned()))
                .map(Arc::clone)
        };
        let Some(dispatch) = dispatch else {
            return Err(HostError::msg(format!("no verb {api}/{verb}")));
        };
        tracing::debug!(api, verb, "mock verb dispatch");
        let api_ref: ApiRef = Arc::new(MockApi {
            name: api.to_owned(),
        });
        let request = Arc::new(MockRequest::new(api_ref, verb, None));
        dispatch(Arc::clone(&request) as Arc<dyn NativeRequest>, cells);
        Ok(request)
    }

    /// Fires the `index`-th created timer once. Returns false when the timer
    /// is exhausted or released.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned or `index` is out of range.
    pub fn fire_timer(&self, index: usize) -> bool {
        let (dispatch, decount) = {
            let mut state = self.state.write().unwrap();
            let slot = &mut state.timers[index];
            if !slot.timer.is_active() {
                return false;
            }
            if slot.count > 0 && slot.fired >= slot.count {
                return false;
            }
            slot.fired += 1;
            let decount = if slot.count > 0 {
                slot.count - slot.fired + 1
            } else {
                0
            };
            (Arc::clone(&slot.dispatch), decount)
        };
        dispatch(decount);
        true
    }

    /// Timer double at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned or `index` is out of range.
    pub fn timer(&self, index: usize) -> Arc<MockTimer> {
        Arc::clone(&self.state.read().unwrap().timers[index].timer)
    }

    /// Event double at `index`, in creation order.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned or `index` is out of range.
    pub fn event(&self, index: usize) -> Arc<MockEvent> {
        Arc::clone(&self.state.read().unwrap().events[index])
    }

    /// Drives the API's introspection hook and returns the request double.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub fn introspect(&self, api: &str) -> Option<Arc<MockRequest>> {
        let info = {
            let state = self.state.read().unwrap();
            state
                .apis
                .iter()
                .find(|(name, _)| name == api)
                .map(|(_, hooks)| Arc::clone(&hooks.info))
        }?;
        let api_ref: ApiRef = Arc::new(MockApi {
            name: api.to_owned(),
        });
        let request = Arc::new(MockRequest::new(api_ref, "info", None));
        info(Arc::clone(&request) as Arc<dyn NativeRequest>);
        Some(request)
    }

    /// Routes an event to the handlers registered on `api`. A handler
    /// pattern matches on equality, or by prefix when it ends in `*`.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub fn deliver_event(&self, api: &str, name: &str, cells: Vec<ReplyCell>) -> usize {
        let matching: Vec<EventDispatch> = {
            let state = self.state.read().unwrap();
            state
                .handlers
                .iter()
                .filter(|(owner, pattern, _)| owner == api && pattern_matches(pattern, name))
                .map(|(_, _, dispatch)| Arc::clone(dispatch))
                .collect()
        };
        for dispatch in &matching {
            dispatch(name, cells.clone());
        }
        matching.len()
    }

    /// Runs a posted job now. Returns false when the job was aborted or
    /// already ran.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub fn run_job(&self, id: JobId) -> bool {
        let job = self.state.write().unwrap().jobs.remove(&id.0);
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub fn exit_code(&self) -> Option<i32> {
        self.state.read().unwrap().exit_code
    }

    /// Configs passed to [`HostRuntime::load_binding`] so far.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub fn bindings(&self) -> Vec<Node> {
        self.state.read().unwrap().bindings.clone()
    }

    /// Configs passed to [`HostRuntime::import_api`] so far.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub fn imports(&self) -> Vec<Node> {
        self.state.read().unwrap().imports.clone()
    }
}

fn pattern_matches(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => pattern == name,
    }
}

fn api_name(config: &Node) -> Result<String, HostError> {
    config
        .get("api")
        .or_else(|| config.get("uid"))
        .and_then(Node::as_str)
        .map(str::to_owned)
        .ok_or_else(|| HostError::msg("api config lacks a name"))
}

impl HostRuntime for MockHost {
    fn register_api(&self, config: &Node, hooks: ApiHooks) -> Result<ApiRef, HostError> {
        let name = api_name(config)?;
        let control = hooks.control.clone();
        {
            let mut state = self.state.write().unwrap();
            if state.apis.iter().any(|(existing, _)| *existing == name) {
                return Err(HostError::msg(format!("api {name} already registered")));
            }
            state.apis.push((name.clone(), hooks));
        }
        tracing::debug!(api = %name, "mock api registered");
        // Real hosts run the lifecycle immediately for pre-initialized APIs.
        if let Some(control) = control {
            control(ApiState::Config);
            control(ApiState::Ready);
        }
        Ok(Arc::new(MockApi { name }))
    }

    fn import_api(&self, config: &Node) -> Result<(), HostError> {
        self.state.write().unwrap().imports.push(config.clone());
        Ok(())
    }

    fn root_api(&self) -> ApiRef {
        Arc::new(MockApi {
            name: String::new(),
        })
    }

    fn register_verb(
        &self,
        api: &ApiRef,
        config: &Node,
        dispatch: VerbDispatch,
    ) -> Result<(), HostError> {
        let verb = config
            .get("verb")
            .or_else(|| config.get("uid"))
            .and_then(Node::as_str)
            .ok_or_else(|| HostError::msg("verb config lacks a name"))?;
        let key = (api.name().to_owned(), verb.to_owned());
        let mut state = self.state.write().unwrap();
        if state.verbs.contains_key(&key) {
            return Err(HostError::msg(format!("verb {verb} already registered")));
        }
        state.verbs.insert(key, dispatch);
        Ok(())
    }

    fn register_event_handler(
        &self,
        api: &ApiRef,
        _uid: &str,
        pattern: &str,
        dispatch: EventDispatch,
    ) -> Result<(), HostError> {
        self.state.write().unwrap().handlers.push((
            api.name().to_owned(),
            pattern.to_owned(),
            dispatch,
        ));
        Ok(())
    }

    fn create_event(&self, api: &ApiRef, label: &str) -> Result<Arc<dyn NativeEvent>, HostError> {
        let event = Arc::new(MockEvent {
            name: format!("{}/{label}", api.name()),
            valid: AtomicBool::new(true),
            pushed: Mutex::new(Vec::new()),
        });
        self.state.write().unwrap().events.push(Arc::clone(&event));
        Ok(event)
    }

    fn create_timer(
        &self,
        _period_ms: u32,
        count: u32,
        dispatch: TimerDispatch,
    ) -> Result<Arc<dyn NativeTimer>, HostError> {
        let timer = Arc::new(MockTimer {
            refs: AtomicI32::new(1),
        });
        self.state.write().unwrap().timers.push(TimerSlot {
            timer: Arc::clone(&timer),
            dispatch,
            count,
            fired: 0,
        });
        Ok(timer)
    }

    fn call(
        &self,
        api: &ApiRef,
        api_name: &str,
        verb: &str,
        args: Vec<ReplyCell>,
        on_reply: ReplyDispatch,
    ) {
        let outcome = self.call_sync(api, api_name, verb, args);
        on_reply(outcome);
    }

    fn call_sync(
        &self,
        _api: &ApiRef,
        api_name: &str,
        verb: &str,
        _args: Vec<ReplyCell>,
    ) -> Result<(i32, Vec<ReplyCell>), HostError> {
        let state = self.state.read().unwrap();
        match state.canned.get(&(api_name.to_owned(), verb.to_owned())) {
            Some(Ok((status, cells))) => Ok((*status, cells.clone())),
            Some(Err(error)) => Err(error.clone()),
            None => Err(HostError::msg(format!("no such verb {api_name}/{verb}"))),
        }
    }

    fn sched_enter(&self, _timeout_ms: i32, wait: WaitDispatch) -> Result<(), HostError> {
        // Single-threaded rendition: the wait callback runs inline and must
        // release the token before returning, otherwise the flow times out.
        let token: Arc<dyn SchedToken> = Arc::new(MockToken {
            released: AtomicBool::new(false),
        });
        wait(Arc::clone(&token));
        let released = token
            .as_any()
            .downcast_ref::<MockToken>()
            .is_some_and(|token| token.released.load(Ordering::SeqCst));
        if released {
            Ok(())
        } else {
            Err(HostError::msg("wait timed out"))
        }
    }

    fn sched_leave(&self, token: &Arc<dyn SchedToken>) -> Result<(), HostError> {
        let Some(token) = token.as_any().downcast_ref::<MockToken>() else {
            return Err(HostError::msg("foreign token"));
        };
        if token.released.swap(true, Ordering::SeqCst) {
            return Err(HostError::msg("token already released"));
        }
        Ok(())
    }

    fn post_job(&self, _delay_ms: i32, job: JobDispatch) -> Result<JobId, HostError> {
        let mut state = self.state.write().unwrap();
        state.next_job += 1;
        let id = state.next_job;
        state.jobs.insert(id, job);
        Ok(JobId(id))
    }

    fn abort_job(&self, id: JobId) -> Result<(), HostError> {
        match self.state.write().unwrap().jobs.remove(&id.0) {
            Some(_) => Ok(()),
            None => Err(HostError::msg("no such job")),
        }
    }

    fn load_binding(&self, config: &Node) -> Result<(), HostError> {
        self.state.write().unwrap().bindings.push(config.clone());
        Ok(())
    }

    fn start(&self, startup: Option<StartupDispatch>) -> i32 {
        let status = startup.map_or(0, |startup| startup());
        self.state.read().unwrap().exit_code.unwrap_or(status)
    }

    fn exit(&self, code: i32) {
        self.state.write().unwrap().exit_code = Some(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptbind_value::Node;

    fn api_config(name: &str) -> Node {
        Node::from_json(&serde_json::json!({ "api": name }))
    }

    fn hooks() -> ApiHooks {
        ApiHooks {
            control: None,
            info: Arc::new(|_| {}),
            verb: Arc::new(|_, _| {}),
            event: Arc::new(|_, _| {}),
        }
    }

    #[test]
    fn verb_round_trip() {
        let host = MockHost::new();
        let api = host.register_api(&api_config("demo"), hooks()).unwrap();
        host.register_verb(
            &api,
            &Node::from_json(&serde_json::json!({ "verb": "echo" })),
            Arc::new(|request, cells| request.reply(0, cells)),
        )
        .unwrap();

        let request = host
            .dispatch_verb("demo", "echo", vec![ReplyCell::Str("hi".into())])
            .unwrap();
        let replies = request.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, 0);
    }

    #[test]
    fn duplicate_api_rejected() {
        let host = MockHost::new();
        host.register_api(&api_config("dup"), hooks()).unwrap();
        assert!(host.register_api(&api_config("dup"), hooks()).is_err());
    }

    #[test]
    fn bounded_timer_exhausts() {
        let host = MockHost::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        host.create_timer(
            10,
            2,
            Arc::new(move |decount| sink.lock().unwrap().push(decount)),
        )
        .unwrap();

        assert!(host.fire_timer(0));
        assert!(host.fire_timer(0));
        assert!(!host.fire_timer(0));
        assert_eq!(*seen.lock().unwrap(), vec![2, 1]);
    }

    #[test]
    fn event_pattern_prefix_match() {
        let host = MockHost::new();
        let api = host.register_api(&api_config("evapi"), hooks()).unwrap();
        let hits = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&hits);
        host.register_event_handler(
            &api,
            "h1",
            "monitor/*",
            Arc::new(move |_, _| *sink.lock().unwrap() += 1),
        )
        .unwrap();

        assert_eq!(host.deliver_event("evapi", "monitor/disconnected", vec![]), 1);
        assert_eq!(host.deliver_event("evapi", "other/thing", vec![]), 0);
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn sched_wait_released_inline() {
        let host = MockHost::new();
        let inner = host.clone();
        let outcome = host.sched_enter(
            100,
            Box::new(move |token| {
                inner.sched_leave(&token).unwrap();
            }),
        );
        assert!(outcome.is_ok());
    }

    #[test]
    fn host_is_shareable_across_threads() {
        fn shareable<T: Send + Sync>(_: &T) {}
        let host = MockHost::new();
        host.post_job(0, Box::new(|| {})).unwrap();
        // Pending jobs ride along, so they must be shareable too.
        shareable(&host);
    }

    #[test]
    fn aborted_job_never_runs() {
        let host = MockHost::new();
        let id = host.post_job(0, Box::new(|| {})).unwrap();
        host.abort_job(id).unwrap();
        assert!(!host.run_job(id));
    }
}
