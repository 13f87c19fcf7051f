//! The bridge itself: registration surface and request-side operations.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use scriptbind_host::{ApiHooks, HostRuntime};
use scriptbind_value::{Node, ReplyCell, ScriptValue, node_from_script};

use crate::config::{ApiConfig, VerbConfig, parse_config};
use crate::dispatch::{
    make_control_dispatch, make_info_dispatch, make_orphan_event_dispatch, make_startup_dispatch,
    make_verb_dispatch,
};
use crate::error::GlueError;
use crate::handle::{GlueHandle, HandleTag};
use crate::logging::{LogLevel, emit, render_format};
use crate::request::try_reply;
use crate::script::{ScriptRef, ScriptThread};

/// Glue between one embedded interpreter and the host runtime.
///
/// One `Bridge` serves one interpreter state. All script-facing operations
/// take the handles the scripts hold; the bridge validates kinds and
/// translates values at the boundary.
pub struct Bridge {
    host: Arc<dyn HostRuntime>,
    root: GlueHandle,
    main: ScriptThread,
}

impl Bridge {
    #[must_use]
    pub fn new(host: Arc<dyn HostRuntime>) -> Self {
        Self {
            root: GlueHandle::binder(),
            host,
            main: ScriptThread::main(),
        }
    }

    /// The binder handle scripts use for process-level operations.
    #[must_use]
    pub fn handle(&self) -> GlueHandle {
        self.root.clone()
    }

    pub(crate) fn host(&self) -> &Arc<dyn HostRuntime> {
        &self.host
    }

    pub(crate) fn main_thread(&self) -> &ScriptThread {
        &self.main
    }

    /// Liveness check; each call bumps a counter echoed in the answer.
    pub fn ping(&self) -> ScriptValue {
        let binder = self.root.as_binder().expect("root binder");
        let count = binder.ping_count.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(count, "ping");
        ScriptValue::Str(format!("Pong={count}"))
    }

    /// Records the process-level configuration. Accepted exactly once.
    ///
    /// # Errors
    ///
    /// Fails with [`GlueError::AlreadyConfigured`] on a second call, or
    /// when the config does not convert.
    pub fn binder_config(&self, config: &ScriptValue) -> Result<GlueHandle, GlueError> {
        let binder = self.root.as_binder().expect("root binder");
        let node = node_from_script(config)?;
        binder
            .config
            .set(node)
            .map_err(|_| GlueError::AlreadyConfigured)?;
        tracing::info!("binder configured");
        Ok(self.root.clone())
    }

    /// Loads an external binding into the host.
    ///
    /// # Errors
    ///
    /// Fails when the config does not convert or the host rejects it.
    pub fn binding_load(&self, config: &ScriptValue) -> Result<(), GlueError> {
        let node = node_from_script(config)?;
        self.host.load_binding(&node)?;
        Ok(())
    }

    /// Hands control to the host mainloop; `startup` runs once serving
    /// begins. Returns the exit status.
    pub fn mainloop(&self, startup: Option<ScriptRef>) -> i32 {
        let startup = startup
            .map(|callback| make_startup_dispatch(self.root.clone(), callback, self.main.clone()));
        self.host.start(startup)
    }

    pub fn exit(&self, code: i32) {
        tracing::info!(code, "exit requested");
        self.host.exit(code);
    }

    /// Creates a local API, or imports a remote one when the config
    /// carries a `uri`.
    ///
    /// # Errors
    ///
    /// Fails when the config does not validate or the host rejects the
    /// registration.
    pub fn api_add(
        &self,
        config: &ScriptValue,
        control: Option<ScriptRef>,
    ) -> Result<GlueHandle, GlueError> {
        let node = node_from_script(config)?;
        let cfg: ApiConfig = parse_config(&node, "api")?;

        if cfg.uri.is_some() {
            self.host.import_api(&node)?;
            tracing::info!(uid = %cfg.uid, "api imported");
            return Ok(GlueHandle::api(node));
        }

        let handle = GlueHandle::api(node.clone());
        let hooks = ApiHooks {
            control: control
                .map(|callback| make_control_dispatch(handle.clone(), callback, self.main.clone())),
            info: make_info_dispatch(handle.clone()),
            verb: Arc::new(|request, _cells| {
                request.reply(-1, vec![ReplyCell::Str("no such verb".to_owned())]);
            }),
            event: make_orphan_event_dispatch(cfg.api_name().to_owned()),
        };
        let native = self.host.register_api(&node, hooks)?;
        let glue = handle.as_api().expect("api handle");
        let _ = glue.native.set(native);
        tracing::info!(uid = %cfg.uid, api = cfg.api_name(), "api created");
        Ok(handle)
    }

    /// Registers one verb on a local API. The callback receives the
    /// request handle and the decoded payload; a non-nil `context` is
    /// appended as the final argument on every dispatch.
    ///
    /// # Errors
    ///
    /// Fails on a non-api handle, an imported API, or a config the host
    /// rejects.
    pub fn verb_add(
        &self,
        api: &GlueHandle,
        config: &ScriptValue,
        callback: ScriptRef,
        context: ScriptValue,
    ) -> Result<(), GlueError> {
        let glue = api.as_api()?;
        let node = node_from_script(config)?;
        let cfg: VerbConfig = parse_config(&node, "verb")?;
        let native = glue
            .native
            .get()
            .map(Arc::clone)
            .ok_or(GlueError::InvalidArgument("imported api"))?;
        let dispatch = make_verb_dispatch(api.clone(), callback, context, self.main.clone());
        self.host.register_verb(&native, &node, dispatch)?;
        glue.verbs.write().expect("verb table lock").push(node);
        tracing::debug!(uid = %cfg.uid, verb = cfg.verb_name(), "verb registered");
        Ok(())
    }

    /// Replies to an inbound request, at most once.
    ///
    /// # Errors
    ///
    /// Fails with [`GlueError::AlreadyReplied`] on a second reply, or when
    /// a payload value does not convert.
    pub fn reply(
        &self,
        request: &GlueHandle,
        status: i32,
        values: &[ScriptValue],
    ) -> Result<(), GlueError> {
        try_reply(request.as_request()?, status, values)
    }

    /// The config table a handle was created from; with a `key`, just
    /// that member (`Null` when absent).
    ///
    /// # Errors
    ///
    /// Fails for handle kinds that carry no config.
    pub fn config_of(&self, handle: &GlueHandle, key: Option<&str>) -> Result<Node, GlueError> {
        let config = match handle.tag() {
            HandleTag::Binder => self
                .root
                .as_binder()
                .expect("root binder")
                .config
                .get()
                .cloned()
                .ok_or(GlueError::NoConfig(HandleTag::Binder)),
            HandleTag::Api => Ok(handle.as_api()?.config.clone()),
            HandleTag::Timer => Ok(handle.as_timer()?.config.clone()),
            HandleTag::Handler => Ok(handle.as_handler()?.config.clone()),
            tag => Err(GlueError::NoConfig(tag)),
        }?;
        Ok(project(config, key))
    }

    /// Session description of the requesting client, `Null` when the
    /// transport carries none.
    ///
    /// # Errors
    ///
    /// Fails on a non-request handle.
    pub fn client_info(&self, request: &GlueHandle, key: Option<&str>) -> Result<Node, GlueError> {
        let glue = request.as_request()?;
        let info = glue.native.client_info().unwrap_or(Node::Null);
        Ok(project(info, key))
    }

    /// Sets the session level of assurance for the requesting client.
    ///
    /// # Errors
    ///
    /// Fails on a non-request handle or when the session is gone.
    pub fn set_loa(&self, request: &GlueHandle, level: i32) -> Result<(), GlueError> {
        let glue = request.as_request()?;
        glue.native.set_loa(level)?;
        Ok(())
    }

    /// Logs on behalf of a handle with printf-style formatting.
    pub fn log(&self, handle: &GlueHandle, level: LogLevel, format: &str, args: &[ScriptValue]) {
        let message = render_format(format, args);
        emit(level, &handle.log_scope(), &message);
    }
}

fn project(node: Node, key: Option<&str>) -> Node {
    match key {
        Some(key) => node.get(key).cloned().unwrap_or(Node::Null),
        None => node,
    }
}
