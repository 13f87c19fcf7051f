//! Event creation, delivery and subscription management.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use scriptbind_value::{Node, ScriptValue, cells_from_nodes, node_from_script};

use crate::bridge::Bridge;
use crate::config::{HandlerConfig, parse_config};
use crate::dispatch::make_handler_dispatch;
use crate::error::GlueError;
use crate::handle::GlueHandle;
use crate::script::ScriptRef;

impl Bridge {
    /// Creates a broadcastable event owned by a local API.
    ///
    /// # Errors
    ///
    /// Fails on a non-api handle, an imported API, or host rejection.
    pub fn event_new(&self, api: &GlueHandle, label: &str) -> Result<GlueHandle, GlueError> {
        let glue = api.as_api()?;
        let native = glue
            .native
            .get()
            .map(Arc::clone)
            .ok_or(GlueError::InvalidArgument("imported api"))?;
        let event = self.host().create_event(&native, label)?;
        tracing::debug!(event = event.name(), "event created");
        Ok(GlueHandle::event(api.clone(), event))
    }

    /// Pushes a payload to the event's current subscribers.
    ///
    /// # Errors
    ///
    /// Fails with [`GlueError::DefunctEvent`] once the host-side event is
    /// gone, or when a payload value does not convert.
    pub fn event_push(&self, event: &GlueHandle, values: &[ScriptValue]) -> Result<(), GlueError> {
        let glue = event.as_event()?;
        if !glue.native.is_valid() {
            return Err(GlueError::DefunctEvent);
        }
        let nodes = values
            .iter()
            .map(node_from_script)
            .collect::<Result<Vec<Node>, _>>()?;
        glue.native.push(cells_from_nodes(nodes))?;
        let total = glue.pushed.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(event = glue.native.name(), total, "event pushed");
        Ok(())
    }

    /// Subscribes the client behind `request` to `event`.
    ///
    /// # Errors
    ///
    /// Fails on wrong handle kinds, a defunct event, or host refusal.
    pub fn event_subscribe(
        &self,
        request: &GlueHandle,
        event: &GlueHandle,
    ) -> Result<(), GlueError> {
        let rqt = request.as_request()?;
        let evt = event.as_event()?;
        if !evt.native.is_valid() {
            return Err(GlueError::DefunctEvent);
        }
        rqt.native.subscribe(&*evt.native)?;
        Ok(())
    }

    /// Removes the subscription established by [`Bridge::event_subscribe`].
    ///
    /// # Errors
    ///
    /// Fails on wrong handle kinds or when no subscription exists.
    pub fn event_unsubscribe(
        &self,
        request: &GlueHandle,
        event: &GlueHandle,
    ) -> Result<(), GlueError> {
        let rqt = request.as_request()?;
        let evt = event.as_event()?;
        rqt.native.unsubscribe(&*evt.native)?;
        Ok(())
    }

    /// Registers a pattern-matched event handler on a local API.
    ///
    /// A trailing `*` in the pattern matches any event-name suffix. The
    /// handler callback receives the handler handle, the concrete event
    /// name, the payload values and `context`.
    ///
    /// # Errors
    ///
    /// Fails on a non-api handle, an imported API, a bad config, or host
    /// rejection.
    pub fn event_handler(
        &self,
        api: &GlueHandle,
        config: &ScriptValue,
        callback: ScriptRef,
        context: ScriptValue,
    ) -> Result<GlueHandle, GlueError> {
        let glue = api.as_api()?;
        let node = node_from_script(config)?;
        let cfg: HandlerConfig = parse_config(&node, "event handler")?;
        let native = glue
            .native
            .get()
            .map(Arc::clone)
            .ok_or(GlueError::InvalidArgument("imported api"))?;
        let handler = GlueHandle::handler(api.clone(), node, callback, context);
        let dispatch = make_handler_dispatch(handler.clone(), self.main_thread().clone());
        self.host()
            .register_event_handler(&native, &cfg.uid, &cfg.pattern, dispatch)?;
        tracing::debug!(uid = %cfg.uid, pattern = %cfg.pattern, "event handler registered");
        Ok(handler)
    }
}
