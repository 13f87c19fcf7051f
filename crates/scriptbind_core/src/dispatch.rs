//! Host-to-script dispatch closures.
//!
//! Each builder here captures the glue handle and the [`ScriptRef`] it
//! needs, derives a fresh interpreter flow per invocation, and translates
//! the callback outcome back into host terms. The first value a callback
//! returns is its integer status; anything after it is payload.

use std::sync::Arc;

use scriptbind_host::{
    ControlDispatch, EventDispatch, HostRuntime, InfoDispatch, JobDispatch, ReplyDispatch,
    StartupDispatch, TimerDispatch, VerbDispatch, WaitDispatch,
};
use scriptbind_value::{
    CodecError, Node, ReplyCell, ScriptValue, nodes_from_cells, script_from_node,
};

use crate::error::GlueError;
use crate::handle::GlueHandle;
use crate::request::{reply_script_error, try_reply};
use crate::script::{ScriptError, ScriptRef, ScriptThread};

/// Replies past this count are dropped on synchronous subcalls.
pub(crate) const MAX_SUBCALL_REPLIES: usize = 8;

pub(crate) fn decode_cells(cells: &[ReplyCell]) -> Result<Vec<ScriptValue>, CodecError> {
    let nodes = nodes_from_cells(cells)?;
    Ok(nodes.iter().map(script_from_node).collect())
}

/// Splits callback return values into a status and payload.
///
/// An empty return means success with no payload. A leading float is
/// accepted when it is integral, matching interpreters that only have one
/// number type.
pub(crate) fn split_status(
    mut values: Vec<ScriptValue>,
) -> Result<(i32, Vec<ScriptValue>), GlueError> {
    if values.is_empty() {
        return Ok((0, values));
    }
    let status = match values[0] {
        ScriptValue::Int(i) => i as i32,
        ScriptValue::Float(f) if f.trunc() == f => f as i32,
        _ => return Err(GlueError::BadCallbackReturn),
    };
    values.remove(0);
    Ok((status, values))
}

pub(crate) fn make_verb_dispatch(
    api: GlueHandle,
    callback: ScriptRef,
    context: ScriptValue,
    thread: ScriptThread,
) -> VerbDispatch {
    Arc::new(move |native, cells| {
        let flow = thread.derive();
        let request = GlueHandle::request(api.clone(), Arc::clone(&native), flow);
        let glue = request.as_request().expect("request handle");
        // The handle must outlive any reference the script stashed away;
        // the host tells us when the request object itself goes.
        let retained = request.clone();
        glue.native.on_release(Box::new(move || drop(retained)));

        let decoded = match decode_cells(&cells) {
            Ok(decoded) => decoded,
            Err(error) => {
                tracing::error!(verb = glue.native.verb(), %error, "undecodable request payload");
                let _ = try_reply(glue, -1, &[ScriptValue::str(error.to_string())]);
                return;
            }
        };
        let mut args = Vec::with_capacity(decoded.len() + 2);
        args.push(request.to_value());
        args.extend(decoded);
        if !matches!(context, ScriptValue::Nil) {
            args.push(context.clone());
        }

        match callback.call(&glue.thread, args) {
            Ok(values) => {
                // A callback that replied explicitly may return nothing.
                if glue.has_replied() {
                    return;
                }
                match split_status(values) {
                    Ok((status, payload)) => match try_reply(glue, status, &payload) {
                        Ok(()) | Err(GlueError::AlreadyReplied) => {}
                        Err(error) => reply_script_error(
                            glue,
                            "reply encoding failed",
                            &ScriptError::msg(error.to_string()),
                        ),
                    },
                    Err(error) => reply_script_error(
                        glue,
                        "bad verb callback return",
                        &ScriptError::msg(error.to_string()),
                    ),
                }
            }
            Err(error) => reply_script_error(glue, "verb callback raised", &error),
        }
    })
}

pub(crate) fn make_control_dispatch(
    api: GlueHandle,
    control: ScriptRef,
    thread: ScriptThread,
) -> ControlDispatch {
    Arc::new(move |state| {
        let flow = thread.derive();
        let args = vec![api.to_value(), ScriptValue::str(state.as_str())];
        match control.call(&flow, args) {
            Ok(values) => match split_status(values) {
                Ok((status, _)) => status,
                Err(error) => {
                    tracing::warn!(state = state.as_str(), %error, "bad control return");
                    -1
                }
            },
            Err(error) => {
                tracing::error!(state = state.as_str(), %error, "control callback raised");
                -1
            }
        }
    })
}

/// Serves the auto-generated introspection verb from the configs recorded
/// at registration time.
pub(crate) fn make_info_dispatch(api: GlueHandle) -> InfoDispatch {
    Arc::new(move |native| {
        let glue = api.as_api().expect("api handle");
        let mut metadata = Node::object();
        if let Node::Object(map) = &mut metadata {
            for key in ["uid", "api", "info"] {
                if let Some(value) = glue.config.get(key) {
                    map.insert(key.to_owned(), value.clone());
                }
            }
        }
        let verbs = Node::Array(glue.verbs.read().expect("verb table lock").clone());
        let mut info = Node::object();
        if let Node::Object(map) = &mut info {
            map.insert("metadata".to_owned(), metadata);
            map.insert("verbs".to_owned(), verbs);
        }
        native.reply(0, vec![ReplyCell::Node(info)]);
    })
}

/// Sink for events that reach the API without a matching handler.
pub(crate) fn make_orphan_event_dispatch(api_name: String) -> EventDispatch {
    Arc::new(move |name, _cells| {
        tracing::warn!(api = %api_name, event = name, "unhandled event");
    })
}

pub(crate) fn make_handler_dispatch(handler: GlueHandle, thread: ScriptThread) -> EventDispatch {
    Arc::new(move |name, cells| {
        let glue = handler.as_handler().expect("handler handle");
        let decoded = match decode_cells(&cells) {
            Ok(decoded) => decoded,
            Err(error) => {
                tracing::error!(event = name, %error, "undecodable event payload");
                return;
            }
        };
        let mut args = Vec::with_capacity(decoded.len() + 3);
        args.push(handler.to_value());
        args.push(ScriptValue::str(name));
        args.extend(decoded);
        args.push(glue.context.clone());

        let flow = thread.derive();
        if let Err(error) = glue.callback.call(&flow, args) {
            tracing::error!(event = name, %error, "event handler raised");
        }
    })
}

pub(crate) fn make_timer_dispatch(timer: GlueHandle, thread: ScriptThread) -> TimerDispatch {
    Arc::new(move |decount| {
        let glue = timer.as_timer().expect("timer handle");
        if glue.usage.load(std::sync::atomic::Ordering::SeqCst) <= 0 {
            return;
        }
        let flow = thread.derive();
        let args = vec![timer.to_value(), glue.context.clone()];
        let status = match glue.callback.call(&flow, args) {
            Ok(values) => match split_status(values) {
                Ok((status, _)) => status,
                Err(error) => {
                    tracing::warn!(%error, "bad timer callback return");
                    -1
                }
            },
            Err(error) => {
                tracing::error!(%error, "timer callback raised");
                -1
            }
        };
        // A non-zero status or the final tick retires the bridge's own
        // reference; script-held references keep the handle alive.
        if status != 0 || decount == 1 {
            match glue.release() {
                Ok(remaining) => tracing::debug!(remaining, "timer retired"),
                Err(_) => tracing::debug!("timer already released"),
            }
        }
    })
}

pub(crate) fn make_reply_dispatch(
    scope: GlueHandle,
    callback: ScriptRef,
    context: ScriptValue,
    thread: ScriptThread,
) -> ReplyDispatch {
    Box::new(move |outcome| {
        let flow = thread.derive();
        let mut args = vec![scope.to_value()];
        match outcome {
            Ok((status, cells)) => {
                let cells = cap_replies(cells);
                args.push(ScriptValue::Int(i64::from(status)));
                match decode_cells(&cells) {
                    Ok(values) => args.extend(values),
                    Err(error) => {
                        tracing::error!(%error, "undecodable subcall reply");
                    }
                }
            }
            Err(refusal) => {
                // The call never reached a verb; only the status travels.
                tracing::warn!(status = refusal.status, error = %refusal.message, "subcall refused");
                args.push(ScriptValue::Int(i64::from(refusal.status)));
            }
        }
        args.push(context);
        if let Err(error) = callback.call(&flow, args) {
            tracing::error!(%error, "subcall reply callback raised");
        }
    })
}

pub(crate) fn cap_replies(mut cells: Vec<ReplyCell>) -> Vec<ReplyCell> {
    if cells.len() > MAX_SUBCALL_REPLIES {
        tracing::warn!(
            dropped = cells.len() - MAX_SUBCALL_REPLIES,
            "subcall reply truncated"
        );
        cells.truncate(MAX_SUBCALL_REPLIES);
    }
    cells
}

pub(crate) fn make_wait_dispatch(
    lock: GlueHandle,
    thread: ScriptThread,
    host: Arc<dyn HostRuntime>,
) -> WaitDispatch {
    Box::new(move |token| {
        let glue = lock.as_lock().expect("lock handle");
        *glue.token.lock().expect("token lock") = Some(Arc::clone(&token));
        let flow = thread.derive();
        let args = vec![lock.to_value(), glue.context.clone()];
        if let Err(error) = glue.callback.call(&flow, args) {
            tracing::error!(%error, "wait callback raised");
            glue.status.store(-1, std::sync::atomic::Ordering::SeqCst);
            if host.sched_leave(&token).is_err() {
                tracing::debug!("lock already released");
            }
        }
    })
}

pub(crate) fn make_job_dispatch(
    job: GlueHandle,
    callback: ScriptRef,
    context: ScriptValue,
    thread: ScriptThread,
) -> JobDispatch {
    Box::new(move || {
        let flow = thread.derive();
        if let Err(error) = callback.call(&flow, vec![job.to_value(), context]) {
            tracing::error!(%error, "job callback raised");
        }
    })
}

pub(crate) fn make_startup_dispatch(
    binder: GlueHandle,
    startup: ScriptRef,
    thread: ScriptThread,
) -> StartupDispatch {
    Box::new(move || {
        let flow = thread.derive();
        match startup.call(&flow, vec![binder.to_value()]) {
            Ok(values) => match split_status(values) {
                Ok((status, _)) => status,
                Err(error) => {
                    tracing::warn!(%error, "bad startup return");
                    -1
                }
            },
            Err(error) => {
                tracing::error!(%error, "startup callback raised");
                -1
            }
        }
    })
}
