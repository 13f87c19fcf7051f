//! Subcalls, deferred jobs and scheduler waits.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use scriptbind_value::{Node, ScriptValue, cells_from_nodes, node_from_script};

use crate::bridge::Bridge;
use crate::dispatch::{cap_replies, decode_cells, make_job_dispatch, make_reply_dispatch, make_wait_dispatch};
use crate::error::GlueError;
use crate::handle::GlueHandle;
use crate::script::ScriptRef;

fn encode_args(values: &[ScriptValue]) -> Result<Vec<scriptbind_value::ReplyCell>, GlueError> {
    let nodes = values
        .iter()
        .map(node_from_script)
        .collect::<Result<Vec<Node>, _>>()?;
    Ok(cells_from_nodes(nodes))
}

impl Bridge {
    /// Issues a subcall and delivers the outcome to `callback` later, on
    /// its own flow. `handle` scopes the call: a binder handle calls from
    /// the root scope, an api handle from that API, a request handle from
    /// the requesting session.
    ///
    /// The callback receives `handle`, the integer status, the reply
    /// values (none when the binder refused the call) and `context`.
    ///
    /// # Errors
    ///
    /// Fails when the handle cannot scope a call or an argument does not
    /// convert.
    pub fn call_async(
        &self,
        handle: &GlueHandle,
        api_name: &str,
        verb: &str,
        values: &[ScriptValue],
        callback: ScriptRef,
        context: ScriptValue,
    ) -> Result<(), GlueError> {
        let scope = handle.call_scope(self.host())?;
        let cells = encode_args(values)?;
        let on_reply =
            make_reply_dispatch(handle.clone(), callback, context, self.main_thread().clone());
        self.host().call(&scope, api_name, verb, cells, on_reply);
        Ok(())
    }

    /// Issues a subcall and parks the calling flow until it completes.
    ///
    /// # Errors
    ///
    /// A binder refusal surfaces as [`GlueError::Host`]; no reply values
    /// exist in that case.
    pub fn call_sync(
        &self,
        handle: &GlueHandle,
        api_name: &str,
        verb: &str,
        values: &[ScriptValue],
    ) -> Result<(i32, Vec<ScriptValue>), GlueError> {
        let scope = handle.call_scope(self.host())?;
        let cells = encode_args(values)?;
        let (status, cells) = self.host().call_sync(&scope, api_name, verb, cells)?;
        let cells = cap_replies(cells);
        let values = decode_cells(&cells)?;
        Ok((status, values))
    }

    /// Schedules `callback` to run once after `delay_ms`, on its own flow,
    /// with the returned job handle and `context`. The job inherits its
    /// api scope from `owner`.
    ///
    /// # Errors
    ///
    /// Fails when the scheduler rejects the job.
    pub fn job_post(
        &self,
        owner: &GlueHandle,
        delay_ms: i32,
        callback: ScriptRef,
        context: ScriptValue,
    ) -> Result<GlueHandle, GlueError> {
        let handle = GlueHandle::job(owner.clone());
        let job = make_job_dispatch(handle.clone(), callback, context, self.main_thread().clone());
        let id = self.host().post_job(delay_ms, job)?;
        let glue = handle.as_job().expect("job handle");
        let _ = glue.id.set(id);
        tracing::debug!(id = id.0, delay_ms, "job posted");
        Ok(handle)
    }

    /// Aborts a posted job; its callback never runs.
    ///
    /// # Errors
    ///
    /// Fails when the job already fired or was cancelled before.
    pub fn job_cancel(&self, job: &GlueHandle) -> Result<(), GlueError> {
        let id = job
            .as_job()?
            .id
            .get()
            .copied()
            .ok_or(GlueError::InvalidArgument("job"))?;
        self.host().abort_job(id)?;
        Ok(())
    }

    /// Parks the calling flow and runs `callback` with a lock handle and
    /// `context`; the flow resumes when [`Bridge::job_kill`] releases the
    /// lock or `timeout_ms` elapses. Returns the status stored on the
    /// lock.
    ///
    /// # Errors
    ///
    /// Fails on timeout or scheduler rejection.
    pub fn job_start(
        &self,
        owner: &GlueHandle,
        timeout_ms: i32,
        callback: ScriptRef,
        context: ScriptValue,
    ) -> Result<i32, GlueError> {
        let lock = GlueHandle::lock(owner.clone(), callback, context);
        let wait = make_wait_dispatch(lock.clone(), self.main_thread().clone(), Arc::clone(self.host()));
        self.host().sched_enter(timeout_ms, wait)?;
        Ok(lock.as_lock().expect("lock handle").status.load(Ordering::SeqCst))
    }

    /// Stores `status` on the lock and resumes the flow parked in
    /// [`Bridge::job_start`].
    ///
    /// # Errors
    ///
    /// Fails on a non-lock handle or when the lock was already released.
    pub fn job_kill(&self, lock: &GlueHandle, status: i32) -> Result<(), GlueError> {
        let glue = lock.as_lock()?;
        // Claim the token first; a second kill must not disturb the
        // status recorded by the one that won.
        let token = glue
            .token
            .lock()
            .expect("token lock")
            .take()
            .ok_or(GlueError::InvalidArgument("lock"))?;
        glue.status.store(status, Ordering::SeqCst);
        self.host().sched_leave(&token)?;
        Ok(())
    }
}
