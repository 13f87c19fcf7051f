//! Timer lifecycle.
//!
//! A timer handle starts with one usage reference held on behalf of the
//! script. The tick callback retires that reference on the final tick or
//! when the callback returns a non-zero status; [`Bridge::timer_addref`]
//! and [`Bridge::timer_unref`] let scripts keep it alive across flows.

use scriptbind_value::{ScriptValue, node_from_script};

use crate::bridge::Bridge;
use crate::config::{TimerConfig, parse_config};
use crate::dispatch::make_timer_dispatch;
use crate::error::GlueError;
use crate::handle::GlueHandle;
use crate::script::ScriptRef;

impl Bridge {
    /// Creates a timer firing `callback` every `period` milliseconds,
    /// `count` times (0 runs until released). The callback receives the
    /// timer handle and `context`. The timer stays scoped to `owner` (any
    /// handle); subcalls issued on the timer handle resolve through it.
    ///
    /// # Errors
    ///
    /// Fails on a bad config or host rejection.
    pub fn timer_new(
        &self,
        owner: &GlueHandle,
        config: &ScriptValue,
        callback: ScriptRef,
        context: ScriptValue,
    ) -> Result<GlueHandle, GlueError> {
        let node = node_from_script(config)?;
        let cfg: TimerConfig = parse_config(&node, "timer")?;
        let handle = GlueHandle::timer(owner.clone(), node, callback, context);
        let dispatch = make_timer_dispatch(handle.clone(), self.main_thread().clone());
        let native = self
            .host()
            .create_timer(cfg.period, cfg.count, dispatch)?;
        let glue = handle.as_timer().expect("timer handle");
        let _ = glue.native.set(native);
        tracing::debug!(uid = %cfg.uid, period = cfg.period, count = cfg.count, "timer created");
        Ok(handle)
    }

    /// Takes an extra usage reference on a live timer.
    ///
    /// # Errors
    ///
    /// Fails once the timer is fully released.
    pub fn timer_addref(&self, timer: &GlueHandle) -> Result<(), GlueError> {
        timer.as_timer()?.retain()
    }

    /// Drops one usage reference; the host timer stops with the last one.
    ///
    /// # Errors
    ///
    /// Fails once the timer is fully released.
    pub fn timer_unref(&self, timer: &GlueHandle) -> Result<(), GlueError> {
        let remaining = timer.as_timer()?.release()?;
        tracing::debug!(remaining, "timer unref");
        Ok(())
    }
}
