//! Reply plumbing for inbound requests.

use std::sync::atomic::Ordering;

use scriptbind_value::{Node, ReplyCell, ScriptValue, cells_from_nodes, node_from_script};

use crate::error::GlueError;
use crate::handle::RequestHandle;
use crate::script::{ScriptError, diagnostic_node};

impl RequestHandle {
    pub(crate) fn has_replied(&self) -> bool {
        self.replied.load(Ordering::SeqCst)
    }
}

/// Submits the reply, enforcing the at-most-once contract.
pub(crate) fn try_reply(
    request: &RequestHandle,
    status: i32,
    values: &[ScriptValue],
) -> Result<(), GlueError> {
    let nodes = values
        .iter()
        .map(node_from_script)
        .collect::<Result<Vec<Node>, _>>()?;
    if request.replied.swap(true, Ordering::SeqCst) {
        return Err(GlueError::AlreadyReplied);
    }
    request.native.reply(status, cells_from_nodes(nodes));
    Ok(())
}

/// Replies with status -1 and a diagnostic payload describing a script
/// failure, unless the script already replied.
pub(crate) fn reply_script_error(request: &RequestHandle, info: &str, error: &ScriptError) {
    tracing::error!(
        verb = request.native.verb(),
        error = %error,
        "script callback failed"
    );
    if request.replied.swap(true, Ordering::SeqCst) {
        return;
    }
    let diagnostic = diagnostic_node(info, error);
    request
        .native
        .reply(-1, vec![ReplyCell::Node(diagnostic)]);
}
