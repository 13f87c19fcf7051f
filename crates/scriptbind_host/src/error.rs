use thiserror::Error;

/// Failure reported by a host-runtime primitive.
///
/// `status` carries the host's own error code when it has one; refusals of
/// a subcall (the binder rejecting the call before any verb ran) arrive as
/// a `HostError` rather than as a reply, so no reply payload is ever built
/// for them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (status {status})")]
pub struct HostError {
    pub status: i32,
    pub message: String,
}

impl HostError {
    pub fn new(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Failure without a meaningful host status code.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(-1, message)
    }
}
