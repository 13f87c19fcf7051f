use thiserror::Error;

/// Data-conversion failures.
///
/// These are never fatal to the bridge as a whole: a conversion error aborts
/// the one value or dispatch it occurred in and is logged by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A table carries both string and integer keys; no structured
    /// projection exists for it and no implicit coercion is attempted.
    #[error("table mixes string and integer keys")]
    MixedKeys,

    /// Integer table keys do not form a dense range starting at 0 or 1.
    #[error("integer table keys must form a dense 0- or 1-based range")]
    SparseKeys,

    /// The host delivered a reply cell with no defined script projection.
    /// Fatal to that one cell conversion, not to the surrounding call.
    #[error("unsupported reply cell type: {0}")]
    UnsupportedReplyType(&'static str),

    /// Opaque references only round-trip in-process and cannot be turned
    /// into JSON.
    #[error("opaque references cannot be serialized")]
    OpaqueNotSerializable,
}
