//! Typed RPC payload cells as the host transport delivers them.

use crate::codec::float_node;
use crate::error::CodecError;
use crate::node::Node;

/// One typed cell of an RPC request or reply payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyCell {
    Str(String),
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    /// JSON payload already parsed by the transport.
    Json(serde_json::Value),
    /// Structured payload passed through without re-encoding.
    Node(Node),
    /// Byte payload with no defined script projection.
    Blob(Vec<u8>),
}

/// Converts one reply cell into a node.
///
/// # Errors
///
/// [`CodecError::UnsupportedReplyType`] for cell types with no script
/// projection; fatal only to that one cell conversion.
pub fn node_from_cell(cell: &ReplyCell) -> Result<Node, CodecError> {
    match cell {
        ReplyCell::Str(s) => Ok(Node::Str(s.clone())),
        ReplyCell::Bool(b) => Ok(Node::Bool(*b)),
        ReplyCell::I8(v) => Ok(Node::Int(i64::from(*v))),
        ReplyCell::U8(v) => Ok(Node::Int(i64::from(*v))),
        ReplyCell::I16(v) => Ok(Node::Int(i64::from(*v))),
        ReplyCell::U16(v) => Ok(Node::Int(i64::from(*v))),
        ReplyCell::I32(v) => Ok(Node::Int(i64::from(*v))),
        ReplyCell::U32(v) => Ok(Node::Int(i64::from(*v))),
        ReplyCell::I64(v) => Ok(Node::Int(*v)),
        ReplyCell::U64(v) => Ok(i64::try_from(*v)
            .map_or_else(|_| float_node(*v as f64), Node::Int)),
        ReplyCell::F32(v) => Ok(Node::Float(f64::from(*v))),
        ReplyCell::F64(v) => Ok(Node::Float(*v)),
        ReplyCell::Json(v) => Ok(Node::from_json(v)),
        ReplyCell::Node(n) => Ok(n.clone()),
        ReplyCell::Blob(_) => Err(CodecError::UnsupportedReplyType("blob")),
    }
}

/// Converts a cell slice into nodes, failing on the first unsupported cell.
///
/// # Errors
///
/// Propagates the first [`CodecError`] encountered.
pub fn nodes_from_cells(cells: &[ReplyCell]) -> Result<Vec<Node>, CodecError> {
    cells.iter().map(node_from_cell).collect()
}

/// Encodes nodes as outgoing payload cells. The structured cell type is the
/// generic carrier; more specific cell types are for hosts that negotiate
/// them.
pub fn cells_from_nodes(nodes: Vec<Node>) -> Vec<ReplyCell> {
    nodes.into_iter().map(ReplyCell::Node).collect()
}
