//! Value model shared by the script bridge and the host runtime.
//!
//! Three representations meet here:
//!
//! - [`ScriptValue`]: the embedded interpreter's native values (scalars,
//!   tables with string or integer keys, opaque references).
//! - [`Node`]: the generic structured-data envelope exchanged with the host
//!   (objects, arrays, scalars, in-process opaque references).
//! - [`ReplyCell`]: one typed cell of an RPC payload as the host transport
//!   delivers it.
//!
//! The [`codec`] module holds the conversion rules between them, including
//! the numeric round-trip rule (integral floats travel as integers) and the
//! mixed-key table rejection policy.

mod cell;
mod codec;
mod error;
mod node;
mod script;

#[cfg(test)]
mod tests;

pub use cell::{ReplyCell, cells_from_nodes, node_from_cell, nodes_from_cells};
pub use codec::{node_from_script, script_from_node};
pub use error::CodecError;
pub use node::{Node, OpaqueRef};
pub use script::{ScriptValue, TableKey};
