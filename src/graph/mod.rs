//! Attributed graph store
//!
//! The core mutable multigraph every other component operates on:
//!
//! - [`IrGraph`]: node/edge arena with insertion-ordered iteration, cached
//!   topological order and multigraph port semantics
//! - [`Node`] / [`AttrValue`]: typed attributed nodes (operator or data)
//! - [`Connection`]: port views hiding raw edge bookkeeping
//! - [`GraphMeta`]: per-graph settings (declared I/O, layout convention,
//!   nesting back-reference)
//!
//! # Example
//!
//! ```ignore
//! use canonir::graph::{IrGraph, Node, EdgeAttrs};
//!
//! let mut g = IrGraph::new();
//! let x = g.add_node(Node::operator("x", "Parameter"));
//! let relu = g.add_node(Node::operator("relu_0", "Relu"));
//! g.add_edge(x, 0, relu, 0, EdgeAttrs::named("x"))?;
//!
//! let order = g.topological_order()?;
//! let producer = g.producer(relu, 0);
//! ```

pub mod attr;
pub mod meta;
pub mod node;
pub mod port;
pub mod store;

pub use attr::{AttrValue, TensorData};
pub use meta::{GraphMeta, Layout};
pub use node::{Node, NodeId, NodeKind};
pub use port::{Connection, Direction};
pub use store::{Edge, EdgeAttrs, EdgeId, IrGraph};
