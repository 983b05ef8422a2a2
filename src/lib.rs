//! # canonir
//!
//! Graph IR canonicalization engine: ingests a computation graph translated
//! from a foreign model format, applies an ordered sequence of rewrite
//! passes (pattern match-and-replace, shape/layout inference, control-flow
//! subgraph extraction) and hands the canonical result to an execution
//! backend.
//!
//! ## Features
//!
//! - **Attributed Graph Store**: mutable port-wired multigraph with cached,
//!   deterministic topological ordering
//! - **Pattern Matching**: declarative subgraph queries with lazy,
//!   deterministic constraint-propagation search
//! - **Pass Scheduling**: dependency-ordered registry with fixed-point
//!   pattern rewriting and interleaved shape inference
//! - **Control Flow**: nested body extraction with boundary parameters
//!   threaded through arbitrary nesting depth
//!
//! ## Example
//!
//! ```ignore
//! use canonir::prelude::*;
//!
//! let loader = InMemoryLoader::new(raw_graph, GraphMeta::default());
//! let artifact = Compiler::new().compile(&loader, &TextEmitter::new())?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod controlflow;
pub mod emit;
pub mod error;
pub mod graph;
pub mod infer;
pub mod ingest;
pub mod pass;
pub mod passes;
pub mod pattern;
pub mod pipeline;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use canonir::prelude::*`
pub mod prelude {
    pub use crate::controlflow::{ControlFlowInfo, ControlFlowKind, OutputRole};
    pub use crate::emit::{validate_canonical, Emitter, TextEmitter};
    pub use crate::error::{CompileError, IrResult};
    pub use crate::graph::{
        AttrValue, EdgeAttrs, GraphMeta, IrGraph, Layout, Node, NodeId, NodeKind, TensorData,
    };
    pub use crate::infer::{run_inference, Dim, Perm, Shape};
    pub use crate::ingest::{assemble_model, InMemoryLoader, Loader, RawGraph, RawInput, RawNode};
    pub use crate::pass::{Pass, PassKind, Scheduler};
    pub use crate::passes::default_passes;
    pub use crate::pattern::{find_matches, first_match, Binding, Pattern};
    pub use crate::pipeline::{CompileOptions, Compiler};
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{CompileError, IrResult};
pub use graph::IrGraph;
pub use pipeline::Compiler;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
