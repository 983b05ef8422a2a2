//! Error types for canonir
//!
//! This module defines all fatal error conditions of the compilation core.
//! Every variant aborts the compilation for the current input graph; none are
//! retried internally. A pattern matcher finding zero matches is ordinary
//! control flow and is never represented here.

use thiserror::Error;

use crate::graph::NodeId;

/// Fatal error raised by the graph transformation core
#[derive(Error, Debug)]
pub enum CompileError {
    /// The data-dependency subgraph is not acyclic
    #[error("graph contains a cycle over data-dependency edges")]
    GraphCycle,

    /// A node was removed while edges were still attached to it
    ///
    /// Always a programming defect in a pass: edges must be disconnected or
    /// rerouted before the node is removed.
    #[error("node {node} removed with {live_edges} live incident edge(s)")]
    DanglingEdge {
        /// The node that was being removed
        node: NodeId,
        /// Number of edges still attached
        live_edges: usize,
    },

    /// Contradictory `runs_after`/`runs_before` pass constraints
    #[error("pass ordering constraints are cyclic: {detail}")]
    PassOrderingCycle {
        /// Names of the passes participating in the cycle
        detail: String,
    },

    /// A pattern-rewrite pass exceeded its iteration cap
    #[error("pass '{pass}' did not terminate after {iterations} rewrite iterations")]
    NonTerminatingPass {
        /// Name of the offending pass
        pass: &'static str,
        /// Number of iterations performed before giving up
        iterations: usize,
    },

    /// Malformed or under-determined shape arithmetic
    #[error("shape inference failed for node {node} (op '{op}'): {reason}")]
    ShapeInference {
        /// Node being inferred
        node: NodeId,
        /// Operator type tag of the node
        op: String,
        /// Human-readable cause (indivisible reshape, rank mismatch, ...)
        reason: String,
    },

    /// A control-flow body references a tensor with no producer at any
    /// enclosing nesting level
    #[error("reference to tensor '{tensor}' is not satisfied at any enclosing graph level")]
    UnresolvedReference {
        /// The unresolvable tensor name
        tensor: String,
    },

    /// Structurally invalid graph input (duplicate input port, unknown node id, ...)
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// An operator node reached shape propagation without a resolvable
    /// `infer` function
    #[error("node {node} (op '{op}') has no resolvable infer function")]
    MissingInfer {
        /// The offending node
        node: NodeId,
        /// Operator type tag of the node
        op: String,
    },

    /// Canonical-form or control-flow validation failure
    #[error("validation failed: {0}")]
    Validation(String),
}

/// Result type alias for core operations
pub type IrResult<T> = Result<T, CompileError>;
