//! Reshape chain optimization
//!
//! A reshape feeding only another reshape is redundant: the downstream
//! target fully determines the result.

#![allow(missing_docs)]

use tracing::trace;

use crate::error::IrResult;
use crate::graph::IrGraph;
use crate::pass::{Pass, PassKind};
use crate::pattern::{Binding, Pattern};

/// Merge `Reshape -> Reshape` chains into the trailing reshape
#[derive(Debug, Default)]
pub struct MergeReshape;

impl MergeReshape {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for MergeReshape {
    fn name(&self) -> &'static str {
        "merge_reshape"
    }

    fn kind(&self) -> PassKind {
        PassKind::PatternRewrite
    }

    fn runs_before(&self) -> &'static [&'static str] {
        &["remove_dead_nodes"]
    }

    fn pattern(&self) -> Pattern {
        Pattern::new()
            .op("r1", "Reshape")
            .op("r2", "Reshape")
            .edge_at("r1", "r2", Some(0), Some(0))
    }

    fn rewrite(&self, graph: &mut IrGraph, binding: &Binding) -> IrResult<bool> {
        let (r1, r2) = (binding.node("r1"), binding.node("r2"));
        if graph.out_degree(r1) != 1 {
            return Ok(false);
        }
        let Some((src, src_port)) = graph.producer(r1, 0) else {
            return Ok(false);
        };

        // r2 keeps its own target; r1 and its target constant drop out
        // (the constant is left for dead-node cleanup)
        graph.in_port(r2, 0).set_source(graph, src, src_port)?;
        graph.disconnect_node(r1);
        let removed = graph.remove_node(r1)?;
        trace!(node = %removed.name, "reshape chain merged");
        Ok(true)
    }
}
