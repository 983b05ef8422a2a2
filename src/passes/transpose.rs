//! Transpose chain optimization
//!
//! Adjacent transposes compose into one permutation; a transpose chain whose
//! composition is the identity cancels entirely.

#![allow(missing_docs)]

use tracing::trace;

use crate::error::IrResult;
use crate::graph::{IrGraph, NodeId};
use crate::infer::Perm;
use crate::pass::{Pass, PassKind};
use crate::pattern::{Binding, Pattern};

fn transpose_order(graph: &IrGraph, node: NodeId) -> Option<Vec<usize>> {
    let order = graph.node(node)?.attr_ints("order")?;
    if order.iter().any(|&v| v < 0) {
        return None;
    }
    Some(order.iter().map(|&v| v as usize).collect())
}

/// Composition of two chained transposes: `t1` then `t2`
///
/// `out[i] = mid[o2[i]] = in[o1[o2[i]]]`, so the combined order is
/// `o1 ∘ o2` read right to left.
fn composed_order(o1: &[usize], o2: &[usize]) -> Option<Vec<usize>> {
    if o1.len() != o2.len() {
        return None;
    }
    Some(o2.iter().map(|&i| o1[i]).collect())
}

fn chain_pattern() -> Pattern {
    Pattern::new()
        .op("t1", "Transpose")
        .op("t2", "Transpose")
        .edge_at("t1", "t2", Some(0), Some(0))
}

/// Cancel `Transpose` pairs whose composed order is the identity
#[derive(Debug, Default)]
pub struct CancelInverseTranspose;

impl CancelInverseTranspose {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for CancelInverseTranspose {
    fn name(&self) -> &'static str {
        "cancel_inverse_transpose"
    }

    fn kind(&self) -> PassKind {
        PassKind::PatternRewrite
    }

    fn runs_before(&self) -> &'static [&'static str] {
        &["merge_transpose", "remove_dead_nodes"]
    }

    fn pattern(&self) -> Pattern {
        chain_pattern()
    }

    fn rewrite(&self, graph: &mut IrGraph, binding: &Binding) -> IrResult<bool> {
        let (t1, t2) = (binding.node("t1"), binding.node("t2"));
        let (Some(o1), Some(o2)) = (transpose_order(graph, t1), transpose_order(graph, t2))
        else {
            return Ok(false);
        };
        let Some(composed) = composed_order(&o1, &o2) else {
            return Ok(false);
        };
        if Perm::new(&composed) != Some(Perm::identity(composed.len())) {
            return Ok(false);
        }
        // t1 must feed only t2, or the cancellation would steal its output
        if graph.out_degree(t1) != 1 {
            return Ok(false);
        }
        let Some((src, src_port)) = graph.producer(t1, 0) else {
            return Ok(false);
        };

        graph.reroute_consumers(t2, 0, src, src_port)?;
        graph.disconnect_node(t2);
        graph.disconnect_node(t1);
        graph.remove_node(t2)?;
        let removed = graph.remove_node(t1)?;
        trace!(node = %removed.name, "inverse transpose pair cancelled");
        Ok(true)
    }
}

/// Merge chained `Transpose` nodes into a single one with the composed order
#[derive(Debug, Default)]
pub struct MergeTranspose;

impl MergeTranspose {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for MergeTranspose {
    fn name(&self) -> &'static str {
        "merge_transpose"
    }

    fn kind(&self) -> PassKind {
        PassKind::PatternRewrite
    }

    fn runs_before(&self) -> &'static [&'static str] {
        &["remove_dead_nodes"]
    }

    fn pattern(&self) -> Pattern {
        chain_pattern()
    }

    fn rewrite(&self, graph: &mut IrGraph, binding: &Binding) -> IrResult<bool> {
        let (t1, t2) = (binding.node("t1"), binding.node("t2"));
        let (Some(o1), Some(o2)) = (transpose_order(graph, t1), transpose_order(graph, t2))
        else {
            return Ok(false);
        };
        let Some(composed) = composed_order(&o1, &o2) else {
            return Ok(false);
        };
        if graph.out_degree(t1) != 1 {
            return Ok(false);
        }
        let Some((src, src_port)) = graph.producer(t1, 0) else {
            return Ok(false);
        };

        let composed_attr: Vec<i64> = composed.iter().map(|&v| v as i64).collect();
        graph
            .require_mut(t2)?
            .set_attr("order", composed_attr);
        graph.in_port(t2, 0).set_source(graph, src, src_port)?;
        graph.disconnect_node(t1);
        let removed = graph.remove_node(t1)?;
        trace!(node = %removed.name, "transpose chain merged");
        Ok(true)
    }
}
