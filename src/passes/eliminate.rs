//! Elimination passes
//!
//! Passes that remove nodes without changing graph semantics: identity
//! elision and dead-node cleanup.

#![allow(missing_docs)]

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::error::IrResult;
use crate::graph::{IrGraph, NodeId};
use crate::pass::{Pass, PassKind};
use crate::pattern::{Binding, Pattern};

/// Elide `Identity` nodes: `{a -> b -> c}` becomes `{a -> c}` with the
/// attributes of the `a -> b` edge preserved on the new edge
#[derive(Debug, Default)]
pub struct ElideIdentity;

impl ElideIdentity {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for ElideIdentity {
    fn name(&self) -> &'static str {
        "elide_identity"
    }

    fn kind(&self) -> PassKind {
        PassKind::PatternRewrite
    }

    fn runs_before(&self) -> &'static [&'static str] {
        &["remove_dead_nodes"]
    }

    fn pattern(&self) -> Pattern {
        Pattern::new()
            .node("a")
            .op("b", "Identity")
            .node("c")
            .edge("a", "b")
            .edge("b", "c")
    }

    fn rewrite(&self, graph: &mut IrGraph, binding: &Binding) -> IrResult<bool> {
        let b = binding.node("b");
        // only single-producer/single-consumer identities are safe to bridge
        if graph.in_degree(b) != 1 || graph.out_degree(b) != 1 {
            return Ok(false);
        }
        let in_eid = graph.in_edge_ids(b)[0];
        let out_eid = graph.out_edge_ids(b)[0];
        let incoming = graph.remove_edge(in_eid).expect("edge listed");
        let outgoing = graph.remove_edge(out_eid).expect("edge listed");
        graph.add_edge(
            incoming.src,
            incoming.src_port,
            outgoing.dst,
            outgoing.dst_port,
            incoming.attrs,
        )?;
        let removed = graph.remove_node(b)?;
        trace!(node = %removed.name, "identity elided");
        Ok(true)
    }
}

/// Remove nodes that no longer contribute to any declared output
///
/// Liveness is a reverse reachability walk from `Result` nodes; `Parameter`
/// nodes are kept regardless, since they are part of the declared interface.
#[derive(Debug, Default)]
pub struct RemoveDeadNodes;

impl RemoveDeadNodes {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for RemoveDeadNodes {
    fn name(&self) -> &'static str {
        "remove_dead_nodes"
    }

    fn kind(&self) -> PassKind {
        PassKind::WholeGraph
    }

    fn run(&self, graph: &mut IrGraph) -> IrResult<bool> {
        let mut live: FxHashSet<NodeId> = FxHashSet::default();
        let mut stack: Vec<NodeId> = graph
            .nodes()
            .filter(|n| n.op_type == "Result" || n.op_type == "Parameter")
            .map(|n| n.id())
            .collect();
        while let Some(id) = stack.pop() {
            if !live.insert(id) {
                continue;
            }
            for eid in graph.in_edge_ids(id) {
                let edge = graph.edge(eid).expect("edge listed");
                if !live.contains(&edge.src) {
                    stack.push(edge.src);
                }
            }
        }

        let dead: Vec<NodeId> = graph
            .node_ids()
            .into_iter()
            .filter(|id| !live.contains(id))
            .collect();
        let changed = !dead.is_empty();
        for id in &dead {
            graph.disconnect_node(*id);
        }
        for id in dead {
            let removed = graph.remove_node(id)?;
            trace!(node = %removed.name, "dead node removed");
        }
        Ok(changed)
    }
}
