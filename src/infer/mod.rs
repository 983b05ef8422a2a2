//! Shape/layout inference
//!
//! Per-operator-kind shape propagation: given the input shapes, layouts and
//! constant values of a node, compute its output shapes (and, for
//! value-propagating operators, values). The pipeline re-runs inference
//! bottom-up after every structural change a pass makes.
//!
//! - [`shape`]: `Dim`/`Shape` arithmetic, broadcasting, reshape resolution
//! - [`layout`]: forward/inverse axis permutations
//! - [`registry`]: operator-schema lookup resolved at node construction
//! - [`ops`]: the built-in inference functions

pub mod layout;
pub mod ops;
pub mod registry;
pub mod shape;

pub use layout::Perm;
pub use registry::{registered_ops, schema_for, InferFn, OpSchema};
pub use shape::{broadcast_shapes, resolve_reshape_target, Dim, Shape};

use crate::error::{CompileError, IrResult};
use crate::graph::{IrGraph, NodeKind};

/// Run shape inference over the whole graph in data-dependency order
///
/// Data nodes already carry shapes derived from their payloads; every
/// operator node is required to hold a resolvable `infer` function; the
/// ingestion/extraction components establish that invariant before the
/// scheduler hands a graph here.
pub fn run_inference(graph: &mut IrGraph) -> IrResult<()> {
    let order = graph.topological_order()?;
    for id in order {
        let node = graph.require(id)?;
        if node.kind != NodeKind::Operator {
            continue;
        }
        let infer = node.infer.ok_or_else(|| CompileError::MissingInfer {
            node: id,
            op: node.op_type.clone(),
        })?;
        infer(graph, id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeAttrs, Node};

    #[test]
    fn test_missing_infer_is_an_invariant_violation() {
        let mut g = IrGraph::new();
        let x = g.add_node(Node::operator("x", "Parameter").with_attr("shape", vec![2i64]));
        let odd = g.add_node(Node::operator("odd", "NotARealOp"));
        g.add_edge(x, 0, odd, 0, EdgeAttrs::default()).unwrap();

        match run_inference(&mut g) {
            Err(CompileError::MissingInfer { node, op }) => {
                assert_eq!(node, odd);
                assert_eq!(op, "NotARealOp");
            }
            other => panic!("expected MissingInfer, got {other:?}"),
        }
    }

    #[test]
    fn test_inference_runs_in_topological_order() {
        // add depends on both parameters; relu depends on add
        let mut g = IrGraph::new();
        let a = g.add_node(Node::operator("a", "Parameter").with_attr("shape", vec![2i64, 3]));
        let b = g.add_node(Node::operator("b", "Parameter").with_attr("shape", vec![2i64, 3]));
        let add = g.add_node(Node::operator("add", "Add"));
        let relu = g.add_node(Node::operator("relu", "Relu"));
        g.add_edge(a, 0, add, 0, EdgeAttrs::default()).unwrap();
        g.add_edge(b, 0, add, 1, EdgeAttrs::default()).unwrap();
        g.add_edge(add, 0, relu, 0, EdgeAttrs::default()).unwrap();

        run_inference(&mut g).unwrap();
        assert_eq!(
            *g.node(relu).unwrap().out_shape(0).unwrap(),
            Shape::from_ints(&[2, 3])
        );
    }
}
