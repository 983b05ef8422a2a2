//! Control-flow body representation
//!
//! A conditional or loop operator exclusively owns one nested graph store
//! per body. Cross-graph data dependencies are explicit: every outer input
//! feeding the body is bound to a synthesized `Parameter` node, every body
//! output to a `Result` node with a declared role. Nested graphs form an
//! ownership tree: the child records only the name of its enclosing node
//! (see `GraphMeta::parent_node`), so no reference cycles exist.

use crate::error::{CompileError, IrResult};
use crate::graph::{IrGraph, NodeId};

/// Kind of control-flow operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlowKind {
    /// Conditional branch: one body per branch, exactly one executes
    Conditional,
    /// Iterative loop: one body, executed per iteration
    Loop,
}

/// Role of one body output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputRole {
    /// Execution-condition output (loop continuation predicate)
    Condition,
    /// Carried-state output, fed back into the next iteration's
    /// corresponding input
    Carried,
    /// Accumulated output, concatenated across iterations along `axis`
    Scan {
        /// Concatenation axis in the accumulated tensor
        axis: i64,
    },
}

/// Binding from an input port of the enclosing operator to a body parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputBinding {
    /// Input port on the enclosing control-flow node
    pub outer_port: usize,
    /// `Parameter` node inside the body
    pub param: NodeId,
}

/// Binding from a body result to an output port of the enclosing operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputBinding {
    /// Output port on the enclosing node; `None` for condition outputs,
    /// which never surface outside the body
    pub outer_port: Option<usize>,
    /// `Result` node inside the body
    pub result: NodeId,
    /// Declared role
    pub role: OutputRole,
}

/// Carried-state feedback: a body result feeding a body parameter on the
/// next iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackEdge {
    /// Producing `Result` node
    pub result: NodeId,
    /// Receiving `Parameter` node
    pub param: NodeId,
}

/// One nested body with its boundary wiring
#[derive(Debug, Clone)]
pub struct BodyGraph {
    /// The owned nested store
    pub graph: IrGraph,
    /// Outer input port → body parameter
    pub input_map: Vec<InputBinding>,
    /// Body result → outer output port + role
    pub output_map: Vec<OutputBinding>,
    /// Carried-state feedback pairs
    pub back_edges: Vec<BackEdge>,
}

impl BodyGraph {
    /// Wrap a graph with empty boundary maps
    pub fn new(graph: IrGraph) -> Self {
        BodyGraph {
            graph,
            input_map: Vec::new(),
            output_map: Vec::new(),
            back_edges: Vec::new(),
        }
    }

    /// Number of outputs per role: `(condition, carried, scan)`
    pub fn role_counts(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for binding in &self.output_map {
            match binding.role {
                OutputRole::Condition => counts.0 += 1,
                OutputRole::Carried => counts.1 += 1,
                OutputRole::Scan { .. } => counts.2 += 1,
            }
        }
        counts
    }
}

/// Validate declared output counts against a body's total output count
///
/// Misclassifying body outputs invalidates loop semantics, so the invariant
/// `carried + scan + (1 if condition) == total` is checked before any body
/// wiring is trusted.
pub fn validate_output_counts(
    total_outputs: usize,
    carried: usize,
    scan: usize,
    has_condition: bool,
) -> IrResult<()> {
    let expected = carried + scan + usize::from(has_condition);
    if expected != total_outputs {
        return Err(CompileError::Validation(format!(
            "body outputs misclassified: {carried} carried + {scan} scan + \
             {} condition != {total_outputs} total",
            usize::from(has_condition)
        )));
    }
    Ok(())
}

/// Control-flow payload of an operator node
#[derive(Debug, Clone)]
pub struct ControlFlowInfo {
    /// Conditional vs loop
    pub kind: ControlFlowKind,
    /// Owned bodies: exactly one for loops, one per branch for conditionals
    pub bodies: Vec<BodyGraph>,
}

impl ControlFlowInfo {
    /// Validate structural invariants of the bodies
    pub fn validate(&self) -> IrResult<()> {
        match self.kind {
            ControlFlowKind::Loop => {
                if self.bodies.len() != 1 {
                    return Err(CompileError::Validation(format!(
                        "loop must own exactly one body, found {}",
                        self.bodies.len()
                    )));
                }
            }
            ControlFlowKind::Conditional => {
                if self.bodies.is_empty() {
                    return Err(CompileError::Validation(
                        "conditional owns no bodies".to_string(),
                    ));
                }
            }
        }
        for body in &self.bodies {
            let (condition, carried, scan) = body.role_counts();
            if condition > 1 {
                return Err(CompileError::Validation(format!(
                    "body declares {condition} condition outputs"
                )));
            }
            validate_output_counts(body.output_map.len(), carried, scan, condition == 1)?;
            if self.kind == ControlFlowKind::Loop && body.back_edges.len() != carried {
                return Err(CompileError::Validation(format!(
                    "loop body has {carried} carried outputs but {} back edges",
                    body.back_edges.len()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_count_invariant_holds() {
        // 2 carried + 1 scan + the condition output = 4 total
        assert!(validate_output_counts(4, 2, 1, true).is_ok());
    }

    #[test]
    fn test_output_count_invariant_violated() {
        // a body reporting 3 total outputs for the same configuration
        // must fail
        let err = validate_output_counts(3, 2, 1, true).unwrap_err();
        assert!(matches!(err, CompileError::Validation(_)));
        assert!(err.to_string().contains("misclassified"));
    }

    #[test]
    fn test_loop_requires_single_body() {
        let info = ControlFlowInfo {
            kind: ControlFlowKind::Loop,
            bodies: vec![],
        };
        assert!(info.validate().is_err());
    }

    #[test]
    fn test_back_edge_count_matches_carried() {
        let mut body = BodyGraph::new(IrGraph::new());
        let g = &mut body.graph;
        let p = g.add_node(crate::graph::Node::operator("p", "Parameter"));
        let r = g.add_node(crate::graph::Node::operator("r", "Result"));
        body.output_map.push(OutputBinding {
            outer_port: None,
            result: r,
            role: OutputRole::Condition,
        });
        body.output_map.push(OutputBinding {
            outer_port: Some(0),
            result: r,
            role: OutputRole::Carried,
        });
        // carried output without a matching back edge
        let info = ControlFlowInfo {
            kind: ControlFlowKind::Loop,
            bodies: vec![body],
        };
        let err = info.validate().unwrap_err();
        assert!(err.to_string().contains("back edges"));

        let mut info = info;
        info.bodies[0].back_edges.push(BackEdge { result: r, param: p });
        assert!(info.validate().is_ok());
    }
}
