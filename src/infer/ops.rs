//! Built-in shape-inference functions
//!
//! One function per operator kind, dispatched through the schema registry.
//! Each function reads the already-inferred shapes/values of its input
//! ports' source nodes and records the node's output shapes. Inputs are
//! guaranteed to be inferred first because the runner walks the
//! data-dependency topological order.

use smallvec::SmallVec;

use crate::controlflow::{ControlFlowInfo, OutputRole};
use crate::error::{CompileError, IrResult};
use crate::graph::{IrGraph, NodeId, TensorData};

use super::layout::Perm;
use super::run_inference;
use super::shape::{broadcast_shapes, resolve_reshape_target, Dim, Shape};

/// Build a `ShapeInference` error carrying the node identity
pub(crate) fn shape_err(graph: &IrGraph, node: NodeId, reason: impl Into<String>) -> CompileError {
    CompileError::ShapeInference {
        node,
        op: graph
            .node(node)
            .map(|n| n.op_type.clone())
            .unwrap_or_default(),
        reason: reason.into(),
    }
}

/// Shape feeding `(node, port)`; fails when the port is unconnected or the
/// producer has not been inferred yet
pub(crate) fn input_shape(graph: &IrGraph, node: NodeId, port: usize) -> IrResult<Shape> {
    let (src, src_port) = graph
        .producer(node, port)
        .ok_or_else(|| shape_err(graph, node, format!("input port {port} is not connected")))?;
    graph
        .node(src)
        .and_then(|n| n.out_shape(src_port))
        .cloned()
        .ok_or_else(|| {
            shape_err(
                graph,
                node,
                format!("input port {port} has no inferred shape"),
            )
        })
}

/// Constant value feeding `(node, port)`, if the producer carries one
pub(crate) fn input_value(graph: &IrGraph, node: NodeId, port: usize) -> Option<TensorData> {
    let (src, src_port) = graph.producer(node, port)?;
    if src_port != 0 {
        return None;
    }
    graph.node(src)?.value.clone()
}

/// Input ports of a node that carry data edges, in port order
fn connected_in_ports(graph: &IrGraph, node: NodeId) -> Vec<usize> {
    graph
        .in_edge_ids(node)
        .into_iter()
        .filter_map(|eid| {
            let e = graph.edge(eid)?;
            (!e.attrs.back_edge).then_some(e.dst_port)
        })
        .collect()
}

// ============================================================================
// Structural operators
// ============================================================================

/// `Parameter`: shape comes from the declared `shape` attribute
pub fn infer_parameter(graph: &mut IrGraph, node: NodeId) -> IrResult<()> {
    let dims = graph
        .require(node)?
        .attr_ints("shape")
        .map(|d| d.to_vec())
        .ok_or_else(|| shape_err(graph, node, "parameter has no declared shape"))?;
    let shape = Shape::from_ints(&dims);
    graph.require_mut(node)?.set_out_shape(0, shape);
    Ok(())
}

/// `Result` / `Identity`: output mirrors input, value included
pub fn infer_passthrough(graph: &mut IrGraph, node: NodeId) -> IrResult<()> {
    let shape = input_shape(graph, node, 0)?;
    let value = input_value(graph, node, 0);
    let n = graph.require_mut(node)?;
    n.set_out_shape(0, shape);
    n.value = value;
    Ok(())
}

/// Elementwise operators: NumPy-style broadcast over every connected input
pub fn infer_elementwise(graph: &mut IrGraph, node: NodeId) -> IrResult<()> {
    let ports = connected_in_ports(graph, node);
    if ports.is_empty() {
        return Err(shape_err(graph, node, "no inputs connected"));
    }
    let mut out = input_shape(graph, node, ports[0])?;
    for &port in &ports[1..] {
        let rhs = input_shape(graph, node, port)?;
        out = broadcast_shapes(&out, &rhs)
            .ok_or_else(|| shape_err(graph, node, format!("cannot broadcast {out} with {rhs}")))?;
    }
    graph.require_mut(node)?.set_out_shape(0, out);
    Ok(())
}

// ============================================================================
// Shape-manipulating operators
// ============================================================================

/// `Reshape`: input 0 is data, input 1 the target-shape constant; `-1`
/// resolves against the element count and fails when not evenly divisible
pub fn infer_reshape(graph: &mut IrGraph, node: NodeId) -> IrResult<()> {
    let input = input_shape(graph, node, 0)?;
    let target = input_value(graph, node, 1)
        .and_then(|t| t.as_i64_slice().map(|s| s.to_vec()))
        .ok_or_else(|| shape_err(graph, node, "target shape is not a constant"))?;
    let out = resolve_reshape_target(&input, &target)
        .map_err(|reason| shape_err(graph, node, reason))?;
    graph.require_mut(node)?.set_out_shape(0, out);
    Ok(())
}

/// `Transpose`: permute the input shape by the `order` attribute
pub fn infer_transpose(graph: &mut IrGraph, node: NodeId) -> IrResult<()> {
    let input = input_shape(graph, node, 0)?;
    let order: Vec<usize> = match graph.require(node)?.attr_ints("order") {
        Some(order) => order.iter().map(|&v| v as usize).collect(),
        // like the source convention: missing order reverses the axes
        None => (0..input.rank()).rev().collect(),
    };
    let perm = Perm::new(&order)
        .ok_or_else(|| shape_err(graph, node, format!("order {order:?} is not a permutation")))?;
    let out = perm.apply_shape(&input).ok_or_else(|| {
        shape_err(
            graph,
            node,
            format!("order rank {} does not match input {input}", perm.rank()),
        )
    })?;
    graph.require_mut(node)?.set_out_shape(0, out);
    Ok(())
}

/// `Concat`: inputs share rank, extents summed along `axis`
pub fn infer_concat(graph: &mut IrGraph, node: NodeId) -> IrResult<()> {
    let ports = connected_in_ports(graph, node);
    if ports.is_empty() {
        return Err(shape_err(graph, node, "no inputs connected"));
    }
    let first = input_shape(graph, node, ports[0])?;
    let rank = first.rank();
    let raw_axis = graph
        .require(node)?
        .attr_int("axis")
        .ok_or_else(|| shape_err(graph, node, "concat has no axis attribute"))?;
    let axis = normalize_axis(raw_axis, rank)
        .ok_or_else(|| shape_err(graph, node, format!("axis {raw_axis} out of range for rank {rank}")))?;

    let mut out = first.clone();
    let mut total = first.dim(axis).expect("axis in range");
    for &port in &ports[1..] {
        let shape = input_shape(graph, node, port)?;
        if shape.rank() != rank {
            return Err(shape_err(
                graph,
                node,
                format!("rank mismatch: {first} vs {shape}"),
            ));
        }
        for d in 0..rank {
            if d == axis {
                continue;
            }
            match (out.0[d], shape.0[d]) {
                (Dim::Fixed(a), Dim::Fixed(b)) if a != b => {
                    return Err(shape_err(
                        graph,
                        node,
                        format!("extent mismatch on axis {d}: {a} vs {b}"),
                    ));
                }
                (Dim::Dynamic, Dim::Fixed(b)) => out.0[d] = Dim::Fixed(b),
                _ => {}
            }
        }
        total = match (total, shape.dim(axis).expect("axis in range")) {
            (Dim::Fixed(a), Dim::Fixed(b)) => Dim::Fixed(a + b),
            _ => Dim::Dynamic,
        };
    }
    out.0[axis] = total;
    graph.require_mut(node)?.set_out_shape(0, out);
    Ok(())
}

/// `MatMul`: batched matrix product with broadcast batch dims
pub fn infer_matmul(graph: &mut IrGraph, node: NodeId) -> IrResult<()> {
    let a = input_shape(graph, node, 0)?;
    let b = input_shape(graph, node, 1)?;
    if a.rank() < 2 || b.rank() < 2 {
        return Err(shape_err(
            graph,
            node,
            format!("matmul requires rank >= 2, got {a} and {b}"),
        ));
    }
    let (m, ka) = (a.0[a.rank() - 2], a.0[a.rank() - 1]);
    let (kb, n) = (b.0[b.rank() - 2], b.0[b.rank() - 1]);
    if let (Dim::Fixed(x), Dim::Fixed(y)) = (ka, kb) {
        if x != y {
            return Err(shape_err(
                graph,
                node,
                format!("inner extents differ: {x} vs {y}"),
            ));
        }
    }
    let batch_a = Shape(a.0[..a.rank() - 2].iter().copied().collect());
    let batch_b = Shape(b.0[..b.rank() - 2].iter().copied().collect());
    let batch = broadcast_shapes(&batch_a, &batch_b).ok_or_else(|| {
        shape_err(
            graph,
            node,
            format!("batch dims of {a} and {b} do not broadcast"),
        )
    })?;
    let mut out = batch;
    out.0.push(m);
    out.0.push(n);
    graph.require_mut(node)?.set_out_shape(0, out);
    Ok(())
}

/// `Shape`: rank-1 output holding the input shape; value-propagating when
/// the input shape is fully known
pub fn infer_shape_of(graph: &mut IrGraph, node: NodeId) -> IrResult<()> {
    let input = input_shape(graph, node, 0)?;
    let rank = input.rank();
    let value = input
        .is_fully_defined()
        .then(|| TensorData::from_i64s(input.to_ints()));
    let n = graph.require_mut(node)?;
    n.set_out_shape(0, Shape::from_dims(&[rank]));
    n.value = value;
    Ok(())
}

// ============================================================================
// Control-flow operators
// ============================================================================

/// `Loop`: infer the body with parameters seeded from the outer inputs, then
/// map carried results through directly and scan results with a dynamic
/// iteration axis inserted
pub fn infer_loop(graph: &mut IrGraph, node: NodeId) -> IrResult<()> {
    with_control(graph, node, |graph, control| {
        for body in &mut control.bodies {
            infer_body(graph, node, body)?;
            for binding in &body.output_map {
                let Some(outer_port) = binding.outer_port else {
                    continue;
                };
                let result_shape = body
                    .graph
                    .node(binding.result)
                    .and_then(|n| n.out_shape(0))
                    .cloned()
                    .ok_or_else(|| shape_err(graph, node, "body result has no inferred shape"))?;
                let out = match binding.role {
                    OutputRole::Carried => result_shape,
                    OutputRole::Scan { axis } => {
                        scan_shape(&result_shape, axis).ok_or_else(|| {
                            shape_err(
                                graph,
                                node,
                                format!("scan axis {axis} out of range for {result_shape}"),
                            )
                        })?
                    }
                    OutputRole::Condition => continue,
                };
                graph.require_mut(node)?.set_out_shape(outer_port, out);
            }
        }
        Ok(())
    })
}

/// `If`: infer every branch body, then merge branch result shapes per outer
/// output (equal extents kept, differing extents turn dynamic)
pub fn infer_if(graph: &mut IrGraph, node: NodeId) -> IrResult<()> {
    with_control(graph, node, |graph, control| {
        let mut merged: Vec<Option<Shape>> = Vec::new();
        for body in &mut control.bodies {
            infer_body(graph, node, body)?;
            for binding in &body.output_map {
                let Some(outer_port) = binding.outer_port else {
                    continue;
                };
                let shape = body
                    .graph
                    .node(binding.result)
                    .and_then(|n| n.out_shape(0))
                    .cloned()
                    .ok_or_else(|| shape_err(graph, node, "branch result has no inferred shape"))?;
                if merged.len() <= outer_port {
                    merged.resize(outer_port + 1, None);
                }
                merged[outer_port] = Some(match merged[outer_port].take() {
                    None => shape,
                    Some(prev) => merge_branch_shapes(&prev, &shape).ok_or_else(|| {
                        shape_err(
                            graph,
                            node,
                            format!("branch output ranks differ: {prev} vs {shape}"),
                        )
                    })?,
                });
            }
        }
        for (port, shape) in merged.into_iter().enumerate() {
            if let Some(shape) = shape {
                graph.require_mut(node)?.set_out_shape(port, shape);
            }
        }
        Ok(())
    })
}

/// Run `f` with the node's control-flow info temporarily detached, restoring
/// it regardless of the outcome
fn with_control<F>(graph: &mut IrGraph, node: NodeId, f: F) -> IrResult<()>
where
    F: FnOnce(&mut IrGraph, &mut ControlFlowInfo) -> IrResult<()>,
{
    let taken = graph.require_mut(node)?.control.take();
    let mut control = match taken {
        Some(control) => control,
        None => return Err(shape_err(graph, node, "control-flow node has no body")),
    };
    let result = f(graph, &mut control);
    graph.require_mut(node)?.control = Some(control);
    result
}

/// Seed body parameter shapes from the enclosing operator's inputs and run
/// inference over the body
fn infer_body(
    graph: &mut IrGraph,
    node: NodeId,
    body: &mut crate::controlflow::BodyGraph,
) -> IrResult<()> {
    for binding in &body.input_map {
        let outer = input_shape(graph, node, binding.outer_port)?;
        body.graph
            .node_mut(binding.param)
            .ok_or_else(|| shape_err(graph, node, "input map names a missing body parameter"))?
            .set_out_shape(0, outer.clone());
        // seeded parameters no longer consult their declared shape attribute
        if let Some(param) = body.graph.node_mut(binding.param) {
            param.set_attr("shape", outer.to_ints());
        }
    }
    run_inference(&mut body.graph)
}

fn scan_shape(result: &Shape, axis: i64) -> Option<Shape> {
    let rank = result.rank();
    let axis = normalize_axis(axis, rank + 1)?;
    let mut dims: SmallVec<[Dim; 4]> = result.0.clone();
    dims.insert(axis, Dim::Dynamic);
    Some(Shape(dims))
}

fn merge_branch_shapes(a: &Shape, b: &Shape) -> Option<Shape> {
    if a.rank() != b.rank() {
        return None;
    }
    Some(Shape(
        a.0.iter()
            .zip(b.0.iter())
            .map(|(x, y)| if x == y { *x } else { Dim::Dynamic })
            .collect(),
    ))
}

fn normalize_axis(axis: i64, rank: usize) -> Option<usize> {
    let rank = rank as i64;
    let axis = if axis < 0 { axis + rank } else { axis };
    (0..rank).contains(&axis).then_some(axis as usize)
}
