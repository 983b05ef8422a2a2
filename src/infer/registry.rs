//! Operator schema registry
//!
//! Per-operator behavior (shape-inference function, layout-sensitive
//! attribute lists) is resolved once at node-construction time and stored as
//! a function reference on the node, keeping new operator types pluggable
//! without a central conditional chain.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::error::IrResult;
use crate::graph::{IrGraph, NodeId};

use super::ops;

/// Shape-inference entry point for one operator kind
///
/// Reads the node's input shapes/values through its input ports and records
/// output shapes (and, for value-propagating operators, values) on the node.
pub type InferFn = fn(&mut IrGraph, NodeId) -> IrResult<()>;

/// Static behavior record for one operator kind
#[derive(Debug)]
pub struct OpSchema {
    /// Canonical operator-type tag
    pub op: &'static str,
    /// Shape-inference function
    pub infer: InferFn,
    /// Attribute names holding shape-like integer lists; layout conversion
    /// permutes these by the forward permutation
    pub shape_attrs: &'static [&'static str],
    /// Attribute names holding dimension indices; layout conversion remaps
    /// these through the inverse permutation
    pub dim_attrs: &'static [&'static str],
}

macro_rules! schema {
    ($op:literal, $infer:path) => {
        schema!($op, $infer, shape: &[], dims: &[])
    };
    ($op:literal, $infer:path, shape: $shape:expr, dims: $dims:expr) => {
        OpSchema {
            op: $op,
            infer: $infer,
            shape_attrs: $shape,
            dim_attrs: $dims,
        }
    };
}

static REGISTRY: Lazy<FxHashMap<&'static str, OpSchema>> = Lazy::new(|| {
    let schemas = [
        schema!("Parameter", ops::infer_parameter, shape: &["shape"], dims: &[]),
        schema!("Result", ops::infer_passthrough),
        schema!("Identity", ops::infer_passthrough),
        schema!("Add", ops::infer_elementwise),
        schema!("Sub", ops::infer_elementwise),
        schema!("Mul", ops::infer_elementwise),
        schema!("Div", ops::infer_elementwise),
        schema!("Relu", ops::infer_elementwise),
        schema!("Reshape", ops::infer_reshape),
        schema!("Transpose", ops::infer_transpose),
        schema!("Concat", ops::infer_concat, shape: &[], dims: &["axis"]),
        schema!("MatMul", ops::infer_matmul),
        schema!("Shape", ops::infer_shape_of),
        schema!("Loop", ops::infer_loop),
        schema!("If", ops::infer_if),
    ];
    schemas.into_iter().map(|s| (s.op, s)).collect()
});

/// Look up the schema for an operator-type tag
pub fn schema_for(op: &str) -> Option<&'static OpSchema> {
    REGISTRY.get(op)
}

/// All registered operator tags, sorted
pub fn registered_ops() -> Vec<&'static str> {
    let mut ops: Vec<&'static str> = REGISTRY.keys().copied().collect();
    ops.sort_unstable();
    ops
}
