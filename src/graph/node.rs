//! Node representation
//!
//! A node is either an `Operator` (carries an op-type tag and a resolved
//! shape-inference function) or `Data` (carries a constant payload). Both
//! kinds hold a typed attribute map.

use indexmap::IndexMap;

use crate::controlflow::ControlFlowInfo;
use crate::infer::{schema_for, InferFn, OpSchema, Shape};

use super::attr::{AttrValue, TensorData};

/// Unique node identifier, allocated monotonically per graph and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Construct from a raw index (tests and id arithmetic only)
    pub fn from_raw(raw: u32) -> Self {
        NodeId(raw)
    }

    /// The raw index backing this id
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Node kind: operator or constant data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Computation node with an operator-type tag
    Operator,
    /// Constant value node
    Data,
}

/// A graph node
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique id, assigned by the store on insertion
    pub(crate) id: NodeId,
    /// Diagnostic label (tensor or layer name from the source model)
    pub name: String,
    /// Operator vs data
    pub kind: NodeKind,
    /// Operator-type tag; `"Const"` for data nodes
    pub op_type: String,
    /// Named typed attributes
    pub attrs: IndexMap<String, AttrValue>,
    /// Resolved shape-inference function
    ///
    /// Must be present on every operator node before shape propagation runs;
    /// ingestion and the control-flow extractor establish this invariant.
    pub infer: Option<InferFn>,
    /// Operator schema this node was resolved against
    pub schema: Option<&'static OpSchema>,
    /// Inferred shape per output port
    pub out_shapes: Vec<Option<Shape>>,
    /// Constant payload: always set on data nodes, set by inference for
    /// value-propagating operators
    pub value: Option<TensorData>,
    /// Nested bodies for conditional/loop operators
    pub control: Option<Box<ControlFlowInfo>>,
}

impl Node {
    /// Create an operator node, resolving its infer function and schema from
    /// the operator registry
    pub fn operator(name: impl Into<String>, op_type: impl Into<String>) -> Self {
        let op_type = op_type.into();
        let schema = schema_for(&op_type);
        Node {
            id: NodeId(u32::MAX),
            name: name.into(),
            kind: NodeKind::Operator,
            op_type,
            attrs: IndexMap::new(),
            infer: schema.map(|s| s.infer),
            schema,
            out_shapes: Vec::new(),
            value: None,
            control: None,
        }
    }

    /// Create a data node holding a constant payload
    ///
    /// The output shape is derived from the payload immediately, so data
    /// nodes always satisfy the "inputs carry a defined shape" precondition
    /// of their consumers.
    pub fn data(name: impl Into<String>, value: TensorData) -> Self {
        let shape = Shape::from_dims(value.dims());
        Node {
            id: NodeId(u32::MAX),
            name: name.into(),
            kind: NodeKind::Data,
            op_type: "Const".to_string(),
            attrs: IndexMap::new(),
            infer: None,
            schema: None,
            out_shapes: vec![Some(shape)],
            value: Some(value),
            control: None,
        }
    }

    /// Attach an attribute (builder style)
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// The node's id
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Whether this is an operator node
    pub fn is_operator(&self) -> bool {
        self.kind == NodeKind::Operator
    }

    /// Whether this is a data node
    pub fn is_data(&self) -> bool {
        self.kind == NodeKind::Data
    }

    /// Read an attribute
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    /// Read an integer attribute
    pub fn attr_int(&self, name: &str) -> Option<i64> {
        self.attrs.get(name).and_then(AttrValue::as_int)
    }

    /// Read an integer-sequence attribute
    pub fn attr_ints(&self, name: &str) -> Option<&[i64]> {
        self.attrs.get(name).and_then(AttrValue::as_ints)
    }

    /// Set or replace an attribute
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.attrs.insert(name.into(), value.into());
    }

    /// Remove an attribute by name
    pub fn remove_attr(&mut self, name: &str) -> Option<AttrValue> {
        self.attrs.shift_remove(name)
    }

    /// Inferred shape of an output port, if already computed
    pub fn out_shape(&self, port: usize) -> Option<&Shape> {
        self.out_shapes.get(port).and_then(Option::as_ref)
    }

    /// Record the inferred shape for an output port, growing the port list
    /// as needed
    pub fn set_out_shape(&mut self, port: usize, shape: Shape) {
        if self.out_shapes.len() <= port {
            self.out_shapes.resize(port + 1, None);
        }
        self.out_shapes[port] = Some(shape);
    }
}
