//! Ingestion: raw model → attributed graph
//!
//! Per-format loaders produce a [`RawGraph`]: operator nodes wired by tensor
//! names, with nested raw bodies for control-flow operators. The
//! [`Assembler`] turns that into port-wired [`IrGraph`] stores, invoking the
//! control-flow subgraph extractor for every conditional/loop body.
//!
//! # External reference resolution
//!
//! A tensor referenced inside a body but not produced there resolves by
//! walking the enclosing frames outward: the innermost producing level gets
//! an extra input edge on the enclosing operator, and a boundary `Parameter`
//! is synthesized inside the body, with a transit `Parameter` threaded
//! through every intermediate nesting level. A reference no level can
//! satisfy is a fatal [`CompileError::UnresolvedReference`]; the source
//! graph is not self-consistent.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::controlflow::{
    validate_output_counts, BackEdge, BodyGraph, ControlFlowInfo, ControlFlowKind, InputBinding,
    OutputBinding, OutputRole,
};
use crate::error::{CompileError, IrResult};
use crate::graph::{AttrValue, EdgeAttrs, GraphMeta, IrGraph, Node, NodeId, TensorData};
use crate::infer::Shape;

/// Declared model or body input
#[derive(Debug, Clone)]
pub struct RawInput {
    /// Tensor name
    pub name: String,
    /// Declared shape; negative extents mean dynamic
    pub shape: Vec<i64>,
}

impl RawInput {
    /// Convenience constructor
    pub fn new(name: impl Into<String>, shape: &[i64]) -> Self {
        RawInput {
            name: name.into(),
            shape: shape.to_vec(),
        }
    }
}

/// One raw operator node, wired by tensor names
#[derive(Debug, Clone, Default)]
pub struct RawNode {
    /// Node name (diagnostic)
    pub name: String,
    /// Operator-type tag
    pub op_type: String,
    /// Input tensor names; an empty string is an omitted optional input
    pub inputs: Vec<String>,
    /// Output tensor names
    pub outputs: Vec<String>,
    /// Typed attributes
    pub attrs: IndexMap<String, AttrValue>,
    /// Nested raw bodies (control-flow operators only): one for `Loop`, one
    /// per branch for `If`
    pub bodies: Vec<RawGraph>,
}

impl RawNode {
    /// Convenience constructor
    pub fn new(name: &str, op_type: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        RawNode {
            name: name.to_string(),
            op_type: op_type.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            attrs: IndexMap::new(),
            bodies: Vec::new(),
        }
    }

    /// Attach an attribute (builder style)
    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    /// Attach a nested body (builder style)
    pub fn with_body(mut self, body: RawGraph) -> Self {
        self.bodies.push(body);
        self
    }
}

/// A raw model graph or control-flow body
#[derive(Debug, Clone, Default)]
pub struct RawGraph {
    /// Graph name (diagnostic)
    pub name: String,
    /// Declared inputs; for loop bodies: iteration number, condition, then
    /// carried state
    pub inputs: Vec<RawInput>,
    /// Declared output tensor names; for loop bodies: condition, carried
    /// state, then scan outputs
    pub outputs: Vec<String>,
    /// Named constants
    pub constants: Vec<(String, TensorData)>,
    /// Operator nodes in model order
    pub nodes: Vec<RawNode>,
}

/// Result of ingestion: the assembled root graph plus the loader-declared
/// input shapes
#[derive(Debug)]
pub struct LoadedModel {
    /// Fully assembled root store; every operator node carries a resolvable
    /// `infer` function
    pub graph: IrGraph,
    /// Declared input name → shape
    pub input_shapes: IndexMap<String, Shape>,
}

/// Ingestion collaborator contract
pub trait Loader {
    /// Produce the initial attributed graph and declared input shapes
    fn load(&self) -> IrResult<LoadedModel>;
}

/// Loader over an already-parsed in-memory raw graph
#[derive(Debug)]
pub struct InMemoryLoader {
    raw: RawGraph,
    meta: GraphMeta,
}

impl InMemoryLoader {
    /// Wrap a raw graph with the given graph-level metadata
    pub fn new(raw: RawGraph, meta: GraphMeta) -> Self {
        InMemoryLoader { raw, meta }
    }
}

impl Loader for InMemoryLoader {
    fn load(&self) -> IrResult<LoadedModel> {
        assemble_model(&self.raw, self.meta.clone())
    }
}

/// Assemble a raw model into an attributed graph store
pub fn assemble_model(raw: &RawGraph, meta: GraphMeta) -> IrResult<LoadedModel> {
    let mut assembler = Assembler {
        frames: vec![Frame::root(meta)],
    };
    assembler.build_graph(raw)?;
    let frame = assembler.frames.pop().expect("root frame");
    debug_assert!(assembler.frames.is_empty());
    let graph = frame.graph;
    verify_infer_resolvable(&graph)?;
    debug!(graph = %graph.summary(), "model assembled");

    let input_shapes = raw
        .inputs
        .iter()
        .map(|i| (i.name.clone(), Shape::from_ints(&i.shape)))
        .collect();
    Ok(LoadedModel {
        graph,
        input_shapes,
    })
}

/// Every operator node must carry a resolvable infer function before shape
/// propagation runs; ingestion establishes that invariant here
fn verify_infer_resolvable(graph: &IrGraph) -> IrResult<()> {
    for node in graph.nodes() {
        if node.is_operator() && node.infer.is_none() {
            return Err(CompileError::MissingInfer {
                node: node.id(),
                op: node.op_type.clone(),
            });
        }
        if let Some(control) = &node.control {
            for body in &control.bodies {
                verify_infer_resolvable(&body.graph)?;
            }
        }
    }
    Ok(())
}

/// One level of the assembly stack
struct Frame {
    graph: IrGraph,
    /// The owning control-flow node in the parent frame; `None` at the root
    owner: Option<NodeId>,
    /// Boundary parameters synthesized at this level, by tensor name
    synthesized: FxHashMap<String, NodeId>,
    /// Boundary bindings accumulated for this level's body
    extern_inputs: Vec<InputBinding>,
}

impl Frame {
    fn root(meta: GraphMeta) -> Self {
        Frame {
            graph: IrGraph::with_meta(meta),
            owner: None,
            synthesized: FxHashMap::default(),
            extern_inputs: Vec::new(),
        }
    }
}

/// Converts tensor-name wiring into port edges on a frame stack; contains
/// the control-flow subgraph extractor
struct Assembler {
    frames: Vec<Frame>,
}

impl Assembler {
    fn top(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("non-empty frame stack")
    }

    /// Build the raw graph's content into the top frame; returns the
    /// `Result` node ids in declared output order
    fn build_graph(&mut self, raw: &RawGraph) -> IrResult<Vec<NodeId>> {
        for input in &raw.inputs {
            let node =
                Node::operator(&input.name, "Parameter").with_attr("shape", input.shape.clone());
            let frame = self.top();
            let id = frame.graph.add_node(node);
            frame.graph.meta.input_names.push(input.name.clone());
            frame
                .graph
                .meta
                .tensor_map
                .insert(input.name.clone(), (id, 0));
        }

        for (name, value) in &raw.constants {
            let frame = self.top();
            let id = frame.graph.add_node(Node::data(name, value.clone()));
            frame.graph.meta.tensor_map.insert(name.clone(), (id, 0));
        }

        for raw_node in &raw.nodes {
            self.build_node(raw_node)?;
        }

        let mut results = Vec::with_capacity(raw.outputs.len());
        for out_name in &raw.outputs {
            let frame = self.top();
            let Some(&(src, src_port)) = frame.graph.meta.tensor_map.get(out_name) else {
                return Err(CompileError::UnresolvedReference {
                    tensor: out_name.clone(),
                });
            };
            let result = frame
                .graph
                .add_node(Node::operator(format!("{out_name}/result"), "Result"));
            frame
                .graph
                .add_edge(src, src_port, result, 0, EdgeAttrs::named(out_name.clone()))?;
            frame.graph.meta.output_names.push(out_name.clone());
            results.push(result);
        }
        Ok(results)
    }

    fn build_node(&mut self, raw_node: &RawNode) -> IrResult<()> {
        let mut node = Node::operator(&raw_node.name, &raw_node.op_type);
        node.attrs = raw_node.attrs.clone();
        let id = self.top().graph.add_node(node);

        for (dst_port, inp) in raw_node.inputs.iter().enumerate() {
            if inp.is_empty() {
                // omitted optional input
                continue;
            }
            self.resolve_input(inp, id, dst_port)?;
        }

        if !raw_node.bodies.is_empty() {
            self.extract_control_flow(id, raw_node)?;
        }

        let frame = self.top();
        for (src_port, out) in raw_node.outputs.iter().enumerate() {
            if frame.graph.meta.tensor_map.contains_key(out) {
                trace!(tensor = %out, "tensor name reused by a later producer");
            }
            frame
                .graph
                .meta
                .tensor_map
                .insert(out.clone(), (id, src_port));
        }
        Ok(())
    }

    /// Wire one tensor reference into `(dst, dst_port)` of the top frame
    ///
    /// State machine per reference: (1) local production map; (2) innermost
    /// enclosing production: synthesize one boundary parameter plus one
    /// extra input edge on the enclosing operator; (3) recurse outward with
    /// transit parameters until a production is found or the outermost graph
    /// is exhausted.
    fn resolve_input(&mut self, tensor: &str, dst: NodeId, dst_port: usize) -> IrResult<()> {
        let top = self.frames.len() - 1;

        if let Some(&(src, src_port)) = self.frames[top].graph.meta.tensor_map.get(tensor) {
            self.frames[top]
                .graph
                .add_edge(src, src_port, dst, dst_port, EdgeAttrs::named(tensor))?;
            return Ok(());
        }
        // an earlier reference already synthesized a boundary parameter here
        if let Some(&param) = self.frames[top].synthesized.get(tensor) {
            self.frames[top]
                .graph
                .add_edge(param, 0, dst, dst_port, EdgeAttrs::named(tensor))?;
            return Ok(());
        }

        let mut cur = top;
        let mut pending: Option<NodeId> = None;
        loop {
            if cur == 0 {
                return Err(CompileError::UnresolvedReference {
                    tensor: tensor.to_string(),
                });
            }
            let parent = cur - 1;
            let param = match pending {
                Some(param) => param,
                None => {
                    let param = self.synthesize_parameter(cur, tensor, tensor);
                    self.frames[cur].graph.add_edge(
                        param,
                        0,
                        dst,
                        dst_port,
                        EdgeAttrs::named(tensor),
                    )?;
                    param
                }
            };
            let owner = self.frames[cur].owner.expect("nested frame has an owner");

            if let Some(&(src, src_port)) = self.frames[parent].graph.meta.tensor_map.get(tensor) {
                trace!(tensor, "edge between outer and inner graph");
                let port = self.frames[parent].graph.next_free_input_port(owner);
                self.frames[parent].graph.add_edge(
                    src,
                    src_port,
                    owner,
                    port,
                    EdgeAttrs::named(tensor),
                )?;
                self.frames[cur].extern_inputs.push(InputBinding {
                    outer_port: port,
                    param,
                });
                return Ok(());
            }

            if let Some(&transit) = self.frames[parent].synthesized.get(tensor) {
                // an existing transit chain already threads this tensor
                // through the parent level
                let port = self.frames[parent].graph.next_free_input_port(owner);
                self.frames[parent].graph.add_edge(
                    transit,
                    0,
                    owner,
                    port,
                    EdgeAttrs::named(tensor),
                )?;
                self.frames[cur].extern_inputs.push(InputBinding {
                    outer_port: port,
                    param,
                });
                return Ok(());
            }

            // no production in the parent either: thread a transit parameter
            // through it and keep walking outward
            let transit =
                self.synthesize_parameter(parent, tensor, &format!("{tensor}/transit"));
            let port = self.frames[parent].graph.next_free_input_port(owner);
            self.frames[parent]
                .graph
                .add_edge(transit, 0, owner, port, EdgeAttrs::named(tensor))?;
            self.frames[cur].extern_inputs.push(InputBinding {
                outer_port: port,
                param,
            });
            pending = Some(transit);
            cur = parent;
        }
    }

    fn synthesize_parameter(&mut self, level: usize, tensor: &str, name: &str) -> NodeId {
        let frame = &mut self.frames[level];
        let id = frame.graph.add_node(Node::operator(name, "Parameter"));
        frame.synthesized.insert(tensor.to_string(), id);
        trace!(tensor, level, "boundary parameter synthesized");
        id
    }

    // ========================================================================
    // Control-flow subgraph extraction
    // ========================================================================

    fn extract_control_flow(&mut self, owner: NodeId, raw_node: &RawNode) -> IrResult<()> {
        let kind = match raw_node.op_type.as_str() {
            "Loop" => ControlFlowKind::Loop,
            "If" => ControlFlowKind::Conditional,
            other => {
                return Err(CompileError::InvalidGraph(format!(
                    "operator '{other}' does not take a body"
                )))
            }
        };
        let mut bodies = Vec::with_capacity(raw_node.bodies.len());
        for raw_body in &raw_node.bodies {
            bodies.push(self.extract_body(owner, raw_node, raw_body, kind)?);
        }
        let info = ControlFlowInfo { kind, bodies };
        info.validate()?;
        self.top().graph.require_mut(owner)?.control = Some(Box::new(info));
        Ok(())
    }

    /// Build one nested body store and wire its boundary
    fn extract_body(
        &mut self,
        owner: NodeId,
        raw_node: &RawNode,
        raw_body: &RawGraph,
        kind: ControlFlowKind,
    ) -> IrResult<BodyGraph> {
        let owner_name = self.top().graph.require(owner)?.name.clone();
        let meta = self.top().graph.meta.child(&owner_name);
        self.frames.push(Frame {
            graph: IrGraph::with_meta(meta),
            owner: Some(owner),
            synthesized: FxHashMap::default(),
            extern_inputs: Vec::new(),
        });

        let results = self.build_graph(raw_body)?;
        let frame = self.frames.pop().expect("body frame");
        let mut body = BodyGraph::new(frame.graph);
        body.input_map = frame.extern_inputs;

        match kind {
            ControlFlowKind::Loop => {
                self.wire_loop_boundary(raw_node, raw_body, &results, &mut body)?
            }
            ControlFlowKind::Conditional => {
                validate_output_counts(results.len(), raw_node.outputs.len(), 0, false)?;
                for (i, &result) in results.iter().enumerate() {
                    body.output_map.push(OutputBinding {
                        outer_port: Some(i),
                        result,
                        role: OutputRole::Carried,
                    });
                }
            }
        }
        debug!(
            owner = %owner_name,
            body = %body.graph.summary(),
            params = body.input_map.len(),
            "body extracted"
        );
        Ok(body)
    }

    /// Loop boundary layout, following the source convention: outer inputs
    /// `[trip_count, condition, carried...]`, body inputs `[iteration,
    /// condition, carried...]`, body outputs `[condition, carried...,
    /// scan...]`, outer outputs `[carried..., scan...]`
    fn wire_loop_boundary(
        &mut self,
        raw_node: &RawNode,
        raw_body: &RawGraph,
        results: &[NodeId],
        body: &mut BodyGraph,
    ) -> IrResult<()> {
        let carried = raw_body.inputs.len().checked_sub(2).ok_or_else(|| {
            CompileError::Validation(format!(
                "loop body '{}' must declare iteration and condition inputs",
                raw_body.name
            ))
        })?;
        let scan = raw_node.outputs.len().checked_sub(carried).ok_or_else(|| {
            CompileError::Validation(format!(
                "loop '{}' declares fewer outputs than carried states",
                raw_node.name
            ))
        })?;
        validate_output_counts(results.len(), carried, scan, true)?;

        // declared body inputs bind positionally to the outer input ports
        for (i, input) in raw_body.inputs.iter().enumerate() {
            let (param, _) = body.graph.meta.tensor_map[&input.name];
            body.input_map.push(InputBinding {
                outer_port: i,
                param,
            });
        }
        // the iteration-number parameter is special-cased by backends
        if let Some(first) = raw_body.inputs.first() {
            let (param, _) = body.graph.meta.tensor_map[&first.name];
            body.graph
                .node_mut(param)
                .expect("parameter exists")
                .set_attr("current_iteration", true);
        }

        let scan_axis = raw_node
            .attrs
            .get("scan_axis")
            .and_then(AttrValue::as_int)
            .unwrap_or(0);
        for (i, &result) in results.iter().enumerate() {
            let binding = if i == 0 {
                OutputBinding {
                    outer_port: None,
                    result,
                    role: OutputRole::Condition,
                }
            } else if i <= carried {
                OutputBinding {
                    outer_port: Some(i - 1),
                    result,
                    role: OutputRole::Carried,
                }
            } else {
                OutputBinding {
                    outer_port: Some(i - 1),
                    result,
                    role: OutputRole::Scan { axis: scan_axis },
                }
            };
            body.output_map.push(binding);
        }

        // carried state feeds back: result i+1 -> parameter i+2, recorded
        // and tagged as a back edge inside the body
        for i in 0..carried {
            let result = results[i + 1];
            let input = &raw_body.inputs[i + 2];
            let (param, _) = body.graph.meta.tensor_map[&input.name];
            body.back_edges.push(BackEdge { result, param });
            body.graph
                .add_edge(result, 0, param, 0, EdgeAttrs::back(input.name.clone()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Layout;

    fn base_meta() -> GraphMeta {
        GraphMeta {
            layout: Layout::ChannelFirst,
            source_format: Some("test".to_string()),
            ..Default::default()
        }
    }

    fn linear_raw() -> RawGraph {
        RawGraph {
            name: "linear".to_string(),
            inputs: vec![RawInput::new("x", &[2, 3])],
            outputs: vec!["y".to_string()],
            constants: vec![("w".to_string(), TensorData::from_f32s(vec![1.0, 2.0, 3.0]))],
            nodes: vec![
                RawNode::new("add_0", "Add", &["x", "w"], &["sum"]),
                RawNode::new("relu_0", "Relu", &["sum"], &["y"]),
            ],
        }
    }

    #[test]
    fn test_linear_assembly() {
        let model = assemble_model(&linear_raw(), base_meta()).unwrap();
        let g = &model.graph;
        // x, w, add, relu, result
        assert_eq!(g.node_count(), 5);
        assert_eq!(g.edge_count(), 4);
        assert_eq!(model.input_shapes["x"], Shape::from_ints(&[2, 3]));
        assert_eq!(g.meta.input_names, vec!["x"]);
        assert_eq!(g.meta.output_names, vec!["y"]);

        let add = g.nodes_of_op("Add")[0];
        let relu = g.nodes_of_op("Relu")[0];
        let x = g.nodes_of_op("Parameter")[0];
        assert_eq!(g.producer(add, 0), Some((x, 0)));
        assert_eq!(g.producer(relu, 0), Some((add, 0)));
        let result = g.nodes_of_op("Result")[0];
        assert_eq!(g.producer(result, 0), Some((relu, 0)));
    }

    #[test]
    fn test_optional_input_skipped() {
        let mut raw = linear_raw();
        raw.nodes[1].inputs = vec!["sum".to_string(), String::new()];
        let model = assemble_model(&raw, base_meta()).unwrap();
        let relu = model.graph.nodes_of_op("Relu")[0];
        assert_eq!(model.graph.in_degree(relu), 1);
    }

    #[test]
    fn test_unresolved_reference_at_root() {
        let mut raw = linear_raw();
        raw.nodes[0].inputs[1] = "phantom".to_string();
        let err = assemble_model(&raw, base_meta()).unwrap_err();
        match err {
            CompileError::UnresolvedReference { tensor } => assert_eq!(tensor, "phantom"),
            other => panic!("expected unresolved reference, got {other}"),
        }
    }

    #[test]
    fn test_unknown_operator_fails_infer_invariant() {
        let mut raw = linear_raw();
        raw.nodes[1].op_type = "Mystery".to_string();
        let err = assemble_model(&raw, base_meta()).unwrap_err();
        assert!(matches!(err, CompileError::MissingInfer { .. }));
    }

    /// Loop body referencing `outer_w` produced one level up
    fn loop_raw(depth_one_tensor: &str) -> RawGraph {
        let body = RawGraph {
            name: "body".to_string(),
            inputs: vec![
                RawInput::new("iter", &[]),
                RawInput::new("cond_in", &[]),
                RawInput::new("state_in", &[2, 3]),
            ],
            outputs: vec![
                "cond_out".to_string(),
                "state_out".to_string(),
            ],
            constants: vec![],
            nodes: vec![
                RawNode::new("body_add", "Add", &["state_in", depth_one_tensor], &["state_out"]),
                RawNode::new("body_id", "Identity", &["cond_in"], &["cond_out"]),
            ],
        };
        RawGraph {
            name: "looped".to_string(),
            inputs: vec![
                RawInput::new("trip", &[]),
                RawInput::new("go", &[]),
                RawInput::new("x", &[2, 3]),
            ],
            outputs: vec!["x_final".to_string()],
            constants: vec![("outer_w".to_string(), TensorData::from_f32s(vec![0.5]))],
            nodes: vec![RawNode::new(
                "loop_0",
                "Loop",
                &["trip", "go", "x"],
                &["x_final"],
            )
            .with_body(body)],
        }
    }

    #[test]
    fn test_loop_extraction_boundary_depth_one() {
        let model = assemble_model(&loop_raw("outer_w"), base_meta()).unwrap();
        let g = &model.graph;
        let loop_id = g.nodes_of_op("Loop")[0];
        // declared inputs 0..=2 plus exactly one synthesized boundary edge
        assert_eq!(g.in_degree(loop_id), 4);

        let control = g.node(loop_id).unwrap().control.as_ref().unwrap();
        assert_eq!(control.kind, ControlFlowKind::Loop);
        let body = &control.bodies[0];
        // 3 declared parameters + 1 boundary parameter
        assert_eq!(body.graph.nodes_of_op("Parameter").len(), 4);
        // input map: one boundary binding plus the three declared ones
        assert_eq!(body.input_map.len(), 4);
        let boundary = body
            .input_map
            .iter()
            .find(|b| b.outer_port == 3)
            .expect("boundary binding on the synthesized port");
        assert_eq!(
            body.graph.node(boundary.param).unwrap().op_type,
            "Parameter"
        );

        // roles: condition + one carried, no scans; one back edge
        assert_eq!(body.role_counts(), (1, 1, 0));
        assert_eq!(body.back_edges.len(), 1);
        // the feedback edge is tagged and invisible to producer()
        let param = body.back_edges[0].param;
        assert_eq!(body.graph.producer(param, 0), None);
        assert_eq!(body.graph.in_degree(param), 1);

        // nested meta: inherited format, fresh tensor cache, parent link set
        assert_eq!(body.graph.meta.source_format.as_deref(), Some("test"));
        assert_eq!(body.graph.meta.parent_node.as_deref(), Some("loop_0"));
    }

    #[test]
    fn test_loop_output_misclassification_rejected() {
        // 2 carried + 1 scan requires 4 body outputs; this body reports 3
        let body = RawGraph {
            name: "body".to_string(),
            inputs: vec![
                RawInput::new("iter", &[]),
                RawInput::new("cond_in", &[]),
                RawInput::new("s0_in", &[2]),
                RawInput::new("s1_in", &[2]),
            ],
            outputs: vec![
                "cond_out".to_string(),
                "s0_out".to_string(),
                "s1_out".to_string(),
            ],
            constants: vec![],
            nodes: vec![
                RawNode::new("id0", "Identity", &["cond_in"], &["cond_out"]),
                RawNode::new("id1", "Identity", &["s0_in"], &["s0_out"]),
                RawNode::new("id2", "Identity", &["s1_in"], &["s1_out"]),
            ],
        };
        let raw = RawGraph {
            name: "bad_loop".to_string(),
            inputs: vec![
                RawInput::new("trip", &[]),
                RawInput::new("go", &[]),
                RawInput::new("a", &[2]),
                RawInput::new("b", &[2]),
            ],
            // 2 carried + 1 scan declared on the outer node
            outputs: vec!["a_final".to_string(), "b_final".to_string(), "scan".to_string()],
            constants: vec![],
            nodes: vec![RawNode::new(
                "loop_0",
                "Loop",
                &["trip", "go", "a", "b"],
                &["a_final", "b_final", "scan"],
            )
            .with_body(body)],
        };
        let err = assemble_model(&raw, base_meta()).unwrap_err();
        assert!(matches!(err, CompileError::Validation(_)));
        assert!(err.to_string().contains("misclassified"));
    }

    /// Loop body template: one carried state bumped by `operand`
    fn loop_body(level: usize, operand: &str, inner: Option<RawGraph>) -> RawGraph {
        let iter = format!("i{level}");
        let cond = format!("c{level}");
        let state = format!("s{level}");
        let cond_out = format!("c{level}_out");
        let state_out = format!("s{level}_out");
        let step = match inner {
            Some(inner_body) => RawNode::new(
                &format!("loop_{level}"),
                "Loop",
                &[iter.as_str(), cond.as_str(), state.as_str()],
                &[state_out.as_str()],
            )
            .with_body(inner_body),
            None => RawNode::new(
                &format!("bump_{level}"),
                "Add",
                &[state.as_str(), operand],
                &[state_out.as_str()],
            ),
        };
        RawGraph {
            name: format!("body_{level}"),
            inputs: vec![
                RawInput::new(iter.clone(), &[]),
                RawInput::new(cond.clone(), &[]),
                RawInput::new(state.clone(), &[2]),
            ],
            outputs: vec![cond_out.clone(), state_out],
            constants: vec![],
            nodes: vec![
                step,
                RawNode::new(
                    &format!("c{level}_id"),
                    "Identity",
                    &[cond.as_str()],
                    &[cond_out.as_str()],
                ),
            ],
        }
    }

    /// `depth` nested loops; the innermost body references the root constant
    fn nested_loop_raw(depth: usize) -> RawGraph {
        let mut body = loop_body(depth, "root_w", None);
        for level in (1..depth).rev() {
            body = loop_body(level, "root_w", Some(body));
        }
        RawGraph {
            name: "nested".to_string(),
            inputs: vec![
                RawInput::new("trip", &[]),
                RawInput::new("go", &[]),
                RawInput::new("x", &[2]),
            ],
            outputs: vec!["x_final".to_string()],
            constants: vec![("root_w".to_string(), TensorData::from_f32s(vec![1.0]))],
            nodes: vec![
                RawNode::new("loop_0", "Loop", &["trip", "go", "x"], &["x_final"])
                    .with_body(body),
            ],
        }
    }

    /// Walk the single loop chain downward, asserting boundary completeness
    /// at every level: exactly one extra edge on each enclosing operator and
    /// exactly one boundary parameter in each body
    fn assert_boundary_complete(raw: &RawGraph, depth: usize) {
        let model = assemble_model(raw, base_meta()).unwrap();
        let mut graph = &model.graph;
        let mut bodies = Vec::new();
        for _ in 0..depth {
            let loop_id = graph.nodes_of_op("Loop")[0];
            // 3 declared inputs + exactly one synthesized boundary edge
            assert_eq!(graph.in_degree(loop_id), 4);
            let body = &graph.node(loop_id).unwrap().control.as_ref().unwrap().bodies[0];
            assert_eq!(
                body.input_map.iter().filter(|b| b.outer_port == 3).count(),
                1
            );
            let boundary: Vec<_> = body
                .graph
                .nodes()
                .filter(|n| n.name.starts_with("root_w"))
                .collect();
            assert_eq!(boundary.len(), 1, "one boundary parameter per level");
            bodies.push(body);
            graph = &body.graph;
        }
        // the innermost boundary parameter feeds the consumer directly
        let innermost = bodies.last().unwrap();
        let add = innermost.graph.nodes_of_op("Add")[0];
        let param = innermost
            .graph
            .nodes()
            .find(|n| n.name == "root_w")
            .unwrap()
            .id();
        assert_eq!(innermost.graph.producer(add, 1), Some((param, 0)));
        // every intermediate level threads a transit parameter
        for body in &bodies[..bodies.len() - 1] {
            assert!(body
                .graph
                .nodes()
                .any(|n| n.name == "root_w/transit" && n.op_type == "Parameter"));
        }
    }

    #[test]
    fn test_boundary_completeness_depth_one() {
        assert_boundary_complete(&nested_loop_raw(1), 1);
    }

    #[test]
    fn test_boundary_completeness_depth_two() {
        assert_boundary_complete(&nested_loop_raw(2), 2);
    }

    #[test]
    fn test_boundary_completeness_depth_three() {
        assert_boundary_complete(&nested_loop_raw(3), 3);
    }

    #[test]
    fn test_shared_boundary_parameter_reused() {
        // two body nodes referencing the same outer tensor share a single
        // boundary parameter and a single extra edge
        let body = RawGraph {
            name: "body".to_string(),
            inputs: vec![
                RawInput::new("iter", &[]),
                RawInput::new("cond_in", &[]),
                RawInput::new("state_in", &[2, 3]),
            ],
            outputs: vec!["cond_out".to_string(), "state_out".to_string()],
            constants: vec![],
            nodes: vec![
                RawNode::new("first", "Add", &["state_in", "outer_w"], &["mid"]),
                RawNode::new("second", "Add", &["mid", "outer_w"], &["state_out"]),
                RawNode::new("cond_id", "Identity", &["cond_in"], &["cond_out"]),
            ],
        };
        let raw = RawGraph {
            name: "shared".to_string(),
            inputs: vec![
                RawInput::new("trip", &[]),
                RawInput::new("go", &[]),
                RawInput::new("x", &[2, 3]),
            ],
            outputs: vec!["x_final".to_string()],
            constants: vec![("outer_w".to_string(), TensorData::from_f32s(vec![0.5]))],
            nodes: vec![
                RawNode::new("loop_0", "Loop", &["trip", "go", "x"], &["x_final"]).with_body(body),
            ],
        };
        let model = assemble_model(&raw, base_meta()).unwrap();
        let g = &model.graph;
        let loop_id = g.nodes_of_op("Loop")[0];
        assert_eq!(g.in_degree(loop_id), 4);
        let body = &g.node(loop_id).unwrap().control.as_ref().unwrap().bodies[0];
        assert_eq!(
            body.graph
                .nodes()
                .filter(|n| n.name == "outer_w")
                .count(),
            1
        );
    }

    #[test]
    fn test_conditional_extraction() {
        let then_body = RawGraph {
            name: "then".to_string(),
            inputs: vec![],
            outputs: vec!["t_out".to_string()],
            constants: vec![],
            nodes: vec![RawNode::new("t_id", "Identity", &["x"], &["t_out"])],
        };
        let else_body = RawGraph {
            name: "else".to_string(),
            inputs: vec![],
            outputs: vec!["e_out".to_string()],
            constants: vec![],
            nodes: vec![RawNode::new("e_relu", "Relu", &["x"], &["e_out"])],
        };
        let raw = RawGraph {
            name: "branched".to_string(),
            inputs: vec![RawInput::new("flag", &[]), RawInput::new("x", &[2])],
            outputs: vec!["y".to_string()],
            constants: vec![],
            nodes: vec![RawNode::new("if_0", "If", &["flag"], &["y"])
                .with_body(then_body)
                .with_body(else_body)],
        };
        let model = assemble_model(&raw, base_meta()).unwrap();
        let g = &model.graph;
        let if_id = g.nodes_of_op("If")[0];
        // flag + one captured reference per branch
        assert_eq!(g.in_degree(if_id), 3);
        let control = g.node(if_id).unwrap().control.as_ref().unwrap();
        assert_eq!(control.kind, ControlFlowKind::Conditional);
        assert_eq!(control.bodies.len(), 2);
        for body in &control.bodies {
            assert_eq!(body.input_map.len(), 1);
            assert_eq!(body.output_map.len(), 1);
        }
    }
}
