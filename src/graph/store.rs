//! Attributed graph store
//!
//! [`IrGraph`] owns nodes, edges and graph metadata; it is the substrate
//! every other component mutates. The store is a multigraph: multiple edges
//! between the same node pair are permitted and distinguished by ports.
//!
//! Determinism contract: node and edge iteration follow insertion order, and
//! `topological_order` breaks ties by insertion order, so repeated runs over
//! the same graph observe identical sequences.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::{CompileError, IrResult};

use super::meta::GraphMeta;
use super::node::{Node, NodeId, NodeKind};

/// Unique edge identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(u32);

impl EdgeId {
    /// The raw index backing this id
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Attributes carried by an edge
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeAttrs {
    /// Originating tensor name (diagnostic, preserved across rewires)
    pub tensor: Option<String>,
    /// Loop-state feedback edge, excluded from acyclicity checks
    pub back_edge: bool,
}

impl EdgeAttrs {
    /// Attributes carrying a tensor name
    pub fn named(tensor: impl Into<String>) -> Self {
        EdgeAttrs {
            tensor: Some(tensor.into()),
            back_edge: false,
        }
    }

    /// Attributes for a tagged back edge
    pub fn back(tensor: impl Into<String>) -> Self {
        EdgeAttrs {
            tensor: Some(tensor.into()),
            back_edge: true,
        }
    }
}

/// A directed edge between two ports
#[derive(Debug, Clone)]
pub struct Edge {
    /// Source node
    pub src: NodeId,
    /// Output port on the source
    pub src_port: usize,
    /// Destination node
    pub dst: NodeId,
    /// Input port on the destination
    pub dst_port: usize,
    /// Edge attributes
    pub attrs: EdgeAttrs,
}

type EdgeList = SmallVec<[EdgeId; 4]>;

/// Attributed multigraph of operator and data nodes
#[derive(Debug, Clone, Default)]
pub struct IrGraph {
    nodes: IndexMap<NodeId, Node>,
    edges: IndexMap<EdgeId, Edge>,
    in_edges: FxHashMap<NodeId, EdgeList>,
    out_edges: FxHashMap<NodeId, EdgeList>,
    next_node: u32,
    next_edge: u32,
    /// Cached topological order; cleared by every structural mutation and
    /// never recomputed behind the caller's back
    topo_cache: Option<Vec<NodeId>>,
    /// Graph-level metadata
    pub meta: GraphMeta,
}

impl IrGraph {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given metadata
    pub fn with_meta(meta: GraphMeta) -> Self {
        IrGraph {
            meta,
            ..Default::default()
        }
    }

    // ========================================================================
    // Node accessors
    // ========================================================================

    /// Get a node by id
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Get a mutable node by id
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Get a node by id, failing on unknown ids
    pub fn require(&self, id: NodeId) -> IrResult<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| CompileError::InvalidGraph(format!("unknown node {id}")))
    }

    /// Get a mutable node by id, failing on unknown ids
    pub fn require_mut(&mut self, id: NodeId) -> IrResult<&mut Node> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| CompileError::InvalidGraph(format!("unknown node {id}")))
    }

    /// Check whether a node exists
    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Iterate nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Node ids in insertion order
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    /// Ids of all nodes with the given operator-type tag, in insertion order
    pub fn nodes_of_op(&self, op_type: &str) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.op_type == op_type)
            .map(|n| n.id)
            .collect()
    }

    /// Ids of all nodes of the given kind, in insertion order
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.kind == kind)
            .map(|n| n.id)
            .collect()
    }

    /// Insertion index of a node (determinism tie-break)
    pub(crate) fn insertion_index(&self, id: NodeId) -> Option<usize> {
        self.nodes.get_index_of(&id)
    }

    // ========================================================================
    // Structural mutation
    // ========================================================================

    /// Insert a node, assigning its id
    pub fn add_node(&mut self, mut node: Node) -> NodeId {
        let id = NodeId::from_raw(self.next_node);
        self.next_node += 1;
        node.id = id;
        self.nodes.insert(id, node);
        self.topo_cache = None;
        id
    }

    /// Connect `src`'s output port to `dst`'s input port
    ///
    /// Fails when either endpoint is unknown or the destination input port is
    /// already in use; input port indices must be unique per node, while
    /// output ports may fan out to any number of consumers.
    pub fn add_edge(
        &mut self,
        src: NodeId,
        src_port: usize,
        dst: NodeId,
        dst_port: usize,
        attrs: EdgeAttrs,
    ) -> IrResult<EdgeId> {
        self.require(src)?;
        self.require(dst)?;
        if self.in_edge(dst, dst_port).is_some() {
            return Err(CompileError::InvalidGraph(format!(
                "input port {dst_port} of node {dst} is already connected"
            )));
        }

        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        self.edges.insert(
            id,
            Edge {
                src,
                src_port,
                dst,
                dst_port,
                attrs,
            },
        );
        self.out_edges.entry(src).or_default().push(id);
        self.in_edges.entry(dst).or_default().push(id);
        self.topo_cache = None;
        Ok(id)
    }

    /// Remove an edge, returning it
    pub fn remove_edge(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.edges.shift_remove(&id)?;
        if let Some(list) = self.out_edges.get_mut(&edge.src) {
            list.retain(|e| *e != id);
        }
        if let Some(list) = self.in_edges.get_mut(&edge.dst) {
            list.retain(|e| *e != id);
        }
        self.topo_cache = None;
        Some(edge)
    }

    /// Remove a node
    ///
    /// The caller must have disconnected or rerouted every incident edge
    /// first; removal with live edges is a pass defect and fails with
    /// [`CompileError::DanglingEdge`].
    pub fn remove_node(&mut self, id: NodeId) -> IrResult<Node> {
        let live = self.in_edge_ids(id).len() + self.out_edge_ids(id).len();
        if live > 0 {
            return Err(CompileError::DanglingEdge {
                node: id,
                live_edges: live,
            });
        }
        let node = self
            .nodes
            .shift_remove(&id)
            .ok_or_else(|| CompileError::InvalidGraph(format!("unknown node {id}")))?;
        self.in_edges.remove(&id);
        self.out_edges.remove(&id);
        self.topo_cache = None;
        Ok(node)
    }

    /// Disconnect every edge incident to a node, returning how many were
    /// removed
    pub fn disconnect_node(&mut self, id: NodeId) -> usize {
        let mut edge_ids = self.in_edge_ids(id);
        edge_ids.extend(self.out_edge_ids(id));
        let count = edge_ids.len();
        for eid in edge_ids {
            self.remove_edge(eid);
        }
        count
    }

    // ========================================================================
    // Edge accessors
    // ========================================================================

    /// Get an edge by id
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    /// Iterate all edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges.iter().map(|(id, e)| (*id, e))
    }

    /// Get a mutable edge by id (port/attr updates only; endpoints are
    /// rewired through [`remove_edge`]/[`add_edge`] or the port layer)
    pub(crate) fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.topo_cache = None;
        self.edges.get_mut(&id)
    }

    /// Incoming edge ids of a node, sorted by destination port
    pub fn in_edge_ids(&self, id: NodeId) -> Vec<EdgeId> {
        let mut ids: Vec<EdgeId> = self
            .in_edges
            .get(&id)
            .map(|l| l.to_vec())
            .unwrap_or_default();
        ids.sort_by_key(|e| (self.edges[e].dst_port, e.raw()));
        ids
    }

    /// Outgoing edge ids of a node, sorted by source port then insertion
    pub fn out_edge_ids(&self, id: NodeId) -> Vec<EdgeId> {
        let mut ids: Vec<EdgeId> = self
            .out_edges
            .get(&id)
            .map(|l| l.to_vec())
            .unwrap_or_default();
        ids.sort_by_key(|e| (self.edges[e].src_port, e.raw()));
        ids
    }

    /// The edge arriving at `(node, in_port)`, if connected
    pub fn in_edge(&self, node: NodeId, in_port: usize) -> Option<EdgeId> {
        self.in_edges
            .get(&node)?
            .iter()
            .find(|e| self.edges[*e].dst_port == in_port)
            .copied()
    }

    /// The producer feeding `(node, in_port)`, excluding back edges
    pub fn producer(&self, node: NodeId, in_port: usize) -> Option<(NodeId, usize)> {
        let eid = self.in_edge(node, in_port)?;
        let edge = &self.edges[&eid];
        if edge.attrs.back_edge {
            return None;
        }
        Some((edge.src, edge.src_port))
    }

    /// All consumers reading `(node, out_port)`, in deterministic order
    pub fn consumers(&self, node: NodeId, out_port: usize) -> Vec<(NodeId, usize)> {
        self.out_edge_ids(node)
            .into_iter()
            .filter_map(|eid| {
                let e = &self.edges[&eid];
                (e.src_port == out_port).then_some((e.dst, e.dst_port))
            })
            .collect()
    }

    /// Number of input ports in use on a node
    pub fn in_degree(&self, id: NodeId) -> usize {
        self.in_edges.get(&id).map(|l| l.len()).unwrap_or(0)
    }

    /// Number of outgoing edges of a node
    pub fn out_degree(&self, id: NodeId) -> usize {
        self.out_edges.get(&id).map(|l| l.len()).unwrap_or(0)
    }

    /// Smallest input port index not currently in use
    pub fn next_free_input_port(&self, id: NodeId) -> usize {
        self.in_edges
            .get(&id)
            .map(|l| {
                l.iter()
                    .map(|e| self.edges[e].dst_port + 1)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    /// Move every consumer of `(from, from_port)` onto `(to, to_port)`,
    /// preserving destinations, destination ports and edge attributes
    pub fn reroute_consumers(
        &mut self,
        from: NodeId,
        from_port: usize,
        to: NodeId,
        to_port: usize,
    ) -> IrResult<usize> {
        self.require(to)?;
        let edge_ids: Vec<EdgeId> = self
            .out_edge_ids(from)
            .into_iter()
            .filter(|eid| self.edges[eid].src_port == from_port)
            .collect();
        let count = edge_ids.len();
        for eid in edge_ids {
            let edge = self.edges.get_mut(&eid).expect("edge listed in adjacency");
            edge.src = to;
            edge.src_port = to_port;
            if let Some(list) = self.out_edges.get_mut(&from) {
                list.retain(|e| *e != eid);
            }
            self.out_edges.entry(to).or_default().push(eid);
        }
        self.topo_cache = None;
        Ok(count)
    }

    // ========================================================================
    // Topological order
    // ========================================================================

    /// Topological order over data-dependency edges
    ///
    /// Tagged back edges are excluded from the acyclicity check. The result
    /// is cached until the next structural mutation; ties are broken by node
    /// insertion order, so the sequence is stable across repeated calls.
    pub fn topological_order(&mut self) -> IrResult<Vec<NodeId>> {
        if let Some(cached) = &self.topo_cache {
            return Ok(cached.clone());
        }
        let order = self.compute_topological_order()?;
        self.topo_cache = Some(order.clone());
        Ok(order)
    }

    /// Verify the data-dependency subgraph is acyclic, without consulting or
    /// populating the order cache
    pub fn check_acyclic(&self) -> IrResult<()> {
        self.compute_topological_order().map(|_| ())
    }

    fn compute_topological_order(&self) -> IrResult<Vec<NodeId>> {
        let mut in_degree: FxHashMap<NodeId, usize> =
            self.nodes.keys().map(|id| (*id, 0)).collect();
        for edge in self.edges.values() {
            if edge.attrs.back_edge {
                continue;
            }
            *in_degree.get_mut(&edge.dst).expect("edge endpoint exists") += 1;
        }

        // min-heap over insertion indices keeps the order deterministic
        let mut ready: BinaryHeap<Reverse<usize>> = BinaryHeap::new();
        for (idx, (id, _)) in self.nodes.iter().enumerate() {
            if in_degree[id] == 0 {
                ready.push(Reverse(idx));
            }
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(idx)) = ready.pop() {
            let (id, _) = self.nodes.get_index(idx).expect("index in range");
            let id = *id;
            order.push(id);
            for eid in self.out_edge_ids(id) {
                let edge = &self.edges[&eid];
                if edge.attrs.back_edge {
                    continue;
                }
                let deg = in_degree.get_mut(&edge.dst).expect("edge endpoint exists");
                *deg -= 1;
                if *deg == 0 {
                    ready.push(Reverse(
                        self.insertion_index(edge.dst).expect("node exists"),
                    ));
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(CompileError::GraphCycle);
        }
        Ok(order)
    }

    /// Fix adjacency lists after an in-place edge source update
    pub(crate) fn relink_source(&mut self, eid: EdgeId, old_src: NodeId, new_src: NodeId) {
        if old_src == new_src {
            return;
        }
        if let Some(list) = self.out_edges.get_mut(&old_src) {
            list.retain(|e| *e != eid);
        }
        self.out_edges.entry(new_src).or_default().push(eid);
        self.topo_cache = None;
    }

    /// One-line structural summary for logs
    pub fn summary(&self) -> String {
        format!(
            "{} node(s), {} edge(s)",
            self.nodes.len(),
            self.edges.len()
        )
    }
}
