//! Port & connection layer
//!
//! Typed views over the store that give each node named/numbered input and
//! output ports, hiding raw edge bookkeeping. A [`Connection`] is a plain
//! `(node, port, direction)` value resolved against a borrowed graph at call
//! time; it is a view owned transiently by callers, never by the graph.

use crate::error::{CompileError, IrResult};

use super::node::NodeId;
use super::store::{EdgeId, IrGraph};

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Input side of a node
    In,
    /// Output side of a node
    Out,
}

/// Lightweight accessor bound to one port of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    /// The node this view is bound to
    pub node: NodeId,
    /// Port index on that node
    pub port: usize,
    /// Input or output side
    pub direction: Direction,
}

impl IrGraph {
    /// View of a node's input port
    pub fn in_port(&self, node: NodeId, port: usize) -> Connection {
        Connection {
            node,
            port,
            direction: Direction::In,
        }
    }

    /// View of a node's output port
    pub fn out_port(&self, node: NodeId, port: usize) -> Connection {
        Connection {
            node,
            port,
            direction: Direction::Out,
        }
    }
}

impl Connection {
    /// Whether a backing edge exists
    pub fn connected(&self, graph: &IrGraph) -> bool {
        match self.direction {
            Direction::In => graph.in_edge(self.node, self.port).is_some(),
            Direction::Out => !graph.consumers(self.node, self.port).is_empty(),
        }
    }

    /// Resolve the producing endpoint
    ///
    /// For an input port this is the connected source `(node, out_port)`;
    /// for an output port it is the port itself.
    pub fn source(&self, graph: &IrGraph) -> Option<(NodeId, usize)> {
        match self.direction {
            Direction::In => {
                let eid = graph.in_edge(self.node, self.port)?;
                let edge = graph.edge(eid)?;
                Some((edge.src, edge.src_port))
            }
            Direction::Out => Some((self.node, self.port)),
        }
    }

    /// Resolve the consuming endpoints
    ///
    /// For an output port these are all connected `(node, in_port)` readers;
    /// for an input port it is the port itself.
    pub fn destinations(&self, graph: &IrGraph) -> Vec<(NodeId, usize)> {
        match self.direction {
            Direction::In => vec![(self.node, self.port)],
            Direction::Out => graph.consumers(self.node, self.port),
        }
    }

    /// The backing edge of an input port, if any
    pub fn edge(&self, graph: &IrGraph) -> Option<EdgeId> {
        match self.direction {
            Direction::In => graph.in_edge(self.node, self.port),
            Direction::Out => None,
        }
    }

    /// Remove the backing edge(s), returning how many were removed
    ///
    /// An input port has at most one backing edge; an output port drops every
    /// consumer edge.
    pub fn disconnect(&self, graph: &mut IrGraph) -> usize {
        match self.direction {
            Direction::In => match graph.in_edge(self.node, self.port) {
                Some(eid) => {
                    graph.remove_edge(eid);
                    1
                }
                None => 0,
            },
            Direction::Out => {
                let edge_ids: Vec<EdgeId> = graph
                    .out_edge_ids(self.node)
                    .into_iter()
                    .filter(|eid| graph.edge(*eid).map(|e| e.src_port) == Some(self.port))
                    .collect();
                let count = edge_ids.len();
                for eid in edge_ids {
                    graph.remove_edge(eid);
                }
                count
            }
        }
    }

    /// Rewire this input port's edge to a new source port, preserving the
    /// destination, destination port index and edge attributes
    ///
    /// If no backing edge exists yet, a fresh edge is created. The rewire is
    /// atomic over the single edge it touches: there is no intermediate state
    /// where the edge has a source but no destination.
    pub fn set_source(&self, graph: &mut IrGraph, src: NodeId, src_port: usize) -> IrResult<()> {
        if self.direction != Direction::In {
            return Err(CompileError::InvalidGraph(
                "set_source applies to input ports only".to_string(),
            ));
        }
        graph.require(src)?;
        match graph.in_edge(self.node, self.port) {
            Some(eid) => {
                let old_src = graph.edge(eid).expect("edge exists").src;
                let edge = graph.edge_mut(eid).expect("edge exists");
                edge.src = src;
                edge.src_port = src_port;
                graph.relink_source(eid, old_src, src);
                Ok(())
            }
            None => {
                graph.add_edge(src, src_port, self.node, self.port, Default::default())?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::Node;
    use crate::graph::store::EdgeAttrs;

    fn two_node_graph() -> (IrGraph, NodeId, NodeId) {
        let mut g = IrGraph::new();
        let a = g.add_node(Node::operator("a", "Parameter"));
        let b = g.add_node(Node::operator("b", "Relu"));
        g.add_edge(a, 0, b, 0, EdgeAttrs::named("t")).unwrap();
        (g, a, b)
    }

    #[test]
    fn test_connected_and_source() {
        let (g, a, b) = two_node_graph();
        let in0 = g.in_port(b, 0);
        assert!(in0.connected(&g));
        assert_eq!(in0.source(&g), Some((a, 0)));

        let out0 = g.out_port(a, 0);
        assert!(out0.connected(&g));
        assert_eq!(out0.destinations(&g), vec![(b, 0)]);

        let in1 = g.in_port(b, 1);
        assert!(!in1.connected(&g));
        assert_eq!(in1.source(&g), None);
    }

    #[test]
    fn test_disconnect_input() {
        let (mut g, _a, b) = two_node_graph();
        let in0 = g.in_port(b, 0);
        assert_eq!(in0.disconnect(&mut g), 1);
        assert!(!in0.connected(&g));
        assert_eq!(g.edge_count(), 0);
        // idempotent
        assert_eq!(in0.disconnect(&mut g), 0);
    }

    #[test]
    fn test_disconnect_output_drops_all_consumers() {
        let (mut g, a, _b) = two_node_graph();
        let c = g.add_node(Node::operator("c", "Relu"));
        g.add_edge(a, 0, c, 0, EdgeAttrs::default()).unwrap();
        let out0 = g.out_port(a, 0);
        assert_eq!(out0.disconnect(&mut g), 2);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_set_source_preserves_destination_and_attrs() {
        let (mut g, a, b) = two_node_graph();
        let c = g.add_node(Node::operator("c", "Relu"));
        g.add_edge(a, 0, c, 0, EdgeAttrs::default()).unwrap();

        // rewire b's input from a to c's output
        g.in_port(b, 0).set_source(&mut g, c, 0).unwrap();
        assert_eq!(g.producer(b, 0), Some((c, 0)));
        let eid = g.in_edge(b, 0).unwrap();
        let edge = g.edge(eid).unwrap();
        assert_eq!(edge.dst, b);
        assert_eq!(edge.dst_port, 0);
        assert_eq!(edge.attrs.tensor.as_deref(), Some("t"));
        // a no longer lists the moved edge
        assert_eq!(g.consumers(a, 0).len(), 1);
    }

    #[test]
    fn test_set_source_creates_missing_edge() {
        let (mut g, a, b) = two_node_graph();
        g.in_port(b, 1).set_source(&mut g, a, 0).unwrap();
        assert_eq!(g.producer(b, 1), Some((a, 0)));
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn test_set_source_rejects_output_direction() {
        let (mut g, a, b) = two_node_graph();
        let err = g.out_port(a, 0).set_source(&mut g, b, 0).unwrap_err();
        assert!(matches!(err, CompileError::InvalidGraph(_)));
    }
}
