//! Declarative pattern templates
//!
//! A [`Pattern`] is a read-only subgraph query: named node predicates plus
//! named edge constraints with optional port bindings. Patterns never mutate
//! the graph they are matched against.

use std::sync::Arc;

use crate::graph::{Node, NodeKind};

/// Custom node predicate
pub type NodePredicate = Arc<dyn Fn(&Node) -> bool + Send + Sync>;

/// One named node template
#[derive(Clone)]
pub struct NodeSpec {
    /// Name this node binds under
    pub name: String,
    /// Required node kind, if constrained
    pub kind: Option<NodeKind>,
    /// Required operator-type tag, if constrained
    pub op_type: Option<String>,
    /// Custom predicate, if any
    pub predicate: Option<NodePredicate>,
}

impl NodeSpec {
    fn unconstrained(name: &str) -> Self {
        NodeSpec {
            name: name.to_string(),
            kind: None,
            op_type: None,
            predicate: None,
        }
    }

    /// Whether a concrete node satisfies this template
    pub fn matches(&self, node: &Node) -> bool {
        if let Some(kind) = self.kind {
            if node.kind != kind {
                return false;
            }
        }
        if let Some(op) = &self.op_type {
            if node.op_type != *op {
                return false;
            }
        }
        if let Some(pred) = &self.predicate {
            if !pred(node) {
                return false;
            }
        }
        true
    }

    /// Number of declared constraints (matcher ordering heuristic)
    pub fn constraint_weight(&self) -> usize {
        usize::from(self.kind.is_some())
            + usize::from(self.op_type.is_some())
            + usize::from(self.predicate.is_some())
    }
}

impl std::fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("op_type", &self.op_type)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// One named edge constraint
#[derive(Debug, Clone)]
pub struct EdgeSpec {
    /// Pattern-node name of the source
    pub src: String,
    /// Pattern-node name of the destination
    pub dst: String,
    /// Required source output port, if constrained
    pub src_port: Option<usize>,
    /// Required destination input port, if constrained
    pub dst_port: Option<usize>,
}

/// A declarative subgraph query
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    pub(crate) nodes: Vec<NodeSpec>,
    pub(crate) edges: Vec<EdgeSpec>,
}

impl Pattern {
    /// Start an empty pattern
    pub fn new() -> Self {
        Pattern::default()
    }

    /// Declare an unconstrained node
    pub fn node(mut self, name: &str) -> Self {
        self.push_node(NodeSpec::unconstrained(name));
        self
    }

    /// Declare an operator node with the given op-type tag
    pub fn op(mut self, name: &str, op_type: &str) -> Self {
        let mut spec = NodeSpec::unconstrained(name);
        spec.kind = Some(NodeKind::Operator);
        spec.op_type = Some(op_type.to_string());
        self.push_node(spec);
        self
    }

    /// Declare a data node
    pub fn data(mut self, name: &str) -> Self {
        let mut spec = NodeSpec::unconstrained(name);
        spec.kind = Some(NodeKind::Data);
        self.push_node(spec);
        self
    }

    /// Declare a node constrained by a custom predicate
    pub fn node_where<F>(mut self, name: &str, predicate: F) -> Self
    where
        F: Fn(&Node) -> bool + Send + Sync + 'static,
    {
        let mut spec = NodeSpec::unconstrained(name);
        spec.predicate = Some(Arc::new(predicate));
        self.push_node(spec);
        self
    }

    /// Constrain `src -> dst` connectivity (any ports)
    pub fn edge(self, src: &str, dst: &str) -> Self {
        self.edge_at(src, dst, None, None)
    }

    /// Constrain `src -> dst` connectivity with optional port bindings
    ///
    /// # Panics
    /// Panics when `src` or `dst` was not declared; edge constraints may
    /// only reference declared node names.
    pub fn edge_at(
        mut self,
        src: &str,
        dst: &str,
        src_port: Option<usize>,
        dst_port: Option<usize>,
    ) -> Self {
        assert!(
            self.index_of(src).is_some(),
            "pattern edge references undeclared node '{src}'"
        );
        assert!(
            self.index_of(dst).is_some(),
            "pattern edge references undeclared node '{dst}'"
        );
        self.edges.push(EdgeSpec {
            src: src.to_string(),
            dst: dst.to_string(),
            src_port,
            dst_port,
        });
        self
    }

    /// Number of declared nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Declaration index of a named node
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Edge constraints incident to the node at `index`
    pub fn incident_edges(&self, index: usize) -> usize {
        let name = &self.nodes[index].name;
        self.edges
            .iter()
            .filter(|e| e.src == *name || e.dst == *name)
            .count()
    }

    fn push_node(&mut self, spec: NodeSpec) {
        assert!(
            self.index_of(&spec.name).is_none(),
            "pattern node '{}' declared twice",
            spec.name
        );
        self.nodes.push(spec);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, TensorData};

    #[test]
    fn test_node_spec_matching() {
        let pattern = Pattern::new().op("r", "Relu").data("w").node("any");
        let relu = Node::operator("relu_0", "Relu");
        let add = Node::operator("add_0", "Add");
        let konst = Node::data("w0", TensorData::from_i64s(vec![1]));

        assert!(pattern.nodes[0].matches(&relu));
        assert!(!pattern.nodes[0].matches(&add));
        assert!(!pattern.nodes[0].matches(&konst));
        assert!(pattern.nodes[1].matches(&konst));
        assert!(pattern.nodes[2].matches(&relu));
        assert!(pattern.nodes[2].matches(&konst));
    }

    #[test]
    fn test_predicate_spec() {
        let pattern = Pattern::new().node_where("axis1", |n| n.attr_int("axis") == Some(1));
        let with = Node::operator("c", "Concat").with_attr("axis", 1i64);
        let without = Node::operator("c", "Concat").with_attr("axis", 0i64);
        assert!(pattern.nodes[0].matches(&with));
        assert!(!pattern.nodes[0].matches(&without));
    }

    #[test]
    fn test_constraint_weight() {
        let pattern = Pattern::new().op("r", "Relu").node("any");
        assert_eq!(pattern.nodes[0].constraint_weight(), 2);
        assert_eq!(pattern.nodes[1].constraint_weight(), 0);
    }

    #[test]
    #[should_panic(expected = "undeclared node")]
    fn test_edge_requires_declared_names() {
        let _ = Pattern::new().node("a").edge("a", "missing");
    }

    #[test]
    #[should_panic(expected = "declared twice")]
    fn test_duplicate_node_name_rejected() {
        let _ = Pattern::new().node("a").node("a");
    }
}
