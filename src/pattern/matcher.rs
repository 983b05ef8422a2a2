//! Subgraph isomorphism search
//!
//! Constraint-propagation matching: pattern nodes are ordered by descending
//! constraint degree, partial bindings are extended only by candidates that
//! satisfy every edge constraint against already-bound nodes, and predicate
//! mismatches prune before any structural check. Candidates enumerate in node
//! insertion order, so the binding sequence is stable across runs; passes
//! may rely on "first match wins".
//!
//! The returned iterator is lazy and restartable: each `find_matches` call
//! recomputes from the current graph state and never mutates it.

use indexmap::IndexMap;

use crate::graph::{IrGraph, NodeId};

use super::spec::Pattern;

/// A successful match: pattern node name → concrete node id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binding {
    map: IndexMap<String, NodeId>,
}

impl Binding {
    /// Resolve a pattern name
    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.map.get(name).copied()
    }

    /// Resolve a pattern name, panicking on unknown names
    ///
    /// Rewrite functions receive bindings produced from their own pattern,
    /// so a miss here is a defect in the pass itself.
    pub fn node(&self, name: &str) -> NodeId {
        self.map[name]
    }

    /// Number of bound nodes
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the binding is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate `(name, node)` pairs in pattern declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.map.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Find all matches of `pattern` in `graph`
///
/// Zero matches is ordinary control flow: the iterator is simply empty.
pub fn find_matches<'g, 'p>(graph: &'g IrGraph, pattern: &'p Pattern) -> MatchIter<'g, 'p> {
    MatchIter::new(graph, pattern)
}

/// First match of `pattern` in `graph`, if any
pub fn first_match(graph: &IrGraph, pattern: &Pattern) -> Option<Binding> {
    find_matches(graph, pattern).next()
}

struct Frame {
    candidates: Vec<NodeId>,
    next: usize,
}

/// Lazy iterator over pattern matches
pub struct MatchIter<'g, 'p> {
    graph: &'g IrGraph,
    pattern: &'p Pattern,
    /// Pattern node indices in matching order (most constrained first)
    order: Vec<usize>,
    /// Current assignment per pattern node index
    assignment: Vec<Option<NodeId>>,
    stack: Vec<Frame>,
    started: bool,
}

impl<'g, 'p> MatchIter<'g, 'p> {
    fn new(graph: &'g IrGraph, pattern: &'p Pattern) -> Self {
        let mut order: Vec<usize> = (0..pattern.node_count()).collect();
        // descending constraint degree; declaration order breaks ties
        order.sort_by_key(|&i| {
            std::cmp::Reverse(pattern.nodes[i].constraint_weight() + pattern.incident_edges(i))
        });
        MatchIter {
            graph,
            pattern,
            order,
            assignment: vec![None; pattern.node_count()],
            stack: Vec::new(),
            started: false,
        }
    }

    /// Candidates for the pattern node at matching depth `depth`, given the
    /// current partial assignment
    fn candidates_at(&self, depth: usize) -> Vec<NodeId> {
        let pattern_idx = self.order[depth];
        let spec = &self.pattern.nodes[pattern_idx];
        self.graph
            .nodes()
            .filter(|node| spec.matches(node))
            .map(|node| node.id())
            .filter(|id| !self.assignment.contains(&Some(*id)))
            .filter(|id| self.edges_consistent(pattern_idx, *id))
            .collect()
    }

    /// Check every pattern edge between `pattern_idx` and an already-bound
    /// pattern node against the graph
    fn edges_consistent(&self, pattern_idx: usize, candidate: NodeId) -> bool {
        let name = &self.pattern.nodes[pattern_idx].name;
        for edge in &self.pattern.edges {
            let (src_id, dst_id) = if edge.src == *name {
                let Some(dst_idx) = self.pattern.index_of(&edge.dst) else {
                    return false;
                };
                match self.assignment[dst_idx] {
                    Some(bound) => (candidate, bound),
                    None => continue, // other endpoint not bound yet
                }
            } else if edge.dst == *name {
                let Some(src_idx) = self.pattern.index_of(&edge.src) else {
                    return false;
                };
                match self.assignment[src_idx] {
                    Some(bound) => (bound, candidate),
                    None => continue,
                }
            } else {
                continue;
            };

            let connected = self.graph.out_edge_ids(src_id).into_iter().any(|eid| {
                let e = self.graph.edge(eid).expect("edge listed in adjacency");
                e.dst == dst_id
                    && edge.src_port.map_or(true, |p| e.src_port == p)
                    && edge.dst_port.map_or(true, |p| e.dst_port == p)
            });
            if !connected {
                return false;
            }
        }
        true
    }

    fn produce_binding(&self) -> Binding {
        let mut map = IndexMap::with_capacity(self.pattern.node_count());
        for (idx, spec) in self.pattern.nodes.iter().enumerate() {
            map.insert(
                spec.name.clone(),
                self.assignment[idx].expect("complete assignment"),
            );
        }
        Binding { map }
    }
}

impl Iterator for MatchIter<'_, '_> {
    type Item = Binding;

    fn next(&mut self) -> Option<Binding> {
        if self.pattern.node_count() == 0 {
            return None;
        }
        if !self.started {
            self.started = true;
            let candidates = self.candidates_at(0);
            self.stack.push(Frame {
                candidates,
                next: 0,
            });
        }

        while let Some(depth) = self.stack.len().checked_sub(1) {
            let frame = self.stack.last_mut().expect("non-empty stack");
            if frame.next >= frame.candidates.len() {
                self.stack.pop();
                self.assignment[self.order[depth]] = None;
                if self.stack.is_empty() {
                    return None;
                }
                continue;
            }

            let candidate = frame.candidates[frame.next];
            frame.next += 1;
            self.assignment[self.order[depth]] = Some(candidate);

            if depth + 1 == self.pattern.node_count() {
                let binding = self.produce_binding();
                self.assignment[self.order[depth]] = None;
                return Some(binding);
            }

            let candidates = self.candidates_at(depth + 1);
            self.stack.push(Frame {
                candidates,
                next: 0,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeAttrs, IrGraph, Node, TensorData};
    use crate::pattern::Pattern;

    /// x -> relu -> add ; w -> add ; add -> out
    fn sample_graph() -> (IrGraph, Vec<NodeId>) {
        let mut g = IrGraph::new();
        let x = g.add_node(Node::operator("x", "Parameter"));
        let relu = g.add_node(Node::operator("relu_0", "Relu"));
        let w = g.add_node(Node::data("w", TensorData::from_i64s(vec![1])));
        let add = g.add_node(Node::operator("add_0", "Add"));
        let out = g.add_node(Node::operator("out", "Result"));
        g.add_edge(x, 0, relu, 0, EdgeAttrs::default()).unwrap();
        g.add_edge(relu, 0, add, 0, EdgeAttrs::default()).unwrap();
        g.add_edge(w, 0, add, 1, EdgeAttrs::default()).unwrap();
        g.add_edge(add, 0, out, 0, EdgeAttrs::default()).unwrap();
        (g, vec![x, relu, w, add, out])
    }

    #[test]
    fn test_single_node_pattern() {
        let (g, ids) = sample_graph();
        let pattern = Pattern::new().op("r", "Relu");
        let matches: Vec<Binding> = find_matches(&g, &pattern).collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].get("r"), Some(ids[1]));
    }

    #[test]
    fn test_chain_pattern() {
        let (g, ids) = sample_graph();
        let pattern = Pattern::new()
            .op("r", "Relu")
            .op("a", "Add")
            .edge("r", "a");
        let matches: Vec<Binding> = find_matches(&g, &pattern).collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].node("r"), ids[1]);
        assert_eq!(matches[0].node("a"), ids[3]);
    }

    #[test]
    fn test_port_constrained_edge() {
        let (g, ids) = sample_graph();
        // w feeds add on input port 1, not port 0
        let on_port1 = Pattern::new()
            .data("w")
            .op("a", "Add")
            .edge_at("w", "a", None, Some(1));
        let matches: Vec<Binding> = find_matches(&g, &on_port1).collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].node("w"), ids[2]);

        let on_port0 = Pattern::new()
            .data("w")
            .op("a", "Add")
            .edge_at("w", "a", None, Some(0));
        assert_eq!(find_matches(&g, &on_port0).count(), 0);
    }

    #[test]
    fn test_no_match_is_empty_iterator() {
        let (g, _) = sample_graph();
        let pattern = Pattern::new().op("m", "MatMul");
        assert_eq!(find_matches(&g, &pattern).count(), 0);
        assert!(first_match(&g, &pattern).is_none());
    }

    #[test]
    fn test_deterministic_sequence() {
        let mut g = IrGraph::new();
        let mut relus = Vec::new();
        for i in 0..4 {
            relus.push(g.add_node(Node::operator(format!("relu_{i}"), "Relu")));
        }
        let pattern = Pattern::new().op("r", "Relu");
        let first: Vec<NodeId> = find_matches(&g, &pattern).map(|b| b.node("r")).collect();
        let second: Vec<NodeId> = find_matches(&g, &pattern).map(|b| b.node("r")).collect();
        assert_eq!(first, second);
        // insertion order
        assert_eq!(first, relus);
    }

    #[test]
    fn test_injective_binding() {
        // a -> b, both Relu: pattern {p -> q} must not bind p and q to the
        // same node
        let mut g = IrGraph::new();
        let a = g.add_node(Node::operator("a", "Relu"));
        let b = g.add_node(Node::operator("b", "Relu"));
        g.add_edge(a, 0, b, 0, EdgeAttrs::default()).unwrap();
        let pattern = Pattern::new()
            .op("p", "Relu")
            .op("q", "Relu")
            .edge("p", "q");
        let matches: Vec<Binding> = find_matches(&g, &pattern).collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].node("p"), a);
        assert_eq!(matches[0].node("q"), b);
    }

    #[test]
    fn test_multiple_matches_lazy() {
        let mut g = IrGraph::new();
        let p = g.add_node(Node::operator("p", "Parameter"));
        for i in 0..3 {
            let r = g.add_node(Node::operator(format!("relu_{i}"), "Relu"));
            g.add_edge(p, 0, r, 0, EdgeAttrs::default()).unwrap();
        }
        let pattern = Pattern::new()
            .op("src", "Parameter")
            .op("r", "Relu")
            .edge("src", "r");
        let mut iter = find_matches(&g, &pattern);
        // taking one match does not require enumerating the rest
        let first = iter.next().unwrap();
        assert_eq!(g.node(first.node("r")).unwrap().name, "relu_0");
        assert_eq!(iter.count(), 2);
    }

    #[test]
    fn test_diamond_pattern() {
        // x -> l, x -> r, l -> m, r -> m
        let mut g = IrGraph::new();
        let x = g.add_node(Node::operator("x", "Parameter"));
        let l = g.add_node(Node::operator("l", "Relu"));
        let r = g.add_node(Node::operator("r", "Relu"));
        let m = g.add_node(Node::operator("m", "Add"));
        g.add_edge(x, 0, l, 0, EdgeAttrs::default()).unwrap();
        g.add_edge(x, 0, r, 0, EdgeAttrs::default()).unwrap();
        g.add_edge(l, 0, m, 0, EdgeAttrs::default()).unwrap();
        g.add_edge(r, 0, m, 1, EdgeAttrs::default()).unwrap();

        let pattern = Pattern::new()
            .op("top", "Parameter")
            .op("left", "Relu")
            .op("right", "Relu")
            .op("bottom", "Add")
            .edge("top", "left")
            .edge("top", "right")
            .edge_at("left", "bottom", None, Some(0))
            .edge_at("right", "bottom", None, Some(1))
            ;
        let matches: Vec<Binding> = find_matches(&g, &pattern).collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].node("left"), l);
        assert_eq!(matches[0].node("right"), r);
    }
}
