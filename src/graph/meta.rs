//! Graph-level metadata
//!
//! Every store carries one [`GraphMeta`]: declared input/output names, the
//! layout convention, the originating-format tag and, for nested bodies, the
//! name of the enclosing control-flow node. The per-graph tensor map is a
//! cache used during assembly and must never leak between nesting levels.

use rustc_hash::FxHashMap;

use super::node::NodeId;

/// Axis-ordering convention assumed by shape-dependent attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Channel-first (NCHW)
    #[default]
    ChannelFirst,
    /// Channel-last (NHWC)
    ChannelLast,
}

/// Per-graph settings and caches
#[derive(Debug, Clone, Default)]
pub struct GraphMeta {
    /// Declared model input names, in declaration order
    pub input_names: Vec<String>,
    /// Declared model output names, in declaration order
    pub output_names: Vec<String>,
    /// Layout convention the graph currently assumes
    pub layout: Layout,
    /// Originating-format tag provided by the loader ("onnx", "tf", ...)
    pub source_format: Option<String>,
    /// Name of the enclosing control-flow node, for nested bodies
    ///
    /// Set exactly once at extraction time and never changed afterwards.
    pub parent_node: Option<String>,
    /// Tensor name → (producer node, output port)
    ///
    /// Assembly-time cache; deliberately not inherited by nested bodies.
    pub tensor_map: FxHashMap<String, (NodeId, usize)>,
}

impl GraphMeta {
    /// Metadata for a nested body extracted under `parent_node`
    ///
    /// Deep-copies every setting except the parent back-reference and the
    /// tensor-name cache, which start fresh for each nesting level.
    pub fn child(&self, parent_node: &str) -> GraphMeta {
        GraphMeta {
            input_names: Vec::new(),
            output_names: Vec::new(),
            layout: self.layout,
            source_format: self.source_format.clone(),
            parent_node: Some(parent_node.to_string()),
            tensor_map: FxHashMap::default(),
        }
    }

    /// Whether this graph is a nested control-flow body
    pub fn is_nested(&self) -> bool {
        self.parent_node.is_some()
    }
}
