//! Layout conversion
//!
//! Converts a channel-last graph to the channel-first convention the backend
//! expects. Shape-like attributes are permuted by the forward permutation,
//! dimension-index attributes are remapped through its inverse, and 4-D
//! constant payloads are transposed in place. The graph is assumed to be in
//! channel-last layout when the guard admits it; per-node opt-outs use the
//! `channel_first` attribute.

#![allow(missing_docs)]

use tracing::{debug, trace};

use crate::error::IrResult;
use crate::graph::{GraphMeta, IrGraph, Layout};
use crate::infer::Perm;
use crate::pass::{Pass, PassKind};

const CONVERTED_RANK: usize = 4;

/// Whole-graph channel-last → channel-first conversion
#[derive(Debug, Default)]
pub struct ConvertLayout;

impl ConvertLayout {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for ConvertLayout {
    fn name(&self) -> &'static str {
        "convert_layout"
    }

    fn kind(&self) -> PassKind {
        PassKind::WholeGraph
    }

    fn runs_after(&self) -> &'static [&'static str] {
        &["cancel_inverse_transpose", "merge_transpose"]
    }

    fn runs_before(&self) -> &'static [&'static str] {
        &["remove_dead_nodes"]
    }

    fn applicable(&self, meta: &GraphMeta) -> bool {
        meta.layout == Layout::ChannelLast
    }

    fn run(&self, graph: &mut IrGraph) -> IrResult<bool> {
        let perm = Perm::channel_last_to_first(CONVERTED_RANK);
        let inverse = perm.inverse();

        for id in graph.topological_order()? {
            let node = graph.require_mut(id)?;
            if node.attr("channel_first").and_then(|a| a.as_bool()) == Some(true) {
                // this node already produces channel-first output
                continue;
            }

            let (shape_attrs, dim_attrs) = match node.schema {
                Some(schema) => (schema.shape_attrs, schema.dim_attrs),
                None => (&[][..], &[][..]),
            };

            for attr in shape_attrs {
                let Some(values) = node.attr_ints(attr).map(|v| v.to_vec()) else {
                    continue;
                };
                if values.len() != CONVERTED_RANK {
                    continue;
                }
                let permuted = perm.apply(&values).expect("rank checked");
                trace!(node = %node.name, attr, ?values, ?permuted, "shape attr permuted");
                node.set_attr(*attr, permuted);
            }

            for attr in dim_attrs {
                let Some(axis) = node.attr_int(attr) else {
                    continue;
                };
                if !(0..CONVERTED_RANK as i64).contains(&axis) {
                    continue;
                }
                let remapped = inverse
                    .remap_axis(axis as usize)
                    .expect("axis in range") as i64;
                trace!(node = %node.name, attr, axis, remapped, "dim attr remapped");
                node.set_attr(*attr, remapped);
            }

            if let Some(value) = &mut node.value {
                if value.rank() == CONVERTED_RANK {
                    value.permute_axes(perm.order());
                    if let Some(shape) = node.out_shapes.get_mut(0).and_then(Option::as_mut) {
                        if let Some(permuted) = perm.apply_shape(shape) {
                            *shape = permuted;
                        }
                    }
                }
            }
        }

        graph.meta.layout = Layout::ChannelFirst;
        debug!("graph converted to channel-first layout");
        Ok(true)
    }
}
