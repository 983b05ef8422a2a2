//! Emission: canonical graph → artifact
//!
//! The emission collaborator consumes the final canonical store. The core
//! guarantees every graph handed to an [`Emitter`] is acyclic on data edges,
//! fully shape-inferred, and free of nodes lacking a canonical operator-type
//! tag; [`validate_canonical`] enforces exactly that contract.

use crate::error::{CompileError, IrResult};
use crate::graph::IrGraph;

/// Emission collaborator contract
pub trait Emitter {
    /// Serialized artifact type
    type Artifact;

    /// Consume a canonical attributed graph
    fn emit(&self, graph: &IrGraph) -> IrResult<Self::Artifact>;
}

/// Verify the canonical-form guarantees the core makes to emitters
pub fn validate_canonical(graph: &IrGraph) -> IrResult<()> {
    graph.check_acyclic()?;

    for node in graph.nodes() {
        if node.op_type.is_empty() {
            return Err(CompileError::Validation(format!(
                "node {} ('{}') lacks a canonical operator-type tag",
                node.id(),
                node.name
            )));
        }
        if let Some(control) = &node.control {
            control.validate()?;
            for body in &control.bodies {
                validate_canonical(&body.graph)?;
            }
        }
    }

    for (_, edge) in graph.edges() {
        if edge.attrs.back_edge {
            continue;
        }
        let src = graph.require(edge.src)?;
        if src.out_shape(edge.src_port).is_none() {
            return Err(CompileError::Validation(format!(
                "node {} ('{}') output port {} feeds an edge without an inferred shape",
                edge.src, src.name, edge.src_port
            )));
        }
    }
    Ok(())
}

/// Debug emitter producing a deterministic text listing of the graph
///
/// One line per node in insertion order: name, op tag and inferred output
/// shapes. Useful for tests and golden comparisons; real backends provide
/// their own [`Emitter`].
#[derive(Debug, Default)]
pub struct TextEmitter;

impl TextEmitter {
    /// Create a text emitter
    pub fn new() -> Self {
        Self
    }
}

impl Emitter for TextEmitter {
    type Artifact = String;

    fn emit(&self, graph: &IrGraph) -> IrResult<String> {
        let mut out = String::new();
        for node in graph.nodes() {
            let shapes: Vec<String> = node
                .out_shapes
                .iter()
                .map(|s| match s {
                    Some(shape) => shape.to_string(),
                    None => "<none>".to_string(),
                })
                .collect();
            out.push_str(&format!(
                "{} {} {}\n",
                node.op_type,
                node.name,
                shapes.join(" ")
            ));
        }
        Ok(out)
    }
}
