//! Top-level compilation pipeline
//!
//! One [`Compiler`] drives one compilation: ingestion produces the root
//! store (with nested bodies already extracted), inference annotates it, the
//! scheduler runs the ordered pass registry to canonical form, and emission
//! consumes the validated result. The whole pipeline is one sequential
//! computation over one store; every error aborts the compilation for this
//! input with no partial output.

use tracing::{debug, info};

use crate::emit::{validate_canonical, Emitter};
use crate::error::IrResult;
use crate::infer::run_inference;
use crate::ingest::Loader;
use crate::pass::{Pass, Scheduler, SchedulerReport};
use crate::passes::default_passes;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Iteration cap for pattern-rewrite passes
    pub max_rewrite_iterations: usize,
    /// Whether the scheduler recurses into control-flow bodies
    pub recurse_into_bodies: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            max_rewrite_iterations: 10_000,
            recurse_into_bodies: true,
        }
    }
}

/// Compilation driver owning the pass registry
pub struct Compiler {
    scheduler: Scheduler,
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

impl Compiler {
    /// Compiler with the standard canonicalization registry
    pub fn new() -> Self {
        Compiler::with_passes(default_passes(), CompileOptions::default())
    }

    /// Compiler with a custom pass registry
    pub fn with_passes(passes: Vec<Box<dyn Pass>>, options: CompileOptions) -> Self {
        let mut scheduler = Scheduler::new()
            .with_max_rewrite_iterations(options.max_rewrite_iterations)
            .with_body_recursion(options.recurse_into_bodies);
        for pass in passes {
            scheduler.register(pass);
        }
        Compiler { scheduler }
    }

    /// Register an additional pass
    pub fn register(&mut self, pass: Box<dyn Pass>) -> &mut Self {
        self.scheduler.register(pass);
        self
    }

    /// Run one full compilation: load → infer → passes → validate → emit
    pub fn compile<L, E>(&self, loader: &L, emitter: &E) -> IrResult<E::Artifact>
    where
        L: Loader,
        E: Emitter,
    {
        let (artifact, _) = self.compile_with_report(loader, emitter)?;
        Ok(artifact)
    }

    /// As [`compile`](Compiler::compile), also returning the scheduler report
    pub fn compile_with_report<L, E>(
        &self,
        loader: &L,
        emitter: &E,
    ) -> IrResult<(E::Artifact, SchedulerReport)>
    where
        L: Loader,
        E: Emitter,
    {
        let loaded = loader.load()?;
        let mut graph = loaded.graph;
        debug!(graph = %graph.summary(), inputs = loaded.input_shapes.len(), "loaded");

        run_inference(&mut graph)?;
        let report = self.scheduler.execute(&mut graph)?;
        info!(
            applied = report.total_applied(),
            graph = %graph.summary(),
            "canonical form reached"
        );

        validate_canonical(&graph)?;
        let artifact = emitter.emit(&graph)?;
        Ok((artifact, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::TextEmitter;
    use crate::graph::{GraphMeta, Layout, TensorData};
    use crate::ingest::{InMemoryLoader, RawGraph, RawInput, RawNode};

    fn meta(layout: Layout) -> GraphMeta {
        GraphMeta {
            layout,
            source_format: Some("test".to_string()),
            ..Default::default()
        }
    }

    /// Identity chain plus an inverse transpose pair plus an unused constant
    fn messy_raw() -> RawGraph {
        RawGraph {
            name: "messy".to_string(),
            inputs: vec![RawInput::new("x", &[1, 2, 3, 4])],
            outputs: vec!["y".to_string()],
            constants: vec![("unused".to_string(), TensorData::from_i64s(vec![7]))],
            nodes: vec![
                RawNode::new("pre", "Identity", &["x"], &["x_id"]),
                RawNode::new("to_last", "Transpose", &["x_id"], &["t1"])
                    .with_attr("order", vec![0i64, 2, 3, 1]),
                RawNode::new("to_first", "Transpose", &["t1"], &["t2"])
                    .with_attr("order", vec![0i64, 3, 1, 2]),
                RawNode::new("act", "Relu", &["t2"], &["y"]),
            ],
        }
    }

    #[test]
    fn test_end_to_end_canonicalization() {
        let loader = InMemoryLoader::new(messy_raw(), meta(Layout::ChannelFirst));
        let compiler = Compiler::new();
        let (artifact, report) = compiler
            .compile_with_report(&loader, &TextEmitter::new())
            .unwrap();

        // identity elided, transpose pair cancelled, dead constant removed
        assert!(report.total_applied() >= 3);
        assert!(!artifact.contains("Identity"));
        assert!(!artifact.contains("Transpose"));
        assert!(!artifact.contains("unused"));
        assert!(artifact.contains("Relu act [1,2,3,4]"));
    }

    #[test]
    fn test_pipeline_aborts_on_shape_error() {
        let raw = RawGraph {
            name: "broken".to_string(),
            inputs: vec![RawInput::new("x", &[2, 3, 4])],
            outputs: vec!["y".to_string()],
            constants: vec![(
                "target".to_string(),
                TensorData::from_i64s(vec![-1, 5]),
            )],
            nodes: vec![RawNode::new(
                "reshape_0",
                "Reshape",
                &["x", "target"],
                &["y"],
            )],
        };
        let loader = InMemoryLoader::new(raw, meta(Layout::ChannelFirst));
        let err = Compiler::new()
            .compile(&loader, &TextEmitter::new())
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::CompileError::ShapeInference { .. }
        ));
    }

    #[test]
    fn test_loop_model_compiles_end_to_end() {
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
                "scan_out".to_string(),
            ],
            constants: vec![],
            nodes: vec![
                RawNode::new("bump", "Add", &["state_in", "outer_w"], &["state_out"]),
                RawNode::new("cond_id", "Identity", &["cond_in"], &["cond_out"]),
                RawNode::new("scan_id", "Identity", &["state_out"], &["scan_out"]),
            ],
        };
        let raw = RawGraph {
            name: "looped".to_string(),
            inputs: vec![
                RawInput::new("trip", &[]),
                RawInput::new("go", &[]),
                RawInput::new("x", &[2, 3]),
            ],
            outputs: vec!["x_final".to_string(), "history".to_string()],
            constants: vec![("outer_w".to_string(), TensorData::from_f32s(vec![0.5]))],
            nodes: vec![RawNode::new(
                "loop_0",
                "Loop",
                &["trip", "go", "x"],
                &["x_final", "history"],
            )
            .with_body(body)],
        };
        let loader = InMemoryLoader::new(raw, meta(Layout::ChannelFirst));
        let (artifact, _) = Compiler::new()
            .compile_with_report(&loader, &TextEmitter::new())
            .unwrap();

        // carried output keeps the body shape; scan output gains a dynamic
        // leading iteration axis
        assert!(artifact.contains("Result x_final/result [2,3]"));
        assert!(artifact.contains("Result history/result [?,2,3]"));
    }
}
