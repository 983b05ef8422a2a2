//! Rewrite passes and the pass scheduler
//!
//! A [`Pass`] is one unit of transformation: either pattern-driven (match +
//! replace, re-run to a fixed point) or whole-graph (a single visit). Each
//! pass declares ordering constraints relative to other passes by name; the
//! [`Scheduler`] topologically orders the registry and executes it, with
//! shape inference re-run after every pass that changed the graph.

pub mod scheduler;

pub use scheduler::{PassReport, Scheduler, SchedulerReport};

use crate::error::IrResult;
use crate::graph::{GraphMeta, IrGraph};
use crate::pattern::{Binding, Pattern};

/// How a pass drives the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Repeatedly find and replace pattern matches until none remain,
    /// bounded by the scheduler's iteration cap
    PatternRewrite,
    /// Visit the whole graph once, no re-matching
    WholeGraph,
}

/// One unit of graph rewriting or analysis
///
/// Passes are stateless between invocations except for data they store as
/// attributes on the graph itself; the scheduler gives each pass exclusive
/// mutation access for its entire execution.
pub trait Pass {
    /// Unique pass name, referenced by ordering constraints
    fn name(&self) -> &'static str;

    /// Pattern-rewrite vs whole-graph
    fn kind(&self) -> PassKind;

    /// Disabled passes are skipped entirely
    fn enabled(&self) -> bool {
        true
    }

    /// Names of passes that must run before this one
    fn runs_after(&self) -> &'static [&'static str] {
        &[]
    }

    /// Names of passes that must run after this one
    fn runs_before(&self) -> &'static [&'static str] {
        &[]
    }

    /// Applicability guard over graph metadata; a false guard skips the pass
    /// (later passes still see it as "already run")
    fn applicable(&self, _meta: &GraphMeta) -> bool {
        true
    }

    /// The pattern to match (pattern-rewrite passes)
    fn pattern(&self) -> Pattern {
        Pattern::new()
    }

    /// Replace one match (pattern-rewrite passes)
    ///
    /// Returns `Ok(true)` when the graph was changed; `Ok(false)` declines
    /// the binding, and the scheduler offers the next one.
    fn rewrite(&self, _graph: &mut IrGraph, _binding: &Binding) -> IrResult<bool> {
        Ok(false)
    }

    /// Visit the whole graph (whole-graph passes)
    ///
    /// Returns `Ok(true)` when the graph was changed.
    fn run(&self, _graph: &mut IrGraph) -> IrResult<bool> {
        Ok(false)
    }
}
