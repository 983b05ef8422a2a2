//! Dependency-ordered pass execution
//!
//! Passes are registered explicitly, in declaration order; discovery by
//! import side effects is deliberately not a thing here. The scheduler
//! topologically sorts the registry over the declared `runs_after`/
//! `runs_before` constraints (declaration order breaks ties), failing before
//! any pass executes when the constraints contradict each other.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::{debug, trace};

use crate::error::{CompileError, IrResult};
use crate::graph::IrGraph;
use crate::infer::run_inference;
use crate::pattern::find_matches;

use super::{Pass, PassKind};

/// Execution record for one pass
#[derive(Debug, Clone)]
pub struct PassReport {
    /// Pass name
    pub name: &'static str,
    /// False when the pass was disabled or its guard rejected the graph
    pub executed: bool,
    /// Whether the pass changed the graph
    pub changed: bool,
    /// Number of rewrites applied (pattern passes) or 1/0 (whole-graph)
    pub applied: usize,
}

/// Execution record for one scheduler run
#[derive(Debug, Clone, Default)]
pub struct SchedulerReport {
    /// Per-pass records in execution order
    pub passes: Vec<PassReport>,
}

impl SchedulerReport {
    /// Total rewrites applied across all passes
    pub fn total_applied(&self) -> usize {
        self.passes.iter().map(|p| p.applied).sum()
    }

    /// Whether any pass changed the graph
    pub fn changed(&self) -> bool {
        self.passes.iter().any(|p| p.changed)
    }

    fn merge(&mut self, other: SchedulerReport) {
        self.passes.extend(other.passes);
    }
}

/// Dependency-ordered pass scheduler
pub struct Scheduler {
    passes: Vec<Box<dyn Pass>>,
    max_rewrite_iterations: usize,
    recurse_into_bodies: bool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

impl Scheduler {
    /// Empty scheduler with default limits
    pub fn new() -> Self {
        Scheduler {
            passes: Vec::new(),
            max_rewrite_iterations: 10_000,
            recurse_into_bodies: true,
        }
    }

    /// Register a pass; registration order is the ordering tie-break, never
    /// a correctness dependency
    pub fn register(&mut self, pass: Box<dyn Pass>) -> &mut Self {
        self.passes.push(pass);
        self
    }

    /// Override the pattern-rewrite iteration cap
    pub fn with_max_rewrite_iterations(mut self, cap: usize) -> Self {
        self.max_rewrite_iterations = cap;
        self
    }

    /// Disable recursion into control-flow bodies
    pub fn with_body_recursion(mut self, recurse: bool) -> Self {
        self.recurse_into_bodies = recurse;
        self
    }

    /// Registered pass names in declaration order
    pub fn registered(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Execute all registered passes over `graph` (and, recursively, over
    /// every nested control-flow body)
    ///
    /// The pass order is computed once, before anything runs; contradictory
    /// constraints abort with [`CompileError::PassOrderingCycle`].
    pub fn execute(&self, graph: &mut IrGraph) -> IrResult<SchedulerReport> {
        let order = self.ordered_indices()?;
        self.execute_ordered(graph, &order)
    }

    /// Topological order of registered pass indices
    ///
    /// Constraints naming unregistered passes are vacuous. Declaration order
    /// breaks ties, so adding an unrelated pass never perturbs existing
    /// orderings.
    pub fn ordered_indices(&self) -> IrResult<Vec<usize>> {
        let index_of = |name: &str| self.passes.iter().position(|p| p.name() == name);

        let n = self.passes.len();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];
        let mut add_constraint = |before: usize, after: usize| {
            successors[before].push(after);
            in_degree[after] += 1;
        };
        for (i, pass) in self.passes.iter().enumerate() {
            for name in pass.runs_after() {
                if let Some(j) = index_of(name) {
                    add_constraint(j, i);
                }
            }
            for name in pass.runs_before() {
                if let Some(j) = index_of(name) {
                    add_constraint(i, j);
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|i| in_degree[*i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &next in &successors[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() != n {
            let stuck: Vec<&str> = (0..n)
                .filter(|i| in_degree[*i] > 0)
                .map(|i| self.passes[i].name())
                .collect();
            return Err(CompileError::PassOrderingCycle {
                detail: stuck.join(", "),
            });
        }
        Ok(order)
    }

    fn execute_ordered(&self, graph: &mut IrGraph, order: &[usize]) -> IrResult<SchedulerReport> {
        let mut report = SchedulerReport::default();

        if self.recurse_into_bodies {
            report.merge(self.execute_on_bodies(graph, order)?);
        }

        for &idx in order {
            let pass = &self.passes[idx];
            if !pass.enabled() || !pass.applicable(&graph.meta) {
                debug!(pass = pass.name(), "skipped");
                report.passes.push(PassReport {
                    name: pass.name(),
                    executed: false,
                    changed: false,
                    applied: 0,
                });
                continue;
            }

            let applied = match pass.kind() {
                PassKind::WholeGraph => usize::from(pass.run(graph)?),
                PassKind::PatternRewrite => self.run_pattern_pass(graph, pass.as_ref())?,
            };
            let changed = applied > 0;
            debug!(pass = pass.name(), applied, "executed");
            report.passes.push(PassReport {
                name: pass.name(),
                executed: true,
                changed,
                applied,
            });

            // keep the graph annotated: inference re-runs after every
            // structural change a pass makes
            if changed {
                run_inference(graph)?;
            }
        }
        Ok(report)
    }

    /// Depth-first recursion: bodies reach canonical form before any
    /// enclosing pass inspects them
    fn execute_on_bodies(&self, graph: &mut IrGraph, order: &[usize]) -> IrResult<SchedulerReport> {
        let mut report = SchedulerReport::default();
        for id in graph.node_ids() {
            let Some(node) = graph.node_mut(id) else {
                continue;
            };
            let Some(mut control) = node.control.take() else {
                continue;
            };
            let mut failed = None;
            for body in &mut control.bodies {
                match self.execute_ordered(&mut body.graph, order) {
                    Ok(body_report) => report.merge(body_report),
                    Err(err) => {
                        failed = Some(err);
                        break;
                    }
                }
            }
            if let Some(node) = graph.node_mut(id) {
                node.control = Some(control);
            }
            if let Some(err) = failed {
                return Err(err);
            }
        }
        Ok(report)
    }

    /// Fixed-point loop for one pattern-rewrite pass
    ///
    /// Each applied rewrite re-runs the match from scratch (the graph
    /// changed under the pattern); declined bindings are skipped within the
    /// unchanged graph. Returns the number of rewrites applied.
    fn run_pattern_pass(&self, graph: &mut IrGraph, pass: &dyn Pass) -> IrResult<usize> {
        let pattern = pass.pattern();
        let mut applied = 0usize;
        let mut iterations = 0usize;
        'fixed_point: loop {
            if iterations >= self.max_rewrite_iterations {
                return Err(CompileError::NonTerminatingPass {
                    pass: pass.name(),
                    iterations,
                });
            }
            iterations += 1;

            let mut declined = 0usize;
            loop {
                // the match sequence is deterministic, so skipping the first
                // `declined` bindings on an unchanged graph resumes exactly
                // where the previous probe left off
                let binding = find_matches(graph, &pattern).nth(declined);
                let Some(binding) = binding else {
                    break 'fixed_point;
                };
                trace!(pass = pass.name(), ?binding, "match");
                if pass.rewrite(graph, &binding)? {
                    applied += 1;
                    continue 'fixed_point;
                }
                declined += 1;
            }
        }
        Ok(applied)
    }
}
