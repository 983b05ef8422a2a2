//! Pattern matching engine
//!
//! Declarative subgraph queries over the graph store:
//!
//! - [`Pattern`]: named node predicates plus named edge constraints with
//!   optional port bindings (read-only input, never mutated)
//! - [`find_matches`]: lazy, restartable, deterministic constraint-propagation
//!   search producing [`Binding`]s
//!
//! # Example
//!
//! ```ignore
//! use canonir::pattern::{find_matches, Pattern};
//!
//! // relu feeding an add on input port 0
//! let pattern = Pattern::new()
//!     .op("r", "Relu")
//!     .op("a", "Add")
//!     .edge_at("r", "a", None, Some(0));
//!
//! for binding in find_matches(&graph, &pattern) {
//!     let relu = binding.node("r");
//!     // ...
//! }
//! ```

pub mod matcher;
pub mod spec;

pub use matcher::{find_matches, first_match, Binding, MatchIter};
pub use spec::{EdgeSpec, NodePredicate, NodeSpec, Pattern};
