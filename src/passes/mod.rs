//! Built-in rewrite passes
//!
//! Ready-to-register passes covering the canonicalization pipeline:
//!
//! - **Elimination**: [`ElideIdentity`], [`RemoveDeadNodes`]
//! - **Transpose chains**: [`CancelInverseTranspose`], [`MergeTranspose`]
//! - **Reshape chains**: [`MergeReshape`]
//! - **Layout**: [`ConvertLayout`] (channel-last → channel-first)
//!
//! Each pass declares its ordering constraints; [`default_passes`] returns
//! the standard registry in declaration order.

pub mod eliminate;
pub mod layout;
pub mod reshape;
pub mod transpose;

pub use eliminate::{ElideIdentity, RemoveDeadNodes};
pub use layout::ConvertLayout;
pub use reshape::MergeReshape;
pub use transpose::{CancelInverseTranspose, MergeTranspose};

use crate::pass::Pass;

/// The standard canonicalization pass registry
pub fn default_passes() -> Vec<Box<dyn Pass>> {
    vec![
        Box::new(ElideIdentity::new()),
        Box::new(CancelInverseTranspose::new()),
        Box::new(MergeTranspose::new()),
        Box::new(MergeReshape::new()),
        Box::new(ConvertLayout::new()),
        Box::new(RemoveDeadNodes::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::Scheduler;

    #[test]
    fn test_default_registry_orders_cleanly() {
        let mut scheduler = Scheduler::new();
        for pass in default_passes() {
            scheduler.register(pass);
        }
        let order = scheduler.ordered_indices().unwrap();
        let names: Vec<&str> = {
            let registered = scheduler.registered();
            order.iter().map(|&i| registered[i]).collect()
        };
        // cleanup is last; layout conversion follows the transpose passes
        assert_eq!(names.last(), Some(&"remove_dead_nodes"));
        let pos = |name: &str| names.iter().position(|n| *n == name).unwrap();
        assert!(pos("cancel_inverse_transpose") < pos("merge_transpose"));
        assert!(pos("merge_transpose") < pos("convert_layout"));
    }
}
