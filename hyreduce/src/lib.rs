//! Passes over `hytree` code trees.
//!
//! A tree built by the unchecked [`hytree::Factory`] goes through
//! [`validate`] (argument checks and auto-quoting), then [`lifted`]
//! (lowering of lifted short-circuit operators), before an
//! [`eval::Evaluator`] runs it. [`prepare`] chains the first two.
use hytree::{Factory, Node, TypeRegistry, callable::DeclaredSignatures};
use log::{Level, debug, log_enabled};

pub mod config;
pub mod error;
pub mod eval;
pub mod lifted;
pub mod validate;

pub use config::ReduceConfig;
pub use error::ReduceError;

/// Validate every call site of `root`, then lower its lifted logical operators.
///
/// Returns `root` itself when neither pass changed anything.
pub fn prepare(
    root: &Node,
    types: &TypeRegistry,
    config: &ReduceConfig,
) -> Result<Node, ReduceError> {
    let signatures = DeclaredSignatures { types };
    let validated = validate::validate_tree(root, &signatures, types, &config.validation)?;
    let lowered = lifted::lower_tree(&validated, &Factory::new(types), types)?;

    if lowered != *root && log_enabled!(Level::Debug) {
        debug!(
            "Prepared tree: {}",
            hytree::pretty::pretty_string(&lowered, types, 100)
        );
    }
    Ok(lowered)
}
