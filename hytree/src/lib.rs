//! Quoted code trees.
//!
//! Immutable expression trees whose nodes carry a result type from a shared
//! [`types::TypeRegistry`]. Argument lists of call-site nodes are exposed as
//! immutable views that are materialized at most once, even under
//! concurrent readers (see [`node::children`]).

pub mod callable;
pub mod node;
pub mod pretty;
pub mod types;
pub mod utils;
pub mod value;

pub use node::{Node, NodeKind, factory::Factory};
pub use types::{TypeRegistry, Typeref};
pub use utils::Error;
