use hytree::{NodeKind, callable::NativeError};
use strum::EnumIs;
use thiserror::Error;

/// How the callee of a call-site node is named in diagnostics.
fn callee_noun(kind: &NodeKind) -> &'static str {
    match kind {
        NodeKind::New => "constructor",
        NodeKind::Invoke => "lambda",
        NodeKind::Dynamic => "dynamic operation",
        _ => "method",
    }
}

/// Failure of the argument validation pass.
#[derive(Debug, Clone, PartialEq, Eq, EnumIs, Error)]
pub enum ValidationError {
    /// The number of arguments does not match the number of parameters.
    #[error(
        "Incorrect number of arguments supplied for {noun} `{callable}`: expected {expected}, found {actual}.",
        noun = callee_noun(.kind)
    )]
    ArityMismatch {
        kind: NodeKind,
        callable: String,
        expected: usize,
        actual: usize,
    },

    /// An argument reads a write-only member or indexer.
    #[error(
        "Argument {position} of {noun} `{callable}` is a write-only {argument:?} and cannot be read.",
        noun = callee_noun(.kind)
    )]
    Unreadable {
        kind: NodeKind,
        callable: String,
        position: usize,
        argument: NodeKind,
    },

    /// An argument is neither assignable nor quotable to its parameter type.
    #[error(
        "Expression of type `{actual}` cannot be used for parameter {position} of type `{expected}` of {noun} `{callable}`.",
        noun = callee_noun(.kind)
    )]
    TypeMismatch {
        kind: NodeKind,
        callable: String,
        position: usize,
        expected: String,
        actual: String,
    },

    /// The signature oracle has no parameter list for the callee.
    #[error("No signature is known for {noun} `{callable}`.", noun = callee_noun(.kind))]
    MissingSignature { kind: NodeKind, callable: String },

    /// Argument validation was requested for a node that has no call-site arguments.
    #[error(
        "Argument validation only applies to Call, New, Invoke and Dynamic nodes, got a {0:?} node."
    )]
    UnsupportedNodeKind(NodeKind),
}

impl ValidationError {
    /// Contract violations by the caller, as opposed to bad input trees.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.is_unsupported_node_kind()
    }
}

/// Failure of the lifted-operator lowering.
#[derive(Debug, Clone, PartialEq, Eq, EnumIs, Error)]
pub enum RewriteError {
    /// The short-circuit truth operator is not declared on the operand type or its ancestors.
    #[error(
        "Lifted operator `{method}` requires `{operator}` to be declared on `{ty}` or one of its ancestors."
    )]
    LiftedOperatorNotFound {
        method: String,
        operator: &'static str,
        ty: String,
    },

    #[error(transparent)]
    Tree(#[from] hytree::Error),
}

/// Failure while evaluating a tree.
#[derive(Debug, Clone, PartialEq, EnumIs, Error)]
pub enum EvalError {
    #[error("Parameter `{name}` is not bound in the current scope.")]
    UnboundParameter { name: String },

    /// The tree refers to something the interpreter cannot run.
    #[error("Cannot execute {what}.")]
    NotExecutable { what: String },

    /// A native body reported a failure.
    #[error("Native call `{callable}` failed: {source}")]
    Native {
        callable: String,
        source: NativeError,
    },

    /// Lowering a quoted lambda before running it failed.
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error("Type error: expected {expected}, found `{found}`.")]
    TypeError {
        expected: &'static str,
        found: String,
    },

    #[error("Evaluation exceeded the maximum depth of {max}.")]
    DepthExceeded { max: usize },

    /// Lifted logical operators must be lowered before evaluation.
    #[error(
        "Encountered a lifted logical operator using `{method}`. Lower the tree before evaluating it."
    )]
    UnloweredLifted { method: String },

    #[error("Operator `{operator}` is not declared on `{ty}` or one of its ancestors.")]
    OperatorNotFound { operator: &'static str, ty: String },
}

/// Failure while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration '{file}': {source}")]
    Parse {
        source: toml::de::Error,
        file: String,
    },
}

/// Any failure of the preparation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, EnumIs, Error)]
pub enum ReduceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}
