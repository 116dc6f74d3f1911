//! Call-site argument validation.
//!
//! Every `Call`, `New`, `Invoke` and `Dynamic` node is checked against the
//! signature of its callee:
//!
//! 1. the argument count must equal the parameter count;
//! 2. each argument must be readable;
//! 3. each argument must be reference-assignable to its parameter type (after
//!    stripping a by-reference wrapper), or else be a lambda whose tree type
//!    fits a tree-typed parameter, in which case it is wrapped in a `Quote`.
//!
//! The argument sequence is copy-on-write: when nothing needs repair, the
//! node's own published [`Children`] instance is returned.
use hytree::{
    Factory, Node, TypeRegistry,
    callable::{Callee, CallableRef, DeclaredSignatures, Signature, SignatureOracle},
    node::Children,
    types::{TypeOracle, composite::TreeType},
};
use log::{debug, error, trace};

use crate::{config::ValidationConfig, error::ValidationError};

/// Name of the callee as shown in diagnostics.
fn callee_name(node: &Node, types: &TypeRegistry) -> String {
    match node.callee() {
        Some(Callee::Declared(callable)) => callable.name.clone(),
        Some(Callee::Delegate(ty)) => types.display(ty),
        None => node.kind_name().to_string(),
    }
}

/// Outcome of checking one argument against its parameter type.
enum Checked {
    Accepted,
    Quoted(Node),
}

fn check_argument(
    factory: &Factory<'_>,
    node: &Node,
    position: usize,
    argument: &Node,
    parameter: hytree::Typeref,
    config: &ValidationConfig,
) -> Result<Checked, ValidationError> {
    let types = factory.types();

    if !argument.is_readable() {
        return Err(ValidationError::Unreadable {
            kind: node.kind(),
            callable: callee_name(node, types),
            position,
            argument: argument.kind(),
        });
    }

    let expected = types.element_type(parameter);
    if types.is_reference_assignable(expected, argument.result_type()) {
        return Ok(Checked::Accepted);
    }

    // The argument may only be quoted when the parameter expects a lambda tree
    // and the argument's own tree type fits it.
    let lambda_tree = types.tree(TreeType::Lambda);
    let quotable = config.auto_quote
        && types.is_same_or_subclass(lambda_tree, expected)
        && argument
            .tree_type()
            .is_some_and(|tree_type| types.is_assignable_from(expected, tree_type));

    if quotable {
        debug!(
            "Quoting argument {} of {} `{}` for parameter of type {}",
            position,
            node.kind_name(),
            callee_name(node, types),
            types.display(expected)
        );
        return Ok(Checked::Quoted(factory.quote(argument.clone())));
    }

    Err(ValidationError::TypeMismatch {
        kind: node.kind(),
        callable: callee_name(node, types),
        position,
        expected: types.display(expected),
        actual: types.display(argument.result_type()),
    })
}

/// Check the arguments of a call-site node against `signature`.
///
/// Returns the argument sequence to use: the node's own view when every
/// argument was accepted as is, otherwise a new sequence sharing all
/// untouched arguments.
pub fn validate_arguments(
    node: &Node,
    signature: &Signature,
    types: &TypeRegistry,
    config: &ValidationConfig,
) -> Result<Children, ValidationError> {
    let kind = node.kind();
    if !kind.is_call_site() {
        error!(
            "Argument validation invoked on a {} node, which has no call-site arguments",
            node.kind_name()
        );
        return Err(ValidationError::UnsupportedNodeKind(kind));
    }

    let Some(arguments) = node.children_view() else {
        return Err(ValidationError::UnsupportedNodeKind(kind));
    };

    trace!(
        "Validating {} argument(s) of {} `{}`",
        arguments.len(),
        node.kind_name(),
        callee_name(node, types)
    );

    if arguments.len() != signature.len() {
        return Err(ValidationError::ArityMismatch {
            kind,
            callable: callee_name(node, types),
            expected: signature.len(),
            actual: arguments.len(),
        });
    }

    let factory = Factory::new(types);
    let mut repaired: Option<Vec<Node>> = None;

    for (position, (argument, param)) in arguments.iter().zip(signature.iter()).enumerate() {
        if let Checked::Quoted(quoted) =
            check_argument(&factory, node, position, argument, param.ty, config)?
        {
            repaired.get_or_insert_with(|| arguments.to_vec())[position] = quoted;
        }
    }

    Ok(match repaired {
        Some(replacement) => replacement.into(),
        None => arguments,
    })
}

/// Resolve the signature of `node` through `oracle` and validate against it.
pub fn validate_node<S: SignatureOracle + ?Sized>(
    node: &Node,
    oracle: &S,
    types: &TypeRegistry,
    config: &ValidationConfig,
) -> Result<Children, ValidationError> {
    let kind = node.kind();
    let Some(callee) = node.callee() else {
        error!(
            "Argument validation invoked on a {} node, which has no callee",
            node.kind_name()
        );
        return Err(ValidationError::UnsupportedNodeKind(kind));
    };

    let signature = oracle.signature_for(&callee, kind).ok_or_else(|| {
        ValidationError::MissingSignature {
            kind,
            callable: callee_name(node, types),
        }
    })?;

    validate_arguments(node, &signature, types, config)
}

/// Validate `node` and return the node to use in its place: `node` itself
/// when its arguments were accepted as is, otherwise a rebuilt node carrying
/// the repaired arguments.
pub fn ensure_valid<S: SignatureOracle + ?Sized>(
    node: &Node,
    oracle: &S,
    types: &TypeRegistry,
    config: &ValidationConfig,
) -> Result<Node, ValidationError> {
    let current = node
        .children_view()
        .ok_or(ValidationError::UnsupportedNodeKind(node.kind()))?;
    let validated = validate_node(node, oracle, types, config)?;

    if validated.same_instance(&current) {
        Ok(node.clone())
    } else {
        node.with_arguments(validated)
            .ok_or(ValidationError::UnsupportedNodeKind(node.kind()))
    }
}

/// Validate every call site of a tree, bottom-up.
///
/// Returns `root` itself when no argument anywhere needed repair. The first
/// failure aborts the walk.
pub fn validate_tree<S: SignatureOracle + ?Sized>(
    root: &Node,
    oracle: &S,
    types: &TypeRegistry,
    config: &ValidationConfig,
) -> Result<Node, ValidationError> {
    let mut failure = None;
    let rebuilt = root.map_children(|child| {
        if failure.is_some() {
            return child.clone();
        }
        validate_tree(child, oracle, types, config).unwrap_or_else(|e| {
            failure = Some(e);
            child.clone()
        })
    });

    if let Some(e) = failure {
        return Err(e);
    }

    if rebuilt.kind().is_call_site() {
        ensure_valid(&rebuilt, oracle, types, config)
    } else {
        Ok(rebuilt)
    }
}

/// Builds call-site nodes and validates them in one step.
pub struct Builder<'a, S = DeclaredSignatures<'a>> {
    factory: Factory<'a>,
    signatures: S,
    config: ValidationConfig,
}

impl<'a> Builder<'a> {
    pub fn new(types: &'a TypeRegistry, config: ValidationConfig) -> Self {
        Self::with_signatures(types, DeclaredSignatures { types }, config)
    }
}

impl<'a, S: SignatureOracle> Builder<'a, S> {
    pub fn with_signatures(types: &'a TypeRegistry, signatures: S, config: ValidationConfig) -> Self {
        Self {
            factory: Factory::new(types),
            signatures,
            config,
        }
    }

    /// The unchecked factory, for every other node kind.
    #[inline]
    pub fn factory(&self) -> &Factory<'a> {
        &self.factory
    }

    fn checked(&self, node: Node) -> Result<Node, ValidationError> {
        ensure_valid(&node, &self.signatures, self.factory.types(), &self.config)
    }

    pub fn call(
        &self,
        method: CallableRef,
        object: Option<Node>,
        arguments: Vec<Node>,
    ) -> Result<Node, ValidationError> {
        self.checked(self.factory.call(method, object, arguments))
    }

    pub fn new_object(
        &self,
        constructor: CallableRef,
        arguments: Vec<Node>,
    ) -> Result<Node, ValidationError> {
        self.checked(self.factory.new_object(constructor, arguments))
    }

    pub fn invoke(&self, target: Node, arguments: Vec<Node>) -> Result<Node, ValidationError> {
        self.checked(self.factory.invoke(target, arguments))
    }

    pub fn dynamic(
        &self,
        binder: CallableRef,
        arguments: Vec<Node>,
    ) -> Result<Node, ValidationError> {
        self.checked(self.factory.dynamic(binder, arguments))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hytree::{
        NodeKind,
        callable::{Callable, Indexer, Member, Param},
        node::Expr,
        types::primary::PrimaryType,
    };

    use super::*;

    fn is_quote_of(node: &Node, inner: &Node) -> bool {
        matches!(node.expr(), Expr::Quote(quote) if quote.operand == *inner)
    }

    fn int(types: &TypeRegistry) -> hytree::Typeref {
        types.primary(PrimaryType::Int)
    }

    #[test]
    fn accepted_arguments_keep_the_published_sequence() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let int = int(&types);
        let method = Arc::new(Callable::function(
            "add",
            vec![Param::new(int), Param::new(int)],
            int,
        ));
        let call = f.call(method.clone(), None, vec![f.int(1), f.int(2)]);

        let signature: Signature = method.params.iter().copied().collect();
        let validated =
            validate_arguments(&call, &signature, &types, &ValidationConfig::default()).unwrap();
        assert!(validated.same_instance(&call.children_view().unwrap()));
    }

    #[test]
    fn upcasts_are_accepted() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let animal = types.class("Animal", None, false);
        let dog = types.class("Dog", Some(animal), false);
        let feed = Arc::new(Callable::function(
            "feed",
            vec![Param::new(animal)],
            types.primary(PrimaryType::Unit),
        ));
        let call = f.call(feed, None, vec![f.parameter(dog, "rex")]);

        let oracle = DeclaredSignatures { types: &types };
        let node = ensure_valid(&call, &oracle, &types, &ValidationConfig::default()).unwrap();
        assert_eq!(node, call);
    }

    #[test]
    fn by_ref_parameters_are_checked_against_their_element_type() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let int = int(&types);
        let swap = Arc::new(Callable::function(
            "bump",
            vec![Param::by_ref(types.by_ref(int))],
            types.primary(PrimaryType::Unit),
        ));
        let call = f.call(swap, None, vec![f.parameter(int, "counter")]);

        let oracle = DeclaredSignatures { types: &types };
        assert!(validate_node(&call, &oracle, &types, &ValidationConfig::default()).is_ok());
    }

    #[test]
    fn lambda_argument_is_quoted_for_tree_parameters() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let int = int(&types);
        let x = f.parameter(int, "x");
        let lambda = f.lambda(vec![x.clone()], x);
        let lambda_tree = types.tree(TreeType::Lambda);
        let inspect = Arc::new(Callable::function(
            "inspect",
            vec![Param::new(int), Param::new(lambda_tree)],
            int,
        ));
        let first = f.int(4);
        let call = f.call(inspect, None, vec![first.clone(), lambda.clone()]);

        let oracle = DeclaredSignatures { types: &types };
        let validated = validate_node(&call, &oracle, &types, &ValidationConfig::default()).unwrap();

        assert_eq!(validated.len(), 2);
        assert_eq!(validated[0], first);
        assert!(is_quote_of(&validated[1], &lambda));
    }

    #[test]
    fn quoting_can_be_disabled() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let int = int(&types);
        let x = f.parameter(int, "x");
        let lambda = f.lambda(vec![x.clone()], x);
        let lambda_tree = types.tree(TreeType::Lambda);
        let inspect = Arc::new(Callable::function("inspect", vec![Param::new(lambda_tree)], int));
        let call = f.call(inspect, None, vec![lambda]);

        let oracle = DeclaredSignatures { types: &types };
        let config = ValidationConfig { auto_quote: false };
        let error = validate_node(&call, &oracle, &types, &config).unwrap_err();
        assert!(error.is_type_mismatch());
    }

    #[test]
    fn plain_tree_parameters_do_not_quote_lambdas() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let int = int(&types);
        let any_tree = types.tree(TreeType::Any);
        let store = Arc::new(Callable::function("store", vec![Param::new(any_tree)], int));
        let x = f.parameter(int, "x");
        let lambda = f.lambda(vec![x.clone()], x);

        let oracle = DeclaredSignatures { types: &types };
        let config = ValidationConfig::default();
        let bare = f.call(store.clone(), None, vec![lambda.clone()]);
        assert!(validate_node(&bare, &oracle, &types, &config).unwrap_err().is_type_mismatch());

        // An explicit quote is a tree and fits as is.
        let quoted = f.call(store, None, vec![f.quote(lambda)]);
        assert!(validate_node(&quoted, &oracle, &types, &config).is_ok());
    }

    #[test]
    fn non_lambda_arguments_are_never_quoted() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let int = int(&types);
        let lambda_tree = types.tree(TreeType::Lambda);
        let inspect = Arc::new(Callable::function("inspect", vec![Param::new(lambda_tree)], int));
        let call = f.call(inspect, None, vec![f.int(1)]);

        let oracle = DeclaredSignatures { types: &types };
        let error = validate_node(&call, &oracle, &types, &ValidationConfig::default()).unwrap_err();
        assert_eq!(
            error,
            ValidationError::TypeMismatch {
                kind: NodeKind::Call,
                callable: "inspect".into(),
                position: 0,
                expected: "tree<lambda>".into(),
                actual: "int".into(),
            }
        );
    }

    #[test]
    fn mistyped_lambda_trees_are_not_quoted() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let int = int(&types);
        let bool_ = types.primary(PrimaryType::Bool);
        let predicate = types.tree(TreeType::TypedLambda(types.callable(vec![int], bool_)));
        let filter = Arc::new(Callable::function("filter", vec![Param::new(predicate)], int));
        let x = f.parameter(int, "x");
        let call = f.call(filter, None, vec![f.lambda(vec![x.clone()], x)]);

        let oracle = DeclaredSignatures { types: &types };
        let error = validate_node(&call, &oracle, &types, &ValidationConfig::default()).unwrap_err();
        assert!(error.is_type_mismatch());
    }

    #[test]
    fn arity_mismatch_reports_both_counts() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let int = int(&types);
        let method = Arc::new(Callable::function(
            "clamp",
            vec![Param::new(int), Param::new(int), Param::new(int)],
            int,
        ));
        let call = f.call(method, None, vec![f.int(1), f.int(2)]);

        let oracle = DeclaredSignatures { types: &types };
        let error = validate_node(&call, &oracle, &types, &ValidationConfig::default()).unwrap_err();
        assert_eq!(
            error,
            ValidationError::ArityMismatch {
                kind: NodeKind::Call,
                callable: "clamp".into(),
                expected: 3,
                actual: 2,
            }
        );
    }

    #[test]
    fn write_only_arguments_are_rejected_before_type_checks() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let int = int(&types);
        let bag = f.parameter(types.class("Bag", None, false), "bag");
        let sink = f.member(Some(bag), Arc::new(Member::new("sink", int).write_only()));
        let id = Arc::new(Callable::function("id", vec![Param::new(int)], int));
        let call = f.call(id, None, vec![sink]);

        let oracle = DeclaredSignatures { types: &types };
        let error = validate_node(&call, &oracle, &types, &ValidationConfig::default()).unwrap_err();
        assert!(matches!(
            error,
            ValidationError::Unreadable {
                position: 0,
                argument: NodeKind::MemberAccess,
                ..
            }
        ));
    }

    #[test]
    fn readable_indexers_pass() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let int = int(&types);
        let bag = f.parameter(types.class("Bag", None, false), "bag");
        let item = Arc::new(Indexer::new("item", int, vec![Param::new(int)]));
        let id = Arc::new(Callable::function("id", vec![Param::new(int)], int));
        let call = f.call(id, None, vec![f.index(bag, Some(item), vec![f.int(0)], int)]);

        let oracle = DeclaredSignatures { types: &types };
        assert!(validate_node(&call, &oracle, &types, &ValidationConfig::default()).is_ok());
    }

    #[test]
    fn non_call_sites_are_unsupported() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let sum = f.binary(hytree::node::BinaryOp::Add, f.int(1), f.int(2), None);

        let error =
            validate_arguments(&sum, &Signature::default(), &types, &ValidationConfig::default())
                .unwrap_err();
        assert_eq!(error, ValidationError::UnsupportedNodeKind(NodeKind::Binary));
        assert!(error.is_fatal());
    }

    #[test]
    fn invoke_without_delegate_type_has_no_signature() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let invoke = f.invoke(f.int(3), vec![]);

        let oracle = DeclaredSignatures { types: &types };
        let error = validate_node(&invoke, &oracle, &types, &ValidationConfig::default()).unwrap_err();
        assert!(error.is_missing_signature());
    }

    #[test]
    fn builder_rejects_and_repairs() {
        let types = TypeRegistry::new([0; 6]);
        let builder = Builder::new(&types, ValidationConfig::default());
        let f = builder.factory();
        let int = int(&types);
        let lambda_tree = types.tree(TreeType::Lambda);
        let store = Arc::new(Callable::function("store", vec![Param::new(lambda_tree)], int));

        let x = f.parameter(int, "x");
        let lambda = f.lambda(vec![x.clone()], x);
        let node = builder.call(store.clone(), None, vec![lambda.clone()]).unwrap();
        let arguments = node.children_view().unwrap();
        assert!(is_quote_of(&arguments[0], &lambda));

        assert!(builder.call(store, None, vec![]).unwrap_err().is_arity_mismatch());
    }

    #[test]
    fn nested_call_sites_are_repaired_bottom_up() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let int = int(&types);
        let lambda_tree = types.tree(TreeType::Lambda);
        let size = Arc::new(Callable::function("size", vec![Param::new(lambda_tree)], int));
        let x = f.parameter(int, "x");
        let lambda = f.lambda(vec![x.clone()], x);
        let inner = f.call(size, None, vec![lambda.clone()]);
        let root = f.binary(hytree::node::BinaryOp::Add, inner.clone(), f.int(1), None);

        let oracle = DeclaredSignatures { types: &types };
        let config = ValidationConfig::default();
        let rebuilt = validate_tree(&root, &oracle, &types, &config).unwrap();
        assert_ne!(rebuilt, root);

        let Expr::Binary(binary) = rebuilt.expr() else {
            panic!("root kind changed");
        };
        let arguments = binary.left.children_view().unwrap();
        assert!(is_quote_of(&arguments[0], &lambda));

        // A second pass finds nothing left to repair.
        assert_eq!(validate_tree(&rebuilt, &oracle, &types, &config).unwrap(), rebuilt);
    }
}
