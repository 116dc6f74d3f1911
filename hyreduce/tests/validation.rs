use std::{sync::Arc, thread};

use hyreduce::{
    ReduceConfig, ReduceError,
    config::ValidationConfig,
    error::ValidationError,
    prepare,
    validate::{Builder, validate_node},
};
use hytree::{
    Factory, NodeKind, TypeRegistry,
    callable::{Callable, DeclaredSignatures, Indexer, Param},
    node::{Children, Expr},
    types::{composite::TreeType, primary::PrimaryType},
};

#[test]
fn directly_assignable_arguments_return_the_original_sequence() {
    let types = TypeRegistry::new([0; 6]);
    let f = Factory::new(&types);
    let object = types.primary(PrimaryType::Object);
    let str_ = types.primary(PrimaryType::Str);
    let int = types.primary(PrimaryType::Int);
    let log = Arc::new(Callable::function(
        "log",
        vec![Param::new(object), Param::new(int)],
        types.primary(PrimaryType::Unit),
    ));
    let call = f.call(
        log,
        None,
        vec![f.constant("hello".into(), str_), f.int(3)],
    );

    let oracle = DeclaredSignatures { types: &types };
    let validated = validate_node(&call, &oracle, &types, &ValidationConfig::default()).unwrap();
    assert!(validated.same_instance(&call.children_view().unwrap()));
}

#[test]
fn exactly_one_quoted_position_differs() {
    let types = TypeRegistry::new([0; 6]);
    let f = Factory::new(&types);
    let int = types.primary(PrimaryType::Int);
    let bool_ = types.primary(PrimaryType::Bool);
    let predicate = types.callable(vec![int], bool_);
    let predicate_tree = types.tree(TreeType::TypedLambda(predicate));
    let count_where = Arc::new(Callable::function(
        "count_where",
        vec![Param::new(int), Param::new(predicate_tree), Param::new(int)],
        int,
    ));

    let x = f.parameter(int, "x");
    let lambda = f.lambda(
        vec![x.clone()],
        f.binary(hytree::node::BinaryOp::GreaterThan, x, f.int(0), None),
    );
    let call = f.call(count_where, None, vec![f.int(0), lambda.clone(), f.int(10)]);
    let original = call.children_view().unwrap();

    let oracle = DeclaredSignatures { types: &types };
    let validated = validate_node(&call, &oracle, &types, &ValidationConfig::default()).unwrap();

    assert!(!validated.same_instance(&original));
    assert_eq!(validated.len(), original.len());
    assert_eq!(validated[0], original[0]);
    assert_eq!(validated[2], original[2]);
    match validated[1].expr() {
        Expr::Quote(quote) => assert_eq!(quote.operand, lambda),
        _ => panic!("expected a quote, got {}", validated[1].kind_name()),
    }
    assert_eq!(validated[1].result_type(), predicate_tree);
}

#[test]
fn two_arguments_against_three_parameters() {
    let types = TypeRegistry::new([0; 6]);
    let builder = Builder::new(&types, ValidationConfig::default());
    let f = builder.factory();
    let int = types.primary(PrimaryType::Int);
    let three = vec![Param::new(int), Param::new(int), Param::new(int)];

    let method = Arc::new(Callable::function("mix", three.clone(), int));
    let error = builder
        .call(method, None, vec![f.int(1), f.int(2)])
        .unwrap_err();
    assert_eq!(
        error,
        ValidationError::ArityMismatch {
            kind: NodeKind::Call,
            callable: "mix".into(),
            expected: 3,
            actual: 2,
        }
    );

    let rgb = types.class("Rgb", None, true);
    let ctor = Arc::new(Callable::constructor(rgb, three));
    let error = builder
        .new_object(ctor, vec![f.int(1), f.int(2)])
        .unwrap_err();
    assert!(error.to_string().contains("constructor"));
}

#[test]
fn write_only_index_is_unreadable_regardless_of_type() {
    let types = TypeRegistry::new([0; 6]);
    let builder = Builder::new(&types, ValidationConfig::default());
    let f = builder.factory();
    let int = types.primary(PrimaryType::Int);
    let str_ = types.primary(PrimaryType::Str);
    let table = f.parameter(types.class("Table", None, false), "table");

    // The indexer's type matches the parameter; it is still unreadable.
    let cells = Arc::new(Indexer::new("cells", int, vec![Param::new(int)]).write_only());
    let cell = f.index(table, Some(cells), vec![f.int(0)], int);
    let id = Arc::new(Callable::function("id", vec![Param::new(int)], int));
    let error = builder.call(id, None, vec![cell.clone()]).unwrap_err();
    assert!(error.is_unreadable());

    // A mismatching parameter type still reports readability first.
    let shout = Arc::new(Callable::function("shout", vec![Param::new(str_)], str_));
    assert!(builder.call(shout, None, vec![cell]).unwrap_err().is_unreadable());
}

#[test]
fn dynamic_nodes_skip_the_context_parameter() {
    let types = TypeRegistry::new([0; 6]);
    let builder = Builder::new(&types, ValidationConfig::default());
    let f = builder.factory();
    let object = types.primary(PrimaryType::Object);
    let int = types.primary(PrimaryType::Int);
    let binder = Arc::new(Callable::binder(
        "add",
        vec![Param::new(object), Param::new(int), Param::new(int)],
        int,
    ));

    assert!(builder.dynamic(binder.clone(), vec![f.int(1), f.int(2)]).is_ok());
    assert!(
        builder
            .dynamic(binder, vec![f.int(0), f.int(1), f.int(2)])
            .unwrap_err()
            .is_arity_mismatch()
    );
}

#[test]
fn invocations_check_the_delegate_shape() {
    let types = TypeRegistry::new([0; 6]);
    let builder = Builder::new(&types, ValidationConfig::default());
    let f = builder.factory();
    let int = types.primary(PrimaryType::Int);
    let x = f.parameter(int, "x");
    let double = f.lambda(
        vec![x.clone()],
        f.binary(hytree::node::BinaryOp::Add, x.clone(), x, None),
    );

    let invoked = builder.invoke(double.clone(), vec![f.int(4)]).unwrap();
    assert_eq!(invoked.result_type(), int);

    let error = builder.invoke(double, vec![f.bool(true)]).unwrap_err();
    assert!(matches!(
        error,
        ValidationError::TypeMismatch { kind: NodeKind::Invoke, position: 0, .. }
    ));
}

#[test]
fn concurrent_validation_agrees() {
    let types = TypeRegistry::new([0; 6]);
    let f = Factory::new(&types);
    let int = types.primary(PrimaryType::Int);
    let lambda_tree = types.tree(TreeType::Lambda);
    let keep = Arc::new(Callable::function("keep", vec![Param::new(lambda_tree)], int));
    let x = f.parameter(int, "x");
    let lambda = f.lambda(vec![x.clone()], x);
    let call = f.call(keep, None, vec![lambda.clone()]);

    let results: Vec<Children> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    let oracle = DeclaredSignatures { types: &types };
                    validate_node(&call, &oracle, &types, &ValidationConfig::default()).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for validated in results {
        assert_eq!(validated.len(), 1);
        match validated[0].expr() {
            Expr::Quote(quote) => assert_eq!(quote.operand, lambda),
            _ => panic!("expected a quote"),
        }
    }
}

#[test]
fn configuration_can_disable_quoting() {
    let types = TypeRegistry::new([0; 6]);
    let f = Factory::new(&types);
    let int = types.primary(PrimaryType::Int);
    let lambda_tree = types.tree(TreeType::Lambda);
    let keep = Arc::new(Callable::function("keep", vec![Param::new(lambda_tree)], int));
    let x = f.parameter(int, "x");
    let call = f.call(keep, None, vec![f.lambda(vec![x.clone()], x)]);

    assert!(prepare(&call, &types, &ReduceConfig::default()).is_ok());

    let strict = ReduceConfig::from_toml_str("[validation]\nauto_quote = false\n").unwrap();
    let error = prepare(&call, &types, &strict).unwrap_err();
    assert!(matches!(
        error,
        ReduceError::Validation(ValidationError::TypeMismatch { .. })
    ));
}

#[test]
fn callables_only_fit_their_own_node_kind() {
    let types = TypeRegistry::new([0; 6]);
    let builder = Builder::new(&types, ValidationConfig::default());
    let f = builder.factory();
    let int = types.primary(PrimaryType::Int);
    let rgb = types.class("Rgb", None, true);

    let ctor = Arc::new(Callable::constructor(rgb, vec![Param::new(int)]));
    assert!(builder.new_object(ctor.clone(), vec![f.int(1)]).is_ok());
    assert!(
        builder
            .call(ctor, None, vec![f.int(1)])
            .unwrap_err()
            .is_missing_signature()
    );

    let plain = Arc::new(Callable::function("gray", vec![Param::new(int)], rgb));
    assert!(
        builder
            .dynamic(plain, vec![f.int(1)])
            .unwrap_err()
            .is_missing_signature()
    );
}
