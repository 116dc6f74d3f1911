//! Lowering of lifted short-circuit operators.
//!
//! `a && b` over `T?`, where `&&` is backed by a user operator `T op(T, T)`,
//! has no direct meaning: the operator only accepts non-null values, and the
//! short-circuit test has to be asked of `T` itself through its declared
//! `op_False` (for `&&`) or `op_True` (for `||`). The reduced form binds each
//! operand to a synthetic slot so it is evaluated exactly once:
//!
//! ```text
//! {
//!     let left = a;
//!     if left.has_value
//!     then if op_False(left.value_or_default())
//!          then left
//!          else {
//!              let right = b;
//!              if right.has_value
//!              then (op(left.value_or_default(), right.value_or_default()) as T?)
//!              else null
//!          }
//!     else null
//! }
//! ```
use hytree::{
    Factory, Node,
    node::{BinaryOp, Expr},
    types::{OperatorLookup, TypeOracle},
};
use log::debug;

use crate::error::RewriteError;

/// Name of the truth operator consulted before evaluating the right operand.
#[inline]
pub fn short_circuit_operator(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::OrElse => "op_True",
        _ => "op_False",
    }
}

/// `true` iff `node` is an `AndAlso`/`OrElse` whose operands share one
/// nullable type `T?` and whose user operator returns exactly `T`.
pub fn is_lifted_logical<O: TypeOracle + ?Sized>(node: &Node, types: &O) -> bool {
    let Expr::Binary(binary) = node.expr() else {
        return false;
    };
    let operand = binary.left.result_type();

    binary.op.is_logical()
        && operand == binary.right.result_type()
        && types.is_nullable(operand)
        && binary
            .method
            .as_ref()
            .is_some_and(|method| method.output == types.non_nullable_form(operand))
}

/// Lower a lifted logical node into explicit null-propagating conditionals.
///
/// Any other node is returned as is, so lowering an already lowered tree is
/// a no-op.
pub fn reduce_lifted_logical<L: OperatorLookup + ?Sized>(
    node: &Node,
    factory: &Factory<'_>,
    ops: &L,
) -> Result<Node, RewriteError> {
    let types = factory.types();
    if !is_lifted_logical(node, types) {
        return Ok(node.clone());
    }
    let Expr::Binary(binary) = node.expr() else {
        return Ok(node.clone());
    };
    let Some(method) = binary.method.clone() else {
        return Ok(node.clone());
    };

    let nullable = binary.left.result_type();
    let result_ty = node.result_type();
    let owner = method
        .declaring_type
        .unwrap_or_else(|| types.non_nullable_form(nullable));
    let operator = short_circuit_operator(binary.op);
    let truth = ops.find_declared_operator(owner, operator).ok_or_else(|| {
        RewriteError::LiftedOperatorNotFound {
            method: method.name.clone(),
            operator,
            ty: types.display(owner),
        }
    })?;

    let left = factory.parameter(nullable, "left");
    let right = factory.parameter(nullable, "right");

    let combined = factory.call(
        method.clone(),
        None,
        vec![
            factory.value_or_default(left.clone()),
            factory.value_or_default(right.clone()),
        ],
    );
    let evaluate_right = factory.block(
        vec![right.clone()],
        vec![
            factory.assign(right.clone(), binary.right.clone()),
            factory.condition(
                factory.has_value(right.clone()),
                factory.convert(combined, result_ty),
                factory.null(result_ty),
            ),
        ],
    )?;

    let decided = factory.call(truth, None, vec![factory.value_or_default(left.clone())]);
    let lowered = factory.block(
        vec![left.clone()],
        vec![
            factory.assign(left.clone(), binary.left.clone()),
            factory.condition(
                factory.has_value(left.clone()),
                factory.condition(decided, left, evaluate_right),
                factory.null(result_ty),
            ),
        ],
    )?;

    debug!(
        "Lowered lifted {} using `{}` and `{}` over {}",
        <&'static str>::from(binary.op),
        method.name,
        operator,
        types.display(nullable)
    );
    Ok(lowered)
}

/// Lower every lifted logical node of a tree, bottom-up.
///
/// Quoted trees are data and are left as quoted. Returns `root` itself when
/// the tree contains no lifted operator outside a quote.
pub fn lower_tree<L: OperatorLookup + ?Sized>(
    root: &Node,
    factory: &Factory<'_>,
    ops: &L,
) -> Result<Node, RewriteError> {
    if root.expr().is_quote() {
        return Ok(root.clone());
    }

    let mut failure = None;
    let rebuilt = root.map_children(|child| {
        if failure.is_some() {
            return child.clone();
        }
        lower_tree(child, factory, ops).unwrap_or_else(|e| {
            failure = Some(e);
            child.clone()
        })
    });

    match failure {
        Some(e) => Err(e),
        None => reduce_lifted_logical(&rebuilt, factory, ops),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hytree::{
        TypeRegistry,
        callable::{Callable, Param},
        types::primary::PrimaryType,
    };

    use super::*;

    struct Fuzzy {
        ty: hytree::Typeref,
        nullable: hytree::Typeref,
        and: Arc<Callable>,
    }

    fn fuzzy(types: &TypeRegistry, declare_truth: bool) -> Fuzzy {
        let bool_ = types.primary(PrimaryType::Bool);
        let ty = types.class("Fuzzy", None, true);
        let and = Arc::new(Callable::operator(
            "op_BitwiseAnd",
            ty,
            vec![Param::new(ty), Param::new(ty)],
            ty,
        ));
        if declare_truth {
            types.declare_operator(Arc::new(Callable::operator(
                "op_False",
                ty,
                vec![Param::new(ty)],
                bool_,
            )));
        }
        Fuzzy {
            ty,
            nullable: types.nullable(ty),
            and,
        }
    }

    #[test]
    fn detection_requires_every_condition() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let fz = fuzzy(&types, true);
        let a = f.parameter(fz.nullable, "a");
        let b = f.parameter(fz.nullable, "b");

        let lifted = f.binary(BinaryOp::AndAlso, a.clone(), b.clone(), Some(fz.and.clone()));
        assert!(is_lifted_logical(&lifted, &types));

        // No user operator.
        let plain = f.binary(BinaryOp::AndAlso, a.clone(), b.clone(), None);
        assert!(!is_lifted_logical(&plain, &types));

        // Not a logical operator.
        let add = f.binary(BinaryOp::Add, a.clone(), b.clone(), Some(fz.and.clone()));
        assert!(!is_lifted_logical(&add, &types));

        // Operands of different types.
        let other = f.parameter(fz.ty, "c");
        let mixed = f.binary(BinaryOp::AndAlso, a.clone(), other, Some(fz.and.clone()));
        assert!(!is_lifted_logical(&mixed, &types));

        // Operands not nullable.
        let c = f.parameter(fz.ty, "c");
        let d = f.parameter(fz.ty, "d");
        let unlifted = f.binary(BinaryOp::AndAlso, c, d, Some(fz.and.clone()));
        assert!(!is_lifted_logical(&unlifted, &types));

        // Operator returning something other than `T`.
        let int = types.primary(PrimaryType::Int);
        let odd = Arc::new(Callable::operator(
            "op_BitwiseAnd",
            fz.ty,
            vec![Param::new(fz.ty), Param::new(fz.ty)],
            int,
        ));
        let mismatched = f.binary(BinaryOp::AndAlso, a, b, Some(odd));
        assert!(!is_lifted_logical(&mismatched, &types));
    }

    #[test]
    fn reduced_form_is_a_block_binding_left_once() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let fz = fuzzy(&types, true);
        let a = f.parameter(fz.nullable, "a");
        let b = f.parameter(fz.nullable, "b");
        let lifted = f.binary(BinaryOp::AndAlso, a.clone(), b, Some(fz.and.clone()));

        let lowered = reduce_lifted_logical(&lifted, &f, &types).unwrap();
        assert_eq!(lowered.result_type(), fz.nullable);

        let Expr::Block(block) = lowered.expr() else {
            panic!("expected a block, got {}", lowered.kind_name());
        };
        assert_eq!(block.variables.len(), 1);
        let body = block.expressions.to_vec();
        assert_eq!(body.len(), 2);
        let Expr::Assign(assign) = body[0].expr() else {
            panic!("expected the left operand to be bound first");
        };
        assert_eq!(assign.target, block.variables[0]);
        assert_eq!(assign.value, a);
        assert!(body[1].expr().is_condition());
    }

    #[test]
    fn reduction_is_idempotent() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let fz = fuzzy(&types, true);
        let lifted = f.binary(
            BinaryOp::AndAlso,
            f.parameter(fz.nullable, "a"),
            f.parameter(fz.nullable, "b"),
            Some(fz.and.clone()),
        );

        let lowered = reduce_lifted_logical(&lifted, &f, &types).unwrap();
        assert!(!is_lifted_logical(&lowered, &types));
        assert_eq!(reduce_lifted_logical(&lowered, &f, &types).unwrap(), lowered);
        assert_eq!(lower_tree(&lowered, &f, &types).unwrap(), lowered);
    }

    #[test]
    fn missing_truth_operator_is_reported() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let fz = fuzzy(&types, false);
        let lifted = f.binary(
            BinaryOp::AndAlso,
            f.parameter(fz.nullable, "a"),
            f.parameter(fz.nullable, "b"),
            Some(fz.and.clone()),
        );

        let error = reduce_lifted_logical(&lifted, &f, &types).unwrap_err();
        assert_eq!(
            error,
            RewriteError::LiftedOperatorNotFound {
                method: "op_BitwiseAnd".into(),
                operator: "op_False",
                ty: "Fuzzy".into(),
            }
        );
    }

    #[test]
    fn or_else_asks_op_true() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let fz = fuzzy(&types, true);
        let lifted = f.binary(
            BinaryOp::OrElse,
            f.parameter(fz.nullable, "a"),
            f.parameter(fz.nullable, "b"),
            Some(fz.and.clone()),
        );

        // Only `op_False` is declared.
        assert!(
            reduce_lifted_logical(&lifted, &f, &types)
                .unwrap_err()
                .is_lifted_operator_not_found()
        );
    }

    #[test]
    fn lower_tree_reaches_nested_operators() {
        let types = TypeRegistry::new([0; 6]);
        let f = Factory::new(&types);
        let fz = fuzzy(&types, true);
        let lifted = f.binary(
            BinaryOp::AndAlso,
            f.parameter(fz.nullable, "a"),
            f.parameter(fz.nullable, "b"),
            Some(fz.and.clone()),
        );
        let root = f.condition(f.bool(true), lifted.clone(), f.null(fz.nullable));

        let lowered = lower_tree(&root, &f, &types).unwrap();
        let Expr::Condition(cond) = lowered.expr() else {
            panic!("root kind changed");
        };
        assert!(cond.if_true.expr().is_block());
        assert!(!lowered.operands().any(|n| is_lifted_logical(&n, &types)));

        let untouched = f.binary(BinaryOp::Add, f.int(1), f.int(2), None);
        assert_eq!(lower_tree(&untouched, &f, &types).unwrap(), untouched);
    }
}
