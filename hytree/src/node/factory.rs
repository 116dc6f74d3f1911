//! Unchecked node construction.
//!
//! [`Factory`] assembles nodes and derives the result types implied by their
//! kind (quote, lambda, nullable intrinsics, comparisons). It performs no
//! argument validation; call sites built here are expected to go through a
//! validation pass before evaluation.
use crate::{
    callable::{CallableRef, IndexerRef, MemberRef},
    node::{
        Assign, Binary, BinaryOp, Block, Call, ChildCache, Condition, Constant, Dynamic, Expr,
        Index, Invoke, Lambda, MemberAccess, New, Node, Parameter, Quote, Unary, UnaryOp,
    },
    types::{TypeOracle, TypeRegistry, Typeref, composite::TreeType, primary::PrimaryType},
    utils::Error,
    value::Value,
};

pub struct Factory<'a> {
    types: &'a TypeRegistry,
}

impl<'a> Factory<'a> {
    pub fn new(types: &'a TypeRegistry) -> Self {
        Self { types }
    }

    #[inline]
    pub fn types(&self) -> &'a TypeRegistry {
        self.types
    }

    #[inline]
    pub fn bool_type(&self) -> Typeref {
        self.types.primary(PrimaryType::Bool)
    }

    #[inline]
    pub fn int_type(&self) -> Typeref {
        self.types.primary(PrimaryType::Int)
    }

    pub fn constant(&self, value: Value, ty: Typeref) -> Node {
        Node::from_parts(ty, Expr::Constant(Constant { value }))
    }

    /// `null` typed as `ty`.
    pub fn null(&self, ty: Typeref) -> Node {
        self.constant(Value::Null, ty)
    }

    pub fn bool(&self, value: bool) -> Node {
        self.constant(Value::Bool(value), self.bool_type())
    }

    pub fn int(&self, value: i64) -> Node {
        self.constant(Value::Int(value), self.int_type())
    }

    /// A fresh binding slot. Every call yields a distinct parameter.
    pub fn parameter(&self, ty: Typeref, name: impl Into<String>) -> Node {
        Node::from_parts(
            ty,
            Expr::Parameter(Parameter {
                name: Some(name.into()),
            }),
        )
    }

    pub fn call(&self, method: CallableRef, object: Option<Node>, arguments: Vec<Node>) -> Node {
        Node::from_parts(
            method.output,
            Expr::Call(Call {
                method,
                object,
                arguments: ChildCache::new(arguments),
            }),
        )
    }

    pub fn new_object(&self, constructor: CallableRef, arguments: Vec<Node>) -> Node {
        Node::from_parts(
            constructor.output,
            Expr::New(New {
                constructor,
                arguments: ChildCache::new(arguments),
            }),
        )
    }

    /// Invoke `target`. The result type is the delegate's output, `unit` if
    /// `target` is not delegate-shaped.
    pub fn invoke(&self, target: Node, arguments: Vec<Node>) -> Node {
        let ty = self
            .types
            .delegate_shape(target.result_type())
            .map(|shape| shape.output)
            .unwrap_or_else(|| self.types.primary(PrimaryType::Unit));
        Node::from_parts(
            ty,
            Expr::Invoke(Invoke {
                target,
                arguments: ChildCache::new(arguments),
            }),
        )
    }

    pub fn dynamic(&self, binder: CallableRef, arguments: Vec<Node>) -> Node {
        Node::from_parts(
            binder.output,
            Expr::Dynamic(Dynamic {
                binder,
                arguments: ChildCache::new(arguments),
            }),
        )
    }

    pub fn member(&self, target: Option<Node>, member: MemberRef) -> Node {
        Node::from_parts(member.ty, Expr::MemberAccess(MemberAccess { target, member }))
    }

    /// Index `target`. `ty` is the element type; indexers override it with their own.
    pub fn index(
        &self,
        target: Node,
        indexer: Option<IndexerRef>,
        arguments: Vec<Node>,
        ty: Typeref,
    ) -> Node {
        let ty = indexer.as_ref().map_or(ty, |indexer| indexer.ty);
        Node::from_parts(
            ty,
            Expr::Index(Index {
                target,
                indexer,
                arguments: ChildCache::new(arguments),
            }),
        )
    }

    /// Binary operation.
    ///
    /// Comparisons are `bool`. A user-defined logical operator over `T?`
    /// returning `T` is lifted and typed `T?`; otherwise the method's output
    /// (or the left operand's type) is used.
    pub fn binary(&self, op: BinaryOp, left: Node, right: Node, method: Option<CallableRef>) -> Node {
        let ty = match &method {
            _ if op.is_comparison() => self.bool_type(),
            Some(method)
                if op.is_logical()
                    && self.types.is_nullable(left.result_type())
                    && self.types.non_nullable_form(left.result_type()) == method.output =>
            {
                left.result_type()
            }
            Some(method) => method.output,
            None => left.result_type(),
        };

        Node::from_parts(
            ty,
            Expr::Binary(Binary {
                op,
                left,
                right,
                method,
            }),
        )
    }

    pub fn unary(&self, op: UnaryOp, operand: Node, ty: Typeref) -> Node {
        Node::from_parts(ty, Expr::Unary(Unary { op, operand }))
    }

    pub fn has_value(&self, operand: Node) -> Node {
        self.unary(UnaryOp::HasValue, operand, self.bool_type())
    }

    pub fn value_or_default(&self, operand: Node) -> Node {
        let ty = self.types.non_nullable_form(operand.result_type());
        self.unary(UnaryOp::ValueOrDefault, operand, ty)
    }

    pub fn convert(&self, operand: Node, ty: Typeref) -> Node {
        self.unary(UnaryOp::Convert, operand, ty)
    }

    /// Block scoping `variables` over `expressions`, typed as its last expression.
    pub fn block(&self, variables: Vec<Node>, expressions: Vec<Node>) -> Result<Node, Error> {
        let ty = expressions
            .last()
            .ok_or(Error::EmptyBlock)?
            .result_type();
        Ok(Node::from_parts(
            ty,
            Expr::Block(Block {
                variables,
                expressions: ChildCache::new(expressions),
            }),
        ))
    }

    /// Conditional typed as its `if_true` branch.
    pub fn condition(&self, test: Node, if_true: Node, if_false: Node) -> Node {
        Node::from_parts(
            if_true.result_type(),
            Expr::Condition(Condition {
                test,
                if_true,
                if_false,
            }),
        )
    }

    pub fn assign(&self, target: Node, value: Node) -> Node {
        Node::from_parts(target.result_type(), Expr::Assign(Assign { target, value }))
    }

    /// Lambda over `parameters`. Its result type is the delegate type
    /// `fn(params) -> body`; its tree type is `tree<fn(params) -> body>`.
    pub fn lambda(&self, parameters: Vec<Node>, body: Node) -> Node {
        let delegate = self.types.callable(
            parameters.iter().map(Node::result_type).collect(),
            body.result_type(),
        );
        let tree_type = self.types.tree(TreeType::TypedLambda(delegate));
        Node::from_parts(
            delegate,
            Expr::Lambda(Lambda {
                parameters,
                body,
                tree_type,
            }),
        )
    }

    /// Quote `operand`: evaluates to the tree itself. Typed as the operand's
    /// tree type, or the generic tree type for non-lambdas.
    pub fn quote(&self, operand: Node) -> Node {
        let ty = operand
            .tree_type()
            .unwrap_or_else(|| self.types.tree(TreeType::Any));
        Node::from_parts(ty, Expr::Quote(Quote { operand }))
    }
}
