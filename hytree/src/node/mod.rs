//! Node model
//!
//! A [`Node`] is an immutable, reference-counted tree node carrying its result
//! type and a kind-specific payload ([`Expr`]). Cloning a node is cheap and
//! equality is identity: two nodes are equal only if they are the same
//! allocation, which is what binding slots (parameters) rely on.
//!
//! Node kinds are a closed set; every consumer matches exhaustively on
//! [`Expr`] or on its field-less discriminant [`NodeKind`].
//!
//! Nodes with an ordered argument list (calls, constructions, invocations,
//! dynamic operations, indexers) and blocks keep their children in a
//! [`ChildCache`], which hands out an immutable [`Children`] view lazily.
use std::{
    hash::{Hash, Hasher},
    sync::Arc,
};

use auto_enums::auto_enum;
use strum::{EnumDiscriminants, EnumIs, EnumTryAs, IntoStaticStr};

use crate::{
    callable::{Callee, CallableRef, IndexerRef, MemberRef},
    types::Typeref,
    value::Value,
};

pub mod children;
pub mod factory;

pub use children::{ChildCache, Children};

/// Binary operators. `AndAlso` and `OrElse` short-circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIs, IntoStaticStr)]
pub enum BinaryOp {
    AndAlso,
    OrElse,
    Add,
    Subtract,
    Multiply,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
}

impl BinaryOp {
    #[inline]
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::AndAlso | BinaryOp::OrElse)
    }

    #[inline]
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal | BinaryOp::NotEqual | BinaryOp::LessThan | BinaryOp::GreaterThan
        )
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::AndAlso => "&&",
            BinaryOp::OrElse => "||",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::GreaterThan => ">",
        }
    }
}

/// Unary operators, including the nullable intrinsics used by lifting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIs, IntoStaticStr)]
pub enum UnaryOp {
    /// `T? -> bool`
    HasValue,
    /// `T? -> T`, the default value of `T` when null.
    ValueOrDefault,
    /// Conversion to the node's result type.
    Convert,
    Not,
    Negate,
}

#[derive(Debug, Clone)]
pub struct Constant {
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: Option<String>,
}

#[derive(Debug)]
pub struct Call {
    pub method: CallableRef,
    /// Receiver, `None` for static methods.
    pub object: Option<Node>,
    pub arguments: ChildCache,
}

#[derive(Debug)]
pub struct New {
    pub constructor: CallableRef,
    pub arguments: ChildCache,
}

#[derive(Debug)]
pub struct Invoke {
    /// Delegate-typed (or typed-lambda-tree-typed) expression being invoked.
    pub target: Node,
    pub arguments: ChildCache,
}

#[derive(Debug)]
pub struct Dynamic {
    pub binder: CallableRef,
    pub arguments: ChildCache,
}

#[derive(Debug, Clone)]
pub struct MemberAccess {
    /// Instance, `None` for static members.
    pub target: Option<Node>,
    pub member: MemberRef,
}

#[derive(Debug)]
pub struct Index {
    pub target: Node,
    /// `None` for built-in array indexing, which is always readable.
    pub indexer: Option<IndexerRef>,
    pub arguments: ChildCache,
}

#[derive(Debug, Clone)]
pub struct Binary {
    pub op: BinaryOp,
    pub left: Node,
    pub right: Node,
    /// User-defined implementation, if any.
    pub method: Option<CallableRef>,
}

#[derive(Debug, Clone)]
pub struct Unary {
    pub op: UnaryOp,
    pub operand: Node,
}

#[derive(Debug)]
pub struct Block {
    /// Binding slots scoped to this block.
    pub variables: Vec<Node>,
    pub expressions: ChildCache,
}

#[derive(Debug, Clone)]
pub struct Condition {
    pub test: Node,
    pub if_true: Node,
    pub if_false: Node,
}

#[derive(Debug, Clone)]
pub struct Assign {
    pub target: Node,
    pub value: Node,
}

#[derive(Debug, Clone)]
pub struct Lambda {
    pub parameters: Vec<Node>,
    pub body: Node,
    /// Type of the lambda tree object itself (`tree<delegate>`).
    pub tree_type: Typeref,
}

#[derive(Debug, Clone)]
pub struct Quote {
    pub operand: Node,
}

/// Kind-specific payload of a node.
#[derive(Debug, EnumIs, EnumTryAs, EnumDiscriminants)]
#[strum_discriminants(name(NodeKind), derive(Hash, IntoStaticStr))]
pub enum Expr {
    Constant(Constant),
    Parameter(Parameter),
    Call(Call),
    New(New),
    Invoke(Invoke),
    Dynamic(Dynamic),
    MemberAccess(MemberAccess),
    Index(Index),
    Binary(Binary),
    Unary(Unary),
    Block(Block),
    Condition(Condition),
    Assign(Assign),
    Lambda(Lambda),
    Quote(Quote),
}

impl NodeKind {
    /// Kinds whose arguments are checked against a callable signature.
    #[inline]
    pub fn is_call_site(&self) -> bool {
        matches!(
            self,
            NodeKind::Call | NodeKind::New | NodeKind::Invoke | NodeKind::Dynamic
        )
    }
}

struct NodeData {
    ty: Typeref,
    expr: Expr,
}

/// A node of a code tree.
#[derive(Clone)]
pub struct Node(Arc<NodeData>);

impl PartialEq for Node {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl Hash for Node {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("ty", &self.0.ty)
            .field("expr", &self.0.expr)
            .finish()
    }
}

impl Node {
    /// Assemble a node. No validation is performed; see [`factory::Factory`].
    pub fn from_parts(ty: Typeref, expr: Expr) -> Self {
        Self(Arc::new(NodeData { ty, expr }))
    }

    /// Address-derived identity, stable for the lifetime of the node.
    #[inline]
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    #[inline]
    pub fn result_type(&self) -> Typeref {
        self.0.ty
    }

    #[inline]
    pub fn expr(&self) -> &Expr {
        &self.0.expr
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        NodeKind::from(&self.0.expr)
    }

    #[inline]
    pub fn kind_name(&self) -> &'static str {
        self.kind().into()
    }

    /// `false` only for member accesses and indexers that are write-only.
    pub fn is_readable(&self) -> bool {
        match self.expr() {
            Expr::MemberAccess(access) => access.member.readable,
            Expr::Index(index) => index.indexer.as_ref().is_none_or(|i| i.readable),
            _ => true,
        }
    }

    /// Type of the node object itself, as opposed to the value it computes.
    ///
    /// Only lambdas report one; it is what auto-quoting checks parameters against.
    pub fn tree_type(&self) -> Option<Typeref> {
        self.expr()
            .try_as_lambda_ref()
            .map(|lambda| lambda.tree_type)
    }

    /// The child cache holding this node's ordered arguments or block body.
    pub fn child_cache(&self) -> Option<&ChildCache> {
        match self.expr() {
            Expr::Call(call) => Some(&call.arguments),
            Expr::New(new) => Some(&new.arguments),
            Expr::Invoke(invoke) => Some(&invoke.arguments),
            Expr::Dynamic(dynamic) => Some(&dynamic.arguments),
            Expr::Index(index) => Some(&index.arguments),
            Expr::Block(block) => Some(&block.expressions),
            Expr::Constant(_)
            | Expr::Parameter(_)
            | Expr::MemberAccess(_)
            | Expr::Binary(_)
            | Expr::Unary(_)
            | Expr::Condition(_)
            | Expr::Assign(_)
            | Expr::Lambda(_)
            | Expr::Quote(_) => None,
        }
    }

    /// Immutable view over the ordered children (arguments or block body).
    ///
    /// Repeated calls, including concurrent ones, return the same instance.
    pub fn children_view(&self) -> Option<Children> {
        self.child_cache().map(ChildCache::view)
    }

    /// The target whose signature the arguments of a call-site node are checked against.
    pub fn callee(&self) -> Option<Callee> {
        match self.expr() {
            Expr::Call(call) => Some(Callee::Declared(call.method.clone())),
            Expr::New(new) => Some(Callee::Declared(new.constructor.clone())),
            Expr::Dynamic(dynamic) => Some(Callee::Declared(dynamic.binder.clone())),
            Expr::Invoke(invoke) => Some(Callee::Delegate(invoke.target.result_type())),
            _ => None,
        }
    }

    /// All direct child nodes in evaluation order, declarations excluded.
    #[auto_enum(Iterator)]
    pub fn operands(&self) -> impl Iterator<Item = Node> + '_ {
        match self.expr() {
            Expr::Constant(_) | Expr::Parameter(_) => std::iter::empty::<Node>(),
            Expr::Call(call) => call.object.iter().cloned().chain(call.arguments.to_vec()),
            Expr::New(new) => new.arguments.to_vec().into_iter(),
            Expr::Invoke(invoke) => {
                std::iter::once(invoke.target.clone()).chain(invoke.arguments.to_vec())
            }
            Expr::Dynamic(dynamic) => dynamic.arguments.to_vec().into_iter(),
            Expr::MemberAccess(access) => access.target.iter().cloned(),
            Expr::Index(index) => {
                std::iter::once(index.target.clone()).chain(index.arguments.to_vec())
            }
            Expr::Binary(binary) => [binary.left.clone(), binary.right.clone()].into_iter(),
            Expr::Unary(unary) => std::iter::once(unary.operand.clone()),
            Expr::Block(block) => block.expressions.to_vec().into_iter(),
            Expr::Condition(cond) => [
                cond.test.clone(),
                cond.if_true.clone(),
                cond.if_false.clone(),
            ]
            .into_iter(),
            Expr::Assign(assign) => [assign.target.clone(), assign.value.clone()].into_iter(),
            Expr::Lambda(lambda) => std::iter::once(lambda.body.clone()),
            Expr::Quote(quote) => std::iter::once(quote.operand.clone()),
        }
    }

    /// Rebuild a call-site or index node around a replacement argument sequence.
    ///
    /// The new node adopts `arguments` as its materialized view. Returns
    /// `None` for kinds without an argument list.
    pub fn with_arguments(&self, arguments: Children) -> Option<Node> {
        let arguments = ChildCache::materialized(arguments);
        let expr = match self.expr() {
            Expr::Call(call) => Expr::Call(Call {
                method: call.method.clone(),
                object: call.object.clone(),
                arguments,
            }),
            Expr::New(new) => Expr::New(New {
                constructor: new.constructor.clone(),
                arguments,
            }),
            Expr::Invoke(invoke) => Expr::Invoke(Invoke {
                target: invoke.target.clone(),
                arguments,
            }),
            Expr::Dynamic(dynamic) => Expr::Dynamic(Dynamic {
                binder: dynamic.binder.clone(),
                arguments,
            }),
            Expr::Index(index) => Expr::Index(Index {
                target: index.target.clone(),
                indexer: index.indexer.clone(),
                arguments,
            }),
            _ => return None,
        };
        Some(Node::from_parts(self.result_type(), expr))
    }

    /// Rebuild this node with every direct child passed through `f`.
    ///
    /// Binding declarations (block variables, lambda parameters) are kept as
    /// is. Returns this very node when `f` changed nothing.
    pub fn map_children(&self, mut f: impl FnMut(&Node) -> Node) -> Node {
        let mut changed = false;
        let mut map = |node: &Node| {
            let mapped = f(node);
            changed |= mapped != *node;
            mapped
        };

        let expr = match self.expr() {
            Expr::Constant(_) | Expr::Parameter(_) => return self.clone(),
            Expr::Call(call) => Expr::Call(Call {
                method: call.method.clone(),
                object: call.object.as_ref().map(&mut map),
                arguments: ChildCache::new(call.arguments.to_vec().iter().map(&mut map).collect()),
            }),
            Expr::New(new) => Expr::New(New {
                constructor: new.constructor.clone(),
                arguments: ChildCache::new(new.arguments.to_vec().iter().map(&mut map).collect()),
            }),
            Expr::Invoke(invoke) => Expr::Invoke(Invoke {
                target: map(&invoke.target),
                arguments: ChildCache::new(
                    invoke.arguments.to_vec().iter().map(&mut map).collect(),
                ),
            }),
            Expr::Dynamic(dynamic) => Expr::Dynamic(Dynamic {
                binder: dynamic.binder.clone(),
                arguments: ChildCache::new(
                    dynamic.arguments.to_vec().iter().map(&mut map).collect(),
                ),
            }),
            Expr::MemberAccess(access) => Expr::MemberAccess(MemberAccess {
                target: access.target.as_ref().map(&mut map),
                member: access.member.clone(),
            }),
            Expr::Index(index) => Expr::Index(Index {
                target: map(&index.target),
                indexer: index.indexer.clone(),
                arguments: ChildCache::new(index.arguments.to_vec().iter().map(&mut map).collect()),
            }),
            Expr::Binary(binary) => Expr::Binary(Binary {
                op: binary.op,
                left: map(&binary.left),
                right: map(&binary.right),
                method: binary.method.clone(),
            }),
            Expr::Unary(unary) => Expr::Unary(Unary {
                op: unary.op,
                operand: map(&unary.operand),
            }),
            Expr::Block(block) => Expr::Block(Block {
                variables: block.variables.clone(),
                expressions: ChildCache::new(
                    block.expressions.to_vec().iter().map(&mut map).collect(),
                ),
            }),
            Expr::Condition(cond) => Expr::Condition(Condition {
                test: map(&cond.test),
                if_true: map(&cond.if_true),
                if_false: map(&cond.if_false),
            }),
            Expr::Assign(assign) => Expr::Assign(Assign {
                target: map(&assign.target),
                value: map(&assign.value),
            }),
            Expr::Lambda(lambda) => Expr::Lambda(Lambda {
                parameters: lambda.parameters.clone(),
                body: map(&lambda.body),
                tree_type: lambda.tree_type,
            }),
            Expr::Quote(quote) => Expr::Quote(Quote {
                operand: map(&quote.operand),
            }),
        };

        if changed {
            Node::from_parts(self.result_type(), expr)
        } else {
            self.clone()
        }
    }
}
