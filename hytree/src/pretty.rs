//! RcDoc-based pretty-printer for code trees.
//!
//! Produces width-aware plain text, mainly for log lines and diagnostics.
//! Type names are resolved through the [`TypeRegistry`].
use pretty::RcDoc;

use crate::{
    node::{BinaryOp, Expr, Node, UnaryOp},
    types::{TypeOracle, TypeRegistry},
    value::Value,
};

fn list(items: impl IntoIterator<Item = RcDoc<'static>>) -> RcDoc<'static> {
    RcDoc::intersperse(items, RcDoc::text(",").append(RcDoc::line()))
        .nest(2)
        .group()
}

fn parenthesized(inner: RcDoc<'static>) -> RcDoc<'static> {
    RcDoc::text("(").append(inner).append(RcDoc::text(")"))
}

fn parameter_name(node: &Node) -> String {
    match node.expr() {
        Expr::Parameter(param) => param
            .name
            .clone()
            .unwrap_or_else(|| format!("${:x}", node.id() & 0xffff)),
        _ => node.kind_name().to_string(),
    }
}

/// Build the document for `node`.
pub fn to_doc(node: &Node, types: &TypeRegistry) -> RcDoc<'static> {
    let doc = |n: &Node| to_doc(n, types);
    let args = |nodes: Vec<Node>| list(nodes.iter().map(|n| to_doc(n, types)));

    match node.expr() {
        Expr::Constant(constant) => match &constant.value {
            Value::Null => RcDoc::text(format!("null<{}>", types.display(node.result_type()))),
            value => RcDoc::as_string(value),
        },
        Expr::Parameter(_) => RcDoc::text(parameter_name(node)),
        Expr::Call(call) => {
            let receiver = match &call.object {
                Some(object) => doc(object).append(RcDoc::text(".")),
                None => RcDoc::nil(),
            };
            receiver
                .append(RcDoc::text(call.method.name.clone()))
                .append(parenthesized(args(call.arguments.to_vec())))
                .group()
        }
        Expr::New(new) => RcDoc::text("new ")
            .append(RcDoc::text(types.display(node.result_type())))
            .append(parenthesized(args(new.arguments.to_vec())))
            .group(),
        Expr::Invoke(invoke) => doc(&invoke.target)
            .append(parenthesized(args(invoke.arguments.to_vec())))
            .group(),
        Expr::Dynamic(dynamic) => RcDoc::text("dyn ")
            .append(RcDoc::text(dynamic.binder.name.clone()))
            .append(parenthesized(args(dynamic.arguments.to_vec())))
            .group(),
        Expr::MemberAccess(access) => {
            let target = match &access.target {
                Some(target) => doc(target),
                None => RcDoc::text(types.display(node.result_type())),
            };
            target
                .append(RcDoc::text("."))
                .append(RcDoc::text(access.member.name.clone()))
        }
        Expr::Index(index) => doc(&index.target)
            .append(RcDoc::text("["))
            .append(args(index.arguments.to_vec()))
            .append(RcDoc::text("]"))
            .group(),
        Expr::Binary(binary) => {
            let op = match (&binary.method, binary.op) {
                (Some(method), BinaryOp::AndAlso | BinaryOp::OrElse) => {
                    format!("{}[{}]", binary.op.symbol(), method.name)
                }
                _ => binary.op.symbol().to_string(),
            };
            parenthesized(
                doc(&binary.left)
                    .append(RcDoc::space())
                    .append(RcDoc::text(op))
                    .append(RcDoc::line())
                    .append(doc(&binary.right))
                    .nest(2),
            )
            .group()
        }
        Expr::Unary(unary) => match unary.op {
            UnaryOp::HasValue => doc(&unary.operand).append(RcDoc::text(".has_value")),
            UnaryOp::ValueOrDefault => {
                doc(&unary.operand).append(RcDoc::text(".value_or_default()"))
            }
            UnaryOp::Convert => parenthesized(
                doc(&unary.operand)
                    .append(RcDoc::text(" as "))
                    .append(RcDoc::text(types.display(node.result_type()))),
            ),
            UnaryOp::Not => RcDoc::text("!").append(doc(&unary.operand)),
            UnaryOp::Negate => RcDoc::text("-").append(doc(&unary.operand)),
        },
        Expr::Block(block) => {
            let declarations = block.variables.iter().map(|var| {
                RcDoc::text("let ")
                    .append(RcDoc::text(parameter_name(var)))
                    .append(RcDoc::text(": "))
                    .append(RcDoc::text(types.display(var.result_type())))
            });
            let body = block.expressions.to_vec();
            let statements = declarations.chain(body.iter().map(doc));
            RcDoc::text("{")
                .append(
                    RcDoc::line()
                        .append(RcDoc::intersperse(
                            statements,
                            RcDoc::text(";").append(RcDoc::line()),
                        ))
                        .nest(2),
                )
                .append(RcDoc::line())
                .append(RcDoc::text("}"))
                .group()
        }
        Expr::Condition(cond) => RcDoc::text("if ")
            .append(doc(&cond.test))
            .append(RcDoc::line())
            .append(RcDoc::text("then "))
            .append(doc(&cond.if_true))
            .append(RcDoc::line())
            .append(RcDoc::text("else "))
            .append(doc(&cond.if_false))
            .group()
            .nest(2),
        Expr::Assign(assign) => doc(&assign.target)
            .append(RcDoc::text(" = "))
            .append(doc(&assign.value)),
        Expr::Lambda(lambda) => RcDoc::text("|")
            .append(RcDoc::intersperse(
                lambda.parameters.iter().map(|p| RcDoc::text(parameter_name(p))),
                RcDoc::text(", "),
            ))
            .append(RcDoc::text("| "))
            .append(doc(&lambda.body))
            .group(),
        Expr::Quote(quote) => RcDoc::text("quote").append(parenthesized(doc(&quote.operand))),
    }
}

/// Format `node` into a plain string at the given line width.
pub fn pretty_string(node: &Node, types: &TypeRegistry, width: usize) -> String {
    let mut buf = String::new();
    let _ = to_doc(node, types).render_fmt(width, &mut buf);
    buf
}
