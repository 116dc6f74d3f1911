//! Evaluation of prepared trees.
//!
//! An [`Evaluator`] consumes trees whose call sites have been validated and
//! whose lifted logical operators have been lowered. [`Interpreter`] is the
//! reference tree-walking implementation: quotes evaluate to the quoted tree,
//! blocks evaluate their expressions left to right, lambdas close over the
//! bindings visible where they are evaluated.
use std::sync::Arc;

use hytree::{
    Factory, Node, TypeRegistry, Typeref,
    callable::{CallableRef, NativeFn},
    node::{Binary, BinaryOp, Expr, UnaryOp},
    types::{AnyType, OperatorLookup, TypeOracle, primary::PrimaryType},
    value::{Closure, Value},
};
use log::trace;

use crate::{config::EvaluatorConfig, error::EvalError, lifted};

pub trait Evaluator {
    /// Evaluate `node` to a value of its result type.
    fn evaluate(&mut self, node: &Node) -> Result<Value, EvalError>;
}

fn parameter_name(node: &Node) -> String {
    match node.expr() {
        Expr::Parameter(param) => param.name.clone().unwrap_or_else(|| "<anonymous>".into()),
        _ => node.kind_name().to_string(),
    }
}

fn type_error(expected: &'static str, found: &Value) -> EvalError {
    EvalError::TypeError {
        expected,
        found: found.to_string(),
    }
}

fn run_native(
    name: &str,
    body: Option<&NativeFn>,
    arguments: &[Value],
) -> Result<Value, EvalError> {
    let body = body.ok_or_else(|| EvalError::NotExecutable {
        what: format!("`{name}`, which has no body"),
    })?;
    body(arguments).map_err(|source| EvalError::Native {
        callable: name.to_string(),
        source,
    })
}

/// Reference tree-walking [`Evaluator`].
///
/// Bindings live in a flat environment searched innermost first; a binding
/// is keyed by the identity of its `Parameter` node.
pub struct Interpreter<'a> {
    types: &'a TypeRegistry,
    config: EvaluatorConfig,
    env: Vec<(Node, Value)>,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(types: &'a TypeRegistry, config: EvaluatorConfig) -> Self {
        Self {
            types,
            config,
            env: Vec::new(),
            depth: 0,
        }
    }

    /// Bind `parameter` to `value` for subsequent evaluations.
    pub fn bind(&mut self, parameter: Node, value: Value) {
        self.env.push((parameter, value));
    }

    fn lookup(&self, parameter: &Node) -> Result<Value, EvalError> {
        self.env
            .iter()
            .rev()
            .find(|(bound, _)| bound == parameter)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| EvalError::UnboundParameter {
                name: parameter_name(parameter),
            })
    }

    fn store(&mut self, parameter: &Node, value: Value) -> Result<(), EvalError> {
        let slot = self
            .env
            .iter_mut()
            .rev()
            .find(|(bound, _)| bound == parameter)
            .ok_or_else(|| EvalError::UnboundParameter {
                name: parameter_name(parameter),
            })?;
        slot.1 = value;
        Ok(())
    }

    /// Default value of `ty`, as produced by `value_or_default` on `null`.
    fn default_of(&self, ty: Typeref) -> Value {
        match self.types.get(ty).as_deref() {
            Some(AnyType::Primary(PrimaryType::Bool)) => Value::Bool(false),
            Some(AnyType::Primary(PrimaryType::Int)) => Value::Int(0),
            Some(AnyType::Primary(PrimaryType::Float)) => Value::Float(0.0),
            Some(AnyType::Primary(PrimaryType::Unit)) => Value::Unit,
            _ => Value::Null,
        }
    }

    fn evaluate_all(&mut self, nodes: &[Node]) -> Result<Vec<Value>, EvalError> {
        nodes.iter().map(|node| self.evaluate(node)).collect()
    }

    fn evaluate_bool(&mut self, node: &Node) -> Result<bool, EvalError> {
        match self.evaluate(node)? {
            Value::Bool(b) => Ok(b),
            other => Err(type_error("bool", &other)),
        }
    }

    fn call_closure(&mut self, closure: &Closure, arguments: Vec<Value>) -> Result<Value, EvalError> {
        let Expr::Lambda(lambda) = closure.lambda.expr() else {
            return Err(EvalError::NotExecutable {
                what: format!("a {} node", closure.lambda.kind_name()),
            });
        };
        if lambda.parameters.len() != arguments.len() {
            return Err(EvalError::NotExecutable {
                what: format!(
                    "a lambda of {} parameter(s) with {} argument(s)",
                    lambda.parameters.len(),
                    arguments.len()
                ),
            });
        }

        let mut scope = closure.captured.to_vec();
        scope.extend(lambda.parameters.iter().cloned().zip(arguments));
        let outer = std::mem::replace(&mut self.env, scope);
        let result = self.evaluate(&lambda.body);
        self.env = outer;
        result
    }

    fn invoke(&mut self, target: Value, arguments: Vec<Value>) -> Result<Value, EvalError> {
        match target {
            Value::Closure(closure) => self.call_closure(&closure, arguments),
            // A quoted lambda is lowered on the spot and runs with nothing captured.
            Value::Tree(tree) if tree.expr().is_lambda() => {
                let lambda = lifted::lower_tree(&tree, &Factory::new(self.types), self.types)?;
                let closure = Closure {
                    lambda,
                    captured: Arc::from(Vec::new()),
                };
                self.call_closure(&closure, arguments)
            }
            other => Err(type_error("a callable value", &other)),
        }
    }

    fn user_operator(&mut self, method: &CallableRef, arguments: &[Value]) -> Result<Value, EvalError> {
        run_native(&method.name, method.body.as_ref(), arguments)
    }

    /// `op_False(l) ? l : op(l, r)` for `&&`, `op_True(l) ? l : op(l, r)` for `||`.
    fn user_logical(&mut self, binary: &Binary, method: &CallableRef) -> Result<Value, EvalError> {
        let operator = lifted::short_circuit_operator(binary.op);
        let owner = method
            .declaring_type
            .unwrap_or_else(|| binary.left.result_type());
        let truth = self
            .types
            .find_declared_operator(owner, operator)
            .ok_or_else(|| EvalError::OperatorNotFound {
                operator,
                ty: self.types.display(owner),
            })?;

        let left = self.evaluate(&binary.left)?;
        match run_native(&truth.name, truth.body.as_ref(), std::slice::from_ref(&left))? {
            Value::Bool(true) => Ok(left),
            Value::Bool(false) => {
                let right = self.evaluate(&binary.right)?;
                self.user_operator(method, &[left, right])
            }
            other => Err(type_error("bool", &other)),
        }
    }

    fn builtin_binary(&mut self, op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
        use Value::{Bool, Float, Int, Str};

        Ok(match (op, &left, &right) {
            (BinaryOp::Equal, _, _) => Bool(left == right),
            (BinaryOp::NotEqual, _, _) => Bool(left != right),
            (BinaryOp::Add, Int(a), Int(b)) => Int(a.wrapping_add(*b)),
            (BinaryOp::Subtract, Int(a), Int(b)) => Int(a.wrapping_sub(*b)),
            (BinaryOp::Multiply, Int(a), Int(b)) => Int(a.wrapping_mul(*b)),
            (BinaryOp::Add, Float(a), Float(b)) => Float(a + b),
            (BinaryOp::Subtract, Float(a), Float(b)) => Float(a - b),
            (BinaryOp::Multiply, Float(a), Float(b)) => Float(a * b),
            (BinaryOp::Add, Str(a), Str(b)) => Str(format!("{a}{b}").into()),
            (BinaryOp::LessThan, Int(a), Int(b)) => Bool(a < b),
            (BinaryOp::GreaterThan, Int(a), Int(b)) => Bool(a > b),
            (BinaryOp::LessThan, Float(a), Float(b)) => Bool(a < b),
            (BinaryOp::GreaterThan, Float(a), Float(b)) => Bool(a > b),
            (BinaryOp::LessThan, Str(a), Str(b)) => Bool(a < b),
            (BinaryOp::GreaterThan, Str(a), Str(b)) => Bool(a > b),
            _ => {
                return Err(EvalError::TypeError {
                    expected: "operands supported by the operator",
                    found: format!("{left} {} {right}", op.symbol()),
                });
            }
        })
    }

    fn binary(&mut self, node: &Node, binary: &Binary) -> Result<Value, EvalError> {
        if lifted::is_lifted_logical(node, self.types) {
            return Err(EvalError::UnloweredLifted {
                method: binary
                    .method
                    .as_ref()
                    .map(|m| m.name.clone())
                    .unwrap_or_default(),
            });
        }

        match (&binary.method, binary.op.is_logical()) {
            (Some(method), true) => self.user_logical(binary, method),
            (None, true) => {
                let left = self.evaluate_bool(&binary.left)?;
                let decided = match binary.op {
                    BinaryOp::AndAlso => !left,
                    _ => left,
                };
                if decided {
                    Ok(Value::Bool(left))
                } else {
                    self.evaluate_bool(&binary.right).map(Value::Bool)
                }
            }
            (Some(method), false) => {
                let left = self.evaluate(&binary.left)?;
                let right = self.evaluate(&binary.right)?;
                self.user_operator(method, &[left, right])
            }
            (None, false) => {
                let left = self.evaluate(&binary.left)?;
                let right = self.evaluate(&binary.right)?;
                self.builtin_binary(binary.op, left, right)
            }
        }
    }

    fn unary(&mut self, node: &Node, op: UnaryOp, operand: &Node) -> Result<Value, EvalError> {
        let value = self.evaluate(operand)?;
        match (op, value) {
            (UnaryOp::HasValue, value) => Ok(Value::Bool(!value.is_null())),
            (UnaryOp::ValueOrDefault, Value::Null) => Ok(self.default_of(node.result_type())),
            (UnaryOp::ValueOrDefault, value) => Ok(value),
            (UnaryOp::Convert, value) => {
                let target = self.types.non_nullable_form(node.result_type());
                Ok(match (self.types.get(target).as_deref(), value) {
                    (Some(AnyType::Primary(PrimaryType::Float)), Value::Int(i)) => {
                        Value::Float(i as f64)
                    }
                    (Some(AnyType::Primary(PrimaryType::Int)), Value::Float(x)) => {
                        Value::Int(x as i64)
                    }
                    (_, value) => value,
                })
            }
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnaryOp::Negate, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
            (UnaryOp::Negate, Value::Float(x)) => Ok(Value::Float(-x)),
            (UnaryOp::Not, other) => Err(type_error("bool", &other)),
            (UnaryOp::Negate, other) => Err(type_error("a number", &other)),
        }
    }

    fn evaluate_node(&mut self, node: &Node) -> Result<Value, EvalError> {
        match node.expr() {
            Expr::Constant(constant) => Ok(constant.value.clone()),
            Expr::Parameter(_) => self.lookup(node),
            Expr::Call(call) => {
                let mut values = Vec::with_capacity(call.arguments.len() + 1);
                if let Some(object) = &call.object {
                    values.push(self.evaluate(object)?);
                }
                values.extend(self.evaluate_all(&call.arguments.view())?);
                run_native(&call.method.name, call.method.body.as_ref(), &values)
            }
            Expr::New(new) => {
                let values = self.evaluate_all(&new.arguments.view())?;
                run_native(
                    &self.types.display(node.result_type()),
                    new.constructor.body.as_ref(),
                    &values,
                )
            }
            Expr::Invoke(invoke) => {
                let target = self.evaluate(&invoke.target)?;
                let values = self.evaluate_all(&invoke.arguments.view())?;
                self.invoke(target, values)
            }
            Expr::Dynamic(dynamic) => {
                let values = self.evaluate_all(&dynamic.arguments.view())?;
                run_native(&dynamic.binder.name, dynamic.binder.body.as_ref(), &values)
            }
            Expr::MemberAccess(access) => {
                let values = match &access.target {
                    Some(target) => vec![self.evaluate(target)?],
                    None => Vec::new(),
                };
                if !access.member.readable {
                    return Err(EvalError::NotExecutable {
                        what: format!("a read of write-only member `{}`", access.member.name),
                    });
                }
                run_native(&access.member.name, access.member.getter.as_ref(), &values)
            }
            Expr::Index(index) => {
                let mut values = vec![self.evaluate(&index.target)?];
                values.extend(self.evaluate_all(&index.arguments.view())?);
                match &index.indexer {
                    Some(indexer) if !indexer.readable => Err(EvalError::NotExecutable {
                        what: format!("a read of write-only indexer `{}`", indexer.name),
                    }),
                    Some(indexer) => run_native(&indexer.name, indexer.getter.as_ref(), &values),
                    None => match values.as_slice() {
                        [Value::Str(s), Value::Int(i)] => usize::try_from(*i)
                            .ok()
                            .and_then(|i| s.chars().nth(i))
                            .map(|c| Value::Str(c.to_string().into()))
                            .ok_or_else(|| EvalError::TypeError {
                                expected: "an index within bounds",
                                found: i.to_string(),
                            }),
                        _ => Err(EvalError::NotExecutable {
                            what: "built-in indexing of a non-string value".into(),
                        }),
                    },
                }
            }
            Expr::Binary(binary) => self.binary(node, binary),
            Expr::Unary(unary) => self.unary(node, unary.op, &unary.operand),
            Expr::Block(block) => {
                let mark = self.env.len();
                for variable in &block.variables {
                    let initial = self.default_of(variable.result_type());
                    self.env.push((variable.clone(), initial));
                }

                let mut result = Ok(Value::Unit);
                for expression in block.expressions.view().iter() {
                    result = self.evaluate(expression);
                    if result.is_err() {
                        break;
                    }
                }
                self.env.truncate(mark);
                result
            }
            Expr::Condition(cond) => {
                if self.evaluate_bool(&cond.test)? {
                    self.evaluate(&cond.if_true)
                } else {
                    self.evaluate(&cond.if_false)
                }
            }
            Expr::Assign(assign) => {
                if !assign.target.expr().is_parameter() {
                    return Err(EvalError::NotExecutable {
                        what: format!("an assignment to a {} node", assign.target.kind_name()),
                    });
                }
                let value = self.evaluate(&assign.value)?;
                self.store(&assign.target, value.clone())?;
                Ok(value)
            }
            Expr::Lambda(_) => Ok(Value::Closure(Arc::new(Closure {
                lambda: node.clone(),
                captured: self.env.iter().cloned().collect(),
            }))),
            Expr::Quote(quote) => Ok(Value::Tree(quote.operand.clone())),
        }
    }
}

impl Evaluator for Interpreter<'_> {
    fn evaluate(&mut self, node: &Node) -> Result<Value, EvalError> {
        if self.depth >= self.config.max_depth {
            return Err(EvalError::DepthExceeded {
                max: self.config.max_depth,
            });
        }

        trace!("Evaluating {} at depth {}", node.kind_name(), self.depth);
        self.depth += 1;
        let result = self.evaluate_node(node);
        self.depth -= 1;
        result
    }
}
