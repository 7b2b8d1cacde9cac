//! Expression Evaluator
//!
//! Walks an expression AST against a [`Scope`]. Evaluation is asynchronous:
//! identifiers may hold deferred values and functions may be asynchronous.
//! Independent operands (both sides of a binary operator, call arguments,
//! array elements) are evaluated concurrently.

use crate::EvalError;
use crate::ast::{Ast, AstNode, AstNodeKind, BinaryOp, LiteralValue, LogicalOp, NodeId, UnaryOp};
use crate::builtins;
use crate::parser::{ParseError, Parser};
use crate::scope::Scope;
use crate::token::Span;
use crate::value::{Function, Map, Value};
use futures_util::future::{self, FutureExt, LocalBoxFuture};
use std::cmp::Ordering;

/// A parsed template expression
#[derive(Debug)]
pub struct Expression {
    source: Box<str>,
    ast: Ast,
    root: NodeId,
}

impl Expression {
    /// Parse `source`; the whole input must be one expression
    pub fn parse(source: &str) -> Result<Self, EvalError> {
        let ast = Parser::new(source).parse()?;
        let root = ast.root().ok_or_else(|| {
            EvalError::Parse(ParseError {
                message: "empty expression".into(),
                span: Span::default(),
            })
        })?;
        Ok(Self {
            source: source.into(),
            ast,
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against `scope`, settling any deferred result
    pub async fn evaluate(&self, scope: &Scope) -> Result<Value, EvalError> {
        let evaluator = Evaluator {
            ast: &self.ast,
            source: &self.source,
            scope,
        };
        evaluator.value(self.root).await
    }
}

/// Parse and evaluate in one step
pub async fn evaluate(source: &str, scope: &Scope) -> Result<Value, EvalError> {
    Expression::parse(source)?.evaluate(scope).await
}

/// Intermediate result that remembers the receiver of a function read
/// through a member access or a scope identifier.
enum Evaluated {
    Value(Value),
    Bound { receiver: Value, function: Function },
}

impl Evaluated {
    fn into_value(self) -> Value {
        match self {
            Evaluated::Value(value) => value,
            Evaluated::Bound { function, .. } => Value::Function(function),
        }
    }

    fn bind(receiver: impl FnOnce() -> Value, value: Value) -> Self {
        match value {
            Value::Function(function) => Evaluated::Bound {
                receiver: receiver(),
                function,
            },
            other => Evaluated::Value(other),
        }
    }
}

type EvalFuture<'a> = LocalBoxFuture<'a, Result<Evaluated, EvalError>>;

#[derive(Clone, Copy)]
struct Evaluator<'a> {
    ast: &'a Ast,
    source: &'a str,
    scope: &'a Scope,
}

impl<'a> Evaluator<'a> {
    fn node(self, id: NodeId) -> Result<&'a AstNode, EvalError> {
        self.ast
            .get(id)
            .ok_or(EvalError::UnsupportedNode("dangling node reference"))
    }

    fn text(self, id: NodeId) -> String {
        self.ast.span(id).text(self.source).to_string()
    }

    async fn value(self, id: NodeId) -> Result<Value, EvalError> {
        Ok(self.eval(id).await?.into_value().resolve().await)
    }

    async fn values(self, ids: &'a [NodeId]) -> Result<Vec<Value>, EvalError> {
        future::try_join_all(ids.iter().map(|id| self.value(*id))).await
    }

    fn eval(self, id: NodeId) -> EvalFuture<'a> {
        async move {
            let node = self.node(id)?;
            match &node.kind {
                AstNodeKind::Identifier { name } => Ok(self.identifier(name).await),
                AstNodeKind::Literal { value } => Ok(Evaluated::Value(literal(value))),
                AstNodeKind::ArrayExpression { elements } => {
                    let items = future::try_join_all(elements.iter().map(|element| async move {
                        match element {
                            Some(id) => self.value(*id).await,
                            None => Ok(Value::Undefined),
                        }
                    }))
                    .await?;
                    Ok(Evaluated::Value(Value::from(items)))
                }
                AstNodeKind::UnaryExpression { operator, argument } => {
                    let argument = self.value(*argument).await?;
                    unary(*operator, &argument).map(Evaluated::Value)
                }
                AstNodeKind::BinaryExpression { operator, left, right } => {
                    let (left, right) = future::try_join(self.value(*left), self.value(*right)).await?;
                    binary(*operator, &left, &right).map(Evaluated::Value)
                }
                AstNodeKind::LogicalExpression { operator, left, right } => {
                    let left = self.value(*left).await?;
                    let settled = match operator {
                        LogicalOp::And => !left.is_truthy(),
                        LogicalOp::Or => left.is_truthy(),
                        LogicalOp::NullishCoalescing => !left.is_nullish(),
                    };
                    if settled {
                        Ok(Evaluated::Value(left))
                    } else {
                        self.eval(*right).await
                    }
                }
                AstNodeKind::ConditionalExpression { test, consequent, alternate } => {
                    if self.value(*test).await?.is_truthy() {
                        self.eval(*consequent).await
                    } else {
                        self.eval(*alternate).await
                    }
                }
                AstNodeKind::CallExpression { callee, arguments } => {
                    let (target, args) = future::try_join(self.eval(*callee), self.values(arguments)).await?;
                    let (receiver, function) = match target {
                        Evaluated::Bound { receiver, function } => (receiver, function),
                        Evaluated::Value(Value::Function(function)) => (Value::Undefined, function),
                        Evaluated::Value(_) => return Err(EvalError::NotCallable(self.text(*callee))),
                    };
                    let result = function.call(receiver, args).await?;
                    Ok(Evaluated::Value(result.resolve().await))
                }
                AstNodeKind::NewExpression { callee, arguments } => {
                    let (target, args) = future::try_join(self.value(*callee), self.values(arguments)).await?;
                    let Value::Function(function) = target else {
                        return Err(EvalError::NotCallable(self.text(*callee)));
                    };
                    Ok(Evaluated::Value(construct(function, args).await?))
                }
                AstNodeKind::MemberExpression { object, property, computed, optional } => {
                    let (object, key) = if *computed {
                        future::try_join(self.value(*object), self.value(*property)).await?
                    } else {
                        (self.value(*object).await?, Value::from(self.text(*property)))
                    };
                    if *optional && object.is_nullish() {
                        return Ok(Evaluated::Value(Value::Undefined));
                    }
                    let member = builtins::get_property(&object, &key)?.resolve().await;
                    Ok(Evaluated::bind(|| object, member))
                }
                AstNodeKind::SequenceExpression { expressions } => {
                    let mut values = self.values(expressions).await?;
                    Ok(Evaluated::Value(values.pop().unwrap_or_default()))
                }
                AstNodeKind::TemplateLiteral { quasis, expressions } => {
                    let values = self.values(expressions).await?;
                    let mut text = String::new();
                    for (i, quasi) in quasis.iter().enumerate() {
                        text.push_str(quasi);
                        if let Some(value) = values.get(i) {
                            text.push_str(&value.to_string());
                        }
                    }
                    Ok(Evaluated::Value(Value::from(text)))
                }
                other => Err(EvalError::UnsupportedNode(other.type_name())),
            }
        }
        .boxed_local()
    }

    /// Scope bindings first, then the built-in globals; unknown names are
    /// `undefined`. Functions found in scope receive the scope as receiver.
    async fn identifier(self, name: &str) -> Evaluated {
        let value = match self.scope.lookup(name) {
            Some(value) => value.resolve().await,
            None => builtins::global(name).unwrap_or_default(),
        };
        Evaluated::bind(|| self.scope.to_object(), value)
    }
}

fn literal(value: &LiteralValue) -> Value {
    match value {
        LiteralValue::Undefined => Value::Undefined,
        LiteralValue::Null => Value::Null,
        LiteralValue::Bool(b) => Value::Bool(*b),
        LiteralValue::Number(n) => Value::Number(*n),
        LiteralValue::String(s) => Value::from(&**s),
    }
}

/// `new function(args)`
///
/// Built-in constructors produce their native value. Any other function is
/// called with a fresh object receiver; an object-like result replaces the
/// receiver.
async fn construct(function: Function, args: Vec<Value>) -> Result<Value, EvalError> {
    if let Some(kind) = function.native_constructor() {
        return builtins::convert(kind, &args);
    }
    let receiver = Value::from(Map::new());
    let result = function.call(receiver.clone(), args).await?.resolve().await;
    Ok(match result {
        Value::Object(_) | Value::Array(_) | Value::Function(_) => result,
        _ => receiver,
    })
}

fn unary(operator: UnaryOp, argument: &Value) -> Result<Value, EvalError> {
    Ok(match operator {
        UnaryOp::Minus => Value::from(-argument.to_number()),
        UnaryOp::Plus => Value::from(argument.to_number()),
        UnaryOp::Not => Value::from(!argument.is_truthy()),
        UnaryOp::BitwiseNot => Value::from(!argument.to_int32()),
        UnaryOp::Typeof => Value::from(argument.type_of()),
        UnaryOp::Void | UnaryOp::Delete => return Err(EvalError::UnknownOperator(operator.as_str())),
    })
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left.to_primitive(), right.to_primitive()) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(&b)),
        (a, b) => a.to_number().partial_cmp(&b.to_number()),
    }
}

fn binary(operator: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let number = |f: fn(f64, f64) -> f64| Value::from(f(left.to_number(), right.to_number()));
    let int32 = |f: fn(i32, i32) -> i32| Value::from(f(left.to_int32(), right.to_int32()));
    let shift = right.to_uint32() & 31;

    Ok(match operator {
        BinaryOp::Add => {
            let (left, right) = (left.to_primitive(), right.to_primitive());
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                Value::from(format!("{left}{right}"))
            } else {
                Value::from(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => number(|a, b| a - b),
        BinaryOp::Mul => number(|a, b| a * b),
        BinaryOp::Div => number(|a, b| a / b),
        BinaryOp::Mod => number(|a, b| a % b),
        BinaryOp::Pow => number(|a, b| if b.is_nan() { f64::NAN } else { a.powf(b) }),
        BinaryOp::LessThan => Value::from(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::LessThanEq => Value::from(matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal))),
        BinaryOp::GreaterThan => Value::from(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::GreaterThanEq => {
            Value::from(matches!(compare(left, right), Some(Ordering::Greater | Ordering::Equal)))
        }
        BinaryOp::Equal => Value::from(left.loose_equals(right)),
        BinaryOp::NotEqual => Value::from(!left.loose_equals(right)),
        BinaryOp::StrictEqual => Value::from(left.strict_equals(right)),
        BinaryOp::StrictNotEqual => Value::from(!left.strict_equals(right)),
        BinaryOp::LeftShift => Value::from(left.to_int32().wrapping_shl(shift)),
        BinaryOp::RightShift => Value::from(left.to_int32() >> shift),
        BinaryOp::UnsignedRightShift => Value::from(left.to_uint32() >> shift),
        BinaryOp::BitwiseAnd => int32(|a, b| a & b),
        BinaryOp::BitwiseOr => int32(|a, b| a | b),
        BinaryOp::BitwiseXor => int32(|a, b| a ^ b),
        BinaryOp::In | BinaryOp::Instanceof => return Err(EvalError::UnknownOperator(operator.as_str())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Bindings;
    use std::cell::Cell;
    use std::rc::Rc;

    fn scope() -> Scope {
        let mut local = Bindings::new();
        local.insert("count".into(), Value::from(3));
        local.insert("name".into(), Value::from("Ada"));
        local.insert(
            "user".into(),
            [("first", Value::from("Grace")), ("age", Value::from(85))].into_iter().collect(),
        );
        local.insert("items".into(), Value::from(vec![Value::from("a"), Value::from("b")]));
        local.insert("empty".into(), Value::Null);
        let mut global = Bindings::new();
        global.insert("site".into(), Value::from("docs"));
        Scope::new(global, local)
    }

    fn eval(source: &str) -> Value {
        smol::block_on(evaluate(source, &scope())).unwrap()
    }

    fn eval_err(source: &str) -> EvalError {
        smol::block_on(evaluate(source, &scope())).unwrap_err()
    }

    // ========================================================================
    // Operators
    // ========================================================================

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), Value::from(7));
        assert_eq!(eval("(1 + 2) * 3"), Value::from(9));
        assert_eq!(eval("count % 2"), Value::from(1));
        assert_eq!(eval("2 ** 3 ** 2"), Value::from(512));
        assert_eq!(eval("-count + +'4'"), Value::from(1));
        assert_eq!(eval("7 / 2"), Value::from(3.5));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(eval("'n=' + count"), Value::from("n=3"));
        assert_eq!(eval("1 + 2 + 'x'"), Value::from("3x"));
        assert_eq!(eval("items + ''"), Value::from("a,b"));
    }

    #[test]
    fn test_comparison_and_equality() {
        assert_eq!(eval("count > 2"), Value::from(true));
        assert_eq!(eval("'a' < 'b'"), Value::from(true));
        assert_eq!(eval("count == '3'"), Value::from(true));
        assert_eq!(eval("count === '3'"), Value::from(false));
        assert_eq!(eval("empty == undefined"), Value::from(true));
        assert_eq!(eval("empty !== undefined"), Value::from(true));
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(eval("5 & 3"), Value::from(1));
        assert_eq!(eval("5 | 3"), Value::from(7));
        assert_eq!(eval("1 << 4"), Value::from(16));
        assert_eq!(eval("-1 >>> 28"), Value::from(15));
        assert_eq!(eval("~5"), Value::from(-6));
    }

    #[test]
    fn test_logical_short_circuit() {
        assert_eq!(eval("count > 1 && 'yes'"), Value::from("yes"));
        assert_eq!(eval("empty || 'fallback'"), Value::from("fallback"));
        assert_eq!(eval("empty ?? 'nullish'"), Value::from("nullish"));
        assert_eq!(eval("0 ?? 'nullish'"), Value::from(0));
        // right side would fail if evaluated
        assert_eq!(eval("true || empty.missing"), Value::from(true));
    }

    #[test]
    fn test_conditional() {
        assert_eq!(eval("count > 5 ? 'big' : 'small'"), Value::from("small"));
        assert_eq!(eval("typeof missing === 'undefined' ? 1 : 2"), Value::from(1));
    }

    // ========================================================================
    // Names, members and calls
    // ========================================================================

    #[test]
    fn test_identifier_resolution() {
        assert_eq!(eval("site"), Value::from("docs"));
        assert_eq!(eval("missing"), Value::Undefined);
        assert_eq!(eval("Math.PI > 3"), Value::from(true));
    }

    #[test]
    fn test_member_access() {
        assert_eq!(eval("user.first"), Value::from("Grace"));
        assert_eq!(eval("user['age'] + 1"), Value::from(86));
        assert_eq!(eval("items[1]"), Value::from("b"));
        assert_eq!(eval("items.length"), Value::from(2));
        assert_eq!(eval("user.nothing"), Value::Undefined);
        assert_eq!(eval("empty?.field"), Value::Undefined);
    }

    #[test]
    fn test_method_calls() {
        assert_eq!(eval("name.toUpperCase()"), Value::from("ADA"));
        assert_eq!(eval("items.join(' & ')"), Value::from("a & b"));
        assert_eq!(eval("Math.max(count, 10)"), Value::from(10));
        assert_eq!(eval("(12.345).toFixed(1)"), Value::from("12.3"));
        assert_eq!(eval("String(count) + Number('2')"), Value::from("32"));
    }

    #[test]
    fn test_new_expression() {
        assert_eq!(eval("new Array(3).length"), Value::from(3));
        assert_eq!(eval("new Array(1, 2).join()"), Value::from("1,2"));
    }

    #[test]
    fn test_template_literal() {
        assert_eq!(eval("`${name} has ${count + 1} items`"), Value::from("Ada has 4 items"));
        assert_eq!(eval("`plain`"), Value::from("plain"));
    }

    #[test]
    fn test_array_and_sequence() {
        assert_eq!(eval("[count, name]"), Value::from(vec![Value::from(3), Value::from("Ada")]));
        assert_eq!(eval("(1, 2, 3)"), Value::from(3));
    }

    #[test]
    fn test_scope_functions_receive_scope_as_receiver() {
        let scope = scope();
        scope.set_local(
            "inspect",
            Value::from(Function::native("inspect", |this, args| {
                let count = this.as_object().and_then(|map| map.get("count").cloned());
                Ok(Value::from(vec![count.unwrap_or_default(), args.first().cloned().unwrap_or_default()]))
            })),
        );
        let result = smol::block_on(evaluate("inspect('x')", &scope)).unwrap();
        assert_eq!(result, Value::from(vec![Value::from(3), Value::from("x")]));
    }

    #[test]
    fn test_user_constructor() {
        let scope = scope();
        scope.set_local(
            "Point",
            Value::from(Function::native("Point", |_, args| {
                Ok([("x", args.first().cloned().unwrap_or_default())].into_iter().collect())
            })),
        );
        scope.set_local("Plain", Value::from(Function::native("Plain", |_, _| Ok(Value::from(1)))));
        assert_eq!(smol::block_on(evaluate("new Point(4).x", &scope)).unwrap(), Value::from(4));
        assert_eq!(smol::block_on(evaluate("typeof new Plain()", &scope)).unwrap(), Value::from("object"));
    }

    // ========================================================================
    // Asynchronous values
    // ========================================================================

    #[test]
    fn test_deferred_bindings_are_awaited() {
        let scope = scope();
        scope.set_local("later", Value::deferred(async { Value::from(40) }));
        assert_eq!(smol::block_on(evaluate("later + 2", &scope)).unwrap(), Value::from(42));
    }

    #[test]
    fn test_async_function_results_are_awaited() {
        let scope = scope();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        scope.set_local(
            "fetch",
            Value::from(Function::new("fetch", move |_, args| {
                counter.set(counter.get() + 1);
                async move {
                    smol::future::yield_now().await;
                    Ok(Value::deferred(async move { args.into_iter().next().unwrap_or_default() }))
                }
            })),
        );
        let result = smol::block_on(evaluate("fetch('a') + fetch('b')", &scope)).unwrap();
        assert_eq!(result, Value::from("ab"));
        assert_eq!(calls.get(), 2);
    }

    // ========================================================================
    // Failures
    // ========================================================================

    #[test]
    fn test_failures() {
        assert!(matches!(eval_err("empty.field"), EvalError::Type(_)));
        assert!(matches!(eval_err("count()"), EvalError::NotCallable(name) if name == "count"));
        assert!(matches!(eval_err("'a' in user"), EvalError::UnknownOperator("in")));
        assert!(matches!(eval_err("void 0"), EvalError::UnknownOperator("void")));
        assert!(matches!(eval_err("this"), EvalError::UnsupportedNode("ThisExpression")));
        assert!(matches!(eval_err("count = 1"), EvalError::Parse(_)));
        assert!(matches!(eval_err("1 +"), EvalError::Parse(_)));
    }

    #[test]
    fn test_expression_reuse() {
        let expression = Expression::parse("count * 2").unwrap();
        assert_eq!(expression.source(), "count * 2");
        let first = scope();
        let second = scope();
        second.set_local("count", Value::from(10));
        assert_eq!(smol::block_on(expression.evaluate(&first)).unwrap(), Value::from(6));
        assert_eq!(smol::block_on(expression.evaluate(&second)).unwrap(), Value::from(20));
    }
}
