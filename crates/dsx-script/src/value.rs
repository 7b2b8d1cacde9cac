//! Values
//!
//! Dynamically typed values flowing through expressions, scopes and
//! server-script exports, with the coercion rules template authors expect
//! from JavaScript.

use crate::EvalError;
use futures_util::future::{FutureExt, LocalBoxFuture, Shared};
use indexmap::IndexMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

/// Ordered string-keyed map, used for objects and scope bindings
pub type Map = IndexMap<String, Value>;

/// Result of calling a [`Function`]
pub type CallResult = Result<Value, EvalError>;

type Callable = dyn Fn(Value, Vec<Value>) -> LocalBoxFuture<'static, CallResult>;

/// Built-in constructors with their own `new` behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeConstructor {
    Array,
    Object,
    String,
    Number,
    Boolean,
}

/// A callable value
///
/// The first argument passed to the callable is the receiver (`this`).
#[derive(Clone)]
pub struct Function {
    name: Rc<str>,
    call: Rc<Callable>,
    constructor: Option<NativeConstructor>,
}

impl Function {
    /// Wrap an asynchronous callable
    pub fn new<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn(Value, Vec<Value>) -> Fut + 'static,
        Fut: Future<Output = CallResult> + 'static,
    {
        Self {
            name: name.into(),
            call: Rc::new(move |this, args| f(this, args).boxed_local()),
            constructor: None,
        }
    }

    /// Wrap a synchronous callable
    pub fn native<F>(name: &str, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> CallResult + 'static,
    {
        Self {
            name: name.into(),
            call: Rc::new(move |this, args| {
                let result = f(&this, &args);
                async move { result }.boxed_local()
            }),
            constructor: None,
        }
    }

    pub(crate) fn with_constructor(mut self, constructor: NativeConstructor) -> Self {
        self.constructor = Some(constructor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn native_constructor(&self) -> Option<NativeConstructor> {
        self.constructor
    }

    /// Invoke with receiver `this`
    pub fn call(&self, this: Value, args: Vec<Value>) -> LocalBoxFuture<'static, CallResult> {
        (self.call)(this, args)
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.call, &other.call)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function {}]", self.name)
    }
}

/// A value that becomes available later
///
/// Every consumer awaiting the same deferred value observes the same result.
#[derive(Clone)]
pub struct Deferred(Shared<LocalBoxFuture<'static, Value>>);

impl Deferred {
    pub fn new(future: impl Future<Output = Value> + 'static) -> Self {
        Self(future.boxed_local().shared())
    }

    pub async fn get(&self) -> Value {
        self.0.clone().await
    }
}

/// Template value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<Map>),
    Function(Function),
    Deferred(Deferred),
}

impl Value {
    /// A value produced by `future`, resolved wherever it is read
    pub fn deferred(future: impl Future<Output = Value> + 'static) -> Self {
        Value::Deferred(Deferred::new(future))
    }

    /// Await deferred values until a settled value remains
    pub async fn resolve(self) -> Value {
        let mut value = self;
        loop {
            match value {
                Value::Deferred(deferred) => value = deferred.get().await,
                settled => return settled,
            }
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(function) => Some(function),
            _ => None,
        }
    }

    /// `typeof` result
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Deferred(_) => "object",
        }
    }

    /// Numeric conversion
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => parse_number(s),
            Value::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => single.to_number(),
                _ => f64::NAN,
            },
            _ => f64::NAN,
        }
    }

    pub fn to_int32(&self) -> i32 {
        self.to_uint32() as i32
    }

    pub fn to_uint32(&self) -> u32 {
        let n = self.to_number();
        if !n.is_finite() {
            return 0;
        }
        n.trunc().rem_euclid(4_294_967_296.0) as u32
    }

    /// Convert to a primitive for `+` and loose comparison
    pub fn to_primitive(&self) -> Value {
        match self {
            Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Deferred(_) => {
                Value::from(self.to_string())
            }
            other => other.clone(),
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Undefined | Null, Undefined | Null) => true,
            (Undefined | Null, _) | (_, Undefined | Null) => false,
            (Number(_), String(_)) | (String(_), Number(_)) => self.to_number() == other.to_number(),
            (Bool(_), _) => Number(self.to_number()).loose_equals(other),
            (_, Bool(_)) => self.loose_equals(&Number(other.to_number())),
            (Array(_) | Object(_) | Function(_), String(_) | Number(_)) => {
                self.to_primitive().loose_equals(other)
            }
            (String(_) | Number(_), Array(_) | Object(_) | Function(_)) => {
                self.loose_equals(&other.to_primitive())
            }
            _ => self.strict_equals(other),
        }
    }
}

/// JavaScript string-to-number conversion
fn parse_number(text: &str) -> f64 {
    let text = text.trim();
    if text.is_empty() {
        return 0.0;
    }
    let (sign, unsigned) = match text.as_bytes()[0] {
        b'-' => (-1.0, &text[1..]),
        b'+' => (1.0, &text[1..]),
        _ => (1.0, text),
    };
    if unsigned == "Infinity" {
        return sign * f64::INFINITY;
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    // Rust accepts "inf" and "nan", JavaScript does not
    if !unsigned.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')) {
        return f64::NAN;
    }
    text.parse::<f64>().unwrap_or(f64::NAN)
}

/// JavaScript number-to-string conversion
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    if n == 0.0 {
        return "0".into();
    }
    let magnitude = n.abs();
    if !(1e-6..1e21).contains(&magnitude) {
        let formatted = format!("{n:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => format!("{mantissa}e+{exponent}"),
            _ => formatted,
        };
    }
    if n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    /// JavaScript string conversion
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if !item.is_nullish() {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Function(function) => write!(f, "function {}() {{ [native code] }}", function.name()),
            Value::Deferred(_) => f.write_str("[object Promise]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "{:?}", &**s),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Function(function) => write!(f, "{function:?}"),
            Value::Deferred(_) => f.write_str("[Deferred]"),
        }
    }
}

/// Structural equality
///
/// Arrays and objects compare element-wise. The `===` operator uses
/// [`Value::strict_equals`] instead.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => self.strict_equals(other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Object(Rc::new(map))
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Value::Function(function)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::from(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect::<Map>(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(Value::from(3.0).to_string(), "3");
        assert_eq!(Value::from(0.5).to_string(), "0.5");
        assert_eq!(Value::from(-12.25).to_string(), "-12.25");
        assert_eq!(Value::from(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::from(f64::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(Value::from(1e21).to_string(), "1e+21");
        assert_eq!(Value::from(-0.0).to_string(), "0");
    }

    #[test]
    fn test_string_conversion() {
        let list = Value::from(vec![Value::from(1), Value::Null, Value::from("x")]);
        assert_eq!(list.to_string(), "1,,x");
        assert_eq!(Value::from(Map::new()).to_string(), "[object Object]");
        assert_eq!(Value::Undefined.to_string(), "undefined");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from(f64::NAN).is_truthy());
        assert!(Value::from(Vec::new()).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Value::from(" 42 ").to_number(), 42.0);
        assert_eq!(Value::from("").to_number(), 0.0);
        assert_eq!(Value::from("0x1f").to_number(), 31.0);
        assert!(Value::from("inf").to_number().is_nan());
        assert!(Value::from("12px").to_number().is_nan());
        assert_eq!(Value::from("-Infinity").to_number(), f64::NEG_INFINITY);
        assert_eq!(Value::Bool(true).to_number(), 1.0);
        assert_eq!(Value::from(vec![Value::from("7")]).to_number(), 7.0);
    }

    #[test]
    fn test_int32_wrapping() {
        assert_eq!(Value::from(4_294_967_297.0).to_int32(), 1);
        assert_eq!(Value::from(-1).to_uint32(), u32::MAX);
        assert_eq!(Value::from(2_147_483_648.0).to_int32(), i32::MIN);
    }

    #[test]
    fn test_equality() {
        assert!(Value::from(1).loose_equals(&Value::from("1")));
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.loose_equals(&Value::from(0)));
        assert!(Value::Bool(true).loose_equals(&Value::from(1)));
        assert!(!Value::from(1).strict_equals(&Value::from("1")));

        let list = Value::from(vec![Value::from(1)]);
        assert!(list.strict_equals(&list.clone()));
        assert!(!list.strict_equals(&Value::from(vec![Value::from(1)])));
        assert_eq!(list, Value::from(vec![Value::from(1)]));
    }

    #[test]
    fn test_type_of() {
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::from(Function::native("f", |_, _| Ok(Value::Undefined))).type_of(), "function");
        assert_eq!(Value::from("s").type_of(), "string");
    }

    #[test]
    fn test_deferred_resolution() {
        let value = Value::deferred(async { Value::deferred(async { Value::from(5) }) });
        let shared = value.clone();
        assert_eq!(smol::block_on(value.resolve()), Value::from(5));
        assert_eq!(smol::block_on(shared.resolve()), Value::from(5));
    }
}
