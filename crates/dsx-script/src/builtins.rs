//! Built-in Objects
//!
//! The fallback globals visible to every expression (`Math` and the
//! primitive constructors) and the members of primitive values.

use crate::EvalError;
use crate::value::{CallResult, Function, Map, NativeConstructor, Value};
use std::rc::Rc;

/// Longest array `new Array(n)` will allocate
const MAX_ARRAY_LENGTH: usize = 1 << 20;

/// Longest string `repeat` will build, in bytes
const MAX_REPEAT_BYTES: usize = 1 << 24;

thread_local! {
    static MATH: Value = math_object();
}

/// Global names resolved after scope lookup fails
pub fn global(name: &str) -> Option<Value> {
    let value = match name {
        "Math" => MATH.with(Value::clone),
        "Array" => constructor("Array", NativeConstructor::Array),
        "Object" => constructor("Object", NativeConstructor::Object),
        "String" => constructor("String", NativeConstructor::String),
        "Number" => constructor("Number", NativeConstructor::Number),
        "Boolean" => constructor("Boolean", NativeConstructor::Boolean),
        "NaN" => Value::Number(f64::NAN),
        "Infinity" => Value::Number(f64::INFINITY),
        "parseInt" => Value::from(Function::native("parseInt", |_, args| {
            let radix = match arg(args, 1) {
                Value::Undefined => 0,
                radix => radix.to_int32() as u32,
            };
            Ok(Value::from(parse_int(&arg(args, 0).to_string(), radix)))
        })),
        "parseFloat" => Value::from(Function::native("parseFloat", |_, args| {
            Ok(Value::from(parse_float(&arg(args, 0).to_string())))
        })),
        "isNaN" => Value::from(Function::native("isNaN", |_, args| {
            Ok(Value::from(arg(args, 0).to_number().is_nan()))
        })),
        _ => return None,
    };
    Some(value)
}

fn constructor(name: &str, kind: NativeConstructor) -> Value {
    Value::from(Function::native(name, move |_, args| convert(kind, args)).with_constructor(kind))
}

/// `Kind(args)` and `new Kind(args)` for the built-in constructors.
/// Primitive constructors produce primitives, never wrapper objects.
pub fn convert(kind: NativeConstructor, args: &[Value]) -> CallResult {
    Ok(match kind {
        NativeConstructor::Array => match args {
            [Value::Number(n)] => {
                if n.fract() != 0.0 || *n < 0.0 || *n > f64::from(u32::MAX) {
                    return Err(EvalError::Type("invalid array length".into()));
                }
                let length = *n as usize;
                if length > MAX_ARRAY_LENGTH {
                    return Err(EvalError::Type(format!("array length {length} exceeds {MAX_ARRAY_LENGTH}")));
                }
                Value::from(vec![Value::Undefined; length])
            }
            _ => Value::from(args.to_vec()),
        },
        NativeConstructor::Object => match args.first() {
            Some(value @ (Value::Object(_) | Value::Array(_) | Value::Function(_))) => value.clone(),
            _ => Value::from(Map::new()),
        },
        NativeConstructor::String => match args.first() {
            Some(value) => Value::from(value.to_string()),
            None => Value::from(""),
        },
        NativeConstructor::Number => Value::from(args.first().map_or(0.0, Value::to_number)),
        NativeConstructor::Boolean => Value::from(args.first().is_some_and(Value::is_truthy)),
    })
}

fn arg(args: &[Value], index: usize) -> &Value {
    const UNDEFINED: &Value = &Value::Undefined;
    args.get(index).unwrap_or(UNDEFINED)
}

fn number_arg(args: &[Value], index: usize) -> Option<f64> {
    match arg(args, index) {
        Value::Undefined => None,
        value => Some(value.to_number()),
    }
}

/// Read `object[key]`
pub fn get_property(object: &Value, key: &Value) -> CallResult {
    let name = key.to_string();
    let value = match object {
        Value::Undefined | Value::Null => {
            return Err(EvalError::Type(format!(
                "cannot read properties of {object} (reading '{name}')"
            )));
        }
        Value::Object(map) => map.get(&name).cloned(),
        Value::Array(items) => match name.as_str() {
            "length" => Some(Value::from(items.len())),
            _ => match array_index(&name) {
                Some(index) => items.get(index).cloned(),
                None => array_method(&name),
            },
        },
        Value::String(text) => match name.as_str() {
            "length" => Some(Value::from(text.chars().count())),
            _ => match array_index(&name) {
                Some(index) => text.chars().nth(index).map(|c| Value::from(c.to_string())),
                None => string_method(&name),
            },
        },
        Value::Number(_) => number_method(&name),
        Value::Bool(_) => match name.as_str() {
            "toString" | "valueOf" => Some(Value::from(Function::native(&name, |this, _| {
                Ok(Value::from(this.to_string()))
            }))),
            _ => None,
        },
        Value::Function(function) => match name.as_str() {
            "name" => Some(Value::from(function.name())),
            _ => function.native_constructor().and_then(|kind| static_member(kind, &name)),
        },
        Value::Deferred(_) => None,
    };
    Ok(value.unwrap_or_default())
}

fn array_index(name: &str) -> Option<usize> {
    let index = name.parse::<usize>().ok()?;
    (index.to_string() == name).then_some(index)
}

/// Resolve a relative index the way `slice` does
fn relative_index(value: Option<f64>, len: usize, default: usize) -> usize {
    match value {
        None => default,
        Some(n) if n.is_nan() => 0,
        Some(n) if n < 0.0 => (len as f64 + n.trunc()).max(0.0) as usize,
        Some(n) => n.trunc().min(len as f64) as usize,
    }
}

fn method(name: &str, f: fn(&Value, &[Value]) -> CallResult) -> Option<Value> {
    Some(Value::from(Function::native(name, f)))
}

fn text_of(this: &Value) -> String {
    this.to_string()
}

fn string_method(name: &str) -> Option<Value> {
    match name {
        "toUpperCase" => method(name, |this, _| Ok(Value::from(text_of(this).to_uppercase()))),
        "toLowerCase" => method(name, |this, _| Ok(Value::from(text_of(this).to_lowercase()))),
        "trim" => method(name, |this, _| Ok(Value::from(text_of(this).trim()))),
        "trimStart" => method(name, |this, _| Ok(Value::from(text_of(this).trim_start()))),
        "trimEnd" => method(name, |this, _| Ok(Value::from(text_of(this).trim_end()))),
        "toString" | "valueOf" => method(name, |this, _| Ok(Value::from(text_of(this)))),
        "charAt" => method(name, |this, args| {
            let index = number_arg(args, 0).unwrap_or(0.0);
            let c = (index >= 0.0)
                .then(|| text_of(this).chars().nth(index as usize))
                .flatten();
            Ok(Value::from(c.map(String::from).unwrap_or_default()))
        }),
        "indexOf" => method(name, |this, args| {
            let text = text_of(this);
            let needle = arg(args, 0).to_string();
            let position = text.find(needle.as_str()).map(|byte| text[..byte].chars().count());
            Ok(Value::from(position.map_or(-1.0, |p| p as f64)))
        }),
        "includes" => method(name, |this, args| {
            Ok(Value::from(text_of(this).contains(arg(args, 0).to_string().as_str())))
        }),
        "startsWith" => method(name, |this, args| {
            Ok(Value::from(text_of(this).starts_with(arg(args, 0).to_string().as_str())))
        }),
        "endsWith" => method(name, |this, args| {
            Ok(Value::from(text_of(this).ends_with(arg(args, 0).to_string().as_str())))
        }),
        "slice" => method(name, |this, args| {
            let chars: Vec<char> = text_of(this).chars().collect();
            let start = relative_index(number_arg(args, 0), chars.len(), 0);
            let end = relative_index(number_arg(args, 1), chars.len(), chars.len());
            Ok(Value::from(chars.get(start..end.max(start)).unwrap_or_default().iter().collect::<String>()))
        }),
        "substring" => method(name, |this, args| {
            let chars: Vec<char> = text_of(this).chars().collect();
            let clamp = |n: Option<f64>, default: usize| match n {
                None => default,
                Some(n) if n.is_nan() || n < 0.0 => 0,
                Some(n) => (n as usize).min(chars.len()),
            };
            let a = clamp(number_arg(args, 0), 0);
            let b = clamp(number_arg(args, 1), chars.len());
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            Ok(Value::from(chars[start..end].iter().collect::<String>()))
        }),
        "split" => method(name, |this, args| {
            let text = text_of(this);
            let parts: Vec<Value> = match arg(args, 0) {
                Value::Undefined => vec![Value::from(text)],
                separator => {
                    let separator = separator.to_string();
                    if separator.is_empty() {
                        text.chars().map(|c| Value::from(c.to_string())).collect()
                    } else {
                        text.split(separator.as_str()).map(Value::from).collect()
                    }
                }
            };
            Ok(Value::from(parts))
        }),
        "replace" => method(name, |this, args| {
            let text = text_of(this);
            let pattern = arg(args, 0).to_string();
            let replacement = arg(args, 1).to_string();
            Ok(Value::from(text.replacen(pattern.as_str(), &replacement, 1)))
        }),
        "replaceAll" => method(name, |this, args| {
            let text = text_of(this);
            let pattern = arg(args, 0).to_string();
            Ok(Value::from(text.replace(pattern.as_str(), &arg(args, 1).to_string())))
        }),
        "repeat" => method(name, |this, args| {
            let count = number_arg(args, 0).unwrap_or(0.0);
            if !(0.0..=f64::from(u16::MAX)).contains(&count) {
                return Err(EvalError::Type("invalid count value".into()));
            }
            let text = text_of(this);
            if text.len().saturating_mul(count as usize) > MAX_REPEAT_BYTES {
                return Err(EvalError::Type("repeated string too long".into()));
            }
            Ok(Value::from(text.repeat(count as usize)))
        }),
        _ => None,
    }
}

fn items_of(this: &Value) -> Rc<Vec<Value>> {
    match this {
        Value::Array(items) => Rc::clone(items),
        _ => Rc::default(),
    }
}

fn array_method(name: &str) -> Option<Value> {
    match name {
        "join" => method(name, |this, args| {
            let separator = match arg(args, 0) {
                Value::Undefined => ",".to_string(),
                separator => separator.to_string(),
            };
            let parts: Vec<String> = items_of(this)
                .iter()
                .map(|item| if item.is_nullish() { String::new() } else { item.to_string() })
                .collect();
            Ok(Value::from(parts.join(&separator)))
        }),
        "indexOf" => method(name, |this, args| {
            let needle = arg(args, 0);
            let position = items_of(this).iter().position(|item| item.strict_equals(needle));
            Ok(Value::from(position.map_or(-1.0, |p| p as f64)))
        }),
        "includes" => method(name, |this, args| {
            let needle = arg(args, 0);
            Ok(Value::from(items_of(this).iter().any(|item| {
                item.strict_equals(needle) || matches!((item, needle), (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan())
            })))
        }),
        "slice" => method(name, |this, args| {
            let items = items_of(this);
            let start = relative_index(number_arg(args, 0), items.len(), 0);
            let end = relative_index(number_arg(args, 1), items.len(), items.len());
            Ok(Value::from(items.get(start..end.max(start)).unwrap_or_default().to_vec()))
        }),
        "concat" => method(name, |this, args| {
            let mut items = items_of(this).to_vec();
            for value in args {
                match value {
                    Value::Array(more) => items.extend(more.iter().cloned()),
                    other => items.push(other.clone()),
                }
            }
            Ok(Value::from(items))
        }),
        "reverse" => method(name, |this, _| {
            Ok(Value::from(items_of(this).iter().rev().cloned().collect::<Vec<_>>()))
        }),
        "toString" => method(name, |this, _| Ok(Value::from(this.to_string()))),
        _ => None,
    }
}

fn number_method(name: &str) -> Option<Value> {
    match name {
        "toFixed" => method(name, |this, args| {
            let digits = number_arg(args, 0).unwrap_or(0.0);
            if !(0.0..=100.0).contains(&digits) {
                return Err(EvalError::Type("toFixed() digits argument must be between 0 and 100".into()));
            }
            let n = this.to_number();
            if !n.is_finite() {
                return Ok(Value::from(this.to_string()));
            }
            Ok(Value::from(format!("{:.*}", digits as usize, n)))
        }),
        "toString" => method(name, |this, args| {
            let n = this.to_number();
            match number_arg(args, 0) {
                None => Ok(Value::from(this.to_string())),
                Some(radix) if radix == 10.0 => Ok(Value::from(this.to_string())),
                Some(radix) if (2.0..=36.0).contains(&radix) && n.fract() == 0.0 && n.is_finite() => {
                    Ok(Value::from(integer_to_radix(n, radix as u32)))
                }
                Some(_) => Err(EvalError::Type("toString() radix must be between 2 and 36".into())),
            }
        }),
        "valueOf" => method(name, |this, _| Ok(Value::from(this.to_number()))),
        _ => None,
    }
}

fn integer_to_radix(n: f64, radix: u32) -> String {
    let mut magnitude = n.abs() as u64;
    let mut digits = Vec::new();
    loop {
        let digit = (magnitude % u64::from(radix)) as u32;
        digits.push(char::from_digit(digit, radix).unwrap_or('0'));
        magnitude /= u64::from(radix);
        if magnitude == 0 {
            break;
        }
    }
    if n < 0.0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

fn static_member(kind: NativeConstructor, name: &str) -> Option<Value> {
    match (kind, name) {
        (NativeConstructor::Array, "isArray") => method(name, |_, args| {
            Ok(Value::from(matches!(arg(args, 0), Value::Array(_))))
        }),
        (NativeConstructor::Object, "keys") => method(name, |_, args| {
            Ok(Value::from(entries_of(arg(args, 0)).into_iter().map(|(k, _)| Value::from(k)).collect::<Vec<_>>()))
        }),
        (NativeConstructor::Object, "values") => method(name, |_, args| {
            Ok(Value::from(entries_of(arg(args, 0)).into_iter().map(|(_, v)| v).collect::<Vec<_>>()))
        }),
        (NativeConstructor::Object, "entries") => method(name, |_, args| {
            let pairs = entries_of(arg(args, 0))
                .into_iter()
                .map(|(k, v)| Value::from(vec![Value::from(k), v]))
                .collect::<Vec<_>>();
            Ok(Value::from(pairs))
        }),
        (NativeConstructor::Number, "isInteger") => method(name, |_, args| {
            Ok(Value::from(matches!(arg(args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0)))
        }),
        (NativeConstructor::Number, "isFinite") => method(name, |_, args| {
            Ok(Value::from(matches!(arg(args, 0), Value::Number(n) if n.is_finite())))
        }),
        _ => None,
    }
}

/// Own enumerable entries of an object or array
pub fn entries_of(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Value::Array(items) => items.iter().enumerate().map(|(i, v)| (i.to_string(), v.clone())).collect(),
        _ => Vec::new(),
    }
}

fn math_object() -> Value {
    let mut math = Map::new();
    math.insert("PI".into(), Value::from(std::f64::consts::PI));
    math.insert("E".into(), Value::from(std::f64::consts::E));
    math.insert("LN2".into(), Value::from(std::f64::consts::LN_2));
    math.insert("LN10".into(), Value::from(std::f64::consts::LN_10));
    math.insert("SQRT2".into(), Value::from(std::f64::consts::SQRT_2));

    let unary: [(&str, fn(f64) -> f64); 13] = [
        ("abs", f64::abs),
        ("ceil", f64::ceil),
        ("floor", f64::floor),
        ("round", |x| (x + 0.5).floor()),
        ("trunc", f64::trunc),
        ("sign", |x| if x == 0.0 || x.is_nan() { x } else { x.signum() }),
        ("sqrt", f64::sqrt),
        ("cbrt", f64::cbrt),
        ("log", f64::ln),
        ("log2", f64::log2),
        ("log10", f64::log10),
        ("exp", f64::exp),
        ("sin", f64::sin),
    ];
    for (name, f) in unary {
        let function = Function::native(name, move |_, args| {
            Ok(Value::from(f(number_arg(args, 0).unwrap_or(f64::NAN))))
        });
        math.insert(name.into(), Value::from(function));
    }

    math.insert(
        "pow".into(),
        Value::from(Function::native("pow", |_, args| {
            Ok(Value::from(arg(args, 0).to_number().powf(arg(args, 1).to_number())))
        })),
    );
    math.insert(
        "min".into(),
        Value::from(Function::native("min", |_, args| {
            Ok(Value::from(fold_numbers(args, f64::INFINITY, f64::min)))
        })),
    );
    math.insert(
        "max".into(),
        Value::from(Function::native("max", |_, args| {
            Ok(Value::from(fold_numbers(args, f64::NEG_INFINITY, f64::max)))
        })),
    );

    Value::from(math)
}

/// Fold numeric arguments, any NaN poisoning the result
fn fold_numbers(args: &[Value], initial: f64, f: fn(f64, f64) -> f64) -> f64 {
    args.iter().map(Value::to_number).try_fold(initial, |acc, n| {
        if n.is_nan() { None } else { Some(f(acc, n)) }
    }).unwrap_or(f64::NAN)
}

fn parse_int(text: &str, radix: u32) -> f64 {
    let text = text.trim_start();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (radix, text) = match (radix, text.get(..2)) {
        (0 | 16, Some("0x" | "0X")) => (16, &text[2..]),
        (0, _) => (10, text),
        (radix, _) => (radix, text),
    };
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: Vec<u32> = text.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let magnitude = digits.iter().fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(*d));
    if negative { -magnitude } else { magnitude }
}

fn parse_float(text: &str) -> f64 {
    let text = text.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exponent = false;
    let bytes = text.as_bytes();
    while end < bytes.len() {
        let b = bytes[end];
        let accept = match b {
            b'0'..=b'9' => true,
            b'+' | b'-' => end == 0 || matches!(bytes[end - 1], b'e' | b'E'),
            b'.' if !seen_dot && !seen_exponent => {
                seen_dot = true;
                true
            }
            b'e' | b'E' if !seen_exponent && end > 0 => {
                seen_exponent = true;
                true
            }
            _ => false,
        };
        if !accept {
            break;
        }
        end += 1;
    }
    // back off to the longest prefix that parses
    (1..=end)
        .rev()
        .find_map(|len| text[..len].parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}
