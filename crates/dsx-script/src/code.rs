//! Server Scripts
//!
//! Runs module server scripts in an embedded QuickJS context. A script sees
//! the scope bindings it mentions as ordinary variables and contributes
//! whatever ends up in `module.exports` (or on `exports`).
//!
//! Which bindings to inject is decided by a lexical scan of the script. Scan
//! results are cached per source text for the life of the process.

use crate::EvalError;
use crate::console;
use crate::lexer::Lexer;
use crate::scope::Scope;
use crate::token::TokenKind;
use crate::value::{CallResult, Function, Map, Value};
use futures_util::FutureExt;
use indexmap::IndexSet;
use lru::LruCache;
use rquickjs::function::{Rest, This};
use rquickjs::{CatchResultExt, Context, Ctx, Exception, Object, Persistent, Promise, Runtime};
use std::cell::{OnceCell, RefCell};
use std::fmt::{self, Write};
use std::num::NonZeroUsize;
use std::rc::Rc;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

const ANALYSIS_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(20) {
    Some(size) => size,
    None => NonZeroUsize::MIN,
};

/// Heap limit of the script runtime
const MEMORY_LIMIT: usize = 32 * 1024 * 1024;

/// Nesting depth beyond which exported data is cut off
const MAX_CONVERSION_DEPTH: usize = 64;

/// Names the wrapper itself defines
const RESERVED_NAMES: [&str; 3] = ["module", "exports", "__context"];

/// FIFO cache of identifier scans: entries are read with `peek`, which
/// leaves insertion order untouched.
static ANALYSIS_CACHE: LazyLock<Mutex<LruCache<String, Arc<[String]>>>> =
    LazyLock::new(|| Mutex::new(LruCache::new(ANALYSIS_CACHE_SIZE)));

fn analysis_cache() -> MutexGuard<'static, LruCache<String, Arc<[String]>>> {
    ANALYSIS_CACHE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Identifiers a script may read from its scope
///
/// Over-approximates: every identifier token not preceded by `.` counts,
/// except the names the wrapper defines. String, template and regular
/// expression literals are skipped. `import`/`export` are rejected.
pub fn referenced_names(source: &str) -> Result<Arc<[String]>, EvalError> {
    if let Some(names) = analysis_cache().peek(source) {
        return Ok(Arc::clone(names));
    }
    let names: Arc<[String]> = scan_names(source)?.into_iter().collect();
    analysis_cache().put(source.to_string(), Arc::clone(&names));
    Ok(names)
}

fn scan_names(source: &str) -> Result<IndexSet<String>, EvalError> {
    let mut lexer = Lexer::new(source);
    let mut names = IndexSet::new();
    let mut after_dot = false;
    let mut regex_allowed = true;
    // brace depth at each open template substitution
    let mut templates: Vec<usize> = Vec::new();
    let mut depth = 0usize;

    loop {
        let mut token = lexer.next_token();
        let opens_regex = matches!(token.kind, TokenKind::Slash | TokenKind::CompoundEq)
            && token.span.text(source).starts_with('/');
        if opens_regex && regex_allowed {
            token = lexer.continue_regex(token.span.start);
        }
        match &token.kind {
            TokenKind::Eof => break,
            TokenKind::Import | TokenKind::Export if !after_dot => {
                return Err(EvalError::Script(format!(
                    "unsupported module syntax `{}`",
                    token.span.text(source)
                )));
            }
            TokenKind::Identifier(name) if !after_dot && !RESERVED_NAMES.contains(&&**name) => {
                names.insert(name.to_string());
            }
            TokenKind::TemplateHead(_) => templates.push(depth),
            TokenKind::LBrace => depth += 1,
            TokenKind::RBrace if templates.last() == Some(&depth) => {
                token = lexer.continue_template(token.span.start);
                if !matches!(token.kind, TokenKind::TemplateMiddle(_)) {
                    templates.pop();
                }
            }
            TokenKind::RBrace => depth = depth.saturating_sub(1),
            _ => {}
        }
        after_dot = matches!(token.kind, TokenKind::Dot | TokenKind::QuestionDot);
        regex_allowed = token.kind.allows_regex();
    }

    Ok(names)
}

fn wrap_source<'n>(source: &str, names: impl IntoIterator<Item = &'n str>) -> String {
    let mut wrapper = String::from(
        "(async function(__context) {\n  let exports = {};\n  let module = { exports: exports };\n",
    );
    for name in names {
        let _ = writeln!(wrapper, "  let {name} = __context[\"{name}\"];");
    }
    wrapper.push_str("  await (async function() {\n");
    wrapper.push_str(source);
    wrapper.push_str("\n  })();\n  return module.exports;\n})");
    wrapper
}

fn script_error(error: impl fmt::Display) -> EvalError {
    EvalError::Script(error.to_string())
}

/// Server-script evaluator
///
/// The QuickJS runtime is created on first use and shared by every script
/// of a compilation. Functions exported by one script stay callable from
/// template expressions and from later scripts.
#[derive(Default)]
pub struct CodeEvaluator {
    engine: OnceCell<Result<Engine, String>>,
}

impl CodeEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn engine(&self) -> Result<&Engine, EvalError> {
        self.engine
            .get_or_init(Engine::new)
            .as_ref()
            .map_err(|error| EvalError::Script(error.clone()))
    }

    /// Run `source` and return its exports. Failures are logged and give
    /// no exports.
    pub async fn evaluate(&self, source: &str, scope: &Scope) -> Map {
        match self.try_evaluate(source, scope).await {
            Ok(exports) => exports,
            Err(error) => {
                tracing::warn!(%error, "server script failed");
                Map::new()
            }
        }
    }

    /// Run `source` and return its exports
    pub async fn try_evaluate(&self, source: &str, scope: &Scope) -> Result<Map, EvalError> {
        let names = referenced_names(source)?;
        let mut bindings = Vec::with_capacity(names.len());
        for name in names.iter() {
            if let Some(value) = scope.lookup(name) {
                bindings.push((name.as_str(), value.resolve().await));
            }
        }
        tracing::trace!(injected = bindings.len(), "running server script");
        self.engine()?.run(source, &bindings)
    }
}

struct Engine {
    // dropped before the context that owns their runtime
    functions: RefCell<Vec<(Function, Persistent<rquickjs::Function<'static>>)>>,
    context: Context,
    runtime: Runtime,
}

impl Engine {
    fn new() -> Result<Self, String> {
        let runtime = Runtime::new().map_err(|e| e.to_string())?;
        runtime.set_memory_limit(MEMORY_LIMIT);
        let context = Context::full(&runtime).map_err(|e| e.to_string())?;
        context
            .with(|ctx| console::install_console(&ctx))
            .map_err(|e| e.to_string())?;
        tracing::debug!("server script runtime ready");
        Ok(Self {
            functions: RefCell::default(),
            context,
            runtime,
        })
    }

    fn run(&self, source: &str, bindings: &[(&str, Value)]) -> Result<Map, EvalError> {
        let wrapper = wrap_source(source, bindings.iter().map(|(name, _)| *name));

        let result = self.context.with(|ctx| {
            let entry: rquickjs::Function = ctx.eval(wrapper).catch(&ctx).map_err(script_error)?;
            let injected = Object::new(ctx.clone()).map_err(script_error)?;
            for (name, value) in bindings {
                let value = to_js(&ctx, value, Some(self)).map_err(script_error)?;
                injected.set(*name, value).map_err(script_error)?;
            }
            let promise: Promise = entry.call((injected,)).catch(&ctx).map_err(script_error)?;
            let exports: rquickjs::Value = promise.finish().catch(&ctx).map_err(script_error)?;

            match from_js(&ctx, Some(self), exports, 0)? {
                Value::Object(map) => Ok(Rc::unwrap_or_clone(map)),
                Value::Undefined | Value::Null => Ok(Map::new()),
                other => Err(EvalError::Script(format!(
                    "module.exports must be an object, got {}",
                    other.type_of()
                ))),
            }
        });

        self.runtime.run_gc();
        result
    }

    /// Wrap a script function as a template value
    fn adopt<'js>(&self, ctx: &Ctx<'js>, function: rquickjs::Function<'js>) -> Value {
        let persistent = Persistent::save(ctx, function);
        let callee = Rc::new(ScriptFunction {
            function: persistent.clone(),
            context: self.context.clone(),
        });
        let wrapped = Function::native("script", move |this, args| callee.call(this, args));
        self.functions.borrow_mut().push((wrapped.clone(), persistent));
        Value::Function(wrapped)
    }

    /// The script function behind a value produced by [`Engine::adopt`]
    fn script_function<'js>(&self, ctx: &Ctx<'js>, function: &Function) -> Option<rquickjs::Function<'js>> {
        let functions = self.functions.borrow();
        let (_, persistent) = functions.iter().find(|(known, _)| known.ptr_eq(function))?;
        persistent.clone().restore(ctx).ok()
    }
}

/// A script function called from outside the script runtime
struct ScriptFunction {
    function: Persistent<rquickjs::Function<'static>>,
    context: Context,
}

impl ScriptFunction {
    fn call(&self, this: &Value, args: &[Value]) -> CallResult {
        self.context.with(|ctx| {
            let function = self.function.clone().restore(&ctx).map_err(script_error)?;
            let this = to_js(&ctx, this, None).map_err(script_error)?;
            let args = args
                .iter()
                .map(|arg| to_js(&ctx, arg, None))
                .collect::<rquickjs::Result<Vec<_>>>()
                .map_err(script_error)?;
            let result: rquickjs::Value = function
                .call((This(this), Rest(args)))
                .catch(&ctx)
                .map_err(script_error)?;
            from_js(&ctx, None, result, 0)
        })
    }
}

/// Convert a template value for the script runtime
///
/// Deferred values must be resolved beforehand and arrive as `undefined`.
/// Functions need `engine` to be passed through; without it they arrive as
/// `undefined`.
fn to_js<'js>(ctx: &Ctx<'js>, value: &Value, engine: Option<&Engine>) -> rquickjs::Result<rquickjs::Value<'js>> {
    Ok(match value {
        Value::Undefined | Value::Deferred(_) => rquickjs::Value::new_undefined(ctx.clone()),
        Value::Null => rquickjs::Value::new_null(ctx.clone()),
        Value::Bool(b) => rquickjs::Value::new_bool(ctx.clone(), *b),
        Value::Number(n) => rquickjs::Value::new_number(ctx.clone(), *n),
        Value::String(s) => rquickjs::String::from_str(ctx.clone(), s)?.into_value(),
        Value::Array(items) => {
            let array = rquickjs::Array::new(ctx.clone())?;
            for (i, item) in items.iter().enumerate() {
                array.set(i, to_js(ctx, item, engine)?)?;
            }
            array.into_value()
        }
        Value::Object(map) => {
            let object = Object::new(ctx.clone())?;
            for (key, item) in map.iter() {
                object.set(key.as_str(), to_js(ctx, item, engine)?)?;
            }
            object.into_value()
        }
        Value::Function(function) => match engine {
            Some(engine) => match engine.script_function(ctx, function) {
                Some(script) => script.into_value(),
                None => native_function(ctx, function)?,
            },
            None => rquickjs::Value::new_undefined(ctx.clone()),
        },
    })
}

/// Expose a template function to scripts. Only functions that complete
/// without suspending can be called this way.
fn native_function<'js>(ctx: &Ctx<'js>, function: &Function) -> rquickjs::Result<rquickjs::Value<'js>> {
    let function = function.clone();
    let wrapper = rquickjs::Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, this: This<rquickjs::Value<'js>>, args: Rest<rquickjs::Value<'js>>| {
            let this = from_js(&ctx, None, this.0, 0).map_err(|e| Exception::throw_message(&ctx, &e.to_string()))?;
            let args = args
                .0
                .into_iter()
                .map(|arg| from_js(&ctx, None, arg, 0))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| Exception::throw_message(&ctx, &e.to_string()))?;
            let result = function
                .call(this, args)
                .now_or_never()
                .and_then(|result| result.map(|value| value.resolve().now_or_never()).transpose());
            match result {
                Some(Ok(value)) => to_js(&ctx, &value, None),
                Some(Err(error)) => Err(Exception::throw_message(&ctx, &error.to_string())),
                None => Err(Exception::throw_message(
                    &ctx,
                    &format!("`{}` is asynchronous and cannot be called from a server script", function.name()),
                )),
            }
        },
    )?;
    Ok(wrapper.into_value())
}

/// Convert a script value into a template value
///
/// Promises are settled by running pending jobs. Functions are kept callable
/// when `engine` is given and become `undefined` otherwise.
fn from_js<'js>(
    ctx: &Ctx<'js>,
    engine: Option<&Engine>,
    value: rquickjs::Value<'js>,
    depth: usize,
) -> Result<Value, EvalError> {
    if depth > MAX_CONVERSION_DEPTH || value.is_undefined() {
        return Ok(Value::Undefined);
    }
    if value.is_null() {
        return Ok(Value::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(Value::Bool(b));
    }
    if let Some(n) = value.as_int() {
        return Ok(Value::from(n));
    }
    if let Some(n) = value.as_float() {
        return Ok(Value::from(n));
    }
    if let Some(s) = value.as_string() {
        return s.to_string().map(Value::from).map_err(script_error);
    }
    if let Some(promise) = value.as_promise() {
        let settled: rquickjs::Value = promise.finish().catch(ctx).map_err(script_error)?;
        return from_js(ctx, engine, settled, depth + 1);
    }
    if let Some(function) = value.as_function() {
        return Ok(match engine {
            Some(engine) => engine.adopt(ctx, function.clone()),
            None => Value::Undefined,
        });
    }
    if let Some(array) = value.as_array() {
        let mut items = Vec::with_capacity(array.len());
        for item in array.iter::<rquickjs::Value>() {
            items.push(from_js(ctx, engine, item.map_err(script_error)?, depth + 1)?);
        }
        return Ok(Value::from(items));
    }
    if let Some(object) = value.as_object() {
        let mut map = Map::new();
        for prop in object.props::<String, rquickjs::Value>() {
            let (key, item) = prop.map_err(script_error)?;
            map.insert(key, from_js(ctx, engine, item, depth + 1)?);
        }
        return Ok(Value::from(map));
    }
    Ok(Value::Undefined)
}
