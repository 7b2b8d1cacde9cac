//! Console API
//!
//! `console.log` and friends for server scripts, routed to tracing.

use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Object, Value};
use std::fmt::Write;

#[derive(Debug, Clone, Copy)]
enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// Install `console` into the global object
pub fn install_console(ctx: &Ctx) -> Result<(), rquickjs::Error> {
    let console = Object::new(ctx.clone())?;

    let methods = [
        ("log", Level::Info),
        ("info", Level::Info),
        ("warn", Level::Warn),
        ("error", Level::Error),
        ("debug", Level::Debug),
        ("trace", Level::Debug),
    ];
    for (name, level) in methods {
        console.set(
            name,
            Function::new(ctx.clone(), move |args: Rest<Value>| {
                emit(level, &args.0);
                Ok::<(), rquickjs::Error>(())
            })?,
        )?;
    }

    ctx.globals().set("console", console)?;
    Ok(())
}

fn emit(level: Level, values: &[Value]) {
    let mut output = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            output.push(' ');
        }
        format_value(&mut output, value);
    }

    match level {
        Level::Error => tracing::error!(target: "dsx::script", "{output}"),
        Level::Warn => tracing::warn!(target: "dsx::script", "{output}"),
        Level::Debug => tracing::debug!(target: "dsx::script", "{output}"),
        Level::Info => tracing::info!(target: "dsx::script", "{output}"),
    }
}

/// Format a script value for logging
fn format_value(out: &mut String, value: &Value) {
    if value.is_undefined() {
        out.push_str("undefined");
    } else if value.is_null() {
        out.push_str("null");
    } else if let Some(b) = value.as_bool() {
        write!(out, "{b}").ok();
    } else if let Some(n) = value.as_int() {
        write!(out, "{n}").ok();
    } else if let Some(n) = value.as_float() {
        out.push_str(&crate::value::format_number(n));
    } else if let Some(s) = value.as_string() {
        if let Ok(s) = s.to_string() {
            out.push_str(&s);
        }
    } else if value.is_array() {
        out.push_str("[Array]");
    } else if value.is_function() {
        out.push_str("[Function]");
    } else if value.is_object() {
        out.push_str("[Object]");
    } else {
        out.push_str("[unknown]");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    #[test]
    fn test_console_methods_exist() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();

        context.with(|ctx| {
            install_console(&ctx).unwrap();
            let _: Value = ctx.eval("console.log('message', 42, 1.5, true, null, [1], {})").unwrap();
            let kind: String = ctx.eval("typeof console.warn").unwrap();
            assert_eq!(kind, "function");
        });
    }

    #[test]
    fn test_format_value() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();

        context.with(|ctx| {
            let mut out = String::new();
            let value: Value = ctx.eval("2.5").unwrap();
            format_value(&mut out, &value);
            out.push(' ');
            let value: Value = ctx.eval("'text'").unwrap();
            format_value(&mut out, &value);
            assert_eq!(out, "2.5 text");
        });
    }
}
