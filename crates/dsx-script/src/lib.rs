//! DSX Script
//!
//! The two languages embedded in DSX templates:
//! - template expressions (`{{ ... }}`, directive values), evaluated by an
//!   async tree-walking interpreter over a JavaScript expression subset
//! - module server scripts, run in QuickJS via rquickjs
//!
//! Both read their names from a [`Scope`].

mod ast;
mod builtins;
mod code;
mod console;
mod eval;
mod lexer;
mod parser;
mod scope;
mod token;
mod value;

pub use code::{CodeEvaluator, referenced_names};
pub use eval::{Expression, evaluate};
pub use lexer::is_identifier;
pub use parser::ParseError;
pub use scope::{Bindings, PARENT_BINDING, Scope};
pub use value::{CallResult, Deferred, Function, Map, NativeConstructor, Value, format_number};

/// Expression or script error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("not a valid expression: {0}")]
    Parse(#[from] ParseError),

    #[error("unsupported operator `{0}`")]
    UnknownOperator(&'static str),

    #[error("unsupported expression: {0}")]
    UnsupportedNode(&'static str),

    #[error("{0} is not a function")]
    NotCallable(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("script error: {0}")]
    Script(String),
}
