//! DSX - Command-line template compiler

use anyhow::{Context, Result, bail};
use clap::Parser;
use dsx_engine::{Bindings, CompileOptions, Compiler, DirResolver, Value};
use std::path::{Path, PathBuf};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Compile a DSX template into HTML
#[derive(Debug, Parser)]
#[command(name = "dsx", version)]
struct Cli {
    /// Entry template
    template: PathBuf,

    /// Directory holding `<type>.<ext>` module files (default: the template's directory)
    #[arg(short, long)]
    modules: Option<PathBuf>,

    /// JSON object with the template's local data
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// JSON object with global bindings
    #[arg(short, long)]
    globals: Option<PathBuf>,

    /// Write the output here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit compact markup
    #[arg(long)]
    compact: bool,

    /// Module file extension
    #[arg(long, default_value = "dsxm")]
    extension: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let template = std::fs::read_to_string(&cli.template)
        .with_context(|| format!("failed to read template {}", cli.template.display()))?;
    let local = read_bindings(cli.data.as_deref())?;
    let global = read_bindings(cli.globals.as_deref())?;

    let mut options = CompileOptions {
        module_extension: cli.extension,
        ..CompileOptions::default()
    };
    if cli.compact {
        options = options.compact();
    }
    let modules = match cli.modules {
        Some(dir) => dir,
        None => cli
            .template
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    tracing::info!(template = %cli.template.display(), modules = %modules.display(), "compiling");

    let resolver = DirResolver::new(modules, options.module_extension.clone());
    let markup = Compiler::with_options(resolver, options)
        .compile_blocking(&template, local, global)
        .with_context(|| format!("failed to compile {}", cli.template.display()))?;

    match cli.output {
        Some(path) => std::fs::write(&path, markup)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{markup}"),
    }
    Ok(())
}

/// Bindings from a JSON object file; none without a file
fn read_bindings(path: Option<&Path>) -> Result<Bindings> {
    let Some(path) = path else {
        return Ok(Bindings::new());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))?;
    match json {
        serde_json::Value::Object(map) => Ok(map.into_iter().map(|(key, value)| (key, to_value(value))).collect()),
        other => bail!("{} must hold a JSON object, found {}", path.display(), kind(&other)),
    }
}

fn to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::from(b),
        serde_json::Value::Number(n) => Value::from(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::from(s),
        serde_json::Value::Array(items) => Value::from(items.into_iter().map(to_value).collect::<Vec<_>>()),
        serde_json::Value::Object(map) => map.into_iter().map(|(key, value)| (key, to_value(value))).collect(),
    }
}

fn kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({ "n": 2, "s": "x", "list": [true, null], "nested": { "k": 1.5 } });
        let value = to_value(json);
        let object = value.as_object().unwrap();
        assert_eq!(object["n"], Value::from(2));
        assert_eq!(object["s"], Value::from("x"));
        assert_eq!(object["list"], Value::from(vec![Value::from(true), Value::Null]));
        assert_eq!(object["nested"].as_object().unwrap()["k"], Value::from(1.5));
    }

    #[test]
    fn test_bindings_must_be_an_object() {
        let path = std::env::temp_dir().join(format!("dsx-cli-{}.json", std::process::id()));
        std::fs::write(&path, "[1, 2]").unwrap();
        let error = read_bindings(Some(&path)).unwrap_err();
        assert!(error.to_string().contains("must hold a JSON object"));

        std::fs::write(&path, r#"{"title": "Home"}"#).unwrap();
        let bindings = read_bindings(Some(&path)).unwrap();
        assert_eq!(bindings["title"], Value::from("Home"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from(["dsx", "page.dsx", "--modules", "mods", "--compact"]);
        assert_eq!(cli.template, PathBuf::from("page.dsx"));
        assert_eq!(cli.modules, Some(PathBuf::from("mods")));
        assert!(cli.compact);
        assert_eq!(cli.extension, "dsxm");
    }
}
