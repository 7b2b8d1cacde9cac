//! Compiler - Main entry point

use crate::config::CompileOptions;
use crate::generator::generate;
use crate::idgen::IdGenerator;
use crate::module::Module;
use crate::processor::Processor;
use crate::resolver::ModuleResolver;
use crate::CompileError;
use dsx_dom::parse_entry;
use dsx_script::{Bindings, CodeEvaluator, Scope};

/// DSX template compiler
///
/// Every compilation gets its own id counter and script runtime; nothing
/// but the script analysis cache is shared between compilations.
#[derive(Debug, Clone)]
pub struct Compiler<R> {
    resolver: R,
    options: CompileOptions,
}

impl<R: ModuleResolver> Compiler<R> {
    /// Create a compiler with default options
    pub fn new(resolver: R) -> Self {
        Self::with_options(resolver, CompileOptions::default())
    }

    pub fn with_options(resolver: R, options: CompileOptions) -> Self {
        Self { resolver, options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Compile an entry template with `local` data and `global` bindings
    pub async fn compile(&self, template: &str, local: Bindings, global: Bindings) -> Result<String, CompileError> {
        tracing::debug!(bytes = template.len(), "compiling template");
        let document = parse_entry(template)?;

        // declared before the module tree, which may hold script functions
        let code = CodeEvaluator::new();
        let ids = IdGenerator::new();
        let module = Module::entry(document, Scope::new(global, local))?;

        Processor::new(&self.resolver, &ids, &code, &self.options)
            .process(&module)
            .await;
        Ok(generate(&module, self.options.layout)?)
    }

    /// [`Compiler::compile`] on a local executor
    pub fn compile_blocking(&self, template: &str, local: Bindings, global: Bindings) -> Result<String, CompileError> {
        smol::block_on(self.compile(template, local, global))
    }
}

/// Compile with default options
pub async fn compile<R: ModuleResolver>(
    template: &str,
    resolver: R,
    local: Bindings,
    global: Bindings,
) -> Result<String, CompileError> {
    Compiler::new(resolver).compile(template, local, global).await
}

/// Compile with default options, blocking the current thread
pub fn compile_blocking<R: ModuleResolver>(
    template: &str,
    resolver: R,
    local: Bindings,
    global: Bindings,
) -> Result<String, CompileError> {
    Compiler::new(resolver).compile_blocking(template, local, global)
}
