//! Module Processor
//!
//! Runs a module's server scripts, then walks its tree: binds directives,
//! substitutes placeholders and expands module references into child
//! modules. Nodes are visited left to right, depth first, and every walk
//! step sees the mutations of the steps before it.

use crate::CompileError;
use crate::config::CompileOptions;
use crate::directive::{DIRECTIVE_PREFIX, Directive, bind_directives, has_directives};
use crate::idgen::IdGenerator;
use crate::interpolate::{camel_case, evaluate_attribute, evaluate_parameter, substitute_markup, substitute_raw};
use crate::module::Module;
use crate::resolver::ModuleResolver;
use dsx_dom::{Handle, NodeData, parse_module, tags};
use dsx_script::{Bindings, CodeEvaluator, Scope};
use futures_util::FutureExt;
use futures_util::future::{LocalBoxFuture, join, join_all};

/// Module type named by a reference tag (`ds-card` -> `card`)
pub fn module_reference(node: &Handle) -> Option<&str> {
    node.name()?
        .strip_prefix(DIRECTIVE_PREFIX)
        .filter(|name| !name.is_empty())
}

/// Attributes other than directives, in source order
fn plain_attributes(node: &Handle) -> Vec<(String, String)> {
    node.attrs()
        .map(|attrs| {
            attrs
                .iter()
                .filter(|(name, _)| Directive::from_attribute(name).is_none())
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Per-compilation processing state
pub struct Processor<'a, R> {
    resolver: &'a R,
    ids: &'a IdGenerator,
    code: &'a CodeEvaluator,
    options: &'a CompileOptions,
}

impl<R> Clone for Processor<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Processor<'_, R> {}

impl<'a, R: ModuleResolver> Processor<'a, R> {
    pub fn new(resolver: &'a R, ids: &'a IdGenerator, code: &'a CodeEvaluator, options: &'a CompileOptions) -> Self {
        Self {
            resolver,
            ids,
            code,
            options,
        }
    }

    /// Process `module` and, recursively, every module it references
    pub async fn process(self, module: &Module) {
        tracing::debug!(module = module.name.as_deref().unwrap_or("<entry>"), "processing module");
        self.run_server_scripts(module).await;
        join(
            self.substitute_assets(module),
            self.process_node(module, module.root(), module.scope.clone()),
        )
        .await;
    }

    /// Exports of each server script are visible to the next one
    async fn run_server_scripts(self, module: &Module) {
        for script in &module.server_scripts {
            let source = script.inner_text();
            if source.trim().is_empty() {
                continue;
            }
            let exports = self.code.evaluate(&source, &module.scope).await;
            tracing::trace!(count = exports.len(), "merging server script exports");
            module.scope.extend_local(exports);
        }
    }

    /// Raw substitution in top-level script and style text
    async fn substitute_assets(self, module: &Module) {
        let texts: Vec<Handle> = module
            .scripts
            .iter()
            .chain(&module.styles)
            .flat_map(|asset| asset.children().iter().filter(|child| child.is_text()).cloned().collect::<Vec<_>>())
            .collect();
        join_all(texts.iter().map(|text| async {
            let contents = text.text_contents().unwrap_or_default();
            let substituted = substitute_raw(&contents, &module.scope).await;
            text.set_text(substituted);
        }))
        .await;
    }

    fn process_node<'m>(self, module: &'m Module, node: Handle, inherited: Scope) -> LocalBoxFuture<'m, ()>
    where
        'a: 'm,
    {
        async move {
            if node.is_deleted() {
                return;
            }
            let reference = module_reference(&node).map(str::to_string);
            let scope = match node.scope() {
                Some(scope) => scope,
                None => {
                    let owned = reference.is_some() || has_directives(&node);
                    let scope = if owned { inherited.fork() } else { inherited };
                    node.set_scope(scope.clone(), owned);
                    scope
                }
            };

            bind_directives(&node, self.options).await;
            if node.is_deleted() {
                return;
            }

            match &node.data {
                NodeData::Text { .. } => {
                    let contents = node.text_contents().unwrap_or_default();
                    let raw = node
                        .parent()
                        .and_then(|parent| parent.name().map(tags::is_raw_text))
                        .unwrap_or(false);
                    let substituted = if raw {
                        substitute_raw(&contents, &scope).await
                    } else {
                        substitute_markup(&contents, &scope).await
                    };
                    node.set_text(substituted);
                    return;
                }
                NodeData::Element { .. } => {}
            }

            if let Some(name) = reference {
                let params = self.collect_parameters(&node, &scope).await;
                if let Err(error) = self.expand(module, &node, &name, params).await {
                    tracing::warn!(module = %name, %error, "module reference removed");
                    node.mark_deleted();
                }
                return;
            }

            self.evaluate_attributes(&node, &scope).await;

            let mut index = 0;
            while let Some(child) = node.child(index) {
                self.process_node(module, child.clone(), scope.clone()).await;
                if child.is_deleted() {
                    node.remove_child(index);
                } else {
                    index += 1;
                }
            }
        }
        .boxed_local()
    }

    /// Non-directive attributes of a reference as camel-cased parameters
    async fn collect_parameters(self, node: &Handle, scope: &Scope) -> Bindings {
        let attrs = plain_attributes(node);
        let values = join_all(attrs.iter().map(|(_, value)| evaluate_parameter(value, scope))).await;
        attrs
            .into_iter()
            .zip(values)
            .map(|((name, _), value)| (camel_case(&name), value))
            .collect()
    }

    async fn evaluate_attributes(self, node: &Handle, scope: &Scope) {
        let attrs = plain_attributes(node);
        let values = join_all(attrs.iter().map(|(_, value)| evaluate_attribute(value, scope))).await;
        for ((name, _), value) in attrs.iter().zip(values) {
            node.set_attr(name, value);
        }
    }

    /// Resolve, build and process the module `name`, then put its root
    /// where the reference was
    async fn expand(self, module: &Module, node: &Handle, name: &str, params: Bindings) -> Result<(), CompileError> {
        let source = self.resolver.resolve(name).await?;
        let document = parse_module(&source)?;
        let id = self.ids.next_module_id(&source);
        tracing::debug!(module = name, id = %id, "expanding module reference");

        let child = Module::instance(name, id, document, module.scope.child(params))?;
        self.process(&child).await;

        let root = child.root();
        if root.is_deleted() {
            tracing::debug!(module = name, "module root removed by its directives");
            node.mark_deleted();
            return Ok(());
        }
        if !node.replace_with(root.clone()) {
            module.set_root(root);
        }
        module.add_child(child);
        Ok(())
    }
}
