//! Module Resolvers
//!
//! Map a module type name (the tag suffix after `ds-`) to module source.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;

/// Module lookup failure
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("module `{0}` not found")]
    NotFound(String),

    #[error("invalid module name `{0}`")]
    InvalidName(String),

    #[error("failed to read module `{name}`: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Source of module templates
pub trait ModuleResolver {
    fn resolve(&self, name: &str) -> impl Future<Output = Result<String, ResolveError>>;
}

impl<R: ModuleResolver + ?Sized> ModuleResolver for &R {
    fn resolve(&self, name: &str) -> impl Future<Output = Result<String, ResolveError>> {
        (**self).resolve(name)
    }
}

/// Modules held in memory
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    modules: HashMap<String, String>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.modules.insert(name.into(), source.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapResolver {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            modules: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl ModuleResolver for MapResolver {
    async fn resolve(&self, name: &str) -> Result<String, ResolveError> {
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(name.to_string()))
    }
}

/// Modules stored as `<dir>/<name>.<extension>` files
#[derive(Debug, Clone)]
pub struct DirResolver {
    dir: PathBuf,
    extension: String,
}

impl DirResolver {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    /// File a module name maps to. Names are single path components.
    pub fn path_of(&self, name: &str) -> Result<PathBuf, ResolveError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0']);
        if !valid {
            return Err(ResolveError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{name}.{}", self.extension)))
    }
}

impl ModuleResolver for DirResolver {
    async fn resolve(&self, name: &str) -> Result<String, ResolveError> {
        let path = self.path_of(name)?;
        tracing::debug!(module = name, path = %path.display(), "reading module");
        smol::fs::read_to_string(&path).await.map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ResolveError::NotFound(name.to_string()),
            _ => ResolveError::Io {
                name: name.to_string(),
                source,
            },
        })
    }
}
