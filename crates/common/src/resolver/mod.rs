//! Component identifiers (`module.path:attribute`) and the registry that
//! turns them into live trees, authenticators, access policies and
//! exporters.
//!
//! Each identifier names either a ready-made instance or a factory. A
//! factory is invoked with the keyword arguments from configuration, bound
//! into the factory's own typed argument struct.

mod builtins;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::access::AccessPolicy;
use crate::auth::Authenticator;
use crate::cache::ObjectCache;
use crate::media_types::Exporter;
use crate::tree::Tree;

/// Shorthand accepted for the built-in directory tree.
pub const FILES_ALIAS: &str = "files";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("malformed component identifier {identifier:?}: {reason}")]
    MalformedIdentifier {
        identifier: String,
        reason: &'static str,
    },
    #[error("no module {module:?} provides {kind}s (while resolving {identifier:?})")]
    ModuleNotFound {
        identifier: String,
        module: String,
        kind: &'static str,
    },
    #[error("module {module:?} has no {kind} named {attribute:?}")]
    AttributeNotFound {
        module: String,
        attribute: String,
        kind: &'static str,
    },
    #[error("{identifier} is an instance, not a factory, and does not accept args")]
    NotCallable { identifier: String },
    #[error("invalid args for {identifier}: {reason}")]
    ArgumentBinding { identifier: String, reason: String },
    #[error("failed to construct {identifier}: {reason}")]
    Construction { identifier: String, reason: String },
    #[error("{identifier} is already registered as a {kind}")]
    AlreadyRegistered {
        identifier: String,
        kind: &'static str,
    },
}

/// Error returned by a factory.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error(transparent)]
    Binding(#[from] serde_json::Error),
    #[error(transparent)]
    Construction(#[from] anyhow::Error),
}

/// A parsed `module.path:attribute.path` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    module: String,
    attribute: String,
}

impl Identifier {
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }
}

impl FromStr for Identifier {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason| ResolutionError::MalformedIdentifier {
            identifier: s.to_string(),
            reason,
        };
        let (module, attribute) = s
            .rsplit_once(':')
            .ok_or_else(|| malformed("expected 'module.path:attribute'"))?;
        if module.is_empty() || attribute.is_empty() {
            return Err(malformed("module and attribute must both be non-empty"));
        }
        let valid_segment = |segment: &str| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        };
        if !module.split('.').all(valid_segment) || !attribute.split('.').all(valid_segment) {
            return Err(malformed(
                "dotted segments must be non-empty and contain only letters, digits and '_'",
            ));
        }
        Ok(Self {
            module: module.to_string(),
            attribute: attribute.to_string(),
        })
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.attribute)
    }
}

/// Keyword arguments for a factory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Args(pub Map<String, Value>);

impl Args {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deserialize into the factory's parameter struct.
    pub fn bind<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0))
    }
}

impl From<Map<String, Value>> for Args {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Services available to factories.
#[derive(Debug, Clone)]
pub struct ComponentContext {
    pub cache: ObjectCache,
    /// Directory of the configuration; relative paths in args resolve
    /// against it
    pub config_dir: Option<PathBuf>,
}

impl ComponentContext {
    pub fn new(cache: ObjectCache) -> Self {
        Self {
            cache,
            config_dir: None,
        }
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.config_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

pub type Factory<T> =
    Arc<dyn Fn(Args, &ComponentContext) -> Result<Arc<T>, FactoryError> + Send + Sync>;

/// What an identifier refers to.
pub enum Component<T: ?Sized> {
    Instance(Arc<T>),
    Factory(Factory<T>),
}

impl<T: ?Sized> Component<T> {
    pub fn instance(value: Arc<T>) -> Self {
        Component::Instance(value)
    }

    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(Args, &ComponentContext) -> Result<Arc<T>, FactoryError> + Send + Sync + 'static,
    {
        Component::Factory(Arc::new(f))
    }
}

impl<T: ?Sized> Clone for Component<T> {
    fn clone(&self) -> Self {
        match self {
            Component::Instance(value) => Component::Instance(Arc::clone(value)),
            Component::Factory(f) => Component::Factory(Arc::clone(f)),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Component<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Instance(_) => f.write_str("Instance"),
            Component::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// The components of one category, by module then attribute.
struct Category<T: ?Sized> {
    kind: &'static str,
    modules: HashMap<String, HashMap<String, Component<T>>>,
}

impl<T: ?Sized> Category<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            modules: HashMap::new(),
        }
    }

    fn register(&mut self, identifier: &str, component: Component<T>) -> Result<(), ResolutionError> {
        let id: Identifier = identifier.parse()?;
        let attributes = self.modules.entry(id.module).or_default();
        if attributes.contains_key(&id.attribute) {
            return Err(ResolutionError::AlreadyRegistered {
                identifier: identifier.to_string(),
                kind: self.kind,
            });
        }
        attributes.insert(id.attribute, component);
        Ok(())
    }

    fn resolve(
        &self,
        id: &Identifier,
        args: Option<Args>,
        ctx: &ComponentContext,
    ) -> Result<Arc<T>, ResolutionError> {
        let attributes =
            self.modules
                .get(&id.module)
                .ok_or_else(|| ResolutionError::ModuleNotFound {
                    identifier: id.to_string(),
                    module: id.module.clone(),
                    kind: self.kind,
                })?;
        let component =
            attributes
                .get(&id.attribute)
                .ok_or_else(|| ResolutionError::AttributeNotFound {
                    module: id.module.clone(),
                    attribute: id.attribute.clone(),
                    kind: self.kind,
                })?;

        match component {
            Component::Instance(value) => {
                if args.is_some_and(|args| !args.is_empty()) {
                    return Err(ResolutionError::NotCallable {
                        identifier: id.to_string(),
                    });
                }
                Ok(Arc::clone(value))
            }
            Component::Factory(factory) => {
                factory(args.unwrap_or_default(), ctx).map_err(|err| match err {
                    FactoryError::Binding(e) => ResolutionError::ArgumentBinding {
                        identifier: id.to_string(),
                        reason: e.to_string(),
                    },
                    FactoryError::Construction(e) => ResolutionError::Construction {
                        identifier: id.to_string(),
                        reason: format!("{e:#}"),
                    },
                })
            }
        }
    }
}

/// Typed registry of every component that configuration can name.
pub struct ComponentRegistry {
    aliases: HashMap<String, String>,
    trees: Category<dyn Tree>,
    authenticators: Category<dyn Authenticator>,
    access_policies: Category<dyn AccessPolicy>,
    exporters: Category<dyn Exporter>,
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ComponentRegistry {
    /// A registry with nothing in it.
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
            trees: Category::new("tree"),
            authenticators: Category::new("authenticator"),
            access_policies: Category::new("access policy"),
            exporters: Category::new("exporter"),
        }
    }

    /// A registry holding the components that ship with canopy.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        builtins::register(&mut registry);
        registry
    }

    pub fn alias(&mut self, name: impl Into<String>, identifier: impl Into<String>) {
        self.aliases.insert(name.into(), identifier.into());
    }

    pub fn aliases(&self) -> &HashMap<String, String> {
        &self.aliases
    }

    fn identifier(&self, identifier: &str) -> Result<Identifier, ResolutionError> {
        self.aliases
            .get(identifier)
            .map(String::as_str)
            .unwrap_or(identifier)
            .parse()
    }

    pub fn register_tree(
        &mut self,
        identifier: &str,
        component: Component<dyn Tree>,
    ) -> Result<(), ResolutionError> {
        self.trees.register(identifier, component)
    }

    pub fn register_authenticator(
        &mut self,
        identifier: &str,
        component: Component<dyn Authenticator>,
    ) -> Result<(), ResolutionError> {
        self.authenticators.register(identifier, component)
    }

    pub fn register_access_policy(
        &mut self,
        identifier: &str,
        component: Component<dyn AccessPolicy>,
    ) -> Result<(), ResolutionError> {
        self.access_policies.register(identifier, component)
    }

    pub fn register_exporter(
        &mut self,
        identifier: &str,
        component: Component<dyn Exporter>,
    ) -> Result<(), ResolutionError> {
        self.exporters.register(identifier, component)
    }

    pub fn resolve_tree(
        &self,
        identifier: &str,
        args: Option<Args>,
        ctx: &ComponentContext,
    ) -> Result<Arc<dyn Tree>, ResolutionError> {
        self.trees.resolve(&self.identifier(identifier)?, args, ctx)
    }

    pub fn resolve_authenticator(
        &self,
        identifier: &str,
        args: Option<Args>,
        ctx: &ComponentContext,
    ) -> Result<Arc<dyn Authenticator>, ResolutionError> {
        self.authenticators
            .resolve(&self.identifier(identifier)?, args, ctx)
    }

    pub fn resolve_access_policy(
        &self,
        identifier: &str,
        args: Option<Args>,
        ctx: &ComponentContext,
    ) -> Result<Arc<dyn AccessPolicy>, ResolutionError> {
        self.access_policies
            .resolve(&self.identifier(identifier)?, args, ctx)
    }

    pub fn resolve_exporter(
        &self,
        identifier: &str,
        args: Option<Args>,
        ctx: &ComponentContext,
    ) -> Result<Arc<dyn Exporter>, ResolutionError> {
        self.exporters.resolve(&self.identifier(identifier)?, args, ctx)
    }
}
