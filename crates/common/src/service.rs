use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use mime::Mime;

use crate::access::AccessGate;
use crate::auth::{
    generate_secret, AuthError, AuthManager, AuthSettings, Clock, Credentials, Identity,
    SystemClock,
};
use crate::cache::{HostMemory, ObjectCache, SystemMemory};
use crate::config::{ConfigError, ServiceConfig};
use crate::media_types::{
    parse_media_type, ExportError, MediaTypeRegistry, UnsupportedFormatError,
};
use crate::mounts::{Mount, MountTable, NotFoundError};
use crate::resolver::{ComponentContext, ComponentRegistry};
use crate::tree::{display_path, Entry, TreeError};

/// Failure of a request-level operation.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormatError),
    #[error(transparent)]
    Tree(TreeError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl From<TreeError> for RequestError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::NotFound(path) | TreeError::NotAContainer(path) => {
                RequestError::NotFound(NotFoundError(path))
            }
            other => RequestError::Tree(other),
        }
    }
}

/// Data exported in a negotiated media type.
#[derive(Debug, Clone)]
pub struct Exported {
    pub entry: Entry,
    pub media_type: Mime,
    pub body: Bytes,
}

/// Every component, built once from configuration.
#[derive(Debug)]
pub struct Service {
    cache: ObjectCache,
    auth: AuthManager,
    gate: AccessGate,
    mounts: MountTable,
    media_types: MediaTypeRegistry,
    generated_api_key: Option<String>,
}

pub struct ServiceBuilder {
    config: ServiceConfig,
    registry: ComponentRegistry,
    clock: Arc<dyn Clock>,
    memory: Arc<dyn SystemMemory>,
    config_dir: Option<PathBuf>,
    fallback_secret_keys: Vec<String>,
}

impl ServiceBuilder {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            registry: ComponentRegistry::with_builtins(),
            clock: Arc::new(SystemClock),
            memory: Arc::new(HostMemory),
            config_dir: None,
            fallback_secret_keys: Vec::new(),
        }
    }

    pub fn registry(mut self, registry: ComponentRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn memory(mut self, memory: Arc<dyn SystemMemory>) -> Self {
        self.memory = memory;
        self
    }

    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Keys used when the configuration names none, e.g. from the
    /// environment.
    pub fn fallback_secret_keys(mut self, keys: Vec<String>) -> Self {
        self.fallback_secret_keys = keys;
        self
    }

    pub fn build(self) -> Result<Service, ConfigError> {
        let config = self.config;
        config.validate()?;

        // cache
        let cache_config = config.object_cache.clone().unwrap_or_default();
        let available_bytes = cache_config.budget()?.resolve(self.memory.as_ref())?;
        let cache = ObjectCache::new(available_bytes, cache_config.log_level);
        tracing::info!(
            available_bytes,
            log_level = ?cache_config.log_level,
            enabled = cache.is_enabled(),
            "object cache configured"
        );

        let mut ctx = ComponentContext::new(cache.clone());
        if let Some(dir) = self.config_dir {
            ctx = ctx.with_config_dir(dir);
        }

        // authentication
        let auth_config = config.authentication.clone().unwrap_or_default();
        let authenticator = auth_config
            .authenticator
            .as_deref()
            .map(|id| self.registry.resolve_authenticator(id, auth_config.args.clone(), &ctx))
            .transpose()?;
        let mut settings: AuthSettings = auth_config.settings()?;
        if settings.secret_keys.is_empty() {
            settings.secret_keys = self.fallback_secret_keys;
        }
        let mut generated_api_key = None;
        if authenticator.is_none()
            && settings.single_user_api_key.is_none()
            && !settings.allow_anonymous_access
        {
            let key = generate_secret()?;
            tracing::warn!(
                api_key = %key,
                "no authentication configured; running in single-user mode with a generated API key"
            );
            settings.single_user_api_key = Some(key.clone());
            generated_api_key = Some(key);
        }
        let auth = AuthManager::new(settings, authenticator, self.clock)?;

        // access policies
        let resolve_gate = |spec: &crate::config::AccessControlSpec| {
            self.registry
                .resolve_access_policy(&spec.access_policy, spec.args.clone(), &ctx)
                .map(|policy| AccessGate::new(Some(policy)))
        };
        let gate = match &config.access_control {
            Some(spec) => resolve_gate(spec)?,
            None => AccessGate::open(),
        };

        // trees
        let mut mounts = MountTable::builder();
        for spec in &config.trees {
            let tree = self
                .registry
                .resolve_tree(&spec.tree, spec.args.clone(), &ctx)?;
            let mount_gate = spec.access_control.as_ref().map(resolve_gate).transpose()?;
            tracing::info!(path = %spec.path, tree = %spec.tree, "mounted tree");
            mounts = mounts.mount(&spec.path, tree, mount_gate)?;
        }
        let mounts = mounts.build();

        // media types
        let mut media_types = MediaTypeRegistry::with_defaults();
        for (family, by_type) in &config.media_types {
            for (media_type, identifier) in by_type {
                let exporter = self.registry.resolve_exporter(identifier, None, &ctx)?;
                media_types.register(*family, parse_media_type(media_type)?, exporter);
            }
        }
        for (extension, media_type) in &config.file_extensions {
            media_types.register_extension(extension, parse_media_type(media_type)?);
        }

        tracing::info!(
            trees = mounts.len(),
            authenticator = auth.has_authenticator(),
            anonymous = auth.allows_anonymous(),
            access_policy = gate.has_policy(),
            "service ready"
        );

        Ok(Service {
            cache,
            auth,
            gate,
            mounts,
            media_types,
            generated_api_key,
        })
    }
}

impl Service {
    pub fn builder(config: ServiceConfig) -> ServiceBuilder {
        ServiceBuilder::new(config)
    }

    pub fn from_config(config: ServiceConfig, registry: ComponentRegistry) -> Result<Self, ConfigError> {
        ServiceBuilder::new(config).registry(registry).build()
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    pub fn media_types(&self) -> &MediaTypeRegistry {
        &self.media_types
    }

    /// The API key generated for single-user mode, if any.
    pub fn generated_api_key(&self) -> Option<&str> {
        self.generated_api_key.as_deref()
    }

    pub fn identify(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        self.auth.identify(credentials)
    }

    fn gate_for<'a>(&'a self, mount: &'a Mount) -> &'a AccessGate {
        mount.gate.as_ref().unwrap_or(&self.gate)
    }

    /// Dispatch and check visibility at the root and at the first segment
    /// below the mount. Invisible entries are reported as missing.
    fn resolve<'p>(
        &self,
        identity: &Identity,
        path: &'p [String],
    ) -> Result<Option<(&Mount, &'p [String])>, RequestError> {
        let Ok((mount, rest)) = self.mounts.dispatch(path) else {
            return Ok(None);
        };
        // a mount below the root is reached through a synthetic root key,
        // which the process-wide policy governs
        if !mount.segments.is_empty() && !self.gate.is_visible(identity, &path[0]) {
            return Err(NotFoundError(display_path(path)).into());
        }
        if let Some(first) = rest.first() {
            if !self.gate_for(mount).is_visible(identity, first) {
                return Err(NotFoundError(display_path(path)).into());
            }
        }
        Ok(Some((mount, rest)))
    }

    /// Mount points strictly below `path`, as visible to `identity`.
    fn synthetic_children(&self, identity: &Identity, path: &[String]) -> Option<Vec<Entry>> {
        let names = self.mounts.children(path)?;
        if let Some(first) = path.first() {
            if !self.gate.is_visible(identity, first) {
                return None;
            }
        }
        let entries = names.into_iter().map(Entry::node).collect();
        Some(if path.is_empty() {
            self.gate.filter(identity, entries)
        } else {
            entries
        })
    }

    /// Entries directly below `path`.
    pub async fn list(&self, identity: &Identity, path: &[String]) -> Result<Vec<Entry>, RequestError> {
        let synthetic = self.synthetic_children(identity, path);
        let (mount, rest) = match self.resolve(identity, path) {
            Ok(Some(resolved)) => resolved,
            Ok(None) => return synthetic.ok_or_else(|| NotFoundError(display_path(path)).into()),
            Err(err) => return synthetic.ok_or(err),
        };

        let mut entries = match mount.tree.list(rest).await {
            Ok(entries) => entries,
            Err(err) => return synthetic.ok_or_else(|| err.into()),
        };
        if rest.is_empty() {
            entries = self.gate_for(mount).filter(identity, entries);
        }
        // a root mount shares its listing with the mounts below it
        if let Some(synthetic) = synthetic {
            for node in synthetic {
                if !entries.iter().any(|entry| entry.key == node.key) {
                    entries.push(node);
                }
            }
        }
        Ok(entries)
    }

    /// Description of the entry at `path`.
    pub async fn metadata(&self, identity: &Identity, path: &[String]) -> Result<Entry, RequestError> {
        // a path that leads to other mounts is a container even when the
        // tree mounted above it has nothing there
        let synthetic = self.synthetic_node(identity, path);
        let (mount, rest) = match self.resolve(identity, path) {
            Ok(Some(resolved)) => resolved,
            Ok(None) => return synthetic.ok_or_else(|| NotFoundError(display_path(path)).into()),
            Err(err) => return synthetic.ok_or(err),
        };

        match mount.tree.lookup(rest).await {
            Ok(mut entry) => {
                if rest.is_empty() {
                    entry.key = path.last().cloned().unwrap_or_default();
                }
                Ok(entry)
            }
            Err(err) => synthetic.ok_or_else(|| err.into()),
        }
    }

    fn synthetic_node(&self, identity: &Identity, path: &[String]) -> Option<Entry> {
        self.synthetic_children(identity, path)?;
        Some(Entry::node(path.last().cloned().unwrap_or_default()))
    }

    /// The data at `path` in a negotiated media type.
    pub async fn export(
        &self,
        identity: &Identity,
        path: &[String],
        format: Option<&str>,
        accept: Option<&str>,
    ) -> Result<Exported, RequestError> {
        let entry = self.metadata(identity, path).await?;
        let (media_type, exporter) =
            self.media_types
                .negotiate(entry.structure_family, format, accept)?;

        let (mount, rest) = self
            .resolve(identity, path)?
            .ok_or_else(|| NotFoundError(display_path(path)))?;
        let data = mount.tree.read(rest).await?;
        let body = exporter.export(&entry, data)?;

        Ok(Exported {
            entry,
            media_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::cache::FixedMemory;
    use crate::config::{parse_str, ConfigFormat};
    use crate::mounts::segments;
    use crate::tree::StructureFamily;

    fn build(yaml: &str, dir: &std::path::Path) -> Result<Service, ConfigError> {
        let config = parse_str(yaml, ConfigFormat::Yaml, "test.yml".as_ref()).unwrap();
        Service::builder(config)
            .memory(Arc::new(FixedMemory(1 << 30)))
            .config_dir(dir)
            .build()
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("raw")).unwrap();
        fs::write(dir.path().join("raw").join("a.csv"), "x\n1\n").unwrap();
        fs::write(dir.path().join("raw").join("b.csv"), "y\n2\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_single_user_mode_generates_key() {
        let dir = fixture();
        let service = build(
            "trees:\n  - path: /\n    tree: files\n    args:\n      directory: raw\n",
            dir.path(),
        )
        .unwrap();
        let key = service.generated_api_key().unwrap().to_string();

        assert!(service.identify(&Credentials::None).is_err());
        let identity = service.identify(&Credentials::ApiKey(key)).unwrap();
        let entries = service.list(&identity, &[]).await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_synthetic_root_and_nested_mounts() {
        let dir = fixture();
        let service = build(
            "
trees:
  - path: /data/raw
    tree: files
    args:
      directory: raw
  - path: /other
    tree: files
    args:
      directory: raw
authentication:
  allow_anonymous_access: true
",
            dir.path(),
        )
        .unwrap();
        assert!(service.generated_api_key().is_none());

        let root = service.list(&Identity::Anonymous, &[]).await.unwrap();
        let keys: Vec<_> = root.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["data", "other"]);

        let data = service
            .metadata(&Identity::Anonymous, &segments("/data"))
            .await
            .unwrap();
        assert_eq!(data.structure_family, StructureFamily::Node);

        let mounted = service
            .metadata(&Identity::Anonymous, &segments("/data/raw"))
            .await
            .unwrap();
        assert_eq!(mounted.key, "raw");

        assert!(matches!(
            service.list(&Identity::Anonymous, &segments("/nope")).await,
            Err(RequestError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_export_negotiates() {
        let dir = fixture();
        let service = build(
            "trees:\n  - path: /\n    tree: files\n    args:\n      directory: raw\nauthentication:\n  allow_anonymous_access: true\n",
            dir.path(),
        )
        .unwrap();

        let exported = service
            .export(&Identity::Anonymous, &segments("/a"), Some("csv"), None)
            .await
            .unwrap();
        assert_eq!(exported.media_type, "text/csv");
        assert_eq!(&exported.body[..], b"x\n1\n");

        assert!(matches!(
            service
                .export(&Identity::Anonymous, &segments("/a"), Some("xlsx"), None)
                .await,
            Err(RequestError::UnsupportedFormat(_))
        ));
        // containers have nothing to export
        assert!(matches!(
            service.export(&Identity::Anonymous, &[], None, None).await,
            Err(RequestError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_per_mount_policy_overrides_global() {
        let dir = fixture();
        let service = build(
            "
trees:
  - path: /open
    tree: files
    args:
      directory: raw
  - path: /locked
    tree: files
    args:
      directory: raw
    access_control:
      access_policy: canopy.access_policies:SimpleAccessPolicy
      args:
        access_lists:
          alice: [a]
authentication:
  authenticator: canopy.authenticators:DictionaryAuthenticator
  args:
    users_to_passwords:
      alice: secret1
  allow_anonymous_access: true
",
            dir.path(),
        )
        .unwrap();

        let tokens = service.auth().login("alice", "secret1").await.unwrap();
        let alice = service
            .identify(&Credentials::Bearer(tokens.access_token))
            .unwrap();

        let open = service.list(&alice, &segments("/open")).await.unwrap();
        assert_eq!(open.len(), 2);
        let locked = service.list(&alice, &segments("/locked")).await.unwrap();
        assert_eq!(locked.len(), 1);
        assert!(matches!(
            service.metadata(&alice, &segments("/locked/b")).await,
            Err(RequestError::NotFound(_))
        ));
        let anonymous = service
            .list(&Identity::Anonymous, &segments("/locked"))
            .await
            .unwrap();
        assert!(anonymous.is_empty());
    }

    #[test]
    fn test_fallback_secret_keys() {
        let dir = fixture();
        let config = parse_str(
            "trees:\n  - path: /\n    tree: files\n    args:\n      directory: raw\n",
            ConfigFormat::Yaml,
            "test.yml".as_ref(),
        )
        .unwrap();
        let service = Service::builder(config)
            .memory(Arc::new(FixedMemory(1 << 20)))
            .config_dir(dir.path())
            .fallback_secret_keys(vec!["from-env".into()])
            .build()
            .unwrap();
        assert_eq!(service.auth().settings().secret_keys, vec!["from-env".to_string()]);
    }

    #[test]
    fn test_resolution_errors_are_config_errors() {
        let dir = fixture();
        let err = build("trees:\n  - path: /\n    tree: nowhere:Tree\n", dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Resolution(_)));

        let err = build(
            "trees:\n  - path: /a\n    tree: files\n    args: {directory: raw}\n  - path: /a/b\n    tree: files\n    args: {directory: raw}\n",
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Mount(_)));
    }
}
