use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use super::{Component, ComponentRegistry, FILES_ALIAS};
use crate::access::{AccessPolicy, SimpleAccessPolicy, SimpleAccessPolicyArgs};
use crate::auth::{Authenticator, DictionaryAuthenticator, DictionaryAuthenticatorArgs};
use crate::media_types::{Exporter, JsonExporter, RawExporter};
use crate::tree::{DirectoryTree, Tree};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DirectoryTreeArgs {
    directory: PathBuf,
}

// NOTE: identifiers below are hard-coded and well formed, so
// registration into a fresh registry cannot fail
pub(super) fn register(registry: &mut ComponentRegistry) {
    let results = [
        registry.register_tree(
            DirectoryTree::IDENTIFIER,
            Component::factory(|args, ctx| {
                let args: DirectoryTreeArgs = args.bind()?;
                let directory = ctx.resolve_path(&args.directory);
                let tree = DirectoryTree::from_directory(&directory, ctx.cache.clone())
                    .with_context(|| format!("cannot serve {}", directory.display()))?;
                Ok(Arc::new(tree) as Arc<dyn Tree>)
            }),
        ),
        registry.register_authenticator(
            DictionaryAuthenticator::IDENTIFIER,
            Component::factory(|args, _ctx| {
                let args: DictionaryAuthenticatorArgs = args.bind()?;
                Ok(Arc::new(DictionaryAuthenticator::from(args)) as Arc<dyn Authenticator>)
            }),
        ),
        registry.register_access_policy(
            SimpleAccessPolicy::IDENTIFIER,
            Component::factory(|args, _ctx| {
                let args: SimpleAccessPolicyArgs = args.bind()?;
                Ok(Arc::new(SimpleAccessPolicy::from(args)) as Arc<dyn AccessPolicy>)
            }),
        ),
        registry.register_exporter(
            RawExporter::IDENTIFIER,
            Component::instance(Arc::new(RawExporter) as Arc<dyn Exporter>),
        ),
        registry.register_exporter(
            JsonExporter::IDENTIFIER,
            Component::instance(Arc::new(JsonExporter) as Arc<dyn Exporter>),
        ),
    ];
    for result in results {
        if let Err(e) = result {
            tracing::error!(error = %e, "failed to register built-in component");
        }
    }

    registry.alias(FILES_ALIAS, DirectoryTree::IDENTIFIER);
}
