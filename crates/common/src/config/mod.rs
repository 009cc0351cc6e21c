mod load;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, AuthSettings};
use crate::cache::{AvailableBytes, CacheLogLevel, CacheSizeError};
use crate::media_types::{parse_media_type, InvalidMediaTypeError};
use crate::mounts::MountError;
use crate::resolver::{Args, ResolutionError};
use crate::tree::StructureFamily;

pub use load::{base_dir, merge, parse_configs, parse_str, ConfigFormat};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("{0}: unsupported configuration file type; expected .yml, .yaml, .json or .toml")]
    UnsupportedFormat(PathBuf),
    #[error("no configuration files found in {0}")]
    NotFound(PathBuf),
    #[error("'{section}' is given in both {first} and {second}; it may only be given once")]
    DuplicateSection {
        section: &'static str,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("tree path {path} is configured in both {first} and {second}")]
    DuplicatePath {
        path: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error(transparent)]
    Mount(#[from] MountError),
    #[error("no trees are configured")]
    NoTrees,
    #[error("access control requires an authenticator; set authentication.authenticator")]
    AccessControlWithoutAuthenticator,
    #[error("invalid object_cache.available_bytes: {0}")]
    InvalidCacheSize(#[from] CacheSizeError),
    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },
    #[error(transparent)]
    MediaType(#[from] InvalidMediaTypeError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// The whole configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default)]
    pub trees: Vec<TreeSpec>,
    /// family -> media type -> exporter identifier
    #[serde(default)]
    pub media_types: BTreeMap<StructureFamily, BTreeMap<String, String>>,
    /// extension -> media type
    #[serde(default)]
    pub file_extensions: BTreeMap<String, String>,
    #[serde(default)]
    pub authentication: Option<AuthenticationConfig>,
    #[serde(default)]
    pub access_control: Option<AccessControlSpec>,
    #[serde(default)]
    pub object_cache: Option<ObjectCacheConfig>,
    #[serde(default)]
    pub allow_origins: Vec<String>,
    #[serde(default, alias = "uvicorn")]
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeSpec {
    pub path: String,
    pub tree: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Args>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_control: Option<AccessControlSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessControlSpec {
    pub access_policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Args>,
}

fn default_access_token_max_age() -> i64 {
    900
}

fn default_refresh_token_max_age() -> i64 {
    604_800
}

/// Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthenticationConfig {
    #[serde(default)]
    pub authenticator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Args>,
    #[serde(default)]
    pub secret_keys: Vec<String>,
    #[serde(default)]
    pub allow_anonymous_access: bool,
    #[serde(default)]
    pub single_user_api_key: Option<String>,
    #[serde(default = "default_access_token_max_age")]
    pub access_token_max_age: i64,
    #[serde(default = "default_refresh_token_max_age")]
    pub refresh_token_max_age: i64,
    #[serde(default)]
    pub session_max_age: Option<i64>,
}

impl Default for AuthenticationConfig {
    fn default() -> Self {
        Self {
            authenticator: None,
            args: None,
            secret_keys: Vec::new(),
            allow_anonymous_access: false,
            single_user_api_key: None,
            access_token_max_age: default_access_token_max_age(),
            refresh_token_max_age: default_refresh_token_max_age(),
            session_max_age: None,
        }
    }
}

/// Upper bound on configured token and session lifetimes (100 years).
pub const MAX_LIFETIME_SECONDS: i64 = 100 * 365 * 24 * 60 * 60;

impl AuthenticationConfig {
    pub fn settings(&self) -> Result<AuthSettings, ConfigError> {
        let seconds = |key: &str, value: i64| {
            let invalid = |reason: String| ConfigError::InvalidSetting {
                key: format!("authentication.{key}"),
                reason,
            };
            if value < 0 {
                return Err(invalid(format!("must not be negative, got {value}")));
            }
            if value > MAX_LIFETIME_SECONDS {
                return Err(invalid(format!(
                    "must be at most {MAX_LIFETIME_SECONDS} seconds, got {value}"
                )));
            }
            chrono::TimeDelta::try_seconds(value)
                .ok_or_else(|| invalid(format!("{value} seconds is out of range")))
        };
        Ok(AuthSettings {
            secret_keys: self.secret_keys.clone(),
            allow_anonymous_access: self.allow_anonymous_access,
            single_user_api_key: self.single_user_api_key.clone(),
            access_token_max_age: seconds("access_token_max_age", self.access_token_max_age)?,
            refresh_token_max_age: seconds("refresh_token_max_age", self.refresh_token_max_age)?,
            session_max_age: self
                .session_max_age
                .map(|value| seconds("session_max_age", value))
                .transpose()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectCacheConfig {
    /// Bytes, or a fraction of physical memory when in (0, 1)
    #[serde(default)]
    pub available_bytes: Option<f64>,
    #[serde(default)]
    pub log_level: CacheLogLevel,
}

impl ObjectCacheConfig {
    pub fn budget(&self) -> Result<AvailableBytes, CacheSizeError> {
        match self.available_bytes {
            Some(value) => AvailableBytes::from_value(value),
            None => Ok(AvailableBytes::default()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub ssl_keyfile: Option<PathBuf>,
    #[serde(default)]
    pub ssl_certfile: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn has_authenticator(&self) -> bool {
        self.authentication
            .as_ref()
            .is_some_and(|auth| auth.authenticator.is_some())
    }

    /// Checks that need the whole document. Mount paths are checked when
    /// the mount table is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trees.is_empty() {
            return Err(ConfigError::NoTrees);
        }

        let any_policy = self.access_control.is_some()
            || self.trees.iter().any(|tree| tree.access_control.is_some());
        if any_policy && !self.has_authenticator() {
            return Err(ConfigError::AccessControlWithoutAuthenticator);
        }

        if self.media_types.contains_key(&StructureFamily::Node) {
            return Err(ConfigError::InvalidSetting {
                key: "media_types.node".into(),
                reason: "containers cannot be exported".into(),
            });
        }

        for media_type in self.media_types.values().flat_map(BTreeMap::keys) {
            parse_media_type(media_type)?;
        }
        for media_type in self.file_extensions.values() {
            parse_media_type(media_type)?;
        }

        if let Some(auth) = &self.authentication {
            auth.settings()?;
        }
        if let Some(cache) = &self.object_cache {
            cache.budget()?;
        }

        if let Some(server) = &self.server {
            if server.ssl_keyfile.is_some() != server.ssl_certfile.is_some() {
                return Err(ConfigError::InvalidSetting {
                    key: "server.ssl_keyfile".into(),
                    reason: "ssl_keyfile and ssl_certfile must be given together".into(),
                });
            }
            if server.workers == Some(0) {
                return Err(ConfigError::InvalidSetting {
                    key: "server.workers".into(),
                    reason: "must be at least 1".into(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Result<ServiceConfig, ConfigError> {
        parse_str(text, ConfigFormat::Yaml, "test.yml".as_ref())
    }

    const MINIMAL: &str = "
trees:
  - path: /
    tree: files
    args:
      directory: data
";

    #[test]
    fn test_minimal_document() {
        let config = yaml(MINIMAL).unwrap();
        assert_eq!(config.trees.len(), 1);
        assert_eq!(config.trees[0].tree, "files");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(matches!(
            yaml("trees: []\nmystery: 1\n"),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            yaml("trees:\n  - path: /\n    tree: files\n    colour: red\n"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_uvicorn_is_an_alias_for_server() {
        let config = yaml(&format!("{MINIMAL}uvicorn:\n  port: 9000\n  workers: 2\n")).unwrap();
        let server = config.server.unwrap();
        assert_eq!(server.port, Some(9000));
        assert_eq!(server.workers, Some(2));
    }

    #[test]
    fn test_policy_requires_authenticator() {
        let config = yaml(&format!(
            "{MINIMAL}access_control:\n  access_policy: canopy.access_policies:SimpleAccessPolicy\n"
        ))
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::AccessControlWithoutAuthenticator)
        ));

        let config = yaml(&format!(
            "{MINIMAL}authentication:\n  authenticator: canopy.authenticators:DictionaryAuthenticator\n"
        ))
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_per_tree_policy_requires_authenticator() {
        let config = yaml(
            "
trees:
  - path: /
    tree: files
    access_control:
      access_policy: canopy.access_policies:SimpleAccessPolicy
",
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::AccessControlWithoutAuthenticator)
        ));
    }

    #[test]
    fn test_authentication_defaults() {
        let config = yaml(&format!("{MINIMAL}authentication:\n  allow_anonymous_access: true\n")).unwrap();
        let settings = config.authentication.unwrap().settings().unwrap();
        assert_eq!(settings.access_token_max_age.num_seconds(), 900);
        assert_eq!(settings.refresh_token_max_age.num_seconds(), 604_800);
        assert_eq!(settings.session_max_age, None);
        assert!(settings.allow_anonymous_access);
    }

    #[test]
    fn test_invalid_settings() {
        assert!(matches!(
            yaml("trees: []\n").unwrap().validate(),
            Err(ConfigError::NoTrees)
        ));
        let negative = yaml(&format!("{MINIMAL}authentication:\n  session_max_age: -1\n")).unwrap();
        assert!(matches!(
            negative.validate(),
            Err(ConfigError::InvalidSetting { .. })
        ));
        let cache = yaml(&format!("{MINIMAL}object_cache:\n  available_bytes: -5\n")).unwrap();
        assert!(matches!(
            cache.validate(),
            Err(ConfigError::InvalidCacheSize(_))
        ));
        let tls = yaml(&format!("{MINIMAL}server:\n  ssl_keyfile: key.pem\n")).unwrap();
        assert!(matches!(tls.validate(), Err(ConfigError::InvalidSetting { .. })));
        let node = yaml(&format!(
            "{MINIMAL}media_types:\n  node:\n    application/json: canopy.exporters:json\n"
        ))
        .unwrap();
        assert!(matches!(node.validate(), Err(ConfigError::InvalidSetting { .. })));
        let bad_type = yaml(&format!(
            "{MINIMAL}media_types:\n  array:\n    not-a-type: canopy.exporters:raw\n"
        ))
        .unwrap();
        assert!(matches!(bad_type.validate(), Err(ConfigError::MediaType(_))));
        let bad_alias = yaml(&format!("{MINIMAL}file_extensions:\n  arr: text/*\n")).unwrap();
        assert!(matches!(bad_alias.validate(), Err(ConfigError::MediaType(_))));
    }

    #[test]
    fn test_out_of_range_lifetimes_are_rejected() {
        for value in ["9000000000000", "9223372036854775807"] {
            for key in ["access_token_max_age", "refresh_token_max_age", "session_max_age"] {
                let config =
                    yaml(&format!("{MINIMAL}authentication:\n  {key}: {value}\n")).unwrap();
                match config.validate() {
                    Err(ConfigError::InvalidSetting { key: found, .. }) => {
                        assert_eq!(found, format!("authentication.{key}"))
                    }
                    other => panic!("expected InvalidSetting for {key}={value}, got {other:?}"),
                }
            }
        }

        let largest = yaml(&format!(
            "{MINIMAL}authentication:\n  access_token_max_age: {MAX_LIFETIME_SECONDS}\n"
        ))
        .unwrap();
        assert!(largest.validate().is_ok());
    }

    #[test]
    fn test_cache_log_level() {
        let config = yaml(&format!("{MINIMAL}object_cache:\n  available_bytes: 0.25\n  log_level: debug\n")).unwrap();
        let cache = config.object_cache.unwrap();
        assert_eq!(cache.log_level, CacheLogLevel::Debug);
        assert_eq!(cache.budget().unwrap(), AvailableBytes::Fraction(0.25));
    }
}
