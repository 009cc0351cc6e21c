use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use common::config::{base_dir, parse_configs, ConfigError as DocumentError, ServiceConfig};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

/// Environment variable holding token signing keys, separated by `;`.
/// The first key signs; all of them verify.
pub const SECRET_KEYS_ENV: &str = "CANOPY_SERVER_SECRET_KEYS";

/// Command line settings that take precedence over the `server` section
/// of the configuration document.
#[derive(Debug, Clone, Default)]
pub struct ServerOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub workers: Option<usize>,
}

#[derive(Debug)]
pub struct Config {
    /// the merged configuration document
    pub document: ServiceConfig,
    /// directory that relative paths in the document are resolved
    /// against
    pub config_dir: PathBuf,

    // http server configuration
    pub listen_addr: SocketAddr,
    /// tokio worker threads, defaults to one per core
    pub workers: Option<usize>,

    /// signing keys used when the document names none
    pub secret_keys: Vec<String>,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Load the document at `path` (a file or a directory of files) and
    /// settle the listen address.
    pub fn load(path: &Path, overrides: &ServerOverrides) -> Result<Self, ConfigError> {
        let document = parse_configs(path)?;
        Self::from_document(document, base_dir(path), overrides)
    }

    pub fn from_document(
        document: ServiceConfig,
        config_dir: PathBuf,
        overrides: &ServerOverrides,
    ) -> Result<Self, ConfigError> {
        let server = document.server.clone().unwrap_or_default();

        let host = overrides
            .host
            .clone()
            .or(server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = overrides.port.or(server.port).unwrap_or(DEFAULT_PORT);
        let listen_addr = resolve_listen_addr(&host, port)?;

        let workers = overrides.workers.or(server.workers);
        if workers == Some(0) {
            return Err(ConfigError::InvalidWorkers);
        }

        Ok(Self {
            document,
            config_dir,
            listen_addr,
            workers,
            secret_keys: secret_keys_from_env(),
            log_level: tracing::Level::INFO,
            log_dir: None,
        })
    }
}

fn resolve_listen_addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let unresolvable = || ConfigError::ListenAddr {
        host: host.to_string(),
        port,
    };
    (host, port)
        .to_socket_addrs()
        .map_err(|_| unresolvable())?
        .next()
        .ok_or_else(unresolvable)
}

/// Split a `;`-separated key list, dropping empty entries.
pub fn parse_secret_keys(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn secret_keys_from_env() -> Vec<String> {
    std::env::var(SECRET_KEYS_ENV)
        .map(|value| parse_secret_keys(&value))
        .unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("cannot listen on {host}:{port}")]
    ListenAddr { host: String, port: u16 },
    #[error("workers must be at least 1")]
    InvalidWorkers,
}

#[cfg(test)]
mod tests {
    use common::config::ServerConfig;

    use super::*;

    fn document(server: Option<ServerConfig>) -> ServiceConfig {
        ServiceConfig {
            server,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::from_document(document(None), PathBuf::from("."), &Default::default()).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8000".parse().unwrap());
        assert_eq!(config.workers, None);
    }

    #[test]
    fn test_overrides_win_over_document() {
        let server = ServerConfig {
            host: Some("0.0.0.0".into()),
            port: Some(9000),
            workers: Some(2),
            ..Default::default()
        };
        let overrides = ServerOverrides {
            port: Some(9100),
            workers: Some(8),
            ..Default::default()
        };
        let config =
            Config::from_document(document(Some(server)), PathBuf::from("."), &overrides).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9100".parse().unwrap());
        assert_eq!(config.workers, Some(8));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let overrides = ServerOverrides {
            workers: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            Config::from_document(document(None), PathBuf::from("."), &overrides),
            Err(ConfigError::InvalidWorkers)
        ));
    }

    #[test]
    fn test_parse_secret_keys() {
        assert_eq!(parse_secret_keys("new; old;;"), vec!["new", "old"]);
        assert!(parse_secret_keys("").is_empty());
    }
}
