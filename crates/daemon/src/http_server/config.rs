use std::net::SocketAddr;

use crate::service_config::Config as ServiceConfig;

/// How the HTTP server listens and which browsers it answers.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    // level of per-response trace events
    pub log_level: tracing::Level,
    /// CORS origins. Empty disables CORS; `*` allows any origin.
    pub allow_origins: Vec<String>,
}

impl Config {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            log_level: tracing::Level::INFO,
            allow_origins: Vec::new(),
        }
    }

    pub fn with_allow_origins(mut self, allow_origins: Vec<String>) -> Self {
        self.allow_origins = allow_origins;
        self
    }
}

impl From<&ServiceConfig> for Config {
    fn from(config: &ServiceConfig) -> Self {
        Self::new(config.listen_addr).with_allow_origins(config.document.allow_origins.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service_config::ServerOverrides;

    #[test]
    fn test_from_service_config() {
        let document = serde_yaml::from_str(
            "trees: [{path: /, tree: files}]\nallow_origins: [\"https://a.example\"]\n",
        )
        .unwrap();
        let service_config = ServiceConfig::from_document(
            document,
            std::path::PathBuf::from("."),
            &ServerOverrides::default(),
        )
        .unwrap();

        let config = Config::from(&service_config);
        assert_eq!(config.listen_addr, service_config.listen_addr);
        assert_eq!(config.allow_origins, vec!["https://a.example".to_string()]);
        assert_eq!(config.log_level, tracing::Level::INFO);
    }
}
