use std::sync::Arc;
use std::time::{Duration, Instant};

use common::config::ConfigError;
use common::service::Service;

use super::service_config::Config;

/// Main service state, shared by every request handler
#[derive(Debug, Clone)]
pub struct State {
    service: Arc<Service>,
    started_at: Instant,
}

impl State {
    pub fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        let service = Service::builder(config.document.clone())
            .config_dir(config.config_dir.clone())
            .fallback_secret_keys(config.secret_keys.clone())
            .build()?;
        Ok(Self::new(service))
    }

    pub fn new(service: Service) -> Self {
        Self {
            service: Arc::new(service),
            started_at: Instant::now(),
        }
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl AsRef<Service> for State {
    fn as_ref(&self) -> &Service {
        &self.service
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
