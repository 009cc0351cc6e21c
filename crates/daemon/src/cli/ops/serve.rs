use std::path::PathBuf;

use clap::Args;

use canopy_daemon::service_config::{ConfigError, ServerOverrides};
use canopy_daemon::{spawn_service, ServiceConfig};
use common::config::parse_configs;

#[derive(Args, Debug, Clone)]
pub struct Serve {
    /// Configuration file, or a directory of configuration files
    pub config: PathBuf,

    /// Override the listen host (default from config, else 127.0.0.1)
    #[arg(long)]
    pub host: Option<String>,

    /// Override the listen port (default from config, else 8000)
    #[arg(long)]
    pub port: Option<u16>,

    /// Override the number of worker threads
    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl Serve {
    fn overrides(&self) -> ServerOverrides {
        ServerOverrides {
            host: self.host.clone(),
            port: self.port,
            workers: self.workers,
        }
    }

    /// Worker threads for the runtime, known before it starts. Errors in
    /// the configuration are left for `execute` to report.
    pub fn worker_threads(&self) -> Option<usize> {
        self.workers.or_else(|| {
            parse_configs(&self.config)
                .ok()?
                .server?
                .workers
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Serve {
    type Error = ServeError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = ServiceConfig::load(&self.config, &self.overrides())?;
        config.log_level = self.log_level;
        config.log_dir = self.log_dir.clone();

        spawn_service(&config).await;
        Ok("server stopped".to_string())
    }
}
