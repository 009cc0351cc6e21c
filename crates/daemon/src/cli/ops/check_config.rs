use std::fmt::Write;
use std::path::PathBuf;

use clap::Args;

use canopy_daemon::service_config::{ConfigError, ServerOverrides};
use canopy_daemon::service_state::StateSetupError;
use canopy_daemon::{ServiceConfig, ServiceState};

/// Validate a configuration and build every component it names, without
/// serving.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// Configuration file, or a directory of configuration files
    pub config: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckConfigError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    State(#[from] StateSetupError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for CheckConfig {
    type Error = CheckConfigError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = ServiceConfig::load(&self.config, &ServerOverrides::default())?;
        let state = ServiceState::from_config(&config)?;
        let service = state.service();

        let mut out = String::new();
        let _ = writeln!(out, "Configuration OK: {}", self.config.display());
        let _ = writeln!(out, "  listen:   {}", config.listen_addr);
        let _ = writeln!(out, "Trees:");
        for mount in service.mounts().mounts() {
            let _ = writeln!(out, "  {:<20} {:?}", mount.path(), mount.tree);
        }
        let auth = service.auth();
        let _ = writeln!(out, "Authentication:");
        let _ = writeln!(out, "  password login:   {}", auth.has_authenticator());
        let _ = writeln!(out, "  anonymous access: {}", auth.allows_anonymous());
        if service.generated_api_key().is_some() {
            let _ = writeln!(out, "  single-user mode: an API key is generated at startup");
        }
        let _ = write!(
            out,
            "Object cache:\n  available bytes:  {}",
            service.cache().available_bytes()
        );
        Ok(out)
    }
}
