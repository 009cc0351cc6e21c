use clap::Args;

use common::version::BuildInfo;

/// Print the build of this binary, and optionally of a running server.
#[derive(Args, Debug, Clone)]
pub struct Version {
    /// Emit JSON instead of a summary line
    #[arg(long)]
    pub json: bool,

    /// Also ask the server at --remote for its build
    #[arg(long)]
    pub server: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("could not read the server version from {remote}: {reason}")]
    Server { remote: url::Url, reason: String },
    #[error("failed to encode version: {0}")]
    Encode(#[from] serde_json::Error),
}

async fn server_build(ctx: &crate::cli::op::OpContext) -> Result<BuildInfo, VersionError> {
    let failed = |reason: String| VersionError::Server {
        remote: ctx.remote.clone(),
        reason,
    };
    let resp = ctx
        .client
        .get(ctx.url("/_status/version"))
        .send()
        .await
        .map_err(|e| failed(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(failed(format!("status {}", resp.status())));
    }
    resp.json::<BuildInfo>()
        .await
        .map_err(|e| failed(e.to_string()))
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Version {
    type Error = VersionError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let local = common::build_info!();
        let server = if self.server {
            Some(server_build(ctx).await?)
        } else {
            None
        };

        if self.json {
            let document = match &server {
                Some(server) => serde_json::json!({ "client": local, "server": server }),
                None => serde_json::to_value(&local)?,
            };
            return Ok(serde_json::to_string_pretty(&document)?);
        }

        Ok(match server {
            Some(server) => format!("client: {}\nserver: {}", local, server),
            None => local.to_string(),
        })
    }
}
