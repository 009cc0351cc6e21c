use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Health check failed: {0}")]
    Failed(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = HealthError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut lines = vec![format!("Server ({}):", ctx.remote)];

        match ctx.client.get(ctx.url("/_status/livez")).send().await {
            Ok(resp) if resp.status().is_success() => {
                lines.push("  livez:   OK".to_string());
            }
            Ok(resp) => {
                return Err(HealthError::Failed(format!("livez: UNHEALTHY ({})", resp.status())));
            }
            Err(_) => {
                return Err(HealthError::Failed(format!(
                    "{} is not reachable",
                    ctx.remote
                )));
            }
        }

        match ctx.client.get(ctx.url("/_status/version")).send().await {
            Ok(resp) if resp.status().is_success() => {
                let version = resp
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|body| body["version"].as_str().map(str::to_string))
                    .unwrap_or_else(|| "unknown".to_string());
                lines.push(format!("  version: {}", version));
            }
            _ => lines.push("  version: unknown".to_string()),
        }

        Ok(lines.join("\n"))
    }
}
