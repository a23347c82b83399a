//! `local`/unconfigured deployer (spec §4.7).
//!
//! Backend-specific deployers (docker, systemd, vps, fly, ...) are out of
//! scope; this is the one concrete `Deployer` the engine ships, used for
//! `DeploymentTarget::Local` and as a safe fallback elsewhere. It treats
//! every call as an immediate, healthy no-op.

use async_trait::async_trait;

use crate::domain::models::{AgentConfig, HealthStatus};
use crate::domain::ports::{DeployOutcome, DeployStatus, Deployer, ProgressCallback, RunStatus};

pub struct NullDeployer;

#[async_trait]
impl Deployer for NullDeployer {
    async fn deploy(&self, _config: &AgentConfig, progress: ProgressCallback<'_>) -> DeployOutcome {
        progress("provisioning");
        progress("starting");
        DeployOutcome::ok()
    }

    async fn stop(&self, _config: &AgentConfig) -> DeployOutcome {
        DeployOutcome::ok()
    }

    async fn restart(&self, _config: &AgentConfig) -> DeployOutcome {
        DeployOutcome::ok()
    }

    async fn update_config(&self, _config: &AgentConfig) -> DeployOutcome {
        DeployOutcome::ok()
    }

    async fn get_status(&self, _config: &AgentConfig) -> DeployStatus {
        DeployStatus {
            status: RunStatus::Running,
            health_status: HealthStatus::Healthy,
            uptime_sec: Some(0),
            metrics: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deploy_always_succeeds() {
        let deployer = NullDeployer;
        let config = AgentConfig::new("bot");
        let outcome = deployer.deploy(&config, &|_| {}).await;
        assert!(outcome.success);
    }
}
