//! Deployer collaborator contract (spec §4.7).
//!
//! Backend-specific implementations (docker, systemd, vps, fly, ...) are
//! out of scope; the core only requires the contract be honored
//! synchronously from the caller's perspective. A `MockDeployer` and a
//! `NullDeployer` are provided for tests and for `local`/unconfigured
//! targets respectively.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::models::{AgentConfig, HealthStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Stopped,
    Crashed,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployStatus {
    pub status: RunStatus,
    pub health_status: HealthStatus,
    pub uptime_sec: Option<u64>,
    pub metrics: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl DeployOutcome {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()) }
    }
}

/// Progress callback invoked by `deploy` as it moves through its phases.
pub type ProgressCallback<'a> = &'a (dyn Fn(&str) + Send + Sync);

#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, config: &AgentConfig, progress: ProgressCallback<'_>) -> DeployOutcome;
    async fn stop(&self, config: &AgentConfig) -> DeployOutcome;
    async fn restart(&self, config: &AgentConfig) -> DeployOutcome;
    async fn update_config(&self, config: &AgentConfig) -> DeployOutcome;
    async fn get_status(&self, config: &AgentConfig) -> DeployStatus;
}
