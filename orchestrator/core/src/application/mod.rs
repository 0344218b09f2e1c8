// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod correlation;
pub mod deployment;
pub mod monitoring;
pub mod orchestrator;
pub mod runbook;
pub mod runtime;
pub mod secrets;

pub use correlation::CorrelationEngine;
pub use deployment::{ConfigError, DeploymentConfig};
pub use monitoring::{MonitorAgent, MonitorPeers};
pub use orchestrator::{Orchestrator, OrchestratorError, OrchestratorSettings};
pub use runbook::{Runbook, RunbookStep};
pub use runtime::{AgentContext, AgentError, AgentHandle, SecurityAgent};
pub use secrets::{SecretStore, VaultAgent};
