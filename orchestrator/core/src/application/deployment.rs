// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Deployment configuration.
//!
//! One YAML file describes a whole deployment: agents, the message DAG,
//! notification routing, correlation rules, and runbooks. The file is
//! loaded once at boot and validated before anything starts.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::orchestrator::OrchestratorSettings;
use crate::application::runbook::Runbook;
use crate::domain::agent::{AgentConfig, AgentId};
use crate::domain::correlation::CorrelationRule;
use crate::domain::message::{DagEdge, MessageDag};
use crate::infrastructure::notify::NotificationRoute;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse deployment config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid deployment config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Routes every alert fans out to.
    #[serde(default)]
    pub primary: Vec<String>,
    /// Extra routes for P1 alerts.
    #[serde(default)]
    pub incident_commander: Vec<String>,
}

/// Peer wiring for the SIEM correlation agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub waf: Option<AgentId>,
    #[serde(default)]
    pub zero_trust: Option<AgentId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub dag: Vec<DagEdge>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub runbooks: HashMap<String, Runbook>,
    /// Runbook executed on P1 escalations.
    #[serde(default)]
    pub p1_runbook: Option<String>,
    /// Agents a system pause stops.
    #[serde(default)]
    pub critical_agents: Vec<AgentId>,
    /// Agent nudged when the swarm degrades.
    #[serde(default)]
    pub meta_guardian: Option<AgentId>,
    #[serde(default)]
    pub correlation_rules: Vec<CorrelationRule>,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl DeploymentConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if !seen.insert(&agent.id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate agent id '{}'",
                    agent.id
                )));
            }
        }
        if let Some(name) = &self.p1_runbook {
            if !self.runbooks.contains_key(name) {
                return Err(ConfigError::Invalid(format!(
                    "p1_runbook '{name}' is not defined under runbooks"
                )));
            }
        }
        for edge in &self.dag {
            if edge.from == edge.to {
                return Err(ConfigError::Invalid(format!(
                    "dag edge from '{}' to itself",
                    edge.from
                )));
            }
        }
        Ok(())
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        let parse_routes = |targets: &[String]| -> Vec<NotificationRoute> {
            targets
                .iter()
                .map(|t| t.parse().unwrap_or_else(|never| match never {}))
                .collect()
        };
        OrchestratorSettings {
            dag: MessageDag::new(self.dag.clone()),
            primary_routes: parse_routes(&self.routing.primary),
            incident_commander_routes: parse_routes(&self.routing.incident_commander),
            runbooks: self.runbooks.clone(),
            p1_runbook: self.p1_runbook.clone(),
            critical_agents: self.critical_agents.clone(),
            meta_guardian: self.meta_guardian.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::Schedule;
    use std::io::Write;
    use std::time::Duration;

    const SAMPLE: &str = r##"
agents:
  - id: watchtower-siem
    role: siem-correlation
    schedule: 5m
    data_sources: [wazuh.api]
    escalation_rules:
      - condition:
          field: context.correlated_threats
          op: gt
          value: 5
        priority: P1
        targets: [pager://incident-commander]
        timeout_minutes: 15
  - id: perimeter-waf
    role: waf-engineer
    schedule: realtime
dag:
  - { from: watchtower-siem, to: perimeter-waf, type: act }
routing:
  primary: ["webhook://hooks.internal/sec", "#sec-ops"]
  incident_commander: ["pager://incident-commander"]
runbooks:
  critical-incident:
    name: critical-incident
    steps:
      - perimeter-waf.enable_under_attack_mode
p1_runbook: critical-incident
critical_agents: [watchtower-siem]
meta_guardian: overseer
correlation_rules:
  - id: auth-burst
    name: credential attack
    conditions:
      - field: type
        op: equals
        value: authentication_failure
    time_window: 10m
    threshold: 20
    action: investigate
monitor:
  waf: perimeter-waf
"##;

    #[test]
    fn sample_deployment_parses_end_to_end() {
        let config = DeploymentConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.agents.len(), 2);
        assert_eq!(
            config.agents[0].schedule,
            Schedule::Interval(Duration::from_secs(300))
        );
        assert_eq!(config.agents[0].escalation_rules.len(), 1);
        assert_eq!(config.dag.len(), 1);
        assert_eq!(config.correlation_rules[0].time_window, Duration::from_secs(600));
        assert_eq!(config.monitor.waf, Some(AgentId::from("perimeter-waf")));

        let settings = config.orchestrator_settings();
        assert_eq!(settings.primary_routes.len(), 2);
        assert_eq!(settings.primary_routes[1].protocol, "notify");
        assert_eq!(settings.p1_runbook.as_deref(), Some("critical-incident"));
    }

    #[test]
    fn duplicate_agent_ids_are_rejected() {
        let yaml = r#"
agents:
  - { id: a, role: waf-engineer, schedule: realtime }
  - { id: a, role: siem-correlation, schedule: 5m }
"#;
        assert!(matches!(
            DeploymentConfig::from_yaml(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn missing_p1_runbook_is_rejected() {
        let yaml = "p1_runbook: nope\n";
        assert!(matches!(
            DeploymentConfig::from_yaml(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn self_edge_in_dag_is_rejected() {
        let yaml = "dag:\n  - { from: a, to: a, type: act }\n";
        assert!(matches!(
            DeploymentConfig::from_yaml(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = DeploymentConfig::load(file.path()).unwrap();
        assert_eq!(config.agents.len(), 2);

        assert!(matches!(
            DeploymentConfig::load("/nonexistent/deployment.yaml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
