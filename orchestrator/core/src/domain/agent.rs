// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent identity and wiring.
//!
//! An [`AgentConfig`] is immutable after the agent is constructed: identity,
//! declared data sources, schedule, and the agent's own escalation rules.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::alert::EscalationRule;

/// Stable, human-assigned agent identifier (e.g. `"watchtower-siem"`).
///
/// Unlike execution-scoped ids these are fixed deployment names: the message
/// DAG and runbooks reference them by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// External source identifier an agent is allowed to read
/// (e.g. `"cloudflare.api"`, `"wazuh.api"`, `"vault.api"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataSource(pub String);

impl DataSource {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Agent archetypes. The archetype does not change runtime behavior by
/// itself; it documents intent and drives deployment-level policy such as
/// the critical subset stopped by a system pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    MetaGuardian,
    WafEngineer,
    VulnerabilityScanner,
    PentestAutomation,
    SiemCorrelation,
    SecretsLifecycle,
    ZeroTrustManager,
    HoneypotOrchestration,
    ChainAnomalyDetector,
    EvidenceIntegrity,
    IncidentCommander,
}

/// Observation schedule.
///
/// Interval agents run a recurring observe/act/verify cycle. `Realtime` and
/// `EventDriven` agents react to inbound messages only and never
/// self-schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Schedule {
    Interval(Duration),
    Realtime,
    EventDriven,
}

impl Schedule {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Schedule::Interval(d) => Some(*d),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid schedule '{0}': expected '<n>m|h|d', 'hourly', 'daily', 'weekly', 'realtime' or 'event-driven'")]
pub struct ScheduleParseError(pub String);

impl FromStr for Schedule {
    type Err = ScheduleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "realtime" => return Ok(Schedule::Realtime),
            "event-driven" => return Ok(Schedule::EventDriven),
            "hourly" => return Ok(Schedule::Interval(Duration::from_secs(60 * 60))),
            "daily" => return Ok(Schedule::Interval(Duration::from_secs(24 * 60 * 60))),
            "weekly" => return Ok(Schedule::Interval(Duration::from_secs(7 * 24 * 60 * 60))),
            _ => {}
        }

        let (value, unit) = s.split_at(s.len().saturating_sub(1));
        let value: u64 = value
            .parse()
            .map_err(|_| ScheduleParseError(s.to_string()))?;
        if value == 0 {
            return Err(ScheduleParseError(s.to_string()));
        }
        let secs = match unit {
            "m" => value * 60,
            "h" => value * 60 * 60,
            "d" => value * 24 * 60 * 60,
            _ => return Err(ScheduleParseError(s.to_string())),
        };
        Ok(Schedule::Interval(Duration::from_secs(secs)))
    }
}

impl TryFrom<String> for Schedule {
    type Error = ScheduleParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Schedule> for String {
    fn from(s: Schedule) -> Self {
        match s {
            Schedule::Realtime => "realtime".to_string(),
            Schedule::EventDriven => "event-driven".to_string(),
            Schedule::Interval(d) => {
                let secs = d.as_secs();
                if secs % (24 * 60 * 60) == 0 {
                    format!("{}d", secs / (24 * 60 * 60))
                } else if secs % (60 * 60) == 0 {
                    format!("{}h", secs / (60 * 60))
                } else {
                    format!("{}m", secs.div_ceil(60))
                }
            }
        }
    }
}

/// Agent liveness/health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Initializing,
    Active,
    Degraded,
    Paused,
    Crashed,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Initializing => "initializing",
            AgentStatus::Active => "active",
            AgentStatus::Degraded => "degraded",
            AgentStatus::Paused => "paused",
            AgentStatus::Crashed => "crashed",
        };
        f.write_str(s)
    }
}

/// Identity and wiring for one agent. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: AgentId,
    pub role: AgentRole,
    #[serde(default)]
    pub data_sources: Vec<DataSource>,
    pub schedule: Schedule,
    #[serde(default)]
    pub escalation_rules: Vec<EscalationRule>,
}

impl AgentConfig {
    pub fn new(id: impl Into<String>, role: AgentRole, schedule: Schedule) -> Self {
        Self {
            id: AgentId::new(id),
            role,
            data_sources: Vec::new(),
            schedule,
            escalation_rules: Vec::new(),
        }
    }

    pub fn with_data_sources(mut self, sources: Vec<DataSource>) -> Self {
        self.data_sources = sources;
        self
    }

    pub fn with_escalation_rules(mut self, rules: Vec<EscalationRule>) -> Self {
        self.escalation_rules = rules;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_parses_interval_shorthand() {
        assert_eq!(
            "5m".parse::<Schedule>().unwrap(),
            Schedule::Interval(Duration::from_secs(300))
        );
        assert_eq!(
            "2h".parse::<Schedule>().unwrap(),
            Schedule::Interval(Duration::from_secs(7200))
        );
        assert_eq!(
            "1d".parse::<Schedule>().unwrap(),
            Schedule::Interval(Duration::from_secs(86400))
        );
    }

    #[test]
    fn schedule_parses_named_forms() {
        assert_eq!(
            "hourly".parse::<Schedule>().unwrap(),
            Schedule::Interval(Duration::from_secs(3600))
        );
        assert_eq!("realtime".parse::<Schedule>().unwrap(), Schedule::Realtime);
        assert_eq!(
            "event-driven".parse::<Schedule>().unwrap(),
            Schedule::EventDriven
        );
    }

    #[test]
    fn schedule_rejects_garbage() {
        assert!("".parse::<Schedule>().is_err());
        assert!("5x".parse::<Schedule>().is_err());
        assert!("0m".parse::<Schedule>().is_err());
        assert!("weekly-ish".parse::<Schedule>().is_err());
    }

    #[test]
    fn schedule_round_trips_through_serde() {
        let s: Schedule = serde_json::from_str("\"5m\"").unwrap();
        assert_eq!(s, Schedule::Interval(Duration::from_secs(300)));
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"5m\"");
    }
}
