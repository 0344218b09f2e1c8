// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Incident tracking.
//!
//! One incident per ongoing P1/P2 situation: related alerts append to the
//! timeline of an already-open incident sharing affected services instead
//! of opening duplicates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::domain::alert::{AlertPriority, SecurityAlert};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncidentId(pub Uuid);

impl IncidentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IncidentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "INC-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Investigating,
    Contained,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentEvent {
    pub timestamp: DateTime<Utc>,
    pub agent_id: AgentId,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityIncident {
    pub id: IncidentId,
    pub priority: AlertPriority,
    pub title: String,
    pub description: String,
    pub timeline: Vec<IncidentEvent>,
    pub status: IncidentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commander: Option<AgentId>,
    pub affected_services: Vec<String>,
    #[serde(default)]
    pub mitigation: Vec<String>,
}

impl SecurityIncident {
    /// Open a new incident from the triggering alert.
    pub fn from_alert(alert: &SecurityAlert, affected_services: Vec<String>) -> Self {
        Self {
            id: IncidentId::new(),
            priority: alert.priority,
            title: alert.message.clone(),
            description: format!("Incident triggered by alert from {}", alert.agent_id),
            timeline: vec![IncidentEvent {
                timestamp: Utc::now(),
                agent_id: alert.agent_id.clone(),
                event: "incident-created".to_string(),
                data: serde_json::to_value(alert).ok(),
            }],
            status: IncidentStatus::Open,
            commander: None,
            affected_services,
            mitigation: Vec::new(),
        }
    }

    pub fn record(&mut self, agent_id: AgentId, event: impl Into<String>, data: Option<Value>) {
        self.timeline.push(IncidentEvent {
            timestamp: Utc::now(),
            agent_id,
            event: event.into(),
            data,
        });
    }

    /// Correlate a subsequent related alert into this incident's timeline.
    /// The incident keeps the most severe priority seen.
    pub fn correlate_alert(&mut self, alert: &SecurityAlert, services: &[String]) {
        self.priority = self.priority.min(alert.priority);
        for service in services {
            if !self.affected_services.contains(service) {
                self.affected_services.push(service.clone());
            }
        }
        self.record(
            alert.agent_id.clone(),
            "correlated-alert",
            serde_json::to_value(alert).ok(),
        );
    }

    pub fn set_status(&mut self, status: IncidentStatus, by: AgentId) {
        self.status = status;
        self.record(by, format!("status-{}", status_label(status)), None);
    }

    pub fn is_open(&self) -> bool {
        self.status != IncidentStatus::Resolved
    }

    pub fn shares_services(&self, services: &[String]) -> bool {
        services
            .iter()
            .any(|s| self.affected_services.contains(s))
    }
}

fn status_label(status: IncidentStatus) -> &'static str {
    match status {
        IncidentStatus::Open => "open",
        IncidentStatus::Investigating => "investigating",
        IncidentStatus::Contained => "contained",
        IncidentStatus::Resolved => "resolved",
    }
}
