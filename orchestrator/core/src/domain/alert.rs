// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Alerts and escalation rules.
//!
//! A [`SecurityAlert`] is immutable once emitted. P1/P2 alerts require
//! acknowledgement and are the only priorities that can open incidents.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::domain::condition::Condition;

/// Alert priority, P1 most severe. Ordering follows severity: `P1 < P2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlertPriority {
    P1,
    P2,
    P3,
    P4,
    P5,
}

impl AlertPriority {
    /// P1/P2 alerts must be acknowledged by an operator.
    pub fn requires_ack(&self) -> bool {
        *self <= AlertPriority::P2
    }
}

impl fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertPriority::P1 => "P1",
            AlertPriority::P2 => "P2",
            AlertPriority::P3 => "P3",
            AlertPriority::P4 => "P4",
            AlertPriority::P5 => "P5",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(pub Uuid);

impl AlertId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub id: AlertId,
    pub timestamp: DateTime<Utc>,
    pub agent_id: AgentId,
    pub priority: AlertPriority,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub message: String,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    pub requires_ack: bool,
}

impl SecurityAlert {
    pub fn new(
        agent_id: AgentId,
        priority: AlertPriority,
        alert_type: impl Into<String>,
        message: impl Into<String>,
        context: HashMap<String, Value>,
    ) -> Self {
        Self {
            id: AlertId::new(),
            timestamp: Utc::now(),
            agent_id,
            priority,
            alert_type: alert_type.into(),
            message: message.into(),
            context,
            requires_ack: priority.requires_ack(),
        }
    }

    /// Document escalation-rule conditions are evaluated against:
    /// `{ "alert": {...}, "context": {...} }`.
    pub fn evaluation_context(&self) -> Value {
        json!({
            "alert": {
                "id": self.id.to_string(),
                "agent_id": self.agent_id.as_str(),
                "priority": self.priority.to_string(),
                "type": self.alert_type,
                "message": self.message,
                "requires_ack": self.requires_ack,
            },
            "context": self.context,
        })
    }
}

/// Evaluated against every alert the owning agent raises. A rule that
/// fails to evaluate (missing field, bad regex) simply does not fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRule {
    pub condition: Condition,
    pub priority: AlertPriority,
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u32>,
}

/// Escalation event produced when a rule fires; the orchestrator
/// subscribes to these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub alert: SecurityAlert,
    pub rule: EscalationRule,
    pub targets: Vec<String>,
}
