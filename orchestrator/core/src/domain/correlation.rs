// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Correlation-engine domain types: security events, windowed rules,
//! indicators of compromise, and attack-pattern classifications.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::condition::Comparison;

/// Five-point severity scale used for rule risk scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub fn score(&self) -> u8 {
        match self {
            Severity::Critical => 5,
            Severity::High => 4,
            Severity::Medium => 3,
            Severity::Low => 2,
            Severity::Info => 1,
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }
}

/// A normalized event from any telemetry source, superset of an
/// observation payload. Condition fields resolve against its JSON form,
/// so `severity`, `type`, and `metadata.*` are all addressable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: Value,
}

impl SecurityEvent {
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Source identity used by the attack-pattern heuristics.
    pub fn source_ip(&self) -> Option<&str> {
        self.metadata.get("ip").and_then(Value::as_str)
    }
}

/// A time-windowed, threshold-based pattern over multiple events. Fires
/// when at least `threshold` events inside the trailing `time_window`
/// satisfy every condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub conditions: Vec<Comparison>,
    #[serde(with = "humantime_serde")]
    pub time_window: Duration,
    pub threshold: usize,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Low => "low",
        };
        f.write_str(s)
    }
}

/// Result of one rule firing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationMatch {
    pub rule_id: String,
    pub rule_name: String,
    pub match_count: usize,
    pub matched_events: Vec<SecurityEvent>,
    pub risk: RiskLevel,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IocType {
    Ip,
    Domain,
    Hash,
    Url,
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    High,
    Medium,
    Low,
}

/// Indicator of Compromise from a threat-intel feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ioc {
    #[serde(rename = "type")]
    pub ioc_type: IocType,
    pub value: String,
    pub threat_level: ThreatLevel,
    pub source: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// An event that matched a known indicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IocMatch {
    pub event_id: String,
    pub ioc: Ioc,
    pub confidence: f64,
}

/// Heuristic attack patterns evaluated over the trailing 30-minute window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttackPattern {
    BruteForce,
    Distributed,
    Exfiltration,
    PrivilegeEscalation,
}

impl fmt::Display for AttackPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttackPattern::BruteForce => "brute-force",
            AttackPattern::Distributed => "distributed",
            AttackPattern::Exfiltration => "exfiltration",
            AttackPattern::PrivilegeEscalation => "privilege-escalation",
        };
        f.write_str(s)
    }
}

/// Overall classification of the current window. Coordination across
/// independent heuristics is itself the strongest evidence, so three or
/// more active patterns outrank any individual rule output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "pattern")]
pub enum AttackClassification {
    Quiet,
    Single(AttackPattern),
    Coordinated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackAnalysis {
    pub classification: AttackClassification,
    pub patterns: Vec<AttackPattern>,
    pub sources: Vec<String>,
    pub confidence: f64,
}

impl AttackAnalysis {
    pub fn is_coordinated(&self) -> bool {
        self.classification == AttackClassification::Coordinated
    }
}
