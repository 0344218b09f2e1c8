// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod action;
pub mod agent;
pub mod alert;
pub mod condition;
pub mod correlation;
pub mod incident;
pub mod message;
pub mod secret;
pub mod signal;

pub use action::{
    ActionError, ActionId, ActionStatus, AgentAction, AgentObservation, AgentVerification,
    SIGNIFICANCE_THRESHOLD,
};
pub use agent::{
    AgentConfig, AgentId, AgentRole, AgentStatus, DataSource, Schedule, ScheduleParseError,
};
pub use alert::{AlertId, AlertPriority, Escalation, EscalationRule, SecurityAlert};
pub use condition::{CompareOp, Comparison, Condition, ConditionError};
pub use correlation::{
    AttackAnalysis, AttackClassification, AttackPattern, CorrelationMatch, CorrelationRule, Ioc,
    IocMatch, IocType, RiskLevel, SecurityEvent, Severity, ThreatLevel,
};
pub use incident::{IncidentEvent, IncidentId, IncidentStatus, SecurityIncident};
pub use message::{AgentMessage, DagEdge, MessageDag, MessageType};
pub use secret::{AccessKind, AccessRecord, RotationPolicy, SecretRecord, SecretStatus, SecretType};
pub use signal::AgentSignal;
