// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Observations, actions, and post-action verification.
//!
//! The cycle contract: `observe()` produces [`AgentObservation`]s,
//! significant ones feed `act()` which returns [`AgentAction`] intents, and
//! every action gets an independent [`AgentVerification`]. An action's own
//! success flag is never trusted; verification re-checks the effect.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::agent::DataSource;

/// Observations scoring above this are considered significant and passed
/// to `act()`.
pub const SIGNIFICANCE_THRESHOLD: f64 = 0.7;

/// A timestamped data point from a declared source. Never mutated after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentObservation {
    pub timestamp: DateTime<Utc>,
    pub source: DataSource,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_score: Option<f64>,
}

impl AgentObservation {
    pub fn new(source: DataSource, data: Value, anomaly_score: Option<f64>) -> Self {
        Self {
            timestamp: Utc::now(),
            source,
            data,
            anomaly_score,
        }
    }

    pub fn is_significant(&self) -> bool {
        self.anomaly_score.unwrap_or(0.0) > SIGNIFICANCE_THRESHOLD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(pub Uuid);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionStatus::Completed | ActionStatus::Failed)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("action {0} already reached terminal status")]
    AlreadyTerminal(ActionId),
}

/// An agent's declared intent to remediate or contain, tracked to exactly
/// one terminal status. The id correlates the action with its verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAction {
    pub id: ActionId,
    #[serde(rename = "type")]
    pub action_type: String,
    pub description: String,
    #[serde(default)]
    pub params: HashMap<String, Value>,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentAction {
    pub fn new(
        action_type: impl Into<String>,
        description: impl Into<String>,
        params: HashMap<String, Value>,
    ) -> Self {
        Self {
            id: ActionId::new(),
            action_type: action_type.into(),
            description: description.into(),
            params,
            status: ActionStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn begin(&mut self) -> Result<(), ActionError> {
        if self.status.is_terminal() {
            return Err(ActionError::AlreadyTerminal(self.id));
        }
        self.status = ActionStatus::Executing;
        Ok(())
    }

    pub fn complete(&mut self, result: Value) -> Result<(), ActionError> {
        if self.status.is_terminal() {
            return Err(ActionError::AlreadyTerminal(self.id));
        }
        self.status = ActionStatus::Completed;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), ActionError> {
        if self.status.is_terminal() {
            return Err(ActionError::AlreadyTerminal(self.id));
        }
        self.status = ActionStatus::Failed;
        self.error = Some(error.into());
        Ok(())
    }
}

/// Independent confidence-scored re-check of an action's intended effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentVerification {
    pub action_id: ActionId,
    pub verified: bool,
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Vec<String>,
}

impl AgentVerification {
    pub fn new(action_id: ActionId, verified: bool, confidence: f64) -> Self {
        Self {
            action_id,
            verified,
            confidence,
            evidence: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }

    /// True when an action claims success but its effect is not observably
    /// true. Distinct from `status == Failed` and alert-worthy on its own.
    pub fn contradicts(&self, action: &AgentAction) -> bool {
        action.status == ActionStatus::Completed && !self.verified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn significance_threshold_is_strict() {
        let obs = |score| {
            AgentObservation::new(DataSource::new("wazuh.api"), json!({}), score)
        };
        assert!(!obs(None).is_significant());
        assert!(!obs(Some(0.7)).is_significant());
        assert!(obs(Some(0.71)).is_significant());
    }

    #[test]
    fn action_transitions_once_to_terminal() {
        let mut action = AgentAction::new("block-iocs", "block indicators", HashMap::new());
        assert_eq!(action.status, ActionStatus::Pending);
        action.begin().unwrap();
        action.complete(json!({"blocked": 3})).unwrap();
        assert_eq!(action.status, ActionStatus::Completed);

        assert_eq!(
            action.fail("late failure"),
            Err(ActionError::AlreadyTerminal(action.id))
        );
        assert_eq!(
            action.complete(json!({})),
            Err(ActionError::AlreadyTerminal(action.id))
        );
        // Terminal state and result untouched by the rejected transitions.
        assert_eq!(action.status, ActionStatus::Completed);
        assert!(action.error.is_none());
    }

    #[test]
    fn verification_mismatch_is_distinct_from_action_failure() {
        let mut completed = AgentAction::new("freeze-accounts", "freeze", HashMap::new());
        completed.complete(json!({})).unwrap();
        let mut failed = AgentAction::new("freeze-accounts", "freeze", HashMap::new());
        failed.fail("api unreachable").unwrap();

        let unverified = AgentVerification::new(completed.id, false, 0.2);
        assert!(unverified.contradicts(&completed));
        // A failed action with a negative verification is not a mismatch;
        // the failure already surfaced through the action status.
        assert!(!unverified.contradicts(&failed));
    }
}
