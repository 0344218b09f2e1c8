// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Incident-response runbooks.
//!
//! A runbook is an ordered list of `agent.action` steps executed by the
//! orchestrator when a P1 escalation fires. Steps referencing unknown
//! agents are skipped, never fail the run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::agent::AgentId;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid runbook step '{0}': expected '<agent>.<action>'")]
pub struct RunbookStepParseError(pub String);

/// One step: which agent runs which action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunbookStep {
    pub agent_id: AgentId,
    pub action: String,
}

impl RunbookStep {
    pub fn new(agent_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            agent_id: AgentId::new(agent_id),
            action: action.into(),
        }
    }
}

impl FromStr for RunbookStep {
    type Err = RunbookStepParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((agent, action)) if !agent.is_empty() && !action.is_empty() => {
                Ok(Self::new(agent, action))
            }
            _ => Err(RunbookStepParseError(s.to_string())),
        }
    }
}

impl TryFrom<String> for RunbookStep {
    type Error = RunbookStepParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RunbookStep> for String {
    fn from(step: RunbookStep) -> Self {
        step.to_string()
    }
}

impl fmt::Display for RunbookStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.agent_id, self.action)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runbook {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<RunbookStep>,
}
