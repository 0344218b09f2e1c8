// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Inter-agent messages and the static routing DAG.
//!
//! Messages can trigger destructive actions (blocking traffic, freezing
//! accounts, pausing pipelines), so the communication topology is a
//! hard-coded allowlist of `(from, to, type)` edges rather than an open
//! mesh. An agent cannot invent a new command channel at runtime; anything
//! off the DAG is dropped and logged, never forwarded.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::agent::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Observe,
    Act,
    Verify,
    Alert,
    Status,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::Observe => "observe",
            MessageType::Act => "act",
            MessageType::Verify => "verify",
            MessageType::Alert => "alert",
            MessageType::Status => "status",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub from: AgentId,
    pub to: AgentId,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl AgentMessage {
    pub fn new(from: AgentId, to: AgentId, message_type: MessageType, payload: Value) -> Self {
        Self {
            from,
            to,
            message_type,
            payload,
            correlation_id: Some(Uuid::new_v4().to_string()),
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// One permitted `(from, to, type)` edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagEdge {
    pub from: AgentId,
    pub to: AgentId,
    #[serde(rename = "type")]
    pub message_type: MessageType,
}

impl DagEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            from: AgentId::new(from),
            to: AgentId::new(to),
            message_type,
        }
    }
}

/// The static allowlist of communication paths. Built once at deployment
/// load; never mutated while the orchestrator runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageDag {
    edges: Vec<DagEdge>,
}

impl MessageDag {
    pub fn new(edges: Vec<DagEdge>) -> Self {
        Self { edges }
    }

    pub fn edges(&self) -> &[DagEdge] {
        &self.edges
    }

    /// Validity is exact-match membership, with `status` messages always
    /// permitted as the liveness/broadcast exception.
    pub fn permits(&self, message: &AgentMessage) -> bool {
        if message.message_type == MessageType::Status {
            return true;
        }
        self.edges.iter().any(|edge| {
            edge.from == message.from
                && edge.to == message.to
                && edge.message_type == message.message_type
        })
    }
}
