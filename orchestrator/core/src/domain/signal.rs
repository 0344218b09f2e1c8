// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Typed agent signals.
//!
//! Every signal kind an agent can emit is a variant here, so each
//! consumer's contract is statically known instead of stringly-typed
//! event names. The orchestrator subscribes to all of them through the
//! signal bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::action::{AgentAction, AgentVerification};
use crate::domain::agent::{AgentId, AgentStatus};
use crate::domain::alert::{Escalation, SecurityAlert};
use crate::domain::message::AgentMessage;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentSignal {
    Alert(SecurityAlert),
    Message(AgentMessage),
    Escalation(Escalation),
    Status {
        agent_id: AgentId,
        status: AgentStatus,
        at: DateTime<Utc>,
    },
    /// Emitted on a fixed interval regardless of cycle activity; the sole
    /// liveness signal the orchestrator trusts.
    Heartbeat {
        agent_id: AgentId,
        status: AgentStatus,
        at: DateTime<Utc>,
    },
    Verification {
        agent_id: AgentId,
        action: AgentAction,
        verification: AgentVerification,
    },
}

impl AgentSignal {
    pub fn status(agent_id: AgentId, status: AgentStatus) -> Self {
        AgentSignal::Status {
            agent_id,
            status,
            at: Utc::now(),
        }
    }

    pub fn heartbeat(agent_id: AgentId, status: AgentStatus) -> Self {
        AgentSignal::Heartbeat {
            agent_id,
            status,
            at: Utc::now(),
        }
    }
}
