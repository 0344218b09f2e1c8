// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Signal Bus - Pub/Sub for Agent Signals
//
// In-memory signal streaming using tokio broadcast channels. Agents
// publish, the orchestrator (and any observer, e.g. tests) subscribes.
// Signals are lost on restart; durable audit belongs to incident
// timelines, not the bus.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::signal::AgentSignal;

/// Bus for publishing and subscribing to agent signals.
#[derive(Clone)]
pub struct SignalBus {
    sender: Arc<broadcast::Sender<AgentSignal>>,
}

impl SignalBus {
    /// Capacity bounds how many signals can be buffered per subscriber
    /// before old ones are dropped.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1024)
    }

    pub fn publish(&self, signal: AgentSignal) {
        debug!(?signal, "publishing signal");
        let receiver_count = self.sender.send(signal).unwrap_or(0);
        if receiver_count == 0 {
            debug!("no subscribers listening to signal");
        }
    }

    pub fn subscribe(&self) -> SignalReceiver {
        SignalReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

pub struct SignalReceiver {
    receiver: broadcast::Receiver<AgentSignal>,
}

impl SignalReceiver {
    /// Receive the next signal, blocking until one is available.
    pub async fn recv(&mut self) -> Result<AgentSignal, SignalBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => SignalBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("signal receiver lagged by {} signals", n);
                SignalBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<AgentSignal, SignalBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => SignalBusError::Empty,
            broadcast::error::TryRecvError::Closed => SignalBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("signal receiver lagged by {} signals", n);
                SignalBusError::Lagged(n)
            }
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignalBusError {
    #[error("signal bus is closed")]
    Closed,

    #[error("no signals available")]
    Empty,

    #[error("receiver lagged by {0} signals (signals were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentId, AgentStatus};
    use crate::domain::alert::{AlertPriority, SecurityAlert};
    use std::collections::HashMap;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = SignalBus::new(16);
        let mut rx = bus.subscribe();

        let alert = SecurityAlert::new(
            AgentId::from("watchtower-siem"),
            AlertPriority::P3,
            "agent-error",
            "observe failed",
            HashMap::new(),
        );
        bus.publish(AgentSignal::Alert(alert.clone()));

        match rx.recv().await.unwrap() {
            AgentSignal::Alert(received) => assert_eq!(received.id, alert.id),
            other => panic!("wrong signal kind: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive() {
        let bus = SignalBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(AgentSignal::status(
            AgentId::from("vault-keeper"),
            AgentStatus::Degraded,
        ));

        assert!(matches!(
            rx1.recv().await.unwrap(),
            AgentSignal::Status { .. }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            AgentSignal::Status { .. }
        ));
    }

    #[tokio::test]
    async fn try_recv_reports_empty() {
        let bus = SignalBus::new(16);
        let mut rx = bus.subscribe();
        assert!(matches!(rx.try_recv(), Err(SignalBusError::Empty)));
    }
}
