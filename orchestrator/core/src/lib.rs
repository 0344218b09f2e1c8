// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Outpost core: an autonomous security-agent swarm.
//!
//! Agents run an observe/act/verify lifecycle over their declared data
//! sources and communicate through a typed signal bus. A single
//! orchestrator polices inter-agent messaging against a static DAG, routes
//! alerts, tracks incidents, and drives containment runbooks. The
//! correlation engine turns raw event streams into rule matches, IOC hits,
//! and attack-pattern classifications.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use application::{
    AgentContext, AgentError, AgentHandle, CorrelationEngine, DeploymentConfig, MonitorAgent,
    MonitorPeers, Orchestrator, OrchestratorSettings, Runbook, RunbookStep, SecretStore,
    SecurityAgent, VaultAgent,
};
pub use domain::*;
pub use infrastructure::{
    DataSourceAdapter, NotificationRoute, NotificationSink, SignalBus, ThreatIntelFeed,
};
