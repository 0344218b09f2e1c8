// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The orchestrator: agent registry, alert routing, incident lifecycle,
//! message-bus policing, and system pause/resume.
//!
//! One orchestrator per deployment. It subscribes to the signal bus,
//! routes alerts to notification targets, opens or correlates incidents
//! for P1/P2 alerts, validates every inter-agent message against the
//! static DAG, and runs containment runbooks when a P1 escalation fires.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::runbook::Runbook;
use crate::application::runtime::{AgentHandle, SecurityAgent};
use crate::domain::agent::{AgentId, AgentStatus};
use crate::domain::alert::{AlertPriority, Escalation, SecurityAlert};
use crate::domain::incident::{IncidentId, SecurityIncident};
use crate::domain::message::{AgentMessage, MessageDag, MessageType};
use crate::domain::signal::AgentSignal;
use crate::infrastructure::notify::{NotificationRoute, NotificationSink};
use crate::infrastructure::signal_bus::{SignalBus, SignalBusError};

/// Queued messages are drained in batches on this period.
pub const QUEUE_DRAIN_INTERVAL: Duration = Duration::from_millis(100);
/// Pause between runbook steps so containment effects land in order.
pub const RUNBOOK_STEP_DELAY: Duration = Duration::from_secs(1);
/// Fraction of unhealthy agents above which the swarm counts as degraded.
pub const DEGRADED_RATIO: f64 = 0.2;

const ORCHESTRATOR_ID: &str = "orchestrator";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("agent '{0}' is already registered")]
    DuplicateAgent(AgentId),

    #[error("agent '{0}' is not registered")]
    UnknownAgent(AgentId),

    #[error("runbook '{0}' is not configured")]
    UnknownRunbook(String),
}

/// Deployment-level wiring the orchestrator is constructed with.
#[derive(Clone, Default)]
pub struct OrchestratorSettings {
    pub dag: MessageDag,
    /// Routes every alert fans out to.
    pub primary_routes: Vec<NotificationRoute>,
    /// Additional routes for P1 alerts.
    pub incident_commander_routes: Vec<NotificationRoute>,
    pub runbooks: HashMap<String, Runbook>,
    /// Runbook executed when a P1 escalation fires.
    pub p1_runbook: Option<String>,
    /// Agents stopped by a system pause.
    pub critical_agents: Vec<AgentId>,
    /// Agent messaged when the swarm degrades past [`DEGRADED_RATIO`].
    pub meta_guardian: Option<AgentId>,
}

struct Inner {
    bus: SignalBus,
    settings: OrchestratorSettings,
    notifier: Arc<dyn NotificationSink>,
    agents: DashMap<AgentId, AgentHandle>,
    heartbeats: DashMap<AgentId, DateTime<Utc>>,
    incidents: DashMap<IncidentId, SecurityIncident>,
    queue_tx: mpsc::UnboundedSender<AgentMessage>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<AgentMessage>>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
    paused: AtomicBool,
    swarm_degraded: AtomicBool,
    started_at: Instant,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        bus: SignalBus,
        settings: OrchestratorSettings,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                bus,
                settings,
                notifier,
                agents: DashMap::new(),
                heartbeats: DashMap::new(),
                incidents: DashMap::new(),
                queue_tx,
                queue_rx: Mutex::new(Some(queue_rx)),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                paused: AtomicBool::new(false),
                swarm_degraded: AtomicBool::new(false),
                started_at: Instant::now(),
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn bus(&self) -> &SignalBus {
        &self.inner.bus
    }

    /// Register an agent. Ids are unique per deployment.
    pub fn register(&self, agent: Arc<dyn SecurityAgent>) -> Result<AgentHandle, OrchestratorError> {
        let id = agent.config().id.clone();
        if self.inner.agents.contains_key(&id) {
            return Err(OrchestratorError::DuplicateAgent(id));
        }
        let handle = AgentHandle::new(agent, self.inner.bus.clone());
        info!(agent = %id, role = ?handle.config().role, "agent registered");
        self.inner.agents.insert(id, handle.clone());
        Ok(handle)
    }

    pub fn agent(&self, id: &AgentId) -> Option<AgentHandle> {
        self.inner.agents.get(id).map(|h| h.clone())
    }

    pub fn agent_count(&self) -> usize {
        self.inner.agents.len()
    }

    /// Start the orchestrator's own loops, then every registered agent.
    /// Subscribing before the agents start means not even their first
    /// cycle's signals are missed.
    pub async fn start(&self) {
        let rx = self.inner.bus.subscribe();
        {
            let mut tasks = self.inner.tasks.lock();
            tasks.push(tokio::spawn(Self::signal_loop(
                self.clone(),
                rx,
                self.inner.cancel.clone(),
            )));
            tasks.push(tokio::spawn(Self::drain_loop(
                self.clone(),
                self.inner.cancel.clone(),
            )));
        }

        for entry in self.inner.agents.iter() {
            if let Err(e) = entry.value().start().await {
                error!(agent = %entry.key(), error = %e, "agent failed to start");
            }
        }
        info!(agents = self.agent_count(), "orchestrator started");
    }

    /// Stop the loops, then every agent.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        for entry in self.inner.agents.iter() {
            entry.value().stop().await;
        }
        info!("orchestrator stopped");
    }

    pub fn delivered_count(&self) -> u64 {
        self.inner.delivered.load(Ordering::SeqCst)
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub fn incidents(&self) -> Vec<SecurityIncident> {
        self.inner
            .incidents
            .iter()
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn open_incident_count(&self) -> usize {
        self.inner
            .incidents
            .iter()
            .filter(|e| e.value().is_open())
            .count()
    }

    /// Stop the critical agent subset and hold new work. The bus keeps
    /// flowing so the remaining agents can still report.
    pub async fn pause_system(&self, reason: &str) {
        if self.inner.paused.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(%reason, "system pause initiated");
        for id in &self.inner.settings.critical_agents {
            match self.agent(id) {
                Some(handle) => handle.stop().await,
                None => warn!(agent = %id, "critical agent not registered, skipping"),
            }
        }
    }

    /// Restart the agents a pause stopped.
    pub async fn resume_system(&self) {
        if !self.inner.paused.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("system resume initiated");
        for id in &self.inner.settings.critical_agents {
            if let Some(handle) = self.agent(id) {
                if handle.status() == AgentStatus::Paused {
                    if let Err(e) = handle.start().await {
                        error!(agent = %id, error = %e, "agent failed to resume");
                    }
                }
            }
        }
    }

    /// Health snapshot served by the HTTP surface.
    pub fn health(&self) -> Value {
        let mut agents = serde_json::Map::new();
        let mut unhealthy = 0usize;
        for entry in self.inner.agents.iter() {
            let status = entry.value().status();
            if matches!(status, AgentStatus::Degraded | AgentStatus::Crashed) {
                unhealthy += 1;
            }
            let last_heartbeat = self
                .inner
                .heartbeats
                .get(entry.key())
                .map(|ts| ts.to_rfc3339());
            agents.insert(
                entry.key().to_string(),
                json!({
                    "status": status.to_string(),
                    "last_heartbeat": last_heartbeat,
                }),
            );
        }

        let status = if self.is_paused() {
            "paused"
        } else if self.degraded_fraction(unhealthy) > DEGRADED_RATIO {
            "degraded"
        } else {
            "ok"
        };

        json!({
            "status": status,
            "agents": Value::Object(agents),
            "open_incidents": self.open_incident_count(),
            "messages": {
                "delivered": self.delivered_count(),
                "dropped": self.dropped_count(),
            },
            "uptime_seconds": self.inner.started_at.elapsed().as_secs(),
        })
    }

    fn degraded_fraction(&self, unhealthy: usize) -> f64 {
        let total = self.inner.agents.len();
        if total == 0 {
            return 0.0;
        }
        unhealthy as f64 / total as f64
    }

    async fn signal_loop(
        this: Orchestrator,
        mut rx: crate::infrastructure::signal_bus::SignalReceiver,
        cancel: CancellationToken,
    ) {
        loop {
            let signal = tokio::select! {
                _ = cancel.cancelled() => break,
                signal = rx.recv() => signal,
            };
            match signal {
                Ok(signal) => this.dispatch(signal).await,
                Err(SignalBusError::Lagged(n)) => {
                    warn!(dropped = n, "orchestrator lagged behind the signal bus");
                }
                Err(_) => break,
            }
        }
    }

    async fn dispatch(&self, signal: AgentSignal) {
        match signal {
            AgentSignal::Alert(alert) => self.route_alert(alert).await,
            AgentSignal::Escalation(escalation) => self.handle_escalation(escalation).await,
            AgentSignal::Message(message) => self.enqueue(message),
            AgentSignal::Status { agent_id, status, .. } => {
                debug!(agent = %agent_id, %status, "status update");
                self.check_swarm_health();
            }
            AgentSignal::Heartbeat { agent_id, at, .. } => {
                self.inner.heartbeats.insert(agent_id, at);
            }
            AgentSignal::Verification { agent_id, action, verification } => {
                debug!(
                    agent = %agent_id,
                    action = %action.id,
                    verified = verification.verified,
                    "verification recorded"
                );
                metrics::counter!("outpost_verifications_total").increment(1);
            }
        }
    }

    /// DAG check happens at enqueue time, before the message ever reaches
    /// the queue. Off-DAG traffic is dropped and counted, never forwarded.
    fn enqueue(&self, message: AgentMessage) {
        if !self.inner.settings.dag.permits(&message) {
            warn!(
                from = %message.from,
                to = %message.to,
                r#type = %message.message_type,
                "message path not in DAG, dropping"
            );
            self.inner.dropped.fetch_add(1, Ordering::SeqCst);
            metrics::counter!("outpost_messages_dropped_total").increment(1);
            return;
        }
        // Send only fails when the drain loop is gone, i.e. at shutdown.
        let _ = self.inner.queue_tx.send(message);
    }

    async fn drain_loop(this: Orchestrator, cancel: CancellationToken) {
        let Some(mut rx) = this.inner.queue_rx.lock().take() else {
            return;
        };
        let mut ticker = tokio::time::interval(QUEUE_DRAIN_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let mut batch = Vec::new();
            while let Ok(message) = rx.try_recv() {
                batch.push(message);
            }
            for message in batch {
                this.deliver(message).await;
            }
        }
    }

    async fn deliver(&self, message: AgentMessage) {
        let Some(handle) = self.agent(&message.to) else {
            warn!(to = %message.to, "message recipient not registered, dropping");
            self.inner.dropped.fetch_add(1, Ordering::SeqCst);
            metrics::counter!("outpost_messages_dropped_total").increment(1);
            return;
        };
        self.inner.delivered.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("outpost_messages_delivered_total").increment(1);
        if let Err(e) = handle.deliver(message).await {
            warn!(to = %handle.agent_id(), error = %e, "message handler failed");
        }
    }

    /// Fan an alert out to the configured routes and manage incidents.
    /// Notification failures are logged per route and never block the
    /// remaining routes or the incident path.
    async fn route_alert(&self, alert: SecurityAlert) {
        for route in &self.inner.settings.primary_routes {
            if let Err(e) = self.inner.notifier.send(route, &alert).await {
                warn!(route = %route, error = %e, "notification failed");
            }
        }
        if alert.priority == AlertPriority::P1 {
            for route in &self.inner.settings.incident_commander_routes {
                if let Err(e) = self.inner.notifier.send(route, &alert).await {
                    warn!(route = %route, error = %e, "notification failed");
                }
            }
        }
        if alert.priority.requires_ack() {
            self.open_or_correlate(&alert);
        }
    }

    /// P1/P2 alerts either join an open incident touching the same
    /// services or open a new one.
    fn open_or_correlate(&self, alert: &SecurityAlert) {
        let services = affected_services(alert);

        if !services.is_empty() {
            for mut entry in self.inner.incidents.iter_mut() {
                let incident = entry.value_mut();
                if incident.is_open() && incident.shares_services(&services) {
                    info!(incident = %incident.id, alert = %alert.id, "alert correlated into open incident");
                    incident.correlate_alert(alert, &services);
                    return;
                }
            }
        }

        let incident = SecurityIncident::from_alert(alert, services);
        info!(
            incident = %incident.id,
            priority = %incident.priority,
            services = ?incident.affected_services,
            "incident opened"
        );
        metrics::counter!("outpost_incidents_total").increment(1);
        self.inner.incidents.insert(incident.id, incident);
    }

    async fn handle_escalation(&self, escalation: Escalation) {
        info!(
            alert = %escalation.alert.id,
            priority = %escalation.rule.priority,
            targets = ?escalation.targets,
            "escalation received"
        );
        for target in &escalation.targets {
            let route: NotificationRoute = target.parse().unwrap_or_else(|never| match never {});
            if let Err(e) = self.inner.notifier.send(&route, &escalation.alert).await {
                warn!(route = %route, error = %e, "escalation notification failed");
            }
        }

        if escalation.rule.priority == AlertPriority::P1 {
            if let Some(name) = self.inner.settings.p1_runbook.clone() {
                if let Err(e) = self.execute_runbook(&name, &escalation.alert).await {
                    error!(runbook = %name, error = %e, "runbook execution failed");
                }
            }
        }
    }

    /// Run a containment runbook: each step is delivered directly to the
    /// named agent as an orchestrator-initiated `act` message. Unknown
    /// agents skip their step; remaining steps still run.
    pub async fn execute_runbook(
        &self,
        name: &str,
        alert: &SecurityAlert,
    ) -> Result<(), OrchestratorError> {
        let runbook = self
            .inner
            .settings
            .runbooks
            .get(name)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownRunbook(name.to_string()))?;
        info!(runbook = %runbook.name, steps = runbook.steps.len(), "executing runbook");

        for (index, step) in runbook.steps.iter().enumerate() {
            let Some(handle) = self.agent(&step.agent_id) else {
                warn!(runbook = %runbook.name, step = %step, "step agent not registered, skipping");
                continue;
            };
            if index > 0 {
                tokio::time::sleep(RUNBOOK_STEP_DELAY).await;
            }
            let message = AgentMessage::new(
                AgentId::from(ORCHESTRATOR_ID),
                step.agent_id.clone(),
                MessageType::Act,
                json!({
                    "action": step.action,
                    "runbook": runbook.name,
                    "alert_id": alert.id.to_string(),
                }),
            );
            if let Err(e) = handle.deliver(message).await {
                warn!(runbook = %runbook.name, step = %step, error = %e, "runbook step failed");
            } else {
                info!(runbook = %runbook.name, step = %step, "runbook step dispatched");
            }
        }
        Ok(())
    }

    /// When more than [`DEGRADED_RATIO`] of the swarm is degraded or
    /// crashed, nudge the meta-guardian once per degradation episode.
    fn check_swarm_health(&self) {
        let unhealthy = self
            .inner
            .agents
            .iter()
            .filter(|e| {
                matches!(
                    e.value().status(),
                    AgentStatus::Degraded | AgentStatus::Crashed
                )
            })
            .count();
        let degraded = self.degraded_fraction(unhealthy) > DEGRADED_RATIO;

        if degraded && !self.inner.swarm_degraded.swap(true, Ordering::SeqCst) {
            warn!(unhealthy, total = self.inner.agents.len(), "swarm degraded");
            if let Some(guardian) = self.inner.settings.meta_guardian.clone() {
                let message = AgentMessage::new(
                    AgentId::from(ORCHESTRATOR_ID),
                    guardian,
                    MessageType::Observe,
                    json!({"reason": "swarm-degraded", "unhealthy": unhealthy}),
                );
                // Orchestrator-initiated, so it bypasses the DAG and goes
                // straight onto the queue.
                let _ = self.inner.queue_tx.send(message);
            }
        } else if !degraded {
            self.inner.swarm_degraded.store(false, Ordering::SeqCst);
        }
    }
}

/// Derive the service blast radius of an alert from its context and a
/// couple of domain heuristics.
fn affected_services(alert: &SecurityAlert) -> Vec<String> {
    let mut services: Vec<String> = alert
        .context
        .get("pipelines")
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let haystack = format!("{} {}", alert.alert_type, alert.message).to_lowercase();
    if haystack.contains("mrv") || haystack.contains("mint") {
        for s in ["mint-pipeline", "carbon-registry"] {
            if !services.iter().any(|x| x == s) {
                services.push(s.to_string());
            }
        }
    }
    if haystack.contains("waf") || haystack.contains("ddos") {
        for s in ["edge", "api"] {
            if !services.iter().any(|x| x == s) {
                services.push(s.to_string());
            }
        }
    }
    services
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::runbook::RunbookStep;
    use crate::application::runtime::{AgentContext, AgentError};
    use crate::domain::action::{AgentAction, AgentObservation, AgentVerification};
    use crate::domain::agent::{AgentConfig, AgentRole, Schedule};
    use crate::infrastructure::notify::LogNotifier;
    use async_trait::async_trait;

    /// Event-driven agent that records delivered messages.
    struct Recorder {
        config: AgentConfig,
        received: Mutex<Vec<AgentMessage>>,
    }

    impl Recorder {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                config: AgentConfig::new(id, AgentRole::WafEngineer, Schedule::EventDriven),
                received: Mutex::new(Vec::new()),
            })
        }

        fn received(&self) -> Vec<AgentMessage> {
            self.received.lock().clone()
        }
    }

    #[async_trait]
    impl SecurityAgent for Recorder {
        fn config(&self) -> &AgentConfig {
            &self.config
        }

        async fn observe(&self, _ctx: &AgentContext) -> Result<Vec<AgentObservation>, AgentError> {
            Ok(Vec::new())
        }

        async fn act(
            &self,
            _ctx: &AgentContext,
            _significant: &[AgentObservation],
        ) -> Result<Vec<AgentAction>, AgentError> {
            Ok(Vec::new())
        }

        async fn verify(
            &self,
            _ctx: &AgentContext,
            action: &AgentAction,
        ) -> Result<AgentVerification, AgentError> {
            Ok(AgentVerification::new(action.id, true, 1.0))
        }

        async fn handle_message(
            &self,
            _ctx: &AgentContext,
            message: AgentMessage,
        ) -> Result<(), AgentError> {
            self.received.lock().push(message);
            Ok(())
        }
    }

    fn orchestrator(settings: OrchestratorSettings) -> Orchestrator {
        Orchestrator::new(SignalBus::new(256), settings, Arc::new(LogNotifier))
    }

    fn p1_alert(agent: &str, alert_type: &str, message: &str) -> SecurityAlert {
        SecurityAlert::new(
            AgentId::from(agent),
            AlertPriority::P1,
            alert_type,
            message,
            HashMap::new(),
        )
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let orch = orchestrator(OrchestratorSettings::default());
        orch.register(Recorder::new("perimeter-waf")).unwrap();
        assert!(matches!(
            orch.register(Recorder::new("perimeter-waf")),
            Err(OrchestratorError::DuplicateAgent(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dag_validated_message_is_delivered() {
        let settings = OrchestratorSettings {
            dag: MessageDag::new(vec![crate::domain::message::DagEdge::new(
                "watchtower-siem",
                "perimeter-waf",
                MessageType::Act,
            )]),
            ..Default::default()
        };
        let orch = orchestrator(settings);
        let waf = Recorder::new("perimeter-waf");
        orch.register(waf.clone()).unwrap();
        orch.register(Recorder::new("watchtower-siem")).unwrap();
        orch.start().await;

        orch.bus().publish(AgentSignal::Message(AgentMessage::new(
            AgentId::from("watchtower-siem"),
            AgentId::from("perimeter-waf"),
            MessageType::Act,
            json!({"type": "request_blocks", "ips": ["203.0.113.7"]}),
        )));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(orch.delivered_count(), 1);
        assert_eq!(orch.dropped_count(), 0);
        assert_eq!(waf.received().len(), 1);
        orch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn off_dag_message_is_dropped_not_delivered() {
        let orch = orchestrator(OrchestratorSettings::default());
        let waf = Recorder::new("perimeter-waf");
        orch.register(waf.clone()).unwrap();
        orch.register(Recorder::new("honeynet-weaver")).unwrap();
        orch.start().await;

        orch.bus().publish(AgentSignal::Message(AgentMessage::new(
            AgentId::from("honeynet-weaver"),
            AgentId::from("perimeter-waf"),
            MessageType::Act,
            json!({"type": "request_blocks"}),
        )));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(orch.delivered_count(), 0);
        assert_eq!(orch.dropped_count(), 1);
        assert!(waf.received().is_empty());
        orch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn p1_alert_opens_incident_and_overlapping_alert_correlates() {
        let orch = orchestrator(OrchestratorSettings::default());
        orch.start().await;

        orch.bus().publish(AgentSignal::Alert(p1_alert(
            "perimeter-waf",
            "waf-bypass",
            "ddos wave hitting edge",
        )));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(orch.open_incident_count(), 1);

        // Second alert touching the same services joins the incident.
        orch.bus().publish(AgentSignal::Alert(p1_alert(
            "watchtower-siem",
            "ddos-correlation",
            "distributed wave confirmed",
        )));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(orch.open_incident_count(), 1);
        let incident = &orch.incidents()[0];
        assert!(incident.timeline.iter().any(|e| e.event == "correlated-alert"));

        // Disjoint services open a separate incident.
        orch.bus().publish(AgentSignal::Alert(p1_alert(
            "chain-sentinel",
            "mint-anomaly",
            "duplicate mint detected",
        )));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(orch.open_incident_count(), 2);
        orch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn p3_alert_never_opens_incident() {
        let orch = orchestrator(OrchestratorSettings::default());
        orch.start().await;
        orch.bus().publish(AgentSignal::Alert(SecurityAlert::new(
            AgentId::from("watchtower-siem"),
            AlertPriority::P3,
            "agent-error",
            "observe failed",
            HashMap::new(),
        )));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(orch.open_incident_count(), 0);
        orch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn p1_escalation_runs_runbook_with_ordered_steps() {
        let mut runbooks = HashMap::new();
        runbooks.insert(
            "critical-incident".to_string(),
            Runbook {
                name: "critical-incident".to_string(),
                description: String::new(),
                steps: vec![
                    RunbookStep::new("perimeter-waf", "enable_under_attack_mode"),
                    RunbookStep::new("ghost-agent", "does_not_exist"),
                    RunbookStep::new("vault-keeper", "rotate_exposed_secrets"),
                ],
            },
        );
        let settings = OrchestratorSettings {
            runbooks,
            p1_runbook: Some("critical-incident".to_string()),
            ..Default::default()
        };
        let orch = orchestrator(settings);
        let waf = Recorder::new("perimeter-waf");
        let vault = Recorder::new("vault-keeper");
        orch.register(waf.clone()).unwrap();
        orch.register(vault.clone()).unwrap();
        orch.start().await;

        let alert = p1_alert("chain-sentinel", "mint-anomaly", "duplicate mint");
        orch.bus().publish(AgentSignal::Escalation(Escalation {
            alert: alert.clone(),
            rule: crate::domain::alert::EscalationRule {
                condition: crate::domain::condition::Condition::compare(
                    "alert.priority",
                    crate::domain::condition::CompareOp::Equals,
                    json!("P1"),
                ),
                priority: AlertPriority::P1,
                targets: vec!["pager://incident-commander".to_string()],
                timeout_minutes: None,
            },
            targets: vec!["pager://incident-commander".to_string()],
        }));

        tokio::time::sleep(Duration::from_secs(5)).await;
        let waf_msgs = waf.received();
        let vault_msgs = vault.received();
        assert_eq!(waf_msgs.len(), 1);
        assert_eq!(vault_msgs.len(), 1);
        assert_eq!(waf_msgs[0].payload["action"], "enable_under_attack_mode");
        assert_eq!(vault_msgs[0].payload["action"], "rotate_exposed_secrets");
        assert_eq!(waf_msgs[0].payload["alert_id"], alert.id.to_string());
        orch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_critical_agents_and_resume_restarts() {
        let settings = OrchestratorSettings {
            critical_agents: vec![AgentId::from("chain-sentinel")],
            ..Default::default()
        };
        let orch = orchestrator(settings);
        let sentinel = Recorder::new("chain-sentinel");
        let bystander = Recorder::new("perimeter-waf");
        orch.register(sentinel).unwrap();
        orch.register(bystander).unwrap();
        orch.start().await;

        let sentinel_handle = orch.agent(&AgentId::from("chain-sentinel")).unwrap();
        let bystander_handle = orch.agent(&AgentId::from("perimeter-waf")).unwrap();
        assert_eq!(sentinel_handle.status(), AgentStatus::Active);

        orch.pause_system("mint pipeline compromise suspected").await;
        assert!(orch.is_paused());
        assert_eq!(sentinel_handle.status(), AgentStatus::Paused);
        // Non-critical agents keep running through a pause.
        assert_eq!(bystander_handle.status(), AgentStatus::Active);
        assert_eq!(orch.health()["status"], "paused");

        orch.resume_system().await;
        assert!(!orch.is_paused());
        assert_eq!(sentinel_handle.status(), AgentStatus::Active);
        orch.shutdown().await;
    }

    /// Interval agent whose observe always fails, driving its handle to
    /// `degraded`.
    struct Failing {
        config: AgentConfig,
    }

    impl Failing {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                config: AgentConfig::new(
                    id,
                    AgentRole::VulnerabilityScanner,
                    Schedule::Interval(Duration::from_secs(5)),
                ),
            })
        }
    }

    #[async_trait]
    impl SecurityAgent for Failing {
        fn config(&self) -> &AgentConfig {
            &self.config
        }

        async fn observe(&self, _ctx: &AgentContext) -> Result<Vec<AgentObservation>, AgentError> {
            Err(AgentError::Cycle("scanner offline".to_string()))
        }

        async fn act(
            &self,
            _ctx: &AgentContext,
            _significant: &[AgentObservation],
        ) -> Result<Vec<AgentAction>, AgentError> {
            Ok(Vec::new())
        }

        async fn verify(
            &self,
            _ctx: &AgentContext,
            action: &AgentAction,
        ) -> Result<AgentVerification, AgentError> {
            Ok(AgentVerification::new(action.id, true, 1.0))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn degraded_swarm_notifies_meta_guardian_once() {
        let settings = OrchestratorSettings {
            meta_guardian: Some(AgentId::from("overseer")),
            ..Default::default()
        };
        let orch = orchestrator(settings);
        let overseer = Recorder::new("overseer");
        orch.register(overseer.clone()).unwrap();
        // One failing agent out of two: 50% > 20%.
        orch.register(Failing::new("depth-probe")).unwrap();
        orch.start().await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        let nudges: Vec<AgentMessage> = overseer
            .received()
            .into_iter()
            .filter(|m| m.payload["reason"] == "swarm-degraded")
            .collect();
        // Several failed cycles later the guardian has still been nudged
        // exactly once for this degradation episode.
        assert_eq!(nudges.len(), 1);
        assert_eq!(nudges[0].from.as_str(), "orchestrator");
        orch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn health_reports_agents_and_counters() {
        let orch = orchestrator(OrchestratorSettings::default());
        orch.register(Recorder::new("perimeter-waf")).unwrap();
        orch.start().await;

        orch.bus().publish(AgentSignal::heartbeat(
            AgentId::from("perimeter-waf"),
            AgentStatus::Active,
        ));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let health = orch.health();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["agents"]["perimeter-waf"]["status"], "active");
        assert!(health["agents"]["perimeter-waf"]["last_heartbeat"].is_string());
        assert_eq!(health["open_incidents"], 0);
        orch.shutdown().await;
    }

    #[test]
    fn affected_services_heuristics() {
        let mint = p1_alert("chain-sentinel", "mint-anomaly", "duplicate mint");
        assert_eq!(
            affected_services(&mint),
            vec!["mint-pipeline".to_string(), "carbon-registry".to_string()]
        );

        let ddos = p1_alert("perimeter-waf", "ddos-wave", "volumetric attack");
        assert_eq!(
            affected_services(&ddos),
            vec!["edge".to_string(), "api".to_string()]
        );

        let mut context = HashMap::new();
        context.insert("pipelines".to_string(), json!(["billing"]));
        let explicit = SecurityAlert::new(
            AgentId::from("watchtower-siem"),
            AlertPriority::P2,
            "anomaly",
            "billing anomaly",
            context,
        );
        assert_eq!(affected_services(&explicit), vec!["billing".to_string()]);

        let plain = p1_alert("watchtower-siem", "anomaly", "something odd");
        assert!(affected_services(&plain).is_empty());
    }
}
