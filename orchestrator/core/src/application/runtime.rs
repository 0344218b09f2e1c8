// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent runtime: the observe/act/verify lifecycle.
//!
//! [`SecurityAgent`] is the behavior contract implementors write;
//! [`AgentHandle`] wraps one agent with the scheduling, heartbeat, status,
//! and history machinery so every agent gets the same lifecycle for free.
//! Interval-scheduled agents run a recurring cycle; realtime and
//! event-driven agents only react to delivered messages.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::action::{AgentAction, AgentObservation, AgentVerification};
use crate::domain::agent::{AgentConfig, AgentId, AgentStatus, Schedule};
use crate::domain::alert::{AlertPriority, Escalation, SecurityAlert};
use crate::domain::message::{AgentMessage, MessageType};
use crate::domain::signal::AgentSignal;
use crate::infrastructure::adapters::AdapterError;
use crate::infrastructure::signal_bus::SignalBus;

/// Liveness beacon period. Independent of the agent's cycle schedule.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
/// Upper bound on any single observe/act/verify/handle_message call. A
/// stuck adapter degrades the agent instead of wedging its cycle task.
pub const PHASE_TIMEOUT: Duration = Duration::from_secs(30);
/// Observations older than this are pruned from the handle's history.
pub const HISTORY_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("{phase} timed out after {timeout:?}")]
    Timeout {
        phase: &'static str,
        timeout: Duration,
    },

    #[error("cycle failed: {0}")]
    Cycle(String),

    /// Unrecoverable. The handle transitions to `crashed` and stops
    /// cycling; only an explicit restart brings the agent back.
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Behavior contract for one security agent. Implementations hold their
/// own adapters and state; everything lifecycle-shaped lives in
/// [`AgentHandle`].
#[async_trait]
pub trait SecurityAgent: Send + Sync {
    fn config(&self) -> &AgentConfig;

    /// Collect observations from the agent's declared data sources.
    async fn observe(&self, ctx: &AgentContext) -> Result<Vec<AgentObservation>, AgentError>;

    /// Decide and execute actions for the significant observations of one
    /// cycle. Returned actions must already carry a terminal status.
    async fn act(
        &self,
        ctx: &AgentContext,
        significant: &[AgentObservation],
    ) -> Result<Vec<AgentAction>, AgentError>;

    /// Independently re-check an action's intended effect. Must not trust
    /// the action's own result payload.
    async fn verify(
        &self,
        ctx: &AgentContext,
        action: &AgentAction,
    ) -> Result<AgentVerification, AgentError>;

    async fn on_start(&self, _ctx: &AgentContext) -> Result<(), AgentError> {
        Ok(())
    }

    async fn on_stop(&self, _ctx: &AgentContext) -> Result<(), AgentError> {
        Ok(())
    }

    /// Inbound message from another agent (already DAG-validated by the
    /// orchestrator) or a runbook step.
    async fn handle_message(
        &self,
        _ctx: &AgentContext,
        message: AgentMessage,
    ) -> Result<(), AgentError> {
        debug!(to = %message.to, r#type = %message.message_type, "message ignored by agent");
        Ok(())
    }
}

/// Per-agent view of the shared infrastructure. Alert raising routes
/// through here so escalation rules are evaluated uniformly for every
/// agent.
#[derive(Clone)]
pub struct AgentContext {
    config: AgentConfig,
    bus: SignalBus,
}

impl AgentContext {
    pub fn new(config: AgentConfig, bus: SignalBus) -> Self {
        Self { config, bus }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.config.id
    }

    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    /// Publish an alert signal, then evaluate the agent's escalation rules
    /// against it and publish an escalation for every rule that fires. A
    /// rule that fails to evaluate does not fire and does not block the
    /// others.
    pub fn raise_alert(
        &self,
        priority: AlertPriority,
        alert_type: impl Into<String>,
        message: impl Into<String>,
        context: HashMap<String, Value>,
    ) -> SecurityAlert {
        let alert = SecurityAlert::new(
            self.config.id.clone(),
            priority,
            alert_type,
            message,
            context,
        );
        info!(
            agent = %self.config.id,
            priority = %alert.priority,
            r#type = %alert.alert_type,
            "alert raised"
        );
        metrics::counter!("outpost_alerts_total").increment(1);
        self.bus.publish(AgentSignal::Alert(alert.clone()));

        let doc = alert.evaluation_context();
        for rule in &self.config.escalation_rules {
            match rule.condition.evaluate(&doc) {
                Ok(true) => {
                    info!(agent = %self.config.id, priority = %rule.priority, "escalation rule fired");
                    self.bus.publish(AgentSignal::Escalation(Escalation {
                        alert: alert.clone(),
                        rule: rule.clone(),
                        targets: rule.targets.clone(),
                    }));
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(agent = %self.config.id, error = %e, "escalation rule failed to evaluate");
                }
            }
        }
        alert
    }

    /// Publish an outbound message for the orchestrator to route. DAG
    /// validation happens at the orchestrator, not here.
    pub fn send_message(&self, to: AgentId, message_type: MessageType, payload: Value) {
        let message = AgentMessage::new(self.config.id.clone(), to, message_type, payload);
        self.bus.publish(AgentSignal::Message(message));
    }
}

struct HandleInner {
    agent: Arc<dyn SecurityAgent>,
    ctx: AgentContext,
    status: RwLock<AgentStatus>,
    cancel: Mutex<Option<CancellationToken>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    history: Mutex<VecDeque<AgentObservation>>,
}

/// Lifecycle wrapper around one agent. Cloneable; all clones share the
/// same running state.
#[derive(Clone)]
pub struct AgentHandle {
    inner: Arc<HandleInner>,
}

impl AgentHandle {
    pub fn new(agent: Arc<dyn SecurityAgent>, bus: SignalBus) -> Self {
        let ctx = AgentContext::new(agent.config().clone(), bus);
        Self {
            inner: Arc::new(HandleInner {
                agent,
                ctx,
                status: RwLock::new(AgentStatus::Initializing),
                cancel: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
                history: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        self.inner.ctx.agent_id()
    }

    pub fn config(&self) -> &AgentConfig {
        self.inner.ctx.config()
    }

    pub fn status(&self) -> AgentStatus {
        *self.inner.status.read()
    }

    pub fn history_len(&self) -> usize {
        self.inner.history.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.inner.cancel.lock().is_some()
    }

    /// Start the agent. Idempotent: a second call while running changes
    /// nothing and spawns nothing.
    pub async fn start(&self) -> Result<(), AgentError> {
        {
            let mut cancel = self.inner.cancel.lock();
            if cancel.is_some() {
                debug!(agent = %self.agent_id(), "start ignored, already running");
                return Ok(());
            }
            *cancel = Some(CancellationToken::new());
        }

        self.set_status(AgentStatus::Initializing);
        if let Err(e) = self.inner.agent.on_start(&self.inner.ctx).await {
            error!(agent = %self.agent_id(), error = %e, "on_start failed");
            self.set_status(AgentStatus::Crashed);
            *self.inner.cancel.lock() = None;
            return Err(e);
        }
        self.set_status(AgentStatus::Active);
        info!(agent = %self.agent_id(), schedule = ?self.config().schedule, "agent started");

        let token = self
            .inner
            .cancel
            .lock()
            .as_ref()
            .map(|t| t.clone())
            .unwrap_or_default();

        let mut tasks = Vec::new();
        if let Schedule::Interval(period) = self.config().schedule.clone() {
            tasks.push(tokio::spawn(Self::cycle_loop(
                self.clone(),
                period,
                token.clone(),
            )));
        }
        tasks.push(tokio::spawn(Self::heartbeat_loop(self.clone(), token)));
        self.inner.tasks.lock().extend(tasks);
        Ok(())
    }

    /// Stop the agent: cancel both loops, wait for them, run `on_stop`,
    /// and report `paused`. Safe to call when not running.
    pub async fn stop(&self) {
        let token = self.inner.cancel.lock().take();
        let Some(token) = token else {
            return;
        };
        token.cancel();

        let tasks: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(agent = %self.agent_id(), error = %e, "agent task panicked");
                }
            }
        }

        if let Err(e) = self.inner.agent.on_stop(&self.inner.ctx).await {
            warn!(agent = %self.agent_id(), error = %e, "on_stop failed");
        }
        self.set_status(AgentStatus::Paused);
        info!(agent = %self.agent_id(), "agent stopped");
    }

    /// Deliver an inbound message to the agent with the standard phase
    /// timeout.
    pub async fn deliver(&self, message: AgentMessage) -> Result<(), AgentError> {
        let fut = self.inner.agent.handle_message(&self.inner.ctx, message);
        tokio::time::timeout(PHASE_TIMEOUT, fut)
            .await
            .map_err(|_| AgentError::Timeout {
                phase: "handle_message",
                timeout: PHASE_TIMEOUT,
            })?
    }

    fn set_status(&self, status: AgentStatus) {
        {
            let mut current = self.inner.status.write();
            if *current == status {
                return;
            }
            *current = status;
        }
        self.inner
            .ctx
            .bus()
            .publish(AgentSignal::status(self.agent_id().clone(), status));
    }

    async fn cycle_loop(handle: AgentHandle, period: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match handle.run_cycle().await {
                Ok(()) => {
                    // A clean cycle clears a previous degradation.
                    if handle.status() == AgentStatus::Degraded {
                        handle.set_status(AgentStatus::Active);
                    }
                }
                Err(AgentError::Fatal(reason)) => {
                    error!(agent = %handle.agent_id(), %reason, "agent crashed");
                    handle.set_status(AgentStatus::Crashed);
                    break;
                }
                Err(e) => {
                    warn!(agent = %handle.agent_id(), error = %e, "cycle failed");
                    handle.set_status(AgentStatus::Degraded);
                    let mut context = HashMap::new();
                    context.insert("error".to_string(), Value::String(e.to_string()));
                    handle.inner.ctx.raise_alert(
                        AlertPriority::P3,
                        "agent-error",
                        format!("cycle failed for {}", handle.agent_id()),
                        context,
                    );
                }
            }
        }
    }

    async fn heartbeat_loop(handle: AgentHandle, token: CancellationToken) {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            handle
                .inner
                .ctx
                .bus()
                .publish(AgentSignal::heartbeat(
                    handle.agent_id().clone(),
                    handle.status(),
                ));
        }
    }

    /// One observe/act/verify pass.
    async fn run_cycle(&self) -> Result<(), AgentError> {
        let observations = self.phase("observe", self.inner.agent.observe(&self.inner.ctx)).await?;
        metrics::counter!("outpost_observations_total").increment(observations.len() as u64);
        self.record_history(&observations);

        let significant: Vec<AgentObservation> = observations
            .into_iter()
            .filter(|o| o.is_significant())
            .collect();
        if significant.is_empty() {
            return Ok(());
        }
        debug!(agent = %self.agent_id(), count = significant.len(), "significant observations");

        let actions = self
            .phase("act", self.inner.agent.act(&self.inner.ctx, &significant))
            .await?;
        for action in actions {
            let verification = self
                .phase("verify", self.inner.agent.verify(&self.inner.ctx, &action))
                .await?;
            if verification.contradicts(&action) {
                let mut context = HashMap::new();
                context.insert("action_id".to_string(), Value::String(action.id.to_string()));
                context.insert(
                    "action_type".to_string(),
                    Value::String(action.action_type.clone()),
                );
                context.insert(
                    "confidence".to_string(),
                    serde_json::json!(verification.confidence),
                );
                self.inner.ctx.raise_alert(
                    AlertPriority::P2,
                    "verification-mismatch",
                    format!(
                        "action '{}' completed but its effect could not be verified",
                        action.action_type
                    ),
                    context,
                );
            }
            self.inner.ctx.bus().publish(AgentSignal::Verification {
                agent_id: self.agent_id().clone(),
                action,
                verification,
            });
        }
        Ok(())
    }

    async fn phase<T>(
        &self,
        phase: &'static str,
        fut: impl std::future::Future<Output = Result<T, AgentError>>,
    ) -> Result<T, AgentError> {
        tokio::time::timeout(PHASE_TIMEOUT, fut)
            .await
            .map_err(|_| AgentError::Timeout {
                phase,
                timeout: PHASE_TIMEOUT,
            })?
    }

    fn record_history(&self, observations: &[AgentObservation]) {
        let mut history = self.inner.history.lock();
        history.extend(observations.iter().cloned());
        let cutoff = Utc::now()
            - chrono::Duration::from_std(HISTORY_RETENTION).unwrap_or(chrono::Duration::MAX);
        while history.front().is_some_and(|o| o.timestamp < cutoff) {
            history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentRole, DataSource};
    use crate::domain::condition::{CompareOp, Condition};
    use crate::domain::alert::EscalationRule;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Scripted agent: every cycle yields one observation with a fixed
    /// anomaly score; actions complete, verification outcome is scripted.
    struct ScriptedAgent {
        config: AgentConfig,
        anomaly_score: f64,
        verify_ok: bool,
        fail_observe: AtomicBool,
        cycles: AtomicUsize,
    }

    impl ScriptedAgent {
        fn new(anomaly_score: f64, verify_ok: bool) -> Self {
            Self {
                config: AgentConfig::new(
                    "scripted",
                    AgentRole::SiemCorrelation,
                    Schedule::Interval(Duration::from_secs(5)),
                )
                .with_data_sources(vec![DataSource::new("wazuh.api")]),
                anomaly_score,
                verify_ok,
                fail_observe: AtomicBool::new(false),
                cycles: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SecurityAgent for ScriptedAgent {
        fn config(&self) -> &AgentConfig {
            &self.config
        }

        async fn observe(&self, _ctx: &AgentContext) -> Result<Vec<AgentObservation>, AgentError> {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            if self.fail_observe.load(Ordering::SeqCst) {
                return Err(AgentError::Cycle("source unreachable".to_string()));
            }
            Ok(vec![AgentObservation::new(
                DataSource::new("wazuh.api"),
                json!({"events": 3}),
                Some(self.anomaly_score),
            )])
        }

        async fn act(
            &self,
            _ctx: &AgentContext,
            significant: &[AgentObservation],
        ) -> Result<Vec<AgentAction>, AgentError> {
            let mut action = AgentAction::new(
                "enhance-monitoring",
                format!("escalate monitoring for {} observations", significant.len()),
                HashMap::new(),
            );
            action.complete(json!({"ok": true})).unwrap();
            Ok(vec![action])
        }

        async fn verify(
            &self,
            _ctx: &AgentContext,
            action: &AgentAction,
        ) -> Result<AgentVerification, AgentError> {
            Ok(AgentVerification::new(action.id, self.verify_ok, 0.9))
        }
    }

    async fn next_matching(
        rx: &mut crate::infrastructure::signal_bus::SignalReceiver,
        mut pred: impl FnMut(&AgentSignal) -> bool,
    ) -> AgentSignal {
        loop {
            let signal = rx.recv().await.unwrap();
            if pred(&signal) {
                return signal;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_emits_verification_for_significant_observation() {
        let bus = SignalBus::new(64);
        let mut rx = bus.subscribe();
        let handle = AgentHandle::new(Arc::new(ScriptedAgent::new(0.9, true)), bus);
        handle.start().await.unwrap();

        let signal = next_matching(&mut rx, |s| matches!(s, AgentSignal::Verification { .. })).await;
        let AgentSignal::Verification { agent_id, verification, .. } = signal else {
            unreachable!()
        };
        assert_eq!(agent_id.as_str(), "scripted");
        assert!(verification.verified);
        assert!(handle.history_len() >= 1);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn insignificant_observations_produce_no_actions() {
        let bus = SignalBus::new(64);
        let mut rx = bus.subscribe();
        let agent = Arc::new(ScriptedAgent::new(0.2, true));
        let handle = AgentHandle::new(agent.clone(), bus);
        handle.start().await.unwrap();

        // Let several cycles run, then drain: no verification signals.
        tokio::time::sleep(Duration::from_secs(20)).await;
        handle.stop().await;
        assert!(agent.cycles.load(Ordering::SeqCst) >= 2);
        while let Ok(signal) = rx.try_recv() {
            assert!(
                !matches!(signal, AgentSignal::Verification { .. }),
                "unexpected verification: {signal:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn contradicted_action_raises_mismatch_alert() {
        let bus = SignalBus::new(64);
        let mut rx = bus.subscribe();
        let handle = AgentHandle::new(Arc::new(ScriptedAgent::new(0.9, false)), bus);
        handle.start().await.unwrap();

        let signal = next_matching(&mut rx, |s| {
            matches!(s, AgentSignal::Alert(a) if a.alert_type == "verification-mismatch")
        })
        .await;
        let AgentSignal::Alert(alert) = signal else { unreachable!() };
        assert_eq!(alert.priority, AlertPriority::P2);
        assert!(alert.requires_ack);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn observe_failure_degrades_and_recovery_restores() {
        let bus = SignalBus::new(64);
        let mut rx = bus.subscribe();
        let agent = Arc::new(ScriptedAgent::new(0.2, true));
        agent.fail_observe.store(true, Ordering::SeqCst);
        let handle = AgentHandle::new(agent.clone(), bus);
        handle.start().await.unwrap();

        let signal = next_matching(&mut rx, |s| {
            matches!(s, AgentSignal::Alert(a) if a.alert_type == "agent-error")
        })
        .await;
        let AgentSignal::Alert(alert) = signal else { unreachable!() };
        assert_eq!(alert.priority, AlertPriority::P3);
        assert_eq!(handle.status(), AgentStatus::Degraded);

        agent.fail_observe.store(false, Ordering::SeqCst);
        next_matching(&mut rx, |s| {
            matches!(s, AgentSignal::Status { status: AgentStatus::Active, .. })
        })
        .await;
        assert_eq!(handle.status(), AgentStatus::Active);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_and_stop_pauses() {
        let bus = SignalBus::new(64);
        let agent = Arc::new(ScriptedAgent::new(0.2, true));
        let handle = AgentHandle::new(agent.clone(), bus);
        handle.start().await.unwrap();
        handle.start().await.unwrap();

        // Exactly one cycle loop: after ~3 periods the counter reflects a
        // single timer, not two.
        tokio::time::sleep(Duration::from_secs(16)).await;
        let cycles = agent.cycles.load(Ordering::SeqCst);
        assert!((1..=5).contains(&cycles), "cycles = {cycles}");

        handle.stop().await;
        assert_eq!(handle.status(), AgentStatus::Paused);
        assert!(!handle.is_running());

        let before = agent.cycles.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(agent.cycles.load(Ordering::SeqCst), before);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_flow_on_their_own_timer() {
        let bus = SignalBus::new(64);
        let mut rx = bus.subscribe();
        let handle = AgentHandle::new(Arc::new(ScriptedAgent::new(0.2, true)), bus);
        handle.start().await.unwrap();

        for _ in 0..2 {
            let signal =
                next_matching(&mut rx, |s| matches!(s, AgentSignal::Heartbeat { .. })).await;
            let AgentSignal::Heartbeat { agent_id, .. } = signal else { unreachable!() };
            assert_eq!(agent_id.as_str(), "scripted");
        }
        handle.stop().await;
    }

    #[tokio::test]
    async fn raise_alert_fires_matching_escalation_rules() {
        let bus = SignalBus::new(64);
        let mut rx = bus.subscribe();
        let config = AgentConfig::new(
            "chain-sentinel",
            AgentRole::ChainAnomalyDetector,
            Schedule::Realtime,
        )
        .with_escalation_rules(vec![EscalationRule {
            condition: Condition::compare("alert.priority", CompareOp::Equals, json!("P1")),
            priority: AlertPriority::P1,
            targets: vec!["incident-commander".to_string()],
            timeout_minutes: Some(15),
        }]);
        let ctx = AgentContext::new(config, bus);

        ctx.raise_alert(
            AlertPriority::P1,
            "mint-anomaly",
            "duplicate mint detected",
            HashMap::new(),
        );
        assert!(matches!(rx.recv().await.unwrap(), AgentSignal::Alert(_)));
        let AgentSignal::Escalation(escalation) = rx.recv().await.unwrap() else {
            panic!("expected escalation");
        };
        assert_eq!(escalation.targets, vec!["incident-commander".to_string()]);

        // Non-matching alert: only the alert signal, no escalation.
        ctx.raise_alert(AlertPriority::P4, "info", "routine", HashMap::new());
        assert!(matches!(rx.recv().await.unwrap(), AgentSignal::Alert(_)));
        assert!(rx.try_recv().is_err());
    }
}
