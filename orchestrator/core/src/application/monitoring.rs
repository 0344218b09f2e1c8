// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The SIEM correlation agent.
//!
//! [`MonitorAgent`] is the reference interval agent: it pulls event batches
//! from its declared sources, feeds them through the correlation engine,
//! and turns rule matches, IOC hits, and attack patterns into alerts,
//! containment requests, and verifiable actions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::application::correlation::{score_batch, CorrelationEngine};
use crate::application::runtime::{AgentContext, AgentError, SecurityAgent};
use crate::domain::action::{AgentAction, AgentObservation, AgentVerification};
use crate::domain::agent::{AgentConfig, AgentId};
use crate::domain::alert::AlertPriority;
use crate::domain::correlation::{RiskLevel, SecurityEvent};
use crate::domain::message::{AgentMessage, MessageType};
use crate::infrastructure::adapters::{AdapterError, DataSourceAdapter, ThreatIntelFeed};

/// Default window assumed for batch scoring when the agent is not
/// interval-scheduled.
const DEFAULT_COLLECTION_WINDOW: Duration = Duration::from_secs(300);

/// Agents the monitor asks for containment. All optional: an unset peer
/// simply means that containment path is not wired in this deployment.
#[derive(Debug, Clone, Default)]
pub struct MonitorPeers {
    /// Receives `request_blocks` for attack sources and IOC ips.
    pub waf: Option<AgentId>,
    /// Receives `freeze_accounts` during coordinated attacks.
    pub zero_trust: Option<AgentId>,
}

pub struct MonitorAgent {
    config: AgentConfig,
    peers: MonitorPeers,
    engine: Mutex<CorrelationEngine>,
    adapter: Arc<dyn DataSourceAdapter>,
    intel: Arc<dyn ThreatIntelFeed>,
}

impl MonitorAgent {
    pub fn new(
        config: AgentConfig,
        peers: MonitorPeers,
        engine: CorrelationEngine,
        adapter: Arc<dyn DataSourceAdapter>,
        intel: Arc<dyn ThreatIntelFeed>,
    ) -> Self {
        Self {
            config,
            peers,
            engine: Mutex::new(engine),
            adapter,
            intel,
        }
    }

    fn collection_window(&self) -> Duration {
        self.config
            .schedule
            .interval()
            .unwrap_or(DEFAULT_COLLECTION_WINDOW)
    }

    async fn refresh_intel_if_stale(&self) {
        let now = Utc::now();
        if !self.engine.lock().needs_intel_refresh(now) {
            return;
        }
        match self.intel.fetch_iocs().await {
            Ok(iocs) => {
                info!(agent = %self.config.id, count = iocs.len(), "threat intel refreshed");
                self.engine.lock().set_iocs(iocs, now);
            }
            Err(e) => {
                // Stale intel is better than none; keep the old list.
                warn!(agent = %self.config.id, error = %e, "threat intel refresh failed");
            }
        }
    }

    async fn collect_events(&self) -> Result<Vec<SecurityEvent>, AgentError> {
        let mut batch = Vec::new();
        for source in &self.config.data_sources {
            let payload = self.adapter.fetch(source).await?;
            let events: Vec<SecurityEvent> =
                serde_json::from_value(payload).map_err(|e| AdapterError::Decode {
                    source_id: source.to_string(),
                    reason: e.to_string(),
                })?;
            batch.extend(events);
        }
        Ok(batch)
    }

    fn observation(&self, kind: &str, data: Value, score: f64) -> AgentObservation {
        let source = self
            .config
            .data_sources
            .first()
            .cloned()
            .unwrap_or_else(|| crate::domain::agent::DataSource::new("correlation-engine"));
        AgentObservation::new(
            source,
            json!({"kind": kind, "detail": data}),
            Some(score),
        )
    }

    fn request_waf_blocks(&self, ctx: &AgentContext, sources: &[String]) {
        if let Some(waf) = &self.peers.waf {
            ctx.send_message(
                waf.clone(),
                MessageType::Act,
                json!({"type": "request_blocks", "ips": sources}),
            );
        }
    }

    fn completed(
        action_type: &str,
        description: String,
        params: HashMap<String, Value>,
        result: Value,
    ) -> AgentAction {
        let mut action = AgentAction::new(action_type, description, params);
        // Local bookkeeping actions complete inline; the message effects
        // they describe are verified independently in verify().
        if let Err(e) = action.complete(result) {
            debug!(error = %e, "action already terminal");
        }
        action
    }
}

#[async_trait]
impl SecurityAgent for MonitorAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn observe(&self, _ctx: &AgentContext) -> Result<Vec<AgentObservation>, AgentError> {
        self.refresh_intel_if_stale().await;
        let batch = self.collect_events().await?;
        let now = Utc::now();
        let batch_score = score_batch(&batch, self.collection_window());

        let (matches, ioc_matches, analysis) = {
            let mut engine = self.engine.lock();
            engine.ingest_batch(batch.iter().cloned());
            engine.prune(now);
            (
                engine.evaluate(now),
                engine.match_iocs(&batch),
                engine.analyze_patterns(now),
            )
        };

        let mut observations = vec![self.observation(
            "collection",
            json!({
                "events": batch.len(),
                "sources": self.config.data_sources.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            }),
            batch_score,
        )];

        if !matches.is_empty() {
            let score = if matches.iter().any(|m| m.risk == RiskLevel::High) {
                0.9
            } else if matches.iter().any(|m| m.risk == RiskLevel::Medium) {
                0.75
            } else {
                0.5
            };
            observations.push(self.observation(
                "correlations",
                serde_json::to_value(&matches).unwrap_or(Value::Null),
                score,
            ));
        }

        if !ioc_matches.is_empty() {
            observations.push(self.observation(
                "intel",
                serde_json::to_value(&ioc_matches).unwrap_or(Value::Null),
                0.8,
            ));
        }

        if !analysis.patterns.is_empty() {
            let score = if analysis.is_coordinated() { 1.0 } else { 0.75 };
            observations.push(self.observation(
                "patterns",
                serde_json::to_value(&analysis).unwrap_or(Value::Null),
                score,
            ));
        }

        Ok(observations)
    }

    async fn act(
        &self,
        ctx: &AgentContext,
        significant: &[AgentObservation],
    ) -> Result<Vec<AgentAction>, AgentError> {
        let mut actions = Vec::new();

        for observation in significant {
            let kind = observation.data["kind"].as_str().unwrap_or("");
            let detail = &observation.data["detail"];
            match kind {
                "correlations" => {
                    let count = detail.as_array().map(|a| a.len()).unwrap_or(0);
                    let mut context = HashMap::new();
                    context.insert("correlated_threats".to_string(), json!(count));
                    context.insert("matches".to_string(), detail.clone());
                    ctx.raise_alert(
                        AlertPriority::P2,
                        "correlation-threats",
                        format!("{count} correlation rule(s) fired"),
                        context,
                    );
                    actions.push(Self::completed(
                        "enhance-monitoring",
                        "tighten collection after correlated threats".to_string(),
                        HashMap::new(),
                        json!({"rules_fired": count}),
                    ));
                }
                "intel" => {
                    let ips: Vec<String> = detail
                        .as_array()
                        .map(|a| {
                            a.iter()
                                .filter_map(|m| m["ioc"]["value"].as_str())
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();
                    self.request_waf_blocks(ctx, &ips);
                    let mut params = HashMap::new();
                    params.insert("iocs".to_string(), json!(ips));
                    actions.push(Self::completed(
                        "block-iocs",
                        "request blocks for matched indicators".to_string(),
                        params,
                        json!({"requested": ips.len()}),
                    ));
                }
                "patterns" => {
                    let coordinated = detail["classification"]["kind"] == "coordinated";
                    let sources: Vec<String> = detail["sources"]
                        .as_array()
                        .map(|a| {
                            a.iter()
                                .filter_map(|v| v.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();

                    if coordinated {
                        let mut context = HashMap::new();
                        context.insert("attack_pattern".to_string(), json!("coordinated"));
                        context.insert("analysis".to_string(), detail.clone());
                        ctx.raise_alert(
                            AlertPriority::P1,
                            "coordinated-attack",
                            "multiple simultaneous attack patterns detected",
                            context,
                        );
                        self.request_waf_blocks(ctx, &sources);
                        if let Some(zt) = &self.peers.zero_trust {
                            ctx.send_message(
                                zt.clone(),
                                MessageType::Act,
                                json!({"type": "freeze_accounts", "sources": sources}),
                            );
                        }
                        actions.push(Self::completed(
                            "freeze-accounts",
                            "request account freeze for attack sources".to_string(),
                            HashMap::new(),
                            json!({"sources": sources.len()}),
                        ));
                        actions.push(Self::completed(
                            "generate-timeline",
                            "snapshot attack timeline for the incident record".to_string(),
                            HashMap::new(),
                            detail.clone(),
                        ));
                    } else {
                        self.request_waf_blocks(ctx, &sources);
                        actions.push(Self::completed(
                            "request-waf-blocks",
                            "request blocks for attack sources".to_string(),
                            HashMap::new(),
                            json!({"sources": sources.len()}),
                        ));
                    }
                }
                // A hot batch without a specific finding still tightens
                // monitoring.
                _ => actions.push(Self::completed(
                    "enhance-monitoring",
                    "tighten collection after anomalous batch".to_string(),
                    HashMap::new(),
                    json!({"trigger": kind}),
                )),
            }
        }

        Ok(actions)
    }

    async fn verify(
        &self,
        _ctx: &AgentContext,
        action: &AgentAction,
    ) -> Result<AgentVerification, AgentError> {
        match action.action_type.as_str() {
            // Local actions: the result payload is the effect.
            "enhance-monitoring" | "generate-timeline" => Ok(AgentVerification::new(
                action.id,
                action.result.is_some(),
                0.9,
            )
            .with_evidence(vec!["local action result recorded".to_string()])),

            // Containment requests: re-check that the source feeding the
            // engine is still responsive, i.e. the pipeline the request
            // traveled through is alive.
            _ => {
                let Some(source) = self.config.data_sources.first() else {
                    return Ok(AgentVerification::new(action.id, false, 0.3));
                };
                match self.adapter.fetch(source).await {
                    Ok(_) => Ok(AgentVerification::new(action.id, true, 0.7)
                        .with_evidence(vec![format!("{source} responsive after action")])),
                    Err(e) => Ok(AgentVerification::new(action.id, false, 0.4)
                        .with_evidence(vec![format!("{source} unreachable: {e}")])),
                }
            }
        }
    }

    /// Inbound `observe` messages carry event batches from realtime
    /// producers; anything else is acknowledged and logged.
    async fn handle_message(
        &self,
        _ctx: &AgentContext,
        message: AgentMessage,
    ) -> Result<(), AgentError> {
        if message.message_type == MessageType::Observe {
            if let Ok(events) = serde_json::from_value::<Vec<SecurityEvent>>(message.payload.clone())
            {
                debug!(agent = %self.config.id, count = events.len(), "ingesting forwarded events");
                self.engine.lock().ingest_batch(events);
                return Ok(());
            }
        }
        debug!(agent = %self.config.id, r#type = %message.message_type, "message acknowledged");
        Ok(())
    }
}
