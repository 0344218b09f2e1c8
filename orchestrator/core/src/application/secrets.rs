// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The secrets-lifecycle agent.
//!
//! [`VaultAgent`] owns a [`SecretStore`] — the secret/version table and its
//! access log — and cycles over it: expired or compromised secrets get
//! rotated, anomalous access gets restricted, and rotation-policy drift
//! gets scheduled for catch-up. Inventory updates arrive through the
//! data-source adapter seam; the store itself is authoritative for
//! versions, so verification can check a rotation actually advanced one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::runtime::{AgentContext, AgentError, SecurityAgent};
use crate::domain::action::{AgentAction, AgentObservation, AgentVerification};
use crate::domain::agent::{AgentConfig, DataSource};
use crate::domain::alert::AlertPriority;
use crate::domain::message::{AgentMessage, MessageType};
use crate::domain::secret::{
    AccessRecord, RotationPolicy, SecretRecord, SecretStatus, SecretType,
};
use crate::infrastructure::adapters::{AdapterError, DataSourceAdapter};

/// Secrets expiring inside this window are flagged before they lapse.
const EXPIRY_WARNING_WINDOW_DAYS: i64 = 7;
/// Access audits cover this trailing window.
const ACCESS_AUDIT_WINDOW_HOURS: i64 = 24;
/// An accessor reading more than this multiple of the mean is suspicious.
const SUSPICIOUS_ACCESS_MULTIPLIER: f64 = 3.0;
/// More failed accesses than this in the audit window is anomalous on its own.
const MAX_FAILED_ACCESSES: usize = 10;
/// Overdue rotations above this count make the compliance check significant.
const OVERDUE_SIGNIFICANT: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretStoreError {
    #[error("secret '{0}' is not in the inventory")]
    UnknownSecret(String),
}

/// Result of one rotation: the version advanced and the old one revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationOutcome {
    pub secret_id: String,
    pub name: String,
    pub old_version: u32,
    pub new_version: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpirationReport {
    pub expired: Vec<String>,
    pub expiring_soon: Vec<String>,
    /// Compromised secrets needing emergency rotation.
    pub exposed: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AccessReport {
    pub total: usize,
    pub failed: usize,
    pub suspicious_accessors: Vec<String>,
}

impl AccessReport {
    pub fn is_anomalous(&self) -> bool {
        !self.suspicious_accessors.is_empty() || self.failed > MAX_FAILED_ACCESSES
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ComplianceReport {
    pub total: usize,
    pub overdue: Vec<String>,
}

/// Inventory snapshot fed in through the adapter seam. Stub adapters
/// report an empty batch.
#[derive(Debug, Default, Deserialize)]
pub struct SecretSnapshot {
    #[serde(default)]
    pub secrets: Vec<SecretRecord>,
    #[serde(default)]
    pub access_log: Vec<AccessRecord>,
}

/// The owned secret/version table, access log, and rotation policies.
pub struct SecretStore {
    secrets: HashMap<String, SecretRecord>,
    policies: HashMap<SecretType, RotationPolicy>,
    access_log: Vec<AccessRecord>,
    restrictions: HashMap<String, DateTime<Utc>>,
}

impl SecretStore {
    pub fn new(policies: Vec<RotationPolicy>) -> Self {
        Self {
            secrets: HashMap::new(),
            policies: policies.into_iter().map(|p| (p.secret_type, p)).collect(),
            access_log: Vec::new(),
            restrictions: HashMap::new(),
        }
    }

    /// Rotation cadences for the common credential types.
    pub fn with_default_policies() -> Self {
        let days = |d: u64| std::time::Duration::from_secs(d * 24 * 60 * 60);
        Self::new(vec![
            RotationPolicy {
                secret_type: SecretType::ApiKey,
                rotation_interval: days(90),
                expiration_period: Some(days(365)),
            },
            RotationPolicy {
                secret_type: SecretType::Database,
                rotation_interval: days(30),
                expiration_period: None,
            },
            RotationPolicy {
                secret_type: SecretType::JwtSecret,
                rotation_interval: days(180),
                expiration_period: None,
            },
            RotationPolicy {
                secret_type: SecretType::EncryptionKey,
                rotation_interval: days(365),
                expiration_period: None,
            },
        ])
    }

    pub fn secret_count(&self) -> usize {
        self.secrets.len()
    }

    pub fn version_of(&self, id: &str) -> Option<u32> {
        self.secrets.get(id).map(|s| s.version)
    }

    pub fn upsert(&mut self, record: SecretRecord) {
        self.secrets.insert(record.id.clone(), record);
    }

    pub fn record_access(&mut self, access: AccessRecord) {
        self.access_log.push(access);
    }

    /// Merge an adapter snapshot. Inventory records replace by id; access
    /// log entries append.
    pub fn absorb(&mut self, snapshot: SecretSnapshot) {
        for record in snapshot.secrets {
            self.upsert(record);
        }
        self.access_log.extend(snapshot.access_log);
    }

    pub fn expiration_report(&self, now: DateTime<Utc>) -> ExpirationReport {
        let warning = chrono::Duration::days(EXPIRY_WARNING_WINDOW_DAYS);
        let mut report = ExpirationReport::default();
        for secret in self.secrets.values() {
            if secret.status == SecretStatus::Compromised {
                report.exposed.push(secret.id.clone());
            }
            if secret.is_expired(now) {
                report.expired.push(secret.id.clone());
            } else if secret.expires_within(now, warning) {
                report.expiring_soon.push(secret.id.clone());
            }
        }
        report.expired.sort();
        report.expiring_soon.sort();
        report.exposed.sort();
        report
    }

    pub fn access_report(&self, now: DateTime<Utc>) -> AccessReport {
        let cutoff = now - chrono::Duration::hours(ACCESS_AUDIT_WINDOW_HOURS);
        let recent: Vec<&AccessRecord> = self
            .access_log
            .iter()
            .filter(|a| a.timestamp > cutoff)
            .collect();

        let mut by_accessor: HashMap<&str, usize> = HashMap::new();
        for access in &recent {
            *by_accessor.entry(access.accessor.as_str()).or_default() += 1;
        }
        let mean = if by_accessor.is_empty() {
            0.0
        } else {
            recent.len() as f64 / by_accessor.len() as f64
        };
        let mut suspicious: Vec<String> = by_accessor
            .iter()
            .filter(|(_, &count)| count as f64 > mean * SUSPICIOUS_ACCESS_MULTIPLIER)
            .map(|(accessor, _)| accessor.to_string())
            .collect();
        suspicious.sort();

        AccessReport {
            total: recent.len(),
            failed: recent.iter().filter(|a| !a.success).count(),
            suspicious_accessors: suspicious,
        }
    }

    pub fn compliance_report(&self, now: DateTime<Utc>) -> ComplianceReport {
        let mut overdue: Vec<String> = self
            .secrets
            .values()
            .filter(|secret| {
                self.policies.get(&secret.secret_type).is_some_and(|policy| {
                    let interval = chrono::Duration::from_std(policy.rotation_interval)
                        .unwrap_or(chrono::Duration::MAX);
                    now - secret.last_rotated > interval
                })
            })
            .map(|secret| secret.id.clone())
            .collect();
        overdue.sort();
        ComplianceReport {
            total: self.secrets.len(),
            overdue,
        }
    }

    /// Advance the secret to a fresh version and revoke the old one.
    pub fn rotate(
        &mut self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome, SecretStoreError> {
        let secret = self
            .secrets
            .get_mut(id)
            .ok_or_else(|| SecretStoreError::UnknownSecret(id.to_string()))?;
        let old_version = secret.version;
        secret.version += 1;
        secret.last_rotated = now;
        secret.status = SecretStatus::Active;
        Ok(RotationOutcome {
            secret_id: secret.id.clone(),
            name: secret.name.clone(),
            old_version,
            new_version: secret.version,
        })
    }

    /// Emergency-rotate every compromised secret.
    pub fn rotate_compromised(&mut self, now: DateTime<Utc>) -> Vec<RotationOutcome> {
        let ids: Vec<String> = self
            .secrets
            .values()
            .filter(|s| s.status == SecretStatus::Compromised)
            .map(|s| s.id.clone())
            .collect();
        ids.iter()
            .filter_map(|id| self.rotate(id, now).ok())
            .collect()
    }

    pub fn restrict(&mut self, accessor: &str, until: DateTime<Utc>) {
        self.restrictions.insert(accessor.to_string(), until);
    }

    pub fn is_restricted(&self, accessor: &str, now: DateTime<Utc>) -> bool {
        self.restrictions
            .get(accessor)
            .is_some_and(|until| *until > now)
    }
}

pub struct VaultAgent {
    config: AgentConfig,
    store: Mutex<SecretStore>,
    adapter: Arc<dyn DataSourceAdapter>,
}

impl VaultAgent {
    pub fn new(
        config: AgentConfig,
        store: SecretStore,
        adapter: Arc<dyn DataSourceAdapter>,
    ) -> Self {
        Self {
            config,
            store: Mutex::new(store),
            adapter,
        }
    }

    async fn refresh_inventory(&self) -> Result<(), AgentError> {
        for source in &self.config.data_sources {
            let payload = self.adapter.fetch(source).await?;
            // Stub adapters report an empty batch.
            if payload.is_null() || payload.as_array().is_some_and(Vec::is_empty) {
                continue;
            }
            let snapshot: SecretSnapshot =
                serde_json::from_value(payload).map_err(|e| AdapterError::Decode {
                    source_id: source.to_string(),
                    reason: e.to_string(),
                })?;
            self.store.lock().absorb(snapshot);
        }
        Ok(())
    }

    fn observation(&self, kind: &str, data: Value, score: f64) -> AgentObservation {
        let source = self
            .config
            .data_sources
            .first()
            .cloned()
            .unwrap_or_else(|| DataSource::new("vault.api"));
        AgentObservation::new(source, json!({"kind": kind, "detail": data}), Some(score))
    }

    fn completed(
        action_type: &str,
        description: String,
        params: HashMap<String, Value>,
        result: Value,
    ) -> AgentAction {
        let mut action = AgentAction::new(action_type, description, params);
        if let Err(e) = action.complete(result) {
            debug!(error = %e, "action already terminal");
        }
        action
    }

    fn rotation_action(action_type: &str, reason: &str, outcome: &RotationOutcome) -> AgentAction {
        let mut params = HashMap::new();
        params.insert("secret_id".to_string(), json!(outcome.secret_id));
        params.insert("previous_version".to_string(), json!(outcome.old_version));
        params.insert("reason".to_string(), json!(reason));
        Self::completed(
            action_type,
            format!("rotate {} ({reason})", outcome.name),
            params,
            serde_json::to_value(outcome).unwrap_or(Value::Null),
        )
    }
}

#[async_trait]
impl SecurityAgent for VaultAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn observe(&self, _ctx: &AgentContext) -> Result<Vec<AgentObservation>, AgentError> {
        self.refresh_inventory().await?;
        let now = Utc::now();
        let (expiration, access, compliance) = {
            let store = self.store.lock();
            (
                store.expiration_report(now),
                store.access_report(now),
                store.compliance_report(now),
            )
        };

        let mut observations = Vec::new();

        if !expiration.exposed.is_empty() {
            observations.push(self.observation(
                "exposure",
                serde_json::to_value(&expiration).unwrap_or(Value::Null),
                1.0,
            ));
        }

        let expiry_score = if expiration.expired.is_empty() { 0.2 } else { 0.9 };
        observations.push(self.observation(
            "expiration",
            serde_json::to_value(&expiration).unwrap_or(Value::Null),
            expiry_score,
        ));

        observations.push(self.observation(
            "access-audit",
            serde_json::to_value(&access).unwrap_or(Value::Null),
            if access.is_anomalous() { 0.8 } else { 0.0 },
        ));

        observations.push(self.observation(
            "rotation-compliance",
            serde_json::to_value(&compliance).unwrap_or(Value::Null),
            if compliance.overdue.len() > OVERDUE_SIGNIFICANT {
                0.75
            } else {
                0.3
            },
        ));

        Ok(observations)
    }

    async fn act(
        &self,
        ctx: &AgentContext,
        significant: &[AgentObservation],
    ) -> Result<Vec<AgentAction>, AgentError> {
        let now = Utc::now();
        let mut actions = Vec::new();

        for observation in significant {
            let kind = observation.data["kind"].as_str().unwrap_or("");
            let detail = &observation.data["detail"];
            match kind {
                "exposure" => {
                    let outcomes = self.store.lock().rotate_compromised(now);
                    let mut context = HashMap::new();
                    context.insert("exposed_secrets".to_string(), json!(outcomes.len()));
                    context.insert(
                        "secrets".to_string(),
                        json!(outcomes.iter().map(|o| o.name.clone()).collect::<Vec<_>>()),
                    );
                    ctx.raise_alert(
                        AlertPriority::P1,
                        "exposed-secrets",
                        format!("{} compromised secret(s) under emergency rotation", outcomes.len()),
                        context,
                    );
                    for outcome in &outcomes {
                        actions.push(Self::rotation_action("emergency-rotation", "exposed", outcome));
                    }
                    actions.push(Self::completed(
                        "revoke-versions",
                        "revoke all pre-rotation versions of exposed secrets".to_string(),
                        HashMap::new(),
                        json!({"revoked": outcomes.len()}),
                    ));
                }
                "expiration" => {
                    let expired: Vec<String> = detail["expired"]
                        .as_array()
                        .map(|a| {
                            a.iter()
                                .filter_map(|v| v.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                    for id in &expired {
                        match self.store.lock().rotate(id, now) {
                            Ok(outcome) => actions.push(Self::rotation_action(
                                "rotate-secret",
                                "expired",
                                &outcome,
                            )),
                            Err(e) => warn!(secret = %id, error = %e, "expired secret vanished before rotation"),
                        }
                    }
                }
                "access-audit" => {
                    let suspicious: Vec<String> = detail["suspicious_accessors"]
                        .as_array()
                        .map(|a| {
                            a.iter()
                                .filter_map(|v| v.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                    let until = now + chrono::Duration::hours(1);
                    for accessor in &suspicious {
                        self.store.lock().restrict(accessor, until);
                        let mut params = HashMap::new();
                        params.insert("accessor".to_string(), json!(accessor));
                        params.insert("until".to_string(), json!(until.to_rfc3339()));
                        actions.push(Self::completed(
                            "restrict-access",
                            format!("temporarily restrict access for {accessor}"),
                            params,
                            json!({"accessor": accessor, "until": until.to_rfc3339()}),
                        ));
                    }
                    actions.push(Self::completed(
                        "investigate-access",
                        "audit anomalous access patterns".to_string(),
                        HashMap::new(),
                        detail.clone(),
                    ));
                }
                "rotation-compliance" => {
                    let overdue: Vec<String> = detail["overdue"]
                        .as_array()
                        .map(|a| {
                            a.iter()
                                .filter_map(|v| v.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                    for id in &overdue {
                        match self.store.lock().rotate(id, now) {
                            Ok(outcome) => actions.push(Self::rotation_action(
                                "rotate-secret",
                                "overdue",
                                &outcome,
                            )),
                            Err(e) => warn!(secret = %id, error = %e, "overdue secret vanished before rotation"),
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(actions)
    }

    async fn verify(
        &self,
        _ctx: &AgentContext,
        action: &AgentAction,
    ) -> Result<AgentVerification, AgentError> {
        let now = Utc::now();
        match action.action_type.as_str() {
            // The store is authoritative: a rotation is verified when the
            // live version is past the one recorded before the action.
            "emergency-rotation" | "rotate-secret" => {
                let id = action.params.get("secret_id").and_then(|v| v.as_str());
                let previous = action
                    .params
                    .get("previous_version")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32;
                let current = id.and_then(|id| self.store.lock().version_of(id));
                match current {
                    Some(version) if version > previous => {
                        Ok(AgentVerification::new(action.id, true, 1.0).with_evidence(vec![
                            format!("version advanced from {previous} to {version}"),
                        ]))
                    }
                    Some(version) => Ok(AgentVerification::new(action.id, false, 0.9)
                        .with_evidence(vec![format!("version still {version}")])),
                    None => Ok(AgentVerification::new(action.id, false, 0.5)
                        .with_evidence(vec!["secret missing from inventory".to_string()])),
                }
            }
            "restrict-access" => {
                let restricted = action
                    .params
                    .get("accessor")
                    .and_then(|v| v.as_str())
                    .is_some_and(|a| self.store.lock().is_restricted(a, now));
                Ok(AgentVerification::new(action.id, restricted, 0.95))
            }
            _ => Ok(AgentVerification::new(
                action.id,
                action.result.is_some(),
                0.9,
            )),
        }
    }

    /// Runbook steps arrive as `act` messages; `rotate_exposed_secrets` is
    /// the containment step the P1 runbook dispatches here.
    async fn handle_message(
        &self,
        _ctx: &AgentContext,
        message: AgentMessage,
    ) -> Result<(), AgentError> {
        if message.message_type == MessageType::Act
            && message.payload["action"] == "rotate_exposed_secrets"
        {
            let outcomes = self.store.lock().rotate_compromised(Utc::now());
            info!(
                agent = %self.config.id,
                rotated = outcomes.len(),
                "emergency rotation requested"
            );
            return Ok(());
        }
        debug!(agent = %self.config.id, r#type = %message.message_type, "message acknowledged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentId, AgentRole, Schedule};
    use crate::domain::secret::AccessKind;
    use crate::domain::signal::AgentSignal;
    use crate::infrastructure::adapters::NullAdapter;
    use crate::infrastructure::signal_bus::SignalBus;
    use std::time::Duration;

    fn record(id: &str, status: SecretStatus, last_rotated: DateTime<Utc>) -> SecretRecord {
        SecretRecord {
            id: id.to_string(),
            name: id.to_uppercase().replace('-', "_"),
            secret_type: SecretType::Database,
            version: 1,
            created_at: last_rotated,
            last_rotated,
            expires_at: None,
            status,
            environment: "production".to_string(),
            service: "api".to_string(),
        }
    }

    fn access(accessor: &str, at: DateTime<Utc>, success: bool) -> AccessRecord {
        AccessRecord {
            secret_id: "db-password".to_string(),
            accessor: accessor.to_string(),
            timestamp: at,
            action: AccessKind::Read,
            success,
        }
    }

    fn config() -> AgentConfig {
        AgentConfig::new(
            "vault-keeper",
            AgentRole::SecretsLifecycle,
            Schedule::Interval(Duration::from_secs(3600)),
        )
        .with_data_sources(vec![DataSource::new("vault.api")])
    }

    fn ctx() -> (AgentContext, crate::infrastructure::signal_bus::SignalReceiver) {
        let bus = SignalBus::new(256);
        let rx = bus.subscribe();
        (AgentContext::new(config(), bus), rx)
    }

    #[test]
    fn compliance_report_flags_overdue_rotations() {
        let now = Utc::now();
        let mut store = SecretStore::with_default_policies();
        // Database policy is 30 days.
        store.upsert(record("fresh", SecretStatus::Active, now - chrono::Duration::days(5)));
        store.upsert(record("stale", SecretStatus::Active, now - chrono::Duration::days(45)));

        let report = store.compliance_report(now);
        assert_eq!(report.total, 2);
        assert_eq!(report.overdue, vec!["stale".to_string()]);
    }

    #[test]
    fn expiration_report_separates_expired_expiring_and_exposed() {
        let now = Utc::now();
        let mut store = SecretStore::with_default_policies();
        let mut expired = record("expired", SecretStatus::Active, now);
        expired.expires_at = Some(now - chrono::Duration::days(1));
        let mut soon = record("soon", SecretStatus::Active, now);
        soon.expires_at = Some(now + chrono::Duration::days(3));
        store.upsert(expired);
        store.upsert(soon);
        store.upsert(record("burned", SecretStatus::Compromised, now));

        let report = store.expiration_report(now);
        assert_eq!(report.expired, vec!["expired".to_string()]);
        assert_eq!(report.expiring_soon, vec!["soon".to_string()]);
        assert_eq!(report.exposed, vec!["burned".to_string()]);
    }

    #[test]
    fn access_report_flags_concentrated_and_failing_accessors() {
        let now = Utc::now();
        let mut store = SecretStore::with_default_policies();
        // Four services at one read each, one service hammering.
        for service in ["api", "auth", "worker", "billing"] {
            store.record_access(access(service, now, true));
        }
        for _ in 0..20 {
            store.record_access(access("migration", now, true));
        }
        let report = store.access_report(now);
        assert_eq!(report.suspicious_accessors, vec!["migration".to_string()]);
        assert!(report.is_anomalous());

        // Old entries fall outside the audit window.
        let mut store = SecretStore::with_default_policies();
        for _ in 0..20 {
            store.record_access(access("migration", now - chrono::Duration::hours(30), true));
        }
        assert!(!store.access_report(now).is_anomalous());
    }

    #[test]
    fn rotation_advances_version_and_clears_compromise() {
        let now = Utc::now();
        let mut store = SecretStore::with_default_policies();
        store.upsert(record("burned", SecretStatus::Compromised, now));

        let outcomes = store.rotate_compromised(now);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].old_version, 1);
        assert_eq!(outcomes[0].new_version, 2);
        assert_eq!(store.version_of("burned"), Some(2));
        // A second pass finds nothing left to rotate.
        assert!(store.rotate_compromised(now).is_empty());

        assert_eq!(
            store.rotate("ghost", now),
            Err(SecretStoreError::UnknownSecret("ghost".to_string()))
        );
    }

    #[tokio::test]
    async fn compromised_secret_raises_p1_and_emergency_rotates() {
        let mut store = SecretStore::with_default_policies();
        store.upsert(record("burned", SecretStatus::Compromised, Utc::now()));
        let agent = VaultAgent::new(config(), store, Arc::new(NullAdapter));
        let (ctx, mut rx) = ctx();

        let observations = agent.observe(&ctx).await.unwrap();
        let significant: Vec<AgentObservation> = observations
            .into_iter()
            .filter(|o| o.is_significant())
            .collect();
        assert!(significant.iter().any(|o| o.data["kind"] == "exposure"));

        let actions = agent.act(&ctx, &significant).await.unwrap();
        let rotation = actions
            .iter()
            .find(|a| a.action_type == "emergency-rotation")
            .expect("emergency rotation action");
        assert!(actions.iter().any(|a| a.action_type == "revoke-versions"));

        // The rotation is verifiable against the live version table.
        let verification = agent.verify(&ctx, rotation).await.unwrap();
        assert!(verification.verified);
        assert!(!verification.contradicts(rotation));

        let mut saw_p1 = false;
        while let Ok(signal) = rx.try_recv() {
            if let AgentSignal::Alert(a) = signal {
                if a.alert_type == "exposed-secrets" {
                    assert_eq!(a.priority, AlertPriority::P1);
                    assert_eq!(a.context["exposed_secrets"], json!(1));
                    saw_p1 = true;
                }
            }
        }
        assert!(saw_p1);
    }

    #[tokio::test]
    async fn quiet_inventory_yields_no_significant_observations() {
        let mut store = SecretStore::with_default_policies();
        store.upsert(record("fresh", SecretStatus::Active, Utc::now()));
        let agent = VaultAgent::new(config(), store, Arc::new(NullAdapter));
        let (ctx, _rx) = ctx();

        let observations = agent.observe(&ctx).await.unwrap();
        assert!(observations.iter().all(|o| !o.is_significant()));
    }

    #[tokio::test]
    async fn runbook_step_rotates_exposed_secrets() {
        let mut store = SecretStore::with_default_policies();
        store.upsert(record("burned", SecretStatus::Compromised, Utc::now()));
        let agent = VaultAgent::new(config(), store, Arc::new(NullAdapter));
        let (ctx, _rx) = ctx();

        let message = AgentMessage::new(
            AgentId::from("orchestrator"),
            AgentId::from("vault-keeper"),
            MessageType::Act,
            json!({"action": "rotate_exposed_secrets", "runbook": "critical-incident"}),
        );
        agent.handle_message(&ctx, message).await.unwrap();
        assert_eq!(agent.store.lock().version_of("burned"), Some(2));
    }

    #[tokio::test]
    async fn suspicious_access_gets_restricted_and_verified() {
        let now = Utc::now();
        let mut store = SecretStore::with_default_policies();
        for service in ["api", "auth", "worker", "billing"] {
            store.record_access(access(service, now, true));
        }
        for _ in 0..20 {
            store.record_access(access("migration", now, true));
        }
        let agent = VaultAgent::new(config(), store, Arc::new(NullAdapter));
        let (ctx, _rx) = ctx();

        let observations = agent.observe(&ctx).await.unwrap();
        let significant: Vec<AgentObservation> = observations
            .into_iter()
            .filter(|o| o.is_significant())
            .collect();
        let actions = agent.act(&ctx, &significant).await.unwrap();
        let restrict = actions
            .iter()
            .find(|a| a.action_type == "restrict-access")
            .expect("restrict action");
        assert_eq!(restrict.params["accessor"], json!("migration"));

        let verification = agent.verify(&ctx, restrict).await.unwrap();
        assert!(verification.verified);
    }

    #[tokio::test]
    async fn inventory_snapshot_is_absorbed_from_the_adapter() {
        struct SnapshotAdapter {
            payload: Value,
        }

        #[async_trait]
        impl DataSourceAdapter for SnapshotAdapter {
            async fn fetch(&self, _source: &DataSource) -> Result<Value, AdapterError> {
                Ok(self.payload.clone())
            }
        }

        let now = Utc::now();
        let payload = json!({
            "secrets": [serde_json::to_value(record("imported", SecretStatus::Active, now)).unwrap()],
            "access_log": [],
        });
        let agent = VaultAgent::new(
            config(),
            SecretStore::with_default_policies(),
            Arc::new(SnapshotAdapter { payload }),
        );
        let (ctx, _rx) = ctx();

        agent.observe(&ctx).await.unwrap();
        assert_eq!(agent.store.lock().secret_count(), 1);
        assert_eq!(agent.store.lock().version_of("imported"), Some(1));

        // Garbage payloads fail the cycle instead of being silently skipped.
        let broken = VaultAgent::new(
            config(),
            SecretStore::with_default_policies(),
            Arc::new(SnapshotAdapter {
                payload: json!("not a snapshot"),
            }),
        );
        assert!(matches!(
            broken.observe(&ctx).await,
            Err(AgentError::Adapter(AdapterError::Decode { .. }))
        ));
    }
}
