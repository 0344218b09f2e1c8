// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Rule-driven event correlation and attack-pattern analysis.
//!
//! The engine owns a rolling buffer of [`SecurityEvent`]s and evaluates
//! three independent layers against it:
//!
//! 1. windowed [`CorrelationRule`]s (count-threshold over condition
//!    matches inside a trailing time window),
//! 2. IOC matching against the current threat-intel list,
//! 3. fixed attack-pattern heuristics over the last 30 minutes.
//!
//! An event lacking a rule's condition field is a per-event non-match. A
//! misconfigured rule (bad regex, bad operand) fails only that rule's
//! evaluation; the remaining rules and the cycle continue.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::condition::ConditionError;
use crate::domain::correlation::{
    AttackAnalysis, AttackClassification, AttackPattern, CorrelationMatch, CorrelationRule, Ioc,
    IocMatch, IocType, RiskLevel, SecurityEvent, ThreatLevel,
};

/// Buffered events older than this are pruned.
pub const EVENT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Attack-pattern heuristics look at this trailing window, independent of
/// any rule's window.
pub const PATTERN_WINDOW: Duration = Duration::from_secs(30 * 60);
/// Threat-intel list is considered stale after this.
pub const INTEL_REFRESH_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

const BRUTE_FORCE_MIN_FAILURES: usize = 50;
const BRUTE_FORCE_MAX_SOURCES: usize = 5;
const DISTRIBUTED_MIN_SOURCES: usize = 20;
const DISTRIBUTED_MIN_ELEVATED: usize = 100;
const PRIV_ESC_MIN_EVENTS: usize = 3;
const EXFIL_BYTES_THRESHOLD: u64 = 1_000_000;

pub struct CorrelationEngine {
    rules: Vec<CorrelationRule>,
    events: VecDeque<SecurityEvent>,
    iocs: Vec<Ioc>,
    intel_refreshed_at: Option<DateTime<Utc>>,
    retention: Duration,
}

impl CorrelationEngine {
    pub fn new(rules: Vec<CorrelationRule>) -> Self {
        Self {
            rules,
            events: VecDeque::new(),
            iocs: Vec::new(),
            intel_refreshed_at: None,
            retention: EVENT_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn rules(&self) -> &[CorrelationRule] {
        &self.rules
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn ingest(&mut self, event: SecurityEvent) {
        self.events.push_back(event);
    }

    pub fn ingest_batch(&mut self, events: impl IntoIterator<Item = SecurityEvent>) {
        self.events.extend(events);
    }

    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - chrono_duration(self.retention);
        self.events.retain(|e| e.timestamp > cutoff);
    }

    /// Evaluate every rule against the buffer at `now`.
    pub fn evaluate(&self, now: DateTime<Utc>) -> Vec<CorrelationMatch> {
        let mut matches = Vec::new();

        'rules: for rule in &self.rules {
            let cutoff = now - chrono_duration(rule.time_window);
            let mut matched = Vec::new();

            for event in &self.events {
                if event.timestamp < cutoff || event.timestamp > now {
                    continue;
                }
                let doc = event.to_document();
                let mut satisfied = true;
                for condition in &rule.conditions {
                    match condition.evaluate(&doc) {
                        Ok(true) => {}
                        Ok(false) => {
                            satisfied = false;
                            break;
                        }
                        // Events vary in shape; one lacking the rule's
                        // field simply does not match it.
                        Err(ConditionError::MissingField(_))
                        | Err(ConditionError::NotNumeric { .. }) => {
                            satisfied = false;
                            break;
                        }
                        // Bad regex or operand is a rule-config problem.
                        Err(e) => {
                            warn!(rule = %rule.id, error = %e, "rule misconfigured, skipping rule");
                            continue 'rules;
                        }
                    }
                }
                if satisfied {
                    matched.push(event.clone());
                }
            }

            if matched.len() >= rule.threshold {
                let risk = correlation_risk(&matched, rule);
                debug!(rule = %rule.id, count = matched.len(), %risk, "correlation rule fired");
                matches.push(CorrelationMatch {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    match_count: matched.len(),
                    matched_events: matched,
                    risk,
                    action: rule.action.clone(),
                });
            }
        }

        matches
    }

    /// Match a batch of events against the current IOC list.
    pub fn match_iocs(&self, events: &[SecurityEvent]) -> Vec<IocMatch> {
        let mut matches = Vec::new();
        for event in events {
            for ioc in &self.iocs {
                if ioc_matches(event, ioc) {
                    matches.push(IocMatch {
                        event_id: event.id.clone(),
                        ioc: ioc.clone(),
                        confidence: match_confidence(event, ioc),
                    });
                }
            }
        }
        matches
    }

    pub fn set_iocs(&mut self, iocs: Vec<Ioc>, now: DateTime<Utc>) {
        self.iocs = iocs;
        self.intel_refreshed_at = Some(now);
    }

    pub fn needs_intel_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.intel_refreshed_at {
            None => true,
            Some(at) => now - at > chrono_duration(INTEL_REFRESH_INTERVAL),
        }
    }

    /// Attack-pattern heuristics over the trailing 30-minute window.
    ///
    /// Three or more simultaneously active heuristics classify as
    /// `coordinated` and are treated as maximum severity regardless of
    /// individual rule outputs.
    pub fn analyze_patterns(&self, now: DateTime<Utc>) -> AttackAnalysis {
        let cutoff = now - chrono_duration(PATTERN_WINDOW);
        let recent: Vec<&SecurityEvent> = self
            .events
            .iter()
            .filter(|e| e.timestamp > cutoff && e.timestamp <= now)
            .collect();

        let mut patterns = Vec::new();
        if detect_brute_force(&recent) {
            patterns.push(AttackPattern::BruteForce);
        }
        if detect_distributed(&recent) {
            patterns.push(AttackPattern::Distributed);
        }
        if detect_exfiltration(&recent) {
            patterns.push(AttackPattern::Exfiltration);
        }
        if detect_privilege_escalation(&recent) {
            patterns.push(AttackPattern::PrivilegeEscalation);
        }

        let classification = match patterns.len() {
            0 => AttackClassification::Quiet,
            1 | 2 => AttackClassification::Single(patterns[0]),
            _ => AttackClassification::Coordinated,
        };
        let confidence = match classification {
            AttackClassification::Coordinated => 0.9,
            AttackClassification::Single(_) => 0.6,
            AttackClassification::Quiet => 0.0,
        };

        AttackAnalysis {
            classification,
            patterns,
            sources: attack_sources(&recent),
            confidence,
        }
    }
}

/// Anomaly score for a freshly collected batch: ratio of high-severity
/// events and overall event rate.
pub fn score_batch(events: &[SecurityEvent], window: Duration) -> f64 {
    if events.is_empty() {
        return 0.0;
    }
    let elevated = events.iter().filter(|e| e.severity.is_elevated()).count();
    let ratio = elevated as f64 / events.len() as f64;
    let minutes = (window.as_secs_f64() / 60.0).max(1.0);
    let rate = events.len() as f64 / minutes;

    if ratio > 0.3 || rate > 50.0 {
        0.8
    } else if ratio > 0.1 || rate > 20.0 {
        0.6
    } else {
        0.3
    }
}

fn correlation_risk(events: &[SecurityEvent], rule: &CorrelationRule) -> RiskLevel {
    let avg = events.iter().map(|e| e.severity.score() as f64).sum::<f64>() / events.len() as f64;
    let name = rule.name.to_lowercase();
    if avg >= 4.0 || name.contains("attack") || name.contains("escalation") {
        RiskLevel::High
    } else if avg >= 3.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn ioc_matches(event: &SecurityEvent, ioc: &Ioc) -> bool {
    let meta = |key: &str| event.metadata.get(key).and_then(|v| v.as_str());
    match ioc.ioc_type {
        IocType::Ip => meta("ip") == Some(ioc.value.as_str()),
        IocType::Domain => meta("domain") == Some(ioc.value.as_str()),
        IocType::Hash => meta("hash") == Some(ioc.value.as_str()),
        IocType::Url => meta("url") == Some(ioc.value.as_str()),
        IocType::Pattern => match regex::Regex::new(&ioc.value) {
            Ok(re) => re.is_match(&event.to_document().to_string()),
            Err(e) => {
                warn!(ioc = %ioc.value, error = %e, "invalid IOC pattern, skipping");
                false
            }
        },
    }
}

fn match_confidence(event: &SecurityEvent, ioc: &Ioc) -> f64 {
    let mut confidence: f64 = 0.5;
    if ioc.threat_level == ThreatLevel::High {
        confidence += 0.3;
    }
    if event.severity.is_elevated() {
        confidence += 0.2;
    }
    confidence.min(1.0)
}

fn detect_brute_force(events: &[&SecurityEvent]) -> bool {
    let failures: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == "authentication_failure")
        .collect();
    let sources: HashSet<_> = failures.iter().filter_map(|e| e.source_ip()).collect();
    failures.len() >= BRUTE_FORCE_MIN_FAILURES && sources.len() < BRUTE_FORCE_MAX_SOURCES
}

fn detect_distributed(events: &[&SecurityEvent]) -> bool {
    let elevated: Vec<_> = events.iter().filter(|e| e.severity.is_elevated()).collect();
    let sources: HashSet<_> = elevated.iter().filter_map(|e| e.source_ip()).collect();
    sources.len() > DISTRIBUTED_MIN_SOURCES && elevated.len() > DISTRIBUTED_MIN_ELEVATED
}

fn detect_exfiltration(events: &[&SecurityEvent]) -> bool {
    events.iter().any(|e| {
        e.event_type == "data_exfiltration_attempt"
            || (e.event_type == "anomalous_api_usage"
                && e.metadata
                    .get("bytes_transferred")
                    .and_then(|v| v.as_u64())
                    .is_some_and(|b| b > EXFIL_BYTES_THRESHOLD))
    })
}

fn detect_privilege_escalation(events: &[&SecurityEvent]) -> bool {
    events
        .iter()
        .filter(|e| e.event_type.contains("privilege_escalation"))
        .count()
        > PRIV_ESC_MIN_EVENTS
}

fn attack_sources(events: &[&SecurityEvent]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for event in events {
        for key in ["ip", "asn"] {
            if let Some(value) = event.metadata.get(key).and_then(|v| v.as_str()) {
                if seen.insert(value.to_string()) {
                    sources.push(value.to_string());
                }
            }
        }
    }
    sources
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}
