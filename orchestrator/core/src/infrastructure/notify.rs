// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Notification sinks.
//!
//! Routes are `protocol://target` strings (`matrix://#sec-ops`,
//! `pager://incident-commander`). Delivery is fire-and-forget from the
//! orchestrator's perspective: a failed route is logged and never blocks
//! fan-out to the remaining routes.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::alert::SecurityAlert;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery to '{route}' failed: {reason}")]
    Delivery { route: String, reason: String },
}

/// Parsed `protocol://target` notification route. A bare target without a
/// scheme parses with the `notify` protocol, which lets escalation-rule
/// targets (`incident-commander`) reuse the sink contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRoute {
    pub protocol: String,
    pub target: String,
}

impl NotificationRoute {
    pub fn new(protocol: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            target: target.into(),
        }
    }
}

impl FromStr for NotificationRoute {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.split_once("://") {
            Some((protocol, target)) => Self::new(protocol, target),
            None => Self::new("notify", s),
        })
    }
}

impl fmt::Display for NotificationRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.target)
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, route: &NotificationRoute, alert: &SecurityAlert)
        -> Result<(), NotifyError>;
}

/// Sink that records deliveries in the structured log. The default for
/// local runs and the fallback for protocols without a concrete
/// integration.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(
        &self,
        route: &NotificationRoute,
        alert: &SecurityAlert,
    ) -> Result<(), NotifyError> {
        info!(
            route = %route,
            alert_id = %alert.id,
            priority = %alert.priority,
            alert_type = %alert.alert_type,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Posts the alert JSON to `webhook://` routes; other protocols fall back
/// to the log.
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn send(
        &self,
        route: &NotificationRoute,
        alert: &SecurityAlert,
    ) -> Result<(), NotifyError> {
        if route.protocol != "webhook" {
            warn!(route = %route, "no webhook integration for protocol, logging only");
            return LogNotifier.send(route, alert).await;
        }

        let url = if route.target.starts_with("http") {
            route.target.clone()
        } else {
            format!("https://{}", route.target)
        };

        self.client
            .post(&url)
            .json(alert)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery {
                route: route.to_string(),
                reason: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| NotifyError::Delivery {
                route: route.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
