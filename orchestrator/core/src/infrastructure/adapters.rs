// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! External data-source and threat-intel seams.
//!
//! The core treats every external system (WAF vendor, SIEM, secrets vault,
//! chain RPC, repo scanner) identically through one narrow fetch contract.
//! Concrete collectors live outside this crate; the stubs here return
//! empty results so behavior stays deterministic until a real adapter is
//! wired in.

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::agent::DataSource;
use crate::domain::correlation::Ioc;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("data source '{0}' is not available")]
    Unavailable(String),

    #[error("fetch from '{source_id}' failed: {reason}")]
    Fetch { source_id: String, reason: String },

    #[error("payload from '{source_id}' could not be decoded: {reason}")]
    Decode { source_id: String, reason: String },
}

/// One-shape contract for reading an external system.
#[async_trait]
pub trait DataSourceAdapter: Send + Sync {
    async fn fetch(&self, source: &DataSource) -> Result<Value, AdapterError>;
}

/// Stub adapter for sources with no collector yet. Returns an empty event
/// batch for every source; never fails.
#[derive(Debug, Default)]
pub struct NullAdapter;

#[async_trait]
impl DataSourceAdapter for NullAdapter {
    async fn fetch(&self, _source: &DataSource) -> Result<Value, AdapterError> {
        Ok(json!([]))
    }
}

/// Periodically refreshed indicator feed.
#[async_trait]
pub trait ThreatIntelFeed: Send + Sync {
    async fn fetch_iocs(&self) -> Result<Vec<Ioc>, AdapterError>;
}

/// Fixed indicator list, for deployments without a live feed and for
/// tests.
#[derive(Debug, Default)]
pub struct StaticIntelFeed {
    iocs: Vec<Ioc>,
}

impl StaticIntelFeed {
    pub fn new(iocs: Vec<Ioc>) -> Self {
        Self { iocs }
    }
}

#[async_trait]
impl ThreatIntelFeed for StaticIntelFeed {
    async fn fetch_iocs(&self) -> Result<Vec<Ioc>, AdapterError> {
        Ok(self.iocs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_adapter_returns_empty_batch() {
        let adapter = NullAdapter;
        let payload = adapter
            .fetch(&DataSource::new("cloudflare.api"))
            .await
            .unwrap();
        assert_eq!(payload, json!([]));
    }

    #[test]
    fn adapter_errors_name_the_offending_source() {
        let err = AdapterError::Decode {
            source_id: "wazuh.api".to_string(),
            reason: "expected an array".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "payload from 'wazuh.api' could not be decoded: expected an array"
        );

        let err = AdapterError::Fetch {
            source_id: "vault.api".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("vault.api"));
    }

    #[tokio::test]
    async fn static_feed_returns_configured_iocs() {
        use crate::domain::correlation::{IocType, ThreatLevel};
        use chrono::Utc;

        let feed = StaticIntelFeed::new(vec![Ioc {
            ioc_type: IocType::Ip,
            value: "203.0.113.7".to_string(),
            threat_level: ThreatLevel::High,
            source: "abuse.ch".to_string(),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
        }]);
        let iocs = feed.fetch_iocs().await.unwrap();
        assert_eq!(iocs.len(), 1);
        assert_eq!(iocs[0].value, "203.0.113.7");
    }
}
