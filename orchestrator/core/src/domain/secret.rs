// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Secret inventory types for the secrets-lifecycle agent.
//!
//! A [`SecretRecord`] tracks one managed credential through rotation
//! versions; [`RotationPolicy`] sets the per-type rotation cadence. The
//! records themselves never hold secret material, only lifecycle metadata.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretType {
    ApiKey,
    Database,
    JwtSecret,
    EncryptionKey,
    Certificate,
    PrivateKey,
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecretType::ApiKey => "api-key",
            SecretType::Database => "database",
            SecretType::JwtSecret => "jwt-secret",
            SecretType::EncryptionKey => "encryption-key",
            SecretType::Certificate => "certificate",
            SecretType::PrivateKey => "private-key",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretStatus {
    Active,
    Rotating,
    Deprecated,
    Compromised,
}

/// Lifecycle metadata for one managed secret. `version` advances on every
/// rotation; prior versions are revoked, never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub secret_type: SecretType,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub last_rotated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub status: SecretStatus,
    pub environment: String,
    pub service: String,
}

impl SecretRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }

    pub fn expires_within(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.expires_at
            .is_some_and(|at| at >= now && at - now < window)
    }
}

/// Per-type rotation cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationPolicy {
    #[serde(rename = "type")]
    pub secret_type: SecretType,
    #[serde(with = "humantime_serde")]
    pub rotation_interval: Duration,
    #[serde(
        default,
        with = "humantime_serde::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiration_period: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Read,
    Write,
    Rotate,
    Delete,
}

/// One audited access to a secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRecord {
    pub secret_id: String,
    pub accessor: String,
    pub timestamp: DateTime<Utc>,
    pub action: AccessKind,
    pub success: bool,
}
